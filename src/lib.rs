pub mod io;
pub mod suda;
pub mod table;
