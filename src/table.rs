use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use anyhow::{bail, Result};

/// Columns with fewer distinct values than this are dictionary-encoded
/// before grouping; wider columns are grouped on their raw cells.
pub const MAX_COMPACT_CARDINALITY: usize = 600;

/// Code reserved for missing cells in a compacted column.
pub const MISSING_CODE: u32 = u32::MAX;

/// A single cell: numeric, text, or missing.
#[derive(Debug, Clone)]
pub enum Value {
    Num(f64),
    Text(String),
    Missing,
}

impl Value {
    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    /// Whether this cell equals the wildcard sentinel. Only numeric cells
    /// can match a numeric sentinel.
    pub fn matches_wildcard(&self, wildcard: f64) -> bool {
        match self {
            Value::Num(x) => *x == wildcard,
            _ => false,
        }
    }
}

// Equality and hashing go through the float's bit pattern so values can key
// hash maps. NaN equals NaN under this relation, which is what grouping wants.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Num(a), Value::Num(b)) => a.to_bits() == b.to_bits(),
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Missing, Value::Missing) => true,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::Num(x) => {
                0u8.hash(state);
                x.to_bits().hash(state);
            }
            Value::Text(s) => {
                1u8.hash(state);
                s.hash(state);
            }
            Value::Missing => 2u8.hash(state),
        }
    }
}

/// A rectangular table: header names plus row-major cells.
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(header: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        for (i, row) in rows.iter().enumerate() {
            if row.len() != header.len() {
                bail!(
                    "row {} has {} cells, expected {}",
                    i,
                    row.len(),
                    header.len()
                );
            }
        }
        Ok(Self { header, rows })
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h == name)
    }
}

/// A quasi-identifier column restricted to the filtered rows. Low-cardinality
/// columns carry dictionary codes; the rest keep their raw cells. Group
/// membership is identical either way.
pub enum QiColumn {
    Coded(Vec<u32>),
    Raw(Vec<Value>),
}

/// Per-row grouping key component, borrowed from a `QiColumn`.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum CellKey<'a> {
    Code(u32),
    Cell(&'a Value),
}

impl QiColumn {
    pub fn len(&self) -> usize {
        match self {
            QiColumn::Coded(codes) => codes.len(),
            QiColumn::Raw(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Key component for one row, or `None` when the cell is missing.
    pub fn key(&self, row: usize) -> Option<CellKey<'_>> {
        match self {
            QiColumn::Coded(codes) => match codes[row] {
                MISSING_CODE => None,
                code => Some(CellKey::Code(code)),
            },
            QiColumn::Raw(values) => match &values[row] {
                Value::Missing => None,
                value => Some(CellKey::Cell(value)),
            },
        }
    }

    /// Key component treating missing as an ordinary value. Used for the
    /// global uniqueness counts, where missing groups still count.
    pub fn key_with_missing(&self, row: usize) -> CellKey<'_> {
        match self {
            QiColumn::Coded(codes) => CellKey::Code(codes[row]),
            QiColumn::Raw(values) => CellKey::Cell(&values[row]),
        }
    }
}

/// Indices of rows that survive the wildcard filter: a row is dropped when
/// its wildcard cells outnumber half of all dataset columns. Original order
/// is preserved.
pub fn filter_wildcard_rows(table: &Table, wildcard: f64) -> Vec<usize> {
    let n_columns = table.header.len();
    table
        .rows
        .iter()
        .enumerate()
        .filter_map(|(i, row)| {
            let n_wildcards = row
                .iter()
                .filter(|cell| cell.matches_wildcard(wildcard))
                .count();
            if 2 * n_wildcards <= n_columns {
                Some(i)
            } else {
                None
            }
        })
        .collect()
}

/// Restrict one column to the kept rows, dictionary-encoding it when its
/// cardinality is below `MAX_COMPACT_CARDINALITY`. Purely a performance
/// transform for the grouping step.
pub fn compact_column(table: &Table, column: usize, kept_rows: &[usize]) -> QiColumn {
    let mut codebook: HashMap<&Value, u32> = HashMap::new();
    for &row in kept_rows {
        let cell = &table.rows[row][column];
        if !cell.is_missing() && !codebook.contains_key(cell) {
            let next = codebook.len() as u32;
            codebook.insert(cell, next);
        }
    }
    if codebook.len() >= MAX_COMPACT_CARDINALITY {
        let values = kept_rows
            .iter()
            .map(|&row| table.rows[row][column].clone())
            .collect();
        return QiColumn::Raw(values);
    }
    let codes = kept_rows
        .iter()
        .map(|&row| {
            let cell = &table.rows[row][column];
            if cell.is_missing() {
                MISSING_CODE
            } else {
                codebook[cell]
            }
        })
        .collect();
    QiColumn::Coded(codes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(x: f64) -> Value {
        Value::Num(x)
    }

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    #[test]
    fn test_value_equality() {
        assert_eq!(num(1.0), num(1.0));
        assert_ne!(num(1.0), num(2.0));
        assert_eq!(text("a"), text("a"));
        assert_ne!(num(1.0), text("1"));
        assert_eq!(Value::Missing, Value::Missing);
        assert_eq!(num(f64::NAN), num(f64::NAN));
    }

    #[test]
    fn test_table_rejects_ragged_rows() {
        let result = Table::new(
            vec!["a".to_string(), "b".to_string()],
            vec![vec![num(1.0), num(2.0)], vec![num(3.0)]],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_filter_wildcard_rows() {
        let table = Table::new(
            vec!["a".to_string(), "b".to_string(), "c".to_string()],
            vec![
                vec![num(1.0), num(2.0), num(3.0)],
                vec![num(-999.0), num(2.0), num(3.0)],
                vec![num(-999.0), num(-999.0), num(3.0)],
                vec![num(-999.0), num(-999.0), num(-999.0)],
            ],
        )
        .unwrap();
        // 1 of 3 wildcards is within the half threshold, 2 of 3 is beyond it.
        assert_eq!(filter_wildcard_rows(&table, -999.0), vec![0, 1]);
    }

    #[test]
    fn test_filter_ignores_text_cells() {
        let table = Table::new(
            vec!["a".to_string(), "b".to_string()],
            vec![vec![text("-999"), text("-999")]],
        )
        .unwrap();
        assert_eq!(filter_wildcard_rows(&table, -999.0), vec![0]);
    }

    #[test]
    fn test_compact_column_codes() {
        let table = Table::new(
            vec!["city".to_string()],
            vec![
                vec![text("NY")],
                vec![text("LA")],
                vec![text("NY")],
                vec![Value::Missing],
            ],
        )
        .unwrap();
        let column = compact_column(&table, 0, &[0, 1, 2, 3]);
        match column {
            QiColumn::Coded(codes) => assert_eq!(codes, vec![0, 1, 0, MISSING_CODE]),
            QiColumn::Raw(_) => panic!("expected coded column"),
        }
    }

    #[test]
    fn test_compact_column_wide_falls_back_to_raw() {
        let rows: Vec<Vec<Value>> = (0..MAX_COMPACT_CARDINALITY)
            .map(|i| vec![num(i as f64)])
            .collect();
        let kept: Vec<usize> = (0..rows.len()).collect();
        let table = Table::new(vec!["id".to_string()], rows).unwrap();
        let column = compact_column(&table, 0, &kept);
        assert!(matches!(column, QiColumn::Raw(_)));
    }

    #[test]
    fn test_compaction_preserves_group_membership() {
        let table = Table::new(
            vec!["a".to_string()],
            vec![vec![num(7.0)], vec![num(3.0)], vec![num(7.0)]],
        )
        .unwrap();
        let column = compact_column(&table, 0, &[0, 1, 2]);
        assert_eq!(column.key(0), column.key(2));
        assert_ne!(column.key(0), column.key(1));
    }
}
