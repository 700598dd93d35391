use anyhow::Context;
use clap::Parser;

use suda::io::{read_delimited, write_scores};
use suda::suda::score;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input file
    #[arg(short, long)]
    input: String,
    /// Output file
    #[arg(short, long)]
    output: String,
    /// Quasi-identifier columns (comma-separated)
    #[arg(short, long, value_delimiter = ',', num_args = 1..)]
    columns: Vec<String>,
    /// Largest combination size to test for uniqueness
    #[arg(short, long, default_value = "2")]
    max_msu: usize,
    /// Assumed fraction of the population present in the sample
    #[arg(short, long, default_value = "0.3")]
    sample_fraction: f64,
    /// Sentinel value marking missing/unknown cells
    #[arg(short, long, default_value = "-999", allow_hyphen_values = true)]
    wildcard: f64,
    /// Delimiter for input/output files (tab is inferred for .tsv input)
    #[arg(short, long, default_value = ",")]
    delimiter: char,
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    let delimiter = if args.delimiter == ',' && args.input.to_lowercase().ends_with(".tsv") {
        '\t'
    } else {
        args.delimiter
    };
    let table = read_delimited(&args.input, delimiter)
        .context("Could not read input file")
        .unwrap();
    let scores = score(
        &table,
        &args.columns,
        args.max_msu,
        args.sample_fraction,
        args.wildcard,
    )
    .context("Could not score dataset")
    .unwrap();
    write_scores(&args.output, &scores, delimiter)
        .context("Could not write output file")
        .unwrap();
}
