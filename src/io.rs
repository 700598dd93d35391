use std::io::{BufRead, Write};

use anyhow::{bail, Result};

use crate::suda::ScoreTable;
use crate::table::{Table, Value};

pub fn read_delimited(filename: &str, delimiter: char) -> Result<Table> {
    let mut header: Vec<String> = vec![];
    let mut rows = vec![];

    let file = std::fs::File::open(filename)?;
    let reader = std::io::BufReader::new(file);

    for line in reader.lines() {
        let line = line?;
        if header.is_empty() {
            header = line
                .split(delimiter)
                .map(|name| name.trim().to_string())
                .collect();
            continue;
        }
        let cells: Vec<Value> = line.split(delimiter).map(parse_cell).collect();
        if cells.len() != header.len() {
            bail!(
                "row {} has {} cells, expected {}",
                rows.len() + 1,
                cells.len(),
                header.len()
            );
        }
        rows.push(cells);
    }
    if header.is_empty() {
        bail!("input file is empty: {}", filename);
    }
    Table::new(header, rows)
}

// Empty cells are missing; anything that parses as a number is numeric.
fn parse_cell(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Missing;
    }
    if let Ok(value) = trimmed.parse::<f64>() {
        Value::Num(value)
    } else {
        Value::Text(trimmed.to_string())
    }
}

pub fn write_scores(filename: &str, scores: &ScoreTable, delimiter: char) -> Result<()> {
    let mut file = std::fs::File::create(filename)?;
    let sep = delimiter.to_string();
    let header = ["row", "msu", "suda", "dis-suda", "fK", "fM"].join(&sep);
    file.write_all(header.as_bytes())?;
    file.write_all("\n".as_bytes())?;
    for i in 0..scores.len() {
        let msu = scores.msu[i].map_or(String::new(), |m| m.to_string());
        let fk = scores.fk[i].map_or(String::new(), |f| f.to_string());
        let line = [
            scores.rows[i].to_string(),
            msu,
            scores.suda[i].to_string(),
            scores.dis_suda[i].to_string(),
            fk,
            scores.fm[i].to_string(),
        ]
        .join(&sep);
        file.write_all(line.as_bytes())?;
        file.write_all("\n".as_bytes())?;
    }
    Ok(())
}
