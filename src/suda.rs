use std::collections::{HashMap, HashSet};
use std::fmt::Write;

use anyhow::{bail, Result};
use indicatif::{ProgressBar, ProgressState, ProgressStyle};
use log::{info, warn};
use num::integer::binomial;
use rayon::prelude::*;

use crate::table::{compact_column, filter_wildcard_rows, CellKey, QiColumn, Table};

/// Attribute-count cap for factorial weighting. Selections wider than this
/// still participate in grouping, but the weight basis is clamped.
pub const MAX_WEIGHTED_ATTRIBUTES: usize = 20;

/// Per-record scores, one entry per row that survived the wildcard filter,
/// in input order. `rows` holds the original row indices for re-joining.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreTable {
    pub rows: Vec<usize>,
    pub msu: Vec<Option<usize>>,
    pub suda: Vec<f64>,
    pub dis_suda: Vec<f64>,
    pub fk: Vec<Option<u32>>,
    pub fm: Vec<u32>,
}

impl ScoreTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// One minimal sample unique: a record made unique by one k-sized column
// combination. fk is the size of the group that exposed it (1 for a
// singleton).
struct MsuEvent {
    row: usize,
    k: usize,
    fk: u32,
}

// Compute the SUDA and DIS-SUDA scores for the given quasi-identifier
// selection. Records dominated by the wildcard sentinel are dropped before
// scoring and are absent from the result.
pub fn score(
    table: &Table,
    qi_columns: &[String],
    max_msu: usize,
    sample_fraction: f64,
    wildcard: f64,
) -> Result<ScoreTable> {
    let column_idx = validate(table, qi_columns, max_msu, sample_fraction)?;

    let kept_rows = filter_wildcard_rows(table, wildcard);
    let n_rows = kept_rows.len();
    let columns: Vec<QiColumn> = column_idx
        .iter()
        .map(|&c| compact_column(table, c, &kept_rows))
        .collect();

    let att = qi_columns.len().min(MAX_WEIGHTED_ATTRIBUTES);
    if qi_columns.len() > MAX_WEIGHTED_ATTRIBUTES {
        warn!(
            "{} quasi-identifier columns selected; factorial weighting capped at {}",
            qi_columns.len(),
            MAX_WEIGHTED_ATTRIBUTES
        );
    }

    let k_max = max_msu.min(qi_columns.len());
    let combos: Vec<Vec<usize>> = (1..=k_max)
        .flat_map(|k| combinations(qi_columns.len(), k))
        .collect();
    info!(
        "Scoring {} rows ({} filtered out) across {} combinations, att = {}",
        n_rows,
        table.n_rows() - n_rows,
        combos.len(),
        att
    );

    let progress = ProgressBar::new(combos.len() as u64);
    progress.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos:>7}/{len:7} ({eta})",
        )
        .unwrap()
        .with_key("eta", |state: &ProgressState, w: &mut dyn Write| {
            write!(w, "{:.1}s", state.eta().as_secs_f64()).unwrap()
        })
        .progress_chars("#>-"),
    );

    // Pure map over combinations; each worker reads the shared columns and
    // returns its own event list. The reduce below is single-threaded.
    let partials: Vec<Vec<MsuEvent>> = combos
        .par_iter()
        .map(|combo| {
            let events = scan_combination(&columns, combo, n_rows);
            progress.inc(1);
            events
        })
        .collect();
    progress.finish_with_message("Finished scanning");

    let n_events: usize = partials.iter().map(|p| p.len()).sum();
    if n_events == 0 {
        info!("No special uniques found");
    }

    let mut result = aggregate(n_rows, att, &kept_rows, partials);
    normalize(&columns, n_rows, sample_fraction, &mut result);
    Ok(result)
}

// Upper bound on the number of combinations score() will scan, so callers
// can guard against runaway enumeration before committing to a run.
pub fn count_combinations(n_columns: usize, max_msu: usize) -> u64 {
    let k_max = max_msu.min(n_columns);
    let mut total: u128 = 0;
    for k in 1..=k_max as u128 {
        total = total.saturating_add(binomial(n_columns as u128, k));
    }
    u64::try_from(total).unwrap_or(u64::MAX)
}

fn validate(
    table: &Table,
    qi_columns: &[String],
    max_msu: usize,
    sample_fraction: f64,
) -> Result<Vec<usize>> {
    if table.n_rows() == 0 {
        bail!("no data to score");
    }
    if qi_columns.is_empty() {
        bail!("no quasi-identifier columns selected");
    }
    if max_msu == 0 {
        bail!("max_msu must be at least 1");
    }
    if !(sample_fraction > 0.0 && sample_fraction <= 1.0) {
        bail!(
            "sample_fraction must be in (0, 1], got {}",
            sample_fraction
        );
    }
    let mut seen = HashSet::new();
    let mut column_idx = Vec::with_capacity(qi_columns.len());
    for name in qi_columns {
        if !seen.insert(name) {
            bail!("duplicate column in selection: {}", name);
        }
        match table.column_index(name) {
            Some(idx) => column_idx.push(idx),
            None => bail!("unknown column: {}", name),
        }
    }
    Ok(column_idx)
}

// All size-k subsets of 0..n in lexicographic order.
fn combinations(n: usize, k: usize) -> Vec<Vec<usize>> {
    let mut result = Vec::new();
    if k == 0 || k > n {
        return result;
    }
    let mut idx: Vec<usize> = (0..k).collect();
    loop {
        result.push(idx.clone());
        let mut i = k;
        while i > 0 && idx[i - 1] == n - k + i - 1 {
            i -= 1;
        }
        if i == 0 {
            break;
        }
        idx[i - 1] += 1;
        for j in i..k {
            idx[j] = idx[j - 1] + 1;
        }
    }
    result
}

// Group the filtered rows by their joint value over one combination and emit
// an event per singleton group. Rows with a missing cell in any combination
// column are excluded from that combination's grouping. Non-singleton groups
// produce nothing.
fn scan_combination(columns: &[QiColumn], combo: &[usize], n_rows: usize) -> Vec<MsuEvent> {
    let mut groups: HashMap<Vec<CellKey>, (u32, usize)> = HashMap::new();
    'rows: for row in 0..n_rows {
        let mut key = Vec::with_capacity(combo.len());
        for &c in combo {
            match columns[c].key(row) {
                Some(part) => key.push(part),
                None => continue 'rows,
            }
        }
        groups.entry(key).or_insert((0, row)).0 += 1;
    }
    groups
        .into_values()
        .filter(|&(count, _)| count == 1)
        .map(|(count, row)| MsuEvent {
            row,
            k: combo.len(),
            fk: count,
        })
        .collect()
}

// Raw score contribution of one k-sized unique combination.
fn msu_weight(att: usize, k: usize) -> f64 {
    factorial(att.saturating_sub(k))
}

fn factorial(n: usize) -> f64 {
    (1..=n).map(|i| i as f64).product()
}

// Merge the per-combination event lists into one row per record: smallest
// unique size, summed weights, flag count, smallest exposing group size.
// Records with no events keep suda = 0 and msu = None. Aggregation is
// min/sum based, so the order partials arrive in cannot affect the result.
fn aggregate(
    n_rows: usize,
    att: usize,
    kept_rows: &[usize],
    partials: Vec<Vec<MsuEvent>>,
) -> ScoreTable {
    let mut msu = vec![None; n_rows];
    let mut suda = vec![0.0; n_rows];
    let mut fk = vec![None; n_rows];
    let mut fm = vec![0u32; n_rows];
    for events in &partials {
        for event in events {
            msu[event.row] = Some(msu[event.row].map_or(event.k, |m: usize| m.min(event.k)));
            suda[event.row] += msu_weight(att, event.k);
            fk[event.row] = Some(fk[event.row].map_or(event.fk, |f: u32| f.min(event.fk)));
            fm[event.row] += 1;
        }
    }
    ScoreTable {
        rows: kept_rows.to_vec(),
        msu,
        suda,
        dis_suda: vec![0.0; n_rows],
        fk,
        fm,
    }
}

// Rescale raw scores by the dataset-level disclosure factor. U counts rows
// whose full-Q combination occurs exactly once, P counts rows in groups of
// two or more; missing cells count as ordinary key values here.
fn normalize(columns: &[QiColumn], n_rows: usize, sample_fraction: f64, result: &mut ScoreTable) {
    let mut groups: HashMap<Vec<CellKey>, u32> = HashMap::new();
    for row in 0..n_rows {
        let key: Vec<CellKey> = columns.iter().map(|c| c.key_with_missing(row)).collect();
        *groups.entry(key).or_insert(0) += 1;
    }
    let mut unique = 0u64;
    let mut duplicated = 0u64;
    for &count in groups.values() {
        if count == 1 {
            unique += 1;
        } else {
            duplicated += count as u64;
        }
    }

    let denominator =
        unique as f64 * sample_fraction + duplicated as f64 * (1.0 - sample_fraction);
    let dis = if denominator > 0.0 {
        unique as f64 * sample_fraction / denominator
    } else {
        0.0
    };
    info!(
        "Global uniques U = {}, duplicated P = {}, DIS = {:.6}",
        unique, duplicated, dis
    );

    let total: f64 = result.suda.iter().sum();
    let scale = if total > 0.0 { dis / total } else { 0.0 };
    for (dis_suda, &suda) in result.dis_suda.iter_mut().zip(result.suda.iter()) {
        if suda > 0.0 {
            *dis_suda = suda * scale;
        }
    }
}
