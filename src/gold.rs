/*! Gold items

Gold (or control) items have a known answer and are mixed into bundles to measure worker quality.
This module splits them from the main pool and turns a user-provided gold rate into a control rate.
!*/
use std::collections::HashSet;
use std::io::BufRead;

use log::{info, warn};
use serde_json::Value;

use crate::error::Error;
use crate::item::{Item, IS_GOLD};

/// Result of [separate_gold].
#[derive(Debug, Default, Clone, PartialEq)]
pub struct GoldSplit {
    /// Items designated as gold, marked with `isGold`.
    pub gold: Vec<Item>,
    /// Every other item.
    pub straw: Vec<Item>,
    /// Designated (lowercased) ids that were not found in the pool, sorted.
    pub missing: Vec<String>,
}

/// Read gold item ids: the first whitespace-separated token of each non-blank line.
pub fn read_gold_ids<R: BufRead>(reader: R) -> Result<HashSet<String>, Error> {
    let mut ids = HashSet::new();
    for line in reader.lines() {
        let line = line?;
        if let Some(id) = line.split_whitespace().next() {
            ids.insert(id.to_string());
        }
    }
    Ok(ids)
}

/// Partition `items` in gold and non-gold items, matching ids case-insensitively.
///
/// Missing gold ids are reported but are not an error.
pub fn separate_gold(items: Vec<Item>, gold_ids: &HashSet<String>) -> GoldSplit {
    let gold_ids: HashSet<String> = gold_ids.iter().map(|id| id.to_lowercase()).collect();
    let total = items.len();

    let mut found = HashSet::new();
    let mut split = GoldSplit::default();
    for mut item in items {
        let id = item.id().map(|id| id.to_lowercase());
        match id {
            Some(id) if gold_ids.contains(&id) => {
                item.insert(IS_GOLD, Value::from(1));
                split.gold.push(item);
                found.insert(id);
            }
            _ => split.straw.push(item),
        }
    }
    info!(
        "{} gold found, {} test items ({})",
        split.gold.len(),
        split.straw.len(),
        total
    );

    let mut missing: Vec<String> = gold_ids.difference(&found).cloned().collect();
    missing.sort();
    if !missing.is_empty() {
        warn!(
            "{} gold IDs not found (e.g. {})",
            missing.len(),
            missing.iter().take(3).cloned().collect::<Vec<_>>().join(" ")
        );
    }
    split.missing = missing;
    split
}

/// Turn a gold rate into a control rate for `n`-bundles.
///
/// The rate can be a fraction, or a number of gold items per bundle when >= 1.
/// No rate (or `"1"`) means one gold item per bundle.
pub fn compute_gold_rate(gold_rate: Option<&str>, n: usize) -> Result<f64, Error> {
    let rate = match gold_rate.map(str::trim) {
        None | Some("1") => 1.0 / n as f64,
        Some(raw) => {
            let rate: f64 = raw.parse()?;
            if rate >= 1.0 {
                if rate >= n as f64 {
                    warn!("gold rate > n ({} > {})", rate, n);
                }
                rate / n as f64
            } else {
                rate
            }
        }
    };
    info!("gold rate = {:.2}", rate);
    Ok(rate)
}

/// Drop items whose `itemID` has already been seen. First occurrence wins.
pub fn uniquify(items: Vec<Item>) -> Vec<Item> {
    let mut seen = HashSet::new();
    let before = items.len();
    let unique: Vec<Item> = items
        .into_iter()
        .filter(|item| seen.insert(item.id()))
        .collect();
    let dropped = before - unique.len();
    if dropped > 0 {
        info!("dropped {} duplicate itemIDs", dropped);
    }
    unique
}
