/*! Scoring

Scores worker responses against reference answers: accuracy (raw and smoothed), abstentions,
precision/recall/F on a set of positive labels, durations, and simple pairwise agreement.
!*/
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::io::BufRead;

use itertools::Itertools;
use log::{info, warn};

use crate::aggregate::WORKER_ID;
use crate::error::Error;
use crate::item::{value_to_text, Item};

/// Raw duration field.
pub const WORK_TIME: &str = "WorkTimeInSeconds";
/// Adjusted duration field, preferred when present.
pub const ADJUSTED_WORK_TIME: &str = "AdjustedWorkTime";

/// Smoothing added to correct answers when computing smoothed accuracy.
const ACCURACY_SMOOTHING: f64 = 0.5;

/// Read reference answers: whitespace-separated `id answer` lines.
///
/// Returns the references and the number of ignored (too short) lines.
pub fn read_references<R: BufRead>(reader: R) -> Result<(HashMap<String, String>, usize), Error> {
    let mut references = HashMap::new();
    let mut nb_ignored = 0;
    for line in reader.lines() {
        let line = line?;
        let mut tokens = line.split_whitespace();
        match (tokens.next(), tokens.next()) {
            (Some(id), Some(answer)) => {
                references.insert(id.to_string(), answer.to_string());
            }
            _ => nb_ignored += 1,
        }
    }
    if nb_ignored > 0 {
        warn!("ignored {} odd (missing?) references", nb_ignored);
    }
    Ok((references, nb_ignored))
}

/// A response, as seen by the scorer.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredResponse {
    pub worker: String,
    pub item: String,
    /// [None] when the worker abstained.
    pub answer: Option<String>,
    pub work_time: Option<f64>,
    pub adjusted_work_time: Option<f64>,
}

fn parse_duration(record: &Item, key: &str) -> Result<Option<f64>, Error> {
    match record.get(key).map(value_to_text) {
        Some(text) if !text.trim().is_empty() => Ok(Some(text.trim().parse()?)),
        _ => Ok(None),
    }
}

/// Extract responses from records.
///
/// Empty answers are replaced by `abstain` when provided, and count as abstentions otherwise.
pub fn to_scored_responses<I>(
    records: I,
    item_ref: &str,
    answer_ref: &str,
    abstain: Option<&str>,
) -> Result<Vec<ScoredResponse>, Error>
where
    I: IntoIterator<Item = Result<Item, Error>>,
{
    let mut responses = Vec::new();
    for (idx, record) in records.into_iter().enumerate() {
        let record = record?;
        let required = |key: &str| {
            record
                .get(key)
                .map(value_to_text)
                .ok_or_else(|| Error::MissingField {
                    line: idx + 1,
                    field: key.to_string(),
                })
        };
        let worker = required(WORKER_ID)?;
        let item = required(item_ref)?;
        let answer = match record.get(answer_ref).map(value_to_text) {
            Some(answer) if !answer.is_empty() => Some(answer),
            _ => abstain.map(str::to_string),
        };
        responses.push(ScoredResponse {
            worker,
            item,
            answer,
            work_time: parse_duration(&record, WORK_TIME)?,
            adjusted_work_time: parse_duration(&record, ADJUSTED_WORK_TIME)?,
        });
    }
    info!("read {} responses", responses.len());
    Ok(responses)
}

/// Counts for a worker, or for everyone.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Tally {
    /// Responses on referenced items.
    pub total: f64,
    pub correct: f64,
    pub abstentions: f64,
    pub recall_denominator: f64,
    pub precision_denominator: f64,
    pub pr_numerator: f64,
    /// Every response, referenced or not.
    pub total_items: f64,
    pub duration: f64,
}

impl Tally {
    /// `(correct + 0.5) / (total + 1)`
    pub fn smoothed_accuracy(&self) -> f64 {
        (self.correct + ACCURACY_SMOOTHING) / (self.total + 1.0)
    }

    /// F-measure, when there is something to compute it on.
    pub fn f_measure(&self) -> Option<f64> {
        let denominator = self.precision_denominator + self.recall_denominator;
        if denominator > 0.0 {
            Some(2.0 * self.pr_numerator / denominator)
        } else {
            None
        }
    }
}

/// Scores of a set of responses against references.
#[derive(Debug, Clone, Default)]
pub struct Report {
    pub overall: Tally,
    pub workers: BTreeMap<String, Tally>,
    pub durations: Vec<f64>,
    pub adjusted_durations: Vec<f64>,
    /// Whether precision/recall were computed.
    pub with_pr: bool,
}

/// Score `responses` against `references`.
///
/// Answers are compared case-insensitively. `pr_answers` are the "positive" labels used for
/// precision and recall; leave empty to skip them.
pub fn score(
    responses: &[ScoredResponse],
    references: &HashMap<String, String>,
    pr_answers: &HashSet<String>,
) -> Report {
    let pr_answers: HashSet<String> = pr_answers.iter().map(|a| a.to_lowercase()).collect();
    let mut report = Report {
        with_pr: !pr_answers.is_empty(),
        ..Default::default()
    };

    for response in responses {
        let worker = report.workers.entry(response.worker.clone()).or_default();
        if let Some(reference) = references.get(&response.item) {
            let reference = reference.to_lowercase();
            let answer = response.answer.as_ref().map(|a| a.to_lowercase());
            let correct = answer.as_deref() == Some(reference.as_str());
            let ref_positive = pr_answers.contains(&reference);
            let answer_positive = answer
                .as_ref()
                .map(|a| pr_answers.contains(a))
                .unwrap_or(false);

            for tally in [&mut report.overall, &mut *worker] {
                tally.total += 1.0;
                if correct {
                    tally.correct += 1.0;
                }
                if ref_positive {
                    tally.recall_denominator += 1.0;
                }
                if answer_positive {
                    tally.precision_denominator += 1.0;
                    if correct {
                        tally.pr_numerator += 1.0;
                    }
                }
            }
            if answer.is_none() {
                worker.abstentions += 1.0;
            }
        }

        worker.total_items += 1.0;
        match response.adjusted_work_time {
            Some(adjusted) => {
                worker.duration += adjusted;
                report.adjusted_durations.push(adjusted);
            }
            None => worker.duration += response.work_time.unwrap_or_default(),
        }
        if let Some(raw) = response.work_time {
            report.durations.push(raw);
        }
    }

    if !report.adjusted_durations.is_empty() {
        info!("using adjusted durations");
        if report.adjusted_durations.len() != report.durations.len() {
            warn!("mix of raw and adjusted durations");
        }
    }
    report
}

/// Median of `values`, [None] when empty.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let sorted: Vec<f64> = values
        .iter()
        .copied()
        .sorted_by(|a, b| a.total_cmp(b))
        .collect();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Average of `num/denom` ratios (skipping zero denominators), followed by a note:
/// the ratio itself when there is only one, the number of averaged ratios otherwise.
///
/// `figure` overrides the computed average.
pub fn pretty_ratio(ratios: &[(f64, f64)], figure: Option<f64>) -> String {
    let valid: Vec<f64> = ratios
        .iter()
        .filter(|(_, denom)| *denom > 0.0)
        .map(|(num, denom)| num / denom)
        .collect();
    if valid.is_empty() {
        return format!("{:>8} {:11}", "---", "");
    }
    let figure = figure.unwrap_or_else(|| valid.iter().sum::<f64>() / valid.len() as f64);
    let note = match ratios {
        [(num, denom)] => format!("({} / {})", num, denom),
        [] => String::new(),
        _ => format!("(avg of {})", valid.len()),
    };
    format!("{:8.3} {:<11}", figure, note)
}

impl Report {
    /// Workers sorted by decreasing (smoothed accuracy, total).
    pub fn ranked_workers(&self) -> Vec<(&String, &Tally)> {
        self.workers
            .iter()
            .sorted_by(|(_, a), (_, b)| {
                (b.smoothed_accuracy(), b.total)
                    .partial_cmp(&(a.smoothed_accuracy(), a.total))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .collect()
    }

    fn durations_for_median(&self) -> &[f64] {
        if self.adjusted_durations.is_empty() {
            &self.durations
        } else {
            &self.adjusted_durations
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tallies: Vec<&Tally> = self.workers.values().collect();
        let per_worker = |g: fn(&Tally) -> (f64, f64)| -> Vec<(f64, f64)> {
            tallies.iter().map(|t| g(t)).collect()
        };

        writeln!(f, "======== Overall")?;
        writeln!(f, "{:>20} {:4}", "Total Turkers", self.workers.len())?;
        writeln!(
            f,
            "{:>20} {}",
            "Avg response",
            pretty_ratio(&[(self.overall.correct, self.overall.total)], None)
        )?;
        writeln!(
            f,
            "{:>20} {}",
            "Avg Turker",
            pretty_ratio(&per_worker(|t| (t.correct, t.total)), None)
        )?;
        let accuracies: Vec<f64> = tallies
            .iter()
            .filter(|t| t.total > 0.0)
            .map(|t| t.correct / t.total)
            .collect();
        writeln!(
            f,
            "{:>20} {:8.3}",
            "Median Turker",
            median(&accuracies).unwrap_or(0.0)
        )?;
        writeln!(
            f,
            "{:>20} {}",
            "Avg Duration",
            pretty_ratio(&per_worker(|t| (t.duration, t.total_items)), None)
        )?;
        let durations = self.durations_for_median();
        writeln!(
            f,
            "{:>20} {:8.3} (of {})",
            "Median Duration",
            median(durations).unwrap_or(0.0),
            durations.len()
        )?;

        if self.with_pr {
            let o = &self.overall;
            writeln!(
                f,
                "{:>20} {}",
                "Avg Precision",
                pretty_ratio(&per_worker(|t| (t.pr_numerator, t.precision_denominator)), None)
            )?;
            writeln!(
                f,
                "{:>20} {}",
                "Avg Recall",
                pretty_ratio(&per_worker(|t| (t.pr_numerator, t.recall_denominator)), None)
            )?;
            writeln!(
                f,
                "{:>20} {}",
                "Overall Precision",
                pretty_ratio(&[(o.pr_numerator, o.precision_denominator)], None)
            )?;
            writeln!(
                f,
                "{:>20} {}",
                "Overall Recall",
                pretty_ratio(&[(o.pr_numerator, o.recall_denominator)], None)
            )?;
        }

        writeln!(
            f,
            "{:<20}  {:<18}  {:<18}  {:<18}  {:<9}  {:<8}  {:<8}",
            "======== Individual", "Smoothed accuracy", "Precision  ", "Recall  ", "F  ", "Duration", "Abstains"
        )?;
        for (worker, t) in self.ranked_workers() {
            write!(
                f,
                "{:>20}{}",
                worker,
                pretty_ratio(&[(t.correct, t.total)], Some(t.smoothed_accuracy()))
            )?;
            if self.with_pr {
                write!(
                    f,
                    "{}{}",
                    pretty_ratio(&[(t.pr_numerator, t.precision_denominator)], None),
                    pretty_ratio(&[(t.pr_numerator, t.recall_denominator)], None)
                )?;
                match t.f_measure() {
                    Some(fm) => write!(f, "{:8.3} ", fm)?,
                    None => write!(f, "{:9}", "")?,
                }
            }
            if t.total_items > 0.0 {
                write!(f, "{:10.1}", t.duration / t.total_items)?;
            }
            if t.abstentions > 0.0 && t.total_items > 0.0 {
                writeln!(f, "{:8.3}", t.abstentions / t.total_items)?;
            } else {
                writeln!(f, "{:8}", "")?;
            }
        }
        Ok(())
    }
}

/// Agreement between two workers over the items they both answered.
#[derive(Debug, Clone, PartialEq)]
pub struct PairAgreement {
    pub first: String,
    pub second: String,
    pub agreed: usize,
    pub total: usize,
}

/// Raw pairwise agreement. Pairs are ordered (`first < second`) and sorted.
///
/// When a worker answered an item several times, the last answer is used.
pub fn interannotator(responses: &[ScoredResponse]) -> Vec<PairAgreement> {
    let mut by_item: HashMap<&str, BTreeMap<&str, Option<&str>>> = HashMap::new();
    for response in responses {
        by_item
            .entry(response.item.as_str())
            .or_default()
            .insert(response.worker.as_str(), response.answer.as_deref());
    }

    let mut pairs: BTreeMap<(&str, &str), (usize, usize)> = BTreeMap::new();
    for answers in by_item.values() {
        for ((w1, a1), (w2, a2)) in answers.iter().tuple_combinations() {
            let entry = pairs.entry((*w1, *w2)).or_default();
            entry.1 += 1;
            if a1 == a2 {
                entry.0 += 1;
            }
        }
    }

    pairs
        .into_iter()
        .map(|((first, second), (agreed, total))| PairAgreement {
            first: first.to_string(),
            second: second.to_string(),
            agreed,
            total,
        })
        .collect()
}

/// Pairwise agreement table, one line per pair and a closing average.
pub struct AgreementTable<'a>(pub &'a [PairAgreement]);

impl fmt::Display for AgreementTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\n========== Simple interannotator agreement")?;
        for pair in self.0 {
            writeln!(
                f,
                "{:>15} {:<15} {}",
                pair.first,
                pair.second,
                pretty_ratio(&[(pair.agreed as f64, pair.total as f64)], None)
            )?;
        }
        let ratios: Vec<(f64, f64)> = self
            .0
            .iter()
            .map(|p| (p.agreed as f64, p.total as f64))
            .collect();
        writeln!(f, "{:>31} {}", "Average", pretty_ratio(&ratios, None))
    }
}
