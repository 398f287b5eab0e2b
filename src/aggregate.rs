/*! Naive Bayes response aggregation

Combines several workers' yes/no responses on an item into a single answer.

Worker reliability is learnt on keyed items (items with a reference answer): for each worker,
a smoothed 2x2 contingency table of (response, reference) gives one Bayes factor per response.
An item's score is then the sum of the log Bayes factors of its responses, on top of a log prior.
!*/
use std::collections::{HashMap, HashSet};
use std::io::{BufRead, Read};

use csv::ReaderBuilder;
use log::{debug, info, warn};
use serde_json::json;

use crate::error::Error;
use crate::item::{value_to_text, Item};

/// Worker id field of responses.
pub const WORKER_ID: &str = "WorkerId";

/// Worker id used in aggregated output.
pub const AGGREGATOR_ID: &str = "NaiveBayes";

/// Binary label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Label {
    Yes,
    No,
}

impl Label {
    /// Case-insensitive comparison against the `yes` value, anything else being [Label::No].
    pub fn normalize(answer: &str, yes: &str) -> Self {
        if answer.to_lowercase() == yes.to_lowercase() {
            Label::Yes
        } else {
            Label::No
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Yes => "yes",
            Label::No => "no",
        }
    }
}

/// One worker's answer on one item.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub worker: String,
    pub item: String,
    /// [None] for skipped (missing) answers.
    pub answer: Option<Label>,
}

/// Options for reading responses.
#[derive(Debug, Clone)]
pub struct ResponseFields {
    /// Field holding the item id.
    pub item_ref: String,
    /// Field holding the answer.
    pub answer_ref: String,
    /// Value interpreted as "yes", all others being "no".
    pub yes: String,
    /// Value substituted to missing answers. Missing answers are skipped otherwise.
    pub missing: Option<String>,
}

impl Default for ResponseFields {
    fn default() -> Self {
        Self {
            item_ref: "Input.itemID".to_string(),
            answer_ref: "Answer.answer".to_string(),
            yes: "yes".to_string(),
            missing: None,
        }
    }
}

/// Read the answer key: tab-separated `itemID label` lines, without header.
pub fn read_key<R: Read>(reader: R, yes: &str) -> Result<HashMap<String, Label>, Error> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);
    let mut keys = HashMap::new();
    for record in rdr.records() {
        let record = record?;
        let (id, label) = match (record.get(0), record.get(1)) {
            (Some(id), Some(label)) => (id, label),
            _ => continue,
        };
        if label.is_empty() {
            debug!("no label in key for {}", id);
            continue;
        }
        let label = Label::normalize(label, yes);
        if keys.insert(id.to_string(), label).is_some() {
            warn!("duplicate entries in key for {}", id);
        }
    }
    info!(
        "read {} keys ({} \"yes\")",
        keys.len(),
        keys.values().filter(|l| **l == Label::Yes).count()
    );
    Ok(keys)
}

/// Read a list of ids: first whitespace-separated token of each non-blank line.
pub fn read_id_list<R: BufRead>(reader: R) -> Result<HashSet<String>, Error> {
    let mut ids = HashSet::new();
    for line in reader.lines() {
        if let Some(id) = line?.split_whitespace().next() {
            ids.insert(id.to_string());
        }
    }
    Ok(ids)
}

/// Turn response records into [Response]s.
pub fn to_responses<I>(records: I, fields: &ResponseFields) -> Result<Vec<Response>, Error>
where
    I: IntoIterator<Item = Result<Item, Error>>,
{
    let mut responses = Vec::new();
    for (line, record) in records.into_iter().enumerate() {
        let record = record?;
        let field = |name: &str| -> Result<String, Error> {
            record
                .get(name)
                .map(value_to_text)
                .ok_or_else(|| Error::MissingField {
                    line: line + 1,
                    field: name.to_string(),
                })
        };
        let worker = field(WORKER_ID)?;
        let item = field(fields.item_ref.as_str())?;
        let answer = match record.get(&fields.answer_ref).map(value_to_text) {
            Some(answer) if !answer.is_empty() => Some(answer),
            _ => fields.missing.clone(),
        };
        responses.push(Response {
            worker,
            item,
            answer: answer.map(|a| Label::normalize(&a, &fields.yes)),
        });
    }
    info!(
        "read {} responses ({} items, {} \"yes\", {} empty)",
        responses.len(),
        responses.iter().map(|r| &r.item).collect::<HashSet<_>>().len(),
        responses
            .iter()
            .filter(|r| r.answer == Some(Label::Yes))
            .count(),
        responses.iter().filter(|r| r.answer.is_none()).count()
    );
    Ok(responses)
}

/// Smoothed (response, reference) counts of a worker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contingency {
    /// yes/yes
    pub a: f64,
    /// yes/no
    pub b: f64,
    /// no/yes
    pub c: f64,
    /// no/no
    pub d: f64,
}

impl Default for Contingency {
    /// Additive smoothing: every cell starts at 1.
    fn default() -> Self {
        Self {
            a: 1.0,
            b: 1.0,
            c: 1.0,
            d: 1.0,
        }
    }
}

impl Contingency {
    fn add(&mut self, answer: Label, reference: Label) {
        match (answer, reference) {
            (Label::Yes, Label::Yes) => self.a += 1.0,
            (Label::Yes, Label::No) => self.b += 1.0,
            (Label::No, Label::Yes) => self.c += 1.0,
            (Label::No, Label::No) => self.d += 1.0,
        }
    }

    /// Log Bayes factors for a "yes" and a "no" response.
    pub fn log_factors(&self) -> BayesFactors {
        let Self { a, b, c, d } = *self;
        let yes = (a / (a + c)) / (b / (b + d));
        let no = (c / (a + c)) / (d / (b + d));
        BayesFactors {
            yes: yes.ln(),
            no: no.ln(),
        }
    }
}

/// Log Bayes factors of a worker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BayesFactors {
    pub yes: f64,
    pub no: f64,
}

impl BayesFactors {
    pub fn get(&self, label: Label) -> f64 {
        match label {
            Label::Yes => self.yes,
            Label::No => self.no,
        }
    }
}

/// Aggregated answer for an item.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub item: String,
    pub answer: Label,
    /// Logistic of the summed log factors.
    pub score: f64,
}

impl Aggregate {
    /// JSON record, using the same field names as the responses.
    pub fn to_item(&self, fields: &ResponseFields) -> Item {
        let mut out = Item::new();
        out.insert(WORKER_ID, AGGREGATOR_ID);
        out.insert(fields.item_ref.clone(), self.item.clone());
        out.insert(fields.answer_ref.clone(), self.answer.as_str());
        out.insert("Answer.score", json!(self.score));
        out
    }
}

pub fn logistic(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Naive Bayes aggregator, holding per-worker Bayes factors.
#[derive(Debug, Clone, Default)]
pub struct NaiveBayes {
    factors: HashMap<String, BayesFactors>,
}

impl NaiveBayes {
    /// Learn Bayes factors from responses on keyed items.
    pub fn train(references: &HashMap<String, Label>, responses: &[Response]) -> Self {
        let mut tables: HashMap<String, Contingency> = HashMap::new();
        for response in responses {
            if let (Some(answer), Some(reference)) = (response.answer, references.get(&response.item)) {
                tables
                    .entry(response.worker.clone())
                    .or_default()
                    .add(answer, *reference);
            }
        }
        let factors = tables
            .into_iter()
            .map(|(worker, table)| (worker, table.log_factors()))
            .collect();
        Self { factors }
    }

    pub fn factors(&self, worker: &str) -> Option<&BayesFactors> {
        self.factors.get(worker)
    }

    /// Sum log factors per item, starting from `log_prior`.
    ///
    /// Items are returned in order of their first usable response. Responses from unknown workers
    /// (or without answer) are ignored, so an item with no usable response is left out.
    pub fn aggregate(&self, responses: &[Response], log_prior: f64) -> Vec<Aggregate> {
        let mut order: Vec<&str> = Vec::new();
        let mut scores: HashMap<&str, f64> = HashMap::new();
        let mut nb_missing = 0;

        for response in responses {
            let factor = match (self.factors.get(&response.worker), response.answer) {
                (Some(factors), Some(answer)) => Some(factors.get(answer)),
                _ => None,
            };
            match factor {
                Some(factor) => {
                    let item = response.item.as_str();
                    let score = scores.entry(item).or_insert_with(|| {
                        order.push(item);
                        log_prior
                    });
                    *score += factor;
                }
                None => {
                    debug!(
                        "missing factor for worker/response {}/{:?}",
                        response.worker, response.answer
                    );
                    nb_missing += 1;
                }
            }
        }
        info!("{} responses ignored for lack of Bayes factors", nb_missing);

        order
            .into_iter()
            .map(|item| {
                let score = scores.get(item).copied().unwrap_or(log_prior);
                Aggregate {
                    item: item.to_string(),
                    answer: if score > 0.0 { Label::Yes } else { Label::No },
                    score: logistic(score),
                }
            })
            .collect()
    }
}

/// Keep only responses on `item_ids`, when not empty.
pub fn restrict(responses: Vec<Response>, item_ids: &HashSet<String>) -> Vec<Response> {
    if item_ids.is_empty() {
        return responses;
    }
    info!("restricting to {} item IDs", item_ids.len());
    responses
        .into_iter()
        .filter(|r| item_ids.contains(&r.item))
        .collect()
}

/// Warn when none of the control ids has a reference answer.
pub fn check_controls(control_ids: &HashSet<String>, references: &HashMap<String, Label>) {
    info!("read {} control IDs", control_ids.len());
    if control_ids.iter().all(|id| !references.contains_key(id)) {
        warn!("no supervision for controls");
    }
}

#[cfg(test)]
mod tests {
    use crate::io::reader::JsonItemReader;

    use super::*;

    fn response(worker: &str, item: &str, answer: Option<Label>) -> Response {
        Response {
            worker: worker.to_string(),
            item: item.to_string(),
            answer,
        }
    }

    #[test]
    fn key_file() {
        let input = "a\tYes\nb\tno\nc\tmaybe\na\tno\n";
        let keys = read_key(input.as_bytes(), "yes").unwrap();
        assert_eq!(keys.len(), 3);
        // last one wins
        assert_eq!(keys["a"], Label::No);
        assert_eq!(keys["c"], Label::No);
    }

    #[test]
    fn unlabelled_keys_are_skipped() {
        let keys = read_key("a\t\nb\tyes\n".as_bytes(), "yes").unwrap();
        assert_eq!(keys.len(), 1);
        assert!(!keys.contains_key("a"));
        assert_eq!(keys["b"], Label::Yes);
    }

    #[test]
    fn items_without_factors_are_left_out() {
        let refs: HashMap<String, Label> = [("k1".to_string(), Label::Yes)].into_iter().collect();
        let responses = vec![
            response("good", "k1", Some(Label::Yes)),
            response("stranger", "x", Some(Label::Yes)),
            response("good", "y", None),
        ];
        let nb = NaiveBayes::train(&refs, &responses);
        let agg = nb.aggregate(&responses, 0.0);
        let items: Vec<&str> = agg.iter().map(|a| a.item.as_str()).collect();
        assert_eq!(items, vec!["k1"]);
    }

    #[test]
    fn factors() {
        // perfect worker on 2 yes, 2 no items: a=3 b=1 c=1 d=3
        let t = Contingency {
            a: 3.0,
            b: 1.0,
            c: 1.0,
            d: 3.0,
        };
        let f = t.log_factors();
        assert!((f.yes - 3f64.ln()).abs() < 1e-12);
        assert!((f.no - (1.0f64 / 3.0).ln()).abs() < 1e-12);
    }

    #[test]
    fn reliable_worker_wins() {
        use Label::*;
        let refs: HashMap<String, Label> = [("k1", Yes), ("k2", No), ("k3", Yes), ("k4", No)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        let mut responses = vec![];
        // good agrees with the key, bad disagrees
        for (k, v) in [("k1", Yes), ("k2", No), ("k3", Yes), ("k4", No)] {
            responses.push(response("good", k, Some(v)));
            let flipped = if v == Yes { No } else { Yes };
            responses.push(response("bad", k, Some(flipped)));
        }
        responses.push(response("good", "x", Some(Yes)));
        responses.push(response("bad", "x", Some(Yes)));
        responses.push(response("stranger", "x", Some(No)));

        let nb = NaiveBayes::train(&refs, &responses);
        assert!(nb.factors("stranger").is_none());
        let agg = nb.aggregate(&responses, 0.0);
        assert_eq!(agg[0].item, "k1");
        let x = agg.iter().find(|a| a.item == "x").unwrap();
        // good says yes (+ln 3), bad says yes (-ln 3), stranger has no factor
        assert!((x.score - 0.5).abs() < 1e-9);
        assert_eq!(x.answer, No);
        let k1 = agg.iter().find(|a| a.item == "k1").unwrap();
        assert_eq!(k1.answer, Yes);
        assert!((k1.score - logistic(2.0 * 3f64.ln())).abs() < 1e-9);
    }

    #[test]
    fn responses_from_json() {
        let input = r#"{"WorkerId": "w1", "Input.itemID": "a", "Answer.answer": "YES"}
{"WorkerId": "w2", "Input.itemID": "a", "Answer.answer": ""}
{"WorkerId": "w3", "Input.itemID": "b"}
"#;
        let fields = ResponseFields::default();
        let responses =
            to_responses(JsonItemReader::records(input.as_bytes()), &fields).unwrap();
        assert_eq!(responses[0].answer, Some(Label::Yes));
        assert_eq!(responses[1].answer, None);
        assert_eq!(responses[2].answer, None);

        let fields = ResponseFields {
            missing: Some("no".to_string()),
            ..Default::default()
        };
        let responses =
            to_responses(JsonItemReader::records(input.as_bytes()), &fields).unwrap();
        assert_eq!(responses[2].answer, Some(Label::No));
    }

    #[test]
    fn output_record() {
        let agg = Aggregate {
            item: "a".to_string(),
            answer: Label::Yes,
            score: 0.75,
        };
        let item = agg.to_item(&ResponseFields::default());
        assert_eq!(item.get_str("WorkerId"), Some("NaiveBayes"));
        assert_eq!(item.get_str("Input.itemID"), Some("a"));
        assert_eq!(item.get_str("Answer.answer"), Some("yes"));
        assert_eq!(item.get("Answer.score"), Some(&json!(0.75)));
    }
}
