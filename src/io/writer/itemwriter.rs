//! JSON lines and tab-separated item writers.
use std::io::Write;

use csv::{QuoteStyle, Writer, WriterBuilder};
use lazy_static::lazy_static;
use regex::Regex;

use crate::error::Error;
use crate::item::{value_to_text, Item};

use super::ItemWriter;

/// One JSON object per line, keys sorted.
pub struct JsonItemWriter<W: Write> {
    handle: W,
}

impl<W: Write> JsonItemWriter<W> {
    pub fn new(handle: W) -> Self {
        Self { handle }
    }

    pub fn into_inner(self) -> W {
        self.handle
    }
}

impl<W: Write> ItemWriter for JsonItemWriter<W> {
    fn write_item(&mut self, item: &Item) -> Result<(), Error> {
        serde_json::to_writer(&mut self.handle, item)?;
        self.handle.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Error> {
        Ok(self.handle.flush()?)
    }
}

/// Columns known to be worth looking at first, in that order.
const KNOWN_COLUMNS: [&str; 10] = [
    "itemID",
    "en",
    "fr1",
    "score1",
    "fr2",
    "score2",
    "fr3",
    "score3",
    "control_wrong",
    "control_right",
];

lazy_static! {
    static ref ANSWER_COLUMN: Regex = Regex::new(r"(?i)^answer[.]").unwrap();
    static ref INPUT_COLUMN: Regex = Regex::new(r"(?i)^input[.]").unwrap();
}

fn column_weight(key: &str) -> usize {
    if ANSWER_COLUMN.is_match(key) {
        1
    } else if INPUT_COLUMN.is_match(key) {
        2
    } else if let Some(idx) = KNOWN_COLUMNS.iter().position(|known| *known == key) {
        100 + idx
    } else {
        1000
    }
}

/// Order columns: answers, then inputs, then known columns, then everything else.
/// Ties are broken alphabetically.
pub fn sort_columns<'a, I: IntoIterator<Item = &'a String>>(keys: I) -> Vec<String> {
    let mut keys: Vec<(usize, &String)> = keys
        .into_iter()
        .map(|key| (column_weight(key), key))
        .collect();
    keys.sort();
    keys.into_iter().map(|(_, key)| key.clone()).collect()
}

/// Tab-separated output.
///
/// Columns are taken from the first written item, later items missing a column get `EMPTY`.
pub struct TabItemWriter<W: Write> {
    writer: Writer<W>,
    columns: Option<Vec<String>>,
}

impl<W: Write> TabItemWriter<W> {
    pub fn new(handle: W) -> Self {
        let writer = WriterBuilder::new()
            .delimiter(b'\t')
            .quote_style(QuoteStyle::Never)
            .flexible(true)
            .from_writer(handle);
        Self {
            writer,
            columns: None,
        }
    }
}

impl<W: Write> ItemWriter for TabItemWriter<W> {
    fn write_item(&mut self, item: &Item) -> Result<(), Error> {
        let columns = match self.columns.take() {
            Some(columns) => columns,
            None => {
                let columns = sort_columns(item.keys());
                self.writer.write_record(&columns)?;
                columns
            }
        };
        let row: Vec<String> = columns
            .iter()
            .map(|key| match item.get(key) {
                Some(value) => value_to_text(value),
                None => "EMPTY".to_string(),
            })
            .collect();
        self.columns = Some(columns);
        self.writer.write_record(&row)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Error> {
        Ok(self.writer.flush()?)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::io::writer::write_items;

    fn item(v: serde_json::Value) -> Item {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn columns_order() {
        let keys: Vec<String> = ["zeta", "Input.b", "itemID", "Answer.x", "en", "input.a"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            sort_columns(&keys),
            vec!["Answer.x", "Input.b", "input.a", "itemID", "en", "zeta"]
        );
    }

    #[test]
    fn json_lines() {
        let mut w = JsonItemWriter::new(Vec::new());
        let items = vec![Ok(item(json!({"b": 1, "a": "x"})))];
        assert_eq!(write_items(&mut w, items).unwrap(), 1);
        let out = String::from_utf8(w.into_inner()).unwrap();
        assert_eq!(out, "{\"a\":\"x\",\"b\":1}\n");
    }

    #[test]
    fn tab_output() {
        let mut out = Vec::new();
        {
            let mut w = TabItemWriter::new(&mut out);
            let items = vec![
                Ok(item(json!({"itemID": "a", "Answer.q": "yes", "n": 3}))),
                Ok(item(json!({"itemID": "b"}))),
            ];
            write_items(&mut w, items).unwrap();
        }
        let out = String::from_utf8(out).unwrap();
        assert_eq!(out, "Answer.q\titemID\tn\nyes\ta\t3\nEMPTY\tb\tEMPTY\n");
    }
}
