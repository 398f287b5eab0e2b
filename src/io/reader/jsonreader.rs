//! JSON lines reader.
use std::io::{BufRead, Lines};

use crate::error::Error;
use crate::item::{Item, ITEM_ID};

/// Reads one JSON object per line.
///
/// Blank lines are skipped. When built with [JsonItemReader::new], every record must carry an `itemID`,
/// which is then coerced into a string.
#[derive(Debug)]
pub struct JsonItemReader<R> {
    lines: Lines<R>,
    line: usize,
    require_id: bool,
}

impl<R: BufRead> JsonItemReader<R> {
    /// Reader for items (`itemID` required).
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line: 0,
            require_id: true,
        }
    }

    /// Reader for arbitrary records, like worker responses.
    pub fn records(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line: 0,
            require_id: false,
        }
    }

    fn parse(&self, line: &str) -> Result<Item, Error> {
        let mut item: Item = serde_json::from_str(line).map_err(|source| Error::Json {
            line: self.line,
            source,
        })?;
        if self.require_id && !item.normalize_id() {
            return Err(Error::MissingField {
                line: self.line,
                field: ITEM_ID.to_string(),
            });
        }
        Ok(item)
    }
}

impl<R: BufRead> Iterator for JsonItemReader<R> {
    type Item = Result<Item, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            self.line += 1;
            if line.trim().is_empty() {
                continue;
            }
            return Some(self.parse(&line));
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn read_items() {
        let input = r#"{"itemID": 1, "text": "hello"}

{"itemID": "b", "text": "bye", "extra": {"nested": [1, 2]}}
"#;
        let items: Vec<Item> = JsonItemReader::new(input.as_bytes())
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].get("itemID"), Some(&json!("1")));
        assert_eq!(items[1].get("extra"), Some(&json!({"nested": [1, 2]})));
    }

    #[test]
    fn missing_id() {
        let input = "{\"itemID\": \"a\"}\n{\"text\": \"no id\"}\n";
        let res: Result<Vec<Item>, Error> = JsonItemReader::new(input.as_bytes()).collect();
        match res {
            Err(Error::MissingField { line, field }) => {
                assert_eq!(line, 2);
                assert_eq!(field, "itemID");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn records_do_not_need_ids() {
        let input = "{\"WorkerId\": \"w1\"}\n";
        let res: Vec<Item> = JsonItemReader::records(input.as_bytes())
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(res[0].get_str("WorkerId"), Some("w1"));
    }

    #[test]
    fn bad_json_reports_line() {
        let input = "{\"itemID\": \"a\"}\n\n{oops\n";
        let res: Result<Vec<Item>, Error> = JsonItemReader::new(input.as_bytes()).collect();
        assert!(matches!(res, Err(Error::Json { line: 3, .. })));
    }
}
