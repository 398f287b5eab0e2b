//! Delimited readers: tab-separated item files and MTurk batch CSV downloads.
use std::io::Read;

use csv::{ReaderBuilder, StringRecord, StringRecordsIntoIter};
use log::debug;
use serde_json::Value;

use crate::error::Error;
use crate::item::Item;

fn to_item(headers: &StringRecord, record: &StringRecord, clean: bool) -> Item {
    headers
        .iter()
        .zip(record.iter())
        .map(|(key, value)| {
            let value = if clean {
                value
                    .chars()
                    .map(|c| if c.is_ascii_whitespace() { ' ' } else { c })
                    .collect()
            } else {
                value.to_string()
            };
            (key.to_string(), Value::String(value))
        })
        .collect()
}

/// Tab-separated values with a header row. Every value is read as a string.
///
/// Fields are split on tabs only: no quoting is interpreted.
pub struct TabItemReader<R> {
    headers: StringRecord,
    records: StringRecordsIntoIter<R>,
    nb_read: usize,
}

impl<R: Read> TabItemReader<R> {
    pub fn new(reader: R) -> Result<Self, Error> {
        let mut rdr = ReaderBuilder::new()
            .delimiter(b'\t')
            .quoting(false)
            .flexible(true)
            .from_reader(reader);
        let headers = rdr.headers()?.clone();
        Ok(Self {
            headers,
            records: rdr.into_records(),
            nb_read: 0,
        })
    }

    pub fn headers(&self) -> &StringRecord {
        &self.headers
    }
}

impl<R: Read> Iterator for TabItemReader<R> {
    type Item = Result<Item, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.records.next() {
            Some(Ok(record)) => {
                self.nb_read += 1;
                Some(Ok(to_item(&self.headers, &record, false)))
            }
            Some(Err(e)) => Some(Err(e.into())),
            None => {
                debug!("read {} tab-separated records ({:?})", self.nb_read, self.headers);
                None
            }
        }
    }
}

/// Batch results as downloaded from the crowdsourcing platform (CSV with header row).
///
/// Whitespace characters inside values (newlines, tabs..) are turned into plain spaces.
pub struct BatchReader<R> {
    headers: StringRecord,
    records: StringRecordsIntoIter<R>,
    nb_read: usize,
}

impl<R: Read> BatchReader<R> {
    pub fn new(reader: R) -> Result<Self, Error> {
        let mut rdr = ReaderBuilder::new().flexible(true).from_reader(reader);
        let headers = rdr.headers()?.clone();
        Ok(Self {
            headers,
            records: rdr.into_records(),
            nb_read: 0,
        })
    }
}

impl<R: Read> Iterator for BatchReader<R> {
    type Item = Result<Item, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.records.next() {
            Some(Ok(record)) => {
                self.nb_read += 1;
                Some(Ok(to_item(&self.headers, &record, true)))
            }
            Some(Err(e)) => Some(Err(e.into())),
            None => {
                debug!("read {} batch records", self.nb_read);
                None
            }
        }
    }
}
