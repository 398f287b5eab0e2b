/*! CSV output for bundles.

Upload files for crowdsourcing platforms are CSV files with one bundle per row.
Since the header has to list every field, bundles are buffered and written at once.

Fields can be encoded in two ways before writing:

- as JSON (sorted keys, `", "`/`": "` separators, non-ASCII escaped), for structured values the task template decodes.
- as HTML (escaped, non-ASCII as numeric character references), for raw text displayed as-is.

Newlines are replaced by spaces in every value.
!*/
use std::collections::{BTreeSet, HashSet};
use std::io::{self, Write};

use csv::Writer;
use log::debug;
use serde::Serialize;
use serde_json::ser::{Formatter, Serializer};
use serde_json::Value;

use crate::error::Error;
use crate::item::{value_to_text, Item};

/// JSON layout used by task templates: `", "` and `": "` separators, and every character
/// outside printable ASCII escaped as `\uXXXX` (keys included).
struct AsciiFormatter;

impl Formatter for AsciiFormatter {
    fn begin_array_value<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        fragment: &str,
    ) -> io::Result<()> {
        for c in fragment.chars() {
            if c.is_ascii() && c != '\x7f' {
                writer.write_all(&[c as u8])?;
            } else {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }
        Ok(())
    }
}

/// JSON encoding with sorted keys, spaced separators and non-ASCII escaped as `\uXXXX`.
pub fn json_ascii(value: &Value) -> Result<String, Error> {
    let mut out = Vec::new();
    let mut ser = Serializer::with_formatter(&mut out, AsciiFormatter);
    value.serialize(&mut ser)?;
    String::from_utf8(out).map_err(|e| Error::Custom(format!("non-utf8 json output: {}", e)))
}

/// Escape `&`, `<` and `>`, and encode non-ASCII characters as numeric character references.
pub fn html_ascii(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\n' => out.push(' '),
            c if c.is_ascii() => out.push(c),
            c => out.push_str(&format!("&#{};", c as u32)),
        }
    }
    out
}

/// Writes bundle records as CSV.
pub struct BundleCsvWriter<W: Write> {
    writer: Writer<W>,
    jsonize: HashSet<String>,
    htmlize: HashSet<String>,
}

impl<W: Write> BundleCsvWriter<W> {
    /// `jsonize` and `htmlize` hold full (suffixed) field names.
    pub fn new(handle: W, jsonize: HashSet<String>, htmlize: HashSet<String>) -> Self {
        Self {
            writer: Writer::from_writer(handle),
            jsonize,
            htmlize,
        }
    }

    fn encode(&self, key: &str, value: &Value) -> Result<String, Error> {
        if self.jsonize.contains(key) {
            json_ascii(value)
        } else if self.htmlize.contains(key) {
            Ok(html_ascii(&value_to_text(value)))
        } else {
            Ok(value_to_text(value).replace('\n', " "))
        }
    }

    /// Write header (sorted union of all keys) and every record.
    /// Missing fields are left empty.
    pub fn write_all(&mut self, records: &[Item]) -> Result<(), Error> {
        let keys: BTreeSet<&String> = records.iter().flat_map(Item::keys).collect();
        debug!("writing {} records with {} columns", records.len(), keys.len());

        self.writer.write_record(&keys)?;
        for record in records {
            let row = keys
                .iter()
                .map(|key| match record.get(key) {
                    Some(value) => self.encode(key, value),
                    None => Ok(String::new()),
                })
                .collect::<Result<Vec<String>, Error>>()?;
            self.writer.write_record(&row)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
