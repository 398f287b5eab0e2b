/*!
# IO utilities

Reading and writing of items, bundles and responses.

Everything is read into memory before processing: files are small (a few thousand items at most),
and bundling needs the full pools anyway.
!*/
pub mod reader;
pub mod writer;

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::Error;

/// Open `path` for buffered reading, `-` or no path meaning stdin.
pub fn open_input(path: Option<&Path>) -> Result<Box<dyn BufRead>, Error> {
    match path {
        Some(p) if p != Path::new("-") => Ok(Box::new(BufReader::new(File::open(p)?))),
        _ => Ok(Box::new(BufReader::new(io::stdin()))),
    }
}

/// Open `path` for buffered writing, `-` or no path meaning stdout.
pub fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>, Error> {
    match path {
        Some(p) if p != Path::new("-") => Ok(Box::new(BufWriter::new(File::create(p)?))),
        _ => Ok(Box::new(BufWriter::new(io::stdout()))),
    }
}
