//! Error enum
use std::fmt;
use std::num::ParseFloatError;

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Serde(serde_json::Error),
    Csv(csv::Error),
    Regex(regex::Error),
    ParseFloat(ParseFloatError),
    /// Invalid combination of parameters, detected before any output is produced.
    Config(String),
    /// A record is lacking a field the tool cannot do without.
    MissingField {
        line: usize,
        field: String,
    },
    /// A JSON line that could not be parsed.
    Json {
        line: usize,
        source: serde_json::Error,
    },
    Custom(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "io error: {}", e),
            Error::Serde(e) => write!(f, "json error: {}", e),
            Error::Csv(e) => write!(f, "csv error: {}", e),
            Error::Regex(e) => write!(f, "regex error: {}", e),
            Error::ParseFloat(e) => write!(f, "invalid number: {}", e),
            Error::Config(msg) => write!(f, "configuration error: {}", msg),
            Error::MissingField { line, field } => {
                write!(f, "line {}: missing field {:?}", line, field)
            }
            Error::Json { line, source } => write!(f, "line {}: {}", line, source),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Serde(e) => Some(e),
            Error::Csv(e) => Some(e),
            Error::Regex(e) => Some(e),
            Error::ParseFloat(e) => Some(e),
            Error::Json { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        Error::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Error {
        Error::Serde(e)
    }
}

impl From<csv::Error> for Error {
    fn from(e: csv::Error) -> Error {
        Error::Csv(e)
    }
}

impl From<regex::Error> for Error {
    fn from(e: regex::Error) -> Error {
        Error::Regex(e)
    }
}

impl From<ParseFloatError> for Error {
    fn from(e: ParseFloatError) -> Error {
        Error::ParseFloat(e)
    }
}

impl From<String> for Error {
    fn from(s: String) -> Error {
        Error::Custom(s)
    }
}
