/*! Record reading utilities

All readers implement [Iterator], yielding `Result<Item, Error>`.

- [JsonItemReader]: one JSON object per line.
- [TabItemReader]: tab-separated values with a header.
- [BatchReader]: CSV batch results, as downloaded from the crowdsourcing platform.
!*/
mod jsonreader;
mod tabreader;

pub use jsonreader::JsonItemReader;
pub use tabreader::{BatchReader, TabItemReader};
