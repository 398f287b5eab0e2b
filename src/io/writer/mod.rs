/*!
# Writers

- [BundleCsvWriter] writes bundles as CSV upload files, with optional per-field JSON/HTML encoding.
- [JsonItemWriter] and [TabItemWriter] write items one by one, and implement [ItemWriter].
!*/
mod bundlewriter;
mod itemwriter;
mod writertrait;

pub use bundlewriter::{html_ascii, json_ascii, BundleCsvWriter};
pub use itemwriter::{sort_columns, JsonItemWriter, TabItemWriter};
pub use writertrait::{write_items, ItemWriter};
