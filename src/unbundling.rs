/*! Unbundling

Reverses bundling on downloaded batch results: every field whose name ends with a position
(`text_2`, `Answer.label_2`) goes to the item at that position, with the suffix removed.
Fields without a position (worker id, durations...) are shared and copied into every item.
!*/
use std::collections::BTreeMap;

use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;
use serde_json::Value;

use crate::error::Error;
use crate::item::Item;

/// Name of the optional field holding the position of an item in its bundle.
pub const SEQUENCE_ID: &str = "sequenceID";

lazy_static! {
    static ref UNDERSCORE_SUFFIX: Regex = Regex::new(r"(?i)^(.+)_([0-9]+)$").unwrap();
    static ref PLAIN_SUFFIX: Regex = Regex::new(r"(?i)^(.*[^0-9])([0-9]+)$").unwrap();
}

/// Bursts bundle records back into items.
#[derive(Debug, Clone)]
pub struct Unbundler {
    plain: bool,
    add_sequence_id: bool,
}

impl Unbundler {
    /// `plain`: split any trailing digits, not only `_<digits>`.
    pub fn new(plain: bool, add_sequence_id: bool) -> Self {
        Self {
            plain,
            add_sequence_id,
        }
    }

    fn split_key<'k>(&self, key: &'k str) -> Option<(&'k str, usize)> {
        let re: &Regex = if self.plain {
            &PLAIN_SUFFIX
        } else {
            &UNDERSCORE_SUFFIX
        };
        let caps = re.captures(key)?;
        let name = caps.get(1)?.as_str();
        let index = caps.get(2)?.as_str().parse().ok()?;
        Some((name, index))
    }

    /// Split a bundle into positioned fields and shared fields.
    ///
    /// Position 0 is not a valid position and is kept as a shared field.
    pub fn burst(&self, bundle: Item) -> (BTreeMap<usize, Item>, Item) {
        let mut burst: BTreeMap<usize, Item> = BTreeMap::new();
        let mut shared = Item::new();
        for (key, value) in bundle {
            match self.split_key(&key) {
                Some((name, index)) if index > 0 => {
                    burst.entry(index).or_default().insert(name, value);
                }
                _ => {
                    shared.insert(key, value);
                }
            }
        }
        (burst, shared)
    }

    /// Turn one bundle into its items, in position order.
    ///
    /// A bundle without positioned fields gives a single item made of the shared fields.
    pub fn unbundle(&self, bundle: Item) -> Vec<Item> {
        let (burst, shared) = self.burst(bundle);
        if burst.is_empty() {
            return vec![shared];
        }
        burst
            .into_iter()
            .map(|(index, mut item)| {
                if self.add_sequence_id {
                    item.insert(SEQUENCE_ID, Value::from(index));
                }
                for (key, value) in shared.iter() {
                    if let Some(previous) = item.get(key) {
                        warn!("collision: {}={} {}_n={}", key, value, key, previous);
                    }
                    item.insert(key.clone(), value.clone());
                }
                item
            })
            .collect()
    }

    /// Lazily unbundle a stream of bundles.
    pub fn unbundle_all<I>(&self, bundles: I) -> UnbundleIter<'_, I::IntoIter>
    where
        I: IntoIterator<Item = Result<Item, Error>>,
    {
        UnbundleIter {
            unbundler: self,
            bundles: bundles.into_iter(),
            pending: Vec::new().into_iter(),
            nb_in: 0,
            nb_out: 0,
        }
    }
}

/// Iterator returned by [Unbundler::unbundle_all].
pub struct UnbundleIter<'u, I> {
    unbundler: &'u Unbundler,
    bundles: I,
    pending: std::vec::IntoIter<Item>,
    nb_in: usize,
    nb_out: usize,
}

impl<'u, I> Iterator for UnbundleIter<'u, I>
where
    I: Iterator<Item = Result<Item, Error>>,
{
    type Item = Result<Item, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.pending.next() {
                self.nb_out += 1;
                return Some(Ok(item));
            }
            match self.bundles.next() {
                Some(Ok(bundle)) => {
                    self.nb_in += 1;
                    self.pending = self.unbundler.unbundle(bundle).into_iter();
                }
                Some(Err(e)) => return Some(Err(e)),
                None => {
                    debug!("unbundled {} bundles into {} items", self.nb_in, self.nb_out);
                    return None;
                }
            }
        }
    }
}
