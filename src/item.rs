/*! Items

An [Item] is one unit of annotatable work: a free-form mapping from field names to JSON values.
The only field the toolkit relies upon is `itemID`.
!*/
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name of the identifying field.
pub const ITEM_ID: &str = "itemID";

/// Name of the marker added to gold items when they are split from the main pool.
pub const IS_GOLD: &str = "isGold";

/// Free-form record identified by its `itemID` field.
///
/// Keys are kept sorted (this is what [serde_json::Map] does by default),
/// which keeps JSON output stable from one run to the other.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Item(Map<String, Value>);

impl Item {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the item identifier as a string.
    ///
    /// Numeric identifiers are stringified, other non-string values yield [None].
    pub fn id(&self) -> Option<String> {
        match self.0.get(ITEM_ID)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Coerce `itemID` into a JSON string.
    /// Returns `false` if there is no usable identifier.
    pub fn normalize_id(&mut self) -> bool {
        match self.id() {
            Some(id) => {
                self.0.insert(ITEM_ID.to_string(), Value::String(id));
                true
            }
            None => false,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Get a field as a string, if it is one.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn insert<K: Into<String>, V: Into<Value>>(&mut self, key: K, value: V) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Move every field of `self` into `target`, renamed `<field>_<position>`.
    pub fn merge_suffixed(self, position: usize, target: &mut Item) {
        for (key, value) in self.0 {
            target.0.insert(format!("{}_{}", key, position), value);
        }
    }

    /// Consume the item, returning the underlying map.
    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Item {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for Item {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Item {
    type Item = (String, Value);
    type IntoIter = serde_json::map::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Render a value as flat text: strings are kept raw, everything else is JSON-encoded.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
