//! PropertyMap — the attribute store on nodes and relationships.

use std::collections::HashMap;

use super::Value;

/// A map of attribute names to values.
pub type PropertyMap = HashMap<String, Value>;

/// Build a [`PropertyMap`] from `(key, value)` pairs, e.g. for test fixtures.
pub fn property_map<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> PropertyMap
where
    K: Into<String>,
    V: Into<Value>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}
