//! Key/value pairs shared by labels, params and selectors.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Maximum byte length of a key or value (matches the column width).
pub const MAX_KV_LEN: usize = 255;

/// The three globally de-duplicated pair entities.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KvKind {
    Label,
    Param,
    Selector,
}

impl KvKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Label => "label",
            Self::Param => "param",
            Self::Selector => "selector",
        }
    }
}

impl fmt::Display for KvKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single `(key, value)` pair.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Validate the pair for the given entity kind.
    ///
    /// Selector values must be non-empty since an empty selector value can
    /// never be addressed by a discovery path.
    pub fn validate(&self, kind: KvKind) -> Result<()> {
        let invalid = |reason: String| Error::InvalidKeyValue {
            kind: kind.as_str(),
            reason,
        };

        if self.key.is_empty() {
            return Err(invalid("key must not be empty".to_string()));
        }
        if self.key.len() > MAX_KV_LEN {
            return Err(invalid(format!(
                "key '{}...' exceeds {MAX_KV_LEN} bytes",
                truncate(&self.key)
            )));
        }
        if self.value.len() > MAX_KV_LEN {
            return Err(invalid(format!(
                "value for key '{}' exceeds {MAX_KV_LEN} bytes",
                truncate(&self.key)
            )));
        }
        if kind == KvKind::Selector && self.value.is_empty() {
            return Err(invalid(format!(
                "value for key '{}' must not be empty",
                self.key
            )));
        }
        Ok(())
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Convert a map into a sorted, validated list of pairs.
pub fn pairs_from_map<'a, I>(kind: KvKind, map: I) -> Result<Vec<KeyValue>>
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    let mut pairs = map
        .into_iter()
        .map(|(k, v)| KeyValue::new(k.clone(), v.clone()))
        .collect::<Vec<_>>();
    pairs.sort();
    for pair in &pairs {
        pair.validate(kind)?;
    }
    Ok(pairs)
}

/// Collect pairs back into an ordered map.
pub fn pairs_to_map(pairs: &[KeyValue]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|p| (p.key.clone(), p.value.clone()))
        .collect()
}

fn truncate(s: &str) -> &str {
    let mut end = s.len().min(32);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
