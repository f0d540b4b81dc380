//! Node tags
//!
//! Tags are free-form values attached to a node in its configuration and
//! published with its member record. Load balancers filter on them through
//! `tag_<key>=<value>` query parameters, so every comparison goes through
//! [`TagValue::matches`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A tag value as written in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

/// Tags keyed by name.
pub type Tags = BTreeMap<String, TagValue>;

impl TagValue {
    /// Compare against the raw text of a query parameter.
    ///
    /// Booleans compare case-insensitively against `true`/`false`, numbers
    /// compare numerically (`1.0` matches `1`), text compares exactly.
    pub fn matches(&self, wanted: &str) -> bool {
        match self {
            TagValue::Bool(value) => {
                let wanted = wanted.trim().to_ascii_lowercase();
                (wanted == "true" && *value) || (wanted == "false" && !*value)
            }
            TagValue::Integer(value) => wanted
                .trim()
                .parse::<f64>()
                .map(|w| w == *value as f64)
                .unwrap_or(false),
            TagValue::Float(value) => wanted
                .trim()
                .parse::<f64>()
                .map(|w| w == *value)
                .unwrap_or(false),
            TagValue::Text(value) => value == wanted,
        }
    }

    /// Truthiness used for the well-known boolean tags
    /// (`nofailover`, `noloadbalance`, `nosync`, ...).
    pub fn is_truthy(&self) -> bool {
        match self {
            TagValue::Bool(value) => *value,
            TagValue::Integer(value) => *value != 0,
            TagValue::Float(value) => *value != 0.0,
            TagValue::Text(value) => matches!(
                value.to_ascii_lowercase().as_str(),
                "true" | "on" | "yes" | "1"
            ),
        }
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Bool(value) => write!(f, "{}", value),
            TagValue::Integer(value) => write!(f, "{}", value),
            TagValue::Float(value) => write!(f, "{}", value),
            TagValue::Text(value) => f.write_str(value),
        }
    }
}

/// True when every query predicate is satisfied by the local tags.
///
/// A predicate naming a tag the node does not carry is never satisfied.
pub fn tags_match<'a, I>(local: &Tags, wanted: I) -> bool
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    wanted.into_iter().all(|(key, value)| {
        local
            .get(key)
            .map(|tag| tag.matches(value))
            .unwrap_or(false)
    })
}

/// Read a boolean tag, treating absence as `false`.
pub fn tag_flag(tags: &Tags, name: &str) -> bool {
    tags.get(name).map(TagValue::is_truthy).unwrap_or(false)
}
