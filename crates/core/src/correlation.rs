//! Correlation properties
//!
//! An unordered key/value map attached to an instance at creation. It stands
//! in for a primary key when looking up "the instance belonging to this
//! choreography run". Matching is exact map equality, never subset or
//! superset.
//!
//! The map is immutable once built: there are no mutating accessors, so
//! resolvers only ever read snapshots.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Immutable correlation-property map
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationProperties(BTreeMap<String, String>);

impl CorrelationProperties {
    /// Create an empty map
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Build a map from key/value pairs; later duplicates win
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Value of a property
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Number of properties
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the map has no properties
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate properties in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Exact-equality match used by the resolver
    pub fn matches(&self, candidate: &CorrelationProperties) -> bool {
        self == candidate
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for CorrelationProperties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from_pairs(iter)
    }
}

impl fmt::Display for CorrelationProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", k, v)?;
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_order_does_not_matter() {
        let a = CorrelationProperties::from_pairs([("a", "1"), ("b", "2")]);
        let b = CorrelationProperties::from_pairs([("b", "2"), ("a", "1")]);
        assert!(a.matches(&b));
    }

    #[test]
    fn test_subset_and_superset_do_not_match() {
        let small = CorrelationProperties::from_pairs([("a", "1")]);
        let big = CorrelationProperties::from_pairs([("a", "1"), ("b", "2")]);
        assert!(!small.matches(&big));
        assert!(!big.matches(&small));
    }

    #[test]
    fn test_display() {
        let p: CorrelationProperties = [("orderId", "42")].into_iter().collect();
        assert_eq!(p.to_string(), "{orderId=42}");
        assert_eq!(p.get("orderId"), Some("42"));
    }

    #[test]
    fn test_serde_is_a_plain_map() {
        let p = CorrelationProperties::from_pairs([("k", "v")]);
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, r#"{"k":"v"}"#);
        let back: CorrelationProperties = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }

    proptest! {
        #[test]
        fn prop_adding_a_key_breaks_the_match(
            base in proptest::collection::btree_map("[a-z]{1,4}", "[0-9]{1,3}", 0..5),
            extra_key in "[A-Z]{1,4}",
        ) {
            let a = CorrelationProperties(base.clone());
            let mut bigger = base;
            bigger.insert(extra_key, "x".to_string());
            let b = CorrelationProperties(bigger);
            prop_assert!(a.matches(&a.clone()));
            prop_assert!(!a.matches(&b));
            prop_assert!(!b.matches(&a));
        }
    }
}
