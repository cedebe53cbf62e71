//! DestinationId - Cheap-to-clone destination identifier
//!
//! Derived from the configured broker address. Uses Arc<str> internally so the
//! id can be copied into every `PublishOutcome` without allocating.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Borrow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Destination identifier with cheap cloning.
///
/// # Examples
/// ```
/// use contracts::DestinationId;
///
/// let id: DestinationId = "localhost:9092".into();
/// let id2 = id.clone();  // O(1) - just increments ref count
/// assert_eq!(id, id2);
/// assert_eq!(id.as_str(), "localhost:9092");
/// ```
#[derive(Clone, Default, PartialOrd, Ord)]
pub struct DestinationId(Arc<str>);

impl DestinationId {
    /// Create a new DestinationId from a string slice.
    #[inline]
    pub fn new(s: &str) -> Self {
        Self(Arc::from(s))
    }

    /// Derive the id from a configured broker address.
    ///
    /// Surrounding whitespace, a `scheme://` prefix and a trailing `/` are
    /// dropped so that `tcp://dc1:9092/` and `dc1:9092` name the same cluster.
    pub fn from_address(address: &str) -> Self {
        let trimmed = address.trim();
        let without_scheme = trimmed
            .split_once("://")
            .map_or(trimmed, |(_, rest)| rest);
        Self::new(without_scheme.trim_end_matches('/'))
    }

    /// Get the underlying string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for DestinationId {
    #[inline]
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for DestinationId {
    #[inline]
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DestinationId {
    #[inline]
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for DestinationId {
    #[inline]
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl fmt::Display for DestinationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for DestinationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DestinationId({:?})", self.0)
    }
}

impl PartialEq for DestinationId {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

impl Eq for DestinationId {}

impl PartialEq<str> for DestinationId {
    #[inline]
    fn eq(&self, other: &str) -> bool {
        self.0.as_ref() == other
    }
}

impl PartialEq<&str> for DestinationId {
    #[inline]
    fn eq(&self, other: &&str) -> bool {
        self.0.as_ref() == *other
    }
}

impl PartialEq<String> for DestinationId {
    #[inline]
    fn eq(&self, other: &String) -> bool {
        self.0.as_ref() == other
    }
}

// Must agree with `str` hashing so `HashMap<DestinationId, _>::get(&str)` works.
impl Hash for DestinationId {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}

impl Serialize for DestinationId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for DestinationId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_clone_shares_allocation() {
        let id1: DestinationId = "dc-east:9092".into();
        let id2 = id1.clone();

        assert_eq!(id1.as_str().as_ptr(), id2.as_str().as_ptr());
    }

    #[test]
    fn test_equality() {
        let id: DestinationId = "localhost:9092".into();
        assert_eq!(id, "localhost:9092");
        assert_eq!(id, String::from("localhost:9092"));
        assert_eq!(id, DestinationId::from("localhost:9092"));
        assert_ne!(id, DestinationId::from("localhost:9093"));
    }

    #[test]
    fn test_from_address_normalizes() {
        assert_eq!(DestinationId::from_address(" tcp://dc1:9092/ "), "dc1:9092");
        assert_eq!(DestinationId::from_address("dc1:9092"), "dc1:9092");
        assert_eq!(
            DestinationId::from_address("log://audit"),
            DestinationId::from_address("audit")
        );
    }

    #[test]
    fn test_hashmap_lookup_by_str() {
        let mut map: HashMap<DestinationId, u32> = HashMap::new();
        map.insert("localhost:9092".into(), 1);
        map.insert("localhost:9093".into(), 2);

        assert_eq!(map.get("localhost:9092"), Some(&1));
        assert_eq!(map.get("localhost:9093"), Some(&2));
    }

    #[test]
    fn test_serde_as_plain_string() {
        let id: DestinationId = "dc-west:9092".into();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"dc-west:9092\"");

        let parsed: DestinationId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }
}
