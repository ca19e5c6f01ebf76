use std::fmt;
use std::marker::PhantomData;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Decides whether two field names refer to the same entry.
pub trait KeyPolicy {
    fn same_key(a: &str, b: &str) -> bool;
}

/// ASCII case-insensitive names, as HTTP header names are.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaseInsensitive;

impl KeyPolicy for CaseInsensitive {
    fn same_key(a: &str, b: &str) -> bool {
        a.eq_ignore_ascii_case(b)
    }
}

/// Exact-match names, as query parameters and form fields are.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaseSensitive;

impl KeyPolicy for CaseSensitive {
    fn same_key(a: &str, b: &str) -> bool {
        a == b
    }
}

/// An ordered string-to-string mapping with one value per name.
///
/// Insertion order is kept so the mapping renders in the order the client
/// sent it. Writing a name that already exists replaces the value in place
/// (last write wins) and drops any later duplicates, so a hook always sees a
/// plain mapping even when the wire carried the same name twice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fields<P> {
    entries: Vec<(String, String)>,
    _policy: PhantomData<P>,
}

/// HTTP headers: ordered, case-insensitive names.
pub type Headers = Fields<CaseInsensitive>;

/// URL query parameters and form fields: ordered, exact names.
pub type Queries = Fields<CaseSensitive>;

impl<P: KeyPolicy> Fields<P> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            _policy: PhantomData,
        }
    }

    /// Build from wire pairs. Duplicate names collapse to the last value.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut fields = Self::new();
        for (name, value) in pairs {
            fields.insert(name, value);
        }
        fields
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| P::same_key(key, name))
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Set `name` to `value`, returning the value it replaced.
    ///
    /// An existing entry keeps its position but takes the spelling of the
    /// new name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let name = name.into();
        let value = value.into();

        let Some(idx) = self.entries.iter().position(|(key, _)| P::same_key(key, &name)) else {
            self.entries.push((name, value));
            return None;
        };

        let mut position = 0;
        self.entries.retain(|(key, _)| {
            let keep = position <= idx || !P::same_key(key, &name);
            position += 1;
            keep
        });
        Some(std::mem::replace(&mut self.entries[idx], (name, value)).1)
    }

    /// Remove every entry named `name`, returning the first removed value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let mut removed = None;
        self.entries.retain(|(key, value)| {
            if P::same_key(key, name) {
                if removed.is_none() {
                    removed = Some(value.clone());
                }
                false
            } else {
                true
            }
        });
        removed
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<P: KeyPolicy, K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Fields<P> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from_pairs(iter)
    }
}

impl<P: KeyPolicy, K: Into<String>, V: Into<String>> Extend<(K, V)> for Fields<P> {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (name, value) in iter {
            self.insert(name, value);
        }
    }
}

impl<P> Serialize for Fields<P> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'de, P: KeyPolicy> Deserialize<'de> for Fields<P> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FieldsVisitor<P>(PhantomData<P>);

        impl<'de, P: KeyPolicy> Visitor<'de> for FieldsVisitor<P> {
            type Value = Fields<P>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping of string names to string values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut fields = Fields::new();
                while let Some((name, value)) = access.next_entry::<String, String>()? {
                    fields.insert(name, value);
                }
                Ok(fields)
            }
        }

        deserializer.deserialize_map(FieldsVisitor(PhantomData))
    }
}
