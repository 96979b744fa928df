use std::fmt;

use crate::vertex::ApId;

/// Ordered one-to-one pairing of APs. Insertion order is kept: the first
/// pairs are the ones downstream consumers honour first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ApMapping {
    pairs: Vec<(ApId, ApId)>,
}

impl ApMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `key -> value`, replacing the value of an existing key in place.
    /// Returns the replaced value.
    pub fn insert(&mut self, key: ApId, value: ApId) -> Option<ApId> {
        match self.pairs.iter_mut().find(|(k, _)| *k == key) {
            Some(pair) => Some(std::mem::replace(&mut pair.1, value)),
            None => {
                self.pairs.push((key, value));
                None
            }
        }
    }

    pub fn with(&self, key: ApId, value: ApId) -> Self {
        let mut m = self.clone();
        m.insert(key, value);
        m
    }

    pub fn get(&self, key: &ApId) -> Option<&ApId> {
        self.pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &ApId) -> bool {
        self.pairs.iter().any(|(k, _)| k == key)
    }

    pub fn contains_value(&self, value: &ApId) -> bool {
        self.pairs.iter().any(|(_, v)| v == value)
    }

    pub fn contains_all_keys<'a>(&self, keys: impl IntoIterator<Item = &'a ApId>) -> bool {
        keys.into_iter().all(|k| self.contains_key(k))
    }

    pub fn contains_all_values<'a>(&self, values: impl IntoIterator<Item = &'a ApId>) -> bool {
        values.into_iter().all(|v| self.contains_value(v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &ApId> + '_ {
        self.pairs.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &ApId> + '_ {
        self.pairs.iter().map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(ApId, ApId)> + '_ {
        self.pairs.iter()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Values swapped with keys, same order.
    pub fn inverse(&self) -> Self {
        Self {
            pairs: self.pairs.iter().map(|(k, v)| (*v, *k)).collect(),
        }
    }

    /// True when no value is used twice.
    pub fn is_one_to_one(&self) -> bool {
        self.pairs
            .iter()
            .enumerate()
            .all(|(i, (_, v))| self.pairs[..i].iter().all(|(_, w)| w != v))
    }

    /// The pairs as AP indices in their owners.
    pub fn to_index_pairs(&self) -> Vec<(usize, usize)> {
        self.pairs.iter().map(|(k, v)| (k.index, v.index)).collect()
    }
}

impl FromIterator<(ApId, ApId)> for ApMapping {
    fn from_iter<T: IntoIterator<Item = (ApId, ApId)>>(iter: T) -> Self {
        let mut m = Self::new();
        for (k, v) in iter {
            m.insert(k, v);
        }
        m
    }
}

impl<'a> IntoIterator for &'a ApMapping {
    type Item = &'a (ApId, ApId);
    type IntoIter = std::slice::Iter<'a, (ApId, ApId)>;

    fn into_iter(self) -> Self::IntoIter {
        self.pairs.iter()
    }
}

impl fmt::Display for ApMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, (k, v)) in self.pairs.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{k}->{v}")?;
        }
        f.write_str("]")
    }
}
