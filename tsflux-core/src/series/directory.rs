//! Chunk directory: ordered map from chunk start time to chunk
//!
//! Keys are the 8-byte big-endian encoding of the chunk's first timestamp,
//! so byte-lexical order equals numeric order.

use crate::Timestamp;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound::{Excluded, Unbounded};

/// Big-endian encoded chunk start timestamp
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ChunkKey([u8; 8]);

impl ChunkKey {
    /// Encode a timestamp
    pub fn encode(timestamp: Timestamp) -> Self {
        Self(timestamp.to_be_bytes())
    }

    /// Decode back to a timestamp
    pub fn timestamp(&self) -> Timestamp {
        Timestamp::from_be_bytes(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }
}

impl fmt::Debug for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkKey({})", self.timestamp())
    }
}

impl From<Timestamp> for ChunkKey {
    fn from(timestamp: Timestamp) -> Self {
        Self::encode(timestamp)
    }
}

/// Seek predicate for positioning a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seek {
    /// Smallest key ("^")
    First,
    /// Largest key ("$")
    Last,
    /// Smallest key strictly greater than the given one (">")
    Greater(ChunkKey),
    /// Largest key less than or equal to the given one ("<=")
    LessOrEqual(ChunkKey),
}

/// Ordered chunk map
#[derive(Debug)]
pub struct ChunkDirectory<C> {
    entries: BTreeMap<ChunkKey, C>,
}

impl<C> ChunkDirectory<C> {
    /// Create an empty directory
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Insert or overwrite; returns the displaced chunk
    pub fn set(&mut self, key: ChunkKey, chunk: C) -> Option<C> {
        self.entries.insert(key, chunk)
    }

    /// Overwrite an existing entry; hands the chunk back if the key is absent
    pub fn replace(&mut self, key: ChunkKey, chunk: C) -> Result<C, C> {
        match self.entries.get_mut(&key) {
            Some(slot) => Ok(std::mem::replace(slot, chunk)),
            None => Err(chunk),
        }
    }

    /// Remove an entry
    pub fn delete(&mut self, key: &ChunkKey) -> Option<C> {
        self.entries.remove(key)
    }

    pub fn contains(&self, key: &ChunkKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &ChunkKey) -> Option<&C> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &ChunkKey) -> Option<&mut C> {
        self.entries.get_mut(key)
    }

    /// Position a scan; returns the matching key
    pub fn seek(&self, seek: Seek) -> Option<ChunkKey> {
        let found = match seek {
            Seek::First => self.entries.keys().next(),
            Seek::Last => self.entries.keys().next_back(),
            Seek::Greater(key) => self.entries.range((Excluded(key), Unbounded)).next().map(|(k, _)| k),
            Seek::LessOrEqual(key) => self.entries.range(..=key).next_back().map(|(k, _)| k),
        };
        found.copied()
    }

    /// Entry following `key` in ascending order
    pub fn next_after(&self, key: &ChunkKey) -> Option<(ChunkKey, &C)> {
        self.entries
            .range((Excluded(*key), Unbounded))
            .next()
            .map(|(k, c)| (*k, c))
    }

    /// Entry preceding `key` in ascending order
    pub fn prev_before(&self, key: &ChunkKey) -> Option<(ChunkKey, &C)> {
        self.entries.range(..*key).next_back().map(|(k, c)| (*k, c))
    }

    /// Entry with the greatest key
    pub fn last(&self) -> Option<(ChunkKey, &C)> {
        self.entries.iter().next_back().map(|(k, c)| (*k, c))
    }

    pub fn last_mut(&mut self) -> Option<(ChunkKey, &mut C)> {
        self.entries.iter_mut().next_back().map(|(k, c)| (*k, c))
    }

    /// Iterate in ascending key order
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&ChunkKey, &C)> {
        self.entries.iter()
    }

    pub fn values(&self) -> impl DoubleEndedIterator<Item = &C> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every entry
    pub fn clear(&mut self) -> usize {
        let n = self.entries.len();
        self.entries.clear();
        n
    }
}

impl<C> Default for ChunkDirectory<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory(keys: &[u64]) -> ChunkDirectory<u64> {
        let mut dir = ChunkDirectory::new();
        for k in keys {
            dir.set(ChunkKey::encode(*k), *k);
        }
        dir
    }

    #[test]
    fn test_key_order_matches_numeric_order() {
        let a = ChunkKey::encode(255);
        let b = ChunkKey::encode(256);
        let c = ChunkKey::encode(u64::MAX);
        assert!(a < b && b < c);
        assert!(a.as_bytes() < b.as_bytes());
        assert_eq!(c.timestamp(), u64::MAX);
    }

    #[test]
    fn test_seek_predicates() {
        let dir = directory(&[100, 200, 300]);

        assert_eq!(dir.seek(Seek::First), Some(ChunkKey::encode(100)));
        assert_eq!(dir.seek(Seek::Last), Some(ChunkKey::encode(300)));
        assert_eq!(dir.seek(Seek::Greater(ChunkKey::encode(200))), Some(ChunkKey::encode(300)));
        assert_eq!(dir.seek(Seek::Greater(ChunkKey::encode(300))), None);
        assert_eq!(dir.seek(Seek::LessOrEqual(ChunkKey::encode(250))), Some(ChunkKey::encode(200)));
        assert_eq!(dir.seek(Seek::LessOrEqual(ChunkKey::encode(200))), Some(ChunkKey::encode(200)));
        assert_eq!(dir.seek(Seek::LessOrEqual(ChunkKey::encode(50))), None);
    }

    #[test]
    fn test_bidirectional_steps() {
        let dir = directory(&[1, 2, 3]);
        let mid = ChunkKey::encode(2);

        assert_eq!(dir.next_after(&mid).map(|(_, v)| *v), Some(3));
        assert_eq!(dir.prev_before(&mid).map(|(_, v)| *v), Some(1));
        assert!(dir.prev_before(&ChunkKey::encode(1)).is_none());
        assert_eq!(dir.last().map(|(_, v)| *v), Some(3));
    }

    #[test]
    fn test_delete_while_scanning() {
        let mut dir = directory(&[10, 20, 30, 40]);
        let mut visited = Vec::new();

        let mut cursor = dir.seek(Seek::First);
        while let Some(key) = cursor {
            visited.push(key.timestamp());
            if key.timestamp() < 30 {
                dir.delete(&key);
            }
            cursor = dir.seek(Seek::Greater(key));
        }

        assert_eq!(visited, vec![10, 20, 30, 40]);
        assert_eq!(dir.len(), 2);
    }

    #[test]
    fn test_set_and_replace() {
        let mut dir = directory(&[5]);
        assert_eq!(dir.set(ChunkKey::encode(5), 50), Some(5));
        assert_eq!(dir.replace(ChunkKey::encode(5), 500), Ok(50));
        assert_eq!(dir.replace(ChunkKey::encode(6), 600), Err(600));
        assert_eq!(dir.get(&ChunkKey::encode(5)), Some(&500));
        assert_eq!(dir.clear(), 1);
        assert!(dir.is_empty());
    }
}
