//! Vessel-keyed registry of resource books.
//!
//! Books are working state only. They are created on first access, purged
//! when their vessel goes away or changes identity, and rebuilt from live
//! storage the next time they are needed.

use std::collections::HashMap;

use log::info;

use crate::book::VesselResourceBook;
use crate::storage::VesselId;

#[derive(Debug, Default)]
pub struct ResourceCache {
    books: HashMap<VesselId, VesselResourceBook>,
}

impl ResourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Book for `vessel`, created empty if absent.
    pub fn get(&mut self, vessel: VesselId) -> &mut VesselResourceBook {
        self.books
            .entry(vessel)
            .or_insert_with(|| VesselResourceBook::new(vessel))
    }

    /// Book for `vessel` without creating it.
    pub fn peek(&self, vessel: VesselId) -> Option<&VesselResourceBook> {
        self.books.get(&vessel)
    }

    pub fn contains(&self, vessel: VesselId) -> bool {
        self.books.contains_key(&vessel)
    }

    /// Drop the book of `vessel`. Returns true if there was one.
    pub fn purge(&mut self, vessel: VesselId) -> bool {
        let removed = self.books.remove(&vessel).is_some();
        if removed {
            info!("purged resource book of {}", vessel);
        }
        removed
    }

    pub fn clear(&mut self) {
        if !self.books.is_empty() {
            info!("cleared {} resource books", self.books.len());
        }
        self.books.clear();
    }

    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::Broker;

    #[test]
    fn get_creates_empty_book() {
        let mut cache = ResourceCache::new();
        let book = cache.get(VesselId(5));
        assert_eq!(book.vessel(), VesselId(5));
        assert!(book.get("Food").is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn get_returns_same_book() {
        let mut cache = ResourceCache::new();
        cache.get(VesselId(1)).consume("Food", 1.0, &Broker::OTHERS);
        let deferred = cache
            .get(VesselId(1))
            .get("Food")
            .map(|l| l.deferred());
        assert_eq!(deferred, Some(-1.0));
    }

    #[test]
    fn purge_and_clear() {
        let mut cache = ResourceCache::new();
        cache.get(VesselId(1));
        cache.get(VesselId(2));
        assert!(cache.purge(VesselId(1)));
        assert!(!cache.purge(VesselId(1)));
        assert!(cache.contains(VesselId(2)));
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.peek(VesselId(2)).is_none());
    }
}
