//! Memory ledger - bounded newest-first log of extracted facts.

use vivarium_core::MemoryEntry;

/// Append-only bounded log of memory entries, newest first.
///
/// Insertion past the capacity evicts the oldest entry. Persistence is
/// whole-ledger snapshots only; there is no incremental write path.
#[derive(Debug, Clone)]
pub struct MemoryLedger {
    entries: Vec<MemoryEntry>,
    capacity: usize,
}

impl MemoryLedger {
    /// Create an empty ledger with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity,
        }
    }

    /// Restore a ledger from a snapshot, trimming to capacity if the
    /// snapshot was written under a larger bound.
    pub fn from_entries(mut entries: Vec<MemoryEntry>, capacity: usize) -> Self {
        entries.truncate(capacity);
        Self { entries, capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in ledger order, newest first.
    pub fn entries(&self) -> &[MemoryEntry] {
        &self.entries
    }

    /// Snapshot copy of the entries.
    pub fn to_vec(&self) -> Vec<MemoryEntry> {
        self.entries.clone()
    }

    /// Prepend an entry, evicting the oldest past capacity.
    pub fn insert(&mut self, entry: MemoryEntry) {
        self.entries.insert(0, entry);
        self.entries.truncate(self.capacity);
    }

    /// The grounding blob passed to dialogue generation: `key:value` pairs
    /// in ledger order.
    pub fn grounding_string(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("{}:{}", e.key, e.value))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================


// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// The ledger SHALL never exceed its capacity, for any insertion count.
        #[test]
        fn prop_ledger_never_exceeds_capacity(
            capacity in 1usize..60,
            insertions in 0usize..200,
        ) {
            let mut ledger = MemoryLedger::new(capacity);
            for i in 0..insertions {
                ledger.insert(MemoryEntry::new(format!("fact {}", i)));
            }
            prop_assert!(ledger.len() <= capacity);
            prop_assert_eq!(ledger.len(), insertions.min(capacity));
        }

        /// After any sequence of insertions the ledger SHALL hold the most
        /// recent entries in newest-first order.
        #[test]
        fn prop_ledger_keeps_newest_first(
            capacity in 1usize..30,
            insertions in 1usize..100,
        ) {
            let mut ledger = MemoryLedger::new(capacity);
            for i in 0..insertions {
                ledger.insert(MemoryEntry::new(format!("{}", i)));
            }
            for (offset, entry) in ledger.entries().iter().enumerate() {
                let expected = insertions - 1 - offset;
                prop_assert_eq!(entry.value.clone(), format!("{}", expected));
            }
        }
    }
}
