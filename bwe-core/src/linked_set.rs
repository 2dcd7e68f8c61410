//! Bounded ordered packet set
//!
//! Keeps the most recently arrived packets of a flow, deduplicated by
//! unwrapped sequence number. Records live in an arena-backed doubly linked
//! list ordered most-recent-first; an ordered index maps each unwrapped
//! sequence number to its arena slot. Moving a record to the front and
//! dropping the tail are O(1); lookups are O(log n), and the index's first
//! and last keys give the sequence-number span in O(log n).

use crate::sequence::SequenceUnwrapper;
use std::collections::BTreeMap;
use thiserror::Error;

/// Set errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SetError {
    #[error("Set capacity must be at least 1")]
    ZeroCapacity,
}

/// Information kept about a received packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketRecord {
    /// Sequence number after unwrapping
    pub unwrapped_sequence_number: i64,
    /// Send time (ms)
    pub send_time_ms: i64,
    /// Arrival time (ms), refreshed on duplicate arrival
    pub arrival_time_ms: i64,
    /// Payload size in bytes
    pub payload_size: usize,
}

#[derive(Debug, Clone)]
struct Node {
    record: PacketRecord,
    /// Towards the front (more recent)
    prev: Option<usize>,
    /// Towards the back (less recent)
    next: Option<usize>,
}

/// Fixed-capacity, recency-ordered, deduplicating packet set
#[derive(Debug, Clone)]
pub struct LinkedSet {
    capacity: usize,
    unwrapper: SequenceUnwrapper,
    /// Unwrapped sequence number -> arena slot
    index: BTreeMap<i64, usize>,
    slots: Vec<Option<Node>>,
    free_slots: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl LinkedSet {
    /// Create a set holding at most `capacity` records
    pub fn new(capacity: usize) -> Result<Self, SetError> {
        if capacity == 0 {
            return Err(SetError::ZeroCapacity);
        }

        Ok(LinkedSet {
            capacity,
            unwrapper: SequenceUnwrapper::new(),
            index: BTreeMap::new(),
            slots: Vec::with_capacity(capacity),
            free_slots: Vec::new(),
            head: None,
            tail: None,
        })
    }

    /// Insert an arrived packet
    ///
    /// A packet already in the set is moved to the front with its arrival
    /// time refreshed. A new packet is added at the front; if the set is full
    /// the least recently touched record is removed first and returned.
    pub fn insert(
        &mut self,
        sequence_number: u16,
        send_time_ms: i64,
        arrival_time_ms: i64,
        payload_size: usize,
    ) -> Option<PacketRecord> {
        let unwrapped = self.unwrapper.unwrap(sequence_number);

        if let Some(&slot) = self.index.get(&unwrapped) {
            self.node_mut(slot).record.arrival_time_ms = arrival_time_ms;
            self.move_to_front(slot);
            return None;
        }

        let evicted = if self.len() >= self.capacity {
            self.remove_tail()
        } else {
            None
        };

        let record = PacketRecord {
            unwrapped_sequence_number: unwrapped,
            send_time_ms,
            arrival_time_ms,
            payload_size,
        };
        let slot = self.allocate(record);
        self.link_front(slot);
        self.index.insert(unwrapped, slot);

        evicted
    }

    /// Remove the record with the given unwrapped sequence number
    pub fn erase(&mut self, unwrapped_sequence_number: i64) -> Option<PacketRecord> {
        let slot = self.index.remove(&unwrapped_sequence_number)?;
        Some(self.release(slot))
    }

    /// Remove the least recently touched record
    pub fn remove_tail(&mut self) -> Option<PacketRecord> {
        let slot = self.tail?;
        let key = self.node(slot).record.unwrapped_sequence_number;
        self.index.remove(&key);
        Some(self.release(slot))
    }

    /// Width of the sequence-number interval spanned by the set
    ///
    /// `newest - oldest + 1` over unwrapped sequence numbers, 0 when empty.
    /// `range() - len()` is the number of sequence numbers in the interval
    /// that were never observed.
    pub fn range(&self) -> i64 {
        match (self.index.keys().next(), self.index.keys().next_back()) {
            (Some(oldest), Some(newest)) => newest - oldest + 1,
            _ => 0,
        }
    }

    /// Lowest unwrapped sequence number held
    pub fn oldest_sequence_number(&self) -> Option<i64> {
        self.index.keys().next().copied()
    }

    /// Highest unwrapped sequence number held
    pub fn newest_sequence_number(&self) -> Option<i64> {
        self.index.keys().next_back().copied()
    }

    /// Most recently touched record
    pub fn front(&self) -> Option<&PacketRecord> {
        self.head.map(|slot| &self.node(slot).record)
    }

    /// Least recently touched record
    pub fn back(&self) -> Option<&PacketRecord> {
        self.tail.map(|slot| &self.node(slot).record)
    }

    /// Look up a record by unwrapped sequence number
    pub fn get(&self, unwrapped_sequence_number: i64) -> Option<&PacketRecord> {
        self.index
            .get(&unwrapped_sequence_number)
            .map(|&slot| &self.node(slot).record)
    }

    /// Check if a record with this unwrapped sequence number is present
    pub fn contains(&self, unwrapped_sequence_number: i64) -> bool {
        self.index.contains_key(&unwrapped_sequence_number)
    }

    /// Iterate records from most to least recently touched
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            set: self,
            cursor: self.head,
        }
    }

    /// Unwrap a sequence number against the set's history without recording it
    pub fn peek_unwrap(&self, sequence_number: u16) -> i64 {
        self.unwrapper.peek(sequence_number)
    }

    /// Number of records held
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Check if the set is empty
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Check if the next new record would evict one
    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    /// Maximum number of records
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn node(&self, slot: usize) -> &Node {
        match &self.slots[slot] {
            Some(node) => node,
            None => unreachable!("index refers to released slot {}", slot),
        }
    }

    fn node_mut(&mut self, slot: usize) -> &mut Node {
        match &mut self.slots[slot] {
            Some(node) => node,
            None => unreachable!("index refers to released slot {}", slot),
        }
    }

    fn allocate(&mut self, record: PacketRecord) -> usize {
        let node = Node {
            record,
            prev: None,
            next: None,
        };

        match self.free_slots.pop() {
            Some(slot) => {
                self.slots[slot] = Some(node);
                slot
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        }
    }

    /// Unlink a slot and return its record; the index entry must already be gone
    fn release(&mut self, slot: usize) -> PacketRecord {
        self.unlink(slot);
        let node = self.slots[slot].take();
        self.free_slots.push(slot);
        match node {
            Some(node) => node.record,
            None => unreachable!("released slot {} twice", slot),
        }
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = {
            let node = self.node(slot);
            (node.prev, node.next)
        };

        match prev {
            Some(prev) => self.node_mut(prev).next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.node_mut(next).prev = prev,
            None => self.tail = prev,
        }

        let node = self.node_mut(slot);
        node.prev = None;
        node.next = None;
    }

    fn link_front(&mut self, slot: usize) {
        let old_head = self.head;
        {
            let node = self.node_mut(slot);
            node.prev = None;
            node.next = old_head;
        }
        match old_head {
            Some(old) => self.node_mut(old).prev = Some(slot),
            None => self.tail = Some(slot),
        }
        self.head = Some(slot);
    }

    fn move_to_front(&mut self, slot: usize) {
        if self.head == Some(slot) {
            return;
        }
        self.unlink(slot);
        self.link_front(slot);
    }
}

/// Iterator over a [`LinkedSet`], most recent first
pub struct Iter<'a> {
    set: &'a LinkedSet,
    cursor: Option<usize>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a PacketRecord;

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.cursor?;
        let node = self.set.node(slot);
        self.cursor = node.next;
        Some(&node.record)
    }
}

impl<'a> IntoIterator for &'a LinkedSet {
    type Item = &'a PacketRecord;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(set: &LinkedSet) -> Vec<i64> {
        set.iter().map(|r| r.unwrapped_sequence_number).collect()
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert_eq!(LinkedSet::new(0).unwrap_err(), SetError::ZeroCapacity);
    }

    #[test]
    fn test_insert_orders_most_recent_first() {
        let mut set = LinkedSet::new(10).unwrap();
        for seq in 1..=3u16 {
            assert!(set.insert(seq, 0, seq as i64 * 10, 100).is_none());
        }
        assert_eq!(keys(&set), vec![3, 2, 1]);
        assert_eq!(set.front().unwrap().unwrapped_sequence_number, 3);
        assert_eq!(set.back().unwrap().unwrapped_sequence_number, 1);
    }

    #[test]
    fn test_capacity_evicts_tail() {
        let mut set = LinkedSet::new(3).unwrap();
        for seq in 0..3u16 {
            set.insert(seq, 0, 0, 100);
        }
        let evicted = set.insert(3, 0, 0, 100).unwrap();
        assert_eq!(evicted.unwrapped_sequence_number, 0);
        assert_eq!(set.len(), 3);
        assert!(!set.contains(0));
        assert_eq!(keys(&set), vec![3, 2, 1]);
    }

    #[test]
    fn test_reinsert_moves_to_front_without_duplicate() {
        let mut set = LinkedSet::new(3).unwrap();
        set.insert(1, 0, 10, 100);
        set.insert(2, 0, 20, 100);
        set.insert(3, 0, 30, 100);

        // Retransmission of 1
        assert!(set.insert(1, 0, 40, 100).is_none());
        assert_eq!(set.len(), 3);
        assert_eq!(keys(&set), vec![1, 3, 2]);
        assert_eq!(set.get(1).unwrap().arrival_time_ms, 40);

        // 2 is now the oldest touched and goes first
        let evicted = set.insert(4, 0, 50, 100).unwrap();
        assert_eq!(evicted.unwrapped_sequence_number, 2);
    }

    #[test]
    fn test_range() {
        let mut set = LinkedSet::new(10).unwrap();
        assert_eq!(set.range(), 0);

        for seq in [5u16, 7, 9] {
            set.insert(seq, 0, 0, 100);
        }
        assert_eq!(set.range(), 5);
        assert_eq!(set.len(), 3);
        assert_eq!(set.range() - set.len() as i64, 2);
    }

    #[test]
    fn test_range_across_wraparound() {
        let mut set = LinkedSet::new(10).unwrap();
        for seq in [65534u16, 65535, 0, 1] {
            set.insert(seq, 0, 0, 100);
        }
        assert_eq!(keys(&set), vec![65537, 65536, 65535, 65534]);
        assert_eq!(set.range(), 4);
        assert_eq!(set.oldest_sequence_number(), Some(65534));
        assert_eq!(set.newest_sequence_number(), Some(65537));
    }

    #[test]
    fn test_erase_middle() {
        let mut set = LinkedSet::new(10).unwrap();
        for seq in 0..5u16 {
            set.insert(seq, 0, 0, 100);
        }
        let erased = set.erase(2).unwrap();
        assert_eq!(erased.unwrapped_sequence_number, 2);
        assert!(set.erase(2).is_none());
        assert_eq!(keys(&set), vec![4, 3, 1, 0]);
        assert_eq!(set.range(), 5);
    }

    #[test]
    fn test_erase_head_and_tail() {
        let mut set = LinkedSet::new(10).unwrap();
        for seq in 0..3u16 {
            set.insert(seq, 0, 0, 100);
        }
        set.erase(2);
        set.erase(0);
        assert_eq!(keys(&set), vec![1]);
        assert_eq!(set.front(), set.back());

        set.erase(1);
        assert!(set.is_empty());
        assert!(set.front().is_none());
        assert_eq!(set.range(), 0);
    }

    #[test]
    fn test_slots_are_reused() {
        let mut set = LinkedSet::new(4).unwrap();
        for seq in 0..1000u16 {
            set.insert(seq, 0, 0, 100);
        }
        assert_eq!(set.len(), 4);
        assert!(set.slots.len() <= 4);
        assert_eq!(keys(&set), vec![999, 998, 997, 996]);
    }

    #[test]
    fn test_remove_tail_on_empty() {
        let mut set = LinkedSet::new(1).unwrap();
        assert!(set.remove_tail().is_none());
        set.insert(7, 1, 2, 3);
        assert!(set.is_full());
        assert_eq!(set.remove_tail().unwrap().payload_size, 3);
        assert!(set.is_empty());
    }
}
