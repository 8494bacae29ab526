// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Priority-ordered process queue.
//!
//! This is the container the dispatcher schedules from, but it knows nothing
//! about scheduling itself: it is an ordered collection of `(ProcId,
//! Priority)` entries, kept in non-increasing key order from head to tail.
//! Among entries with equal keys, earlier insertions sit closer to the head,
//! so repeated insert-at-one-key/remove-first traffic behaves FIFO.
//!
//! # Representation
//!
//! The kernel has no heap, so entries live in a fixed arena addressed by
//! stable integer index: slot `i` of the arena holds the link record for
//! `ProcId(i)` exactly while that process is a member. Order is carried by
//! doubly-linked neighbor indices threaded through the arena. Removing an
//! entry releases its slot immediately -- there is no garbage to collect.
//!
//! Because a process can be a member of at most one position, the arena also
//! gives O(1) membership and key lookup by id; only position-sensitive
//! operations (insertion, iteration) walk the links.

use core::fmt;

use quern_abi::{Priority, ProcId};

/// One process's membership record while it is queued.
#[derive(Copy, Clone, Debug)]
struct Link {
    /// Key the entry was ranked by at insertion (or re-ranked by an
    /// `adjust_keys` pass since).
    key: Priority,
    /// Next entry toward the tail, `None` at the tail.
    next: Option<ProcId>,
    /// Previous entry toward the head, `None` at the head.
    prev: Option<ProcId>,
}

/// A fixed-capacity priority queue of processes.
///
/// `N` is the process-table size; the queue can hold every process at once
/// but never more. All operations are bounded and non-suspending, so the
/// container is safe to mutate from interrupt context provided the usual
/// single-core discipline (interrupts masked for the duration) is observed
/// by the caller.
#[derive(Clone, Debug)]
pub struct PriorityQueue<const N: usize> {
    /// Arena of link records; slot `i` is `Some` iff `ProcId(i)` is a member.
    links: [Option<Link>; N],
    /// Most important entry, `None` iff the queue is empty.
    head: Option<ProcId>,
    /// Least important entry, `None` iff the queue is empty.
    tail: Option<ProcId>,
    /// Number of members. Must equal the number of entries reachable from
    /// `head` along `next` links.
    size: usize,
}

/// Error returned when an insertion cannot proceed. The queue is unchanged.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum InsertError {
    /// The queue is at capacity.
    Full,
    /// The process id does not name a process-table slot.
    BadId,
    /// The process is already a member of this queue.
    Present,
}

/// Error returned when removal is attempted on an empty queue.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct QueueEmpty;

/// Error returned when removal-by-id finds no matching member.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct NotFound;

impl<const N: usize> PriorityQueue<N> {
    /// Creates an empty queue. `const` so queues can back statics.
    pub const fn new() -> Self {
        Self {
            links: [None; N],
            head: None,
            tail: None,
            size: 0,
        }
    }

    /// Checks whether the queue holds no entries.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Checks whether the queue is at capacity.
    pub fn is_full(&self) -> bool {
        self.size >= N
    }

    /// Returns the number of entries currently queued.
    pub fn len(&self) -> usize {
        self.size
    }

    /// Inserts `pid` with the given `key`.
    ///
    /// The entry is spliced in before the first entry ranked strictly below
    /// `key` -- that is, after every entry with an equal or greater key --
    /// which keeps the queue in descending order and breaks ties FIFO.
    ///
    /// Fails without mutation if the queue is at capacity, `pid` is out of
    /// range, or `pid` is already a member.
    pub fn insert(
        &mut self,
        pid: ProcId,
        key: Priority,
    ) -> Result<(), InsertError> {
        if self.is_full() {
            return Err(InsertError::Full);
        }
        if pid.index() >= N {
            return Err(InsertError::BadId);
        }
        if self.links[pid.index()].is_some() {
            return Err(InsertError::Present);
        }

        // Scan from the head for the splice point: the first entry the
        // newcomer outranks.
        let mut point = self.head;
        while let Some(at) = point {
            if key.is_more_important_than(self.link(at).key) {
                break;
            }
            point = self.link(at).next;
        }

        let prev = match point {
            Some(at) => self.link(at).prev,
            None => self.tail,
        };

        self.links[pid.index()] = Some(Link {
            key,
            next: point,
            prev,
        });

        match prev {
            Some(p) => self.link_mut(p).next = Some(pid),
            None => self.head = Some(pid),
        }
        match point {
            Some(n) => self.link_mut(n).prev = Some(pid),
            None => self.tail = Some(pid),
        }
        self.size += 1;
        Ok(())
    }

    /// Unlinks and returns the head entry: the most important process,
    /// earliest-queued among ties. O(1).
    pub fn remove_first(&mut self) -> Result<ProcId, QueueEmpty> {
        let head = self.head.ok_or(QueueEmpty)?;
        self.unlink(head);
        Ok(head)
    }

    /// Unlinks and returns the tail entry: the least important process,
    /// latest-queued among ties.
    pub fn remove_last(&mut self) -> Result<ProcId, QueueEmpty> {
        let tail = self.tail.ok_or(QueueEmpty)?;
        self.unlink(tail);
        Ok(tail)
    }

    /// Removes `pid` from wherever it sits in the queue, patching its
    /// neighbors together and releasing its arena slot.
    pub fn remove(&mut self, pid: ProcId) -> Result<ProcId, NotFound> {
        if pid.index() >= N || self.links[pid.index()].is_none() {
            return Err(NotFound);
        }
        self.unlink(pid);
        Ok(pid)
    }

    /// Returns the key `pid` is currently ranked by, or `None` if `pid` is
    /// not a member.
    pub fn key_of(&self, pid: ProcId) -> Option<Priority> {
        if pid.index() >= N {
            return None;
        }
        self.links[pid.index()].map(|link| link.key)
    }

    /// Checks whether `pid` is a member of this queue.
    pub fn contains(&self, pid: ProcId) -> bool {
        self.key_of(pid).is_some()
    }

    /// Walks the queue from head to tail.
    pub fn iter(&self) -> Iter<'_, N> {
        Iter {
            queue: self,
            at: self.head,
        }
    }

    /// Rewrites each entry's key in place, in queue order, to whatever the
    /// closure returns for it.
    ///
    /// The queue is *not* re-sorted. A caller that moves keys past their
    /// neighbors (the aging pass raises a subset of keys by one) leaves the
    /// order as-is and relies on later insertions to compute correct
    /// positions from the rewritten keys.
    pub fn adjust_keys(
        &mut self,
        mut f: impl FnMut(ProcId, Priority) -> Priority,
    ) {
        let mut point = self.head;
        while let Some(pid) = point {
            let link = self.link_mut(pid);
            link.key = f(pid, link.key);
            point = link.next;
        }
    }

    /// Borrows the link record for a known member.
    ///
    /// The chain and the arena must agree: every id reachable through links
    /// has a populated slot. A miss here means the queue is corrupt.
    fn link(&self, pid: ProcId) -> &Link {
        match &self.links[pid.index()] {
            Some(link) => link,
            None => panic!("queue corrupt: no link for pid {}", pid),
        }
    }

    fn link_mut(&mut self, pid: ProcId) -> &mut Link {
        match &mut self.links[pid.index()] {
            Some(link) => link,
            None => panic!("queue corrupt: no link for pid {}", pid),
        }
    }

    /// Detaches a known member and releases its slot.
    fn unlink(&mut self, pid: ProcId) {
        let link = match self.links[pid.index()].take() {
            Some(link) => link,
            None => panic!("queue corrupt: unlink of non-member {}", pid),
        };
        match link.prev {
            Some(p) => self.link_mut(p).next = link.next,
            None => self.head = link.next,
        }
        match link.next {
            Some(n) => self.link_mut(n).prev = link.prev,
            None => self.tail = link.prev,
        }
        self.size -= 1;
    }
}

impl<const N: usize> Default for PriorityQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Head-to-tail iterator over `(ProcId, Priority)` entries.
pub struct Iter<'q, const N: usize> {
    queue: &'q PriorityQueue<N>,
    at: Option<ProcId>,
}

impl<const N: usize> Iterator for Iter<'_, N> {
    type Item = (ProcId, Priority);

    fn next(&mut self) -> Option<Self::Item> {
        let pid = self.at?;
        let link = self.queue.link(pid);
        self.at = link.next;
        Some((pid, link.key))
    }
}

impl<const N: usize> fmt::Display for PriorityQueue<N> {
    /// Renders the queue for diagnostics: each `(key, pid)` pair in order,
    /// then the size. Not a stable format.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (pid, key) in self.iter() {
            write!(f, "(key={}, pid={})", key, pid)?;
        }
        if !self.is_empty() {
            write!(f, " size={}", self.size)?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(i: u16) -> ProcId {
        ProcId(i)
    }

    fn key(k: i32) -> Priority {
        Priority(k)
    }

    /// Checks the structural invariants: size matches the reachable chain in
    /// both directions, forward/backward links mirror each other, and keys
    /// never increase from head to tail.
    fn check_invariants<const N: usize>(q: &PriorityQueue<N>) {
        // Forward walk.
        let mut count = 0;
        let mut at = q.head;
        let mut prev: Option<ProcId> = None;
        let mut last_key: Option<Priority> = None;
        while let Some(p) = at {
            let link = q.links[p.index()].as_ref().expect("chain into empty slot");
            assert_eq!(link.prev, prev, "prev link mismatch at pid {p}");
            if let Some(lk) = last_key {
                assert!(
                    !link.key.is_more_important_than(lk),
                    "ascending keys at pid {p}"
                );
            }
            last_key = Some(link.key);
            prev = at;
            at = link.next;
            count += 1;
            assert!(count <= N, "cycle in queue chain");
        }
        assert_eq!(q.tail, prev, "tail does not match end of chain");
        assert_eq!(q.size, count, "size does not match reachable entries");

        // Every populated arena slot must be reachable.
        let populated = q.links.iter().filter(|s| s.is_some()).count();
        assert_eq!(populated, count, "orphaned arena slot");
    }

    fn contents<const N: usize>(q: &PriorityQueue<N>) -> Vec<(u16, i32)> {
        q.iter().map(|(p, k)| (p.0, k.0)).collect()
    }

    #[test]
    fn new_queue_is_empty() {
        let mut q = PriorityQueue::<4>::new();
        assert!(q.is_empty());
        assert!(!q.is_full());
        assert_eq!(q.len(), 0);
        assert_eq!(q.remove_first(), Err(QueueEmpty));
        assert_eq!(q.remove_last(), Err(QueueEmpty));
        check_invariants(&q);
    }

    #[test]
    fn insert_orders_descending() {
        let mut q = PriorityQueue::<8>::new();
        q.insert(pid(1), key(5)).unwrap();
        q.insert(pid(2), key(9)).unwrap();
        q.insert(pid(3), key(7)).unwrap();
        check_invariants(&q);
        assert_eq!(contents(&q), [(2, 9), (3, 7), (1, 5)]);
    }

    #[test]
    fn equal_keys_break_ties_fifo() {
        let mut q = PriorityQueue::<8>::new();
        for p in [4, 5, 6] {
            q.insert(pid(p), key(3)).unwrap();
        }
        check_invariants(&q);
        assert_eq!(q.remove_first(), Ok(pid(4)));
        assert_eq!(q.remove_first(), Ok(pid(5)));
        assert_eq!(q.remove_first(), Ok(pid(6)));
        assert_eq!(q.remove_first(), Err(QueueEmpty));
    }

    #[test]
    fn insert_then_remove_restores_size() {
        let mut q = PriorityQueue::<8>::new();
        q.insert(pid(1), key(1)).unwrap();
        q.insert(pid(2), key(2)).unwrap();
        let before = q.len();
        q.insert(pid(7), key(42)).unwrap();
        assert_eq!(q.remove(pid(7)), Ok(pid(7)));
        assert_eq!(q.len(), before);
        check_invariants(&q);
    }

    #[test]
    fn full_insert_fails_without_mutation() {
        let mut q = PriorityQueue::<2>::new();
        q.insert(pid(0), key(1)).unwrap();
        q.insert(pid(1), key(2)).unwrap();
        assert!(q.is_full());
        let snapshot = contents(&q);
        // pid 1 is taken, but capacity is checked first.
        assert_eq!(q.insert(pid(1), key(3)), Err(InsertError::Full));
        assert_eq!(contents(&q), snapshot);
        check_invariants(&q);
    }

    #[test]
    fn out_of_range_and_duplicate_ids_are_rejected() {
        let mut q = PriorityQueue::<4>::new();
        assert_eq!(q.insert(pid(4), key(1)), Err(InsertError::BadId));
        q.insert(pid(2), key(1)).unwrap();
        assert_eq!(q.insert(pid(2), key(9)), Err(InsertError::Present));
        assert_eq!(contents(&q), [(2, 1)]);
    }

    #[test]
    fn remove_patches_interior_neighbors() {
        let mut q = PriorityQueue::<8>::new();
        q.insert(pid(1), key(9)).unwrap();
        q.insert(pid(2), key(5)).unwrap();
        q.insert(pid(3), key(1)).unwrap();
        assert_eq!(q.remove(pid(2)), Ok(pid(2)));
        check_invariants(&q);
        assert_eq!(contents(&q), [(1, 9), (3, 1)]);
        // Boundary removals update head and tail.
        assert_eq!(q.remove(pid(1)), Ok(pid(1)));
        check_invariants(&q);
        assert_eq!(q.head, Some(pid(3)));
        assert_eq!(q.remove(pid(3)), Ok(pid(3)));
        assert!(q.is_empty());
        assert_eq!(q.head, None);
        assert_eq!(q.tail, None);
    }

    #[test]
    fn remove_missing_is_not_found() {
        let mut q = PriorityQueue::<4>::new();
        q.insert(pid(1), key(1)).unwrap();
        assert_eq!(q.remove(pid(2)), Err(NotFound));
        assert_eq!(q.remove(pid(9)), Err(NotFound));
        assert_eq!(contents(&q), [(1, 1)]);
    }

    #[test]
    fn remove_last_takes_the_tail() {
        let mut q = PriorityQueue::<8>::new();
        q.insert(pid(1), key(5)).unwrap();
        q.insert(pid(2), key(5)).unwrap();
        q.insert(pid(3), key(8)).unwrap();
        // Tail is the latest-queued of the least important.
        assert_eq!(q.remove_last(), Ok(pid(2)));
        assert_eq!(q.remove_last(), Ok(pid(1)));
        assert_eq!(q.remove_last(), Ok(pid(3)));
        assert_eq!(q.remove_last(), Err(QueueEmpty));
    }

    #[test]
    fn lookup_by_pid() {
        let mut q = PriorityQueue::<4>::new();
        q.insert(pid(3), key(-2)).unwrap();
        assert_eq!(q.key_of(pid(3)), Some(key(-2)));
        assert!(q.contains(pid(3)));
        assert_eq!(q.key_of(pid(1)), None);
        assert_eq!(q.key_of(pid(99)), None);
    }

    #[test]
    fn adjust_keys_rewrites_without_reordering() {
        let mut q = PriorityQueue::<8>::new();
        q.insert(pid(1), key(5)).unwrap();
        q.insert(pid(2), key(9)).unwrap();
        q.insert(pid(3), key(5)).unwrap();
        let before: Vec<u16> = q.iter().map(|(p, _)| p.0).collect();
        q.adjust_keys(|p, k| if p == pid(2) { k } else { k.aged() });
        let after: Vec<u16> = q.iter().map(|(p, _)| p.0).collect();
        assert_eq!(before, after);
        assert_eq!(contents(&q), [(2, 9), (1, 6), (3, 6)]);
    }

    #[test]
    fn end_to_end_scenario() {
        let mut q = PriorityQueue::<8>::new();
        q.insert(pid(1), key(5)).unwrap();
        q.insert(pid(2), key(9)).unwrap();
        q.insert(pid(3), key(5)).unwrap();
        assert_eq!(contents(&q), [(2, 9), (1, 5), (3, 5)]);
        assert_eq!(q.remove_first(), Ok(pid(2)));
        assert_eq!(q.remove(pid(1)), Ok(pid(1)));
        assert_eq!(contents(&q), [(3, 5)]);
        assert_eq!(q.len(), 1);
        check_invariants(&q);
    }

    #[test]
    fn display_matches_diagnostic_format() {
        let mut q = PriorityQueue::<4>::new();
        assert_eq!(q.to_string(), "[]");
        q.insert(pid(1), key(5)).unwrap();
        q.insert(pid(2), key(9)).unwrap();
        assert_eq!(
            q.to_string(),
            "[(key=9, pid=2)(key=5, pid=1) size=2]"
        );
    }
}
