// tempo-timeline: Sorted timeline queue
// Circular doubly-linked list over a slab arena; the head is always the
// node with the earliest execution time and head.prev names the tail

use std::sync::Arc;

use tempo_signal::Notify;

/// Opaque reference to a queued node, handed out by `schedule`.
///
/// Stays valid until the node leaves the queue by execution or
/// cancellation; stale references are detected by the generation counter
/// and ignored, so double-cancel is harmless.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeRef {
    slot: usize,
    generation: u64,
}

struct Node {
    trigger: Arc<dyn Notify>,
    execute_at_us: i64,
    prev: usize,
    next: usize,
}

struct Slot {
    generation: u64,
    node: Option<Node>,
}

/// The sorted queue shared by every execution strategy. Nodes live in a
/// slab so a `NodeRef` never dangles; ring pointers are slot indices.
pub(crate) struct Timeline {
    slots: Vec<Slot>,
    free: Vec<usize>,
    head: Option<usize>,
    len: usize,
}

impl Timeline {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert a trigger at `execute_at_us`. Returns the node reference
    /// and whether the node became the new head.
    ///
    /// The walk starts at the tail because new work tends to land in
    /// near-monotonic future time, making append the O(1) common case.
    /// The strictly-greater comparison stops at the first node at or
    /// before the new time, so ties within one microsecond keep
    /// insertion order.
    pub fn insert(&mut self, trigger: Arc<dyn Notify>, execute_at_us: i64) -> (NodeRef, bool) {
        let slot = self.alloc(Node {
            trigger,
            execute_at_us,
            prev: 0,
            next: 0,
        });
        let node_ref = NodeRef {
            slot,
            generation: self.slots[slot].generation,
        };
        self.len += 1;

        let Some(head) = self.head else {
            let node = self.node_mut(slot);
            node.prev = slot;
            node.next = slot;
            self.head = Some(slot);
            return (node_ref, true);
        };

        let mut walker = self.prev_of(head);
        while walker != head && self.time_of(walker) > execute_at_us {
            walker = self.prev_of(walker);
        }
        if walker == head && self.time_of(head) > execute_at_us {
            // New earliest deadline: link between tail and the old head.
            self.splice_after(self.prev_of(head), slot);
            self.head = Some(slot);
            (node_ref, true)
        } else {
            self.splice_after(walker, slot);
            (node_ref, false)
        }
    }

    /// Remove the node behind `node_ref`. Returns false for stale
    /// references (already executed or cancelled); the queue is left
    /// untouched in that case.
    pub fn remove(&mut self, node_ref: NodeRef) -> bool {
        if !self.is_live(node_ref) {
            return false;
        }
        self.unlink(node_ref.slot);
        true
    }

    /// Detach the head and hand back its trigger and deadline.
    pub fn pop_head(&mut self) -> Option<(Arc<dyn Notify>, i64)> {
        let head = self.head?;
        let node = self.unlink(head);
        Some((node.trigger, node.execute_at_us))
    }

    /// The head node and its deadline, without detaching it.
    pub fn peek(&self) -> Option<(NodeRef, i64)> {
        let head = self.head?;
        Some((
            NodeRef {
                slot: head,
                generation: self.slots[head].generation,
            },
            self.time_of(head),
        ))
    }

    /// Drop every queued node.
    pub fn clear(&mut self) {
        while self.pop_head().is_some() {}
    }

    fn is_live(&self, node_ref: NodeRef) -> bool {
        self.slots.get(node_ref.slot).is_some_and(|slot| {
            slot.generation == node_ref.generation && slot.node.is_some()
        })
    }

    fn alloc(&mut self, node: Node) -> usize {
        match self.free.pop() {
            Some(slot) => {
                self.slots[slot].node = Some(node);
                slot
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                self.slots.len() - 1
            }
        }
    }

    /// Unlink `slot` from the ring and retire it to the free list. The
    /// generation bump invalidates every outstanding reference to it.
    fn unlink(&mut self, slot: usize) -> Node {
        let (prev, next) = {
            let node = self.node(slot);
            (node.prev, node.next)
        };
        if next == slot {
            self.head = None;
        } else {
            self.node_mut(prev).next = next;
            self.node_mut(next).prev = prev;
            if self.head == Some(slot) {
                self.head = Some(next);
            }
        }
        self.len -= 1;

        let cell = &mut self.slots[slot];
        cell.generation += 1;
        let node = cell.node.take().expect("unlink target is occupied");
        self.free.push(slot);
        node
    }

    /// Link `slot` into the ring directly after `anchor`.
    fn splice_after(&mut self, anchor: usize, slot: usize) {
        let anchor_next = self.next_of(anchor);
        {
            let node = self.node_mut(slot);
            node.prev = anchor;
            node.next = anchor_next;
        }
        self.node_mut(anchor).next = slot;
        self.node_mut(anchor_next).prev = slot;
    }

    fn node(&self, slot: usize) -> &Node {
        self.slots[slot].node.as_ref().expect("slot is occupied")
    }

    fn node_mut(&mut self, slot: usize) -> &mut Node {
        self.slots[slot].node.as_mut().expect("slot is occupied")
    }

    fn time_of(&self, slot: usize) -> i64 {
        self.node(slot).execute_at_us
    }

    fn prev_of(&self, slot: usize) -> usize {
        self.node(slot).prev
    }

    fn next_of(&self, slot: usize) -> usize {
        self.node(slot).next
    }

    /// Ring invariants: every neighbour pair is mutually linked, the
    /// traversal from head visits exactly `len` nodes, and deadlines are
    /// non-decreasing along it.
    #[cfg(test)]
    fn assert_well_formed(&self) {
        let Some(head) = self.head else {
            assert_eq!(self.len, 0);
            assert!(self.slots.iter().all(|slot| slot.node.is_none()));
            return;
        };
        let mut seen = 0;
        let mut cursor = head;
        loop {
            let node = self.node(cursor);
            assert_eq!(self.node(node.next).prev, cursor);
            assert_eq!(self.node(node.prev).next, cursor);
            if node.next != head {
                assert!(
                    node.execute_at_us <= self.node(node.next).execute_at_us,
                    "ring not sorted at slot {}",
                    cursor
                );
            }
            seen += 1;
            assert!(seen <= self.len, "ring longer than len");
            cursor = node.next;
            if cursor == head {
                break;
            }
        }
        assert_eq!(seen, self.len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Probe {
        id: u32,
        log: Arc<Mutex<Vec<u32>>>,
    }

    impl Notify for Probe {
        fn notify(&self) {
            self.log.lock().push(self.id);
        }
    }

    fn probe(id: u32, log: &Arc<Mutex<Vec<u32>>>) -> Arc<dyn Notify> {
        Arc::new(Probe {
            id,
            log: Arc::clone(log),
        })
    }

    fn silent() -> Arc<dyn Notify> {
        let log = Arc::new(Mutex::new(Vec::new()));
        probe(0, &log)
    }

    fn drain_ids(timeline: &mut Timeline, log: &Arc<Mutex<Vec<u32>>>) -> Vec<u32> {
        while let Some((trigger, _)) = timeline.pop_head() {
            trigger.notify();
        }
        log.lock().clone()
    }

    #[test]
    fn pop_follows_deadline_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut timeline = Timeline::new();
        timeline.insert(probe(3, &log), 300);
        timeline.insert(probe(1, &log), 100);
        timeline.insert(probe(2, &log), 200);
        timeline.assert_well_formed();

        assert_eq!(drain_ids(&mut timeline, &log), vec![1, 2, 3]);
        timeline.assert_well_formed();
    }

    #[test]
    fn equal_deadlines_keep_insertion_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut timeline = Timeline::new();
        for id in 1..=4 {
            timeline.insert(probe(id, &log), 500);
        }
        timeline.insert(probe(9, &log), 400);
        timeline.assert_well_formed();

        assert_eq!(drain_ids(&mut timeline, &log), vec![9, 1, 2, 3, 4]);
    }

    #[test]
    fn earlier_insert_becomes_head() {
        let mut timeline = Timeline::new();
        let (_, was_head) = timeline.insert(silent(), 900);
        assert!(was_head);
        let (_, was_head) = timeline.insert(silent(), 100);
        assert!(was_head);
        let (_, was_head) = timeline.insert(silent(), 500);
        assert!(!was_head);
        timeline.assert_well_formed();

        assert_eq!(timeline.peek().map(|(_, at)| at), Some(100));
    }

    #[test]
    fn remove_head_advances_to_next() {
        let mut timeline = Timeline::new();
        let (first, _) = timeline.insert(silent(), 100);
        timeline.insert(silent(), 200);

        assert!(timeline.remove(first));
        timeline.assert_well_formed();
        assert_eq!(timeline.peek().map(|(_, at)| at), Some(200));
        assert_eq!(timeline.len(), 1);
    }

    #[test]
    fn remove_middle_keeps_ring_intact() {
        let mut timeline = Timeline::new();
        timeline.insert(silent(), 100);
        let (middle, _) = timeline.insert(silent(), 200);
        timeline.insert(silent(), 300);

        assert!(timeline.remove(middle));
        timeline.assert_well_formed();
        assert_eq!(timeline.len(), 2);
    }

    #[test]
    fn remove_only_node_empties_the_queue() {
        let mut timeline = Timeline::new();
        let (only, _) = timeline.insert(silent(), 100);

        assert!(timeline.remove(only));
        timeline.assert_well_formed();
        assert!(timeline.is_empty());
        assert!(timeline.peek().is_none());
    }

    #[test]
    fn stale_reference_is_ignored() {
        let mut timeline = Timeline::new();
        let (node, _) = timeline.insert(silent(), 100);

        assert!(timeline.remove(node));
        assert!(!timeline.remove(node));
        timeline.assert_well_formed();
    }

    #[test]
    fn recycled_slot_rejects_old_reference() {
        let mut timeline = Timeline::new();
        let (old, _) = timeline.insert(silent(), 100);
        assert!(timeline.remove(old));

        // The freed slot is reused; the stale reference must not be able
        // to cancel the new occupant.
        let (_new_ref, _) = timeline.insert(silent(), 200);
        assert!(!timeline.remove(old));
        assert_eq!(timeline.len(), 1);
        timeline.assert_well_formed();
    }

    #[test]
    fn clear_then_peek_is_none() {
        let mut timeline = Timeline::new();
        for at in [300, 100, 200, 100] {
            timeline.insert(silent(), at);
        }

        timeline.clear();
        timeline.assert_well_formed();
        assert!(timeline.peek().is_none());
        assert!(timeline.is_empty());
    }

    mod properties {
        use super::super::{NodeRef, Timeline};
        use super::silent;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Op {
            Insert(i64),
            Cancel(usize),
            Pop,
            Clear,
        }

        fn op_strategy() -> impl Strategy<Value = Op> {
            prop_oneof![
                4 => (-1_000i64..1_000).prop_map(Op::Insert),
                2 => (0usize..32).prop_map(Op::Cancel),
                2 => Just(Op::Pop),
                1 => Just(Op::Clear),
            ]
        }

        proptest! {
            // Queue invariant: any schedule/cancel/clear sequence leaves a
            // well-formed ring, sorted non-decreasing from head, and pops
            // emerge in the same order as the sorted model.
            #[test]
            fn ring_stays_well_formed_and_sorted(
                ops in proptest::collection::vec(op_strategy(), 1..128)
            ) {
                let mut timeline = Timeline::new();
                let mut refs: Vec<(NodeRef, i64)> = Vec::new();
                let mut model: Vec<i64> = Vec::new();

                for op in ops {
                    match op {
                        Op::Insert(at) => {
                            let (node, _) = timeline.insert(silent(), at);
                            refs.push((node, at));
                            let pos = model.partition_point(|&t| t <= at);
                            model.insert(pos, at);
                        }
                        Op::Cancel(pick) => {
                            if !refs.is_empty() {
                                let (node, at) = refs.remove(pick % refs.len());
                                if timeline.remove(node) {
                                    let pos = model
                                        .iter()
                                        .position(|&t| t == at)
                                        .expect("model tracks every queued deadline");
                                    model.remove(pos);
                                }
                                // cancelling again is a no-op
                                prop_assert!(!timeline.remove(node));
                            }
                        }
                        Op::Pop => {
                            let popped = timeline.pop_head().map(|(_, at)| at);
                            prop_assert_eq!(popped, model.first().copied());
                            if !model.is_empty() {
                                model.remove(0);
                            }
                        }
                        Op::Clear => {
                            timeline.clear();
                            model.clear();
                            prop_assert!(timeline.peek().is_none());
                        }
                    }
                    timeline.assert_well_formed();
                    prop_assert_eq!(timeline.len(), model.len());
                }
            }
        }
    }
}
