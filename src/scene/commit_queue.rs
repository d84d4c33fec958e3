//! Pending scene additions and removals.
//!
//! Both sides are FIFO. Adding an object cancels a pending removal of the
//! same object and removing one cancels a pending addition, so an add/remove
//! pair queued between two commits never touches the scene.

use std::collections::VecDeque;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use super::object::{GraphicsRenderObject, ObjectId};

/// One FIFO side of the queue. Cancelled entries stay in the deque as stale
/// tickets and are skipped on pop.
#[derive(Default)]
struct PendingList {
    order: VecDeque<(ObjectId, u64)>,
    live: FxHashMap<ObjectId, (u64, Rc<dyn GraphicsRenderObject>)>,
    next_ticket: u64,
}

impl PendingList {
    fn contains(&self, id: ObjectId) -> bool {
        self.live.contains_key(&id)
    }

    fn push(&mut self, object: Rc<dyn GraphicsRenderObject>) {
        let id = object.id();
        if self.live.contains_key(&id) {
            return;
        }
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.order.push_back((id, ticket));
        let _ = self.live.insert(id, (ticket, object));
    }

    fn cancel(&mut self, id: ObjectId) -> bool {
        let cancelled = self.live.remove(&id).is_some();
        if self.live.is_empty() {
            self.order.clear();
        }
        cancelled
    }

    fn pop(&mut self) -> Option<Rc<dyn GraphicsRenderObject>> {
        while let Some((id, ticket)) = self.order.pop_front() {
            if self.live.get(&id).is_some_and(|(t, _)| *t == ticket) {
                return self.live.remove(&id).map(|(_, object)| object);
            }
        }
        None
    }

    fn len(&self) -> usize {
        self.live.len()
    }
}

/// Additions and removals waiting for the next [`Scene::commit`](super::Scene::commit).
#[derive(Default)]
pub struct CommitQueue {
    adds: PendingList,
    removes: PendingList,
}

impl CommitQueue {
    /// Empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an addition, cancelling a pending removal of the same object.
    pub fn add(&mut self, object: Rc<dyn GraphicsRenderObject>) {
        let _ = self.removes.cancel(object.id());
        self.adds.push(object);
    }

    /// Queue a removal, cancelling a pending addition of the same object.
    pub fn remove(&mut self, object: Rc<dyn GraphicsRenderObject>) {
        let _ = self.adds.cancel(object.id());
        self.removes.push(object);
    }

    /// Whether an addition of `id` is pending.
    #[must_use]
    pub fn has_pending_add(&self, id: ObjectId) -> bool {
        self.adds.contains(id)
    }

    /// Whether a removal of `id` is pending.
    #[must_use]
    pub fn has_pending_remove(&self, id: ObjectId) -> bool {
        self.removes.contains(id)
    }

    /// Oldest pending removal.
    pub fn try_get_remove(&mut self) -> Option<Rc<dyn GraphicsRenderObject>> {
        self.removes.pop()
    }

    /// Oldest pending addition.
    pub fn try_get_add(&mut self) -> Option<Rc<dyn GraphicsRenderObject>> {
        self.adds.pop()
    }

    /// No pending work.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adds.len() == 0 && self.removes.len() == 0
    }

    /// Number of pending operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.adds.len() + self.removes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::test_support::TestObject;

    fn ids(queue: &mut CommitQueue) -> (Vec<ObjectId>, Vec<ObjectId>) {
        let mut removes = Vec::new();
        while let Some(o) = queue.try_get_remove() {
            removes.push(o.id());
        }
        let mut adds = Vec::new();
        while let Some(o) = queue.try_get_add() {
            adds.push(o.id());
        }
        (removes, adds)
    }

    #[test]
    fn fifo_order_per_side() {
        let mut queue = CommitQueue::new();
        queue.add(TestObject::rc(3));
        queue.add(TestObject::rc(1));
        queue.remove(TestObject::rc(7));
        queue.add(TestObject::rc(2));
        assert_eq!(queue.len(), 4);
        assert_eq!(ids(&mut queue), (vec![7], vec![3, 1, 2]));
        assert!(queue.is_empty());
    }

    #[test]
    fn duplicate_add_is_ignored() {
        let mut queue = CommitQueue::new();
        queue.add(TestObject::rc(1));
        queue.add(TestObject::rc(1));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn add_then_remove_keeps_only_the_remove() {
        let mut queue = CommitQueue::new();
        queue.add(TestObject::rc(1));
        queue.remove(TestObject::rc(1));
        assert!(!queue.has_pending_add(1));
        assert!(queue.has_pending_remove(1));
        assert_eq!(ids(&mut queue), (vec![1], vec![]));
    }

    #[test]
    fn remove_then_add_keeps_only_the_add() {
        let mut queue = CommitQueue::new();
        queue.remove(TestObject::rc(1));
        queue.add(TestObject::rc(1));
        assert_eq!(ids(&mut queue), (vec![], vec![1]));
    }

    #[test]
    fn readd_after_cancel_goes_to_the_back() {
        let mut queue = CommitQueue::new();
        queue.add(TestObject::rc(1));
        queue.add(TestObject::rc(2));
        queue.remove(TestObject::rc(1));
        queue.add(TestObject::rc(1));
        let (_, adds) = ids(&mut queue);
        assert_eq!(adds, vec![2, 1]);
    }
}
