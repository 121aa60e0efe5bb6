//! Weight buckets. A node's direct children are partitioned into slots, one
//! per distinct weight value, sorted by weight descending. Mirrors
//! `get_or_create_slot`/`h2o_http2_scheduler_slot_t` in `scheduler.c`.

use super::arena::{Arena, Id};
use super::node::RefId;
use super::weight::Weight;

/// Id of a `Slot` inside a `Scheduler`'s slot arena.
pub type SlotId = Id<Slot>;

/// A weight bucket: every child of some node at `weight`, plus the subset of
/// those children that are currently active, each held as a doubly-linked
/// list of `RefId`s (head/tail tracked here, prev/next tracked on the
/// referenced `OpenRefData`, see `LinkStore`).
pub struct Slot {
    pub weight: Weight,
    all_head: Option<RefId>,
    all_tail: Option<RefId>,
    active_head: Option<RefId>,
    active_tail: Option<RefId>,
}

impl Slot {
    fn new(weight: Weight) -> Slot {
        Slot { weight, all_head: None, all_tail: None, active_head: None, active_tail: None }
    }

    pub fn all_head(&self) -> Option<RefId> {
        self.all_head
    }

    pub fn active_head(&self) -> Option<RefId> {
        self.active_head
    }

    pub fn active_is_empty(&self) -> bool {
        self.active_head.is_none()
    }
}

/// A node's ordered list of its direct children's weight buckets, sorted by
/// weight descending (spec.md P1). Both the scheduler root and every open
/// reference own one of these — see `Parent` in `node.rs`.
pub type SlotList = Vec<SlotId>;

/// Abstraction over "whatever storage holds each `RefId`'s prev/next
/// pointers for its two lists", implemented by `OpenRefData` via
/// `node::RefStore`. Kept as a trait so the slot arena's list bookkeeping
/// doesn't need to know about `OpenRefData` directly.
pub trait LinkStore {
    fn all_prev(&self, id: RefId) -> Option<RefId>;
    fn all_next(&self, id: RefId) -> Option<RefId>;
    fn set_all_prev(&mut self, id: RefId, value: Option<RefId>);
    fn set_all_next(&mut self, id: RefId, value: Option<RefId>);
    fn active_prev(&self, id: RefId) -> Option<RefId>;
    fn active_next(&self, id: RefId) -> Option<RefId>;
    fn set_active_prev(&mut self, id: RefId, value: Option<RefId>);
    fn set_active_next(&mut self, id: RefId, value: Option<RefId>);
}

pub struct SlotArena {
    arena: Arena<Slot>,
}

impl SlotArena {
    pub fn new() -> SlotArena {
        SlotArena { arena: Arena::new() }
    }

    pub fn get(&self, id: SlotId) -> &Slot {
        self.arena.get(id).expect("SlotId must reference a live slot")
    }

    fn get_mut(&mut self, id: SlotId) -> &mut Slot {
        self.arena.get_mut(id).expect("SlotId must reference a live slot")
    }

    pub fn free(&mut self, id: SlotId) {
        self.arena.remove(id);
    }

    /// `get_or_create_slot(node, weight)`: scans `slots` (already sorted
    /// descending) for a slot at `weight`; if absent, inserts a new empty
    /// slot at the position that keeps the list sorted.
    pub fn get_or_create_slot(&mut self, slots: &mut SlotList, weight: Weight) -> SlotId {
        let mut insert_at = slots.len();
        for (i, &slot_id) in slots.iter().enumerate() {
            let slot_weight = self.get(slot_id).weight;
            if slot_weight == weight {
                return slot_id;
            } else if slot_weight < weight {
                insert_at = i;
                break;
            }
        }
        let slot_id = self.arena.insert(Slot::new(weight));
        slots.insert(insert_at, slot_id);
        slot_id
    }

    /// Appends `child` to the tail of `slot`'s `all_refs`.
    pub fn push_all_tail(&mut self, slot: SlotId, child: RefId, links: &mut impl LinkStore) {
        let old_tail = self.get(slot).all_tail;
        links.set_all_prev(child, old_tail);
        links.set_all_next(child, None);
        match old_tail {
            Some(tail) => links.set_all_next(tail, Some(child)),
            None => self.get_mut(slot).all_head = Some(child),
        }
        self.get_mut(slot).all_tail = Some(child);
    }

    /// Removes `child` from `slot`'s `all_refs`, wherever it sits.
    pub fn unlink_all(&mut self, slot: SlotId, child: RefId, links: &mut impl LinkStore) {
        let prev = links.all_prev(child);
        let next = links.all_next(child);
        match prev {
            Some(p) => links.set_all_next(p, next),
            None => self.get_mut(slot).all_head = next,
        }
        match next {
            Some(n) => links.set_all_prev(n, prev),
            None => self.get_mut(slot).all_tail = prev,
        }
        links.set_all_prev(child, None);
        links.set_all_next(child, None);
    }

    /// Appends `child` to the tail of `slot`'s `active_refs`.
    pub fn push_active_tail(&mut self, slot: SlotId, child: RefId, links: &mut impl LinkStore) {
        let old_tail = self.get(slot).active_tail;
        links.set_active_prev(child, old_tail);
        links.set_active_next(child, None);
        match old_tail {
            Some(tail) => links.set_active_next(tail, Some(child)),
            None => self.get_mut(slot).active_head = Some(child),
        }
        self.get_mut(slot).active_tail = Some(child);
    }

    /// Removes `child` from `slot`'s `active_refs`, wherever it sits.
    pub fn unlink_active(&mut self, slot: SlotId, child: RefId, links: &mut impl LinkStore) {
        let prev = links.active_prev(child);
        let next = links.active_next(child);
        match prev {
            Some(p) => links.set_active_next(p, next),
            None => self.get_mut(slot).active_head = next,
        }
        match next {
            Some(n) => links.set_active_prev(n, prev),
            None => self.get_mut(slot).active_tail = prev,
        }
        links.set_active_prev(child, None);
        links.set_active_next(child, None);
    }

    /// Moves `child` to the tail of `slot`'s `active_refs` (unlink, then
    /// push-tail); used by `iterate`'s round-robin requeue.
    pub fn move_active_to_tail(&mut self, slot: SlotId, child: RefId, links: &mut impl LinkStore) {
        self.unlink_active(slot, child, links);
        self.push_active_tail(slot, child, links);
    }
}

impl Default for SlotArena {
    fn default() -> SlotArena {
        SlotArena::new()
    }
}
