//! The stream priority scheduler: an in-memory, purely synchronous data
//! structure that decides which of many open HTTP/2 streams should be
//! serviced next. It performs no I/O and knows nothing about framing, flow
//! control, or stream state machines (see `SPEC_FULL.md` — those live
//! outside this module's scope).
//!
//! Ported from `h2o`'s `lib/http2/scheduler.c`, generalizing the teacher
//! repo's unweighted, dependency-only `PriorityManager`
//! (`http/flow/prioritymanager.rs`) to the full weighted, round-robin
//! design described by RFC 7540 §5.3.

mod arena;
mod error;
mod node;
mod slot;

pub use error::SchedulerError;
pub use node::{Parent, RefId};
pub use weight::{Weight, DEFAULT_WEIGHT, MAX_WEIGHT, MIN_WEIGHT};

mod weight;

use log::{debug, trace};

use node::{OpenRefData, RefArena};
use slot::{SlotArena, SlotId, SlotList};

/// The outcome of invoking a `Callback` on one active reference: whether
/// the stream is still active (and so belongs back at the tail of its
/// slot's round-robin) and an optional caller-defined bail-out value.
pub struct CallbackResult<B> {
    pub still_active: bool,
    pub bail_out: Option<B>,
}

impl<B> CallbackResult<B> {
    pub fn keep_active() -> CallbackResult<B> {
        CallbackResult { still_active: true, bail_out: None }
    }

    pub fn done() -> CallbackResult<B> {
        CallbackResult { still_active: false, bail_out: None }
    }

    pub fn bail(value: B) -> CallbackResult<B> {
        CallbackResult { still_active: false, bail_out: Some(value) }
    }
}

/// The capability `iterate` invokes on each reference it visits whose
/// stream itself has data to send.
///
/// `invoke` is given `&mut Scheduler`, so it may `open`, `rebind`, or
/// `set_active` other references as a side effect of being called — the
/// traversal remains correct under this reentrance, since every lookup
/// `iterate` performs after the call re-reads current state rather than
/// relying on anything captured beforehand. Closing `ref_id` itself from
/// within `invoke` is not supported (spec.md §4.8) and will panic once
/// `iterate` resumes and tries to look the reference back up.
pub trait Callback {
    type BailOut;

    fn invoke(&mut self, scheduler: &mut Scheduler, ref_id: RefId) -> CallbackResult<Self::BailOut>;
}

/// Tracks how many full round-robin cycles an `iterate_node` call is
/// allowed to make over a slot's `active_refs` before it must return
/// control to its caller.
///
/// This replaces the reference implementation's pointer-identity sentinel
/// (`readded_first`) with a tagged variant, per the Design Notes. The root
/// call is `Unbounded`: it keeps draining a slot across as many cycles as
/// it takes until the slot empties or the callback bails (this is what
/// produces Scenario 1's `A, C, A, C, A, C, B` from a single top-level
/// `iterate` call). A recursive call starts `Bounded(None)` and arms
/// itself with the first reference it requeues; once the slot's head
/// cycles back around to that reference, the recursive call returns,
/// giving a higher-priority sibling above it a chance to run first.
enum Horizon {
    Unbounded,
    Bounded(Option<RefId>),
}

impl Horizon {
    fn for_node(node: Parent) -> Horizon {
        match node {
            Parent::Root => Horizon::Unbounded,
            Parent::Ref(_) => Horizon::Bounded(None),
        }
    }

    fn should_stop(&self, head: RefId) -> bool {
        matches!(self, Horizon::Bounded(Some(armed)) if *armed == head)
    }

    fn arm(&mut self, r: RefId) {
        if let Horizon::Bounded(mark @ None) = self {
            *mark = Some(r);
        }
    }
}

/// One connection's priority tree. See the module-level docs and
/// `SPEC_FULL.md` for the full protocol.
pub struct Scheduler {
    refs: RefArena,
    slots: SlotArena,
    root_slots: SlotList,
    open_count: u32,
}

impl Scheduler {
    pub fn new() -> Scheduler {
        Scheduler {
            refs: RefArena::new(),
            slots: SlotArena::new(),
            root_slots: SlotList::new(),
            open_count: 0,
        }
    }

    pub fn is_open(&self, ref_id: RefId) -> bool {
        self.refs.contains(ref_id)
    }

    pub fn weight_of(&self, ref_id: RefId) -> Option<Weight> {
        self.refs.try_get(ref_id).map(|data| data.weight)
    }

    pub fn parent_of(&self, ref_id: RefId) -> Option<Parent> {
        self.refs.try_get(ref_id).map(|data| data.parent)
    }

    fn slots_of(&self, node: Parent) -> &SlotList {
        match node {
            Parent::Root => &self.root_slots,
            Parent::Ref(id) => &self.refs.get(id).slots,
        }
    }

    fn get_or_create_slot_for(&mut self, node: Parent, weight: Weight) -> SlotId {
        let before = self.slots_of(node).len();
        let slot_id = match node {
            Parent::Root => self.slots.get_or_create_slot(&mut self.root_slots, weight),
            Parent::Ref(id) => {
                // Taken out and put back to avoid borrowing `self.refs` and
                // `self.slots` mutably at the same time through one path.
                let mut slots = std::mem::take(&mut self.refs.get_mut(id).slots);
                let slot_id = self.slots.get_or_create_slot(&mut slots, weight);
                self.refs.get_mut(id).slots = slots;
                slot_id
            }
        };
        if self.slots_of(node).len() != before {
            debug!("scheduler new slot: node={:?} weight={}", node, weight.get());
        }
        slot_id
    }

    /// Creates a new open reference as a child of `parent` at `weight`. If
    /// `exclusive`, `parent`'s previous children become children of the new
    /// reference instead (§4.2, §4.5).
    pub fn open(&mut self, parent: Parent, weight: Weight, exclusive: bool) -> RefId {
        trace!("scheduler open: parent={:?} weight={} exclusive={}", parent, weight.get(), exclusive);
        let slot_id = self.get_or_create_slot_for(parent, weight);
        let ref_id = self.refs.insert(OpenRefData::new(parent, weight, slot_id));
        self.slots.push_all_tail(slot_id, ref_id, &mut self.refs);
        self.open_count += 1;
        if exclusive {
            self.convert_to_exclusive(parent, ref_id);
        }
        ref_id
    }

    /// Destroys `ref_id`, reparenting its children onto its own parent
    /// before unlinking it (§4.3).
    pub fn close(&mut self, ref_id: RefId) -> Result<(), SchedulerError> {
        trace!("scheduler close: ref={:?}", ref_id);
        if !self.refs.contains(ref_id) {
            return Err(SchedulerError::NotOpen);
        }

        let parent = self.refs.get(ref_id).parent;

        // 1. Splice every child of `ref_id` onto `ref_id`'s own parent,
        // collapsing one level of the tree.
        let own_slots: Vec<SlotId> = self.refs.get(ref_id).slots.clone();
        for slot_id in &own_slots {
            while let Some(child) = self.slots.get(*slot_id).all_head() {
                self.rebind(parent, child, false)
                    .expect("child enumerated from ref's own all_refs must be open");
            }
        }

        // 2./3. Unlink `ref_id` itself from its parent's slot, propagating
        // the active-count decrement if it was active.
        let slot = self.refs.get(ref_id).slot;
        self.slots.unlink_all(slot, ref_id, &mut self.refs);
        if self.refs.get(ref_id).self_is_active {
            debug_assert_eq!(self.refs.get(ref_id).active_cnt, 1);
            self.slots.unlink_active(slot, ref_id, &mut self.refs);
            self.decr_active_cnt(parent);
        } else {
            debug_assert_eq!(self.refs.get(ref_id).active_cnt, 0);
        }

        // 4. Release `ref_id`'s own (now-empty) slot storage.
        for slot_id in own_slots {
            self.slots.free(slot_id);
        }
        self.refs.remove(ref_id);
        self.open_count -= 1;
        Ok(())
    }

    /// Moves `ref_id` to be a child of `new_parent`, preserving its weight.
    /// A no-op if `new_parent` is already `ref_id`'s parent (L2) — this is
    /// relied on by `convert_to_exclusive`'s termination argument and by
    /// callers that re-bind defensively during a traversal.
    ///
    /// Does not change `ref_id`'s weight; re-prioritizing with a new weight
    /// requires `close` followed by `open` (spec.md §9, confirmed).
    pub fn rebind(&mut self, new_parent: Parent, ref_id: RefId, exclusive: bool) -> Result<(), SchedulerError> {
        trace!("scheduler rebind: ref={:?} new_parent={:?} exclusive={}", ref_id, new_parent, exclusive);
        if !self.refs.contains(ref_id) {
            return Err(SchedulerError::NotOpen);
        }

        let old_parent = self.refs.get(ref_id).parent;
        if old_parent == new_parent {
            return Ok(());
        }

        let weight = self.refs.get(ref_id).weight;
        let old_slot = self.refs.get(ref_id).slot;
        let new_slot = self.get_or_create_slot_for(new_parent, weight);

        self.slots.unlink_all(old_slot, ref_id, &mut self.refs);
        self.slots.push_all_tail(new_slot, ref_id, &mut self.refs);
        {
            let data = self.refs.get_mut(ref_id);
            data.slot = new_slot;
            data.parent = new_parent;
        }

        if self.refs.get(ref_id).is_active_linked() {
            self.slots.unlink_active(old_slot, ref_id, &mut self.refs);
            self.slots.push_active_tail(new_slot, ref_id, &mut self.refs);
            self.decr_active_cnt(old_parent);
            self.incr_active_cnt(new_parent);
        }

        if exclusive {
            self.convert_to_exclusive(new_parent, ref_id);
        }
        Ok(())
    }

    /// `added` has just been placed at the tail of one of `parent`'s slots;
    /// displace every other child of `parent` (across every slot) onto
    /// `added`, preserving each child's own weight (§4.5).
    ///
    /// Terminates because `added` is known to be the tail of its slot: by
    /// the time the walk reaches that slot, every other sibling has already
    /// been moved away, leaving `added` as the sole remaining entry.
    fn convert_to_exclusive(&mut self, parent: Parent, added: RefId) {
        let slot_ids: Vec<SlotId> = self.slots_of(parent).clone();
        for slot_id in slot_ids {
            loop {
                match self.slots.get(slot_id).all_head() {
                    None => break,
                    Some(child) if child == added => break,
                    Some(child) => {
                        debug!("scheduler exclusive displace: child={:?} added={:?}", child, added);
                        self.rebind(Parent::Ref(added), child, false)
                            .expect("child enumerated from parent's own all_refs must be open");
                    }
                }
            }
        }
    }

    /// Marks `ref_id` active (the stream has data ready to send).
    /// Precondition: `ref_id` is not already active.
    pub fn set_active(&mut self, ref_id: RefId) -> Result<(), SchedulerError> {
        trace!("scheduler set_active: ref={:?}", ref_id);
        if !self.refs.contains(ref_id) {
            return Err(SchedulerError::NotOpen);
        }
        if self.refs.get(ref_id).self_is_active {
            return Err(SchedulerError::AlreadyActive);
        }
        self.refs.get_mut(ref_id).self_is_active = true;
        self.incr_active_cnt(Parent::Ref(ref_id));
        Ok(())
    }

    fn incr_active_cnt(&mut self, node: Parent) {
        let ref_id = match node {
            Parent::Root => return,
            Parent::Ref(id) => id,
        };
        let data = self.refs.get_mut(ref_id);
        data.active_cnt += 1;
        if data.active_cnt != 1 {
            return;
        }
        let (slot, parent) = (data.slot, data.parent);
        self.slots.push_active_tail(slot, ref_id, &mut self.refs);
        self.incr_active_cnt(parent);
    }

    fn decr_active_cnt(&mut self, node: Parent) {
        let ref_id = match node {
            Parent::Root => return,
            Parent::Ref(id) => id,
        };
        let data = self.refs.get_mut(ref_id);
        debug_assert!(data.active_cnt > 0);
        data.active_cnt -= 1;
        if data.active_cnt != 0 {
            return;
        }
        let (slot, parent) = (data.slot, data.parent);
        self.slots.unlink_active(slot, ref_id, &mut self.refs);
        self.decr_active_cnt(parent);
    }

    /// Walks the scheduler's active references depth-first, weight-major,
    /// round-robin among equal-weight siblings, invoking `cb` on every
    /// reference whose own stream is active. Returns the first non-`None`
    /// bail-out value `cb` produces, if any (spec.md §4.8, §7).
    ///
    /// A served reference is always moved to the tail of its slot's
    /// `active_refs` before `cb`'s bail-out is checked — the reorder
    /// persists even on a bail (spec.md §9, confirmed against the
    /// reference implementation).
    pub fn iterate<C: Callback>(&mut self, cb: &mut C) -> Option<C::BailOut> {
        self.iterate_node(Parent::Root, cb)
    }

    fn iterate_node<C: Callback>(&mut self, node: Parent, cb: &mut C) -> Option<C::BailOut> {
        let slot_ids: Vec<SlotId> = self.slots_of(node).clone();
        let mut horizon = Horizon::for_node(node);

        for slot_id in slot_ids {
            loop {
                let head = match self.slots.get(slot_id).active_head() {
                    Some(head) if !horizon.should_stop(head) => head,
                    _ => break,
                };

                if self.refs.get(head).self_is_active {
                    debug_assert!(self.refs.get(head).active_cnt != 0);
                    let result = cb.invoke(self, head);
                    if result.still_active {
                        self.slots.move_active_to_tail(slot_id, head, &mut self.refs);
                        horizon.arm(head);
                    } else {
                        self.refs.get_mut(head).self_is_active = false;
                        self.decr_active_cnt(Parent::Ref(head));
                        if self.refs.get(head).active_cnt != 0 {
                            self.slots.move_active_to_tail(slot_id, head, &mut self.refs);
                        }
                    }
                    if let Some(bail) = result.bail_out {
                        return Some(bail);
                    }
                } else {
                    self.slots.move_active_to_tail(slot_id, head, &mut self.refs);
                    let bail = self.iterate_node(Parent::Ref(head), cb);
                    if self.refs.get(head).is_active_linked() {
                        horizon.arm(head);
                    }
                    if bail.is_some() {
                        return bail;
                    }
                }
            }
        }
        None
    }

    /// Frees every slot owned by the root. Precondition: every reference
    /// opened on this scheduler has already been `close`d.
    pub fn dispose(mut self) -> Result<(), SchedulerError> {
        if self.open_count != 0 {
            return Err(SchedulerError::SchedulerNotEmpty);
        }
        for slot_id in self.root_slots.drain(..) {
            self.slots.free(slot_id);
        }
        Ok(())
    }
}

impl Default for Scheduler {
    fn default() -> Scheduler {
        Scheduler::new()
    }
}
