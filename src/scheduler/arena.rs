//! A small generational arena used to give every open reference (and every
//! slot) a stable, non-owning handle instead of a raw pointer.
//!
//! `close`/`free` return a slot to a free list; the generation counter
//! guards against a stale handle from a closed reference later being
//! confused with whatever unrelated value ends up reusing that arena slot.

use std::marker::PhantomData;

/// A stable handle into an `Arena<T>`. Parameterized by `T` purely so the
/// type system keeps `RefId` and `SlotId` (both backed by an `Arena`, see
/// `scheduler/slot.rs` and `scheduler/node.rs`) from being accidentally
/// interchanged; no value of `T` is ever actually stored in the handle.
pub struct Id<T> {
    index: u32,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Id<T> {
    fn new(index: u32, generation: u32) -> Id<T> {
        Id { index, generation, _marker: PhantomData }
    }
}

impl<T> Clone for Id<T> {
    fn clone(&self) -> Id<T> {
        *self
    }
}
impl<T> Copy for Id<T> {}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Id<T>) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}
impl<T> Eq for Id<T> {}

impl<T> std::hash::Hash for Id<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> std::fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Id({}, gen={})", self.index, self.generation)
    }
}

enum Entry<T> {
    Occupied { generation: u32, value: T },
    Vacant { generation: u32, next_free: Option<u32> },
}

pub struct Arena<T> {
    entries: Vec<Entry<T>>,
    next_free: Option<u32>,
}

impl<T> Arena<T> {
    pub fn new() -> Arena<T> {
        Arena { entries: Vec::new(), next_free: None }
    }

    pub fn insert(&mut self, value: T) -> Id<T> {
        match self.next_free {
            Some(index) => {
                let (generation, next_free) = match &self.entries[index as usize] {
                    Entry::Vacant { generation, next_free } => (*generation, *next_free),
                    Entry::Occupied { .. } => unreachable!("free list points at an occupied slot"),
                };
                self.next_free = next_free;
                self.entries[index as usize] = Entry::Occupied { generation, value };
                Id::new(index, generation)
            }
            None => {
                let index = self.entries.len() as u32;
                self.entries.push(Entry::Occupied { generation: 0, value });
                Id::new(index, 0)
            }
        }
    }

    pub fn remove(&mut self, id: Id<T>) -> Option<T> {
        match self.entries.get_mut(id.index as usize) {
            Some(Entry::Occupied { generation, .. }) if *generation == id.generation => {
                let next_free = self.next_free;
                let removed = std::mem::replace(
                    &mut self.entries[id.index as usize],
                    Entry::Vacant { generation: id.generation.wrapping_add(1), next_free },
                );
                self.next_free = Some(id.index);
                match removed {
                    Entry::Occupied { value, .. } => Some(value),
                    Entry::Vacant { .. } => unreachable!(),
                }
            }
            _ => None,
        }
    }

    pub fn get(&self, id: Id<T>) -> Option<&T> {
        match self.entries.get(id.index as usize) {
            Some(Entry::Occupied { generation, value }) if *generation == id.generation => Some(value),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, id: Id<T>) -> Option<&mut T> {
        match self.entries.get_mut(id.index as usize) {
            Some(Entry::Occupied { generation, value }) if *generation == id.generation => Some(value),
            _ => None,
        }
    }

    pub fn contains(&self, id: Id<T>) -> bool {
        self.get(id).is_some()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| matches!(e, Entry::Occupied { .. })).count()
    }

    /// Every id currently occupied, in arena-index order. Test-only: used by
    /// the randomized invariant sweep in `scheduler/tests.rs` to enumerate
    /// every open reference without the scheduler needing to expose that as
    /// a public iteration API.
    #[cfg(test)]
    pub fn ids(&self) -> Vec<Id<T>> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| match e {
                Entry::Occupied { generation, .. } => Some(Id::new(i as u32, *generation)),
                Entry::Vacant { .. } => None,
            })
            .collect()
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Arena<T> {
        Arena::new()
    }
}
