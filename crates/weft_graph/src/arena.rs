//! Generational slot arena for ID-indexed storage of graph entities.
//!
//! Unlike an append-only arena, graph entities come and go: accessors are
//! destroyed on disconnect and cells on teardown. [`SlotArena`] reuses
//! freed slots and bumps a per-slot generation so stale IDs resolve to
//! `None` rather than to whatever was allocated next.

use std::marker::PhantomData;

/// Trait for opaque ID types used as slot-arena keys.
pub trait SlotId: Copy {
    /// Creates an ID from a slot index and generation.
    fn from_parts(index: u32, generation: u32) -> Self;

    /// Returns the slot index.
    fn index(self) -> u32;

    /// Returns the generation counter.
    fn generation(self) -> u32;
}

#[derive(Debug, Clone)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// A slot-reusing, generation-checked container for graph entities.
#[derive(Debug, Clone)]
pub struct SlotArena<I: SlotId, T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    live: usize,
    _marker: PhantomData<I>,
}

impl<I: SlotId, T> Default for SlotArena<I, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: SlotId, T> SlotArena<I, T> {
    /// Creates a new, empty arena.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
            _marker: PhantomData,
        }
    }

    /// Inserts an item and returns its ID.
    pub fn insert(&mut self, item: T) -> I {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(item);
            I::from_parts(index, slot.generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                value: Some(item),
            });
            I::from_parts(index, 0)
        }
    }

    /// Removes an item, returning it if the ID was live.
    ///
    /// The slot's generation is bumped so the ID (and any copy of it)
    /// becomes stale.
    pub fn remove(&mut self, id: I) -> Option<T> {
        let slot = self.slots.get_mut(id.index() as usize)?;
        if slot.generation != id.generation() || slot.value.is_none() {
            return None;
        }
        let item = slot.value.take();
        slot.generation += 1;
        self.free.push(id.index());
        self.live -= 1;
        item
    }

    /// Returns a reference to the item, or `None` if the ID is stale.
    pub fn get(&self, id: I) -> Option<&T> {
        let slot = self.slots.get(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.value.as_ref()
    }

    /// Returns a mutable reference to the item, or `None` if the ID is
    /// stale.
    pub fn get_mut(&mut self, id: I) -> Option<&mut T> {
        let slot = self.slots.get_mut(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.value.as_mut()
    }

    /// Returns `true` if the ID refers to a live item.
    pub fn contains(&self, id: I) -> bool {
        self.get(id).is_some()
    }

    /// Number of live items.
    pub fn len(&self) -> usize {
        self.live
    }

    /// Returns `true` if the arena holds no live items.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Iterates over `(ID, &T)` pairs of live items in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (I, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.value
                .as_ref()
                .map(|v| (I::from_parts(i as u32, slot.generation), v))
        })
    }

    /// IDs of all live items in slot order.
    pub fn ids(&self) -> Vec<I> {
        self.iter().map(|(id, _)| id).collect()
    }
}
