//! Generational arena of work units plus the alternate map.

use std::ops::{Index, IndexMut};

use rustc_hash::FxHashMap;

use super::WorkUnit;
use crate::id::UnitId;

struct Slot {
    generation: u32,
    unit: Option<WorkUnit>,
}

/// Owner of every work unit.
///
/// Freed slots are recycled with a bumped generation, so handles to freed
/// units stop resolving instead of aliasing the newcomer.
#[derive(Default)]
pub struct UnitArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    alternates: FxHashMap<UnitId, UnitId>,
    len: usize,
}

impl UnitArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a unit and return its handle.
    pub fn insert(&mut self, unit: WorkUnit) -> UnitId {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.unit = Some(unit);
            return UnitId::new(index, slot.generation);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            unit: Some(unit),
        });
        UnitId::new(index, 0)
    }

    /// Free one unit, dropping its alternate link.
    pub fn remove(&mut self, id: UnitId) -> Option<WorkUnit> {
        let slot = self.slots.get_mut(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        let unit = slot.unit.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index());
        self.len -= 1;
        self.unlink(id);
        Some(unit)
    }

    /// Free a unit and its alternate.
    pub fn remove_pair(&mut self, id: UnitId) {
        if let Some(alternate) = self.alternate(id) {
            self.remove(alternate);
        }
        self.remove(id);
    }

    pub fn get(&self, id: UnitId) -> Option<&WorkUnit> {
        let slot = self.slots.get(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.unit.as_ref()
    }

    pub fn get_mut(&mut self, id: UnitId) -> Option<&mut WorkUnit> {
        let slot = self.slots.get_mut(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.unit.as_mut()
    }

    /// Borrow two distinct units mutably at once.
    pub fn pair_mut(&mut self, a: UnitId, b: UnitId) -> Option<(&mut WorkUnit, &mut WorkUnit)> {
        let (ia, ib) = (a.index() as usize, b.index() as usize);
        if ia == ib || ia >= self.slots.len() || ib >= self.slots.len() {
            return None;
        }
        let (low, high) = (ia.min(ib), ia.max(ib));
        let (left, right) = self.slots.split_at_mut(high);
        let (slot_low, slot_high) = (&mut left[low], &mut right[0]);
        let (slot_a, slot_b) = if ia < ib {
            (slot_low, slot_high)
        } else {
            (slot_high, slot_low)
        };
        if slot_a.generation != a.generation() || slot_b.generation != b.generation() {
            return None;
        }
        Some((slot_a.unit.as_mut()?, slot_b.unit.as_mut()?))
    }

    #[inline]
    pub fn contains(&self, id: UnitId) -> bool {
        self.get(id).is_some()
    }

    /// The other buffer's unit at the same identity.
    #[inline]
    pub fn alternate(&self, id: UnitId) -> Option<UnitId> {
        self.alternates.get(&id).copied()
    }

    /// Record `a` and `b` as alternates of each other.
    pub fn link(&mut self, a: UnitId, b: UnitId) {
        self.unlink(a);
        self.unlink(b);
        self.alternates.insert(a, b);
        self.alternates.insert(b, a);
    }

    /// Drop the alternate link of `id` in both directions.
    pub fn unlink(&mut self, id: UnitId) {
        if let Some(other) = self.alternates.remove(&id) {
            self.alternates.remove(&other);
        }
    }

    /// Live units.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Children of `id` in sibling order.
    pub fn children(&self, id: UnitId) -> Vec<UnitId> {
        let mut out = Vec::new();
        let mut cursor = self.get(id).and_then(|u| u.child);
        while let Some(child) = cursor {
            out.push(child);
            cursor = self.get(child).and_then(|u| u.sibling);
        }
        out
    }
}

impl Index<UnitId> for UnitArena {
    type Output = WorkUnit;

    fn index(&self, id: UnitId) -> &WorkUnit {
        match self.get(id) {
            Some(unit) => unit,
            None => panic!("stale unit handle {id:?}"),
        }
    }
}

impl IndexMut<UnitId> for UnitArena {
    fn index_mut(&mut self, id: UnitId) -> &mut WorkUnit {
        match self.get_mut(id) {
            Some(unit) => unit,
            None => panic!("stale unit handle {id:?}"),
        }
    }
}
