//! Entity records and the generation-checked registry that owns them.
//!
//! Records live in a dense slot arena. Watch lists store [`Handle`]s rather
//! than references; releasing a slot bumps its generation so a handle kept
//! past the entity's exit can never resolve to the slot's next occupant.

use std::collections::HashMap;

use crate::geometry::Cell;
use crate::interest::Mask;

/// Caller-assigned entity identifier.
pub type EntityId = i32;

/// Slot index plus generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    slot: u32,
    generation: u32,
}

impl Handle {
    pub(crate) const fn new(slot: u32, generation: u32) -> Self {
        Self { slot, generation }
    }

    pub fn slot(&self) -> u32 {
        self.slot
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

/// A live entity on the map.
#[derive(Debug)]
pub struct Entity {
    pub id: EntityId,
    pub cell: Cell,
    pub mask: Mask,
    /// Entities to notify when this one changes.
    pub interest_me: Vec<Handle>,
}

/// Read-only snapshot of an entity. Coordinates are in cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityView {
    pub id: EntityId,
    pub x: i32,
    pub y: i32,
    pub mask: Mask,
    pub interest_count: usize,
}

impl From<&Entity> for EntityView {
    fn from(entity: &Entity) -> Self {
        Self {
            id: entity.id,
            x: entity.cell.x,
            y: entity.cell.y,
            mask: entity.mask,
            interest_count: entity.interest_me.len(),
        }
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    entity: Option<Entity>,
}

/// Id lookup plus slot arena. Freed slots are reused LIFO.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    slots: Vec<Slot>,
    free: Vec<u32>,
    by_id: HashMap<EntityId, Handle>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn contains_id(&self, id: EntityId) -> bool {
        self.by_id.contains_key(&id)
    }

    pub fn handle_of(&self, id: EntityId) -> Option<Handle> {
        self.by_id.get(&id).copied()
    }

    /// Stores `entity`, which must carry an id not already live.
    pub fn insert(&mut self, entity: Entity) -> Handle {
        let id = entity.id;
        let handle = match self.free.pop() {
            Some(slot) => {
                let entry = &mut self.slots[slot as usize];
                entry.entity = Some(entity);
                Handle::new(slot, entry.generation)
            }
            None => {
                let slot = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    entity: Some(entity),
                });
                Handle::new(slot, 0)
            }
        };
        self.by_id.insert(id, handle);
        handle
    }

    /// Removes the entity behind `handle` and retires the handle.
    pub fn remove(&mut self, handle: Handle) -> Option<Entity> {
        let entry = self.slots.get_mut(handle.slot as usize)?;
        if entry.generation != handle.generation {
            return None;
        }
        let entity = entry.entity.take()?;
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(handle.slot);
        self.by_id.remove(&entity.id);
        Some(entity)
    }

    pub fn get(&self, handle: Handle) -> Option<&Entity> {
        let entry = self.slots.get(handle.slot as usize)?;
        if entry.generation != handle.generation {
            return None;
        }
        entry.entity.as_ref()
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut Entity> {
        let entry = self.slots.get_mut(handle.slot as usize)?;
        if entry.generation != handle.generation {
            return None;
        }
        entry.entity.as_mut()
    }

    pub fn by_id(&self, id: EntityId) -> Option<&Entity> {
        self.get(self.handle_of(id)?)
    }

    /// Live entities with their handles, in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle, &Entity)> + '_ {
        self.slots.iter().enumerate().filter_map(|(slot, entry)| {
            entry
                .entity
                .as_ref()
                .map(|e| (Handle::new(slot as u32, entry.generation), e))
        })
    }

    /// Removes every entity, yielding them for container recycling.
    pub fn drain(&mut self) -> Vec<Entity> {
        let handles: Vec<Handle> = self.by_id.values().copied().collect();
        handles
            .into_iter()
            .filter_map(|handle| self.remove(handle))
            .collect()
    }
}
