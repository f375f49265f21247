//! Ring-buffer assignment of textures to a fixed set of hardware units.
//!
//! The live window is `[tail, head)` (the whole ring when `full`). Slots below
//! `reserved` hold long-lived bindings and survive window collapses and
//! non-destructive clears.

use super::backend::{BackendError, RenderBackend, TextureId};

#[derive(Debug, thiserror::Error)]
pub enum TextureUnitError {
    #[error("unit {slot} is not reserved (only units below {reserved} are)")]
    NotReserved { slot: usize, reserved: usize },
}

/// Result of [`TextureUnitAllocator::get_unit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitLookup {
    /// Texture already sits in this unit for the current window; no bind needed.
    Resident(u32),
    /// Texture was just given this unit; the caller must bind it.
    Assigned(u32),
}

impl UnitLookup {
    pub fn unit(self) -> u32 {
        match self {
            UnitLookup::Resident(unit) | UnitLookup::Assigned(unit) => unit,
        }
    }

    pub fn needs_bind(self) -> bool {
        matches!(self, UnitLookup::Assigned(_))
    }
}

#[derive(Debug, Clone)]
pub struct TextureUnitAllocator {
    slots: Vec<Option<TextureId>>,
    reserved: usize,
    head: usize,
    tail: usize,
    full: bool,
}

impl TextureUnitAllocator {
    /// `capacity` is clamped to at least one unit and `reserved` to below it.
    pub fn new(capacity: usize, reserved: usize) -> Self {
        let capacity = capacity.max(1);
        let clamped = reserved.min(capacity - 1);
        if clamped != reserved {
            log::warn!(
                "{} reserved texture units requested but only {} available; reserving {}",
                reserved,
                capacity,
                clamped
            );
        }

        let mut allocator = Self {
            slots: vec![None; capacity],
            reserved: clamped,
            head: clamped,
            tail: 0,
            full: false,
        };
        allocator.clear(true);
        allocator
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn reserved(&self) -> usize {
        self.reserved
    }

    pub fn is_full(&self) -> bool {
        self.full
    }

    fn window_len(&self) -> usize {
        if self.full {
            self.capacity()
        } else {
            (self.head + self.capacity() - self.tail) % self.capacity()
        }
    }

    /// Finds or assigns a unit for `texture`.
    ///
    /// When the ring is full, every non-reserved binding is dropped first and
    /// allocation resumes at `tail + reserved`.
    pub fn get_unit(&mut self, texture: TextureId) -> UnitLookup {
        let capacity = self.capacity();
        for offset in 0..self.window_len() {
            let slot = (self.tail + offset) % capacity;
            if self.slots[slot] == Some(texture) {
                return UnitLookup::Resident(slot as u32);
            }
        }

        if self.full {
            self.drop_unreserved();
            self.head = (self.tail + self.reserved) % capacity;
            self.full = false;
        }

        let unit = self.head;
        self.slots[unit] = Some(texture);
        self.head = (self.head + 1) % capacity;
        if self.head == self.tail {
            self.full = true;
        }

        UnitLookup::Assigned(unit as u32)
    }

    /// Pins `texture` to reserved unit `slot`.
    pub fn set_reserved_unit(&mut self, slot: usize, texture: TextureId) -> Result<(), TextureUnitError> {
        if slot >= self.reserved {
            return Err(TextureUnitError::NotReserved {
                slot,
                reserved: self.reserved,
            });
        }
        self.slots[slot] = Some(texture);
        Ok(())
    }

    /// Units that can still be handed out before the window collapses.
    pub fn remaining_units(&self) -> usize {
        self.capacity() - self.window_len()
    }

    /// Resets the window to the reserved prefix, optionally wiping it too.
    pub fn clear(&mut self, delete_reservations: bool) {
        self.drop_unreserved();
        if delete_reservations {
            for slot in &mut self.slots[..self.reserved] {
                *slot = None;
            }
        }
        self.tail = 0;
        self.head = self.reserved % self.capacity();
        self.full = false;
    }

    /// Issues the hardware bind for `texture` at whichever unit holds it.
    ///
    /// Returns `Ok(None)` when the texture holds no unit.
    pub fn bind_to_unit(
        &self,
        backend: &mut dyn RenderBackend,
        texture: TextureId,
    ) -> Result<Option<u32>, BackendError> {
        let Some(unit) = self.slots.iter().position(|s| *s == Some(texture)) else {
            return Ok(None);
        };
        backend.bind_texture(texture, unit as u32)?;
        Ok(Some(unit as u32))
    }

    /// Issues the hardware binds of every occupied reserved unit and returns
    /// how many were bound.
    pub fn bind_reserved(&self, backend: &mut dyn RenderBackend) -> Result<u32, BackendError> {
        let mut bound = 0;
        for (unit, texture) in self.slots[..self.reserved].iter().enumerate() {
            if let Some(texture) = *texture {
                backend.bind_texture(texture, unit as u32)?;
                bound += 1;
            }
        }
        Ok(bound)
    }

    /// Texture held by `unit`, if any.
    pub fn texture_at(&self, unit: usize) -> Option<TextureId> {
        self.slots.get(unit).copied().flatten()
    }

    /// `[0, 1, .., capacity - 1]`, the sampler table uploaded to shaders.
    pub fn unit_table(&self) -> Vec<i32> {
        (0..self.capacity() as i32).collect()
    }

    fn drop_unreserved(&mut self) {
        for slot in &mut self.slots[self.reserved..] {
            *slot = None;
        }
    }
}
