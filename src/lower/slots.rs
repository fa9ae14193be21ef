//! Local variable slot assignment
//!
//! Slots are handed out in declaration order and given back when the
//! declaring block ends, so sibling scopes share the same slots.

use log::trace;

use crate::error::{Error, Result};
use crate::types::Type;

#[derive(Debug, Default, Clone)]
pub(crate) struct SlotAllocator {
    next: u16,
    max: u16,
}

impl SlotAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next slot (two for `long`/`double`)
    pub fn alloc(&mut self, ty: &Type) -> Result<u16> {
        let slot = self.next;
        let size = ty.slot_size().max(1);
        self.next = slot
            .checked_add(size)
            .ok_or_else(|| Error::invalid_state("method needs more than 65535 local slots"))?;
        self.max = self.max.max(self.next);
        trace!("slot {slot} assigned ({ty})");
        Ok(slot)
    }

    /// Current high-water position, to be restored with [`Self::release`]
    pub fn mark(&self) -> u16 {
        self.next
    }

    pub fn release(&mut self, mark: u16) {
        if mark < self.next {
            trace!("slots {mark}..{} released", self.next);
            self.next = mark;
        }
    }

    pub fn max(&self) -> u16 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wide_types_take_two_slots() {
        let mut slots = SlotAllocator::new();
        assert_eq!(slots.alloc(&Type::long()).unwrap(), 0);
        assert_eq!(slots.alloc(&Type::int()).unwrap(), 2);
        assert_eq!(slots.alloc(&Type::double()).unwrap(), 3);
        assert_eq!(slots.max(), 5);
    }

    #[test]
    fn test_sibling_scopes_reuse_slots() {
        let mut slots = SlotAllocator::new();
        slots.alloc(&Type::object()).unwrap();
        let mark = slots.mark();
        assert_eq!(slots.alloc(&Type::int()).unwrap(), 1);
        slots.release(mark);
        assert_eq!(slots.alloc(&Type::string()).unwrap(), 1);
        assert_eq!(slots.max(), 2);
    }
}
