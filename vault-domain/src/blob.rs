//! `BlobRef` (§3/§4.5): the reference count attached to a content-addressed
//! blob, persisted at `{blob}.ref` through Storage.

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BlobRef {
    pub count: u64,
}

impl BlobRef {
    pub fn increment(&mut self, delta: i64) {
        if delta >= 0 {
            self.count = self.count.saturating_add(delta as u64);
        } else {
            self.count = self.count.saturating_sub((-delta) as u64);
        }
    }

    pub fn is_orphaned(&self) -> bool {
        self.count == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increment_and_decrement_to_zero() {
        let mut r = BlobRef::default();
        r.increment(1);
        r.increment(1);
        assert_eq!(r.count, 2);
        r.increment(-2);
        assert!(r.is_orphaned());
    }

    #[test]
    fn decrement_below_zero_saturates() {
        let mut r = BlobRef::default();
        r.increment(-5);
        assert!(r.is_orphaned());
    }
}
