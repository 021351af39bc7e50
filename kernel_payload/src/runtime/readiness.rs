use std::collections::HashSet;
use std::sync::Arc;

use super::ArgBinding;
use crate::resource::Allocation;

/// Counts arguments bound at least once since creation or their last unbind.
#[derive(Clone, Debug)]
pub struct ReadinessTracker {
    patched_count: u32,
    required: u32,
    stateless_uncacheable_count: u32,
}

impl ReadinessTracker {
    pub fn new(required: u32) -> Self {
        Self {
            patched_count: 0,
            required,
            stateless_uncacheable_count: 0,
        }
    }
    pub fn on_bind(&mut self, binding: &mut ArgBinding) {
        if !binding.is_patched {
            binding.is_patched = true;
            self.patched_count += 1;
        }
    }
    pub fn on_unbind(&mut self, binding: &mut ArgBinding) {
        if binding.is_patched {
            binding.is_patched = false;
            self.patched_count -= 1;
        }
        self.set_stateless_uncacheable(binding, false);
    }
    pub fn set_stateless_uncacheable(&mut self, binding: &mut ArgBinding, uncacheable: bool) {
        match (binding.is_stateless_uncacheable, uncacheable) {
            (false, true) => self.stateless_uncacheable_count += 1,
            (true, false) => self.stateless_uncacheable_count -= 1,
            _ => {}
        }
        binding.is_stateless_uncacheable = uncacheable;
    }
    #[inline]
    pub fn patched_count(&self) -> u32 {
        self.patched_count
    }
    #[inline]
    pub fn stateless_uncacheable_count(&self) -> u32 {
        self.stateless_uncacheable_count
    }
    #[inline]
    pub fn is_fully_bound(&self) -> bool {
        self.patched_count == self.required
    }
}

/// Per argument allocation whose writes must be flushed from L3 after the
/// dispatch.
#[derive(Clone, Debug)]
pub struct CacheFlushSet(Vec<Option<Arc<Allocation>>>);

impl CacheFlushSet {
    pub fn new(arg_count: usize) -> Self {
        Self(vec![None; arg_count])
    }
    /// Replaces the slot of `index`; allocations that do not need a flush
    /// leave it empty.
    pub fn set(&mut self, index: usize, allocation: Option<Arc<Allocation>>) {
        self.0[index] = allocation.filter(|a| a.flush_l3_required);
    }
    #[inline]
    pub fn get(&self, index: usize) -> Option<&Arc<Allocation>> {
        self.0[index].as_ref()
    }
    /// Distinct allocations in argument order.
    pub fn allocations(&self) -> Vec<Arc<Allocation>> {
        let mut seen = HashSet::new();
        self.0
            .iter()
            .flatten()
            .filter(|a| seen.insert(a.id))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::resource::AllocationKind;

    #[test]
    fn count_once_per_index() {
        let mut tracker = ReadinessTracker::new(2);
        let mut a = ArgBinding::default();
        let mut b = ArgBinding::default();
        tracker.on_bind(&mut a);
        tracker.on_bind(&mut a);
        assert_eq!(tracker.patched_count(), 1);
        assert!(!tracker.is_fully_bound());
        tracker.on_bind(&mut b);
        assert!(tracker.is_fully_bound());
        tracker.on_unbind(&mut a);
        tracker.on_unbind(&mut a);
        assert_eq!(tracker.patched_count(), 1);
        assert!(!a.is_patched);
    }

    #[test]
    fn uncacheable_accounting() {
        let mut tracker = ReadinessTracker::new(1);
        let mut a = ArgBinding::default();
        tracker.set_stateless_uncacheable(&mut a, true);
        tracker.set_stateless_uncacheable(&mut a, true);
        assert_eq!(tracker.stateless_uncacheable_count(), 1);
        tracker.on_unbind(&mut a);
        assert_eq!(tracker.stateless_uncacheable_count(), 0);
    }

    #[test]
    fn flush_set_keeps_only_flushable() {
        let plain = Arc::new(Allocation::new(AllocationKind::Buffer, 0x1000, 64));
        let dirty = Arc::new(Allocation::new(AllocationKind::Buffer, 0x2000, 64).with_flush_l3());
        let mut set = CacheFlushSet::new(3);
        set.set(0, Some(plain));
        set.set(1, Some(dirty.clone()));
        set.set(2, Some(dirty.clone()));
        assert!(set.get(0).is_none());
        let all = set.allocations();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, dirty.id);
        set.set(1, None);
        set.set(2, None);
        assert!(set.allocations().is_empty());
    }
}
