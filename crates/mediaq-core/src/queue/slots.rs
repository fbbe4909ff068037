//! Execution slots: the fixed concurrency capacity of the queue.
//!
//! Slots are only touched under the scheduler lock, so a plain counter is
//! enough. A job takes one slot when it is admitted and gives it back when its
//! worker has finished (including after cancellation).

#[derive(Debug)]
pub(crate) struct ExecutionSlots {
    max: usize,
    in_use: usize,
}

impl ExecutionSlots {
    /// Capacity is at least one.
    pub(crate) fn new(max: usize) -> Self {
        Self {
            max: max.max(1),
            in_use: 0,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.max
    }

    pub(crate) fn in_use(&self) -> usize {
        self.in_use
    }

    pub(crate) fn available(&self) -> usize {
        self.max.saturating_sub(self.in_use)
    }

    /// Take a slot if one is free.
    pub(crate) fn try_acquire(&mut self) -> bool {
        if self.in_use < self.max {
            self.in_use += 1;
            true
        } else {
            false
        }
    }

    pub(crate) fn release(&mut self) {
        self.in_use = self.in_use.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_and_release() {
        let mut slots = ExecutionSlots::new(2);
        assert_eq!(slots.available(), 2);
        assert!(slots.try_acquire());
        assert!(slots.try_acquire());
        assert!(!slots.try_acquire());
        assert_eq!(slots.in_use(), 2);
        slots.release();
        assert_eq!(slots.available(), 1);
        slots.release();
        slots.release();
        assert_eq!(slots.in_use(), 0);
    }

    #[test]
    fn zero_capacity_means_one() {
        let mut slots = ExecutionSlots::new(0);
        assert_eq!(slots.capacity(), 1);
        assert!(slots.try_acquire());
        assert!(!slots.try_acquire());
    }
}
