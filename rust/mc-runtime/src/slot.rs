//! Fixed-size arena of batch slots.

/// Slots are filled once and freed one by one; a freed slot is never refilled.
#[derive(Debug, Clone)]
pub struct SlotArena<T> {
    slots: Vec<Option<T>>,
    active: usize,
}

impl<T> SlotArena<T> {
    pub fn new(items: Vec<T>) -> Self {
        let active = items.len();
        Self {
            slots: items.into_iter().map(Some).collect(),
            active,
        }
    }

    /// Total slots, active or not.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn active(&self) -> usize {
        self.active
    }

    pub fn get(&self, idx: usize) -> Option<&T> {
        self.slots.get(idx).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut T> {
        self.slots.get_mut(idx).and_then(Option::as_mut)
    }

    /// Empty the slot and hand back its item. Freeing twice returns `None`.
    pub fn free(&mut self, idx: usize) -> Option<T> {
        let item = self.slots.get_mut(idx).and_then(Option::take);
        if item.is_some() {
            self.active -= 1;
        }
        item
    }

    /// Indices of occupied slots, ascending.
    pub fn active_indices(&self) -> Vec<usize> {
        self.iter_active().map(|(i, _)| i).collect()
    }

    pub fn iter_active(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|x| (i, x)))
    }
}
