use std::collections::HashMap;

/// Set of site indices with O(1) insert, remove, membership and access by
/// dense ordinal, which is what uniform sampling of the border needs.
///
/// Removal swaps the last element into the hole, so ordinals are not stable
/// across removals.
#[derive(Debug, Clone, Default)]
pub struct DiceSet {
    positions: HashMap<usize, usize>,
    elements: Vec<usize>,
}

impl DiceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        DiceSet {
            positions: HashMap::with_capacity(capacity),
            elements: Vec::with_capacity(capacity),
        }
    }

    /// Inserts `element`; no-op if already present.
    pub fn add(&mut self, element: usize) {
        if self.positions.contains_key(&element) {
            return;
        }
        self.positions.insert(element, self.elements.len());
        self.elements.push(element);
    }

    /// Removes `element`; no-op if absent.
    pub fn remove(&mut self, element: usize) {
        let Some(index) = self.positions.remove(&element) else {
            return;
        };
        let last = self.elements.len() - 1;
        self.elements.swap(index, last);
        self.elements.pop();
        if index < last {
            self.positions.insert(self.elements[index], index);
        }
    }

    pub fn contains(&self, element: usize) -> bool {
        self.positions.contains_key(&element)
    }

    /// Element at dense ordinal `ordinal` in `[0, len)`.
    pub fn get(&self, ordinal: usize) -> Option<usize> {
        self.elements.get(ordinal).copied()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn clear(&mut self) {
        self.positions.clear();
        self.elements.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn add_remove_readd() {
        let mut set = DiceSet::new();
        set.add(1);
        set.add(2);
        set.add(3);
        set.remove(2);
        assert_eq!(set.len(), 2);
        let seen: HashSet<usize> = (0..set.len()).filter_map(|i| set.get(i)).collect();
        assert_eq!(seen, HashSet::from([1, 3]));
        set.add(2);
        assert_eq!(set.len(), 3);
        assert!(set.contains(2));
    }

    #[test]
    fn duplicate_add_and_missing_remove_are_noops() {
        let mut set = DiceSet::new();
        set.add(7);
        set.add(7);
        set.remove(9);
        assert_eq!(set.len(), 1);
        assert_eq!(set.get(0), Some(7));
        assert_eq!(set.get(1), None);
    }

    #[test]
    fn removing_last_and_only_element() {
        let mut set = DiceSet::new();
        set.add(4);
        set.add(5);
        set.remove(5);
        assert_eq!(set.get(0), Some(4));
        set.remove(4);
        assert!(set.is_empty());
        assert!(!set.contains(4));
    }

    #[test]
    fn positions_stay_consistent_under_churn() {
        let mut set = DiceSet::new();
        for i in 0..100 {
            set.add(i);
        }
        for i in (0..100).step_by(3) {
            set.remove(i);
        }
        for ordinal in 0..set.len() {
            let element = set.get(ordinal).unwrap();
            assert_eq!(set.positions[&element], ordinal);
            assert!(element % 3 != 0);
        }
    }
}
