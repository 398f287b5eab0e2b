//! Endless, restartable walk over the control pool.
use crate::item::Item;

/// Cycles over a finite list of control items, forever.
///
/// Yields clones of the pooled items, so that the backing list is kept as is across cycles.
/// An empty pool yields nothing.
#[derive(Debug, Clone)]
pub struct ControlCycle {
    pool: Vec<Item>,
    pos: usize,
}

impl ControlCycle {
    pub fn new(pool: Vec<Item>) -> Self {
        Self { pool, pos: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    /// Size of the underlying pool.
    pub fn pool_len(&self) -> usize {
        self.pool.len()
    }

    /// Go back to the first control.
    pub fn restart(&mut self) {
        self.pos = 0;
    }
}

impl Iterator for ControlCycle {
    type Item = Item;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.pool.get(self.pos)?.clone();
        self.pos = (self.pos + 1) % self.pool.len();
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn control(id: &str) -> Item {
        serde_json::from_value(json!({ "itemID": id })).unwrap()
    }

    #[test]
    fn empty_pool() {
        let mut c = ControlCycle::new(Vec::new());
        assert!(c.is_empty());
        assert_eq!(c.next(), None);
    }

    #[test]
    fn cycles() {
        let c = ControlCycle::new(vec![control("a"), control("b")]);
        let ids: Vec<String> = c.take(5).map(|i| i.id().unwrap()).collect();
        assert_eq!(ids, vec!["a", "b", "a", "b", "a"]);
    }

    #[test]
    fn restart() {
        let mut c = ControlCycle::new(vec![control("a"), control("b")]);
        c.next();
        c.restart();
        assert_eq!(c.next().unwrap().id().unwrap(), "a");
        assert_eq!(c.pool_len(), 2);
    }
}
