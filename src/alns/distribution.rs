//! Weighted random sampling over labelled items.
//!
//! Each item owns a probability bin of length `weight / Σ weights`. Bins are laid
//! out contiguously over [0, 1) in insertion order and rebuilt after every weight
//! mutation, so a fixed seed always yields the same draws.

use rand::Rng;
use serde::Serialize;

/// An item together with its label, weight and probability bin
#[derive(Debug, Clone, Serialize)]
pub struct WeightedItem<T> {
    pub item: T,
    pub label: String,
    pub weight: f64,
    /// Lower bound of the bin (inclusive)
    pub lower: f64,
    /// Upper bound of the bin (exclusive)
    pub upper: f64,
}

impl<T> WeightedItem<T> {
    pub fn probability(&self) -> f64 {
        self.upper - self.lower
    }

    fn contains(&self, r: f64) -> bool {
        self.lower <= r && r < self.upper
    }
}

/// Roulette wheel over a list of items with adaptive weights
#[derive(Debug, Clone, Serialize)]
pub struct WeightedDistribution<T> {
    items: Vec<WeightedItem<T>>,
}

impl<T> Default for WeightedDistribution<T> {
    fn default() -> Self {
        WeightedDistribution { items: Vec::new() }
    }
}

impl<T: Clone + PartialEq> WeightedDistribution<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an item with weight 1
    pub fn add(&mut self, item: T, label: &str) {
        self.add_weighted(item, label, 1.0);
    }

    pub fn add_weighted(&mut self, item: T, label: &str, weight: f64) {
        self.items.push(WeightedItem {
            item,
            label: label.to_string(),
            weight: weight.max(0.0),
            lower: 0.0,
            upper: 0.0,
        });
        self.rebuild();
    }

    pub fn remove(&mut self, item: &T) -> bool {
        let before = self.items.len();
        self.items.retain(|w| &w.item != item);
        let removed = self.items.len() != before;
        if removed {
            self.rebuild();
        }
        removed
    }

    pub fn remove_label(&mut self, label: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|w| w.label != label);
        let removed = self.items.len() != before;
        if removed {
            self.rebuild();
        }
        removed
    }

    pub fn remove_all(&mut self, items: &[T]) {
        self.items.retain(|w| !items.contains(&w.item));
        self.rebuild();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[WeightedItem<T>] {
        &self.items
    }

    /// Draw r ~ U[0, 1) and return the item whose bin contains it
    pub fn draw<R: Rng>(&self, rng: &mut R) -> Option<&T> {
        if self.items.is_empty() {
            return None;
        }
        let r: f64 = rng.gen();
        self.items
            .iter()
            .find(|w| w.contains(r))
            // r may fall past the last bin when the cumulative sum rounds below 1
            .or_else(|| self.items.iter().rev().find(|w| w.probability() > 0.0))
            .or_else(|| self.items.last())
            .map(|w| &w.item)
    }

    fn find(&self, item: &T) -> Option<&WeightedItem<T>> {
        self.items.iter().find(|w| &w.item == item)
    }

    pub fn weight_of(&self, item: &T) -> Option<f64> {
        self.find(item).map(|w| w.weight)
    }

    pub fn probability_of(&self, item: &T) -> Option<f64> {
        self.find(item).map(|w| w.probability())
    }

    pub fn label_of(&self, item: &T) -> Option<&str> {
        self.find(item).map(|w| w.label.as_str())
    }

    /// Set the weight (clamped to ≥ 0); returns false for unknown items
    pub fn set_weight(&mut self, item: &T, weight: f64) -> bool {
        match self.items.iter_mut().find(|w| &w.item == item) {
            Some(w) => {
                w.weight = weight.max(0.0);
                self.rebuild();
                true
            }
            None => false,
        }
    }

    pub fn reset_weights(&mut self) {
        for w in &mut self.items {
            w.weight = 1.0;
        }
        self.rebuild();
    }

    /// Multiply the weight of every item in `subset` by `|factor|`, rebuilding once
    pub fn scale_weights(&mut self, subset: &[T], factor: f64) {
        let factor = factor.abs();
        for w in self.items.iter_mut().filter(|w| subset.contains(&w.item)) {
            w.weight *= factor;
        }
        self.rebuild();
    }

    fn extreme<F: Fn(f64, f64) -> bool>(&self, better: F) -> Vec<T> {
        let Some(first) = self.items.first() else {
            return Vec::new();
        };
        let target = self
            .items
            .iter()
            .map(|w| w.weight)
            .fold(first.weight, |acc, w| if better(w, acc) { w } else { acc });
        self.items
            .iter()
            .filter(|w| w.weight == target)
            .map(|w| w.item.clone())
            .collect()
    }

    /// First item with the maximal weight
    pub fn most_probable(&self) -> Option<T> {
        self.most_probable_all().into_iter().next()
    }

    /// First item with the minimal weight
    pub fn least_probable(&self) -> Option<T> {
        self.least_probable_all().into_iter().next()
    }

    /// All items tied at the maximal weight
    pub fn most_probable_all(&self) -> Vec<T> {
        self.extreme(|w, acc| w > acc)
    }

    /// All items tied at the minimal weight
    pub fn least_probable_all(&self) -> Vec<T> {
        self.extreme(|w, acc| w < acc)
    }

    /// (label, weight) pairs in insertion order
    pub fn snapshot(&self) -> Vec<(String, f64)> {
        self.items.iter().map(|w| (w.label.clone(), w.weight)).collect()
    }

    /// Recompute the bins as cumulative normalised weights in insertion order.
    ///
    /// When every weight is zero the bins fall back to equal lengths.
    fn rebuild(&mut self) {
        let total: f64 = self.items.iter().map(|w| w.weight).sum();
        let n = self.items.len() as f64;
        let mut cumulative = 0.0;
        for w in &mut self.items {
            let share = if total > 0.0 { w.weight / total } else { 1.0 / n };
            w.lower = cumulative;
            cumulative += share;
            w.upper = cumulative;
        }
        if let Some(last) = self.items.iter_mut().rev().find(|w| w.upper > w.lower) {
            last.upper = 1.0;
        }
    }
}
