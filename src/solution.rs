//! Solution representation for the CTOP search.
//!
//! A solution is the set of selected clusters. Routing details live in the
//! oracle; the search only manipulates which clusters are in or out. The set
//! keeps insertion order so that heuristics visit clusters deterministically.

use crate::instance::CTOPInstance;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// An ordered, duplicate-free set of cluster ids
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Solution {
    clusters: Vec<usize>,
}

impl Solution {
    /// Create a new empty solution
    pub fn new() -> Self {
        Solution { clusters: Vec::new() }
    }

    /// Build from ids, dropping duplicates but keeping first-seen order
    pub fn from_clusters<I: IntoIterator<Item = usize>>(ids: I) -> Self {
        let mut solution = Solution::new();
        for id in ids {
            solution.insert(id);
        }
        solution
    }

    /// Insert a cluster; returns false when it was already selected
    pub fn insert(&mut self, id: usize) -> bool {
        if self.contains(id) {
            return false;
        }
        self.clusters.push(id);
        true
    }

    pub fn remove(&mut self, id: usize) -> bool {
        match self.clusters.iter().position(|&c| c == id) {
            Some(pos) => {
                self.clusters.remove(pos);
                true
            }
            None => false,
        }
    }

    #[inline]
    pub fn contains(&self, id: usize) -> bool {
        self.clusters.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    pub fn clusters(&self) -> &[usize] {
        &self.clusters
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.clusters.iter().copied()
    }

    /// Order-independent identity of the set
    pub fn key(&self) -> Vec<usize> {
        let mut key = self.clusters.clone();
        key.sort_unstable();
        key
    }

    /// Same clusters regardless of order
    pub fn same_set(&self, other: &Solution) -> bool {
        self.len() == other.len() && self.key() == other.key()
    }

    /// Clusters of `self` that are not in `other`, in `self`'s order
    pub fn difference(&self, other: &Solution) -> Vec<usize> {
        let theirs: HashSet<usize> = other.iter().collect();
        self.iter().filter(|c| !theirs.contains(c)).collect()
    }

    /// Copy without the given clusters
    pub fn without(&self, removed: &[usize]) -> Solution {
        Solution {
            clusters: self.iter().filter(|c| !removed.contains(c)).collect(),
        }
    }

    /// Copy with the given clusters appended
    pub fn with(&self, added: &[usize]) -> Solution {
        let mut copy = self.clone();
        for &c in added {
            copy.insert(c);
        }
        copy
    }

    /// Sum of cluster profits; an upper bound on what the oracle may report
    pub fn profit(&self, instance: &CTOPInstance) -> f64 {
        instance.profit_of(&self.clusters)
    }
}

impl std::fmt::Display for Solution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.clusters)
    }
}

impl FromIterator<usize> for Solution {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        Solution::from_clusters(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solution_creation() {
        let sol = Solution::new();
        assert!(sol.is_empty());
        assert_eq!(sol.len(), 0);
    }

    #[test]
    fn test_insert_keeps_order_and_rejects_duplicates() {
        let mut sol = Solution::from_clusters([3, 1, 3, 2]);
        assert_eq!(sol.clusters(), &[3, 1, 2]);
        assert!(!sol.insert(1));
        assert!(sol.insert(0));
        assert_eq!(sol.clusters(), &[3, 1, 2, 0]);
    }

    #[test]
    fn test_set_operations() {
        let a = Solution::from_clusters([4, 2, 7]);
        let b = Solution::from_clusters([7, 4]);

        assert_eq!(a.difference(&b), vec![2]);
        assert_eq!(a.without(&[4]).clusters(), &[2, 7]);
        assert_eq!(b.with(&[4, 9]).clusters(), &[7, 4, 9]);
        assert!(Solution::from_clusters([2, 4, 7]).same_set(&a));
        assert!(!a.same_set(&b));
    }
}
