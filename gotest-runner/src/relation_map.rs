// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A bidirectional one-to-many parent/child index.
//!
//! Nesting (packages within packages, subtests within tests) is derived data: it is computed from
//! paths and names and stored here rather than on the items themselves.

use std::{
    borrow::Borrow,
    collections::{HashMap, HashSet},
    hash::Hash,
};

/// A bidirectional parent/child index.
///
/// Each child has at most one parent. The child-to-parent and parent-to-children maps are kept
/// mutually consistent by every mutating method.
#[derive(Clone, Debug)]
pub struct RelationMap<K> {
    child_to_parent: HashMap<K, K>,
    parent_to_children: HashMap<K, HashSet<K>>,
}

impl<K> Default for RelationMap<K> {
    fn default() -> Self {
        Self {
            child_to_parent: HashMap::new(),
            parent_to_children: HashMap::new(),
        }
    }
}

impl<K: Clone + Eq + Hash> RelationMap<K> {
    /// Creates an empty relation map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `child` as a child of `parent`.
    ///
    /// If `child` already had a different parent, it is detached from that parent first.
    pub fn add(&mut self, parent: K, child: K) {
        if let Some(old_parent) = self.child_to_parent.insert(child.clone(), parent.clone()) {
            if old_parent != parent {
                self.detach(&old_parent, &child);
            }
        }
        self.parent_to_children
            .entry(parent)
            .or_default()
            .insert(child);
    }

    /// Atomically replaces every relation with `pairs`, given as `(parent, child)`.
    pub fn replace(&mut self, pairs: impl IntoIterator<Item = (K, K)>) {
        self.child_to_parent.clear();
        self.parent_to_children.clear();
        for (parent, child) in pairs {
            self.add(parent, child);
        }
    }

    /// Removes `child` from its parent, returning the former parent.
    ///
    /// Relations where `child` is itself a parent are left alone.
    pub fn remove_child<Q>(&mut self, child: &Q) -> Option<K>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let parent = self.child_to_parent.remove(child)?;
        self.detach(&parent, child);
        Some(parent)
    }

    /// Removes every child of `parent`, returning them.
    pub fn remove_children<Q>(&mut self, parent: &Q) -> Option<HashSet<K>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let children = self.parent_to_children.remove(parent)?;
        for child in &children {
            self.child_to_parent.remove::<K>(child);
        }
        Some(children)
    }

    /// Returns the parent of `child`, if any.
    pub fn parent<Q>(&self, child: &Q) -> Option<&K>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.child_to_parent.get(child)
    }

    /// Returns the children of `parent`, if any.
    ///
    /// The returned set is unordered; callers sort by whatever presentation order they need.
    pub fn children<Q>(&self, parent: &Q) -> Option<&HashSet<K>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.parent_to_children.get(parent)
    }

    /// Returns true if `child` has a parent.
    pub fn has_parent<Q>(&self, child: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.child_to_parent.contains_key(child)
    }

    /// Returns the number of parent/child relations.
    pub fn len(&self) -> usize {
        self.child_to_parent.len()
    }

    /// Returns true if there are no relations.
    pub fn is_empty(&self) -> bool {
        self.child_to_parent.is_empty()
    }

    /// Iterates over all `(parent, child)` relations in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &K)> + '_ {
        self.child_to_parent
            .iter()
            .map(|(child, parent)| (parent, child))
    }

    fn detach<Q>(&mut self, parent: &K, child: &Q)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        if let Some(children) = self.parent_to_children.get_mut::<K>(parent) {
            children.remove(child);
            if children.is_empty() {
                self.parent_to_children.remove::<K>(parent);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::collection::vec;
    use test_strategy::proptest;

    fn sorted(set: Option<&HashSet<&'static str>>) -> Vec<&'static str> {
        let mut out: Vec<_> = set.into_iter().flatten().copied().collect();
        out.sort_unstable();
        out
    }

    #[test]
    fn add_and_query() {
        let mut map = RelationMap::new();
        map.add("a", "a/b");
        map.add("a", "a/c");
        map.add("a/b", "a/b/d");

        assert_eq!(map.parent("a/b"), Some(&"a"));
        assert_eq!(map.parent("a"), None);
        assert_eq!(sorted(map.children("a")), vec!["a/b", "a/c"]);
        assert_eq!(sorted(map.children("a/b")), vec!["a/b/d"]);
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn reparenting_detaches_from_old_parent() {
        let mut map = RelationMap::new();
        map.add("a", "x");
        map.add("b", "x");

        assert_eq!(map.parent("x"), Some(&"b"));
        assert_eq!(map.children("a"), None, "empty child sets are dropped");
        assert_eq!(sorted(map.children("b")), vec!["x"]);
    }

    #[test]
    fn remove_child_and_children() {
        let mut map = RelationMap::new();
        map.add("a", "a/b");
        map.add("a", "a/c");
        map.add("a/b", "a/b/d");

        assert_eq!(map.remove_child("a/b"), Some("a"));
        assert_eq!(sorted(map.children("a")), vec!["a/c"]);
        // a/b is still the parent of a/b/d.
        assert_eq!(map.parent("a/b/d"), Some(&"a/b"));

        let removed = map.remove_children("a/b").expect("a/b has children");
        assert_eq!(removed.len(), 1);
        assert_eq!(map.parent("a/b/d"), None);
        assert_eq!(map.remove_children("a/b"), None);
    }

    #[test]
    fn replace_clears_stale_entries() {
        let mut map = RelationMap::new();
        map.add("a", "b");
        map.add("c", "d");

        map.replace([("x", "b")]);
        assert_eq!(map.parent("b"), Some(&"x"));
        assert_eq!(map.parent("d"), None);
        assert_eq!(map.children("a"), None);
        assert_eq!(map.children("c"), None);
        assert_eq!(map.len(), 1);
    }

    #[proptest(cases = 64)]
    fn maps_stay_consistent(#[strategy(vec((0..8u8, 0..8u8, 0..3u8), 0..32))] ops: Vec<(u8, u8, u8)>) {
        let mut map = RelationMap::new();
        for (a, b, op) in ops {
            match op {
                0 => map.add(a, b),
                1 => {
                    map.remove_child(&b);
                }
                _ => {
                    map.remove_children(&a);
                }
            }
        }

        // Every child -> parent edge has a matching parent -> child edge, and vice versa.
        for (parent, child) in map.iter() {
            assert!(map.children(parent).is_some_and(|c| c.contains(child)));
        }
        let forward: usize = map.parent_to_children.values().map(|c| c.len()).sum();
        assert_eq!(forward, map.len());
        assert!(map.parent_to_children.values().all(|c| !c.is_empty()));
    }
}
