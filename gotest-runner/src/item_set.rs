// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A keyed, order-preserving collection that reconciles source records against modeled items.
//!
//! The main structure in this module is [`ItemSet`]. Its [`update`](ItemSet::update) method is the
//! single reconciliation algorithm used at every level of the model: packages within a root, files
//! within a package, and tests within a file.

use indexmap::IndexMap;
use smol_str::SmolStr;
use std::collections::HashSet;

/// Something identified by a string key.
pub trait Keyed {
    /// Returns the key, which is unique within the containing [`ItemSet`].
    fn key(&self) -> &str;
}

/// An item that can be stored in an [`ItemSet`] and reconciled via [`ItemSet::update`].
pub trait SetMember: Keyed {
    /// The event type produced while reconciling.
    type Event;

    /// Pushes the events describing this item being added.
    fn added_events(&self, events: &mut Vec<Self::Event>);

    /// Pushes the events describing this item being removed.
    ///
    /// Composite items push events for their descendants before their own.
    fn removed_events(&self, events: &mut Vec<Self::Event>);
}

/// A keyed, order-preserving collection of items.
///
/// Items keep their position for as long as their key is present: re-adding or updating an
/// existing key never replaces the stored item.
#[derive(Clone, Debug)]
pub struct ItemSet<T> {
    items: IndexMap<SmolStr, T>,
}

impl<T> Default for ItemSet<T> {
    fn default() -> Self {
        Self {
            items: IndexMap::new(),
        }
    }
}

impl<T: Keyed> ItemSet<T> {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if there are no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the item with the given key.
    pub fn get(&self, key: &str) -> Option<&T> {
        self.items.get(key)
    }

    /// Returns the item with the given key, mutably.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut T> {
        self.items.get_mut(key)
    }

    /// Returns true if an item with the given key is present.
    pub fn has(&self, key: &str) -> bool {
        self.items.contains_key(key)
    }

    /// Iterates over the items in insertion order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator + '_ {
        self.items.values()
    }

    /// Iterates mutably over the items in insertion order.
    pub fn iter_mut(&mut self) -> impl DoubleEndedIterator<Item = &mut T> + ExactSizeIterator + '_ {
        self.items.values_mut()
    }

    /// Iterates over the keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.items.keys().map(|key| key.as_str())
    }

    /// Adds an item.
    ///
    /// If an item with the same key is already present, the existing item is kept and `item` is
    /// returned back as `Err`.
    pub fn add(&mut self, item: T) -> Result<&mut T, T> {
        match self.items.entry(SmolStr::new(item.key())) {
            indexmap::map::Entry::Occupied(_) => Err(item),
            indexmap::map::Entry::Vacant(entry) => Ok(entry.insert(item)),
        }
    }

    /// Removes the item with the given key, preserving the order of the remaining items.
    pub fn remove(&mut self, key: &str) -> Option<T> {
        self.items.shift_remove(key)
    }

    /// Removes every item for which `f` returns false.
    pub fn retain(&mut self, mut f: impl FnMut(&T) -> bool) {
        self.items.retain(|_, item| f(item));
    }

    /// Replaces the contents of the set with `items`.
    ///
    /// An existing item whose key matches one in `items` is kept in place of the new one. The
    /// final order follows `items`. Returns the items that were removed.
    pub fn replace(&mut self, items: impl IntoIterator<Item = T>) -> Vec<T> {
        let mut old = std::mem::take(&mut self.items);
        for item in items {
            let key = SmolStr::new(item.key());
            if self.items.contains_key(&key) {
                continue;
            }
            let item = old.shift_remove(&key).unwrap_or(item);
            self.items.insert(key, item);
        }
        old.into_values().collect()
    }
}

impl<T: SetMember> ItemSet<T> {
    /// Reconciles this set against `src`, a list of source records.
    ///
    /// 1. Every item whose key is absent from `src` and for which `keep` returns false is removed.
    /// 2. For each record in `src`, an existing item with the same key is passed to `update`;
    ///    otherwise `make` constructs a new item, which is inserted.
    ///
    /// Returns the events produced: removals first, then additions and updates in source order.
    /// Calling this twice with the same source data produces no events the second time, as long
    /// as `update` reports no change for unchanged records.
    pub fn update<'a, S, E>(
        &mut self,
        src: impl IntoIterator<Item = &'a S>,
        mut make: impl FnMut(&S) -> T,
        mut update: impl FnMut(&S, &mut T) -> Vec<E>,
        mut keep: impl FnMut(&T) -> bool,
    ) -> Vec<E>
    where
        S: Keyed + 'a,
        T: SetMember<Event = E>,
    {
        let src: Vec<&S> = src.into_iter().collect();
        let src_keys: HashSet<&'a str> = src.iter().map(|s| Keyed::key(*s)).collect();

        let mut events = Vec::new();
        self.items.retain(|key, item| {
            if src_keys.contains(key.as_str()) || keep(item) {
                true
            } else {
                item.removed_events(&mut events);
                false
            }
        });

        for record in src {
            match self.items.get_mut(record.key()) {
                Some(item) => events.extend(update(record, item)),
                None => {
                    let item = make(record);
                    item.added_events(&mut events);
                    self.items.insert(SmolStr::new(item.key()), item);
                }
            }
        }

        events
    }
}

impl<'a, T> IntoIterator for &'a ItemSet<T> {
    type Item = &'a T;
    type IntoIter = indexmap::map::Values<'a, SmolStr, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicU64, Ordering};

    static NEXT_SERIAL: AtomicU64 = AtomicU64::new(0);

    #[derive(Debug)]
    struct Record {
        key: &'static str,
        value: u32,
    }

    impl Keyed for Record {
        fn key(&self) -> &str {
            self.key
        }
    }

    #[derive(Debug)]
    struct Item {
        key: String,
        value: u32,
        serial: u64,
        dynamic: bool,
    }

    impl Item {
        fn new(record: &Record) -> Self {
            Self {
                key: record.key.to_owned(),
                value: record.value,
                serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
                dynamic: false,
            }
        }

        fn update(record: &Record, item: &mut Item) -> Vec<Event> {
            if record.value == item.value {
                return Vec::new();
            }
            item.value = record.value;
            vec![Event::Modified(item.key.clone())]
        }
    }

    #[derive(Debug, PartialEq, Eq)]
    enum Event {
        Added(String),
        Removed(String),
        Modified(String),
    }

    impl Keyed for Item {
        fn key(&self) -> &str {
            &self.key
        }
    }

    impl SetMember for Item {
        type Event = Event;

        fn added_events(&self, events: &mut Vec<Event>) {
            events.push(Event::Added(self.key.clone()));
        }

        fn removed_events(&self, events: &mut Vec<Event>) {
            events.push(Event::Removed(self.key.clone()));
        }
    }

    fn serials(set: &ItemSet<Item>) -> Vec<(String, u64)> {
        set.iter()
            .map(|item| (item.key.clone(), item.serial))
            .collect()
    }

    #[test]
    fn update_is_idempotent() {
        let src = [Record { key: "a", value: 1 }, Record { key: "b", value: 2 }];
        let mut set = ItemSet::new();

        let events = set.update(&src, Item::new, Item::update, |_| false);
        assert_eq!(
            events,
            vec![Event::Added("a".to_owned()), Event::Added("b".to_owned())]
        );
        let before = serials(&set);

        let events = set.update(&src, Item::new, Item::update, |_| false);
        assert_eq!(events, vec![]);
        assert_eq!(serials(&set), before, "identities are unchanged");
    }

    #[test]
    fn update_preserves_identity_of_surviving_items() {
        let mut set = ItemSet::new();
        set.update(
            &[Record { key: "a", value: 1 }, Record { key: "b", value: 2 }],
            Item::new,
            Item::update,
            |_| false,
        );
        let b_serial = set.get("b").expect("b is present").serial;

        let events = set.update(
            &[Record { key: "b", value: 3 }, Record { key: "c", value: 4 }],
            Item::new,
            Item::update,
            |_| false,
        );
        assert_eq!(
            events,
            vec![
                Event::Removed("a".to_owned()),
                Event::Modified("b".to_owned()),
                Event::Added("c".to_owned()),
            ],
            "removals come first, then updates and additions in source order"
        );

        let b = set.get("b").expect("b is still present");
        assert_eq!(b.serial, b_serial);
        assert_eq!(b.value, 3);
        assert_eq!(set.keys().collect::<Vec<_>>(), vec!["b", "c"]);
    }

    #[test]
    fn keep_predicate_retains_unsourced_items() {
        let mut set = ItemSet::new();
        set.update(&[Record { key: "a", value: 1 }], Item::new, Item::update, |_| false);
        let mut dynamic = Item::new(&Record { key: "a/x", value: 0 });
        dynamic.dynamic = true;
        set.add(dynamic).expect("a/x is new");

        let events = set.update(
            &[Record { key: "b", value: 1 }],
            Item::new,
            Item::update,
            |item| item.dynamic,
        );
        assert_eq!(
            events,
            vec![Event::Removed("a".to_owned()), Event::Added("b".to_owned())]
        );
        assert!(set.has("a/x"));
    }

    #[test]
    fn add_keeps_existing() {
        let mut set = ItemSet::new();
        let first = Item::new(&Record { key: "a", value: 1 });
        let first_serial = first.serial;
        set.add(first).expect("a is new");

        let rejected = set
            .add(Item::new(&Record { key: "a", value: 2 }))
            .expect_err("a already exists");
        assert_eq!(rejected.value, 2);
        assert_eq!(set.get("a").map(|item| item.serial), Some(first_serial));
    }

    #[test]
    fn replace_keeps_matching_items() {
        let mut set = ItemSet::new();
        set.add(Item::new(&Record { key: "a", value: 1 })).expect("a is new");
        set.add(Item::new(&Record { key: "b", value: 1 })).expect("b is new");
        let a_serial = set.get("a").map(|item| item.serial);

        let removed = set.replace([
            Item::new(&Record { key: "c", value: 1 }),
            Item::new(&Record { key: "a", value: 5 }),
        ]);

        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].key, "b");
        assert_eq!(set.keys().collect::<Vec<_>>(), vec!["c", "a"]);
        assert_eq!(set.get("a").map(|item| item.serial), a_serial);
        assert_eq!(set.get("a").map(|item| item.value), Some(1));
    }
}
