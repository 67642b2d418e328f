//! Typed, identity-keyed metadata that travels with every request, response
//! and error in the pipeline.
//!
//! A [`Key<T>`] is an opaque token: equality is the identity of the token
//! itself, never its description, so two independently created keys with the
//! same description address different slots. This lets unrelated filters
//! attach data to the same bag without coordinating key names.
//!
//! Values are stored type-erased but stay clonable, so a [`Metadata`] bag can
//! be deep-copied whenever a derived flow (a retry attempt, an error being
//! thrown) needs its own independent copy.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_KEY_ID: AtomicU64 = AtomicU64::new(1);

/// An identity-unique token addressing a value of type `T` in a [`Metadata`] bag.
///
/// Well-known keys are usually declared as `once_cell::sync::Lazy<Key<T>>`
/// statics so every user of the key observes the same identity.
pub struct Key<T> {
    id: u64,
    description: &'static str,
    _marker: PhantomData<fn(T) -> T>,
}

impl<T> Key<T> {
    /// Creates a fresh key. Every call yields a distinct identity, even for
    /// an identical description.
    pub fn new(description: &'static str) -> Self {
        Self { id: NEXT_KEY_ID.fetch_add(1, Ordering::Relaxed), description, _marker: PhantomData }
    }

    pub fn description(&self) -> &'static str {
        self.description
    }
}

impl<T> Clone for Key<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Key<T> {}

impl<T> PartialEq for Key<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Key<T> {}

impl<T> fmt::Debug for Key<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key").field("id", &self.id).field("description", &self.description).finish()
    }
}

/// Object-safe clone hook for type-erased values, so the bag itself can be
/// deep-copied without knowing the concrete value types.
trait MetadataValue: Any + Send + Sync {
    fn clone_value(&self) -> Box<dyn MetadataValue>;
    fn as_any(&self) -> &(dyn Any + Send + Sync);
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T: Any + Clone + Send + Sync> MetadataValue for T {
    fn clone_value(&self) -> Box<dyn MetadataValue> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &(dyn Any + Send + Sync) {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

struct Entry {
    description: &'static str,
    value: Box<dyn MetadataValue>,
}

impl Clone for Entry {
    fn clone(&self) -> Self {
        Self { description: self.description, value: self.value.clone_value() }
    }
}

/// A mergeable key/value store attached to every request and response.
///
/// Bags are owned by a single flow: they are never shared between concurrent
/// pipeline invocations, only cloned into them.
#[derive(Clone, Default)]
pub struct Metadata {
    entries: HashMap<u64, Entry>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value stored under `key`, if any.
    pub fn get<T: 'static>(&self, key: &Key<T>) -> Option<&T> {
        self.entries.get(&key.id).and_then(|entry| entry.value.as_any().downcast_ref())
    }

    /// Stores `value` under `key`, returning the previous value if present.
    pub fn put<T: Clone + Send + Sync + 'static>(&mut self, key: &Key<T>, value: T) -> Option<T> {
        self.entries
            .insert(key.id, Entry { description: key.description, value: Box::new(value) })
            .and_then(|old| old.value.into_any().downcast::<T>().ok())
            .map(|boxed| *boxed)
    }

    /// Removes the value stored under `key`, returning it if present.
    pub fn remove<T: Clone + Send + Sync + 'static>(&mut self, key: &Key<T>) -> Option<T> {
        self.entries
            .remove(&key.id)
            .and_then(|old| old.value.into_any().downcast::<T>().ok())
            .map(|boxed| *boxed)
    }

    /// Read-modify-write in one step: replaces the current value (if any)
    /// with whatever `f` produces from it.
    pub fn compute<T, F>(&mut self, key: &Key<T>, f: F)
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce(Option<T>) -> T,
    {
        let old = self.remove(key);
        self.put(key, f(old));
    }

    /// In-place union: copies every entry of `other` into this bag,
    /// overwriting on key collision.
    pub fn put_all(&mut self, other: &Metadata) {
        for (id, entry) in &other.entries {
            self.entries.insert(*id, entry.clone());
        }
    }

    /// Produces a new bag holding this bag's entries overwritten by `other`'s
    /// for overlapping keys. Both inputs are left untouched.
    #[must_use]
    pub fn merge(&self, other: &Metadata) -> Metadata {
        let mut out = self.clone();
        out.put_all(other);
        out
    }

    /// Iterates the bag as `(description, value)` pairs in key-creation
    /// order. Values are type-erased; callers holding the matching [`Key`]
    /// can downcast them.
    pub fn entries(&self) -> impl Iterator<Item = (&'static str, &(dyn Any + Send + Sync))> {
        let mut entries: Vec<_> = self.entries.iter().collect();
        entries.sort_by_key(|(id, _)| **id);
        entries.into_iter().map(|(_, entry)| (entry.description, entry.value.as_any()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `key` has a value in this bag, without downcasting it.
    pub fn contains<T>(&self, key: &Key<T>) -> bool {
        self.entries.contains_key(&key.id)
    }
}

impl fmt::Debug for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries().map(|(description, _)| description)).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_with_same_description_are_distinct() {
        let a: Key<u32> = Key::new("shared description");
        let b: Key<u32> = Key::new("shared description");
        assert_ne!(a, b);

        let mut bag = Metadata::new();
        bag.put(&a, 1u32);
        bag.put(&b, 2u32);
        assert_eq!(bag.get(&a), Some(&1));
        assert_eq!(bag.get(&b), Some(&2));
    }

    #[test]
    fn put_returns_previous_value() {
        let key: Key<&'static str> = Key::new("value");
        let mut bag = Metadata::new();
        assert_eq!(bag.put(&key, "first"), None);
        assert_eq!(bag.put(&key, "second"), Some("first"));
        assert_eq!(bag.get(&key), Some(&"second"));
    }

    #[test]
    fn compute_sees_current_value() {
        let key: Key<u64> = Key::new("counter");
        let mut bag = Metadata::new();
        bag.compute(&key, |old| old.unwrap_or(0) + 1);
        bag.compute(&key, |old| old.unwrap_or(0) + 1);
        assert_eq!(bag.get(&key), Some(&2));
    }

    #[test]
    fn merge_is_right_biased_and_leaves_inputs_untouched() {
        let shared: Key<u32> = Key::new("shared");
        let left_only: Key<u32> = Key::new("left");
        let right_only: Key<u32> = Key::new("right");

        let mut left = Metadata::new();
        left.put(&shared, 1u32);
        left.put(&left_only, 10u32);

        let mut right = Metadata::new();
        right.put(&shared, 2u32);
        right.put(&right_only, 20u32);

        let merged = left.merge(&right);
        assert_eq!(merged.get(&shared), Some(&2));
        assert_eq!(merged.get(&left_only), Some(&10));
        assert_eq!(merged.get(&right_only), Some(&20));

        assert_eq!(left.get(&shared), Some(&1));
        assert!(right.get(&left_only).is_none());
    }

    #[test]
    fn entries_iterates_in_key_creation_order() {
        let first: Key<u32> = Key::new("first");
        let second: Key<&'static str> = Key::new("second");

        let mut bag = Metadata::new();
        bag.put(&second, "b");
        bag.put(&first, 1u32);

        let entries: Vec<_> = bag.entries().collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, "first");
        assert_eq!(entries[0].1.downcast_ref::<u32>(), Some(&1));
        assert_eq!(entries[1].0, "second");
        assert_eq!(entries[1].1.downcast_ref::<&'static str>(), Some(&"b"));
    }

    #[test]
    fn clone_is_independent() {
        let key: Key<Vec<u32>> = Key::new("values");
        let mut original = Metadata::new();
        original.put(&key, vec![1]);

        let mut copy = original.clone();
        copy.compute(&key, |old| {
            let mut values = old.unwrap_or_default();
            values.push(2);
            values
        });

        assert_eq!(original.get(&key), Some(&vec![1]));
        assert_eq!(copy.get(&key), Some(&vec![1, 2]));
    }

    #[test]
    fn typed_access_is_per_key_not_per_type() {
        let number: Key<u32> = Key::new("number");
        let text: Key<String> = Key::new("text");
        let mut bag = Metadata::new();
        bag.put(&number, 7u32);
        bag.put(&text, "seven".to_string());
        assert_eq!(bag.get(&number), Some(&7));
        assert_eq!(bag.get(&text).map(String::as_str), Some("seven"));
        assert_eq!(bag.len(), 2);
    }
}
