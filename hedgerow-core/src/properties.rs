//! Typed property bag attached to a resilience context.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::Mutex;
use smol_str::SmolStr;

type PropertyValue = Arc<dyn Any + Send + Sync>;

/// Named key for a value of type `T` stored in [`ResilienceProperties`].
pub struct ResiliencePropertyKey<T> {
    name: SmolStr,
    _phantom: PhantomData<fn() -> T>,
}

impl<T> ResiliencePropertyKey<T> {
    /// Creates a key with the given name.
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            _phantom: PhantomData,
        }
    }

    /// Creates a key from a static name without allocating.
    pub const fn new_static(name: &'static str) -> Self {
        Self {
            name: SmolStr::new_static(name),
            _phantom: PhantomData,
        }
    }

    /// Returns the key name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T> Clone for ResiliencePropertyKey<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            _phantom: PhantomData,
        }
    }
}

impl<T> fmt::Debug for ResiliencePropertyKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ResiliencePropertyKey")
            .field(&self.name)
            .finish()
    }
}

/// Shared handle to a property bag.
///
/// Cloning the handle aliases the same bag. Use [`ResilienceProperties::replace`]
/// to copy entries between distinct bags and [`ResilienceProperties::ptr_eq`]
/// to compare identity.
#[derive(Clone, Default)]
pub struct ResilienceProperties {
    inner: Arc<Mutex<HashMap<SmolStr, PropertyValue>>>,
}

impl ResilienceProperties {
    /// Creates an empty bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a clone of the value stored under `key`.
    pub fn get<T>(&self, key: &ResiliencePropertyKey<T>) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.inner
            .lock()
            .get(&key.name)
            .and_then(|value| value.downcast_ref::<T>())
            .cloned()
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn set<T>(&self, key: &ResiliencePropertyKey<T>, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.inner.lock().insert(key.name.clone(), Arc::new(value));
    }

    /// Removes the value stored under `key`, returning `true` if it existed.
    pub fn remove<T>(&self, key: &ResiliencePropertyKey<T>) -> bool {
        self.inner.lock().remove(&key.name).is_some()
    }

    /// Returns `true` if a value is stored under `key`.
    pub fn contains<T>(&self, key: &ResiliencePropertyKey<T>) -> bool {
        self.inner.lock().contains_key(&key.name)
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Returns `true` if the bag holds no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    /// Replaces the content of this bag with a copy of `other`'s entries.
    pub fn replace(&self, other: &ResilienceProperties) {
        if self.ptr_eq(other) {
            return;
        }
        let entries: Vec<_> = other
            .inner
            .lock()
            .iter()
            .map(|(key, value)| (key.clone(), Arc::clone(value)))
            .collect();
        let mut inner = self.inner.lock();
        inner.clear();
        inner.extend(entries);
    }

    /// Returns `true` if both handles refer to the same bag.
    pub fn ptr_eq(&self, other: &ResilienceProperties) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for ResilienceProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_set().entries(inner.keys()).finish()
    }
}
