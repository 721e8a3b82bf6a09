//! The key-indexed value store.
//!
//! A [`ValueStore`] maps [`KeyId`]s to optional values. Every slot has its own
//! lock, so compound operations on one key (`get_or_insert_with`,
//! `get_and_update`, ...) run start to finish without interleaving, while
//! different keys never block each other for longer than a map lookup.
//!
//! Each committed mutation is announced on [`ValueStore::CHANGED`] as a
//! [`ValueUpdate`]. The event is captured while the slot lock is held and
//! emitted after it is released, so a subscriber may call back into the store.
//! Events for two racing mutations of the same key may reach subscribers in
//! either order; the stored value always reflects the order of the commits.

use std::any::{type_name, Any};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::trace;

use crate::any_value::AnyValue;
use crate::emitter::Emitter;
use crate::error::StoreError;
use crate::key::{Channel, Key, KeyId};
use crate::observable::Observable;
use crate::subscription::Subscription;

type Slot = RwLock<Option<AnyValue>>;

/// One committed mutation: the key, the value before and the value after.
///
/// `None` means absent. A removal has `current == None`.
#[derive(Clone, Debug)]
pub struct ValueUpdate {
    key: KeyId,
    previous: Option<AnyValue>,
    current: Option<AnyValue>,
}

impl ValueUpdate {
    /// The key that changed.
    pub fn key(&self) -> &KeyId {
        &self.key
    }

    /// The erased value before the mutation.
    pub fn previous(&self) -> Option<&AnyValue> {
        self.previous.as_ref()
    }

    /// The erased value after the mutation.
    pub fn current(&self) -> Option<&AnyValue> {
        self.current.as_ref()
    }

    /// The previous value, if present and of type `T`.
    pub fn previous_as<T: 'static>(&self) -> Option<&T> {
        self.previous.as_ref().and_then(AnyValue::downcast_ref)
    }

    /// The current value, if present and of type `T`.
    pub fn current_as<T: 'static>(&self) -> Option<&T> {
        self.current.as_ref().and_then(AnyValue::downcast_ref)
    }

    /// True if this update concerns `key`.
    pub fn is_for<T>(&self, key: &Key<T>) -> bool
    where
        T: 'static,
    {
        &self.key == key.id()
    }
}

/// A thread-safe, type-checked store of values addressed by [`Key`]s.
///
/// Cloning a `ValueStore` creates a new handle to the **same** slots and the
/// same emitter.
///
/// # Examples
///
/// ```
/// use sovran_attrmap::{Key, StoreError, ValueStore};
///
/// let visits = Key::<u32>::register();
/// let store = ValueStore::new();
///
/// assert_eq!(store.get(&visits)?, None);
/// store.set(&visits, 100)?;
/// assert_eq!(store.get_and_update(&visits, |v| v.map(|n| n + 1))?, Some(100));
/// assert_eq!(store.get(&visits)?, Some(101));
///
/// store.clear(&visits)?;
/// assert!(!store.contains(&visits)?);
/// # Ok::<(), StoreError>(())
/// ```
#[derive(Clone)]
pub struct ValueStore {
    slots: Arc<RwLock<HashMap<KeyId, Arc<Slot>>>>,
    emitter: Emitter,
}

impl ValueStore {
    /// Channel announcing every committed mutation of any store.
    pub const CHANGED: Channel<ValueUpdate> =
        Channel::well_known(0x736f_7672_616e_2e61_7474_722e_6368_616e);

    /// Creates an empty store with its own emitter.
    pub fn new() -> Self {
        Self::with_emitter(Emitter::new())
    }

    /// Creates an empty store announcing changes on `emitter`.
    pub fn with_emitter(emitter: Emitter) -> Self {
        Self {
            slots: Arc::new(RwLock::new(HashMap::new())),
            emitter,
        }
    }

    // Slot cells are never removed from the map, so a writer holding an
    // `Arc<Slot>` can't commit into a detached cell.
    fn slot(&self, id: &KeyId) -> Result<Option<Arc<Slot>>, StoreError> {
        let slots = self.slots.read().map_err(|_| StoreError::LockError)?;
        Ok(slots.get(id).cloned())
    }

    fn slot_or_insert(&self, id: &KeyId) -> Result<Arc<Slot>, StoreError> {
        if let Some(slot) = self.slot(id)? {
            return Ok(slot);
        }
        let mut slots = self.slots.write().map_err(|_| StoreError::LockError)?;
        Ok(Arc::clone(slots.entry(id.clone()).or_default()))
    }

    fn read_slot(&self, id: &KeyId) -> Result<Option<AnyValue>, StoreError> {
        match self.slot(id)? {
            Some(slot) => Ok(slot.read().unwrap_or_else(PoisonError::into_inner).clone()),
            None => Ok(None),
        }
    }

    /// Runs `op` with exclusive access to one slot, then emits the change if
    /// `op` reports one.
    ///
    /// `op` only assigns the cell after every fallible or user-supplied step
    /// has run, so a panic inside it leaves the cell untouched. A poisoned
    /// slot lock is therefore recovered rather than reported.
    fn commit<R, F>(&self, id: &KeyId, op: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut Option<AnyValue>) -> Result<(R, bool), StoreError>,
    {
        let slot = self.slot_or_insert(id)?;
        let (out, update) = {
            let mut cell = slot.write().unwrap_or_else(PoisonError::into_inner);
            let previous = cell.clone();
            let (out, changed) = op(&mut *cell)?;
            let update = changed.then(|| ValueUpdate {
                key: id.clone(),
                previous,
                current: cell.clone(),
            });
            (out, update)
        };

        if let Some(update) = update {
            self.announce(&update)?;
        }
        Ok(out)
    }

    fn announce(&self, update: &ValueUpdate) -> Result<(), StoreError> {
        trace!(key = %update.key, removed = update.current.is_none(), "committed");
        self.emitter.emit(&Self::CHANGED, update)
    }

    fn encode<T>(key: &Key<T>, value: T) -> Result<AnyValue, StoreError>
    where
        T: Send + Sync + 'static,
    {
        if !key.witness().accepts(&value) {
            return Err(StoreError::ArgumentTypeMismatch {
                key: key.id().clone(),
                expected: key.witness().describe(),
                found: type_name::<T>(),
            });
        }
        Ok(AnyValue::new(value))
    }

    fn decode<'a, T: 'static>(key: &Key<T>, value: &'a AnyValue) -> Result<&'a T, StoreError> {
        match value.downcast_ref::<T>() {
            Some(typed) if key.witness().accepts(typed) => Ok(typed),
            _ => Err(StoreError::StoredTypeMismatch {
                key: key.id().clone(),
                expected: key.witness().describe(),
                found: value.type_name(),
            }),
        }
    }

    fn decode_opt<T>(key: &Key<T>, value: Option<&AnyValue>) -> Result<Option<T>, StoreError>
    where
        T: Clone + 'static,
    {
        value
            .map(|stored| Self::decode(key, stored).cloned())
            .transpose()
    }

    /// Reads a value by reference without cloning it.
    ///
    /// # Errors
    ///
    /// - Returns `StoreError::StoredTypeMismatch` if the slot holds a value the key rejects
    /// - Returns `StoreError::LockError` if an internal lock is poisoned
    pub fn with<T, F, R>(&self, key: &Key<T>, f: F) -> Result<R, StoreError>
    where
        T: 'static,
        F: FnOnce(Option<&T>) -> R,
    {
        match self.read_slot(key.id())? {
            Some(stored) => Ok(f(Some(Self::decode(key, &stored)?))),
            None => Ok(f(None)),
        }
    }

    /// Returns a clone of the current value, or `None` if absent.
    ///
    /// The `Option` is the presence-wrapped form of the read; there is no
    /// separate "optional" accessor.
    pub fn get<T>(&self, key: &Key<T>) -> Result<Option<T>, StoreError>
    where
        T: Clone + 'static,
    {
        self.with(key, |value| value.cloned())
    }

    /// Returns the current value.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotPresent` if the key holds nothing.
    pub fn get_required<T>(&self, key: &Key<T>) -> Result<T, StoreError>
    where
        T: Clone + 'static,
    {
        self.get(key)?.ok_or_else(|| StoreError::NotPresent {
            key: key.id().clone(),
        })
    }

    /// Returns the current value, or `default` if absent. Never writes.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::ArgumentTypeMismatch` if the key rejects `default`.
    pub fn get_or<T>(&self, key: &Key<T>, default: T) -> Result<T, StoreError>
    where
        T: Clone + Send + Sync + 'static,
    {
        if !key.witness().accepts(&default) {
            return Err(StoreError::ArgumentTypeMismatch {
                key: key.id().clone(),
                expected: key.witness().describe(),
                found: type_name::<T>(),
            });
        }
        Ok(self.get(key)?.unwrap_or(default))
    }

    /// Whether the key currently holds a value. Does not check its type.
    pub fn contains<T>(&self, key: &Key<T>) -> Result<bool, StoreError>
    where
        T: 'static,
    {
        Ok(self.read_slot(key.id())?.is_some())
    }

    /// Returns the current value, storing `default` first if absent.
    ///
    /// Only the call that actually stores the default emits a change.
    pub fn get_or_insert<T>(&self, key: &Key<T>, default: T) -> Result<T, StoreError>
    where
        T: Clone + Send + Sync + 'static,
    {
        let fresh = Self::encode(key, default)?;
        self.commit(key.id(), |cell| {
            if let Some(stored) = cell.as_ref() {
                return Ok((Self::decode(key, stored)?.clone(), false));
            }
            let out = Self::decode(key, &fresh)?.clone();
            *cell = Some(fresh);
            Ok((out, true))
        })
    }

    /// Returns the current value, computing and storing a default if absent.
    ///
    /// `supplier` runs at most once, only if the key is still absent once the
    /// slot is held exclusively. Concurrent callers all get the value the
    /// winning call stored. The supplier runs under the slot lock and must not
    /// touch the same key.
    ///
    /// # Errors
    ///
    /// - Returns `StoreError::InvalidDefault` if `supplier` yields `None`
    /// - Returns `StoreError::ArgumentTypeMismatch` if the key rejects the default
    pub fn get_or_insert_with<T, F, R>(&self, key: &Key<T>, supplier: F) -> Result<T, StoreError>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> R,
        R: Into<Option<T>>,
    {
        self.commit(key.id(), |cell| {
            if let Some(stored) = cell.as_ref() {
                return Ok((Self::decode(key, stored)?.clone(), false));
            }
            let value = supplier().into().ok_or_else(|| StoreError::InvalidDefault {
                key: key.id().clone(),
            })?;
            let fresh = Self::encode(key, value)?;
            let out = Self::decode(key, &fresh)?.clone();
            *cell = Some(fresh);
            Ok((out, true))
        })
    }

    /// Stores `value`, or removes the entry when given `None`.
    ///
    /// Always emits a change, even when the value is unchanged.
    pub fn set<T>(&self, key: &Key<T>, value: impl Into<Option<T>>) -> Result<(), StoreError>
    where
        T: Send + Sync + 'static,
    {
        let fresh = value
            .into()
            .map(|value| Self::encode(key, value))
            .transpose()?;
        self.put(key.id(), fresh)
    }

    /// Stores an already erased value after checking it against the key.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::ArgumentTypeMismatch` if the value is not a `T` the key accepts.
    pub fn set_erased<T>(&self, key: &Key<T>, value: Option<AnyValue>) -> Result<(), StoreError>
    where
        T: 'static,
    {
        if let Some(erased) = &value {
            if !key.witness().accepts_any(erased) {
                return Err(StoreError::ArgumentTypeMismatch {
                    key: key.id().clone(),
                    expected: key.witness().describe(),
                    found: erased.type_name(),
                });
            }
        }
        self.put(key.id(), value)
    }

    /// Removes the value. Same as `set(key, None)`.
    pub fn clear<T>(&self, key: &Key<T>) -> Result<(), StoreError>
    where
        T: Send + Sync + 'static,
    {
        self.set(key, None)
    }

    /// Atomically replaces the value with `f(current)` and returns the
    /// previous value. `f` runs under the slot lock and must not touch the
    /// same key.
    pub fn get_and_update<T, F>(&self, key: &Key<T>, f: F) -> Result<Option<T>, StoreError>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce(Option<T>) -> Option<T>,
    {
        self.commit(key.id(), |cell| {
            let previous = Self::decode_opt(key, cell.as_ref())?;
            let next = f(previous.clone())
                .map(|value| Self::encode(key, value))
                .transpose()?;
            *cell = next;
            Ok((previous, true))
        })
    }

    /// Atomically replaces the value with `f(current)` and returns the new
    /// value. `f` runs under the slot lock and must not touch the same key.
    pub fn update_and_get<T, F>(&self, key: &Key<T>, f: F) -> Result<Option<T>, StoreError>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce(Option<T>) -> Option<T>,
    {
        self.commit(key.id(), |cell| {
            let previous = Self::decode_opt(key, cell.as_ref())?;
            let next = f(previous);
            let encoded = next
                .clone()
                .map(|value| Self::encode(key, value))
                .transpose()?;
            *cell = encoded;
            Ok((next, true))
        })
    }

    fn put(&self, id: &KeyId, value: Option<AnyValue>) -> Result<(), StoreError> {
        // Removing from a key that never held anything needs no slot.
        if value.is_none() && self.slot(id)?.is_none() {
            return self.announce(&ValueUpdate {
                key: id.clone(),
                previous: None,
                current: None,
            });
        }
        self.commit(id, |cell| {
            *cell = value;
            Ok(((), true))
        })
    }

    /// Reads a string-identified slot without a typed key.
    pub fn get_raw(&self, name: &str) -> Result<Option<AnyValue>, StoreError> {
        self.read_slot(&KeyId::named(name))
    }

    /// Writes a string-identified slot without a typed key.
    ///
    /// Nothing is validated. A typed read through a key that disagrees with
    /// what was stored fails with `StoreError::StoredTypeMismatch`.
    pub fn set_raw(&self, name: &str, value: impl Into<Option<AnyValue>>) -> Result<(), StoreError> {
        self.put(&KeyId::named(name), value.into())
    }

    /// Stores a plain value in a string-identified slot.
    pub fn insert_raw<V>(&self, name: &str, value: V) -> Result<(), StoreError>
    where
        V: Any + Send + Sync,
    {
        self.set_raw(name, AnyValue::new(value))
    }

    /// Removes a string-identified slot's value.
    pub fn remove_raw(&self, name: &str) -> Result<(), StoreError> {
        self.set_raw(name, None)
    }

    /// Snapshot of every present entry.
    ///
    /// Each entry is read consistently, but entries mutated while the
    /// snapshot is taken may appear with either their old or new value.
    pub fn entries(&self) -> Result<Vec<(KeyId, AnyValue)>, StoreError> {
        let slots: Vec<(KeyId, Arc<Slot>)> = {
            let slots = self.slots.read().map_err(|_| StoreError::LockError)?;
            slots
                .iter()
                .map(|(id, slot)| (id.clone(), Arc::clone(slot)))
                .collect()
        };

        let mut entries = Vec::with_capacity(slots.len());
        for (id, slot) in slots {
            let cell = slot.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(value) = cell.as_ref() {
                entries.push((id, value.clone()));
            }
        }
        Ok(entries)
    }

    /// Ids of every present entry.
    pub fn keys(&self) -> Result<Vec<KeyId>, StoreError> {
        Ok(self.entries()?.into_iter().map(|(id, _)| id).collect())
    }

    /// Number of present entries.
    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.entries()?.len())
    }

    /// True if no entry is present.
    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// Re-applies every present entry of this store as a `set` on `target`.
    ///
    /// Each copied entry emits on `target`'s emitter. There is no whole-copy
    /// atomicity: concurrent writes to this store may or may not be copied.
    pub fn copy_into(&self, target: &ValueStore) -> Result<(), StoreError> {
        for (id, value) in self.entries()? {
            target.put(&id, Some(value))?;
        }
        Ok(())
    }

    /// Removes every entry, emitting one change per removed value.
    pub fn clear_all(&self) -> Result<(), StoreError> {
        for (id, _) in self.entries()? {
            self.commit(&id, |cell| Ok(((), cell.take().is_some())))?;
        }
        Ok(())
    }

    /// Subscribes to the changes of one key with a strong reference.
    ///
    /// The callback receives the new value, or `None` on removal. A value of
    /// the wrong type placed through raw access is also reported as `None`.
    pub fn observe_key<T, F>(&self, key: &Key<T>, callback: F) -> Result<Subscription, StoreError>
    where
        T: Send + Sync + 'static,
        F: Fn(Option<&T>) + Send + Sync + 'static,
    {
        let id = key.id().clone();
        self.emitter.subscribe(&Self::CHANGED, move |update: &ValueUpdate| {
            if update.key == id {
                callback(update.current_as::<T>());
            }
        })
    }
}

impl Observable for ValueStore {
    fn emitter(&self) -> &Emitter {
        &self.emitter
    }
}

impl Default for ValueStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ValueStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueStore")
            .field("len", &self.len().ok())
            .field("emitter", &self.emitter)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::Mutex;

    fn recorder(store: &ValueStore) -> (Arc<Mutex<Vec<ValueUpdate>>>, Subscription) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = store
            .observe(&ValueStore::CHANGED, move |update: &ValueUpdate| {
                sink.lock().unwrap().push(update.clone());
            })
            .unwrap();
        (seen, sub)
    }

    #[test]
    fn test_set_then_get() -> Result<(), StoreError> {
        let store = ValueStore::new();
        let name = Key::<String>::register();

        store.set(&name, "ada".to_string())?;
        assert_eq!(store.get(&name)?, Some("ada".to_string()));
        assert_eq!(store.with(&name, |v| v.map(String::len))?, Some(3));
        Ok(())
    }

    #[test]
    fn test_set_none_removes() -> Result<(), StoreError> {
        let store = ValueStore::new();
        let flag = Key::<bool>::register();

        store.set(&flag, true)?;
        store.set(&flag, None)?;
        assert!(!store.contains(&flag)?);
        assert!(store.is_empty()?);
        Ok(())
    }

    #[test]
    fn test_get_required_on_absent() {
        let store = ValueStore::new();
        let key = Key::<u8>::named("missing");
        assert_eq!(
            store.get_required(&key),
            Err(StoreError::NotPresent {
                key: KeyId::named("missing")
            })
        );
    }

    #[test]
    fn test_get_or_never_writes() -> Result<(), StoreError> {
        let store = ValueStore::new();
        let key = Key::<u8>::register();
        let (seen, _sub) = recorder(&store);

        assert_eq!(store.get_or(&key, 7)?, 7);
        assert!(!store.contains(&key)?);
        assert!(seen.lock().unwrap().is_empty());
        Ok(())
    }

    #[test]
    fn test_get_or_insert_emits_only_on_transition() -> Result<(), StoreError> {
        let store = ValueStore::new();
        let key = Key::<u8>::register();
        let (seen, _sub) = recorder(&store);

        assert_eq!(store.get_or_insert(&key, 1)?, 1);
        assert_eq!(store.get_or_insert(&key, 2)?, 1);
        assert_eq!(store.get(&key)?, Some(1));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].previous_as::<u8>(), None);
        assert_eq!(seen[0].current_as::<u8>(), Some(&1));
        Ok(())
    }

    #[test]
    fn test_supplier_skipped_when_present() -> Result<(), StoreError> {
        let store = ValueStore::new();
        let key = Key::<Vec<u8>>::register();
        store.set(&key, vec![1])?;

        let value = store.get_or_insert_with(&key, || -> Vec<u8> {
            panic!("supplier must not run when a value is present")
        })?;
        assert_eq!(value, vec![1]);
        Ok(())
    }

    #[test]
    fn test_supplier_producing_none() {
        let store = ValueStore::new();
        let key = Key::<u8>::register();

        let result = store.get_or_insert_with(&key, || None::<u8>);
        assert!(matches!(result, Err(StoreError::InvalidDefault { .. })));
        assert_eq!(store.contains(&key), Ok(false));
    }

    #[test]
    fn test_checked_key_rejects_writes() -> Result<(), StoreError> {
        let store = ValueStore::new();
        let even = Key::<i32>::register_checked("even", |v| v % 2 == 0);
        let (seen, _sub) = recorder(&store);

        store.set(&even, 4)?;
        let err = store.set(&even, 5).unwrap_err();
        assert!(matches!(err, StoreError::ArgumentTypeMismatch { .. }));
        assert!(matches!(
            store.get_or(&even, 3),
            Err(StoreError::ArgumentTypeMismatch { .. })
        ));
        assert!(matches!(
            store.get_and_update(&even, |v| v.map(|n| n + 1)),
            Err(StoreError::ArgumentTypeMismatch { .. })
        ));

        assert_eq!(store.get(&even)?, Some(4));
        assert_eq!(seen.lock().unwrap().len(), 1);
        Ok(())
    }

    #[test]
    fn test_raw_write_of_wrong_type_is_fatal_on_read() -> Result<(), StoreError> {
        let store = ValueStore::new();
        let port = Key::<u16>::named("port");

        store.insert_raw("port", "eighty".to_string())?;
        let err = store.get(&port).unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(
            err,
            StoreError::StoredTypeMismatch {
                found: "alloc::string::String",
                ..
            }
        ));

        store.insert_raw("port", 80u16)?;
        assert_eq!(store.get(&port)?, Some(80));
        assert_eq!(store.get_raw("port")?.and_then(|v| v.downcast_ref::<u16>().copied()), Some(80));
        Ok(())
    }

    #[test]
    fn test_set_erased_checks_type() -> Result<(), StoreError> {
        let store = ValueStore::new();
        let key = Key::<u32>::register();

        store.set_erased(&key, Some(AnyValue::new(5u32)))?;
        assert_eq!(store.get(&key)?, Some(5));
        assert!(matches!(
            store.set_erased(&key, Some(AnyValue::new(5i64))),
            Err(StoreError::ArgumentTypeMismatch { found: "i64", .. })
        ));
        store.set_erased(&key, None)?;
        assert!(!store.contains(&key)?);
        Ok(())
    }

    #[test]
    fn test_update_and_get_returns_new_value() -> Result<(), StoreError> {
        let store = ValueStore::new();
        let key = Key::<u64>::register();

        assert_eq!(store.update_and_get(&key, |v| Some(v.unwrap_or(0) + 5))?, Some(5));
        assert_eq!(store.update_and_get(&key, |v| v.map(|n| n * 2))?, Some(10));
        assert_eq!(store.update_and_get(&key, |_| None)?, None);
        assert!(!store.contains(&key)?);
        Ok(())
    }

    #[test]
    fn test_set_always_emits() -> Result<(), StoreError> {
        let store = ValueStore::new();
        let key = Key::<u8>::register();
        let (seen, _sub) = recorder(&store);

        store.set(&key, 1)?;
        store.set(&key, 1)?;
        store.clear(&key)?;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[1].previous_as::<u8>(), Some(&1));
        assert!(seen[2].current().is_none());
        assert!(seen.iter().all(|u| u.is_for(&key)));
        Ok(())
    }

    #[test]
    fn test_subscriber_can_reenter_store() -> Result<(), StoreError> {
        let store = ValueStore::new();
        let source = Key::<u32>::register();
        let mirror = Key::<u32>::register();

        let handle = store.clone();
        let target = mirror.clone();
        let source_id = source.id().clone();
        let _sub = store.observe(&ValueStore::CHANGED, move |update: &ValueUpdate| {
            if update.key() == &source_id {
                handle
                    .set(&target, update.current_as::<u32>().copied())
                    .unwrap();
            }
        })?;

        store.set(&source, 3)?;
        assert_eq!(store.get(&mirror)?, Some(3));
        Ok(())
    }

    #[test]
    fn test_clear_all_emits_per_entry() -> Result<(), StoreError> {
        let store = ValueStore::new();
        let a = Key::<u8>::register();
        let b = Key::<u8>::register();
        let c = Key::<u8>::register();
        store.set(&a, 1)?;
        store.set(&b, 2)?;
        store.set(&c, 3)?;
        store.clear(&c)?;

        let (seen, _sub) = recorder(&store);
        store.clear_all()?;

        assert!(store.is_empty()?);
        assert_eq!(seen.lock().unwrap().len(), 2);
        Ok(())
    }

    #[test]
    fn test_key_usable_after_closure_panic() -> Result<(), StoreError> {
        let store = ValueStore::new();
        let key = Key::<u32>::register();

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            store.get_or_insert_with(&key, || -> u32 { panic!("supplier failed") })
        }));
        assert!(outcome.is_err());
        assert!(!store.contains(&key)?);

        store.set(&key, 5)?;
        assert_eq!(store.get(&key)?, Some(5));

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            store.get_and_update(&key, |_| -> Option<u32> { panic!("update failed") })
        }));
        assert!(outcome.is_err());
        assert_eq!(store.get(&key)?, Some(5));
        assert_eq!(store.update_and_get(&key, |v| v.map(|n| n + 1))?, Some(6));
        assert_eq!(store.len()?, 1);
        Ok(())
    }

    #[test]
    fn test_removing_absent_key_allocates_no_slot() -> Result<(), StoreError> {
        let store = ValueStore::new();
        let key = Key::<u8>::register();
        let (seen, _sub) = recorder(&store);

        store.clear(&key)?;
        store.remove_raw("never-set")?;
        assert_eq!(store.slots.read().unwrap().len(), 0);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].is_for(&key));
        assert!(seen[0].previous().is_none() && seen[0].current().is_none());
        Ok(())
    }
}
