//! Type-branded identities for storage slots and notification channels.
//!
//! A [`Key<T>`] addresses one slot of a [`ValueStore`](crate::ValueStore) and
//! carries a [`Witness<T>`] used to validate values at runtime. Channel keys
//! ([`Channel<T>`], [`DuplexChannel<A, B>`]) address one namespace of an
//! [`Emitter`](crate::Emitter).
//!
//! Keys compare by identity, never by declared type: two keys registered for
//! `i32` are different keys.

use std::any::type_name;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

use uuid::Uuid;

use crate::any_value::AnyValue;

/// The identity behind every key.
///
/// `Opaque` ids are wide numbers (random, or sequential within a
/// [`KeyRegistry`](crate::KeyRegistry)). `Named` ids compare by string, which
/// lets raw string access reach the same slot as a typed key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum KeyId {
    /// Identity by number.
    Opaque(u128),
    /// Identity by identifier string.
    Named(Arc<str>),
}

impl KeyId {
    /// A fresh random opaque id.
    pub fn random() -> Self {
        KeyId::Opaque(Uuid::new_v4().as_u128())
    }

    /// A string-identified id.
    pub fn named(ident: impl Into<Arc<str>>) -> Self {
        KeyId::Named(ident.into())
    }

    /// The identifier string, for named ids.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            KeyId::Opaque(_) => None,
            KeyId::Named(name) => Some(name),
        }
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyId::Opaque(id) => write!(f, "#{:032x}", id),
            KeyId::Named(name) => f.write_str(name),
        }
    }
}

type Check<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Runtime validator attached to a [`Key<T>`].
///
/// The type tag is `T` itself. An optional check narrows the accepted values
/// further, so a key can stand for "an `i32` that is even" the way a subtype
/// would.
pub struct Witness<T> {
    label: Option<&'static str>,
    check: Option<Check<T>>,
}

impl<T: 'static> Witness<T> {
    /// Accepts every value of type `T`.
    pub fn of() -> Self {
        Self {
            label: None,
            check: None,
        }
    }

    /// Accepts values of type `T` for which `check` returns true.
    pub fn checked<F>(label: &'static str, check: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self {
            label: Some(label),
            check: Some(Arc::new(check)),
        }
    }

    /// Name of the witnessed type.
    pub fn type_name(&self) -> &'static str {
        type_name::<T>()
    }

    /// Human readable form used in error messages.
    pub fn describe(&self) -> String {
        match self.label {
            Some(label) => format!("{} ({})", type_name::<T>(), label),
            None => type_name::<T>().to_string(),
        }
    }

    /// Whether a typed value is acceptable.
    pub fn accepts(&self, value: &T) -> bool {
        self.check.as_ref().map_or(true, |check| check(value))
    }

    /// Whether an erased value has type `T` and is acceptable.
    pub fn accepts_any(&self, value: &AnyValue) -> bool {
        value
            .downcast_ref::<T>()
            .map_or(false, |typed| self.accepts(typed))
    }
}

impl<T> Clone for Witness<T> {
    fn clone(&self) -> Self {
        Self {
            label: self.label,
            check: self.check.clone(),
        }
    }
}

impl<T> fmt::Debug for Witness<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Witness")
            .field("type", &type_name::<T>())
            .field("label", &self.label)
            .finish()
    }
}

/// A typed handle to one slot of a [`ValueStore`](crate::ValueStore).
///
/// # Examples
///
/// ```
/// use sovran_attrmap::Key;
///
/// let hits = Key::<u64>::register();
/// let misses = Key::<u64>::register();
/// assert_ne!(hits, misses);
///
/// let title = Key::<String>::named("title");
/// assert_eq!(title, Key::<String>::named("title"));
/// assert_eq!(title.id().as_name(), Some("title"));
/// ```
pub struct Key<T> {
    id: KeyId,
    witness: Witness<T>,
}

impl<T: 'static> Key<T> {
    /// Registers a key with a fresh random identity.
    pub fn register() -> Self {
        Self::from_parts(KeyId::random(), Witness::of())
    }

    /// Registers a key with a fresh random identity and a refining check.
    ///
    /// Typed writes whose value fails `check` are rejected with
    /// [`StoreError::ArgumentTypeMismatch`](crate::StoreError::ArgumentTypeMismatch).
    pub fn register_checked<F>(label: &'static str, check: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self::from_parts(KeyId::random(), Witness::checked(label, check))
    }

    /// A string-identified key. Every key built from the same identifier
    /// addresses the same slot, and raw string access reaches it too.
    pub fn named(ident: impl Into<Arc<str>>) -> Self {
        Self::from_parts(KeyId::named(ident), Witness::of())
    }

    pub(crate) fn from_parts(id: KeyId, witness: Witness<T>) -> Self {
        Self { id, witness }
    }

    /// The identity of this key.
    pub fn id(&self) -> &KeyId {
        &self.id
    }

    /// The runtime validator of this key.
    pub fn witness(&self) -> &Witness<T> {
        &self.witness
    }

    /// Name of the type this key holds.
    pub fn type_name(&self) -> &'static str {
        self.witness.type_name()
    }
}

impl<T> Clone for Key<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            witness: self.witness.clone(),
        }
    }
}

impl<T> PartialEq for Key<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Key<T> {}

impl<T> Hash for Key<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T> fmt::Debug for Key<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key")
            .field("id", &self.id)
            .field("type", &type_name::<T>())
            .finish()
    }
}

/// A channel delivering one value of type `T` per emission.
pub struct Channel<T> {
    id: KeyId,
    _marker: PhantomData<fn(&T)>,
}

impl<T> Channel<T> {
    /// Registers a channel with a fresh random identity.
    pub fn register() -> Self {
        Self::from_id(KeyId::random())
    }

    /// A channel with a fixed identity, for channels defined by a library.
    pub const fn well_known(id: u128) -> Self {
        Self::from_id(KeyId::Opaque(id))
    }

    pub(crate) const fn from_id(id: KeyId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    /// The identity of this channel.
    pub fn id(&self) -> &KeyId {
        &self.id
    }
}

/// A channel delivering a pair of values as one payload per emission.
pub struct DuplexChannel<A, B> {
    id: KeyId,
    _marker: PhantomData<fn(&A, &B)>,
}

impl<A, B> DuplexChannel<A, B> {
    /// Registers a channel with a fresh random identity.
    pub fn register() -> Self {
        Self::from_id(KeyId::random())
    }

    /// A channel with a fixed identity, for channels defined by a library.
    pub const fn well_known(id: u128) -> Self {
        Self::from_id(KeyId::Opaque(id))
    }

    pub(crate) const fn from_id(id: KeyId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    /// The identity of this channel.
    pub fn id(&self) -> &KeyId {
        &self.id
    }
}

macro_rules! channel_identity {
    ($name:ident < $($p:ident),+ >) => {
        impl<$($p),+> Clone for $name<$($p),+> {
            fn clone(&self) -> Self {
                Self::from_id(self.id.clone())
            }
        }

        impl<$($p),+> PartialEq for $name<$($p),+> {
            fn eq(&self, other: &Self) -> bool {
                self.id == other.id
            }
        }

        impl<$($p),+> Eq for $name<$($p),+> {}

        impl<$($p),+> Hash for $name<$($p),+> {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.id.hash(state);
            }
        }

        impl<$($p),+> fmt::Debug for $name<$($p),+> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($name)).field("id", &self.id).finish()
            }
        }
    };
}

channel_identity!(Channel<T>);
channel_identity!(DuplexChannel<A, B>);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_opaque_keys_are_distinct() {
        let a = Key::<i32>::register();
        let b = Key::<i32>::register();
        assert_ne!(a, b);
        assert_eq!(a, a.clone());

        let set: HashSet<_> = [a.clone(), b, a].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_named_keys_compare_by_identifier() {
        let a = Key::<String>::named("owner");
        let b = Key::<String>::named(String::from("owner"));
        assert_eq!(a, b);
        assert_ne!(a, Key::<String>::named("tenant"));
        assert_eq!(a.id().to_string(), "owner");
    }

    #[test]
    fn test_witness_checks() {
        let even = Witness::<i32>::checked("even", |v| v % 2 == 0);
        assert!(even.accepts(&4));
        assert!(!even.accepts(&3));
        assert!(even.accepts_any(&AnyValue::new(8i32)));
        assert!(!even.accepts_any(&AnyValue::new(8i64)));
        assert_eq!(even.describe(), "i32 (even)");
        assert_eq!(Witness::<u8>::of().describe(), "u8");
    }

    #[test]
    fn test_well_known_channel_identity() {
        const PING: Channel<u32> = Channel::well_known(7);
        assert_eq!(PING.id(), &KeyId::Opaque(7));
        assert_eq!(PING, Channel::<u32>::well_known(7));
        assert_ne!(Channel::<u32>::register(), Channel::<u32>::register());
        assert_ne!(
            DuplexChannel::<u8, u8>::register(),
            DuplexChannel::<u8, u8>::register()
        );
    }
}
