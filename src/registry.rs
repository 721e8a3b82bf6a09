use std::sync::atomic::{AtomicU64, Ordering};

use tracing::trace;
use uuid::Uuid;

use crate::config::RegistryConfig;
use crate::key::{Channel, DuplexChannel, Key, KeyId, Witness};

/// Issues keys and channels from an explicit sequence.
///
/// A registry replaces a process-wide counter: the composition root creates
/// one and threads it to whoever needs keys, so tests stay hermetic. Opaque
/// ids combine a random per-registry namespace with the sequence number and
/// never collide with ids from another registry.
///
/// # Examples
///
/// ```
/// use sovran_attrmap::{KeyRegistry, RegistryConfig};
///
/// let registry = KeyRegistry::with_config(RegistryConfig { prefix: "session.".into() });
/// let user = registry.register_named::<String>();
/// let token = registry.register_named::<String>();
///
/// assert_eq!(user.id().as_name(), Some("session.0"));
/// assert_eq!(token.id().as_name(), Some("session.1"));
/// ```
#[derive(Debug)]
pub struct KeyRegistry {
    namespace: u64,
    next: AtomicU64,
    config: RegistryConfig,
}

impl KeyRegistry {
    /// Creates a registry with the default config.
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Creates a registry with the given config.
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            namespace: (Uuid::new_v4().as_u128() >> 64) as u64,
            next: AtomicU64::new(0),
            config,
        }
    }

    fn sequence(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    fn next_opaque(&self) -> KeyId {
        let seq = self.sequence();
        KeyId::Opaque((u128::from(self.namespace) << 64) | u128::from(seq))
    }

    /// Registers an opaque key.
    pub fn register<T: 'static>(&self) -> Key<T> {
        let id = self.next_opaque();
        trace!(key = %id, ty = std::any::type_name::<T>(), "registered key");
        Key::from_parts(id, Witness::of())
    }

    /// Registers an opaque key with a refining check.
    pub fn register_checked<T, F>(&self, label: &'static str, check: F) -> Key<T>
    where
        T: 'static,
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let id = self.next_opaque();
        trace!(key = %id, ty = std::any::type_name::<T>(), label, "registered key");
        Key::from_parts(id, Witness::checked(label, check))
    }

    /// Registers a string-identified key with a generated identifier.
    pub fn register_named<T: 'static>(&self) -> Key<T> {
        let ident = format!("{}{}", self.config.prefix, self.sequence());
        trace!(key = %ident, ty = std::any::type_name::<T>(), "registered named key");
        Key::from_parts(KeyId::named(ident), Witness::of())
    }

    /// Registers a single-value channel.
    pub fn channel<T>(&self) -> Channel<T> {
        Channel::from_id(self.next_opaque())
    }

    /// Registers a two-value channel.
    pub fn duplex_channel<A, B>(&self) -> DuplexChannel<A, B> {
        DuplexChannel::from_id(self.next_opaque())
    }
}

impl Default for KeyRegistry {
    fn default() -> Self {
        Self::new()
    }
}
