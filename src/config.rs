//! # Configuration for emitters and key registries.
//!
//! Both configs are plain values with sensible [`Default`]s; nothing is read
//! from the environment.
//!
//! - [`EmitterConfig`]: how an [`Emitter`](crate::Emitter) reacts to a panicking subscriber
//! - [`RegistryConfig`]: how a [`KeyRegistry`](crate::KeyRegistry) names the keys it issues

/// What an emission does when a subscriber callback panics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PanicPolicy {
    /// The panic unwinds out of `emit` and the remaining subscribers of that
    /// fan-out are skipped.
    #[default]
    Propagate,
    /// Each callback runs under `catch_unwind`; the panic is logged and
    /// delivery continues with the next subscriber.
    ///
    /// Uses `AssertUnwindSafe`: a subscriber that panics while holding its own
    /// lock can still leave that state poisoned.
    Isolate,
}

/// Settings for an [`Emitter`](crate::Emitter).
#[derive(Clone, Debug, Default)]
pub struct EmitterConfig {
    /// Reaction to a panicking subscriber.
    pub panic_policy: PanicPolicy,
}

impl EmitterConfig {
    /// Config that isolates subscriber panics from each other.
    pub fn isolating() -> Self {
        Self {
            panic_policy: PanicPolicy::Isolate,
        }
    }
}

/// Settings for a [`KeyRegistry`](crate::KeyRegistry).
///
/// ## Field semantics
/// - `prefix`: prepended to the sequence number of every auto-generated
///   string identifier (`"key-0"`, `"key-1"`, ...). Two registries with the
///   same prefix generate the same identifiers, and string-identified keys
///   with equal identifiers address the same slot.
#[derive(Clone, Debug)]
pub struct RegistryConfig {
    /// Prefix for generated identifiers.
    pub prefix: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            prefix: "key-".to_string(),
        }
    }
}
