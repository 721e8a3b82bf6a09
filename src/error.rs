//! Errors produced by the value store, the emitter and their helpers.
//!
//! None of these are retried internally. Callers that prefer a fallback over a
//! failure use the non-failing variants (`get`, `get_or`) instead.

use thiserror::Error;

use crate::key::KeyId;

/// Errors that can occur when using a [`ValueStore`](crate::ValueStore) or an
/// [`Emitter`](crate::Emitter).
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Failed to acquire an internal lock (it was poisoned by a panic).
    #[error("failed to acquire lock")]
    LockError,

    /// A value was required but the key holds nothing.
    #[error("no value present for key {key}")]
    NotPresent {
        /// The key that was read.
        key: KeyId,
    },

    /// A caller-supplied value (direct write or default) was rejected by the key's witness.
    #[error("cannot assign {found} to key {key} expecting {expected}")]
    ArgumentTypeMismatch {
        /// The key that was written.
        key: KeyId,
        /// Description of the key's witness.
        expected: String,
        /// Type name of the rejected value.
        found: &'static str,
    },

    /// The value already stored under a key does not satisfy the key's witness.
    ///
    /// This can only happen when a value was placed into the slot out-of-band
    /// (raw string access) and is never fixed by retrying.
    #[error("key {key} expecting {expected} holds a value of type {found}")]
    StoredTypeMismatch {
        /// The key that was read.
        key: KeyId,
        /// Description of the key's witness.
        expected: String,
        /// Type name of the stored value.
        found: &'static str,
    },

    /// A lazily computed default produced no value.
    #[error("default supplier for key {key} produced no value")]
    InvalidDefault {
        /// The key being defaulted.
        key: KeyId,
    },

    /// A one-shot construct was finalized more than once.
    #[error("{what} already finished")]
    InvalidState {
        /// Name of the construct.
        what: &'static str,
    },
}

impl StoreError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use sovran_attrmap::StoreError;
    ///
    /// assert_eq!(StoreError::LockError.as_label(), "store_lock_error");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            StoreError::LockError => "store_lock_error",
            StoreError::NotPresent { .. } => "store_not_present",
            StoreError::ArgumentTypeMismatch { .. } => "store_argument_type_mismatch",
            StoreError::StoredTypeMismatch { .. } => "store_stored_type_mismatch",
            StoreError::InvalidDefault { .. } => "store_invalid_default",
            StoreError::InvalidState { .. } => "store_invalid_state",
        }
    }

    /// Indicates an internal consistency violation rather than a caller mistake.
    ///
    /// Returns `true` for [`StoreError::StoredTypeMismatch`] and
    /// [`StoreError::LockError`].
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StoreError::StoredTypeMismatch { .. } | StoreError::LockError
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_and_fatality() {
        let key = KeyId::named("colour");

        let stored = StoreError::StoredTypeMismatch {
            key: key.clone(),
            expected: "i32".to_string(),
            found: "alloc::string::String",
        };
        assert!(stored.is_fatal());
        assert_eq!(stored.as_label(), "store_stored_type_mismatch");

        let missing = StoreError::NotPresent { key };
        assert!(!missing.is_fatal());
        assert_eq!(missing.to_string(), "no value present for key colour");
    }
}
