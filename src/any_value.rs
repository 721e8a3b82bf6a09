use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// A shared, type-erased value that remembers what it was created from.
///
/// This is what a [`ValueStore`](crate::ValueStore) keeps in each slot and what
/// change events carry. Cloning is cheap: the payload sits behind an `Arc`.
#[derive(Clone)]
pub struct AnyValue {
    type_id: TypeId,
    type_name: &'static str,
    value: Arc<dyn Any + Send + Sync>,
}

impl AnyValue {
    /// Create a new AnyValue from a value of any type that implements Any, Send, and Sync
    pub fn new<T: 'static + Any + Send + Sync>(value: T) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            value: Arc::new(value),
        }
    }

    /// Check if the contained value is of type T
    pub fn is_type<T: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// Get a reference to the contained value if it is of type T
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Name of the type this value was created from.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// True when both handles point at the same allocation.
    pub fn ptr_eq(&self, other: &AnyValue) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }
}

impl fmt::Debug for AnyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyValue")
            .field("type", &self.type_name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_tracking() {
        let value = AnyValue::new(42u8);
        assert!(value.is_type::<u8>());
        assert!(!value.is_type::<i32>());
        assert_eq!(value.downcast_ref::<u8>(), Some(&42));
        assert_eq!(value.downcast_ref::<i32>(), None);
        assert_eq!(value.type_name(), "u8");
    }

    #[test]
    fn test_clone_shares_payload() {
        let value = AnyValue::new(vec![1, 2, 3]);
        let copy = value.clone();
        assert!(value.ptr_eq(&copy));
        assert!(!value.ptr_eq(&AnyValue::new(vec![1, 2, 3])));
    }
}
