//! # sovran-attrmap
//!
//! A thread-safe, type-branded attribute store with synchronous change notification.
//!
//! `sovran-attrmap` lets independent components attach values of any type to a
//! shared holder object, and lets other components react when those values
//! change, without either side being compiled against the other.
//!
//! ## Key Features
//!
//! - **Type-branded keys**: a [`Key<T>`] is an identity plus a runtime witness; two keys
//!   registered for the same type never collide
//! - **Atomic compound operations**: `get_or_insert_with`, `get_and_update` and friends
//!   run race-free on a per-key lock, and a default is computed at most once
//! - **Observable**: every committed mutation is emitted on [`ValueStore::CHANGED`]
//! - **Strong and weak subscriptions**: subscribers either hand their callback to the
//!   emitter or keep it alive themselves through an `Arc`
//! - **Synchronous**: no threads, no queues; callbacks run on the mutating thread before
//!   the mutating call returns
//!
//! ## Usage Examples
//!
//! ### Basic Usage
//!
//! ```rust
//! use sovran_attrmap::{Key, StoreError, ValueStore};
//!
//! fn main() -> Result<(), StoreError> {
//!     // Keys are usually registered once and shared
//!     let retries = Key::<u32>::register();
//!     let owner = Key::<String>::named("owner");
//!
//!     let store = ValueStore::new();
//!     store.set(&retries, 3)?;
//!     store.set(&owner, "alice".to_string())?;
//!
//!     assert_eq!(store.get(&retries)?, Some(3));
//!     assert_eq!(store.get_required(&owner)?, "alice");
//!
//!     // Defaults: read-only, or stored on first use
//!     let timeout = Key::<u64>::register();
//!     assert_eq!(store.get_or(&timeout, 30)?, 30);
//!     assert!(!store.contains(&timeout)?);
//!     assert_eq!(store.get_or_insert(&timeout, 45)?, 45);
//!     assert_eq!(store.get(&timeout)?, Some(45));
//!
//!     // Handle errors properly
//!     match store.get_required(&Key::<bool>::register()) {
//!         Ok(value) => println!("Value: {}", value),
//!         Err(StoreError::NotPresent { key }) => println!("Key ({}) has no value", key),
//!         Err(e) => println!("Other error: {}", e),
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ### Reacting to Changes
//!
//! ```rust
//! use sovran_attrmap::{Key, Observable, StoreError, ValueStore, ValueUpdate};
//! use std::sync::{Arc, Mutex};
//!
//! fn main() -> Result<(), StoreError> {
//!     let store = ValueStore::new();
//!     let level = Key::<u8>::register();
//!
//!     // Filtered, typed observation of one key
//!     let seen = Arc::new(Mutex::new(Vec::new()));
//!     let sink = Arc::clone(&seen);
//!     let sub = store.observe_key(&level, move |value: Option<&u8>| {
//!         sink.lock().unwrap().push(value.copied());
//!     })?;
//!
//!     store.set(&level, 5)?;
//!     sub.cancel()?;
//!     store.set(&level, 6)?;
//!     assert_eq!(*seen.lock().unwrap(), vec![Some(5)]);
//!
//!     // Or every change, with previous and current values
//!     let _all = store.observe(&ValueStore::CHANGED, |update: &ValueUpdate| {
//!         println!(
//!             "{}: {:?} -> {:?}",
//!             update.key(),
//!             update.previous_as::<u8>(),
//!             update.current_as::<u8>()
//!         );
//!     })?;
//!     store.update_and_get(&level, |v| v.map(|n| n + 1))?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ### Weak Subscriptions
//!
//! ```rust
//! use sovran_attrmap::{Channel, Emitter, StoreError};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let emitter = Emitter::new();
//! let ticks = Channel::<u64>::register();
//! let count = Arc::new(AtomicUsize::new(0));
//!
//! // The caller owns the callback; the emitter only points at it
//! let sink = Arc::clone(&count);
//! let callback = Arc::new(move |_: &u64| {
//!     sink.fetch_add(1, Ordering::SeqCst);
//! });
//! let sub = emitter.subscribe_weak(&ticks, &callback)?;
//!
//! emitter.emit(&ticks, &1)?;
//! drop(callback);
//! emitter.emit(&ticks, &2)?;
//!
//! assert_eq!(count.load(Ordering::SeqCst), 1);
//! assert!(!sub.is_active());
//! # Ok::<(), StoreError>(())
//! ```
//!
//! ### Sharing One Store Between Components
//!
//! ```rust
//! use sovran_attrmap::{Key, KeyRegistry, StoreError, ValueStore};
//! use std::sync::Arc;
//! use std::thread;
//!
//! fn main() -> Result<(), StoreError> {
//!     let registry = KeyRegistry::new();
//!     let hits = registry.register::<u64>();
//!     let store = Arc::new(ValueStore::new());
//!
//!     let workers: Vec<_> = (0..4)
//!         .map(|_| {
//!             let store = Arc::clone(&store);
//!             let hits = hits.clone();
//!             thread::spawn(move || -> Result<(), StoreError> {
//!                 for _ in 0..100 {
//!                     store.update_and_get(&hits, |n| Some(n.unwrap_or(0) + 1))?;
//!                 }
//!                 Ok(())
//!             })
//!         })
//!         .collect();
//!
//!     for worker in workers {
//!         worker.join().expect("worker panicked")?;
//!     }
//!
//!     assert_eq!(store.get(&hits)?, Some(400));
//!     Ok(())
//! }
//! ```

mod any_value;
mod config;
mod emitter;
mod error;
mod key;
mod observable;
mod registry;
mod store;
mod subscription;
mod watcher;

pub use any_value::AnyValue;
pub use config::{EmitterConfig, PanicPolicy, RegistryConfig};
pub use emitter::Emitter;
pub use error::StoreError;
pub use key::{Channel, DuplexChannel, Key, KeyId, Witness};
pub use observable::Observable;
pub use registry::KeyRegistry;
pub use store::{ValueStore, ValueUpdate};
pub use subscription::{Lifetime, Subscription, SubscriptionId, SubscriptionSet};
pub use watcher::EmissionWatcher;
