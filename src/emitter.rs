//! Synchronous, per-channel fan-out of events to subscriber callbacks.
//!
//! An [`Emitter`] keeps one subscriber list per channel identity. Emitting on
//! a channel calls every live subscriber of that channel on the calling
//! thread before `emit` returns.
//!
//! ## Lifetimes
//! - **Strong** subscriptions own their callback. It stays alive until the
//!   subscription is cancelled or the emitter is dropped.
//! - **Weak** subscriptions only point at a callback the caller owns through
//!   an `Arc`. Once the caller drops every `Arc`, the subscription behaves as
//!   cancelled and its entry is pruned the next time an emission reaches it.
//!
//! ## Re-entrancy
//! Emission copies the live callbacks out under a read lock and invokes them
//! with no lock held. Callbacks may therefore subscribe, cancel or emit on the
//! same emitter. Subscribers added or removed during a fan-out may or may not
//! see that fan-out.
//!
//! ## Panics
//! With the default [`PanicPolicy::Propagate`] a panicking callback unwinds
//! out of `emit` and later subscribers are skipped. [`PanicPolicy::Isolate`]
//! logs the panic and carries on.

use std::any::{type_name, Any};
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use tracing::{debug, error, trace};

use crate::config::{EmitterConfig, PanicPolicy};
use crate::error::StoreError;
use crate::key::{Channel, DuplexChannel, KeyId};
use crate::subscription::{Lifetime, Subscription, SubscriptionId};

pub(crate) type Target = Arc<dyn Any + Send + Sync>;
pub(crate) type WeakTarget = Weak<dyn Any + Send + Sync>;

/// Downcasts the stored callback and the payload, then calls the callback.
type Invoke = fn(&(dyn Any + Send + Sync), &dyn Any);

enum Holder {
    Strong(Target),
    Weak(WeakTarget),
}

impl Holder {
    fn upgrade(&self) -> Option<Target> {
        match self {
            Holder::Strong(target) => Some(Arc::clone(target)),
            Holder::Weak(target) => target.upgrade(),
        }
    }

    fn is_live(&self) -> bool {
        match self {
            Holder::Strong(_) => true,
            Holder::Weak(target) => target.strong_count() > 0,
        }
    }
}

struct Entry {
    id: SubscriptionId,
    invoke: Invoke,
    holder: Holder,
}

fn invoke_mono<T, F>(target: &(dyn Any + Send + Sync), payload: &dyn Any)
where
    T: 'static,
    F: Fn(&T) + 'static,
{
    match (target.downcast_ref::<F>(), payload.downcast_ref::<T>()) {
        (Some(callback), Some(value)) => callback(value),
        _ => debug!(expected = type_name::<T>(), "payload type mismatch, subscriber skipped"),
    }
}

fn invoke_duplex<A, B, F>(target: &(dyn Any + Send + Sync), payload: &dyn Any)
where
    A: 'static,
    B: 'static,
    F: Fn(&A, &B) + 'static,
{
    match (target.downcast_ref::<F>(), payload.downcast_ref::<(A, B)>()) {
        (Some(callback), Some((first, second))) => callback(first, second),
        _ => debug!(
            expected = type_name::<(A, B)>(),
            "payload type mismatch, subscriber skipped"
        ),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        *message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

pub(crate) struct EmitterInner {
    channels: RwLock<HashMap<KeyId, Vec<Entry>>>,
    next_id: AtomicU64,
    config: EmitterConfig,
}

impl EmitterInner {
    /// Removes one subscription; returns whether it was still registered.
    pub(crate) fn remove(&self, channel: &KeyId, id: SubscriptionId) -> Result<bool, StoreError> {
        let mut channels = self.channels.write().map_err(|_| StoreError::LockError)?;
        let Some(entries) = channels.get_mut(channel) else {
            return Ok(false);
        };
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            channels.remove(channel);
        }
        Ok(removed)
    }

    fn prune(&self, channel: &KeyId) -> Result<(), StoreError> {
        let mut channels = self.channels.write().map_err(|_| StoreError::LockError)?;
        if let Some(entries) = channels.get_mut(channel) {
            let before = entries.len();
            entries.retain(|entry| entry.holder.is_live());
            debug!(
                channel = %channel,
                pruned = before - entries.len(),
                "pruned reclaimed weak subscribers"
            );
            if entries.is_empty() {
                channels.remove(channel);
            }
        }
        Ok(())
    }
}

/// Per-channel subscriber registry with synchronous delivery.
///
/// Cloning an `Emitter` creates a new handle to the **same** registry.
///
/// # Examples
///
/// ```
/// use sovran_attrmap::{Channel, Emitter, StoreError};
/// use std::sync::{Arc, Mutex};
///
/// let emitter = Emitter::new();
/// let greetings = Channel::<String>::register();
///
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let sink = Arc::clone(&seen);
/// let sub = emitter.subscribe(&greetings, move |msg: &String| {
///     sink.lock().unwrap().push(msg.clone());
/// })?;
///
/// emitter.emit(&greetings, &"hello".to_string())?;
/// sub.cancel()?;
/// emitter.emit(&greetings, &"ignored".to_string())?;
///
/// assert_eq!(*seen.lock().unwrap(), vec!["hello".to_string()]);
/// # Ok::<(), StoreError>(())
/// ```
#[derive(Clone)]
pub struct Emitter {
    inner: Arc<EmitterInner>,
}

impl Emitter {
    /// Creates an emitter with the default config.
    pub fn new() -> Self {
        Self::with_config(EmitterConfig::default())
    }

    /// Creates an emitter with the given config.
    pub fn with_config(config: EmitterConfig) -> Self {
        Self {
            inner: Arc::new(EmitterInner {
                channels: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(0),
                config,
            }),
        }
    }

    /// The config this emitter was built with.
    pub fn config(&self) -> &EmitterConfig {
        &self.inner.config
    }

    fn register(
        &self,
        channel: &KeyId,
        invoke: Invoke,
        target: Target,
        lifetime: Lifetime,
    ) -> Result<Subscription, StoreError> {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (holder, probe) = match lifetime {
            Lifetime::Strong => (Holder::Strong(target), None),
            Lifetime::Weak => {
                let weak = Arc::downgrade(&target);
                (Holder::Weak(weak.clone()), Some(weak))
            }
        };

        let mut channels = self
            .inner
            .channels
            .write()
            .map_err(|_| StoreError::LockError)?;
        channels
            .entry(channel.clone())
            .or_default()
            .push(Entry { id, invoke, holder });
        drop(channels);

        trace!(channel = %channel, subscription = id.0, ?lifetime, "subscribed");
        Ok(Subscription::new(
            id,
            channel.clone(),
            lifetime,
            Arc::downgrade(&self.inner),
            probe,
        ))
    }

    /// Subscribes a callback that the emitter owns.
    pub fn subscribe<T, F>(&self, channel: &Channel<T>, callback: F) -> Result<Subscription, StoreError>
    where
        T: 'static,
        F: Fn(&T) + Send + Sync + 'static,
    {
        let target: Target = Arc::new(callback);
        self.register(channel.id(), invoke_mono::<T, F>, target, Lifetime::Strong)
    }

    /// Subscribes a callback owned by the caller.
    ///
    /// The emitter keeps only a weak reference; dropping the last `Arc` to
    /// `callback` ends the subscription.
    pub fn subscribe_weak<T, F>(
        &self,
        channel: &Channel<T>,
        callback: &Arc<F>,
    ) -> Result<Subscription, StoreError>
    where
        T: 'static,
        F: Fn(&T) + Send + Sync + 'static,
    {
        let target: Target = Arc::clone(callback) as Target;
        self.register(channel.id(), invoke_mono::<T, F>, target, Lifetime::Weak)
    }

    /// Subscribes a two-argument callback that the emitter owns.
    pub fn subscribe_duplex<A, B, F>(
        &self,
        channel: &DuplexChannel<A, B>,
        callback: F,
    ) -> Result<Subscription, StoreError>
    where
        A: 'static,
        B: 'static,
        F: Fn(&A, &B) + Send + Sync + 'static,
    {
        let target: Target = Arc::new(callback);
        self.register(channel.id(), invoke_duplex::<A, B, F>, target, Lifetime::Strong)
    }

    /// Subscribes a two-argument callback owned by the caller.
    pub fn subscribe_duplex_weak<A, B, F>(
        &self,
        channel: &DuplexChannel<A, B>,
        callback: &Arc<F>,
    ) -> Result<Subscription, StoreError>
    where
        A: 'static,
        B: 'static,
        F: Fn(&A, &B) + Send + Sync + 'static,
    {
        let target: Target = Arc::clone(callback) as Target;
        self.register(channel.id(), invoke_duplex::<A, B, F>, target, Lifetime::Weak)
    }

    /// Delivers `value` to every live subscriber of `channel`.
    pub fn emit<T: 'static>(&self, channel: &Channel<T>, value: &T) -> Result<(), StoreError> {
        self.dispatch(channel.id(), value)
    }

    /// Delivers both values, as one payload, to every live subscriber of `channel`.
    pub fn emit_duplex<A, B>(
        &self,
        channel: &DuplexChannel<A, B>,
        first: A,
        second: B,
    ) -> Result<(), StoreError>
    where
        A: 'static,
        B: 'static,
    {
        let payload = (first, second);
        self.dispatch(channel.id(), &payload)
    }

    fn dispatch(&self, channel: &KeyId, payload: &dyn Any) -> Result<(), StoreError> {
        let (live, dead) = {
            let channels = self
                .inner
                .channels
                .read()
                .map_err(|_| StoreError::LockError)?;
            let Some(entries) = channels.get(channel) else {
                trace!(channel = %channel, subscribers = 0, "emit");
                return Ok(());
            };
            let mut live = Vec::with_capacity(entries.len());
            let mut dead = 0usize;
            for entry in entries {
                match entry.holder.upgrade() {
                    Some(target) => live.push((entry.invoke, target)),
                    None => dead += 1,
                }
            }
            (live, dead)
        };

        if dead > 0 {
            self.inner.prune(channel)?;
        }

        trace!(channel = %channel, subscribers = live.len(), "emit");
        for (invoke, target) in &live {
            self.deliver(channel, *invoke, target.as_ref(), payload);
        }
        Ok(())
    }

    fn deliver(
        &self,
        channel: &KeyId,
        invoke: Invoke,
        target: &(dyn Any + Send + Sync),
        payload: &dyn Any,
    ) {
        match self.inner.config.panic_policy {
            PanicPolicy::Propagate => invoke(target, payload),
            PanicPolicy::Isolate => {
                if let Err(panic) = catch_unwind(AssertUnwindSafe(|| invoke(target, payload))) {
                    error!(
                        channel = %channel,
                        panic = panic_message(panic.as_ref()),
                        "subscriber panicked"
                    );
                }
            }
        }
    }

    /// Cancels a subscription made on this emitter. Idempotent.
    pub fn cancel(&self, subscription: &Subscription) -> Result<(), StoreError> {
        subscription.cancel()
    }

    /// Number of registered subscribers on a channel, including weak ones
    /// not yet pruned.
    pub fn subscriber_count(&self, channel: &KeyId) -> Result<usize, StoreError> {
        let channels = self
            .inner
            .channels
            .read()
            .map_err(|_| StoreError::LockError)?;
        Ok(channels.get(channel).map_or(0, Vec::len))
    }
}

impl Default for Emitter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Emitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let channels = self.inner.channels.read().map(|c| c.len()).ok();
        f.debug_struct("Emitter")
            .field("channels", &channels)
            .field("config", &self.inner.config)
            .finish()
    }
}
