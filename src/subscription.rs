//! Cancellable subscription handles and groups of them.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, Weak};

use tracing::trace;

use crate::emitter::{EmitterInner, WeakTarget};
use crate::error::StoreError;
use crate::key::{Channel, Key, KeyId};
use crate::observable::Observable;
use crate::store::ValueStore;

/// Whether a subscription owns its callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Lifetime {
    /// The emitter owns the callback.
    Strong,
    /// The caller owns the callback; the emitter only observes it.
    Weak,
}

/// Identity of one subscription within its emitter.
///
/// Every call to `subscribe` produces a new id, even for the same callback
/// and channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub(crate) u64);

/// Handle returned by every subscribe call.
///
/// A subscription moves from active to cancelled exactly once, either through
/// [`cancel`](Subscription::cancel) or, for weak subscriptions, when the
/// callback is reclaimed. Dropping the handle of a strong subscription does
/// **not** cancel it; use a [`SubscriptionSet`] for scoped cleanup.
pub struct Subscription {
    id: SubscriptionId,
    channel: KeyId,
    lifetime: Lifetime,
    emitter: Weak<EmitterInner>,
    probe: Option<WeakTarget>,
    cancelled: AtomicBool,
}

impl Subscription {
    pub(crate) fn new(
        id: SubscriptionId,
        channel: KeyId,
        lifetime: Lifetime,
        emitter: Weak<EmitterInner>,
        probe: Option<WeakTarget>,
    ) -> Self {
        Self {
            id,
            channel,
            lifetime,
            emitter,
            probe,
            cancelled: AtomicBool::new(false),
        }
    }

    /// Removes the subscription from its channel.
    ///
    /// Once this returns, no emission that starts afterwards will call the
    /// callback. Calling it again is a no-op.
    pub fn cancel(&self) -> Result<(), StoreError> {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let Some(emitter) = self.emitter.upgrade() {
            if let Err(err) = emitter.remove(&self.channel, self.id) {
                self.cancelled.store(false, Ordering::Release);
                return Err(err);
            }
        }
        trace!(channel = %self.channel, subscription = self.id.0, "cancelled");
        Ok(())
    }

    /// False once cancelled, once a weak callback is reclaimed, or once the
    /// emitter is gone.
    pub fn is_active(&self) -> bool {
        if self.cancelled.load(Ordering::Acquire) || self.emitter.strong_count() == 0 {
            return false;
        }
        self.probe
            .as_ref()
            .map_or(true, |probe| probe.strong_count() > 0)
    }

    /// This subscription's id.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// The channel this subscription listens on.
    pub fn channel(&self) -> &KeyId {
        &self.channel
    }

    /// Strong or weak.
    pub fn lifetime(&self) -> Lifetime {
        self.lifetime
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("channel", &self.channel)
            .field("lifetime", &self.lifetime)
            .field("active", &self.is_active())
            .finish()
    }
}

/// A group of subscriptions released together.
///
/// Components that observe several channels collect their handles here and
/// release them in one call when they shut down. Dropping the set releases
/// everything still in it.
///
/// # Examples
///
/// ```
/// use sovran_attrmap::{Channel, Emitter, StoreError, SubscriptionSet};
///
/// let emitter = Emitter::new();
/// let ticks = Channel::<u64>::register();
///
/// let subs = SubscriptionSet::new();
/// subs.observe(&emitter, &ticks, |_: &u64| {})?;
/// subs.observe(&emitter, &ticks, |_: &u64| {})?;
/// assert_eq!(emitter.subscriber_count(ticks.id())?, 2);
///
/// subs.release_all()?;
/// assert_eq!(emitter.subscriber_count(ticks.id())?, 0);
/// # Ok::<(), StoreError>(())
/// ```
#[derive(Default)]
pub struct SubscriptionSet {
    subscriptions: Mutex<Vec<Subscription>>,
}

impl SubscriptionSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes ownership of a subscription and returns its id.
    pub fn add(&self, subscription: Subscription) -> Result<SubscriptionId, StoreError> {
        let id = subscription.id();
        let mut subs = self
            .subscriptions
            .lock()
            .map_err(|_| StoreError::LockError)?;
        subs.push(subscription);
        Ok(id)
    }

    /// Subscribes on `observable` and keeps the handle in this set.
    pub fn observe<O, T, F>(
        &self,
        observable: &O,
        channel: &Channel<T>,
        callback: F,
    ) -> Result<SubscriptionId, StoreError>
    where
        O: Observable,
        T: 'static,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.add(observable.observe(channel, callback)?)
    }

    /// Subscribes to typed changes of one store key and keeps the handle.
    pub fn observe_key<T, F>(
        &self,
        store: &ValueStore,
        key: &Key<T>,
        callback: F,
    ) -> Result<SubscriptionId, StoreError>
    where
        T: Send + Sync + 'static,
        F: Fn(Option<&T>) + Send + Sync + 'static,
    {
        self.add(store.observe_key(key, callback)?)
    }

    /// Cancels one subscription and drops it from the set.
    ///
    /// Returns `Ok(false)` if the id is not in the set.
    pub fn release(&self, id: SubscriptionId) -> Result<bool, StoreError> {
        let mut subs = self
            .subscriptions
            .lock()
            .map_err(|_| StoreError::LockError)?;
        let Some(pos) = subs.iter().position(|sub| sub.id() == id) else {
            return Ok(false);
        };
        subs[pos].cancel()?;
        subs.swap_remove(pos);
        Ok(true)
    }

    /// Cancels every subscription in the set and empties it.
    pub fn release_all(&self) -> Result<(), StoreError> {
        let drained: Vec<Subscription> = {
            let mut subs = self
                .subscriptions
                .lock()
                .map_err(|_| StoreError::LockError)?;
            subs.drain(..).collect()
        };
        for sub in &drained {
            sub.cancel()?;
        }
        Ok(())
    }

    /// Number of subscriptions held.
    pub fn len(&self) -> Result<usize, StoreError> {
        let subs = self
            .subscriptions
            .lock()
            .map_err(|_| StoreError::LockError)?;
        Ok(subs.len())
    }

    /// True if the set holds no subscriptions.
    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

impl Drop for SubscriptionSet {
    fn drop(&mut self) {
        let subs = match self.subscriptions.get_mut() {
            Ok(subs) => subs,
            Err(poisoned) => poisoned.into_inner(),
        };
        for sub in subs.drain(..) {
            if let Err(err) = sub.cancel() {
                tracing::warn!(error = %err, "failed to release subscription on drop");
            }
        }
    }
}

impl fmt::Debug for SubscriptionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionSet")
            .field("len", &self.len().ok())
            .finish()
    }
}
