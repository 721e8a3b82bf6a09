use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::warn;

use crate::error::StoreError;
use crate::key::Channel;
use crate::observable::Observable;
use crate::subscription::Subscription;

/// Records whether a matching emission happened between two points in code.
///
/// Start a watcher, run the code under observation, then call
/// [`finish`](EmissionWatcher::finish). The watcher subscribes on start and
/// cancels on finish, or on drop if it was never finished.
///
/// # Examples
///
/// ```
/// use sovran_attrmap::{EmissionWatcher, Key, StoreError, ValueStore, ValueUpdate};
///
/// let store = ValueStore::new();
/// let score = Key::<u32>::register();
///
/// let id = score.id().clone();
/// let watcher = EmissionWatcher::start(&store, &ValueStore::CHANGED, move |u: &ValueUpdate| u.key() == &id)?;
/// store.set(&score, 10)?;
/// assert!(watcher.finish()?);
///
/// // Finishing twice is a caller bug.
/// assert!(matches!(watcher.finish(), Err(StoreError::InvalidState { .. })));
/// # Ok::<(), StoreError>(())
/// ```
#[derive(Debug)]
pub struct EmissionWatcher {
    subscription: Subscription,
    tripped: Arc<AtomicBool>,
    finished: AtomicBool,
}

impl EmissionWatcher {
    /// Starts watching `channel` on `observable`; only emissions passing
    /// `filter` count.
    pub fn start<O, T, P>(observable: &O, channel: &Channel<T>, filter: P) -> Result<Self, StoreError>
    where
        O: Observable,
        T: 'static,
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let tripped = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&tripped);
        let subscription = observable.observe(channel, move |value: &T| {
            if filter(value) {
                flag.store(true, Ordering::Release);
            }
        })?;
        Ok(Self {
            subscription,
            tripped,
            finished: AtomicBool::new(false),
        })
    }

    /// Starts watching `channel` on `observable`; every emission counts.
    pub fn start_any<O, T>(observable: &O, channel: &Channel<T>) -> Result<Self, StoreError>
    where
        O: Observable,
        T: 'static,
    {
        Self::start(observable, channel, |_: &T| true)
    }

    /// Whether a matching emission has been seen so far.
    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::Acquire)
    }

    /// Stops watching and reports whether a matching emission happened.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidState` if called more than once.
    pub fn finish(&self) -> Result<bool, StoreError> {
        if self
            .finished
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(StoreError::InvalidState {
                what: "emission watcher",
            });
        }
        self.subscription.cancel()?;
        Ok(self.is_tripped())
    }
}

impl Drop for EmissionWatcher {
    fn drop(&mut self) {
        if *self.finished.get_mut() {
            return;
        }
        if let Err(err) = self.subscription.cancel() {
            warn!(error = %err, "failed to cancel unfinished emission watcher");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Emitter;

    #[test]
    fn test_untripped_watcher() -> Result<(), StoreError> {
        let emitter = Emitter::new();
        let channel = Channel::<i32>::register();
        let watcher = EmissionWatcher::start_any(&emitter, &channel)?;
        assert!(!watcher.finish()?);
        Ok(())
    }

    #[test]
    fn test_filter_decides_trip() -> Result<(), StoreError> {
        let emitter = Emitter::new();
        let channel = Channel::<i32>::register();
        let watcher = EmissionWatcher::start(&emitter, &channel, |v: &i32| *v > 10)?;

        emitter.emit(&channel, &5)?;
        assert!(!watcher.is_tripped());
        emitter.emit(&channel, &50)?;
        assert!(watcher.finish()?);
        Ok(())
    }

    #[test]
    fn test_finish_cancels_subscription() -> Result<(), StoreError> {
        let emitter = Emitter::new();
        let channel = Channel::<i32>::register();
        let watcher = EmissionWatcher::start_any(&emitter, &channel)?;
        assert_eq!(emitter.subscriber_count(channel.id())?, 1);

        watcher.finish()?;
        assert_eq!(emitter.subscriber_count(channel.id())?, 0);
        assert_eq!(
            watcher.finish(),
            Err(StoreError::InvalidState {
                what: "emission watcher"
            })
        );
        Ok(())
    }

    #[test]
    fn test_drop_without_finish_unsubscribes() -> Result<(), StoreError> {
        let emitter = Emitter::new();
        let channel = Channel::<i32>::register();
        {
            let watcher = EmissionWatcher::start_any(&emitter, &channel)?;
            emitter.emit(&channel, &1)?;
            assert!(watcher.is_tripped());
            assert_eq!(emitter.subscriber_count(channel.id())?, 1);
        }
        assert_eq!(emitter.subscriber_count(channel.id())?, 0);
        Ok(())
    }
}
