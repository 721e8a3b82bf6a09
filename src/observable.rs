use std::sync::Arc;

use crate::emitter::Emitter;
use crate::error::StoreError;
use crate::key::{Channel, DuplexChannel};
use crate::subscription::Subscription;

/// An object whose events can be subscribed to.
///
/// Implementors only provide [`emitter`](Observable::emitter), which must
/// return the same emitter every time. Everything else forwards to it. This
/// lets one component react to another's state changes without either
/// depending on the other's concrete type.
///
/// # Examples
///
/// ```
/// use sovran_attrmap::{Channel, Emitter, Observable, StoreError};
///
/// struct Door {
///     events: Emitter,
/// }
///
/// impl Observable for Door {
///     fn emitter(&self) -> &Emitter {
///         &self.events
///     }
/// }
///
/// const OPENED: Channel<String> = Channel::well_known(0xd00e);
///
/// let door = Door { events: Emitter::new() };
/// let _sub = door.observe(&OPENED, |who: &String| println!("opened by {}", who))?;
/// door.emit(&OPENED, &"bob".to_string())?;
/// # Ok::<(), StoreError>(())
/// ```
pub trait Observable {
    /// The emitter powering this object.
    fn emitter(&self) -> &Emitter;

    /// Subscribes with a strong reference to `callback`.
    fn observe<T, F>(&self, channel: &Channel<T>, callback: F) -> Result<Subscription, StoreError>
    where
        T: 'static,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.emitter().subscribe(channel, callback)
    }

    /// Subscribes with a weak reference to a callback the caller keeps alive.
    fn observe_weak<T, F>(
        &self,
        channel: &Channel<T>,
        callback: &Arc<F>,
    ) -> Result<Subscription, StoreError>
    where
        T: 'static,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.emitter().subscribe_weak(channel, callback)
    }

    /// Subscribes a two-argument callback with a strong reference.
    fn observe_duplex<A, B, F>(
        &self,
        channel: &DuplexChannel<A, B>,
        callback: F,
    ) -> Result<Subscription, StoreError>
    where
        A: 'static,
        B: 'static,
        F: Fn(&A, &B) + Send + Sync + 'static,
    {
        self.emitter().subscribe_duplex(channel, callback)
    }

    /// Subscribes a two-argument callback with a weak reference.
    fn observe_duplex_weak<A, B, F>(
        &self,
        channel: &DuplexChannel<A, B>,
        callback: &Arc<F>,
    ) -> Result<Subscription, StoreError>
    where
        A: 'static,
        B: 'static,
        F: Fn(&A, &B) + Send + Sync + 'static,
    {
        self.emitter().subscribe_duplex_weak(channel, callback)
    }

    /// Emits on `channel`, calling every subscriber on this thread.
    fn emit<T: 'static>(&self, channel: &Channel<T>, value: &T) -> Result<(), StoreError> {
        self.emitter().emit(channel, value)
    }

    /// Emits a pair of values on `channel` as one payload.
    fn emit_duplex<A, B>(&self, channel: &DuplexChannel<A, B>, first: A, second: B) -> Result<(), StoreError>
    where
        A: 'static,
        B: 'static,
    {
        self.emitter().emit_duplex(channel, first, second)
    }
}

impl Observable for Emitter {
    fn emitter(&self) -> &Emitter {
        self
    }
}
