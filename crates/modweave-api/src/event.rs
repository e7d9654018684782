//! Synchronous, type-dispatched event bus.
//!
//! Listeners subscribe to one concrete event type and are invoked in
//! subscription order whenever an event of exactly that type is posted.
//! Events are passed by mutable reference, so listeners may modify them
//! or mark them cancelled; cancellation is advisory and does not stop
//! delivery to the remaining listeners.
//!
//! A listener that returns an error or panics is logged and skipped. It
//! never prevents delivery to the others, and the poster never sees it.

use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, trace};

/// Something that can be posted on the [`EventBus`].
pub trait Event: Any + Send {
    fn is_cancelled(&self) -> bool;
    fn set_cancelled(&mut self, cancelled: bool);

    /// Name used in log output.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// Outcome of a single [`EventBus::post`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PostSummary {
    /// Listeners that returned normally.
    pub delivered: usize,
    /// Listeners that returned an error or panicked.
    pub failed: usize,
}

type ErasedListener = Arc<dyn Fn(&mut dyn Any) -> anyhow::Result<()> + Send + Sync>;

/// Routes events to the listeners registered for their type.
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<HashMap<TypeId, Vec<(ListenerId, ErasedListener)>>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for events of type `E`.
    pub fn subscribe<E, F>(&self, listener: F) -> ListenerId
    where
        E: Event,
        F: Fn(&mut E) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let erased: ErasedListener = Arc::new(move |event: &mut dyn Any| {
            match event.downcast_mut::<E>() {
                Some(event) => listener(event),
                None => Ok(()),
            }
        });

        self.listeners
            .write()
            .entry(TypeId::of::<E>())
            .or_default()
            .push((id, erased));

        trace!("Subscribed listener {:?} to {}", id, std::any::type_name::<E>());
        id
    }

    /// Remove a listener. Returns `false` if it was not subscribed to `E`.
    pub fn unsubscribe<E: Event>(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let Some(list) = listeners.get_mut(&TypeId::of::<E>()) else {
            return false;
        };

        let before = list.len();
        list.retain(|(listener_id, _)| *listener_id != id);
        before != list.len()
    }

    /// Deliver an event to every listener subscribed to its type.
    ///
    /// Listeners run on the calling thread over a snapshot of the listener
    /// list, so they may subscribe or unsubscribe while being invoked.
    pub fn post<E: Event>(&self, event: &mut E) -> PostSummary {
        let snapshot: Vec<(ListenerId, ErasedListener)> = self
            .listeners
            .read()
            .get(&TypeId::of::<E>())
            .cloned()
            .unwrap_or_default();

        let mut summary = PostSummary::default();
        for (id, listener) in snapshot {
            let outcome = catch_unwind(AssertUnwindSafe(|| listener(&mut *event as &mut dyn Any)));
            match outcome {
                Ok(Ok(())) => summary.delivered += 1,
                Ok(Err(e)) => {
                    error!("Listener {:?} failed handling {}: {:#}", id, event.name(), e);
                    summary.failed += 1;
                }
                Err(panic) => {
                    error!(
                        "Listener {:?} panicked handling {}: {}",
                        id,
                        event.name(),
                        panic_message(panic.as_ref())
                    );
                    summary.failed += 1;
                }
            }
        }

        summary
    }

    /// Number of listeners currently subscribed to `E`.
    pub fn listener_count<E: Event>(&self) -> usize {
        self.listeners
            .read()
            .get(&TypeId::of::<E>())
            .map_or(0, Vec::len)
    }

    /// Drop every subscription.
    pub fn clear(&self) {
        self.listeners.write().clear();
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listeners.read();
        f.debug_struct("EventBus")
            .field("event_types", &listeners.len())
            .field("listeners", &listeners.values().map(Vec::len).sum::<usize>())
            .finish()
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Posted after each mod finishes initializing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModLoaded {
    pub mod_id: String,
    pub version: String,
    cancelled: bool,
}

impl ModLoaded {
    pub fn new(mod_id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            mod_id: mod_id.into(),
            version: version.into(),
            cancelled: false,
        }
    }
}

impl Event for ModLoaded {
    fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    fn set_cancelled(&mut self, cancelled: bool) {
        self.cancelled = cancelled;
    }
}

/// Posted once when initialization reaches the ready state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadingComplete {
    pub loaded: usize,
    pub failed: usize,
    cancelled: bool,
}

impl LoadingComplete {
    pub fn new(loaded: usize, failed: usize) -> Self {
        Self {
            loaded,
            failed,
            cancelled: false,
        }
    }
}

impl Event for LoadingComplete {
    fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    fn set_cancelled(&mut self, cancelled: bool) {
        self.cancelled = cancelled;
    }
}
