//! Lifecycle notifications.
//!
//! After a mutation commits, the book publishes a [`LifecycleEvent`] to every
//! callback registered with [`EventBus::subscribe`]. Callbacks run
//! synchronously on the committing thread, after all locks are released.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;

use crate::dsref::DsRef;
use crate::model::types::OplogId;

/// What happened to a dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A dataset was created.
    Init,
    /// A dataset was renamed.
    Rename,
    /// A version was saved.
    VersionSave,
    /// Versions were deleted.
    VersionDelete,
    /// A foreign log was imported.
    Import,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Init => "init",
            Self::Rename => "rename",
            Self::VersionSave => "version_save",
            Self::VersionDelete => "version_delete",
            Self::Import => "import",
        };
        f.write_str(s)
    }
}

/// A committed change to one dataset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LifecycleEvent {
    /// What happened.
    pub kind: EventKind,
    /// The dataset's stable id.
    pub id: OplogId,
    /// The dataset as it is after the change.
    pub dsref: DsRef,
    /// Previous name, for renames.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_name: Option<String>,
}

/// Subscriber callback.
pub type EventCallback = Box<dyn Fn(&LifecycleEvent) + Send + Sync + 'static>;

type Subscriber = Arc<dyn Fn(&LifecycleEvent) + Send + Sync + 'static>;

/// Fan-out of lifecycle events to registered callbacks.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<RwLock<Vec<Subscriber>>>,
}

impl EventBus {
    /// A bus with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for every future event.
    pub fn subscribe(&self, callback: EventCallback) {
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::from(callback));
    }

    /// Number of registered callbacks.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Deliver `event` to every subscriber, in registration order.
    ///
    /// The subscriber list is snapshotted first, so a callback may subscribe
    /// or publish without deadlocking. Callbacks added during delivery see
    /// only later events.
    pub fn publish(&self, event: &LifecycleEvent) {
        tracing::trace!(kind = %event.kind, dataset = %event.dsref, "publishing event");
        let subs: Vec<Subscriber> = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for callback in &subs {
            callback(event);
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
