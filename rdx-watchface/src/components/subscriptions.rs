//! System event subscriptions and the application's handler lists.
//!
//! Two tables live here. [`SubscriptionTable`] mirrors what the core has asked
//! the host registry for: at most one route per event kind, and clearing a
//! route unsubscribes. [`EventHandlers`] holds the application's own handlers,
//! any number per kind, each identified by a [`HandlerId`] token.

use crate::common::HandlerId;
use crate::error::{HostError, WatchError};
use crate::events::{AppEvent, SystemEventKind};
use crate::host::EventRegistry;
use slotmap::SlotMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};

/// A handler for system events. Pointer identity is what makes two
/// registrations duplicates of each other.
pub type EventCallback = Arc<dyn Fn(&AppEvent) + Send + Sync>;

/// Where a host-delivered event goes inside the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Fan out to the application's handlers of that kind.
    Handlers,
    /// Feed the lifecycle state machine (wall-clock jumps).
    Lifecycle,
}

/// The core's registrations with the host event registry.
#[derive(Debug, Default)]
pub struct SubscriptionTable {
    routes: HashMap<SystemEventKind, Route>,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets or clears the route for `kind`.
    ///
    /// The host registry is only contacted when the kind goes from
    /// unsubscribed to subscribed or back. On a registry failure the table is
    /// left untouched.
    pub fn set(
        &mut self,
        kind: SystemEventKind,
        route: Option<Route>,
        registry: &mut dyn EventRegistry,
    ) -> Result<(), HostError> {
        match route {
            Some(route) => {
                if !self.routes.contains_key(&kind) {
                    registry.subscribe(kind)?;
                    debug!("Subscribed to {} events", kind);
                }
                self.routes.insert(kind, route);
            }
            None => {
                if self.routes.contains_key(&kind) {
                    registry.unsubscribe(kind)?;
                    self.routes.remove(&kind);
                    debug!("Unsubscribed from {} events", kind);
                }
            }
        }
        Ok(())
    }

    pub fn route(&self, kind: SystemEventKind) -> Option<Route> {
        self.routes.get(&kind).copied()
    }

    pub fn is_subscribed(&self, kind: SystemEventKind) -> bool {
        self.routes.contains_key(&kind)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Unsubscribes every kind, logging failures.
    pub fn clear(&mut self, registry: &mut dyn EventRegistry) {
        let kinds: Vec<_> = self.routes.keys().copied().collect();
        for kind in kinds {
            if let Err(e) = self.set(kind, None, registry) {
                error!("Failed to unsubscribe from {} events: {}", kind, e);
                self.routes.remove(&kind);
            }
        }
    }
}

struct HandlerRecord {
    kind: SystemEventKind,
    callback: EventCallback,
}

/// The application's system event handlers.
pub struct EventHandlers {
    records: SlotMap<HandlerId, HandlerRecord>,
    capacity_per_kind: usize,
}

impl EventHandlers {
    pub fn new(capacity_per_kind: usize) -> Self {
        Self {
            records: SlotMap::with_key(),
            capacity_per_kind,
        }
    }

    /// Registers `callback` for `kind`.
    ///
    /// Internal kinds, a second registration of the same callback for the same
    /// kind, and a full table are all refused without touching the table.
    pub fn add(
        &mut self,
        kind: SystemEventKind,
        callback: EventCallback,
    ) -> Result<HandlerId, WatchError> {
        if !kind.is_user_facing() {
            return Err(WatchError::invalid_parameter(format!(
                "{kind} events cannot be handled by the application"
            )));
        }
        let same_kind = || self.records.values().filter(move |record| record.kind == kind);
        if same_kind().any(|record| same_callback(&record.callback, &callback)) {
            return Err(WatchError::invalid_parameter(format!(
                "this handler is already registered for {kind} events"
            )));
        }
        if same_kind().count() >= self.capacity_per_kind {
            return Err(WatchError::OutOfMemory {
                context: format!("adding a {kind} handler to a full table"),
            });
        }
        Ok(self.records.insert(HandlerRecord { kind, callback }))
    }

    /// Unregisters a handler, returning the kind it was registered for.
    pub fn remove(&mut self, id: HandlerId) -> Result<SystemEventKind, WatchError> {
        self.records
            .remove(id)
            .map(|record| record.kind)
            .ok_or_else(|| WatchError::invalid_parameter("unknown event handler token"))
    }

    pub fn count(&self, kind: SystemEventKind) -> usize {
        self.records
            .values()
            .filter(|record| record.kind == kind)
            .count()
    }

    /// Calls every handler registered for the event's kind. Returns how many
    /// were called.
    pub fn dispatch(&self, event: &AppEvent) -> usize {
        let callbacks: Vec<EventCallback> = self
            .records
            .values()
            .filter(|record| record.kind == event.kind)
            .map(|record| record.callback.clone())
            .collect();
        for callback in &callbacks {
            callback(event);
        }
        callbacks.len()
    }
}

fn same_callback(a: &EventCallback, b: &EventCallback) -> bool {
    std::ptr::eq(Arc::as_ptr(a).cast::<()>(), Arc::as_ptr(b).cast::<()>())
}
