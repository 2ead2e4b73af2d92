use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::diff::diff_states;
use crate::reconcile::{FieldState, FieldStates, Resolution};
use crate::types::*;

pub(crate) type EventCallback = Box<dyn Fn(&Event) + Send + Sync>;
pub(crate) type SnapshotCallback = Box<dyn Fn(&DeviceState) + Send + Sync>;

/// Fan-out to the host platform's adapters.
#[derive(Default)]
pub(crate) struct Notifier {
    pub event_callbacks: Vec<EventCallback>,
    pub snapshot_callbacks: Vec<SnapshotCallback>,
}

impl Notifier {
    pub fn emit(&self, event: &Event) {
        for cb in &self.event_callbacks {
            cb(event);
        }
    }

    fn publish(&self, events: &[Event], snapshot: &DeviceState) {
        for event in events {
            self.emit(event);
        }
        for cb in &self.snapshot_callbacks {
            cb(snapshot);
        }
    }
}

#[derive(Default)]
struct Slot {
    authoritative: Option<DeviceState>,
    payload: Option<Arc<Value>>,
    fields: FieldStates,
    stale: bool,
}

impl Slot {
    fn visible(&self) -> Option<DeviceState> {
        self.authoritative
            .as_ref()
            .map(|base| self.fields.overlay(base))
    }
}

/// Single-slot store of the latest snapshot.
///
/// Writers are serialized by an internal lock; readers go through a
/// `watch` channel and never block on writers.
pub struct StateCache {
    slot: Mutex<Slot>,
    visible: watch::Sender<Option<DeviceState>>,
    notifier: Arc<Notifier>,
}

impl StateCache {
    pub(crate) fn new(notifier: Arc<Notifier>) -> Self {
        let (visible, _) = watch::channel(None);
        Self {
            slot: Mutex::new(Slot::default()),
            visible,
            notifier,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The snapshot collaborators should display: last fetched state plus
    /// any pending overlays.
    pub fn get(&self) -> Option<DeviceState> {
        self.visible.borrow().clone()
    }

    /// The last fetched state without overlays.
    pub fn authoritative(&self) -> Option<DeviceState> {
        self.lock().authoritative.clone()
    }

    /// The raw payload a write is built from, with the values still
    /// waiting for a poll to confirm them.
    pub(crate) fn write_base(&self) -> Option<(Arc<Value>, Vec<Change>)> {
        let slot = self.lock();
        let payload = slot.payload.clone()?;
        Some((payload, slot.fields.pending_changes()))
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<DeviceState>> {
        self.visible.subscribe()
    }

    pub fn field_state(&self, field: Field) -> FieldState {
        self.lock().fields.state(field)
    }

    /// Whether any written value is still waiting for a poll to settle it.
    pub fn has_pending(&self) -> bool {
        !self.lock().fields.is_synced()
    }

    pub fn is_stale(&self) -> bool {
        self.lock().stale
    }

    /// Time since the authoritative snapshot was fetched.
    pub fn age(&self) -> Option<chrono::Duration> {
        self.lock()
            .authoritative
            .as_ref()
            .map(|s| Utc::now() - s.last_updated)
    }

    /// Replaces the slot with a freshly fetched snapshot. Every pending
    /// overlay is settled in favour of the fetched values.
    pub fn set(&self, state: DeviceState, payload: Value) -> Vec<(Field, Resolution)> {
        let (resolved, events, visible, was_stale) = {
            let mut slot = self.lock();
            let previous = self.visible.borrow().clone();
            let resolved = slot.fields.resolve_with_poll(&state);
            slot.authoritative = Some(state);
            slot.payload = Some(Arc::new(payload));
            let was_stale = std::mem::replace(&mut slot.stale, false);
            let visible = slot.visible();
            if let Some(v) = &visible {
                self.visible.send_replace(Some(v.clone()));
            }
            let events = visible
                .as_ref()
                .map(|v| diff_states(previous.as_ref(), v))
                .unwrap_or_default();
            (resolved, events, visible, was_stale)
        };

        for (field, resolution) in &resolved {
            debug!(%field, ?resolution, "pending field settled by poll");
        }
        if was_stale {
            info!("cached state fresh again");
            self.notifier.emit(&Event::StaleChanged { stale: false });
        }
        if let Some(v) = &visible {
            self.notifier.publish(&events, v);
        }
        resolved
    }

    /// Lays written values over the snapshot until the next poll.
    pub(crate) fn overlay(&self, changes: &[Change]) {
        self.update_fields(|fields| {
            for change in changes {
                fields.mark_pending(*change);
            }
        });
    }

    /// Drops any overlay on `fields`, restoring the authoritative values.
    pub(crate) fn revert(&self, fields: &[Field]) -> Vec<Field> {
        let mut reverted = Vec::new();
        self.update_fields(|states| reverted = states.revert(fields));
        reverted
    }

    fn update_fields(&self, f: impl FnOnce(&mut FieldStates)) {
        let (events, visible) = {
            let mut slot = self.lock();
            if slot.authoritative.is_none() {
                return;
            }
            f(&mut slot.fields);
            let previous = self.visible.borrow().clone();
            let visible = slot.visible();
            if visible == previous {
                return;
            }
            self.visible.send_replace(visible.clone());
            let events = visible
                .as_ref()
                .map(|v| diff_states(previous.as_ref(), v))
                .unwrap_or_default();
            (events, visible)
        };
        if let Some(v) = &visible {
            self.notifier.publish(&events, v);
        }
    }

    /// Flags the snapshot as outdated after a failed fetch. Values stay.
    pub(crate) fn mark_stale(&self) {
        let newly = {
            let mut slot = self.lock();
            slot.authoritative.is_some() && !std::mem::replace(&mut slot.stale, true)
        };
        if newly {
            self.notifier.emit(&Event::StaleChanged { stale: true });
        }
    }

    pub(crate) fn notifier(&self) -> &Notifier {
        &self.notifier
    }
}
