//! Per-field arbitration between optimistic overlays and polled state.
//!
//! A field is `Synced` while the cache mirrors the last fetched snapshot.
//! A successful write moves it to `Pending` and overlays the written value.
//! The next successful poll always returns it to `Synced`, whether or not
//! the service reports the written value. A write that finally fails
//! returns it to `Synced` directly, dropping the overlay.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::types::{Change, DeviceState, Field};

#[derive(Debug, Clone, PartialEq)]
pub enum FieldState {
    Synced,
    Pending { value: Change, since: DateTime<Utc> },
}

/// How a poll settled a pending field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The polled value equals the overlay.
    Confirmed,
    /// The polled value differs and replaces the overlay.
    Superseded,
}

#[derive(Debug, Default)]
pub(crate) struct FieldStates {
    pending: BTreeMap<Field, (Change, DateTime<Utc>)>,
}

impl FieldStates {
    pub fn state(&self, field: Field) -> FieldState {
        match self.pending.get(&field) {
            Some((value, since)) => FieldState::Pending {
                value: *value,
                since: *since,
            },
            None => FieldState::Synced,
        }
    }

    pub fn is_synced(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn mark_pending(&mut self, change: Change) {
        self.pending.insert(change.field(), (change, Utc::now()));
    }

    /// Every pending field returns to `Synced`; reports how each was settled.
    pub fn resolve_with_poll(&mut self, polled: &DeviceState) -> Vec<(Field, Resolution)> {
        std::mem::take(&mut self.pending)
            .into_iter()
            .map(|(field, (value, _))| {
                let resolution = if polled.matches(&value) {
                    Resolution::Confirmed
                } else {
                    Resolution::Superseded
                };
                (field, resolution)
            })
            .collect()
    }

    /// Values written but not yet settled by a poll.
    pub fn pending_changes(&self) -> Vec<Change> {
        self.pending.values().map(|(change, _)| *change).collect()
    }

    /// Drops the overlays of `fields`. Returns the ones that were pending.
    pub fn revert(&mut self, fields: &[Field]) -> Vec<Field> {
        fields
            .iter()
            .filter(|f| self.pending.remove(f).is_some())
            .copied()
            .collect()
    }

    /// The authoritative snapshot with every pending value laid over it.
    pub fn overlay(&self, base: &DeviceState) -> DeviceState {
        self.pending
            .values()
            .fold(base.clone(), |state, (change, _)| state.with_change(change))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChMode, Mode};

    fn state(mode: Mode) -> DeviceState {
        DeviceState {
            mode,
            ch_mode: ChMode::Manual,
            ch_set_temperature: 21.0,
            dhw_set_temperature: 50.0,
            detected_temperature: 20.0,
            ch_antifreeze_temperature: 5.0,
            flame: false,
            holiday_mode: false,
            online: true,
            power: true,
            ch_set_temperature_limits: None,
            dhw_set_temperature_limits: None,
            last_updated: Utc::now(),
        }
    }

    #[test]
    fn pending_overlays_base() {
        let mut fields = FieldStates::default();
        fields.mark_pending(Change::Mode(Mode::Winter));
        fields.mark_pending(Change::ChSetTemperature(23.5));

        let view = fields.overlay(&state(Mode::Summer));
        assert_eq!(view.mode, Mode::Winter);
        assert_eq!(view.ch_set_temperature, 23.5);
        assert!(matches!(fields.state(Field::Mode), FieldState::Pending { .. }));
        assert_eq!(fields.state(Field::ChMode), FieldState::Synced);
    }

    #[test]
    fn later_write_to_same_field_replaces_overlay() {
        let mut fields = FieldStates::default();
        fields.mark_pending(Change::Mode(Mode::Winter));
        fields.mark_pending(Change::Mode(Mode::Off));
        assert_eq!(fields.overlay(&state(Mode::Summer)).mode, Mode::Off);
        assert_eq!(fields.pending_changes(), vec![Change::Mode(Mode::Off)]);
    }

    #[test]
    fn poll_confirms_or_supersedes() {
        let mut fields = FieldStates::default();
        fields.mark_pending(Change::Mode(Mode::Winter));
        fields.mark_pending(Change::ChSetTemperature(23.5));

        let resolved = fields.resolve_with_poll(&state(Mode::Winter));
        assert_eq!(
            resolved,
            vec![
                (Field::Mode, Resolution::Confirmed),
                (Field::ChSetTemperature, Resolution::Superseded),
            ]
        );
        assert!(fields.is_synced());
    }

    #[test]
    fn revert_only_reports_pending_fields() {
        let mut fields = FieldStates::default();
        fields.mark_pending(Change::Mode(Mode::Winter));
        let reverted = fields.revert(&[Field::Mode, Field::DhwSetTemperature]);
        assert_eq!(reverted, vec![Field::Mode]);
        assert!(fields.is_synced());
        assert_eq!(fields.overlay(&state(Mode::Summer)).mode, Mode::Summer);
    }
}
