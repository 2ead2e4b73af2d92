use serde_json::Value;

use crate::types::*;

pub(crate) fn diff_json(
    previous: &Value,
    current: &Value,
    path_prefix: &str,
    changes: &mut Vec<(String, Value, Value)>,
) {
    match (previous, current) {
        (Value::Object(prev_map), Value::Object(curr_map)) => {
            for (key, curr_val) in curr_map {
                let path = if path_prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{path_prefix}.{key}")
                };
                match prev_map.get(key) {
                    Some(prev_val) => diff_json(prev_val, curr_val, &path, changes),
                    None => {
                        if curr_val.is_object() {
                            diff_json(&Value::Object(serde_json::Map::new()), curr_val, &path, changes);
                        } else {
                            changes.push((path, Value::Null, curr_val.clone()));
                        }
                    }
                }
            }
        }
        (prev, curr) if prev != curr => {
            changes.push((path_prefix.to_string(), prev.clone(), curr.clone()));
        }
        _ => {}
    }
}

/// Field-level events between two visible snapshots. With no previous
/// snapshot every field is reported.
pub(crate) fn diff_states(previous: Option<&DeviceState>, current: &DeviceState) -> Vec<Event> {
    let mut events = Vec::new();

    macro_rules! changed {
        ($field:ident) => {
            previous.is_none_or(|p| p.$field != current.$field)
        };
    }

    if changed!(mode) {
        events.push(Event::ModeChanged { mode: current.mode });
    }
    if changed!(ch_mode) {
        events.push(Event::ChModeChanged { ch_mode: current.ch_mode });
    }
    if changed!(ch_set_temperature) {
        events.push(Event::ChSetTemperatureChanged {
            temperature: current.ch_set_temperature,
        });
    }
    if changed!(dhw_set_temperature) {
        events.push(Event::DhwSetTemperatureChanged {
            temperature: current.dhw_set_temperature,
        });
    }
    if changed!(detected_temperature) {
        events.push(Event::DetectedTemperatureChanged {
            temperature: current.detected_temperature,
        });
    }
    if changed!(ch_antifreeze_temperature) {
        events.push(Event::ChAntifreezeTemperatureChanged {
            temperature: current.ch_antifreeze_temperature,
        });
    }
    if changed!(flame) {
        events.push(Event::FlameChanged { flame: current.flame });
    }
    if changed!(holiday_mode) {
        events.push(Event::HolidayModeChanged {
            enabled: current.holiday_mode,
        });
    }
    if changed!(online) {
        events.push(Event::OnlineChanged { online: current.online });
    }
    if changed!(power) {
        events.push(Event::PowerChanged { power: current.power });
    }

    events
}
