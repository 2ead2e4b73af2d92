use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::error::TransportError;
use crate::types::*;

pub const DEFAULT_URL: &str = "https://www.ariston-net.remotethermo.com";

pub const LOGIN_PATH: &str = "/Account/Login";
pub const DASHBOARD_PREFIX: &str = "/PlantDashboard/Index/";

const DEFAULT_TIME: &str = "00:00";

pub fn plant_data_path(plant_id: &str) -> String {
    format!("/PlantDashboard/GetPlantData/{plant_id}")
}

pub fn set_data_path(plant_id: &str) -> String {
    format!("/PlantDashboard/SetPlantAndZoneData/{plant_id}?zoneNum=1&umsys=si")
}

pub fn login_body(username: &str, password: &str) -> Value {
    json!({ "Email": username, "Password": password })
}

/// A successful login lands on `<base>/PlantDashboard/Index/<plant_id>`.
pub fn plant_id_from_url(base_url: &str, final_url: &str) -> Option<String> {
    let rest = final_url
        .strip_prefix(base_url.trim_end_matches('/'))?
        .strip_prefix(DASHBOARD_PREFIX)?;
    let id = rest.split(['/', '?', '#']).next()?;
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

/// How a data endpoint reply should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyClass {
    Ok,
    /// The service dropped our session (it answers 500 when the cookie expired).
    SessionRejected,
    /// A definitive refusal of the request itself.
    Rejected,
    /// Anything else, including the gateway's 599.
    Transient,
}

pub fn classify_status(status: u16) -> ReplyClass {
    match status {
        200 => ReplyClass::Ok,
        401 | 403 | 500 => ReplyClass::SessionRejected,
        400..=499 => ReplyClass::Rejected,
        _ => ReplyClass::Transient,
    }
}

fn number(data: &Value, pointer: &str) -> Option<f64> {
    data.pointer(pointer).and_then(|v| v.as_f64())
}

fn limits(data: &Value, pointer: &str) -> Option<Limits> {
    let obj = data.pointer(pointer)?;
    Some(Limits {
        min: obj.get("min")?.as_f64()?,
        max: obj.get("max")?.as_f64()?,
    })
}

fn required(data: &Value, pointer: &str) -> Result<f64, TransportError> {
    number(data, pointer)
        .ok_or_else(|| TransportError::malformed(format!("missing numeric field {pointer}")))
}

/// Parse a `GetPlantData` payload into a snapshot stamped `fetched_at`.
pub fn parse_plant_data(
    data: &Value,
    fetched_at: DateTime<Utc>,
) -> Result<DeviceState, TransportError> {
    if !data.is_object() {
        return Err(TransportError::malformed("plant data is not an object"));
    }

    let mode_raw = data
        .get("mode")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| TransportError::malformed("missing mode"))?;
    let mode = Mode::from_wire(mode_raw)
        .ok_or_else(|| TransportError::malformed(format!("unknown mode value {mode_raw}")))?;

    let ch_raw = data
        .pointer("/zone/mode/value")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| TransportError::malformed("missing zone mode"))?;
    let ch_mode = ChMode::from_wire(ch_raw)
        .ok_or_else(|| TransportError::malformed(format!("unknown zone mode value {ch_raw}")))?;

    let flag = |key: &str| data.get(key).and_then(|v| v.as_bool());

    Ok(DeviceState {
        mode,
        ch_mode,
        ch_set_temperature: required(data, "/zone/comfortTemp/value")?,
        dhw_set_temperature: required(data, "/dhwTemp/value")?,
        detected_temperature: required(data, "/zone/roomTemp")?,
        ch_antifreeze_temperature: required(data, "/antiFreezeTemp")?,
        flame: flag("flameSensor").unwrap_or(false),
        holiday_mode: flag("holidayEnabled").unwrap_or(false),
        online: flag("online").unwrap_or(true),
        power: flag("on").unwrap_or(mode != Mode::Off),
        ch_set_temperature_limits: limits(data, "/zone/comfortTemp"),
        dhw_set_temperature_limits: limits(data, "/dhwTemp"),
        last_updated: fetched_at,
    })
}

/// Normalize `derogaUntil` to the 24h "HH:MM" form the write endpoint expects.
/// The read endpoint sometimes reports it as "h:mm AM/PM".
pub fn deroga_time_24h(raw: Option<&str>) -> String {
    let Some(raw) = raw else {
        return DEFAULT_TIME.to_string();
    };
    let mut parts = raw.split(' ');
    let time = parts.next().unwrap_or("");
    let indicator = parts.next();

    let Some((h, m)) = time.split_once(':') else {
        return DEFAULT_TIME.to_string();
    };
    let (Ok(hour), Ok(minute)) = (h.parse::<u32>(), m.parse::<u32>()) else {
        return DEFAULT_TIME.to_string();
    };
    if minute > 59 {
        return DEFAULT_TIME.to_string();
    }

    let hour = match indicator {
        Some("AM") if hour == 12 => 0,
        Some("AM") if hour < 12 => hour,
        Some("PM") if hour == 12 => 12,
        Some("PM") if hour < 12 => hour + 12,
        None if hour < 24 => hour,
        _ => return DEFAULT_TIME.to_string(),
    };
    format!("{hour:02}:{minute:02}")
}

fn apply_change(target: &mut Value, change: &Change) {
    let (pointer, value) = match *change {
        Change::Mode(m) => ("/mode", json!(m.as_wire())),
        Change::ChMode(m) => ("/zone/mode/value", json!(m.as_wire())),
        Change::ChSetTemperature(t) => ("/zone/comfortTemp/value", json!(t)),
        Change::DhwSetTemperature(t) => ("/dhwTemp/value", json!(round_dhw(t) as i64)),
    };
    if let Some(slot) = target.pointer_mut(pointer) {
        *slot = value;
    }
}

/// Build the `SetPlantAndZoneData` body from the last fetched payload.
///
/// `pending` holds values already written but not yet seen in a poll; they
/// go on both sides so `OldValue` matches what the service now holds and a
/// later write cannot undo an earlier one.
pub fn set_data_body(payload: &Value, pending: &[Change], changes: &[Change]) -> Value {
    let mut old = payload.clone();
    for change in pending {
        apply_change(&mut old, change);
    }
    let deroga = deroga_time_24h(
        payload
            .pointer("/zone/derogaUntil")
            .and_then(|v| v.as_str()),
    );
    if let Some(slot) = old.pointer_mut("/zone/derogaUntil") {
        *slot = Value::String(deroga);
    }

    let mut new = old.clone();
    for change in changes {
        apply_change(&mut new, change);
    }
    json!({ "NewValue": new, "OldValue": old })
}

/// CH setpoints move in 0.5 degree steps.
pub fn round_ch(t: f64) -> f64 {
    (t * 2.0).round() / 2.0
}

/// DHW setpoints move in whole degrees.
pub fn round_dhw(t: f64) -> f64 {
    t.round()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_payload() -> Value {
        json!({
            "mode": 0,
            "on": true,
            "flameSensor": false,
            "holidayEnabled": false,
            "antiFreezeTemp": 5,
            "dhwTemp": { "value": 50, "min": 40, "max": 65 },
            "zone": {
                "roomTemp": 20.5,
                "mode": { "value": 2 },
                "comfortTemp": { "value": 21.0, "min": 10, "max": 30 },
                "derogaUntil": "4:30 PM"
            }
        })
    }

    #[test]
    fn plant_id_from_dashboard_redirect() {
        let base = "https://example.test";
        assert_eq!(
            plant_id_from_url(base, "https://example.test/PlantDashboard/Index/ABC123"),
            Some("ABC123".to_string())
        );
        assert_eq!(
            plant_id_from_url(base, "https://example.test/PlantDashboard/Index/ABC123?x=1"),
            Some("ABC123".to_string())
        );
        assert_eq!(plant_id_from_url(base, "https://example.test/Account/Login"), None);
        assert_eq!(plant_id_from_url(base, "https://example.test/PlantDashboard/Index/"), None);
        assert_eq!(plant_id_from_url(base, "https://other.test/PlantDashboard/Index/X"), None);
    }

    #[test]
    fn status_classes() {
        assert_eq!(classify_status(200), ReplyClass::Ok);
        assert_eq!(classify_status(500), ReplyClass::SessionRejected);
        assert_eq!(classify_status(401), ReplyClass::SessionRejected);
        assert_eq!(classify_status(422), ReplyClass::Rejected);
        assert_eq!(classify_status(599), ReplyClass::Transient);
        assert_eq!(classify_status(502), ReplyClass::Transient);
    }

    #[test]
    fn parses_full_payload() {
        let now = Utc::now();
        let state = parse_plant_data(&sample_payload(), now).unwrap();
        assert_eq!(state.mode, Mode::Summer);
        assert_eq!(state.ch_mode, ChMode::Manual);
        assert_eq!(state.ch_set_temperature, 21.0);
        assert_eq!(state.dhw_set_temperature, 50.0);
        assert_eq!(state.detected_temperature, 20.5);
        assert_eq!(state.ch_antifreeze_temperature, 5.0);
        assert!(state.power);
        assert!(state.online);
        assert_eq!(state.dhw_set_temperature_limits, Some(Limits { min: 40.0, max: 65.0 }));
        assert_eq!(state.last_updated, now);
    }

    #[test]
    fn missing_field_is_malformed() {
        let mut payload = sample_payload();
        payload["zone"].as_object_mut().unwrap().remove("roomTemp");
        let err = parse_plant_data(&payload, Utc::now()).unwrap_err();
        assert_eq!(err.kind, crate::error::TransportErrorKind::MalformedResponse);

        let err = parse_plant_data(&json!([1, 2]), Utc::now()).unwrap_err();
        assert_eq!(err.kind, crate::error::TransportErrorKind::MalformedResponse);
    }

    #[test]
    fn power_falls_back_to_mode() {
        let mut payload = sample_payload();
        payload.as_object_mut().unwrap().remove("on");
        payload["mode"] = json!(5);
        let state = parse_plant_data(&payload, Utc::now()).unwrap();
        assert_eq!(state.mode, Mode::Off);
        assert!(!state.power);
    }

    #[test]
    fn deroga_conversion() {
        assert_eq!(deroga_time_24h(Some("12:00 AM")), "00:00");
        assert_eq!(deroga_time_24h(Some("9:15 AM")), "09:15");
        assert_eq!(deroga_time_24h(Some("12:00 PM")), "12:00");
        assert_eq!(deroga_time_24h(Some("4:30 PM")), "16:30");
        assert_eq!(deroga_time_24h(Some("18:45")), "18:45");
        assert_eq!(deroga_time_24h(Some(":")), "00:00");
        assert_eq!(deroga_time_24h(Some("garbage")), "00:00");
        assert_eq!(deroga_time_24h(None), "00:00");
    }

    #[test]
    fn set_body_changes_only_new_value() {
        let body = set_data_body(
            &sample_payload(),
            &[],
            &[Change::Mode(Mode::Winter), Change::ChSetTemperature(22.5)],
        );
        assert_eq!(body["OldValue"]["mode"], 0);
        assert_eq!(body["NewValue"]["mode"], 1);
        assert_eq!(body["NewValue"]["zone"]["comfortTemp"]["value"], 22.5);
        assert_eq!(body["OldValue"]["zone"]["comfortTemp"]["value"], 21.0);
        assert_eq!(body["NewValue"]["zone"]["derogaUntil"], "16:30");
        assert_eq!(body["OldValue"]["zone"]["derogaUntil"], "16:30");
        assert_eq!(body["NewValue"]["dhwTemp"]["value"], 50);
    }

    #[test]
    fn set_body_keeps_unpolled_writes() {
        let body = set_data_body(
            &sample_payload(),
            &[Change::Mode(Mode::Winter)],
            &[Change::DhwSetTemperature(55.0)],
        );
        assert_eq!(body["OldValue"]["mode"], 1);
        assert_eq!(body["NewValue"]["mode"], 1);
        assert_eq!(body["OldValue"]["dhwTemp"]["value"], 50);
        assert_eq!(body["NewValue"]["dhwTemp"]["value"], 55);
    }

    #[test]
    fn rounding_steps() {
        assert_eq!(round_ch(21.3), 21.5);
        assert_eq!(round_ch(21.2), 21.0);
        assert_eq!(round_dhw(49.6), 50.0);
    }
}
