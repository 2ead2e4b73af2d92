use std::io::Write;
use std::time::Duration;

use ariston_net::{
    AristonClient, BinarySensorKind, Config, Error, MessageLogMode, Mode, SensorKind, SwitchKind,
};

#[test]
fn minimal_config_uses_defaults() {
    let config = Config::from_toml_str(
        r#"
        username = "user@example.com"
        password = "secret"
        "#,
    )
    .unwrap();

    assert_eq!(config.name, "Ariston");
    assert_eq!(config.url, "https://www.ariston-net.remotethermo.com");
    assert_eq!(config.hvac_off, Mode::Summer);
    assert_eq!(config.power_on, Mode::Summer);
    assert_eq!(config.max_retries, 1);
    assert_eq!(config.poll_interval(), Duration::from_secs(45));
    assert_eq!(config.poll_interval_down(), Duration::from_secs(80));
    assert_eq!(config.retry_delay(), Duration::from_secs(10));
    assert_eq!(config.write_settle(), Duration::from_secs(25));
    assert_eq!(config.login_timeout(), Duration::from_secs(3));
    assert!(config.sensors.is_empty());
    assert!(config.message_log.is_none());
    assert_eq!(config, Config::new("user@example.com", "secret"));
}

#[test]
fn full_config_parses() {
    let config = Config::from_toml_str(
        r#"
        username = "user@example.com"
        password = "secret"
        name = "Boiler"
        hvac_off = "Off"
        power_on = "winter"
        max_retries = 3
        sensors = ["ch_set_temperature", "mode", "ch_detected_temperature"]
        binary_sensors = ["flame", "online"]
        switches = ["power"]
        poll_interval_secs = 60

        [message_log]
        path = "/tmp/ariston.ndjson"
        "#,
    )
    .unwrap();

    assert_eq!(config.name, "Boiler");
    assert_eq!(config.hvac_off, Mode::Off);
    assert_eq!(config.power_on, Mode::Winter);
    assert_eq!(config.max_retries, 3);
    assert_eq!(
        config.sensors,
        vec![
            SensorKind::ChSetTemperature,
            SensorKind::Mode,
            SensorKind::ChDetectedTemperature
        ]
    );
    assert_eq!(
        config.binary_sensors,
        vec![BinarySensorKind::Flame, BinarySensorKind::Online]
    );
    assert_eq!(config.switches, vec![SwitchKind::Power]);
    assert_eq!(config.poll_interval(), Duration::from_secs(60));
    let log = config.message_log.unwrap();
    assert_eq!(log.mode, MessageLogMode::Diffed);
}

#[test]
fn hvac_off_cannot_be_winter() {
    let err = Config::from_toml_str(
        r#"
        username = "u"
        password = "p"
        hvac_off = "winter"
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, Error::Config(ref msg) if msg.contains("hvac_off")));
}

#[test]
fn power_on_cannot_be_off() {
    let err = Config::from_toml_str(
        r#"
        username = "u"
        password = "p"
        power_on = "off"
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, Error::Config(ref msg) if msg.contains("power_on")));
}

#[test]
fn unknown_sensor_rejected() {
    let err = Config::from_toml_str(
        r#"
        username = "u"
        password = "p"
        sensors = ["outdoor_temperature"]
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn empty_credentials_rejected() {
    let err = Config::from_toml_str(
        r#"
        username = ""
        password = "p"
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, Error::Config(ref msg) if msg.contains("username")));

    let mut config = Config::new("u", "p");
    config.poll_interval_secs = 0;
    assert!(config.validate().is_err());
}

#[test]
fn load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "username = \"u\"\npassword = \"p\"\nmax_retries = 0").unwrap();
    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.max_retries, 0);

    let missing = Config::load("/nonexistent/ariston.toml").unwrap_err();
    assert!(matches!(missing, Error::Io(_)));
}

#[tokio::test]
async fn client_from_config_exposes_entities() {
    let mut config = Config::new("u", "p");
    config.name = "Cellar".into();
    config.sensors = vec![SensorKind::DhwSetTemperature];
    config.switches = vec![SwitchKind::Power];

    let client = AristonClient::from_config(&config).unwrap();
    assert_eq!(client.name(), "Cellar");
    assert_eq!(client.sensors(), &[SensorKind::DhwSetTemperature]);
    assert!(client.binary_sensors().is_empty());
    assert_eq!(client.switches(), &[SwitchKind::Power]);
    assert!(client.read_state().is_none());
}
