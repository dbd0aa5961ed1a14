use evse_controller::config::Config;
use evse_controller::controller::FaultCause;
use std::fs;

#[test]
fn save_and_load_yaml_roundtrip() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let path = tmp_dir.path().join("config.yaml");

    let mut cfg = Config::default();
    cfg.current.max_amps = 20;
    cfg.pilot.state_b_max_v = 9.6;
    cfg.faults.latched = vec![FaultCause::EmergencyStop, FaultCause::PilotOverVoltage];
    cfg.logging.file = path.with_extension("log").to_string_lossy().to_string();

    cfg.save_to_file(&path).unwrap();
    let loaded = Config::from_file(&path).unwrap();

    assert_eq!(loaded.current.max_amps, 20);
    assert!((loaded.pilot.state_b_max_v - 9.6).abs() < 1e-9);
    assert!(loaded.faults.latched.contains(&FaultCause::PilotOverVoltage));
    assert_eq!(loaded.logging.file, cfg.logging.file);
}

#[test]
fn config_validation_errors() {
    let mut cfg = Config::default();

    // Invalid port
    cfg.web.port = 0;
    assert!(cfg.validate().is_err());

    // Non-finite threshold
    cfg = Config::default();
    cfg.pilot.state_a_max_v = f64::NAN;
    assert!(cfg.validate().is_err());

    // ADC scale must be positive
    cfg = Config::default();
    cfg.pilot.adc_to_voltage = 0.0;
    assert!(cfg.validate().is_err());

    // Minimum below 1 A
    cfg = Config::default();
    cfg.current.min_amps = 0;
    assert!(cfg.validate().is_err());

    // Step interval zero
    cfg = Config::default();
    cfg.step_interval_ms = 0;
    assert!(cfg.validate().is_err());

    // Meter cadence zero
    cfg = Config::default();
    cfg.meter.sample_interval_ms = 0;
    assert!(cfg.validate().is_err());
}

#[test]
fn from_file_with_invalid_yaml_fails() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    fs::write(tmp.path(), b"bad: [unclosed").unwrap();
    let err = Config::from_file(tmp.path()).unwrap_err();
    let msg = format!("{}", err);
    assert!(msg.contains("Serialization error"));
}
