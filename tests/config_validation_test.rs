//! Settings loading through figment and scan parameter validation.

use std::io::Write;

use sweep_daq::config::Settings;
use sweep_daq::scan::{ScanConfig, WavelengthStepper};
use sweep_daq::DaqError;

#[test]
fn shipped_default_config_loads_and_validates() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/default.toml");
    let settings = Settings::load_from(path).unwrap();
    settings.validate().unwrap();
    assert_eq!(settings.storage.memory_threshold_mb, 100.0);
    assert_eq!(settings.scan.min_dwell_ms, 200);
    assert_eq!(settings.alarm.low_power_dbm, -50.0);
}

#[test]
fn malformed_file_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "[storage]\nmemory_threshold_mb = \"lots\"").unwrap();

    assert!(matches!(Settings::load_from(&path), Err(DaqError::Config(_))));
}

#[test]
fn alarm_thresholds_flow_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("alarm.toml");
    std::fs::write(&path, "[alarm]\nlow_power_dbm = -40.0\nhigh_power_dbm = 5.0\n").unwrap();

    let settings = Settings::load_from(&path).unwrap();
    let monitor = sweep_daq::scan::AlarmMonitor::from_settings(&settings.alarm);
    assert_eq!(
        monitor.classify(-45.0),
        sweep_daq::scan::AlarmLevel::LowPower
    );
    assert_eq!(monitor.classify(6.0), sweep_daq::scan::AlarmLevel::HighPower);
}

#[test]
fn scan_config_round_trips_through_json() {
    let config = ScanConfig {
        sweep_points: Some(5001),
        ..Default::default()
    };
    let json = serde_json::to_string(&config).unwrap();
    let back: ScanConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back, config);
    back.validate().unwrap();
}

#[test]
fn stepper_length_property_holds_over_a_grid() {
    for start in [1500.0, 1525.3, 1549.99] {
        for span in [0.1, 1.0, 3.7, 49.0] {
            for step in [0.01, 0.05, 0.3, 1.0] {
                let stop = start + span;
                let stepper = WavelengthStepper::new(start, stop, step).unwrap();
                let seq = stepper.sequence();
                let exact = ((stop - start) / step).floor() as usize + 1;
                // the quotient slack may add the point that round-off removed
                assert!(
                    seq.len() == exact || seq.len() == exact + 1,
                    "({start}, {stop}, {step}) gave {}",
                    seq.len()
                );
                assert!(*seq.last().unwrap() <= stop);
                assert_eq!(seq[0], start);
            }
        }
    }
}
