use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::{Builder, NamedTempFile};

use pose_trigger::config::{EstimatorSettings, PoseTriggerConfig};
use pose_trigger::{Action, Stance};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "POSE_TRIGGER_CONFIG",
        "POSE_TRIGGER_SOURCE",
        "POSE_TRIGGER_CAPTURE_FPS",
        "POSE_TRIGGER_RENDER_FPS",
        "POSE_TRIGGER_DEBOUNCE_MS",
        "POSE_TRIGGER_COOLDOWN_SECS",
        "POSE_TRIGGER_DISABLED_ACTIONS",
        "POSE_TRIGGER_MIRRORED",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_json_config_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "source": { "url": "stub://hall", "width": 320, "height": 240 },
        "estimator": {
            "kind": "scripted",
            "script": [
                { "stance": "neutral", "hold_ms": 1000 },
                { "stance": "left_hand_up", "hold_ms": 1500 }
            ],
            "jitter": 0.002,
            "seed": 11
        },
        "pipeline": { "capture_fps": 20, "render_fps": 30, "geometry_refresh_cycles": 20 },
        "calibration": { "required_frames": 10, "loss_timeout_ms": 5000 },
        "thresholds": { "hand_raise": 0.2 },
        "debounce": { "window_ms": 800, "dropout_tolerance_ms": 100 },
        "cooldown": { "seconds": 8, "overrides_ms": { "unstable_pose": 4000 } },
        "actions": { "disabled": ["head_turned_left"], "announce": false },
        "voice": { "enabled": false, "messages": { "calibration_success": "Ready" } }
    }"#;
    file.write_all(json.as_bytes()).expect("write config");

    std::env::set_var("POSE_TRIGGER_CONFIG", file.path());
    std::env::set_var("POSE_TRIGGER_SOURCE", "stub://override");
    std::env::set_var("POSE_TRIGGER_COOLDOWN_SECS", "12");
    std::env::set_var("POSE_TRIGGER_MIRRORED", "false");

    let cfg = PoseTriggerConfig::load().expect("load config");

    assert_eq!(cfg.source.url, "stub://override");
    assert_eq!((cfg.source.width, cfg.source.height), (320, 240));
    match &cfg.estimator {
        EstimatorSettings::Scripted { script, jitter, seed } => {
            let script = script.as_ref().expect("script");
            assert_eq!(script.len(), 2);
            assert_eq!(script[1].stance, Stance::LeftHandUp);
            assert_eq!(script[1].hold, Duration::from_millis(1500));
            assert_eq!(*jitter, Some(0.002));
            assert_eq!(*seed, 11);
        }
        other => panic!("unexpected estimator {:?}", other),
    }
    assert_eq!(cfg.capture_fps, 20.0);
    assert_eq!(cfg.render_fps, 30.0);
    assert_eq!(cfg.geometry_refresh_cycles, 20);
    assert_eq!(cfg.calibration.required_frames, 10);
    assert_eq!(cfg.calibration.loss_timeout, Duration::from_secs(5));
    assert_eq!(cfg.thresholds.hand_raise, 0.2);
    assert_eq!(cfg.debounce.window, Duration::from_millis(800));
    assert_eq!(cfg.debounce.dropout_tolerance, Duration::from_millis(100));
    assert_eq!(cfg.cooldown, Duration::from_secs(12));
    assert_eq!(
        cfg.cooldown_overrides,
        vec![("unstable_pose".to_string(), Duration::from_secs(4))]
    );
    assert!(!cfg.mirrored);
    assert_eq!(cfg.disabled_actions, vec![Action::HeadTurnedLeft]);
    assert!(!cfg.announce_actions);
    assert!(!cfg.voice_enabled);

    let settings = cfg.session_settings();
    assert!(!settings.classifier.enabled[Action::HeadTurnedLeft]);
    assert!(settings.classifier.enabled[Action::HeadTurnedRight]);
    assert!(!settings.classifier.mirrored);
    assert_eq!(
        settings.messages.text("calibration_success"),
        Some("Ready")
    );
    assert_eq!(cfg.pipeline_settings().capture_interval, Duration::from_millis(50));
    assert!(cfg.build_estimator().is_ok());

    clear_env();
}

#[test]
fn loads_toml_config() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    let toml = r#"
[source]
url = "stub://toml"

[debounce]
window_ms = 1200

[actions]
disabled = ["right_foot_raised", "left_foot_raised"]
"#;
    file.write_all(toml.as_bytes()).expect("write config");
    std::env::set_var("POSE_TRIGGER_CONFIG", file.path());

    let cfg = PoseTriggerConfig::load().expect("load config");
    assert_eq!(cfg.source.url, "stub://toml");
    assert_eq!(cfg.debounce.window, Duration::from_millis(1200));
    assert_eq!(
        cfg.disabled_actions,
        vec![Action::LeftFootRaised, Action::RightFootRaised]
    );

    clear_env();
}

#[test]
fn defaults_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = PoseTriggerConfig::load().expect("load config");
    assert_eq!(cfg.source.url, "stub://camera");
    assert_eq!(cfg.capture_fps, 25.0);
    assert_eq!(cfg.cooldown, Duration::from_secs(10));
    assert!(cfg.mirrored);
    assert!(cfg.disabled_actions.is_empty());
    assert!(matches!(
        cfg.estimator,
        EstimatorSettings::Scripted { script: None, .. }
    ));

    clear_env();
}

#[test]
fn rejects_bad_env_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("POSE_TRIGGER_DEBOUNCE_MS", "soon");
    assert!(PoseTriggerConfig::load().is_err());
    clear_env();

    std::env::set_var("POSE_TRIGGER_DISABLED_ACTIONS", "left_hand_raised,jump");
    assert!(PoseTriggerConfig::load().is_err());
    clear_env();

    std::env::set_var("POSE_TRIGGER_CAPTURE_FPS", "0");
    assert!(PoseTriggerConfig::load().is_err());
    clear_env();

    std::env::set_var("POSE_TRIGGER_DISABLED_ACTIONS", "Left_Hand_Raised, both_hands_raised");
    let cfg = PoseTriggerConfig::load().expect("load config");
    assert_eq!(
        cfg.disabled_actions,
        vec![Action::LeftHandRaised, Action::BothHandsRaised]
    );

    clear_env();
}
