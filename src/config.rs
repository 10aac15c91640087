use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::calibration::CalibrationSettings;
use crate::classify::{Action, ActionSet, ClassifierSettings, Thresholds};
use crate::debounce::DebouncePolicy;
use crate::detect::{JsonLinesEstimator, PoseEstimator, ScriptStep, ScriptedEstimator};
use crate::ingest::SourceConfig;
use crate::pipeline::PipelineSettings;
use crate::prompt::Messages;
use crate::session::SessionSettings;

const DEFAULT_SOURCE_URL: &str = "stub://camera";
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_CAPTURE_FPS: f32 = 25.0;
const DEFAULT_RENDER_FPS: f32 = 25.0;
const DEFAULT_GEOMETRY_REFRESH_CYCLES: u32 = 15;
const DEFAULT_MIN_RENDER_SIDE: u32 = 32;
const DEFAULT_DEBOUNCE_MS: u64 = 1000;
const DEFAULT_COOLDOWN_SECS: u64 = 10;
const DEFAULT_ACTION_PROMPT_MS: u64 = 2000;
const DEFAULT_SCRIPT_SEED: u64 = 7;
const MAX_FPS: f32 = 120.0;

#[derive(Debug, Deserialize, Default)]
struct PoseTriggerConfigFile {
    source: Option<SourceConfigFile>,
    estimator: Option<EstimatorConfigFile>,
    pipeline: Option<PipelineConfigFile>,
    calibration: Option<CalibrationConfigFile>,
    thresholds: Option<ThresholdsConfigFile>,
    debounce: Option<DebounceConfigFile>,
    cooldown: Option<CooldownConfigFile>,
    actions: Option<ActionsConfigFile>,
    voice: Option<VoiceConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    url: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    frame_limit: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct EstimatorConfigFile {
    kind: Option<String>,
    script: Option<Vec<ScriptStep>>,
    jitter: Option<f32>,
    seed: Option<u64>,
    path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct PipelineConfigFile {
    capture_fps: Option<f32>,
    render_fps: Option<f32>,
    geometry_refresh_cycles: Option<u32>,
    min_render_side: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct CalibrationConfigFile {
    required_frames: Option<u32>,
    visibility_threshold: Option<f32>,
    edge_margin: Option<f32>,
    min_shoulder_width: Option<f32>,
    max_shoulder_width: Option<f32>,
    stability_tolerance: Option<f32>,
    loss_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct ThresholdsConfigFile {
    hand_raise: Option<f32>,
    both_hands_symmetry: Option<f32>,
    foot_raise_ratio: Option<f32>,
    head_turn_ratio: Option<f32>,
    min_visibility: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct DebounceConfigFile {
    window_ms: Option<u64>,
    dropout_tolerance_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct CooldownConfigFile {
    seconds: Option<u64>,
    action_prompt_ms: Option<u64>,
    /// Prompt-key prefix -> window in milliseconds.
    overrides_ms: Option<HashMap<String, u64>>,
}

#[derive(Debug, Deserialize, Default)]
struct ActionsConfigFile {
    mirrored: Option<bool>,
    disabled: Option<Vec<String>>,
    announce: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct VoiceConfigFile {
    enabled: Option<bool>,
    messages: Option<HashMap<String, String>>,
}

/// Which pose estimator feeds the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum EstimatorSettings {
    /// Stance script playback; `None` plays the built-in demo script.
    Scripted {
        script: Option<Vec<ScriptStep>>,
        jitter: Option<f32>,
        seed: u64,
    },
    /// JSON-lines snapshots from a file, or stdin when `path` is `None`.
    JsonLines { path: Option<PathBuf> },
}

#[derive(Debug, Clone)]
pub struct PoseTriggerConfig {
    pub source: SourceConfig,
    pub estimator: EstimatorSettings,
    pub capture_fps: f32,
    pub render_fps: f32,
    pub geometry_refresh_cycles: u32,
    pub min_render_side: u32,
    pub calibration: CalibrationSettings,
    pub thresholds: Thresholds,
    pub debounce: DebouncePolicy,
    pub cooldown: Duration,
    pub action_prompt_cooldown: Duration,
    pub cooldown_overrides: Vec<(String, Duration)>,
    pub mirrored: bool,
    pub disabled_actions: Vec<Action>,
    pub announce_actions: bool,
    pub voice_enabled: bool,
    pub messages: HashMap<String, String>,
}

impl PoseTriggerConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("POSE_TRIGGER_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: PoseTriggerConfigFile) -> Result<Self> {
        let source_file = file.source.unwrap_or_default();
        let source = SourceConfig {
            url: source_file
                .url
                .unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string()),
            width: source_file.width.unwrap_or(DEFAULT_WIDTH),
            height: source_file.height.unwrap_or(DEFAULT_HEIGHT),
            frame_limit: source_file.frame_limit,
        };

        let estimator_file = file.estimator.unwrap_or_default();
        let estimator = match estimator_file.kind.as_deref().unwrap_or("scripted") {
            "scripted" => EstimatorSettings::Scripted {
                script: estimator_file.script,
                jitter: estimator_file.jitter,
                seed: estimator_file.seed.unwrap_or(DEFAULT_SCRIPT_SEED),
            },
            "jsonl" => EstimatorSettings::JsonLines {
                path: estimator_file.path,
            },
            other => bail!("unknown estimator kind '{}' (expected scripted or jsonl)", other),
        };

        let pipeline = file.pipeline.unwrap_or_default();

        let calibration_file = file.calibration.unwrap_or_default();
        let defaults = CalibrationSettings::default();
        let calibration = CalibrationSettings {
            required_frames: calibration_file
                .required_frames
                .unwrap_or(defaults.required_frames),
            visibility_threshold: calibration_file
                .visibility_threshold
                .unwrap_or(defaults.visibility_threshold),
            edge_margin: calibration_file.edge_margin.unwrap_or(defaults.edge_margin),
            min_shoulder_width: calibration_file
                .min_shoulder_width
                .unwrap_or(defaults.min_shoulder_width),
            max_shoulder_width: calibration_file
                .max_shoulder_width
                .unwrap_or(defaults.max_shoulder_width),
            stability_tolerance: calibration_file
                .stability_tolerance
                .unwrap_or(defaults.stability_tolerance),
            loss_timeout: calibration_file
                .loss_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.loss_timeout),
        };

        let thresholds_file = file.thresholds.unwrap_or_default();
        let defaults = Thresholds::default();
        let thresholds = Thresholds {
            hand_raise: thresholds_file.hand_raise.unwrap_or(defaults.hand_raise),
            both_hands_symmetry: thresholds_file
                .both_hands_symmetry
                .unwrap_or(defaults.both_hands_symmetry),
            foot_raise_ratio: thresholds_file
                .foot_raise_ratio
                .unwrap_or(defaults.foot_raise_ratio),
            head_turn_ratio: thresholds_file
                .head_turn_ratio
                .unwrap_or(defaults.head_turn_ratio),
            min_visibility: thresholds_file
                .min_visibility
                .unwrap_or(defaults.min_visibility),
        };

        let debounce_file = file.debounce.unwrap_or_default();
        let debounce = DebouncePolicy {
            window: Duration::from_millis(debounce_file.window_ms.unwrap_or(DEFAULT_DEBOUNCE_MS)),
            dropout_tolerance: Duration::from_millis(
                debounce_file.dropout_tolerance_ms.unwrap_or(0),
            ),
        };

        let cooldown_file = file.cooldown.unwrap_or_default();
        let mut cooldown_overrides: Vec<(String, Duration)> = cooldown_file
            .overrides_ms
            .unwrap_or_default()
            .into_iter()
            .map(|(prefix, ms)| (prefix, Duration::from_millis(ms)))
            .collect();
        cooldown_overrides.sort();

        let actions = file.actions.unwrap_or_default();
        let disabled_actions = actions
            .disabled
            .unwrap_or_default()
            .iter()
            .map(|name| name.parse::<Action>())
            .collect::<Result<Vec<_>>>()?;

        let voice = file.voice.unwrap_or_default();

        Ok(Self {
            source,
            estimator,
            capture_fps: pipeline.capture_fps.unwrap_or(DEFAULT_CAPTURE_FPS),
            render_fps: pipeline.render_fps.unwrap_or(DEFAULT_RENDER_FPS),
            geometry_refresh_cycles: pipeline
                .geometry_refresh_cycles
                .unwrap_or(DEFAULT_GEOMETRY_REFRESH_CYCLES),
            min_render_side: pipeline.min_render_side.unwrap_or(DEFAULT_MIN_RENDER_SIDE),
            calibration,
            thresholds,
            debounce,
            cooldown: Duration::from_secs(cooldown_file.seconds.unwrap_or(DEFAULT_COOLDOWN_SECS)),
            action_prompt_cooldown: Duration::from_millis(
                cooldown_file
                    .action_prompt_ms
                    .unwrap_or(DEFAULT_ACTION_PROMPT_MS),
            ),
            cooldown_overrides,
            mirrored: actions.mirrored.unwrap_or(true),
            disabled_actions,
            announce_actions: actions.announce.unwrap_or(true),
            voice_enabled: voice.enabled.unwrap_or(true),
            messages: voice.messages.unwrap_or_default(),
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("POSE_TRIGGER_SOURCE") {
            if !url.trim().is_empty() {
                self.source.url = url;
            }
        }
        if let Ok(fps) = std::env::var("POSE_TRIGGER_CAPTURE_FPS") {
            self.capture_fps = fps
                .trim()
                .parse()
                .map_err(|_| anyhow!("POSE_TRIGGER_CAPTURE_FPS must be a number"))?;
        }
        if let Ok(fps) = std::env::var("POSE_TRIGGER_RENDER_FPS") {
            self.render_fps = fps
                .trim()
                .parse()
                .map_err(|_| anyhow!("POSE_TRIGGER_RENDER_FPS must be a number"))?;
        }
        if let Ok(window) = std::env::var("POSE_TRIGGER_DEBOUNCE_MS") {
            let ms: u64 = window.trim().parse().map_err(|_| {
                anyhow!("POSE_TRIGGER_DEBOUNCE_MS must be an integer number of milliseconds")
            })?;
            self.debounce.window = Duration::from_millis(ms);
        }
        if let Ok(cooldown) = std::env::var("POSE_TRIGGER_COOLDOWN_SECS") {
            let seconds: u64 = cooldown.trim().parse().map_err(|_| {
                anyhow!("POSE_TRIGGER_COOLDOWN_SECS must be an integer number of seconds")
            })?;
            self.cooldown = Duration::from_secs(seconds);
        }
        if let Ok(disabled) = std::env::var("POSE_TRIGGER_DISABLED_ACTIONS") {
            self.disabled_actions = split_csv(&disabled)
                .iter()
                .map(|name| name.parse::<Action>())
                .collect::<Result<Vec<_>>>()
                .context("POSE_TRIGGER_DISABLED_ACTIONS")?;
        }
        if let Ok(mirrored) = std::env::var("POSE_TRIGGER_MIRRORED") {
            self.mirrored = parse_flag(&mirrored)
                .ok_or_else(|| anyhow!("POSE_TRIGGER_MIRRORED must be true or false"))?;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        for (name, fps) in [
            ("capture_fps", self.capture_fps),
            ("render_fps", self.render_fps),
        ] {
            if !(fps > 0.0 && fps <= MAX_FPS) {
                bail!("{} must be in (0, {}], got {}", name, MAX_FPS, fps);
            }
        }
        if self.geometry_refresh_cycles == 0 {
            bail!("geometry_refresh_cycles must be greater than zero");
        }
        if self.debounce.window.is_zero() {
            bail!("debounce window must be greater than zero");
        }
        if self.cooldown.is_zero() {
            bail!("cooldown must be greater than zero");
        }
        if self.calibration.required_frames == 0 {
            bail!("calibration.required_frames must be greater than zero");
        }
        if let EstimatorSettings::Scripted {
            jitter: Some(jitter),
            ..
        } = &self.estimator
        {
            if !(jitter.is_finite() && *jitter >= 0.0) {
                bail!("estimator.jitter must be finite and non-negative, got {}", jitter);
            }
        }
        let c = &self.calibration;
        if !(0.0..=1.0).contains(&c.visibility_threshold) {
            bail!("calibration.visibility_threshold must be in [0, 1]");
        }
        for (name, value) in [
            ("min_shoulder_width", c.min_shoulder_width),
            ("max_shoulder_width", c.max_shoulder_width),
            ("stability_tolerance", c.stability_tolerance),
        ] {
            if !(value.is_finite() && value > 0.0) {
                bail!("calibration.{} must be finite and positive, got {}", name, value);
            }
        }
        if self.calibration.min_shoulder_width >= self.calibration.max_shoulder_width {
            bail!("calibration.min_shoulder_width must be below max_shoulder_width");
        }
        if !(0.0..0.5).contains(&self.calibration.edge_margin) {
            bail!("calibration.edge_margin must be in [0, 0.5)");
        }
        let t = &self.thresholds;
        for (name, value) in [
            ("hand_raise", t.hand_raise),
            ("both_hands_symmetry", t.both_hands_symmetry),
            ("foot_raise_ratio", t.foot_raise_ratio),
            ("head_turn_ratio", t.head_turn_ratio),
        ] {
            if !(value.is_finite() && value > 0.0) {
                bail!("thresholds.{} must be finite and positive, got {}", name, value);
            }
        }
        if !(0.0..=1.0).contains(&t.min_visibility) {
            bail!("thresholds.min_visibility must be in [0, 1]");
        }
        self.disabled_actions.sort();
        self.disabled_actions.dedup();
        Ok(())
    }

    pub fn enabled_actions(&self) -> ActionSet<bool> {
        let mut enabled = ActionSet::filled(true);
        for action in &self.disabled_actions {
            enabled[*action] = false;
        }
        enabled
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            calibration: self.calibration.clone(),
            classifier: ClassifierSettings {
                thresholds: self.thresholds.clone(),
                mirrored: self.mirrored,
                enabled: self.enabled_actions(),
            },
            debounce: self.debounce,
            cooldown_window: self.cooldown,
            action_prompt_window: self.action_prompt_cooldown,
            cooldown_overrides: self.cooldown_overrides.clone(),
            announce_actions: self.announce_actions,
            messages: Messages::default().with_overrides(self.messages.clone()),
        }
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            geometry_refresh_cycles: self.geometry_refresh_cycles,
            min_render_side: self.min_render_side,
            ..PipelineSettings::from_rates(self.capture_fps, self.render_fps)
        }
    }

    pub fn build_estimator(&self) -> Result<Box<dyn PoseEstimator>> {
        match &self.estimator {
            EstimatorSettings::Scripted {
                script,
                jitter,
                seed,
            } => {
                let estimator = match script {
                    Some(steps) => ScriptedEstimator::new(steps.clone(), self.mirrored)?,
                    None => ScriptedEstimator::demo(self.mirrored),
                };
                let estimator = match jitter {
                    Some(jitter) => estimator.with_jitter(*jitter, *seed),
                    None => estimator,
                };
                Ok(Box::new(estimator))
            }
            EstimatorSettings::JsonLines { path: Some(path) } => {
                let file = std::fs::File::open(path)
                    .with_context(|| format!("failed to open landmark file {}", path.display()))?;
                Ok(Box::new(JsonLinesEstimator::new(BufReader::new(file))))
            }
            EstimatorSettings::JsonLines { path: None } => Ok(Box::new(JsonLinesEstimator::new(
                BufReader::new(std::io::stdin()),
            ))),
        }
    }
}

fn read_config_file(path: &Path) -> Result<PoseTriggerConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
