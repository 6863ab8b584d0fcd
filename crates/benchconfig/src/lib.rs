use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

mod settings;

pub use settings::{LightSampling, MisHeuristic, PolygonSampling, RenderSettings, SettingsOverride};

pub const DEFAULT_SAMPLE_BUDGET: u32 = 10_000;
pub const DEFAULT_WIDTH: u32 = 1920;
pub const DEFAULT_HEIGHT: u32 = 1080;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse experiment plan: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid experiment plan: {0}")]
    Invalid(String),
}

/// A scene the renderer knows how to load, plus the quicksave that holds its
/// default camera and lights.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SceneEntry {
    pub name: String,
    pub geometry: PathBuf,
    pub textures: PathBuf,
    pub quicksave: PathBuf,
}

/// Scenes available when a plan does not declare its own catalog.
pub fn builtin_scenes() -> BTreeMap<String, SceneEntry> {
    let entry = |name: &str, geometry: &str, textures: &str, quicksave: &str| SceneEntry {
        name: name.to_string(),
        geometry: PathBuf::from(geometry),
        textures: PathBuf::from(textures),
        quicksave: PathBuf::from(quicksave),
    };
    BTreeMap::from([
        (
            "bistro-interior".to_string(),
            entry(
                "Bistro Interior",
                "data/Bistro_interior.vks",
                "data/Bistro_textures",
                "data/quicksaves/Bistro_interior.save",
            ),
        ),
        (
            "bistro-exterior".to_string(),
            entry(
                "Bistro Exterior",
                "data/Bistro_exterior.vks",
                "data/Bistro_textures",
                "data/quicksaves/Bistro_exterior.save",
            ),
        ),
        (
            "zero-day".to_string(),
            entry(
                "Zero Day",
                "data/zeroday.vks",
                "data/ZeroDay_textures",
                "data/quicksaves/ZeroDay.save",
            ),
        ),
    ])
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExperimentPlan {
    pub version: u32,
    #[serde(default)]
    pub defaults: PlanDefaults,
    #[serde(default)]
    pub scenes: BTreeMap<String, SceneEntry>,
    #[serde(default)]
    pub groups: Vec<ExperimentGroup>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PlanDefaults {
    pub samples: Option<u32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub hdr: Option<bool>,
    #[serde(
        default,
        deserialize_with = "deserialize_duration_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub report_interval: Option<Duration>,
    #[serde(default)]
    pub settings: SettingsOverride,
}

/// Experiments sharing a scene, output directory and capture mode.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExperimentGroup {
    pub name: String,
    pub base_dir: PathBuf,
    pub scene: String,
    #[serde(default)]
    pub quicksave: Option<PathBuf>,
    #[serde(default)]
    pub per_frame_capture: bool,
    #[serde(default)]
    pub hdr: Option<bool>,
    #[serde(default)]
    pub samples: Option<u32>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub settings: SettingsOverride,
    #[serde(default)]
    pub experiments: Vec<ExperimentEntry>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExperimentEntry {
    pub name: String,
    #[serde(default)]
    pub samples: Option<u32>,
    #[serde(default)]
    pub per_frame_capture: Option<bool>,
    #[serde(default)]
    pub settings: SettingsOverride,
}

/// Values that take precedence over everything in the plan file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanOverrides {
    pub samples: Option<u32>,
    pub scene: Option<String>,
}

/// One fully resolved benchmark run. Immutable once the list is built.
#[derive(Debug, Clone, PartialEq)]
pub struct Experiment {
    pub name: String,
    pub scene_key: String,
    pub scene: SceneEntry,
    pub quicksave: PathBuf,
    pub width: u32,
    pub height: u32,
    pub settings: RenderSettings,
    pub sample_budget: u32,
    pub base_dir: PathBuf,
    pub use_hdr: bool,
    pub per_frame_capture: bool,
}

impl Experiment {
    pub fn capture_extension(&self) -> &'static str {
        if self.use_hdr {
            "hdr"
        } else {
            "png"
        }
    }

    pub fn screenshot_dir(&self) -> PathBuf {
        self.base_dir.join(&self.name)
    }

    pub fn timings_path(&self) -> PathBuf {
        self.screenshot_dir().join("timings.txt")
    }

    /// `<base_dir>/<name>/<sample>.<ext>`, with the sample index padded to
    /// five digits so directory listings sort numerically.
    pub fn screenshot_path(&self, sample_index: u32) -> PathBuf {
        self.screenshot_dir().join(format!(
            "{sample_index:05}.{}",
            self.capture_extension()
        ))
    }
}

fn deserialize_duration_opt<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Option<Duration>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map(Some)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Some(Duration::from_secs(v as u64)))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(Duration::from_secs(v)))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.is_nan() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Some(Duration::from_secs_f64(v)))
        }
    }

    deserializer.deserialize_any(Visitor)
}

impl Default for ExperimentPlan {
    fn default() -> Self {
        Self {
            version: 1,
            defaults: PlanDefaults::default(),
            scenes: BTreeMap::new(),
            groups: Vec::new(),
        }
    }
}

impl ExperimentPlan {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: ExperimentPlan = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    /// Reads and validates a plan file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|err| {
            ConfigError::Invalid(format!("cannot read {}: {err}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// The declared scene catalog, or the built-in one if none is declared.
    pub fn scene_catalog(&self) -> BTreeMap<String, SceneEntry> {
        if self.scenes.is_empty() {
            builtin_scenes()
        } else {
            self.scenes.clone()
        }
    }

    pub fn report_interval(&self) -> Duration {
        self.defaults
            .report_interval
            .unwrap_or_else(|| Duration::from_secs(1))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported plan version {}; expected 1",
                self.version
            )));
        }

        let positive = |value: Option<u32>, what: &str| -> Result<(), ConfigError> {
            match value {
                Some(0) => Err(ConfigError::Invalid(format!("{what} must be greater than zero"))),
                _ => Ok(()),
            }
        };
        positive(self.defaults.samples, "defaults.samples")?;
        positive(self.defaults.width, "defaults.width")?;
        positive(self.defaults.height, "defaults.height")?;

        let catalog = self.scene_catalog();
        for group in &self.groups {
            if group.name.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "experiment group name may not be empty".into(),
                ));
            }
            if !catalog.contains_key(&group.scene) {
                return Err(ConfigError::Invalid(format!(
                    "group '{}' references unknown scene '{}'",
                    group.name, group.scene
                )));
            }
            positive(group.samples, &format!("group '{}' samples", group.name))?;
            positive(group.width, &format!("group '{}' width", group.name))?;
            positive(group.height, &format!("group '{}' height", group.name))?;
            if group.experiments.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "group '{}' must contain at least one experiment",
                    group.name
                )));
            }
            for entry in &group.experiments {
                if entry.name.trim().is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "group '{}' contains an experiment with empty name",
                        group.name
                    )));
                }
                positive(
                    entry.samples,
                    &format!("experiment '{}/{}' samples", group.name, entry.name),
                )?;
            }
        }

        Ok(())
    }

    /// Flattens the plan into the ordered experiment list.
    pub fn resolve(&self, overrides: &PlanOverrides) -> Result<Vec<Experiment>, ConfigError> {
        let catalog = self.scene_catalog();
        if let Some(scene) = &overrides.scene {
            if !catalog.contains_key(scene) {
                return Err(ConfigError::Invalid(format!(
                    "scene override '{scene}' is not in the scene catalog"
                )));
            }
        }
        if overrides.samples == Some(0) {
            return Err(ConfigError::Invalid(
                "sample override must be greater than zero".into(),
            ));
        }

        let mut defaults = RenderSettings::default();
        self.defaults.settings.apply_to(&mut defaults);

        let mut experiments = Vec::new();
        for group in &self.groups {
            if overrides
                .scene
                .as_deref()
                .is_some_and(|scene| scene != group.scene)
            {
                continue;
            }
            let Some(scene) = catalog.get(&group.scene) else {
                continue;
            };

            let mut group_settings = defaults.clone();
            group.settings.apply_to(&mut group_settings);

            for entry in &group.experiments {
                let mut settings = group_settings.clone();
                entry.settings.apply_to(&mut settings);
                let sample_budget = overrides
                    .samples
                    .or(entry.samples)
                    .or(group.samples)
                    .or(self.defaults.samples)
                    .unwrap_or(DEFAULT_SAMPLE_BUDGET);

                experiments.push(Experiment {
                    name: entry.name.clone(),
                    scene_key: group.scene.clone(),
                    scene: scene.clone(),
                    quicksave: group
                        .quicksave
                        .clone()
                        .unwrap_or_else(|| scene.quicksave.clone()),
                    width: group.width.or(self.defaults.width).unwrap_or(DEFAULT_WIDTH),
                    height: group
                        .height
                        .or(self.defaults.height)
                        .unwrap_or(DEFAULT_HEIGHT),
                    settings,
                    sample_budget,
                    base_dir: group.base_dir.clone(),
                    use_hdr: group.hdr.or(self.defaults.hdr).unwrap_or(true),
                    per_frame_capture: entry.per_frame_capture.unwrap_or(group.per_frame_capture),
                });
            }
        }

        Ok(experiments)
    }
}
