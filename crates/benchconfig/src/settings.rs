use serde::{Deserialize, Serialize};

/// Technique used to sample points on a polygonal light.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolygonSampling {
    Baseline,
    AreaTurk,
    ProjectedSolidAngle,
    ProjectedSolidAngleBiased,
    LtcCp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MisHeuristic {
    Balance,
    Power,
    Weighted,
    OptimalClamped,
    Optimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightSampling {
    Uniform,
    Reservoir,
}

impl PolygonSampling {
    fn code(self) -> u32 {
        match self {
            PolygonSampling::Baseline => 0,
            PolygonSampling::AreaTurk => 1,
            PolygonSampling::ProjectedSolidAngle => 2,
            PolygonSampling::ProjectedSolidAngleBiased => 3,
            PolygonSampling::LtcCp => 4,
        }
    }
}

impl MisHeuristic {
    fn code(self) -> u32 {
        match self {
            MisHeuristic::Balance => 0,
            MisHeuristic::Power => 1,
            MisHeuristic::Weighted => 2,
            MisHeuristic::OptimalClamped => 3,
            MisHeuristic::Optimal => 4,
        }
    }
}

impl LightSampling {
    fn code(self) -> u32 {
        match self {
            LightSampling::Uniform => 0,
            LightSampling::Reservoir => 1,
        }
    }
}

/// Everything the shading programs and the frame loop read from the user's
/// settings. Changes to the shading-relevant subset are applied through a
/// shading rebuild; `v_sync` requires surface recreation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    pub exposure_factor: f32,
    pub roughness_factor: f32,
    pub sample_count: u32,
    pub sample_count_light: u32,
    pub mis_heuristic: MisHeuristic,
    pub mis_visibility_estimate: f32,
    pub polygon_sampling: PolygonSampling,
    pub light_sampling: LightSampling,
    pub accumulate: bool,
    pub show_polygonal_lights: bool,
    pub animate_noise: bool,
    pub v_sync: bool,
    pub show_gui: bool,
    pub fast_atan: bool,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            exposure_factor: 1.5,
            roughness_factor: 1.0,
            sample_count: 1,
            sample_count_light: 1,
            mis_heuristic: MisHeuristic::OptimalClamped,
            mis_visibility_estimate: 0.5,
            polygon_sampling: PolygonSampling::LtcCp,
            light_sampling: LightSampling::Reservoir,
            accumulate: true,
            show_polygonal_lights: false,
            animate_noise: true,
            v_sync: false,
            show_gui: true,
            fast_atan: true,
        }
    }
}

impl RenderSettings {
    /// Preprocessor definitions handed to the shading program.
    pub fn shader_defines(&self) -> Vec<(String, String)> {
        let flag = |value: bool| if value { "1" } else { "0" }.to_string();
        vec![
            ("SAMPLE_COUNT".into(), self.sample_count.max(1).to_string()),
            (
                "SAMPLE_COUNT_LIGHT".into(),
                self.sample_count_light.max(1).to_string(),
            ),
            ("MIS_HEURISTIC".into(), self.mis_heuristic.code().to_string()),
            (
                "POLYGON_SAMPLING".into(),
                self.polygon_sampling.code().to_string(),
            ),
            ("LIGHT_SAMPLING".into(), self.light_sampling.code().to_string()),
            (
                "SHOW_POLYGONAL_LIGHTS".into(),
                flag(self.show_polygonal_lights),
            ),
            ("USE_FAST_ATAN".into(), flag(self.fast_atan)),
        ]
    }

    /// True when switching from `self` to `other` changes the compiled
    /// shading program.
    pub fn shading_differs(&self, other: &RenderSettings) -> bool {
        self.shader_defines() != other.shader_defines()
    }
}

/// Partial settings as written in an experiment plan. Unset fields keep the
/// value inherited from the enclosing group or the defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingsOverride {
    pub exposure_factor: Option<f32>,
    pub roughness_factor: Option<f32>,
    pub sample_count: Option<u32>,
    pub sample_count_light: Option<u32>,
    pub mis_heuristic: Option<MisHeuristic>,
    pub mis_visibility_estimate: Option<f32>,
    pub polygon_sampling: Option<PolygonSampling>,
    pub light_sampling: Option<LightSampling>,
    pub accumulate: Option<bool>,
    pub show_polygonal_lights: Option<bool>,
    pub animate_noise: Option<bool>,
    pub v_sync: Option<bool>,
    pub show_gui: Option<bool>,
    pub fast_atan: Option<bool>,
}

impl SettingsOverride {
    pub fn apply_to(&self, settings: &mut RenderSettings) {
        macro_rules! take {
            ($($field:ident),* $(,)?) => {
                $(if let Some(value) = self.$field {
                    settings.$field = value;
                })*
            };
        }
        take!(
            exposure_factor,
            roughness_factor,
            sample_count,
            sample_count_light,
            mis_heuristic,
            mis_visibility_estimate,
            polygon_sampling,
            light_sampling,
            accumulate,
            show_polygonal_lights,
            animate_noise,
            v_sync,
            show_gui,
            fast_atan,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_benchmark_baseline() {
        let settings = RenderSettings::default();
        assert_eq!(settings.polygon_sampling, PolygonSampling::LtcCp);
        assert_eq!(settings.mis_heuristic, MisHeuristic::OptimalClamped);
        assert_eq!(settings.light_sampling, LightSampling::Reservoir);
        assert!(settings.accumulate);
        assert!(!settings.v_sync);
    }

    #[test]
    fn override_only_touches_set_fields() {
        let mut settings = RenderSettings::default();
        let patch = SettingsOverride {
            light_sampling: Some(LightSampling::Uniform),
            roughness_factor: Some(0.1),
            ..SettingsOverride::default()
        };
        patch.apply_to(&mut settings);
        assert_eq!(settings.light_sampling, LightSampling::Uniform);
        assert_eq!(settings.roughness_factor, 0.1);
        assert_eq!(settings.exposure_factor, 1.5);
    }

    #[test]
    fn exposure_does_not_change_shading_program() {
        let base = RenderSettings::default();
        let mut brighter = base.clone();
        brighter.exposure_factor = 4.0;
        assert!(!base.shading_differs(&brighter));

        let mut other = base.clone();
        other.polygon_sampling = PolygonSampling::AreaTurk;
        assert!(base.shading_differs(&other));
    }
}
