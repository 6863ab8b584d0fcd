use std::path::Path;

use anyhow::{Context, Result};
use benchconfig::{Experiment, ExperimentPlan, PlanOverrides, RenderSettings, DEFAULT_HEIGHT, DEFAULT_WIDTH};
use orchestrator::ActiveConfiguration;
use renderer::{default_shader_dir, Renderer, RendererConfig};
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;

const DEFAULT_PLAN: &str = "data/experiments.toml";
/// Scene rendered when no experiment is selected.
const DEFAULT_SCENE: &str = "zero-day";

pub fn run(cli: Cli) -> Result<()> {
    initialise_tracing();

    let plan = load_plan(cli.plan.as_deref())?;
    let overrides = PlanOverrides {
        samples: cli.samples,
        scene: cli.scene.clone(),
    };
    let experiments = plan
        .resolve(&overrides)
        .context("failed to resolve experiment plan")?;
    tracing::debug!(count = experiments.len(), "experiments resolved");

    let config = renderer_config(&cli, &plan, experiments)?;
    let run_all = config.run_experiments;
    let summary = Renderer::new(config).run()?;
    if run_all && !summary.experiments_completed {
        tracing::warn!("window closed before every experiment completed");
    }
    Ok(())
}

fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// An explicit plan must load; the default one is optional.
fn load_plan(path: Option<&Path>) -> Result<ExperimentPlan> {
    if let Some(path) = path {
        return ExperimentPlan::load(path)
            .with_context(|| format!("failed to load experiment plan {}", path.display()));
    }
    let default = Path::new(DEFAULT_PLAN);
    if default.is_file() {
        tracing::info!(path = %default.display(), "loading default experiment plan");
        ExperimentPlan::load(default)
            .with_context(|| format!("failed to load experiment plan {}", default.display()))
    } else {
        tracing::debug!("no experiment plan found; automation is unavailable");
        Ok(ExperimentPlan::default())
    }
}

fn renderer_config(cli: &Cli, plan: &ExperimentPlan, experiments: Vec<Experiment>) -> Result<RendererConfig> {
    let (mut initial, size) = match cli.experiment {
        Some(index) => {
            let experiment = experiments.get(index).with_context(|| {
                format!(
                    "experiment {index} does not exist; the plan defines {}",
                    experiments.len()
                )
            })?;
            tracing::info!(experiment = %experiment.name, index, "starting from experiment configuration");
            (
                ActiveConfiguration::from_experiment(experiment),
                (experiment.width, experiment.height),
            )
        }
        None => (
            default_configuration(plan, cli.scene.as_deref())?,
            (DEFAULT_WIDTH, DEFAULT_HEIGHT),
        ),
    };
    if let Some(v_sync) = cli.v_sync_override() {
        initial.settings.v_sync = v_sync;
    }
    if let Some(show_gui) = cli.gui_override() {
        initial.settings.show_gui = show_gui;
    }
    if cli.run_exp && experiments.is_empty() {
        anyhow::bail!("--run-exp needs at least one experiment in the plan");
    }

    let mut config = RendererConfig::new(initial);
    config.window_size = (cli.width.unwrap_or(size.0), cli.height.unwrap_or(size.1));
    config.shader_dir = cli.shader_dir.clone().unwrap_or_else(default_shader_dir);
    config.experiments = experiments;
    config.run_experiments = cli.run_exp;
    config.report_interval = plan.report_interval();
    Ok(config)
}

/// Default settings on the requested scene, or on Zero Day.
fn default_configuration(plan: &ExperimentPlan, scene: Option<&str>) -> Result<ActiveConfiguration> {
    let key = scene.unwrap_or(DEFAULT_SCENE);
    let catalog = plan.scene_catalog();
    let entry = catalog
        .get(key)
        .with_context(|| format!("scene '{key}' is not in the scene catalog"))?;
    Ok(ActiveConfiguration {
        scene_key: key.to_string(),
        scene: entry.clone(),
        quicksave: entry.quicksave.clone(),
        settings: RenderSettings::default(),
    })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use clap::Parser;

    use super::*;

    const PLAN: &str = r#"
        version = 1

        [defaults]
        samples = 64
        width = 640
        height = 360

        [[groups]]
        name = "teaser"
        base_dir = "out/teaser"
        scene = "bistro-exterior"

        [[groups.experiments]]
        name = "baseline"
        settings = { polygon_sampling = "baseline", v_sync = true }

        [[groups.experiments]]
        name = "ltc"
    "#;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("polybench").chain(args.iter().copied())).expect("valid arguments")
    }

    fn experiments(plan: &ExperimentPlan) -> Vec<Experiment> {
        plan.resolve(&PlanOverrides::default()).expect("plan resolves")
    }

    #[test]
    fn without_experiment_the_zero_day_scene_is_used() {
        let plan = ExperimentPlan::default();
        let config = renderer_config(&cli(&[]), &plan, Vec::new()).expect("config");
        assert_eq!(config.initial.scene_key, "zero-day");
        assert_eq!(config.initial.quicksave, config.initial.scene.quicksave);
        assert_eq!(config.window_size, (DEFAULT_WIDTH, DEFAULT_HEIGHT));
        assert!(!config.run_experiments);
    }

    #[test]
    fn experiment_index_selects_configuration_and_size() {
        let plan = ExperimentPlan::from_toml_str(PLAN).expect("plan parses");
        let config = renderer_config(&cli(&["-e", "0", "--no-v-sync"]), &plan, experiments(&plan)).expect("config");
        assert_eq!(config.initial.scene_key, "bistro-exterior");
        assert_eq!(config.window_size, (640, 360));
        assert!(!config.initial.settings.v_sync);
        assert_eq!(config.experiments.len(), 2);
    }

    #[test]
    fn out_of_range_experiment_is_an_error() {
        let plan = ExperimentPlan::from_toml_str(PLAN).expect("plan parses");
        let err = renderer_config(&cli(&["-e", "7"]), &plan, experiments(&plan)).unwrap_err();
        assert!(err.to_string().contains("experiment 7"));
    }

    #[test]
    fn run_all_requires_experiments() {
        let plan = ExperimentPlan::default();
        assert!(renderer_config(&cli(&["--run-exp"]), &plan, Vec::new()).is_err());
    }

    #[test]
    fn explicit_plan_path_is_loaded() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("plan.toml");
        fs::write(&path, PLAN).expect("write plan");
        let plan = load_plan(Some(&path)).expect("plan loads");
        assert_eq!(plan.groups.len(), 1);
        assert!(load_plan(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
