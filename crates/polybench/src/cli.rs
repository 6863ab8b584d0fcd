use std::ffi::OsString;
use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "polybench",
    author,
    version,
    about = "Benchmark renderer for polygonal light sampling techniques"
)]
pub struct Cli {
    /// Start from the configuration of experiment N (also `-e<N>`).
    #[arg(short = 'e', long = "experiment", value_name = "N")]
    pub experiment: Option<usize>,

    /// Present with vertical synchronisation.
    #[arg(long = "v-sync", overrides_with = "no_v_sync")]
    pub v_sync: bool,

    /// Present as fast as possible.
    #[arg(long = "no-v-sync", overrides_with = "v_sync")]
    pub no_v_sync: bool,

    /// Show the heads-up display.
    #[arg(long, overrides_with = "no_gui")]
    pub gui: bool,

    /// Hide the heads-up display.
    #[arg(long = "no-gui", overrides_with = "gui")]
    pub no_gui: bool,

    /// Run every experiment of the plan, then exit.
    #[arg(long = "run-exp")]
    pub run_exp: bool,

    /// Experiment plan; defaults to `data/experiments.toml` when it exists.
    #[arg(long, value_name = "FILE")]
    pub plan: Option<PathBuf>,

    /// Replace every experiment's sample budget.
    #[arg(long, env = "NUM_SAMPLES", value_name = "N")]
    pub samples: Option<u32>,

    /// Only run experiments on this scene.
    #[arg(long, env = "SCENE", value_name = "KEY")]
    pub scene: Option<String>,

    /// Override the window width in pixels.
    #[arg(long, value_name = "PIXELS")]
    pub width: Option<u32>,

    /// Override the window height in pixels.
    #[arg(long, value_name = "PIXELS")]
    pub height: Option<u32>,

    /// Directory holding the GLSL shaders.
    #[arg(long, value_name = "DIR")]
    pub shader_dir: Option<PathBuf>,
}

impl Cli {
    /// `Some` only when a vsync flag was given; the last one wins.
    pub fn v_sync_override(&self) -> Option<bool> {
        if self.v_sync {
            Some(true)
        } else if self.no_v_sync {
            Some(false)
        } else {
            None
        }
    }

    pub fn gui_override(&self) -> Option<bool> {
        if self.gui {
            Some(true)
        } else if self.no_gui {
            Some(false)
        } else {
            None
        }
    }
}

pub fn parse() -> Cli {
    Cli::parse_from(normalize_legacy_args(std::env::args_os()))
}

/// Rewrites the historical single-dash spellings (`-v_sync`, `-run_exp`, ...)
/// into their long forms. `-e<N>` is already a valid short option.
pub fn normalize_legacy_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    let mut after_separator = false;
    args.into_iter()
        .map(|arg| {
            if after_separator {
                return arg;
            }
            if arg == "--" {
                after_separator = true;
                return arg;
            }
            match arg.to_str().and_then(legacy_flag) {
                Some(long) => OsString::from(long),
                None => arg,
            }
        })
        .collect()
}

fn legacy_flag(arg: &str) -> Option<&'static str> {
    match arg {
        "-v_sync" => Some("--v-sync"),
        "-no_v_sync" => Some("--no-v-sync"),
        "-gui" => Some("--gui"),
        "-no_gui" => Some("--no-gui"),
        "-run_exp" => Some("--run-exp"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_args(args: &[&str]) -> Cli {
        let args = std::iter::once("polybench")
            .chain(args.iter().copied())
            .map(OsString::from);
        Cli::try_parse_from(normalize_legacy_args(args)).expect("arguments should parse")
    }

    #[test]
    fn legacy_flags_map_to_long_options() {
        let cli = parse_args(&["-e3", "-no_v_sync", "-no_gui", "-run_exp"]);
        assert_eq!(cli.experiment, Some(3));
        assert_eq!(cli.v_sync_override(), Some(false));
        assert_eq!(cli.gui_override(), Some(false));
        assert!(cli.run_exp);
    }

    #[test]
    fn last_vsync_flag_wins() {
        let cli = parse_args(&["-no_v_sync", "--v-sync"]);
        assert_eq!(cli.v_sync_override(), Some(true));
        let cli = parse_args(&["--v-sync", "-no_v_sync"]);
        assert_eq!(cli.v_sync_override(), Some(false));
        assert_eq!(parse_args(&[]).v_sync_override(), None);
    }

    #[test]
    fn arguments_after_separator_are_untouched() {
        let args = normalize_legacy_args(["polybench", "--", "-gui"].map(OsString::from));
        assert_eq!(args[2], OsString::from("-gui"));
    }

    #[test]
    fn unknown_legacy_spelling_is_rejected() {
        let args = normalize_legacy_args(["polybench", "-vsync"].map(OsString::from));
        assert!(Cli::try_parse_from(args).is_err());
    }
}
