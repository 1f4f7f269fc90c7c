//! Action-tracking replay tool.
//!
//! Replays scenario scripts on the cooperative engine with one tracker
//! installed and prints the start/resume/suspend/finish timeline it observed.

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tracker::exit_codes;
use tracker::io::config::{TrackerConfig, write_config};
use tracker::io::report::{render_json_lines, render_timeline};
use tracker::io::scenario::load_scenario;
use tracker::logging;
use tracker::replay::replay_files;

#[derive(Parser)]
#[command(
    name = "tracker",
    version,
    about = "Replay action scenarios through the action-tracking middleware"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a scenario and print the hook timeline.
    Replay {
        /// Scenario file (JSON).
        #[arg(long)]
        scenario: PathBuf,
        /// Tracker config (TOML). Defaults apply when omitted or missing.
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },
    /// Check a scenario against the schema and handle rules.
    Validate {
        #[arg(long)]
        scenario: PathBuf,
    },
    /// Write a default tracker config.
    InitConfig {
        #[arg(long, default_value = "tracker.toml")]
        path: PathBuf,
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn main() {
    logging::init();
    let code = match run(Cli::parse()) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Replay {
            scenario,
            config,
            format,
        } => cmd_replay(&scenario, config.as_deref(), format),
        Command::Validate { scenario } => cmd_validate(&scenario),
        Command::InitConfig { path, force } => cmd_init_config(&path, force),
    }
}

fn cmd_replay(scenario: &Path, config: Option<&Path>, format: Format) -> Result<i32> {
    let outcome = replay_files(config, scenario)?;
    match format {
        Format::Text => print!("{}", render_timeline(&outcome.events, outcome.fault.as_ref())?),
        Format::Json => {
            print!("{}", render_json_lines(&outcome.events)?);
            if let Some(fault) = &outcome.fault {
                eprintln!("fault: {fault}");
            }
        }
    }
    Ok(if outcome.fault.is_some() {
        exit_codes::FAULT
    } else {
        exit_codes::OK
    })
}

fn cmd_validate(scenario: &Path) -> Result<i32> {
    let parsed = load_scenario(scenario)?;
    println!(
        "{}: {} model(s), {} top-level op(s)",
        scenario.display(),
        parsed.models.len(),
        parsed.script.len()
    );
    Ok(exit_codes::OK)
}

fn cmd_init_config(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(path, &TrackerConfig::default())?;
    Ok(exit_codes::OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_replay_defaults_to_text() {
        let cli = Cli::parse_from(["tracker", "replay", "--scenario", "s.json"]);
        let Command::Replay {
            scenario,
            config,
            format,
        } = cli.command
        else {
            panic!("expected replay");
        };
        assert_eq!(scenario, PathBuf::from("s.json"));
        assert_eq!(config, None);
        assert_eq!(format, Format::Text);
    }

    #[test]
    fn parse_init_config_force() {
        let cli = Cli::parse_from(["tracker", "init-config", "--force"]);
        assert!(matches!(
            cli.command,
            Command::InitConfig { force: true, .. }
        ));
    }
}
