//! `bulwark` command-line interface

use anyhow::Context;
use bulwark_core::{init_tracing, run_simulation, LogFormat, PlaneConfig, VERSION};
use clap::{value_parser, Arg, ArgMatches, Command};
use std::path::PathBuf;
use std::process::ExitCode;

fn cli() -> Command {
    Command::new("bulwark")
        .version(VERSION)
        .about("Resilience control plane for autonomous agent operations")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .global(true)
                .default_value("plain")
                .value_parser(value_parser!(LogFormat))
                .help("Log line format"),
        )
        .subcommand(
            Command::new("check-config")
                .about("Validate a YAML or TOML plane config")
                .arg(
                    Arg::new("path")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Config file (.yaml, .yml or .toml)"),
                ),
        )
        .subcommand(
            Command::new("simulate")
                .about("Run the breaker, anomaly, escalation, stop and recovery scenario")
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_parser(value_parser!(PathBuf))
                        .help("Plane config to simulate with (defaults when absent)"),
                ),
        )
}

fn check_config(args: &ArgMatches) -> anyhow::Result<ExitCode> {
    let path = args
        .get_one::<PathBuf>("path")
        .context("missing config path")?;
    match PlaneConfig::load(path) {
        Ok(config) => {
            println!(
                "{}: ok (plane '{}', {} named breakers)",
                path.display(),
                config.name,
                config.breakers.settings.named.len()
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            println!("{}: {err}", path.display());
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn simulate(args: &ArgMatches) -> anyhow::Result<ExitCode> {
    let config = match args.get_one::<PathBuf>("config") {
        Some(path) => PlaneConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => PlaneConfig::default(),
    };

    let report = run_simulation(config).await.context("simulation failed")?;
    println!("{}", serde_json::to_string_pretty(&report.stats)?);

    Ok(if report.stats.health.is_healthy() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let matches = cli().get_matches();
    let format = matches
        .get_one::<LogFormat>("log-format")
        .copied()
        .unwrap_or_default();
    init_tracing(format);

    match matches.subcommand() {
        Some(("check-config", args)) => check_config(args),
        Some(("simulate", args)) => simulate(args).await,
        _ => Ok(ExitCode::FAILURE),
    }
}
