use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use carflow::cli::{Cli, Command};
use carflow::config::CarflowConfig;
use carflow::demo::{DemoGenerator, DemoPhotos, DemoPublisher, demo_batches};
use carflow::mapper::map_to_avito;
use carflow::pipeline::FlowRunner;
use carflow::schema::{validate_ai_result, validate_avito_mapping};
use carflow::store::RecordStore;
use carflow::ui;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = CarflowConfig::load_from(&cli.config)?;
    init_tracing(&config, cli.verbose);

    match cli.command {
        Command::Validate { file, mapping } => {
            let candidate = read_json(&file)?;
            let result = if mapping {
                validate_avito_mapping(&candidate)
            } else {
                validate_ai_result(&candidate)
            };
            ui::print_validation(&result);
            Ok(exit_code(result.is_valid()))
        }
        Command::Map { file, photos } => {
            let ai_result = read_json(&file)?;
            match map_to_avito(&ai_result, &photos) {
                Ok(mapped) => {
                    println!("{}", serde_json::to_string_pretty(&mapped)?);
                    Ok(ExitCode::SUCCESS)
                }
                Err(errors) => {
                    for error in &errors {
                        eprintln!("error: {error}");
                    }
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Command::Demo { batches, captcha } => {
            let runner = FlowRunner::new(
                Arc::new(RecordStore::new()),
                DemoPhotos,
                DemoGenerator,
                DemoPublisher::with_captcha_on(&captcha),
                config.flow_settings(),
            );
            let progress = ui::FlowProgress::start(&format!("processing {batches} batches"));
            let summary = runner.run_once(&demo_batches(batches)).await?;
            progress.complete(&summary);

            for item in runner.store().need_action_queue()? {
                println!("  needs action: {} ({}): {}", item.card_id, item.batch_id, item.reason);
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Edges => {
            ui::print_edges();
            Ok(ExitCode::SUCCESS)
        }
    }
}

// LOG_FORMAT=json (or log_format = "json" in the config) selects JSON lines.
fn init_tracing(config: &CarflowConfig, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let json = std::env::var("LOG_FORMAT").map(|f| f == "json").unwrap_or(false)
        || config.log_format == "json";
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }
}

fn read_json(path: &Path) -> Result<Value> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("{} is not valid JSON", path.display()))
}

fn exit_code(ok: bool) -> ExitCode {
    if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}
