//! Run command: analyze, convert, validate and fix, then export.

use std::path::Path;

use console::style;

use super::{endpoint, print_census, print_export_results, write_report};
use crate::cli::progress::spawn_renderer;
use crate::config::{ConfigFile, PipelineConfig};
use crate::pipeline::Orchestrator;
use crate::repository::DbContext;

pub async fn cmd_run(layer: ConfigFile, report: Option<&Path>) -> anyhow::Result<()> {
    let config = PipelineConfig::resolve(layer)?;
    config.validate_for_run()?;

    let ctx = DbContext::from_path(&config.database);
    let converter = endpoint(config.llm.clone())?;
    let fixer = match config.fix_endpoint_name {
        Some(_) => endpoint(config.fix_llm())?,
        None => converter.clone(),
    };
    let orchestrator = Orchestrator::new(config, ctx, converter, fixer);

    let (event_tx, renderer) = spawn_renderer();
    let result = orchestrator.run(event_tx).await;
    let _ = renderer.await;
    let summary = result?;

    println!();
    println!(
        "{} Result table {}",
        style("✓").green(),
        style(&summary.result_table).bold()
    );
    println!(
        "  Validator runs: {}, fixer runs: {}",
        summary.validator_runs, summary.fixer_runs
    );
    print_census(&summary.census);
    print_export_results(&summary.exports);
    if summary.erroring_rows > 0 {
        println!(
            "{} {} rows still have errors; notebooks carry an error cell",
            style("!").yellow(),
            summary.erroring_rows
        );
    }

    if let Some(path) = report {
        write_report(path, &summary)?;
    }
    Ok(())
}
