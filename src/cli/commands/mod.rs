//! Subcommand implementations.

pub mod analyze;
pub mod convert;
pub mod export;
pub mod retarget;
pub mod run;
pub mod status;
pub mod validate;

use std::path::Path;
use std::sync::Arc;

use console::style;

use super::progress::spawn_renderer;
use crate::config::{ConfigError, ConfigFile, PipelineConfig};
use crate::export::ExportResult;
use crate::llm::{ChatEndpoint, LlmClient, LlmConfig};
use crate::models::{ResultTable, TableCensus};
use crate::pipeline::{drive_stage, resolve_existing_table, PipelineStage, StageReport};
use crate::repository::DbContext;

/// Resolve the layered config and open the result store.
async fn open(layer: ConfigFile) -> anyhow::Result<(PipelineConfig, DbContext)> {
    let config = PipelineConfig::resolve(layer)?;
    let ctx = DbContext::from_path(&config.database);
    ctx.init_schema().await?;
    Ok((config, ctx))
}

/// The table named on the command line, which must already exist.
async fn require_table(config: &PipelineConfig, ctx: &DbContext) -> anyhow::Result<ResultTable> {
    let name = config
        .existing_result_table
        .as_ref()
        .ok_or(ConfigError::Missing("result table"))?;
    Ok(resolve_existing_table(&ctx.conversions(), name).await?)
}

fn endpoint(config: LlmConfig) -> anyhow::Result<Arc<dyn ChatEndpoint>> {
    Ok(Arc::new(LlmClient::new(config)?))
}

/// Drive one stage with a progress bar.
async fn drive_with_progress(stage: &dyn PipelineStage) -> anyhow::Result<StageReport> {
    let (event_tx, renderer) = spawn_renderer();
    let result = drive_stage(stage, &event_tx).await;
    drop(event_tx);
    let _ = renderer.await;
    Ok(result?)
}

fn print_census(census: &TableCensus) {
    println!("  Rows:            {}", census.total);
    println!("  Targets:         {}", census.targets);
    println!("  Converted:       {}", census.converted);
    println!("  Clean:           {}", census.clean);
    println!("  With errors:     {}", census.with_errors);
    println!("  Over threshold:  {}", census.over_threshold);
    println!("  Unreadable:      {}", census.unreadable);
}

/// Print per-file export failures and parse errors.
fn print_export_results(results: &[ExportResult]) {
    let written = results.iter().filter(|r| r.export_succeeded).count();
    println!(
        "{} Exported {} of {} files",
        style("✓").green(),
        written,
        results.len()
    );
    for result in results {
        if let Some(ref error) = result.export_error {
            println!(
                "  {} {} ({}): {}",
                style("✗").red(),
                result.input_file_number,
                result.input_file_path,
                error
            );
        } else if result.parse_error_count > 0 {
            println!(
                "  {} {} ({}): {} parse errors",
                style("!").yellow(),
                result.input_file_number,
                result.input_file_path,
                result.parse_error_count
            );
        }
    }
}

fn write_report(path: &Path, value: &impl serde::Serialize) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)?;
    println!("{} Report written to {}", style("✓").green(), path.display());
    Ok(())
}
