//! Analyze command: scan inputs into a new result table.

use std::sync::Arc;

use chrono::Utc;
use console::style;

use super::{drive_with_progress, open, print_census};
use crate::analysis::Analyzer;
use crate::config::ConfigFile;
use crate::models::{ResultTableName, TableCensus};
use crate::pipeline::AnalyzeStage;

pub async fn cmd_analyze(layer: ConfigFile) -> anyhow::Result<()> {
    let (config, ctx) = open(layer).await?;
    let input_dir = config.require_input_dir()?.to_path_buf();

    let name = ResultTableName::new_timestamped(
        &config.result_catalog,
        &config.result_schema,
        &config.result_table_prefix,
        Utc::now(),
    );
    let analyzer = Arc::new(Analyzer::new(config.token_count_threshold)?);
    let repo = ctx.conversions();
    let stage = AnalyzeStage::new(repo.clone(), analyzer, input_dir, name);

    drive_with_progress(&stage).await?;

    let table = stage.table_name();
    println!("{} Created result table {}", style("✓").green(), style(&table).bold());
    print_census(&TableCensus::from_records(&repo.get_all(&table).await?));
    Ok(())
}
