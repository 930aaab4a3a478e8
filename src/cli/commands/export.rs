//! Export command.

use std::path::{Path, PathBuf};

use super::{drive_with_progress, open, print_export_results, require_table, write_report};
use crate::config::ConfigFile;
use crate::pipeline::ExportStage;

pub async fn cmd_export(layer: ConfigFile, report: Option<&Path>) -> anyhow::Result<()> {
    let (config, ctx) = open(layer).await?;
    let table = require_table(&config, &ctx).await?;
    let output_dir = config.require_output_dir()?.to_path_buf();

    let stage = ExportStage::new(
        ctx.conversions(),
        &table.name.to_string(),
        PathBuf::from(&table.input_dir),
        output_dir,
    );
    drive_with_progress(&stage).await?;

    let results = stage.take_results().await;
    print_export_results(&results);
    if let Some(path) = report {
        write_report(path, &results)?;
    }
    Ok(())
}
