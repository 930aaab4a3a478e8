//! Retarget command: queue rows for conversion again.

use console::style;

use super::{open, require_table};
use crate::config::ConfigFile;

pub async fn cmd_retarget(
    layer: ConfigFile,
    files: &[i32],
    path_contains: Option<&str>,
) -> anyhow::Result<()> {
    let (config, ctx) = open(layer).await?;
    let table = require_table(&config, &ctx).await?;
    let name = table.name.to_string();
    let repo = ctx.conversions();

    let mut numbers = files.to_vec();
    if let Some(needle) = path_contains {
        numbers.extend(
            repo.get_all(&name)
                .await?
                .into_iter()
                .filter(|row| row.input_file_path.contains(needle))
                .map(|row| row.input_file_number),
        );
    }
    numbers.sort_unstable();
    numbers.dedup();

    if numbers.is_empty() {
        println!("{} No rows selected", style("!").yellow());
        return Ok(());
    }

    let updated = repo.retarget(&name, &numbers).await?;
    println!(
        "{} Retargeted {} of {} selected rows",
        style("✓").green(),
        updated,
        numbers.len()
    );
    if updated < numbers.len() {
        println!(
            "  {} Rows without readable content were left alone",
            style("!").yellow()
        );
    }
    Ok(())
}
