//! Validate command.

use console::style;

use super::{drive_with_progress, open, require_table};
use crate::config::ConfigFile;
use crate::pipeline::ValidateStage;

pub async fn cmd_validate(layer: ConfigFile) -> anyhow::Result<()> {
    let (config, ctx) = open(layer).await?;
    let table = require_table(&config, &ctx).await?;
    let name = table.name.to_string();
    let repo = ctx.conversions();

    let stage = ValidateStage::new(repo.clone(), &name, config.workers);
    drive_with_progress(&stage).await?;

    let erroring = repo.count_erroring(&name).await?;
    if erroring == 0 {
        println!("{} No erroring rows", style("✓").green());
    } else {
        println!("{} {} rows need fixing", style("!").yellow(), erroring);
    }
    Ok(())
}
