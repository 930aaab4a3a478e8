//! Convert and fix commands: one pass of endpoint requests.

use std::sync::Arc;

use crate::analysis::{AnalysisError, TokenCounter};
use crate::config::ConfigFile;
use crate::llm::prompts::{conversion_system_prompt, fix_system_prompt};
use crate::pipeline::{ConvertStage, FixStage, Requester};

use super::{drive_with_progress, endpoint, open, require_table};

pub async fn cmd_convert(layer: ConfigFile) -> anyhow::Result<()> {
    let (config, ctx) = open(layer).await?;
    config.require_endpoint()?;
    let table = require_table(&config, &ctx).await?;

    let counter = Arc::new(TokenCounter::new().map_err(AnalysisError::Tokenizer)?);
    let requester = Requester::new(
        endpoint(config.llm.clone())?,
        config.llm.request_params.clone(),
        config.request_timeout(),
        counter,
    );
    let stage = ConvertStage::new(
        ctx.conversions(),
        &table.name.to_string(),
        requester,
        conversion_system_prompt(config.sql_dialect, config.comment_lang),
        config.workers,
    );
    drive_with_progress(&stage).await?;
    Ok(())
}

pub async fn cmd_fix(layer: ConfigFile) -> anyhow::Result<()> {
    let (config, ctx) = open(layer).await?;
    config.require_endpoint()?;
    let table = require_table(&config, &ctx).await?;

    let counter = Arc::new(TokenCounter::new().map_err(AnalysisError::Tokenizer)?);
    let fix_llm = config.fix_llm();
    let requester = Requester::new(
        endpoint(fix_llm.clone())?,
        fix_llm.request_params,
        config.request_timeout(),
        counter,
    );
    let stage = FixStage::new(
        ctx.conversions(),
        &table.name.to_string(),
        requester,
        conversion_system_prompt(config.sql_dialect, config.comment_lang),
        fix_system_prompt(config.comment_lang),
        config.workers,
    );
    drive_with_progress(&stage).await?;
    Ok(())
}
