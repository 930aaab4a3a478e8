//! Status command: result table census.

use console::style;
use serde::Serialize;

use super::{open, print_census, require_table};
use crate::config::ConfigFile;
use crate::models::{ResultTable, TableCensus};

#[derive(Serialize)]
struct TableStatus {
    #[serde(flatten)]
    table: ResultTable,
    census: TableCensus,
    erroring: u64,
}

pub async fn cmd_status(layer: ConfigFile, json: bool) -> anyhow::Result<()> {
    let (config, ctx) = open(layer).await?;
    let repo = ctx.conversions();

    let tables = match config.existing_result_table {
        Some(_) => vec![require_table(&config, &ctx).await?],
        None => repo.list_result_tables().await?,
    };

    let mut statuses = Vec::with_capacity(tables.len());
    for table in tables {
        let name = table.name.to_string();
        statuses.push(TableStatus {
            census: TableCensus::from_records(&repo.get_all(&name).await?),
            erroring: repo.count_erroring(&name).await?,
            table,
        });
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
        return Ok(());
    }

    if statuses.is_empty() {
        println!("{} No result tables in {}", style("!").yellow(), config.database.display());
        return Ok(());
    }

    for status in &statuses {
        println!(
            "{} (created {}, threshold {} tokens)",
            style(status.table.name.to_string()).bold(),
            status.table.created_at.format("%Y-%m-%d %H:%M"),
            status.table.token_count_threshold
        );
        println!("  Input dir:       {}", status.table.input_dir);
        print_census(&status.census);
        println!("  Erroring now:    {}", status.erroring);
        println!();
    }
    Ok(())
}
