//! Analysis stage: create a result table and fill it with one row per input file.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use tracing::info;

use super::{PipelineError, PipelineEvent, PipelineStage, StageReport};
use crate::analysis::{discover_files, unreadable_record, Analyzer};
use crate::models::{ResultTable, ResultTableName};
use crate::repository::ConversionRepository;

pub struct AnalyzeStage {
    repo: ConversionRepository,
    analyzer: Arc<Analyzer>,
    input_dir: PathBuf,
    table: ResultTable,
}

impl AnalyzeStage {
    pub fn new(
        repo: ConversionRepository,
        analyzer: Arc<Analyzer>,
        input_dir: PathBuf,
        name: ResultTableName,
    ) -> Self {
        let table = ResultTable {
            name,
            created_at: Utc::now(),
            input_dir: input_dir.display().to_string(),
            token_count_threshold: i32::try_from(analyzer.token_count_threshold())
                .unwrap_or(i32::MAX),
            tokenizer: analyzer.tokenizer().to_string(),
        };
        Self {
            repo,
            analyzer,
            input_dir,
            table,
        }
    }

    pub fn table(&self) -> &ResultTable {
        &self.table
    }

    pub fn table_name(&self) -> String {
        self.table.name.to_string()
    }
}

#[async_trait]
impl PipelineStage for AnalyzeStage {
    fn name(&self) -> &str {
        "Analyze"
    }

    /// Files to analyze; zero once the table exists.
    async fn count(&self) -> Result<u64, PipelineError> {
        if self.repo.get_table(&self.table_name()).await?.is_some() {
            return Ok(0);
        }
        Ok(discover_files(&self.input_dir)?.len() as u64)
    }

    async fn run(
        &self,
        event_tx: &mpsc::Sender<PipelineEvent>,
    ) -> Result<StageReport, PipelineError> {
        let table_name = self.table_name();
        // Analyzing into a table that already has rows is never allowed
        if self.repo.get_table(&table_name).await?.is_some() {
            return Err(PipelineError::TableExists(table_name));
        }

        let files = discover_files(&self.input_dir)?;
        let stage_name = self.name().to_string();
        let mut report = StageReport::default();
        let mut records = Vec::with_capacity(files.len());

        for (index, path) in files.into_iter().enumerate() {
            let file_number = i32::try_from(index + 1).unwrap_or(i32::MAX);
            let item_id = file_number.to_string();
            let _ = event_tx
                .send(PipelineEvent::ItemStarted {
                    stage: stage_name.clone(),
                    item_id: item_id.clone(),
                    label: path.display().to_string(),
                })
                .await;

            let analyzer = self.analyzer.clone();
            let file = path.clone();
            let record = tokio::task::spawn_blocking(move || analyzer.analyze_file(file_number, &file))
                .await
                .unwrap_or_else(|e| unreadable_record(file_number, &path, e));

            let event = if let Some(error) = &record.result_error {
                report.failed += 1;
                PipelineEvent::ItemFailed {
                    stage: stage_name.clone(),
                    item_id,
                    error: error.clone(),
                }
            } else if record.is_conversion_target {
                report.succeeded += 1;
                PipelineEvent::ItemCompleted {
                    stage: stage_name.clone(),
                    item_id,
                    detail: record
                        .input_file_token_count_without_sql_comments
                        .map(|n| format!("{} tokens", n)),
                }
            } else {
                report.skipped += 1;
                PipelineEvent::ItemSkipped {
                    stage: stage_name.clone(),
                    item_id,
                }
            };
            let _ = event_tx.send(event).await;
            records.push(record);
        }

        self.repo.create_table(&self.table).await?;
        let inserted = self.repo.insert_records(&table_name, &records).await?;
        info!(
            "Created {} with {} rows ({} targets, {} over threshold, {} unreadable)",
            table_name, inserted, report.succeeded, report.skipped, report.failed
        );

        Ok(report)
    }
}
