//! Export stage: one notebook per row, failures collected per file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tracing::warn;

use super::{PipelineError, PipelineEvent, PipelineStage, StageReport};
use crate::export::notebook::{render, OutputPaths};
use crate::export::{ExportResult, TOKEN_LIMIT_ERROR};
use crate::models::{ConversionRecord, RowErrorKind};
use crate::repository::ConversionRepository;

pub struct ExportStage {
    repo: ConversionRepository,
    table: String,
    input_dir: PathBuf,
    output_dir: PathBuf,
    results: Mutex<Vec<ExportResult>>,
}

impl ExportStage {
    pub fn new(
        repo: ConversionRepository,
        table: &str,
        input_dir: PathBuf,
        output_dir: PathBuf,
    ) -> Self {
        Self {
            repo,
            table: table.to_string(),
            input_dir,
            output_dir,
            results: Mutex::new(Vec::new()),
        }
    }

    /// Per-file results of the last run.
    pub async fn take_results(&self) -> Vec<ExportResult> {
        std::mem::take(&mut *self.results.lock().await)
    }

    async fn export_row(&self, row: &ConversionRecord, relative: &Path) -> ExportResult {
        let mut result = ExportResult {
            input_file_number: row.input_file_number,
            input_file_path: row.input_file_path.clone(),
            output_file_path: None,
            export_succeeded: false,
            parse_error_count: row.parse_error_count(),
            export_error: None,
        };

        let Some(content) = &row.result_content else {
            result.export_error = Some(match &row.result_error {
                Some(error) => error.clone(),
                None if !row.is_conversion_target => TOKEN_LIMIT_ERROR.to_string(),
                None => "Not converted".to_string(),
            });
            return result;
        };

        let path = self.output_dir.join(relative);
        let notebook = render(content, &row.error_lines());
        match write_file(&path, &notebook).await {
            Ok(()) => {
                result.export_succeeded = true;
                result.output_file_path = Some(path.display().to_string());
            }
            Err(e) => {
                warn!("Failed to write {}: {}", path.display(), e);
                result.export_error = Some(RowErrorKind::Export.message(e));
            }
        }
        result
    }
}

async fn write_file(path: &Path, contents: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, contents).await
}

#[async_trait]
impl PipelineStage for ExportStage {
    fn name(&self) -> &str {
        "Export"
    }

    async fn count(&self) -> Result<u64, PipelineError> {
        Ok(self.repo.get_all(&self.table).await?.len() as u64)
    }

    async fn remaining(&self) -> Result<u64, PipelineError> {
        Ok(0)
    }

    async fn run(
        &self,
        event_tx: &mpsc::Sender<PipelineEvent>,
    ) -> Result<StageReport, PipelineError> {
        let rows = self.repo.get_all(&self.table).await?;
        let stage_name = self.name().to_string();
        let mut paths = OutputPaths::new();
        let mut report = StageReport::default();
        let mut results = Vec::with_capacity(rows.len());

        for row in &rows {
            let relative = paths.assign(
                Path::new(&row.input_file_path),
                &self.input_dir,
                row.input_file_number,
            );
            let result = self.export_row(row, &relative).await;

            let item_id = row.input_file_number.to_string();
            let event = match &result.export_error {
                None => {
                    report.succeeded += 1;
                    PipelineEvent::ItemCompleted {
                        stage: stage_name.clone(),
                        item_id,
                        detail: result.output_file_path.clone(),
                    }
                }
                Some(error) => {
                    report.failed += 1;
                    PipelineEvent::ItemFailed {
                        stage: stage_name.clone(),
                        item_id,
                        error: error.clone(),
                    }
                }
            };
            let _ = event_tx.send(event).await;
            results.push(result);
        }

        *self.results.lock().await = results;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewConversionRecord, ResultTable, ResultTableName, TOKENIZER_SCHEME};
    use crate::repository::{DbContext, ResultUpdate, ValidationUpdate};
    use chrono::Utc;
    use tempfile::tempdir;

    const TABLE: &str = "c.s.conversion_targets_202401010000";

    fn record(number: i32, path: &str, target: bool, error: Option<&str>) -> NewConversionRecord {
        NewConversionRecord {
            input_file_number: number,
            input_file_path: path.to_string(),
            input_file_encoding: error.is_none().then(|| "UTF-8".to_string()),
            input_file_token_count: Some(5),
            input_file_token_count_without_sql_comments: Some(5),
            input_file_content: Some("SELECT 1".to_string()),
            input_file_content_without_sql_comments: Some("SELECT 1".to_string()),
            is_conversion_target: target,
            result_error: error.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_one_result_per_row() {
        let dir = tempdir().unwrap();
        let ctx = DbContext::from_path(&dir.path().join("store.db"));
        ctx.init_schema().await.unwrap();
        let repo = ctx.conversions();
        repo.create_table(&ResultTable {
            name: ResultTableName::parse(TABLE).unwrap(),
            created_at: Utc::now(),
            input_dir: "/in".into(),
            token_count_threshold: 10,
            tokenizer: TOKENIZER_SCHEME.into(),
        })
        .await
        .unwrap();
        repo.insert_records(
            TABLE,
            &[
                record(1, "/in/etl/a.sql", true, None),
                record(2, "/in/big.sql", false, None),
                record(3, "/in/bad.sql", false, Some("InputReadError: invalid")),
                record(4, "/in/etl/b.sql", true, None),
            ],
        )
        .await
        .unwrap();
        for n in [1, 4] {
            repo.record_conversion(TABLE, n, "ep", &ResultUpdate::converted("spark.sql(\"SELEC 1\")".into(), 5))
                .await
                .unwrap();
        }
        repo.record_validation(
            TABLE,
            4,
            &ValidationUpdate {
                python_parse_error: None,
                extracted_sqls: vec!["SELEC 1".into()],
                sql_parse_errors: vec!["SELEC 1\nError: bad".into()],
            },
        )
        .await
        .unwrap();

        let out = dir.path().join("out");
        let stage = ExportStage::new(repo, TABLE, PathBuf::from("/in"), out.clone());
        let (tx, mut rx) = mpsc::channel(64);
        let report = stage.run(&tx).await.unwrap();
        drop(tx);
        while rx.recv().await.is_some() {}

        let results = stage.take_results().await;
        assert_eq!(results.len(), 4);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 2);

        assert!(results[0].export_succeeded);
        assert!(out.join("etl/a.py").exists());
        assert_eq!(results[1].export_error.as_deref(), Some(TOKEN_LIMIT_ERROR));
        assert_eq!(
            results[2].export_error.as_deref(),
            Some("InputReadError: invalid")
        );
        assert!(results[3].export_succeeded);
        assert_eq!(results[3].parse_error_count, 1);
        let written = std::fs::read_to_string(out.join("etl/b.py")).unwrap();
        assert!(written.starts_with("# Databricks notebook source"));
        assert!(written.contains("# MAGIC Error: bad"));
    }
}
