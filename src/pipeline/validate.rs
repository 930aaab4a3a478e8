//! Validation stage: static checks over every converted target.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{run_workers, PipelineError, PipelineEvent, PipelineStage, StageReport};
use crate::repository::ConversionRepository;
use crate::validate::{unchecked_program, validate_program};

pub struct ValidateStage {
    repo: ConversionRepository,
    table: String,
    workers: usize,
}

impl ValidateStage {
    pub fn new(repo: ConversionRepository, table: &str, workers: usize) -> Self {
        Self {
            repo,
            table: table.to_string(),
            workers,
        }
    }
}

#[async_trait]
impl PipelineStage for ValidateStage {
    fn name(&self) -> &str {
        "Validate"
    }

    async fn count(&self) -> Result<u64, PipelineError> {
        Ok(self.repo.count_validation_candidates(&self.table).await?)
    }

    /// Rows left erroring after validation.
    async fn remaining(&self) -> Result<u64, PipelineError> {
        Ok(self.repo.count_erroring(&self.table).await?)
    }

    async fn run(
        &self,
        event_tx: &mpsc::Sender<PipelineEvent>,
    ) -> Result<StageReport, PipelineError> {
        let rows = self.repo.validation_candidates(&self.table).await?;

        let clean = Arc::new(AtomicUsize::new(0));
        let erroring = Arc::new(AtomicUsize::new(0));

        {
            let repo = self.repo.clone();
            let table = self.table.clone();
            let stage_name = self.name().to_string();
            let event_tx = event_tx.clone();
            let clean = clean.clone();
            let erroring = erroring.clone();

            run_workers(rows, self.workers, move |row| {
                let repo = repo.clone();
                let table = table.clone();
                let stage_name = stage_name.clone();
                let event_tx = event_tx.clone();
                let clean = clean.clone();
                let erroring = erroring.clone();

                async move {
                    let item_id = row.input_file_number.to_string();
                    let program = row.result_content.unwrap_or_default();
                    let update = tokio::task::spawn_blocking(move || validate_program(&program))
                        .await
                        .unwrap_or_else(|e| {
                            tracing::error!("Static checks failed on #{}: {}", item_id, e);
                            unchecked_program(e)
                        });

                    repo.record_validation(&table, row.input_file_number, &update)
                        .await?;

                    let error_count =
                        usize::from(update.python_parse_error.is_some()) + update.sql_parse_errors.len();
                    let event = if update.is_clean() {
                        clean.fetch_add(1, Ordering::Relaxed);
                        PipelineEvent::ItemCompleted {
                            stage: stage_name,
                            item_id,
                            detail: Some(format!("{} statements", update.extracted_sqls.len())),
                        }
                    } else {
                        erroring.fetch_add(1, Ordering::Relaxed);
                        PipelineEvent::ItemFailed {
                            stage: stage_name,
                            item_id,
                            error: format!("{} static check errors", error_count),
                        }
                    };
                    let _ = event_tx.send(event).await;
                    Ok::<(), PipelineError>(())
                }
            })
            .await?;
        }

        Ok(StageReport {
            succeeded: clean.load(Ordering::Relaxed),
            failed: erroring.load(Ordering::Relaxed),
            skipped: 0,
        })
    }
}
