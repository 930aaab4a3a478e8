//! Fix stage: send erroring targets back to the endpoint with their errors.
//!
//! Rows with converted content get a repair request listing their static
//! check errors. Rows whose conversion call failed have no content yet and
//! are sent through the conversion prompt again. Success is only known after
//! the next validation pass.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{run_workers, PipelineError, PipelineEvent, PipelineStage, Requester, StageReport};
use crate::llm::prompts::fix_user_prompt;
use crate::repository::ConversionRepository;

pub struct FixStage {
    repo: ConversionRepository,
    table: String,
    requester: Requester,
    conversion_prompt: Arc<str>,
    fix_prompt: Arc<str>,
    workers: usize,
}

impl FixStage {
    pub fn new(
        repo: ConversionRepository,
        table: &str,
        requester: Requester,
        conversion_prompt: String,
        fix_prompt: String,
        workers: usize,
    ) -> Self {
        Self {
            repo,
            table: table.to_string(),
            requester,
            conversion_prompt: conversion_prompt.into(),
            fix_prompt: fix_prompt.into(),
            workers,
        }
    }
}

#[async_trait]
impl PipelineStage for FixStage {
    fn name(&self) -> &str {
        "Fix"
    }

    async fn count(&self) -> Result<u64, PipelineError> {
        Ok(self.repo.count_erroring(&self.table).await?)
    }

    /// Nothing is known to be fixed until the next validation pass.
    async fn remaining(&self) -> Result<u64, PipelineError> {
        Ok(0)
    }

    async fn run(
        &self,
        event_tx: &mpsc::Sender<PipelineEvent>,
    ) -> Result<StageReport, PipelineError> {
        let rows = self.repo.fix_candidates(&self.table).await?;

        let succeeded = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(AtomicUsize::new(0));
        let skipped = Arc::new(AtomicUsize::new(0));

        {
            let repo = self.repo.clone();
            let table = self.table.clone();
            let requester = self.requester.clone();
            let conversion_prompt = self.conversion_prompt.clone();
            let fix_prompt = self.fix_prompt.clone();
            let stage_name = self.name().to_string();
            let event_tx = event_tx.clone();
            let succeeded = succeeded.clone();
            let failed = failed.clone();
            let skipped = skipped.clone();

            run_workers(rows, self.workers, move |row| {
                let repo = repo.clone();
                let table = table.clone();
                let requester = requester.clone();
                let conversion_prompt = conversion_prompt.clone();
                let fix_prompt = fix_prompt.clone();
                let stage_name = stage_name.clone();
                let event_tx = event_tx.clone();
                let succeeded = succeeded.clone();
                let failed = failed.clone();
                let skipped = skipped.clone();

                async move {
                    let item_id = row.input_file_number.to_string();
                    let _ = event_tx
                        .send(PipelineEvent::ItemStarted {
                            stage: stage_name.clone(),
                            item_id: item_id.clone(),
                            label: row.input_file_path.clone(),
                        })
                        .await;

                    let update = match &row.result_content {
                        Some(program) => {
                            let user = fix_user_prompt(program, &row.error_lines());
                            requester.request(&fix_prompt, &user).await
                        }
                        None => {
                            let source = row
                                .input_file_content_without_sql_comments
                                .as_deref()
                                .unwrap_or_default();
                            requester.request(&conversion_prompt, source).await
                        }
                    };

                    let written = repo
                        .record_fix(
                            &table,
                            row.input_file_number,
                            requester.endpoint_name(),
                            &update,
                        )
                        .await?;

                    let event = if !written {
                        skipped.fetch_add(1, Ordering::Relaxed);
                        PipelineEvent::ItemSkipped {
                            stage: stage_name,
                            item_id,
                        }
                    } else if let Some(error) = update.error {
                        failed.fetch_add(1, Ordering::Relaxed);
                        PipelineEvent::ItemFailed {
                            stage: stage_name,
                            item_id,
                            error,
                        }
                    } else {
                        succeeded.fetch_add(1, Ordering::Relaxed);
                        PipelineEvent::ItemCompleted {
                            stage: stage_name,
                            item_id,
                            detail: None,
                        }
                    };
                    let _ = event_tx.send(event).await;
                    Ok::<(), PipelineError>(())
                }
            })
            .await?;
        }

        Ok(StageReport {
            succeeded: succeeded.load(Ordering::Relaxed),
            failed: failed.load(Ordering::Relaxed),
            skipped: skipped.load(Ordering::Relaxed),
        })
    }
}
