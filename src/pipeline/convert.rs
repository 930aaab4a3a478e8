//! Conversion stage: send each unconverted target to the endpoint once.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::warn;

use super::{run_workers, PipelineError, PipelineEvent, PipelineStage, Requester, StageReport};
use crate::repository::ConversionRepository;

pub struct ConvertStage {
    repo: ConversionRepository,
    table: String,
    requester: Requester,
    system_prompt: Arc<str>,
    workers: usize,
}

impl ConvertStage {
    pub fn new(
        repo: ConversionRepository,
        table: &str,
        requester: Requester,
        system_prompt: String,
        workers: usize,
    ) -> Self {
        Self {
            repo,
            table: table.to_string(),
            requester,
            system_prompt: system_prompt.into(),
            workers,
        }
    }
}

#[async_trait]
impl PipelineStage for ConvertStage {
    fn name(&self) -> &str {
        "Convert"
    }

    async fn count(&self) -> Result<u64, PipelineError> {
        Ok(self.repo.count_conversion_candidates(&self.table).await?)
    }

    async fn run(
        &self,
        event_tx: &mpsc::Sender<PipelineEvent>,
    ) -> Result<StageReport, PipelineError> {
        let rows = self.repo.conversion_candidates(&self.table).await?;

        let succeeded = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(AtomicUsize::new(0));
        let skipped = Arc::new(AtomicUsize::new(0));

        {
            let repo = self.repo.clone();
            let table = self.table.clone();
            let requester = self.requester.clone();
            let system_prompt = self.system_prompt.clone();
            let stage_name = self.name().to_string();
            let event_tx = event_tx.clone();
            let succeeded = succeeded.clone();
            let failed = failed.clone();
            let skipped = skipped.clone();

            run_workers(rows, self.workers, move |row| {
                let repo = repo.clone();
                let table = table.clone();
                let requester = requester.clone();
                let system_prompt = system_prompt.clone();
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

                    let source = row
                        .input_file_content_without_sql_comments
                        .as_deref()
                        .unwrap_or_default();
                    let update = requester.request(&system_prompt, source).await;

                    match repo
                        .record_conversion(
                            &table,
                            row.input_file_number,
                            requester.endpoint_name(),
                            &update,
                        )
                        .await
                    {
                        Ok(true) => {}
                        Ok(false) => {
                            skipped.fetch_add(1, Ordering::Relaxed);
                            let _ = event_tx
                                .send(PipelineEvent::ItemSkipped {
                                    stage: stage_name,
                                    item_id,
                                })
                                .await;
                            return Ok(());
                        }
                        Err(e) => {
                            warn!("Failed to store conversion for #{}: {}", item_id, e);
                            return Err(PipelineError::from(e));
                        }
                    }

                    let event = match update.error {
                        Some(error) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                            PipelineEvent::ItemFailed {
                                stage: stage_name,
                                item_id,
                                error,
                            }
                        }
                        None => {
                            succeeded.fetch_add(1, Ordering::Relaxed);
                            PipelineEvent::ItemCompleted {
                                stage: stage_name,
                                item_id,
                                detail: update.token_count.map(|n| format!("{} tokens", n)),
                            }
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
