//! Conversion pipeline: stages and the orchestrator that sequences them.
//!
//! Every stage selects its rows from the result store with a fresh query at
//! the start of `run`, processes them independently, and writes each outcome
//! back to its own row. Row-level failures are recorded, never raised; only
//! store and configuration errors stop a stage.

mod analyze;
mod convert;
mod export;
mod fix;
mod orchestrator;
mod request;
mod validate;

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};

use crate::analysis::AnalysisError;
use crate::config::ConfigError;
use crate::repository::DbError;

pub use analyze::AnalyzeStage;
pub use convert::ConvertStage;
pub use export::ExportStage;
pub use fix::FixStage;
pub use orchestrator::{resolve_existing_table, Orchestrator, RunState, RunSummary};
pub use request::Requester;
pub use validate::ValidateStage;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Store error: {0}")]
    Store(#[from] DbError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),
    #[error("Result table already exists: {0}")]
    TableExists(String),
    #[error("Pipeline worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// Progress events emitted by stages.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    RunStateChanged {
        state: RunState,
    },
    StageStarted {
        stage: String,
        total_items: u64,
    },
    ItemStarted {
        stage: String,
        item_id: String,
        label: String,
    },
    ItemCompleted {
        stage: String,
        item_id: String,
        detail: Option<String>,
    },
    ItemSkipped {
        stage: String,
        item_id: String,
    },
    ItemFailed {
        stage: String,
        item_id: String,
        error: String,
    },
    StageCompleted {
        stage: String,
        succeeded: usize,
        failed: usize,
        skipped: usize,
        remaining: u64,
    },
}

/// Outcome counts of one stage invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageReport {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// A self-contained stage over one result table.
#[async_trait]
pub trait PipelineStage: Send + Sync {
    /// Human-readable name for progress output.
    fn name(&self) -> &str;

    /// Count rows currently eligible for this stage.
    async fn count(&self) -> Result<u64, PipelineError>;

    /// Rows still eligible after a run. Defaults to a fresh `count`.
    async fn remaining(&self) -> Result<u64, PipelineError> {
        self.count().await
    }

    /// Process every eligible row once.
    async fn run(
        &self,
        event_tx: &mpsc::Sender<PipelineEvent>,
    ) -> Result<StageReport, PipelineError>;
}

/// Run a stage to completion, bracketing it with start and completion events.
pub async fn drive_stage(
    stage: &dyn PipelineStage,
    event_tx: &mpsc::Sender<PipelineEvent>,
) -> Result<StageReport, PipelineError> {
    let total = stage.count().await?;
    let _ = event_tx
        .send(PipelineEvent::StageStarted {
            stage: stage.name().to_string(),
            total_items: total,
        })
        .await;

    let report = stage.run(event_tx).await?;

    let remaining = stage.remaining().await?;
    let _ = event_tx
        .send(PipelineEvent::StageCompleted {
            stage: stage.name().to_string(),
            succeeded: report.succeeded,
            failed: report.failed,
            skipped: report.skipped,
            remaining,
        })
        .await;

    Ok(report)
}

/// Run `work` over `items` on `workers` tasks pulling from a shared queue.
///
/// Each item is handed to exactly one worker. The first error stops all
/// workers from taking further items and is returned once they finish. A
/// worker that panics fails the whole run, since the items it held are lost.
pub(crate) async fn run_workers<T, E, F, Fut>(items: Vec<T>, workers: usize, work: F) -> Result<(), E>
where
    T: Send + 'static,
    E: From<tokio::task::JoinError> + Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
{
    // Reversed so pop() hands items out in selection order
    let queue = Arc::new(Mutex::new(items.into_iter().rev().collect::<Vec<_>>()));
    let first_error: Arc<Mutex<Option<E>>> = Arc::new(Mutex::new(None));
    let work = Arc::new(work);

    let mut handles = Vec::with_capacity(workers.max(1));
    for _ in 0..workers.max(1) {
        let queue = queue.clone();
        let first_error = first_error.clone();
        let work = work.clone();
        handles.push(tokio::spawn(async move {
            loop {
                if first_error.lock().await.is_some() {
                    break;
                }
                let item = queue.lock().await.pop();
                let Some(item) = item else { break };
                if let Err(e) = work(item).await {
                    first_error.lock().await.get_or_insert(e);
                    break;
                }
            }
        }));
    }

    let mut panicked = None;
    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!("Pipeline worker panicked: {}", e);
            panicked.get_or_insert(e);
        }
    }

    if let Some(e) = first_error.lock().await.take() {
        return Err(e);
    }
    match panicked {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}
