//! Orchestrator: sequences the stages and drives the validate/fix loop.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::info;

use super::{
    drive_stage, AnalyzeStage, ConvertStage, ExportStage, FixStage, PipelineError, PipelineEvent,
    Requester, ValidateStage,
};
use crate::analysis::{Analyzer, AnalysisError, TokenCounter};
use crate::config::{ConfigError, PipelineConfig};
use crate::export::ExportResult;
use crate::llm::prompts::{conversion_system_prompt, fix_system_prompt};
use crate::llm::ChatEndpoint;
use crate::models::{ResultTable, ResultTableName, TableCensus};
use crate::repository::{ConversionRepository, DbContext};

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Analyzing,
    Converting,
    Validating { attempt: usize },
    Fixing { attempt: usize },
    FinalValidating,
    Exporting,
    Done,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Analyzing => write!(f, "analyzing"),
            Self::Converting => write!(f, "converting"),
            Self::Validating { attempt } => write!(f, "validating (attempt {})", attempt),
            Self::Fixing { attempt } => write!(f, "fixing (attempt {})", attempt),
            Self::FinalValidating => write!(f, "final validation"),
            Self::Exporting => write!(f, "exporting"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// End state of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub result_table: String,
    pub validator_runs: usize,
    pub fixer_runs: usize,
    /// Targets still erroring after the final validation
    pub erroring_rows: u64,
    pub census: TableCensus,
    pub exports: Vec<ExportResult>,
}

/// Runs analysis, conversion, the validate/fix loop, a final validation and
/// export against one result table.
pub struct Orchestrator {
    config: PipelineConfig,
    ctx: DbContext,
    converter: Arc<dyn ChatEndpoint>,
    fixer: Arc<dyn ChatEndpoint>,
    counter: Option<Arc<TokenCounter>>,
}

impl Orchestrator {
    pub fn new(
        config: PipelineConfig,
        ctx: DbContext,
        converter: Arc<dyn ChatEndpoint>,
        fixer: Arc<dyn ChatEndpoint>,
    ) -> Self {
        Self {
            config,
            ctx,
            converter,
            fixer,
            counter: None,
        }
    }

    /// Reuse an already loaded tokenizer.
    pub fn with_token_counter(mut self, counter: Arc<TokenCounter>) -> Self {
        self.counter = Some(counter);
        self
    }

    pub async fn run(
        &self,
        event_tx: mpsc::Sender<PipelineEvent>,
    ) -> Result<RunSummary, PipelineError> {
        let config = &self.config;
        config.validate_for_run()?;
        self.ctx.init_schema().await?;
        let repo = self.ctx.conversions();

        let counter = match &self.counter {
            Some(counter) => counter.clone(),
            None => Arc::new(TokenCounter::new().map_err(AnalysisError::Tokenizer)?),
        };

        let table = match &config.existing_result_table {
            Some(name) => {
                let table = resolve_existing_table(&repo, name).await?;
                info!("Reusing result table {}", table.name);
                table
            }
            None => {
                self.enter(RunState::Analyzing, &event_tx).await;
                let input_dir = config.require_input_dir()?.to_path_buf();
                let name = ResultTableName::new_timestamped(
                    &config.result_catalog,
                    &config.result_schema,
                    &config.result_table_prefix,
                    Utc::now(),
                );
                let analyzer = Arc::new(Analyzer::with_counter(
                    counter.clone(),
                    config.token_count_threshold,
                ));
                let stage = AnalyzeStage::new(repo.clone(), analyzer, input_dir, name);
                drive_stage(&stage, &event_tx).await?;
                stage.table().clone()
            }
        };
        let table_name = table.name.to_string();

        let conversion_prompt = conversion_system_prompt(config.sql_dialect, config.comment_lang);
        let fix_prompt = fix_system_prompt(config.comment_lang);
        let params = config.llm.request_params.clone();
        let timeout = config.request_timeout();

        self.enter(RunState::Converting, &event_tx).await;
        let convert = ConvertStage::new(
            repo.clone(),
            &table_name,
            Requester::new(self.converter.clone(), params.clone(), timeout, counter.clone()),
            conversion_prompt.clone(),
            config.workers,
        );
        drive_stage(&convert, &event_tx).await?;

        let validate = ValidateStage::new(repo.clone(), &table_name, config.workers);
        let fix = FixStage::new(
            repo.clone(),
            &table_name,
            Requester::new(self.fixer.clone(), params, timeout, counter),
            conversion_prompt,
            fix_prompt,
            config.workers,
        );

        let mut validator_runs = 0;
        let mut fixer_runs = 0;
        for attempt in 1..=config.max_fix_attempts {
            self.enter(RunState::Validating { attempt }, &event_tx).await;
            drive_stage(&validate, &event_tx).await?;
            validator_runs += 1;

            let erroring = repo.count_erroring(&table_name).await?;
            if erroring == 0 {
                info!("No erroring rows after attempt {}", attempt);
                break;
            }

            self.enter(RunState::Fixing { attempt }, &event_tx).await;
            info!("Fix attempt {}: {} erroring rows", attempt, erroring);
            drive_stage(&fix, &event_tx).await?;
            fixer_runs += 1;
        }

        self.enter(RunState::FinalValidating, &event_tx).await;
        drive_stage(&validate, &event_tx).await?;
        validator_runs += 1;
        let erroring_rows = repo.count_erroring(&table_name).await?;

        self.enter(RunState::Exporting, &event_tx).await;
        let output_dir = config.require_output_dir()?.to_path_buf();
        let export = ExportStage::new(
            repo.clone(),
            &table_name,
            PathBuf::from(&table.input_dir),
            output_dir,
        );
        drive_stage(&export, &event_tx).await?;
        let exports = export.take_results().await;

        let census = TableCensus::from_records(&repo.get_all(&table_name).await?);
        self.enter(RunState::Done, &event_tx).await;

        Ok(RunSummary {
            result_table: table_name,
            validator_runs,
            fixer_runs,
            erroring_rows,
            census,
            exports,
        })
    }

    async fn enter(&self, state: RunState, event_tx: &mpsc::Sender<PipelineEvent>) {
        info!("Pipeline {}", state);
        let _ = event_tx
            .send(PipelineEvent::RunStateChanged { state })
            .await;
    }
}

/// Look up a table given as `existing_result_table`. Unknown names are fatal.
pub async fn resolve_existing_table(
    repo: &ConversionRepository,
    name: &ResultTableName,
) -> Result<ResultTable, PipelineError> {
    let full_name = name.to_string();
    repo.get_table(&full_name)
        .await?
        .ok_or_else(|| ConfigError::UnknownResultTable(full_name).into())
}
