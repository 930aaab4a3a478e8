//! End-to-end runs of the orchestrator against a scripted endpoint.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::{tempdir, TempDir};
use tokio::sync::mpsc;

use sqlport::analysis::TokenCounter;
use sqlport::config::{ConfigFile, PipelineConfig};
use sqlport::export::TOKEN_LIMIT_ERROR;
use sqlport::llm::{ChatEndpoint, ChatRequest, ChatResponse, LlmError};
use sqlport::pipeline::{
    drive_stage, Orchestrator, PipelineEvent, RunState, RunSummary, ValidateStage,
};
use sqlport::repository::DbContext;

const CLEAN_REPLY: &str = "```python\n# Databricks notebook source\nspark.sql(\"SELECT id FROM t\")\n```";
const BROKEN_REPLY: &str = "```python\nif x\n    spark.sql(\"SELECT id FROM t\")\n```";
const SQL_ERROR_REPLY: &str = "```python\nspark.sql(\"SELEC id FROM t\")\n```";

enum Step {
    Reply(&'static str),
    Fail,
    Stall,
}

/// Endpoint that answers from a script, then keeps returning a clean program.
struct ScriptedEndpoint {
    script: Mutex<VecDeque<Step>>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<ChatRequest>>,
}

impl ScriptedEndpoint {
    fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(steps.into()),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatEndpoint for ScriptedEndpoint {
    fn name(&self) -> &str {
        "scripted-endpoint"
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(request.clone());
        let step = self.script.lock().unwrap().pop_front();
        match step.unwrap_or(Step::Reply(CLEAN_REPLY)) {
            Step::Reply(text) => Ok(ChatResponse {
                content: text.to_string(),
                completion_tokens: Some(12),
            }),
            Step::Fail => Err(LlmError::Api("503 Service Unavailable".into())),
            Step::Stall => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(ChatResponse {
                    content: CLEAN_REPLY.to_string(),
                    completion_tokens: None,
                })
            }
        }
    }
}

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new(files: &[(&str, &str)]) -> Self {
        let dir = tempdir().unwrap();
        for (name, body) in files {
            let path = dir.path().join("input").join(name);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, body).unwrap();
        }
        std::fs::create_dir_all(dir.path().join("input")).unwrap();
        Self { dir }
    }

    fn input(&self) -> PathBuf {
        self.dir.path().join("input")
    }

    fn output(&self) -> PathBuf {
        self.dir.path().join("output")
    }

    fn ctx(&self) -> DbContext {
        DbContext::from_path(&self.dir.path().join("store.db"))
    }

    fn config(&self, threshold: usize, max_fix_attempts: usize) -> PipelineConfig {
        PipelineConfig::resolve(ConfigFile {
            database: Some(self.dir.path().join("store.db")),
            input_dir: Some(self.input()),
            result_catalog: Some("cat".into()),
            result_schema: Some("sch".into()),
            token_count_threshold: Some(threshold),
            endpoint_name: Some("scripted-endpoint".into()),
            max_fix_attempts: Some(max_fix_attempts),
            output_dir: Some(self.output()),
            workers: Some(1),
            request_timeout_secs: Some(1),
            ..Default::default()
        })
        .unwrap()
    }
}

async fn run(
    config: PipelineConfig,
    ctx: DbContext,
    endpoint: Arc<ScriptedEndpoint>,
) -> (RunSummary, Vec<RunState>) {
    let (tx, mut rx) = mpsc::channel(64);
    let collector = tokio::spawn(async move {
        let mut states = Vec::new();
        while let Some(event) = rx.recv().await {
            if let PipelineEvent::RunStateChanged { state } = event {
                states.push(state);
            }
        }
        states
    });

    let counter = Arc::new(TokenCounter::new().unwrap());
    let summary = Orchestrator::new(config, ctx, endpoint.clone(), endpoint)
        .with_token_counter(counter)
        .run(tx)
        .await
        .unwrap();
    (summary, collector.await.unwrap())
}

#[tokio::test]
async fn test_clean_conversion_is_exported() {
    let ws = Workspace::new(&[("orders.sql", "-- daily orders\nSELECT id FROM orders;\n")]);
    let endpoint = ScriptedEndpoint::new(vec![Step::Reply(CLEAN_REPLY)]);

    let (summary, states) = run(ws.config(100, 1), ws.ctx(), endpoint.clone()).await;

    assert_eq!(endpoint.calls(), 1);
    // Comments are stripped before the request
    let prompts = endpoint.prompts.lock().unwrap();
    assert!(!prompts[0].user.contains("daily orders"));
    assert!(prompts[0].user.contains("SELECT id FROM orders;"));
    drop(prompts);

    assert_eq!(summary.validator_runs, 2);
    assert_eq!(summary.fixer_runs, 0);
    assert_eq!(summary.erroring_rows, 0);
    assert_eq!(summary.census.clean, 1);

    let rows = ws.ctx().conversions().get_all(&summary.result_table).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert!(!rows[0].is_conversion_target);
    assert_eq!(
        rows[0].model_serving_endpoint_for_conversion.as_deref(),
        Some("scripted-endpoint")
    );
    assert_eq!(rows[0].result_extracted_sqls.as_deref(), Some(&["SELECT id FROM t".to_string()][..]));

    assert_eq!(summary.exports.len(), 1);
    let export = &summary.exports[0];
    assert!(export.export_succeeded);
    assert_eq!(export.parse_error_count, 0);
    let notebook = std::fs::read_to_string(ws.output().join("orders.py")).unwrap();
    assert!(notebook.starts_with("# Databricks notebook source"));
    assert_eq!(notebook.matches("# Databricks notebook source").count(), 1);

    assert_eq!(states.first(), Some(&RunState::Analyzing));
    assert_eq!(states.last(), Some(&RunState::Done));
}

#[tokio::test]
async fn test_file_over_threshold_is_never_sent() {
    let big = "SELECT a, b, c, d, e, f, g FROM wide_table WHERE a = 1 AND b = 2;\n".repeat(20);
    let ws = Workspace::new(&[("big.sql", big.as_str()), ("small.sql", "SELECT 1;\n")]);
    let endpoint = ScriptedEndpoint::new(vec![]);

    let (summary, _) = run(ws.config(50, 1), ws.ctx(), endpoint.clone()).await;

    assert_eq!(endpoint.calls(), 1);
    assert_eq!(summary.census.over_threshold, 1);

    let rows = ws.ctx().conversions().get_all(&summary.result_table).await.unwrap();
    let big_row = rows.iter().find(|r| r.input_file_path.ends_with("big.sql")).unwrap();
    assert!(!big_row.is_conversion_target);
    assert!(big_row.result_content.is_none());
    assert!(big_row.result_error.is_none());

    // Every analyzed row gets exactly one export result
    assert_eq!(summary.exports.len(), 2);
    let big_export = summary
        .exports
        .iter()
        .find(|e| e.input_file_path.ends_with("big.sql"))
        .unwrap();
    assert!(!big_export.export_succeeded);
    assert!(big_export.output_file_path.is_none());
    assert_eq!(big_export.export_error.as_deref(), Some(TOKEN_LIMIT_ERROR));
    assert!(!ws.output().join("big.py").exists());
    assert!(ws.output().join("small.py").exists());
}

#[tokio::test]
async fn test_fix_loop_runs_until_clean() {
    let ws = Workspace::new(&[("report.sql", "SELECT id FROM t;\n")]);
    let endpoint = ScriptedEndpoint::new(vec![
        Step::Reply(BROKEN_REPLY),
        Step::Reply(BROKEN_REPLY),
        Step::Reply(CLEAN_REPLY),
    ]);

    let (summary, states) = run(ws.config(100, 2), ws.ctx(), endpoint.clone()).await;

    assert_eq!(endpoint.calls(), 3);
    assert_eq!(summary.validator_runs, 3);
    assert_eq!(summary.fixer_runs, 2);
    assert_eq!(summary.erroring_rows, 0);

    // Fix requests carry the previous program and its errors
    let prompts = endpoint.prompts.lock().unwrap();
    assert!(prompts[1].user.contains("if x"));
    drop(prompts);

    let rows = ws.ctx().conversions().get_all(&summary.result_table).await.unwrap();
    assert!(rows[0].is_clean());
    assert!(!rows[0].is_conversion_target);
    assert_eq!(
        rows[0].model_serving_endpoint_for_fix.as_deref(),
        Some("scripted-endpoint")
    );

    assert!(states.contains(&RunState::Fixing { attempt: 2 }));
    assert!(states.contains(&RunState::FinalValidating));
}

#[tokio::test]
async fn test_sql_error_is_fixed_within_attempts() {
    let ws = Workspace::new(&[("report.sql", "SELECT id FROM t;\n")]);
    let endpoint = ScriptedEndpoint::new(vec![
        Step::Reply(SQL_ERROR_REPLY),
        Step::Reply(SQL_ERROR_REPLY),
        Step::Reply(CLEAN_REPLY),
    ]);

    let (summary, _) = run(ws.config(100, 2), ws.ctx(), endpoint.clone()).await;

    assert_eq!(endpoint.calls(), 3);
    assert_eq!(summary.validator_runs, 3);
    assert_eq!(summary.fixer_runs, 2);
    assert_eq!(summary.erroring_rows, 0);

    let prompts = endpoint.prompts.lock().unwrap();
    assert!(prompts[1].user.contains("SELEC id FROM t"));
    assert!(prompts[1].user.contains("1. SqlParseError: SELEC id FROM t\nError: "));
    drop(prompts);

    let rows = ws.ctx().conversions().get_all(&summary.result_table).await.unwrap();
    assert!(rows[0].is_clean());
    assert_eq!(rows[0].result_sql_parse_errors.as_deref(), Some(&[][..]));
    assert_eq!(
        rows[0].result_extracted_sqls.as_deref(),
        Some(&["SELECT id FROM t".to_string()][..])
    );
    assert!(summary.exports[0].export_succeeded);
    assert_eq!(summary.exports[0].parse_error_count, 0);
}

#[tokio::test]
async fn test_unfixed_rows_export_with_error_cell() {
    let ws = Workspace::new(&[("report.sql", "SELECT id FROM t;\n")]);
    let endpoint = ScriptedEndpoint::new(vec![
        Step::Reply(BROKEN_REPLY),
        Step::Reply(BROKEN_REPLY),
    ]);

    let (summary, _) = run(ws.config(100, 1), ws.ctx(), endpoint.clone()).await;

    assert_eq!(summary.validator_runs, 2);
    assert_eq!(summary.fixer_runs, 1);
    assert_eq!(summary.erroring_rows, 1);

    let export = &summary.exports[0];
    assert!(export.export_succeeded);
    assert_eq!(export.parse_error_count, 1);
    let notebook = std::fs::read_to_string(ws.output().join("report.py")).unwrap();
    assert!(notebook.contains("# MAGIC %md"));
}

#[tokio::test]
async fn test_zero_fix_attempts_still_validates_once() {
    let ws = Workspace::new(&[("report.sql", "SELECT id FROM t;\n")]);
    let endpoint = ScriptedEndpoint::new(vec![Step::Reply(BROKEN_REPLY)]);

    let (summary, _) = run(ws.config(100, 0), ws.ctx(), endpoint.clone()).await;

    assert_eq!(endpoint.calls(), 1);
    assert_eq!(summary.validator_runs, 1);
    assert_eq!(summary.fixer_runs, 0);
    assert_eq!(summary.erroring_rows, 1);
}

#[tokio::test]
async fn test_endpoint_failures_become_row_errors() {
    let ws = Workspace::new(&[("a.sql", "SELECT 1;\n"), ("b.sql", "SELECT 2;\n")]);
    let endpoint = ScriptedEndpoint::new(vec![Step::Fail, Step::Stall]);

    let (summary, _) = run(ws.config(100, 0), ws.ctx(), endpoint.clone()).await;

    let rows = ws.ctx().conversions().get_all(&summary.result_table).await.unwrap();
    assert_eq!(rows.len(), 2);
    for row in &rows {
        assert!(row.result_content.is_none());
        let error = row.result_error.as_deref().unwrap();
        assert!(error.starts_with("EndpointError:"), "{}", error);
    }
    let timed_out = rows
        .iter()
        .filter(|r| r.result_error.as_deref().unwrap().contains("timed out"))
        .count();
    assert_eq!(timed_out, 1);
    assert_eq!(summary.erroring_rows, 2);

    for export in &summary.exports {
        assert!(!export.export_succeeded);
        assert!(export.export_error.as_deref().unwrap().starts_with("EndpointError:"));
    }
}

#[tokio::test]
async fn test_endpoint_failure_is_retried_by_fix() {
    let ws = Workspace::new(&[("a.sql", "SELECT 1;\n")]);
    let endpoint = ScriptedEndpoint::new(vec![Step::Fail, Step::Reply(CLEAN_REPLY)]);

    let (summary, _) = run(ws.config(100, 1), ws.ctx(), endpoint.clone()).await;

    assert_eq!(endpoint.calls(), 2);
    assert_eq!(summary.fixer_runs, 1);
    assert_eq!(summary.erroring_rows, 0);
    assert!(summary.exports[0].export_succeeded);
}

#[tokio::test]
async fn test_validation_is_idempotent() {
    let ws = Workspace::new(&[("a.sql", "SELECT 1;\n"), ("b.sql", "SELECT 2;\n")]);
    let endpoint = ScriptedEndpoint::new(vec![Step::Reply(BROKEN_REPLY), Step::Reply(CLEAN_REPLY)]);

    let (summary, _) = run(ws.config(100, 0), ws.ctx(), endpoint).await;
    let repo = ws.ctx().conversions();
    let before = repo.get_all(&summary.result_table).await.unwrap();

    let (tx, mut rx) = mpsc::channel(64);
    tokio::spawn(async move { while rx.recv().await.is_some() {} });
    let stage = ValidateStage::new(repo.clone(), &summary.result_table, 2);
    drive_stage(&stage, &tx).await.unwrap();

    let after = repo.get_all(&summary.result_table).await.unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_existing_table_skips_analysis() {
    let ws = Workspace::new(&[("a.sql", "SELECT 1;\n")]);
    let first = ScriptedEndpoint::new(vec![Step::Fail]);
    let (summary, _) = run(ws.config(100, 0), ws.ctx(), first).await;

    let mut config = ws.config(100, 1);
    config.input_dir = None;
    config.existing_result_table = sqlport::models::ResultTableName::parse(&summary.result_table);
    let second = ScriptedEndpoint::new(vec![]);
    let (again, states) = run(config, ws.ctx(), second.clone()).await;

    assert_eq!(again.result_table, summary.result_table);
    assert!(!states.contains(&RunState::Analyzing));
    // The row left without content is converted again
    assert_eq!(second.calls(), 1);
    assert_eq!(again.erroring_rows, 0);
    assert!(ws.output().join("a.py").is_file());
}
