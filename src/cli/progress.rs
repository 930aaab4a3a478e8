//! Terminal rendering of pipeline events.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::pipeline::PipelineEvent;

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓░")
}

/// Spawn a task that draws a progress bar per stage.
///
/// Drop the returned sender and await the handle to flush the output.
pub fn spawn_renderer() -> (mpsc::Sender<PipelineEvent>, JoinHandle<()>) {
    let (event_tx, mut event_rx) = mpsc::channel::<PipelineEvent>(100);

    let handle = tokio::spawn(async move {
        let mut bar: Option<ProgressBar> = None;

        while let Some(event) = event_rx.recv().await {
            match event {
                PipelineEvent::RunStateChanged { state } => {
                    println!("{} Pipeline {}", style("→").dim(), state);
                }
                PipelineEvent::StageStarted { stage, total_items } => {
                    println!(
                        "{} {}: {} rows eligible",
                        style("→").cyan(),
                        stage,
                        total_items
                    );
                    if total_items > 0 {
                        let progress = ProgressBar::new(total_items);
                        progress.set_style(bar_style());
                        progress.set_message(format!("{}...", stage));
                        bar = Some(progress);
                    }
                }
                PipelineEvent::ItemStarted { label, .. } => {
                    if let Some(ref progress) = bar {
                        progress.set_message(label);
                    }
                }
                PipelineEvent::ItemCompleted { .. } | PipelineEvent::ItemSkipped { .. } => {
                    if let Some(ref progress) = bar {
                        progress.inc(1);
                    }
                }
                PipelineEvent::ItemFailed { item_id, error, .. } => {
                    let line = format!("  {} File {}: {}", style("✗").red(), item_id, error);
                    match bar {
                        Some(ref progress) => {
                            progress.suspend(|| eprintln!("{}", line));
                            progress.inc(1);
                        }
                        None => eprintln!("{}", line),
                    }
                }
                PipelineEvent::StageCompleted {
                    stage,
                    succeeded,
                    failed,
                    skipped,
                    remaining,
                } => {
                    if let Some(progress) = bar.take() {
                        progress.finish_and_clear();
                    }
                    println!(
                        "{} {} complete: {} succeeded, {} failed, {} skipped",
                        style("✓").green(),
                        stage,
                        succeeded,
                        failed,
                        skipped
                    );
                    if remaining > 0 {
                        println!("  {} {} rows still eligible", style("!").yellow(), remaining);
                    }
                }
            }
        }

        if let Some(progress) = bar {
            progress.finish_and_clear();
        }
    });

    (event_tx, handle)
}
