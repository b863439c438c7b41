use std::path::PathBuf;
use std::process;

use remedy_engine::{ExportFormat, JobQueueService, JobRequest};
use remedy_interchange::{Job, JobStatus};
use serde_json::{json, Map};

use crate::batch::{build_executor, read_batch};
use crate::config::RemedyConfig;
use crate::{print_json, report_error, OutputFormat};

pub(crate) struct QueueArgs<'a> {
    pub batches: &'a [PathBuf],
    pub dry_run: bool,
    pub export: Option<ExportFormat>,
    pub operator: &'a str,
    pub environment: &'a str,
}

pub(crate) async fn cmd_queue(
    args: QueueArgs<'_>,
    config: &RemedyConfig,
    output: OutputFormat,
    quiet: bool,
) {
    let mut options = config.queue.clone();
    options.dry_run |= args.dry_run;

    // Exporting never runs anything, so it needs no API configuration.
    let executor = match build_executor(config, options.dry_run || args.export.is_some()) {
        Ok(e) => e,
        Err(e) => {
            report_error(&e, output, quiet);
            process::exit(1);
        }
    };
    let service = JobQueueService::new(executor, options);

    for path in args.batches {
        let batch = match read_batch(path) {
            Ok(b) => b,
            Err(e) => {
                report_error(&e, output, quiet);
                process::exit(1);
            }
        };
        let priority = batch
            .actions
            .iter()
            .map(|a| a.priority())
            .max()
            .unwrap_or_default();
        let mut metadata = Map::new();
        metadata.insert("source".into(), json!(path.display().to_string()));
        metadata.insert("issueCount".into(), json!(batch.issues.len()));
        let id = service.submit_job(
            JobRequest::new(batch.entity_id, batch.actions)
                .priority(priority)
                .operator(args.operator)
                .environment(args.environment)
                .metadata(metadata),
        );
        tracing::debug!(job_id = %id, source = %path.display(), "job submitted");
    }

    if let Some(format) = args.export {
        match service.export(format) {
            Ok(text) => print!("{}", text),
            Err(e) => {
                report_error(&format!("export failed: {}", e), output, quiet);
                process::exit(1);
            }
        }
        return;
    }

    service.drain().await;

    let jobs = service.list_jobs();
    let stats = service.execution_stats();
    match output {
        OutputFormat::Json => print_json(&json!({
            "stats": stats,
            "jobs": jobs,
        })),
        OutputFormat::Text => {
            if !quiet {
                for job in &jobs {
                    print_job(job);
                }
                let summary: Vec<String> = stats
                    .by_status
                    .iter()
                    .map(|(status, n)| format!("{} {}", n, status))
                    .collect();
                println!("{} job(s): {}", stats.total_jobs, summary.join(", "));
            }
        }
    }

    if jobs.iter().any(|j| j.status == JobStatus::Failed) {
        process::exit(1);
    }
}

fn print_job(job: &Job) {
    let (executed, failed) = job
        .report
        .as_ref()
        .map_or((0, 0), |r| (r.executed.len(), r.failed.len()));
    println!(
        "{} {} [{}] {} executed, {} failed",
        job.id, job.entity_id, job.status, executed, failed
    );
    if let Some(report) = &job.report {
        for failure in &report.failed {
            println!(
                "  {} after {} attempt(s): {}",
                failure.action_id, failure.attempts, failure.error
            );
        }
    }
}
