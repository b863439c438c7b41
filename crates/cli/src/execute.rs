use std::path::Path;
use std::process;

use remedy_engine::{execute_plan, issue_signature, Planner, ProcessingContext, SystemClock};
use remedy_interchange::{ExecutionResult, ExecutionStatus, IdGenerator, UuidIds};
use remedy_storage::ProcessingStatus;
use serde_json::json;

use crate::batch::{build_executor, hours, open_ledger, read_batch};
use crate::config::RemedyConfig;
use crate::plan::print_plan;
use crate::{print_json, report_error, OutputFormat};

pub(crate) struct ExecuteArgs<'a> {
    pub batch: &'a Path,
    pub dry_run: bool,
    pub yes: bool,
    pub allow_destructive: bool,
    pub force: bool,
    pub operator: &'a str,
}

pub(crate) async fn cmd_execute(
    args: ExecuteArgs<'_>,
    config: &RemedyConfig,
    output: OutputFormat,
    quiet: bool,
) {
    let batch = match read_batch(args.batch) {
        Ok(b) => b,
        Err(e) => {
            report_error(&e, output, quiet);
            process::exit(1);
        }
    };
    let ledger = match open_ledger(config).await {
        Ok(l) => l,
        Err(e) => {
            report_error(&e, output, quiet);
            process::exit(1);
        }
    };

    // Step 1: idempotence gate
    let signature = issue_signature(&batch.issues);
    let max_age = match hours(config.ledger.max_age_hours) {
        Ok(age) => age,
        Err(e) => {
            report_error(&format!("invalid [ledger] max_age_hours: {}", e), output, quiet);
            process::exit(1);
        }
    };
    if !args.force
        && ledger
            .is_already_processed(&batch.entity_id, &signature, max_age)
            .await
    {
        match output {
            OutputFormat::Json => print_json(&json!({
                "entityId": batch.entity_id,
                "skipped": true,
                "reason": "already processed",
            })),
            OutputFormat::Text => {
                if !quiet {
                    println!(
                        "{}: already processed within {}h with the same issues, skipping (use --force to rerun)",
                        batch.entity_id, config.ledger.max_age_hours
                    );
                }
            }
        }
        return;
    }

    // Step 2: plan
    let plan = match Planner::default().create_plan(
        &batch.entity_id,
        batch.actions.clone(),
        &config.planner,
    ) {
        Ok(p) => p,
        Err(e) => {
            report_error(&format!("planning failed: {}", e), output, quiet);
            process::exit(1);
        }
    };
    if output == OutputFormat::Text && !quiet {
        print_plan(&plan);
    }

    // Step 3: execute
    let dry_run = args.dry_run || config.execution.dry_run;
    let executor = match build_executor(config, dry_run) {
        Ok(e) => e,
        Err(e) => {
            report_error(&e, output, quiet);
            process::exit(1);
        }
    };
    let mut options = config.execution.clone();
    options.dry_run = dry_run;
    options.safety.confirmed = args.yes;
    options.safety.allow_destructive |= args.allow_destructive;

    let result = match execute_plan(&plan, executor.as_ref(), &options, &SystemClock).await {
        Ok(r) => r,
        Err(e) => {
            report_error(&format!("preflight failed: {}", e), output, quiet);
            process::exit(1);
        }
    };

    // Step 4: record, unless simulated
    if !dry_run {
        let status = match result.status {
            ExecutionStatus::Success => ProcessingStatus::Remediated,
            ExecutionStatus::Cancelled => ProcessingStatus::Skipped,
            ExecutionStatus::Partial | ExecutionStatus::Failed => ProcessingStatus::Failed,
        };
        let context = ProcessingContext {
            operator_id: args.operator.to_string(),
            session_id: UuidIds.next_id("session"),
        };
        if let Err(e) = ledger
            .record_processing(
                &batch.entity_id,
                &batch.issues,
                &batch.actions,
                &context,
                status,
            )
            .await
        {
            tracing::error!(entity_id = %batch.entity_id, error = %e, "failed to record processing");
            report_error(&format!("failed to update ledger: {}", e), output, quiet);
        }
    }

    match output {
        OutputFormat::Json => print_json(&result),
        OutputFormat::Text => {
            if !quiet {
                print_result(&result);
            }
        }
    }
    if result.status == ExecutionStatus::Failed {
        process::exit(1);
    }
}

fn print_result(result: &ExecutionResult) {
    println!(
        "{:?}{}: {} executed, {} failed, {} skipped",
        result.status,
        if result.dry_run { " (dry run)" } else { "" },
        result.executed.len(),
        result.failed.len(),
        result.skipped.len()
    );
    for failed in &result.failed {
        println!(
            "  failed {} after {} attempt(s): {}",
            failed.action.id, failed.attempts, failed.error
        );
    }
    for skipped in &result.skipped {
        println!("  skipped {}: {}", skipped.action.id, skipped.reason);
    }
    if let Some(rollback) = &result.rollback {
        println!(
            "  rollback plan available: {} action(s)",
            rollback.actions.len()
        );
    }
}
