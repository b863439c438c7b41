use std::process;

use remedy_engine::{issue_signature, Ledger, LedgerSnapshot};
use remedy_storage::{ProcessedRecord, TimeRange};
use serde_json::json;
use time::OffsetDateTime;

use crate::batch::{hours, open_ledger, read_batch};
use crate::config::RemedyConfig;
use crate::{print_json, report_error, LedgerCommands, OutputFormat};

pub(crate) async fn cmd_ledger(
    command: LedgerCommands,
    config: &RemedyConfig,
    output: OutputFormat,
    quiet: bool,
) {
    let ledger = match open_ledger(config).await {
        Ok(l) => l,
        Err(e) => {
            report_error(&e, output, quiet);
            process::exit(1);
        }
    };
    let result = match command {
        LedgerCommands::Check { batch } => check(&ledger, &batch, config, output, quiet).await,
        LedgerCommands::Stats { since_hours } => stats(&ledger, since_hours, output, quiet).await,
        LedgerCommands::Stale { max_age_hours } => {
            let age = max_age_hours.unwrap_or(config.ledger.max_age_hours);
            stale(&ledger, age, output, quiet).await
        }
        LedgerCommands::Cleanup { older_than_hours } => {
            cleanup(&ledger, older_than_hours, output, quiet).await
        }
        LedgerCommands::Export { out } => export(&ledger, out.as_deref(), quiet).await,
        LedgerCommands::Import { file } => import(&ledger, &file, output, quiet).await,
    };
    if let Err(e) = result {
        report_error(&e, output, quiet);
        process::exit(1);
    }
}

async fn check(
    ledger: &Ledger,
    batch_path: &std::path::Path,
    config: &RemedyConfig,
    output: OutputFormat,
    quiet: bool,
) -> Result<(), String> {
    let batch = read_batch(batch_path)?;
    let signature = issue_signature(&batch.issues);
    let processed = ledger
        .is_already_processed(
            &batch.entity_id,
            &signature,
            hours(config.ledger.max_age_hours)?,
        )
        .await;
    let record = ledger
        .get(&batch.entity_id)
        .await
        .map_err(|e| e.to_string())?;
    match output {
        OutputFormat::Json => print_json(&json!({
            "entityId": batch.entity_id,
            "issueSignature": signature,
            "alreadyProcessed": processed,
            "record": record,
        })),
        OutputFormat::Text => {
            if !quiet {
                let verdict = if processed {
                    "already processed"
                } else {
                    "needs processing"
                };
                println!("{}: {}", batch.entity_id, verdict);
                if let Some(record) = &record {
                    print_record(record);
                }
            }
        }
    }
    Ok(())
}

async fn stats(
    ledger: &Ledger,
    since_hours: Option<i64>,
    output: OutputFormat,
    quiet: bool,
) -> Result<(), String> {
    let range = match since_hours {
        Some(h) => Some(TimeRange {
            from: OffsetDateTime::now_utc().checked_sub(hours(h)?),
            to: None,
        }),
        None => None,
    };
    let stats = ledger
        .processing_stats(range)
        .await
        .map_err(|e| e.to_string())?;
    match output {
        OutputFormat::Json => print_json(&stats),
        OutputFormat::Text => {
            if !quiet {
                println!("{} entities", stats.total);
                for (status, n) in &stats.by_status {
                    println!("  {:<10} {}", status, n);
                }
                println!(
                    "  {} issue(s), {} action(s) recorded",
                    stats.total_issues, stats.total_actions
                );
            }
        }
    }
    Ok(())
}

async fn stale(ledger: &Ledger, age: i64, output: OutputFormat, quiet: bool) -> Result<(), String> {
    let rows = ledger
        .stale_integrations(hours(age)?)
        .await
        .map_err(|e| e.to_string())?;
    match output {
        OutputFormat::Json => print_json(&rows),
        OutputFormat::Text => {
            if !quiet {
                println!("{} stale entities (older than {}h or failed)", rows.len(), age);
                for row in &rows {
                    print_record(row);
                }
            }
        }
    }
    Ok(())
}

async fn cleanup(
    ledger: &Ledger,
    age: i64,
    output: OutputFormat,
    quiet: bool,
) -> Result<(), String> {
    let removed = ledger
        .cleanup(hours(age)?)
        .await
        .map_err(|e| e.to_string())?;
    match output {
        OutputFormat::Json => print_json(&json!({ "removed": removed })),
        OutputFormat::Text => {
            if !quiet {
                println!("removed {} record(s)", removed);
            }
        }
    }
    Ok(())
}

async fn export(ledger: &Ledger, out: Option<&std::path::Path>, quiet: bool) -> Result<(), String> {
    let snapshot = ledger.export_state().await.map_err(|e| e.to_string())?;
    let json = serde_json::to_string_pretty(&snapshot).map_err(|e| e.to_string())?;
    match out {
        Some(path) => {
            std::fs::write(path, json)
                .map_err(|e| format!("error writing '{}': {}", path.display(), e))?;
            if !quiet {
                eprintln!(
                    "exported {} record(s) to {}",
                    snapshot.records.len(),
                    path.display()
                );
            }
        }
        None => println!("{}", json),
    }
    Ok(())
}

async fn import(
    ledger: &Ledger,
    file: &std::path::Path,
    output: OutputFormat,
    quiet: bool,
) -> Result<(), String> {
    let content = std::fs::read_to_string(file)
        .map_err(|e| format!("error reading file '{}': {}", file.display(), e))?;
    let snapshot: LedgerSnapshot = serde_json::from_str(&content)
        .map_err(|e| format!("error parsing snapshot '{}': {}", file.display(), e))?;
    let written = ledger
        .import_state(snapshot)
        .await
        .map_err(|e| e.to_string())?;
    match output {
        OutputFormat::Json => print_json(&json!({ "imported": written })),
        OutputFormat::Text => {
            if !quiet {
                println!("imported {} record(s)", written);
            }
        }
    }
    Ok(())
}

fn print_record(record: &ProcessedRecord) {
    println!(
        "  {} {} at {} by {} ({} issue(s), {} action(s))",
        record.entity_id,
        record.status,
        record.last_processed_at,
        record.operator_id,
        record.issue_count,
        record.action_count
    );
}
