//! Job exports: JSON dump, replayable bash script, CSV.

use std::fmt;
use std::str::FromStr;

use remedy_interchange::{Job, JobStatus};
use serde::Serialize;

use crate::route::{request_body, route_for};

/// Environment variable the generated script reads the API root from.
pub const API_BASE_VAR: &str = "REMEDY_API_BASE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Script,
    Csv,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Script => "script",
            ExportFormat::Csv => "csv",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "script" | "sh" | "bash" => Ok(ExportFormat::Script),
            "csv" => Ok(ExportFormat::Csv),
            _ => Err(ExportError::UnknownFormat(s.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("unknown export format '{0}' (expected json, script or csv)")]
    UnknownFormat(String),

    #[error("failed to serialize jobs: {0}")]
    Json(#[from] serde_json::Error),

    #[error("job '{job}': {field} contains a control character and cannot go into a script")]
    UnsafeField { job: String, field: &'static str },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonExport<'a> {
    total_jobs: usize,
    total_actions: usize,
    jobs: &'a [Job],
}

pub fn export_jobs(jobs: &[Job], format: ExportFormat) -> Result<String, ExportError> {
    match format {
        ExportFormat::Json => Ok(serde_json::to_string_pretty(&JsonExport {
            total_jobs: jobs.len(),
            total_actions: jobs.iter().map(|j| j.actions.len()).sum(),
            jobs,
        })?),
        ExportFormat::Script => to_script(jobs),
        ExportFormat::Csv => Ok(to_csv(jobs)),
    }
}

// ── Script ──────────────────────────────────────────────────────────────────

/// One `curl` per action of every job that was not cancelled.
///
/// Ids and targets end up in comments, URLs and headers, so any control
/// character in them is refused. Free-text reasons are flattened instead.
fn to_script(jobs: &[Job]) -> Result<String, ExportError> {
    let live: Vec<&Job> = jobs
        .iter()
        .filter(|j| j.status != JobStatus::Cancelled)
        .collect();
    let action_count: usize = live.iter().map(|j| j.actions.len()).sum();

    let mut out = String::new();
    out.push_str("#!/usr/bin/env bash\n");
    out.push_str(&format!(
        "# remedy export: {} job(s), {} action(s)\n",
        live.len(),
        action_count
    ));
    out.push_str("set -euo pipefail\n");
    out.push_str(&format!(
        ": \"${{{var}:?set {var} to the API root}}\"\n",
        var = API_BASE_VAR
    ));

    for job in live {
        check_plain(job, "job id", &job.id)?;
        check_plain(job, "entityId", &job.entity_id)?;
        out.push_str(&format!(
            "\n# job {} entity {} ({}, priority {})\n",
            job.id, job.entity_id, job.status, job.priority
        ));
        for action in &job.actions {
            check_plain(job, "action id", &action.id)?;
            let target = &action.target;
            check_plain(job, "target.entityId", &target.entity_id)?;
            check_plain(job, "target.resourceType", &target.resource_type)?;
            check_plain(job, "target.resourceId", target.resource_id.as_deref().unwrap_or(""))?;
            let route = route_for(action);
            let mut line = format!(
                "curl -sS --fail -X {} \"${}\"{}",
                route.method,
                API_BASE_VAR,
                shell_quote(&route.path)
            );
            line.push_str(&format!(
                " -H {}",
                shell_quote(&format!(
                    "Idempotency-Key: {}:{}",
                    action.target.entity_id, action.id
                ))
            ));
            if let Some(body) = request_body(action) {
                line.push_str(" -H 'Content-Type: application/json'");
                line.push_str(&format!(" -d {}", shell_quote(&body.to_string())));
            }
            out.push_str(&format!(
                "# {}: {}\n",
                action.id,
                one_line(&action.metadata.reason)
            ));
            out.push_str(&line);
            out.push('\n');
        }
    }
    Ok(out)
}

fn check_plain(job: &Job, field: &'static str, value: &str) -> Result<(), ExportError> {
    if value.chars().any(char::is_control) {
        return Err(ExportError::UnsafeField {
            job: job.id.escape_debug().to_string(),
            field,
        });
    }
    Ok(())
}

/// Single-quote for POSIX shells.
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Text safe inside a `#` comment: control characters would end it.
fn one_line(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

// ── CSV ─────────────────────────────────────────────────────────────────────

const CSV_HEADER: &str = "job_id,entity_id,job_status,job_priority,action_id,action_type,resource_type,resource_id,priority,reason";

/// One row per action.
fn to_csv(jobs: &[Job]) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');
    for job in jobs {
        for action in &job.actions {
            let priority = action.priority().to_string();
            let job_priority = job.priority.to_string();
            let fields = [
                job.id.as_str(),
                job.entity_id.as_str(),
                job.status.as_str(),
                job_priority.as_str(),
                action.id.as_str(),
                action.action_type.as_str(),
                action.target.resource_type.as_str(),
                action.target.resource_id.as_deref().unwrap_or(""),
                priority.as_str(),
                action.metadata.reason.as_str(),
            ];
            let row: Vec<String> = fields.iter().map(|f| csv_field(f)).collect();
            out.push_str(&row.join(","));
            out.push('\n');
        }
    }
    out
}

fn csv_field(s: &str) -> String {
    if s.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use remedy_interchange::{ActionSpec, ActionType};
    use serde_json::{json, Map};
    use time::macros::datetime;

    fn job(id: &str, status: JobStatus, actions: Vec<ActionSpec>) -> Job {
        Job {
            id: id.into(),
            entity_id: "int-1".into(),
            actions,
            status,
            priority: 5,
            operator_id: "ops".into(),
            environment: "staging".into(),
            created_at: datetime!(2026-07-01 00:00 UTC),
            updated_at: datetime!(2026-07-01 00:00 UTC),
            metadata: Map::new(),
            report: None,
        }
    }

    fn patch(id: &str) -> ActionSpec {
        ActionSpec::new(id, ActionType::Patch, "int-1", "integration", 4)
            .with_payload(Some(json!("a")), Some(json!("it's")))
            .with_reason("owner, missing")
    }

    #[test]
    fn parses_formats() {
        assert_eq!("JSON".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert_eq!("sh".parse::<ExportFormat>().unwrap(), ExportFormat::Script);
        assert!("xml".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn json_export_counts() {
        let jobs = vec![job("job-1", JobStatus::Queued, vec![patch("a"), patch("b")])];
        let out = export_jobs(&jobs, ExportFormat::Json).unwrap();
        let v: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["totalJobs"], 1);
        assert_eq!(v["totalActions"], 2);
        assert_eq!(v["jobs"][0]["id"], "job-1");
    }

    #[test]
    fn script_has_one_curl_per_action_and_skips_cancelled() {
        let jobs = vec![
            job("job-1", JobStatus::Queued, vec![patch("a"), patch("b")]),
            job("job-2", JobStatus::Cancelled, vec![patch("c")]),
        ];
        let out = export_jobs(&jobs, ExportFormat::Script).unwrap();
        assert!(out.starts_with("#!/usr/bin/env bash\n"));
        assert_eq!(out.matches("\ncurl ").count(), 2);
        assert!(out.contains("-X PATCH \"$REMEDY_API_BASE\"'/integration/int-1'"));
        assert!(out.contains(r#"-d '{"value":"it'\''s"}'"#));
        assert!(!out.contains("job-2"));
    }

    #[test]
    fn script_refuses_control_characters_in_ids() {
        let mut hostile = job("job-1", JobStatus::Queued, vec![patch("a")]);
        hostile.entity_id = "int-1\ntouch /tmp/owned #".into();
        let err = export_jobs(&[hostile], ExportFormat::Script).unwrap_err();
        assert!(matches!(
            err,
            ExportError::UnsafeField { field: "entityId", .. }
        ));

        let hostile = job("job-2", JobStatus::Queued, vec![patch("a\nrm -rf ~ #")]);
        let err = export_jobs(&[hostile], ExportFormat::Script).unwrap_err();
        assert!(err.to_string().contains("action id"), "got {err}");

        // JSON and CSV escape their own fields.
        let mut odd = job("job-3", JobStatus::Queued, vec![patch("a")]);
        odd.entity_id = "int-1\nx".into();
        assert!(export_jobs(&[odd.clone()], ExportFormat::Json).is_ok());
        assert!(export_jobs(&[odd], ExportFormat::Csv).is_ok());
    }

    #[test]
    fn script_flattens_multiline_reasons() {
        let action = patch("a").with_reason("line one\nrm -rf ~");
        let out = export_jobs(
            &[job("job-1", JobStatus::Queued, vec![action])],
            ExportFormat::Script,
        )
        .unwrap();
        assert!(out.contains("# a: line one rm -rf ~\n"));
        let runnable: Vec<&str> = out
            .lines()
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .collect();
        assert_eq!(runnable.len(), 3, "{runnable:?}");
        assert!(runnable[2].starts_with("curl "));
    }

    #[test]
    fn csv_quotes_fields() {
        let jobs = vec![job("job-1", JobStatus::Completed, vec![patch("a")])];
        let out = export_jobs(&jobs, ExportFormat::Csv).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(
            lines[1],
            "job-1,int-1,Completed,5,a,Patch,integration,,4,\"owner, missing\""
        );
    }
}
