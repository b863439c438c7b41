use std::path::Path;
use std::process;

use remedy_engine::Planner;
use remedy_interchange::ExecutionPlan;

use crate::batch::read_batch;
use crate::config::RemedyConfig;
use crate::{print_json, report_error, OutputFormat};

pub(crate) fn cmd_plan(batch_path: &Path, config: &RemedyConfig, output: OutputFormat, quiet: bool) {
    let batch = match read_batch(batch_path) {
        Ok(b) => b,
        Err(e) => {
            report_error(&e, output, quiet);
            process::exit(1);
        }
    };

    let plan = match Planner::default().create_plan(&batch.entity_id, batch.actions, &config.planner)
    {
        Ok(p) => p,
        Err(e) => {
            report_error(&format!("planning failed: {}", e), output, quiet);
            process::exit(1);
        }
    };

    match output {
        OutputFormat::Json => print_json(&plan),
        OutputFormat::Text => {
            if !quiet {
                print_plan(&plan);
            }
        }
    }
}

pub(crate) fn print_plan(plan: &ExecutionPlan) {
    println!("Plan {} for {}", plan.plan_id, plan.entity_id);
    println!(
        "  {} action(s), risk {}, est. {} ms{}",
        plan.summary.total_actions,
        plan.summary.risk_level,
        plan.summary.estimated_duration,
        if plan.safety.requires_confirmation {
            ", confirmation required"
        } else {
            ""
        }
    );
    for (i, action) in plan.actions.iter().enumerate() {
        println!(
            "  {:>3}. {} {} {}/{} (priority {})",
            i + 1,
            action.id,
            action.action_type,
            action.target.resource_type,
            action.target.entity_id,
            action.priority()
        );
    }
    if !plan.dropped_actions.is_empty() {
        println!("  dropped: {}", plan.dropped_actions.join(", "));
    }
    println!(
        "  rollback: {} action(s)",
        plan.safety.rollback_plan.len()
    );
}
