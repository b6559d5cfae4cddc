//! Terminal output for runs and observed state

use colored::{ColoredString, Colorize};
use sitelock_cloud::site::ObservedResource;
use sitelock_cloud::{ActionType, Outputs, ResourceStatus, RunFailure, RunReport};

fn action_mark(action: ActionType) -> ColoredString {
    match action {
        ActionType::Create => "+".green().bold(),
        ActionType::Update => "~".yellow().bold(),
        ActionType::Delete => "-".red().bold(),
        ActionType::NoOp => "=".dimmed(),
    }
}

fn print_outputs(outputs: &Outputs) {
    if outputs.is_empty() {
        return;
    }
    println!();
    println!("{}", "出力:".bold());
    for (key, value) in outputs.iter() {
        println!("  {}: {}", key, value.cyan());
    }
}

pub fn print_report(report: &RunReport) {
    println!();
    for step in &report.steps {
        println!(
            "  {} {} {}",
            "✓".green(),
            step.step,
            format!("({} ms)", step.duration_ms).dimmed()
        );
        for action in &step.actions {
            println!(
                "      {} {} {}",
                action_mark(action.action),
                action.resource,
                format!("[{}]", action.action).dimmed()
            );
        }
    }

    print_outputs(&report.outputs);

    println!();
    if report.has_changes() {
        println!("{} {}", "✓ 完了:".green().bold(), report.summary());
    } else {
        println!("{}", "✓ 変更はありません (すでに最新の状態です)".green().bold());
    }
    println!("  {}", format!("run {}", report.run_id).dimmed());
}

pub fn print_failure(failure: &RunFailure) {
    eprintln!();
    eprintln!(
        "{}",
        format!("✗ ステップ '{}' が失敗しました", failure.step).red().bold()
    );
    if let Some(resource) = &failure.resource {
        eprintln!("  リソース: {}", resource.yellow());
    }
    eprintln!("  エラー: {}", failure.error);

    if failure.completed.is_empty() {
        eprintln!("  完了したステップ: (なし)");
    } else {
        eprintln!("  完了したステップ: {}", failure.completed.join(", "));
    }
    if !failure.outputs.is_empty() {
        eprintln!("  取得済みの出力:");
        for (key, value) in failure.outputs.iter() {
            eprintln!("    {}: {}", key, value);
        }
    }

    eprintln!();
    if failure.is_timeout() {
        eprintln!(
            "{}",
            "リモートの状態が収束しませんでした。状態を確認してから再実行してください。".yellow()
        );
    } else {
        eprintln!(
            "{}",
            "作成済みのリソースはそのまま残ります。原因を解消して再実行すると続きから収束します。"
                .yellow()
        );
    }
    eprintln!("  {}", format!("run {}", failure.run_id).dimmed());
}

fn status_label(status: ResourceStatus) -> ColoredString {
    match status {
        ResourceStatus::Deployed => "deployed".green(),
        ResourceStatus::Pending => "pending".yellow(),
        ResourceStatus::Error => "error".red().bold(),
        ResourceStatus::Absent => "absent".dimmed(),
    }
}

pub fn print_observed(observed: &[ObservedResource]) {
    for entry in observed {
        match &entry.state {
            Some(state) => {
                let remote = state
                    .remote_status
                    .as_deref()
                    .map(|s| format!(" ({})", s))
                    .unwrap_or_default();
                let id = state.id.as_deref().unwrap_or("-");
                println!(
                    "  {} {} {}{}",
                    status_label(state.status),
                    entry.resource,
                    id.dimmed(),
                    remote.dimmed()
                );
            }
            None => println!("  {} {}", status_label(ResourceStatus::Absent), entry.resource),
        }
    }
}
