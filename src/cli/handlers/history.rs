//! Execution history handler

use crate::cli::output::print_info;
use crate::cli::output::truncate_str;
use crate::database::Database;
use crate::models::ExecutionStatus;
use crate::AppConfig;
use crate::Result;

pub async fn handle_history(config: &AppConfig, limit: i64) -> Result<()> {
    let database = Database::from_config(config).await?;
    let executions = database.recent_executions(limit).await?;

    if executions.is_empty() {
        print_info("No executions recorded yet");
        return Ok(());
    }

    println!("📋 Last {} executions:", executions.len());
    println!("{}", "-".repeat(80));

    for summary in executions {
        let icon = match summary.status {
            ExecutionStatus::Success => "✅",
            ExecutionStatus::Failed => "❌",
            ExecutionStatus::Partial => "⚠️",
            ExecutionStatus::Running => "🔄",
        };
        let duration = summary
            .duration_secs
            .map_or_else(|| "-".to_string(), |d| format!("{d:.2}s"));

        println!("{icon} {} ({})", summary.mode.to_uppercase(), summary.status);
        println!(
            "   ├── ID: {}... | {}",
            &summary.execution_id.to_string()[..8],
            summary.started_at.format("%Y-%m-%d %H:%M:%S")
        );
        println!(
            "   ├── Duration: {duration} | Records: {} | API success: {:.1}%",
            summary.records_processed(),
            summary.api_success_rate()
        );
        match &summary.error_message {
            Some(error) => println!("   └── Error: {}", truncate_str(error, 60)),
            None => println!(
                "   └── {} inserted, {} updated, {} unchanged",
                summary.records_inserted, summary.records_updated, summary.records_unchanged
            ),
        }
        println!();
    }

    Ok(())
}
