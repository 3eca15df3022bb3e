//! Console output helpers

pub fn print_info(message: &str) {
    println!("ℹ️  {message}");
}

pub fn print_success(message: &str) {
    println!("✅ {message}");
}

pub fn print_error(message: &str) {
    eprintln!("❌ {message}");
}

/// Truncate a string for single-line display.
#[must_use]
pub fn truncate_str(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_chars).collect();
        format!("{truncated}...")
    }
}

/// Print the closing summary of one execution, original-report style.
pub fn print_execution_summary(summary: &crate::models::ExecutionSummary) {
    println!();
    println!("📊 Execution summary");
    println!(
        "   🆔 {} | {} | {}",
        summary.execution_id, summary.mode, summary.status
    );
    if let Some(duration) = summary.duration_secs {
        println!("   ⏱️  Duration: {duration:.2}s");
    }
    if summary.api_requests > 0 {
        println!(
            "   🌐 API: {} requests, {:.1}% success, {:.2}s total",
            summary.api_requests,
            summary.api_success_rate(),
            summary.api_time_secs
        );
    }
    println!(
        "   💾 Records: {} fetched, {} inserted, {} updated, {} unchanged ({} batches)",
        summary.records_fetched,
        summary.records_inserted,
        summary.records_updated,
        summary.records_unchanged,
        summary.batches_committed
    );
    if let Some(error) = &summary.error_message {
        println!("   ❌ Error: {}", truncate_str(error, 120));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_long_strings() {
        assert_eq!(truncate_str("short", 10), "short");
        assert_eq!(truncate_str("abcdefghij", 5), "abcde...");
    }
}
