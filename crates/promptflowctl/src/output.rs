//! Terminal output formatting for flow results

use std::io::IsTerminal;

use promptflow_core::{FlowExecutionResult, NodeExecutionStatus};
use serde_json::Value;

/// ANSI color codes for terminal styling
pub mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";
    pub const RED: &str = "\x1b[31m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GRAY: &str = "\x1b[90m";
}

/// Unicode symbols for terminal output
pub mod symbols {
    pub const CHECK: &str = "✓";
    pub const CROSS: &str = "✗";
    pub const SKIP: &str = "↷";
    pub const STOP: &str = "■";
    pub const CIRCLE_EMPTY: &str = "○";
    pub const BOX_H: &str = "─";
}

use colors::*;
use symbols::*;

/// Text renderer for execution traces
pub struct TraceOutput {
    use_colors: bool,
}

impl Default for TraceOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceOutput {
    pub fn new() -> Self {
        Self {
            use_colors: std::io::stdout().is_terminal(),
        }
    }

    fn paint(&self, color: &str, text: &str) -> String {
        if self.use_colors {
            format!("{}{}{}", color, text, RESET)
        } else {
            text.to_string()
        }
    }

    fn status_marker(&self, status: NodeExecutionStatus) -> String {
        match status {
            NodeExecutionStatus::Completed => self.paint(GREEN, CHECK),
            NodeExecutionStatus::Failed => self.paint(RED, CROSS),
            NodeExecutionStatus::Skipped => self.paint(GRAY, SKIP),
            NodeExecutionStatus::Cancelled => self.paint(YELLOW, STOP),
            NodeExecutionStatus::Pending | NodeExecutionStatus::Running => {
                self.paint(DIM, CIRCLE_EMPTY)
            }
        }
    }

    pub fn section(&self, title: &str) {
        let line = BOX_H.repeat(40usize.saturating_sub(title.len() + 2));
        println!("{} {}", self.paint(BOLD, title), self.paint(CYAN, &line));
    }

    /// Print the per-node trace and the final output
    pub fn print_result(&self, flow_name: &str, result: &FlowExecutionResult) {
        self.section(&format!("Flow: {}", flow_name));
        println!("  Execution: {}", result.execution_id);

        for record in &result.node_executions {
            let status = format!("{:?}", record.status).to_lowercase();
            println!(
                "  {} {:<20} {:<12} {:<10} {}ms",
                self.status_marker(record.status),
                record.node_id,
                record.node_type.as_str(),
                status,
                record.duration_ms
            );
            if let Some(err) = &record.error {
                println!("      {}", self.paint(RED, err));
            }
        }

        println!();
        self.section("Output");
        println!("{}", render_value(&result.output));

        println!();
        let summary = format!(
            "{} in {}ms ({} completed, {} failed, {} skipped)",
            if result.success { "Succeeded" } else { "Failed" },
            result.execution_time_ms,
            result.count_status(NodeExecutionStatus::Completed),
            result.count_status(NodeExecutionStatus::Failed),
            result.count_status(NodeExecutionStatus::Skipped),
        );
        let color = if result.success { GREEN } else { RED };
        println!("{}", self.paint(color, &summary));
        if let Some(err) = &result.error {
            println!("{}", self.paint(RED, err));
        }
    }
}

/// Strings print raw; everything else as pretty JSON
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "(no output)".to_string(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_value() {
        assert_eq!(render_value(&json!("plain")), "plain");
        assert_eq!(render_value(&Value::Null), "(no output)");
        assert!(render_value(&json!({"a": 1})).contains("\"a\": 1"));
    }
}
