//! Consolidated batch report.

use std::fmt::Write;

use crate::task::TaskResult;

/// Render the plain-text summary for a finished batch.
///
/// Results are printed in the order given: a totals header followed by one
/// block per task with its status, optional session id, error line, and
/// final message body.
pub fn render_summary(results: &[TaskResult]) -> String {
    let success = results.iter().filter(|r| r.is_success()).count();
    let failed = results.len() - success;

    let mut out = String::new();
    out.push_str("=== Parallel Execution Summary ===\n");
    let _ = writeln!(
        out,
        "Total: {} | Success: {} | Failed: {}",
        results.len(),
        success,
        failed
    );
    out.push('\n');

    for res in results {
        let _ = writeln!(out, "--- Task: {} ---", res.task_id);
        if !res.error.is_empty() {
            let _ = writeln!(
                out,
                "Status: FAILED (exit code {})\nError: {}",
                res.exit_code, res.error
            );
        } else if res.exit_code != 0 {
            let _ = writeln!(out, "Status: FAILED (exit code {})", res.exit_code);
        } else {
            out.push_str("Status: SUCCESS\n");
        }
        if !res.session_id.is_empty() {
            let _ = writeln!(out, "Session: {}", res.session_id);
        }
        if !res.message.is_empty() {
            let _ = writeln!(out, "\n{}", res.message);
        }
        out.push('\n');
    }

    out
}

/// Exit code for the whole batch: the last non-zero task exit code, or zero.
pub fn final_exit_code(results: &[TaskResult]) -> i32 {
    results
        .iter()
        .filter(|r| r.exit_code != 0)
        .map(|r| r.exit_code)
        .last()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_totals() {
        let results = vec![
            TaskResult::success("a", "done", "sess-a"),
            TaskResult::failure("b", 2, "exploded"),
        ];
        let report = render_summary(&results);

        assert!(report.starts_with("=== Parallel Execution Summary ===\n"));
        assert!(report.contains("Total: 2 | Success: 1 | Failed: 1"));
    }

    #[test]
    fn test_success_block() {
        let results = vec![TaskResult::success("a", "all good", "sess-a")];
        let report = render_summary(&results);

        assert!(report.contains("--- Task: a ---\nStatus: SUCCESS\nSession: sess-a\n\nall good\n"));
    }

    #[test]
    fn test_failure_block_includes_error_and_code() {
        let results = vec![TaskResult::failure("b", 124, "codex execution timeout")];
        let report = render_summary(&results);

        assert!(report.contains("Status: FAILED (exit code 124)"));
        assert!(report.contains("Error: codex execution timeout"));
    }

    #[test]
    fn test_nonzero_exit_without_error_still_failed() {
        let mut res = TaskResult::success("c", "", "");
        res.exit_code = 3;
        res.message = "partial".to_string();
        let report = render_summary(&[res]);

        assert!(report.contains("Status: FAILED (exit code 3)"));
        assert!(!report.contains("Error:"));
        assert!(report.contains("\npartial\n"));
    }

    #[test]
    fn test_final_exit_code_last_nonzero_wins() {
        let results = vec![
            TaskResult::failure("a", 2, "x"),
            TaskResult::success("b", "ok", ""),
            TaskResult::failure("c", 124, "y"),
        ];
        assert_eq!(final_exit_code(&results), 124);
    }

    #[test]
    fn test_final_exit_code_all_success() {
        let results = vec![TaskResult::success("a", "ok", "")];
        assert_eq!(final_exit_code(&results), 0);
    }
}
