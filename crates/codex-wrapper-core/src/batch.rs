//! Batch config grammar.
//!
//! A batch is a concatenation of task blocks separated by the literal
//! `---TASK---` line. Each block is a `key: value` metadata section, the
//! literal `---CONTENT---` line, and the prompt body:
//!
//! ```text
//! ---TASK---
//! id: build
//! workdir: ./svc
//! dependencies: fmt, lint
//! ---CONTENT---
//! Run the build and fix anything that breaks.
//! ```
//!
//! Recognized metadata keys are `id` (required), `workdir`, `dependencies`
//! (comma-separated) and `session_id` (switches the task to resume mode).
//! Unknown keys and malformed metadata lines are ignored.

use crate::error::CoreError;
use crate::task::TaskSpec;

const TASK_SEPARATOR: &str = "---TASK---";
const CONTENT_SEPARATOR: &str = "---CONTENT---";

/// Parse a raw batch config into an ordered list of task specs.
pub fn parse_batch(input: &str) -> Result<Vec<TaskSpec>, CoreError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(CoreError::EmptyConfig);
    }

    let mut tasks: Vec<TaskSpec> = Vec::new();
    let mut seen: Vec<String> = Vec::new();

    for block in trimmed.split(TASK_SEPARATOR) {
        let block = block.trim();
        if block.is_empty() {
            continue;
        }

        let (meta, content) = block
            .split_once(CONTENT_SEPARATOR)
            .ok_or(CoreError::MissingContentSeparator)?;
        let content = content.trim();

        let mut task = TaskSpec::new("");
        for line in meta.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();

            match key.trim() {
                "id" => task.id = value.to_string(),
                "workdir" => task.workdir = value.to_string(),
                "session_id" => task.session_id = Some(value.to_string()),
                "dependencies" => {
                    task.dependencies = value
                        .split(',')
                        .map(str::trim)
                        .filter(|dep| !dep.is_empty())
                        .map(str::to_string)
                        .collect();
                }
                _ => {}
            }
        }

        if task.id.is_empty() {
            return Err(CoreError::MissingTaskId);
        }
        if content.is_empty() {
            return Err(CoreError::EmptyTaskContent { id: task.id });
        }
        if seen.contains(&task.id) {
            return Err(CoreError::DuplicateTaskId(task.id));
        }

        seen.push(task.id.clone());
        task.task = content.to_string();
        tasks.push(task);
    }

    if tasks.is_empty() {
        return Err(CoreError::NoTasks);
    }

    Ok(tasks)
}

/// Render specs back into the batch grammar.
///
/// `parse_batch(&render_batch(&specs))` yields the same list for any specs
/// that came out of the parser.
pub fn render_batch(specs: &[TaskSpec]) -> String {
    let mut out = String::new();

    for spec in specs {
        out.push_str(TASK_SEPARATOR);
        out.push('\n');
        out.push_str("id: ");
        out.push_str(&spec.id);
        out.push('\n');
        out.push_str("workdir: ");
        out.push_str(&spec.workdir);
        out.push('\n');
        if !spec.dependencies.is_empty() {
            out.push_str("dependencies: ");
            out.push_str(&spec.dependencies.join(", "));
            out.push('\n');
        }
        if let Some(session_id) = &spec.session_id {
            out.push_str("session_id: ");
            out.push_str(session_id);
            out.push('\n');
        }
        out.push_str(CONTENT_SEPARATOR);
        out.push('\n');
        out.push_str(spec.task.trim());
        out.push('\n');
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::DEFAULT_WORKDIR;

    #[test]
    fn test_parse_single_task() {
        let input = "---TASK---\nid: alpha\n---CONTENT---\nDo a thing\n";
        let tasks = parse_batch(input).unwrap();

        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, "alpha");
        assert_eq!(tasks[0].task, "Do a thing");
        assert_eq!(tasks[0].workdir, DEFAULT_WORKDIR);
        assert!(tasks[0].dependencies.is_empty());
        assert!(!tasks[0].is_resume());
    }

    #[test]
    fn test_parse_full_metadata() {
        let input = "\
---TASK---
id: deploy
workdir: /srv/app
dependencies: build, test
session_id: thread-9
---CONTENT---
Ship it.
";
        let tasks = parse_batch(input).unwrap();

        assert_eq!(tasks[0].workdir, "/srv/app");
        assert_eq!(tasks[0].dependencies, vec!["build", "test"]);
        assert_eq!(tasks[0].session_id.as_deref(), Some("thread-9"));
        assert!(tasks[0].is_resume());
    }

    #[test]
    fn test_parse_preserves_order() {
        let input = "\
---TASK---
id: b
---CONTENT---
second declared first
---TASK---
id: a
---CONTENT---
first declared second
";
        let tasks = parse_batch(input).unwrap();
        let ids: Vec<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn test_multiline_content_with_metacharacters() {
        let input = "---TASK---\nid: tricky\n---CONTENT---\nline one\nline two with \"quotes\" and $vars\n";
        let tasks = parse_batch(input).unwrap();
        assert_eq!(
            tasks[0].task,
            "line one\nline two with \"quotes\" and $vars"
        );
    }

    #[test]
    fn test_unknown_keys_and_junk_lines_ignored() {
        let input = "\
---TASK---
id: x
color: blue
this line has no colon
---CONTENT---
body
";
        let tasks = parse_batch(input).unwrap();
        assert_eq!(tasks[0].id, "x");
    }

    #[test]
    fn test_empty_dependency_entries_dropped() {
        let input = "---TASK---\nid: x\ndependencies: a, , b,\n---CONTENT---\nbody\n";
        let tasks = parse_batch(input).unwrap();
        assert_eq!(tasks[0].dependencies, vec!["a", "b"]);
    }

    #[test]
    fn test_error_empty_config() {
        assert_eq!(parse_batch("   \n\t "), Err(CoreError::EmptyConfig));
    }

    #[test]
    fn test_error_missing_content_separator() {
        let input = "---TASK---\nid: x\nno content marker\n";
        assert_eq!(parse_batch(input), Err(CoreError::MissingContentSeparator));
    }

    #[test]
    fn test_error_missing_id() {
        let input = "---TASK---\nworkdir: /tmp\n---CONTENT---\nbody\n";
        assert_eq!(parse_batch(input), Err(CoreError::MissingTaskId));
    }

    #[test]
    fn test_error_empty_content() {
        let input = "---TASK---\nid: x\n---CONTENT---\n   \n";
        assert_eq!(
            parse_batch(input),
            Err(CoreError::EmptyTaskContent { id: "x".to_string() })
        );
    }

    #[test]
    fn test_error_duplicate_id() {
        let input = "\
---TASK---
id: x
---CONTENT---
one
---TASK---
id: x
---CONTENT---
two
";
        assert_eq!(
            parse_batch(input),
            Err(CoreError::DuplicateTaskId("x".to_string()))
        );
    }

    #[test]
    fn test_round_trip() {
        let input = "\
---TASK---
id: build
workdir: ./svc
dependencies: fmt, lint
---CONTENT---
Run the build.
---TASK---
id: fmt
---CONTENT---
Format everything.
---TASK---
id: lint
session_id: thread-3
---CONTENT---
Lint it
with two lines.
";
        let first = parse_batch(input).unwrap();
        let rendered = render_batch(&first);
        let second = parse_batch(&rendered).unwrap();
        assert_eq!(first, second);
    }
}
