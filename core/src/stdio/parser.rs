use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::error::TaskInputError;
use crate::runner::TaskSpec;

pub const TASK_MARKER: &str = "---TASK---";
pub const CONTENT_MARKER: &str = "---CONTENT---";

/// Parse the parallel-mode task list.
///
/// Blocks are delimited by `---TASK---` at line start; the header ends at
/// the literal `---CONTENT---` line and the body runs to the next block or
/// EOF. Unknown header keys are ignored; blocks with an empty id or empty
/// content are discarded. Duplicate ids and unknown dependency references
/// fail here, before anything is scheduled.
pub fn parse_task_blocks(input: &str) -> Result<Vec<TaskSpec>, TaskInputError> {
    let mut tasks: Vec<TaskSpec> = Vec::new();
    let mut lines = input.lines().peekable();

    while let Some(line) = lines.next() {
        if line.trim() != TASK_MARKER {
            continue;
        }

        let mut header: HashMap<String, String> = HashMap::new();
        let mut saw_content_marker = false;

        for line in lines.by_ref() {
            let trimmed = line.trim();
            if trimmed == CONTENT_MARKER {
                saw_content_marker = true;
                break;
            }
            if trimmed.is_empty() {
                continue;
            }
            if let Some((key, value)) = trimmed.split_once(':') {
                header.insert(key.trim().to_lowercase(), value.trim().to_string());
            }
        }

        if !saw_content_marker {
            return Err(TaskInputError::MissingContentMarker);
        }

        let mut body: Vec<&str> = Vec::new();
        while let Some(line) = lines.next_if(|l| l.trim() != TASK_MARKER) {
            body.push(line);
        }
        while body.last().map(|l| l.trim().is_empty()).unwrap_or(false) {
            body.pop();
        }
        let content = body.join("\n");

        let id = header.get("id").cloned().unwrap_or_default();
        if id.is_empty() || content.trim().is_empty() {
            debug!("discarding task block with empty id or content");
            continue;
        }
        validate_id(&id)?;

        let mut spec = TaskSpec::new(id, content);
        spec.work_dir = header
            .get("workdir")
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);
        spec.session_id = header.get("session_id").filter(|s| !s.is_empty()).cloned();
        spec.backend = header.get("backend").filter(|s| !s.is_empty()).cloned();
        spec.model = header.get("model").filter(|s| !s.is_empty()).cloned();
        spec.agent = header.get("agent").filter(|s| !s.is_empty()).cloned();
        spec.dependencies = header
            .get("dependencies")
            .map(|s| split_csv(s))
            .unwrap_or_default();
        spec.skip_permissions = parse_bool(header.get("skip_permissions"), "skip_permissions")?;

        tasks.push(spec);
    }

    validate_references(&tasks)?;
    Ok(tasks)
}

fn split_csv(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(value: Option<&String>, field: &'static str) -> Result<bool, TaskInputError> {
    match value.map(|s| s.trim().to_lowercase()) {
        None => Ok(false),
        Some(v) if v == "true" => Ok(true),
        Some(v) if v == "false" || v.is_empty() => Ok(false),
        Some(v) => Err(TaskInputError::InvalidValue { field, value: v }),
    }
}

fn validate_id(id: &str) -> Result<(), TaskInputError> {
    static ID_RE: OnceLock<Regex> = OnceLock::new();
    let re = ID_RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.\-]{0,127}$").unwrap());
    if re.is_match(id) {
        Ok(())
    } else {
        Err(TaskInputError::InvalidId(id.to_string()))
    }
}

fn validate_references(tasks: &[TaskSpec]) -> Result<(), TaskInputError> {
    let mut ids: HashSet<&str> = HashSet::with_capacity(tasks.len());
    for task in tasks {
        if !ids.insert(&task.id) {
            return Err(TaskInputError::DuplicateId(task.id.clone()));
        }
    }
    for task in tasks {
        for dep in &task.dependencies {
            if !ids.contains(dep.as_str()) {
                return Err(TaskInputError::UnknownDependency {
                    task: task.id.clone(),
                    dep: dep.clone(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_block_with_multiline_content() {
        let input = "\
---TASK---
id: t1
workdir: /tmp
---CONTENT---
line one
line two
";
        let tasks = parse_task_blocks(input).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, "t1");
        assert_eq!(tasks[0].task, "line one\nline two");
        assert_eq!(tasks[0].work_dir.as_deref(), Some(std::path::Path::new("/tmp")));
    }

    #[test]
    fn all_header_keys_are_parsed() {
        let input = "\
---TASK---
id: full
workdir: /work
session_id: sess-9
backend: claude
model: sonnet
agent: reviewer
dependencies: a, b , c
skip_permissions: true
---CONTENT---
body
---TASK---
id: a
---CONTENT---
x
---TASK---
id: b
---CONTENT---
y
---TASK---
id: c
---CONTENT---
z
";
        let tasks = parse_task_blocks(input).unwrap();
        let full = &tasks[0];
        assert_eq!(full.session_id.as_deref(), Some("sess-9"));
        assert_eq!(full.backend.as_deref(), Some("claude"));
        assert_eq!(full.model.as_deref(), Some("sonnet"));
        assert_eq!(full.agent.as_deref(), Some("reviewer"));
        assert_eq!(full.dependencies, vec!["a", "b", "c"]);
        assert!(full.skip_permissions);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let input = "\
---TASK---
id: t
color: purple
priority: 9
---CONTENT---
body
";
        let tasks = parse_task_blocks(input).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].task, "body");
    }

    #[test]
    fn empty_id_or_content_blocks_are_discarded() {
        let input = "\
---TASK---
---CONTENT---
has content but no id
---TASK---
id: empty-body
---CONTENT---

---TASK---
id: keeper
---CONTENT---
kept
";
        let tasks = parse_task_blocks(input).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, "keeper");
    }

    #[test]
    fn body_runs_to_next_marker_or_eof() {
        let input = "\
---TASK---
id: first
---CONTENT---
first body
---TASK---
id: second
---CONTENT---
second body
last line";
        let tasks = parse_task_blocks(input).unwrap();
        assert_eq!(tasks[0].task, "first body");
        assert_eq!(tasks[1].task, "second body\nlast line");
    }

    #[test]
    fn missing_content_marker_is_an_error() {
        let input = "\
---TASK---
id: broken
";
        assert!(matches!(
            parse_task_blocks(input),
            Err(TaskInputError::MissingContentMarker)
        ));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let input = "\
---TASK---
id: t
---CONTENT---
a
---TASK---
id: t
---CONTENT---
b
";
        assert!(matches!(
            parse_task_blocks(input),
            Err(TaskInputError::DuplicateId(id)) if id == "t"
        ));
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let input = "\
---TASK---
id: t
dependencies: ghost
---CONTENT---
a
";
        assert!(matches!(
            parse_task_blocks(input),
            Err(TaskInputError::UnknownDependency { dep, .. }) if dep == "ghost"
        ));
    }

    #[test]
    fn bad_id_shape_is_rejected() {
        let input = "\
---TASK---
id: has spaces
---CONTENT---
a
";
        assert!(matches!(
            parse_task_blocks(input),
            Err(TaskInputError::InvalidId(_))
        ));
    }

    #[test]
    fn bad_skip_permissions_value_is_rejected() {
        let input = "\
---TASK---
id: t
skip_permissions: maybe
---CONTENT---
a
";
        assert!(matches!(
            parse_task_blocks(input),
            Err(TaskInputError::InvalidValue { field, .. }) if field == "skip_permissions"
        ));
    }

    #[test]
    fn input_without_blocks_is_an_empty_list() {
        assert!(parse_task_blocks("").unwrap().is_empty());
        assert!(parse_task_blocks("just some text\n").unwrap().is_empty());
    }
}
