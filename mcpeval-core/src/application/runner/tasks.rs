use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::info;

use super::errors::RunnerError;
use crate::domain::Task;

/// Read a task file: a JSON array, an object with a `tasks` array, or JSON Lines.
///
/// Numeric ids are turned into strings and tasks without one are named
/// `task_<n>` after their 1-based position. Duplicate ids are rejected.
pub fn load_tasks(path: &Path) -> Result<Vec<Task>, RunnerError> {
    let content = fs::read_to_string(path).map_err(|source| {
        if source.kind() == ErrorKind::NotFound {
            RunnerError::TasksNotFound {
                path: path.to_path_buf(),
            }
        } else {
            RunnerError::TasksIo {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;

    let raw = parse_documents(path, &content)?;
    let mut seen = HashSet::new();
    let mut tasks = Vec::with_capacity(raw.len());

    for (index, (line, value)) in raw.into_iter().enumerate() {
        let value = normalize_id(value, index + 1);
        let task: Task = serde_json::from_value(value).map_err(|source| RunnerError::TasksParse {
            path: path.to_path_buf(),
            line,
            source,
        })?;
        if !seen.insert(task.id.clone()) {
            return Err(RunnerError::DuplicateTask { id: task.id });
        }
        tasks.push(task);
    }

    info!(path = %path.display(), tasks = tasks.len(), "Loaded tasks");
    Ok(tasks)
}

/// Each task value paired with its JSONL line number, when it came from one.
fn parse_documents(path: &Path, content: &str) -> Result<Vec<(Option<usize>, Value)>, RunnerError> {
    let trimmed = content.trim_start();
    if trimmed.starts_with('[') || trimmed.starts_with('{') {
        if let Ok(document) = serde_json::from_str::<Value>(content) {
            let items = match document {
                Value::Array(items) => items,
                Value::Object(mut object) if object.get("tasks").is_some_and(Value::is_array) => {
                    match object.remove("tasks") {
                        Some(Value::Array(items)) => items,
                        _ => Vec::new(),
                    }
                }
                single @ Value::Object(_) => vec![single],
                _ => Vec::new(),
            };
            return Ok(items.into_iter().map(|value| (None, value)).collect());
        }
    }

    let mut items = Vec::new();
    for (index, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let value = serde_json::from_str(line).map_err(|source| RunnerError::TasksParse {
            path: path.to_path_buf(),
            line: Some(index + 1),
            source,
        })?;
        items.push((Some(index + 1), value));
    }
    Ok(items)
}

fn normalize_id(mut value: Value, position: usize) -> Value {
    if let Value::Object(object) = &mut value {
        let key = if object.contains_key("id") { "id" } else { "task_id" };
        let id = match object.remove(key) {
            Some(Value::String(id)) if !id.trim().is_empty() => id,
            Some(Value::Number(number)) => number.to_string(),
            _ => format!("task_{position}"),
        };
        object.insert("id".to_string(), Value::String(id));
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(content.as_bytes()).expect("write");
        file
    }

    #[test]
    fn reads_array_of_tasks() {
        let file = write(
            r#"[{"id":"w1","description":"Weather in Paris","goal":"umbrella?"},
                {"id":2,"description":"Book a hotel"}]"#,
        );
        let tasks = load_tasks(file.path()).expect("load");
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].goal.as_deref(), Some("umbrella?"));
        assert_eq!(tasks[1].id, "2");
    }

    #[test]
    fn reads_wrapped_tasks_and_fills_missing_ids() {
        let file = write(
            r#"{"tasks":[{"description":"first"},{"task_id":"named","task_description":"second"}]}"#,
        );
        let tasks = load_tasks(file.path()).expect("load");
        assert_eq!(tasks[0].id, "task_1");
        assert_eq!(tasks[1].id, "named");
        assert_eq!(tasks[1].description, "second");
    }

    #[test]
    fn reads_json_lines_and_reports_bad_line() {
        let good = write("{\"id\":\"a\",\"description\":\"x\"}\n\n{\"id\":\"b\",\"description\":\"y\"}\n");
        assert_eq!(load_tasks(good.path()).expect("load").len(), 2);

        let bad = write("{\"id\":\"a\",\"description\":\"x\"}\n{\"id\":\"b\",\n");
        let err = load_tasks(bad.path()).unwrap_err();
        assert!(matches!(err, RunnerError::TasksParse { line: Some(2), .. }));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let file = write(r#"[{"id":"a","description":"x"},{"id":"a","description":"y"}]"#);
        let err = load_tasks(file.path()).unwrap_err();
        assert!(matches!(err, RunnerError::DuplicateTask { ref id } if id == "a"));
    }

    #[test]
    fn missing_file_is_reported() {
        let err = load_tasks(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, RunnerError::TasksNotFound { .. }));
    }
}
