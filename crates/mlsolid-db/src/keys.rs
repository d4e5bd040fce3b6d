//! Metadata key-space
//!
//! Every key written by the repository is built here. The layout is read by
//! other tools and must stay stable:
//!
//! | Key                         | Type   | Holds                              |
//! |-----------------------------|--------|------------------------------------|
//! | `run:<id>`                  | hash   | Name, Timestamp, ExperimentID      |
//! | `exp:<id>`                  | set    | run ids                            |
//! | `metric:<name>:<runId>`     | stream | entries with Name, Val             |
//! | `artifact:<name>:<runId>`   | hash   | Name, ContentType, ObjectKey       |
//! | `info:registry:<name>`      | hash   | Name, CreatedAt                    |
//! | `registry:<name>`           | list   | JSON model entries, newest first   |
//! | `tag:registry:<name>`       | set    | tags in use                        |
//! | `tag:registry:<name>:<tag>` | list   | versions, newest first             |

pub const RUN_NAME: &str = "Name";
pub const RUN_TIMESTAMP: &str = "Timestamp";
pub const RUN_EXPERIMENT: &str = "ExperimentID";

pub const METRIC_NAME: &str = "Name";
pub const METRIC_VAL: &str = "Val";

pub const ARTIFACT_NAME: &str = "Name";
pub const ARTIFACT_CONTENT_TYPE: &str = "ContentType";
pub const ARTIFACT_OBJECT_KEY: &str = "ObjectKey";

pub const REGISTRY_NAME: &str = "Name";
pub const REGISTRY_CREATED_AT: &str = "CreatedAt";

pub fn run(id: &str) -> String {
    format!("run:{}", id)
}

pub fn experiment(id: &str) -> String {
    format!("exp:{}", id)
}

/// Pattern matching every experiment key
pub fn experiment_pattern() -> &'static str {
    "exp:*"
}

/// Experiment id from an `exp:<id>` key
pub fn experiment_id(key: &str) -> Option<&str> {
    key.strip_prefix("exp:")
}

/// Pattern matching every run key
pub fn run_pattern() -> &'static str {
    "run:*"
}

/// Run id from a `run:<id>` key
pub fn run_id(key: &str) -> Option<&str> {
    key.strip_prefix("run:")
}

pub fn metric(name: &str, run_id: &str) -> String {
    format!("metric:{}:{}", name, run_id)
}

/// Pattern matching every metric of a run
pub fn metric_pattern(run_id: &str) -> String {
    format!("metric:*:{}", run_id)
}

/// Whether a scanned `metric:` or `artifact:` key was written for `run_id`.
///
/// Run ids never contain `:`, so the owner is everything after the last one.
/// Names may contain `:` and the scan pattern alone cannot tell them apart.
pub fn belongs_to_run(key: &str, run_id: &str) -> bool {
    key.rsplit_once(':').is_some_and(|(_, owner)| owner == run_id)
}

pub fn artifact(name: &str, run_id: &str) -> String {
    format!("artifact:{}:{}", name, run_id)
}

/// Pattern matching every artifact pointer of a run
pub fn artifact_pattern(run_id: &str) -> String {
    format!("artifact:*:{}", run_id)
}

pub fn registry_info(name: &str) -> String {
    format!("info:registry:{}", name)
}

pub fn registry_entries(name: &str) -> String {
    format!("registry:{}", name)
}

pub fn registry_tags(name: &str) -> String {
    format!("tag:registry:{}", name)
}

pub fn registry_tag(name: &str, tag: &str) -> String {
    format!("tag:registry:{}:{}", name, tag)
}

/// Keys watched by registry transactions
pub fn registry_watch(name: &str) -> Vec<String> {
    vec![
        registry_info(name),
        registry_entries(name),
        registry_tags(name),
    ]
}

/// Escape glob metacharacters so an identifier matches literally
pub fn escape_pattern(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(run("linreg"), "run:linreg");
        assert_eq!(experiment("exp1"), "exp:exp1");
        assert_eq!(metric("mse", "linreg"), "metric:mse:linreg");
        assert_eq!(artifact("model.pt", "linreg"), "artifact:model.pt:linreg");
        assert_eq!(registry_info("clf"), "info:registry:clf");
        assert_eq!(registry_entries("clf"), "registry:clf");
        assert_eq!(registry_tags("clf"), "tag:registry:clf");
        assert_eq!(registry_tag("clf", "prod"), "tag:registry:clf:prod");
    }

    #[test]
    fn test_prefix_stripping() {
        assert_eq!(experiment_id("exp:exp1"), Some("exp1"));
        assert_eq!(run_id("run:linreg"), Some("linreg"));
        assert_eq!(run_id("exp:linreg"), None);
    }

    #[test]
    fn test_belongs_to_run() {
        assert!(belongs_to_run("metric:mse:run1", "run1"));
        assert!(belongs_to_run("artifact:a:b.txt:run1", "run1"));
        assert!(!belongs_to_run("metric:mse:a:run1", "a:run1"));
        assert!(!belongs_to_run("metric:mse:xrun1", "run1"));
        assert!(!belongs_to_run("metric", "run1"));
    }

    #[test]
    fn test_escape_pattern() {
        assert_eq!(escape_pattern("plain-id"), "plain-id");
        assert_eq!(escape_pattern("a*b?"), "a\\*b\\?");
    }
}
