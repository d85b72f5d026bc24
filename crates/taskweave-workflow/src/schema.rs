use chrono::Utc;
use regex::Regex;
use serde_json::{json, Value};
use tracing::debug;

use taskweave_core::config::SessionConfig;
use taskweave_core::error::{Result, TaskweaveError};
use taskweave_core::traits::DocumentValidator;
use taskweave_core::types::{Attributes, TaskStatus};

use crate::kind::TaskKind;

/// Allowed shape of a remote procedure name: dot-separated words.
pub const URI_PATTERN: &str = r"^\w+(\.\w+)*$";

pub const LOG_LEVELS: [&str; 5] = ["debug", "info", "warn", "error", "critical"];

const STRING_FIELDS: [&str; 8] = [
    "package_name",
    "system_user",
    "authrole",
    "authmethod",
    "class_name",
    "app",
    "runner",
    "mapper_arg",
];

const NULLABLE_STRING_FIELDS: [&str; 2] = ["realm", "authid"];

const OBJECT_FIELDS: [&str; 3] = ["input_data", "output_data", "session"];

/// Schema every task node is validated against when it is created.
///
/// Defaults come from the `[session]` config section; `task_id` has no
/// default and must always be supplied.
#[derive(Debug, Clone)]
pub struct TaskSchema {
    session: SessionConfig,
    uri: Regex,
}

impl TaskSchema {
    pub fn new(session: SessionConfig) -> Result<Self> {
        let uri = Regex::new(URI_PATTERN).map_err(|e| TaskweaveError::Config(e.to_string()))?;
        Ok(Self { session, uri })
    }

    /// Default values for every field that has one.
    pub fn defaults(&self) -> Attributes {
        let mut data = Attributes::new();
        data.insert("status".into(), json!(TaskStatus::Ready.as_str()));
        data.insert("itime".into(), json!(Utc::now().timestamp()));
        data.insert("system_user".into(), json!(self.session.resolved_user()));
        data.insert("authrole".into(), json!(self.session.authrole));
        data.insert("log_level".into(), json!("info"));
        data.insert("app".into(), json!(self.session.app));
        data.insert("task_type".into(), json!(TaskKind::Task.as_str()));
        if let Some(realm) = &self.session.realm {
            data.insert("realm".into(), json!(realm));
        }
        data
    }

    /// Fill defaults under `supplied` and validate the result.
    pub fn init_task(&self, supplied: Attributes) -> Result<Attributes> {
        let mut data = self.defaults();
        data.extend(supplied);
        self.validate(&data)?;
        if let Some(status) = data.get("status").and_then(Value::as_str) {
            let status: TaskStatus = status.parse()?;
            data.insert("status".into(), json!(status.as_str()));
        }
        debug!(task_id = ?data.get("task_id"), "Task attributes initialised");
        Ok(data)
    }

    fn check_uri(&self, value: &Value) -> Result<()> {
        match value.as_str() {
            Some(uri) if self.uri.is_match(uri) => Ok(()),
            _ => Err(invalid("uri", format!("{} does not match {}", value, URI_PATTERN))),
        }
    }
}

impl DocumentValidator for TaskSchema {
    fn validate(&self, document: &Attributes) -> Result<()> {
        match document.get("task_id") {
            Some(Value::String(id)) if !id.is_empty() => {}
            Some(other) => return Err(invalid("task_id", format!("expected a non-empty string, got {}", other))),
            None => return Err(invalid("task_id", "required field missing")),
        }

        match document.get("status").and_then(Value::as_str) {
            Some(status) => {
                status
                    .parse::<TaskStatus>()
                    .map_err(|e| invalid("status", e.to_string()))?;
            }
            None => return Err(invalid("status", "required string field missing")),
        }

        match document.get("task_type").and_then(Value::as_str) {
            Some(task_type) => {
                task_type
                    .parse::<TaskKind>()
                    .map_err(|e| invalid("task_type", e.to_string()))?;
            }
            None => return Err(invalid("task_type", "required string field missing")),
        }

        if !document.get("itime").is_some_and(Value::is_i64) {
            return Err(invalid("itime", "expected integer unix seconds"));
        }
        if let Some(utime) = document.get("utime") {
            if !(utime.is_null() || utime.is_i64()) {
                return Err(invalid("utime", "expected integer unix seconds"));
            }
        }

        if let Some(uri) = document.get("uri") {
            self.check_uri(uri)?;
        }

        if let Some(level) = document.get("log_level") {
            if !level.as_str().is_some_and(|l| LOG_LEVELS.contains(&l)) {
                return Err(invalid("log_level", format!("{} not one of {:?}", level, LOG_LEVELS)));
            }
        }

        for field in STRING_FIELDS {
            if document.get(field).is_some_and(|v| !v.is_string()) {
                return Err(invalid(field, "expected a string"));
            }
        }
        for field in NULLABLE_STRING_FIELDS {
            if document.get(field).is_some_and(|v| !(v.is_string() || v.is_null())) {
                return Err(invalid(field, "expected a string or null"));
            }
        }
        for field in OBJECT_FIELDS {
            if document.get(field).is_some_and(|v| !v.is_object()) {
                return Err(invalid(field, "expected an object"));
            }
        }

        Ok(())
    }
}

fn invalid(field: &str, message: impl std::fmt::Display) -> TaskweaveError {
    TaskweaveError::Validation(format!("{}: {}", field, message))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> TaskSchema {
        TaskSchema::new(SessionConfig {
            system_user: Some("tester".into()),
            ..SessionConfig::default()
        })
        .unwrap()
    }

    fn supplied(pairs: Value) -> Attributes {
        match pairs {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_defaults_are_filled() {
        let data = schema().init_task(supplied(json!({"task_id": "t-1"}))).unwrap();
        assert_eq!(data["status"], "ready");
        assert_eq!(data["task_type"], "Task");
        assert_eq!(data["log_level"], "info");
        assert_eq!(data["app"], "taskweave");
        assert_eq!(data["authrole"], "default");
        assert_eq!(data["system_user"], "tester");
        assert!(data["itime"].is_i64());
    }

    #[test]
    fn test_task_id_is_required() {
        let err = schema().init_task(Attributes::new()).unwrap_err();
        assert!(matches!(err, TaskweaveError::Validation(ref m) if m.starts_with("task_id")));
    }

    #[test]
    fn test_enums_are_checked() {
        let s = schema();
        assert!(s
            .init_task(supplied(json!({"task_id": "t", "status": "paused"})))
            .is_err());
        assert!(s
            .init_task(supplied(json!({"task_id": "t", "log_level": "verbose"})))
            .is_err());
        assert!(s
            .init_task(supplied(json!({"task_id": "t", "task_type": "Sorter"})))
            .is_err());
        assert!(s
            .init_task(supplied(json!({"task_id": "t", "status": "Completed"})))
            .is_ok());
    }

    #[test]
    fn test_uri_pattern() {
        let s = schema();
        assert!(s
            .init_task(supplied(json!({"task_id": "t", "uri": "docking.score_poses"})))
            .is_ok());
        assert!(s
            .init_task(supplied(json!({"task_id": "t", "uri": "docking..score"})))
            .is_err());
        assert!(s
            .init_task(supplied(json!({"task_id": "t", "uri": "has space"})))
            .is_err());
    }

    #[test]
    fn test_field_types() {
        let s = schema();
        assert!(s
            .init_task(supplied(json!({"task_id": "t", "input_data": [1, 2]})))
            .is_err());
        assert!(s
            .init_task(supplied(json!({"task_id": "t", "realm": null})))
            .is_ok());
        assert!(s
            .init_task(supplied(json!({"task_id": "t", "itime": "yesterday"})))
            .is_err());
    }
}
