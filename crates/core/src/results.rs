//! Result records for executed commands
//!
//! A [`RunResult`] is built once, at the end of a single execution attempt, and
//! is what every consumer (JSON output, the batch printer, the job queue) sees.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::CtResult;

/// Outcome of one execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Failed,
}

/// Machine-readable record of one executed external command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub id: String,
    pub command: String,
    pub args: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub exit_code: i32,
    pub status: Status,
    pub stdout: String,
    pub stderr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunResult {
    /// Build a record from a finished execution.
    ///
    /// `error` decides the status: `None` means success with exit code 0.
    #[allow(clippy::too_many_arguments)]
    pub fn finished(
        command: impl Into<String>,
        args: Vec<String>,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        exit_code: i32,
        stdout: String,
        stderr: String,
        error: Option<String>,
    ) -> Self {
        let duration_ms = (finished_at - started_at).num_milliseconds().max(0);
        let (status, exit_code) = match error {
            None => (Status::Success, 0),
            Some(_) => (Status::Failed, exit_code),
        };

        Self {
            id: String::new(),
            command: command.into(),
            args,
            started_at,
            finished_at,
            duration_ms,
            exit_code,
            status,
            stdout,
            stderr,
            error,
        }
    }

    /// Record for work that failed before any process was started
    pub fn not_started(
        id: impl Into<String>,
        command: impl Into<String>,
        args: Vec<String>,
        error: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        let mut result = Self::finished(
            command,
            args,
            now,
            now,
            1,
            String::new(),
            String::new(),
            Some(error.into()),
        );
        result.id = id.into();
        result
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    /// Force the record into the failed state.
    ///
    /// A successful record keeps exit code 0, so the message is what explains
    /// the failure.
    pub fn mark_failed(&mut self, message: impl Into<String>) {
        self.status = Status::Failed;
        self.error = Some(message.into());
    }

    /// Pretty-printed JSON, as emitted on stdout
    pub fn to_pretty_json(&self) -> CtResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample(error: Option<String>, exit_code: i32) -> RunResult {
        let started = Utc::now();
        let finished = started + Duration::milliseconds(1500);
        RunResult::finished(
            "python3",
            vec!["plugins/python/dns_lookup.py".to_string(), "example.com".to_string()],
            started,
            finished,
            exit_code,
            "ok\n".to_string(),
            String::new(),
            error,
        )
    }

    #[test]
    fn test_duration_matches_timestamps() {
        let result = sample(None, 0);
        assert_eq!(result.duration_ms, 1500);
        assert_eq!(
            result.duration_ms,
            (result.finished_at - result.started_at).num_milliseconds()
        );
    }

    #[test]
    fn test_success_forces_zero_exit() {
        let result = sample(None, 7);
        assert_eq!(result.status, Status::Success);
        assert_eq!(result.exit_code, 0);
        assert!(result.error.is_none());
    }

    #[test]
    fn test_failure_keeps_exit_code() {
        let result = sample(Some("exit status: 2".to_string()), 2);
        assert_eq!(result.status, Status::Failed);
        assert_eq!(result.exit_code, 2);
    }

    #[test]
    fn test_error_omitted_from_json_on_success() {
        let json = sample(None, 0).with_id("dns-1").to_pretty_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["id"], "dns-1");
        assert_eq!(value["status"], "success");
        assert_eq!(value["duration_ms"], 1500);
        assert!(value.get("error").is_none());
        for field in [
            "command",
            "args",
            "started_at",
            "finished_at",
            "exit_code",
            "stdout",
            "stderr",
        ] {
            assert!(value.get(field).is_some(), "missing {}", field);
        }
    }

    #[test]
    fn test_error_present_in_json_on_failure() {
        let json = sample(Some("boom".to_string()), 3).to_pretty_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["status"], "failed");
        assert_eq!(value["error"], "boom");
    }

    #[test]
    fn test_mark_failed_overrides_success() {
        let mut result = sample(None, 0);
        result.mark_failed("job error");
        assert!(!result.is_success());
        assert_eq!(result.error.as_deref(), Some("job error"));
    }

    #[test]
    fn test_not_started_is_failed() {
        let result = RunResult::not_started("scan-1", "python3", vec![], "no such task");
        assert_eq!(result.id, "scan-1");
        assert_eq!(result.exit_code, 1);
        assert_eq!(result.duration_ms, 0);
        assert_eq!(result.status, Status::Failed);
    }
}
