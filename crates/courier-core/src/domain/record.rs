//! Task record: the result store's single source of truth for a handle.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{TaskHandle, TaskType};

/// Task state.
///
/// State transitions:
/// - Pending -> Running -> Success
/// - Pending -> Running -> Failure
/// - Pending -> Failure (enqueue failed, written by the dispatcher)
///
/// Transitions only move forward; terminal states are never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Pending,
    Running,
    Success,
    Failure,
}

impl TaskState {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Success | TaskState::Failure)
    }

    /// Position in the forward order; both terminal states share the last rank.
    pub fn rank(self) -> u8 {
        match self {
            TaskState::Pending => 0,
            TaskState::Running => 1,
            TaskState::Success | TaskState::Failure => 2,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Pending => "PENDING",
            TaskState::Running => "RUNNING",
            TaskState::Success => "SUCCESS",
            TaskState::Failure => "FAILURE",
        };
        f.write_str(s)
    }
}

/// Classification of a failure stored on a record.
///
/// Handler-supplied kinds are preserved verbatim in `Handler`. On the wire
/// every kind is a plain string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ErrorKind {
    UnknownTaskType,
    InvalidPayload,
    EnqueueFailed,
    InvalidOutput,
    HandlerPanic,
    Handler(String),
}

impl ErrorKind {
    pub fn as_str(&self) -> &str {
        match self {
            ErrorKind::UnknownTaskType => "UnknownTaskType",
            ErrorKind::InvalidPayload => "InvalidPayload",
            ErrorKind::EnqueueFailed => "EnqueueFailed",
            ErrorKind::InvalidOutput => "InvalidOutput",
            ErrorKind::HandlerPanic => "HandlerPanic",
            ErrorKind::Handler(kind) => kind,
        }
    }
}

impl From<String> for ErrorKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "UnknownTaskType" => ErrorKind::UnknownTaskType,
            "InvalidPayload" => ErrorKind::InvalidPayload,
            "EnqueueFailed" => ErrorKind::EnqueueFailed,
            "InvalidOutput" => ErrorKind::InvalidOutput,
            "HandlerPanic" => ErrorKind::HandlerPanic,
            _ => ErrorKind::Handler(s),
        }
    }
}

impl From<ErrorKind> for String {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Handler(kind) => kind,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error detail of a `FAILURE` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    pub kind: ErrorKind,
    pub message: String,
}

impl TaskError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("illegal transition {from} -> {to} for {handle}")]
pub struct TransitionError {
    pub handle: TaskHandle,
    pub from: TaskState,
    pub to: TaskState,
}

/// Record stored under a handle.
///
/// Design:
/// - `result` is present iff `state == Success`.
/// - `error` is present iff `state == Failure`.
/// - `ttl_expires_at` is fixed at creation and never extended.
/// - All state changes go through the `mark_*` methods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub handle: TaskHandle,
    pub task_type: TaskType,
    pub state: TaskState,
    pub result: Option<serde_json::Value>,
    pub error: Option<TaskError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub ttl_expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_of: Option<TaskHandle>,
}

impl TaskRecord {
    /// New `Pending` record expiring `ttl` after `now`.
    pub fn pending(handle: TaskHandle, task_type: TaskType, now: DateTime<Utc>, ttl: Duration) -> Self {
        let ttl_expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            handle,
            task_type,
            state: TaskState::Pending,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
            ttl_expires_at,
            retry_of: None,
        }
    }

    pub fn with_retry_of(mut self, retry_of: Option<TaskHandle>) -> Self {
        self.retry_of = retry_of;
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.ttl_expires_at
    }

    /// Time left until expiry, zero once passed.
    pub fn remaining_ttl(&self, now: DateTime<Utc>) -> Duration {
        (self.ttl_expires_at - now).to_std().unwrap_or(Duration::ZERO)
    }

    /// `Pending -> Running`. Returns `false` (no-op) when already running or terminal.
    pub fn mark_running(&mut self, now: DateTime<Utc>) -> bool {
        if self.state != TaskState::Pending {
            return false;
        }
        self.state = TaskState::Running;
        self.touch(now);
        true
    }

    /// `Running -> Success`.
    pub fn mark_succeeded(
        &mut self,
        result: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        if self.state != TaskState::Running {
            return Err(self.illegal(TaskState::Success));
        }
        self.state = TaskState::Success;
        self.result = Some(result);
        self.touch(now);
        Ok(())
    }

    /// `Pending | Running -> Failure`.
    pub fn mark_failed(&mut self, error: TaskError, now: DateTime<Utc>) -> Result<(), TransitionError> {
        if self.is_terminal() {
            return Err(self.illegal(TaskState::Failure));
        }
        self.state = TaskState::Failure;
        self.error = Some(error);
        self.touch(now);
        Ok(())
    }

    fn illegal(&self, to: TaskState) -> TransitionError {
        TransitionError {
            handle: self.handle,
            from: self.state,
            to,
        }
    }

    // updated_at must strictly increase even if the clock did not move.
    fn touch(&mut self, now: DateTime<Utc>) {
        let floor = self.updated_at + chrono::Duration::microseconds(1);
        self.updated_at = now.max(floor);
    }
}
