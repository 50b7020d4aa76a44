use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::TaskHandle;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskType(String);

impl TaskType {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for TaskType {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Handle + TaskType + Payload の“運搬用”データ。Broker Queue に載る単位。
///
/// `delivery_count` だけは Broker Queue が書き換える（dequeue のたびに +1）。
/// それ以外は submit 時に決まって変わらない。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEnvelope {
    handle: TaskHandle,
    task_type: TaskType,
    payload: serde_json::Value,
    submitted_at: DateTime<Utc>,
    #[serde(default)]
    delivery_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    retry_of: Option<TaskHandle>,
}

impl TaskEnvelope {
    pub fn new(
        handle: TaskHandle,
        task_type: TaskType,
        payload: serde_json::Value,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            handle,
            task_type,
            payload,
            submitted_at,
            delivery_count: 0,
            retry_of: None,
        }
    }

    pub fn with_retry_of(mut self, retry_of: Option<TaskHandle>) -> Self {
        self.retry_of = retry_of;
        self
    }

    pub fn handle(&self) -> TaskHandle {
        self.handle
    }

    pub fn task_type(&self) -> &TaskType {
        &self.task_type
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    pub fn delivery_count(&self) -> u32 {
        self.delivery_count
    }

    pub fn retry_of(&self) -> Option<TaskHandle> {
        self.retry_of
    }

    /// Called by the broker each time the envelope is handed to a consumer.
    pub fn record_delivery(&mut self) {
        self.delivery_count = self.delivery_count.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ulid::Ulid;

    #[test]
    fn envelope_wire_format_is_flat() {
        let handle = TaskHandle::from_ulid(Ulid::new());
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let env = TaskEnvelope::new(handle, TaskType::new("add"), serde_json::json!({"x": 1}), at);

        let v = serde_json::to_value(&env).unwrap();
        assert_eq!(v["handle"], handle.to_string());
        assert_eq!(v["task_type"], "add");
        assert_eq!(v["payload"]["x"], 1);
        assert_eq!(v["submitted_at"], "2024-01-01T12:00:00Z");
        assert_eq!(v["delivery_count"], 0);
        assert!(v.get("retry_of").is_none());
    }

    #[test]
    fn record_delivery_increments() {
        let mut env = TaskEnvelope::new(
            TaskHandle::from_ulid(Ulid::new()),
            TaskType::new("add"),
            serde_json::json!({}),
            Utc::now(),
        );
        env.record_delivery();
        env.record_delivery();
        assert_eq!(env.delivery_count(), 2);
    }
}
