//! # Task Model
//!
//! A durable unit of pending work.
//!
//! ## Database Schema
//!
//! Maps to the `offline_tasks` table:
//! - `id`: opaque unique identifier (TEXT, primary key)
//! - `task_type`: payload kind tag (TEXT)
//! - `scheduled_at`: not attempted before this instant (INTEGER, epoch millis, indexed)
//! - `requested_at`: creation instant (INTEGER, epoch millis)
//! - `attempts`: processing attempts so far (INTEGER)
//! - `data`: opaque serialized payload (BLOB), never rewritten after insert

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::constants::{task_types, TASK_VERSION};

/// Tag distinguishing task payload kinds
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskType {
    /// Persisted API call envelope
    ApiCall,
    /// Tag written by a newer or foreign writer; kept verbatim so the row stays readable
    Unknown(String),
}

impl TaskType {
    pub fn as_str(&self) -> &str {
        match self {
            TaskType::ApiCall => task_types::API_CALL,
            TaskType::Unknown(tag) => tag,
        }
    }
}

impl From<&str> for TaskType {
    fn from(tag: &str) -> Self {
        match tag {
            task_types::API_CALL => TaskType::ApiCall,
            other => TaskType::Unknown(other.to_string()),
        }
    }
}

impl From<String> for TaskType {
    fn from(tag: String) -> Self {
        TaskType::from(tag.as_str())
    }
}

impl From<TaskType> for String {
    fn from(task_type: TaskType) -> Self {
        task_type.as_str().to_string()
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Represents a queued work item exactly as it is persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: String,
    pub name: Option<String>,
    pub task_type: TaskType,
    pub version: i64,
    pub scheduled_at: DateTime<Utc>,
    pub requested_at: DateTime<Utc>,
    pub attempts: u32,
    pub last_attempted_at: Option<DateTime<Utc>>,
    /// Caller asked for "as soon as possible, do not coalesce" delivery
    pub blocking: bool,
    pub data: Vec<u8>,
}

impl Task {
    /// Build a new task with a fresh identifier, ready at `scheduled_at`
    pub fn new(task_type: TaskType, data: Vec<u8>, scheduled_at: DateTime<Utc>) -> Self {
        Self {
            id: Self::generate_id(),
            name: None,
            task_type,
            version: TASK_VERSION,
            scheduled_at: scheduled_at.trunc_subsecs(3),
            requested_at: Self::now(),
            attempts: 0,
            last_attempted_at: None,
            blocking: false,
            data,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_blocking(mut self, blocking: bool) -> Self {
        self.blocking = blocking;
        self
    }

    /// Generate a globally unique task identifier
    pub fn generate_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Current time at the precision the store keeps
    pub fn now() -> DateTime<Utc> {
        Utc::now().trunc_subsecs(3)
    }

    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_at <= now
    }

    /// Copy of this task after a failed attempt, to be retried at `next_attempt_at`.
    ///
    /// Only scheduling metadata changes; the payload bytes are carried over untouched.
    pub fn rescheduled(&self, next_attempt_at: DateTime<Utc>, attempted_at: DateTime<Utc>) -> Task {
        Task {
            scheduled_at: next_attempt_at.trunc_subsecs(3),
            attempts: self.attempts.saturating_add(1),
            last_attempted_at: Some(attempted_at.trunc_subsecs(3)),
            ..self.clone()
        }
    }
}
