//! Job and argument types carried through the queue.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::QueueError;

/// Named job arguments, serialized as a JSON object.
///
/// [`JobArgs::to_json`] is canonical; [`unique_key`] builds on it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobArgs(Map<String, Value>);

impl JobArgs {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Read an integer argument.
    ///
    /// Accepts a JSON integer or a decimal string, since older producers
    /// stored identifiers as strings.
    pub fn i64(&self, name: &str) -> Result<i64, QueueError> {
        let value = self
            .0
            .get(name)
            .ok_or_else(|| QueueError::MissingArgument(name.to_string()))?;

        let invalid = |reason: &str| QueueError::InvalidArgument {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        match value {
            Value::Number(n) => n.as_i64().ok_or_else(|| invalid("not a 64-bit integer")),
            Value::String(s) => s.trim().parse().map_err(|_| invalid("not a decimal integer")),
            _ => Err(invalid("expected an integer")),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Canonical JSON encoding, top-level keys sorted.
    pub fn to_json(&self) -> Result<String, QueueError> {
        let sorted: BTreeMap<&String, &Value> = self.0.iter().collect();
        Ok(serde_json::to_string(&sorted)?)
    }

    /// Like [`JobArgs::to_json`], with decimal-string integers read as numbers
    /// the same way [`JobArgs::i64`] reads them.
    fn to_key_json(&self) -> Result<String, QueueError> {
        let sorted: BTreeMap<&String, Value> = self
            .0
            .iter()
            .map(|(name, value)| (name, key_value(value)))
            .collect();
        Ok(serde_json::to_string(&sorted)?)
    }
}

fn key_value(value: &Value) -> Value {
    match value {
        Value::String(s) => match s.trim().parse::<i64>() {
            Ok(n) => Value::from(n),
            Err(_) => value.clone(),
        },
        _ => value.clone(),
    }
}

/// A job as stored in and handed out by a queue backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub name: String,
    pub args: JobArgs,
    pub enqueued_at: DateTime<Utc>,
    /// Number of failed attempts so far.
    pub fails: u32,
    /// Whether the job holds a uniqueness lock while pending.
    pub unique: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl Job {
    pub fn new(name: impl Into<String>, args: JobArgs) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            args,
            enqueued_at: Utc::now(),
            fails: 0,
            unique: false,
            last_error: None,
        }
    }

    pub fn new_unique(name: impl Into<String>, args: JobArgs) -> Self {
        Self {
            unique: true,
            ..Self::new(name, args)
        }
    }

    /// Key shared by every job with the same name and arguments.
    pub fn unique_key(&self) -> Result<String, QueueError> {
        unique_key(&self.name, &self.args)
    }

    pub fn arg_i64(&self, name: &str) -> Result<i64, QueueError> {
        self.args.i64(name)
    }
}

/// `<name>:<canonical args JSON>`. `{"id":5}` and `{"id":"5"}` share a key.
pub fn unique_key(name: &str, args: &JobArgs) -> Result<String, QueueError> {
    Ok(format!("{}:{}", name, args.to_key_json()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_i64_accepts_number_and_string() {
        let args = JobArgs::new()
            .with("assignmentID", 42_i64)
            .with("submissionID", "9001");
        assert_eq!(args.i64("assignmentID").unwrap(), 42);
        assert_eq!(args.i64("submissionID").unwrap(), 9001);
    }

    #[test]
    fn test_i64_missing_and_invalid() {
        let args = JobArgs::new().with("assignmentID", "abc").with("flag", true);
        assert!(matches!(args.i64("submissionID"), Err(QueueError::MissingArgument(_))));
        assert!(matches!(args.i64("assignmentID"), Err(QueueError::InvalidArgument { .. })));
        assert!(matches!(args.i64("flag"), Err(QueueError::InvalidArgument { .. })));
    }

    #[test]
    fn test_unique_key_is_order_independent() {
        let a = JobArgs::new().with("b", 2).with("a", 1);
        let b = JobArgs::new().with("a", 1).with("b", 2);
        assert_eq!(
            unique_key("grade_assignment", &a).unwrap(),
            unique_key("grade_assignment", &b).unwrap()
        );
        assert_eq!(
            unique_key("grade_assignment", &a).unwrap(),
            r#"grade_assignment:{"a":1,"b":2}"#
        );
    }

    #[test]
    fn test_unique_key_treats_string_ids_as_numbers() {
        let number = JobArgs::new().with("assignmentID", 5);
        let string = JobArgs::new().with("assignmentID", "5");
        let padded = JobArgs::new().with("assignmentID", " 5 ");
        let key = unique_key("grade_assignment", &number).unwrap();

        assert_eq!(key, r#"grade_assignment:{"assignmentID":5}"#);
        assert_eq!(unique_key("grade_assignment", &string).unwrap(), key);
        assert_eq!(unique_key("grade_assignment", &padded).unwrap(), key);

        let word = JobArgs::new().with("assignmentID", "five");
        assert_eq!(
            unique_key("grade_assignment", &word).unwrap(),
            r#"grade_assignment:{"assignmentID":"five"}"#
        );
    }

    #[test]
    fn test_job_json_shape() {
        let job = Job::new_unique("grade_submission", JobArgs::new().with("submissionID", 7));
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["args"]["submissionID"], 7);
        assert_eq!(json["unique"], true);
        assert!(json.get("last_error").is_none());
        let back: Job = serde_json::from_value(json).unwrap();
        assert_eq!(back, job);
    }

    #[test]
    fn test_distinct_jobs_get_distinct_ids() {
        let a = Job::new("check_due_assignment", JobArgs::new());
        let b = Job::new("check_due_assignment", JobArgs::new());
        assert_ne!(a.id, b.id);
        assert!(!a.unique);
    }
}
