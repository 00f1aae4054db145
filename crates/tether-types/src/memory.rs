//! Memory types for Tether.
//!
//! These types model a user's long-term support memory: recorded
//! interventions (with embeddings for semantic recall) and end-of-session
//! reflections. Every record is owned by exactly one user partition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// Maximum length of a user identifier.
pub const MAX_USER_ID_LEN: usize = 100;

/// Result label attached to an intervention.
///
/// Unknown labels are tolerated (and logged by the store) rather than
/// rejected, so they round-trip through [`Outcome::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Outcome {
    TaskStarted,
    TaskProgress,
    TaskCompleted,
    ReEngaged,
    Distracted,
    Abandoned,
    InterventionApplied,
    Other(String),
}

impl Outcome {
    /// Outcomes that count as "worked" for retrieval purposes.
    pub const SUCCESSFUL: [Outcome; 2] = [Outcome::TaskCompleted, Outcome::ReEngaged];

    pub fn as_str(&self) -> &str {
        match self {
            Outcome::TaskStarted => "task_started",
            Outcome::TaskProgress => "task_progress",
            Outcome::TaskCompleted => "task_completed",
            Outcome::ReEngaged => "re_engaged",
            Outcome::Distracted => "distracted",
            Outcome::Abandoned => "abandoned",
            Outcome::InterventionApplied => "intervention_applied",
            Outcome::Other(s) => s,
        }
    }

    /// Whether this is one of the enumerated labels.
    pub fn is_known(&self) -> bool {
        !matches!(self, Outcome::Other(_))
    }

    pub fn is_successful(&self) -> bool {
        Self::SUCCESSFUL.contains(self)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Outcome {
    fn from(s: &str) -> Self {
        match s {
            "task_started" => Outcome::TaskStarted,
            "task_progress" => Outcome::TaskProgress,
            "task_completed" => Outcome::TaskCompleted,
            "re_engaged" => Outcome::ReEngaged,
            "distracted" => Outcome::Distracted,
            "abandoned" => Outcome::Abandoned,
            "intervention_applied" => Outcome::InterventionApplied,
            other => Outcome::Other(other.to_string()),
        }
    }
}

impl From<String> for Outcome {
    fn from(s: String) -> Self {
        Outcome::from(s.as_str())
    }
}

impl From<Outcome> for String {
    fn from(outcome: Outcome) -> Self {
        outcome.as_str().to_string()
    }
}

/// Validated user identifier.
///
/// Used verbatim in record keys and index names, so it is restricted to
/// ASCII alphanumerics, `-` and `_`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        if raw.trim().is_empty() {
            return Err(ValidationError::new("user_id", "cannot be empty"));
        }
        if raw.len() > MAX_USER_ID_LEN {
            return Err(ValidationError::new(
                "user_id",
                format!("too long: {} chars (max {MAX_USER_ID_LEN})", raw.len()),
            ));
        }
        if let Some(c) = raw
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(ValidationError::new(
                "user_id",
                format!("contains invalid character {c:?}"),
            ));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for UserId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for UserId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

/// Kind of record stored in a user's partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Intervention,
    Reflection,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Intervention => write!(f, "intervention"),
            RecordKind::Reflection => write!(f, "reflection"),
        }
    }
}

impl FromStr for RecordKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "intervention" => Ok(RecordKind::Intervention),
            "reflection" => Ok(RecordKind::Reflection),
            other => Err(format!("invalid record kind: '{other}'")),
        }
    }
}

/// Record key: `{user_id}:{kind}:{timestamp_ms}`.
///
/// Keys of one user are totally ordered by `timestamp_ms`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RecordKey {
    pub user_id: UserId,
    pub kind: RecordKind,
    pub timestamp_ms: i64,
}

impl RecordKey {
    pub fn new(user_id: UserId, kind: RecordKind, timestamp_ms: i64) -> Self {
        Self {
            user_id,
            kind,
            timestamp_ms,
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.user_id, self.kind, self.timestamp_ms)
    }
}

impl FromStr for RecordKey {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let (Some(user), Some(kind), Some(ts), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(ValidationError::new(
                "key",
                format!("expected user:kind:timestamp, got '{s}'"),
            ));
        };
        let user_id = UserId::parse(user)?;
        let kind = kind
            .parse::<RecordKind>()
            .map_err(|e| ValidationError::new("key", e))?;
        let timestamp_ms = ts
            .parse::<i64>()
            .map_err(|e| ValidationError::new("key", format!("bad timestamp '{ts}': {e}")))?;
        Ok(Self::new(user_id, kind, timestamp_ms))
    }
}

impl TryFrom<String> for RecordKey {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RecordKey> for String {
    fn from(key: RecordKey) -> Self {
        key.to_string()
    }
}

/// Caller-supplied fields of an intervention before validation and keying.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewIntervention {
    /// What the agent said or did.
    pub intervention_text: String,
    /// What the user said / the situation.
    pub context: String,
    pub task: String,
    pub outcome: Outcome,
    pub embedding: Vec<f32>,
}

/// A persisted intervention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterventionRecord {
    pub key: RecordKey,
    pub intervention_text: String,
    pub context: String,
    pub task: String,
    pub outcome: Outcome,
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// A persisted end-of-session reflection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectionRecord {
    pub key: RecordKey,
    pub insight: String,
    /// Transcript excerpt, at most 500 chars.
    pub session_summary: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Tag filter applied to the `outcome` field of a KNN query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeFilter {
    Any,
    OneOf(Vec<Outcome>),
}

impl OutcomeFilter {
    /// `{task_completed, re_engaged}`.
    pub fn successful() -> Self {
        OutcomeFilter::OneOf(Outcome::SUCCESSFUL.to_vec())
    }

    pub fn matches(&self, outcome: &Outcome) -> bool {
        match self {
            OutcomeFilter::Any => true,
            OutcomeFilter::OneOf(set) => set.contains(outcome),
        }
    }
}

/// One raw KNN result as returned by the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnnHit {
    pub key: RecordKey,
    pub intervention_text: String,
    pub context: String,
    pub task: String,
    pub outcome: Outcome,
    /// Cosine distance from the query vector.
    pub distance: f32,
}

/// A KNN result with its distance converted to a similarity score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarIntervention {
    pub key: RecordKey,
    pub intervention_text: String,
    pub context: String,
    pub task: String,
    pub outcome: Outcome,
    /// `1 - distance`, clamped into `[0, 1]`.
    pub similarity: f32,
    pub distance: f32,
}

impl From<KnnHit> for SimilarIntervention {
    fn from(hit: KnnHit) -> Self {
        Self {
            similarity: (1.0 - hit.distance).clamp(0.0, 1.0),
            key: hit.key,
            intervention_text: hit.intervention_text,
            context: hit.context,
            task: hit.task,
            outcome: hit.outcome,
            distance: hit.distance,
        }
    }
}

/// Derived (never stored) counts of live records for one user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMemoryStats {
    pub interventions: u64,
    pub reflections: u64,
}
