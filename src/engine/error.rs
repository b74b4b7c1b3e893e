use std::fmt;

use rust_decimal::Decimal;

use crate::model::{DayOfWeek, Id, Ms};
use crate::validation::FieldError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Teacher,
    Classroom,
    Course,
    Student,
    Schedule,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Entity::Teacher => "teacher",
            Entity::Classroom => "classroom",
            Entity::Course => "course",
            Entity::Student => "student",
            Entity::Schedule => "schedule",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// `start >= end`.
    InvalidWindow { start: Ms, end: Ms },
    /// Well-ordered window that is not exactly one lesson long.
    InvalidDuration { actual_ms: Ms },
    /// The teacher already has the listed lesson in the window.
    TeacherUnavailable { conflicting: Id },
    ClassroomUnavailable { conflicting: Id },
    InsufficientHours { requested: Decimal, available: Decimal },
    DayMismatch { declared: DayOfWeek, derived: DayOfWeek },
    NotFound(Entity, Id),
    AlreadyExists(Entity, String),
    /// Deleting a row that schedule entries still reference.
    HasLessons(Entity, Id),
    Validation(Vec<FieldError>),
    LimitExceeded(&'static str),
    Storage(String),
}

impl EngineError {
    /// Only storage failures may succeed on retry; everything else is a verdict.
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Storage(_))
    }

    /// Stable label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::InvalidWindow { .. } => "invalid_window",
            EngineError::InvalidDuration { .. } => "invalid_duration",
            EngineError::TeacherUnavailable { .. } => "teacher_unavailable",
            EngineError::ClassroomUnavailable { .. } => "classroom_unavailable",
            EngineError::InsufficientHours { .. } => "insufficient_hours",
            EngineError::DayMismatch { .. } => "day_mismatch",
            EngineError::NotFound(..) => "not_found",
            EngineError::AlreadyExists(..) => "already_exists",
            EngineError::HasLessons(..) => "has_lessons",
            EngineError::Validation(_) => "validation",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::Storage(_) => "storage",
        }
    }

    pub(crate) fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        EngineError::Validation(vec![FieldError {
            field,
            message: message.into(),
        }])
    }
}

impl From<Vec<FieldError>> for EngineError {
    fn from(errors: Vec<FieldError>) -> Self {
        EngineError::Validation(errors)
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::InvalidWindow { start, end } => {
                write!(f, "start time {start} must be before end time {end}")
            }
            EngineError::InvalidDuration { actual_ms } => write!(
                f,
                "lesson must last exactly 90 minutes, got {} minutes",
                actual_ms / 60_000
            ),
            EngineError::TeacherUnavailable { conflicting } => write!(
                f,
                "teacher is not available at that time: overlaps schedule {conflicting}"
            ),
            EngineError::ClassroomUnavailable { conflicting } => write!(
                f,
                "classroom is not available at that time: overlaps schedule {conflicting}"
            ),
            EngineError::InsufficientHours {
                requested,
                available,
            } => write!(
                f,
                "not enough working hours: requested {requested}, available {available}"
            ),
            EngineError::DayMismatch { declared, derived } => write!(
                f,
                "day_of_week {declared} does not match start time, which falls on {derived}"
            ),
            EngineError::NotFound(entity, id) => write!(f, "{entity} {id} not found"),
            EngineError::AlreadyExists(entity, key) => write!(f, "{entity} already exists: {key}"),
            EngineError::HasLessons(entity, id) => {
                write!(f, "cannot delete {entity} {id}: it still has schedule entries")
            }
            EngineError::Validation(errors) => {
                f.write_str("invalid input: ")?;
                for (i, e) in errors.iter().enumerate() {
                    if i > 0 {
                        f.write_str("; ")?;
                    }
                    write!(f, "{e}")?;
                }
                Ok(())
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::Storage(e) => write!(f, "storage error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
