use crate::config::DayCheck;
use crate::limits::*;
use crate::model::*;

use super::{Engine, EngineError};

/// Order first, then length, then range. Returns the window as a `Span`.
pub fn check_window(start: Ms, end: Ms) -> Result<Span, EngineError> {
    if start >= end {
        return Err(EngineError::InvalidWindow { start, end });
    }
    let span = Span::new(start, end);
    if span.duration_ms() != LESSON_DURATION_MS {
        return Err(EngineError::InvalidDuration {
            actual_ms: span.duration_ms(),
        });
    }
    if start < MIN_VALID_TIMESTAMP_MS || end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    Ok(span)
}

/// First lesson of `ts` on `day` overlapping `span`, skipping `ignore`.
pub(super) fn check_teacher_free(
    ts: &TeacherState,
    day: DayOfWeek,
    span: &Span,
    ignore: Option<Id>,
) -> Result<(), EngineError> {
    match ts.overlapping(day, span).find(|l| Some(l.id) != ignore) {
        Some(hit) => Err(EngineError::TeacherUnavailable {
            conflicting: hit.id,
        }),
        None => Ok(()),
    }
}

pub(super) fn check_classroom_free(
    cs: &ClassroomState,
    day: DayOfWeek,
    span: &Span,
    ignore: Option<Id>,
) -> Result<(), EngineError> {
    match cs.overlapping(day, span).find(|o| Some(o.id) != ignore) {
        Some(hit) => Err(EngineError::ClassroomUnavailable {
            conflicting: hit.id,
        }),
        None => Ok(()),
    }
}

/// Compare the caller's day label with the UTC weekday of `start`.
pub(super) fn check_day(policy: DayCheck, declared: DayOfWeek, start: Ms) -> Result<(), EngineError> {
    if policy == DayCheck::Ignore {
        return Ok(());
    }
    let Some(derived) = DayOfWeek::of_timestamp(start) else {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    };
    if derived == declared {
        return Ok(());
    }
    match policy {
        DayCheck::Reject => Err(EngineError::DayMismatch { declared, derived }),
        _ => {
            tracing::warn!(
                "day_of_week {declared} disagrees with start {}, which is a {derived}",
                format_timestamp(start)
            );
            Ok(())
        }
    }
}

impl Engine {
    /// Whether `teacher_id` already teaches on `day` during `[start, end)`.
    ///
    /// Only the order of the window is checked here; any length is a valid query.
    pub async fn has_conflict(
        &self,
        teacher_id: Id,
        day: DayOfWeek,
        start: Ms,
        end: Ms,
    ) -> Result<bool, EngineError> {
        if start >= end {
            return Err(EngineError::InvalidWindow { start, end });
        }
        let row = self
            .get_teacher_row(teacher_id)
            .ok_or(EngineError::NotFound(super::Entity::Teacher, teacher_id))?;
        let guard = row.read().await;
        if guard.retired {
            return Err(EngineError::NotFound(super::Entity::Teacher, teacher_id));
        }
        Ok(guard.overlapping(day, &Span::new(start, end)).next().is_some())
    }
}
