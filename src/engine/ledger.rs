use std::sync::Arc;

use rust_decimal::Decimal;

use crate::limits::MAX_WORKING_HOURS;
use crate::model::*;

use super::{Engine, EngineError, Entity, detached};

/// Length of a window in hours.
pub fn hours_of(span: &Span) -> Decimal {
    Decimal::from(span.duration_ms()) / Decimal::from(HOUR_MS)
}

/// `credit` is what the same operation gives back first (a revision of an
/// existing lesson frees that lesson's hours before reserving the new ones).
pub(super) fn ensure_available(
    ts: &TeacherState,
    requested: Decimal,
    credit: Decimal,
) -> Result<(), EngineError> {
    let available = ts.working_hours + credit;
    if available < requested {
        return Err(EngineError::InsufficientHours {
            requested,
            available,
        });
    }
    Ok(())
}

fn ensure_non_negative(hours: Decimal) -> Result<(), EngineError> {
    if hours < Decimal::ZERO {
        return Err(EngineError::invalid("hours", "must not be negative"));
    }
    Ok(())
}

impl Engine {
    /// Debit `hours` from the teacher's balance. Returns the new balance.
    pub async fn reserve_hours(
        self: &Arc<Self>,
        teacher_id: Id,
        hours: Decimal,
    ) -> Result<Decimal, EngineError> {
        ensure_non_negative(hours)?;
        let engine = Arc::clone(self);
        detached(async move {
            let mut guard = engine.lock_teacher(teacher_id).await?;
            ensure_available(&guard, hours, Decimal::ZERO)?;
            let event = Event::HoursReserved { teacher_id, hours };
            engine.commit(event, &mut [&mut *guard], &mut []).await?;
            Ok(guard.working_hours)
        })
        .await
    }

    /// Credit `hours` back. The balance may not exceed the configured ceiling.
    pub async fn release_hours(
        self: &Arc<Self>,
        teacher_id: Id,
        hours: Decimal,
    ) -> Result<Decimal, EngineError> {
        ensure_non_negative(hours)?;
        let engine = Arc::clone(self);
        detached(async move {
            let mut guard = engine.lock_teacher(teacher_id).await?;
            if guard.working_hours + hours > Decimal::from(MAX_WORKING_HOURS) {
                return Err(EngineError::LimitExceeded("working hours above maximum"));
            }
            let event = Event::HoursReleased { teacher_id, hours };
            engine.commit(event, &mut [&mut *guard], &mut []).await?;
            Ok(guard.working_hours)
        })
        .await
    }

    pub async fn working_hours(&self, teacher_id: Id) -> Result<Decimal, EngineError> {
        let row = self
            .get_teacher_row(teacher_id)
            .ok_or(EngineError::NotFound(Entity::Teacher, teacher_id))?;
        let guard = row.read().await;
        if guard.retired {
            return Err(EngineError::NotFound(Entity::Teacher, teacher_id));
        }
        Ok(guard.working_hours)
    }
}
