use std::sync::Arc;
use std::time::Instant;

use rust_decimal::Decimal;

use crate::limits::MAX_LESSONS_PER_TEACHER;
use crate::model::*;
use crate::observability;
use crate::validation::validate_group_name;

use super::conflict::{check_classroom_free, check_day, check_teacher_free, check_window};
use super::ledger::{ensure_available, hours_of};
use super::{Engine, EngineError, Entity, detached};

fn record<T>(op: &'static str, result: &Result<T, EngineError>, started: Instant) {
    let outcome = match result {
        Ok(_) => "admitted",
        Err(e) => e.kind(),
    };
    metrics::counter!(observability::ADMISSIONS_TOTAL, "op" => op, "outcome" => outcome)
        .increment(1);
    metrics::histogram!(observability::ADMISSION_DURATION_SECONDS, "op" => op)
        .record(started.elapsed().as_secs_f64());
    if let Err(e) = result {
        tracing::debug!("{op} rejected: {e}");
    }
}

impl Engine {
    /// Admit a lesson: window, conflict, hours, insert. All or nothing.
    ///
    /// Runs detached, so a caller that goes away mid-flight cannot leave the debit
    /// logged without the lesson or the other way round.
    pub async fn propose_schedule(
        self: &Arc<Self>,
        proposal: ProposedSchedule,
    ) -> Result<ScheduleEntry, EngineError> {
        let started = Instant::now();
        let engine = Arc::clone(self);
        let result = detached(async move { engine.admit(proposal).await }).await;
        record("propose", &result, started);
        result
    }

    /// Move, retime or relabel an existing lesson through the same checks as admission.
    pub async fn revise_schedule(
        self: &Arc<Self>,
        id: Id,
        patch: SchedulePatch,
    ) -> Result<ScheduleEntry, EngineError> {
        let started = Instant::now();
        let engine = Arc::clone(self);
        let result = detached(async move { engine.revise(id, patch).await }).await;
        record("revise", &result, started);
        result
    }

    /// Remove a lesson and refund its hours. Returns the removed entry.
    pub async fn withdraw_schedule(self: &Arc<Self>, id: Id) -> Result<ScheduleEntry, EngineError> {
        let started = Instant::now();
        let engine = Arc::clone(self);
        let result = detached(async move { engine.withdraw(id).await }).await;
        record("withdraw", &result, started);
        result
    }

    async fn admit(&self, p: ProposedSchedule) -> Result<ScheduleEntry, EngineError> {
        let span = check_window(p.start, p.end)?;
        validate_group_name(&p.group_name)?;
        check_day(self.policy.day_check, p.day, p.start)?;

        let mut teacher = self.lock_teacher(p.teacher_id).await?;
        let mut room = self.lock_classroom(p.classroom_id).await?;
        if teacher.lessons.len() >= MAX_LESSONS_PER_TEACHER {
            return Err(EngineError::LimitExceeded("too many lessons for teacher"));
        }

        check_teacher_free(&teacher, p.day, &span, None)?;
        if self.policy.classroom_conflicts {
            check_classroom_free(&room, p.day, &span, None)?;
        }
        let hours = hours_of(&span);
        ensure_available(&teacher, hours, Decimal::ZERO)?;

        let id = self.next_schedule_id();
        let event = Event::ScheduleAdmitted {
            id,
            teacher_id: p.teacher_id,
            classroom_id: p.classroom_id,
            group_name: p.group_name.clone(),
            day: p.day,
            span,
            hours,
        };
        self.commit(event, &mut [&mut *teacher], &mut [&mut *room])
            .await?;

        Ok(ScheduleEntry {
            id,
            teacher_id: p.teacher_id,
            teacher_name: teacher.name.clone(),
            classroom_id: p.classroom_id,
            classroom_name: Some(room.name.clone()),
            group_name: p.group_name,
            start: span.start,
            end: span.end,
            day: p.day,
        })
    }

    fn owner_of(&self, id: Id) -> Result<(Id, Id), EngineError> {
        self.lesson_owner
            .get(&id)
            .map(|e| *e.value())
            .ok_or(EngineError::NotFound(Entity::Schedule, id))
    }

    async fn revise(&self, id: Id, patch: SchedulePatch) -> Result<ScheduleEntry, EngineError> {
        if patch.is_empty() {
            return Err(EngineError::invalid("update", "no fields to update"));
        }
        if let Some(group) = &patch.group_name {
            validate_group_name(group)?;
        }
        loop {
            let (old_tid, old_cid) = self.owner_of(id)?;
            let new_tid = patch.teacher_id.unwrap_or(old_tid);
            let new_cid = patch.classroom_id.unwrap_or(old_cid);

            let mut teachers = self.lock_teachers(&[old_tid, new_tid]).await?;
            let mut rooms = self.lock_classrooms(&[old_cid, new_cid]).await?;
            if self.owner_of(id)? != (old_tid, old_cid) {
                // Revised by someone else while we queued for the locks.
                continue;
            }

            let Some(old) = teachers
                .iter()
                .find(|t| t.id == old_tid)
                .and_then(|t| t.lesson(id))
                .cloned()
            else {
                return Err(EngineError::NotFound(Entity::Schedule, id));
            };
            let day = patch.day.unwrap_or(old.day);
            let group_name = patch.group_name.clone().unwrap_or(old.group_name);
            let span = check_window(
                patch.start.unwrap_or(old.span.start),
                patch.end.unwrap_or(old.span.end),
            )?;
            check_day(self.policy.day_check, day, span.start)?;

            let ti = teachers
                .iter()
                .position(|t| t.id == new_tid)
                .ok_or(EngineError::NotFound(Entity::Teacher, new_tid))?;
            let ci = rooms
                .iter()
                .position(|c| c.id == new_cid)
                .ok_or(EngineError::NotFound(Entity::Classroom, new_cid))?;
            if new_tid != old_tid && teachers[ti].lessons.len() >= MAX_LESSONS_PER_TEACHER {
                return Err(EngineError::LimitExceeded("too many lessons for teacher"));
            }

            check_teacher_free(&teachers[ti], day, &span, Some(id))?;
            if self.policy.classroom_conflicts {
                check_classroom_free(&rooms[ci], day, &span, Some(id))?;
            }
            let released = hours_of(&old.span);
            let reserved = hours_of(&span);
            let credit = if new_tid == old_tid { released } else { Decimal::ZERO };
            ensure_available(&teachers[ti], reserved, credit)?;

            let event = Event::ScheduleRevised {
                id,
                previous_teacher_id: old_tid,
                previous_classroom_id: old_cid,
                teacher_id: new_tid,
                classroom_id: new_cid,
                group_name: group_name.clone(),
                day,
                span,
                released,
                reserved,
            };
            {
                let mut ts: Vec<&mut TeacherState> = teachers.iter_mut().map(|g| &mut **g).collect();
                let mut cs: Vec<&mut ClassroomState> = rooms.iter_mut().map(|g| &mut **g).collect();
                self.commit(event, &mut ts, &mut cs).await?;
            }

            return Ok(ScheduleEntry {
                id,
                teacher_id: new_tid,
                teacher_name: teachers[ti].name.clone(),
                classroom_id: new_cid,
                classroom_name: Some(rooms[ci].name.clone()),
                group_name,
                start: span.start,
                end: span.end,
                day,
            });
        }
    }

    async fn withdraw(&self, id: Id) -> Result<ScheduleEntry, EngineError> {
        loop {
            let (tid, cid) = self.owner_of(id)?;
            let mut teacher = self.lock_teacher(tid).await?;
            let mut room = self.lock_classroom(cid).await?;
            if self.owner_of(id)? != (tid, cid) {
                continue;
            }
            let lesson = teacher
                .lesson(id)
                .cloned()
                .ok_or(EngineError::NotFound(Entity::Schedule, id))?;

            let event = Event::ScheduleWithdrawn {
                id,
                teacher_id: tid,
                classroom_id: cid,
                released: hours_of(&lesson.span),
            };
            self.commit(event, &mut [&mut *teacher], &mut [&mut *room])
                .await?;

            return Ok(ScheduleEntry {
                id,
                teacher_id: tid,
                teacher_name: teacher.name.clone(),
                classroom_id: cid,
                classroom_name: Some(room.name.clone()),
                group_name: lesson.group_name,
                start: lesson.span.start,
                end: lesson.span.end,
                day: lesson.day,
            });
        }
    }
}
