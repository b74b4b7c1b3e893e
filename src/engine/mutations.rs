use chrono::Utc;

use crate::limits::*;
use crate::model::*;
use crate::validation::*;

use super::ledger::hours_of;
use super::{Engine, EngineError, Entity};

fn nothing_to_update() -> EngineError {
    EngineError::invalid("update", "no fields to update")
}

impl Engine {
    fn ensure_teacher_unique(
        &self,
        name: &str,
        subject: &str,
        except: Option<Id>,
    ) -> Result<(), EngineError> {
        let taken = self.teacher_names.iter().any(|e| {
            Some(*e.key()) != except && e.value().0 == name && e.value().1 == subject
        });
        if taken {
            return Err(EngineError::AlreadyExists(
                Entity::Teacher,
                format!("{name} ({subject})"),
            ));
        }
        Ok(())
    }

    fn ensure_course_unique(&self, name: &str, except: Option<Id>) -> Result<(), EngineError> {
        if self
            .courses
            .iter()
            .any(|c| Some(c.id) != except && c.name == name)
        {
            return Err(EngineError::AlreadyExists(Entity::Course, name.to_string()));
        }
        Ok(())
    }

    fn ensure_teacher_exists(&self, id: Id) -> Result<(), EngineError> {
        if !self.teacher_names.contains_key(&id) {
            return Err(EngineError::NotFound(Entity::Teacher, id));
        }
        Ok(())
    }

    /// Students join their course by name.
    fn ensure_course_named(&self, name: &str) -> Result<(), EngineError> {
        if !self.courses.iter().any(|c| c.name == name) {
            return Err(EngineError::invalid(
                "group_name",
                format!("course with name {name:?} does not exist"),
            ));
        }
        Ok(())
    }

    // ── Teachers ─────────────────────────────────────────────────

    pub async fn create_teacher(&self, t: NewTeacher) -> Result<TeacherInfo, EngineError> {
        validate_new_teacher(&t)?;
        let _catalog = self.catalog.lock().await;
        if self.teachers.len() >= MAX_TEACHERS_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many teachers"));
        }
        self.ensure_teacher_unique(&t.name, &t.subject, None)?;

        let id = self.next_teacher_id();
        self.commit_catalog(Event::TeacherCreated {
            id,
            name: t.name.clone(),
            subject: t.subject.clone(),
            working_hours: t.working_hours,
        })
        .await?;
        tracing::info!("teacher {id} created: {} ({})", t.name, t.subject);
        Ok(TeacherInfo {
            id,
            name: t.name,
            subject: t.subject,
            courses: Vec::new(),
            working_hours: t.working_hours,
        })
    }

    /// Name and subject changes never touch the balance; only an explicit
    /// `working_hours` in the patch reassigns it.
    pub async fn update_teacher(
        &self,
        id: Id,
        patch: TeacherPatch,
    ) -> Result<TeacherInfo, EngineError> {
        if patch.is_empty() {
            return Err(nothing_to_update());
        }
        validate_teacher_patch(&patch)?;
        let _catalog = self.catalog.lock().await;
        let mut guard = self.lock_teacher(id).await?;

        let name = patch.name.unwrap_or_else(|| guard.name.clone());
        let subject = patch.subject.unwrap_or_else(|| guard.subject.clone());
        if name != guard.name || subject != guard.subject {
            self.ensure_teacher_unique(&name, &subject, Some(id))?;
        }

        let event = Event::TeacherUpdated {
            id,
            name,
            subject,
            working_hours: patch.working_hours,
        };
        self.commit(event, &mut [&mut *guard], &mut []).await?;
        Ok(self.teacher_info(&guard))
    }

    /// Fails with `HasLessons` while the teacher still has schedule entries.
    /// Courses taught by the teacher are left unassigned.
    pub async fn delete_teacher(&self, id: Id) -> Result<(), EngineError> {
        let _catalog = self.catalog.lock().await;
        let mut guard = self.lock_teacher(id).await?;
        if !guard.lessons.is_empty() {
            return Err(EngineError::HasLessons(Entity::Teacher, id));
        }
        self.commit(Event::TeacherDeleted { id }, &mut [&mut *guard], &mut [])
            .await?;
        self.teachers.remove(&id);
        self.notify.remove(id);
        tracing::info!("teacher {id} deleted");
        Ok(())
    }

    // ── Classrooms ───────────────────────────────────────────────

    pub async fn create_classroom(&self, c: NewClassroom) -> Result<ClassroomInfo, EngineError> {
        validate_new_classroom(&c)?;
        let _catalog = self.catalog.lock().await;
        if self.classrooms.len() >= MAX_CLASSROOMS_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many classrooms"));
        }
        let id = self.next_classroom_id();
        self.commit_catalog(Event::ClassroomCreated {
            id,
            name: c.name.clone(),
            capacity: c.capacity,
            description: c.description.clone(),
        })
        .await?;
        Ok(ClassroomInfo {
            id,
            name: c.name,
            capacity: c.capacity,
            description: c.description,
        })
    }

    pub async fn update_classroom(
        &self,
        id: Id,
        patch: ClassroomPatch,
    ) -> Result<ClassroomInfo, EngineError> {
        if patch.is_empty() {
            return Err(nothing_to_update());
        }
        validate_classroom_patch(&patch)?;
        let _catalog = self.catalog.lock().await;
        let mut guard = self.lock_classroom(id).await?;

        let event = Event::ClassroomUpdated {
            id,
            name: patch.name.unwrap_or_else(|| guard.name.clone()),
            capacity: patch.capacity.unwrap_or(guard.capacity),
            description: patch
                .description
                .unwrap_or_else(|| guard.description.clone()),
        };
        self.commit(event, &mut [], &mut [&mut *guard]).await?;
        Ok(ClassroomInfo {
            id,
            name: guard.name.clone(),
            capacity: guard.capacity,
            description: guard.description.clone(),
        })
    }

    pub async fn delete_classroom(&self, id: Id) -> Result<(), EngineError> {
        let _catalog = self.catalog.lock().await;
        let mut guard = self.lock_classroom(id).await?;
        if !guard.occupancy.is_empty() {
            return Err(EngineError::HasLessons(Entity::Classroom, id));
        }
        self.commit(Event::ClassroomDeleted { id }, &mut [], &mut [&mut *guard])
            .await?;
        self.classrooms.remove(&id);
        Ok(())
    }

    // ── Courses ──────────────────────────────────────────────────

    pub async fn create_course(&self, c: NewCourse) -> Result<CourseInfo, EngineError> {
        validate_new_course(&c)?;
        let _catalog = self.catalog.lock().await;
        if self.courses.len() >= MAX_COURSES_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many courses"));
        }
        self.ensure_course_unique(&c.name, None)?;
        if let Some(tid) = c.teacher_id {
            self.ensure_teacher_exists(tid)?;
        }

        let id = self.next_course_id();
        self.commit_catalog(Event::CourseCreated {
            id,
            name: c.name,
            description: c.description,
            teacher_id: c.teacher_id,
        })
        .await?;
        self.get_course(id)
    }

    pub async fn update_course(&self, id: Id, patch: CoursePatch) -> Result<CourseInfo, EngineError> {
        if patch.is_empty() {
            return Err(nothing_to_update());
        }
        validate_course_patch(&patch)?;
        let _catalog = self.catalog.lock().await;
        let current = self
            .courses
            .get(&id)
            .map(|c| c.value().clone())
            .ok_or(EngineError::NotFound(Entity::Course, id))?;

        let name = patch.name.unwrap_or(current.name);
        self.ensure_course_unique(&name, Some(id))?;
        let teacher_id = patch.teacher_id.unwrap_or(current.teacher_id);
        if let Some(tid) = teacher_id {
            self.ensure_teacher_exists(tid)?;
        }

        self.commit_catalog(Event::CourseUpdated {
            id,
            name,
            description: patch.description.unwrap_or(current.description),
            teacher_id,
        })
        .await?;
        self.get_course(id)
    }

    pub async fn delete_course(&self, id: Id) -> Result<(), EngineError> {
        let _catalog = self.catalog.lock().await;
        if !self.courses.contains_key(&id) {
            return Err(EngineError::NotFound(Entity::Course, id));
        }
        self.commit_catalog(Event::CourseDeleted { id }).await
    }

    // ── Students ─────────────────────────────────────────────────

    pub async fn create_student(&self, s: NewStudent) -> Result<StudentInfo, EngineError> {
        let today = Utc::now().date_naive();
        validate_new_student(&s, today)?;
        let _catalog = self.catalog.lock().await;
        if self.students.len() >= MAX_STUDENTS_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many students"));
        }
        self.ensure_course_named(&s.group_name)?;

        let id = self.next_student_id();
        self.commit_catalog(Event::StudentCreated {
            id,
            name: s.name.clone(),
            date_of_birth: s.date_of_birth,
            group_name: s.group_name.clone(),
        })
        .await?;
        tracing::info!("student {id} enrolled in {}", s.group_name);
        Ok(self.student_info(
            Student {
                id,
                name: s.name,
                date_of_birth: s.date_of_birth,
                group_name: s.group_name,
            },
            today,
        ))
    }

    /// A changed `group_name` must name an existing course. An unchanged one is
    /// kept even if its course has since been renamed or deleted.
    pub async fn update_student(
        &self,
        id: Id,
        patch: StudentPatch,
    ) -> Result<StudentInfo, EngineError> {
        if patch.is_empty() {
            return Err(nothing_to_update());
        }
        let today = Utc::now().date_naive();
        validate_student_patch(&patch, today)?;
        let _catalog = self.catalog.lock().await;
        let current = self
            .students
            .get(&id)
            .map(|s| s.value().clone())
            .ok_or(EngineError::NotFound(Entity::Student, id))?;

        let group_name = match patch.group_name {
            Some(group) if group != current.group_name => {
                self.ensure_course_named(&group)?;
                group
            }
            _ => current.group_name,
        };
        let updated = Student {
            id,
            name: patch.name.unwrap_or(current.name),
            date_of_birth: patch.date_of_birth.unwrap_or(current.date_of_birth),
            group_name,
        };
        self.commit_catalog(Event::StudentUpdated {
            id,
            name: updated.name.clone(),
            date_of_birth: updated.date_of_birth,
            group_name: updated.group_name.clone(),
        })
        .await?;
        Ok(self.student_info(updated, today))
    }

    pub async fn delete_student(&self, id: Id) -> Result<(), EngineError> {
        let _catalog = self.catalog.lock().await;
        if !self.students.contains_key(&id) {
            return Err(EngineError::NotFound(Entity::Student, id));
        }
        self.commit_catalog(Event::StudentDeleted { id }).await
    }

    // ── Compaction ───────────────────────────────────────────────

    /// Rewrite the WAL as the minimal event list that rebuilds the current state.
    ///
    /// Every row stays write-locked until the new log is installed, so no commit can
    /// land in the old file after the snapshot was taken.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _catalog = self.catalog.lock().await;
        let teacher_ids: Vec<Id> = self.teachers.iter().map(|e| *e.key()).collect();
        let classroom_ids: Vec<Id> = self.classrooms.iter().map(|e| *e.key()).collect();
        let teachers = self.lock_teachers(&teacher_ids).await?;
        let rooms = self.lock_classrooms(&classroom_ids).await?;

        let mut events = vec![self.sequences_event()];
        for cs in &rooms {
            events.push(Event::ClassroomCreated {
                id: cs.id,
                name: cs.name.clone(),
                capacity: cs.capacity,
                description: cs.description.clone(),
            });
        }
        for ts in &teachers {
            // Replayed admissions debit again, so start from the pre-lesson balance.
            let committed: rust_decimal::Decimal =
                ts.lessons.iter().map(|l| hours_of(&l.span)).sum();
            events.push(Event::TeacherCreated {
                id: ts.id,
                name: ts.name.clone(),
                subject: ts.subject.clone(),
                working_hours: ts.working_hours + committed,
            });
        }
        let mut courses: Vec<Course> = self.courses.iter().map(|c| c.value().clone()).collect();
        courses.sort_by_key(|c| c.id);
        for c in courses {
            events.push(Event::CourseCreated {
                id: c.id,
                name: c.name,
                description: c.description,
                teacher_id: c.teacher_id,
            });
        }
        let mut students: Vec<Student> = self.students.iter().map(|s| s.value().clone()).collect();
        students.sort_by_key(|s| s.id);
        for s in students {
            events.push(Event::StudentCreated {
                id: s.id,
                name: s.name,
                date_of_birth: s.date_of_birth,
                group_name: s.group_name,
            });
        }
        for ts in &teachers {
            for l in &ts.lessons {
                events.push(Event::ScheduleAdmitted {
                    id: l.id,
                    teacher_id: ts.id,
                    classroom_id: l.classroom_id,
                    group_name: l.group_name.clone(),
                    day: l.day,
                    span: l.span,
                    hours: hours_of(&l.span),
                });
            }
        }

        let count = events.len();
        self.rewrite_wal(events).await?;
        tracing::info!("WAL compacted to {count} events");
        Ok(())
    }
}
