mod admission;
mod conflict;
mod error;
mod ledger;
mod mutations;
mod queries;

pub use conflict::check_window;
pub use error::{EngineError, Entity};
pub use ledger::hours_of;

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedRwLockWriteGuard, RwLock};

use crate::config::AdmissionPolicy;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::{Wal, WalHandle};

pub type SharedTeacher = Arc<RwLock<TeacherState>>;
pub type SharedClassroom = Arc<RwLock<ClassroomState>>;

type TeacherGuard = OwnedRwLockWriteGuard<TeacherState>;
type ClassroomGuard = OwnedRwLockWriteGuard<ClassroomState>;

/// Per-table id sequences. Ids are never reused, even across compaction.
#[derive(Default)]
struct Sequences {
    teacher: AtomicI64,
    classroom: AtomicI64,
    course: AtomicI64,
    student: AtomicI64,
    schedule: AtomicI64,
}

impl Sequences {
    fn next(counter: &AtomicI64) -> Id {
        counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn observe(counter: &AtomicI64, id: Id) {
        counter.fetch_max(id, Ordering::SeqCst);
    }
}

/// The scheduling engine of one tenant.
///
/// Teachers and classrooms are rows behind their own `RwLock`; everything a
/// mutation touches is locked (teachers ascending, then classrooms ascending),
/// checked, written to the WAL as a single event, and only then applied.
pub struct Engine {
    pub(super) teachers: DashMap<Id, SharedTeacher>,
    pub(super) classrooms: DashMap<Id, SharedClassroom>,
    pub(super) courses: DashMap<Id, Course>,
    pub(super) students: DashMap<Id, Student>,
    /// Teacher id → (name, subject). Lock-free lookups for joins and uniqueness.
    pub(super) teacher_names: DashMap<Id, (String, String)>,
    pub(super) classroom_names: DashMap<Id, String>,
    /// Schedule id → (teacher id, classroom id).
    pub(super) lesson_owner: DashMap<Id, (Id, Id)>,
    seq: Sequences,
    /// Serializes creation, renaming and deletion of catalog rows.
    pub(super) catalog: Mutex<()>,
    wal: WalHandle,
    pub notify: Arc<NotifyHub>,
    pub(super) policy: AdmissionPolicy,
}

/// Apply an event to one teacher row. Caller holds the write lock.
fn apply_to_teacher(ts: &mut TeacherState, event: &Event) {
    let me = ts.id;
    match event {
        Event::TeacherUpdated {
            id,
            name,
            subject,
            working_hours,
        } if *id == me => {
            ts.name = name.clone();
            ts.subject = subject.clone();
            if let Some(hours) = working_hours {
                ts.working_hours = *hours;
            }
        }
        Event::TeacherDeleted { id } if *id == me => ts.retired = true,
        Event::HoursReserved { teacher_id, hours } if *teacher_id == me => {
            ts.working_hours -= *hours;
        }
        Event::HoursReleased { teacher_id, hours } if *teacher_id == me => {
            ts.working_hours += *hours;
        }
        Event::ScheduleAdmitted {
            id,
            teacher_id,
            classroom_id,
            group_name,
            day,
            span,
            hours,
        } if *teacher_id == me => {
            ts.working_hours -= *hours;
            ts.insert_lesson(Lesson {
                id: *id,
                classroom_id: *classroom_id,
                group_name: group_name.clone(),
                day: *day,
                span: *span,
            });
        }
        Event::ScheduleRevised {
            id,
            previous_teacher_id,
            teacher_id,
            classroom_id,
            group_name,
            day,
            span,
            released,
            reserved,
            ..
        } => {
            if *previous_teacher_id == me {
                ts.remove_lesson(*id);
                ts.working_hours += *released;
            }
            if *teacher_id == me {
                ts.working_hours -= *reserved;
                ts.insert_lesson(Lesson {
                    id: *id,
                    classroom_id: *classroom_id,
                    group_name: group_name.clone(),
                    day: *day,
                    span: *span,
                });
            }
        }
        Event::ScheduleWithdrawn {
            id,
            teacher_id,
            released,
            ..
        } if *teacher_id == me => {
            ts.remove_lesson(*id);
            ts.working_hours += *released;
        }
        _ => {}
    }
}

/// Apply an event to one classroom row. Caller holds the write lock.
fn apply_to_classroom(cs: &mut ClassroomState, event: &Event) {
    let me = cs.id;
    match event {
        Event::ClassroomUpdated {
            id,
            name,
            capacity,
            description,
        } if *id == me => {
            cs.name = name.clone();
            cs.capacity = *capacity;
            cs.description = description.clone();
        }
        Event::ClassroomDeleted { id } if *id == me => cs.retired = true,
        Event::ScheduleAdmitted {
            id,
            teacher_id,
            classroom_id,
            day,
            span,
            ..
        } if *classroom_id == me => cs.occupy(Occupancy {
            id: *id,
            teacher_id: *teacher_id,
            day: *day,
            span: *span,
        }),
        Event::ScheduleRevised {
            id,
            previous_classroom_id,
            teacher_id,
            classroom_id,
            day,
            span,
            ..
        } => {
            if *previous_classroom_id == me {
                cs.vacate(*id);
            }
            if *classroom_id == me {
                cs.occupy(Occupancy {
                    id: *id,
                    teacher_id: *teacher_id,
                    day: *day,
                    span: *span,
                });
            }
        }
        Event::ScheduleWithdrawn {
            id, classroom_id, ..
        } if *classroom_id == me => {
            cs.vacate(*id);
        }
        _ => {}
    }
}

/// Rows rebuilt from the log before they are shared.
#[derive(Default)]
struct Replay {
    teachers: HashMap<Id, TeacherState>,
    classrooms: HashMap<Id, ClassroomState>,
}

impl Replay {
    fn apply(&mut self, event: &Event) {
        match event {
            Event::TeacherCreated {
                id,
                name,
                subject,
                working_hours,
            } => {
                let ts = TeacherState::new(*id, name.clone(), subject.clone(), *working_hours);
                self.teachers.insert(*id, ts);
            }
            Event::TeacherDeleted { id } => {
                self.teachers.remove(id);
            }
            Event::ClassroomCreated {
                id,
                name,
                capacity,
                description,
            } => {
                let cs = ClassroomState::new(*id, name.clone(), *capacity, description.clone());
                self.classrooms.insert(*id, cs);
            }
            Event::ClassroomDeleted { id } => {
                self.classrooms.remove(id);
            }
            other => {
                for tid in other.teacher_ids() {
                    if let Some(ts) = self.teachers.get_mut(&tid) {
                        apply_to_teacher(ts, other);
                    }
                }
                for cid in other.classroom_ids() {
                    if let Some(cs) = self.classrooms.get_mut(&cid) {
                        apply_to_classroom(cs, other);
                    }
                }
            }
        }
    }
}

pub(super) fn storage(e: io::Error) -> EngineError {
    EngineError::Storage(e.to_string())
}

/// Run a mutation on its own task. Dropping the caller detaches it instead of
/// interrupting it between the WAL append and the in-memory apply.
pub(super) async fn detached<T, F>(mutation: F) -> Result<T, EngineError>
where
    F: Future<Output = Result<T, EngineError>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(mutation)
        .await
        .map_err(|e| EngineError::Storage(format!("mutation task failed: {e}")))?
}

impl Engine {
    /// Replay the log at `wal_path` and start its writer task.
    pub fn new(
        wal_path: PathBuf,
        notify: Arc<NotifyHub>,
        policy: AdmissionPolicy,
    ) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = WalHandle::spawn(Wal::open(&wal_path)?);

        let engine = Self {
            teachers: DashMap::new(),
            classrooms: DashMap::new(),
            courses: DashMap::new(),
            students: DashMap::new(),
            teacher_names: DashMap::new(),
            classroom_names: DashMap::new(),
            lesson_owner: DashMap::new(),
            seq: Sequences::default(),
            catalog: Mutex::new(()),
            wal,
            notify,
            policy,
        };

        let mut replay = Replay::default();
        for event in &events {
            replay.apply(event);
            engine.index(event);
        }
        for (id, ts) in replay.teachers {
            engine.teachers.insert(id, Arc::new(RwLock::new(ts)));
        }
        for (id, cs) in replay.classrooms {
            engine.classrooms.insert(id, Arc::new(RwLock::new(cs)));
        }

        tracing::debug!(
            "replayed {} events: {} teachers, {} classrooms, {} courses, {} students, {} lessons",
            events.len(),
            engine.teachers.len(),
            engine.classrooms.len(),
            engine.courses.len(),
            engine.students.len(),
            engine.lesson_owner.len()
        );
        Ok(engine)
    }

    /// Maintain the lock-free indexes and sequences. Runs for every committed event.
    fn index(&self, event: &Event) {
        match event {
            Event::TeacherCreated {
                id, name, subject, ..
            }
            | Event::TeacherUpdated {
                id, name, subject, ..
            } => {
                Sequences::observe(&self.seq.teacher, *id);
                self.teacher_names
                    .insert(*id, (name.clone(), subject.clone()));
            }
            Event::TeacherDeleted { id } => {
                self.teacher_names.remove(id);
                for mut course in self.courses.iter_mut() {
                    if course.teacher_id == Some(*id) {
                        course.teacher_id = None;
                    }
                }
            }
            Event::ClassroomCreated { id, name, .. } | Event::ClassroomUpdated { id, name, .. } => {
                Sequences::observe(&self.seq.classroom, *id);
                self.classroom_names.insert(*id, name.clone());
            }
            Event::ClassroomDeleted { id } => {
                self.classroom_names.remove(id);
            }
            Event::CourseCreated {
                id,
                name,
                description,
                teacher_id,
            }
            | Event::CourseUpdated {
                id,
                name,
                description,
                teacher_id,
            } => {
                Sequences::observe(&self.seq.course, *id);
                self.courses.insert(
                    *id,
                    Course {
                        id: *id,
                        name: name.clone(),
                        description: description.clone(),
                        teacher_id: *teacher_id,
                    },
                );
            }
            Event::CourseDeleted { id } => {
                self.courses.remove(id);
            }
            Event::StudentCreated {
                id,
                name,
                date_of_birth,
                group_name,
            }
            | Event::StudentUpdated {
                id,
                name,
                date_of_birth,
                group_name,
            } => {
                Sequences::observe(&self.seq.student, *id);
                self.students.insert(
                    *id,
                    Student {
                        id: *id,
                        name: name.clone(),
                        date_of_birth: *date_of_birth,
                        group_name: group_name.clone(),
                    },
                );
            }
            Event::StudentDeleted { id } => {
                self.students.remove(id);
            }
            Event::ScheduleAdmitted {
                id,
                teacher_id,
                classroom_id,
                ..
            }
            | Event::ScheduleRevised {
                id,
                teacher_id,
                classroom_id,
                ..
            } => {
                Sequences::observe(&self.seq.schedule, *id);
                self.lesson_owner.insert(*id, (*teacher_id, *classroom_id));
            }
            Event::ScheduleWithdrawn { id, .. } => {
                self.lesson_owner.remove(id);
            }
            Event::SequencesAdvanced {
                teacher,
                classroom,
                course,
                student,
                schedule,
            } => {
                Sequences::observe(&self.seq.teacher, *teacher);
                Sequences::observe(&self.seq.classroom, *classroom);
                Sequences::observe(&self.seq.course, *course);
                Sequences::observe(&self.seq.student, *student);
                Sequences::observe(&self.seq.schedule, *schedule);
            }
            Event::HoursReserved { .. } | Event::HoursReleased { .. } => {}
        }
    }

    pub(super) fn next_teacher_id(&self) -> Id {
        Sequences::next(&self.seq.teacher)
    }

    pub(super) fn next_classroom_id(&self) -> Id {
        Sequences::next(&self.seq.classroom)
    }

    pub(super) fn next_course_id(&self) -> Id {
        Sequences::next(&self.seq.course)
    }

    pub(super) fn next_student_id(&self) -> Id {
        Sequences::next(&self.seq.student)
    }

    pub(super) fn next_schedule_id(&self) -> Id {
        Sequences::next(&self.seq.schedule)
    }

    pub(super) fn sequences_event(&self) -> Event {
        Event::SequencesAdvanced {
            teacher: self.seq.teacher.load(Ordering::SeqCst),
            classroom: self.seq.classroom.load(Ordering::SeqCst),
            course: self.seq.course.load(Ordering::SeqCst),
            student: self.seq.student.load(Ordering::SeqCst),
            schedule: self.seq.schedule.load(Ordering::SeqCst),
        }
    }

    /// Durably log `event`, then apply it to the locked rows and indexes.
    ///
    /// Nothing is applied unless the append succeeded, so a failed commit leaves
    /// memory and disk as they were.
    pub(super) async fn commit(
        &self,
        event: Event,
        teachers: &mut [&mut TeacherState],
        classrooms: &mut [&mut ClassroomState],
    ) -> Result<(), EngineError> {
        self.wal.append(event.clone()).await.map_err(storage)?;
        for ts in teachers.iter_mut() {
            apply_to_teacher(ts, &event);
        }
        for cs in classrooms.iter_mut() {
            apply_to_classroom(cs, &event);
        }
        self.index(&event);
        self.notify.publish(&event);
        Ok(())
    }

    /// Log an event for a row that has no lock of its own (creations, courses and students).
    pub(super) async fn commit_catalog(&self, event: Event) -> Result<(), EngineError> {
        self.wal.append(event.clone()).await.map_err(storage)?;
        match &event {
            Event::TeacherCreated {
                id,
                name,
                subject,
                working_hours,
            } => {
                let ts = TeacherState::new(*id, name.clone(), subject.clone(), *working_hours);
                self.teachers.insert(*id, Arc::new(RwLock::new(ts)));
            }
            Event::ClassroomCreated {
                id,
                name,
                capacity,
                description,
            } => {
                let cs = ClassroomState::new(*id, name.clone(), *capacity, description.clone());
                self.classrooms.insert(*id, Arc::new(RwLock::new(cs)));
            }
            _ => {}
        }
        self.index(&event);
        self.notify.publish(&event);
        Ok(())
    }

    pub fn get_teacher_row(&self, id: Id) -> Option<SharedTeacher> {
        self.teachers.get(&id).map(|e| e.value().clone())
    }

    pub fn get_classroom_row(&self, id: Id) -> Option<SharedClassroom> {
        self.classrooms.get(&id).map(|e| e.value().clone())
    }

    /// Write-lock a teacher row. A row retired while we waited is reported missing.
    pub(super) async fn lock_teacher(&self, id: Id) -> Result<TeacherGuard, EngineError> {
        let row = self
            .get_teacher_row(id)
            .ok_or(EngineError::NotFound(Entity::Teacher, id))?;
        let guard = row.write_owned().await;
        if guard.retired {
            return Err(EngineError::NotFound(Entity::Teacher, id));
        }
        Ok(guard)
    }

    pub(super) async fn lock_classroom(&self, id: Id) -> Result<ClassroomGuard, EngineError> {
        let row = self
            .get_classroom_row(id)
            .ok_or(EngineError::NotFound(Entity::Classroom, id))?;
        let guard = row.write_owned().await;
        if guard.retired {
            return Err(EngineError::NotFound(Entity::Classroom, id));
        }
        Ok(guard)
    }

    /// Lock several teacher rows in ascending id order. Duplicates are locked once.
    pub(super) async fn lock_teachers(&self, ids: &[Id]) -> Result<Vec<TeacherGuard>, EngineError> {
        let mut ids = ids.to_vec();
        ids.sort_unstable();
        ids.dedup();
        let mut guards = Vec::with_capacity(ids.len());
        for id in ids {
            guards.push(self.lock_teacher(id).await?);
        }
        Ok(guards)
    }

    pub(super) async fn lock_classrooms(
        &self,
        ids: &[Id],
    ) -> Result<Vec<ClassroomGuard>, EngineError> {
        let mut ids = ids.to_vec();
        ids.sort_unstable();
        ids.dedup();
        let mut guards = Vec::with_capacity(ids.len());
        for id in ids {
            guards.push(self.lock_classroom(id).await?);
        }
        Ok(guards)
    }

    pub(super) fn teacher_name(&self, id: Id) -> Option<String> {
        self.teacher_names.get(&id).map(|e| e.value().0.clone())
    }

    pub(super) fn classroom_name(&self, id: Id) -> Option<String> {
        self.classroom_names.get(&id).map(|e| e.value().clone())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        self.wal.appends_since_compact().await
    }

    pub(super) async fn rewrite_wal(&self, events: Vec<Event>) -> Result<(), EngineError> {
        self.wal.compact(events).await.map_err(storage)
    }
}
