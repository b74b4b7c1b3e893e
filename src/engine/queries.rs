use chrono::{NaiveDate, Utc};

use crate::model::*;

use super::{Engine, EngineError, Entity};

impl Engine {
    /// Names of the courses assigned to a teacher, in course id order.
    pub(super) fn courses_of(&self, teacher_id: Id) -> Vec<String> {
        let mut assigned: Vec<(Id, String)> = self
            .courses
            .iter()
            .filter(|c| c.teacher_id == Some(teacher_id))
            .map(|c| (c.id, c.name.clone()))
            .collect();
        assigned.sort_by_key(|(id, _)| *id);
        assigned.into_iter().map(|(_, name)| name).collect()
    }

    pub(super) fn teacher_info(&self, ts: &TeacherState) -> TeacherInfo {
        TeacherInfo {
            id: ts.id,
            name: ts.name.clone(),
            subject: ts.subject.clone(),
            courses: self.courses_of(ts.id),
            working_hours: ts.working_hours,
        }
    }

    fn entry(&self, teacher_id: Id, teacher_name: &str, lesson: Lesson) -> ScheduleEntry {
        ScheduleEntry {
            id: lesson.id,
            teacher_id,
            teacher_name: teacher_name.to_string(),
            classroom_id: lesson.classroom_id,
            classroom_name: self.classroom_name(lesson.classroom_id),
            group_name: lesson.group_name,
            start: lesson.span.start,
            end: lesson.span.end,
            day: lesson.day,
        }
    }

    pub async fn get_teacher(&self, id: Id) -> Result<TeacherInfo, EngineError> {
        let row = self
            .get_teacher_row(id)
            .ok_or(EngineError::NotFound(Entity::Teacher, id))?;
        let guard = row.read().await;
        if guard.retired {
            return Err(EngineError::NotFound(Entity::Teacher, id));
        }
        Ok(self.teacher_info(&guard))
    }

    pub async fn list_teachers(&self) -> Vec<TeacherInfo> {
        let rows: Vec<_> = self.teachers.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let guard = row.read().await;
            if !guard.retired {
                out.push(self.teacher_info(&guard));
            }
        }
        out.sort_by_key(|t| t.id);
        out
    }

    pub async fn get_classroom(&self, id: Id) -> Result<ClassroomInfo, EngineError> {
        let row = self
            .get_classroom_row(id)
            .ok_or(EngineError::NotFound(Entity::Classroom, id))?;
        let guard = row.read().await;
        if guard.retired {
            return Err(EngineError::NotFound(Entity::Classroom, id));
        }
        Ok(ClassroomInfo {
            id,
            name: guard.name.clone(),
            capacity: guard.capacity,
            description: guard.description.clone(),
        })
    }

    pub async fn list_classrooms(&self) -> Vec<ClassroomInfo> {
        let ids: Vec<Id> = self.classrooms.iter().map(|e| *e.key()).collect();
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Ok(info) = self.get_classroom(id).await {
                out.push(info);
            }
        }
        out.sort_by_key(|c| c.id);
        out
    }

    pub fn get_course(&self, id: Id) -> Result<CourseInfo, EngineError> {
        let course = self
            .courses
            .get(&id)
            .map(|c| c.value().clone())
            .ok_or(EngineError::NotFound(Entity::Course, id))?;
        Ok(CourseInfo {
            id,
            teacher_name: course.teacher_id.and_then(|t| self.teacher_name(t)),
            name: course.name,
            description: course.description,
            teacher_id: course.teacher_id,
        })
    }

    pub fn list_courses(&self) -> Vec<CourseInfo> {
        let mut ids: Vec<Id> = self.courses.iter().map(|c| c.id).collect();
        ids.sort_unstable();
        ids.into_iter()
            .filter_map(|id| self.get_course(id).ok())
            .collect()
    }

    /// Teacher of the course called `name`.
    fn course_teacher(&self, name: &str) -> Option<Id> {
        self.courses
            .iter()
            .find(|c| c.name == name)
            .and_then(|c| c.teacher_id)
    }

    pub(super) fn student_info(&self, student: Student, today: NaiveDate) -> StudentInfo {
        StudentInfo {
            id: student.id,
            age: age_on(student.date_of_birth, today),
            teacher_id: self.course_teacher(&student.group_name),
            name: student.name,
            date_of_birth: student.date_of_birth,
            group_name: student.group_name,
        }
    }

    /// Age is taken against today's UTC date.
    pub fn get_student(&self, id: Id) -> Result<StudentInfo, EngineError> {
        let student = self
            .students
            .get(&id)
            .map(|s| s.value().clone())
            .ok_or(EngineError::NotFound(Entity::Student, id))?;
        Ok(self.student_info(student, Utc::now().date_naive()))
    }

    pub fn list_students(&self) -> Vec<StudentInfo> {
        let today = Utc::now().date_naive();
        let mut rows: Vec<Student> = self.students.iter().map(|s| s.value().clone()).collect();
        rows.sort_by_key(|s| s.id);
        rows.into_iter()
            .map(|s| self.student_info(s, today))
            .collect()
    }

    pub async fn get_schedule(&self, id: Id) -> Result<ScheduleEntry, EngineError> {
        let not_found = EngineError::NotFound(Entity::Schedule, id);
        let (teacher_id, _) = self
            .lesson_owner
            .get(&id)
            .map(|e| *e.value())
            .ok_or_else(|| not_found.clone())?;
        let row = self.get_teacher_row(teacher_id).ok_or_else(|| not_found.clone())?;
        let (name, lesson) = {
            let guard = row.read().await;
            let lesson = guard.lesson(id).cloned().ok_or(not_found)?;
            (guard.name.clone(), lesson)
        };
        Ok(self.entry(teacher_id, &name, lesson))
    }

    /// One teacher's lessons on one day, by start time.
    pub async fn schedules_by_teacher_and_day(
        &self,
        teacher_id: Id,
        day: DayOfWeek,
    ) -> Result<Vec<ScheduleEntry>, EngineError> {
        let row = self
            .get_teacher_row(teacher_id)
            .ok_or(EngineError::NotFound(Entity::Teacher, teacher_id))?;
        let (name, lessons) = {
            let guard = row.read().await;
            if guard.retired {
                return Err(EngineError::NotFound(Entity::Teacher, teacher_id));
            }
            let lessons: Vec<Lesson> = guard.lessons.iter().filter(|l| l.day == day).cloned().collect();
            (guard.name.clone(), lessons)
        };
        Ok(lessons
            .into_iter()
            .map(|l| self.entry(teacher_id, &name, l))
            .collect())
    }

    /// All entries matching every set field of `filter`, ordered by start then id.
    pub async fn query_schedules(&self, filter: &ScheduleFilter) -> Vec<ScheduleEntry> {
        let candidates: Vec<Id> = match filter.teacher_id {
            Some(id) => vec![id],
            None => self.teachers.iter().map(|e| *e.key()).collect(),
        };

        let mut out = Vec::new();
        for teacher_id in candidates {
            if let Some(wanted) = &filter.teacher_name
                && self.teacher_name(teacher_id).as_deref() != Some(wanted.as_str())
            {
                continue;
            }
            let Some(row) = self.get_teacher_row(teacher_id) else {
                continue;
            };
            let (name, lessons) = {
                let guard = row.read().await;
                if guard.retired {
                    continue;
                }
                let lessons: Vec<Lesson> = guard
                    .lessons
                    .iter()
                    .filter(|l| filter.day.is_none_or(|d| l.day == d))
                    .filter(|l| {
                        filter
                            .group_name
                            .as_ref()
                            .is_none_or(|g| &l.group_name == g)
                    })
                    .cloned()
                    .collect();
                (guard.name.clone(), lessons)
            };
            out.extend(lessons.into_iter().map(|l| self.entry(teacher_id, &name, l)));
        }
        out.sort_by_key(|e| (e.start, e.id));
        out
    }
}
