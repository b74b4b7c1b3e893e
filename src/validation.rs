//! Field-level checks for catalog inputs.
//!
//! Each validator walks every field and returns all problems at once, so a caller
//! can report a complete list instead of fixing one error per round trip.

use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::limits::*;
use crate::model::*;

/// Validation result.
pub type ValidationResult = Result<(), Vec<FieldError>>;

/// One rejected field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn finish(errors: Vec<FieldError>) -> ValidationResult {
    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

fn check_text(errors: &mut Vec<FieldError>, field: &'static str, value: &str, max: usize) {
    if value.trim().is_empty() {
        errors.push(FieldError::new(field, "must not be empty"));
    } else if value.len() > max {
        errors.push(FieldError::new(field, format!("longer than {max} bytes")));
    }
}

fn check_description(errors: &mut Vec<FieldError>, value: Option<&str>) {
    if let Some(d) = value
        && d.len() > MAX_DESCRIPTION_LEN
    {
        errors.push(FieldError::new(
            "description",
            format!("longer than {MAX_DESCRIPTION_LEN} bytes"),
        ));
    }
}

fn check_hours(errors: &mut Vec<FieldError>, hours: Decimal) {
    if hours < Decimal::ZERO {
        errors.push(FieldError::new("working_hours", "must not be negative"));
    } else if hours > Decimal::from(MAX_WORKING_HOURS) {
        errors.push(FieldError::new(
            "working_hours",
            format!("exceeds {MAX_WORKING_HOURS}"),
        ));
    }
}

fn check_capacity(errors: &mut Vec<FieldError>, capacity: u32) {
    if capacity == 0 {
        errors.push(FieldError::new("capacity", "must be positive"));
    } else if capacity > MAX_CLASSROOM_CAPACITY {
        errors.push(FieldError::new(
            "capacity",
            format!("exceeds {MAX_CLASSROOM_CAPACITY}"),
        ));
    }
}

pub fn validate_new_teacher(t: &NewTeacher) -> ValidationResult {
    let mut errors = Vec::new();
    check_text(&mut errors, "name", &t.name, MAX_NAME_LEN);
    check_text(&mut errors, "subject", &t.subject, MAX_NAME_LEN);
    check_hours(&mut errors, t.working_hours);
    finish(errors)
}

/// Only the fields present in the patch are checked.
pub fn validate_teacher_patch(p: &TeacherPatch) -> ValidationResult {
    let mut errors = Vec::new();
    if let Some(name) = &p.name {
        check_text(&mut errors, "name", name, MAX_NAME_LEN);
    }
    if let Some(subject) = &p.subject {
        check_text(&mut errors, "subject", subject, MAX_NAME_LEN);
    }
    if let Some(hours) = p.working_hours {
        check_hours(&mut errors, hours);
    }
    finish(errors)
}

pub fn validate_new_classroom(c: &NewClassroom) -> ValidationResult {
    let mut errors = Vec::new();
    check_text(&mut errors, "name", &c.name, MAX_NAME_LEN);
    check_capacity(&mut errors, c.capacity);
    check_description(&mut errors, c.description.as_deref());
    finish(errors)
}

pub fn validate_classroom_patch(p: &ClassroomPatch) -> ValidationResult {
    let mut errors = Vec::new();
    if let Some(name) = &p.name {
        check_text(&mut errors, "name", name, MAX_NAME_LEN);
    }
    if let Some(capacity) = p.capacity {
        check_capacity(&mut errors, capacity);
    }
    if let Some(description) = &p.description {
        check_description(&mut errors, description.as_deref());
    }
    finish(errors)
}

pub fn validate_new_course(c: &NewCourse) -> ValidationResult {
    let mut errors = Vec::new();
    check_text(&mut errors, "name", &c.name, MAX_NAME_LEN);
    check_description(&mut errors, c.description.as_deref());
    finish(errors)
}

pub fn validate_course_patch(p: &CoursePatch) -> ValidationResult {
    let mut errors = Vec::new();
    if let Some(name) = &p.name {
        check_text(&mut errors, "name", name, MAX_NAME_LEN);
    }
    if let Some(description) = &p.description {
        check_description(&mut errors, description.as_deref());
    }
    finish(errors)
}

fn check_birth_date(errors: &mut Vec<FieldError>, born: NaiveDate, today: NaiveDate) {
    if born > today {
        errors.push(FieldError::new("date_of_birth", "must not be in the future"));
    }
}

/// `today` bounds the birth date. Whether the group names a course is the engine's call.
pub fn validate_new_student(s: &NewStudent, today: NaiveDate) -> ValidationResult {
    let mut errors = Vec::new();
    check_text(&mut errors, "name", &s.name, MAX_NAME_LEN);
    check_birth_date(&mut errors, s.date_of_birth, today);
    check_text(&mut errors, "group_name", &s.group_name, MAX_NAME_LEN);
    finish(errors)
}

pub fn validate_student_patch(p: &StudentPatch, today: NaiveDate) -> ValidationResult {
    let mut errors = Vec::new();
    if let Some(name) = &p.name {
        check_text(&mut errors, "name", name, MAX_NAME_LEN);
    }
    if let Some(born) = p.date_of_birth {
        check_birth_date(&mut errors, born, today);
    }
    if let Some(group) = &p.group_name {
        check_text(&mut errors, "group_name", group, MAX_NAME_LEN);
    }
    finish(errors)
}

pub fn validate_group_name(group: &str) -> ValidationResult {
    let mut errors = Vec::new();
    check_text(&mut errors, "group_name", group, MAX_GROUP_NAME_LEN);
    finish(errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn valid_teacher_passes() {
        let t = NewTeacher {
            name: "Grace Hopper".into(),
            subject: "Compilers".into(),
            working_hours: dec!(40),
        };
        assert_eq!(validate_new_teacher(&t), Ok(()));
    }

    #[test]
    fn all_teacher_problems_reported_together() {
        let t = NewTeacher {
            name: "  ".into(),
            subject: "x".repeat(MAX_NAME_LEN + 1),
            working_hours: dec!(-1),
        };
        let errors = validate_new_teacher(&t).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["name", "subject", "working_hours"]);
    }

    #[test]
    fn zero_hours_is_allowed() {
        let p = TeacherPatch {
            working_hours: Some(dec!(0)),
            ..Default::default()
        };
        assert_eq!(validate_teacher_patch(&p), Ok(()));
    }

    #[test]
    fn negative_hours_patch_rejected() {
        let p = TeacherPatch {
            working_hours: Some(dec!(-0.5)),
            ..Default::default()
        };
        let errors = validate_teacher_patch(&p).unwrap_err();
        assert_eq!(errors[0].to_string(), "working_hours: must not be negative");
    }

    #[test]
    fn empty_patch_is_valid() {
        assert_eq!(validate_teacher_patch(&TeacherPatch::default()), Ok(()));
        assert_eq!(validate_classroom_patch(&ClassroomPatch::default()), Ok(()));
        assert_eq!(validate_course_patch(&CoursePatch::default()), Ok(()));
    }

    #[test]
    fn classroom_capacity_must_be_positive() {
        let c = NewClassroom {
            name: "A-101".into(),
            capacity: 0,
            description: None,
        };
        let errors = validate_new_classroom(&c).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "capacity");
    }

    #[test]
    fn long_description_rejected() {
        let c = NewCourse {
            name: "Algebra".into(),
            description: Some("d".repeat(MAX_DESCRIPTION_LEN + 1)),
            teacher_id: None,
        };
        assert!(validate_new_course(&c).is_err());
    }

    #[test]
    fn student_born_tomorrow_rejected() {
        let today = NaiveDate::from_ymd_opt(2024, 9, 1).unwrap();
        let s = NewStudent {
            name: "Lin".into(),
            date_of_birth: today.succ_opt().unwrap(),
            group_name: String::new(),
        };
        let errors = validate_new_student(&s, today).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["date_of_birth", "group_name"]);

        let born_today = StudentPatch {
            date_of_birth: Some(today),
            ..Default::default()
        };
        assert_eq!(validate_student_patch(&born_today, today), Ok(()));
    }

    #[test]
    fn group_name_bounds() {
        assert!(validate_group_name("CS-101").is_ok());
        assert!(validate_group_name("").is_err());
        assert!(validate_group_name(&"g".repeat(MAX_GROUP_NAME_LEN + 1)).is_err());
    }
}
