use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, SecondsFormat, Utc, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Unix milliseconds. The only time type inside the engine.
pub type Ms = i64;

/// Row identifier. Each table has its own sequence.
pub type Id = i64;

pub const MINUTE_MS: Ms = 60_000;
pub const HOUR_MS: Ms = 60 * MINUTE_MS;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayOfWeek {
    pub fn as_str(&self) -> &'static str {
        match self {
            DayOfWeek::Monday => "Monday",
            DayOfWeek::Tuesday => "Tuesday",
            DayOfWeek::Wednesday => "Wednesday",
            DayOfWeek::Thursday => "Thursday",
            DayOfWeek::Friday => "Friday",
            DayOfWeek::Saturday => "Saturday",
            DayOfWeek::Sunday => "Sunday",
        }
    }

    /// Weekday of the instant in UTC. `None` if the timestamp is out of chrono's range.
    pub fn of_timestamp(ms: Ms) -> Option<Self> {
        DateTime::<Utc>::from_timestamp_millis(ms).map(|dt| dt.weekday().into())
    }
}

impl From<Weekday> for DayOfWeek {
    fn from(day: Weekday) -> Self {
        match day {
            Weekday::Mon => DayOfWeek::Monday,
            Weekday::Tue => DayOfWeek::Tuesday,
            Weekday::Wed => DayOfWeek::Wednesday,
            Weekday::Thu => DayOfWeek::Thursday,
            Weekday::Fri => DayOfWeek::Friday,
            Weekday::Sat => DayOfWeek::Saturday,
            Weekday::Sun => DayOfWeek::Sunday,
        }
    }
}

impl FromStr for DayOfWeek {
    type Err = String;

    /// Accepts full names and three-letter abbreviations, case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "monday" | "mon" => Ok(DayOfWeek::Monday),
            "tuesday" | "tue" => Ok(DayOfWeek::Tuesday),
            "wednesday" | "wed" => Ok(DayOfWeek::Wednesday),
            "thursday" | "thu" => Ok(DayOfWeek::Thursday),
            "friday" | "fri" => Ok(DayOfWeek::Friday),
            "saturday" | "sat" => Ok(DayOfWeek::Saturday),
            "sunday" | "sun" => Ok(DayOfWeek::Sunday),
            _ => Err(format!("unrecognised day of week: {s}")),
        }
    }
}

impl fmt::Display for DayOfWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse an ISO-8601 timestamp into Unix ms.
///
/// RFC 3339 is tried first, then minute precision with an offset. Naive forms
/// (optionally suffixed with `Z`) are read as UTC.
pub fn parse_timestamp(s: &str) -> Option<Ms> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }
    // Minute precision with a numeric offset, which RFC 3339 does not allow.
    for fmt in ["%Y-%m-%dT%H:%M%:z", "%Y-%m-%d %H:%M%:z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.timestamp_millis());
        }
    }
    let naive = s
        .strip_suffix('Z')
        .or_else(|| s.strip_suffix('z'))
        .unwrap_or(s);
    const FORMATS: [&str; 6] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(naive, fmt).ok())
        .map(|ndt| ndt.and_utc().timestamp_millis())
}

/// RFC 3339 in UTC with second precision.
pub fn format_timestamp(ms: Ms) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| ms.to_string())
}

/// A `YYYY-MM-DD` calendar date.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

/// Completed years between `born` and `today`. The birthday itself counts.
pub fn age_on(born: NaiveDate, today: NaiveDate) -> i32 {
    let years = today.year() - born.year();
    if (today.month(), today.day()) < (born.month(), born.day()) {
        years - 1
    } else {
        years
    }
}

/// Anything placed on a timeline, kept sorted by `span.start`.
pub trait Timed {
    fn span(&self) -> &Span;
    fn day(&self) -> DayOfWeek;
    fn id(&self) -> Id;
}

fn insert_sorted<T: Timed>(items: &mut Vec<T>, item: T) {
    let pos = items
        .binary_search_by_key(&item.span().start, |i| i.span().start)
        .unwrap_or_else(|e| e);
    items.insert(pos, item);
}

fn remove_by_id<T: Timed>(items: &mut Vec<T>, id: Id) -> Option<T> {
    let pos = items.iter().position(|i| i.id() == id)?;
    Some(items.remove(pos))
}

/// Items on `day` whose span overlaps `query`.
/// Binary search skips everything starting at or after `query.end`.
fn overlapping_on<'a, T: Timed>(
    items: &'a [T],
    day: DayOfWeek,
    query: &Span,
) -> impl Iterator<Item = &'a T> {
    let right_bound = items.partition_point(|i| i.span().start < query.end);
    let query_start = query.start;
    items[..right_bound]
        .iter()
        .filter(move |i| i.day() == day && i.span().end > query_start)
}

/// A schedule entry as owned by its teacher's row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lesson {
    pub id: Id,
    pub classroom_id: Id,
    pub group_name: String,
    pub day: DayOfWeek,
    pub span: Span,
}

impl Timed for Lesson {
    fn span(&self) -> &Span {
        &self.span
    }
    fn day(&self) -> DayOfWeek {
        self.day
    }
    fn id(&self) -> Id {
        self.id
    }
}

/// A schedule entry as seen from the classroom it uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occupancy {
    pub id: Id,
    pub teacher_id: Id,
    pub day: DayOfWeek,
    pub span: Span,
}

impl Timed for Occupancy {
    fn span(&self) -> &Span {
        &self.span
    }
    fn day(&self) -> DayOfWeek {
        self.day
    }
    fn id(&self) -> Id {
        self.id
    }
}

#[derive(Debug, Clone)]
pub struct TeacherState {
    pub id: Id,
    pub name: String,
    pub subject: String,
    /// Remaining assignable hours. Never negative.
    pub working_hours: Decimal,
    /// Sorted by `span.start`.
    pub lessons: Vec<Lesson>,
    /// Set under the write lock when the row is deleted.
    pub retired: bool,
}

impl TeacherState {
    pub fn new(id: Id, name: String, subject: String, working_hours: Decimal) -> Self {
        Self {
            id,
            name,
            subject,
            working_hours,
            lessons: Vec::new(),
            retired: false,
        }
    }

    pub fn insert_lesson(&mut self, lesson: Lesson) {
        insert_sorted(&mut self.lessons, lesson);
    }

    pub fn remove_lesson(&mut self, id: Id) -> Option<Lesson> {
        remove_by_id(&mut self.lessons, id)
    }

    pub fn lesson(&self, id: Id) -> Option<&Lesson> {
        self.lessons.iter().find(|l| l.id == id)
    }

    pub fn overlapping(&self, day: DayOfWeek, query: &Span) -> impl Iterator<Item = &Lesson> {
        overlapping_on(&self.lessons, day, query)
    }
}

#[derive(Debug, Clone)]
pub struct ClassroomState {
    pub id: Id,
    pub name: String,
    pub capacity: u32,
    pub description: Option<String>,
    /// Sorted by `span.start`.
    pub occupancy: Vec<Occupancy>,
    pub retired: bool,
}

impl ClassroomState {
    pub fn new(id: Id, name: String, capacity: u32, description: Option<String>) -> Self {
        Self {
            id,
            name,
            capacity,
            description,
            occupancy: Vec::new(),
            retired: false,
        }
    }

    pub fn occupy(&mut self, entry: Occupancy) {
        insert_sorted(&mut self.occupancy, entry);
    }

    pub fn vacate(&mut self, id: Id) -> Option<Occupancy> {
        remove_by_id(&mut self.occupancy, id)
    }

    pub fn overlapping(&self, day: DayOfWeek, query: &Span) -> impl Iterator<Item = &Occupancy> {
        overlapping_on(&self.occupancy, day, query)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: Id,
    pub name: String,
    pub description: Option<String>,
    pub teacher_id: Option<Id>,
}

/// A student row. `group_name` names the course the student is enrolled in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: Id,
    pub name: String,
    pub date_of_birth: NaiveDate,
    pub group_name: String,
}

/// WAL record format. Flat, no nesting.
///
/// Schedule events carry the hours they move so that the debit and the insert
/// land in the log as one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    TeacherCreated {
        id: Id,
        name: String,
        subject: String,
        working_hours: Decimal,
    },
    TeacherUpdated {
        id: Id,
        name: String,
        subject: String,
        /// `Some` only when the balance was explicitly reassigned.
        working_hours: Option<Decimal>,
    },
    TeacherDeleted {
        id: Id,
    },
    HoursReserved {
        teacher_id: Id,
        hours: Decimal,
    },
    HoursReleased {
        teacher_id: Id,
        hours: Decimal,
    },
    ClassroomCreated {
        id: Id,
        name: String,
        capacity: u32,
        description: Option<String>,
    },
    ClassroomUpdated {
        id: Id,
        name: String,
        capacity: u32,
        description: Option<String>,
    },
    ClassroomDeleted {
        id: Id,
    },
    CourseCreated {
        id: Id,
        name: String,
        description: Option<String>,
        teacher_id: Option<Id>,
    },
    CourseUpdated {
        id: Id,
        name: String,
        description: Option<String>,
        teacher_id: Option<Id>,
    },
    CourseDeleted {
        id: Id,
    },
    StudentCreated {
        id: Id,
        name: String,
        date_of_birth: NaiveDate,
        group_name: String,
    },
    StudentUpdated {
        id: Id,
        name: String,
        date_of_birth: NaiveDate,
        group_name: String,
    },
    StudentDeleted {
        id: Id,
    },
    ScheduleAdmitted {
        id: Id,
        teacher_id: Id,
        classroom_id: Id,
        group_name: String,
        day: DayOfWeek,
        span: Span,
        hours: Decimal,
    },
    ScheduleRevised {
        id: Id,
        previous_teacher_id: Id,
        previous_classroom_id: Id,
        teacher_id: Id,
        classroom_id: Id,
        group_name: String,
        day: DayOfWeek,
        span: Span,
        released: Decimal,
        reserved: Decimal,
    },
    ScheduleWithdrawn {
        id: Id,
        teacher_id: Id,
        classroom_id: Id,
        released: Decimal,
    },
    /// High-water marks of the id sequences, written by compaction.
    SequencesAdvanced {
        teacher: Id,
        classroom: Id,
        course: Id,
        student: Id,
        schedule: Id,
    },
}

impl Event {
    /// Teacher rows this event mutates.
    pub fn teacher_ids(&self) -> Vec<Id> {
        match self {
            Event::TeacherCreated { id, .. }
            | Event::TeacherUpdated { id, .. }
            | Event::TeacherDeleted { id } => vec![*id],
            Event::HoursReserved { teacher_id, .. }
            | Event::HoursReleased { teacher_id, .. }
            | Event::ScheduleAdmitted { teacher_id, .. }
            | Event::ScheduleWithdrawn { teacher_id, .. } => vec![*teacher_id],
            Event::ScheduleRevised {
                previous_teacher_id,
                teacher_id,
                ..
            } => {
                if previous_teacher_id == teacher_id {
                    vec![*teacher_id]
                } else {
                    vec![*previous_teacher_id, *teacher_id]
                }
            }
            _ => Vec::new(),
        }
    }

    /// Classroom rows this event mutates.
    pub fn classroom_ids(&self) -> Vec<Id> {
        match self {
            Event::ClassroomCreated { id, .. }
            | Event::ClassroomUpdated { id, .. }
            | Event::ClassroomDeleted { id } => vec![*id],
            Event::ScheduleAdmitted { classroom_id, .. }
            | Event::ScheduleWithdrawn { classroom_id, .. } => vec![*classroom_id],
            Event::ScheduleRevised {
                previous_classroom_id,
                classroom_id,
                ..
            } => {
                if previous_classroom_id == classroom_id {
                    vec![*classroom_id]
                } else {
                    vec![*previous_classroom_id, *classroom_id]
                }
            }
            _ => Vec::new(),
        }
    }
}

// ── Inputs ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTeacher {
    pub name: String,
    pub subject: String,
    pub working_hours: Decimal,
}

/// Partial teacher update. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeacherPatch {
    pub name: Option<String>,
    pub subject: Option<String>,
    pub working_hours: Option<Decimal>,
}

impl TeacherPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.subject.is_none() && self.working_hours.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewClassroom {
    pub name: String,
    pub capacity: u32,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassroomPatch {
    pub name: Option<String>,
    pub capacity: Option<u32>,
    /// `Some(None)` clears the description.
    pub description: Option<Option<String>>,
}

impl ClassroomPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.capacity.is_none() && self.description.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCourse {
    pub name: String,
    pub description: Option<String>,
    pub teacher_id: Option<Id>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoursePatch {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    /// `Some(None)` unassigns the course.
    pub teacher_id: Option<Option<Id>>,
}

impl CoursePatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.teacher_id.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStudent {
    pub name: String,
    pub date_of_birth: NaiveDate,
    pub group_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StudentPatch {
    pub name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub group_name: Option<String>,
}

impl StudentPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.date_of_birth.is_none() && self.group_name.is_none()
    }
}

/// A request to place a lesson on the timetable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposedSchedule {
    pub teacher_id: Id,
    pub classroom_id: Id,
    pub group_name: String,
    pub start: Ms,
    pub end: Ms,
    pub day: DayOfWeek,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulePatch {
    pub teacher_id: Option<Id>,
    pub classroom_id: Option<Id>,
    pub group_name: Option<String>,
    pub start: Option<Ms>,
    pub end: Option<Ms>,
    pub day: Option<DayOfWeek>,
}

impl SchedulePatch {
    pub fn is_empty(&self) -> bool {
        self.teacher_id.is_none()
            && self.classroom_id.is_none()
            && self.group_name.is_none()
            && self.start.is_none()
            && self.end.is_none()
            && self.day.is_none()
    }
}

/// Conjunctive filter over schedule entries; `None` matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleFilter {
    pub day: Option<DayOfWeek>,
    pub group_name: Option<String>,
    pub teacher_id: Option<Id>,
    pub teacher_name: Option<String>,
}

impl ScheduleFilter {
    pub fn matches(&self, entry: &ScheduleEntry) -> bool {
        self.day.is_none_or(|d| entry.day == d)
            && self.group_name.as_ref().is_none_or(|g| &entry.group_name == g)
            && self.teacher_id.is_none_or(|t| entry.teacher_id == t)
            && self
                .teacher_name
                .as_ref()
                .is_none_or(|n| &entry.teacher_name == n)
    }
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeacherInfo {
    pub id: Id,
    pub name: String,
    pub subject: String,
    /// Names of the courses whose `teacher_id` points here, joined at read time.
    pub courses: Vec<String>,
    pub working_hours: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassroomInfo {
    pub id: Id,
    pub name: String,
    pub capacity: u32,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseInfo {
    pub id: Id,
    pub name: String,
    pub description: Option<String>,
    pub teacher_id: Option<Id>,
    pub teacher_name: Option<String>,
}

/// A student with the fields derived at read time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentInfo {
    pub id: Id,
    pub name: String,
    pub date_of_birth: NaiveDate,
    pub age: i32,
    pub group_name: String,
    /// Teacher of the course named by `group_name`, if that course exists and has one.
    pub teacher_id: Option<Id>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleEntry {
    pub id: Id,
    pub teacher_id: Id,
    pub teacher_name: String,
    pub classroom_id: Id,
    pub classroom_name: Option<String>,
    pub group_name: String,
    pub start: Ms,
    pub end: Ms,
    pub day: DayOfWeek,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn lesson(id: Id, day: DayOfWeek, start: Ms, end: Ms) -> Lesson {
        Lesson {
            id,
            classroom_id: 1,
            group_name: "G".into(),
            day,
            span: Span::new(start, end),
        }
    }

    #[test]
    fn span_overlap_is_half_open() {
        let a = Span::new(100, 200);
        let b = Span::new(150, 250);
        let c = Span::new(200, 300);
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
        assert_eq!(a.duration_ms(), 100);
    }

    #[test]
    fn day_parses_names_and_abbreviations() {
        assert_eq!("Monday".parse::<DayOfWeek>(), Ok(DayOfWeek::Monday));
        assert_eq!("monday".parse::<DayOfWeek>(), Ok(DayOfWeek::Monday));
        assert_eq!(" SAT ".parse::<DayOfWeek>(), Ok(DayOfWeek::Saturday));
        assert!("Moonday".parse::<DayOfWeek>().is_err());
        assert_eq!(DayOfWeek::Thursday.to_string(), "Thursday");
    }

    #[test]
    fn day_of_timestamp_is_utc_weekday() {
        // 2024-01-01 was a Monday.
        let ms = parse_timestamp("2024-01-01T23:30:00Z").unwrap();
        assert_eq!(DayOfWeek::of_timestamp(ms), Some(DayOfWeek::Monday));
        let ms = parse_timestamp("2024-01-07T12:00:00Z").unwrap();
        assert_eq!(DayOfWeek::of_timestamp(ms), Some(DayOfWeek::Sunday));
    }

    #[test]
    fn timestamps_accept_rfc3339_and_minute_precision() {
        let full = parse_timestamp("2024-01-01T10:00:00Z").unwrap();
        let short = parse_timestamp("2024-01-01T10:00Z").unwrap();
        let offset = parse_timestamp("2024-01-01T12:00:00+02:00").unwrap();
        assert_eq!(full, short);
        assert_eq!(full, offset);
        assert_eq!(full, 1_704_103_200_000);
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn minute_precision_with_numeric_offset() {
        let utc = parse_timestamp("2024-01-01T07:00:00Z").unwrap();
        assert_eq!(parse_timestamp("2024-01-01T10:00+03:00"), Some(utc));
        assert_eq!(parse_timestamp("2024-01-01 02:00-05:00"), Some(utc));
    }

    #[test]
    fn dates_are_strict_iso() {
        assert_eq!(parse_date(" 2005-03-14 "), NaiveDate::from_ymd_opt(2005, 3, 14));
        assert_eq!(parse_date("14.03.2005"), None);
        assert_eq!(parse_date("2005-02-30"), None);
    }

    #[test]
    fn age_counts_completed_years() {
        let born = NaiveDate::from_ymd_opt(2005, 3, 14).unwrap();
        let on = |y, m, d| age_on(born, NaiveDate::from_ymd_opt(y, m, d).unwrap());
        assert_eq!(on(2024, 3, 13), 18);
        assert_eq!(on(2024, 3, 14), 19);
        assert_eq!(on(2024, 12, 31), 19);

        let leap = NaiveDate::from_ymd_opt(2004, 2, 29).unwrap();
        assert_eq!(age_on(leap, NaiveDate::from_ymd_opt(2023, 2, 28).unwrap()), 18);
        assert_eq!(age_on(leap, NaiveDate::from_ymd_opt(2023, 3, 1).unwrap()), 19);
    }

    #[test]
    fn format_timestamp_roundtrips_through_parse() {
        let ms = 1_704_103_200_000;
        let text = format_timestamp(ms);
        assert_eq!(text, "2024-01-01T10:00:00Z");
        assert_eq!(parse_timestamp(&text), Some(ms));
    }

    #[test]
    fn lessons_stay_sorted_by_start() {
        let mut ts = TeacherState::new(1, "Ada".into(), "Math".into(), dec!(10));
        ts.insert_lesson(lesson(1, DayOfWeek::Monday, 300, 400));
        ts.insert_lesson(lesson(2, DayOfWeek::Monday, 100, 200));
        ts.insert_lesson(lesson(3, DayOfWeek::Tuesday, 200, 300));
        let starts: Vec<Ms> = ts.lessons.iter().map(|l| l.span.start).collect();
        assert_eq!(starts, vec![100, 200, 300]);

        assert_eq!(ts.remove_lesson(3).map(|l| l.id), Some(3));
        assert!(ts.remove_lesson(3).is_none());
        assert_eq!(ts.lessons.len(), 2);
    }

    #[test]
    fn overlapping_filters_by_day() {
        let mut ts = TeacherState::new(1, "Ada".into(), "Math".into(), dec!(10));
        ts.insert_lesson(lesson(1, DayOfWeek::Monday, 100, 200));
        ts.insert_lesson(lesson(2, DayOfWeek::Tuesday, 100, 200));
        ts.insert_lesson(lesson(3, DayOfWeek::Monday, 500, 600));

        let hits: Vec<Id> = ts
            .overlapping(DayOfWeek::Monday, &Span::new(150, 250))
            .map(|l| l.id)
            .collect();
        assert_eq!(hits, vec![1]);

        let none: Vec<_> = ts
            .overlapping(DayOfWeek::Monday, &Span::new(200, 500))
            .collect();
        assert!(none.is_empty());
    }

    #[test]
    fn revised_event_lists_both_sides() {
        let event = Event::ScheduleRevised {
            id: 9,
            previous_teacher_id: 1,
            previous_classroom_id: 5,
            teacher_id: 2,
            classroom_id: 5,
            group_name: "G".into(),
            day: DayOfWeek::Monday,
            span: Span::new(0, 10),
            released: dec!(1.5),
            reserved: dec!(1.5),
        };
        assert_eq!(event.teacher_ids(), vec![1, 2]);
        assert_eq!(event.classroom_ids(), vec![5]);
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::ScheduleAdmitted {
            id: 1,
            teacher_id: 2,
            classroom_id: 3,
            group_name: "CS-101".into(),
            day: DayOfWeek::Friday,
            span: Span::new(0, 90 * MINUTE_MS),
            hours: dec!(1.5),
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }

    #[test]
    fn filter_matches_every_set_field() {
        let entry = ScheduleEntry {
            id: 1,
            teacher_id: 2,
            teacher_name: "Ada".into(),
            classroom_id: 3,
            classroom_name: Some("Room 1".into()),
            group_name: "G-1".into(),
            start: 0,
            end: 90 * MINUTE_MS,
            day: DayOfWeek::Monday,
        };
        assert!(ScheduleFilter::default().matches(&entry));

        let exact = ScheduleFilter {
            day: Some(DayOfWeek::Monday),
            group_name: Some("G-1".into()),
            teacher_id: Some(2),
            teacher_name: Some("Ada".into()),
        };
        assert!(exact.matches(&entry));

        let other_day = ScheduleFilter {
            day: Some(DayOfWeek::Tuesday),
            ..exact.clone()
        };
        assert!(!other_day.matches(&entry));
        let other_teacher = ScheduleFilter {
            teacher_name: Some("Alan".into()),
            ..exact
        };
        assert!(!other_teacher.matches(&entry));
    }
}
