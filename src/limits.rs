use crate::model::Ms;

/// Every lesson is exactly one and a half hours.
pub const LESSON_DURATION_MS: Ms = 90 * 60_000;

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_DESCRIPTION_LEN: usize = 4096;
pub const MAX_GROUP_NAME_LEN: usize = 64;

pub const MAX_TEACHERS_PER_TENANT: usize = 100_000;
pub const MAX_CLASSROOMS_PER_TENANT: usize = 10_000;
pub const MAX_COURSES_PER_TENANT: usize = 100_000;
pub const MAX_STUDENTS_PER_TENANT: usize = 1_000_000;
pub const MAX_LESSONS_PER_TEACHER: usize = 10_000;

pub const MAX_CLASSROOM_CAPACITY: u32 = 100_000;

/// Upper bound for a teacher's working-hours balance.
pub const MAX_WORKING_HOURS: i64 = 100_000;

/// 1970-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;
/// 9999-12-31T23:59:59.999Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 253_402_300_799_999;

pub const MAX_TENANTS: usize = 1024;
pub const MAX_TENANT_NAME_LEN: usize = 63;
