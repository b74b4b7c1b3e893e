use rust_decimal::Decimal;
use sqlparser::ast::{
    self, AssignmentTarget, BinaryOperator, Expr, FromTable, ObjectNamePart, SetExpr, Statement,
    TableFactor, TableObject, Value, ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

use crate::model::*;

/// Positional column order of each table, used when an INSERT names no columns.
const TEACHER_COLUMNS: &[&str] = &["name", "subject", "working_hours"];
const CLASSROOM_COLUMNS: &[&str] = &["name", "capacity", "description"];
const COURSE_COLUMNS: &[&str] = &["name", "description", "teacher_id"];
const STUDENT_COLUMNS: &[&str] = &["name", "date_of_birth", "group_name"];
const SCHEDULE_COLUMNS: &[&str] = &[
    "teacher_id",
    "classroom_id",
    "group_name",
    "start_time",
    "end_time",
    "day_of_week",
];

const SCHEDULE_FILTERS: &[&str] = &["id", "day_of_week", "group_name", "teacher_id", "teacher_name"];
const CONFLICT_FILTERS: &[&str] = &["teacher_id", "day_of_week", "start_time", "end_time"];

/// Parsed command from SQL input. `returning` is set by a `RETURNING` clause.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertTeacher { teacher: NewTeacher, returning: bool },
    UpdateTeacher { id: Id, patch: TeacherPatch, returning: bool },
    DeleteTeacher { id: Id },
    SelectTeachers { id: Option<Id> },

    InsertClassroom { classroom: NewClassroom, returning: bool },
    UpdateClassroom { id: Id, patch: ClassroomPatch, returning: bool },
    DeleteClassroom { id: Id },
    SelectClassrooms { id: Option<Id> },

    InsertCourse { course: NewCourse, returning: bool },
    UpdateCourse { id: Id, patch: CoursePatch, returning: bool },
    DeleteCourse { id: Id },
    SelectCourses { id: Option<Id> },

    InsertStudent { student: NewStudent, returning: bool },
    UpdateStudent { id: Id, patch: StudentPatch, returning: bool },
    DeleteStudent { id: Id },
    SelectStudents { id: Option<Id> },

    InsertSchedule { proposal: ProposedSchedule, returning: bool },
    UpdateSchedule { id: Id, patch: SchedulePatch, returning: bool },
    DeleteSchedule { id: Id, returning: bool },
    SelectSchedules { id: Option<Id>, filter: ScheduleFilter },
    SelectConflicts {
        teacher_id: Id,
        day: DayOfWeek,
        start: Ms,
        end: Ms,
    },

    Listen { channel: String },
    /// `None` is `UNLISTEN *`.
    Unlisten { channel: Option<String> },
}

impl Command {
    /// Statements open to the teacher role.
    pub fn is_schedule_read(&self) -> bool {
        matches!(
            self,
            Command::SelectSchedules { .. }
                | Command::SelectConflicts { .. }
                | Command::Listen { .. }
                | Command::Unlisten { .. }
        )
    }
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let trimmed = sql.trim().trim_end_matches(';').trim();
    if let Some(cmd) = parse_listen(trimmed) {
        return Ok(cmd);
    }

    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    let Some(stmt) = stmts.first() else {
        return Err(SqlError::Empty);
    };

    match stmt {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Update {
            table,
            assignments,
            selection,
            returning,
            ..
        } => parse_update(table, assignments, selection.as_ref(), returning.is_some()),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

fn parse_listen(sql: &str) -> Option<Command> {
    let (keyword, rest) = sql.split_once(char::is_whitespace)?;
    let channel = rest.trim().trim_matches('"').to_string();
    if keyword.eq_ignore_ascii_case("LISTEN") {
        Some(Command::Listen { channel })
    } else if keyword.eq_ignore_ascii_case("UNLISTEN") {
        Some(Command::Unlisten {
            channel: (channel != "*").then_some(channel),
        })
    } else {
        None
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let returning = insert.returning.is_some();

    match table.as_str() {
        "teachers" => {
            let row = insert_row(insert, "teachers", TEACHER_COLUMNS)?;
            Ok(Command::InsertTeacher {
                teacher: NewTeacher {
                    name: parse_string(row.require("name")?)?,
                    subject: parse_string(row.require("subject")?)?,
                    working_hours: parse_decimal(row.require("working_hours")?)?,
                },
                returning,
            })
        }
        "classrooms" => {
            let row = insert_row(insert, "classrooms", CLASSROOM_COLUMNS)?;
            Ok(Command::InsertClassroom {
                classroom: NewClassroom {
                    name: parse_string(row.require("name")?)?,
                    capacity: parse_u32(row.require("capacity")?)?,
                    description: row.get("description").map(parse_opt_string).transpose()?.flatten(),
                },
                returning,
            })
        }
        "courses" => {
            let row = insert_row(insert, "courses", COURSE_COLUMNS)?;
            Ok(Command::InsertCourse {
                course: NewCourse {
                    name: parse_string(row.require("name")?)?,
                    description: row.get("description").map(parse_opt_string).transpose()?.flatten(),
                    teacher_id: row.get("teacher_id").map(parse_opt_i64).transpose()?.flatten(),
                },
                returning,
            })
        }
        "students" => {
            let row = insert_row(insert, "students", STUDENT_COLUMNS)?;
            Ok(Command::InsertStudent {
                student: NewStudent {
                    name: parse_string(row.require("name")?)?,
                    date_of_birth: parse_date_value(row.require("date_of_birth")?)?,
                    group_name: parse_string(row.require("group_name")?)?,
                },
                returning,
            })
        }
        "schedules" => {
            let row = insert_row(insert, "schedules", SCHEDULE_COLUMNS)?;
            Ok(Command::InsertSchedule {
                proposal: ProposedSchedule {
                    teacher_id: parse_i64(row.require("teacher_id")?)?,
                    classroom_id: parse_i64(row.require("classroom_id")?)?,
                    group_name: parse_string(row.require("group_name")?)?,
                    start: parse_time(row.require("start_time")?)?,
                    end: parse_time(row.require("end_time")?)?,
                    day: parse_day(row.require("day_of_week")?)?,
                },
                returning,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_update(
    table: &ast::TableWithJoins,
    assignments: &[ast::Assignment],
    selection: Option<&Expr>,
    returning: bool,
) -> Result<Command, SqlError> {
    let name = table_factor_name(&table.relation)?;
    let id = extract_where_id(selection)?;

    match name.as_str() {
        "teachers" => {
            let set = assignment_row(assignments, "teachers", TEACHER_COLUMNS)?;
            Ok(Command::UpdateTeacher {
                id,
                patch: TeacherPatch {
                    name: set.get("name").map(parse_string).transpose()?,
                    subject: set.get("subject").map(parse_string).transpose()?,
                    working_hours: set.get("working_hours").map(parse_decimal).transpose()?,
                },
                returning,
            })
        }
        "classrooms" => {
            let set = assignment_row(assignments, "classrooms", CLASSROOM_COLUMNS)?;
            Ok(Command::UpdateClassroom {
                id,
                patch: ClassroomPatch {
                    name: set.get("name").map(parse_string).transpose()?,
                    capacity: set.get("capacity").map(parse_u32).transpose()?,
                    description: set.get("description").map(parse_opt_string).transpose()?,
                },
                returning,
            })
        }
        "courses" => {
            let set = assignment_row(assignments, "courses", COURSE_COLUMNS)?;
            Ok(Command::UpdateCourse {
                id,
                patch: CoursePatch {
                    name: set.get("name").map(parse_string).transpose()?,
                    description: set.get("description").map(parse_opt_string).transpose()?,
                    teacher_id: set.get("teacher_id").map(parse_opt_i64).transpose()?,
                },
                returning,
            })
        }
        "students" => {
            let set = assignment_row(assignments, "students", STUDENT_COLUMNS)?;
            Ok(Command::UpdateStudent {
                id,
                patch: StudentPatch {
                    name: set.get("name").map(parse_string).transpose()?,
                    date_of_birth: set.get("date_of_birth").map(parse_date_value).transpose()?,
                    group_name: set.get("group_name").map(parse_string).transpose()?,
                },
                returning,
            })
        }
        "schedules" => {
            let set = assignment_row(assignments, "schedules", SCHEDULE_COLUMNS)?;
            Ok(Command::UpdateSchedule {
                id,
                patch: SchedulePatch {
                    teacher_id: set.get("teacher_id").map(parse_i64).transpose()?,
                    classroom_id: set.get("classroom_id").map(parse_i64).transpose()?,
                    group_name: set.get("group_name").map(parse_string).transpose()?,
                    start: set.get("start_time").map(parse_time).transpose()?,
                    end: set.get("end_time").map(parse_time).transpose()?,
                    day: set.get("day_of_week").map(parse_day).transpose()?,
                },
                returning,
            })
        }
        _ => Err(SqlError::UnknownTable(name)),
    }
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    let id = extract_where_id(delete.selection.as_ref())?;

    match table.as_str() {
        "teachers" => Ok(Command::DeleteTeacher { id }),
        "classrooms" => Ok(Command::DeleteClassroom { id }),
        "courses" => Ok(Command::DeleteCourse { id }),
        "students" => Ok(Command::DeleteStudent { id }),
        "schedules" => Ok(Command::DeleteSchedule {
            id,
            returning: delete.returning.is_some(),
        }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };
    let Some(from) = select.from.first() else {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    };
    let table = table_factor_name(&from.relation)?;

    let mut conditions = Vec::new();
    if let Some(selection) = &select.selection {
        collect_equalities(selection, &mut conditions)?;
    }

    match table.as_str() {
        "teachers" => Ok(Command::SelectTeachers {
            id: by_id(Row::checked("teachers", conditions, &["id"])?)?,
        }),
        "classrooms" => Ok(Command::SelectClassrooms {
            id: by_id(Row::checked("classrooms", conditions, &["id"])?)?,
        }),
        "courses" => Ok(Command::SelectCourses {
            id: by_id(Row::checked("courses", conditions, &["id"])?)?,
        }),
        "students" => Ok(Command::SelectStudents {
            id: by_id(Row::checked("students", conditions, &["id"])?)?,
        }),
        "schedules" => {
            let row = Row::checked("schedules", conditions, SCHEDULE_FILTERS)?;
            Ok(Command::SelectSchedules {
                id: row.get("id").map(parse_i64).transpose()?,
                filter: ScheduleFilter {
                    day: row.get("day_of_week").map(parse_day).transpose()?,
                    group_name: row.get("group_name").map(parse_string).transpose()?,
                    teacher_id: row.get("teacher_id").map(parse_i64).transpose()?,
                    teacher_name: row.get("teacher_name").map(parse_string).transpose()?,
                },
            })
        }
        "conflicts" => {
            let row = Row::checked("conflicts", conditions, CONFLICT_FILTERS)?;
            let filter = |column: &'static str| {
                row.get(column).ok_or(SqlError::MissingFilter(column))
            };
            Ok(Command::SelectConflicts {
                teacher_id: parse_i64(filter("teacher_id")?)?,
                day: parse_day(filter("day_of_week")?)?,
                start: parse_time(filter("start_time")?)?,
                end: parse_time(filter("end_time")?)?,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn by_id(row: Row<'_>) -> Result<Option<Id>, SqlError> {
    row.get("id").map(parse_i64).transpose()
}

/// Column → expression pairs of one INSERT row, SET list or WHERE conjunction.
struct Row<'a> {
    table: &'static str,
    cells: Vec<(String, &'a Expr)>,
}

impl<'a> Row<'a> {
    /// Rejects columns outside `allowed`.
    fn checked(
        table: &'static str,
        cells: Vec<(String, &'a Expr)>,
        allowed: &[&str],
    ) -> Result<Self, SqlError> {
        if let Some((column, _)) = cells.iter().find(|(c, _)| !allowed.contains(&c.as_str())) {
            return Err(SqlError::UnknownColumn(table, column.clone()));
        }
        Ok(Self { table, cells })
    }

    fn get(&self, column: &str) -> Option<&'a Expr> {
        self.cells.iter().find(|(c, _)| c == column).map(|(_, e)| *e)
    }

    fn require(&self, column: &'static str) -> Result<&'a Expr, SqlError> {
        self.get(column).ok_or(SqlError::MissingValue(self.table, column))
    }
}

fn insert_row<'a>(
    insert: &'a ast::Insert,
    table: &'static str,
    columns: &[&str],
) -> Result<Row<'a>, SqlError> {
    let rows = extract_insert_rows(insert)?;
    if rows.len() > 1 {
        return Err(SqlError::Unsupported("multi-row INSERT".into()));
    }
    let values = &rows[0];

    let names: Vec<String> = if insert.columns.is_empty() {
        columns.iter().map(|c| c.to_string()).collect()
    } else {
        insert.columns.iter().map(|c| c.value.to_lowercase()).collect()
    };
    let exact = !insert.columns.is_empty();
    if values.len() > names.len() || (exact && values.len() != names.len()) {
        return Err(SqlError::WrongArity(table, names.len(), values.len()));
    }
    Row::checked(table, names.into_iter().zip(values.iter()).collect(), columns)
}

fn assignment_row<'a>(
    assignments: &'a [ast::Assignment],
    table: &'static str,
    columns: &[&str],
) -> Result<Row<'a>, SqlError> {
    let mut cells = Vec::with_capacity(assignments.len());
    for a in assignments {
        let column = match &a.target {
            AssignmentTarget::ColumnName(name) => {
                object_name_last(name).ok_or_else(|| SqlError::Parse("empty column name".into()))?
            }
            AssignmentTarget::Tuple(_) => {
                return Err(SqlError::Unsupported("tuple assignment".into()));
            }
        };
        cells.push((column, &a.value));
    }
    if cells.is_empty() {
        return Err(SqlError::Parse("UPDATE without SET".into()));
    }
    Row::checked(table, cells, columns)
}

fn collect_equalities<'a>(
    expr: &'a Expr,
    out: &mut Vec<(String, &'a Expr)>,
) -> Result<(), SqlError> {
    match expr {
        Expr::Nested(inner) => collect_equalities(inner, out),
        Expr::BinaryOp {
            left,
            op: BinaryOperator::And,
            right,
        } => {
            collect_equalities(left, out)?;
            collect_equalities(right, out)
        }
        Expr::BinaryOp {
            left,
            op: BinaryOperator::Eq,
            right,
        } => {
            let column = expr_column_name(left)
                .ok_or_else(|| SqlError::Unsupported(format!("condition {expr}")))?;
            out.push((column, &**right));
            Ok(())
        }
        other => Err(SqlError::Unsupported(format!("condition {other}"))),
    }
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    if let Some(first) = tables_with_joins.first() {
        table_factor_name(&first.relation)
    } else {
        Err(SqlError::Parse("DELETE without table".into()))
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_insert_rows(insert: &ast::Insert) -> Result<&Vec<Vec<Expr>>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) if !values.rows.is_empty() => Ok(&values.rows),
        SetExpr::Values(_) => Err(SqlError::Parse("empty VALUES".into())),
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn extract_where_id(selection: Option<&Expr>) -> Result<Id, SqlError> {
    match selection {
        Some(Expr::BinaryOp {
            left,
            op: BinaryOperator::Eq,
            right,
        }) if expr_column_name(left).as_deref() == Some("id") => parse_i64(right),
        Some(Expr::Nested(inner)) => extract_where_id(Some(&**inner)),
        _ => Err(SqlError::MissingFilter("id")),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn literal(expr: &Expr) -> Result<&Value, SqlError> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Ok(value),
        other => Err(SqlError::Parse(format!("expected a literal, got {other}"))),
    }
}

fn is_null(expr: &Expr) -> bool {
    matches!(
        expr,
        Expr::Value(ValueWithSpan {
            value: Value::Null,
            ..
        })
    )
}

/// Integers arrive as numbers or, from bound parameters, as quoted text.
fn parse_i64(expr: &Expr) -> Result<i64, SqlError> {
    if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        return parse_i64(expr).map(|v| -v);
    }
    match literal(expr)? {
        Value::Number(s, _) | Value::SingleQuotedString(s) => s
            .trim()
            .parse()
            .map_err(|e| SqlError::Parse(format!("bad integer {s:?}: {e}"))),
        other => Err(SqlError::Parse(format!("expected integer, got {other}"))),
    }
}

fn parse_opt_i64(expr: &Expr) -> Result<Option<i64>, SqlError> {
    if is_null(expr) {
        return Ok(None);
    }
    parse_i64(expr).map(Some)
}

fn parse_u32(expr: &Expr) -> Result<u32, SqlError> {
    let v = parse_i64(expr)?;
    u32::try_from(v).map_err(|_| SqlError::Parse(format!("{v} out of u32 range")))
}

fn parse_string(expr: &Expr) -> Result<String, SqlError> {
    match literal(expr)? {
        Value::SingleQuotedString(s) | Value::EscapedStringLiteral(s) => Ok(s.clone()),
        other => Err(SqlError::Parse(format!("expected string, got {other}"))),
    }
}

fn parse_opt_string(expr: &Expr) -> Result<Option<String>, SqlError> {
    if is_null(expr) {
        return Ok(None);
    }
    parse_string(expr).map(Some)
}

fn parse_decimal(expr: &Expr) -> Result<Decimal, SqlError> {
    if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        return parse_decimal(expr).map(|d| -d);
    }
    match literal(expr)? {
        Value::Number(s, _) | Value::SingleQuotedString(s) => s
            .trim()
            .parse::<Decimal>()
            .map_err(|e| SqlError::Parse(format!("bad decimal {s:?}: {e}"))),
        other => Err(SqlError::Parse(format!("expected decimal, got {other}"))),
    }
}

/// Unix milliseconds, or an ISO-8601 timestamp in quotes.
fn parse_time(expr: &Expr) -> Result<Ms, SqlError> {
    match literal(expr)? {
        Value::Number(s, _) => s
            .parse()
            .map_err(|e| SqlError::Parse(format!("bad timestamp {s:?}: {e}"))),
        Value::SingleQuotedString(s) => s
            .trim()
            .parse::<Ms>()
            .ok()
            .or_else(|| parse_timestamp(s))
            .ok_or_else(|| SqlError::Parse(format!("bad timestamp {s:?}"))),
        other => Err(SqlError::Parse(format!("expected timestamp, got {other}"))),
    }
}

fn parse_date_value(expr: &Expr) -> Result<chrono::NaiveDate, SqlError> {
    let s = parse_string(expr)?;
    parse_date(&s).ok_or_else(|| SqlError::Parse(format!("bad date {s:?}, use YYYY-MM-DD")))
}

fn parse_day(expr: &Expr) -> Result<DayOfWeek, SqlError> {
    parse_string(expr)?.parse().map_err(SqlError::Parse)
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    UnknownColumn(&'static str, String),
    WrongArity(&'static str, usize, usize),
    MissingValue(&'static str, &'static str),
    MissingFilter(&'static str),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::UnknownColumn(t, c) => write!(f, "unknown column {c} in {t}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected {expected} values, got {got}")
            }
            SqlError::MissingValue(t, c) => write!(f, "{t}: missing value for {c}"),
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
        }
    }
}

impl std::error::Error for SqlError {}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const MONDAY_9: Ms = 1_704_099_600_000; // 2024-01-01T09:00:00Z

    #[test]
    fn parse_insert_teacher() {
        let sql = "INSERT INTO teachers (name, subject, working_hours) VALUES ('Ada', 'Math', 3.0)";
        let cmd = parse_sql(sql).unwrap();
        assert_eq!(
            cmd,
            Command::InsertTeacher {
                teacher: NewTeacher {
                    name: "Ada".into(),
                    subject: "Math".into(),
                    working_hours: dec!(3.0),
                },
                returning: false,
            }
        );
    }

    #[test]
    fn parse_insert_teacher_positional_with_returning() {
        let sql = "INSERT INTO teachers VALUES ('Ada', 'Math', '12.5') RETURNING *";
        match parse_sql(sql).unwrap() {
            Command::InsertTeacher { teacher, returning } => {
                assert_eq!(teacher.working_hours, dec!(12.5));
                assert!(returning);
            }
            other => panic!("expected InsertTeacher, got {other:?}"),
        }
    }

    #[test]
    fn parse_negative_hours_reaches_validation() {
        let sql = "INSERT INTO teachers (name, subject, working_hours) VALUES ('Ada', 'Math', -1)";
        match parse_sql(sql).unwrap() {
            Command::InsertTeacher { teacher, .. } => assert_eq!(teacher.working_hours, dec!(-1)),
            other => panic!("expected InsertTeacher, got {other:?}"),
        }
    }

    #[test]
    fn parse_insert_columns_in_any_order() {
        let sql = "INSERT INTO classrooms (capacity, name) VALUES (30, 'Room 101')";
        assert_eq!(
            parse_sql(sql).unwrap(),
            Command::InsertClassroom {
                classroom: NewClassroom {
                    name: "Room 101".into(),
                    capacity: 30,
                    description: None,
                },
                returning: false,
            }
        );
    }

    #[test]
    fn parse_insert_course_with_null_teacher() {
        let sql = "INSERT INTO courses (name, description, teacher_id) VALUES ('Algebra', 'Intro', NULL)";
        match parse_sql(sql).unwrap() {
            Command::InsertCourse { course, .. } => {
                assert_eq!(course.description.as_deref(), Some("Intro"));
                assert_eq!(course.teacher_id, None);
            }
            other => panic!("expected InsertCourse, got {other:?}"),
        }
    }

    #[test]
    fn parse_insert_student_positional() {
        let sql = "INSERT INTO students VALUES ('Lin', '2005-03-14', 'Algebra') RETURNING *";
        assert_eq!(
            parse_sql(sql).unwrap(),
            Command::InsertStudent {
                student: NewStudent {
                    name: "Lin".into(),
                    date_of_birth: chrono::NaiveDate::from_ymd_opt(2005, 3, 14).unwrap(),
                    group_name: "Algebra".into(),
                },
                returning: true,
            }
        );
    }

    #[test]
    fn parse_student_bad_birth_date() {
        let sql = "INSERT INTO students (name, date_of_birth, group_name) VALUES ('Lin', '14/03/2005', 'Algebra')";
        match parse_sql(sql) {
            Err(SqlError::Parse(msg)) => assert!(msg.contains("YYYY-MM-DD")),
            other => panic!("expected parse error, got {other:?}"),
        }
        let sql = "UPDATE students SET date_of_birth = 20050314 WHERE id = 1";
        assert!(matches!(parse_sql(sql), Err(SqlError::Parse(_))));
    }

    #[test]
    fn parse_update_student_group() {
        let sql = "UPDATE students SET group_name = 'Poetry' WHERE id = 4";
        assert_eq!(
            parse_sql(sql).unwrap(),
            Command::UpdateStudent {
                id: 4,
                patch: StudentPatch {
                    group_name: Some("Poetry".into()),
                    ..Default::default()
                },
                returning: false,
            }
        );
        assert!(matches!(
            parse_sql("UPDATE students SET age = 20 WHERE id = 4"),
            Err(SqlError::UnknownColumn("students", _))
        ));
    }

    #[test]
    fn parse_insert_schedule_iso_timestamps() {
        let sql = "INSERT INTO schedules (teacher_id, classroom_id, group_name, start_time, end_time, day_of_week) \
                   VALUES (1, 2, 'G-1', '2024-01-01T09:00:00Z', '2024-01-01T10:30Z', 'Monday') RETURNING *";
        match parse_sql(sql).unwrap() {
            Command::InsertSchedule { proposal, returning } => {
                assert_eq!(proposal.teacher_id, 1);
                assert_eq!(proposal.classroom_id, 2);
                assert_eq!(proposal.group_name, "G-1");
                assert_eq!(proposal.start, MONDAY_9);
                assert_eq!(proposal.end, MONDAY_9 + 90 * 60_000);
                assert_eq!(proposal.day, DayOfWeek::Monday);
                assert!(returning);
            }
            other => panic!("expected InsertSchedule, got {other:?}"),
        }
    }

    #[test]
    fn parse_insert_schedule_millis() {
        let sql = format!(
            "INSERT INTO schedules VALUES (1, 2, 'G-1', {MONDAY_9}, '{}', 'mon')",
            MONDAY_9 + 5_400_000
        );
        match parse_sql(&sql).unwrap() {
            Command::InsertSchedule { proposal, .. } => {
                assert_eq!(proposal.start, MONDAY_9);
                assert_eq!(proposal.end, MONDAY_9 + 5_400_000);
            }
            other => panic!("expected InsertSchedule, got {other:?}"),
        }
    }

    #[test]
    fn parse_insert_schedule_missing_day() {
        let sql = "INSERT INTO schedules (teacher_id, classroom_id, group_name, start_time, end_time) \
                   VALUES (1, 2, 'G', 0, 5400000)";
        assert!(matches!(
            parse_sql(sql),
            Err(SqlError::MissingValue("schedules", "day_of_week"))
        ));
    }

    #[test]
    fn parse_bad_day_and_timestamp() {
        let bad_day = "INSERT INTO schedules VALUES (1, 2, 'G', 0, 5400000, 'Funday')";
        assert!(matches!(parse_sql(bad_day), Err(SqlError::Parse(_))));
        let bad_time = "INSERT INTO schedules VALUES (1, 2, 'G', 'yesterday', 5400000, 'Monday')";
        assert!(matches!(parse_sql(bad_time), Err(SqlError::Parse(_))));
    }

    #[test]
    fn parse_insert_unknown_column() {
        let sql = "INSERT INTO teachers (name, salary) VALUES ('Ada', 10)";
        assert!(matches!(
            parse_sql(sql),
            Err(SqlError::UnknownColumn("teachers", c)) if c == "salary"
        ));
    }

    #[test]
    fn parse_insert_arity() {
        let sql = "INSERT INTO teachers (name, subject) VALUES ('Ada')";
        assert!(matches!(parse_sql(sql), Err(SqlError::WrongArity("teachers", 2, 1))));
    }

    #[test]
    fn parse_multi_row_insert_rejected() {
        let sql = "INSERT INTO classrooms VALUES ('A', 1), ('B', 2)";
        assert!(matches!(parse_sql(sql), Err(SqlError::Unsupported(_))));
    }

    #[test]
    fn parse_update_teacher_partial() {
        let sql = "UPDATE teachers SET working_hours = 40 WHERE id = 7";
        assert_eq!(
            parse_sql(sql).unwrap(),
            Command::UpdateTeacher {
                id: 7,
                patch: TeacherPatch {
                    working_hours: Some(dec!(40)),
                    ..Default::default()
                },
                returning: false,
            }
        );
    }

    #[test]
    fn parse_update_nullable_columns() {
        let sql = "UPDATE courses SET teacher_id = NULL, description = NULL WHERE id = 3 RETURNING *";
        match parse_sql(sql).unwrap() {
            Command::UpdateCourse { id, patch, returning } => {
                assert_eq!(id, 3);
                assert_eq!(patch.teacher_id, Some(None));
                assert_eq!(patch.description, Some(None));
                assert_eq!(patch.name, None);
                assert!(returning);
            }
            other => panic!("expected UpdateCourse, got {other:?}"),
        }

        let sql = "UPDATE classrooms SET description = 'Lab' WHERE id = 1";
        match parse_sql(sql).unwrap() {
            Command::UpdateClassroom { patch, .. } => {
                assert_eq!(patch.description, Some(Some("Lab".into())));
            }
            other => panic!("expected UpdateClassroom, got {other:?}"),
        }
    }

    #[test]
    fn parse_update_schedule() {
        let sql = "UPDATE schedules SET classroom_id = 4, start_time = '2024-01-01T09:00Z' WHERE id = 12";
        match parse_sql(sql).unwrap() {
            Command::UpdateSchedule { id, patch, .. } => {
                assert_eq!(id, 12);
                assert_eq!(patch.classroom_id, Some(4));
                assert_eq!(patch.start, Some(MONDAY_9));
                assert_eq!(patch.end, None);
            }
            other => panic!("expected UpdateSchedule, got {other:?}"),
        }
    }

    #[test]
    fn parse_update_requires_id() {
        assert!(matches!(
            parse_sql("UPDATE teachers SET name = 'x'"),
            Err(SqlError::MissingFilter("id"))
        ));
        assert!(matches!(
            parse_sql("UPDATE teachers SET name = 'x' WHERE name = 'y'"),
            Err(SqlError::MissingFilter("id"))
        ));
    }

    #[test]
    fn parse_update_id_column_rejected() {
        let sql = "UPDATE teachers SET id = 9 WHERE id = 1";
        assert!(matches!(parse_sql(sql), Err(SqlError::UnknownColumn("teachers", _))));
    }

    #[test]
    fn parse_deletes() {
        assert_eq!(
            parse_sql("DELETE FROM teachers WHERE id = 1").unwrap(),
            Command::DeleteTeacher { id: 1 }
        );
        assert_eq!(
            parse_sql("DELETE FROM classrooms WHERE id = '2'").unwrap(),
            Command::DeleteClassroom { id: 2 }
        );
        assert_eq!(
            parse_sql("DELETE FROM students WHERE id = 7").unwrap(),
            Command::DeleteStudent { id: 7 }
        );
        assert_eq!(
            parse_sql("DELETE FROM schedules WHERE id = 3 RETURNING *").unwrap(),
            Command::DeleteSchedule {
                id: 3,
                returning: true
            }
        );
    }

    #[test]
    fn parse_select_by_id_and_all() {
        assert_eq!(
            parse_sql("SELECT * FROM teachers").unwrap(),
            Command::SelectTeachers { id: None }
        );
        assert_eq!(
            parse_sql("SELECT * FROM courses WHERE id = 5").unwrap(),
            Command::SelectCourses { id: Some(5) }
        );
        assert_eq!(
            parse_sql("SELECT * FROM students").unwrap(),
            Command::SelectStudents { id: None }
        );
        assert!(matches!(
            parse_sql("SELECT * FROM classrooms WHERE capacity = 5"),
            Err(SqlError::UnknownColumn("classrooms", _))
        ));
    }

    #[test]
    fn parse_select_schedules_filters() {
        let sql = "SELECT * FROM schedules WHERE day_of_week = 'Tuesday' AND (group_name = 'G-2' AND teacher_name = 'Ada')";
        match parse_sql(sql).unwrap() {
            Command::SelectSchedules { id, filter } => {
                assert_eq!(id, None);
                assert_eq!(filter.day, Some(DayOfWeek::Tuesday));
                assert_eq!(filter.group_name.as_deref(), Some("G-2"));
                assert_eq!(filter.teacher_name.as_deref(), Some("Ada"));
                assert_eq!(filter.teacher_id, None);
            }
            other => panic!("expected SelectSchedules, got {other:?}"),
        }
    }

    #[test]
    fn parse_select_schedules_rejects_or() {
        let sql = "SELECT * FROM schedules WHERE teacher_id = 1 OR teacher_id = 2";
        assert!(matches!(parse_sql(sql), Err(SqlError::Unsupported(_))));
    }

    #[test]
    fn parse_select_conflicts() {
        let sql = format!(
            "SELECT * FROM conflicts WHERE teacher_id = 1 AND day_of_week = 'Monday' \
             AND start_time = {MONDAY_9} AND end_time = '2024-01-01T10:30:00Z'"
        );
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::SelectConflicts {
                teacher_id: 1,
                day: DayOfWeek::Monday,
                start: MONDAY_9,
                end: MONDAY_9 + 5_400_000,
            }
        );
    }

    #[test]
    fn parse_select_conflicts_needs_every_filter() {
        let sql = "SELECT * FROM conflicts WHERE teacher_id = 1 AND day_of_week = 'Monday'";
        assert!(matches!(
            parse_sql(sql),
            Err(SqlError::MissingFilter("start_time"))
        ));
    }

    #[test]
    fn parse_listen_and_unlisten() {
        assert_eq!(
            parse_sql("LISTEN teacher_4;").unwrap(),
            Command::Listen {
                channel: "teacher_4".into()
            }
        );
        assert_eq!(
            parse_sql("unlisten teacher_4").unwrap(),
            Command::Unlisten {
                channel: Some("teacher_4".into())
            }
        );
        assert_eq!(
            parse_sql("UNLISTEN *").unwrap(),
            Command::Unlisten { channel: None }
        );
    }

    #[test]
    fn schedule_reads_are_flagged() {
        assert!(parse_sql("SELECT * FROM schedules").unwrap().is_schedule_read());
        assert!(!parse_sql("SELECT * FROM teachers").unwrap().is_schedule_read());
        assert!(!parse_sql("DELETE FROM schedules WHERE id = 1").unwrap().is_schedule_read());
    }

    #[test]
    fn parse_unknown_table_errors() {
        assert!(matches!(
            parse_sql("INSERT INTO parents (name) VALUES ('x')"),
            Err(SqlError::UnknownTable(_))
        ));
    }

    #[test]
    fn parse_empty_errors() {
        assert!(matches!(parse_sql(""), Err(SqlError::Empty)));
    }
}
