use std::collections::HashMap;
use std::fmt::Debug;
use std::io;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::{Sink, SinkExt, stream};
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::messages::response::NotificationResponse;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, broadcast};

use crate::auth::{Credentials, RegistrarAuthSource, Role};
use crate::engine::{Engine, EngineError};
use crate::model::*;
use crate::notify;
use crate::observability;
use crate::sql::{self, Command, SqlError};
use crate::tenant::TenantManager;

/// One handler per connection: it owns that session's LISTEN subscriptions.
pub struct RegistrarHandler {
    tenant_manager: Arc<TenantManager>,
    query_parser: Arc<RegistrarQueryParser>,
    listeners: Mutex<HashMap<String, broadcast::Receiver<Event>>>,
}

impl RegistrarHandler {
    pub fn new(tenant_manager: Arc<TenantManager>) -> Self {
        Self {
            tenant_manager,
            query_parser: Arc::new(RegistrarQueryParser),
            listeners: Mutex::new(HashMap::new()),
        }
    }

    fn resolve_engine<C: ClientInfo>(&self, client: &C) -> PgWireResult<Arc<Engine>> {
        let db = client
            .metadata()
            .get("database")
            .cloned()
            .unwrap_or_else(|| "default".to_string());
        self.tenant_manager
            .get_or_create(&db)
            .map_err(|e| user_error("08006", format!("tenant error: {e}")))
    }

    fn resolve_role<C: ClientInfo>(&self, client: &C) -> PgWireResult<Role> {
        client
            .metadata()
            .get("user")
            .and_then(|user| Role::from_user(user))
            .ok_or_else(|| user_error("28000", "no role for this session".to_string()))
    }

    /// Parse, authorize and execute one statement.
    async fn run(&self, engine: &Arc<Engine>, role: Role, sql: &str) -> PgWireResult<Response> {
        let cmd = sql::parse_sql(sql).map_err(sql_err)?;
        if !role.can_write() && !cmd.is_schedule_read() {
            return Err(user_error(
                "42501",
                "permission denied: the teacher role may only read schedules".to_string(),
            ));
        }

        let label = observability::command_label(&cmd);
        let started = Instant::now();
        let result = self.execute_command(engine, cmd).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(observability::QUERIES_TOTAL, "command" => label, "status" => status)
            .increment(1);
        metrics::histogram!(observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        result
    }

    async fn execute_command(&self, engine: &Arc<Engine>, cmd: Command) -> PgWireResult<Response> {
        match cmd {
            // ── Teachers ─────────────────────────────────────────
            Command::InsertTeacher { teacher, returning } => {
                let info = engine.create_teacher(teacher).await.map_err(engine_err)?;
                Ok(row_or_tag(returning, "INSERT", || teacher_rows(vec![info])))
            }
            Command::UpdateTeacher { id, patch, returning } => {
                let info = engine.update_teacher(id, patch).await.map_err(engine_err)?;
                Ok(row_or_tag(returning, "UPDATE", || teacher_rows(vec![info])))
            }
            Command::DeleteTeacher { id } => {
                engine.delete_teacher(id).await.map_err(engine_err)?;
                Ok(executed("DELETE", 1))
            }
            Command::SelectTeachers { id } => {
                let teachers = match id {
                    Some(id) => vec![engine.get_teacher(id).await.map_err(engine_err)?],
                    None => engine.list_teachers().await,
                };
                Ok(teacher_rows(teachers))
            }

            // ── Classrooms ───────────────────────────────────────
            Command::InsertClassroom { classroom, returning } => {
                let info = engine.create_classroom(classroom).await.map_err(engine_err)?;
                Ok(row_or_tag(returning, "INSERT", || classroom_rows(vec![info])))
            }
            Command::UpdateClassroom { id, patch, returning } => {
                let info = engine.update_classroom(id, patch).await.map_err(engine_err)?;
                Ok(row_or_tag(returning, "UPDATE", || classroom_rows(vec![info])))
            }
            Command::DeleteClassroom { id } => {
                engine.delete_classroom(id).await.map_err(engine_err)?;
                Ok(executed("DELETE", 1))
            }
            Command::SelectClassrooms { id } => {
                let classrooms = match id {
                    Some(id) => vec![engine.get_classroom(id).await.map_err(engine_err)?],
                    None => engine.list_classrooms().await,
                };
                Ok(classroom_rows(classrooms))
            }

            // ── Courses ──────────────────────────────────────────
            Command::InsertCourse { course, returning } => {
                let info = engine.create_course(course).await.map_err(engine_err)?;
                Ok(row_or_tag(returning, "INSERT", || course_rows(vec![info])))
            }
            Command::UpdateCourse { id, patch, returning } => {
                let info = engine.update_course(id, patch).await.map_err(engine_err)?;
                Ok(row_or_tag(returning, "UPDATE", || course_rows(vec![info])))
            }
            Command::DeleteCourse { id } => {
                engine.delete_course(id).await.map_err(engine_err)?;
                Ok(executed("DELETE", 1))
            }
            Command::SelectCourses { id } => {
                let courses = match id {
                    Some(id) => vec![engine.get_course(id).map_err(engine_err)?],
                    None => engine.list_courses(),
                };
                Ok(course_rows(courses))
            }

            // ── Students ─────────────────────────────────────────
            Command::InsertStudent { student, returning } => {
                let info = engine.create_student(student).await.map_err(engine_err)?;
                Ok(row_or_tag(returning, "INSERT", || student_rows(vec![info])))
            }
            Command::UpdateStudent { id, patch, returning } => {
                let info = engine.update_student(id, patch).await.map_err(engine_err)?;
                Ok(row_or_tag(returning, "UPDATE", || student_rows(vec![info])))
            }
            Command::DeleteStudent { id } => {
                engine.delete_student(id).await.map_err(engine_err)?;
                Ok(executed("DELETE", 1))
            }
            Command::SelectStudents { id } => {
                let students = match id {
                    Some(id) => vec![engine.get_student(id).map_err(engine_err)?],
                    None => engine.list_students(),
                };
                Ok(student_rows(students))
            }

            // ── Schedules ────────────────────────────────────────
            Command::InsertSchedule { proposal, returning } => {
                let entry = engine.propose_schedule(proposal).await.map_err(engine_err)?;
                Ok(row_or_tag(returning, "INSERT", || schedule_rows(vec![entry])))
            }
            Command::UpdateSchedule { id, patch, returning } => {
                let entry = engine.revise_schedule(id, patch).await.map_err(engine_err)?;
                Ok(row_or_tag(returning, "UPDATE", || schedule_rows(vec![entry])))
            }
            Command::DeleteSchedule { id, returning } => {
                let entry = engine.withdraw_schedule(id).await.map_err(engine_err)?;
                Ok(row_or_tag(returning, "DELETE", || schedule_rows(vec![entry])))
            }
            Command::SelectSchedules { id, filter } => {
                let entries = match id {
                    Some(id) => {
                        let entry = engine.get_schedule(id).await.map_err(engine_err)?;
                        if filter.matches(&entry) { vec![entry] } else { Vec::new() }
                    }
                    None => engine.query_schedules(&filter).await,
                };
                Ok(schedule_rows(entries))
            }
            Command::SelectConflicts {
                teacher_id,
                day,
                start,
                end,
            } => {
                let conflict = engine
                    .has_conflict(teacher_id, day, start, end)
                    .await
                    .map_err(engine_err)?;
                let schema = Arc::new(conflict_schema());
                let mut encoder = DataRowEncoder::new(schema.clone());
                encoder.encode_field(&teacher_id)?;
                encoder.encode_field(&day.to_string())?;
                encoder.encode_field(&format_timestamp(start))?;
                encoder.encode_field(&format_timestamp(end))?;
                encoder.encode_field(&conflict)?;
                let rows = vec![Ok(encoder.take_row())];
                Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
            }

            // ── Notifications ────────────────────────────────────
            Command::Listen { channel } => {
                let teacher_id = channel
                    .strip_prefix("teacher_")
                    .and_then(|id| id.parse::<Id>().ok())
                    .ok_or_else(|| {
                        user_error(
                            "42000",
                            format!("invalid channel: {channel} (expected teacher_{{id}})"),
                        )
                    })?;
                engine.get_teacher(teacher_id).await.map_err(engine_err)?;
                let receiver = engine.notify.subscribe(teacher_id);
                self.listeners.lock().await.insert(channel, receiver);
                Ok(Response::Execution(Tag::new("LISTEN")))
            }
            Command::Unlisten { channel } => {
                let mut listeners = self.listeners.lock().await;
                match channel {
                    Some(channel) => {
                        listeners.remove(&channel);
                    }
                    None => listeners.clear(),
                }
                Ok(Response::Execution(Tag::new("UNLISTEN")))
            }
        }
    }

    /// Deliver events received on this session's channels since the last statement.
    async fn flush_notifications<C>(&self, client: &mut C) -> PgWireResult<()>
    where
        C: Sink<PgWireBackendMessage> + Unpin + Send,
        PgWireError: From<C::Error>,
    {
        let pending = {
            let mut listeners = self.listeners.lock().await;
            let mut pending = Vec::new();
            for (channel, receiver) in listeners.iter_mut() {
                loop {
                    match receiver.try_recv() {
                        Ok(event) => pending.push((channel.clone(), notify::payload(&event))),
                        Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                            tracing::warn!("listener on {channel} dropped {skipped} events");
                        }
                        Err(_) => break,
                    }
                }
            }
            pending
        };
        for (channel, payload) in pending {
            client
                .send(PgWireBackendMessage::NotificationResponse(
                    NotificationResponse::new(0, channel, payload),
                ))
                .await?;
        }
        Ok(())
    }
}

// ── Result sets ──────────────────────────────────────────────────

fn field(name: &str, ty: Type) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, ty, FieldFormat::Text)
}

fn teacher_schema() -> Vec<FieldInfo> {
    vec![
        field("id", Type::INT8),
        field("name", Type::VARCHAR),
        field("subject", Type::VARCHAR),
        field("courses", Type::VARCHAR),
        field("working_hours", Type::VARCHAR),
    ]
}

fn classroom_schema() -> Vec<FieldInfo> {
    vec![
        field("id", Type::INT8),
        field("name", Type::VARCHAR),
        field("capacity", Type::INT8),
        field("description", Type::VARCHAR),
    ]
}

fn course_schema() -> Vec<FieldInfo> {
    vec![
        field("id", Type::INT8),
        field("name", Type::VARCHAR),
        field("description", Type::VARCHAR),
        field("teacher_id", Type::INT8),
        field("teacher_name", Type::VARCHAR),
    ]
}

fn student_schema() -> Vec<FieldInfo> {
    vec![
        field("id", Type::INT8),
        field("name", Type::VARCHAR),
        field("date_of_birth", Type::VARCHAR),
        field("age", Type::INT8),
        field("group_name", Type::VARCHAR),
        field("teacher_id", Type::INT8),
    ]
}

fn schedule_schema() -> Vec<FieldInfo> {
    vec![
        field("id", Type::INT8),
        field("teacher_id", Type::INT8),
        field("teacher_name", Type::VARCHAR),
        field("classroom_id", Type::INT8),
        field("classroom_name", Type::VARCHAR),
        field("group_name", Type::VARCHAR),
        field("start_time", Type::VARCHAR),
        field("end_time", Type::VARCHAR),
        field("day_of_week", Type::VARCHAR),
    ]
}

fn conflict_schema() -> Vec<FieldInfo> {
    vec![
        field("teacher_id", Type::INT8),
        field("day_of_week", Type::VARCHAR),
        field("start_time", Type::VARCHAR),
        field("end_time", Type::VARCHAR),
        field("conflict", Type::BOOL),
    ]
}

/// Row description of a statement, judged by the first table it names.
fn result_schema(sql: &str) -> Vec<FieldInfo> {
    let lower = sql.to_lowercase();
    let returns_rows = lower.trim_start().starts_with("select") || lower.contains("returning");
    if !returns_rows {
        return Vec::new();
    }
    lower
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .find_map(|token| match token {
            "teachers" => Some(teacher_schema()),
            "classrooms" => Some(classroom_schema()),
            "courses" => Some(course_schema()),
            "students" => Some(student_schema()),
            "schedules" => Some(schedule_schema()),
            "conflicts" => Some(conflict_schema()),
            _ => None,
        })
        .unwrap_or_default()
}

fn teacher_rows(teachers: Vec<TeacherInfo>) -> Response {
    let schema = Arc::new(teacher_schema());
    let rows: Vec<PgWireResult<_>> = teachers
        .into_iter()
        .map(|t| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&t.id)?;
            encoder.encode_field(&t.name)?;
            encoder.encode_field(&t.subject)?;
            encoder.encode_field(&t.courses.join(", "))?;
            encoder.encode_field(&t.working_hours.to_string())?;
            Ok(encoder.take_row())
        })
        .collect();
    Response::Query(QueryResponse::new(schema, stream::iter(rows)))
}

fn classroom_rows(classrooms: Vec<ClassroomInfo>) -> Response {
    let schema = Arc::new(classroom_schema());
    let rows: Vec<PgWireResult<_>> = classrooms
        .into_iter()
        .map(|c| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&c.id)?;
            encoder.encode_field(&c.name)?;
            encoder.encode_field(&i64::from(c.capacity))?;
            encoder.encode_field(&c.description)?;
            Ok(encoder.take_row())
        })
        .collect();
    Response::Query(QueryResponse::new(schema, stream::iter(rows)))
}

fn course_rows(courses: Vec<CourseInfo>) -> Response {
    let schema = Arc::new(course_schema());
    let rows: Vec<PgWireResult<_>> = courses
        .into_iter()
        .map(|c| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&c.id)?;
            encoder.encode_field(&c.name)?;
            encoder.encode_field(&c.description)?;
            encoder.encode_field(&c.teacher_id)?;
            encoder.encode_field(&c.teacher_name)?;
            Ok(encoder.take_row())
        })
        .collect();
    Response::Query(QueryResponse::new(schema, stream::iter(rows)))
}

fn student_rows(students: Vec<StudentInfo>) -> Response {
    let schema = Arc::new(student_schema());
    let rows: Vec<PgWireResult<_>> = students
        .into_iter()
        .map(|s| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&s.id)?;
            encoder.encode_field(&s.name)?;
            encoder.encode_field(&s.date_of_birth.format("%Y-%m-%d").to_string())?;
            encoder.encode_field(&i64::from(s.age))?;
            encoder.encode_field(&s.group_name)?;
            encoder.encode_field(&s.teacher_id)?;
            Ok(encoder.take_row())
        })
        .collect();
    Response::Query(QueryResponse::new(schema, stream::iter(rows)))
}

fn schedule_rows(entries: Vec<ScheduleEntry>) -> Response {
    let schema = Arc::new(schedule_schema());
    let rows: Vec<PgWireResult<_>> = entries
        .into_iter()
        .map(|e| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&e.id)?;
            encoder.encode_field(&e.teacher_id)?;
            encoder.encode_field(&e.teacher_name)?;
            encoder.encode_field(&e.classroom_id)?;
            encoder.encode_field(&e.classroom_name)?;
            encoder.encode_field(&e.group_name)?;
            encoder.encode_field(&format_timestamp(e.start))?;
            encoder.encode_field(&format_timestamp(e.end))?;
            encoder.encode_field(&e.day.to_string())?;
            Ok(encoder.take_row())
        })
        .collect();
    Response::Query(QueryResponse::new(schema, stream::iter(rows)))
}

fn executed(tag: &str, rows: usize) -> Response {
    Response::Execution(Tag::new(tag).with_rows(rows))
}

/// The written row for `RETURNING`, the command tag otherwise.
fn row_or_tag(returning: bool, tag: &str, rows: impl FnOnce() -> Response) -> Response {
    if returning { rows() } else { executed(tag, 1) }
}

// ── Simple Query Protocol ────────────────────────────────────────

#[async_trait]
impl SimpleQueryHandler for RegistrarHandler {
    async fn do_query<C>(&self, client: &mut C, query: &str) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let engine = self.resolve_engine(client)?;
        let role = self.resolve_role(client)?;
        let response = self.run(&engine, role, query).await;
        self.flush_notifications(client).await?;
        Ok(vec![response?])
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct RegistrarQueryParser;

#[async_trait]
impl QueryParser for RegistrarQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        _column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(result_schema(stmt))
    }
}

#[async_trait]
impl ExtendedQueryHandler for RegistrarHandler {
    type Statement = String;
    type QueryParser = RegistrarQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let engine = self.resolve_engine(client)?;
        let role = self.resolve_role(client)?;
        let sql = substitute_params(portal);
        let response = self.run(&engine, role, &sql).await;
        self.flush_notifications(client).await?;
        response
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(
            param_types,
            result_schema(&target.statement),
        ))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(result_schema(
            &target.statement.statement,
        )))
    }
}

/// Highest `$N` placeholder in the statement.
fn count_params(sql: &str) -> usize {
    let bytes = sql.as_bytes();
    let mut max = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'$' {
            i += 1;
            continue;
        }
        i += 1;
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if let Ok(n) = sql[start..i].parse::<usize>() {
            max = max.max(n);
        }
    }
    max
}

/// Substitute `$1, $2, ...` with bound parameter values as quoted text literals.
/// Runs from the highest index down so `$1` never clobbers the prefix of `$10`.
fn substitute_params(portal: &Portal<String>) -> String {
    let mut sql = portal.statement.statement.to_string();
    for (i, param) in portal.parameters.iter().enumerate().rev() {
        let placeholder = format!("${}", i + 1);
        let value = match param {
            Some(bytes) => {
                let text = String::from_utf8_lossy(bytes);
                format!("'{}'", text.replace('\'', "''"))
            }
            None => "NULL".to_string(),
        };
        sql = sql.replace(&placeholder, &value);
    }
    sql
}

// ── Factory ──────────────────────────────────────────────────────

pub struct RegistrarFactory {
    handler: Arc<RegistrarHandler>,
    auth_handler: Arc<
        CleartextPasswordAuthStartupHandler<RegistrarAuthSource, DefaultServerParameterProvider>,
    >,
    noop: Arc<NoopHandler>,
}

impl RegistrarFactory {
    pub fn new(tenant_manager: Arc<TenantManager>, credentials: Credentials) -> Self {
        let auth_source = RegistrarAuthSource::new(credentials);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(RegistrarHandler::new(tenant_manager)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for RegistrarFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client connection until it closes.
pub async fn process_connection(
    socket: TcpStream,
    tenant_manager: Arc<TenantManager>,
    credentials: Credentials,
    tls: Option<TlsAcceptor>,
) -> io::Result<()> {
    let factory = RegistrarFactory::new(tenant_manager, credentials);
    pgwire::tokio::process_socket(socket, tls, factory).await
}

// ── Errors ───────────────────────────────────────────────────────

fn user_error(code: &str, message: String) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        code.into(),
        message,
    )))
}

/// SQLSTATE reported for an engine rejection.
pub fn sqlstate(e: &EngineError) -> &'static str {
    match e {
        EngineError::NotFound(..) => "P0002",
        EngineError::InvalidWindow { .. }
        | EngineError::InvalidDuration { .. }
        | EngineError::DayMismatch { .. }
        | EngineError::Validation(_) => "22023",
        EngineError::TeacherUnavailable { .. } | EngineError::ClassroomUnavailable { .. } => {
            "23P01"
        }
        EngineError::InsufficientHours { .. } => "23514",
        EngineError::AlreadyExists(..) => "23505",
        EngineError::HasLessons(..) => "23503",
        EngineError::LimitExceeded(_) => "54000",
        EngineError::Storage(_) => "58030",
    }
}

fn engine_err(e: EngineError) -> PgWireError {
    if e.is_transient() {
        tracing::error!("engine failure: {e}");
    }
    user_error(sqlstate(&e), e.to_string())
}

fn sql_err(e: SqlError) -> PgWireError {
    let code = match e {
        SqlError::UnknownTable(_) => "42P01",
        SqlError::UnknownColumn(..) => "42703",
        _ => "42601",
    };
    user_error(code, e.to_string())
}
