use async_trait::async_trait;
use pgwire::api::auth::{AuthSource, LoginInfo, Password};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};

/// Who is connected. The login user name selects the role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Teacher,
}

impl Role {
    pub fn from_user(user: &str) -> Option<Self> {
        match user {
            "admin" => Some(Role::Admin),
            "teacher" => Some(Role::Teacher),
            _ => None,
        }
    }

    /// Teachers may only read schedules and check for conflicts.
    pub fn can_write(self) -> bool {
        self == Role::Admin
    }
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub admin_password: String,
    pub teacher_password: String,
}

#[derive(Debug)]
pub struct RegistrarAuthSource {
    credentials: Credentials,
}

impl RegistrarAuthSource {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }

    fn password_for(&self, role: Role) -> &str {
        match role {
            Role::Admin => &self.credentials.admin_password,
            Role::Teacher => &self.credentials.teacher_password,
        }
    }
}

#[async_trait]
impl AuthSource for RegistrarAuthSource {
    async fn get_password(&self, login: &LoginInfo) -> PgWireResult<Password> {
        let user = login.user().map(str::to_owned).unwrap_or_default();
        let Some(role) = Role::from_user(&user) else {
            metrics::counter!(crate::observability::AUTH_FAILURES_TOTAL).increment(1);
            tracing::warn!("login refused for unknown user {user:?}");
            return Err(PgWireError::UserError(Box::new(ErrorInfo::new(
                "FATAL".into(),
                "28000".into(),
                format!("unknown user {user:?}"),
            ))));
        };
        Ok(Password::new(None, self.password_for(role).as_bytes().to_vec()))
    }
}
