use std::io;
use std::path::PathBuf;
use std::str::FromStr;

/// What to do when a proposal's `day_of_week` disagrees with its start time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DayCheck {
    /// Trust the label.
    Ignore,
    /// Trust the label, log the disagreement.
    #[default]
    Warn,
    /// Refuse the proposal.
    Reject,
}

impl FromStr for DayCheck {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ignore" | "off" => Ok(DayCheck::Ignore),
            "warn" => Ok(DayCheck::Warn),
            "reject" | "strict" => Ok(DayCheck::Reject),
            other => Err(format!("unknown day check policy: {other}")),
        }
    }
}

/// Knobs of the admission pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AdmissionPolicy {
    pub day_check: DayCheck,
    /// Also refuse lessons that would double-book a classroom.
    pub classroom_conflicts: bool,
}

/// Server settings, read from `REGISTRAR_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub bind: String,
    pub data_dir: PathBuf,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    pub tls_cert: Option<String>,
    pub tls_key: Option<String>,
    pub admin_password: String,
    pub teacher_password: String,
    pub policy: AdmissionPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5433,
            bind: "0.0.0.0".into(),
            data_dir: PathBuf::from("./data"),
            max_connections: 256,
            compact_threshold: 1000,
            metrics_port: None,
            tls_cert: None,
            tls_key: None,
            admin_password: "registrar".into(),
            teacher_password: "teacher".into(),
            policy: AdmissionPolicy::default(),
        }
    }
}

fn invalid(var: &str, value: &str, reason: impl std::fmt::Display) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("{var}={value:?}: {reason}"),
    )
}

impl Config {
    pub fn from_env() -> io::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Unset variables keep their defaults;
    /// set but malformed ones are an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> io::Result<Self> {
        fn parsed<T: FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            var: &str,
        ) -> io::Result<Option<T>>
        where
            T::Err: std::fmt::Display,
        {
            match lookup(var) {
                None => Ok(None),
                Some(raw) => raw
                    .trim()
                    .parse()
                    .map(Some)
                    .map_err(|e| invalid(var, &raw, e)),
            }
        }

        let mut cfg = Config::default();
        if let Some(port) = parsed(&lookup, "REGISTRAR_PORT")? {
            cfg.port = port;
        }
        if let Some(bind) = lookup("REGISTRAR_BIND") {
            cfg.bind = bind;
        }
        if let Some(dir) = lookup("REGISTRAR_DATA_DIR") {
            cfg.data_dir = PathBuf::from(dir);
        }
        if let Some(n) = parsed(&lookup, "REGISTRAR_MAX_CONNECTIONS")? {
            cfg.max_connections = n;
        }
        if let Some(n) = parsed(&lookup, "REGISTRAR_COMPACT_THRESHOLD")? {
            cfg.compact_threshold = n;
        }
        cfg.metrics_port = parsed(&lookup, "REGISTRAR_METRICS_PORT")?;
        cfg.tls_cert = lookup("REGISTRAR_TLS_CERT");
        cfg.tls_key = lookup("REGISTRAR_TLS_KEY");
        if let Some(pw) = lookup("REGISTRAR_ADMIN_PASSWORD") {
            cfg.admin_password = pw;
        }
        if let Some(pw) = lookup("REGISTRAR_TEACHER_PASSWORD") {
            cfg.teacher_password = pw;
        }
        if let Some(day_check) = parsed(&lookup, "REGISTRAR_DAY_CHECK")? {
            cfg.policy.day_check = day_check;
        }
        if let Some(on) = parsed::<bool>(&lookup, "REGISTRAR_CLASSROOM_CONFLICTS")? {
            cfg.policy.classroom_conflicts = on;
        }

        if cfg.max_connections == 0 {
            return Err(invalid("REGISTRAR_MAX_CONNECTIONS", "0", "must be positive"));
        }
        if cfg.tls_cert.is_some() != cfg.tls_key.is_some() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "both REGISTRAR_TLS_CERT and REGISTRAR_TLS_KEY must be set, or neither",
            ));
        }
        Ok(cfg)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}
