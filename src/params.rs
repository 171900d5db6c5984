//! Connection parameters and the login form they are parsed from.

use std::fmt;

use serde::Deserialize;

use crate::error::LoginError;

pub const DEFAULT_HOST: &str = "192.168.122.159";
pub const DEFAULT_PORT: u16 = 5432;

/// Everything needed to open a connection on behalf of one session.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionParameters {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
}

impl fmt::Debug for ConnectionParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParameters")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("dbname", &self.dbname)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Raw login form as posted by the browser. Missing fields deserialize to `None`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginForm {
    pub dbname: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub host: Option<String>,
    pub port: Option<String>,
}

/// Fallbacks applied when the form leaves host or port out.
#[derive(Debug, Clone)]
pub struct FormDefaults {
    pub host: String,
    pub port: u16,
}

impl Default for FormDefaults {
    fn default() -> Self {
        Self { host: DEFAULT_HOST.to_string(), port: DEFAULT_PORT }
    }
}

impl LoginForm {
    /// Validate the form without touching the network.
    pub fn validate(&self, defaults: &FormDefaults) -> Result<ConnectionParameters, LoginError> {
        let field = |v: &Option<String>| v.as_deref().unwrap_or("").trim().to_string();
        let dbname = field(&self.dbname);
        let user = field(&self.user);
        let password = field(&self.password);
        if dbname.is_empty() || user.is_empty() || password.is_empty() {
            return Err(LoginError::MissingFields);
        }

        let host = match self.host.as_deref() {
            Some(h) => h.trim().to_string(),
            None => defaults.host.clone(),
        };
        let port = match self.port.as_deref() {
            Some(p) => p.trim().parse::<u16>().map_err(|_| LoginError::InvalidPort)?,
            None => defaults.port,
        };

        Ok(ConnectionParameters { host, port, dbname, user, password })
    }
}
