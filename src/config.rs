//! Runtime settings: command-line flags, each with an environment fallback.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;

use crate::params::{ConnectionParameters, FormDefaults, DEFAULT_HOST, DEFAULT_PORT};
use crate::postgres::PoolOptions;

#[derive(Debug, Clone, Parser)]
#[command(name = "pgpeek", version, about = "Browse PostgreSQL tables from a web page")]
pub struct Settings {
    /// Address to bind the HTTP listener on.
    #[arg(long, env = "PGPEEK_BIND", default_value = "0.0.0.0")]
    pub bind: String,

    #[arg(long, env = "PGPEEK_HTTP_PORT", default_value_t = 5000)]
    pub http_port: u16,

    /// Mark the session cookie `Secure` (only sent over HTTPS).
    #[arg(long, env = "PGPEEK_SECURE_COOKIES", default_value_t = false)]
    pub secure_cookies: bool,

    /// Idle lifetime of a session that has not logged in yet.
    #[arg(long, env = "PGPEEK_SESSION_TTL_SECS", default_value_t = 3600)]
    pub session_ttl_secs: u64,

    /// Host used when the login form leaves it out.
    #[arg(long, env = "PGPEEK_DEFAULT_HOST", default_value = DEFAULT_HOST)]
    pub default_host: String,

    #[arg(long, env = "PGPEEK_DEFAULT_PORT", default_value_t = DEFAULT_PORT)]
    pub default_port: u16,

    /// Shared pool credentials. The pool is only attempted when dbname, user and
    /// password are all set.
    #[arg(long, env = "PGPEEK_POOL_HOST", default_value = DEFAULT_HOST)]
    pub pool_host: String,

    #[arg(long, env = "PGPEEK_POOL_PORT", default_value_t = DEFAULT_PORT)]
    pub pool_port: u16,

    #[arg(long, env = "PGPEEK_POOL_DBNAME")]
    pub pool_dbname: Option<String>,

    #[arg(long, env = "PGPEEK_POOL_USER")]
    pub pool_user: Option<String>,

    #[arg(long, env = "PGPEEK_POOL_PASSWORD", hide_env_values = true)]
    pub pool_password: Option<String>,

    #[arg(long, env = "PGPEEK_POOL_MIN", default_value_t = 1)]
    pub pool_min: usize,

    #[arg(long, env = "PGPEEK_POOL_MAX", default_value_t = 5)]
    pub pool_max: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self::parse_from(["pgpeek"])
    }
}

impl Settings {
    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.bind, self.http_port).parse()?)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn form_defaults(&self) -> FormDefaults {
        FormDefaults { host: self.default_host.clone(), port: self.default_port }
    }

    pub fn pool_options(&self) -> Option<PoolOptions> {
        let (Some(dbname), Some(user), Some(password)) =
            (self.pool_dbname.clone(), self.pool_user.clone(), self.pool_password.clone())
        else {
            return None;
        };
        Some(PoolOptions {
            params: ConnectionParameters {
                host: self.pool_host.clone(),
                port: self.pool_port,
                dbname,
                user,
                password,
            },
            min_size: self.pool_min,
            max_size: self.pool_max,
        })
    }
}
