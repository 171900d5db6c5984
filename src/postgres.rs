//! tokio-postgres backed connections and the deadpool shared pool.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{Config as PoolSettings, PoolConfig, Runtime};
use tokio_postgres::error::SqlState;
use tokio_postgres::{NoTls, SimpleQueryMessage};
use tracing::{debug, error, info, warn};

use crate::db::{Connection, ConnectionPool, Connector, RowSet, PROBE_QUERY};
use crate::error::{DbError, DbErrorKind};
use crate::params::ConnectionParameters;

/// Class 42 is syntax error or access rule violation (undefined table, bad grammar).
fn kind_for_sqlstate(code: Option<&str>) -> DbErrorKind {
    match code {
        Some(c) if c.starts_with("42") => DbErrorKind::Programming,
        _ => DbErrorKind::Query,
    }
}

fn query_error(e: tokio_postgres::Error) -> DbError {
    let kind = kind_for_sqlstate(e.code().map(SqlState::code));
    DbError::new(kind, e.to_string())
}

/// Run a statement through the simple query protocol and collect every value as text.
async fn simple_rows(client: &tokio_postgres::Client, sql: &str) -> Result<RowSet, DbError> {
    let msgs = client.simple_query(sql).await.map_err(query_error)?;
    let mut out = RowSet::default();
    for m in msgs {
        match m {
            SimpleQueryMessage::RowDescription(cols) => {
                out.columns = cols.iter().map(|c| c.name().to_string()).collect();
            }
            SimpleQueryMessage::Row(r) => {
                if out.columns.is_empty() {
                    out.columns = r.columns().iter().map(|c| c.name().to_string()).collect();
                }
                out.rows.push((0..r.len()).map(|i| r.get(i).map(str::to_string)).collect());
            }
            _ => {}
        }
    }
    Ok(out)
}

/// A direct connection; dropping the client ends the background connection task.
pub struct PgConnection {
    client: tokio_postgres::Client,
}

#[async_trait]
impl Connection for PgConnection {
    async fn query(&mut self, sql: &str) -> Result<RowSet, DbError> {
        simple_rows(&self.client, sql).await
    }
}

#[derive(Debug, Clone, Default)]
pub struct PgConnector;

#[async_trait]
impl Connector for PgConnector {
    async fn connect(
        &self,
        params: &ConnectionParameters,
        connect_timeout: Option<Duration>,
    ) -> Result<Box<dyn Connection>, DbError> {
        let mut cfg = tokio_postgres::Config::new();
        cfg.host(&params.host)
            .port(params.port)
            .dbname(&params.dbname)
            .user(&params.user)
            .password(&params.password)
            .application_name("pgpeek");
        if let Some(t) = connect_timeout {
            cfg.connect_timeout(t);
        }
        let (client, connection) = cfg
            .connect(NoTls)
            .await
            .map_err(|e| DbError::connect(e.to_string()))?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!(target: "provider", "connection task ended: {}", e);
            }
        });
        Ok(Box::new(PgConnection { client }))
    }
}

/// A connection borrowed from the pool; dropping it hands it back.
pub struct PooledConnection {
    object: deadpool_postgres::Object,
}

#[async_trait]
impl Connection for PooledConnection {
    async fn query(&mut self, sql: &str) -> Result<RowSet, DbError> {
        simple_rows(&self.object, sql).await
    }
}

/// Fixed credentials and bounds for the optional shared pool.
#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub params: ConnectionParameters,
    pub min_size: usize,
    pub max_size: usize,
}

pub struct PgPool {
    inner: deadpool_postgres::Pool,
}

impl PgPool {
    /// Build the pool and open `min_size` connections up front, probing each.
    /// Any failure is returned so the caller can fall back to direct connections.
    pub async fn connect(opts: &PoolOptions) -> Result<Self, DbError> {
        let mut cfg = PoolSettings::new();
        cfg.host = Some(opts.params.host.clone());
        cfg.port = Some(opts.params.port);
        cfg.dbname = Some(opts.params.dbname.clone());
        cfg.user = Some(opts.params.user.clone());
        cfg.password = Some(opts.params.password.clone());
        cfg.application_name = Some("pgpeek".to_string());
        cfg.pool = Some(PoolConfig::new(opts.max_size.max(1)));
        let inner = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| DbError::pool(e.to_string()))?;

        let mut warm = Vec::with_capacity(opts.min_size);
        for _ in 0..opts.min_size.min(opts.max_size.max(1)) {
            let object = inner.get().await.map_err(|e| DbError::pool(e.to_string()))?;
            simple_rows(&object, PROBE_QUERY).await?;
            warm.push(object);
        }
        drop(warm);

        info!(
            target: "provider",
            "shared pool ready: host={} port={} dbname={} min={} max={}",
            opts.params.host, opts.params.port, opts.params.dbname, opts.min_size, opts.max_size
        );
        Ok(Self { inner })
    }
}

#[async_trait]
impl ConnectionPool for PgPool {
    async fn acquire(&self) -> Result<Box<dyn Connection>, DbError> {
        let object = self.inner.get().await.map_err(|e| {
            error!(target: "provider", "pool acquire failed: {}", e);
            DbError::pool(e.to_string())
        })?;
        Ok(Box::new(PooledConnection { object }))
    }
}

/// Try to bring up the shared pool; `None` means every request connects directly.
pub async fn init_pool(opts: &PoolOptions) -> Option<PgPool> {
    match PgPool::connect(opts).await {
        Ok(pool) => Some(pool),
        Err(e) => {
            warn!(target: "provider", "shared pool unavailable, using per-session connections: {}", e);
            None
        }
    }
}
