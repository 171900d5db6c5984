//! Per-request connection acquisition: shared pool first, then the session's own
//! parameters.

use std::sync::Arc;

use tracing::debug;

use crate::db::{Connection, ConnectionPool, Connector};
use crate::error::DbError;
use crate::params::ConnectionParameters;

#[derive(Clone)]
pub struct ConnectionProvider {
    pool: Option<Arc<dyn ConnectionPool>>,
    connector: Arc<dyn Connector>,
}

impl ConnectionProvider {
    pub fn new(pool: Option<Arc<dyn ConnectionPool>>, connector: Arc<dyn Connector>) -> Self {
        Self { pool, connector }
    }

    pub fn has_pool(&self) -> bool {
        self.pool.is_some()
    }

    /// Yield one connection for the current request, or `None` when there is neither
    /// a pool nor session parameters. No retries and no health check: a stale pooled
    /// connection fails the request.
    pub async fn acquire(
        &self,
        session_config: Option<&ConnectionParameters>,
    ) -> Result<Option<Box<dyn Connection>>, DbError> {
        if let Some(pool) = &self.pool {
            debug!(target: "provider", "acquiring pooled connection");
            return pool.acquire().await.map(Some);
        }
        match session_config {
            Some(cfg) => {
                debug!(target: "provider", "opening direct connection to {}:{}/{}", cfg.host, cfg.port, cfg.dbname);
                self.connector.connect(cfg, None).await.map(Some)
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::db::RowSet;

    struct Tagged(&'static str);

    #[async_trait]
    impl Connection for Tagged {
        async fn query(&mut self, _sql: &str) -> Result<RowSet, DbError> {
            Ok(RowSet { columns: vec![self.0.to_string()], rows: vec![] })
        }
    }

    #[derive(Default)]
    struct Counting(AtomicUsize);

    #[async_trait]
    impl Connector for Counting {
        async fn connect(&self, _p: &ConnectionParameters, _t: Option<Duration>) -> Result<Box<dyn Connection>, DbError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(Tagged("direct")))
        }
    }

    #[async_trait]
    impl ConnectionPool for Counting {
        async fn acquire(&self) -> Result<Box<dyn Connection>, DbError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(Tagged("pooled")))
        }
    }

    fn params() -> ConnectionParameters {
        ConnectionParameters {
            host: "db.local".into(),
            port: 5432,
            dbname: "appdb".into(),
            user: "alice".into(),
            password: "secret".into(),
        }
    }

    async fn tag(conn: Option<Box<dyn Connection>>) -> String {
        let mut conn = conn.expect("connection");
        conn.query("SELECT 1").await.unwrap().columns.remove(0)
    }

    #[tokio::test]
    async fn pool_takes_precedence_over_session() {
        let pool = Arc::new(Counting::default());
        let direct = Arc::new(Counting::default());
        let provider = ConnectionProvider::new(Some(pool.clone()), direct.clone());
        let conn = provider.acquire(Some(&params())).await.unwrap();
        assert_eq!(tag(conn).await, "pooled");
        assert_eq!(pool.0.load(Ordering::SeqCst), 1);
        assert_eq!(direct.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn falls_back_to_session_parameters() {
        let direct = Arc::new(Counting::default());
        let provider = ConnectionProvider::new(None, direct.clone());
        let conn = provider.acquire(Some(&params())).await.unwrap();
        assert_eq!(tag(conn).await, "direct");
        assert_eq!(direct.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn nothing_to_connect_with_yields_none() {
        let direct = Arc::new(Counting::default());
        let provider = ConnectionProvider::new(None, direct.clone());
        assert!(provider.acquire(None).await.unwrap().is_none());
        assert_eq!(direct.0.load(Ordering::SeqCst), 0);
    }
}
