//! Database seams: connection traits, the introspection queries and the row set they
//! produce.
//!
//! Handles returned by [`Connector::connect`] and [`ConnectionPool::acquire`] release
//! themselves on drop, so a handle held in a local is returned to the pool (or closed)
//! on every exit path of the request that owns it.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::DbError;
use crate::params::ConnectionParameters;

/// Probe used to confirm a fresh connection can actually run statements.
pub const PROBE_QUERY: &str = "SELECT 1";

pub const LIST_TABLES_QUERY: &str = "SELECT table_name \
     FROM information_schema.tables \
     WHERE table_type = 'BASE TABLE' AND table_schema = 'public' \
     ORDER BY table_name";

/// Maximum number of rows a table preview returns.
pub const PREVIEW_ROW_LIMIT: usize = 100;

/// Rows as text, in server order. `None` is SQL NULL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl RowSet {
    pub fn truncate(&mut self, max_rows: usize) {
        self.rows.truncate(max_rows);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    pub name: String,
}

/// A live connection for the duration of one request.
#[async_trait]
pub trait Connection: Send {
    async fn query(&mut self, sql: &str) -> Result<RowSet, DbError>;
}

/// Opens direct connections from per-session parameters.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        params: &ConnectionParameters,
        connect_timeout: Option<Duration>,
    ) -> Result<Box<dyn Connection>, DbError>;
}

/// A shared, bounded set of connections opened with fixed credentials.
#[async_trait]
pub trait ConnectionPool: Send + Sync {
    async fn acquire(&self) -> Result<Box<dyn Connection>, DbError>;
}

/// Quote a name as a Postgres identifier so it cannot escape into the statement.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn preview_query(table: &str) -> String {
    format!("SELECT * FROM {} LIMIT {}", quote_ident(table), PREVIEW_ROW_LIMIT)
}

pub async fn list_tables(conn: &mut dyn Connection) -> Result<Vec<TableDescriptor>, DbError> {
    let set = conn.query(LIST_TABLES_QUERY).await?;
    Ok(set
        .rows
        .into_iter()
        .filter_map(|row| row.into_iter().next().flatten())
        .map(|name| TableDescriptor { name })
        .collect())
}

pub async fn preview_table(conn: &mut dyn Connection, table: &str) -> Result<RowSet, DbError> {
    let mut set = conn.query(&preview_query(table)).await?;
    set.truncate(PREVIEW_ROW_LIMIT);
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Canned(RowSet, Vec<String>);

    #[async_trait]
    impl Connection for Canned {
        async fn query(&mut self, sql: &str) -> Result<RowSet, DbError> {
            self.1.push(sql.to_string());
            Ok(self.0.clone())
        }
    }

    #[test]
    fn quoting_doubles_embedded_quotes() {
        assert_eq!(quote_ident("users"), "\"users\"");
        assert_eq!(quote_ident("x\"; DROP TABLE t; --"), "\"x\"\"; DROP TABLE t; --\"");
        assert_eq!(preview_query("Orders"), "SELECT * FROM \"Orders\" LIMIT 100");
    }

    #[tokio::test]
    async fn list_tables_takes_first_column() {
        let set = RowSet {
            columns: vec!["table_name".into()],
            rows: vec![vec![Some("orders".into())], vec![Some("users".into())]],
        };
        let mut conn = Canned(set, Vec::new());
        let tables = list_tables(&mut conn).await.unwrap();
        let names: Vec<_> = tables.into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["orders", "users"]);
        assert_eq!(conn.1, vec![LIST_TABLES_QUERY.to_string()]);
    }

    #[tokio::test]
    async fn preview_is_capped() {
        let set = RowSet {
            columns: vec!["id".into()],
            rows: (0..250).map(|i| vec![Some(i.to_string())]).collect(),
        };
        let mut conn = Canned(set, Vec::new());
        let out = preview_table(&mut conn, "big").await.unwrap();
        assert_eq!(out.rows.len(), PREVIEW_ROW_LIMIT);
        assert_eq!(out.columns, vec!["id"]);
    }
}
