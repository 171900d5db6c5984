//! Login handshake: validate the form, open one connection, probe it, close it.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::db::{Connector, PROBE_QUERY};
use crate::error::{classify_login_failure, DbError, LoginError};
use crate::params::{ConnectionParameters, FormDefaults, LoginForm};

pub const LOGIN_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Failure text used when the handshake outlives the login timeout.
const HANDSHAKE_TIMEOUT_TEXT: &str = "timeout waiting for server";

pub struct Authenticator {
    connector: Arc<dyn Connector>,
    connect_timeout: Duration,
}

impl Authenticator {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self::with_timeout(connector, LOGIN_CONNECT_TIMEOUT)
    }

    pub fn with_timeout(connector: Arc<dyn Connector>, connect_timeout: Duration) -> Self {
        Self { connector, connect_timeout }
    }

    /// Check that `params` open a usable connection. The whole handshake (TCP
    /// connect, startup and authentication, probe) shares one timeout. The probe
    /// connection is dropped before returning; persisting `params` is up to the caller.
    pub async fn authenticate(&self, params: &ConnectionParameters) -> Result<(), LoginError> {
        let classify = |text: &str| {
            let err = classify_login_failure(text, &params.dbname, &params.user);
            warn!(
                target: "auth",
                "login failed host={} port={} dbname={} user={} code={}: {}",
                params.host, params.port, params.dbname, params.user, err.code_str(), text
            );
            err
        };

        let handshake = async {
            let mut conn = self.connector.connect(params, Some(self.connect_timeout)).await?;
            conn.query(PROBE_QUERY).await?;
            Ok::<(), DbError>(())
        };
        match tokio::time::timeout(self.connect_timeout, handshake).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(classify(&e.message)),
            Err(_) => return Err(classify(HANDSHAKE_TIMEOUT_TEXT)),
        }

        info!(target: "auth", "login ok host={} port={} dbname={} user={}", params.host, params.port, params.dbname, params.user);
        Ok(())
    }

    /// Validate the raw form, then authenticate. Validation failures never reach
    /// the network.
    pub async fn login(
        &self,
        form: &LoginForm,
        defaults: &FormDefaults,
    ) -> Result<ConnectionParameters, LoginError> {
        let params = form.validate(defaults)?;
        self.authenticate(&params).await?;
        Ok(params)
    }
}
