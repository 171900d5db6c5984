//! Error model shared by the login handshake and the table pages.
//!
//! Login failures are classified into a handful of user-facing categories. Database
//! errors raised while reading tables keep the raw driver text, which is what the
//! table pages show.

use thiserror::Error;

/// Coarse error taxonomy used for logging and for deciding what a user gets to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad form input; no network call was attempted.
    Validation,
    /// Server unreachable.
    Connectivity,
    /// Unknown database, unknown role or rejected password.
    Credential,
    /// A database error that matched no known pattern.
    UnclassifiedDatabase,
    /// Anything else.
    Unexpected,
}

/// A failed login attempt, already phrased for the login form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoginError {
    #[error("All fields are required.")]
    MissingFields,
    #[error("Port must be numeric.")]
    InvalidPort,
    #[error("The server is unavailable or unreachable.")]
    Unavailable,
    #[error("Database '{0}' does not exist.")]
    UnknownDatabase(String),
    #[error("User '{0}' does not exist.")]
    UnknownRole(String),
    // Postgres does not say whether the role or the password was wrong; neither do we.
    #[error("User or password is incorrect.")]
    BadCredentials,
    #[error("Connection error. Check the entered data.")]
    Unclassified,
}

impl LoginError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            LoginError::MissingFields | LoginError::InvalidPort => ErrorCategory::Validation,
            LoginError::Unavailable => ErrorCategory::Connectivity,
            LoginError::UnknownDatabase(_)
            | LoginError::UnknownRole(_)
            | LoginError::BadCredentials => ErrorCategory::Credential,
            LoginError::Unclassified => ErrorCategory::UnclassifiedDatabase,
        }
    }

    pub fn code_str(&self) -> &'static str {
        match self {
            LoginError::MissingFields => "missing_fields",
            LoginError::InvalidPort => "invalid_port",
            LoginError::Unavailable => "server_unavailable",
            LoginError::UnknownDatabase(_) => "unknown_database",
            LoginError::UnknownRole(_) => "unknown_role",
            LoginError::BadCredentials => "bad_credentials",
            LoginError::Unclassified => "connection_error",
        }
    }
}

const UNAVAILABLE_MARKERS: &[&str] = &[
    "could not connect to server",
    "error connecting to server",
    "connection refused",
    "no route to host",
    "network is unreachable",
    "timeout",
    "timed out",
    "failed to lookup address",
];

/// Classify the text of a failed login connection. Rules are checked in order and
/// the first match wins.
pub fn classify_login_failure(error_text: &str, dbname: &str, user: &str) -> LoginError {
    let msg = error_text.to_lowercase();

    if UNAVAILABLE_MARKERS.iter().any(|m| msg.contains(m)) {
        return LoginError::Unavailable;
    }
    if msg.contains("database") && msg.contains("does not exist") {
        return LoginError::UnknownDatabase(dbname.to_string());
    }
    if msg.contains("role") && msg.contains("does not exist") {
        return LoginError::UnknownRole(user.to_string());
    }
    if msg.contains("password authentication failed") || msg.contains("authentication failed") {
        return LoginError::BadCredentials;
    }
    LoginError::Unclassified
}

/// Which stage of database access failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbErrorKind {
    /// Opening a direct connection.
    Connect,
    /// Borrowing from the shared pool.
    Pool,
    /// The server rejected the statement itself (SQLSTATE class 42).
    Programming,
    /// Any other failure while running a statement.
    Query,
}

/// A database failure carrying the driver's own text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct DbError {
    pub kind: DbErrorKind,
    pub message: String,
}

impl DbError {
    pub fn new(kind: DbErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn connect(message: impl Into<String>) -> Self { Self::new(DbErrorKind::Connect, message) }
    pub fn pool(message: impl Into<String>) -> Self { Self::new(DbErrorKind::Pool, message) }
    pub fn programming(message: impl Into<String>) -> Self { Self::new(DbErrorKind::Programming, message) }
    pub fn query(message: impl Into<String>) -> Self { Self::new(DbErrorKind::Query, message) }

    pub fn is_programming(&self) -> bool {
        self.kind == DbErrorKind::Programming
    }
}

/// Failure to issue a session id.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no entropy for session id: {0}")]
    Entropy(getrandom::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_failures_are_unavailable() {
        let cases = [
            "error connecting to server: Connection refused (os error 111)",
            "error connecting to server: No route to host (os error 113)",
            "error connecting to server: Network is unreachable (os error 101)",
            "error connecting to server: connection timed out",
            "could not connect to server: Connection refused",
            "timeout expired",
        ];
        for text in cases {
            assert_eq!(classify_login_failure(text, "appdb", "alice"), LoginError::Unavailable, "{text}");
        }
        assert_eq!(LoginError::Unavailable.category(), ErrorCategory::Connectivity);
    }

    #[test]
    fn unknown_database_names_the_database() {
        let err = classify_login_failure("db error: FATAL: database \"nope\" does not exist", "nope", "alice");
        assert_eq!(err, LoginError::UnknownDatabase("nope".into()));
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn unknown_role_names_the_user() {
        let err = classify_login_failure("db error: FATAL: role \"mallory\" does not exist", "appdb", "mallory");
        assert_eq!(err, LoginError::UnknownRole("mallory".into()));
        assert!(err.to_string().contains("mallory"));
    }

    #[test]
    fn auth_failures_do_not_disclose_which_part_was_wrong() {
        let bad_password = classify_login_failure(
            "db error: FATAL: password authentication failed for user \"alice\"", "appdb", "alice");
        let bad_user = classify_login_failure(
            "db error: FATAL: password authentication failed for user \"bob\"", "appdb", "bob");
        assert_eq!(bad_password.to_string(), bad_user.to_string());
        assert_eq!(bad_password.code_str(), "bad_credentials");
    }

    #[test]
    fn network_rule_wins_over_later_rules() {
        let err = classify_login_failure("authentication failed: timed out", "appdb", "alice");
        assert_eq!(err, LoginError::Unavailable);
    }

    #[test]
    fn unmatched_text_is_generic_and_hides_server_detail() {
        let err = classify_login_failure("db error: FATAL: too many connections for role", "appdb", "alice");
        assert_eq!(err, LoginError::Unclassified);
        assert!(!err.to_string().contains("too many"));
        assert_eq!(err.category(), ErrorCategory::UnclassifiedDatabase);
    }

    #[test]
    fn db_error_displays_raw_text() {
        let err = DbError::programming("db error: ERROR: relation \"x\" does not exist");
        assert!(err.is_programming());
        assert_eq!(err.to_string(), "db error: ERROR: relation \"x\" does not exist");
    }
}
