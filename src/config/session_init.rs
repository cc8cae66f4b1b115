use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

use crate::error::BridgeError;

/// Line that separates the database-scope part of an init script from the connection-scope part.
pub const CONNECTION_INIT_MARKER: &str = "/* CONNECTION_INIT_BELOW_MARKER */";

/// The marker, tolerant of whitespace inside the comment.
static MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/\*\s*CONNECTION_INIT_BELOW_MARKER\s*\*/").unwrap());

/// Session init script, split into the fragment run once per database and the fragment run
/// once per connection.
///
/// ```rust
/// use sql_bridge::config::SessionInit;
///
/// let init = SessionInit::new(
///     "CREATE TABLE IF NOT EXISTS audit (at TEXT);\n\
///      /* CONNECTION_INIT_BELOW_MARKER */\n\
///      PRAGMA foreign_keys = ON;",
/// )
/// .unwrap();
/// assert_eq!(init.database_sql(), Some("CREATE TABLE IF NOT EXISTS audit (at TEXT);"));
/// assert_eq!(init.connection_sql(), Some("PRAGMA foreign_keys = ON;"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInit {
    database_sql: Option<String>,
    connection_sql: Option<String>,
}

impl SessionInit {
    /// Split `script` on the marker. Without a marker the whole script is database scope.
    ///
    /// # Errors
    /// Returns `BridgeError::Config` if the marker appears more than once.
    pub fn new(script: &str) -> Result<Self, BridgeError> {
        let mut parts = MARKER.splitn(script, 3);
        let database = parts.next().unwrap_or_default();
        let connection = parts.next();
        if parts.next().is_some() {
            return Err(BridgeError::Config(format!(
                "session init script contains {CONNECTION_INIT_MARKER} more than once"
            )));
        }
        Ok(Self {
            database_sql: non_blank(database),
            connection_sql: connection.and_then(non_blank),
        })
    }

    /// Split `script` after checking it against a SHA-256 hex digest.
    ///
    /// # Errors
    /// Returns `BridgeError::Config` when the digest does not match or the script is malformed.
    pub fn verified(script: &str, expected_sha256: &str) -> Result<Self, BridgeError> {
        let actual = sha256_hex(script);
        if !actual.eq_ignore_ascii_case(expected_sha256.trim()) {
            return Err(BridgeError::Config(format!(
                "session init script checksum mismatch: expected {}, found {actual}",
                expected_sha256.trim()
            )));
        }
        Self::new(script)
    }

    #[must_use]
    pub fn database_sql(&self) -> Option<&str> {
        self.database_sql.as_deref()
    }

    #[must_use]
    pub fn connection_sql(&self) -> Option<&str> {
        self.connection_sql.as_deref()
    }
}

/// Lower-case hex SHA-256 of the script text.
#[must_use]
pub fn sha256_hex(script: &str) -> String {
    hex::encode(Sha256::digest(script.as_bytes()))
}

fn non_blank(fragment: &str) -> Option<String> {
    let trimmed = fragment.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_match_tolerates_whitespace() {
        let init = SessionInit::new("A;/*CONNECTION_INIT_BELOW_MARKER   */B;").unwrap();
        assert_eq!(init.database_sql(), Some("A;"));
        assert_eq!(init.connection_sql(), Some("B;"));

        let only_conn = SessionInit::new(&format!("{CONNECTION_INIT_MARKER}\nB;")).unwrap();
        assert_eq!(only_conn.database_sql(), None);
        assert_eq!(only_conn.connection_sql(), Some("B;"));
    }

    #[test]
    fn repeated_marker_is_rejected() {
        let script = format!("A;{CONNECTION_INIT_MARKER}B;{CONNECTION_INIT_MARKER}C;");
        assert!(matches!(SessionInit::new(&script), Err(BridgeError::Config(_))));
    }

    #[test]
    fn checksum_must_match_exactly() {
        let script = "SELECT 1;";
        let digest = sha256_hex(script);
        assert_eq!(digest.len(), 64);
        assert!(SessionInit::verified(script, &digest.to_uppercase()).is_ok());
        let err = SessionInit::verified("SELECT 2;", &digest).unwrap_err();
        assert!(err.to_string().contains("checksum mismatch"));
    }
}
