use std::collections::BTreeMap;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::database::Database;
use crate::error::BridgeError;

mod session_init;

pub use session_init::{CONNECTION_INIT_MARKER, SessionInit, sha256_hex};

/// Path that selects a private in-memory database.
pub const MEMORY_PATH: &str = ":memory:";

/// Transaction mode a new connection starts in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionMode {
    /// Every statement commits on its own.
    #[default]
    #[value(name = "autocommit", alias = "auto")]
    #[serde(alias = "auto")]
    AutoCommit,
    /// A transaction opens on first use and stays open until commit or rollback.
    Manual,
}

/// When result cells are decoded into host values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BufferPolicy {
    /// Decode a cell when a getter asks for it.
    #[default]
    Lazy,
    /// Decode every row of a chunk as soon as it is fetched.
    Eager,
}

/// Options resolved before a [`Database`] is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseOptions {
    pub path: String,
    pub read_only: bool,
    pub transaction_mode: TransactionMode,
    pub buffer_policy: BufferPolicy,
    pub session_init: Option<SessionInit>,
    /// Engine settings with no dedicated field, applied to every engine connection.
    pub extra: BTreeMap<String, String>,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self::new(MEMORY_PATH)
    }
}

impl DatabaseOptions {
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            read_only: false,
            transaction_mode: TransactionMode::default(),
            buffer_policy: BufferPolicy::default(),
            session_init: None,
            extra: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn is_in_memory(&self) -> bool {
        self.path.is_empty() || self.path == MEMORY_PATH
    }

    /// Build options from already-resolved key/value pairs, such as the query part of a
    /// connection string.
    ///
    /// Recognised keys are `path`, `read_only`, `auto_commit`, `buffer_policy`,
    /// `session_init_sql` and `session_init_sql_sha256`. Keys compare case-insensitively and
    /// must not repeat. Any other key is kept in [`DatabaseOptions::extra`].
    ///
    /// ```rust
    /// use sql_bridge::config::{BufferPolicy, DatabaseOptions, TransactionMode};
    ///
    /// let opts = DatabaseOptions::from_pairs([
    ///     ("path", "app.db"),
    ///     ("AUTO_COMMIT", "false"),
    ///     ("buffer_policy", "eager"),
    ///     ("cache_size", "-4000"),
    /// ])
    /// .unwrap();
    /// assert_eq!(opts.transaction_mode, TransactionMode::Manual);
    /// assert_eq!(opts.buffer_policy, BufferPolicy::Eager);
    /// assert_eq!(opts.extra.get("cache_size").map(String::as_str), Some("-4000"));
    /// ```
    ///
    /// # Errors
    /// Returns `BridgeError::Config` for duplicate keys, malformed values, or an init script
    /// whose checksum does not match.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, BridgeError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut seen: BTreeMap<String, String> = BTreeMap::new();
        for (key, value) in pairs {
            let key = key.as_ref().trim().to_ascii_lowercase();
            if seen.contains_key(&key) {
                return Err(BridgeError::Config(format!("duplicate option '{key}'")));
            }
            seen.insert(key, value.as_ref().to_string());
        }

        let mut opts =
            DatabaseOptions::new(seen.remove("path").unwrap_or_else(|| MEMORY_PATH.into()));
        if let Some(v) = seen.remove("read_only") {
            opts.read_only = parse_bool("read_only", &v)?;
        }
        if let Some(v) = seen.remove("auto_commit") {
            opts.transaction_mode = if parse_bool("auto_commit", &v)? {
                TransactionMode::AutoCommit
            } else {
                TransactionMode::Manual
            };
        }
        if let Some(v) = seen.remove("buffer_policy") {
            opts.buffer_policy = BufferPolicy::from_str(v.trim(), true).map_err(|_| {
                BridgeError::Config(format!("invalid buffer_policy '{v}', expected lazy or eager"))
            })?;
        }
        let checksum = seen.remove("session_init_sql_sha256");
        match (seen.remove("session_init_sql"), checksum) {
            (Some(script), Some(sum)) => {
                opts.session_init = Some(SessionInit::verified(&script, &sum)?);
            }
            (Some(script), None) => opts.session_init = Some(SessionInit::new(&script)?),
            (None, Some(_)) => {
                return Err(BridgeError::Config(
                    "session_init_sql_sha256 given without session_init_sql".into(),
                ));
            }
            (None, None) => {}
        }
        opts.extra = seen;
        Ok(opts)
    }
}

/// Fluent builder for [`DatabaseOptions`].
#[derive(Debug, Clone)]
pub struct DatabaseOptionsBuilder {
    opts: DatabaseOptions,
}

impl DatabaseOptionsBuilder {
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            opts: DatabaseOptions::new(path),
        }
    }

    #[must_use]
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.opts.read_only = read_only;
        self
    }

    #[must_use]
    pub fn transaction_mode(mut self, mode: TransactionMode) -> Self {
        self.opts.transaction_mode = mode;
        self
    }

    #[must_use]
    pub fn buffer_policy(mut self, policy: BufferPolicy) -> Self {
        self.opts.buffer_policy = policy;
        self
    }

    #[must_use]
    pub fn session_init(mut self, init: SessionInit) -> Self {
        self.opts.session_init = Some(init);
        self
    }

    /// Engine setting without a dedicated field.
    #[must_use]
    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.opts.extra.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn finish(self) -> DatabaseOptions {
        self.opts
    }

    /// Open a [`Database`] with these options.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError` if the engine cannot open the database or the init script fails.
    pub async fn build(self) -> Result<Database, BridgeError> {
        Database::open(self.finish()).await
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, BridgeError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "on" | "1" => Ok(true),
        "false" | "f" | "no" | "n" | "off" | "0" => Ok(false),
        _ => Err(BridgeError::Config(format!(
            "invalid boolean '{value}' for option '{key}'"
        ))),
    }
}
