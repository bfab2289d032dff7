use crate::error::SweepError;
use crate::ports::Result;
use chrono::NaiveDate;
use std::fmt;
use std::time::Duration;

pub const PASSWORD_ENV: &str = "DB_PASSWORD";
pub const DEFAULT_CUTOFF: &str = "2025-10-01";
pub const DEFAULT_PAGE_SIZE: u64 = 100;

/// Location of the AutoREST collection: `{base}/{schema}/{table}/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiEndpoint {
    pub base_url: String,
    pub schema: String,
    pub table: String,
}

impl ApiEndpoint {
    pub fn new(base_url: &str, schema: &str, table: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            schema: schema.to_string(),
            table: table.to_string(),
        }
    }

    /// Builds the resource URL, always ending in `/` so ids can be appended.
    pub fn resource_url(&self) -> Result<String> {
        let base = self.base_url.trim().trim_end_matches('/');
        let schema = self.schema.trim().trim_matches('/');
        let table = self.table.trim().trim_matches('/');

        if !(base.starts_with("https://") || base.starts_with("http://")) {
            return Err(SweepError::Config(format!(
                "base URL must start with http:// or https://, got '{}'",
                self.base_url
            )));
        }
        if schema.is_empty() || table.is_empty() {
            return Err(SweepError::Config(
                "schema and table paths must not be empty".to_string(),
            ));
        }

        Ok(format!("{}/{}/{}/", base, schema, table))
    }
}

/// Basic-auth pair. The password never appears in `Debug` output.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn from_env(username: &str) -> Result<Self> {
        Self::from_lookup(username, |key| std::env::var(key).ok())
    }

    /// Reads the password through `lookup`; unset and empty are both rejected.
    pub fn from_lookup<F>(username: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        match lookup(PASSWORD_ENV) {
            Some(password) if !password.is_empty() => Ok(Self {
                username: username.to_string(),
                password,
            }),
            _ => Err(SweepError::MissingCredential(PASSWORD_ENV)),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Exclusive upper bound on `event_at`, compared as a plain string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cutoff(String);

impl Cutoff {
    /// Accepts only `YYYY-MM-DD`, the form that sorts correctly against ISO 8601 timestamps.
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        if value.len() != 10 || NaiveDate::parse_from_str(value, "%Y-%m-%d").is_err() {
            return Err(SweepError::InvalidCutoff(value.to_string()));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn precedes(&self, event_at: &str) -> bool {
        event_at < self.0.as_str()
    }
}

impl Default for Cutoff {
    fn default() -> Self {
        Self(DEFAULT_CUTOFF.to_string())
    }
}

impl fmt::Display for Cutoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sleep `pause` after every `every` writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub every: usize,
    pub pause: Duration,
}

impl Pacing {
    pub fn for_purge() -> Self {
        Self {
            every: 10,
            pause: Duration::from_millis(200),
        }
    }

    pub fn for_annotate() -> Self {
        Self {
            every: 10,
            pause: Duration::from_millis(500),
        }
    }

    pub fn is_checkpoint(&self, done: usize) -> bool {
        self.every > 0 && done % self.every == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPolicy {
    /// A rejected page fails the run.
    Strict,
    /// A rejected page ends the scan; what was collected so far is used.
    AllowPartial,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepConfig {
    pub cutoff: Cutoff,
    pub page_size: u64,
    pub page_pause: Duration,
    pub pacing: Pacing,
    pub scan_policy: ScanPolicy,
}

impl SweepConfig {
    pub fn for_purge(cutoff: Cutoff) -> Self {
        Self {
            cutoff,
            page_size: DEFAULT_PAGE_SIZE,
            page_pause: Duration::ZERO,
            pacing: Pacing::for_purge(),
            scan_policy: ScanPolicy::Strict,
        }
    }

    pub fn for_annotate(cutoff: Cutoff) -> Self {
        Self {
            cutoff,
            page_size: DEFAULT_PAGE_SIZE,
            page_pause: Duration::from_millis(100),
            pacing: Pacing::for_annotate(),
            scan_policy: ScanPolicy::Strict,
        }
    }

    pub fn with_scan_policy(mut self, scan_policy: ScanPolicy) -> Self {
        self.scan_policy = scan_policy;
        self
    }
}
