//! Session configuration passed to backends and engine components

use serde::Deserialize;
use std::time::Duration;

/// Options recognized by every repository session
///
/// ```
/// use deltalog_core::SessionOptions;
/// use std::time::Duration;
///
/// let options = SessionOptions::from_toml_str(
///     r#"
///     read_only = true
///     write_timeout = "250ms"
///     "#,
/// )
/// .unwrap();
///
/// assert!(options.read_only);
/// assert_eq!(options.write_timeout, Some(Duration::from_millis(250)));
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionOptions {
    /// Reject every write before it reaches the backend
    pub read_only: bool,
    /// Reads may be served by a lagging replica
    pub secondary_preferred: bool,
    #[serde(with = "humantime_serde")]
    pub write_timeout: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub read_timeout: Option<Duration>,
    /// Dispatcher receiving this session's log entries instead of the global one
    #[serde(skip)]
    pub logger: Option<tracing::Dispatch>,
}

impl SessionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse options from a TOML document
    ///
    /// # Errors
    ///
    /// Returns the TOML error for malformed input or unknown keys.
    pub fn from_toml_str(input: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(input)
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn secondary_preferred(mut self, secondary_preferred: bool) -> Self {
        self.secondary_preferred = secondary_preferred;
        self
    }

    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn logger(mut self, dispatch: tracing::Dispatch) -> Self {
        self.logger = Some(dispatch);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_read_write_without_timeouts() {
        let options = SessionOptions::default();
        assert!(!options.read_only);
        assert!(!options.secondary_preferred);
        assert!(options.write_timeout.is_none());
        assert!(options.read_timeout.is_none());
        assert!(options.logger.is_none());
    }

    #[test]
    fn test_parses_human_readable_durations() {
        let options = SessionOptions::from_toml_str(
            r#"
            secondary_preferred = true
            read_timeout = "2s"
            "#,
        )
        .unwrap();

        assert!(options.secondary_preferred);
        assert_eq!(options.read_timeout, Some(Duration::from_secs(2)));
        assert!(options.write_timeout.is_none());
    }

    #[test]
    fn test_rejects_unknown_keys() {
        assert!(SessionOptions::from_toml_str("retries = 3").is_err());
    }

    #[test]
    fn test_empty_document_yields_defaults() {
        let options = SessionOptions::from_toml_str("").unwrap();
        assert!(!options.read_only);
    }
}
