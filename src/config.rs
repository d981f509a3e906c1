//! GI engine configuration

use crate::{constants::*, error::GiResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings shared by every GI session launched with them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GiConfig {
    /// Directory relative program paths are resolved against
    pub script_dir: PathBuf,
    /// Network gateway connect bound
    pub connect_timeout_ms: u64,
    /// Port used when a `gi://` URL names none
    pub default_port: u16,
    /// Longest accepted command line in bytes
    pub max_line_length: usize,
    /// Log protocol traffic at info level
    pub debug: bool,
}

impl Default for GiConfig {
    fn default() -> Self {
        Self {
            script_dir: PathBuf::from(DEFAULT_SCRIPT_DIR),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            default_port: DEFAULT_GI_PORT,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            debug: false,
        }
    }
}

impl GiConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.script_dir = dir.into();
        self
    }

    pub fn with_connect_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.connect_timeout_ms = timeout_ms;
        self
    }

    pub fn with_default_port(mut self, port: u16) -> Self {
        self.default_port = port;
        self
    }

    pub fn with_max_line_length(mut self, limit: usize) -> Self {
        self.max_line_length = limit;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json_str(json: &str) -> GiResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> GiResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Resolve a program name against [`Self::script_dir`] unless absolute
    pub fn resolve_program(&self, program: &str) -> PathBuf {
        let path = Path::new(program);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.script_dir
                .join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GiConfig::default();
        assert_eq!(config.default_port, 4573);
        assert_eq!(config.connect_timeout(), Duration::from_millis(2000));
        assert_eq!(config.max_line_length, 8192);
        assert!(!config.debug);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = GiConfig::from_json_str(r#"{"script_dir": "/opt/gi", "debug": true}"#).unwrap();
        assert_eq!(config.script_dir, PathBuf::from("/opt/gi"));
        assert!(config.debug);
        assert_eq!(config.default_port, DEFAULT_GI_PORT);
    }

    #[test]
    fn test_bad_json_is_config_error() {
        let err = GiConfig::from_json_str("{\"default_port\": \"x\"}").unwrap_err();
        assert!(matches!(err, crate::error::GiError::Config(_)));
    }

    #[test]
    fn test_resolve_program() {
        let config = GiConfig::new().with_script_dir("/opt/gi");
        assert_eq!(
            config.resolve_program("ivr.sh"),
            PathBuf::from("/opt/gi/ivr.sh")
        );
        assert_eq!(
            config.resolve_program("/usr/local/bin/ivr"),
            PathBuf::from("/usr/local/bin/ivr")
        );
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir
            .path()
            .join("gi.json");
        std::fs::write(&path, r#"{"connect_timeout_ms": 500}"#).unwrap();
        let config = GiConfig::from_file(&path).unwrap();
        assert_eq!(config.connect_timeout_ms, 500);
    }
}
