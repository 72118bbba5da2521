// Copyright 2025 Janek Bevendorff
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Reader and writer configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Result, WarcError};
use crate::record::Compression;

/// What a stream does after a malformed or truncated record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryMode {
    /// Yield the error and stop
    #[default]
    Strict,
    /// Skip to the next record and keep going
    Lenient,
}

/// How record content is handed out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentMode {
    /// Read content and trailer before yielding the record
    #[default]
    Materialize,
    /// Yield a read-once handle over the content block
    Stream,
}

/// Record stream configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Recovery policy
    pub recovery: RecoveryMode,
    /// Content mode
    pub content: ContentMode,
    /// Maximum length of a version or header line in bytes
    pub max_line_length: usize,
    /// Maximum number of header lines per record
    pub max_header_count: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            recovery: RecoveryMode::Strict,
            content: ContentMode::Materialize,
            max_line_length: 64 * 1024,
            max_header_count: 1024,
        }
    }
}

impl ReaderConfig {
    pub fn lenient(mut self) -> Self {
        self.recovery = RecoveryMode::Lenient;
        self
    }

    pub fn streaming(mut self) -> Self {
        self.content = ContentMode::Stream;
        self
    }
}

/// Record writer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Sink framing
    pub compression: Compression,
    /// Gzip compression level (0-9)
    pub gzip_level: u32,
    /// Version line written for records without one
    pub version: String,
    /// Add a `WARC-Block-Digest` header to records without one
    pub block_digest: bool,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            compression: Compression::None,
            gzip_level: 6,
            version: "WARC/1.0".to_string(),
            block_digest: false,
        }
    }
}

/// Combined configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub reader: ReaderConfig,
    #[serde(default)]
    pub writer: WriterConfig,
}

impl Config {
    /// Load configuration from TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read, parsed or validated
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| WarcError::Config(format!("Failed to read config file: {e}")))?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    ///
    /// # Errors
    ///
    /// Returns error if the string cannot be parsed or validated
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| WarcError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn validate(&self) -> Result<()> {
        self.reader.validate()?;
        self.writer.validate()
    }
}

impl ReaderConfig {
    pub fn validate(&self) -> Result<()> {
        // Must hold at least "WARC/1.0\r\n"
        if self.max_line_length < 10 {
            return Err(WarcError::Config(format!(
                "max_line_length too small: {}", self.max_line_length
            )));
        }
        if self.max_header_count == 0 {
            return Err(WarcError::Config("max_header_count must be > 0".to_string()));
        }
        Ok(())
    }
}

impl WriterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.gzip_level > 9 {
            return Err(WarcError::Config(format!("gzip_level must be 0-9, got {}", self.gzip_level)));
        }
        if !self.version.starts_with("WARC/") || self.version.contains(['\r', '\n']) {
            return Err(WarcError::Config(format!("Invalid WARC version line: {:?}", self.version)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_parse() {
        let config_toml = r#"
            [reader]
            recovery = "lenient"
            content = "stream"

            [writer]
            compression = "gzip_per_record"
            block_digest = true
        "#;

        let config = Config::from_toml(config_toml).unwrap();
        assert_eq!(config.reader.recovery, RecoveryMode::Lenient);
        assert_eq!(config.reader.content, ContentMode::Stream);
        assert_eq!(config.reader.max_line_length, 64 * 1024);
        assert_eq!(config.writer.compression, Compression::GzipPerRecord);
        assert_eq!(config.writer.gzip_level, 6);
        assert!(config.writer.block_digest);
    }

    #[test]
    fn test_config_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"[reader]\nmax_header_count = 16\n").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.reader.max_header_count, 16);
        assert_eq!(config.reader.recovery, RecoveryMode::Strict);
        assert_eq!(config.writer, WriterConfig::default());
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(Config::from_toml("[writer]\ngzip_level = 12\n"), Err(WarcError::Config(_))));
        assert!(matches!(Config::from_toml("[writer]\nversion = \"ARC/1\"\n"), Err(WarcError::Config(_))));
        assert!(matches!(Config::from_toml("[reader]\nmax_header_count = 0\n"), Err(WarcError::Config(_))));
        assert!(matches!(Config::from_toml("[reader]\nrecovery = \"maybe\"\n"), Err(WarcError::Config(_))));
        assert!(Config::from_file(std::path::Path::new("/nonexistent/warcstream.toml")).is_err());
    }
}
