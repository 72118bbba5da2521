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

//! Error types for warcstream.

use std::io;
use thiserror::Error;

/// Result type for warcstream operations.
pub type Result<T> = std::result::Result<T, WarcError>;

/// Errors raised while sniffing, reading, validating or writing records.
///
/// Every variant except [`WarcError::Config`] carries the byte offset at which
/// the problem was detected. For uncompressed streams this is the exact byte
/// position, for gzip-per-record streams it is the compressed offset of the
/// member holding the record.
#[derive(Debug, Error)]
pub enum WarcError {
    /// I/O error from the underlying source or sink
    #[error("I/O error at offset {offset}: {source}")]
    Io {
        /// Stream offset
        offset: u64,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Neither a WARC nor an ARC signature was found
    #[error("Unknown archive format at offset {offset}: {reason}")]
    UnknownFormat {
        /// Stream offset
        offset: u64,
        /// What was found instead
        reason: String,
    },

    /// Version line or header line could not be parsed
    #[error("Malformed header at offset {offset}: {reason}")]
    MalformedHeader {
        /// Stream offset
        offset: u64,
        /// Description of the problem
        reason: String,
    },

    /// Declared content length disagrees with the actual content
    #[error("Content length mismatch at offset {offset}: declared {declared}, actual {actual}")]
    ContentLengthMismatch {
        /// Stream offset
        offset: u64,
        /// Declared length
        declared: u64,
        /// Actual number of bytes
        actual: u64,
    },

    /// Input ended in the middle of a record, or the content block ended
    /// somewhere other than its declared length
    #[error("Truncated record at offset {offset}: {reason}")]
    TruncatedRecord {
        /// Stream offset
        offset: u64,
        /// What was being read when the input ended
        reason: String,
    },

    /// Invalid or corrupt gzip member
    #[error("Invalid gzip member at offset {offset}: {reason}")]
    GzipMember {
        /// Compressed offset of the member
        offset: u64,
        /// Description of the problem
        reason: String,
    },

    /// Block digest header does not match the content
    #[error("Digest mismatch at offset {offset}: {algorithm} expected {expected}, computed {}", .actual.as_deref().unwrap_or("nothing (unsupported algorithm)"))]
    DigestMismatch {
        /// Record offset
        offset: u64,
        /// Digest algorithm label
        algorithm: String,
        /// Digest value from the header
        expected: String,
        /// Computed digest, absent if the algorithm is not supported
        actual: Option<String>,
    },

    /// Mandatory header missing for the record type
    #[error("Missing mandatory header {name} in record at offset {offset}")]
    MissingHeader {
        /// Record offset
        offset: u64,
        /// Header name
        name: String,
    },

    /// Date could not be parsed
    #[error("Invalid date {value:?} at offset {offset}")]
    DateFormat {
        /// Record offset
        offset: u64,
        /// Offending value
        value: String,
    },

    /// Record cannot be serialized
    #[error("Invalid record for writing at sink offset {offset}: {reason}")]
    InvalidRecord {
        /// Sink offset at which the record would have been written
        offset: u64,
        /// Description of the problem
        reason: String,
    },

    /// Content handle used after its stream moved on
    #[error("Stale content handle for record at offset {offset}")]
    StaleContentHandle {
        /// Offset of the record the handle belonged to
        offset: u64,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl WarcError {
    /// Wrap an I/O error with the offset where it happened.
    pub(crate) fn io(offset: u64, source: io::Error) -> Self {
        WarcError::Io { offset, source }
    }

    /// Byte offset at which the error was detected.
    pub fn offset(&self) -> Option<u64> {
        match self {
            WarcError::Io { offset, .. }
            | WarcError::UnknownFormat { offset, .. }
            | WarcError::MalformedHeader { offset, .. }
            | WarcError::ContentLengthMismatch { offset, .. }
            | WarcError::TruncatedRecord { offset, .. }
            | WarcError::GzipMember { offset, .. }
            | WarcError::DigestMismatch { offset, .. }
            | WarcError::MissingHeader { offset, .. }
            | WarcError::DateFormat { offset, .. }
            | WarcError::InvalidRecord { offset, .. }
            | WarcError::StaleContentHandle { offset } => Some(*offset),
            WarcError::Config(_) => None,
        }
    }

    /// Whether the error leaves the record stream in a state that lenient
    /// recovery can resume from.
    pub(crate) fn is_recoverable(&self) -> bool {
        matches!(
            self,
            WarcError::MalformedHeader { .. }
                | WarcError::TruncatedRecord { .. }
                | WarcError::GzipMember { .. }
                | WarcError::ContentLengthMismatch { .. }
        )
    }
}

impl From<WarcError> for io::Error {
    fn from(err: WarcError) -> Self {
        match err {
            WarcError::Io { source, .. } => source,
            WarcError::TruncatedRecord { .. } => io::Error::new(io::ErrorKind::UnexpectedEof, err),
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
