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

//! Structural record checks.

use crate::arc;
use crate::digest::{verify_digest, DigestVerdict};
use crate::error::WarcError;
use crate::record::{ArchiveFormat, Record, RecordType};

const WARC_MANDATORY: [&str; 4] = ["WARC-Record-ID", "WARC-Date", "WARC-Type", "Content-Length"];
const ARC_MANDATORY: [&str; 5] = [
    arc::URL, arc::IP_ADDRESS, arc::ARCHIVE_DATE, arc::CONTENT_TYPE, arc::ARCHIVE_LENGTH,
];

/// Mandatory headers of a record type beyond the common WARC set.
fn type_mandatory(record_type: RecordType) -> &'static [&'static str] {
    match record_type {
        RecordType::WarcInfo | RecordType::Metadata => &[],
        RecordType::Request | RecordType::Response | RecordType::Resource | RecordType::Conversion => {
            &["WARC-Target-URI"]
        }
        RecordType::Revisit => &["WARC-Target-URI", "WARC-Profile"],
        RecordType::Continuation => &["WARC-Target-URI", "WARC-Segment-Origin-ID", "WARC-Segment-Number"],
    }
}

/// Record validator.
///
/// Validation only reports problems. It never changes the record.
#[derive(Debug, Clone, Copy)]
pub struct Validator {
    check_digest: bool,
}

impl Default for Validator {
    fn default() -> Self {
        Validator { check_digest: true }
    }
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable `WARC-Block-Digest` verification.
    pub fn check_digest(mut self, check: bool) -> Self {
        self.check_digest = check;
        self
    }

    /// Collect every problem found in a record.
    ///
    /// Content checks are skipped for records whose content is still an
    /// unread stream handle.
    pub fn validate(&self, record: &Record) -> Vec<WarcError> {
        let offset = record.source_offset().unwrap_or(0);
        let mut errors = Vec::new();

        if let Some(content) = record.content_bytes() {
            let actual = content.len() as u64;
            match record.content_length() {
                Some(declared) if declared != actual => {
                    errors.push(WarcError::ContentLengthMismatch { offset, declared, actual });
                }
                _ => {}
            }
        }

        let mandatory: Vec<&str> = match record.format() {
            ArchiveFormat::Warc => {
                let mut names = WARC_MANDATORY.to_vec();
                if let Some(t) = record.record_type() {
                    names.extend_from_slice(type_mandatory(t));
                }
                names
            }
            ArchiveFormat::Arc => ARC_MANDATORY.to_vec(),
        };
        for name in mandatory {
            let present = record.headers().get_first(name).is_some_and(|v| !v.trim().is_empty());
            if !present {
                errors.push(WarcError::MissingHeader { offset, name: name.to_string() });
            }
        }

        if self.check_digest {
            if let (Some(value), Some(content)) = (record.headers().get_first("WARC-Block-Digest"), record.content_bytes()) {
                match verify_digest(&value, content) {
                    DigestVerdict::Match => {}
                    DigestVerdict::Mismatch { algorithm, expected, actual } => {
                        errors.push(WarcError::DigestMismatch { offset, algorithm, expected, actual: Some(actual) });
                    }
                    DigestVerdict::Unsupported { algorithm, expected } => {
                        errors.push(WarcError::DigestMismatch { offset, algorithm, expected, actual: None });
                    }
                }
            }
        }

        errors
    }

    /// Whether a record passes validation.
    pub fn check(&self, record: &Record) -> bool {
        self.validate(record).is_empty()
    }
}
