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

//! Record offset index.

use std::io::Read;

use crate::error::Result;
use crate::record::Record;
use crate::stream::RecordStream;

/// Header line of a text index.
pub const INDEX_HEADER: &str = "#WARC filename offset warc-type warc-subject-uri warc-record-id content-type content-length";

/// Where a record lives in its container, plus the fields needed to pick it
/// without parsing it again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub offset: u64,
    pub record_type: Option<String>,
    pub target_uri: Option<String>,
    pub record_id: Option<String>,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
}

impl IndexEntry {
    /// Index entry of a record read from a stream. Freshly built records have
    /// no offset and yield `None`.
    pub fn from_record(record: &Record) -> Option<Self> {
        Some(IndexEntry {
            offset: record.source_offset()?,
            record_type: record.record_type().map(|t| t.as_str().to_string()),
            target_uri: record.target_uri(),
            record_id: record.record_id(),
            content_type: record.content_type(),
            content_length: record.content_length(),
        })
    }

    /// Space-separated index line, `-` for missing fields.
    pub fn to_line(&self, filename: &str) -> String {
        let field = |v: &Option<String>| match v {
            Some(v) if !v.is_empty() => v.replace(' ', "%20"),
            _ => "-".to_string(),
        };
        format!(
            "{} {} {} {} {} {} {}",
            filename,
            self.offset,
            field(&self.record_type),
            field(&self.target_uri),
            field(&self.record_id),
            field(&self.content_type),
            self.content_length.map_or_else(|| "-".to_string(), |l| l.to_string()),
        )
    }
}

/// Read a whole stream and collect an index entry for every record.
///
/// Streamed content is skipped without being read. In lenient mode damaged
/// records are left out of the index.
pub fn build_index<R: Read + Send + 'static>(stream: &mut RecordStream<R>) -> Result<Vec<IndexEntry>> {
    let mut entries = Vec::new();
    for record in stream.by_ref() {
        if let Some(entry) = IndexEntry::from_record(&record?) {
            entries.push(entry);
        }
    }
    Ok(entries)
}
