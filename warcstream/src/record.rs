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

use std::fmt;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::content::Content;
use crate::error::{Result, WarcError};
use crate::header::{HeaderEncoding, HeaderMap};
use crate::timestamp;


/// Container format of an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFormat {
    Warc,
    Arc,
}

impl ArchiveFormat {
    /// Header name under which this format stores a typed record field.
    ///
    /// ARC has no record type or record ID field.
    pub fn header_name(&self, field: Field) -> Option<&'static str> {
        match (self, field) {
            (ArchiveFormat::Warc, Field::RecordType) => Some("WARC-Type"),
            (ArchiveFormat::Warc, Field::RecordId) => Some("WARC-Record-ID"),
            (ArchiveFormat::Warc, Field::Date) => Some("WARC-Date"),
            (ArchiveFormat::Warc, Field::TargetUri) => Some("WARC-Target-URI"),
            (ArchiveFormat::Warc, Field::IpAddress) => Some("WARC-IP-Address"),
            (ArchiveFormat::Warc, Field::ContentType) => Some("Content-Type"),
            (ArchiveFormat::Warc, Field::ContentLength) => Some("Content-Length"),
            (ArchiveFormat::Arc, Field::RecordType) | (ArchiveFormat::Arc, Field::RecordId) => None,
            (ArchiveFormat::Arc, Field::Date) => Some(crate::arc::ARCHIVE_DATE),
            (ArchiveFormat::Arc, Field::TargetUri) => Some(crate::arc::URL),
            (ArchiveFormat::Arc, Field::IpAddress) => Some(crate::arc::IP_ADDRESS),
            (ArchiveFormat::Arc, Field::ContentType) => Some(crate::arc::CONTENT_TYPE),
            (ArchiveFormat::Arc, Field::ContentLength) => Some(crate::arc::ARCHIVE_LENGTH),
        }
    }

    /// Bytes expected after a record's content block.
    pub fn trailer(&self) -> &'static [u8] {
        match self {
            ArchiveFormat::Warc => b"\r\n\r\n",
            ArchiveFormat::Arc => b"\n",
        }
    }

    pub fn header_encoding(&self) -> HeaderEncoding {
        match self {
            ArchiveFormat::Warc => HeaderEncoding::Unicode,
            ArchiveFormat::Arc => HeaderEncoding::Latin1,
        }
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveFormat::Warc => f.write_str("WARC"),
            ArchiveFormat::Arc => f.write_str("ARC"),
        }
    }
}

/// Physical framing of an archive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    /// Records stored back to back
    #[default]
    None,
    /// One independent gzip member per record
    GzipPerRecord,
}

/// Typed record fields shared by WARC and ARC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    RecordType,
    RecordId,
    Date,
    TargetUri,
    IpAddress,
    ContentType,
    ContentLength,
}

/// WARC record type enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    WarcInfo,
    Request,
    Response,
    Revisit,
    Metadata,
    Conversion,
    Resource,
    Continuation,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::WarcInfo => "warcinfo",
            RecordType::Request => "request",
            RecordType::Response => "response",
            RecordType::Revisit => "revisit",
            RecordType::Metadata => "metadata",
            RecordType::Conversion => "conversion",
            RecordType::Resource => "resource",
            RecordType::Continuation => "continuation",
        }
    }
}

impl TryFrom<&str> for RecordType {
    type Error = &'static str;

    fn try_from(value: &str) -> std::result::Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "warcinfo" => Ok(RecordType::WarcInfo),
            "request" => Ok(RecordType::Request),
            "response" => Ok(RecordType::Response),
            "revisit" => Ok(RecordType::Revisit),
            "metadata" => Ok(RecordType::Metadata),
            "conversion" => Ok(RecordType::Conversion),
            "resource" => Ok(RecordType::Resource),
            "continuation" => Ok(RecordType::Continuation),
            _ => Err("Invalid record type."),
        }
    }
}

impl From<RecordType> for &'static str {
    fn from(value: RecordType) -> Self {
        value.as_str()
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Non-fatal irregularity noticed while parsing a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anomaly {
    /// Header lines terminated by LF instead of CRLF
    BareLineFeed,
    /// WARC version other than 0.17, 0.18, 1.0 or 1.1
    UnknownVersion(String),
    /// `WARC-Type` value outside the known record types
    UnknownRecordType(String),
    /// Bytes found where the record trailer was expected
    BadTrailer(Vec<u8>),
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anomaly::BareLineFeed => f.write_str("header lines end in bare LF"),
            Anomaly::UnknownVersion(v) => write!(f, "unknown version {v:?}"),
            Anomaly::UnknownRecordType(t) => write!(f, "unknown record type {t:?}"),
            Anomaly::BadTrailer(bytes) => write!(f, "bad trailer {:?}", String::from_utf8_lossy(bytes)),
        }
    }
}

/// A single WARC or ARC record.
///
/// Header values are the single source of truth for typed fields. Setters
/// write through to the header map, so a record can be serialized as is.
#[derive(Debug)]
pub struct Record {
    format: ArchiveFormat,
    record_type: Option<RecordType>,
    headers: HeaderMap,
    content: Content,
    source_offset: Option<u64>,
    anomalies: Vec<Anomaly>,
}

impl Record {
    /// Create an empty record of the given format.
    pub fn new(format: ArchiveFormat) -> Self {
        Record {
            format,
            record_type: None,
            headers: HeaderMap::new(format.header_encoding()),
            content: Content::default(),
            source_offset: None,
            anomalies: Vec::new(),
        }
    }

    /// Create an empty WARC/1.0 record of the given type.
    pub fn warc(record_type: RecordType) -> Self {
        let mut record = Record::new(ArchiveFormat::Warc);
        record.headers.set_status_line("WARC/1.0");
        record.set_record_type(record_type);
        record
    }

    /// Create an empty ARC record.
    pub fn arc() -> Self {
        Record::new(ArchiveFormat::Arc)
    }

    pub(crate) fn from_parts(
        format: ArchiveFormat,
        record_type: Option<RecordType>,
        headers: HeaderMap,
        content: Content,
        source_offset: u64,
        anomalies: Vec<Anomaly>,
    ) -> Self {
        Record { format, record_type, headers, content, source_offset: Some(source_offset), anomalies }
    }

    /// Initialize mandatory headers in a fresh WARC record.
    ///
    /// Clears all existing headers and sets version line, `WARC-Type`,
    /// `WARC-Record-ID`, `WARC-Date` and `Content-Length` for the current
    /// content.
    ///
    /// # Arguments
    ///
    /// * `record_type` - WARC record type
    /// * `record_urn` - Record URN without angle brackets, a random one will
    ///   be generated if not given
    pub fn init_headers(&mut self, record_type: RecordType, record_urn: Option<&str>) {
        let urn = match record_urn {
            Some(urn) => urn.to_string(),
            None => new_record_urn(),
        };

        self.format = ArchiveFormat::Warc;
        self.headers = HeaderMap::new(HeaderEncoding::Unicode);
        self.headers.set_status_line("WARC/1.0");
        self.set_record_type(record_type);
        self.headers.append("WARC-Record-ID", format!("<{urn}>"));
        self.headers.append("WARC-Date", timestamp::warc_date_now());
        if let Some(bytes) = self.content.as_bytes() {
            let len = bytes.len();
            self.headers.append("Content-Length", len.to_string());
        }
    }

    pub fn format(&self) -> ArchiveFormat {
        self.format
    }

    /// WARC version from the status line, `None` for ARC records.
    pub fn version(&self) -> Option<String> {
        match self.format {
            ArchiveFormat::Warc => Some(self.headers.status_line()),
            ArchiveFormat::Arc => None,
        }
    }

    pub fn record_type(&self) -> Option<RecordType> {
        self.record_type
    }

    pub fn set_record_type(&mut self, record_type: RecordType) {
        self.record_type = Some(record_type);
        if self.format == ArchiveFormat::Warc {
            self.headers.set("WARC-Type", record_type.as_str());
        }
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable header access.
    ///
    /// Changing `WARC-Type` here does not update [`Record::record_type`],
    /// use [`Record::set_record_type`] for that.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Value of a typed field, if the format has a header for it.
    pub fn field(&self, field: Field) -> Option<String> {
        self.format.header_name(field).and_then(|name| self.headers.get_first(name))
    }

    /// Set a typed field. Fields the format cannot represent are ignored.
    pub fn set_field(&mut self, field: Field, value: impl AsRef<str>) {
        if let Some(name) = self.format.header_name(field) {
            self.headers.set(name, value);
        }
    }

    /// Record ID including angle brackets.
    pub fn record_id(&self) -> Option<String> {
        self.field(Field::RecordId)
    }

    pub fn set_record_id(&mut self, record_id: impl AsRef<str>) {
        self.set_field(Field::RecordId, record_id);
    }

    /// Record date as stored in the header (`WARC-Date` or ARC `Archive-date`).
    pub fn date(&self) -> Option<String> {
        self.field(Field::Date)
    }

    pub fn set_date(&mut self, date: impl AsRef<str>) {
        self.set_field(Field::Date, date);
    }

    /// Target URI without the angle brackets WARC/0.18 producers put around it.
    pub fn target_uri(&self) -> Option<String> {
        self.field(Field::TargetUri).map(|uri| {
            uri.strip_prefix('<')
                .and_then(|u| u.strip_suffix('>'))
                .map(str::to_string)
                .unwrap_or(uri)
        })
    }

    pub fn set_target_uri(&mut self, uri: impl AsRef<str>) {
        self.set_field(Field::TargetUri, uri);
    }

    pub fn ip_address(&self) -> Option<String> {
        self.field(Field::IpAddress)
    }

    pub fn content_type(&self) -> Option<String> {
        self.field(Field::ContentType)
    }

    pub fn set_content_type(&mut self, content_type: impl AsRef<str>) {
        self.set_field(Field::ContentType, content_type);
    }

    /// Declared content length, `None` if missing or not a number.
    pub fn content_length(&self) -> Option<u64> {
        self.field(Field::ContentLength).and_then(|v| v.trim().parse().ok())
    }

    pub fn content(&self) -> &Content {
        &self.content
    }

    pub fn content_mut(&mut self) -> &mut Content {
        &mut self.content
    }

    /// Take the content out of the record, leaving empty bytes behind.
    pub fn take_content(&mut self) -> Content {
        std::mem::take(&mut self.content)
    }

    /// Set content bytes and update the content length header.
    pub fn set_content(&mut self, content: Vec<u8>) {
        let len = content.len();
        self.content = Content::Bytes(content);
        self.set_field(Field::ContentLength, len.to_string());
    }

    /// Replace the content without touching the declared length.
    pub fn replace_content(&mut self, content: Content) {
        self.content = content;
    }

    /// Materialized content bytes, `None` for unread streamed content.
    pub fn content_bytes(&self) -> Option<&[u8]> {
        self.content.as_bytes()
    }

    /// Read streamed content into memory and return it.
    ///
    /// Fails with [`WarcError::StaleContentHandle`] if the stream has already
    /// moved past this record, and with [`WarcError::InvalidRecord`] if part
    /// of the content was already read through the handle.
    pub fn materialize(&mut self) -> Result<&[u8]> {
        if let Content::Stream(handle) = &mut self.content {
            if handle.consumed() > 0 {
                return Err(WarcError::InvalidRecord {
                    offset: handle.record_offset(),
                    reason: format!("{} content bytes were read before materializing", handle.consumed()),
                });
            }
            let bytes = handle.read_to_vec()?;
            self.content = Content::Bytes(bytes);
        }
        match &self.content {
            Content::Bytes(bytes) => Ok(bytes),
            Content::Stream(_) => Err(WarcError::InvalidRecord {
                offset: self.source_offset.unwrap_or(0),
                reason: "content could not be materialized".to_string(),
            }),
        }
    }

    /// Byte offset at which the record started in its source container.
    pub fn source_offset(&self) -> Option<u64> {
        self.source_offset
    }

    pub(crate) fn set_source_offset(&mut self, offset: Option<u64>) {
        self.source_offset = offset;
    }

    /// Irregularities noticed while parsing the record.
    pub fn anomalies(&self) -> &[Anomaly] {
        &self.anomalies
    }
}

/// New random record URN (`urn:uuid:<v4>`).
pub fn new_record_urn() -> String {
    format!("urn:uuid:{}", Uuid::new_v4())
}
