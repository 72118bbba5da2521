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

//! ARC to WARC record conversion.

use sha1::{Digest, Sha1};
use uuid::Uuid;

use crate::arc;
use crate::error::{Result, WarcError};
use crate::record::{ArchiveFormat, Record, RecordType};
use crate::timestamp::arc_to_warc_date;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
const HTTP_RESPONSE_TYPE: &str = "application/http;msgtype=response";

/// Converts ARC records into equivalent WARC records.
///
/// The converter is stateful: the `filedesc://` record at the start of an
/// ARC file becomes a `warcinfo` record and every record converted after it
/// refers back to it with `WARC-Warcinfo-ID`.
#[derive(Debug, Default)]
pub struct ArcToWarcConverter {
    warcinfo_id: Option<String>,
}

impl ArcToWarcConverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record ID of the last converted `filedesc://` record.
    pub fn warcinfo_id(&self) -> Option<&str> {
        self.warcinfo_id.as_deref()
    }

    /// Convert a record. WARC records are returned unchanged.
    ///
    /// The content is moved into the new record without being read, so
    /// streamed content stays streamed.
    pub fn convert(&mut self, mut record: Record) -> Result<Record> {
        if record.format() == ArchiveFormat::Warc {
            return Ok(record);
        }

        let offset = record.source_offset().unwrap_or(0);
        let headers = record.headers();
        let field = |name: &str| headers.get_first(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty() && v != "-");

        let url = field(arc::URL).ok_or_else(|| WarcError::MissingHeader { offset, name: arc::URL.to_string() })?;
        let arc_date = field(arc::ARCHIVE_DATE).unwrap_or_default();
        let date = arc_to_warc_date(&arc_date).ok_or_else(|| WarcError::DateFormat { offset, value: arc_date.clone() })?;
        let ip_address = field(arc::IP_ADDRESS).filter(|ip| ip != "0.0.0.0");
        let content_type = field(arc::CONTENT_TYPE);
        let result_code = field(arc::RESULT_CODE);
        let checksum = field(arc::CHECKSUM);
        let length = field(arc::ARCHIVE_LENGTH);

        let record_id = derived_record_id(&url, &arc_date);
        let content = record.take_content();
        let filedesc = arc::is_filedesc(&url);

        let mut warc = Record::warc(if filedesc { RecordType::WarcInfo } else { RecordType::Response });
        warc.set_record_id(&record_id);
        warc.set_date(&date);

        if filedesc {
            warc.headers_mut().set("WARC-Filename", &url[arc::FILEDESC_SCHEME.len()..]);
            warc.set_content_type(content_type.as_deref().unwrap_or("text/plain"));
            self.warcinfo_id = Some(record_id);
        } else {
            warc.set_target_uri(&url);
            if let Some(ip) = &ip_address {
                warc.headers_mut().set("WARC-IP-Address", ip);
            }
            let is_http = content.as_bytes().is_some_and(|c| c.starts_with(b"HTTP/"));
            let content_type = match content_type {
                _ if is_http => HTTP_RESPONSE_TYPE.to_string(),
                Some(t) => t,
                None => DEFAULT_CONTENT_TYPE.to_string(),
            };
            warc.set_content_type(content_type);
            if let Some(code) = &result_code {
                warc.headers_mut().set("ARC-Result-Code", code);
            }
            if let Some(checksum) = &checksum {
                warc.headers_mut().set("ARC-Checksum", checksum);
            }
            if let Some(id) = &self.warcinfo_id {
                warc.headers_mut().set("WARC-Warcinfo-ID", id);
            }
        }

        match (length, content.as_bytes()) {
            (_, Some(bytes)) => warc.headers_mut().set("Content-Length", bytes.len().to_string()),
            (Some(length), None) => warc.headers_mut().set("Content-Length", length),
            (None, None) => {}
        }
        warc.replace_content(content);
        warc.set_source_offset(record.source_offset());
        Ok(warc)
    }
}

/// Deterministic record ID from the SHA-1 of URL and ARC date.
fn derived_record_id(url: &str, date: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(url.as_bytes());
    hasher.update(date.as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    format!("<urn:uuid:{}>", Uuid::from_bytes(bytes))
}
