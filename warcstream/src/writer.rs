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

use std::io::Write;
use flate2::write::GzEncoder;
use tracing::debug;

use crate::arc;
use crate::config::WriterConfig;
use crate::digest::{block_digest, DigestAlgorithm};
use crate::error::{Result, WarcError};
use crate::header::HeaderMap;
use crate::record::{new_record_urn, ArchiveFormat, Compression, Field, Record, RecordType};
use crate::sniff::WARC_MAGIC;

/// Headers written first, in this order.
const LEADING_HEADERS: [&str; 5] = ["WARC-Type", "WARC-Record-ID", "WARC-Date", "Content-Length", "Content-Type"];

/// Serializes records into a byte sink.
///
/// Every record is fully serialized (and compressed) in memory before the
/// first byte reaches the sink, so a failed write never leaves a partial
/// record behind.
pub struct RecordWriter<W: Write> {
    sink: Option<W>,
    config: WriterConfig,
    position: u64,
    records_written: u64,
}

impl<W: Write> RecordWriter<W> {
    /// Create an uncompressed writer.
    pub fn new(sink: W) -> Self {
        Self::with_config(sink, WriterConfig::default())
    }

    pub fn with_compression(sink: W, compression: Compression) -> Self {
        Self::with_config(sink, WriterConfig { compression, ..WriterConfig::default() })
    }

    pub fn with_config(sink: W, config: WriterConfig) -> Self {
        RecordWriter { sink: Some(sink), config, position: 0, records_written: 0 }
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    /// Number of bytes written to the sink so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    /// Write a record and return the sink offset at which it starts.
    ///
    /// Headers of the record itself are left untouched. Generated record
    /// IDs, content lengths and digests only go into the written bytes.
    pub fn write(&mut self, record: &Record) -> Result<u64> {
        let start = self.position;
        let bytes = self.serialize(record)?;
        let bytes = match self.config.compression {
            Compression::None => bytes,
            Compression::GzipPerRecord => {
                let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::new(self.config.gzip_level));
                encoder.write_all(&bytes).map_err(|e| WarcError::io(start, e))?;
                encoder.finish().map_err(|e| WarcError::io(start, e))?
            }
        };

        let sink = self.sink.as_mut().ok_or_else(|| WarcError::InvalidRecord {
            offset: start,
            reason: "writer is finished".to_string(),
        })?;
        sink.write_all(&bytes).map_err(|e| WarcError::io(start, e))?;
        self.position += bytes.len() as u64;
        self.records_written += 1;
        debug!("Wrote {} bytes for record at offset {}", bytes.len(), start);
        Ok(start)
    }

    /// Serialize a record into its uncompressed bytes.
    pub fn serialize(&self, record: &Record) -> Result<Vec<u8>> {
        let offset = self.position;
        let content = record.content_bytes().ok_or_else(|| WarcError::InvalidRecord {
            offset,
            reason: "content must be materialized before writing".to_string(),
        })?;
        match record.format() {
            ArchiveFormat::Warc => self.serialize_warc(record, content, offset),
            ArchiveFormat::Arc => serialize_arc(record, content, offset),
        }
    }

    fn serialize_warc(&self, record: &Record, content: &[u8], offset: u64) -> Result<Vec<u8>> {
        let invalid = |reason: &str| WarcError::InvalidRecord { offset, reason: reason.to_string() };
        let headers = record.headers();

        let record_type = headers.get_first("WARC-Type").ok_or_else(|| invalid("missing WARC-Type"))?;
        if headers.get_first("WARC-Date").is_none() {
            return Err(invalid("missing WARC-Date"));
        }
        let is_warcinfo = RecordType::try_from(record_type.as_str()) == Ok(RecordType::WarcInfo);
        if !is_warcinfo && record.target_uri().is_none_or(|uri| uri.trim().is_empty()) {
            return Err(invalid("missing WARC-Target-URI"));
        }
        check_length(record, content, offset)?;

        let mut out_headers = HeaderMap::new(headers.encoding());
        for name in LEADING_HEADERS {
            for (key, value) in headers.raw_items() {
                if key.eq_ignore_ascii_case(name.as_bytes()) {
                    out_headers.append_bytes(key, value);
                }
            }
            match name {
                "WARC-Record-ID" if !headers.contains_key(name) => {
                    out_headers.append(name, format!("<{}>", new_record_urn()));
                }
                "Content-Length" if !headers.contains_key(name) => {
                    out_headers.append(name, content.len().to_string());
                }
                _ => {}
            }
        }
        for (key, value) in headers.raw_items() {
            let name = String::from_utf8_lossy(key);
            if !LEADING_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(&name)) {
                out_headers.append_bytes(key, value);
            }
        }
        if self.config.block_digest && !headers.contains_key("WARC-Block-Digest") {
            out_headers.append("WARC-Block-Digest", block_digest(DigestAlgorithm::Sha1, content));
        }

        let status_line = headers.status_line_bytes();
        if status_line.starts_with(WARC_MAGIC) {
            out_headers.set_status_line(status_line);
        } else {
            out_headers.set_status_line(self.config.version.as_bytes());
        }

        let mut out = Vec::with_capacity(content.len() + 512);
        out_headers.write(&mut out).map_err(|e| WarcError::io(offset, e))?;
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(content);
        out.extend_from_slice(ArchiveFormat::Warc.trailer());
        Ok(out)
    }

    /// Flush the sink.
    pub fn flush(&mut self) -> Result<()> {
        if let Some(sink) = self.sink.as_mut() {
            sink.flush().map_err(|e| WarcError::io(self.position, e))?;
        }
        Ok(())
    }

    /// Flush and return the sink.
    pub fn finish(mut self) -> Result<W> {
        self.flush()?;
        self.sink.take().ok_or_else(|| WarcError::InvalidRecord {
            offset: self.position,
            reason: "writer is finished".to_string(),
        })
    }
}

impl<W: Write> Drop for RecordWriter<W> {
    fn drop(&mut self) {
        if let Some(sink) = self.sink.as_mut() {
            let _ = sink.flush();
        }
    }
}

/// Reject a declared length that disagrees with the content.
fn check_length(record: &Record, content: &[u8], offset: u64) -> Result<()> {
    let Some(value) = record.field(Field::ContentLength) else {
        return Ok(());
    };
    let declared: u64 = value.trim().parse().map_err(|_| WarcError::InvalidRecord {
        offset,
        reason: format!("invalid content length {value:?}"),
    })?;
    if declared != content.len() as u64 {
        return Err(WarcError::ContentLengthMismatch { offset, declared, actual: content.len() as u64 });
    }
    Ok(())
}

fn serialize_arc(record: &Record, content: &[u8], offset: u64) -> Result<Vec<u8>> {
    if record.target_uri().is_none_or(|uri| uri.trim().is_empty()) {
        return Err(WarcError::InvalidRecord { offset, reason: format!("missing {}", arc::URL) });
    }
    check_length(record, content, offset)?;

    let mut headers = record.headers().clone();
    if !headers.contains_key(arc::ARCHIVE_LENGTH) {
        headers.set(arc::ARCHIVE_LENGTH, content.len().to_string());
    }
    let mut out = arc::format_header_line(&headers);
    out.push(b'\n');
    out.extend_from_slice(content);
    out.extend_from_slice(ArchiveFormat::Arc.trailer());
    Ok(out)
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use crate::header::write_header_line;
    use crate::stream::RecordStream;

    fn header_line(key: &str, value: &str) -> Vec<u8> {
        let mut out = Vec::new();
        write_header_line(&mut out, key.as_bytes(), value.as_bytes()).unwrap();
        out
    }

    fn response(content: &[u8]) -> Record {
        let mut record = Record::warc(RecordType::Response);
        record.set_content(content.to_vec());
        record.init_headers(RecordType::Response, Some("urn:uuid:00000000-0000-0000-0000-000000000001"));
        record.set_date("2024-01-02T03:04:05Z");
        record.set_target_uri("http://example.com/");
        record
    }

    #[test]
    fn test_canonical_header_order() {
        let mut record = response(b"hello");
        record.headers_mut().set("X-Custom", "1");
        record.set_content_type("text/plain");

        let bytes = RecordWriter::new(Vec::new()).serialize(&record).unwrap();
        let mut expected = b"WARC/1.0\r\n".to_vec();
        expected.extend(header_line("WARC-Type", "response"));
        expected.extend(header_line("WARC-Record-ID", "<urn:uuid:00000000-0000-0000-0000-000000000001>"));
        expected.extend(header_line("WARC-Date", "2024-01-02T03:04:05Z"));
        expected.extend(header_line("Content-Length", "5"));
        expected.extend(header_line("Content-Type", "text/plain"));
        expected.extend(header_line("WARC-Target-URI", "http://example.com/"));
        expected.extend(header_line("X-Custom", "1"));
        expected.extend_from_slice(b"\r\nhello\r\n\r\n");
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_generated_fields() {
        let mut record = response(b"abc");
        record.headers_mut().remove("WARC-Record-ID");
        record.headers_mut().remove("Content-Length");
        let writer = RecordWriter::with_config(Vec::new(), WriterConfig { block_digest: true, ..WriterConfig::default() });
        let text = String::from_utf8(writer.serialize(&record).unwrap()).unwrap();
        assert!(text.contains("WARC-Record-ID: <urn:uuid:"));
        assert!(text.contains("Content-Length: 3\r\n"));
        assert!(text.contains(&format!("WARC-Block-Digest: {}\r\n", block_digest(DigestAlgorithm::Sha1, b"abc"))));
        assert!(record.record_id().is_none());
    }

    #[test]
    fn test_invalid_records() {
        let writer = RecordWriter::new(Vec::new());

        let mut record = response(b"abc");
        record.headers_mut().set("Content-Length", "4");
        assert!(matches!(writer.serialize(&record),
            Err(WarcError::ContentLengthMismatch { declared: 4, actual: 3, .. })));

        let mut record = response(b"abc");
        record.headers_mut().remove("WARC-Target-URI");
        assert!(matches!(writer.serialize(&record), Err(WarcError::InvalidRecord { .. })));

        let mut record = response(b"abc");
        record.headers_mut().remove("WARC-Date");
        assert!(matches!(writer.serialize(&record), Err(WarcError::InvalidRecord { .. })));

        let mut info = Record::warc(RecordType::WarcInfo);
        info.set_content(b"software: test\r\n".to_vec());
        info.init_headers(RecordType::WarcInfo, None);
        assert!(writer.serialize(&info).is_ok());
    }

    #[test]
    fn test_failed_write_leaves_sink_untouched() {
        let mut writer = RecordWriter::new(Vec::new());
        let mut bad = response(b"abc");
        bad.headers_mut().set("Content-Length", "10");
        assert!(writer.write(&bad).is_err());
        assert_eq!(writer.position(), 0);
        assert!(writer.finish().unwrap().is_empty());
    }

    #[test]
    fn test_gzip_members_and_offsets() {
        let mut writer = RecordStream::create(Vec::new(), Compression::GzipPerRecord);
        let first = writer.write(&response(b"one")).unwrap();
        let second = writer.write(&response(b"two")).unwrap();
        assert_eq!(first, 0);
        assert!(second > 0);
        assert_eq!(writer.records_written(), 2);
        let data = writer.finish().unwrap();

        let mut stream = RecordStream::open(Cursor::new(data)).unwrap();
        assert_eq!(stream.compression(), Compression::GzipPerRecord);
        let offsets: Vec<u64> = stream.by_ref().map(|r| r.unwrap().source_offset().unwrap()).collect();
        assert_eq!(offsets, vec![first, second]);
    }

    #[test]
    fn test_arc_record() {
        let mut record = Record::arc();
        record.set_target_uri("http://example.com/");
        record.headers_mut().set(arc::IP_ADDRESS, "192.0.2.1");
        record.headers_mut().set(arc::ARCHIVE_DATE, "20090101000000");
        record.headers_mut().set(arc::CONTENT_TYPE, "text/html");
        record.set_content(b"hello".to_vec());

        let bytes = RecordWriter::new(Vec::new()).serialize(&record).unwrap();
        assert_eq!(bytes, b"http://example.com/ 192.0.2.1 20090101000000 text/html 5\nhello\n");
    }
}
