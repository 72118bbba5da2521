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

//! Single-record parser.
//!
//! The reader does not own its input. Every call receives the byte source to
//! read from, which lets the stream swap between a plain cursor and gzip
//! members without rebuilding the parser.

use std::io::{self, BufRead};
use tracing::{debug, warn};

use crate::arc;
use crate::error::{Result, WarcError};
use crate::header::HeaderMap;
use crate::record::{Anomaly, ArchiveFormat, Field, RecordType};
use crate::sniff::{self, WARC_MAGIC};

const KNOWN_VERSIONS: [&str; 4] = ["1.0", "1.1", "0.17", "0.18"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReaderState {
    AtStart,
    ReadingHeaders,
    ReadingContent { remaining: u64 },
    AtTrailer,
    Done,
    Error,
}

/// Parsed header block of a record.
#[derive(Debug)]
pub(crate) struct RecordHead {
    pub offset: u64,
    pub format: ArchiveFormat,
    pub headers: HeaderMap,
    pub record_type: Option<RecordType>,
    pub content_length: u64,
    pub anomalies: Vec<Anomaly>,
}

pub(crate) enum LineRead {
    Eof,
    Line,
    TooLong,
}

/// Read one line including its terminator, giving up once it exceeds `max` bytes.
pub(crate) fn read_line_limited(src: &mut dyn BufRead, line: &mut Vec<u8>, max: usize) -> io::Result<LineRead> {
    line.clear();
    loop {
        let buf = match src.fill_buf() {
            Ok(buf) => buf,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        if buf.is_empty() {
            return Ok(if line.is_empty() { LineRead::Eof } else { LineRead::Line });
        }
        let (n, done) = match buf.iter().position(|&b| b == b'\n') {
            Some(i) => (i + 1, true),
            None => (buf.len(), false),
        };
        line.extend_from_slice(&buf[..n]);
        src.consume(n);
        if line.len() > max {
            return Ok(LineRead::TooLong);
        }
        if done {
            return Ok(LineRead::Line);
        }
    }
}

fn strip_eol(line: &[u8]) -> (&[u8], bool) {
    match line {
        [rest @ .., b'\r', b'\n'] => (rest, false),
        [rest @ .., b'\n'] => (rest, true),
        _ => (line, false),
    }
}

fn is_blank(line: &[u8]) -> bool {
    line.iter().all(|&b| b == b'\r' || b == b'\n')
}

/// Record parser state machine.
///
/// `AtStart -> ReadingHeaders -> ReadingContent -> AtTrailer -> Done`, with
/// `Error` reachable from every state.
#[derive(Debug)]
pub(crate) struct RecordReader {
    format: ArchiveFormat,
    current: ArchiveFormat,
    state: ReaderState,
    max_line_length: usize,
    max_header_count: usize,
    origin: u64,
    exact: bool,
    consumed: u64,
    record_offset: u64,
}

impl RecordReader {
    pub fn new(format: ArchiveFormat, max_line_length: usize, max_header_count: usize) -> Self {
        RecordReader {
            format,
            current: format,
            state: ReaderState::Done,
            max_line_length,
            max_header_count,
            origin: 0,
            exact: true,
            consumed: 0,
            record_offset: 0,
        }
    }

    /// Prepare for a new record whose input starts at `origin`.
    ///
    /// With `exact`, offsets are byte positions `origin + consumed`. Without
    /// it (gzip members) every offset is `origin`.
    pub fn begin(&mut self, origin: u64, exact: bool) {
        self.origin = origin;
        self.exact = exact;
        self.consumed = 0;
        self.record_offset = origin;
        self.current = self.format;
        self.state = ReaderState::AtStart;
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    /// Bytes consumed since [`RecordReader::begin`].
    #[cfg(test)]
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Offset of the current record's first byte.
    pub fn record_offset(&self) -> u64 {
        self.record_offset
    }

    /// Offset of the next unread byte.
    pub fn offset(&self) -> u64 {
        if self.exact { self.origin + self.consumed } else { self.origin }
    }

    fn fail(&mut self, err: WarcError) -> WarcError {
        self.state = ReaderState::Error;
        err
    }

    fn malformed(&mut self, reason: impl Into<String>) -> WarcError {
        let offset = self.offset();
        self.fail(WarcError::MalformedHeader { offset, reason: reason.into() })
    }

    fn truncated(&mut self, reason: impl Into<String>) -> WarcError {
        let offset = self.offset();
        self.fail(WarcError::TruncatedRecord { offset, reason: reason.into() })
    }

    fn read_line(&mut self, src: &mut dyn BufRead, line: &mut Vec<u8>, capture: &mut Vec<u8>) -> Result<LineRead> {
        let offset = self.offset();
        let result = read_line_limited(src, line, self.max_line_length);
        self.consumed += line.len() as u64;
        capture.extend_from_slice(line);
        result.map_err(|e| self.fail(WarcError::io(offset, e)))
    }

    /// Parse the version line and header block of the next record.
    ///
    /// Blank lines in front of the record are skipped and do not count
    /// towards its offset. Returns `None` at a clean end of input. All bytes
    /// of the record head are appended to `capture`.
    ///
    /// The format is picked per record: a `WARC/` line starts a WARC record
    /// and an ARC header line starts an ARC record, so archives mixing both
    /// can be read with either stream format.
    pub fn read_head(&mut self, src: &mut dyn BufRead, capture: &mut Vec<u8>) -> Result<Option<RecordHead>> {
        if self.state != ReaderState::AtStart {
            return Err(self.malformed("reader is not at a record boundary"));
        }

        let mut line = Vec::new();
        loop {
            let start = self.offset();
            match self.read_line(src, &mut line, capture)? {
                LineRead::Eof => {
                    self.state = ReaderState::Done;
                    return Ok(None);
                }
                LineRead::TooLong => {
                    self.record_offset = start;
                    return Err(self.malformed("first line exceeds maximum line length"));
                }
                LineRead::Line if is_blank(&line) => {
                    capture.clear();
                }
                LineRead::Line => {
                    self.record_offset = start;
                    break;
                }
            }
        }

        let mut anomalies = Vec::new();
        let (first, bare_lf) = strip_eol(&line);
        self.current = if first.starts_with(WARC_MAGIC) {
            ArchiveFormat::Warc
        } else if self.format == ArchiveFormat::Arc || sniff::is_arc_header_line(first) {
            ArchiveFormat::Arc
        } else {
            let preview = String::from_utf8_lossy(&first[..first.len().min(64)]).to_string();
            return Err(self.malformed(format!("expected WARC version line, found {preview:?}")));
        };
        if self.current != self.format {
            debug!("{:?} record at offset {} in {:?} stream", self.current, self.record_offset, self.format);
        }
        if bare_lf && self.current == ArchiveFormat::Warc {
            anomalies.push(Anomaly::BareLineFeed);
        }

        let head = match self.current {
            ArchiveFormat::Warc => {
                let first = first.to_vec();
                self.state = ReaderState::ReadingHeaders;
                self.read_warc_headers(src, first, anomalies, capture)?
            }
            ArchiveFormat::Arc => {
                let headers = match arc::parse_header_line(first) {
                    Some(headers) => headers,
                    None => return Err(self.malformed("invalid ARC header line")),
                };
                let content_length = self.parse_length(&headers)?;
                RecordHead {
                    offset: self.record_offset,
                    format: ArchiveFormat::Arc,
                    headers,
                    record_type: None,
                    content_length,
                    anomalies,
                }
            }
        };

        self.state = ReaderState::ReadingContent { remaining: head.content_length };
        Ok(Some(head))
    }

    fn read_warc_headers(
        &mut self,
        src: &mut dyn BufRead,
        version_line: Vec<u8>,
        mut anomalies: Vec<Anomaly>,
        capture: &mut Vec<u8>,
    ) -> Result<RecordHead> {
        let mut headers = HeaderMap::new(ArchiveFormat::Warc.header_encoding());
        let version = String::from_utf8_lossy(&version_line[WARC_MAGIC.len()..]).trim().to_string();
        if !KNOWN_VERSIONS.contains(&version.as_str()) {
            warn!("Unknown WARC version {:?} in record at offset {}", version, self.record_offset);
            anomalies.push(Anomaly::UnknownVersion(version));
        }
        headers.set_status_line(version_line.trim_ascii());

        let mut line = Vec::new();
        loop {
            match self.read_line(src, &mut line, capture)? {
                LineRead::Eof => return Err(self.truncated("input ended inside header block")),
                LineRead::TooLong => return Err(self.malformed("header line exceeds maximum line length")),
                LineRead::Line => {}
            }
            let (content, bare_lf) = strip_eol(&line);
            if bare_lf && !anomalies.contains(&Anomaly::BareLineFeed) {
                anomalies.push(Anomaly::BareLineFeed);
            }
            if content.is_empty() {
                break;
            }
            if content[0] == b' ' || content[0] == b'\t' {
                if !headers.add_continuation(content) {
                    return Err(self.malformed("continuation line without preceding header"));
                }
                continue;
            }
            let colon = match content.iter().position(|&b| b == b':') {
                Some(i) if i > 0 => i,
                _ => {
                    let preview = String::from_utf8_lossy(&content[..content.len().min(64)]).to_string();
                    return Err(self.malformed(format!("header line without name: {preview:?}")));
                }
            };
            if headers.len() >= self.max_header_count {
                return Err(self.malformed("too many header lines"));
            }
            headers.append_bytes(&content[..colon], &content[colon + 1..]);
        }

        let record_type = match headers.get_first("WARC-Type") {
            Some(t) => match RecordType::try_from(t.as_str()) {
                Ok(t) => Some(t),
                Err(_) => {
                    warn!("Unknown record type {:?} in record at offset {}", t, self.record_offset);
                    anomalies.push(Anomaly::UnknownRecordType(t));
                    None
                }
            },
            None => None,
        };
        let content_length = self.parse_length(&headers)?;
        Ok(RecordHead {
            offset: self.record_offset,
            format: ArchiveFormat::Warc,
            headers,
            record_type,
            content_length,
            anomalies,
        })
    }

    fn parse_length(&mut self, headers: &HeaderMap) -> Result<u64> {
        let name = self.current.header_name(Field::ContentLength).unwrap_or("Content-Length");
        match headers.get_first(name) {
            None => Err(self.malformed(format!("missing {name}"))),
            Some(v) => match v.trim().parse::<u64>() {
                Ok(len) => Ok(len),
                Err(_) => Err(self.malformed(format!("invalid {name} {v:?}"))),
            },
        }
    }

    /// Read the next chunk of content. Returns `0` once the content block is
    /// complete.
    pub fn read_content_chunk(&mut self, src: &mut dyn BufRead, buf: &mut [u8]) -> Result<usize> {
        let remaining = match self.state {
            ReaderState::ReadingContent { remaining } => remaining,
            ReaderState::AtTrailer | ReaderState::Done => return Ok(0),
            _ => return Err(self.malformed("reader is not inside a content block")),
        };
        if remaining == 0 {
            self.state = ReaderState::AtTrailer;
            return Ok(0);
        }

        let want = buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
        let n = loop {
            match src.read(&mut buf[..want]) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    let offset = self.offset();
                    return Err(self.fail(WarcError::io(offset, e)));
                }
            }
        };
        if n == 0 && want > 0 {
            return Err(self.truncated(format!("input ended with {remaining} content bytes missing")));
        }
        self.consumed += n as u64;
        let remaining = remaining - n as u64;
        self.state = if remaining == 0 { ReaderState::AtTrailer } else { ReaderState::ReadingContent { remaining } };
        Ok(n)
    }

    /// Read the rest of the content block into `out`.
    pub fn read_content(&mut self, src: &mut dyn BufRead, out: &mut Vec<u8>) -> Result<()> {
        let mut buf = [0u8; 16384];
        loop {
            let n = self.read_content_chunk(src, &mut buf)?;
            if n == 0 {
                return Ok(());
            }
            out.extend_from_slice(&buf[..n]);
        }
    }

    /// Consume the record trailer.
    ///
    /// Only line break bytes are consumed, at most as many as the trailer
    /// has. A trailer that differs from the format's trailer is returned as
    /// an anomaly. A WARC content block followed directly by other data
    /// means the declared length is wrong and fails with
    /// [`WarcError::TruncatedRecord`] at the record offset.
    pub fn read_trailer(&mut self, src: &mut dyn BufRead) -> Result<Option<Anomaly>> {
        if self.state != ReaderState::AtTrailer {
            return Err(self.malformed("reader is not at a record trailer"));
        }
        let expected = self.current.trailer();
        let mut found = Vec::with_capacity(expected.len());
        let mut next = None;
        while found.len() < expected.len() {
            let offset = self.offset();
            let buf = match src.fill_buf() {
                Ok(buf) => buf,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(self.fail(WarcError::io(offset, e))),
            };
            match buf.first() {
                Some(&b) if b == b'\r' || b == b'\n' => {
                    found.push(b);
                    src.consume(1);
                    self.consumed += 1;
                }
                other => {
                    next = other.copied();
                    break;
                }
            }
        }

        if found.is_empty() && next.is_some() && self.current == ArchiveFormat::Warc {
            let offset = self.record_offset;
            return Err(self.fail(WarcError::TruncatedRecord {
                offset,
                reason: "content block does not end where its declared length says".to_string(),
            }));
        }
        self.state = ReaderState::Done;

        if found == expected {
            Ok(None)
        } else {
            warn!("Record at offset {} has trailer {:?}, expected {:?}",
                self.record_offset, String::from_utf8_lossy(&found), String::from_utf8_lossy(expected));
            Ok(Some(Anomaly::BadTrailer(found)))
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn reader(format: ArchiveFormat) -> RecordReader {
        let mut r = RecordReader::new(format, 1024, 64);
        r.begin(0, true);
        r
    }

    #[test]
    fn test_warc_record() {
        let data = b"\r\nWARC/1.0\r\nWARC-Type: response\r\nX-Folded: a\r\n  b\r\nContent-Length: 5\r\n\r\nhello\r\n\r\n";
        let mut src = Cursor::new(data.to_vec());
        let mut r = reader(ArchiveFormat::Warc);
        let mut capture = Vec::new();

        let head = r.read_head(&mut src, &mut capture).unwrap().unwrap();
        assert_eq!(head.offset, 2);
        assert_eq!(head.record_type, Some(RecordType::Response));
        assert_eq!(head.content_length, 5);
        assert_eq!(head.headers.get("x-folded").as_deref(), Some("a b"));
        assert_eq!(head.headers.status_line(), "WARC/1.0");
        assert!(head.anomalies.is_empty());
        assert!(capture.starts_with(b"WARC/1.0\r\n"));

        let mut content = Vec::new();
        r.read_content(&mut src, &mut content).unwrap();
        assert_eq!(content, b"hello");
        assert_eq!(r.read_trailer(&mut src).unwrap(), None);
        assert_eq!(r.state(), ReaderState::Done);
        assert_eq!(r.consumed(), data.len() as u64);

        r.begin(data.len() as u64, true);
        assert!(r.read_head(&mut src, &mut capture).unwrap().is_none());
    }

    #[test]
    fn test_anomalies() {
        let data = b"WARC/1.2\nWARC-Type: bogus\nContent-Length: 0\n\n\n";
        let mut src = Cursor::new(data.to_vec());
        let mut r = reader(ArchiveFormat::Warc);
        let head = r.read_head(&mut src, &mut Vec::new()).unwrap().unwrap();
        assert_eq!(head.record_type, None);
        assert_eq!(head.anomalies, vec![
            Anomaly::BareLineFeed,
            Anomaly::UnknownVersion("1.2".to_string()),
            Anomaly::UnknownRecordType("bogus".to_string()),
        ]);
        r.read_content(&mut src, &mut Vec::new()).unwrap();
        assert_eq!(r.read_trailer(&mut src).unwrap(), Some(Anomaly::BadTrailer(b"\n".to_vec())));
    }

    #[test]
    fn test_malformed_headers() {
        let cases: [&[u8]; 4] = [
            b"HTTP/1.1 200 OK\r\n\r\n",
            b"WARC/1.0\r\nno colon here\r\n\r\n",
            b"WARC/1.0\r\nWARC-Type: response\r\n\r\n",
            b"WARC/1.0\r\nContent-Length: ten\r\n\r\n",
        ];
        for data in cases {
            let mut r = reader(ArchiveFormat::Warc);
            let err = r.read_head(&mut Cursor::new(data.to_vec()), &mut Vec::new()).unwrap_err();
            assert!(matches!(err, WarcError::MalformedHeader { .. }), "{err}");
            assert_eq!(r.state(), ReaderState::Error);
        }
    }

    #[test]
    fn test_line_limit() {
        let mut r = RecordReader::new(ArchiveFormat::Warc, 16, 64);
        r.begin(0, true);
        let data = b"WARC/1.0\r\nX-Long: aaaaaaaaaaaaaaaaaaaaaaaa\r\n\r\n";
        assert!(matches!(r.read_head(&mut Cursor::new(data.to_vec()), &mut Vec::new()),
            Err(WarcError::MalformedHeader { .. })));
    }

    #[test]
    fn test_truncation() {
        let mut r = reader(ArchiveFormat::Warc);
        let err = r.read_head(&mut Cursor::new(b"WARC/1.0\r\nContent-Length: 5\r\n".to_vec()), &mut Vec::new());
        assert!(matches!(err, Err(WarcError::TruncatedRecord { .. })));

        let mut r = reader(ArchiveFormat::Warc);
        let mut src = Cursor::new(b"WARC/1.0\r\nContent-Length: 10\r\n\r\nabc".to_vec());
        r.read_head(&mut src, &mut Vec::new()).unwrap().unwrap();
        let mut content = Vec::new();
        let err = r.read_content(&mut src, &mut content).unwrap_err();
        assert!(matches!(err, WarcError::TruncatedRecord { offset: 35, .. }), "{err}");
        assert_eq!(content, b"abc");
    }

    #[test]
    fn test_missing_trailer() {
        let mut r = reader(ArchiveFormat::Warc);
        let mut src = Cursor::new(b"\r\nWARC/1.0\r\nContent-Length: 2\r\n\r\nabc\r\n\r\n".to_vec());
        r.read_head(&mut src, &mut Vec::new()).unwrap().unwrap();
        r.read_content(&mut src, &mut Vec::new()).unwrap();
        let err = r.read_trailer(&mut src).unwrap_err();
        assert!(matches!(err, WarcError::TruncatedRecord { offset: 2, .. }), "{err}");
        assert_eq!(r.state(), ReaderState::Error);

        let mut r = reader(ArchiveFormat::Warc);
        let mut src = Cursor::new(b"WARC/1.0\r\nContent-Length: 2\r\n\r\nab".to_vec());
        r.read_head(&mut src, &mut Vec::new()).unwrap().unwrap();
        r.read_content(&mut src, &mut Vec::new()).unwrap();
        assert_eq!(r.read_trailer(&mut src).unwrap(), Some(Anomaly::BadTrailer(Vec::new())));

        let mut r = reader(ArchiveFormat::Warc);
        let mut src = Cursor::new(b"WARC/1.0\r\nContent-Length: 2\r\n\r\nab\r\nx".to_vec());
        r.read_head(&mut src, &mut Vec::new()).unwrap().unwrap();
        r.read_content(&mut src, &mut Vec::new()).unwrap();
        assert_eq!(r.read_trailer(&mut src).unwrap(), Some(Anomaly::BadTrailer(b"\r\n".to_vec())));
    }

    #[test]
    fn test_gzip_offsets_are_member_offsets() {
        let mut r = RecordReader::new(ArchiveFormat::Warc, 1024, 64);
        r.begin(500, false);
        let err = r.read_head(&mut Cursor::new(b"WARC/1.0\r\nbroken\r\n".to_vec()), &mut Vec::new()).unwrap_err();
        assert_eq!(err.offset(), Some(500));
    }

    #[test]
    fn test_arc_record() {
        let data = b"http://example.com/ 192.0.2.1 20090101000000 text/html 5\nhello\n";
        let mut src = Cursor::new(data.to_vec());
        let mut r = reader(ArchiveFormat::Arc);
        let head = r.read_head(&mut src, &mut Vec::new()).unwrap().unwrap();
        assert_eq!(head.content_length, 5);
        assert_eq!(head.headers.get("URL").as_deref(), Some("http://example.com/"));
        assert!(head.anomalies.is_empty());
        let mut content = Vec::new();
        r.read_content(&mut src, &mut content).unwrap();
        assert_eq!(content, b"hello");
        assert_eq!(r.read_trailer(&mut src).unwrap(), None);
    }
}
