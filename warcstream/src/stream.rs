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

use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::sync::Arc;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::{ContentMode, ReaderConfig, RecoveryMode};
use crate::content::{stale, Content, ContentHandle, ContentSource};
use crate::error::{Result, WarcError};
use crate::framer::GzipMemberFramer;
use crate::reader::{read_line_limited, LineRead, ReaderState, RecordHead, RecordReader};
use crate::record::{ArchiveFormat, Compression, Record};
use crate::sniff::{self, WARC_MAGIC};
use crate::source::TrackedReader;
use crate::writer::RecordWriter;

const BUFFER_SIZE: usize = 64 * 1024;
const SNIFF_WINDOW: usize = 16 * 1024;
/// Streamed content bytes kept for rewinding after a failed record.
const RECOVERY_WINDOW: usize = 1 << 20;

/// Byte range skipped by lenient recovery, with the error that caused it.
#[derive(Debug)]
pub struct SkippedRange {
    /// Offset of the first skipped byte
    pub start: u64,
    /// Offset at which reading resumed
    pub end: u64,
    /// Error that triggered the skip
    pub error: WarcError,
}

enum Framing<R> {
    Plain(TrackedReader<BufReader<R>>),
    Gzip(GzipMemberFramer<BufReader<R>>),
}

impl<R: Read> Framing<R> {
    fn source(&mut self) -> Option<&mut dyn BufRead> {
        match self {
            Framing::Plain(r) => Some(r),
            Framing::Gzip(f) => f.current(),
        }
    }
}

enum Parsed {
    Materialized(Record),
    Streamed { head: RecordHead, generation: u64 },
}

/// Shared cursor state of a record stream.
///
/// Content handles of streamed records read through this state, so it lives
/// behind a mutex shared by the stream and its handles.
struct StreamCore<R> {
    framing: Framing<R>,
    reader: RecordReader,
    format: ArchiveFormat,
    content_mode: ContentMode,
    max_line_length: usize,
    generation: u64,
    open_content: bool,
    capture: Vec<u8>,
    capture_complete: bool,
}

impl<R: Read> StreamCore<R> {
    /// Attribute I/O errors inside gzip members to the member.
    fn wrap<T>(&self, result: Result<T>) -> Result<T> {
        match (result, &self.framing) {
            (Err(WarcError::Io { offset, source }), Framing::Gzip(f)) => Err(WarcError::GzipMember {
                offset: f.member_offset().unwrap_or(offset),
                reason: source.to_string(),
            }),
            (result, _) => result,
        }
    }

    fn content_chunk(&mut self, buf: &mut [u8]) -> Result<usize> {
        let StreamCore { framing, reader, .. } = self;
        let result = match framing.source() {
            Some(src) => reader.read_content_chunk(src, buf),
            None => Ok(0),
        };
        let n = self.wrap(result)?;
        if self.capture_complete && matches!(self.framing, Framing::Plain(_)) {
            if self.capture.len() + n <= RECOVERY_WINDOW {
                self.capture.extend_from_slice(&buf[..n]);
            } else {
                debug!("Record at offset {} exceeds the recovery window", self.reader.record_offset());
                self.capture_complete = false;
                self.capture.clear();
            }
        }
        Ok(n)
    }

    fn trailer(&mut self) -> Result<Option<crate::record::Anomaly>> {
        let StreamCore { framing, reader, .. } = self;
        let result = match framing.source() {
            Some(src) => reader.read_trailer(src),
            None => Ok(None),
        };
        self.wrap(result)
    }

    fn finish_member(&mut self) -> Result<()> {
        match &mut self.framing {
            Framing::Gzip(f) => f.finish_member(),
            Framing::Plain(_) => Ok(()),
        }
    }

    /// Skip whatever is left of a streamed record.
    fn finish_open_record(&mut self) -> Result<()> {
        if !self.open_content {
            return Ok(());
        }
        self.open_content = false;

        if self.reader.state() == ReaderState::Error {
            let offset = self.reader.record_offset();
            return Err(match self.framing {
                Framing::Gzip(_) => WarcError::GzipMember { offset, reason: "content block of record failed".to_string() },
                Framing::Plain(_) => WarcError::TruncatedRecord { offset, reason: "content block of record failed".to_string() },
            });
        }

        let mut buf = [0u8; 16384];
        while self.content_chunk(&mut buf)? > 0 {}
        self.trailer()?;
        self.finish_member()
    }

    /// Parse the next record.
    fn advance(&mut self) -> Result<Option<Parsed>> {
        self.generation += 1;
        self.finish_open_record()?;

        loop {
            let (origin, exact) = match &mut self.framing {
                Framing::Plain(r) => (r.position(), true),
                Framing::Gzip(f) => match f.next_member()? {
                    Some(start) => (start, false),
                    None => return Ok(None),
                },
            };
            self.reader.begin(origin, exact);
            self.capture.clear();
            self.capture_complete = true;

            let head = {
                let StreamCore { framing, reader, capture, .. } = self;
                match framing.source() {
                    Some(src) => reader.read_head(src, capture),
                    None => Ok(None),
                }
            };
            let mut head = match self.wrap(head)? {
                Some(head) => head,
                None if exact => return Ok(None),
                // Member without a record
                None => continue,
            };

            if self.content_mode == ContentMode::Stream {
                self.open_content = true;
                return Ok(Some(Parsed::Streamed { head, generation: self.generation }));
            }

            let mut content = Vec::with_capacity(head.content_length.min(1 << 20) as usize);
            let result = {
                let StreamCore { framing, reader, .. } = self;
                match framing.source() {
                    Some(src) => reader.read_content(src, &mut content),
                    None => Ok(()),
                }
            };
            if let Err(e) = self.wrap(result) {
                self.capture.extend_from_slice(&content);
                return Err(e);
            }
            match self.trailer() {
                Ok(Some(anomaly)) => head.anomalies.push(anomaly),
                Ok(None) => {}
                Err(e) => {
                    self.capture.extend_from_slice(&content);
                    return Err(e);
                }
            }
            self.finish_member()?;

            return Ok(Some(Parsed::Materialized(Record::from_parts(
                head.format,
                head.record_type,
                head.headers,
                Content::Bytes(content),
                head.offset,
                head.anomalies,
            ))));
        }
    }

    /// Skip past a failed record. Returns the skipped byte range.
    fn recover(&mut self, err: &WarcError) -> Result<(u64, u64)> {
        self.open_content = false;
        match &mut self.framing {
            Framing::Plain(tracked) => {
                let start = self.reader.record_offset();
                if self.capture_complete && !self.capture.is_empty() {
                    tracked.unread(&self.capture[1..]);
                }
                self.capture.clear();
                let end = scan_for_record(tracked, self.format, self.max_line_length)?;
                Ok((start, end))
            }
            Framing::Gzip(framer) => {
                let start = err.offset().unwrap_or_else(|| framer.position());
                let end = match framer.resync()? {
                    Some(pos) => pos,
                    None => framer.position(),
                };
                Ok((start, end))
            }
        }
    }
}

impl<R: Read + Seek> StreamCore<R> {
    fn seek(&mut self, offset: u64) -> Result<()> {
        self.generation += 1;
        self.open_content = false;
        self.capture.clear();
        match &mut self.framing {
            Framing::Plain(r) => r.seek_to(offset).map_err(|e| WarcError::io(offset, e)),
            Framing::Gzip(f) => f.open_at(offset).map(|_| ()),
        }
    }
}

impl<R: Read + Send> ContentSource for StreamCore<R> {
    fn read_content(&mut self, generation: u64, buf: &mut [u8]) -> Result<usize> {
        if generation != self.generation || !self.open_content {
            return Err(stale(self.reader.record_offset()));
        }
        if self.reader.state() == ReaderState::Error {
            return Err(WarcError::TruncatedRecord {
                offset: self.reader.record_offset(),
                reason: "content block failed earlier".to_string(),
            });
        }
        self.content_chunk(buf)
    }

    fn generation(&self) -> u64 {
        self.generation
    }
}

/// Consume input up to the next line that starts a record.
///
/// The current position is assumed to be inside a line, so a record magic
/// right at the current position is not matched. Returns the offset of the
/// found record or of the end of input.
fn scan_for_record<R: BufRead>(tracked: &mut TrackedReader<R>, format: ArchiveFormat, max_line_length: usize) -> Result<u64> {
    let mut at_line_start = false;
    let mut line = Vec::new();
    loop {
        let pos = tracked.position();
        let read = read_line_limited(tracked, &mut line, max_line_length).map_err(|e| WarcError::io(pos, e))?;
        match read {
            LineRead::Eof => return Ok(pos),
            LineRead::TooLong => {}
            LineRead::Line if at_line_start => {
                let found = match format {
                    ArchiveFormat::Warc => line.starts_with(WARC_MAGIC),
                    ArchiveFormat::Arc => line.starts_with(WARC_MAGIC) || sniff::is_arc_header_line(&line),
                };
                if found {
                    tracked.unread(&line);
                    return Ok(pos);
                }
            }
            LineRead::Line => {}
        }
        at_line_start = line.ends_with(b"\n");
    }
}

/// Lazy, forward-only sequence of records read from a WARC or ARC source.
///
/// Format and compression are detected when the stream is opened. Each
/// yielded record carries the offset at which it started, which can be
/// passed to [`RecordStream::read_at`] or [`RecordStream::open_at`] later.
///
/// # Example
///
/// ```no_run
/// use std::fs::File;
/// use warcstream::RecordStream;
///
/// let stream = RecordStream::open(File::open("example.warc.gz")?)?;
/// for record in stream {
///     let record = record?;
///     println!("{:?} {:?}", record.source_offset(), record.target_uri());
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct RecordStream<R> {
    core: Arc<Mutex<StreamCore<R>>>,
    format: ArchiveFormat,
    compression: Compression,
    config: ReaderConfig,
    skipped: Vec<SkippedRange>,
    halted: bool,
}

impl<R: Read + Send + 'static> RecordStream<R> {
    /// Open a record stream with the default configuration.
    pub fn open(source: R) -> Result<Self> {
        Self::open_with_config(source, ReaderConfig::default())
    }

    pub fn open_with_config(source: R, config: ReaderConfig) -> Result<Self> {
        Self::open_from(source, 0, config)
    }

    fn open_from(source: R, origin: u64, config: ReaderConfig) -> Result<Self> {
        config.validate()?;
        let mut tracked = TrackedReader::new(BufReader::with_capacity(BUFFER_SIZE, source), origin);
        let window = tracked.peek(SNIFF_WINDOW).map_err(|e| WarcError::io(origin, e))?;
        let (format, compression) = sniff::sniff_at(&window, origin)?;

        let framing = match compression {
            Compression::None => Framing::Plain(tracked),
            Compression::GzipPerRecord => Framing::Gzip(GzipMemberFramer::new(tracked)),
        };
        let core = StreamCore {
            framing,
            reader: RecordReader::new(format, config.max_line_length, config.max_header_count),
            format,
            content_mode: config.content,
            max_line_length: config.max_line_length,
            generation: 0,
            open_content: false,
            capture: Vec::new(),
            capture_complete: false,
        };
        Ok(RecordStream {
            core: Arc::new(Mutex::new(core)),
            format,
            compression,
            config,
            skipped: Vec::new(),
            halted: false,
        })
    }

    pub fn format(&self) -> ArchiveFormat {
        self.format
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Byte ranges skipped by lenient recovery so far.
    pub fn skipped(&self) -> &[SkippedRange] {
        &self.skipped
    }

    /// Take the skipped ranges recorded so far.
    pub fn take_skipped(&mut self) -> Vec<SkippedRange> {
        std::mem::take(&mut self.skipped)
    }

    fn read_one(&mut self) -> Result<Option<Record>> {
        let mut core = self.core.lock();
        match core.advance()? {
            None => Ok(None),
            Some(Parsed::Materialized(record)) => Ok(Some(record)),
            Some(Parsed::Streamed { head, generation }) => {
                let source: Arc<Mutex<dyn ContentSource>> = self.core.clone();
                let handle = ContentHandle::new(source, generation, head.offset, head.content_length);
                Ok(Some(Record::from_parts(
                    head.format,
                    head.record_type,
                    head.headers,
                    Content::Stream(handle),
                    head.offset,
                    head.anomalies,
                )))
            }
        }
    }

    /// Read the next record.
    ///
    /// Returns `None` at the end of input. In strict mode the first error is
    /// returned and the stream ends after it. In lenient mode malformed,
    /// truncated and damaged records are skipped and logged to
    /// [`RecordStream::skipped`].
    pub fn next_record(&mut self) -> Option<Result<Record>> {
        if self.halted {
            return None;
        }
        loop {
            match self.read_one() {
                Ok(Some(record)) => return Some(Ok(record)),
                Ok(None) => {
                    self.halted = true;
                    return None;
                }
                Err(err) if self.config.recovery == RecoveryMode::Lenient && err.is_recoverable() => {
                    let recovered = self.core.lock().recover(&err);
                    match recovered {
                        Ok((start, end)) => {
                            warn!("Skipped bytes {}..{} after error: {}", start, end, err);
                            self.skipped.push(SkippedRange { start, end, error: err });
                        }
                        Err(fatal) => {
                            self.halted = true;
                            return Some(Err(fatal));
                        }
                    }
                }
                Err(err) => {
                    debug!("Stopping record stream after error: {}", err);
                    self.halted = true;
                    return Some(Err(err));
                }
            }
        }
    }
}

impl<R: Read + Seek + Send + 'static> RecordStream<R> {
    /// Open a stream on a seekable source at a record offset obtained from
    /// an earlier read.
    pub fn open_at(source: R, offset: u64) -> Result<Self> {
        Self::open_at_with_config(source, offset, ReaderConfig::default())
    }

    pub fn open_at_with_config(mut source: R, offset: u64, config: ReaderConfig) -> Result<Self> {
        source.seek(SeekFrom::Start(offset)).map_err(|e| WarcError::io(offset, e))?;
        Self::open_from(source, offset, config)
    }

    /// Reposition the stream at a record offset.
    ///
    /// Outstanding content handles become stale.
    pub fn seek(&mut self, offset: u64) -> Result<()> {
        self.core.lock().seek(offset)?;
        self.halted = false;
        Ok(())
    }

    /// Read the single record starting at `offset`.
    ///
    /// Errors are returned as is regardless of the recovery mode. Iteration
    /// continues after the returned record.
    pub fn read_at(&mut self, offset: u64) -> Result<Record> {
        self.seek(offset)?;
        match self.read_one() {
            Ok(Some(record)) => Ok(record),
            Ok(None) => Err(WarcError::TruncatedRecord { offset, reason: "no record at offset".to_string() }),
            Err(e) => Err(e),
        }
    }
}

impl RecordStream<io::Empty> {
    /// Create a record writer on `sink` with the given framing.
    pub fn create<W: Write>(sink: W, compression: Compression) -> RecordWriter<W> {
        RecordWriter::with_compression(sink, compression)
    }
}

impl<R: Read + Send + 'static> Iterator for RecordStream<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record()
    }
}
