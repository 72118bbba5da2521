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

use std::io::{self, BufRead, BufReader, Read, Seek};
use flate2::bufread::GzDecoder;
use tracing::debug;

use crate::error::{Result, WarcError};
use crate::sniff::{GZIP_MAGIC, GZIP_MEMBER_HEADER};
use crate::source::TrackedReader;

type MemberReader<R> = BufReader<GzDecoder<TrackedReader<R>>>;

enum MemberState<R> {
    Between(TrackedReader<R>),
    Inside { start: u64, reader: MemberReader<R>, fresh: bool },
    Poisoned,
}

/// Splits a byte source into consecutive gzip members.
///
/// Each member is exposed as a decompressing reader that ends with the
/// member. Offsets are positions of member headers in the compressed input.
pub(crate) struct GzipMemberFramer<R> {
    state: MemberState<R>,
}

impl<R: BufRead> GzipMemberFramer<R> {
    pub fn new(reader: TrackedReader<R>) -> Self {
        GzipMemberFramer { state: MemberState::Between(reader) }
    }

    /// Compressed offset of the member currently being read.
    pub fn member_offset(&self) -> Option<u64> {
        match &self.state {
            MemberState::Inside { start, .. } => Some(*start),
            _ => None,
        }
    }

    /// Compressed input position.
    pub fn position(&self) -> u64 {
        match &self.state {
            MemberState::Between(r) => r.position(),
            MemberState::Inside { reader, .. } => reader.get_ref().get_ref().position(),
            MemberState::Poisoned => 0,
        }
    }

    /// Decompressed reader of the current member.
    pub fn current(&mut self) -> Option<&mut dyn BufRead> {
        match &mut self.state {
            MemberState::Inside { reader, fresh, .. } => {
                *fresh = false;
                Some(reader)
            }
            _ => None,
        }
    }

    /// Finish the current member and open the next one.
    ///
    /// Returns the compressed start offset of the new member, or `None` at a
    /// clean end of input. A member opened by [`GzipMemberFramer::open_at`]
    /// and not read yet is returned as is.
    pub fn next_member(&mut self) -> Result<Option<u64>> {
        if let MemberState::Inside { start, fresh, .. } = &mut self.state {
            if *fresh {
                *fresh = false;
                return Ok(Some(*start));
            }
        }
        self.finish_member()?;
        self.begin_member()
    }

    /// Read the current member to its end and verify it.
    ///
    /// Decompressed bytes left in the member other than line breaks fail with
    /// [`WarcError::GzipMember`]. The framer is positioned after the member
    /// either way.
    pub fn finish_member(&mut self) -> Result<()> {
        if let MemberState::Inside { start, reader, .. } = &mut self.state {
            let start = *start;
            let drained = drain(reader);
            self.leave_member();
            match drained {
                Ok(false) => {}
                Ok(true) => return Err(WarcError::GzipMember {
                    offset: start,
                    reason: "member holds data after its record".to_string(),
                }),
                Err(e) => return Err(WarcError::GzipMember { offset: start, reason: e.to_string() }),
            }
        }
        Ok(())
    }

    /// Drop the current (damaged) member and find the next gzip member.
    ///
    /// A member that still decompresses cleanly is read to its end first.
    /// Otherwise, or if no member header follows it, the raw input is
    /// scanned for the next member header. Returns the offset of the next
    /// member header, or `None` if the input ended first. The framer is left
    /// between members in both cases.
    pub fn resync(&mut self) -> Result<Option<u64>> {
        let member_start = self.member_offset();
        let clean = match &mut self.state {
            MemberState::Inside { reader, .. } => drain(reader).is_ok(),
            _ => false,
        };
        self.leave_member();
        let reader = match &mut self.state {
            MemberState::Between(r) => r,
            _ => return Ok(None),
        };

        if clean {
            let pos = reader.position();
            let head = reader.peek(GZIP_MEMBER_HEADER.len()).map_err(|e| WarcError::io(pos, e))?;
            if head.is_empty() {
                return Ok(None);
            }
            if head == GZIP_MEMBER_HEADER {
                debug!("Skipped damaged record in intact gzip member, next member at {}", pos);
                return Ok(Some(pos));
            }
        } else if member_start.is_some_and(|s| reader.position() <= s) {
            reader.consume(1);
        }
        loop {
            let pos = reader.position();
            let buf = reader.fill_buf().map_err(|e| WarcError::io(pos, e))?;
            if buf.is_empty() {
                return Ok(None);
            }
            match buf.iter().position(|&b| b == GZIP_MAGIC[0]) {
                Some(i) => {
                    reader.consume(i);
                    let pos = reader.position();
                    let head = reader.peek(GZIP_MEMBER_HEADER.len()).map_err(|e| WarcError::io(pos, e))?;
                    if head == GZIP_MEMBER_HEADER {
                        debug!("Resynchronized at gzip member {}", pos);
                        return Ok(Some(pos));
                    }
                    if head.len() < GZIP_MEMBER_HEADER.len() {
                        reader.consume(head.len());
                        return Ok(None);
                    }
                    reader.consume(1);
                }
                None => {
                    let n = buf.len();
                    reader.consume(n);
                }
            }
        }
    }

    fn leave_member(&mut self) {
        self.state = match std::mem::replace(&mut self.state, MemberState::Poisoned) {
            MemberState::Inside { reader, .. } => MemberState::Between(reader.into_inner().into_inner()),
            other => other,
        };
    }

    fn begin_member(&mut self) -> Result<Option<u64>> {
        let position = self.position();
        let reader = match &mut self.state {
            MemberState::Between(r) => r,
            _ => return Err(WarcError::GzipMember { offset: position, reason: "framer in invalid state".to_string() }),
        };
        let start = reader.position();
        let head = reader.peek(GZIP_MAGIC.len()).map_err(|e| WarcError::io(start, e))?;
        if head.is_empty() {
            return Ok(None);
        }
        if head != GZIP_MAGIC {
            return Err(WarcError::GzipMember { offset: start, reason: "expected gzip member header".to_string() });
        }

        if let MemberState::Between(r) = std::mem::replace(&mut self.state, MemberState::Poisoned) {
            self.state = MemberState::Inside { start, reader: BufReader::new(GzDecoder::new(r)), fresh: false };
        }
        debug!("Gzip member at offset {}", start);
        Ok(Some(start))
    }
}

impl<R: BufRead + Seek> GzipMemberFramer<R> {
    /// Seek to `offset` and open the gzip member starting there.
    ///
    /// The next call to [`GzipMemberFramer::next_member`] returns this
    /// member instead of skipping it.
    pub fn open_at(&mut self, offset: u64) -> Result<u64> {
        self.leave_member();
        let reader = match &mut self.state {
            MemberState::Between(r) => r,
            _ => return Err(WarcError::GzipMember { offset, reason: "framer in invalid state".to_string() }),
        };
        reader.seek_to(offset).map_err(|e| WarcError::io(offset, e))?;
        let head = reader.peek(GZIP_MEMBER_HEADER.len()).map_err(|e| WarcError::io(offset, e))?;
        if head != GZIP_MEMBER_HEADER {
            return Err(WarcError::GzipMember { offset, reason: "no gzip member header at offset".to_string() });
        }
        let start = self.begin_member()?.ok_or_else(|| WarcError::GzipMember {
            offset,
            reason: "no gzip member header at offset".to_string(),
        })?;
        if let MemberState::Inside { fresh, .. } = &mut self.state {
            *fresh = true;
        }
        Ok(start)
    }
}

/// Read a member to its end. Returns whether anything other than line
/// breaks was left.
fn drain<R: Read>(reader: &mut R) -> io::Result<bool> {
    let mut garbage = false;
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            return Ok(garbage);
        }
        garbage |= buf[..n].iter().any(|&b| b != b'\r' && b != b'\n');
    }
}
