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

use std::io::{self, BufRead, Read, Seek, SeekFrom};


/// Buffered reader that counts consumed bytes and supports pushing bytes back.
///
/// The position is the absolute offset of the next byte handed out, so bytes
/// pushed back with [`TrackedReader::unread`] move it backwards.
#[derive(Debug)]
pub(crate) struct TrackedReader<R> {
    inner: R,
    position: u64,
    pending: Vec<u8>,
    pending_pos: usize,
}

impl<R: BufRead> TrackedReader<R> {
    pub fn new(inner: R, position: u64) -> Self {
        TrackedReader { inner, position, pending: Vec::new(), pending_pos: 0 }
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Push bytes back in front of the stream.
    pub fn unread(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let mut pending = Vec::with_capacity(bytes.len() + self.pending.len() - self.pending_pos);
        pending.extend_from_slice(bytes);
        pending.extend_from_slice(&self.pending[self.pending_pos..]);
        self.pending = pending;
        self.pending_pos = 0;
        self.position = self.position.saturating_sub(bytes.len() as u64);
    }

    /// Look at up to `n` upcoming bytes without consuming them.
    ///
    /// Returns fewer bytes only at end of input.
    pub fn peek(&mut self, n: usize) -> io::Result<Vec<u8>> {
        let mut taken = Vec::with_capacity(n);
        while taken.len() < n {
            let buf = self.fill_buf()?;
            if buf.is_empty() {
                break;
            }
            let k = buf.len().min(n - taken.len());
            taken.extend_from_slice(&buf[..k]);
            self.consume(k);
        }
        self.unread(&taken);
        Ok(taken)
    }
}

impl<R: BufRead + Seek> TrackedReader<R> {
    /// Seek the underlying reader and discard pushed-back bytes.
    pub fn seek_to(&mut self, offset: u64) -> io::Result<()> {
        self.inner.seek(SeekFrom::Start(offset))?;
        self.pending.clear();
        self.pending_pos = 0;
        self.position = offset;
        Ok(())
    }
}

impl<R: BufRead> Read for TrackedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.fill_buf()?;
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.consume(n);
        Ok(n)
    }
}

impl<R: BufRead> BufRead for TrackedReader<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if self.pending_pos < self.pending.len() {
            return Ok(&self.pending[self.pending_pos..]);
        }
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        if self.pending_pos < self.pending.len() {
            let amt = amt.min(self.pending.len() - self.pending_pos);
            self.pending_pos += amt;
            if self.pending_pos == self.pending.len() {
                self.pending.clear();
                self.pending_pos = 0;
            }
            self.position += amt as u64;
        } else {
            self.inner.consume(amt);
            self.position += amt as u64;
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_position_and_unread() {
        let mut reader = TrackedReader::new(Cursor::new(b"hello world".to_vec()), 100);
        let mut buf = [0u8; 5];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(reader.position(), 105);

        reader.unread(b"llo");
        assert_eq!(reader.position(), 102);
        let mut rest = String::new();
        reader.read_to_string(&mut rest).unwrap();
        assert_eq!(rest, "llo world");
        assert_eq!(reader.position(), 111);
    }

    #[test]
    fn test_peek() {
        let mut reader = TrackedReader::new(Cursor::new(b"abc".to_vec()), 0);
        assert_eq!(reader.peek(2).unwrap(), b"ab");
        assert_eq!(reader.position(), 0);
        assert_eq!(reader.peek(10).unwrap(), b"abc");
        let mut line = Vec::new();
        reader.read_until(b'\n', &mut line).unwrap();
        assert_eq!(line, b"abc");
    }

    #[test]
    fn test_seek_to() {
        let mut reader = TrackedReader::new(Cursor::new(b"0123456789".to_vec()), 0);
        reader.unread(b"xx");
        reader.seek_to(7).unwrap();
        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"789");
        assert_eq!(reader.position(), 10);
    }
}
