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
use std::io;
use std::sync::Arc;
use parking_lot::Mutex;

use crate::error::{Result, WarcError};


/// Something that can serve the content block of the record it most recently
/// yielded.
///
/// Every record yielded by a stream is stamped with a generation number.
/// Reads with an outdated generation must fail with
/// [`WarcError::StaleContentHandle`].
pub(crate) trait ContentSource: Send {
    fn read_content(&mut self, generation: u64, buf: &mut [u8]) -> Result<usize>;

    fn generation(&self) -> u64;
}

/// Record content block.
#[derive(Debug)]
pub enum Content {
    /// Fully materialized bytes
    Bytes(Vec<u8>),
    /// Read-once handle over the content block in the underlying stream
    Stream(ContentHandle),
}

impl Default for Content {
    fn default() -> Self {
        Content::Bytes(Vec::new())
    }
}

impl Content {
    /// Whether the content is held in memory.
    pub fn is_materialized(&self) -> bool {
        matches!(self, Content::Bytes(_))
    }

    /// Materialized bytes, if any.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Content::Bytes(bytes) => Some(bytes),
            Content::Stream(_) => None,
        }
    }
}

/// Bounded, sequential, read-once reader over a record's content block.
///
/// The handle shares its stream's cursor. It yields exactly the declared
/// content length and then end-of-file. Once the stream advances to another
/// record, every read fails with [`WarcError::StaleContentHandle`].
pub struct ContentHandle {
    source: Arc<Mutex<dyn ContentSource>>,
    generation: u64,
    offset: u64,
    length: u64,
    consumed: u64,
}

impl ContentHandle {
    pub(crate) fn new(source: Arc<Mutex<dyn ContentSource>>, generation: u64, offset: u64, length: u64) -> Self {
        ContentHandle { source, generation, offset, length, consumed: 0 }
    }

    /// Declared content length in bytes.
    pub fn len(&self) -> u64 {
        self.length
    }

    /// Whether the declared content block is empty.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Number of content bytes read through this handle so far.
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Offset of the record this handle belongs to.
    pub fn record_offset(&self) -> u64 {
        self.offset
    }

    /// Whether the owning stream has moved past this record.
    pub fn is_stale(&self) -> bool {
        self.source.lock().generation() != self.generation
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut source = self.source.lock();
        if source.generation() != self.generation {
            return Err(stale(self.offset));
        }
        let n = source.read_content(self.generation, buf)?;
        self.consumed += n as u64;
        Ok(n)
    }

    /// Read the remaining content into memory.
    pub fn read_to_vec(&mut self) -> Result<Vec<u8>> {
        let mut content = Vec::with_capacity(self.length.min(1 << 20) as usize);
        let mut buf = [0u8; 8192];
        loop {
            let n = self.read_chunk(&mut buf)?;
            if n == 0 {
                break;
            }
            content.extend_from_slice(&buf[..n]);
        }
        Ok(content)
    }
}

impl io::Read for ContentHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_chunk(buf).map_err(io::Error::from)
    }
}

impl fmt::Debug for ContentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentHandle")
            .field("generation", &self.generation)
            .field("offset", &self.offset)
            .field("length", &self.length)
            .field("consumed", &self.consumed)
            .finish()
    }
}

impl From<ContentHandle> for Content {
    fn from(handle: ContentHandle) -> Self {
        Content::Stream(handle)
    }
}

impl From<Vec<u8>> for Content {
    fn from(bytes: Vec<u8>) -> Self {
        Content::Bytes(bytes)
    }
}

pub(crate) fn stale(offset: u64) -> WarcError {
    WarcError::StaleContentHandle { offset }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    struct FixedSource {
        generation: u64,
        data: Vec<u8>,
        pos: usize,
    }

    impl ContentSource for FixedSource {
        fn read_content(&mut self, generation: u64, buf: &mut [u8]) -> Result<usize> {
            if generation != self.generation {
                return Err(stale(0));
            }
            let n = buf.len().min(self.data.len() - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }

        fn generation(&self) -> u64 {
            self.generation
        }
    }

    #[test]
    fn test_handle_reads_and_goes_stale() {
        let source = Arc::new(Mutex::new(FixedSource { generation: 1, data: b"hello".to_vec(), pos: 0 }));
        let shared: Arc<Mutex<dyn ContentSource>> = source.clone();
        let mut handle = ContentHandle::new(shared, 1, 0, 5);
        assert!(!handle.is_stale());

        let mut buf = [0u8; 3];
        assert_eq!(handle.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf, b"hel");
        assert_eq!(handle.consumed(), 3);

        source.lock().generation = 2;
        assert!(handle.is_stale());
        assert!(matches!(handle.read_to_vec(), Err(WarcError::StaleContentHandle { .. })));
        assert_eq!(handle.read(&mut buf).unwrap_err().kind(), io::ErrorKind::InvalidData);
    }
}
