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

//! Streaming WARC and ARC record engine.
//!
//! Archives are read through [`RecordStream`], which detects format and
//! gzip-per-record framing, yields [`Record`] values tagged with their source
//! offset and re-reads single records at such offsets. [`RecordWriter`]
//! serializes records canonically, [`ArcToWarcConverter`] turns legacy ARC
//! records into WARC records and [`Validator`] checks records for structural
//! problems.

pub mod arc;
pub mod config;
pub mod content;
pub mod convert;
pub mod digest;
pub mod error;
pub mod header;
pub mod index;
pub mod record;
pub mod sniff;
pub mod stream;
pub mod timestamp;
pub mod validate;
pub mod writer;

mod framer;
mod reader;
mod source;

pub use config::{Config, ContentMode, ReaderConfig, RecoveryMode, WriterConfig};
pub use content::{Content, ContentHandle};
pub use convert::ArcToWarcConverter;
pub use error::{Result, WarcError};
pub use header::{HeaderEncoding, HeaderMap};
pub use index::{build_index, IndexEntry};
pub use record::{Anomaly, ArchiveFormat, Compression, Field, Record, RecordType};
pub use sniff::sniff;
pub use stream::{RecordStream, SkippedRange};
pub use validate::Validator;
pub use writer::RecordWriter;
