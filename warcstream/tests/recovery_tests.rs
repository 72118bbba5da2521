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

//! Strict and lenient reading of damaged archives, and ARC input

use std::io::{Cursor, Write};
use flate2::write::GzEncoder;

use warcstream::{
    ArcToWarcConverter, ArchiveFormat, Compression, ReaderConfig, RecordStream, RecordType, RecordWriter, WarcError,
};

fn warc_record(uri: &str, declared: usize, content: &[u8]) -> Vec<u8> {
    let mut out = format!(
        "WARC/1.0\r\nWARC-Type: resource\r\nWARC-Record-ID: <urn:uuid:{uri}>\r\nWARC-Date: 2024-01-01T00:00:00Z\r\n\
         WARC-Target-URI: {uri}\r\nContent-Length: {declared}\r\n\r\n"
    ).into_bytes();
    out.extend_from_slice(content);
    out.extend_from_slice(b"\r\n\r\n");
    out
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Three records, the middle one declaring `declared` content bytes instead of 3.
fn wrong_middle_length(declared: usize) -> (Vec<u8>, u64, u64) {
    let mut data = warc_record("http://a/", 3, b"one");
    let middle = data.len() as u64;
    data.extend(warc_record("http://b/", declared, b"two"));
    let third = data.len() as u64;
    data.extend(warc_record("http://c/", 5, b"three"));
    (data, middle, third)
}

/// Middle record declaring more content than the file holds.
fn overlong_middle() -> (Vec<u8>, u64, u64) {
    wrong_middle_length(5000)
}

#[test]
fn test_strict_overlong_content() {
    let (data, middle, _) = overlong_middle();
    let results: Vec<_> = RecordStream::open(Cursor::new(data)).unwrap().collect();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].as_ref().unwrap().target_uri().as_deref(), Some("http://a/"));
    match &results[1] {
        Err(WarcError::TruncatedRecord { offset, .. }) => assert!(*offset > middle),
        other => panic!("unexpected result {other:?}"),
    }
}

#[test]
fn test_lenient_overlong_content() {
    let (data, middle, third) = overlong_middle();
    let mut stream = RecordStream::open_with_config(Cursor::new(data), ReaderConfig::default().lenient()).unwrap();
    let records: Vec<_> = stream.by_ref().map(|r| r.unwrap()).collect();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].target_uri().as_deref(), Some("http://a/"));
    assert_eq!(records[1].target_uri().as_deref(), Some("http://c/"));
    assert_eq!(records[1].source_offset(), Some(third));

    let skipped = stream.take_skipped();
    assert_eq!(skipped.len(), 1);
    assert_eq!((skipped[0].start, skipped[0].end), (middle, third));
    assert!(matches!(skipped[0].error, WarcError::TruncatedRecord { .. }));
    assert!(stream.skipped().is_empty());
}

#[test]
fn test_lenient_streamed_overlong_content() {
    let (data, middle, third) = overlong_middle();
    let config = ReaderConfig::default().lenient().streaming();
    let mut stream = RecordStream::open_with_config(Cursor::new(data), config).unwrap();
    let uris: Vec<_> = stream.by_ref().map(|r| r.unwrap().target_uri().unwrap()).collect();

    // The middle head is yielded before its content turns out to be short.
    assert_eq!(uris, vec!["http://a/", "http://b/", "http://c/"]);
    assert_eq!(stream.skipped().len(), 1);
    assert_eq!((stream.skipped()[0].start, stream.skipped()[0].end), (middle, third));
}

#[test]
fn test_content_length_ending_inside_next_record() {
    let (data, middle, third) = wrong_middle_length(40);

    let strict: Vec<_> = RecordStream::open(Cursor::new(data.clone())).unwrap().collect();
    assert_eq!(strict.len(), 2);
    assert_eq!(strict[0].as_ref().unwrap().target_uri().as_deref(), Some("http://a/"));
    assert!(matches!(strict[1], Err(WarcError::TruncatedRecord { offset, .. }) if offset == middle));

    let mut stream = RecordStream::open_with_config(Cursor::new(data.clone()), ReaderConfig::default().lenient())
        .unwrap();
    let records: Vec<_> = stream.by_ref().map(|r| r.unwrap()).collect();
    let uris: Vec<_> = records.iter().map(|r| r.target_uri().unwrap()).collect();
    assert_eq!(uris, vec!["http://a/", "http://c/"]);
    assert_eq!(records[1].source_offset(), Some(third));
    assert_eq!(stream.skipped().len(), 1);
    assert_eq!((stream.skipped()[0].start, stream.skipped()[0].end), (middle, third));

    let config = ReaderConfig::default().lenient().streaming();
    let mut stream = RecordStream::open_with_config(Cursor::new(data), config).unwrap();
    let uris: Vec<_> = stream.by_ref().map(|r| r.unwrap().target_uri().unwrap()).collect();
    assert_eq!(uris, vec!["http://a/", "http://b/", "http://c/"]);
    assert_eq!((stream.skipped()[0].start, stream.skipped()[0].end), (middle, third));
}

#[test]
fn test_content_length_too_short() {
    let (data, middle, third) = wrong_middle_length(1);
    let mut stream = RecordStream::open_with_config(Cursor::new(data), ReaderConfig::default().lenient()).unwrap();
    let uris: Vec<_> = stream.by_ref().map(|r| r.unwrap().target_uri().unwrap()).collect();
    assert_eq!(uris, vec!["http://a/", "http://c/"]);
    assert_eq!((stream.skipped()[0].start, stream.skipped()[0].end), (middle, third));
}

#[test]
fn test_lenient_gzip_member_with_wrong_length() {
    let first = gzip(&warc_record("http://a/", 3, b"one"));
    let second = gzip(&warc_record("http://b/", 1, b"two"));
    let third = gzip(&warc_record("http://c/", 5, b"three"));
    let third_offset = (first.len() + second.len()) as u64;
    let data = [first.clone(), second, third].concat();

    let mut stream = RecordStream::open_with_config(Cursor::new(data), ReaderConfig::default().lenient()).unwrap();
    let offsets: Vec<_> = stream.by_ref().map(|r| r.unwrap().source_offset().unwrap()).collect();
    assert_eq!(offsets, vec![0, third_offset]);
    assert_eq!(stream.skipped().len(), 1);
    assert_eq!((stream.skipped()[0].start, stream.skipped()[0].end), (first.len() as u64, third_offset));
}

#[test]
fn test_lenient_corrupt_gzip_member() {
    let first = gzip(&warc_record("http://a/", 3, b"one"));
    let mut second = gzip(&warc_record("http://b/", 3, b"two"));
    let len = second.len();
    second[len - 8] ^= 0xff;
    let third = gzip(&warc_record("http://c/", 5, b"three"));
    let data = [first.clone(), second.clone(), third].concat();
    let third_offset = (first.len() + second.len()) as u64;

    let strict: Vec<_> = RecordStream::open(Cursor::new(data.clone())).unwrap().collect();
    assert_eq!(strict.len(), 2);
    assert!(matches!(strict[1], Err(WarcError::GzipMember { offset, .. }) if offset == first.len() as u64));

    let mut stream = RecordStream::open_with_config(Cursor::new(data), ReaderConfig::default().lenient()).unwrap();
    assert_eq!(stream.compression(), Compression::GzipPerRecord);
    let offsets: Vec<_> = stream.by_ref().map(|r| r.unwrap().source_offset().unwrap()).collect();
    assert_eq!(offsets, vec![0, third_offset]);
    assert_eq!(stream.skipped().len(), 1);
    assert_eq!(stream.skipped()[0].end, third_offset);
}

#[test]
fn test_truncated_file() {
    let mut data = warc_record("http://a/", 3, b"one");
    data.extend_from_slice(b"WARC/1.0\r\nWARC-Type: resource\r\n");
    let results: Vec<_> = RecordStream::open(Cursor::new(data)).unwrap().collect();
    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(WarcError::TruncatedRecord { .. })));
}

#[test]
fn test_arc_file_to_warc() {
    let filedesc_body = b"1 0 Test Archive\nURL IP-address Archive-date Content-type Archive-length\n";
    let mut arc = format!("filedesc://crawl.arc 0.0.0.0 20090101000000 text/plain {}\n", filedesc_body.len())
        .into_bytes();
    arc.extend_from_slice(filedesc_body);
    arc.push(b'\n');
    let second = arc.len() as u64;
    arc.extend_from_slice(b"http://example.com/ 192.0.2.1 20090101000000 text/html 13\n<html></html>\n");

    let stream = RecordStream::open(Cursor::new(arc)).unwrap();
    assert_eq!(stream.format(), ArchiveFormat::Arc);
    let mut converter = ArcToWarcConverter::new();
    let records: Vec<_> = stream.map(|r| converter.convert(r.unwrap()).unwrap()).collect();
    assert_eq!(records.len(), 2);

    let info = &records[0];
    assert_eq!(info.record_type(), Some(RecordType::WarcInfo));
    assert_eq!(info.content_bytes(), Some(&filedesc_body[..]));

    let response = &records[1];
    assert_eq!(response.source_offset(), Some(second));
    assert_eq!(response.record_type(), Some(RecordType::Response));
    assert_eq!(response.target_uri().as_deref(), Some("http://example.com/"));
    assert_eq!(response.ip_address().as_deref(), Some("192.0.2.1"));
    assert_eq!(response.date().as_deref(), Some("2009-01-01T00:00:00Z"));
    assert_eq!(response.content_type().as_deref(), Some("text/html"));
    assert_eq!(response.content_bytes(), Some(&b"<html></html>"[..]));
    assert_eq!(response.headers().get("WARC-Warcinfo-ID"), info.record_id());

    let mut writer = RecordWriter::new(Vec::new());
    for record in &records {
        writer.write(record).unwrap();
    }
    let warc = writer.finish().unwrap();
    let reread: Vec<_> = RecordStream::open(Cursor::new(warc)).unwrap().map(|r| r.unwrap()).collect();
    assert_eq!(reread[1].content_bytes(), Some(&b"<html></html>"[..]));
    assert_eq!(reread[1].record_id(), response.record_id());
    assert!(warcstream::Validator::new().check(&reread[1]));
}

#[test]
fn test_mixed_arc_and_warc_records() {
    let filedesc_body = b"1 0 Mixed\nURL IP-address Archive-date Content-type Archive-length\n";
    let mut data = format!("filedesc://mixed.arc 0.0.0.0 20090101000000 text/plain {}\n", filedesc_body.len())
        .into_bytes();
    data.extend_from_slice(filedesc_body);
    data.push(b'\n');
    let warc_offset = data.len() as u64;
    data.extend(warc_record("http://warc/", 3, b"one"));
    let arc_offset = data.len() as u64;
    data.extend_from_slice(b"http://arc/ 192.0.2.1 20090101000000 text/plain 3\ntwo\n");

    let stream = RecordStream::open(Cursor::new(data)).unwrap();
    assert_eq!(stream.format(), ArchiveFormat::Arc);
    let records: Vec<_> = stream.map(|r| r.unwrap()).collect();
    let formats: Vec<_> = records.iter().map(|r| r.format()).collect();
    assert_eq!(formats, vec![ArchiveFormat::Arc, ArchiveFormat::Warc, ArchiveFormat::Arc]);
    assert_eq!(records[1].source_offset(), Some(warc_offset));
    assert_eq!(records[1].record_type(), Some(RecordType::Resource));
    assert_eq!(records[1].content_bytes(), Some(&b"one"[..]));
    assert_eq!(records[2].source_offset(), Some(arc_offset));
    assert_eq!(records[2].content_bytes(), Some(&b"two"[..]));

    let mut converter = ArcToWarcConverter::new();
    let converted: Vec<_> = records.into_iter().map(|r| converter.convert(r).unwrap()).collect();
    assert!(converted.iter().all(|r| r.format() == ArchiveFormat::Warc));
    assert_eq!(converted[2].target_uri().as_deref(), Some("http://arc/"));
}
