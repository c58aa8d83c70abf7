//! Synthetic JPEG fixtures and scratch directories for tests.

use std::path::{Path, PathBuf};

use little_exif::{exif_tag::ExifTag, filetype::FileExtension, metadata::Metadata};

use crate::gps_tags::app1_segment;

const JFIF_APP0: [u8; 18] = [
    0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00, 0x01, 0x01, 0x00, 0x00, 0x01, 0x00, 0x01,
    0x00, 0x00,
];

const COMMENT: [u8; 11] = [0xFF, 0xFE, 0x00, 0x09, b'f', b'i', b'x', b't', b'u', b'r', b'e'];

/// SOS header for a single component followed by a few bytes of "scan data".
const SCAN: [u8; 18] = [
    0xFF, 0xDA, 0x00, 0x08, 0x01, 0x01, 0x00, 0x00, 0x3F, 0x00, 0x12, 0x34, 0x56, 0x78, 0x9A,
    0xBC, 0xFF, 0xD9,
];

/// A minimal JPEG: SOI, JFIF APP0, optional EXIF APP1, a comment and a scan.
pub fn jpeg(exif_segment: Option<&[u8]>) -> Vec<u8> {
    let mut data = vec![0xFF, 0xD8];
    data.extend_from_slice(&JFIF_APP0);
    if let Some(segment) = exif_segment {
        data.extend_from_slice(segment);
    }
    data.extend_from_slice(&COMMENT);
    data.extend_from_slice(&SCAN);
    data
}

/// Encodes `tags` into a complete EXIF APP1 segment.
pub fn exif_segment(tags: Vec<ExifTag>) -> Vec<u8> {
    let mut metadata = Metadata::new();
    for tag in tags {
        metadata.set_tag(tag);
    }
    app1_segment(metadata.as_u8_vec(FileExtension::JPEG).unwrap()).unwrap()
}

/// Every marker segment of `data` except EXIF APP1, plus the scan data.
pub fn segments_without_exif(data: &[u8]) -> Vec<Vec<u8>> {
    let mut segments = Vec::new();
    let mut pos = 2;
    while pos + 4 <= data.len() {
        let marker = data[pos + 1];
        if marker == 0xDA {
            segments.push(data[pos..].to_vec());
            break;
        }
        let length = usize::from(u16::from_be_bytes([data[pos + 2], data[pos + 3]]));
        let end = pos + 2 + length;
        let is_exif = marker == 0xE1 && data[pos + 4..end].starts_with(b"Exif\0\0");
        if !is_exif {
            segments.push(data[pos..end].to_vec());
        }
        pos = end;
    }
    segments
}

/// Number of EXIF APP1 segments in `data`.
pub fn exif_segment_count(data: &[u8]) -> usize {
    let mut count = 0;
    let mut pos = 2;
    while pos + 4 <= data.len() && data[pos + 1] != 0xDA {
        let length = usize::from(u16::from_be_bytes([data[pos + 2], data[pos + 3]]));
        let end = pos + 2 + length;
        if data[pos + 1] == 0xE1 && data[pos + 4..end].starts_with(b"Exif\0\0") {
            count += 1;
        }
        pos = end;
    }
    count
}

/// A file inside a temporary directory that is removed on drop.
pub struct TempFixture {
    _temp_dir: tempfile::TempDir,
    temp_path: PathBuf,
}

impl TempFixture {
    /// Writes `bytes` to `name` inside a fresh temporary directory.
    pub fn with_bytes(name: &str, bytes: &[u8]) -> Self {
        let temp_dir = tempfile::tempdir().unwrap();
        let temp_path = temp_dir.path().join(name);
        std::fs::write(&temp_path, bytes).unwrap();
        Self {
            _temp_dir: temp_dir,
            temp_path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.temp_path
    }
}
