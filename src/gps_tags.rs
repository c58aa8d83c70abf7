//! Reading and rewriting the GPS sub-directory of a JPEG's EXIF block.
//!
//! Reads go through `kamadak-exif`. Writes load the existing EXIF block with
//! `little_exif`, replace the four GPS position tags, re-encode the block and
//! splice it back into the JPEG in place of the old APP1 segment. Every other
//! segment of the file is copied through unchanged.

use std::{
    fs,
    io::{Cursor, Write},
    ops::Range,
    panic::{self, AssertUnwindSafe},
    path::Path,
};

use little_exif::{
    exif_tag::ExifTag, filetype::FileExtension, metadata::Metadata, rational::uR64,
};
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::{
    coordinate::{decimal_to_dms, Axis, DecimalCoordinate, DmsRational, HemispherePair, Precision, Rational},
    error::{GeotagError, Result},
};

const SOI: [u8; 2] = [0xFF, 0xD8];
const APP1: [u8; 2] = [0xFF, 0xE1];
const EXIF_HEADER: &[u8] = b"Exif\0\0";

/// The GPS position tags of one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GpsTagBlock {
    pub latitude: DmsRational,
    pub latitude_ref: char,
    pub longitude: DmsRational,
    pub longitude_ref: char,
}

impl GpsTagBlock {
    /// Builds a block from decimal coordinates, tagging each axis with the
    /// configured hemisphere and storing the unsigned magnitude.
    ///
    /// # Errors
    ///
    /// Propagates [`decimal_to_dms`] failures.
    pub fn from_coordinates(
        latitude: &DecimalCoordinate,
        longitude: &DecimalCoordinate,
        hemisphere: &HemispherePair,
        precision: &Precision,
    ) -> Result<Self> {
        Ok(Self {
            latitude: decimal_to_dms(latitude, precision)?,
            latitude_ref: hemisphere.reference(Axis::Latitude),
            longitude: decimal_to_dms(longitude, precision)?,
            longitude_ref: hemisphere.reference(Axis::Longitude),
        })
    }
}

/// Extracts the GPS position tags from an image.
///
/// # Errors
///
/// * [`GeotagError::MissingGpsBlock`] if the image has no EXIF block or the
///   block lacks one of the position tags.
/// * [`GeotagError::MalformedMetadata`] if the container cannot be parsed or a
///   tag has the wrong shape.
pub fn read_gps_block(image: &[u8]) -> Result<GpsTagBlock> {
    let exif = match exif::Reader::new().read_from_container(&mut Cursor::new(image)) {
        Ok(exif) => exif,
        Err(exif::Error::NotFound(_)) => return Err(GeotagError::MissingGpsBlock),
        Err(e) => return Err(GeotagError::MalformedMetadata(e.to_string())),
    };

    Ok(GpsTagBlock {
        latitude: dms_field(&exif, exif::Tag::GPSLatitude)?,
        latitude_ref: reference_field(&exif, exif::Tag::GPSLatitudeRef)?,
        longitude: dms_field(&exif, exif::Tag::GPSLongitude)?,
        longitude_ref: reference_field(&exif, exif::Tag::GPSLongitudeRef)?,
    })
}

/// Returns a copy of `image` whose EXIF block carries `block`.
///
/// Existing EXIF tags are kept; images without an EXIF block get a new one
/// inserted after the SOI/JFIF header.
///
/// # Errors
///
/// * [`GeotagError::MalformedMetadata`] if the image is not a well-formed JPEG
///   or its existing EXIF block cannot be decoded. The input is never
///   partially modified.
/// * [`GeotagError::RationalOutOfRange`] if a DMS component exceeds 32 bits.
pub fn write_gps_block(image: &[u8], block: &GpsTagBlock) -> Result<Vec<u8>> {
    let layout = JpegLayout::scan(image)?;

    let mut metadata = match layout.exif {
        Some(_) => load_metadata(image)?,
        None => Metadata::new(),
    };

    metadata.set_tag(ExifTag::GPSLatitudeRef(block.latitude_ref.to_string()));
    metadata.set_tag(ExifTag::GPSLatitude(exif_rationals(&block.latitude)?));
    metadata.set_tag(ExifTag::GPSLongitudeRef(block.longitude_ref.to_string()));
    metadata.set_tag(ExifTag::GPSLongitude(exif_rationals(&block.longitude)?));

    let segment = encode_segment(&metadata)?;

    let (head, tail) = match &layout.exif {
        Some(range) => (&image[..range.start], &image[range.end..]),
        None => (&image[..layout.insert_at], &image[layout.insert_at..]),
    };

    let mut updated = Vec::with_capacity(head.len() + segment.len() + tail.len());
    updated.extend_from_slice(head);
    updated.extend_from_slice(&segment);
    updated.extend_from_slice(tail);
    Ok(updated)
}

/// # Errors
///
/// I/O failures plus everything [`read_gps_block`] reports.
pub fn read_gps_file(path: &Path) -> Result<GpsTagBlock> {
    let image = fs::read(path).map_err(GeotagError::io(path))?;
    read_gps_block(&image)
}

/// Reads `source`, writes `block` into its metadata and stores the result at
/// `dest` (which may be `source` itself).
///
/// The new file is written next to `dest` and renamed over it, so `dest` is
/// either fully updated or left as it was.
///
/// # Errors
///
/// [`GeotagError::WriteFailed`] if the updated image cannot be stored, plus
/// everything [`write_gps_block`] reports.
pub fn write_gps_file(source: &Path, dest: &Path, block: &GpsTagBlock) -> Result<()> {
    let original = fs::read(source).map_err(GeotagError::io(source))?;
    let updated = write_gps_block(&original, block)?;
    write_atomic(dest, &updated, source)
}

fn write_atomic(dest: &Path, contents: &[u8], permissions_from: &Path) -> Result<()> {
    let failed = |reason: String| GeotagError::WriteFailed {
        path: dest.to_path_buf(),
        reason,
    };

    let dir = dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| failed(e.to_string()))?;
    tmp.write_all(contents).map_err(|e| failed(e.to_string()))?;
    tmp.as_file().sync_all().map_err(|e| failed(e.to_string()))?;

    if let Ok(meta) = fs::metadata(permissions_from) {
        fs::set_permissions(tmp.path(), meta.permissions()).map_err(|e| failed(e.to_string()))?;
    }

    tmp.persist(dest).map_err(|e| failed(e.error.to_string()))?;
    Ok(())
}

fn dms_field(exif: &exif::Exif, tag: exif::Tag) -> Result<DmsRational> {
    let field = exif
        .get_field(tag, exif::In::PRIMARY)
        .ok_or(GeotagError::MissingGpsBlock)?;

    let parts: Vec<Rational> = match &field.value {
        exif::Value::Rational(values) => values
            .iter()
            .map(|r| Rational::new(r.num.into(), r.denom.into()))
            .collect(),
        // Some writers use signed rationals; accept them while non-negative.
        exif::Value::SRational(values) => values
            .iter()
            .map(|r| {
                match (u64::try_from(r.num), u64::try_from(r.denom)) {
                    (Ok(num), Ok(denom)) => Ok(Rational::new(num, denom)),
                    _ => Err(GeotagError::MalformedMetadata(format!(
                        "{tag} has a negative component"
                    ))),
                }
            })
            .collect::<Result<_>>()?,
        other => {
            return Err(GeotagError::MalformedMetadata(format!(
                "{tag} has unexpected type: {other:?}"
            )))
        }
    };

    match parts.as_slice() {
        [degrees, minutes, seconds] => Ok(DmsRational {
            degrees: *degrees,
            minutes: *minutes,
            seconds: *seconds,
        }),
        _ => Err(GeotagError::MalformedMetadata(format!(
            "{tag} has {} components, expected 3",
            parts.len()
        ))),
    }
}

fn reference_field(exif: &exif::Exif, tag: exif::Tag) -> Result<char> {
    let field = exif
        .get_field(tag, exif::In::PRIMARY)
        .ok_or(GeotagError::MissingGpsBlock)?;

    match &field.value {
        exif::Value::Ascii(strings) => strings
            .first()
            .and_then(|s| s.first())
            .map(|&b| char::from(b))
            .ok_or_else(|| GeotagError::MalformedMetadata(format!("{tag} is empty"))),
        other => Err(GeotagError::MalformedMetadata(format!(
            "{tag} has unexpected type: {other:?}"
        ))),
    }
}

fn exif_rationals(dms: &DmsRational) -> Result<Vec<uR64>> {
    [dms.degrees, dms.minutes, dms.seconds]
        .into_iter()
        .map(|r| {
            let out_of_range = || GeotagError::RationalOutOfRange {
                value: r.to_string(),
            };
            Ok(uR64 {
                nominator: u32::try_from(r.numerator).map_err(|_| out_of_range())?,
                denominator: u32::try_from(r.denominator).map_err(|_| out_of_range())?,
            })
        })
        .collect()
}

/// `little_exif` can panic on unexpected input, so both calls into it are
/// guarded and turned into metadata errors.
fn load_metadata(image: &[u8]) -> Result<Metadata> {
    let buffer = image.to_vec();
    panic::catch_unwind(AssertUnwindSafe(|| {
        Metadata::new_from_vec(&buffer, FileExtension::JPEG)
    }))
    .map_err(|_| GeotagError::MalformedMetadata("EXIF decoder panicked".to_string()))?
    .map_err(|e| GeotagError::MalformedMetadata(format!("cannot decode existing EXIF: {e:?}")))
}

fn encode_segment(metadata: &Metadata) -> Result<Vec<u8>> {
    let encoded = panic::catch_unwind(AssertUnwindSafe(|| {
        metadata.as_u8_vec(FileExtension::JPEG)
    }))
    .map_err(|_| GeotagError::MalformedMetadata("EXIF encoder panicked".to_string()))?
    .map_err(|e| GeotagError::MalformedMetadata(format!("cannot encode EXIF: {e:?}")))?;

    app1_segment(encoded)
}

/// Normalizes encoder output into a complete APP1 segment.
pub(crate) fn app1_segment(encoded: Vec<u8>) -> Result<Vec<u8>> {
    if encoded.starts_with(&APP1) {
        return Ok(encoded);
    }

    let payload = if encoded.starts_with(EXIF_HEADER) {
        encoded
    } else {
        [EXIF_HEADER, encoded.as_slice()].concat()
    };

    let length = u16::try_from(payload.len() + 2).map_err(|_| {
        GeotagError::MalformedMetadata("EXIF block exceeds the 64 KiB segment limit".to_string())
    })?;

    let mut segment = Vec::with_capacity(payload.len() + 4);
    segment.extend_from_slice(&APP1);
    segment.extend_from_slice(&length.to_be_bytes());
    segment.extend(payload);
    Ok(segment)
}

/// Where the EXIF segment sits in a JPEG, or where a new one goes.
#[derive(Debug, PartialEq, Eq)]
struct JpegLayout {
    exif: Option<Range<usize>>,
    insert_at: usize,
}

impl JpegLayout {
    /// Walks the marker segments up to the start of scan.
    fn scan(data: &[u8]) -> Result<Self> {
        if !data.starts_with(&SOI) {
            return Err(GeotagError::MalformedMetadata(
                "not a JPEG: missing SOI marker".to_string(),
            ));
        }

        let mut pos = SOI.len();
        let mut insert_at = pos;
        let mut exif = None;

        while pos + 4 <= data.len() {
            if data[pos] != 0xFF {
                return Err(GeotagError::MalformedMetadata(format!(
                    "invalid JPEG marker at offset {pos}"
                )));
            }

            let marker = data[pos + 1];
            match marker {
                // fill byte
                0xFF => {
                    pos += 1;
                    continue;
                }
                // standalone markers
                0x01 | 0xD0..=0xD8 => {
                    pos += 2;
                    continue;
                }
                // SOS or EOI: no more metadata segments
                0xD9 | 0xDA => break,
                _ => {}
            }

            let length = usize::from(u16::from_be_bytes([data[pos + 2], data[pos + 3]]));
            let end = pos + 2 + length;
            if length < 2 || end > data.len() {
                return Err(GeotagError::MalformedMetadata(format!(
                    "truncated JPEG segment at offset {pos}"
                )));
            }

            if marker == 0xE1 && exif.is_none() && data[pos + 4..end].starts_with(EXIF_HEADER) {
                exif = Some(pos..end);
            }
            if marker == 0xE0 && insert_at == pos {
                insert_at = end;
            }

            pos = end;
        }

        Ok(Self { exif, insert_at })
    }
}
