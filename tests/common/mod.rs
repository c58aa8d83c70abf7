use std::{
    fs,
    path::{Path, PathBuf},
};

/// Smallest JPEG the tag store accepts: SOI, JFIF APP0, one scan and EOI.
pub const PLAIN_JPEG: &[u8] = &[
    0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00, 0x01, 0x01, 0x00, 0x00,
    0x01, 0x00, 0x01, 0x00, 0x00, 0xFF, 0xDA, 0x00, 0x08, 0x01, 0x01, 0x00, 0x00, 0x3F, 0x00,
    0x12, 0x34, 0xFF, 0xD9,
];

pub const REFERENCE: &str = "\
Location,Rec Lat,Rec Lon
LOC1,38.529057,77.302862
LOC2,,
LOC3,39.0,76.5
";

/// Creates `names` as untagged JPEGs in `dir`, returning their paths.
pub fn plain_images(dir: &Path, names: &[&str]) -> Vec<PathBuf> {
    names
        .iter()
        .map(|name| {
            let path = dir.join(name);
            fs::write(&path, PLAIN_JPEG).unwrap();
            path
        })
        .collect()
}
