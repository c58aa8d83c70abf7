//! The ground-truth table mapping location keys to coordinates.

use std::{
    collections::HashMap,
    fs::File,
    io::{Read, Write},
    path::Path,
};

use serde::{Deserialize, Serialize};

use crate::{
    coordinate::DecimalCoordinate,
    error::{GeotagError, Result},
};

/// One row of the reference table. Either coordinate may be absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceRecord {
    pub location: String,
    pub latitude: Option<DecimalCoordinate>,
    pub longitude: Option<DecimalCoordinate>,
}

impl ReferenceRecord {
    /// Both coordinates, or [`GeotagError::MissingCoordinate`] if either is absent.
    ///
    /// # Errors
    ///
    /// See above.
    pub fn coordinates(&self) -> Result<(&DecimalCoordinate, &DecimalCoordinate)> {
        match (&self.latitude, &self.longitude) {
            (Some(lat), Some(lon)) => Ok((lat, lon)),
            _ => Err(GeotagError::MissingCoordinate {
                location: self.location.clone(),
            }),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
struct Row {
    #[serde(rename = "Location")]
    location: String,
    #[serde(rename = "Rec Lat", default)]
    latitude: String,
    #[serde(rename = "Rec Lon", default)]
    longitude: String,
}

/// Reference records keyed by uppercased location.
#[derive(Debug, Clone, Default)]
pub struct ReferenceTable {
    records: HashMap<String, ReferenceRecord>,
}

impl ReferenceTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalized form used for both storage and lookup.
    #[must_use]
    pub fn normalize_key(location: &str) -> String {
        location.trim().to_uppercase()
    }

    /// Parses a `Location, Rec Lat, Rec Lon` table.
    ///
    /// Blank coordinate fields become `None`. Rows with a blank location are
    /// ignored; a repeated location replaces the earlier row.
    ///
    /// # Errors
    ///
    /// CSV errors, or [`GeotagError::InvalidDecimal`] for a non-numeric coordinate.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);

        let mut table = Self::new();
        for row in csv.deserialize::<Row>() {
            let row = row?;
            if row.location.is_empty() {
                log::debug!("Skipping reference row without a location");
                continue;
            }

            let record = ReferenceRecord {
                latitude: parse_optional(&row.location, &row.latitude)?,
                longitude: parse_optional(&row.location, &row.longitude)?,
                location: row.location,
            };
            if let Some(previous) = table.insert(record) {
                log::warn!("Duplicate reference location {}", previous.location);
            }
        }

        log::debug!("Loaded {} reference locations", table.len());
        Ok(table)
    }

    /// # Errors
    ///
    /// I/O failures plus everything [`Self::from_reader`] reports.
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(GeotagError::io(path))?;
        Self::from_reader(file)
    }

    /// Inserts a record, returning the one it replaced.
    pub fn insert(&mut self, record: ReferenceRecord) -> Option<ReferenceRecord> {
        self.records
            .insert(Self::normalize_key(&record.location), record)
    }

    /// # Errors
    ///
    /// [`GeotagError::ReferenceLookupMiss`] if no row has this location.
    pub fn lookup(&self, location: &str) -> Result<&ReferenceRecord> {
        self.records
            .get(&Self::normalize_key(location))
            .ok_or_else(|| GeotagError::ReferenceLookupMiss {
                location: location.to_string(),
            })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Writes the table sorted by location, absent coordinates as empty fields.
    ///
    /// # Errors
    ///
    /// CSV or I/O errors from the underlying writer.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv = csv::Writer::from_writer(writer);

        let mut records: Vec<&ReferenceRecord> = self.records.values().collect();
        records.sort_by(|a, b| a.location.cmp(&b.location));

        for record in records {
            csv.serialize(Row {
                location: record.location.clone(),
                latitude: record
                    .latitude
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default(),
                longitude: record
                    .longitude
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default(),
            })?;
        }

        csv.flush().map_err(|e| GeotagError::Csv(e.into()))?;
        Ok(())
    }

    /// # Errors
    ///
    /// I/O failures plus everything [`Self::write_csv`] reports.
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(GeotagError::io(path))?;
        self.write_csv(file)
    }
}

fn parse_optional(location: &str, value: &str) -> Result<Option<DecimalCoordinate>> {
    if value.is_empty() {
        return Ok(None);
    }
    value.parse().map(Some).inspect_err(|_| {
        log::error!("Reference row {location} has an invalid coordinate {value:?}");
    })
}
