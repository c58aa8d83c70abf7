use std::{
    fs,
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
    thread,
};

pub use config::GeotagConfig;
pub use coordinate::{
    compare_coordinates, decimal_to_dms, dms_to_decimal, Axis, DecimalCoordinate, DmsRational,
    HemispherePair, Precision, Rational,
};
pub use error::{GeotagError, Result};
pub use gps_tags::{read_gps_block, read_gps_file, write_gps_block, write_gps_file, GpsTagBlock};
pub use reference::{ReferenceRecord, ReferenceTable};
pub use report::{
    Counts, EmbeddedCoordinates, ImageReport, ImageStatus, Mode, RouteReport, RunReport,
    ValidationOutcome,
};

pub mod config;
pub mod coordinate;
pub mod error;
pub mod gps_tags;
pub mod reference;
pub mod report;

#[cfg(test)]
mod test_utils;

/// Name of the per-route reference table.
pub const ROUTE_REFERENCE_FILE: &str = "GPSData.csv";
/// Per-route folder holding the original images.
pub const ROUTE_IMAGES_DIR: &str = "Images";
/// Per-route folder receiving tagged copies.
pub const ROUTE_OUTPUT_DIR: &str = "imagesWithGPS";

/// Writes reference coordinates into images and checks them back.
pub struct Geotagger {
    config: GeotagConfig,
    reference: ReferenceTable,
}

impl Geotagger {
    pub fn new(config: GeotagConfig, reference: ReferenceTable) -> Geotagger {
        Geotagger { config, reference }
    }

    pub fn config(&self) -> &GeotagConfig {
        &self.config
    }

    /// Writes the reference coordinates for `location` from `source` into `dest`.
    ///
    /// Returns [`ImageStatus::Missing`] without touching any file when the
    /// reference row has no coordinates.
    ///
    /// # Errors
    ///
    /// Lookup misses and any tag store failure. `dest` is left unmodified on error.
    pub fn write_image(
        &self,
        source: &Path,
        dest: &Path,
        location: &str,
    ) -> Result<ImageStatus> {
        let record = self.reference.lookup(location)?;
        let (lat, lon) = match record.coordinates() {
            Ok(coordinates) => coordinates,
            Err(GeotagError::MissingCoordinate { .. }) => {
                log::debug!("Missing coordinates for location {location}, not writing");
                return Ok(ImageStatus::Missing);
            }
            Err(e) => return Err(e),
        };

        self.warn_on_sign(location, Axis::Latitude, lat);
        self.warn_on_sign(location, Axis::Longitude, lon);

        let block = GpsTagBlock::from_coordinates(
            lat,
            lon,
            &self.config.hemisphere,
            &self.config.precision,
        )?;
        log::debug!(
            "Set {location} GPS to {} {}, {} {}",
            block.latitude,
            block.latitude_ref,
            block.longitude,
            block.longitude_ref
        );

        gps_tags::write_gps_file(source, dest, &block)?;
        Ok(ImageStatus::Written)
    }

    /// Compares the coordinates embedded in `path` with the reference for `location`.
    ///
    /// The decoded values are signed by the configured hemisphere. The reference
    /// latitude is compared as stored, so a latitude on the other side of the
    /// equator is a mismatch. The reference longitude is taken as a magnitude in
    /// the configured hemisphere, which lets a table of bare western longitudes
    /// match what [`Self::write_image`] wrote. A block whose reference
    /// characters differ from the configured hemisphere is a mismatch.
    ///
    /// # Errors
    ///
    /// Lookup misses and any tag store or codec failure.
    pub fn validate_image(&self, path: &Path, location: &str) -> Result<ImageStatus> {
        let record = self.reference.lookup(location)?;
        let (lat, lon) = match record.coordinates() {
            Ok(coordinates) => coordinates,
            Err(GeotagError::MissingCoordinate { .. }) => {
                log::debug!("Missing GPS data for {location}");
                return Ok(ImageStatus::Missing);
            }
            Err(e) => return Err(e),
        };

        let block = gps_tags::read_gps_file(path)?;
        let hemisphere = &self.config.hemisphere;
        let places = self.config.precision.decimal_places;

        let embedded = EmbeddedCoordinates {
            latitude: hemisphere.signed(Axis::Latitude, &dms_to_decimal(&block.latitude)?),
            longitude: hemisphere.signed(Axis::Longitude, &dms_to_decimal(&block.longitude)?),
        };
        let expected_lat = lat.clone();
        let expected_lon = hemisphere.signed(Axis::Longitude, lon);

        let refs_agree = block.latitude_ref == hemisphere.reference(Axis::Latitude)
            && block.longitude_ref == hemisphere.reference(Axis::Longitude);
        let lat_agrees = compare_coordinates(&embedded.latitude, &expected_lat, places);
        let lon_agrees = compare_coordinates(&embedded.longitude, &expected_lon, places);

        log::debug!(
            "{location}: image {} {} / {} {}, reference {expected_lat} / {expected_lon}",
            embedded.latitude,
            block.latitude_ref,
            embedded.longitude,
            block.longitude_ref
        );

        if refs_agree && lat_agrees && lon_agrees {
            Ok(ImageStatus::Matched { embedded })
        } else {
            if !hemisphere.agrees_with(Axis::Latitude, lat) {
                log::warn!(
                    "{location}: reference latitude {lat} lies outside hemisphere {}",
                    hemisphere.latitude
                );
            }
            if !refs_agree {
                log::warn!(
                    "{location}: image hemisphere {}/{} differs from configured {}/{}",
                    block.latitude_ref,
                    block.longitude_ref,
                    hemisphere.latitude,
                    hemisphere.longitude
                );
            }
            Ok(ImageStatus::Mismatched { embedded })
        }
    }

    /// Processes one eligible image. Errors are recorded in the report, never propagated.
    pub fn process_path(&self, source: &Path, dest: &Path, mode: Mode) -> ImageReport {
        let file = file_name(source);
        let location = location_key(&file);
        log::debug!("Processing location {location} from {}", source.display());

        let status = match self.process_inner(source, dest, &location, mode) {
            Ok(status) => status,
            Err(e) => {
                match &e {
                    GeotagError::ReferenceLookupMiss { .. } => {
                        log::error!("{file}: {e}");
                    }
                    GeotagError::WriteFailed { .. } | GeotagError::MalformedMetadata(_) => {
                        log::error!("{file} left unmodified: {e}");
                    }
                    _ => log::warn!("{file}: {e}"),
                }
                ImageStatus::Failed {
                    kind: e.kind().to_string(),
                    message: e.to_string(),
                }
            }
        };

        ImageReport {
            file,
            location,
            status,
        }
    }

    fn process_inner(
        &self,
        source: &Path,
        dest: &Path,
        location: &str,
        mode: Mode,
    ) -> Result<ImageStatus> {
        match mode {
            Mode::Write => self.write_image(source, dest, location),
            Mode::Validate => self.validate_image(source, location),
            Mode::WriteAndValidate => match self.write_image(source, dest, location)? {
                ImageStatus::Written => self.validate_image(dest, location),
                status => Ok(status),
            },
        }
    }

    /// Processes `paths` on a bounded pool of worker threads.
    ///
    /// Ineligible files are listed as skipped. With `output`, each image is
    /// written to a file of the same name there; otherwise in place. The
    /// report keeps the input order.
    pub fn run(&self, paths: &[PathBuf], output: Option<&Path>, mode: Mode) -> RunReport {
        let (eligible, skipped): (Vec<&PathBuf>, Vec<&PathBuf>) = paths
            .iter()
            .partition(|path| self.config.is_eligible(&file_name(path)));

        let skipped: Vec<String> = skipped
            .into_iter()
            .map(|path| {
                let name = file_name(path);
                log::info!("Skipping {name}");
                name
            })
            .collect();

        let jobs: Vec<(&Path, PathBuf)> = eligible
            .into_iter()
            .map(|source| {
                let dest = match output {
                    Some(dir) => dir.join(file_name(source)),
                    None => source.clone(),
                };
                (source.as_path(), dest)
            })
            .collect();

        log::info!(
            "Processing {} images ({} skipped) with {} workers",
            jobs.len(),
            skipped.len(),
            self.config.jobs.min(jobs.len()).max(1)
        );

        let images = self.run_pool(&jobs, mode);
        RunReport::new(mode, images, skipped)
    }

    fn run_pool(&self, jobs: &[(&Path, PathBuf)], mode: Mode) -> Vec<ImageReport> {
        let next = AtomicUsize::new(0);
        let workers = self.config.jobs.min(jobs.len()).max(1);

        let mut results: Vec<(usize, ImageReport)> = thread::scope(|scope| {
            let mut handles = Vec::with_capacity(workers);
            for _ in 0..workers {
                handles.push(scope.spawn(|| {
                    let mut local = Vec::new();
                    loop {
                        let index = next.fetch_add(1, Ordering::Relaxed);
                        let Some((source, dest)) = jobs.get(index) else {
                            break;
                        };
                        local.push((index, self.process_path(source, dest, mode)));
                    }
                    local
                }));
            }

            handles
                .into_iter()
                .flat_map(|handle| {
                    handle.join().unwrap_or_else(|_| {
                        log::error!("Worker thread panicked; its images are unreported");
                        Vec::new()
                    })
                })
                .collect()
        });

        results.sort_by_key(|(index, _)| *index);
        results.into_iter().map(|(_, report)| report).collect()
    }

    fn warn_on_sign(&self, location: &str, axis: Axis, value: &DecimalCoordinate) {
        let hemisphere = &self.config.hemisphere;
        if !hemisphere.agrees_with(axis, value) {
            log::warn!(
                "{location}: {axis} {value} is stored under hemisphere {}",
                hemisphere.reference(axis)
            );
        }
    }
}

/// Location key of an image: the part of its file name before the first `-`,
/// uppercased. A name without a `-` is used whole, extension included.
pub fn location_key(file_name: &str) -> String {
    let key = file_name.split('-').next().unwrap_or(file_name);
    ReferenceTable::normalize_key(key)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Lists the files directly inside `dir`, sorted by name.
///
/// # Errors
///
/// [`GeotagError::Discovery`] if the directory cannot be walked.
pub fn visit_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let discovery = |reason: String| GeotagError::Discovery {
        path: dir.to_path_buf(),
        reason,
    };

    if !dir.is_dir() {
        return Err(discovery("not a directory".to_string()));
    }

    let walker = globwalk::GlobWalkerBuilder::from_patterns(dir, &["*"])
        .max_depth(1)
        .file_type(globwalk::FileType::FILE)
        .build()
        .map_err(|e| discovery(e.to_string()))?;

    let mut paths = walker
        .map(|entry| {
            entry
                .map(|entry| entry.into_path())
                .map_err(|e| discovery(e.to_string()))
        })
        .collect::<Result<Vec<_>>>()?;
    paths.sort();
    Ok(paths)
}

/// Writes and validates every route under `root`.
///
/// Each immediate subdirectory is a route with an `Images/` folder and a
/// `GPSData.csv` table. Images are copied into `imagesWithGPS/`, and the
/// copies are tagged then checked. A broken route is reported and the
/// remaining routes still run.
///
/// # Errors
///
/// Only if `root` itself cannot be listed.
pub fn process_routes(root: &Path, config: &GeotagConfig) -> Result<Vec<RouteReport>> {
    let mut routes: Vec<PathBuf> = fs::read_dir(root)
        .map_err(GeotagError::io(root))?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.is_dir())
        .collect();
    routes.sort();

    Ok(routes
        .iter()
        .map(|route| {
            let name = file_name(route);
            log::info!("Processing route {name}");
            match process_route(route, config) {
                Ok(report) => RouteReport {
                    route: name,
                    report: Some(report),
                    error: None,
                },
                Err(e) => {
                    log::error!("Route {name} skipped: {e}");
                    RouteReport {
                        route: name,
                        report: None,
                        error: Some(e.to_string()),
                    }
                }
            }
        })
        .collect())
}

fn process_route(route: &Path, config: &GeotagConfig) -> Result<RunReport> {
    let reference = ReferenceTable::from_path(&route.join(ROUTE_REFERENCE_FILE))?;

    let output = route.join(ROUTE_OUTPUT_DIR);
    fs::create_dir_all(&output).map_err(GeotagError::io(&output))?;

    let mut copies = Vec::new();
    let mut copy_failures = Vec::new();
    let mut uncopied_skipped = Vec::new();
    for image in visit_images(&route.join(ROUTE_IMAGES_DIR))? {
        let name = file_name(&image);
        let dest = output.join(&name);
        match fs::copy(&image, &dest) {
            Ok(_) => copies.push(dest),
            Err(source) => {
                let e = GeotagError::io(&dest)(source);
                log::error!("{name} not copied: {e}");
                if !config.is_eligible(&name) {
                    uncopied_skipped.push(name);
                    continue;
                }
                copy_failures.push(ImageReport {
                    location: location_key(&name),
                    file: name,
                    status: ImageStatus::Failed {
                        kind: e.kind().to_string(),
                        message: e.to_string(),
                    },
                });
            }
        }
    }
    log::info!("Copied {} files into {}", copies.len(), output.display());

    let geotagger = Geotagger::new(config.clone(), reference);
    let report = geotagger.run(&copies, None, Mode::WriteAndValidate);
    if copy_failures.is_empty() && uncopied_skipped.is_empty() {
        return Ok(report);
    }

    let mut images = report.images;
    images.extend(copy_failures);
    images.sort_by(|a, b| a.file.cmp(&b.file));
    let mut skipped = report.skipped;
    skipped.extend(uncopied_skipped);
    skipped.sort();
    Ok(RunReport::new(report.mode, images, skipped))
}
