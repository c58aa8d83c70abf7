use std::{path::PathBuf, process::ExitCode};

use clap::{Parser, Subcommand};
use geotagger::{
    process_routes, visit_images, GeotagConfig, GeotagError, Geotagger, Mode, ReferenceTable,
};

/// Embed reference GPS coordinates into photos and validate them
#[derive(Parser)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// TOML file overriding precision, hemisphere and file selection
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Number of worker threads
    #[arg(short, long, global = true)]
    jobs: Option<usize>,
    /// Print the report as JSON instead of a text summary
    #[arg(long, global = true, action)]
    json: bool,
    #[arg(short, long, global = true, action)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write reference coordinates into every image of a directory
    Write {
        /// Directory containing the images
        #[arg(short, long)]
        images: PathBuf,
        /// Reference table with `Location`, `Rec Lat` and `Rec Lon` columns
        #[arg(short, long)]
        reference: PathBuf,
        /// Write tagged copies here instead of modifying images in place
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Compare the coordinates embedded in every image against the reference
    Validate {
        #[arg(short, long)]
        images: PathBuf,
        #[arg(short, long)]
        reference: PathBuf,
    },
    /// Copy, write and validate each route folder under a root directory
    Routes { root: PathBuf },
}

fn init_logger(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    let mut builder = pretty_env_logger::formatted_builder();
    builder.filter_level(level);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    builder.init();
}

fn load_config(cli: &Cli) -> Result<GeotagConfig, GeotagError> {
    let mut config = match &cli.config {
        Some(path) => GeotagConfig::load(path)?,
        None => GeotagConfig::default(),
    };
    if let Some(jobs) = cli.jobs {
        config.jobs = jobs;
        config.validate()?;
    }
    log::debug!("Using {config:?}");
    Ok(config)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), GeotagError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| GeotagError::Config(format!("cannot serialize report: {e}")))?;
    println!("{text}");
    Ok(())
}

fn run(cli: &Cli) -> Result<bool, GeotagError> {
    let config = load_config(cli)?;

    match &cli.command {
        Commands::Write {
            images,
            reference,
            output,
        } => {
            if let Some(output) = output {
                std::fs::create_dir_all(output).map_err(GeotagError::io(output))?;
            }
            let geotagger = Geotagger::new(config, ReferenceTable::from_path(reference)?);
            let report = geotagger.run(&visit_images(images)?, output.as_deref(), Mode::Write);
            if cli.json {
                print_json(&report)?;
            } else {
                print!("{report}");
            }
            Ok(!report.has_problems())
        }
        Commands::Validate { images, reference } => {
            let geotagger = Geotagger::new(config, ReferenceTable::from_path(reference)?);
            let report = geotagger.run(&visit_images(images)?, None, Mode::Validate);
            if cli.json {
                print_json(&report)?;
            } else {
                print!("{report}");
            }
            Ok(!report.has_problems())
        }
        Commands::Routes { root } => {
            let routes = process_routes(root, &config)?;
            if cli.json {
                print_json(&routes)?;
            } else {
                for route in &routes {
                    println!("{route}");
                }
            }
            Ok(routes.iter().all(|route| {
                route
                    .report
                    .as_ref()
                    .is_some_and(|report| !report.has_problems())
            }))
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
