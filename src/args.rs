use clap::{Args, Parser, Subcommand};
use cuaca::render::OutputFormat;
use cuaca::weather::SourcePreference;
use std::path::PathBuf;

/// CLI arguments for cuaca
#[derive(Debug, Parser)]
#[command(
    name = "cuaca",
    version,
    about = "Weather forecasts for Indonesian regions (BMKG, Open-Meteo, MET Norway)"
)]
pub struct CliArgs {
    /// Configuration file (default: ~/.config/cuaca/config.toml)
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Region table CSV with columns kode,nama[,lat,lon]
    #[arg(short = 'r', long = "regions", global = true)]
    pub regions: Option<PathBuf>,

    /// Debug logging on stderr
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    /// Do not read or write the persistent cache
    #[arg(long = "no-cache", global = true)]
    pub no_cache: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by commands that match region names
#[derive(Debug, Args)]
pub struct MatchArgs {
    /// Narrow the match by an enclosing region, e.g. a district name
    #[arg(long)]
    pub hint: Option<String>,

    /// substring, fuzzy or auto (default from config)
    #[arg(long)]
    pub strategy: Option<String>,

    /// Similarity cutoff for fuzzy matching (0.0 - 1.0)
    #[arg(long)]
    pub cutoff: Option<f64>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Search the region table
    Search {
        /// Region name; "desa, kecamatan" narrows by the part after the comma
        query: String,

        #[command(flatten)]
        matching: MatchArgs,

        /// Print candidates as JSON
        #[arg(long)]
        json: bool,
    },

    /// Forecast for a region name or a coordinate pair
    Forecast {
        /// Region name; "desa, kecamatan" narrows by the part after the comma
        #[arg(required_unless_present = "lat")]
        query: Option<String>,

        #[command(flatten)]
        matching: MatchArgs,

        /// Candidate number when the name is ambiguous (see `cuaca search`)
        #[arg(short = 'p', long)]
        pick: Option<usize>,

        /// Latitude, instead of a region name
        #[arg(long, allow_negative_numbers = true, requires = "lon", conflicts_with = "query")]
        lat: Option<f64>,

        /// Longitude, instead of a region name
        #[arg(long, allow_negative_numbers = true, requires = "lat")]
        lon: Option<f64>,

        /// auto, bmkg, open-meteo or met-no
        #[arg(short = 's', long, default_value = "auto")]
        source: SourcePreference,

        #[arg(short = 'f', long, value_enum, default_value_t)]
        format: OutputFormat,

        /// Narrative language: id or en (default from config)
        #[arg(long)]
        lang: Option<String>,

        /// METAR station (ICAO) instead of the nearest one
        #[arg(long)]
        station: Option<String>,

        /// Skip the METAR observation
        #[arg(long, conflicts_with = "station")]
        no_metar: bool,
    },

    /// Latest METAR observation
    Metar {
        /// ICAO code, e.g. WARR; nearest to --lat/--lon when omitted
        #[arg(required_unless_present = "lat")]
        station: Option<String>,

        #[arg(long, allow_negative_numbers = true, requires = "lon", conflicts_with = "station")]
        lat: Option<f64>,

        #[arg(long, allow_negative_numbers = true, requires = "lat")]
        lon: Option<f64>,
    },

    /// Geocode rows without coordinates and write kode,nama,lat,lon
    Enrich {
        /// Output CSV
        #[arg(short = 'o', long)]
        output: PathBuf,

        /// Region appended to each query (default from config)
        #[arg(long)]
        region: Option<String>,
    },

    /// Show region names from the table
    Regions {
        /// Number of names to show
        #[arg(short = 'n', long, default_value_t = 20)]
        count: usize,

        /// List the direct children of this code instead, e.g. 35.15
        #[arg(long)]
        under: Option<String>,
    },
}
