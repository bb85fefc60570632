use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "findingchart")]
#[command(
    about = "Proper-motion corrected finding charts on Digitized Sky Survey images",
    long_about = None
)]
pub struct Cli {
    /// Survey cut-out service
    #[arg(long, global = true, default_value = crate::survey::DEFAULT_ARCHIVE_URL)]
    pub archive_url: String,

    /// Download timeout in seconds
    #[arg(long, global = true, default_value = "60")]
    pub fetch_timeout: u64,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate one finding chart and write it to a file
    Chart {
        /// Epoch of the chart (decimal year)
        #[arg(allow_hyphen_values = true)]
        out_year: f64,

        /// Right ascension, H:M:S (or degrees with --format decimal)
        #[arg(allow_hyphen_values = true)]
        ra: String,

        /// Declination, D:M:S (or degrees with --format decimal)
        #[arg(allow_hyphen_values = true)]
        dec: String,

        /// Epoch of the catalog coordinates (decimal year)
        #[arg(allow_hyphen_values = true)]
        epoch: f64,

        /// Proper motion in RA, arcsec/yr on the sky
        #[arg(allow_hyphen_values = true)]
        pmra: f64,

        /// Proper motion in Dec, arcsec/yr
        #[arg(allow_hyphen_values = true)]
        pmdec: f64,

        /// Field width in arcmin
        width: f64,

        /// Field height in arcmin
        height: f64,

        /// Survey (poss2ukstu_red, poss2ukstu_ir, poss2ukstu_blue, poss1_blue,
        /// poss1_red, quickv, phase2_gsc2, phase2_gsc1)
        #[arg(default_value = "poss2ukstu_red")]
        survey: String,

        /// Output file (default: chart.png, or stdout for json)
        #[arg(short, long)]
        output: Option<String>,

        /// Output mode (png, json)
        #[arg(short, long, default_value = "png")]
        mode: String,

        /// Coordinate format (sexagesimal, decimal)
        #[arg(short, long, default_value = "sexagesimal")]
        format: String,

        /// Use a local FITS file instead of downloading
        #[arg(long)]
        fits: Option<String>,

        #[command(flatten)]
        render: RenderOptions,
    },

    /// Serve the chart API over HTTP
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Directory with a front end to serve
        #[arg(long)]
        static_dir: Option<String>,

        #[command(flatten)]
        render: RenderOptions,
    },
}

#[derive(Parser, Debug, Clone)]
pub struct RenderOptions {
    /// Edge of the square chart in pixels
    #[arg(long, default_value = "512")]
    pub canvas_size: u32,

    /// Lower clipping percentile
    #[arg(long, default_value = "1.0")]
    pub low_percentile: f64,

    /// Upper clipping percentile
    #[arg(long, default_value = "99.5")]
    pub high_percentile: f64,

    /// Render stars white on a black sky
    #[arg(long)]
    pub no_invert: bool,
}

impl RenderOptions {
    pub fn to_chart_config(&self) -> crate::chart::ChartConfig {
        crate::chart::ChartConfig {
            canvas_size: self.canvas_size,
            clip_percentiles: (self.low_percentile, self.high_percentile),
            scale: if self.no_invert {
                crate::normalize::ScaleConvention::Standard
            } else {
                crate::normalize::ScaleConvention::Inverted
            },
            ..Default::default()
        }
    }
}
