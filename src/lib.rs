pub mod astrometry;
pub mod chart;
pub mod cli;
pub mod commands;
pub mod coordinates;
pub mod error;
pub mod fits;
pub mod normalize;
pub mod proper_motion;
pub mod server;
pub mod source_detection;
pub mod survey;

#[cfg(test)]
mod test_finding_chart;
#[cfg(test)]
mod test_utils;

// Re-export commonly used items
pub use chart::{generate_chart, ChartConfig, ChartRequest, FindingChart, OutputMode};
pub use error::{ChartError, Result};
