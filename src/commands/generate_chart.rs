use anyhow::{Context, Result};
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

use crate::chart::{generate_chart, ChartConfig, ChartRequest, OutputMode};
use crate::survey::{ArchiveConfig, DssArchive, LocalFitsSource, SurveyImageSource};

/// Generate one chart and write it as PNG or JSON.
///
/// JSON without an output path is written to `out`, which carries nothing
/// else so it stays parseable.
pub fn generate_chart_file(
    request: &ChartRequest,
    config: &ChartConfig,
    archive: ArchiveConfig,
    fits: Option<String>,
    output: Option<String>,
    out: &mut impl Write,
) -> Result<()> {
    let source: Box<dyn SurveyImageSource> = match fits {
        Some(path) => Box::new(LocalFitsSource::new(path)),
        None => Box::new(DssArchive::new(archive)),
    };

    let chart = generate_chart(request, source.as_ref(), config)
        .context("Failed to generate finding chart")?;

    info!("Target: RA {}  Dec {}", chart.ra, chart.dec);
    info!("Survey: {}", chart.survey_label);
    info!(
        "Positions: observing ({:.1}, {:.1}), in image ({:.1}, {:.1})",
        chart.observing_pos[0], chart.observing_pos[1], chart.data_pos[0], chart.data_pos[1]
    );

    match config.mode {
        OutputMode::AnnotatedRaster => {
            let output_path = PathBuf::from(output.unwrap_or_else(|| "chart.png".to_string()));
            std::fs::write(&output_path, &chart.png)
                .with_context(|| format!("Failed to save PNG to: {}", output_path.display()))?;
            info!("Saved chart to: {}", output_path.display());
        }
        OutputMode::JsonSummary => {
            let json = serde_json::to_string_pretty(&chart.summary())?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("Failed to save JSON to: {}", path))?;
                    info!("Saved chart to: {}", path);
                }
                None => {
                    writeln!(out, "{}", json).context("Failed to write JSON output")?;
                    out.flush()?;
                }
            }
        }
    }

    Ok(())
}
