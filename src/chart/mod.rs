//! Finding chart assembly.
//!
//! [`generate_chart`] runs one request end to end: parse the catalog
//! position, fetch the survey image, project the target to the output epoch
//! and to the epoch of the exposure, map both onto the image and render the
//! raster. [`assemble_chart`] is everything after the fetch.

pub mod annotate;
pub mod render;
pub mod text_render;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::astrometry::PixelPosition;
use crate::coordinates::{
    format_angle, format_ra, parse_angle, AngleUnit, CoordinateFormat, SkyPosition,
};
use crate::error::{ChartError, Result};
use crate::normalize::ScaleConvention;
use crate::proper_motion::ProperMotion;
use crate::source_detection::{estimate_characteristic_radius, ImageData};
use crate::survey::{Survey, SurveyImage, SurveyImageRequest, SurveyImageSource};

/// What a chart request produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum OutputMode {
    /// Plain raster plus marker positions for a client to draw on
    #[default]
    #[serde(rename = "json")]
    JsonSummary,
    /// Raster with markers, motion arrow, scale bar and legend burnt in
    #[serde(rename = "png")]
    AnnotatedRaster,
}

impl std::str::FromStr for OutputMode {
    type Err = ChartError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "json" | "summary" => Ok(OutputMode::JsonSummary),
            "png" | "annotated" => Ok(OutputMode::AnnotatedRaster),
            _ => Err(ChartError::InputFormat(format!("unknown output mode: {}", s))),
        }
    }
}

/// Rendering options shared by every request
#[derive(Debug, Clone)]
pub struct ChartConfig {
    /// Edge of the square output canvas in pixels
    pub canvas_size: u32,
    /// Low and high clipping percentiles
    pub clip_percentiles: (f64, f64),
    pub scale: ScaleConvention,
    /// Characteristic radius used when too few stars are measured
    pub fallback_radius: f64,
    /// Indicator size in characteristic radii
    pub indicator_factor: f64,
    /// Marker circle radius in canvas pixels
    pub marker_radius: f64,
    pub mode: OutputMode,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            canvas_size: 512,
            clip_percentiles: (1.0, 99.5),
            scale: ScaleConvention::Inverted,
            fallback_radius: 2.0,
            indicator_factor: 3.0,
            marker_radius: 10.0,
            mode: OutputMode::JsonSummary,
        }
    }
}

/// A finding chart request as the user states it
#[derive(Debug, Clone)]
pub struct ChartRequest {
    /// Decimal year the chart is for
    pub out_epoch: f64,
    pub ra: String,
    pub dec: String,
    pub format: CoordinateFormat,
    /// Catalog epoch of `ra`/`dec`
    pub epoch: f64,
    /// Proper motion in RA (great-circle), arcsec/yr
    pub pm_ra: f64,
    /// Proper motion in Dec, arcsec/yr
    pub pm_dec: f64,
    pub width_arcmin: f64,
    pub height_arcmin: f64,
    pub survey: Survey,
}

impl ChartRequest {
    /// Catalog position at the catalog epoch
    pub fn catalog_position(&self) -> Result<SkyPosition> {
        let ra_unit = match self.format {
            CoordinateFormat::Sexagesimal => AngleUnit::Hours,
            CoordinateFormat::Decimal => AngleUnit::Degrees,
        };
        let ra = parse_angle(&self.ra, self.format, ra_unit)?;
        let dec = parse_angle(&self.dec, self.format, AngleUnit::Degrees)?;
        Ok(SkyPosition::new(ra, dec, self.epoch))
    }

    pub fn proper_motion(&self) -> ProperMotion {
        ProperMotion::from_arcsec_per_year(self.pm_ra, self.pm_dec)
    }

    /// Catalog position propagated to the output epoch
    pub fn target_position(&self) -> Result<SkyPosition> {
        Ok(self
            .catalog_position()?
            .at_epoch(&self.proper_motion(), self.out_epoch))
    }

    /// Reject non-finite numbers and empty fields of view
    pub fn validate(&self) -> Result<()> {
        let numbers = [
            ("output epoch", self.out_epoch),
            ("epoch", self.epoch),
            ("RA proper motion", self.pm_ra),
            ("Dec proper motion", self.pm_dec),
        ];
        for (name, value) in numbers {
            if !value.is_finite() {
                return Err(ChartError::InputFormat(format!("{} is not a number", name)));
            }
        }
        for (name, value) in [("width", self.width_arcmin), ("height", self.height_arcmin)] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ChartError::InputFormat(format!(
                    "{} must be a positive number of arcminutes, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// A rendered chart and the numbers that describe it
#[derive(Debug, Clone)]
pub struct FindingChart {
    /// Canvas PNG
    pub png: Vec<u8>,
    /// Target RA as `H:MM:SS.ss`
    pub ra: String,
    /// Target Dec as `D:MM:SS.ss`
    pub dec: String,
    /// Canvas position of the target at the time of the exposure
    pub data_pos: [f64; 2],
    /// Canvas position of the target at the output epoch
    pub observing_pos: [f64; 2],
    pub indicator_size: f64,
    /// Survey label with the year of the exposure
    pub survey_label: String,
    pub observation_epoch: f64,
    pub target: SkyPosition,
    pub observed: SkyPosition,
}

/// The JSON document served for a chart
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartSummary {
    pub ra: String,
    pub dec: String,
    pub data_pos: [f64; 2],
    pub observing_pos: [f64; 2],
    pub indicator_size: f64,
    pub survey: String,
    /// `data:image/png;base64,...`
    pub data: String,
}

impl FindingChart {
    pub fn data_uri(&self) -> String {
        format!("data:image/png;base64,{}", STANDARD.encode(&self.png))
    }

    pub fn summary(&self) -> ChartSummary {
        ChartSummary {
            ra: self.ra.clone(),
            dec: self.dec.clone(),
            data_pos: self.data_pos,
            observing_pos: self.observing_pos,
            indicator_size: self.indicator_size,
            survey: self.survey_label.clone(),
            data: self.data_uri(),
        }
    }
}

/// Fetch the survey image for `request` and build its chart.
///
/// The downloaded file is removed before this returns, on success or failure.
pub fn generate_chart(
    request: &ChartRequest,
    source: &dyn SurveyImageSource,
    config: &ChartConfig,
) -> Result<FindingChart> {
    request.validate()?;
    let target = request.target_position()?;
    info!(
        "Generating {} chart for RA {} Dec {} at J{}",
        request.survey,
        format_ra(target.ra),
        format_angle(target.dec),
        request.out_epoch
    );

    let downloaded = source.fetch(&SurveyImageRequest {
        center: target,
        width_arcmin: request.width_arcmin,
        height_arcmin: request.height_arcmin,
        survey: request.survey,
    })?;
    let image = SurveyImage::load(downloaded.path())?;
    assemble_chart(request, &image, config)
}

/// Build the chart for `request` from an already loaded survey image
pub fn assemble_chart(
    request: &ChartRequest,
    image: &SurveyImage,
    config: &ChartConfig,
) -> Result<FindingChart> {
    let catalog = request.catalog_position()?;
    let motion = request.proper_motion();
    let target = catalog.at_epoch(&motion, request.out_epoch);
    let observed = catalog.at_epoch(&motion, image.observation_epoch);
    debug!(
        "Exposure epoch {:.3}, target moved {:.2}\" since",
        image.observation_epoch,
        angular_offset_arcsec(&observed, &target)
    );

    let pixels = image.astrometry.sky_to_pixels(&[target, observed])?;
    let (target_px, observed_px) = (pixels[0], pixels[1]);
    debug!(
        "Target at pixel ({:.2}, {:.2}), {:.2}px from its exposure-epoch position",
        target_px.x,
        target_px.y,
        target_px.distance_to(&observed_px)
    );

    let radius = estimate_characteristic_radius(
        ImageData::new(image.width, image.height, &image.data),
        config.fallback_radius,
    );

    let mut raster = render::render_raster(
        &image.data,
        image.width,
        image.height,
        config.canvas_size,
        config.clip_percentiles,
        config.scale,
    )?;

    let canvas = config.canvas_size as f64;
    let scale_x = canvas / image.width as f64;
    let scale_y = canvas / image.height as f64;
    let to_canvas = |p: PixelPosition| [p.x * scale_x, canvas - p.y * scale_y];
    let observing_pos = to_canvas(target_px);
    let data_pos = to_canvas(observed_px);

    let ra = format_ra(target.ra);
    let dec = format_angle(target.dec);

    if config.mode == OutputMode::AnnotatedRaster {
        annotate::draw_markers(&mut raster, data_pos, observing_pos, config.marker_radius);
        annotate::draw_motion_arrow(&mut raster, data_pos, observing_pos, config.marker_radius);

        let arcsec_per_px = match image.plate_scale_arcsec {
            Some(scale) => scale,
            None => {
                warn!("No physical plate scale in header, using the WCS pixel scale");
                image.astrometry.pixel_scale_arcsec()
            }
        };
        if !annotate::draw_scale_bar(&mut raster, 60.0 * scale_x / arcsec_per_px) {
            warn!(
                "One arcminute does not fit a {}px canvas at {:.3}\"/px, scale bar skipped",
                config.canvas_size, arcsec_per_px
            );
        }
        annotate::draw_legend(
            &mut raster,
            &[
                format!("J{}  RA: {}", request.out_epoch, ra),
                format!("J{} Dec: {}", request.out_epoch, dec),
            ],
        );
    }

    let png = render::encode_png(&raster)?;
    let survey_label = format!("{} ({})", request.survey.label(), image.observation_year());
    info!(
        "Chart ready: {} bytes, {}, characteristic radius {:.2}px",
        png.len(),
        survey_label,
        radius
    );

    Ok(FindingChart {
        png,
        ra,
        dec,
        data_pos,
        observing_pos,
        indicator_size: config.indicator_factor * radius * scale_x,
        survey_label,
        observation_epoch: image.observation_epoch,
        target,
        observed,
    })
}

/// Small-angle separation between two positions
fn angular_offset_arcsec(a: &SkyPosition, b: &SkyPosition) -> f64 {
    let cos_dec = a.dec.to_radians().cos();
    ((b.ra - a.ra) * cos_dec).hypot(b.dec - a.dec) * 3600.0
}
