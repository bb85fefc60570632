//! Characteristic stellar radius of a survey image.
//!
//! The estimate runs the usual extraction pipeline: tiled background
//! subtraction, thresholding at a multiple of the global noise, connected
//! component labelling, then Kron aperture photometry and a half-light
//! radius per source. The median half-light radius of the accepted sources
//! is the image's characteristic radius, used to size chart markers.

mod aperture;
pub mod background;
pub mod extraction;

use tracing::debug;

use background::BackgroundMap;
pub use extraction::{extract_sources, DetectedSource};

/// Tuning of [`estimate_characteristic_radius_with`]
#[derive(Debug, Clone)]
pub struct RadiusEstimationParams {
    /// Background tile edge in pixels
    pub tile_size: usize,
    /// Detection threshold in units of the global background noise
    pub threshold_sigma: f64,
    /// Sources smaller than this many pixels are ignored
    pub min_pixels: usize,
    /// Kron aperture, in units of the source ellipse
    pub kron_aperture: f64,
    /// Photometry ellipse, in Kron radii
    pub kron_factor: f64,
    /// Curve-of-growth search radius, in semi-major axes
    pub flux_radius_extent: f64,
    /// Fraction of the flux enclosed by the reported radius
    pub flux_fraction: f64,
    /// More than this many measured sources are needed for a result
    pub min_sources: usize,
}

impl Default for RadiusEstimationParams {
    fn default() -> Self {
        Self {
            tile_size: background::DEFAULT_TILE_SIZE,
            threshold_sigma: 5.0,
            min_pixels: 16,
            kron_aperture: 6.0,
            kron_factor: 2.5,
            flux_radius_extent: 6.0,
            flux_fraction: 0.5,
            min_sources: 10,
        }
    }
}

/// Borrowed row-major image
#[derive(Debug, Clone, Copy)]
pub struct ImageData<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [f64],
}

impl<'a> ImageData<'a> {
    pub fn new(width: usize, height: usize, data: &'a [f64]) -> Self {
        Self {
            width,
            height,
            data,
        }
    }

    fn is_consistent(&self) -> bool {
        self.width > 0 && self.height > 0 && self.data.len() >= self.width * self.height
    }
}

/// Median half-flux radius of the stars in `image`, in pixels, or `fallback`
/// when no more than ten sources could be measured.
pub fn estimate_characteristic_radius(image: ImageData<'_>, fallback: f64) -> f64 {
    estimate_characteristic_radius_with(image, fallback, &RadiusEstimationParams::default())
}

pub fn estimate_characteristic_radius_with(
    image: ImageData<'_>,
    fallback: f64,
    params: &RadiusEstimationParams,
) -> f64 {
    if !image.is_consistent() {
        debug!("Image too small for source detection, using fallback radius");
        return fallback;
    }
    let (width, height) = (image.width, image.height);
    let data = &image.data[..width * height];

    let background = BackgroundMap::estimate(data, width, height, params.tile_size);
    let subtracted = background.subtract(data);
    let threshold = params.threshold_sigma * background.global_rms;

    let mut sources = extract_sources(&subtracted, width, height, threshold);
    let valid = measure_sources(&subtracted, width, height, &mut sources, params);

    let mut radii: Vec<f64> = sources
        .iter()
        .zip(&valid)
        .filter(|(_, &ok)| ok)
        .map(|(source, _)| source.half_flux_radius)
        .collect();

    debug!(
        "Detected {} sources above {:.3} (rms {:.3}), {} measured",
        sources.len(),
        threshold,
        background.global_rms,
        radii.len()
    );

    if radii.len() <= params.min_sources {
        debug!(
            "Only {} usable sources, using fallback radius {}",
            radii.len(),
            fallback
        );
        return fallback;
    }

    radii.sort_by(|a, b| a.total_cmp(b));
    let mid = radii.len() / 2;
    if radii.len() % 2 == 0 {
        (radii[mid - 1] + radii[mid]) / 2.0
    } else {
        radii[mid]
    }
}

/// Run the aperture measurements on every source and return which of them
/// passed. Failed sources keep NaN in the fields they did not reach.
pub fn measure_sources(
    data: &[f64],
    width: usize,
    height: usize,
    sources: &mut [DetectedSource],
    params: &RadiusEstimationParams,
) -> Vec<bool> {
    sources
        .iter_mut()
        .map(|source| measure_source(data, width, height, source, params).is_ok())
        .collect()
}

fn measure_source(
    data: &[f64],
    width: usize,
    height: usize,
    source: &mut DetectedSource,
    params: &RadiusEstimationParams,
) -> Result<(), aperture::ApertureFlag> {
    if source.npix < params.min_pixels || !(source.b > 0.0) {
        return Err(aperture::ApertureFlag::TooSmall);
    }

    source.kron_radius = aperture::kron_radius(data, width, height, source, params.kron_aperture)?;
    source.aperture_flux = aperture::sum_ellipse(
        data,
        width,
        height,
        source,
        params.kron_factor * source.kron_radius,
    )?;
    source.half_flux_radius = aperture::flux_radius(
        data,
        width,
        height,
        source,
        params.flux_radius_extent * source.a,
        params.flux_fraction,
        source.aperture_flux,
    )?;
    Ok(())
}
