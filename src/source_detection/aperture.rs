//! Elliptical and circular aperture measurements around detected sources.

use super::extraction::DetectedSource;

/// Subsamples per pixel side for partial pixel coverage
const SUBPIX: usize = 5;
/// Radial bins used to build the curve of growth
const GROWTH_BINS: usize = 128;

/// Why a measurement was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ApertureFlag {
    /// The aperture runs off the image
    Truncated,
    /// The aperture covers a blank (non-finite) pixel
    Blank,
    /// The enclosed flux is zero or negative
    NonPositive,
    /// Too few pixels, or a degenerate shape
    TooSmall,
}

/// Quadratic form of an ellipse: cxx dx^2 + cyy dy^2 + cxy dx dy = 1 on the
/// boundary of the unit (a, b, theta) ellipse
#[derive(Debug, Clone, Copy)]
struct EllipseForm {
    cxx: f64,
    cyy: f64,
    cxy: f64,
}

impl EllipseForm {
    fn new(a: f64, b: f64, theta: f64) -> Self {
        let (sin_t, cos_t) = theta.sin_cos();
        let (a2, b2) = (a * a, b * b);
        Self {
            cxx: cos_t * cos_t / a2 + sin_t * sin_t / b2,
            cyy: sin_t * sin_t / a2 + cos_t * cos_t / b2,
            cxy: 2.0 * cos_t * sin_t * (1.0 / a2 - 1.0 / b2),
        }
    }

    fn radius_squared(&self, dx: f64, dy: f64) -> f64 {
        self.cxx * dx * dx + self.cyy * dy * dy + self.cxy * dx * dy
    }

    /// Half-widths of the bounding box of the ellipse scaled by `r`
    fn extent(&self, r: f64) -> (f64, f64) {
        let det = self.cxx * self.cyy - self.cxy * self.cxy / 4.0;
        (r * (self.cyy / det).sqrt(), r * (self.cxx / det).sqrt())
    }
}

/// Pixel index range covered by `[centre - half, centre + half]`, or
/// `Truncated` if that range leaves the image
fn pixel_box(
    x: f64,
    y: f64,
    half_x: f64,
    half_y: f64,
    width: usize,
    height: usize,
) -> Result<(usize, usize, usize, usize), ApertureFlag> {
    let x_min = (x - half_x + 0.5).floor();
    let x_max = (x + half_x + 0.5).floor();
    let y_min = (y - half_y + 0.5).floor();
    let y_max = (y + half_y + 0.5).floor();
    if x_min < 0.0 || y_min < 0.0 || x_max >= width as f64 || y_max >= height as f64 {
        return Err(ApertureFlag::Truncated);
    }
    Ok((x_min as usize, x_max as usize, y_min as usize, y_max as usize))
}

fn subpixel_offsets() -> impl Iterator<Item = (f64, f64)> {
    let step = 1.0 / SUBPIX as f64;
    (0..SUBPIX).flat_map(move |j| {
        (0..SUBPIX).map(move |i| {
            (
                (i as f64 + 0.5) * step - 0.5,
                (j as f64 + 0.5) * step - 0.5,
            )
        })
    })
}

/// First moment of the light profile inside the `r`-scaled source ellipse,
/// in units of the source ellipse
pub(crate) fn kron_radius(
    data: &[f64],
    width: usize,
    height: usize,
    source: &DetectedSource,
    r: f64,
) -> Result<f64, ApertureFlag> {
    let form = EllipseForm::new(source.a, source.b, source.theta);
    let (half_x, half_y) = form.extent(r);
    let (x0, x1, y0, y1) = pixel_box(source.x, source.y, half_x, half_y, width, height)?;

    let r2_max = r * r;
    let mut weighted = 0.0;
    let mut total = 0.0;
    for py in y0..=y1 {
        for px in x0..=x1 {
            let rpix2 = form.radius_squared(px as f64 - source.x, py as f64 - source.y);
            if rpix2 > r2_max {
                continue;
            }
            let value = data[py * width + px];
            if !value.is_finite() {
                return Err(ApertureFlag::Blank);
            }
            weighted += value * rpix2.sqrt();
            total += value;
        }
    }

    if total <= 0.0 || weighted <= 0.0 {
        return Err(ApertureFlag::NonPositive);
    }
    Ok(weighted / total)
}

/// Flux inside the source ellipse scaled by `r`, with subpixel sampling
pub(crate) fn sum_ellipse(
    data: &[f64],
    width: usize,
    height: usize,
    source: &DetectedSource,
    r: f64,
) -> Result<f64, ApertureFlag> {
    let form = EllipseForm::new(source.a, source.b, source.theta);
    let (half_x, half_y) = form.extent(r);
    let (x0, x1, y0, y1) = pixel_box(source.x, source.y, half_x, half_y, width, height)?;

    let r2_max = r * r;
    let sample_weight = 1.0 / (SUBPIX * SUBPIX) as f64;
    let mut flux = 0.0;
    for py in y0..=y1 {
        for px in x0..=x1 {
            let dx = px as f64 - source.x;
            let dy = py as f64 - source.y;
            let covered = subpixel_offsets()
                .filter(|&(ox, oy)| form.radius_squared(dx + ox, dy + oy) <= r2_max)
                .count();
            if covered == 0 {
                continue;
            }
            let value = data[py * width + px];
            if !value.is_finite() {
                return Err(ApertureFlag::Blank);
            }
            flux += value * covered as f64 * sample_weight;
        }
    }

    if flux <= 0.0 {
        return Err(ApertureFlag::NonPositive);
    }
    Ok(flux)
}

/// Radius of the circle about the source centre that encloses `fraction` of
/// `total_flux`, searching out to `r_max` pixels
pub(crate) fn flux_radius(
    data: &[f64],
    width: usize,
    height: usize,
    source: &DetectedSource,
    r_max: f64,
    fraction: f64,
    total_flux: f64,
) -> Result<f64, ApertureFlag> {
    if total_flux <= 0.0 {
        return Err(ApertureFlag::NonPositive);
    }
    let (x0, x1, y0, y1) = pixel_box(source.x, source.y, r_max, r_max, width, height)?;

    let step = r_max / GROWTH_BINS as f64;
    let sample_weight = 1.0 / (SUBPIX * SUBPIX) as f64;
    let mut bins = [0.0; GROWTH_BINS];
    for py in y0..=y1 {
        for px in x0..=x1 {
            let dx = px as f64 - source.x;
            let dy = py as f64 - source.y;
            // Skip pixels entirely outside the search circle
            if dx.hypot(dy) > r_max + std::f64::consts::FRAC_1_SQRT_2 {
                continue;
            }
            let value = data[py * width + px];
            if !value.is_finite() {
                return Err(ApertureFlag::Blank);
            }
            for (ox, oy) in subpixel_offsets() {
                let bin = ((dx + ox).hypot(dy + oy) / step) as usize;
                if bin < GROWTH_BINS {
                    bins[bin] += value * sample_weight;
                }
            }
        }
    }

    // Walk the curve of growth and interpolate inside the crossing bin
    let target = fraction * total_flux;
    let mut enclosed = 0.0;
    for (i, &bin_flux) in bins.iter().enumerate() {
        if bin_flux > 0.0 && enclosed + bin_flux >= target {
            return Ok(step * (i as f64 + (target - enclosed) / bin_flux));
        }
        enclosed += bin_flux;
    }
    Ok(r_max)
}
