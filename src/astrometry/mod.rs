//! Sky to pixel mapping from the plate solution embedded in a FITS header.
//!
//! Two header conventions are understood:
//!
//! - the Digitized Sky Survey polynomial plate solution (`AMDX*`/`AMDY*`,
//!   `PLTRA*`, `PPO*`), used for archive survey plates
//! - the standard `RA---TAN` projection with a CD, PC or CROTA linear part and
//!   optional SIP distortion
//!
//! All pixel coordinates produced here are 0-based: the centre of the first
//! pixel in the file is `(0.0, 0.0)`.

mod dss;
mod tan;

pub use dss::DssPlateSolution;
pub use tan::{SipDistortion, SipPolynomial, TanProjection};

use serde::Serialize;

use crate::coordinates::SkyPosition;
use crate::error::{ChartError, Result};
use crate::fits::FitsHeader;

/// Fractional pixel coordinate, 0-based
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PixelPosition {
    pub x: f64,
    pub y: f64,
}

impl PixelPosition {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &PixelPosition) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Plate solution of a survey image
#[derive(Debug, Clone)]
pub enum Astrometry {
    Dss(DssPlateSolution),
    Tan(TanProjection),
}

impl Astrometry {
    /// Pick the plate solution carried by the header.
    ///
    /// The DSS polynomial takes precedence when both are present since the
    /// linear WCS cards on survey plates are an approximation of it.
    pub fn from_header(header: &FitsHeader) -> Result<Self> {
        if header.contains("AMDX1") {
            return Ok(Astrometry::Dss(DssPlateSolution::from_header(header)?));
        }
        if header.contains("CTYPE1") || header.contains("CRVAL1") {
            return Ok(Astrometry::Tan(TanProjection::from_header(header)?));
        }
        Err(ChartError::Astrometry(
            "header has no recognised plate solution".to_string(),
        ))
    }

    pub fn sky_to_pixel(&self, position: &SkyPosition) -> Result<PixelPosition> {
        let (x, y) = match self {
            Astrometry::Dss(plate) => plate.sky_to_pixel(position.ra, position.dec)?,
            Astrometry::Tan(tan) => tan.sky_to_pixel(position.ra, position.dec)?,
        };
        if !x.is_finite() || !y.is_finite() {
            return Err(ChartError::Astrometry(format!(
                "non-finite pixel position for RA {:.6} Dec {:.6}",
                position.ra, position.dec
            )));
        }
        Ok(PixelPosition::new(x, y))
    }

    /// Map several positions through the same transform
    pub fn sky_to_pixels(&self, positions: &[SkyPosition]) -> Result<Vec<PixelPosition>> {
        positions.iter().map(|p| self.sky_to_pixel(p)).collect()
    }

    /// Sky position (RA, Dec in degrees) of a 0-based pixel
    pub fn pixel_to_sky(&self, pixel: PixelPosition) -> (f64, f64) {
        match self {
            Astrometry::Dss(plate) => plate.pixel_to_sky(pixel.x, pixel.y),
            Astrometry::Tan(tan) => tan.pixel_to_sky(pixel.x, pixel.y),
        }
    }

    /// Approximate linear pixel scale in arcseconds
    pub fn pixel_scale_arcsec(&self) -> f64 {
        match self {
            Astrometry::Dss(plate) => plate.pixel_scale_arcsec(),
            Astrometry::Tan(tan) => tan.pixel_scale_arcsec(),
        }
    }
}

/// Tangent-plane (standard) coordinates of `(ra, dec)` about `(ra0, dec0)`.
///
/// All angles in radians. Returns `None` for points 90 degrees or more from
/// the tangent point.
fn gnomonic_forward(ra: f64, dec: f64, ra0: f64, dec0: f64) -> Option<(f64, f64)> {
    let delta_ra = ra - ra0;
    let cos_c = dec.sin() * dec0.sin() + dec.cos() * dec0.cos() * delta_ra.cos();
    if cos_c <= 1e-10 {
        return None;
    }
    let xi = dec.cos() * delta_ra.sin() / cos_c;
    let eta = (dec.sin() * dec0.cos() - dec.cos() * dec0.sin() * delta_ra.cos()) / cos_c;
    Some((xi, eta))
}

/// Inverse of [`gnomonic_forward`], RA normalized to [0, 2pi)
fn gnomonic_inverse(xi: f64, eta: f64, ra0: f64, dec0: f64) -> (f64, f64) {
    let denom = dec0.cos() - eta * dec0.sin();
    let ra = (ra0 + xi.atan2(denom)).rem_euclid(std::f64::consts::TAU);
    let dec = (dec0.sin() + eta * dec0.cos()).atan2(xi.hypot(denom));
    (ra, dec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::tan_header;

    #[test]
    fn test_gnomonic_round_trip() {
        let (ra0, dec0) = (1.2_f64, 0.7_f64);
        for &(ra, dec) in &[(1.2, 0.7), (1.21, 0.69), (1.15, 0.75), (1.3, 0.6)] {
            let (xi, eta) = gnomonic_forward(ra, dec, ra0, dec0).unwrap();
            let (ra2, dec2) = gnomonic_inverse(xi, eta, ra0, dec0);
            assert!((ra - ra2).abs() < 1e-12);
            assert!((dec - dec2).abs() < 1e-12);
        }
    }

    #[test]
    fn test_gnomonic_rejects_far_side() {
        assert!(gnomonic_forward(0.0, 0.0, std::f64::consts::PI, 0.0).is_none());
    }

    #[test]
    fn test_from_header_selects_tan() {
        let header = tan_header(180.0, 45.0, 150.5, 150.5, 1.0 / 3600.0, "2000-01-01T00:00:00");
        let astrometry = Astrometry::from_header(&header).unwrap();
        assert!(matches!(astrometry, Astrometry::Tan(_)));
        assert!((astrometry.pixel_scale_arcsec() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_from_header_without_solution() {
        let header = FitsHeader::from_pairs([("NAXIS", "2")]);
        assert!(matches!(
            Astrometry::from_header(&header),
            Err(ChartError::Astrometry(_))
        ));
    }

    #[test]
    fn test_batch_matches_single() {
        let header = tan_header(10.0, -30.0, 100.0, 80.0, 1.7 / 3600.0, "2000-01-01T00:00:00");
        let astrometry = Astrometry::from_header(&header).unwrap();
        let positions = [
            SkyPosition::new(10.0, -30.0, 2000.0),
            SkyPosition::new(10.01, -29.99, 2000.0),
            SkyPosition::new(9.98, -30.02, 2000.0),
        ];
        let batch = astrometry.sky_to_pixels(&positions).unwrap();
        for (position, pixel) in positions.iter().zip(&batch) {
            assert_eq!(astrometry.sky_to_pixel(position).unwrap(), *pixel);
        }
        // CRPIX is 1-based; the mapper reports 0-based pixels
        assert!((batch[0].x - 99.0).abs() < 1e-9);
        assert!((batch[0].y - 79.0).abs() < 1e-9);
    }
}
