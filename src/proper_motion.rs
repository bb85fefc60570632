//! Linear proper-motion propagation

use serde::Serialize;

use crate::coordinates::SkyPosition;

/// Angular velocity on the sky, degrees per year.
///
/// `ra` is great-circle arc per year (mu_alpha * cos(dec)), not the rate of
/// change of the RA coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ProperMotion {
    pub ra: f64,
    pub dec: f64,
}

impl ProperMotion {
    pub fn new(ra: f64, dec: f64) -> Self {
        Self { ra, dec }
    }

    /// Build from the usual catalog units of arcseconds per year
    pub fn from_arcsec_per_year(ra: f64, dec: f64) -> Self {
        Self {
            ra: ra / 3600.0,
            dec: dec / 3600.0,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.ra == 0.0 && self.dec == 0.0
    }
}

/// Advance a position by `delta_years` of proper motion.
///
/// Small-delta linear approximation: the cos(dec) correction uses the input
/// declination. The returned position keeps the input epoch tag; use
/// [`SkyPosition::at_epoch`] to retag.
pub fn project(position: &SkyPosition, motion: &ProperMotion, delta_years: f64) -> SkyPosition {
    if delta_years == 0.0 || motion.is_zero() {
        return *position;
    }

    let cos_dec = position.dec.to_radians().cos();
    SkyPosition {
        ra: position.ra + motion.ra / cos_dec * delta_years,
        dec: position.dec + motion.dec * delta_years,
        epoch: position.epoch,
    }
}

impl SkyPosition {
    /// Propagate this position to `epoch` and tag the result with it
    pub fn at_epoch(&self, motion: &ProperMotion, epoch: f64) -> SkyPosition {
        let mut moved = project(self, motion, epoch - self.epoch);
        moved.epoch = epoch;
        moved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_delta_is_identity() {
        let position = SkyPosition::new(201.5, -43.2, 2000.0);
        let motion = ProperMotion::from_arcsec_per_year(-3.7, 8.1);
        assert_eq!(project(&position, &motion, 0.0), position);
    }

    #[test]
    fn test_zero_motion_is_identity() {
        let position = SkyPosition::new(12.25, 71.0, 2000.0);
        for delta in [-50.0, -1.0, 0.5, 25.0, 1000.0] {
            assert_eq!(project(&position, &ProperMotion::default(), delta), position);
        }
    }

    #[test]
    fn test_dec_motion() {
        let position = SkyPosition::new(100.0, 10.0, 2000.0);
        let motion = ProperMotion::from_arcsec_per_year(0.0, 36.0);
        let moved = project(&position, &motion, 10.0);
        assert!((moved.dec - 10.1).abs() < 1e-12);
        assert_eq!(moved.ra, 100.0);
    }

    #[test]
    fn test_ra_motion_uses_input_declination() {
        let position = SkyPosition::new(100.0, 60.0, 2000.0);
        let motion = ProperMotion::new(0.01, 1.0);
        let moved = project(&position, &motion, 2.0);
        // cos(60) = 0.5 doubles the coordinate rate
        assert!((moved.ra - 100.04).abs() < 1e-9);
        assert!((moved.dec - 62.0).abs() < 1e-12);
    }

    #[test]
    fn test_at_epoch_retags() {
        let position = SkyPosition::new(180.0, 0.0, 2000.0);
        let motion = ProperMotion::from_arcsec_per_year(3.6, -3.6);
        let moved = position.at_epoch(&motion, 1990.0);
        assert_eq!(moved.epoch, 1990.0);
        assert!((moved.ra - 179.99).abs() < 1e-9);
        assert!((moved.dec - 0.01).abs() < 1e-9);
    }
}
