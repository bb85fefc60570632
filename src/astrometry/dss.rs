//! Digitized Sky Survey plate solution
//!
//! Plate coordinates in millimetres from the plate centre are mapped to
//! standard coordinates by a 13-term polynomial per axis, then deprojected
//! about the plate centre.

use super::{gnomonic_forward, gnomonic_inverse};
use crate::error::{ChartError, Result};
use crate::fits::FitsHeader;

/// Arcseconds per radian
const CONR2S: f64 = 206_264.806_247_096_4;

const NEWTON_MAX_ITERATIONS: usize = 50;
/// Convergence tolerance on plate position, mm
const NEWTON_TOLERANCE: f64 = 5e-7;

#[derive(Debug, Clone)]
pub struct DssPlateSolution {
    /// Plate centre RA, radians
    ra0: f64,
    /// Plate centre Dec, radians
    dec0: f64,
    /// arcsec/mm
    plate_scale: f64,
    /// Pixel sizes in microns
    x_pixel_size: f64,
    y_pixel_size: f64,
    /// Plate centre offsets in microns
    ppo3: f64,
    ppo6: f64,
    /// Corner of the extracted subimage on the full plate scan
    cnpix: [f64; 2],
    amdx: [f64; 13],
    amdy: [f64; 13],
}

impl DssPlateSolution {
    pub fn from_header(header: &FitsHeader) -> Result<Self> {
        let ra0_hours = require(header, "PLTRAH")?
            + require(header, "PLTRAM")? / 60.0
            + require(header, "PLTRAS")? / 3600.0;

        let dec_sign = match header.get("PLTDECSN").map(str::trim) {
            Some(s) if s.starts_with('-') => -1.0,
            _ => 1.0,
        };
        let dec0_degrees = dec_sign
            * (require(header, "PLTDECD")?
                + require(header, "PLTDECM")? / 60.0
                + require(header, "PLTDECS")? / 3600.0);

        let mut amdx = [0.0; 13];
        let mut amdy = [0.0; 13];
        for i in 0..13 {
            amdx[i] = require(header, &format!("AMDX{}", i + 1))?;
            amdy[i] = require(header, &format!("AMDY{}", i + 1))?;
        }

        let plate_scale = require(header, "PLTSCALE")?;
        let x_pixel_size = require(header, "XPIXELSZ")?;
        let y_pixel_size = require(header, "YPIXELSZ")?;
        if plate_scale <= 0.0 || x_pixel_size <= 0.0 || y_pixel_size <= 0.0 {
            return Err(ChartError::Astrometry(
                "plate scale and pixel sizes must be positive".to_string(),
            ));
        }

        Ok(Self {
            ra0: (ra0_hours * 15.0).to_radians(),
            dec0: dec0_degrees.to_radians(),
            plate_scale,
            x_pixel_size,
            y_pixel_size,
            ppo3: require(header, "PPO3")?,
            ppo6: require(header, "PPO6")?,
            cnpix: [
                header.real("CNPIX1").unwrap_or(0.0),
                header.real("CNPIX2").unwrap_or(0.0),
            ],
            amdx,
            amdy,
        })
    }

    /// Standard coordinates (arcsec) of a plate position in mm
    fn standard_coordinates(&self, x: f64, y: f64) -> (f64, f64) {
        let a = &self.amdx;
        let b = &self.amdy;
        let (x2, y2) = (x * x, y * y);
        let r2 = x2 + y2;

        let xi = a[0] * x
            + a[1] * y
            + a[2]
            + a[3] * x2
            + a[4] * x * y
            + a[5] * y2
            + a[6] * r2
            + a[7] * x2 * x
            + a[8] * x2 * y
            + a[9] * x * y2
            + a[10] * y2 * y
            + a[11] * x * r2
            + a[12] * x * r2 * r2;

        let eta = b[0] * y
            + b[1] * x
            + b[2]
            + b[3] * y2
            + b[4] * x * y
            + b[5] * x2
            + b[6] * r2
            + b[7] * y2 * y
            + b[8] * y2 * x
            + b[9] * x2 * y
            + b[10] * x2 * x
            + b[11] * y * r2
            + b[12] * y * r2 * r2;

        (xi, eta)
    }

    /// Jacobian of [`Self::standard_coordinates`]: (dxi/dx, dxi/dy, deta/dx, deta/dy)
    fn jacobian(&self, x: f64, y: f64) -> (f64, f64, f64, f64) {
        let a = &self.amdx;
        let b = &self.amdy;
        let (x2, y2) = (x * x, y * y);
        let r2 = x2 + y2;

        let xi_x = a[0]
            + 2.0 * a[3] * x
            + a[4] * y
            + 2.0 * a[6] * x
            + 3.0 * a[7] * x2
            + 2.0 * a[8] * x * y
            + a[9] * y2
            + a[11] * (r2 + 2.0 * x2)
            + a[12] * (r2 * r2 + 4.0 * x2 * r2);
        let xi_y = a[1]
            + a[4] * x
            + 2.0 * a[5] * y
            + 2.0 * a[6] * y
            + a[8] * x2
            + 2.0 * a[9] * x * y
            + 3.0 * a[10] * y2
            + 2.0 * a[11] * x * y
            + 4.0 * a[12] * x * y * r2;
        let eta_x = b[1]
            + b[4] * y
            + 2.0 * b[5] * x
            + 2.0 * b[6] * x
            + b[8] * y2
            + 2.0 * b[9] * x * y
            + 3.0 * b[10] * x2
            + 2.0 * b[11] * x * y
            + 4.0 * b[12] * x * y * r2;
        let eta_y = b[0]
            + 2.0 * b[3] * y
            + b[4] * x
            + 2.0 * b[6] * y
            + 3.0 * b[7] * y2
            + 2.0 * b[8] * x * y
            + b[9] * x2
            + b[11] * (r2 + 2.0 * y2)
            + b[12] * (r2 * r2 + 4.0 * y2 * r2);

        (xi_x, xi_y, eta_x, eta_y)
    }

    /// Map (RA, Dec) in degrees to a 0-based pixel position
    pub fn sky_to_pixel(&self, ra: f64, dec: f64) -> Result<(f64, f64)> {
        let (xi, eta) = gnomonic_forward(ra.to_radians(), dec.to_radians(), self.ra0, self.dec0)
            .ok_or_else(|| {
                ChartError::Astrometry(format!(
                    "RA {:.6} Dec {:.6} is not on this plate",
                    ra, dec
                ))
            })?;
        let (xi, eta) = (xi * CONR2S, eta * CONR2S);

        // Invert the plate polynomial with Newton's method, starting from the
        // linear plate scale
        let mut x = xi / self.plate_scale;
        let mut y = eta / self.plate_scale;
        let mut converged = false;
        for _ in 0..NEWTON_MAX_ITERATIONS {
            let (f_xi, f_eta) = self.standard_coordinates(x, y);
            let f = f_xi - xi;
            let g = f_eta - eta;
            let (xi_x, xi_y, eta_x, eta_y) = self.jacobian(x, y);

            let det = xi_x * eta_y - xi_y * eta_x;
            if det == 0.0 || !det.is_finite() {
                break;
            }
            let dx = (-f * eta_y + g * xi_y) / det;
            let dy = (-g * xi_x + f * eta_x) / det;
            x += dx;
            y += dy;

            if dx.abs() < NEWTON_TOLERANCE && dy.abs() < NEWTON_TOLERANCE {
                converged = true;
                break;
            }
        }
        if !converged {
            return Err(ChartError::Astrometry(format!(
                "plate solution did not converge for RA {:.6} Dec {:.6}",
                ra, dec
            )));
        }

        // Plate mm to 1-based subimage pixels, then to 0-based
        let plate_x = (self.ppo3 - x * 1000.0) / self.x_pixel_size;
        let plate_y = (self.ppo6 + y * 1000.0) / self.y_pixel_size;
        let pixel_x = plate_x - self.cnpix[0] + 0.5;
        let pixel_y = plate_y - self.cnpix[1] + 0.5;

        Ok((pixel_x - 1.0, pixel_y - 1.0))
    }

    /// Map a 0-based pixel position to (RA, Dec) in degrees
    pub fn pixel_to_sky(&self, px: f64, py: f64) -> (f64, f64) {
        let plate_x = px + 1.0 + self.cnpix[0] - 0.5;
        let plate_y = py + 1.0 + self.cnpix[1] - 0.5;
        let x = (self.ppo3 - plate_x * self.x_pixel_size) / 1000.0;
        let y = (plate_y * self.y_pixel_size - self.ppo6) / 1000.0;

        let (xi, eta) = self.standard_coordinates(x, y);
        let (ra, dec) = gnomonic_inverse(xi / CONR2S, eta / CONR2S, self.ra0, self.dec0);
        (ra.to_degrees(), dec.to_degrees())
    }

    /// Nominal arcsec per pixel along x
    pub fn pixel_scale_arcsec(&self) -> f64 {
        self.plate_scale * self.x_pixel_size / 1000.0
    }
}

fn require(header: &FitsHeader, keyword: &str) -> Result<f64> {
    header
        .real(keyword)
        .ok_or_else(|| ChartError::Astrometry(format!("missing or invalid {}", keyword)))
}
