//! Gnomonic (TAN) projection with optional SIP distortion

use super::{gnomonic_forward, gnomonic_inverse};
use crate::error::{ChartError, Result};
use crate::fits::FitsHeader;

const SIP_MAX_ITERATIONS: usize = 50;
const SIP_TOLERANCE: f64 = 1e-8;

/// One SIP polynomial: sum of coefficient * u^p * v^q
#[derive(Debug, Clone, Default)]
pub struct SipPolynomial {
    terms: Vec<(i32, i32, f64)>,
}

impl SipPolynomial {
    /// Read `{prefix}_p_q` coefficients up to `{prefix}_ORDER`
    fn from_header(header: &FitsHeader, prefix: &str) -> Option<Self> {
        let order = header.integer(&format!("{}_ORDER", prefix))?;
        let mut terms = Vec::new();
        for p in 0..=order {
            for q in 0..=(order - p) {
                if let Some(coefficient) = header.real(&format!("{}_{}_{}", prefix, p, q)) {
                    if coefficient != 0.0 {
                        terms.push((p as i32, q as i32, coefficient));
                    }
                }
            }
        }
        Some(Self { terms })
    }

    fn eval(&self, u: f64, v: f64) -> f64 {
        self.terms
            .iter()
            .map(|&(p, q, c)| c * u.powi(p) * v.powi(q))
            .sum()
    }
}

/// SIP distortion terms in intermediate pixel space
#[derive(Debug, Clone)]
pub struct SipDistortion {
    pub a: SipPolynomial,
    pub b: SipPolynomial,
    /// Inverse polynomials, when the header provides them
    pub inverse: Option<(SipPolynomial, SipPolynomial)>,
}

impl SipDistortion {
    fn from_header(header: &FitsHeader) -> Result<Option<Self>> {
        let a = SipPolynomial::from_header(header, "A");
        let b = SipPolynomial::from_header(header, "B");
        let (a, b) = match (a, b) {
            (Some(a), Some(b)) => (a, b),
            (None, None) => return Ok(None),
            _ => {
                return Err(ChartError::Astrometry(
                    "SIP distortion needs both A_ORDER and B_ORDER".to_string(),
                ))
            }
        };
        let inverse = SipPolynomial::from_header(header, "AP")
            .zip(SipPolynomial::from_header(header, "BP"));
        Ok(Some(Self { a, b, inverse }))
    }

    /// Distorted offsets for undistorted pixel offsets
    fn apply(&self, u: f64, v: f64) -> (f64, f64) {
        (u + self.a.eval(u, v), v + self.b.eval(u, v))
    }

    /// Undo the distortion, solving u + A(u, v) = u' by fixed-point iteration
    /// when no inverse polynomials are given
    fn remove(&self, u_distorted: f64, v_distorted: f64) -> Result<(f64, f64)> {
        if let Some((ap, bp)) = &self.inverse {
            return Ok((
                u_distorted + ap.eval(u_distorted, v_distorted),
                v_distorted + bp.eval(u_distorted, v_distorted),
            ));
        }

        let (mut u, mut v) = (u_distorted, v_distorted);
        for _ in 0..SIP_MAX_ITERATIONS {
            let next_u = u_distorted - self.a.eval(u, v);
            let next_v = v_distorted - self.b.eval(u, v);
            let step = (next_u - u).abs().max((next_v - v).abs());
            u = next_u;
            v = next_v;
            if step < SIP_TOLERANCE {
                return Ok((u, v));
            }
        }
        Err(ChartError::Astrometry(
            "SIP inversion did not converge".to_string(),
        ))
    }
}

/// FITS `RA---TAN` world coordinate system
#[derive(Debug, Clone)]
pub struct TanProjection {
    /// Reference sky position (RA, Dec) in degrees
    pub crval: [f64; 2],
    /// Reference pixel, 1-based as written in the header
    pub crpix: [f64; 2],
    /// Linear transform, degrees per pixel
    pub cd: [[f64; 2]; 2],
    pub sip: Option<SipDistortion>,
}

impl TanProjection {
    pub fn from_header(header: &FitsHeader) -> Result<Self> {
        let ctype1 = header.get("CTYPE1").unwrap_or("");
        let ctype2 = header.get("CTYPE2").unwrap_or("");
        if !ctype1.starts_with("RA---TAN") || !ctype2.starts_with("DEC--TAN") {
            return Err(ChartError::Astrometry(format!(
                "unsupported projection: CTYPE1='{}' CTYPE2='{}'",
                ctype1, ctype2
            )));
        }

        let crval = [require(header, "CRVAL1")?, require(header, "CRVAL2")?];
        let crpix = [require(header, "CRPIX1")?, require(header, "CRPIX2")?];
        let cd = parse_linear_transform(header)?;

        let det = cd[0][0] * cd[1][1] - cd[0][1] * cd[1][0];
        if det == 0.0 || !det.is_finite() {
            return Err(ChartError::Astrometry(
                "singular CD matrix".to_string(),
            ));
        }

        let sip = SipDistortion::from_header(header)?;

        Ok(Self {
            crval,
            crpix,
            cd,
            sip,
        })
    }

    /// Map (RA, Dec) in degrees to a 0-based pixel position
    pub fn sky_to_pixel(&self, ra: f64, dec: f64) -> Result<(f64, f64)> {
        let (xi, eta) = gnomonic_forward(
            ra.to_radians(),
            dec.to_radians(),
            self.crval[0].to_radians(),
            self.crval[1].to_radians(),
        )
        .ok_or_else(|| {
            ChartError::Astrometry(format!(
                "RA {:.6} Dec {:.6} is behind the tangent plane",
                ra, dec
            ))
        })?;
        let (x, y) = (xi.to_degrees(), eta.to_degrees());

        let cd = &self.cd;
        let inv_det = 1.0 / (cd[0][0] * cd[1][1] - cd[0][1] * cd[1][0]);
        let u = inv_det * (cd[1][1] * x - cd[0][1] * y);
        let v = inv_det * (-cd[1][0] * x + cd[0][0] * y);

        let (u, v) = match &self.sip {
            Some(sip) => sip.remove(u, v)?,
            None => (u, v),
        };

        Ok((u + self.crpix[0] - 1.0, v + self.crpix[1] - 1.0))
    }

    /// Map a 0-based pixel position to (RA, Dec) in degrees
    pub fn pixel_to_sky(&self, px: f64, py: f64) -> (f64, f64) {
        let u = px + 1.0 - self.crpix[0];
        let v = py + 1.0 - self.crpix[1];
        let (u, v) = match &self.sip {
            Some(sip) => sip.apply(u, v),
            None => (u, v),
        };

        let x = self.cd[0][0] * u + self.cd[0][1] * v;
        let y = self.cd[1][0] * u + self.cd[1][1] * v;
        let (ra, dec) = gnomonic_inverse(
            x.to_radians(),
            y.to_radians(),
            self.crval[0].to_radians(),
            self.crval[1].to_radians(),
        );
        (ra.to_degrees(), dec.to_degrees())
    }

    pub fn pixel_scale_arcsec(&self) -> f64 {
        let det = self.cd[0][0] * self.cd[1][1] - self.cd[0][1] * self.cd[1][0];
        det.abs().sqrt() * 3600.0
    }
}

fn require(header: &FitsHeader, keyword: &str) -> Result<f64> {
    header
        .real(keyword)
        .ok_or_else(|| ChartError::Astrometry(format!("missing or invalid {}", keyword)))
}

/// CD matrix, or CDELT with PC, or CDELT with CROTA2 (in that order)
fn parse_linear_transform(header: &FitsHeader) -> Result<[[f64; 2]; 2]> {
    let cd_keys = ["CD1_1", "CD1_2", "CD2_1", "CD2_2"];
    if cd_keys.iter().any(|k| header.contains(k)) {
        // Absent CD elements default to zero
        let cd = |k: &str| header.real(k).unwrap_or(0.0);
        return Ok([
            [cd("CD1_1"), cd("CD1_2")],
            [cd("CD2_1"), cd("CD2_2")],
        ]);
    }

    let cdelt1 = require(header, "CDELT1")?;
    let cdelt2 = require(header, "CDELT2")?;

    let pc_keys = ["PC1_1", "PC1_2", "PC2_1", "PC2_2"];
    if pc_keys.iter().any(|k| header.contains(k)) {
        let pc11 = header.real("PC1_1").unwrap_or(1.0);
        let pc12 = header.real("PC1_2").unwrap_or(0.0);
        let pc21 = header.real("PC2_1").unwrap_or(0.0);
        let pc22 = header.real("PC2_2").unwrap_or(1.0);
        return Ok([
            [cdelt1 * pc11, cdelt1 * pc12],
            [cdelt2 * pc21, cdelt2 * pc22],
        ]);
    }

    let rotation = header.real("CROTA2").unwrap_or(0.0).to_radians();
    let (sin_r, cos_r) = rotation.sin_cos();
    Ok([
        [cdelt1 * cos_r, -cdelt2 * sin_r],
        [cdelt1 * sin_r, cdelt2 * cos_r],
    ])
}
