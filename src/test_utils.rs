//! Synthetic FITS files, plate solutions and star fields for unit tests

use rand::prelude::*;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::fits::FitsHeader;

const BLOCK_SIZE: usize = 2880;

/// One 80-column header card
pub fn header_card(key: &str, value: &str) -> String {
    let mut card = format!("{:<8}= {}", key, value);
    card.truncate(80);
    format!("{:<80}", card)
}

/// Quote a string header value
pub fn quoted(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Parse cards the same way a file header would be read
pub fn header_from_cards(cards: &[(&str, String)]) -> FitsHeader {
    let mut raw = String::new();
    for (key, value) in cards {
        raw.push_str(&header_card(key, value));
    }
    raw.push_str(&format!("{:<80}", "END"));
    FitsHeader::parse(raw.as_bytes())
}

/// Write a minimal BITPIX=-32 primary image.
///
/// `data` is row-major with the first FITS row first.
pub fn write_fits_f32(
    path: &Path,
    width: usize,
    height: usize,
    data: &[f32],
    extra: &[(&str, String)],
) -> std::io::Result<()> {
    let mut header = String::new();
    header.push_str(&header_card("SIMPLE", "T"));
    header.push_str(&header_card("BITPIX", "-32"));
    header.push_str(&header_card("NAXIS", "2"));
    header.push_str(&header_card("NAXIS1", &width.to_string()));
    header.push_str(&header_card("NAXIS2", &height.to_string()));
    for (key, value) in extra {
        header.push_str(&header_card(key, value));
    }
    header.push_str(&format!("{:<80}", "END"));
    while header.len() % BLOCK_SIZE != 0 {
        header.push(' ');
    }

    let mut bytes = header.into_bytes();
    for value in data.iter().take(width * height) {
        bytes.extend_from_slice(&value.to_be_bytes());
    }
    while bytes.len() % BLOCK_SIZE != 0 {
        bytes.push(0);
    }

    let mut file = File::create(path)?;
    file.write_all(&bytes)?;
    Ok(())
}

/// Header cards of a north-up, east-left TAN solution
pub fn tan_cards(
    crval1: f64,
    crval2: f64,
    crpix1: f64,
    crpix2: f64,
    scale_deg_per_px: f64,
    date_obs: &str,
) -> Vec<(&'static str, String)> {
    vec![
        ("CTYPE1", quoted("RA---TAN")),
        ("CTYPE2", quoted("DEC--TAN")),
        ("CRVAL1", crval1.to_string()),
        ("CRVAL2", crval2.to_string()),
        ("CRPIX1", crpix1.to_string()),
        ("CRPIX2", crpix2.to_string()),
        ("CD1_1", (-scale_deg_per_px).to_string()),
        ("CD1_2", "0.0".to_string()),
        ("CD2_1", "0.0".to_string()),
        ("CD2_2", scale_deg_per_px.to_string()),
        ("EQUINOX", "2000.0".to_string()),
        ("DATE-OBS", quoted(date_obs)),
    ]
}

pub fn tan_header(
    crval1: f64,
    crval2: f64,
    crpix1: f64,
    crpix2: f64,
    scale_deg_per_px: f64,
    date_obs: &str,
) -> FitsHeader {
    header_from_cards(&tan_cards(
        crval1,
        crval2,
        crpix1,
        crpix2,
        scale_deg_per_px,
        date_obs,
    ))
}

/// Header cards of a DSS plate solution centred on the image, with small
/// but non-zero distortion terms. Pixels are 25 microns at 67.2 arcsec/mm
/// (1.68 arcsec per pixel).
pub fn dss_cards(
    ra_deg: f64,
    dec_deg: f64,
    width: usize,
    height: usize,
    date_obs: &str,
) -> Vec<(&'static str, String)> {
    const PIXEL_SIZE: f64 = 25.0;
    const CNPIX1: f64 = 1000.0;
    const CNPIX2: f64 = 2000.0;

    let ra_hours = ra_deg / 15.0;
    let rah = ra_hours.trunc();
    let ram = ((ra_hours - rah) * 60.0).trunc();
    let ras = (ra_hours - rah - ram / 60.0) * 3600.0;

    let dec_abs = dec_deg.abs();
    let decd = dec_abs.trunc();
    let decm = ((dec_abs - decd) * 60.0).trunc();
    let decs = (dec_abs - decd - decm / 60.0) * 3600.0;
    let sign = if dec_deg < 0.0 { "-" } else { "+" };

    // Plate centre on the middle of the extracted subimage
    let ppo3 = (width as f64 / 2.0 + CNPIX1) * PIXEL_SIZE;
    let ppo6 = (height as f64 / 2.0 + CNPIX2) * PIXEL_SIZE;

    let amdx = [
        67.2, 0.004, 0.0, -4.0e-5, 2.0e-5, 1.0e-5, 5.0e-5, 8.0e-7, -3.0e-7, 6.0e-7, 2.0e-7,
        -1.5e-6, 1.0e-9,
    ];
    let amdy = [
        67.2, -0.004, 0.0, 3.0e-5, -2.0e-5, 1.5e-5, 4.0e-5, -6.0e-7, 5.0e-7, 2.0e-7, -4.0e-7,
        -1.2e-6, 2.0e-9,
    ];
    const AMDX_KEYS: [&str; 13] = [
        "AMDX1", "AMDX2", "AMDX3", "AMDX4", "AMDX5", "AMDX6", "AMDX7", "AMDX8", "AMDX9",
        "AMDX10", "AMDX11", "AMDX12", "AMDX13",
    ];
    const AMDY_KEYS: [&str; 13] = [
        "AMDY1", "AMDY2", "AMDY3", "AMDY4", "AMDY5", "AMDY6", "AMDY7", "AMDY8", "AMDY9",
        "AMDY10", "AMDY11", "AMDY12", "AMDY13",
    ];

    let mut cards = vec![
        ("DATE-OBS", quoted(date_obs)),
        ("PLTRAH", rah.to_string()),
        ("PLTRAM", ram.to_string()),
        ("PLTRAS", ras.to_string()),
        ("PLTDECSN", quoted(sign)),
        ("PLTDECD", decd.to_string()),
        ("PLTDECM", decm.to_string()),
        ("PLTDECS", decs.to_string()),
        ("PLTSCALE", "67.2".to_string()),
        ("XPIXELSZ", PIXEL_SIZE.to_string()),
        ("YPIXELSZ", PIXEL_SIZE.to_string()),
        ("PPO3", ppo3.to_string()),
        ("PPO6", ppo6.to_string()),
        ("CNPIX1", CNPIX1.to_string()),
        ("CNPIX2", CNPIX2.to_string()),
    ];
    for (key, value) in AMDX_KEYS.into_iter().zip(amdx) {
        cards.push((key, value.to_string()));
    }
    for (key, value) in AMDY_KEYS.into_iter().zip(amdy) {
        cards.push((key, value.to_string()));
    }
    cards
}

pub fn dss_header(
    ra_deg: f64,
    dec_deg: f64,
    width: usize,
    height: usize,
    date_obs: &str,
) -> FitsHeader {
    header_from_cards(&dss_cards(ra_deg, dec_deg, width, height, date_obs))
}

/// A flat background with uniform noise and circular Gaussian stars
pub struct SyntheticField {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f64>,
}

impl SyntheticField {
    /// Background level plus uniform noise in `[-noise, noise]`, seeded
    pub fn new(width: usize, height: usize, background: f64, noise: f64, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let data = (0..width * height)
            .map(|_| background + (rng.gen::<f64>() * 2.0 - 1.0) * noise)
            .collect();
        Self {
            width,
            height,
            data,
        }
    }

    /// Add a Gaussian star of peak `amplitude` and standard deviation `sigma`
    pub fn add_star(&mut self, x: f64, y: f64, amplitude: f64, sigma: f64) {
        let reach = (5.0 * sigma).ceil() as i64;
        let (cx, cy) = (x.round() as i64, y.round() as i64);
        for py in (cy - reach).max(0)..=(cy + reach).min(self.height as i64 - 1) {
            for px in (cx - reach).max(0)..=(cx + reach).min(self.width as i64 - 1) {
                let dx = px as f64 - x;
                let dy = py as f64 - y;
                let value = amplitude * (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp();
                self.data[py as usize * self.width + px as usize] += value;
            }
        }
    }

    /// Add stars on a regular grid, `margin` pixels away from every edge
    pub fn add_star_grid(
        &mut self,
        columns: usize,
        rows: usize,
        margin: f64,
        amplitude: f64,
        sigma: f64,
    ) {
        let step_x = (self.width as f64 - 2.0 * margin) / (columns.max(2) - 1) as f64;
        let step_y = (self.height as f64 - 2.0 * margin) / (rows.max(2) - 1) as f64;
        for row in 0..rows {
            for column in 0..columns {
                // Sub-pixel offsets so centres are not all on the pixel grid
                let x = margin + column as f64 * step_x + 0.3;
                let y = margin + row as f64 * step_y + 0.6;
                self.add_star(x, y, amplitude, sigma);
            }
        }
    }

    pub fn as_f32(&self) -> Vec<f32> {
        self.data.iter().map(|&v| v as f32).collect()
    }
}

/// Write a DSS plate-solved star field centred on (`ra_deg`, `dec_deg`).
///
/// 25 stars of sigma 2px on a noisy background of 1000.
pub fn write_survey_plate(
    path: &Path,
    ra_deg: f64,
    dec_deg: f64,
    size: usize,
    date_obs: &str,
) -> std::io::Result<()> {
    let mut field = SyntheticField::new(size, size, 1000.0, 10.0, 7);
    field.add_star_grid(5, 5, size as f64 / 8.0, 3000.0, 2.0);
    write_fits_f32(
        path,
        size,
        size,
        &field.as_f32(),
        &dss_cards(ra_deg, dec_deg, size, size, date_obs),
    )
}
