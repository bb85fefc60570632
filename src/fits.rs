use chrono::{Datelike, NaiveDate};
use fitrs::{Fits, FitsData};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::{ChartError, Result};

const BLOCK_SIZE: usize = 2880;
const CARD_SIZE: usize = 80;
// Survey headers with full plate solutions run to a dozen blocks; anything far
// beyond that is not a header
const MAX_HEADER_BLOCKS: usize = 64;

/// Keyword/value map of a primary HDU header
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct FitsHeader {
    keywords: HashMap<String, String>,
}

impl FitsHeader {
    /// Read the primary header from a FITS file
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;

        // Read header blocks until we find END
        let mut header_data = Vec::new();
        loop {
            let mut block = vec![0u8; BLOCK_SIZE];
            file.read_exact(&mut block).map_err(|_| {
                ChartError::HeaderParse(format!(
                    "{}: header ended without an END card",
                    path.display()
                ))
            })?;

            let has_end = block
                .chunks(CARD_SIZE)
                .any(|card| card.starts_with(b"END") && card[3..].iter().all(|&b| b == b' '));
            header_data.extend_from_slice(&block);
            if has_end {
                break;
            }

            if header_data.len() >= MAX_HEADER_BLOCKS * BLOCK_SIZE {
                return Err(ChartError::HeaderParse(format!(
                    "{}: no END card in the first {} header blocks",
                    path.display(),
                    MAX_HEADER_BLOCKS
                )));
            }
        }

        Ok(Self::parse(&header_data))
    }

    /// Parse raw header cards (multiples of 80 bytes)
    pub fn parse(data: &[u8]) -> Self {
        let mut keywords = HashMap::new();

        for chunk in data.chunks(CARD_SIZE) {
            let Ok(card) = std::str::from_utf8(chunk) else {
                continue;
            };

            let keyword = card.get(..8).unwrap_or(card).trim_end();
            if keyword == "END" {
                break;
            }

            // Only value cards carry "= " in columns 9-10; COMMENT, HISTORY and
            // blank cards do not
            if card.get(8..10) != Some("= ") || keyword.is_empty() {
                continue;
            }

            if let Some(value) = parse_card_value(&card[10..]) {
                keywords.insert(keyword.to_string(), value);
            }
        }

        Self { keywords }
    }

    /// Build a header from keyword/value pairs
    pub fn from_pairs<K: Into<String>, V: Into<String>>(
        pairs: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        Self {
            keywords: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, keyword: &str) -> Option<&str> {
        self.keywords.get(keyword).map(String::as_str)
    }

    pub fn contains(&self, keyword: &str) -> bool {
        self.keywords.contains_key(keyword)
    }

    /// Numeric value of a keyword, accepting Fortran `D` exponents
    pub fn real(&self, keyword: &str) -> Option<f64> {
        let value = self.get(keyword)?;
        value
            .trim()
            .replace(['D', 'd'], "E")
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
    }

    pub fn integer(&self, keyword: &str) -> Option<i64> {
        self.get(keyword)?.trim().parse::<i64>().ok()
    }
}

/// Extract the value part of a card, dropping any trailing comment
fn parse_card_value(value_part: &str) -> Option<String> {
    let value_part = value_part.trim_start();

    if let Some(rest) = value_part.strip_prefix('\'') {
        // Quoted string: '' is an escaped quote, and slashes inside are data
        let mut value = String::new();
        let mut chars = rest.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '\'' {
                if chars.peek() == Some(&'\'') {
                    value.push('\'');
                    chars.next();
                } else {
                    return Some(value.trim_end().to_string());
                }
            } else {
                value.push(c);
            }
        }
        // Unterminated string, keep what we have
        return Some(value.trim_end().to_string());
    }

    let value = match value_part.find('/') {
        Some(comment_pos) => value_part[..comment_pos].trim(),
        None => value_part.trim(),
    };

    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Primary image of a FITS file
pub struct FitsImage {
    pub width: usize,
    pub height: usize,
    /// Row-major, first FITS row first; blank pixels are NaN
    pub data: Vec<f64>,
    pub header: FitsHeader,
}

impl FitsImage {
    /// Load the primary HDU image and header using fitrs
    pub fn from_file(path: &Path) -> Result<Self> {
        let header = FitsHeader::from_file(path)?;

        let naxis = header.integer("NAXIS").ok_or_else(|| {
            ChartError::HeaderParse("missing or invalid NAXIS header".to_string())
        })?;
        if naxis < 2 {
            return Err(ChartError::HeaderParse(format!(
                "FITS file does not contain 2D image data (NAXIS={})",
                naxis
            )));
        }

        let width = header
            .integer("NAXIS1")
            .filter(|&n| n > 0)
            .ok_or_else(|| ChartError::HeaderParse("missing or invalid NAXIS1".to_string()))?
            as usize;
        let height = header
            .integer("NAXIS2")
            .filter(|&n| n > 0)
            .ok_or_else(|| ChartError::HeaderParse("missing or invalid NAXIS2".to_string()))?
            as usize;

        let fits = Fits::open(path).map_err(|e| {
            ChartError::Processing(format!("Failed to open FITS file {}: {}", path.display(), e))
        })?;
        let hdu = fits.get(0).ok_or_else(|| {
            ChartError::Processing("No primary HDU found in FITS file".to_string())
        })?;

        let bzero = header.real("BZERO").unwrap_or(0.0);
        let bscale = header.real("BSCALE").unwrap_or(1.0);

        // Integer pixels are scaled per BSCALE/BZERO; floating point data is
        // used as stored
        let mut data: Vec<f64> = match hdu.read_data() {
            FitsData::Characters(_) => {
                return Err(ChartError::Processing(
                    "FITS file contains character data, not image data".to_string(),
                ));
            }
            FitsData::IntegersI32(array) => array
                .data
                .iter()
                .map(|value| match value {
                    Some(raw) => *raw as f64 * bscale + bzero,
                    None => f64::NAN,
                })
                .collect(),
            FitsData::IntegersU32(array) => array
                .data
                .iter()
                .map(|value| match value {
                    Some(raw) => *raw as f64,
                    None => f64::NAN,
                })
                .collect(),
            FitsData::FloatingPoint32(array) => array.data.iter().map(|&v| v as f64).collect(),
            FitsData::FloatingPoint64(array) => array.data.to_vec(),
        };

        // Higher axes (NAXIS3..) are ignored; keep the first plane
        if data.len() < width * height {
            return Err(ChartError::Processing(format!(
                "Data size mismatch: expected {} pixels, got {}",
                width * height,
                data.len()
            )));
        }
        data.truncate(width * height);

        Ok(Self {
            width,
            height,
            data,
            header,
        })
    }

    /// Fractional-year epoch of the exposure, from DATE-OBS
    pub fn observation_epoch(&self) -> Result<f64> {
        let date_obs = self
            .header
            .get("DATE-OBS")
            .ok_or_else(|| ChartError::HeaderParse("missing DATE-OBS header".to_string()))?;
        Ok(epoch_from_date(parse_observation_date(date_obs)?))
    }

    /// Physical plate scale in arcsec per pixel (PLTSCALE x XPIXELSZ)
    pub fn plate_scale_arcsec(&self) -> Option<f64> {
        let plate_scale = self.header.real("PLTSCALE")?; // arcsec/mm
        let pixel_size = self.header.real("XPIXELSZ")?; // microns
        let scale = plate_scale * pixel_size / 1000.0;
        (scale > 0.0).then_some(scale)
    }
}

/// Parse the date part of a DATE-OBS value.
///
/// Only the date is used: archive headers can carry impossible times such as
/// 93 minutes. Accepts `YYYY-MM-DD[Thh:mm:ss]` and the pre-2000 `DD/MM/YY`.
pub fn parse_observation_date(text: &str) -> Result<NaiveDate> {
    let text = text.trim();

    if let Some(date) = text.get(..10) {
        if let Ok(parsed) = NaiveDate::parse_from_str(date, "%Y-%m-%d") {
            return Ok(parsed);
        }
    }

    let parts: Vec<&str> = text.split('/').collect();
    if parts.len() == 3 {
        let day = parts[0].trim().parse::<u32>();
        let month = parts[1].trim().parse::<u32>();
        let year = parts[2].trim().parse::<i32>();
        if let (Ok(day), Ok(month), Ok(year)) = (day, month, year) {
            let year = if year < 100 { 1900 + year } else { year };
            if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
                return Ok(date);
            }
        }
    }

    Err(ChartError::HeaderParse(format!(
        "unrecognised DATE-OBS value: {}",
        text
    )))
}

/// Decimal year of a date, counting every year as 366 days
pub fn epoch_from_date(date: NaiveDate) -> f64 {
    date.year() as f64 + date.ordinal0() as f64 / 366.0
}
