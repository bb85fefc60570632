//! Sky positions and angle text conversion

use serde::{Deserialize, Serialize};

use crate::error::{ChartError, Result};

/// A position on the sky in decimal degrees, tagged with its epoch
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SkyPosition {
    pub ra: f64,
    pub dec: f64,
    /// Decimal year the coordinates refer to
    pub epoch: f64,
}

impl SkyPosition {
    pub fn new(ra: f64, dec: f64, epoch: f64) -> Self {
        Self { ra, dec, epoch }
    }
}

/// How angle text is written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinateFormat {
    /// `D:M:S` (or `H:M:S` for right ascension)
    #[default]
    Sexagesimal,
    /// Plain decimal degrees
    Decimal,
}

impl std::str::FromStr for CoordinateFormat {
    type Err = ChartError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "sexagesimal" | "sex" => Ok(CoordinateFormat::Sexagesimal),
            "decimal" | "deg" | "degrees" => Ok(CoordinateFormat::Decimal),
            _ => Err(ChartError::InputFormat(format!(
                "unknown coordinate format: {}",
                s
            ))),
        }
    }
}

/// Unit of the leading sexagesimal field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AngleUnit {
    /// Right ascension hours (1h = 15 degrees)
    Hours,
    Degrees,
}

/// Parse angle text into decimal degrees.
///
/// Sexagesimal input must have exactly three colon separated fields. The sign
/// of the first field applies to all three, so `-00:30:00` is half a degree
/// south. Decimal input is always degrees, whatever `unit` says.
pub fn parse_angle(text: &str, format: CoordinateFormat, unit: AngleUnit) -> Result<f64> {
    let text = text.trim();
    match format {
        CoordinateFormat::Decimal => parse_component(text, text),
        CoordinateFormat::Sexagesimal => {
            let value = parse_sexagesimal(text)?;
            Ok(match unit {
                AngleUnit::Hours => value * 15.0,
                AngleUnit::Degrees => value,
            })
        }
    }
}

fn parse_sexagesimal(text: &str) -> Result<f64> {
    let parts: Vec<&str> = text.split(':').collect();
    if parts.len() != 3 {
        return Err(ChartError::InputFormat(format!(
            "expected three colon separated fields: {}",
            text
        )));
    }

    let a = parse_component(parts[0], text)?;
    // copysign keeps the sign of a "-00" leading field
    let b = parse_component(parts[1], text)?.copysign(a);
    let c = parse_component(parts[2], text)?.copysign(a);

    Ok(a + b / 60.0 + c / 3600.0)
}

fn parse_component(part: &str, text: &str) -> Result<f64> {
    let value: f64 = part
        .trim()
        .parse()
        .map_err(|_| ChartError::InputFormat(format!("invalid angle: {}", text)))?;
    if !value.is_finite() {
        return Err(ChartError::InputFormat(format!("invalid angle: {}", text)));
    }
    Ok(value)
}

/// Format a decimal value as `D:MM:SS.ss`.
///
/// Rounding happens on the hundredths of a second, so the seconds field never
/// reads `60.00`.
pub fn format_angle(degrees: f64) -> String {
    let hundredths = (degrees.abs() * 360_000.0).round() as u64;
    let whole = hundredths / 360_000;
    let minutes = (hundredths / 6_000) % 60;
    let seconds = (hundredths % 6_000) as f64 / 100.0;
    let sign = if degrees < 0.0 && hundredths > 0 { "-" } else { "" };

    format!("{}{}:{:02}:{:05.2}", sign, whole, minutes, seconds)
}

/// Right ascension in degrees, formatted as hours
pub fn format_ra(ra_degrees: f64) -> String {
    format_angle(ra_degrees / 15.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64, tol: f64) {
        assert!((a - b).abs() < tol, "expected {a} ~= {b}");
    }

    #[test]
    fn test_parse_sexagesimal_degrees() {
        let dec = parse_angle("+45:30:00", CoordinateFormat::Sexagesimal, AngleUnit::Degrees)
            .unwrap();
        assert_close(dec, 45.5, 1e-12);

        let dec = parse_angle("-12:15:36", CoordinateFormat::Sexagesimal, AngleUnit::Degrees)
            .unwrap();
        assert_close(dec, -(12.0 + 15.0 / 60.0 + 36.0 / 3600.0), 1e-12);
    }

    #[test]
    fn test_parse_negative_zero_degrees() {
        let dec = parse_angle("-00:30:00", CoordinateFormat::Sexagesimal, AngleUnit::Degrees)
            .unwrap();
        assert_close(dec, -0.5, 1e-12);
    }

    #[test]
    fn test_parse_hours() {
        let ra = parse_angle("12:00:00.00", CoordinateFormat::Sexagesimal, AngleUnit::Hours)
            .unwrap();
        assert_close(ra, 180.0, 1e-12);
    }

    #[test]
    fn test_parse_decimal_ignores_unit() {
        let ra = parse_angle(" 123.25 ", CoordinateFormat::Decimal, AngleUnit::Hours).unwrap();
        assert_close(ra, 123.25, 1e-12);
    }

    #[test]
    fn test_parse_wrong_field_count() {
        for text in ["12:34", "1:2:3:4", "12", ""] {
            let result = parse_angle(text, CoordinateFormat::Sexagesimal, AngleUnit::Degrees);
            assert!(
                matches!(result, Err(ChartError::InputFormat(_))),
                "{text:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_parse_non_numeric() {
        let result = parse_angle("12:ab:00", CoordinateFormat::Sexagesimal, AngleUnit::Degrees);
        assert!(matches!(result, Err(ChartError::InputFormat(_))));
        let result = parse_angle("north", CoordinateFormat::Decimal, AngleUnit::Degrees);
        assert!(matches!(result, Err(ChartError::InputFormat(_))));
    }

    #[test]
    fn test_format_angle() {
        assert_eq!(format_angle(45.5), "45:30:00.00");
        assert_eq!(format_angle(-12.26), "-12:15:36.00");
        assert_eq!(format_angle(0.0), "0:00:00.00");
        assert_eq!(format_angle(-0.5), "-0:30:00.00");
        assert_eq!(format_ra(180.0), "12:00:00.00");
    }

    #[test]
    fn test_format_angle_carries_rounded_seconds() {
        // 59.999 seconds rounds up into the next minute
        let value = 10.0 + 59.0 / 60.0 + 59.999 / 3600.0;
        assert_eq!(format_angle(value), "11:00:00.00");
    }

    #[test]
    fn test_round_trip() {
        for &d in &[0.0, 1.5, -1.5, 45.123456, -0.0042, 89.99, -89.99, 359.87654, -33.3333] {
            let text = format_angle(d);
            let parsed =
                parse_angle(&text, CoordinateFormat::Sexagesimal, AngleUnit::Degrees).unwrap();
            // Hundredths of an arcsecond
            assert_close(parsed, d, 0.005 / 3600.0 + 1e-12);
            if d != 0.0 && d.abs() > 0.01 / 3600.0 {
                assert_eq!(parsed.is_sign_negative(), d.is_sign_negative(), "{text}");
            }
        }
    }

    #[test]
    fn test_coordinate_format_from_str() {
        assert_eq!(
            "decimal".parse::<CoordinateFormat>().unwrap(),
            CoordinateFormat::Decimal
        );
        assert_eq!(
            "Sexagesimal".parse::<CoordinateFormat>().unwrap(),
            CoordinateFormat::Sexagesimal
        );
        assert!("hms".parse::<CoordinateFormat>().is_err());
    }
}
