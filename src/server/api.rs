use serde::{Deserialize, Serialize};

use crate::chart::ChartRequest;
use crate::coordinates::CoordinateFormat;
use crate::error::{ChartError, Result};
use crate::survey::Survey;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

/// Query string of `/api/generate` and `/api/generate.png`
#[derive(Debug, Deserialize)]
pub struct ChartQuery {
    pub outepoch: f64,
    pub ra: String,
    pub dec: String,
    pub epoch: f64,
    pub rapm: f64,
    pub decpm: f64,
    /// Square field of view in arcmin, used when width/height are absent
    pub size: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub survey: Survey,
    pub format: Option<CoordinateFormat>,
    pub invert: Option<bool>,
}

impl ChartQuery {
    /// Validated chart request; coordinates are parsed here so bad text is
    /// rejected before any download starts
    pub fn to_request(&self) -> Result<ChartRequest> {
        let width = self.width.or(self.size);
        let height = self.height.or(self.size);
        let (Some(width_arcmin), Some(height_arcmin)) = (width, height) else {
            return Err(ChartError::InputFormat(
                "either size or both width and height are required".to_string(),
            ));
        };

        let request = ChartRequest {
            out_epoch: self.outepoch,
            ra: self.ra.clone(),
            dec: self.dec.clone(),
            format: self.format.unwrap_or_default(),
            epoch: self.epoch,
            pm_ra: self.rapm,
            pm_dec: self.decpm,
            width_arcmin,
            height_arcmin,
            survey: self.survey,
        };
        request.validate()?;
        request.catalog_position()?;
        Ok(request)
    }
}
