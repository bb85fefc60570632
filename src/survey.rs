//! Survey image retrieval.
//!
//! A [`SurveyImageSource`] turns a [`SurveyImageRequest`] into a FITS file on
//! disk. The file lives in a uniquely named temporary file owned by the
//! returned [`DownloadedImage`] and is removed when that guard is dropped,
//! whichever way the chart pipeline exits.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::astrometry::{Astrometry, PixelPosition};
use crate::coordinates::SkyPosition;
use crate::error::{ChartError, Result};
use crate::fits::{FitsHeader, FitsImage};

pub const DEFAULT_ARCHIVE_URL: &str = "https://archive.stsci.edu/cgi-bin/dss_search";
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Plate collections served by the DSS archive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Survey {
    #[serde(rename = "poss2ukstu_red")]
    Poss2UkstuRed,
    #[serde(rename = "poss2ukstu_ir")]
    Poss2UkstuIr,
    #[serde(rename = "poss2ukstu_blue")]
    Poss2UkstuBlue,
    #[serde(rename = "poss1_blue")]
    Poss1Blue,
    #[serde(rename = "poss1_red")]
    Poss1Red,
    #[serde(rename = "quickv")]
    QuickV,
    #[serde(rename = "phase2_gsc2")]
    Phase2Gsc2,
    #[serde(rename = "phase2_gsc1")]
    Phase2Gsc1,
}

impl Survey {
    pub const ALL: [Survey; 8] = [
        Survey::Poss2UkstuRed,
        Survey::Poss2UkstuIr,
        Survey::Poss2UkstuBlue,
        Survey::Poss1Blue,
        Survey::Poss1Red,
        Survey::QuickV,
        Survey::Phase2Gsc2,
        Survey::Phase2Gsc1,
    ];

    /// Identifier used by the archive
    pub fn id(&self) -> &'static str {
        match self {
            Survey::Poss2UkstuRed => "poss2ukstu_red",
            Survey::Poss2UkstuIr => "poss2ukstu_ir",
            Survey::Poss2UkstuBlue => "poss2ukstu_blue",
            Survey::Poss1Blue => "poss1_blue",
            Survey::Poss1Red => "poss1_red",
            Survey::QuickV => "quickv",
            Survey::Phase2Gsc2 => "phase2_gsc2",
            Survey::Phase2Gsc1 => "phase2_gsc1",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Survey::Poss2UkstuRed => "POSS2/UKSTU Red",
            Survey::Poss2UkstuIr => "POSS2/UKSTU Infrared",
            Survey::Poss2UkstuBlue => "POSS2/UKSTU Blue",
            Survey::Poss1Blue => "POSS1 Blue",
            Survey::Poss1Red => "POSS1 Red",
            Survey::QuickV => "Quick-V",
            Survey::Phase2Gsc2 => "HST Phase 2 (GSC2)",
            Survey::Phase2Gsc1 => "HST Phase 2 (GSC1)",
        }
    }
}

impl std::str::FromStr for Survey {
    type Err = ChartError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_lowercase();
        Survey::ALL
            .into_iter()
            .find(|survey| survey.id() == s)
            .ok_or_else(|| ChartError::InputFormat(format!("unknown survey: {}", s)))
    }
}

impl std::fmt::Display for Survey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// One image cut-out to retrieve
#[derive(Debug, Clone)]
pub struct SurveyImageRequest {
    pub center: SkyPosition,
    pub width_arcmin: f64,
    pub height_arcmin: f64,
    pub survey: Survey,
}

/// A retrieved FITS file in a temporary location, deleted on drop
#[derive(Debug)]
pub struct DownloadedImage {
    file: NamedTempFile,
}

impl DownloadedImage {
    /// Create an empty, uniquely named temporary FITS file
    fn create() -> Result<Self> {
        let file = tempfile::Builder::new()
            .prefix("findingchart-")
            .suffix(".fits")
            .tempfile()?;
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

impl Drop for DownloadedImage {
    fn drop(&mut self) {
        debug!("Removing downloaded image {}", self.file.path().display());
    }
}

/// Anything that can produce a survey image for a request
pub trait SurveyImageSource: Send + Sync {
    fn fetch(&self, request: &SurveyImageRequest) -> Result<DownloadedImage>;
}

/// Archive endpoint and client settings
#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    pub url: String,
    pub timeout: Duration,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_ARCHIVE_URL.to_string(),
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

/// The STScI Digitized Sky Survey cut-out service
#[derive(Debug, Clone, Default)]
pub struct DssArchive {
    config: ArchiveConfig,
}

impl DssArchive {
    pub fn new(config: ArchiveConfig) -> Self {
        Self { config }
    }

    /// Cut-out URL for a request
    pub fn request_url(&self, request: &SurveyImageRequest) -> String {
        format!(
            "{}?r={}&dec={}&v={}&f=dss1&s=on&e=J2000&h={}&w={}",
            self.config.url,
            request.center.ra,
            request.center.dec,
            request.survey.id(),
            request.height_arcmin,
            request.width_arcmin
        )
    }
}

impl SurveyImageSource for DssArchive {
    fn fetch(&self, request: &SurveyImageRequest) -> Result<DownloadedImage> {
        let url = self.request_url(request);
        info!("Downloading {} image from {}", request.survey, url);

        // Blocking client: must be built and dropped outside the async runtime
        let client = reqwest::blocking::Client::builder()
            .timeout(self.config.timeout)
            .build()?;
        let response = client.get(&url).send()?;

        if !response.status().is_success() {
            return Err(ChartError::Fetch(format!(
                "archive returned {} for {}",
                response.status(),
                url
            )));
        }

        let body = response.bytes()?;
        if !body.starts_with(b"SIMPLE") {
            return Err(ChartError::Fetch(format!(
                "archive response for {} is not a FITS file",
                url
            )));
        }

        let mut image = DownloadedImage::create()?;
        image.file.write_all(&body)?;
        image.file.flush()?;
        debug!(
            "Saved {} bytes to {}",
            body.len(),
            image.path().display()
        );
        Ok(image)
    }
}

/// Serves a FITS file already on disk, whatever the request says
#[derive(Debug, Clone)]
pub struct LocalFitsSource {
    path: PathBuf,
}

impl LocalFitsSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SurveyImageSource for LocalFitsSource {
    fn fetch(&self, request: &SurveyImageRequest) -> Result<DownloadedImage> {
        info!(
            "Using local {} image {}",
            request.survey,
            self.path.display()
        );
        let mut source = File::open(&self.path)?;
        let mut image = DownloadedImage::create()?;
        io::copy(&mut source, image.file.as_file_mut())?;
        Ok(image)
    }
}

/// A loaded survey image with everything the chart needs from its header
pub struct SurveyImage {
    pub width: usize,
    pub height: usize,
    /// Row-major, first FITS row first
    pub data: Vec<f64>,
    pub header: FitsHeader,
    pub astrometry: Astrometry,
    /// Fractional year of the exposure
    pub observation_epoch: f64,
    /// Physical plate scale in arcsec per pixel, when the header carries one
    pub plate_scale_arcsec: Option<f64>,
}

impl SurveyImage {
    pub fn load(path: &Path) -> Result<Self> {
        let image = FitsImage::from_file(path)?;
        Self::from_fits(image)
    }

    pub fn from_fits(image: FitsImage) -> Result<Self> {
        let observation_epoch = image.observation_epoch()?;
        let plate_scale_arcsec = image.plate_scale_arcsec();
        let astrometry = Astrometry::from_header(&image.header)?;
        let loaded = Self {
            width: image.width,
            height: image.height,
            data: image.data,
            header: image.header,
            astrometry,
            observation_epoch,
            plate_scale_arcsec,
        };
        let (ra, dec) = loaded.center_sky();
        debug!(
            "Loaded {}x{} survey image centred on RA {:.5} Dec {:.5}, epoch {:.3}",
            loaded.width, loaded.height, ra, dec, loaded.observation_epoch
        );
        Ok(loaded)
    }

    /// Sky position (RA, Dec in degrees) of the image centre
    pub fn center_sky(&self) -> (f64, f64) {
        let x = (self.width as f64 - 1.0) / 2.0;
        let y = (self.height as f64 - 1.0) / 2.0;
        self.astrometry.pixel_to_sky(PixelPosition::new(x, y))
    }

    /// Calendar year of the exposure
    pub fn observation_year(&self) -> i32 {
        self.observation_epoch.floor() as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{dss_cards, write_fits_f32, write_survey_plate};

    fn request(survey: Survey) -> SurveyImageRequest {
        SurveyImageRequest {
            center: SkyPosition::new(180.0, 45.0, 2000.0),
            width_arcmin: 10.0,
            height_arcmin: 8.0,
            survey,
        }
    }

    #[test]
    fn test_survey_ids_round_trip() {
        for survey in Survey::ALL {
            assert_eq!(survey.id().parse::<Survey>().unwrap(), survey);
            assert_eq!(survey.to_string(), survey.id());
        }
        assert!(matches!(
            "sdss_r".parse::<Survey>(),
            Err(ChartError::InputFormat(_))
        ));
    }

    #[test]
    fn test_survey_serde_uses_archive_ids() {
        let json = serde_json::to_string(&Survey::Poss1Red).unwrap();
        assert_eq!(json, "\"poss1_red\"");
        let survey: Survey = serde_json::from_str("\"phase2_gsc2\"").unwrap();
        assert_eq!(survey, Survey::Phase2Gsc2);
    }

    #[test]
    fn test_request_url() {
        let archive = DssArchive::default();
        let url = archive.request_url(&request(Survey::Poss2UkstuRed));
        assert_eq!(
            url,
            "https://archive.stsci.edu/cgi-bin/dss_search?r=180&dec=45&v=poss2ukstu_red&f=dss1&s=on&e=J2000&h=8&w=10"
        );
    }

    #[test]
    fn test_local_source_copies_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plate.fits");
        write_fits_f32(
            &path,
            32,
            32,
            &vec![1.0; 32 * 32],
            &dss_cards(180.0, 45.0, 32, 32, "1993-04-17T05:93:00"),
        )
        .unwrap();

        let source = LocalFitsSource::new(&path);
        let downloaded = source.fetch(&request(Survey::Poss1Blue)).unwrap();
        let temp_path = downloaded.path().to_path_buf();
        assert_ne!(temp_path, path);
        assert!(temp_path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("findingchart-"));

        let image = SurveyImage::load(&temp_path).unwrap();
        assert_eq!((image.width, image.height), (32, 32));
        assert_eq!(image.observation_year(), 1993);
        assert!(matches!(image.astrometry, Astrometry::Dss(_)));
        assert!((image.plate_scale_arcsec.unwrap() - 1.68).abs() < 1e-12);

        drop(downloaded);
        assert!(!temp_path.exists());
        assert!(path.exists());
    }

    #[test]
    fn test_center_sky_matches_plate_centre() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plate.fits");
        write_survey_plate(&path, 180.0, 45.0, 64, "1995-03-02").unwrap();

        let image = SurveyImage::load(&path).unwrap();
        let (ra, dec) = image.center_sky();
        assert!(((ra - 180.0) * 45f64.to_radians().cos()).abs() < 1e-4, "ra {ra}");
        assert!((dec - 45.0).abs() < 1e-4, "dec {dec}");
    }

    #[test]
    fn test_local_source_missing_file() {
        let source = LocalFitsSource::new("/nonexistent/plate.fits");
        assert!(matches!(
            source.fetch(&request(Survey::QuickV)),
            Err(ChartError::Io(_))
        ));
    }

    #[test]
    fn test_load_without_plate_solution() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bare.fits");
        write_fits_f32(
            &path,
            8,
            8,
            &[0.0; 64],
            &[("DATE-OBS", "'1990-01-01'".to_string())],
        )
        .unwrap();
        assert!(matches!(
            SurveyImage::load(&path),
            Err(ChartError::Astrometry(_))
        ));
    }
}
