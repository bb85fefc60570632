// End-to-end chart generation against synthetic DSS plates served from disk.

#[cfg(test)]
mod tests {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    use crate::chart::{generate_chart, ChartConfig, ChartRequest, OutputMode};
    use crate::coordinates::CoordinateFormat;
    use crate::error::{ChartError, Result};
    use crate::survey::{
        DownloadedImage, LocalFitsSource, Survey, SurveyImageRequest, SurveyImageSource,
    };
    use crate::test_utils::{dss_cards, write_fits_f32, write_survey_plate};

    /// Local source that remembers where it put the temporary copy
    struct RecordingSource {
        inner: LocalFitsSource,
        last_path: Mutex<Option<PathBuf>>,
        last_request: Mutex<Option<SurveyImageRequest>>,
    }

    impl RecordingSource {
        fn new(path: &Path) -> Self {
            Self {
                inner: LocalFitsSource::new(path),
                last_path: Mutex::new(None),
                last_request: Mutex::new(None),
            }
        }

        fn last_path(&self) -> PathBuf {
            self.last_path.lock().unwrap().clone().unwrap()
        }
    }

    impl SurveyImageSource for RecordingSource {
        fn fetch(&self, request: &SurveyImageRequest) -> Result<DownloadedImage> {
            let image = self.inner.fetch(request)?;
            *self.last_path.lock().unwrap() = Some(image.path().to_path_buf());
            *self.last_request.lock().unwrap() = Some(request.clone());
            Ok(image)
        }
    }

    fn request() -> ChartRequest {
        ChartRequest {
            out_epoch: 2000.0,
            ra: "12:00:00.00".to_string(),
            dec: "+45:00:00.00".to_string(),
            format: CoordinateFormat::Sexagesimal,
            epoch: 2000.0,
            pm_ra: 0.0,
            pm_dec: 0.0,
            width_arcmin: 9.0,
            height_arcmin: 9.0,
            survey: Survey::Poss2UkstuRed,
        }
    }

    fn plate(dir: &Path) -> PathBuf {
        let path = dir.join("plate.fits");
        write_survey_plate(&path, 180.0, 45.0, 320, "1995-03-02").unwrap();
        path
    }

    #[test]
    fn test_zero_motion_positions_coincide() {
        let dir = tempfile::tempdir().unwrap();
        let source = LocalFitsSource::new(plate(dir.path()));

        let chart = generate_chart(&request(), &source, &ChartConfig::default()).unwrap();
        assert_eq!(chart.data_pos, chart.observing_pos);
        // Plate centre is pixel 159.5 of 320
        let expected = 159.5 * 512.0 / 320.0;
        assert!((chart.observing_pos[0] - expected).abs() < 0.01);
        assert!((chart.observing_pos[1] - (512.0 - expected)).abs() < 0.01);
        assert_eq!(chart.ra, "12:00:00.00");
        assert_eq!(chart.dec, "45:00:00.00");
        assert_eq!(chart.survey_label, "POSS2/UKSTU Red (1995)");
    }

    #[test]
    fn test_summary_carries_decodable_png() {
        let dir = tempfile::tempdir().unwrap();
        let source = LocalFitsSource::new(plate(dir.path()));

        let chart = generate_chart(&request(), &source, &ChartConfig::default()).unwrap();
        let summary = chart.summary();
        let encoded = summary
            .data
            .strip_prefix("data:image/png;base64,")
            .expect("data URI prefix");
        let png = STANDARD.decode(encoded).unwrap();
        let image = image::load_from_memory(&png).unwrap();
        assert_eq!((image.width(), image.height()), (512, 512));
    }

    #[test]
    fn test_proper_motion_moves_historical_position_south() {
        let dir = tempfile::tempdir().unwrap();
        let source = LocalFitsSource::new(plate(dir.path()));
        let moving = ChartRequest {
            pm_dec: 10.0,
            ..request()
        };

        let chart = generate_chart(&moving, &source, &ChartConfig::default()).unwrap();
        // 1995-03-02 is day 61: epoch 1995 + 60/366
        let years = 2000.0 - (1995.0 + 60.0 / 366.0);
        let expected_px = 10.0 * years / 1.68 * 512.0 / 320.0;

        let dx = chart.data_pos[0] - chart.observing_pos[0];
        let dy = chart.data_pos[1] - chart.observing_pos[1];
        assert!(dx.abs() < 1.0);
        assert!((dy - expected_px).abs() < 1.5, "dy {dy}, expected {expected_px}");
        assert!((chart.observed.dec - chart.target.dec + 10.0 * years / 3600.0).abs() < 1e-9);
    }

    #[test]
    fn test_positions_scale_with_canvas() {
        let dir = tempfile::tempdir().unwrap();
        let source = LocalFitsSource::new(plate(dir.path()));
        let moving = ChartRequest {
            pm_ra: -4.0,
            pm_dec: 2.5,
            ..request()
        };

        let large = generate_chart(&moving, &source, &ChartConfig::default()).unwrap();
        let small_config = ChartConfig {
            canvas_size: 256,
            ..Default::default()
        };
        let small = generate_chart(&moving, &source, &small_config).unwrap();

        for i in 0..2 {
            assert!((large.data_pos[i] - 2.0 * small.data_pos[i]).abs() < 1e-9);
            assert!((large.observing_pos[i] - 2.0 * small.observing_pos[i]).abs() < 1e-9);
        }
        assert!((large.indicator_size - 2.0 * small.indicator_size).abs() < 1e-9);
    }

    #[test]
    fn test_indicator_from_measured_stars() {
        let dir = tempfile::tempdir().unwrap();
        let source = LocalFitsSource::new(plate(dir.path()));

        let chart = generate_chart(&request(), &source, &ChartConfig::default()).unwrap();
        let radius = chart.indicator_size / (3.0 * 512.0 / 320.0);
        let expected = 2.0 * (2.0 * 2f64.ln()).sqrt();
        assert!((radius - expected).abs() < 0.15 * expected, "radius {radius}");
    }

    #[test]
    fn test_fetch_centred_on_target() {
        let dir = tempfile::tempdir().unwrap();
        let source = RecordingSource::new(&plate(dir.path()));
        let moving = ChartRequest {
            out_epoch: 2030.0,
            pm_dec: 1.2,
            ..request()
        };

        generate_chart(&moving, &source, &ChartConfig::default()).unwrap();
        let fetched = source.last_request.lock().unwrap().clone().unwrap();
        assert!((fetched.center.dec - (45.0 + 36.0 / 3600.0)).abs() < 1e-9);
        assert_eq!(fetched.width_arcmin, 9.0);
        assert_eq!(fetched.survey, Survey::Poss2UkstuRed);
    }

    #[test]
    fn test_annotated_chart_marks_target() {
        let dir = tempfile::tempdir().unwrap();
        let source = LocalFitsSource::new(plate(dir.path()));
        let config = ChartConfig {
            mode: OutputMode::AnnotatedRaster,
            ..Default::default()
        };

        let chart = generate_chart(&request(), &source, &config).unwrap();
        let image = image::load_from_memory(&chart.png).unwrap().to_rgb8();
        let [x, y] = chart.observing_pos;
        assert_eq!(image.get_pixel(x.round() as u32, y.round() as u32).0, [255, 0, 0]);
        // Legend backdrop in the top-left corner
        assert_eq!(image.get_pixel(3, 3).0, [0, 0, 0]);
    }

    #[test]
    fn test_temporary_file_removed_after_success() {
        let dir = tempfile::tempdir().unwrap();
        let source = RecordingSource::new(&plate(dir.path()));

        generate_chart(&request(), &source, &ChartConfig::default()).unwrap();
        assert!(!source.last_path().exists());
    }

    #[test]
    fn test_temporary_file_removed_after_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("undated.fits");
        let cards: Vec<(&str, String)> = dss_cards(180.0, 45.0, 64, 64, "1995-03-02")
            .into_iter()
            .filter(|(key, _)| *key != "DATE-OBS")
            .collect();
        write_fits_f32(&path, 64, 64, &vec![1.0; 64 * 64], &cards).unwrap();
        let source = RecordingSource::new(&path);

        let result = generate_chart(&request(), &source, &ChartConfig::default());
        assert!(matches!(result, Err(ChartError::HeaderParse(_))));
        assert!(!source.last_path().exists());
    }

    #[test]
    fn test_bad_coordinates_fail_before_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let source = RecordingSource::new(&plate(dir.path()));
        let bad = ChartRequest {
            dec: "45:00".to_string(),
            ..request()
        };

        let result = generate_chart(&bad, &source, &ChartConfig::default());
        assert!(matches!(result, Err(ChartError::InputFormat(_))));
        assert!(source.last_request.lock().unwrap().is_none());
    }
}
