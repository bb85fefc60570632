use std::sync::Arc;

use crate::chart::ChartConfig;
use crate::survey::SurveyImageSource;

/// Immutable per-process server configuration
pub struct AppState {
    pub chart_config: ChartConfig,
    pub source: Arc<dyn SurveyImageSource>,
}

impl AppState {
    pub fn new(chart_config: ChartConfig, source: Arc<dyn SurveyImageSource>) -> Self {
        Self {
            chart_config,
            source,
        }
    }
}
