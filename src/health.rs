use serde::Serialize;

use crate::server::AppState;
use crate::types::{EventsDocument, MeasuresDocument, MessagesDocument};

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub ai_configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HealthDetails>,
}

#[derive(Debug, Serialize)]
pub struct HealthDetails {
    pub data_dir: String,
    pub events: usize,
    pub measures: usize,
    pub messages: usize,
    pub survey_present: bool,
}

pub fn health_report(state: &AppState, verbose: bool) -> HealthReport {
    let details = verbose.then(|| {
        let store = &state.store;
        HealthDetails {
            data_dir: store.data_dir().display().to_string(),
            events: store.load::<EventsDocument>().event_count(),
            measures: store.load::<MeasuresDocument>().measure_count(),
            messages: store.load::<MessagesDocument>().messages.len(),
            survey_present: store.survey_path().exists(),
        }
    });
    HealthReport {
        status: "ok",
        version: state.version,
        uptime_seconds: state.uptime().as_secs(),
        ai_configured: state.provider.is_some(),
        details,
    }
}
