//! Offline survey pipelines: CSV -> prompt -> completion -> validated document.

use std::path::Path;

use crate::completion::{CompletionProvider, CompletionRequest};
use crate::error::ServiceResult;
use crate::prompts::PromptSet;
use crate::schemas::{
    events_response_format, measures_response_format, validate_events_output,
    validate_measures_output,
};
use crate::storage::{Document, DocumentStore};
use crate::survey::SurveyTable;
use crate::types::{EventsDocument, MeasuresDocument};

/// Which document a pipeline run regenerates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineKind {
    Events,
    Measures,
}

impl PipelineKind {
    pub fn output_file(&self) -> &'static str {
        match self {
            PipelineKind::Events => EventsDocument::FILE_NAME,
            PipelineKind::Measures => MeasuresDocument::FILE_NAME,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineReport {
    pub kind: PipelineKind,
    pub groups: usize,
    pub entries: usize,
}

fn build_request(kind: PipelineKind, prompts: &PromptSet, summary: String) -> CompletionRequest {
    let format = match kind {
        PipelineKind::Events => events_response_format(),
        PipelineKind::Measures => measures_response_format(),
    };
    CompletionRequest::new(&prompts.system_prompt, &prompts.instructions, summary)
        .with_response_format(format)
}

/// Run one pipeline end to end. The output file is only touched after the
/// completion validated.
pub fn run(
    kind: PipelineKind,
    csv_path: &Path,
    prompts_dir: &Path,
    provider: &dyn CompletionProvider,
    store: &DocumentStore,
) -> ServiceResult<PipelineReport> {
    let table = SurveyTable::read(csv_path)?;
    tracing::info!(
        csv = %csv_path.display(),
        columns = table.headers.len(),
        rows = table.rows.len(),
        "survey loaded"
    );

    let prompts = match kind {
        PipelineKind::Events => PromptSet::events(prompts_dir),
        PipelineKind::Measures => PromptSet::measures(prompts_dir),
    };
    let request = build_request(kind, &prompts, table.summarize());
    let raw = provider.complete(&request)?;
    tracing::debug!(chars = raw.len(), "completion received");

    let report = match kind {
        PipelineKind::Events => {
            let doc = validate_events_output(&raw)?;
            store.save(&doc)?;
            PipelineReport {
                kind,
                groups: doc.days.len(),
                entries: doc.event_count(),
            }
        }
        PipelineKind::Measures => {
            let doc = validate_measures_output(&raw)?;
            store.save(&doc)?;
            PipelineReport {
                kind,
                groups: doc.categories.len(),
                entries: doc.measure_count(),
            }
        }
    };

    tracing::info!(
        file = %store.data_dir().join(kind.output_file()).display(),
        entries = report.entries,
        "pipeline output written"
    );
    Ok(report)
}
