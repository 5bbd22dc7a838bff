use std::fs;
use std::path::Path;

use crate::types::{ChatMessage, ChatRole, EventsDocument, MeasuresDocument};

pub const EVENTS_SYSTEM_PROMPT: &str = r#"You are a planning assistant for a team that works in a hybrid setup. Based on a staff survey you propose a weekly schedule of recurring team events.

Rules:
- Only use the days Monday to Friday.
- Every event has a title, an optional description, a start hour (0-23), a duration in whole hours (1-24) and a category.
- The category is one of "presence" (everyone on site), "flex" (on site or remote) or "home-office".
- Events on the same day must not overlap.
- Answer with JSON only, no explanations."#;

pub const EVENTS_INSTRUCTIONS: &str = r#"Create the weekly event plan from the survey answers below. Return an object whose keys are weekday names and whose values are lists of events."#;

pub const MEASURES_SYSTEM_PROMPT: &str = r#"Du bist ein Berater für hybride Zusammenarbeit. Aus den Antworten einer Mitarbeiterbefragung leitest du konkrete Maßnahmen ab.

Regeln:
- Jede Maßnahme hat einen Titel, eine Beschreibung und eine Priorität ("hoch", "mittel" oder "niedrig").
- Ordne jede Maßnahme genau einer Kategorie zu: "einmalige_massnahmen", "arbeitsplatz" oder "zusammenarbeit".
- Antworte ausschließlich mit JSON."#;

pub const MEASURES_INSTRUCTIONS: &str = r#"Leite aus den folgenden Umfrageergebnissen Maßnahmen ab und gruppiere sie nach Kategorie."#;

pub const CHAT_SYSTEM_PROMPT: &str = r#"You are the assistant of a hybrid work planning tool. You know the team's weekly events, the agreed improvement measures and the survey results shown in the context. Answer questions about them briefly and concretely. Reply in the language the user writes in."#;

/// Number of earlier messages included in the chat context.
pub const CHAT_HISTORY_WINDOW: usize = 20;

/// Prompt texts for one AI call, with optional file overrides.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptSet {
    pub system_prompt: String,
    pub instructions: String,
}

fn read_override(dir: &Path, file_name: &str, fallback: &str) -> String {
    let path = dir.join(file_name);
    match fs::read_to_string(&path) {
        Ok(text) if !text.trim().is_empty() => {
            tracing::debug!(file = %path.display(), "using prompt override");
            text
        }
        _ => fallback.to_string(),
    }
}

impl PromptSet {
    pub fn events(dir: &Path) -> Self {
        Self {
            system_prompt: read_override(dir, "system_prompt_events.txt", EVENTS_SYSTEM_PROMPT),
            instructions: read_override(dir, "instructions_events.txt", EVENTS_INSTRUCTIONS),
        }
    }

    pub fn measures(dir: &Path) -> Self {
        Self {
            system_prompt: read_override(
                dir,
                "system_prompt_massnahmen.txt",
                MEASURES_SYSTEM_PROMPT,
            ),
            instructions: read_override(dir, "instructions_massnahmen.txt", MEASURES_INSTRUCTIONS),
        }
    }

    pub fn chat(dir: &Path) -> Self {
        Self {
            system_prompt: read_override(dir, "system_prompt_chat.txt", CHAT_SYSTEM_PROMPT),
            instructions: String::new(),
        }
    }
}

/// Context block placed before the user's chat message.
pub fn build_chat_context(
    events: &EventsDocument,
    measures: &MeasuresDocument,
    survey_summary: Option<&str>,
    history: &[ChatMessage],
) -> String {
    let mut out = String::new();

    out.push_str("## Weekly events\n");
    out.push_str(&serde_json::to_string_pretty(events).unwrap_or_else(|_| "{}".into()));
    out.push_str("\n\n## Measures\n");
    out.push_str(&serde_json::to_string_pretty(measures).unwrap_or_else(|_| "{}".into()));

    if let Some(summary) = survey_summary.filter(|s| !s.trim().is_empty()) {
        out.push_str("\n\n## Survey results\n");
        out.push_str(summary);
    }

    let start = history.len().saturating_sub(CHAT_HISTORY_WINDOW);
    let recent: Vec<&ChatMessage> = history[start..].iter().filter(|m| !m.error).collect();
    if !recent.is_empty() {
        out.push_str("\n\n## Conversation so far\n");
        for message in recent {
            let who = match message.role {
                ChatRole::User => "User",
                ChatRole::Assistant => "Assistant",
            };
            out.push_str(&format!("{who}: {}\n", message.text));
        }
    }

    out
}
