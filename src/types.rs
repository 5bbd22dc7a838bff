use chrono::Utc;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Working days an event can be planned on. Ordering follows the week.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
}

impl Weekday {
    pub const ALL: [Weekday; 5] = [
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Weekday::Monday => "Monday",
            Weekday::Tuesday => "Tuesday",
            Weekday::Wednesday => "Wednesday",
            Weekday::Thursday => "Thursday",
            Weekday::Friday => "Friday",
        }
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Weekday {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Weekday::ALL
            .into_iter()
            .find(|day| day.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown day: {s}"))
    }
}

/// Attendance mode of an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum WorkMode {
    Presence,
    Flex,
    HomeOffice,
}

fn default_duration() -> u8 {
    1
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Event {
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Start hour, 0-23.
    #[serde(alias = "start")]
    pub hour: u8,
    /// Length in whole hours, 1-24.
    #[serde(default = "default_duration")]
    pub duration: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<WorkMode>,
}

impl Event {
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("Event title must not be empty".to_string());
        }
        if self.hour > 23 {
            return Err(format!("Event hour {} is outside 0-23", self.hour));
        }
        if !(1..=24).contains(&self.duration) {
            return Err(format!("Event duration {} is outside 1-24", self.duration));
        }
        Ok(())
    }

    pub fn end(&self) -> u32 {
        u32::from(self.hour) + u32::from(self.duration)
    }

    /// Half-open `[hour, hour + duration)` intersection.
    pub fn overlaps(&self, other: &Event) -> bool {
        u32::from(self.hour) < other.end() && self.end() > u32::from(other.hour)
    }
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum MeasureCategory {
    EinmaligeMassnahmen,
    Arbeitsplatz,
    Zusammenarbeit,
}

impl MeasureCategory {
    pub const ALL: [MeasureCategory; 3] = [
        MeasureCategory::EinmaligeMassnahmen,
        MeasureCategory::Arbeitsplatz,
        MeasureCategory::Zusammenarbeit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MeasureCategory::EinmaligeMassnahmen => "einmalige_massnahmen",
            MeasureCategory::Arbeitsplatz => "arbeitsplatz",
            MeasureCategory::Zusammenarbeit => "zusammenarbeit",
        }
    }
}

impl fmt::Display for MeasureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MeasureCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MeasureCategory::ALL
            .into_iter()
            .find(|category| category.as_str() == s.trim())
            .ok_or_else(|| format!("Unknown category: {s}"))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum Priority {
    #[serde(rename = "hoch", alias = "high")]
    High,
    #[serde(rename = "mittel", alias = "medium")]
    Medium,
    #[serde(rename = "niedrig", alias = "low")]
    Low,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum MeasureStatus {
    #[default]
    Proposed,
    Accepted,
    Declined,
}

/// A team improvement measure (Maßnahme).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Measure {
    pub title: String,
    pub description: String,
    pub priority: Priority,
    #[serde(default)]
    pub status: MeasureStatus,
}

impl Measure {
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("Measure title must not be empty".to_string());
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: ChatRole,
    pub text: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub error: bool,
}

impl ChatMessage {
    pub fn new(role: ChatRole, text: impl Into<String>) -> Self {
        Self {
            id: Ulid::new().to_string(),
            role,
            text: text.into(),
            timestamp: Utc::now().to_rfc3339(),
            error: false,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventsDocument {
    pub days: BTreeMap<Weekday, Vec<Event>>,
}

impl EventsDocument {
    pub fn event_count(&self) -> usize {
        self.days.values().map(Vec::len).sum()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MeasuresDocument {
    pub categories: BTreeMap<MeasureCategory, Vec<Measure>>,
}

impl MeasuresDocument {
    pub fn measure_count(&self) -> usize {
        self.categories.values().map(Vec::len).sum()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessagesDocument {
    pub messages: Vec<ChatMessage>,
}

// Request / response bodies of the HTTP API

#[derive(Clone, Debug, Deserialize)]
pub struct AddEventRequest {
    pub day: String,
    pub event: Event,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AddMeasureRequest {
    pub category: String,
    pub measure: Measure,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ChatRequest {
    pub text: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct EventsResponse {
    pub events: EventsDocument,
}

#[derive(Clone, Debug, Serialize)]
pub struct MeasuresResponse {
    pub massnahmen: MeasuresDocument,
}

#[derive(Clone, Debug, Serialize)]
pub struct MessagesResponse {
    pub messages: Vec<ChatMessage>,
}
