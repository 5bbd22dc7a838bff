//! Strict shapes for AI completions.
//!
//! The model is asked for JSON, but nothing it returns is trusted: the text is
//! parsed into the types below (unknown keys, unknown days or categories and
//! missing fields are all rejected) before anything is handed to storage.

use regex::Regex;
use schemars::JsonSchema;
use schemars::generate::SchemaSettings;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::error::{ServiceError, ServiceResult};
use crate::types::{
    Event, EventsDocument, Measure, MeasureCategory, MeasureStatus, MeasuresDocument, Priority,
    Weekday, WorkMode,
};

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*```[A-Za-z]*\s*\n(.*?)\n?\s*```\s*$").expect("valid fence regex")
});

/// One event as produced by the events pipeline.
#[derive(Clone, Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct AiEvent {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(alias = "start")]
    pub hour: u8,
    pub duration: u8,
    pub category: WorkMode,
}

/// One measure as produced by the measures pipeline. Status is assigned locally.
#[derive(Clone, Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct AiMeasure {
    pub title: String,
    pub description: String,
    pub priority: Priority,
}

type AiEventPlan = BTreeMap<Weekday, Vec<AiEvent>>;
type AiMeasurePlan = BTreeMap<MeasureCategory, Vec<AiMeasure>>;

/// Remove a surrounding Markdown code fence, if the model added one.
pub fn strip_code_fence(raw: &str) -> &str {
    CODE_FENCE
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(raw)
        .trim()
}

fn parse_strict<T: DeserializeOwned>(raw: &str, what: &str) -> ServiceResult<T> {
    let body = strip_code_fence(raw);
    if body.is_empty() {
        return Err(ServiceError::Validation(format!("{what}: empty completion")));
    }
    serde_json::from_str(body).map_err(|err| ServiceError::Validation(format!("{what}: {err}")))
}

pub fn validate_events_output(raw: &str) -> ServiceResult<EventsDocument> {
    let plan: AiEventPlan = parse_strict(raw, "events plan")?;
    let mut doc = EventsDocument::default();
    for (day, items) in plan {
        let mut events = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            let event = Event {
                title: item.title,
                description: item.description,
                hour: item.hour,
                duration: item.duration,
                category: Some(item.category),
            };
            event.validate().map_err(|err| {
                ServiceError::Validation(format!("{day} event at index {index}: {err}"))
            })?;
            if let Some(clash) = events.iter().position(|e: &Event| e.overlaps(&event)) {
                return Err(ServiceError::Validation(format!(
                    "{day} event at index {index} overlaps event at index {clash}"
                )));
            }
            events.push(event);
        }
        doc.days.insert(day, events);
    }
    Ok(doc)
}

pub fn validate_measures_output(raw: &str) -> ServiceResult<MeasuresDocument> {
    let plan: AiMeasurePlan = parse_strict(raw, "measures plan")?;
    let mut doc = MeasuresDocument::default();
    for (category, items) in plan {
        let mut measures = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            let measure = Measure {
                title: item.title,
                description: item.description,
                priority: item.priority,
                status: MeasureStatus::Proposed,
            };
            measure.validate().map_err(|err| {
                ServiceError::Validation(format!("{category} measure at index {index}: {err}"))
            })?;
            measures.push(measure);
        }
        doc.categories.insert(category, measures);
    }
    Ok(doc)
}

/// Self-contained item schema: subschemas are inlined so no `$ref` points at
/// `$defs` that would be dropped when nesting it under `items`.
fn item_schema<T: JsonSchema>() -> Value {
    let schema = SchemaSettings::draft2020_12()
        .with(|s| s.inline_subschemas = true)
        .into_generator()
        .into_root_schema_for::<T>();
    let mut value = serde_json::to_value(schema).unwrap_or_else(|_| json!({}));
    if let Some(obj) = value.as_object_mut() {
        obj.remove("$schema");
    }
    value
}

fn keyed_arrays_schema<'a>(keys: impl Iterator<Item = &'a str>, items: Value) -> Value {
    let mut properties = Map::new();
    for key in keys {
        properties.insert(
            key.to_string(),
            json!({ "type": "array", "items": items.clone() }),
        );
    }
    json!({
        "type": "object",
        "properties": properties,
        "additionalProperties": false
    })
}

/// `response_format` payload asking the model for an events plan.
pub fn events_response_format() -> Value {
    json!({
        "type": "json_schema",
        "json_schema": {
            "name": "events_plan",
            "schema": keyed_arrays_schema(
                Weekday::ALL.iter().map(Weekday::as_str),
                item_schema::<AiEvent>(),
            )
        }
    })
}

/// `response_format` payload asking the model for a measures plan.
pub fn measures_response_format() -> Value {
    json!({
        "type": "json_schema",
        "json_schema": {
            "name": "massnahmen_plan",
            "schema": keyed_arrays_schema(
                MeasureCategory::ALL.iter().map(MeasureCategory::as_str),
                item_schema::<AiMeasure>(),
            )
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn accepts_well_formed_measures() {
        let raw = r#"{
            "arbeitsplatz": [
                {"title": "Ruhezonen", "description": "Stille Bereiche schaffen", "priority": "hoch"}
            ],
            "einmalige_massnahmen": []
        }"#;
        let doc = validate_measures_output(raw).unwrap();
        let items = &doc.categories[&MeasureCategory::Arbeitsplatz];
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].priority, Priority::High);
        assert_eq!(items[0].status, MeasureStatus::Proposed);
        assert!(doc.categories[&MeasureCategory::EinmaligeMassnahmen].is_empty());
    }

    #[test]
    fn rejects_measure_without_priority() {
        let raw = r#"{"arbeitsplatz": [{"title": "A", "description": "B"}]}"#;
        let err = validate_measures_output(raw).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert!(err.to_string().contains("priority"));
    }

    #[test]
    fn rejects_extra_fields_and_unknown_categories() {
        let extra = r#"{"arbeitsplatz": [{"title": "A", "description": "B", "priority": "hoch", "owner": "x"}]}"#;
        assert!(validate_measures_output(extra).is_err());
        let unknown = r#"{"kantine": []}"#;
        assert!(validate_measures_output(unknown).is_err());
    }

    #[test]
    fn events_output_accepts_fenced_json_and_start_alias() {
        let raw = "```json\n{\"Monday\": [{\"title\": \"Jour fixe\", \"start\": 10, \"duration\": 1, \"category\": \"presence\"}]}\n```";
        let doc = validate_events_output(raw).unwrap();
        let monday = &doc.days[&Weekday::Monday];
        assert_eq!(monday[0].hour, 10);
        assert_eq!(monday[0].category, Some(WorkMode::Presence));
    }

    #[test]
    fn events_output_rejects_bad_day_and_range() {
        assert!(validate_events_output(r#"{"Sunday": []}"#).is_err());
        let late = r#"{"Friday": [{"title": "x", "hour": 30, "duration": 1, "category": "flex"}]}"#;
        assert!(validate_events_output(late).is_err());
        assert!(validate_events_output("Sorry, I cannot help with that.").is_err());
        assert!(validate_events_output("").is_err());
    }

    #[test]
    fn events_output_rejects_overlaps_within_a_day() {
        let clash = r#"{"Monday": [
            {"title": "Workshop", "hour": 9, "duration": 3, "category": "presence"},
            {"title": "Standup", "hour": 10, "duration": 1, "category": "flex"}
        ]}"#;
        let err = validate_events_output(clash).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(ref m) if m.contains("overlaps")));

        let split_days = r#"{
            "Monday": [{"title": "Workshop", "hour": 9, "duration": 3, "category": "presence"}],
            "Tuesday": [{"title": "Standup", "hour": 10, "duration": 1, "category": "flex"}]
        }"#;
        assert!(validate_events_output(split_days).is_ok());
    }

    fn collect_refs(value: &Value, refs: &mut Vec<String>) {
        match value {
            Value::Object(map) => {
                for (key, inner) in map {
                    if key == "$ref" {
                        if let Some(target) = inner.as_str() {
                            refs.push(target.to_string());
                        }
                    }
                    collect_refs(inner, refs);
                }
            }
            Value::Array(items) => items.iter().for_each(|v| collect_refs(v, refs)),
            _ => {}
        }
    }

    #[test]
    fn response_formats_are_self_contained() {
        for format in [events_response_format(), measures_response_format()] {
            let mut refs = Vec::new();
            collect_refs(&format, &mut refs);
            assert!(refs.is_empty(), "unresolved references: {refs:?}");
            let text = format.to_string();
            assert!(!text.contains("$defs"));
        }
        let measures = measures_response_format();
        let priority = &measures["json_schema"]["schema"]["properties"]["arbeitsplatz"]["items"]
            ["properties"]["priority"];
        assert_eq!(priority["enum"], json!(["hoch", "mittel", "niedrig"]));
    }

    #[test]
    fn response_formats_list_every_key() {
        let events = events_response_format();
        let props = &events["json_schema"]["schema"]["properties"];
        for day in Weekday::ALL {
            assert_eq!(props[day.as_str()]["type"], json!("array"));
        }
        let measures = measures_response_format();
        assert_eq!(measures["json_schema"]["name"], json!("massnahmen_plan"));
        assert!(
            measures["json_schema"]["schema"]["properties"]["zusammenarbeit"]["items"]
                .get("$schema")
                .is_none()
        );
    }
}
