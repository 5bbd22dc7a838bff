//! Load-mutate-save operations behind the REST endpoints.
//!
//! Each call reads the whole document, changes it in memory and writes it
//! back. Concurrent writers to the same document are last-write-wins.

use crate::error::{ServiceError, ServiceResult};
use crate::storage::DocumentStore;
use crate::types::{
    AddEventRequest, AddMeasureRequest, EventsDocument, Measure, MeasureCategory,
    MeasuresDocument, Weekday,
};

pub fn list_events(store: &DocumentStore) -> EventsDocument {
    store.load()
}

pub fn create_event(store: &DocumentStore, request: AddEventRequest) -> ServiceResult<EventsDocument> {
    let day: Weekday = request.day.parse().map_err(ServiceError::BadRequest)?;
    let event = request.event;
    event.validate().map_err(ServiceError::BadRequest)?;

    let mut doc: EventsDocument = store.load();
    let day_events = doc.days.entry(day).or_default();
    if day_events.iter().any(|existing| existing.overlaps(&event)) {
        return Err(ServiceError::Conflict(
            "Event overlaps with an existing event".to_string(),
        ));
    }
    tracing::info!(%day, title = %event.title, "event created");
    day_events.push(event);
    store.save(&doc)?;
    Ok(doc)
}

pub fn delete_event(store: &DocumentStore, day: &str, index: usize) -> ServiceResult<EventsDocument> {
    let day: Weekday = day
        .parse()
        .map_err(|_| ServiceError::NotFound("Day not found".to_string()))?;

    let mut doc: EventsDocument = store.load();
    let day_events = doc
        .days
        .get_mut(&day)
        .ok_or_else(|| ServiceError::NotFound("Day not found".to_string()))?;
    if index >= day_events.len() {
        return Err(ServiceError::NotFound("Event index not found".to_string()));
    }
    let removed = day_events.remove(index);
    tracing::info!(%day, index, title = %removed.title, "event deleted");
    store.save(&doc)?;
    Ok(doc)
}

fn parse_category(raw: &str) -> ServiceResult<MeasureCategory> {
    raw.parse()
        .map_err(|_| ServiceError::NotFound(format!("Category not found: {raw}")))
}

pub fn list_measures(store: &DocumentStore) -> MeasuresDocument {
    store.load()
}

pub fn create_measure(
    store: &DocumentStore,
    request: AddMeasureRequest,
) -> ServiceResult<MeasuresDocument> {
    let category: MeasureCategory = request
        .category
        .parse()
        .map_err(ServiceError::BadRequest)?;
    request.measure.validate().map_err(ServiceError::BadRequest)?;

    let mut doc: MeasuresDocument = store.load();
    tracing::info!(%category, title = %request.measure.title, "measure created");
    doc.categories
        .entry(category)
        .or_default()
        .push(request.measure);
    store.save(&doc)?;
    Ok(doc)
}

fn measure_slot<'a>(
    doc: &'a mut MeasuresDocument,
    category: MeasureCategory,
    index: usize,
) -> ServiceResult<&'a mut Vec<Measure>> {
    let items = doc
        .categories
        .get_mut(&category)
        .ok_or_else(|| ServiceError::NotFound(format!("Category not found: {category}")))?;
    if index >= items.len() {
        return Err(ServiceError::NotFound("Measure index not found".to_string()));
    }
    Ok(items)
}

pub fn update_measure(
    store: &DocumentStore,
    category: &str,
    index: usize,
    measure: Measure,
) -> ServiceResult<MeasuresDocument> {
    let category = parse_category(category)?;
    measure.validate().map_err(ServiceError::BadRequest)?;

    let mut doc: MeasuresDocument = store.load();
    let items = measure_slot(&mut doc, category, index)?;
    tracing::info!(%category, index, status = ?measure.status, "measure updated");
    items[index] = measure;
    store.save(&doc)?;
    Ok(doc)
}

pub fn delete_measure(
    store: &DocumentStore,
    category: &str,
    index: usize,
) -> ServiceResult<MeasuresDocument> {
    let category = parse_category(category)?;

    let mut doc: MeasuresDocument = store.load();
    let items = measure_slot(&mut doc, category, index)?;
    let removed = items.remove(index);
    tracing::info!(%category, index, title = %removed.title, "measure deleted");
    store.save(&doc)?;
    Ok(doc)
}
