//! Request routing for the REST API.

use http_body_util::{BodyExt, Full};
use hyper::body::{Body, Bytes};
use hyper::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    CONTENT_TYPE, HeaderValue,
};
use hyper::{Method, Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;
use std::fmt::Display;
use std::sync::Arc;

use crate::error::{ServiceError, ServiceResult};
use crate::server::AppState;
use crate::types::{
    AddEventRequest, AddMeasureRequest, ChatRequest, EventsResponse, Measure, MeasuresResponse,
    MessagesResponse,
};
use crate::{api, chat, health};

type HttpResponse = Response<Full<Bytes>>;

#[derive(Debug, Deserialize)]
struct DeleteEventQuery {
    day: String,
    index: usize,
}

#[derive(Debug, Default, Deserialize)]
struct HealthQuery {
    #[serde(default)]
    verbose: bool,
}

pub async fn handle<B>(state: Arc<AppState>, req: Request<B>) -> Result<HttpResponse, Infallible>
where
    B: Body,
    B::Error: Display,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().unwrap_or_default().to_string();

    let response = match req.into_body().collect().await {
        Ok(collected) => dispatch(state, &method, &path, &query, collected.to_bytes())
            .await
            .unwrap_or_else(|err| error_response(&err)),
        Err(err) => error_response(&ServiceError::BadRequest(format!(
            "Failed to read request body: {err}"
        ))),
    };

    tracing::info!(%method, %path, status = response.status().as_u16(), "request");
    Ok(with_cors(response))
}

async fn dispatch(
    state: Arc<AppState>,
    method: &Method,
    path: &str,
    query: &str,
    body: Bytes,
) -> ServiceResult<HttpResponse> {
    if method == Method::OPTIONS {
        return Ok(empty_response(StatusCode::NO_CONTENT));
    }

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    match (method, segments.as_slice()) {
        (&Method::GET, []) => Ok(json_response(StatusCode::OK, &json!({ "status": "ok" }))),
        (&Method::GET, ["health"]) => {
            let HealthQuery { verbose } = parse_query(query)?;
            let report = blocking(move || Ok(health::health_report(&state, verbose))).await?;
            Ok(json_response(StatusCode::OK, &report))
        }

        (&Method::GET, ["events"]) => {
            let events = blocking(move || Ok(api::list_events(&state.store))).await?;
            Ok(json_response(StatusCode::OK, &EventsResponse { events }))
        }
        (&Method::POST, ["events"]) => {
            let request: AddEventRequest = parse_body(&body)?;
            let events = blocking(move || api::create_event(&state.store, request)).await?;
            Ok(json_response(StatusCode::OK, &EventsResponse { events }))
        }
        (&Method::DELETE, ["events"]) => {
            let DeleteEventQuery { day, index } = parse_query(query)?;
            let events = blocking(move || api::delete_event(&state.store, &day, index)).await?;
            Ok(json_response(StatusCode::OK, &EventsResponse { events }))
        }

        (&Method::GET, ["massnahmen"]) => {
            let massnahmen = blocking(move || Ok(api::list_measures(&state.store))).await?;
            Ok(json_response(StatusCode::OK, &MeasuresResponse { massnahmen }))
        }
        (&Method::POST, ["massnahmen"]) => {
            let request: AddMeasureRequest = parse_body(&body)?;
            let massnahmen = blocking(move || api::create_measure(&state.store, request)).await?;
            Ok(json_response(StatusCode::OK, &MeasuresResponse { massnahmen }))
        }
        (&Method::PUT, ["massnahmen", category, index]) => {
            let measure: Measure = parse_body(&body)?;
            let category = category.to_string();
            let index = parse_index(index)?;
            let massnahmen = blocking(move || {
                api::update_measure(&state.store, &category, index, measure)
            })
            .await?;
            Ok(json_response(StatusCode::OK, &MeasuresResponse { massnahmen }))
        }
        (&Method::DELETE, ["massnahmen", category, index]) => {
            let category = category.to_string();
            let index = parse_index(index)?;
            let massnahmen =
                blocking(move || api::delete_measure(&state.store, &category, index)).await?;
            Ok(json_response(StatusCode::OK, &MeasuresResponse { massnahmen }))
        }

        (&Method::GET, ["chat"]) => {
            let messages = blocking(move || Ok(chat::list_messages(&state.store))).await?;
            Ok(json_response(StatusCode::OK, &MessagesResponse { messages }))
        }
        (&Method::POST, ["chat"]) => {
            let request: ChatRequest = parse_body(&body)?;
            let messages = blocking(move || {
                chat::post_message(
                    &state.store,
                    &state.prompts_dir,
                    state.provider.as_deref(),
                    &request.text,
                )
            })
            .await?;
            Ok(json_response(StatusCode::OK, &MessagesResponse { messages }))
        }

        (_, [] | ["health"] | ["events"] | ["massnahmen"] | ["massnahmen", _, _] | ["chat"]) => {
            Ok(detail_response(
                StatusCode::METHOD_NOT_ALLOWED,
                "Method not allowed",
            ))
        }
        _ => Err(ServiceError::NotFound("Not found".to_string())),
    }
}

/// Run storage and AI work off the async executor.
async fn blocking<T, F>(f: F) -> ServiceResult<T>
where
    F: FnOnce() -> ServiceResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ServiceError::FromString(format!("spawn_blocking failed: {e}")))?
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> ServiceResult<T> {
    serde_json::from_slice(body)
        .map_err(|e| ServiceError::BadRequest(format!("Invalid request body: {e}")))
}

fn parse_query<T: DeserializeOwned>(query: &str) -> ServiceResult<T> {
    serde_urlencoded::from_str(query)
        .map_err(|e| ServiceError::BadRequest(format!("Invalid query string: {e}")))
}

fn parse_index(raw: &str) -> ServiceResult<usize> {
    raw.parse()
        .map_err(|_| ServiceError::BadRequest(format!("Invalid index '{raw}'")))
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> HttpResponse {
    match serde_json::to_vec(body) {
        Ok(bytes) => {
            let mut response = Response::new(Full::new(Bytes::from(bytes)));
            *response.status_mut() = status;
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(err) => {
            tracing::error!("failed to encode response: {err}");
            empty_response(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

fn detail_response(status: StatusCode, detail: &str) -> HttpResponse {
    json_response(status, &json!({ "detail": detail }))
}

fn error_response(err: &ServiceError) -> HttpResponse {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        tracing::error!("request failed: {err}");
    }
    detail_response(status, &err.to_string())
}

fn empty_response(status: StatusCode) -> HttpResponse {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}

fn with_cors(mut response: HttpResponse) -> HttpResponse {
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS"),
    );
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("*"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::CompletionProvider;
    use crate::pipeline::tests::StubProvider;
    use crate::storage::DocumentStore;
    use serde_json::Value;
    use tempfile::{TempDir, tempdir};

    fn state_with(provider: Option<StubProvider>) -> (TempDir, Arc<AppState>) {
        let dir = tempdir().unwrap();
        let provider = provider.map(|p| Arc::new(p) as Arc<dyn CompletionProvider>);
        let state = AppState::new(DocumentStore::new(dir.path()), dir.path(), provider);
        (dir, Arc::new(state))
    }

    async fn call(state: &Arc<AppState>, method: &str, uri: &str, body: &str) -> (u16, Value) {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .body(Full::new(Bytes::from(body.to_string())))
            .unwrap();
        let response = handle(state.clone(), req).await.unwrap();
        let status = response.status().as_u16();
        assert_eq!(
            response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN],
            HeaderValue::from_static("*")
        );
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn root_and_health_report_ok() {
        let (_dir, state) = state_with(None);
        let (status, body) = call(&state, "GET", "/", "").await;
        assert_eq!(status, 200);
        assert_eq!(body, json!({"status": "ok"}));

        let (status, body) = call(&state, "GET", "/health?verbose=true", "").await;
        assert_eq!(status, 200);
        assert_eq!(body["details"]["events"], json!(0));
    }

    #[tokio::test]
    async fn event_lifecycle_over_http() {
        let (_dir, state) = state_with(None);
        let event = json!({"day": "Monday", "event": {"title": "Standup", "hour": 9, "duration": 1}});

        let (status, body) = call(&state, "POST", "/events", &event.to_string()).await;
        assert_eq!(status, 200);
        assert_eq!(body["events"]["Monday"][0]["title"], json!("Standup"));

        let (status, body) = call(&state, "POST", "/events", &event.to_string()).await;
        assert_eq!(status, 400);
        assert_eq!(body["detail"], json!("Event overlaps with an existing event"));

        let (status, body) = call(&state, "DELETE", "/events?day=Monday&index=0", "").await;
        assert_eq!(status, 200);
        assert_eq!(body["events"]["Monday"], json!([]));

        let (status, _) = call(&state, "DELETE", "/events?day=Monday&index=0", "").await;
        assert_eq!(status, 404);
    }

    #[tokio::test]
    async fn delete_query_is_percent_decoded() {
        let (_dir, state) = state_with(None);
        let event = json!({"day": "Monday", "event": {"title": "Standup", "hour": 9}});
        call(&state, "POST", "/events", &event.to_string()).await;

        let (status, body) = call(&state, "DELETE", "/events?day=Mon%64ay&index=%30", "").await;
        assert_eq!(status, 200);
        assert_eq!(body["events"]["Monday"], json!([]));
    }

    #[test]
    fn query_strings_deserialize_with_defaults() {
        let query: DeleteEventQuery = parse_query("day=Fri%64ay&index=2").unwrap();
        assert_eq!(query.day, "Friday");
        assert_eq!(query.index, 2);
        let health: HealthQuery = parse_query("").unwrap();
        assert!(!health.verbose);
        assert!(parse_query::<DeleteEventQuery>("index=1").is_err());
    }

    #[tokio::test]
    async fn bad_requests_are_reported() {
        let (_dir, state) = state_with(None);
        let (status, _) = call(&state, "POST", "/events", "{not json").await;
        assert_eq!(status, 400);
        let (status, _) = call(&state, "DELETE", "/events?day=Monday", "").await;
        assert_eq!(status, 400);
        let (status, _) = call(&state, "DELETE", "/events?day=Monday&index=first", "").await;
        assert_eq!(status, 400);
        let (status, _) = call(&state, "GET", "/health?verbose=maybe", "").await;
        assert_eq!(status, 400);
        let (status, _) = call(&state, "DELETE", "/massnahmen/arbeitsplatz/x", "").await;
        assert_eq!(status, 400);
        let (status, _) = call(&state, "PATCH", "/events", "").await;
        assert_eq!(status, 405);
        let (status, _) = call(&state, "GET", "/nope", "").await;
        assert_eq!(status, 404);
        let (status, _) = call(&state, "OPTIONS", "/events", "").await;
        assert_eq!(status, 204);
    }

    #[tokio::test]
    async fn measure_crud_over_http() {
        let (_dir, state) = state_with(None);
        let create = json!({
            "category": "zusammenarbeit",
            "measure": {"title": "Kernzeiten", "description": "10-15 Uhr", "priority": "hoch"}
        });
        let (status, body) = call(&state, "POST", "/massnahmen", &create.to_string()).await;
        assert_eq!(status, 200);
        assert_eq!(body["massnahmen"]["zusammenarbeit"][0]["status"], json!("proposed"));

        let update = json!({"title": "Kernzeiten", "description": "10-14 Uhr", "priority": "mittel", "status": "accepted"});
        let (status, body) =
            call(&state, "PUT", "/massnahmen/zusammenarbeit/0", &update.to_string()).await;
        assert_eq!(status, 200);
        assert_eq!(body["massnahmen"]["zusammenarbeit"][0], update);

        let (status, _) =
            call(&state, "PUT", "/massnahmen/zusammenarbeit/5", &update.to_string()).await;
        assert_eq!(status, 404);

        let (status, body) = call(&state, "DELETE", "/massnahmen/zusammenarbeit/0", "").await;
        assert_eq!(status, 200);
        assert_eq!(body["massnahmen"]["zusammenarbeit"], json!([]));

        let (status, _) = call(&state, "GET", "/massnahmen", "").await;
        assert_eq!(status, 200);
    }

    #[tokio::test]
    async fn chat_grows_by_two_on_success() {
        let (_dir, state) = state_with(Some(StubProvider::replying("Gern!")));
        let (status, body) = call(&state, "POST", "/chat", r#"{"text": "Hilfe?"}"#).await;
        assert_eq!(status, 200);
        assert_eq!(body["messages"].as_array().unwrap().len(), 2);
        assert_eq!(body["messages"][1]["text"], json!("Gern!"));

        let (_, body) = call(&state, "GET", "/chat", "").await;
        assert_eq!(body["messages"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn chat_failure_returns_bad_gateway_and_keeps_flagged_message() {
        let (_dir, state) = state_with(Some(StubProvider::failing("HTTP 500")));
        let (status, body) = call(&state, "POST", "/chat", r#"{"text": "Hallo"}"#).await;
        assert_eq!(status, 502);
        assert!(body["detail"].as_str().unwrap().contains("HTTP 500"));

        let (_, body) = call(&state, "GET", "/chat", "").await;
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["error"], json!(true));
    }
}
