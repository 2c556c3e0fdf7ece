use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::i18n;
use crate::services::events::{EventService, EventTarget, EventView, NewEventInput};
use crate::AppState;

/// Endpoints that mutate the event store. Split out so `main` can wrap them in
/// the rate limiter without throttling the listings.
pub fn mutation_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/create-event", post(create_event))
        .route("/delete-event", delete(delete_event))
}

pub fn query_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/events", get(list_studio_events))
        .route("/all-events", get(list_all_events))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Body of `POST /create-event`. All fields optional at the serde level so a
/// missing field reports as a 400 with a descriptive message rather than a
/// deserialization rejection.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventBody {
    pub chat_ids: Option<Vec<String>>,
    pub studio_names: Option<Vec<String>>,
    pub name: Option<String>,
    /// `DD.MM.YYYY HH:mm:ss`
    pub time: Option<String>,
    pub description: Option<String>,
    pub warning_time: Option<String>,
    #[serde(default)]
    pub report: bool,
    #[serde(default)]
    pub period: bool,
    #[serde(default)]
    pub add_reminder: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteEventBody {
    pub studio_name: Option<String>,
    pub event_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsQuery {
    pub studio_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

fn required(value: Option<String>, field: &str) -> AppResult<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::BadRequest(format!("missing required field: {}", field)))
}

// ============================================================================
// Handlers
// ============================================================================

/// Create an event for one or more studios and announce it to their chats.
async fn create_event(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateEventBody>,
) -> AppResult<Json<MessageResponse>> {
    let name = required(body.name, "name")?;
    let time = required(body.time, "time")?;
    let description = required(body.description, "description")?;

    let studio_names = body.studio_names.unwrap_or_default();
    let chat_ids = body.chat_ids.unwrap_or_default();
    if studio_names.is_empty() {
        return Err(AppError::BadRequest(
            "at least one studio name is required".to_string(),
        ));
    }
    if studio_names.len() != chat_ids.len() {
        return Err(AppError::BadRequest(
            "studioNames and chatIds must have the same length".to_string(),
        ));
    }

    let targets = studio_names
        .into_iter()
        .zip(chat_ids)
        .map(|(studio_name, chat_id)| EventTarget {
            studio_name,
            chat_id,
        })
        .collect();

    let warning_time = body
        .warning_time
        .map(|w| w.trim().to_string())
        .filter(|w| !w.is_empty());

    let service = EventService::from_state(&state).await;
    service
        .create_event(NewEventInput {
            name,
            time,
            description,
            warning_time,
            report: body.report,
            periodic: body.period,
            add_reminder: body.add_reminder,
            targets,
        })
        .await?;

    Ok(Json(MessageResponse {
        message: i18n::tr(Some(&state.config.telegram.language), "event.created", None),
    }))
}

/// Delete an event from every category it appears in. 404 when it exists in
/// none.
async fn delete_event(
    State(state): State<Arc<AppState>>,
    Json(body): Json<DeleteEventBody>,
) -> AppResult<Json<MessageResponse>> {
    let studio_name = required(body.studio_name, "studioName")?;
    let event_name = required(body.event_name, "eventName")?;

    let service = EventService::from_state(&state).await;
    service.delete_event(&studio_name, &event_name).await?;

    Ok(Json(MessageResponse {
        message: i18n::tr(Some(&state.config.telegram.language), "event.deleted", None),
    }))
}

/// One studio's events, display-formatted and sorted ascending by time.
async fn list_studio_events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EventsQuery>,
) -> AppResult<Json<Vec<EventView>>> {
    let studio_name = required(query.studio_name, "studioName")?;

    let service = EventService::from_state(&state).await;
    let events = service.list_events(&studio_name).await?;

    Ok(Json(events))
}

/// Every studio's events in one listing.
async fn list_all_events(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<EventView>>> {
    let service = EventService::from_state(&state).await;
    let events = service.list_all_events().await?;

    Ok(Json(events))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use http_body_util::BodyExt;
    use tokio::sync::RwLock;
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::db::{seed_studio, test_pool, Category, EventRepository};

    async fn test_state() -> Arc<AppState> {
        Arc::new(AppState {
            db: test_pool().await,
            config: Config::default(),
            telegram: Arc::new(RwLock::new(None)),
        })
    }

    fn app(state: Arc<AppState>) -> Router {
        Router::new()
            .merge(mutation_router())
            .merge(query_router())
            .with_state(state)
    }

    fn json_request(method: Method, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn create_event_requires_fields() {
        let state = test_state().await;

        let response = app(state.clone())
            .oneshot(json_request(
                Method::POST,
                "/create-event",
                serde_json::json!({ "name": "Inventory" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn create_event_persists_and_reports_success() {
        let state = test_state().await;
        seed_studio(&state.db, "downtown", "-100200", "3").await;

        let response = app(state.clone())
            .oneshot(json_request(
                Method::POST,
                "/create-event",
                serde_json::json!({
                    "chatIds": ["-100200"],
                    "studioNames": ["downtown"],
                    "name": "Inventory",
                    "time": "01.05.2025 10:00:00",
                    "description": "Monthly stocktake",
                    "warningTime": "01.05.2025 09:00:00",
                    "report": true,
                    "period": false,
                    "addReminder": true
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        for category in [Category::Report, Category::Plain, Category::Reminder] {
            assert!(
                EventRepository::get(&state.db, "downtown", category, "Inventory")
                    .await
                    .unwrap()
                    .is_some()
            );
        }
    }

    #[tokio::test]
    async fn create_event_unknown_studio_is_bad_request() {
        let state = test_state().await;

        let response = app(state)
            .oneshot(json_request(
                Method::POST,
                "/create-event",
                serde_json::json!({
                    "chatIds": ["-1"],
                    "studioNames": ["nowhere"],
                    "name": "Inventory",
                    "time": "01.05.2025 10:00:00",
                    "description": "Monthly stocktake"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn delete_event_is_404_then_200() {
        let state = test_state().await;
        seed_studio(&state.db, "downtown", "-100200", "3").await;

        let body = serde_json::json!({ "studioName": "downtown", "eventName": "Inventory" });

        let response = app(state.clone())
            .oneshot(json_request(Method::DELETE, "/delete-event", body.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        app(state.clone())
            .oneshot(json_request(
                Method::POST,
                "/create-event",
                serde_json::json!({
                    "chatIds": ["-100200"],
                    "studioNames": ["downtown"],
                    "name": "Inventory",
                    "time": "01.05.2025 10:00:00",
                    "description": "Monthly stocktake"
                }),
            ))
            .await
            .unwrap();

        let response = app(state.clone())
            .oneshot(json_request(Method::DELETE, "/delete-event", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(EventRepository::list_events(&state.db, "downtown")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn listings_format_and_sort() {
        let state = test_state().await;
        seed_studio(&state.db, "downtown", "-100200", "3").await;

        for (name, time) in [("Late", "02.05.2025 08:00:00"), ("Early", "01.05.2025 08:00:00")] {
            app(state.clone())
                .oneshot(json_request(
                    Method::POST,
                    "/create-event",
                    serde_json::json!({
                        "chatIds": ["-100200"],
                        "studioNames": ["downtown"],
                        "name": name,
                        "time": time,
                        "description": "d"
                    }),
                ))
                .await
                .unwrap();
        }

        let response = app(state.clone())
            .oneshot(
                Request::builder()
                    .uri("/events?studioName=downtown")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body[0]["name"], "Early");
        assert_eq!(body[1]["name"], "Late");

        // Missing query parameter is a 400; unknown studio a 404.
        let response = app(state.clone())
            .oneshot(Request::builder().uri("/events").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app(state.clone())
            .oneshot(
                Request::builder()
                    .uri("/events?studioName=nowhere")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app(state)
            .oneshot(
                Request::builder()
                    .uri("/all-events")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body.as_array().unwrap().len(), 2);
        assert_eq!(body[0]["studioName"], "downtown");
    }
}
