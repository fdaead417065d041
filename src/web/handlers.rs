//! HTTP handlers for the page, the reading API and the trigger API.

use crate::climate::{LastReading, ReadingStore};
use crate::error::NodeError;
use crate::triggers::{TriggerRegistry, TriggerState, TriggerStatus};
use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, Path, Query, Request, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    Form,
};
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, warn};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<TriggerRegistry>,
    pub readings: ReadingStore,
}

impl AppState {
    pub fn new(registry: Arc<TriggerRegistry>, readings: ReadingStore) -> Self {
        Self { registry, readings }
    }
}

impl NodeError {
    /// HTTP status reported for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            NodeError::NotFound(_) => StatusCode::NOT_FOUND,
            NodeError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for NodeError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            warn!("{}", self);
        } else {
            debug!("{}", self);
        }
        (status, self.to_string()).into_response()
    }
}

/// Fields accepted when switching a trigger.
#[derive(Debug, Default, Deserialize)]
pub struct ActionRequest {
    pub action: Option<String>,
}

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Body of a trigger switch request.
///
/// Form-encoded bodies are read as forms. Any other non-empty body is read as
/// JSON whatever its content type says. Decoding problems are kept as text so
/// the query string can still supply the action.
#[derive(Debug)]
pub struct ActionBody(pub Result<ActionRequest, String>);

#[async_trait]
impl<S> FromRequest<S> for ActionBody
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_form = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map_or(false, |value| value.starts_with(FORM_CONTENT_TYPE));

        if is_form {
            let decoded = Form::<ActionRequest>::from_request(req, state)
                .await
                .map(|Form(request)| request)
                .map_err(|rejection| rejection.body_text());
            return Ok(Self(decoded));
        }

        let bytes = match Bytes::from_request(req, state).await {
            Ok(bytes) => bytes,
            Err(rejection) => return Ok(Self(Err(rejection.body_text()))),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self(Ok(ActionRequest::default())));
        }

        let decoded = Json::<ActionRequest>::from_bytes(&bytes)
            .map(|Json(request)| request)
            .map_err(|rejection| rejection.body_text());
        Ok(Self(decoded))
    }
}

/// Pick the requested state from the body, falling back to the query.
///
/// Missing, undecodable and unknown actions are all `InvalidInput`.
pub fn decode_action(
    body: Result<ActionRequest, String>,
    query: Option<ActionRequest>,
) -> Result<TriggerState, NodeError> {
    let (from_body, rejection) = match body {
        Ok(request) => (request.action, None),
        Err(reason) => (None, Some(reason)),
    };

    match from_body.or_else(|| query.and_then(|q| q.action)) {
        Some(action) => action.parse(),
        None => Err(NodeError::invalid_input(match rejection {
            Some(reason) => format!("action missing or failed to be converted: {}", reason),
            None => "action missing or failed to be converted".to_string(),
        })),
    }
}

/// `GET /triggers/{name}`
pub async fn get_trigger(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<TriggerStatus>, NodeError> {
    let status = state.registry.get(&name).await?;
    debug!("get trigger state: {:?}", status);
    Ok(Json(status))
}

/// `POST /triggers/{name}` with `{"action": "on" | "off"}` or `action=on`
pub async fn set_trigger(
    State(state): State<AppState>,
    Path(name): Path<String>,
    query: Option<Query<ActionRequest>>,
    ActionBody(body): ActionBody,
) -> Result<Json<TriggerStatus>, NodeError> {
    let desired = decode_action(body, query.map(|Query(q)| q))?;
    let status = state.registry.set(&name, desired).await?;
    debug!("set trigger state: {:?}", status);
    Ok(Json(status))
}

/// `GET /triggers`
pub async fn list_triggers(State(state): State<AppState>) -> Json<Vec<TriggerStatus>> {
    Json(state.registry.list().await)
}

/// `GET /api/reading`
pub async fn get_reading(State(state): State<AppState>) -> Json<LastReading> {
    Json(state.readings.current())
}

/// Health check endpoint.
pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "piflora",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// `GET /` rendering the last reading.
pub async fn index(State(state): State<AppState>) -> Html<String> {
    Html(render_index(&state.readings.current()))
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Render the dashboard page for `reading`.
pub fn render_index(reading: &LastReading) -> String {
    let dewpoint = reading
        .dewpoint
        .map_or_else(|| "n/a".to_string(), |d| format!("{:.1}", d));

    INDEX_HTML
        .replace("{{temperature}}", &format!("{:.2}", reading.temperature))
        .replace("{{humidity}}", &format!("{:.1}", reading.humidity))
        .replace("{{dewpoint}}", &dewpoint)
        .replace("{{message}}", &escape_html(&reading.message))
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>piflora</title>
    <style>
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            background: #f4f6f2;
            color: #333;
            padding: 20px;
        }

        .card {
            max-width: 420px;
            margin: 40px auto;
            background: white;
            border-radius: 15px;
            padding: 25px;
            box-shadow: 0 10px 30px rgba(0,0,0,0.1);
        }

        .metric {
            display: flex;
            justify-content: space-between;
            padding: 10px 0;
            border-bottom: 1px solid #eee;
        }

        .metric-label {
            font-weight: 600;
            color: #666;
        }

        .message {
            margin-top: 15px;
            font-size: 0.9rem;
            color: #888;
        }
    </style>
</head>
<body>
    <div class="card">
        <h2>🌱 piflora</h2>
        <div class="metric">
            <span class="metric-label">Temperature</span>
            <span><span id="temperature">{{temperature}}</span> °C</span>
        </div>
        <div class="metric">
            <span class="metric-label">Humidity</span>
            <span><span id="humidity">{{humidity}}</span> %</span>
        </div>
        <div class="metric">
            <span class="metric-label">Dew point</span>
            <span><span id="dewpoint">{{dewpoint}}</span> °C</span>
        </div>
        <div class="message" id="message">{{message}}</div>
    </div>

    <script>
        // Live updates; the rendered values stay if the socket is unavailable.
        const protocol = window.location.protocol === 'https:' ? 'wss:' : 'ws:';
        const ws = new WebSocket(`${protocol}//${window.location.host}/ws`);
        ws.onmessage = function(event) {
            const data = JSON.parse(event.data);
            document.getElementById('temperature').textContent = data.temperature.toFixed(2);
            document.getElementById('humidity').textContent = data.humidity.toFixed(1);
            document.getElementById('dewpoint').textContent =
                data.dewpoint === null ? 'n/a' : data.dewpoint.toFixed(1);
            document.getElementById('message').textContent = data.message;
        };
    </script>
</body>
</html>"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_index() {
        let reading = LastReading {
            temperature: 21.5,
            humidity: 45.04,
            dewpoint: Some(9.2),
            message: "failed to send climate data: <refused>".to_string(),
            measured_at: None,
        };
        let page = render_index(&reading);
        assert!(page.contains(">21.50<"));
        assert!(page.contains(">45.0<"));
        assert!(page.contains(">9.2<"));
        assert!(page.contains("&lt;refused&gt;"));
        assert!(!page.contains("{{"));
    }

    #[test]
    fn test_render_missing_dewpoint() {
        let reading = LastReading {
            dewpoint: None,
            ..Default::default()
        };
        assert!(render_index(&reading).contains(">n/a<"));
    }

    #[test]
    fn test_decode_action_prefers_body() {
        let body = Ok(ActionRequest {
            action: Some(" ON ".to_string()),
        });
        let query = Some(ActionRequest {
            action: Some("off".to_string()),
        });
        assert_eq!(decode_action(body, query).unwrap(), TriggerState::On);
    }

    #[test]
    fn test_decode_action_missing() {
        let body = Ok(ActionRequest::default());
        let err = decode_action(body, None).unwrap_err();
        assert!(matches!(err, NodeError::InvalidInput(_)));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_decode_action_rejects_unknown_value() {
        let body = Ok(ActionRequest {
            action: Some("toggle".to_string()),
        });
        assert!(decode_action(body, None).is_err());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(NodeError::not_found("x").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            NodeError::hardware_write("x").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
