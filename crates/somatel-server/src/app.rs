//! HTTP application state and handlers

use axum::{
    extract::{Query, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use opentelemetry::trace::{SpanKind, TraceContextExt, Tracer};
use opentelemetry::Context;
use somatel_telemetry::{
    extract_context, inject_context, AttrValue, HttpMetrics, Level, TelemetryClient,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Shared per-process state referenced by every request handler
pub struct AppState {
    pub client: Arc<TelemetryClient>,
    pub metrics: Arc<HttpMetrics>,
    pub http: reqwest::Client,
    /// Base URL of the downstream calculation service
    pub downstream: String,
}

#[derive(Debug, Error)]
enum SomaError {
    #[error("parâmetros inválidos")]
    InvalidParameters,

    #[error("erro ao chamar o serviço 2: {0}")]
    Downstream(#[from] reqwest::Error),
}

/// Create the application router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new().route("/soma", get(soma)).with_state(state)
}

/// Sum handler: `GET /soma?a=<float>&b=<float>`
///
/// Delegates the calculation to the downstream service and answers with its
/// body. Responds 400 when either parameter fails to parse and 500 when the
/// downstream call fails at the transport level.
async fn soma(
    State(state): State<Arc<AppState>>,
    method: Method,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let started = Instant::now();
    let parent = extract_context(&headers);
    let span = state
        .client
        .tracer()
        .span_builder("SomaHandler")
        .with_kind(SpanKind::Server)
        .start_with_context(state.client.tracer(), &parent);
    let cx = parent.with_span(span);

    let a = params.get("a").and_then(|raw| raw.parse::<f64>().ok());
    let b = params.get("b").and_then(|raw| raw.parse::<f64>().ok());
    let (Some(a), Some(b)) = (a, b) else {
        let err = SomaError::InvalidParameters;
        state.client.log_error(
            &cx,
            &err,
            "parâmetros inválidos",
            &[
                ("a", raw_param(&params, "a")),
                ("b", raw_param(&params, "b")),
            ],
        );
        state.metrics.record_error("invalid_parameters", "/soma");
        let elapsed = started.elapsed();
        state
            .metrics
            .record_request(method.as_str(), "/soma", 400, elapsed);
        state
            .client
            .log_http_request(&cx, method.as_str(), "/soma", 400, elapsed, &[]);
        cx.span().end();
        return (
            StatusCode::BAD_REQUEST,
            "Parâmetros inválidos. Use /soma?a=1&b=2",
        )
            .into_response();
    };

    state.client.log_with_span_attributes(
        &cx,
        Level::Debug,
        "parâmetros validados",
        &[
            ("param.a", AttrValue::F64(a)),
            ("param.b", AttrValue::F64(b)),
        ],
    );

    let url = format!("{}/calc?a={}&b={}", state.downstream, a, b);
    state.metrics.record_external_call("calc-service", "/calc");

    match call_downstream(&state, &cx, &url).await {
        Ok((status, body)) => {
            if !status.is_success() {
                // Only transport failures take the error path; an unexpected
                // downstream status is surfaced here.
                tracing::warn!(status = %status, "serviço 2 respondeu com status inesperado");
            }
            state.client.info_with_trace(
                &cx,
                "chamada para o serviço 2 realizada com sucesso",
                &[("response", AttrValue::from(status.to_string()))],
            );
            let elapsed = started.elapsed();
            state
                .metrics
                .record_request(method.as_str(), "/soma", 200, elapsed);
            state
                .client
                .log_http_request(&cx, method.as_str(), "/soma", 200, elapsed, &[]);
            cx.span().end();
            (StatusCode::OK, format!("Resultado do serviço2: {}", body)).into_response()
        }
        Err(err) => {
            state
                .client
                .log_error(&cx, &err, "erro ao chamar o serviço 2", &[]);
            state
                .metrics
                .record_error("external_service_error", "/soma");
            let elapsed = started.elapsed();
            state
                .metrics
                .record_request(method.as_str(), "/soma", 500, elapsed);
            state
                .client
                .log_http_request(&cx, method.as_str(), "/soma", 500, elapsed, &[]);
            cx.span().end();
            (StatusCode::INTERNAL_SERVER_ERROR, "erro ao chamar serviço 2").into_response()
        }
    }
}

/// Issue the downstream call with the trace context injected into its headers
async fn call_downstream(
    state: &AppState,
    cx: &Context,
    url: &str,
) -> Result<(StatusCode, String), SomaError> {
    let mut request = state.http.get(url).build()?;
    inject_context(cx, request.headers_mut());

    let response = state.http.execute(request).await?;
    let status = response.status();
    let body = response.text().await?;
    Ok((status, body))
}

fn raw_param(params: &HashMap<String, String>, key: &str) -> AttrValue {
    AttrValue::from(params.get(key).cloned().unwrap_or_default())
}
