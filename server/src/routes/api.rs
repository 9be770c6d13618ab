use std::fmt::Write as _;

use axum::Json;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;

use crate::adapters::BackendKind;
use crate::state::{AppState, ObservabilitySnapshot};

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";
const LAYER_CACHE_CONTROL: &str = "public, max-age=30";

pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let claims = state.current_claims().await;
    let observability = state.observability.snapshot();
    let layers: serde_json::Map<String, serde_json::Value> = state
        .layers
        .iter()
        .map(|entry| {
            (
                entry.key().to_string(),
                serde_json::json!({
                    "seq": entry.seq,
                    "generated_at": entry.generated_at,
                    "territories": entry.territory_count,
                    "warps": entry.warp_count,
                }),
            )
        })
        .collect();

    Json(serde_json::json!({
        "status": "ok",
        "worlds": claims.worlds.len(),
        "factions": claims.faction_count(),
        "claimed_cells": claims.claimed_cell_count(),
        "layers": layers,
        "observability": {
            "claim_fetch_failures_total": observability.claim_fetch_failures_total,
            "pipeline_runs_total": observability.pipeline_runs_total,
            "pipeline_failures_total": observability.pipeline_failures_total,
            "skipped_overlapping_runs_total": observability.skipped_overlapping_runs_total,
            "discarded_batches_total": observability.discarded_batches_total,
            "published_batches_total": observability.published_batches_total,
            "layer_requests_total": observability.layer_requests_total,
        }
    }))
}

/// Serve a backend's pre-serialized layer without re-serializing.
pub async fn get_layer(
    State(state): State<AppState>,
    Path(raw_backend): Path<String>,
    headers: HeaderMap,
) -> Response {
    let Ok(backend) = raw_backend.parse::<BackendKind>() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    state.observability.record_layer_request();

    let Some((etag, json)) = state
        .layers
        .get(&backend)
        .map(|layer| (layer_etag(backend, layer.seq), layer.json.clone()))
    else {
        let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from_static("5"));
        return response;
    };

    if if_none_match_matches(&headers, &etag) {
        return not_modified_response(LAYER_CACHE_CONTROL, Some(etag.as_str()));
    }

    json_bytes_response((*json).clone(), LAYER_CACHE_CONTROL, Some(etag.as_str()))
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let claims = state.current_claims().await;
    let published_layers = state.layers.len();
    let body = render_prometheus_metrics(
        claims.faction_count(),
        claims.claimed_cell_count(),
        published_layers,
        state.observability.snapshot(),
    );

    (
        [
            (header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-store"),
        ],
        body,
    )
}

fn write_metric(body: &mut String, name: &str, kind: &str, help: &str, value: u64) {
    let _ = writeln!(body, "# HELP {name} {help}");
    let _ = writeln!(body, "# TYPE {name} {kind}");
    let _ = writeln!(body, "{name} {value}");
}

fn render_prometheus_metrics(
    faction_count: usize,
    claimed_cells: usize,
    published_layers: usize,
    observability: ObservabilitySnapshot,
) -> String {
    let mut body = String::new();
    write_metric(
        &mut body,
        "claimmap_factions",
        "gauge",
        "Factions in the current claim snapshot.",
        faction_count as u64,
    );
    write_metric(
        &mut body,
        "claimmap_claimed_cells",
        "gauge",
        "Claimed cells in the current claim snapshot.",
        claimed_cells as u64,
    );
    write_metric(
        &mut body,
        "claimmap_published_layers",
        "gauge",
        "Backends with a published marker layer.",
        published_layers as u64,
    );

    let counters = [
        (
            "claimmap_claim_fetch_failures_total",
            "Total failed claim snapshot fetches.",
            observability.claim_fetch_failures_total,
        ),
        (
            "claimmap_pipeline_runs_total",
            "Total marker pipeline runs started.",
            observability.pipeline_runs_total,
        ),
        (
            "claimmap_pipeline_failures_total",
            "Total marker pipeline runs that failed or panicked.",
            observability.pipeline_failures_total,
        ),
        (
            "claimmap_skipped_overlapping_runs_total",
            "Total refresh ticks skipped because a run was still in flight.",
            observability.skipped_overlapping_runs_total,
        ),
        (
            "claimmap_discarded_batches_total",
            "Total batches discarded because the backend was unavailable.",
            observability.discarded_batches_total,
        ),
        (
            "claimmap_published_batches_total",
            "Total marker batches published.",
            observability.published_batches_total,
        ),
        (
            "claimmap_layer_requests_total",
            "Total layer API requests.",
            observability.layer_requests_total,
        ),
    ];
    for (name, help, value) in counters {
        write_metric(&mut body, name, "counter", help, value);
    }

    body
}

fn layer_etag(backend: BackendKind, seq: u64) -> String {
    format!("\"{backend}-{seq}\"")
}

fn json_bytes_response(body: Bytes, cache_control: &'static str, etag: Option<&str>) -> Response {
    let mut response = Response::new(Body::from(body));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(cache_control),
    );
    if let Some(etag) = etag
        && let Ok(etag_header) = HeaderValue::from_str(etag)
    {
        headers.insert(header::ETAG, etag_header);
    }
    response
}

fn not_modified_response(cache_control: &'static str, etag: Option<&str>) -> Response {
    let mut response = StatusCode::NOT_MODIFIED.into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(cache_control),
    );
    if let Some(etag) = etag
        && let Ok(etag_header) = HeaderValue::from_str(etag)
    {
        headers.insert(header::ETAG, etag_header);
    }
    response
}

fn normalize_etag(candidate: &str) -> &str {
    candidate.strip_prefix("W/").unwrap_or(candidate).trim()
}

fn if_none_match_matches(headers: &HeaderMap, etag: &str) -> bool {
    let Some(value) = headers.get(header::IF_NONE_MATCH) else {
        return false;
    };
    let Ok(raw) = value.to_str() else {
        return false;
    };

    raw.split(',').any(|candidate| {
        let candidate = candidate.trim();
        candidate == "*" || normalize_etag(candidate) == normalize_etag(etag)
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use std::sync::Arc;

    use bytes::Bytes;
    use chrono::Utc;
    use claimmap_shared::{ChunkCoord, ClaimSnapshot, FactionClaims, WorldClaims};

    use super::{if_none_match_matches, layer_etag, render_prometheus_metrics};
    use crate::adapters::BackendKind;
    use crate::state::{AppState, ObservabilitySnapshot, PublishedLayer};

    async fn spawn_test_server(state: AppState) -> (SocketAddr, tokio::task::JoinHandle<()>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener address");
        let app = crate::app::build_app(state);
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve test app");
        });
        (addr, handle)
    }

    fn publish(state: &AppState, backend: BackendKind, seq: u64, body: &'static [u8]) {
        state.layers.insert(
            backend,
            PublishedLayer {
                seq,
                generated_at: Utc::now(),
                territory_count: 3,
                warp_count: 1,
                json: Arc::new(Bytes::from_static(body)),
            },
        );
    }

    #[test]
    fn metrics_output_contains_prometheus_help_type_and_values() {
        let observability = ObservabilitySnapshot {
            claim_fetch_failures_total: 2,
            pipeline_runs_total: 12,
            skipped_overlapping_runs_total: 1,
            published_batches_total: 11,
            ..ObservabilitySnapshot::default()
        };

        let metrics = render_prometheus_metrics(4, 120, 2, observability);

        assert!(metrics.contains("# HELP claimmap_factions"));
        assert!(metrics.contains("# TYPE claimmap_pipeline_runs_total counter"));
        assert!(metrics.contains("claimmap_factions 4"));
        assert!(metrics.contains("claimmap_claimed_cells 120"));
        assert!(metrics.contains("claimmap_published_layers 2"));
        assert!(metrics.contains("claimmap_pipeline_runs_total 12"));
        assert!(metrics.contains("claimmap_skipped_overlapping_runs_total 1"));
        assert!(metrics.contains("claimmap_discarded_batches_total 0"));
    }

    #[test]
    fn if_none_match_supports_weak_and_multiple_etags() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert(
            axum::http::header::IF_NONE_MATCH,
            axum::http::HeaderValue::from_static("W/\"other\", \"bluemap-42\""),
        );
        assert!(if_none_match_matches(
            &headers,
            &layer_etag(BackendKind::Bluemap, 42)
        ));
        assert!(!if_none_match_matches(
            &headers,
            &layer_etag(BackendKind::Bluemap, 43)
        ));
    }

    #[tokio::test]
    async fn health_reports_claims_layers_and_counters() {
        let state = AppState::new();
        let cells = [(0, 0), (4, 4)]
            .into_iter()
            .map(|(x, z)| ChunkCoord::new(x, z))
            .collect();
        state
            .replace_claims(ClaimSnapshot {
                worlds: HashMap::from([(
                    "overworld".to_string(),
                    WorldClaims {
                        factions: HashMap::from([(
                            "f1".to_string(),
                            FactionClaims {
                                name: "Wardens".to_string(),
                                cells,
                                ..FactionClaims::default()
                            },
                        )]),
                        warps: Vec::new(),
                    },
                )]),
            })
            .await;
        publish(&state, BackendKind::Dynmap, 7, b"{}");

        let (addr, server_handle) = spawn_test_server(state).await;
        let health = reqwest::Client::new()
            .get(format!("http://{addr}/api/health"))
            .send()
            .await
            .expect("health request")
            .error_for_status()
            .expect("health status")
            .json::<serde_json::Value>()
            .await
            .expect("parse health");

        assert_eq!(health["status"], "ok");
        assert_eq!(health["factions"], 1);
        assert_eq!(health["claimed_cells"], 2);
        assert_eq!(health["layers"]["dynmap"]["seq"], 7);
        assert!(
            health["observability"]["pipeline_runs_total"]
                .as_u64()
                .is_some()
        );

        server_handle.abort();
        let _ = server_handle.await;
    }

    #[tokio::test]
    async fn layer_endpoint_returns_not_modified_when_etag_matches() {
        let state = AppState::new();
        publish(&state, BackendKind::Squaremap, 9, b"{\"backend\":\"squaremap\"}");

        let (addr, server_handle) = spawn_test_server(state).await;
        let base_url = format!("http://{addr}");
        let client = reqwest::Client::new();

        let first = client
            .get(format!("{base_url}/api/layers/squaremap"))
            .send()
            .await
            .expect("layer request should succeed");
        let first_status = first.status();
        let first_etag = first
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
            .expect("etag header should be present");
        let first_body = first.text().await.expect("read first response body");

        assert_eq!(first_status, reqwest::StatusCode::OK);
        assert_eq!(first_etag, "\"squaremap-9\"");
        assert_eq!(first_body, "{\"backend\":\"squaremap\"}");

        let second = client
            .get(format!("{base_url}/api/layers/squaremap"))
            .header(reqwest::header::IF_NONE_MATCH, first_etag)
            .send()
            .await
            .expect("conditional layer request should succeed");

        assert_eq!(second.status(), reqwest::StatusCode::NOT_MODIFIED);
        assert_eq!(
            second
                .headers()
                .get(reqwest::header::CACHE_CONTROL)
                .and_then(|value| value.to_str().ok()),
            Some("public, max-age=30")
        );

        server_handle.abort();
        let _ = server_handle.await;
    }

    #[tokio::test]
    async fn layer_endpoint_rejects_unknown_and_unpublished_backends() {
        let state = AppState::new();
        let (addr, server_handle) = spawn_test_server(state.clone()).await;
        let base_url = format!("http://{addr}");
        let client = reqwest::Client::new();

        let unknown = client
            .get(format!("{base_url}/api/layers/leaflet"))
            .send()
            .await
            .expect("unknown backend request");
        assert_eq!(unknown.status(), reqwest::StatusCode::NOT_FOUND);

        let pending = client
            .get(format!("{base_url}/api/layers/Bluemap"))
            .send()
            .await
            .expect("unpublished backend request");
        assert_eq!(pending.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);

        assert_eq!(state.observability.snapshot().layer_requests_total, 1);

        server_handle.abort();
        let _ = server_handle.await;
    }

    #[tokio::test]
    async fn metrics_endpoint_serves_prometheus_text() {
        let state = AppState::new();
        let (addr, server_handle) = spawn_test_server(state).await;

        let metrics = reqwest::Client::new()
            .get(format!("http://{addr}/api/metrics"))
            .send()
            .await
            .expect("metrics request")
            .error_for_status()
            .expect("metrics status")
            .text()
            .await
            .expect("parse metrics text");

        assert!(metrics.contains("# TYPE claimmap_published_layers gauge"));
        assert!(metrics.contains("claimmap_published_layers 0"));

        server_handle.abort();
        let _ = server_handle.await;
    }
}
