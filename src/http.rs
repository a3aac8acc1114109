use crate::assets::AssetBundle;
use crate::collectors::{now_unix, Sampler};
use crate::metrics::Metrics;
use crate::snapshot::MetricsSnapshot;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header::CONTENT_TYPE, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Json, Router};
use std::sync::Arc;
use std::time::Instant;
use tracing::error;

#[derive(Clone)]
pub struct HttpAppState {
    pub sampler: Arc<Sampler>,
    pub metrics: Arc<Metrics>,
    pub assets: &'static AssetBundle,
}

pub fn build_router(
    sampler: Arc<Sampler>,
    metrics: Arc<Metrics>,
    assets: &'static AssetBundle,
) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_handler))
        .route("/internal/metrics", get(internal_metrics_handler))
        .fallback(static_handler)
        .with_state(HttpAppState {
            sampler,
            metrics,
            assets,
        })
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Always 200: a sampler that dies still yields an all-zero snapshot.
async fn metrics_handler(State(state): State<HttpAppState>) -> Response {
    let sampler = state.sampler.clone();
    let started = Instant::now();
    let snapshot = match tokio::task::spawn_blocking(move || sampler.sample_with_report()).await {
        Ok((snapshot, degraded)) => {
            state
                .metrics
                .record_sample(started.elapsed(), snapshot.timestamp, &degraded);
            snapshot
        }
        Err(err) => {
            error!(error = %err, "sampler task failed");
            MetricsSnapshot::empty_at(now_unix())
        }
    };
    (StatusCode::OK, Json(snapshot)).into_response()
}

async fn internal_metrics_handler(State(state): State<HttpAppState>) -> Response {
    match state.metrics.encode_metrics() {
        Ok(encoded) => {
            let mut response = Response::new(Body::from(encoded));
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            response
        }
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to encode metrics: {err}"),
        )
            .into_response(),
    }
}

async fn static_handler(State(state): State<HttpAppState>, method: Method, uri: Uri) -> Response {
    if method != Method::GET && method != Method::HEAD {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }
    match state.assets.resolve(uri.path()) {
        Some(asset) => {
            let mut response = Response::new(Body::from(asset.body));
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static(asset.content_type));
            response
        }
        None => (StatusCode::NOT_FOUND, "Not Found").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets;
    use crate::collectors::thermal::fakes::{CannedFan, CannedTemperature};
    use axum::body::to_bytes;
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    const SNAPSHOT_KEYS: [&str; 18] = [
        "cpu_percent",
        "cpu_overall",
        "memory_total",
        "memory_used",
        "memory_available",
        "memory_percent",
        "disk_total",
        "disk_used",
        "disk_free",
        "disk_percent",
        "disk_read_bytes",
        "disk_write_bytes",
        "net_sent_bytes",
        "net_recv_bytes",
        "temperature",
        "fan_speed",
        "uptime",
        "timestamp",
    ];

    fn test_router() -> (Router, Arc<Metrics>) {
        let sampler = Sampler::new(
            Arc::new(CannedTemperature(Some("temp=45.0'C\n".to_string()))),
            Arc::new(CannedFan::command_only(None)),
        )
        .with_cpu_window(Duration::from_millis(100));
        let metrics = Metrics::new().expect("metrics registry");
        let bundle = assets::bundle().expect("embedded bundle");
        (
            build_router(Arc::new(sampler), metrics.clone(), bundle),
            metrics,
        )
    }

    async fn get(app: Router, uri: &str) -> Response {
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    fn assert_snapshot_json(value: &serde_json::Value) {
        let obj = value.as_object().expect("json object");
        for key in SNAPSHOT_KEYS {
            let field = obj.get(key).unwrap_or_else(|| panic!("missing {key}"));
            assert!(!field.is_null(), "{key} is null");
            if key == "cpu_percent" {
                let cores = field.as_array().expect("cpu_percent array");
                assert!(cores.iter().all(|v| v.as_f64().is_some_and(|v| v >= 0.0)));
            } else {
                assert!(
                    field.as_f64().is_some_and(|v| v >= 0.0),
                    "{key} is not a non-negative number"
                );
            }
        }
    }

    #[tokio::test]
    async fn healthz_returns_ok() {
        let (app, _) = test_router();
        let response = get(app, "/healthz").await;
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(bytes.as_ref(), b"ok");
    }

    #[tokio::test]
    async fn metrics_returns_snapshot_json() {
        let (app, metrics) = test_router();
        let response = get(app, "/metrics").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_snapshot_json(&value);
        assert_eq!(value["temperature"], 45.0);
        assert_eq!(value["fan_speed"], 0);

        assert_eq!(metrics.sysdash_samples_total.get(), 1.0);
        assert_eq!(
            metrics
                .sysdash_collect_errors_total
                .with_label_values(&["fan_speed"])
                .get(),
            1.0
        );
    }

    #[tokio::test]
    async fn internal_metrics_is_prometheus_text() {
        let (app, _) = test_router();
        let response = get(app, "/internal/metrics").await;
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("sysdash_uptime_seconds"));
    }

    #[tokio::test]
    async fn root_serves_index_document() {
        let (app, _) = test_router();
        let response = get(app, "/").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "text/html; charset=utf-8"
        );
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("<title>sysdash</title>"));
    }

    #[tokio::test]
    async fn static_files_and_misses() {
        let (app, _) = test_router();
        let response = get(app.clone(), "/app.js").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "text/javascript; charset=utf-8"
        );

        let response = get(app.clone(), "/missing.png").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = get(app, "/static/").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn static_rejects_writes() {
        let (app, _) = test_router();
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/index.html")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn serves_metrics_over_tcp() {
        let (app, _) = test_router();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = reqwest::Client::new();
        let (first, second) = tokio::join!(
            client.get(format!("http://{addr}/metrics")).send(),
            client.get(format!("http://{addr}/metrics")).send(),
        );
        for response in [first.unwrap(), second.unwrap()] {
            assert_eq!(response.status().as_u16(), 200);
            let body = response.text().await.unwrap();
            let value: serde_json::Value = serde_json::from_str(&body).unwrap();
            assert_snapshot_json(&value);
            assert!(value["timestamp"].as_i64().unwrap() > 0);
        }

        let index = client
            .get(format!("http://{addr}/"))
            .send()
            .await
            .unwrap();
        assert_eq!(index.status().as_u16(), 200);

        server.abort();
    }
}
