use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::{Json, Router};
use ironleap::{Ironleap, Options, Settings};
use serde_json::{json, Value};
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

const DEFAULT_ADDR: &str = "127.0.0.1:3000";
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

#[tokio::main]
#[instrument]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let settings = Settings::load().context("loading settings")?;
    let options = Options::new(settings).context("validating settings")?;
    let ironleap = Ironleap::new(options)?;

    let routes = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/echo", post(|Json(body): Json<Value>| async move { Json(body) }))
        .route(
            "/greeting/{name}",
            get(|axum::extract::Path(name): axum::extract::Path<String>| async move {
                Json(json!({ "greeting": format!("hello, {name}") }))
            }),
        );
    let app = ironleap.apply_to_router(routes).layer(TraceLayer::new_for_http());

    let addr = std::env::var("IRONLEAP_DEMO_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("Iron Leap demo listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    // Send whatever is still queued before exiting
    ironleap.flush();
    tokio::time::sleep(ironleap.options().delivery_delay + SHUTDOWN_GRACE).await;

    Ok(())
}
