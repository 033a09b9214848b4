use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{routing::get, Router};
use tokio::signal;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info, warn};

use crate::{
    auth::{self, repo::PgUserStore, services::UserService},
    config::AppConfig,
    db,
    events::{DisabledPublisher, EventPublisher, RedisStreamPublisher},
    state::AppState,
};

pub fn build_app(state: AppState) -> Router {
    let request_timeout = state.config.http.request_timeout;

    Router::new()
        .merge(auth::router())
        .route("/health", get(|| async { "ok" }))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(CatchPanicLayer::new())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    let request_id = req
                        .headers()
                        .get("x-request-id")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("-")
                        .to_string();
                    tracing::info_span!("http_request", %method, uri = %uri, %request_id)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     _latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, "response");
                        } else {
                            tracing::info!(%status, "response");
                        }
                    },
                ),
        )
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

/// Single composition root: wires the store, the optional event publisher and
/// the HTTP server, then tears everything down once a shutdown signal arrives.
pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    let config = Arc::new(config);

    let pool = db::connect(&config.database).await?;
    if config.database.run_migrations {
        db::migrate(&pool).await?;
    }

    let events: Arc<dyn EventPublisher> = if config.events.enabled {
        let ev = &config.events;
        Arc::new(
            RedisStreamPublisher::connect(&ev.redis_url, &ev.stream, ev.publish_timeout).await?,
        )
    } else {
        info!("lifecycle events disabled");
        Arc::new(DisabledPublisher)
    };

    let users = UserService::new(Arc::new(PgUserStore::new(pool.clone())), events.clone());
    let state = AppState::from_parts(users, config.clone());

    let served = serve(build_app(state), &config).await;

    events.shutdown().await;
    pool.close().await;
    info!("database pool closed");

    served
}

async fn serve(app: Router, config: &AppConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.http.host, config.http.port).parse()?;

    info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = stop_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = stop_tx.send(());

    drain(server, config.http.shutdown_timeout).await
}

async fn drain(
    server: tokio::task::JoinHandle<std::io::Result<()>>,
    timeout: Duration,
) -> anyhow::Result<()> {
    match tokio::time::timeout(timeout, server).await {
        Ok(Ok(Ok(()))) => {
            info!("http server stopped");
            Ok(())
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "http server failed");
            Err(e.into())
        }
        Ok(Err(e)) => Err(anyhow::anyhow!("http server task panicked: {e}")),
        Err(_) => {
            warn!(?timeout, "graceful shutdown timed out, dropping open connections");
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT"),
        _ = terminate => info!("received SIGTERM"),
    }
}
