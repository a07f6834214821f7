//! Serving loop with bounded graceful shutdown.

use crate::state::AppState;
use axum::Router;
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Serves `app` on `listener` until `shutdown` is cancelled.
///
/// The state is marked ready while connections are accepted. Once shutdown
/// starts, readiness is cleared and in-flight requests get at most `drain`
/// to finish before the remaining connections are dropped.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    state: Arc<AppState>,
    shutdown: CancellationToken,
    drain: Duration,
) -> std::io::Result<()> {
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .into_future();
    let mut server = std::pin::pin!(server);

    state.mark_ready();

    tokio::select! {
        result = &mut server => return result,
        _ = shutdown.cancelled() => {}
    }

    state.mark_not_ready();
    tracing::info!(drain_ms = drain.as_millis() as u64, "Draining connections...");

    match tokio::time::timeout(drain, server).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                drain_ms = drain.as_millis() as u64,
                "Drain timed out, dropping open connections"
            );
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::toolset::{ToolSet, ToolSetConfig};
    use axum::routing::get;
    use std::time::Instant;
    use tokio::sync::Notify;

    fn state() -> Arc<AppState> {
        let toolset = ToolSet::new(ToolSetConfig::new().with_api_key("k")).unwrap();
        Arc::new(AppState::from_toolset(toolset))
    }

    #[tokio::test]
    async fn test_shutdown_without_connections_is_immediate() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let state = state();
        let shutdown = CancellationToken::new();

        let server = tokio::spawn(serve(
            listener,
            Router::new(),
            state.clone(),
            shutdown.clone(),
            Duration::from_secs(60),
        ));
        tokio::task::yield_now().await;

        let started = Instant::now();
        shutdown.cancel();
        let result = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("server should stop without waiting for the drain window")
            .unwrap();

        assert!(result.is_ok());
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!state.is_ready());
    }

    #[tokio::test]
    async fn test_drain_is_capped_for_hung_requests() {
        let entered = Arc::new(Notify::new());
        let hook = entered.clone();
        let app = Router::new().route(
            "/hang",
            get(move || {
                let hook = hook.clone();
                async move {
                    hook.notify_one();
                    std::future::pending::<()>().await;
                    "unreachable"
                }
            }),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = state();
        let shutdown = CancellationToken::new();
        let server = tokio::spawn(serve(
            listener,
            app,
            state.clone(),
            shutdown.clone(),
            Duration::from_millis(200),
        ));

        let client = tokio::spawn(reqwest::get(format!("http://{}/hang", addr)));
        entered.notified().await;
        assert!(state.is_ready());

        let started = Instant::now();
        shutdown.cancel();
        let result = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("drain should be bounded")
            .unwrap();

        assert!(result.is_ok());
        assert!(started.elapsed() >= Duration::from_millis(200));
        assert!(!state.is_ready());
        client.abort();
    }
}
