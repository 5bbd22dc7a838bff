use hyper::service::service_fn;
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::conn::auto::Builder,
};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::completion::CompletionProvider;
use crate::error::{ServiceError, ServiceResult};
use crate::handler;
use crate::storage::DocumentStore;

/// Shared, read-only state of the HTTP API. Documents are never cached here.
pub struct AppState {
    pub store: DocumentStore,
    pub prompts_dir: PathBuf,
    pub provider: Option<Arc<dyn CompletionProvider>>,
    pub version: &'static str,
    started_at: Instant,
}

impl AppState {
    pub fn new(
        store: DocumentStore,
        prompts_dir: impl AsRef<Path>,
        provider: Option<Arc<dyn CompletionProvider>>,
    ) -> Self {
        Self {
            store,
            prompts_dir: prompts_dir.as_ref().to_path_buf(),
            provider,
            version: crate::metadata::PKG_VERSION,
            started_at: Instant::now(),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

pub async fn bind(addr: &str) -> ServiceResult<TcpListener> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| ServiceError::Config(format!("Invalid HTTP address '{addr}': {e}")))?;
    TcpListener::bind(addr)
        .await
        .map_err(|e| ServiceError::FromString(format!("HTTP listen error on {addr}: {e}")))
}

/// Accept connections until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: CancellationToken,
) -> ServiceResult<()> {
    let local = listener.local_addr()?;
    tracing::info!("HTTP API listening on http://{local}");

    loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::warn!("HTTP accept error: {e}");
                    continue;
                }
            },
        };

        let io = TokioIo::new(stream);
        let state = state.clone();
        tokio::spawn(async move {
            let service = service_fn(move |req| handler::handle(state.clone(), req));
            if let Err(err) = Builder::new(TokioExecutor::new())
                .serve_connection(io, service)
                .await
            {
                tracing::debug!(%peer, "connection closed with error: {err}");
            }
        });
    }

    tracing::info!("HTTP API stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn serves_requests_until_cancelled() {
        let dir = tempdir().unwrap();
        let state = Arc::new(AppState::new(
            DocumentStore::new(dir.path()),
            dir.path(),
            None,
        ));
        let listener = bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let token = CancellationToken::new();
        let server = tokio::spawn(serve(listener, state, token.clone()));

        let body = tokio::task::spawn_blocking(move || {
            ureq::get(&format!("http://{addr}/events"))
                .call()
                .unwrap()
                .into_string()
                .unwrap()
        })
        .await
        .unwrap();
        assert_eq!(body, r#"{"events":{}}"#);

        token.cancel();
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn rejects_invalid_bind_address() {
        assert!(matches!(
            bind("not-an-address").await,
            Err(ServiceError::Config(_))
        ));
    }
}
