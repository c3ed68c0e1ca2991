//! ProxyServer struct, accept loop, and lifecycle handles.

use super::client::{create_http_client, HttpClient};
use super::handler::handle_request;
use crate::cache::{CacheStore, KeyNormalizer};
use crate::config::Config;
use crate::har::{self, HarDocument};
use crate::matcher::ExcludedRoutes;
use crate::state::ProxyState;
use hyper::header::HeaderName;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Shared state every request handler sees. Cache store and proxy state are
/// the only mutable members; everything else is resolved once at startup.
pub struct ProxyContext {
    pub client: HttpClient,
    pub store: CacheStore,
    pub state: ProxyState,
    pub normalizer: KeyNormalizer,
    pub excluded: ExcludedRoutes,
    pub remote_base: String,
    pub header_name: HeaderName,
    pub admin_prefix: String,
    pub timeout: Duration,
}

/// The caching proxy server.
pub struct ProxyServer {
    config: Config,
    ctx: Arc<ProxyContext>,
}

impl ProxyServer {
    /// Create a server from a resolved configuration, optionally hydrating
    /// the cache from a HAR document before any traffic is served.
    pub fn new(config: Config, har: Option<HarDocument>) -> Result<Self, anyhow::Error> {
        config.validate()?;

        let excluded = ExcludedRoutes::compile(&config.excluded_route_matchers)?;
        let normalizer = KeyNormalizer::new(&config.cache_busting_params);
        let state = ProxyState::new(
            config.data_playback,
            config.data_record,
            config.cache_everything,
        );
        let timeout = Duration::from_secs(config.upstream_timeout_secs);
        let header_name = HeaderName::from_bytes(config.proxy_header_identifier.as_bytes())?;

        let ctx = Arc::new(ProxyContext {
            client: create_http_client(timeout),
            store: CacheStore::new(),
            state,
            normalizer,
            excluded,
            remote_base: config.remote_base().to_string(),
            header_name,
            admin_prefix: format!("/{}", config.command_prefix),
            timeout,
        });

        let server = Self { config, ctx };
        if let Some(doc) = har {
            let imported = server.hydrate(&doc);
            info!("Hydrated cache with {imported} HAR entries");
        }
        Ok(server)
    }

    /// Populate the cache store from a HAR document.
    pub fn hydrate(&self, doc: &HarDocument) -> usize {
        har::import(&self.ctx.store, &self.ctx.normalizer, &self.ctx.excluded, doc)
    }

    /// Bind the listener and begin serving. Returns a handle exposing the
    /// bound address and a `stop()` that closes the listener.
    pub async fn start(self) -> Result<ProxyHandle, anyhow::Error> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.proxy_port));
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        info!("Listening on http://{local_addr}");
        info!("Proxying to {}", self.ctx.remote_base);
        if !self.ctx.store.is_empty() {
            info!("Serving with {} pre-loaded cache entries", self.ctx.store.len());
        }

        let shutdown = Arc::new(Notify::new());
        let notified = Arc::clone(&shutdown);
        let ctx = Arc::clone(&self.ctx);

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = notified.notified() => {
                        info!("Shutting down listener on {local_addr}");
                        break;
                    }
                    accepted = listener.accept() => {
                        let (stream, remote_addr) = match accepted {
                            Ok(pair) => pair,
                            Err(e) => {
                                error!("Accept failed: {e}");
                                continue;
                            }
                        };

                        let ctx = Arc::clone(&ctx);
                        tokio::spawn(async move {
                            let io = TokioIo::new(stream);
                            let service = service_fn(move |req| {
                                let ctx = Arc::clone(&ctx);
                                async move { handle_request(&ctx, req).await }
                            });

                            if let Err(err) =
                                http1::Builder::new().serve_connection(io, service).await
                            {
                                debug!("Error serving connection from {remote_addr}: {err}");
                            }
                        });
                    }
                }
            }
        });

        Ok(ProxyHandle {
            local_addr,
            shutdown,
            task,
        })
    }
}

/// Handle to a running proxy listener.
pub struct ProxyHandle {
    local_addr: SocketAddr,
    shutdown: Arc<Notify>,
    task: JoinHandle<()>,
}

impl ProxyHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections and release the listener. In-flight
    /// connections finish on their own tasks.
    pub async fn stop(self) {
        self.shutdown.notify_one();
        if let Err(e) = self.task.await {
            error!("Listener task failed during shutdown: {e}");
        }
    }
}
