//! DevServer struct and main run loop.
//!
//! Holds the dispatcher and HTTP clients, starts the background tasks (remote
//! sync, mock watcher, metrics listener) and serves HTTP/1.1 connections.

use super::client::{create_http_client, should_skip_tls_verify, HttpClient};
use super::context::RequestHandlerContext;
use super::handler::{handle_request, HandlerOutcome};
use super::listeners::{LogListener, ProxyListener};
use super::response_ext::{bytes_response, error_response, ProxyBody, ResponseExt};
use super::rules::ProxyRule;
use crate::config::Config;
use crate::dispatch::{Dispatcher, RemoteTable};
use crate::metrics;
use crate::mock::{MockStore, MockWatcher};
use crate::sync::{HttpRemoteApi, RemoteApi, RepositorySyncClient, SyncCache};
use anyhow::Context;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// The dev proxy server.
pub struct DevServer {
    config: Arc<Config>,
    dispatcher: Arc<Dispatcher>,
    http_client: HttpClient,
    insecure_client: Option<HttpClient>,
    listener: Arc<dyn ProxyListener>,
    sync_client: Option<Arc<RepositorySyncClient>>,
    remote_live_target: Option<String>,
}

impl DevServer {
    /// Create a server from configuration.
    ///
    /// Fails when mocking is enabled and the mock directory cannot be loaded.
    pub fn new(config: Config) -> Result<Self, anyhow::Error> {
        Self::new_internal(config, None, None)
    }

    /// Create a server with pre-built proxy rules (e.g. with programmatic bypasses)
    /// instead of the rules in `config.proxy`.
    pub fn new_with_rules(config: Config, rules: Vec<ProxyRule>) -> Result<Self, anyhow::Error> {
        Self::new_internal(config, Some(rules), None)
    }

    /// Create a server that syncs through the given remote API.
    pub fn new_with_remote_api(
        config: Config,
        api: Arc<dyn RemoteApi>,
    ) -> Result<Self, anyhow::Error> {
        Self::new_internal(config, None, Some(api))
    }

    fn new_internal(
        config: Config,
        rules: Option<Vec<ProxyRule>>,
        api: Option<Arc<dyn RemoteApi>>,
    ) -> Result<Self, anyhow::Error> {
        config.validate()?;

        let mock_store = if config.mock.enabled {
            let store = MockStore::load(&config.mock.dir).with_context(|| {
                format!("Failed to load mocks from '{}'", config.mock.dir.display())
            })?;
            Some(Arc::new(store))
        } else {
            info!("Local mocking disabled");
            None
        };

        let (remote_table, sync_client) = if config.remote_enabled() {
            let api = match api {
                Some(api) => api,
                None => {
                    let remote = &config.remote;
                    let url = remote.url.as_deref().unwrap_or_default();
                    let http_api = HttpRemoteApi::new(
                        url,
                        remote.app_id.clone().unwrap_or_default(),
                        remote.app_secret.clone().unwrap_or_default(),
                        remote.timeout(),
                    )?;
                    Arc::new(http_api) as Arc<dyn RemoteApi>
                }
            };
            let options = config
                .remote
                .sync_options()
                .context("Remote sync enabled without a repository id")?;
            let client = RepositorySyncClient::new(api, SyncCache::new(&config.mock.dir), options);
            (Some(Arc::new(RemoteTable::new())), Some(Arc::new(client)))
        } else {
            (None, None)
        };

        let rules = match rules {
            Some(rules) => rules,
            None => config
                .proxy
                .iter()
                .enumerate()
                .map(|(idx, rule)| {
                    ProxyRule::from_config(rule, config.change_host)
                        .with_context(|| format!("Invalid proxy rule #{idx}"))
                })
                .collect::<Result<Vec<_>, _>>()?,
        };

        let http_client = create_http_client(&config.connection_pool, false)?;
        let insecure_client = if should_skip_tls_verify(&config)
            || rules.iter().any(ProxyRule::tls_skip_verify)
        {
            Some(create_http_client(&config.connection_pool, true)?)
        } else {
            None
        };

        let remote_live_target = if config.remote_enabled() && !config.remote.cache {
            config.remote.live_target()
        } else {
            None
        };

        let dispatcher = Dispatcher::new(mock_store, remote_table, rules);

        Ok(Self {
            config: Arc::new(config),
            dispatcher: Arc::new(dispatcher),
            http_client,
            insecure_client,
            listener: Arc::new(LogListener),
            sync_client,
            remote_live_target,
        })
    }

    /// Replace the default tracing listener.
    pub fn with_listener(mut self, listener: Arc<dyn ProxyListener>) -> Self {
        self.listener = listener;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn sync_client(&self) -> Option<&Arc<RepositorySyncClient>> {
        self.sync_client.as_ref()
    }

    /// Bind the configured address and serve forever.
    pub async fn run(self) -> Result<(), anyhow::Error> {
        let addr = self.config.listen.socket_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {addr}"))?;
        self.run_on(listener).await
    }

    /// Serve forever on an already bound listener.
    pub async fn run_on(self, listener: TcpListener) -> Result<(), anyhow::Error> {
        let addr = listener.local_addr()?;
        self.start_background_tasks().await?;

        info!("Listening on http://{}", addr);
        for (idx, rule) in self.dispatcher.proxy_rules().iter().enumerate() {
            info!("Proxy rule #{} -> {}", idx, rule.target());
        }

        let server = Arc::new(self);
        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let server = Arc::clone(&server);

            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |req| {
                    let server = Arc::clone(&server);
                    async move { server.handle_incoming(req).await }
                });

                if let Err(err) = http1::Builder::new()
                    .serve_connection(io, service)
                    .with_upgrades()
                    .await
                {
                    error!("Error serving connection from {}: {}", remote_addr, err);
                }
            });
        }
    }

    /// Start remote sync, the mock watcher and the metrics listener.
    pub async fn start_background_tasks(&self) -> Result<(), anyhow::Error> {
        if let (Some(client), Some(table)) =
            (self.sync_client.clone(), self.dispatcher.remote_table().cloned())
        {
            let refresh = self.config.remote.refresh_interval();
            tokio::spawn(async move {
                client.run(refresh, move |paths| table.publish(&paths)).await;
            });
        }

        if self.config.mock.watch {
            if let Some(store) = self.dispatcher.mock_store().cloned() {
                match MockWatcher::new(store.root()) {
                    Ok(watcher) => {
                        info!("Watching {} for mock changes", store.root().display());
                        tokio::spawn(watcher.run_reload_loop(store));
                    }
                    Err(e) => warn!("Mock hot reload unavailable: {:#}", e),
                }
            }
        }

        if self.config.metrics.enabled {
            let addr = SocketAddr::new(
                self.config.listen.socket_addr()?.ip(),
                self.config.metrics.port,
            );
            let listener = TcpListener::bind(addr)
                .await
                .with_context(|| format!("Failed to bind metrics listener {addr}"))?;
            info!("Metrics available at http://{}/metrics", addr);
            tokio::spawn(serve_metrics(listener));
        }

        Ok(())
    }

    /// Handle one request; unclaimed requests get `404 {"error": "No route"}`.
    pub async fn handle(&self, req: Request<ProxyBody>) -> Response<ProxyBody> {
        let ctx = RequestHandlerContext {
            dispatcher: &self.dispatcher,
            http_client: &self.http_client,
            insecure_client: self.insecure_client.as_ref(),
            body_parser: &self.config.body_parser,
            listener: &self.listener,
            remote_live_target: self.remote_live_target.as_deref(),
        };

        match handle_request(&ctx, req).await {
            HandlerOutcome::Response(response) => response,
            HandlerOutcome::PassThrough(_) => error_response(404, "No route").into_boxed(),
        }
    }

    async fn handle_incoming(
        &self,
        req: Request<Incoming>,
    ) -> Result<Response<ProxyBody>, Infallible> {
        Ok(self.handle(req.map(|b| b.boxed())).await)
    }
}

async fn serve_metrics(listener: TcpListener) {
    loop {
        let (stream, _) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                error!("Metrics listener failed: {}", e);
                return;
            }
        };
        tokio::spawn(async move {
            let service = service_fn(|req: Request<Incoming>| async move {
                let response = if req.uri().path() == "/metrics" {
                    let mut response = bytes_response(200, metrics::collect_metrics());
                    response.headers_mut().insert(
                        hyper::header::CONTENT_TYPE,
                        hyper::header::HeaderValue::from_static("text/plain; version=0.0.4"),
                    );
                    response
                } else {
                    error_response(404, "Not Found")
                };
                Ok::<_, Infallible>(response)
            });
            if let Err(err) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                error!("Error serving metrics connection: {}", err);
            }
        });
    }
}
