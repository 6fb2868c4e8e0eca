//! The lifecycle-managed HTTP server.
//!
//! A [`Server`] owns the route table, the health state and the shutdown
//! machinery. It moves through `Configured -> Serving -> Draining -> Stopped`
//! exactly once:
//!
//! 1. [`Server::new`] validates the configuration and builds every route. No
//!    network I/O happens here.
//! 2. [`Server::run`] binds the configured address (or [`Server::serve`] takes
//!    a pre-bound listener), marks the process healthy and accepts
//!    connections, terminating TLS unless `insecure_http` is set.
//! 3. A [`ShutdownHandle`] or a termination signal marks the process
//!    unhealthy, closes the listener and lets every in-flight request finish.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use userapi_server::{Server, ServerConfig, ShutdownHooks};
//!
//! let config = ServerConfig::builder()
//!     .address("0.0.0.0:8080")
//!     .insecure_http(true)
//!     .build();
//!
//! let server = Server::new(Arc::new(MyService), config)?;
//! server.run_with_signal_handler(ShutdownHooks::new()).await?;
//! ```

use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use http::Request;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_rustls::TlsAcceptor;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::health::HealthMonitor;
use crate::lifecycle::{LifecycleState, ShutdownHooks, StateCell};
use crate::middleware::Pipeline;
use crate::router::{HttpResponse, RouteTable};
use crate::service::Service;
use crate::shutdown::{ConnectionTracker, OsSignals, ShutdownSignal};
use crate::tls::load_tls_acceptor;
use crate::{operations, response, wellknown};

/// Pause after a failed `accept` so a persistent error cannot spin the loop.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DrainOutcome {
    Clean,
    TimedOut { active: usize },
}

impl DrainOutcome {
    fn into_result(self) -> ServerResult<()> {
        match self {
            Self::Clean => Ok(()),
            Self::TimedOut { active } => Err(ServerError::ShutdownTimeout { active }),
        }
    }
}

/// State shared by the server, its handles and every connection task.
struct Shared {
    config: ServerConfig,
    routes: RouteTable,
    health: HealthMonitor,
    state: StateCell,
    signal: ShutdownSignal,
    tracker: ConnectionTracker,
    drained: watch::Sender<Option<DrainOutcome>>,
}

impl Shared {
    /// Health goes false before the listener is told to close.
    fn request_stop(&self) {
        self.health.mark_stopped();
        if self.signal.trigger() {
            tracing::info!("Shutdown requested");
        }
    }

    /// Starts shutdown. A server that never served stops on the spot.
    fn initiate_shutdown(&self) {
        self.request_stop();

        if self
            .state
            .transition(LifecycleState::Configured, LifecycleState::Stopped)
            .is_ok()
        {
            self.drained.send_replace(Some(DrainOutcome::Clean));
        }
    }

    async fn wait_stopped(&self) -> ServerResult<()> {
        let mut receiver = self.drained.subscribe();
        let outcome = match receiver.wait_for(Option::is_some).await {
            Ok(outcome) => *outcome,
            // The sender lives inside `self`, so the channel cannot close here.
            Err(_) => None,
        };
        outcome.map_or(Ok(()), DrainOutcome::into_result)
    }

    async fn dispatch(&self, request: Request<Incoming>) -> HttpResponse {
        let (head, _body) = request.into_parts();
        let path = head.uri.path().to_string();

        match self.routes.match_route(&head.method, &path) {
            Some(route) => route.call(head).await,
            None => {
                tracing::debug!(method = %head.method, path = %path, "No route matched");
                response::not_found(&path)
            }
        }
    }

    async fn serve_connection<IO>(self: Arc<Self>, io: IO, remote_addr: SocketAddr)
    where
        IO: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let shared = Arc::clone(&self);
        let service = service_fn(move |request: Request<Incoming>| {
            let shared = Arc::clone(&shared);
            async move { Ok::<_, Infallible>(shared.dispatch(request).await) }
        });

        let conn = http1::Builder::new()
            .timer(TokioTimer::new())
            .header_read_timeout(self.config.read_timeout())
            .serve_connection(TokioIo::new(io), service);
        tokio::pin!(conn);

        let shutdown = self.signal.recv();
        tokio::pin!(shutdown);

        let result = tokio::select! {
            result = conn.as_mut() => result,
            () = &mut shutdown => {
                tracing::debug!(%remote_addr, "Draining connection");
                conn.as_mut().graceful_shutdown();
                conn.await
            }
        };

        if let Err(e) = result {
            tracing::debug!(%remote_addr, error = %e, "Connection closed with error");
        }
    }

    async fn serve_tls(
        self: Arc<Self>,
        acceptor: TlsAcceptor,
        stream: TcpStream,
        remote_addr: SocketAddr,
    ) {
        let handshake = tokio::time::timeout(self.config.read_timeout(), acceptor.accept(stream));

        let tls = tokio::select! {
            result = handshake => match result {
                Ok(Ok(tls)) => tls,
                Ok(Err(e)) => {
                    tracing::debug!(%remote_addr, error = %e, "TLS handshake failed");
                    return;
                }
                Err(_) => {
                    tracing::debug!(%remote_addr, "TLS handshake timed out");
                    return;
                }
            },
            () = self.signal.recv() => return,
        };

        self.serve_connection(tls, remote_addr).await;
    }
}

/// Cloneable handle that reaches the shutdown path of a [`Server`].
#[derive(Clone)]
pub struct ShutdownHandle {
    shared: Arc<Shared>,
}

impl fmt::Debug for ShutdownHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownHandle")
            .field("state", &self.shared.state.get())
            .finish()
    }
}

impl ShutdownHandle {
    /// Starts shutdown without waiting for the drain.
    pub fn initiate(&self) {
        self.shared.initiate_shutdown();
    }

    /// Starts shutdown and waits until the server has stopped.
    ///
    /// Safe to call any number of times from any number of tasks; every
    /// caller observes the same outcome.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::ShutdownTimeout`] if the drain deadline expired.
    pub async fn shutdown(&self) -> ServerResult<()> {
        self.shared.initiate_shutdown();
        self.shared.wait_stopped().await
    }

    /// Returns the current health.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.shared.health.is_healthy()
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.shared.state.get()
    }
}

/// The User API HTTP server.
pub struct Server {
    shared: Arc<Shared>,
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.shared.config)
            .field("routes", &self.shared.routes)
            .field("state", &self.shared.state.get())
            .finish()
    }
}

impl Server {
    /// Builds a server around `service`.
    ///
    /// Validates the configuration and registers every route. Performs no
    /// network I/O.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Config`] for an invalid configuration and
    /// [`ServerError::Route`] if a route pattern is malformed.
    pub fn new(service: Arc<dyn Service>, config: ServerConfig) -> ServerResult<Self> {
        config.validate()?;

        if !config.auth_disabled() && config.token_url().is_none() {
            tracing::warn!("Authentication is enabled but no token_url is configured");
        }

        let probe = Arc::clone(&service);
        let health = HealthMonitor::new(move || probe.healthy());

        let mut routes = RouteTable::builder();
        operations::register(&mut routes, &service, &Pipeline::from_config(&config))?;
        wellknown::register(&mut routes, &health, config.well_known_disabled())?;
        if config.debug() {
            wellknown::register_debug(&mut routes)?;
        }
        let routes = routes.build();

        let (drained, _) = watch::channel(None);

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                routes,
                health,
                state: StateCell::new(LifecycleState::Configured),
                signal: ShutdownSignal::new(),
                tracker: ConnectionTracker::new(),
                drained,
            }),
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.shared.config
    }

    /// Returns the route table.
    #[must_use]
    pub fn routes(&self) -> &RouteTable {
        &self.shared.routes
    }

    /// Returns `true` only while serving and the service probe passes.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.shared.health.is_healthy()
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.shared.state.get()
    }

    /// Returns the number of open connections.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.shared.tracker.active_connections()
    }

    /// Returns a handle that can stop the server from another task.
    #[must_use]
    pub fn handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Starts shutdown and waits until the server has stopped.
    ///
    /// # Errors
    ///
    /// See [`ShutdownHandle::shutdown`].
    pub async fn shutdown(&self) -> ServerResult<()> {
        self.handle().shutdown().await
    }

    /// Binds the configured address and serves until shutdown.
    ///
    /// TLS material is loaded before binding, so bad certificates never
    /// leave a socket open.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::InvalidState`] if the server already ran,
    /// [`ServerError::Bind`] or a TLS error when serving cannot begin, and
    /// [`ServerError::ShutdownTimeout`] if the drain deadline expired.
    pub async fn run(&self) -> ServerResult<()> {
        self.ensure_configured()?;
        let acceptor = self.tls_acceptor()?;

        let address = self.shared.config.address();
        let listener = TcpListener::bind(address)
            .await
            .map_err(|source| ServerError::Bind {
                addr: address.to_string(),
                source,
            })?;

        self.serve_inner(listener, acceptor).await
    }

    /// Serves on a listener the caller already bound.
    ///
    /// # Errors
    ///
    /// Same as [`Server::run`], minus bind errors.
    pub async fn serve(&self, listener: TcpListener) -> ServerResult<()> {
        self.ensure_configured()?;
        let acceptor = self.tls_acceptor()?;
        self.serve_inner(listener, acceptor).await
    }

    /// Serves until `trigger` completes, then drains and runs `hooks`.
    ///
    /// Hooks run only after a clean drain, in registration order; the first
    /// failing hook stops the rest and its error is returned.
    ///
    /// # Errors
    ///
    /// Any error from [`Server::run`], or the first hook failure.
    pub async fn run_until<F>(&self, trigger: F, hooks: ShutdownHooks) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.ensure_configured()?;

        // An early trigger still lets serving begin, then drains at once.
        let shared = Arc::clone(&self.shared);
        let watcher = tokio::spawn(async move {
            trigger.await;
            shared.request_stop();
        });

        let result = self.run().await;
        watcher.abort();
        result?;

        hooks.run().await?;
        tracing::info!("Shutdown complete");
        Ok(())
    }

    /// Serves until SIGHUP, SIGINT or SIGTERM (Ctrl-C elsewhere).
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Signal`] if handlers cannot be installed, else
    /// see [`Server::run_until`].
    pub async fn run_with_signal_handler(&self, hooks: ShutdownHooks) -> ServerResult<()> {
        let signals = OsSignals::register().map_err(ServerError::Signal)?;
        self.run_until(signals.recv(), hooks).await
    }

    fn ensure_configured(&self) -> ServerResult<()> {
        match self.shared.state.get() {
            LifecycleState::Configured => Ok(()),
            other => Err(ServerError::InvalidState(other)),
        }
    }

    fn tls_acceptor(&self) -> ServerResult<Option<TlsAcceptor>> {
        let config = &self.shared.config;
        match (config.tls_enabled(), config.tls_cert_file(), config.tls_key_file()) {
            (false, _, _) => Ok(None),
            (true, Some(cert), Some(key)) => load_tls_acceptor(cert, key).map(Some),
            (true, _, _) => Err(ServerError::config(
                "TLS is enabled but certificate or key path is missing",
            )),
        }
    }

    async fn serve_inner(
        &self,
        listener: TcpListener,
        acceptor: Option<TlsAcceptor>,
    ) -> ServerResult<()> {
        let shared = &self.shared;
        match shared
            .state
            .transition(LifecycleState::Configured, LifecycleState::Serving)
        {
            Ok(()) => {}
            // Shutdown won the race while TLS material loaded or the bind
            // was pending; it already published a clean outcome.
            Err(LifecycleState::Stopped) => {
                tracing::info!("Shutdown requested before serving began");
                return Ok(());
            }
            Err(other) => return Err(ServerError::InvalidState(other)),
        }
        shared.health.mark_started();

        let local_addr = listener
            .local_addr()
            .map_or_else(|_| shared.config.address().to_string(), |a| a.to_string());
        tracing::info!(
            title = shared.config.title(),
            version = shared.config.version(),
            address = %local_addr,
            tls = acceptor.is_some(),
            "Serving"
        );

        let shutdown = shared.signal.recv();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                result = listener.accept() => match result {
                    Ok((stream, remote_addr)) => {
                        let guard = shared.tracker.acquire();
                        let conn_shared = Arc::clone(shared);
                        let acceptor = acceptor.clone();

                        tokio::spawn(async move {
                            match acceptor {
                                Some(acceptor) => conn_shared.serve_tls(acceptor, stream, remote_addr).await,
                                None => conn_shared.serve_connection(stream, remote_addr).await,
                            }
                            drop(guard);
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to accept connection");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
                () = &mut shutdown => break,
            }
        }

        drop(listener);
        shared.state.set(LifecycleState::Draining);
        tracing::info!(
            active = shared.tracker.active_connections(),
            "Listener closed, draining connections"
        );

        let outcome = match shared.config.shutdown_timeout() {
            None => {
                shared.tracker.wait_idle().await;
                DrainOutcome::Clean
            }
            Some(deadline) => {
                match tokio::time::timeout(deadline, shared.tracker.wait_idle()).await {
                    Ok(()) => DrainOutcome::Clean,
                    Err(_) => {
                        let active = shared.tracker.active_connections();
                        tracing::warn!(active, "Drain deadline reached, abandoning connections");
                        DrainOutcome::TimedOut { active }
                    }
                }
            }
        };

        shared.state.set(LifecycleState::Stopped);
        shared.drained.send_replace(Some(outcome));
        tracing::info!("Server stopped");

        outcome.into_result()
    }
}
