//! Process health derived from the lifecycle and the service probe.
//!
//! The server reports healthy only while it is serving and the business
//! service says it can take traffic. The started flag moves forward only:
//! once shutdown begins, nothing can mark the process healthy again.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use http::{header, Response, StatusCode};
use http_body_util::Full;
use serde::{Deserialize, Serialize};

use crate::router::HttpResponse;

const IDLE: u8 = 0;
const STARTED: u8 = 1;
const STOPPED: u8 = 2;

/// Liveness probe into the business service.
pub type HealthProbe = Arc<dyn Fn() -> bool + Send + Sync>;

/// Body of the health endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthBody {
    /// Whether the process can serve traffic
    pub health: bool,
}

/// Shared health state.
///
/// Clones observe the same flag.
#[derive(Clone)]
pub struct HealthMonitor {
    phase: Arc<AtomicU8>,
    probe: HealthProbe,
}

impl fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("started", &self.is_started())
            .finish_non_exhaustive()
    }
}

impl HealthMonitor {
    /// Creates a monitor that is not yet started.
    pub fn new(probe: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        Self {
            phase: Arc::new(AtomicU8::new(IDLE)),
            probe: Arc::new(probe),
        }
    }

    /// Marks serving as begun. No effect once stopped.
    pub fn mark_started(&self) {
        let _ = self
            .phase
            .compare_exchange(IDLE, STARTED, Ordering::SeqCst, Ordering::SeqCst);
    }

    /// Marks shutdown as begun. Permanent.
    pub fn mark_stopped(&self) {
        self.phase.store(STOPPED, Ordering::SeqCst);
    }

    /// Returns `true` between `mark_started` and `mark_stopped`.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.phase.load(Ordering::SeqCst) == STARTED
    }

    /// Started and the probe passes. The probe runs on every call.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.is_started() && (self.probe)()
    }

    /// Builds the 200/503 health response.
    #[must_use]
    pub fn response(&self) -> HttpResponse {
        health_response(self.is_healthy())
    }
}

/// 200 `{"health":true}` or 503 `{"health":false}`.
#[must_use]
pub fn health_response(healthy: bool) -> HttpResponse {
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = if healthy {
        &b"{\"health\":true}"[..]
    } else {
        &b"{\"health\":false}"[..]
    };

    let mut response = Response::new(Full::new(Bytes::from_static(body)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    response
}
