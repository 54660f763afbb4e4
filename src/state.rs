// Application state shared by all handlers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use reqwest::Client;
use tokio::sync::RwLock;

use crate::config::{Config, StoreBackendKind};
use crate::confirmation::{Clock, ConfirmationGate, SystemClock};
use crate::store::InMemoryStore;

/// Google access token handed to the server, plus its expiry (unix seconds)
/// when one was given.
#[derive(Clone)]
pub struct GoogleCredential {
    pub access_token: String,
    pub expires_at: Option<i64>,
}

impl std::fmt::Debug for GoogleCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleCredential")
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Mutable runtime state (not persisted, lost on restart).
#[derive(Default)]
pub struct RuntimeState {
    pub google: Option<GoogleCredential>,
}

/// Which store tools run against. The memory store lives for the whole
/// process, Drive stores are built per session from the current credential.
#[derive(Clone)]
pub enum StoreBackend {
    Drive,
    Memory(Arc<InMemoryStore>),
}

impl StoreBackend {
    pub fn kind(&self) -> StoreBackendKind {
        match self {
            StoreBackend::Drive => StoreBackendKind::Drive,
            StoreBackend::Memory(_) => StoreBackendKind::Memory,
        }
    }
}

/// Central application state. Clone-friendly, everything shared is behind an Arc.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub client: Client,
    pub backend: StoreBackend,
    pub runtime: Arc<RwLock<RuntimeState>>,
    pub clock: Arc<dyn Clock>,
    pub gate: ConfirmationGate,
    pub start_time: Instant,
    /// `true` once startup finished.
    pub ready: Arc<AtomicBool>,
    /// Optional auth secret from AUTH_SECRET env. None = dev mode (no auth).
    pub auth_secret: Option<String>,
}

impl AppState {
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Relaxed);
        tracing::info!("Backend marked as READY");
    }
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let backend = match config.store_backend {
            StoreBackendKind::Drive => StoreBackend::Drive,
            StoreBackendKind::Memory => StoreBackend::Memory(Arc::new(InMemoryStore::new())),
        };
        Self::with_parts(config, backend, Arc::new(SystemClock))
    }

    /// Assemble state around an explicit backend and clock.
    pub fn with_parts(config: Config, backend: StoreBackend, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(10)
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .context("failed to build HTTP client")?;

        let google = config.google_access_token.clone().map(|access_token| GoogleCredential {
            access_token,
            expires_at: None,
        });

        let auth_secret = config.auth_secret.clone();
        if auth_secret.is_some() {
            tracing::info!("AUTH_SECRET configured, authentication enabled");
        } else {
            tracing::info!("AUTH_SECRET not set, authentication disabled (dev mode)");
        }
        tracing::info!(
            backend = backend.kind().as_str(),
            google_token = google.is_some(),
            "AppState initialised"
        );

        Ok(Self {
            config: Arc::new(config),
            client,
            backend,
            runtime: Arc::new(RwLock::new(RuntimeState { google })),
            gate: ConfirmationGate::new(clock.clone()),
            clock,
            start_time: Instant::now(),
            ready: Arc::new(AtomicBool::new(false)),
            auth_secret,
        })
    }
}
