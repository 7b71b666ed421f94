//! Application state

use anyhow::Result;
use metrics_exporter_prometheus::PrometheusHandle;
use pharmaguard_classifiers::{AuditAssembler, ClassificationConfig};
use pharmaguard_core::{Clock, SystemClock};
use pharmaguard_telemetry::{AuditService, AuditStore, Dispatcher, LogSink, TracingSink};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::capture::Capture;
use crate::config::ProxyConfig;
use crate::hipaa::HipaaGate;
use crate::identity::HeaderIdentity;
use crate::middleware::AuditLayer;
use crate::route_table::RouteTable;

/// Application state shared across all requests
#[derive(Clone)]
pub struct AppState {
    /// Loaded configuration
    pub config: Arc<ProxyConfig>,

    /// Audit middleware state
    pub audit: AuditLayer,

    /// HIPAA acknowledgment gate
    pub hipaa: Arc<HipaaGate>,

    /// File-backed audit store, also serving the audit API
    pub audit_service: Arc<AuditService>,

    /// Protected backend, if forwarding is enabled
    pub backend: Option<url::Url>,

    /// HTTP client for backend requests
    pub http_client: reqwest::Client,

    /// Prometheus metrics handle for rendering
    pub metrics_handle: PrometheusHandle,
}

impl AppState {
    /// Initialize application state on the system clock, logging through `tracing`
    pub fn new(config: ProxyConfig, metrics_handle: PrometheusHandle) -> Result<Self> {
        Self::with_parts(
            config,
            metrics_handle,
            Arc::new(SystemClock),
            Arc::new(TracingSink::new()),
        )
    }

    /// Initialize application state with an explicit clock and log sink
    pub fn with_parts(
        config: ProxyConfig,
        metrics_handle: PrometheusHandle,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn LogSink>,
    ) -> Result<Self> {
        let classification = Self::load_classification(&config)?;

        let routes = RouteTable::new(&config.routes)?;
        info!("Loaded {} route definitions", routes.len());

        let identity = Arc::new(HeaderIdentity::new(config.identity.clone()));
        let capture = Capture::new(&config.capture, routes, identity);
        let assembler = AuditAssembler::new(&classification, clock)?;

        let hipaa = HipaaGate::new(config.hipaa.clone(), &classification)?;
        if hipaa.is_enabled() {
            info!("HIPAA acknowledgment gate enabled for roles {:?}", config.hipaa.gated_roles);
        }

        let audit_service = Arc::new(
            AuditService::new(config.persistence.clone())
                .map_err(|e| anyhow::anyhow!("Failed to initialize audit service: {}", e))?,
        );
        let store: Arc<dyn AuditStore> = audit_service.clone();
        let dispatcher = Dispatcher::new(store, sink);

        let backend = config.backend()?;
        match &backend {
            Some(url) => info!("Forwarding unmatched requests to {}", url),
            None => info!("No backend configured, forwarding disabled"),
        }

        // The backend is reached directly, never through a system proxy
        let http_client = reqwest::Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(config.backend_timeout_secs))
            .build()?;

        Ok(Self {
            config: Arc::new(config),
            audit: AuditLayer::new(capture, assembler, dispatcher),
            hipaa: Arc::new(hipaa),
            audit_service,
            backend,
            http_client,
            metrics_handle,
        })
    }

    /// Classification rules from the configured file, or the built-in set
    fn load_classification(config: &ProxyConfig) -> Result<ClassificationConfig> {
        match &config.classification_path {
            Some(path) => {
                info!("Loading classification rules from: {:?}", path);
                ClassificationConfig::from_file(path).map_err(|e| {
                    anyhow::anyhow!("Failed to load classification rules {:?}: {}", path, e)
                })
            }
            None => {
                info!("Using built-in classification rules");
                Ok(ClassificationConfig::default())
            }
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("audit", &self.audit)
            .field("audit_service", &self.audit_service)
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}
