//! Default wiring: configuration, tool discovery, probers and backends.

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use cs_av::{
    BackendKind, CompressorBackend, FfprobeProber, StrategyBackend, ToolRegistry, TransformBackend,
    TransformEngine,
};
use cs_core::config::Config;
use cs_core::ProgressSender;
use cs_pipeline::{BackendRegistry, JobHandle, JobReport, JobRequest, Orchestrator};
use cs_probe::{CompositeProber, NativeProber, Prober};

/// A ready-to-use orchestrator with every backend the host supports.
#[derive(Debug, Clone)]
pub struct Engine {
    tools: ToolRegistry,
    orchestrator: Arc<Orchestrator>,
}

impl Engine {
    /// Build an engine from `config`.
    ///
    /// Backends whose tools are missing are left out and logged; requesting
    /// one later fails the job with a `config` classification.
    pub async fn new(config: Config) -> Self {
        for warning in config.validate() {
            tracing::warn!("config: {warning}");
        }

        let tools = ToolRegistry::discover(&config.tools);
        tracing::debug!(tools = ?tools.available(), "tools discovered");

        let mut probers: Vec<Box<dyn Prober>> = vec![Box::new(NativeProber::new())];
        match FfprobeProber::from_registry(&tools) {
            Some(ffprobe) => probers.push(Box::new(ffprobe)),
            None => tracing::warn!("ffprobe not found; probing MP4 and Matroska natively only"),
        }
        let prober = CompositeProber::new(probers);
        tracing::debug!(probers = ?prober.names(), "probe chain ready");
        let prober: Arc<dyn Prober> = Arc::new(prober);

        let mut backends = BackendRegistry::new();
        match TransformEngine::shared(&config.tools).await {
            Ok(engine) => backends.register(Arc::new(TransformBackend::new(engine))),
            Err(e) => tracing::warn!(backend = %BackendKind::Transform, error = %e, "backend unavailable"),
        }
        match StrategyBackend::from_registry(&tools, config.sizing.limits()) {
            Ok(backend) => backends.register(Arc::new(backend)),
            Err(e) => tracing::warn!(backend = %BackendKind::Strategy, error = %e, "backend unavailable"),
        }
        match CompressorBackend::from_registry(&tools) {
            Ok(backend) => backends.register(Arc::new(backend)),
            Err(e) => tracing::warn!(backend = %BackendKind::Compressor, error = %e, "backend unavailable"),
        }
        tracing::info!(backends = ?backends.kinds(), cache = %config.cache.dir.display(), "engine ready");

        Self {
            tools,
            orchestrator: Arc::new(Orchestrator::new(prober, backends, config)),
        }
    }

    /// Load configuration from `path` (or defaults) and build an engine.
    pub async fn load(path: Option<&Path>) -> Self {
        Self::new(Config::load_or_default(path)).await
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn config(&self) -> &Config {
        self.orchestrator.config()
    }

    /// Backends that were successfully set up.
    pub fn backends(&self) -> Vec<BackendKind> {
        self.orchestrator.backends().kinds()
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Run a job and wait for it.
    pub async fn run(
        &self,
        request: JobRequest,
        progress: ProgressSender,
        cancel: CancellationToken,
    ) -> JobReport {
        self.orchestrator.run(request, progress, cancel).await
    }

    /// Run a job in the background.
    pub fn spawn(&self, request: JobRequest, progress: ProgressSender) -> JobHandle {
        Arc::clone(&self.orchestrator).spawn(request, progress)
    }
}
