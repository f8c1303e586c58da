//! Application state management

use std::sync::Arc;

use crate::auth::AuthMachine;
use crate::config::Config;
use crate::supervisor::ConnectionSupervisor;
use crate::transfer::{StagingArea, TransferPipeline, TransferRegistry};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    supervisor: ConnectionSupervisor,
    auth: AuthMachine,
    pipeline: TransferPipeline,
}

impl AppState {
    /// Wire the handshake and the pipeline onto one supervisor
    pub fn new(config: Config, supervisor: ConnectionSupervisor) -> Self {
        let auth = AuthMachine::new(supervisor.clone(), config.account.phone.clone());
        let pipeline = TransferPipeline::new(
            supervisor.clone(),
            StagingArea::new(config.transfer.staging_dir.clone()),
            TransferRegistry::new(),
            config.transfer.timeout(),
        );

        Self {
            inner: Arc::new(AppStateInner {
                config,
                supervisor,
                auth,
                pipeline,
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn supervisor(&self) -> &ConnectionSupervisor {
        &self.inner.supervisor
    }

    /// Get the handshake state machine
    pub fn auth(&self) -> &AuthMachine {
        &self.inner.auth
    }

    pub fn pipeline(&self) -> &TransferPipeline {
        &self.inner.pipeline
    }

    pub fn registry(&self) -> &TransferRegistry {
        self.inner.pipeline.registry()
    }
}
