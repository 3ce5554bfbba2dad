//! Plugin lifecycle: wire everything up on enable, drain on disable.

use std::path::Path;
use std::sync::Arc;

use packshield_engine::EngineGateway;
use packshield_protection::ProtectionManager;
use packshield_tick::{Scheduler, TokioScheduler};

use crate::{
    BridgeDetector, ConfigError, DeliveryPipeline, JoinListener, ProbeStrategy,
    ProtectionListener, ShieldConfig, ShieldError,
};

/// Builder for configuring and enabling PackShield.
///
/// # Example
///
/// ```rust,ignore
/// let shield = PackShieldBuilder::new(my_pipeline)
///     .config_file("plugins/PackShield/config.json")?
///     .probe(0, floodgate_probe)
///     .enable(engine, scheduler);
///
/// // host event handlers call shield.join_listener() / shield.listener()
///
/// shield.disable();
/// ```
pub struct PackShieldBuilder<P> {
    config: ShieldConfig,
    detector: BridgeDetector,
    pipeline: Arc<P>,
}

impl<P: DeliveryPipeline> PackShieldBuilder<P> {
    pub fn new(pipeline: P) -> Self {
        Self {
            config: ShieldConfig::default(),
            detector: BridgeDetector::new(),
            pipeline: Arc::new(pipeline),
        }
    }

    /// Replaces the configuration.
    pub fn config(mut self, config: ShieldConfig) -> Self {
        self.config = config.validated();
        self
    }

    /// Loads the configuration from a JSON file.
    pub fn config_file(mut self, path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        self.config = ShieldConfig::load(path)?;
        Ok(self)
    }

    /// Registers a bridged-client probe. Lower priorities run first.
    pub fn probe(mut self, priority: i32, strategy: impl ProbeStrategy + 'static) -> Self {
        self.detector.register(priority, strategy);
        self
    }

    /// Creates the protection manager and the listeners.
    pub fn enable<E, S>(self, engine: Arc<E>, scheduler: Arc<S>) -> PackShield<E, S, P>
    where
        E: EngineGateway,
        S: Scheduler,
    {
        let manager = ProtectionManager::new(engine, scheduler, self.config.protection.clone());
        let listener = ProtectionListener::new(manager.clone());
        let join = JoinListener::new(
            manager.clone(),
            self.pipeline,
            Arc::new(self.detector),
            self.config.detect_bridged_clients,
        );
        tracing::info!(
            fallback = %self.config.protection.fallback_timeout,
            countdown = %self.config.protection.release_countdown,
            air_policy = ?self.config.protection.air_policy,
            detect_bridged = self.config.detect_bridged_clients,
            "PackShield enabled"
        );
        PackShield {
            config: self.config,
            manager,
            listener,
            join,
        }
    }

    /// Enables with a [`TokioScheduler`] on the runtime this is called from.
    pub fn enable_on_current_runtime<E>(
        self,
        engine: Arc<E>,
    ) -> Result<PackShield<E, TokioScheduler, P>, ShieldError>
    where
        E: EngineGateway,
    {
        let scheduler = TokioScheduler::try_current().ok_or(ShieldError::NoRuntime)?;
        Ok(self.enable(engine, Arc::new(scheduler)))
    }

    /// Enables with a [`TokioScheduler`] that spawns onto `runtime`.
    pub fn enable_on_runtime<E>(
        self,
        engine: Arc<E>,
        runtime: tokio::runtime::Handle,
    ) -> PackShield<E, TokioScheduler, P>
    where
        E: EngineGateway,
    {
        self.enable(engine, Arc::new(TokioScheduler::with_handle(runtime)))
    }
}

/// An enabled plugin instance.
///
/// Owns the only [`ProtectionManager`]. Dropping it without calling
/// [`disable`](Self::disable) leaves protected players protected until
/// their fallback timers fire.
pub struct PackShield<E: EngineGateway, S: Scheduler, P> {
    config: ShieldConfig,
    manager: ProtectionManager<E, S>,
    listener: ProtectionListener<E, S>,
    join: JoinListener<E, S, P>,
}

impl<E, S, P> PackShield<E, S, P>
where
    E: EngineGateway,
    S: Scheduler,
    P: DeliveryPipeline,
{
    pub fn config(&self) -> &ShieldConfig {
        &self.config
    }

    pub fn manager(&self) -> &ProtectionManager<E, S> {
        &self.manager
    }

    /// Damage, combustion, velocity, air, move and quit events.
    pub fn listener(&self) -> &ProtectionListener<E, S> {
        &self.listener
    }

    /// Join and pack status events.
    pub fn join_listener(&self) -> &JoinListener<E, S, P> {
        &self.join
    }

    /// Restores every protected player and retires every overlay.
    /// Returns the number of players whose protection was ended.
    pub fn disable(self) -> usize {
        let restored = self.manager.shutdown();
        tracing::info!(restored, "PackShield disabled");
        restored
    }
}
