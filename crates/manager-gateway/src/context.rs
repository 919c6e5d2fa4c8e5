//! The manager context handed to every handler.
//!
//! Owns everything a request may read or change: the collaborators, the
//! subscriber registry, the connection set and the deferred reply slot.
//! There is exactly one per gateway and it is only touched from the event
//! loop.

use crate::auth::AuthorizationGate;
use crate::broadcast::{BroadcastEngine, DeliveryError, ManagerSignal};
use crate::connections::ConnectionSet;
use crate::domain::config::GatewayConfig;
use crate::domain::deferred::DeferredReplyTracker;
use crate::domain::error::GatewayError;
use crate::domain::types::RunningScope;
use crate::metrics::GatewayMetrics;
use crate::ports::outbound::{LogControl, SupervisorCore, SystemProbe, UnitFileStore};
use crate::ports::HostProbe;
use crate::properties::PropertyAccessor;
use crate::subscribers::SubscriberRegistry;
use crate::telemetry::InMemoryLogControl;
use shared_bus::ObjectPath;
use std::sync::Arc;

pub struct ManagerContext {
    pub config: GatewayConfig,
    pub core: Box<dyn SupervisorCore>,
    pub unit_files: Box<dyn UnitFileStore>,
    pub gate: AuthorizationGate,
    pub log_control: Arc<dyn LogControl>,
    pub probe: Arc<dyn SystemProbe>,
    pub subscribers: SubscriberRegistry,
    pub connections: ConnectionSet,
    pub deferred: DeferredReplyTracker,
    pub broadcaster: BroadcastEngine,
    pub properties: PropertyAccessor,
    pub metrics: Arc<GatewayMetrics>,
}

impl ManagerContext {
    /// Context with the gate from `config.access`, a recording log control
    /// and a probe of the real host. Use the `with_*` methods to swap them.
    pub fn new(
        config: GatewayConfig,
        core: Box<dyn SupervisorCore>,
        unit_files: Box<dyn UnitFileStore>,
    ) -> Result<Self, GatewayError> {
        config.validate()?;
        let gate = AuthorizationGate::from_config(&config.access);
        let object_path = ObjectPath::new(config.bus.object_path.as_str())?;
        Ok(Self {
            config,
            core,
            unit_files,
            gate,
            log_control: Arc::new(InMemoryLogControl::default()),
            probe: Arc::new(HostProbe::new()),
            subscribers: SubscriberRegistry::new(),
            connections: ConnectionSet::new(),
            deferred: DeferredReplyTracker::new(),
            broadcaster: BroadcastEngine::with_path(object_path),
            properties: PropertyAccessor::new()?,
            metrics: Arc::new(GatewayMetrics::new()),
        })
    }

    #[must_use]
    pub fn with_gate(mut self, gate: AuthorizationGate) -> Self {
        self.gate = gate;
        self
    }

    #[must_use]
    pub fn with_log_control(mut self, log_control: Arc<dyn LogControl>) -> Self {
        self.log_control = log_control;
        self
    }

    #[must_use]
    pub fn with_probe(mut self, probe: Arc<dyn SystemProbe>) -> Self {
        self.probe = probe;
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<GatewayMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    #[must_use]
    pub fn scope(&self) -> RunningScope {
        self.config.manager.scope
    }

    /// Fan `signal` out to the current subscribers.
    pub fn broadcast(&self, signal: &ManagerSignal) -> Result<usize, DeliveryError> {
        let result = self
            .broadcaster
            .deliver(&self.subscribers, &self.connections, signal);
        self.metrics
            .record_signal(result.as_ref().map_or_else(|e| e.failed, |_| 0));
        result
    }
}
