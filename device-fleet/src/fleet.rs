use crate::ambient::AmbientZone;
use crate::config::{ConfigError, DeviceSpec, FleetConfig, ScenarioAction, ScenarioStep};
use crate::devices::{build_device, Tasks};
use crate::simulator::{DeviceHandle, DeviceSimulator, MessageSink, MAX_START_DELAY};
use plantgraph::message::short_uuid;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};

/// Running fleet: ambient zones, device simulators and their handles.
///
/// Several handles may share a uuid when a device is replaced under the same
/// identity; lookups resolve to the most recently started one.
pub struct Fleet {
    zones: HashMap<String, Arc<AmbientZone>>,
    zone_tasks: Vec<JoinHandle<()>>,
    tasks: Tasks,
    devices: Vec<DeviceHandle>,
    sink: Arc<dyn MessageSink>,
    shutdown_tx: watch::Sender<bool>,
    rng: StdRng,
    start_delay: Duration,
}

impl Fleet {
    /// Create the zones of `config` and start their updaters
    pub fn new(config: &FleetConfig, sink: Arc<dyn MessageSink>) -> Self {
        let mut rng = StdRng::from_entropy();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut zones = HashMap::new();
        let mut zone_tasks = Vec::new();
        for (name, vars) in &config.zones {
            let zone = Arc::new(AmbientZone::new(name, vars, &mut rng));
            zone_tasks.push(zone.clone().spawn_updater(shutdown_rx.clone()));
            zones.insert(name.clone(), zone);
        }

        Self {
            zones,
            zone_tasks,
            tasks: config.tasks.clone(),
            devices: Vec::new(),
            sink,
            shutdown_tx,
            rng,
            start_delay: MAX_START_DELAY,
        }
    }

    /// Upper bound of each new device's de-synchronising delay
    pub fn with_start_delay(mut self, max: Duration) -> Self {
        self.start_delay = max;
        self
    }

    /// Start every device of `specs`.
    ///
    /// All entries are built before any is started, so a bad entry starts nothing.
    pub fn start(&mut self, specs: &[DeviceSpec]) -> Result<(), ConfigError> {
        let mut simulators = Vec::with_capacity(specs.len());
        for spec in specs {
            simulators.push(self.build(spec)?);
        }
        for simulator in simulators {
            self.launch(simulator);
        }
        info!(devices = self.devices.len(), zones = self.zones.len(), "Fleet started");
        Ok(())
    }

    /// Build and start one device, returning its uuid
    pub fn start_device(&mut self, spec: &DeviceSpec) -> Result<String, ConfigError> {
        let simulator = self.build(spec)?;
        Ok(self.launch(simulator))
    }

    fn build(&mut self, spec: &DeviceSpec) -> Result<DeviceSimulator, ConfigError> {
        let model = build_device(spec, &self.zones, &self.tasks, &mut self.rng)?;
        Ok(DeviceSimulator::new(model, spec)?.with_start_delay(self.start_delay))
    }

    fn launch(&mut self, simulator: DeviceSimulator) -> String {
        let uuid = simulator.uuid().to_string();
        let handle = simulator.spawn(self.sink.clone());
        info!(device = %short_uuid(&uuid), class = %handle.class(), "Device started");
        self.devices.push(handle);
        uuid
    }

    /// Most recently started device with `uuid`
    pub fn device(&self, uuid: &str) -> Option<&DeviceHandle> {
        self.devices.iter().rev().find(|d| d.uuid() == uuid)
    }

    fn device_mut(&mut self, uuid: &str) -> Option<&mut DeviceHandle> {
        self.devices.iter_mut().rev().find(|d| d.uuid() == uuid)
    }

    pub fn devices(&self) -> &[DeviceHandle] {
        &self.devices
    }

    /// Execute one scenario step now
    pub async fn apply(&mut self, step: &ScenarioStep) -> Result<(), ConfigError> {
        info!(action = %step.action, after_secs = step.after_secs, "Scenario step");

        if step.action == ScenarioAction::Start {
            let spec = step
                .spec
                .as_ref()
                .ok_or(ConfigError::MissingTarget(step.action))?;
            self.start_device(spec)?;
            return Ok(());
        }

        let uuid = step
            .device
            .as_deref()
            .ok_or(ConfigError::MissingTarget(step.action))?;
        let handle = self
            .device_mut(uuid)
            .ok_or_else(|| ConfigError::UnknownDevice(uuid.to_string()))?;

        match step.action {
            ScenarioAction::Deactivate => handle.set_active(false),
            ScenarioAction::Activate => handle.set_active(true),
            ScenarioAction::Stop => handle.stop().await,
            ScenarioAction::Start => {}
        }
        Ok(())
    }

    /// Run `steps` on their schedule, relative to now.
    ///
    /// A failing step is logged and the scenario continues.
    pub async fn run_scenario(&mut self, steps: &[ScenarioStep]) {
        let mut steps = steps.to_vec();
        steps.sort_by_key(|s| s.after_secs);

        let started = Instant::now();
        for step in &steps {
            tokio::time::sleep_until(started + Duration::from_secs(step.after_secs)).await;
            if let Err(e) = self.apply(step).await {
                warn!(action = %step.action, error = %e, "Scenario step failed");
            }
        }

        if !steps.is_empty() {
            info!(steps = steps.len(), "Scenario complete");
        }
    }

    /// Stop every device (each announces DISCONNECTED), then the zone updaters
    pub async fn shutdown(mut self) {
        info!(devices = self.devices.len(), "Stopping fleet");
        for handle in self.devices.iter_mut() {
            handle.stop().await;
        }

        let _ = self.shutdown_tx.send(true);
        for task in self.zone_tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(error = %e, "Ambient updater failed");
            }
        }
        info!("Fleet stopped");
    }
}
