use crate::config::{ConfigError, DeviceSpec};
use crate::device::{DeviceClass, DeviceModel};
use anyhow::Result;
use async_trait::async_trait;
use plantgraph::message::{short_uuid, Category, DeviceMessage};
use plantgraph::nats::MessagePublisher;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Upper bound of the random delay before the first emission
pub const MAX_START_DELAY: Duration = Duration::from_secs(5);

/// How often a parked device re-checks its active flag
pub const PARK_POLL: Duration = Duration::from_secs(5);

/// Destination of published device messages
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn publish(&self, message: &DeviceMessage) -> Result<()>;
}

#[async_trait]
impl MessageSink for MessagePublisher {
    async fn publish(&self, message: &DeviceMessage) -> Result<()> {
        MessagePublisher::publish(self, message).await
    }
}

/// State shared between a running simulator and its handle
#[derive(Debug)]
struct DeviceState {
    active: AtomicBool,
    msg_count: AtomicU64,
}

/// One emulated device: identity, cadence and its data model
pub struct DeviceSimulator {
    model: Box<dyn DeviceModel>,
    uuid: String,
    topic: String,
    interval: Duration,
    print_logs: bool,
    module_uuids: Vec<String>,
    max_start_delay: Duration,
    park_poll: Duration,
}

impl DeviceSimulator {
    /// Wrap `model` with the identity and cadence from `spec`.
    ///
    /// An empty uuid gets a fresh v4; module uuids are generated once here,
    /// one per module, in module order.
    pub fn new(model: Box<dyn DeviceModel>, spec: &DeviceSpec) -> Result<Self, ConfigError> {
        let class = model.class();
        let uuid = if spec.uuid.is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            spec.uuid.clone()
        };

        let seconds = spec.interval.unwrap_or_else(|| class.default_interval());
        if seconds == 0 {
            return Err(ConfigError::InvalidInterval(uuid));
        }

        let module_uuids = class
            .modules()
            .iter()
            .map(|_| uuid::Uuid::new_v4().to_string())
            .collect();

        Ok(Self {
            model,
            uuid,
            topic: spec
                .topic
                .clone()
                .unwrap_or_else(|| class.default_topic().to_string()),
            interval: Duration::from_secs(seconds),
            print_logs: spec.print_logs,
            module_uuids,
            max_start_delay: MAX_START_DELAY,
            park_poll: PARK_POLL,
        })
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_start_delay(mut self, max: Duration) -> Self {
        self.max_start_delay = max;
        self
    }

    pub fn with_park_poll(mut self, poll: Duration) -> Self {
        self.park_poll = poll;
        self
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn module_uuids(&self) -> &[String] {
        &self.module_uuids
    }

    /// Start the simulator task
    pub fn spawn(self, sink: Arc<dyn MessageSink>) -> DeviceHandle {
        let state = Arc::new(DeviceState {
            active: AtomicBool::new(true),
            msg_count: AtomicU64::new(0),
        });
        let (stop_tx, stop_rx) = watch::channel(false);
        let uuid = self.uuid.clone();
        let class = self.model.class();

        let join = tokio::spawn(self.run(sink, state.clone(), stop_rx));

        DeviceHandle {
            uuid,
            class,
            state,
            stop_tx,
            join: Some(join),
        }
    }

    async fn run(
        mut self,
        sink: Arc<dyn MessageSink>,
        state: Arc<DeviceState>,
        mut stop: watch::Receiver<bool>,
    ) {
        let class = self.model.class();
        let mut rng = StdRng::from_entropy();

        self.announce(sink.as_ref(), Category::Connected).await;

        let delay = self.max_start_delay.mul_f64(rng.gen::<f64>());
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = stop.changed() => {
                self.announce(sink.as_ref(), Category::Disconnected).await;
                return;
            }
        }

        let started = Instant::now();
        let mut last_emission: Option<Instant> = None;
        let mut parked = false;

        loop {
            if *stop.borrow() {
                break;
            }

            if !state.active.load(Ordering::SeqCst) {
                if !parked {
                    info!(device = %short_uuid(&self.uuid), class = %class, "Device inactive, parking");
                    parked = true;
                }
                tokio::select! {
                    _ = tokio::time::sleep(self.park_poll) => continue,
                    _ = stop.changed() => break,
                }
            }
            if parked {
                info!(device = %short_uuid(&self.uuid), class = %class, "Device active again");
                parked = false;
            }

            let modules = self.model.sample(&mut rng, started.elapsed().as_secs_f64());
            let message = DeviceMessage::data(
                class.name(),
                &self.topic,
                &self.uuid,
                modules,
                &self.module_uuids,
            );

            match sink.publish(&message).await {
                Ok(()) => {
                    let count = state.msg_count.fetch_add(1, Ordering::SeqCst) + 1;
                    let now = Instant::now();
                    let since_last = last_emission
                        .map(|t| now.duration_since(t).as_secs_f64())
                        .unwrap_or(0.0);
                    last_emission = Some(now);

                    info!(
                        device = %short_uuid(&self.uuid),
                        topic = %self.topic,
                        count,
                        since_last = format_args!("{:.2}", since_last),
                        "Data published"
                    );
                    if self.print_logs {
                        let data = Value::Object(message.data.clone());
                        info!(device = %short_uuid(&self.uuid), data = %data, "Data values");
                    }
                }
                Err(e) => {
                    warn!(device = %short_uuid(&self.uuid), error = %e, "Failed to publish data");
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = stop.changed() => break,
            }
        }

        self.announce(sink.as_ref(), Category::Disconnected).await;
    }

    async fn announce(&self, sink: &dyn MessageSink, category: Category) {
        let class = self.model.class();
        let message = DeviceMessage::announcement(class.name(), &self.topic, &self.uuid, category);
        match sink.publish(&message).await {
            Ok(()) => info!(
                device = %short_uuid(&self.uuid),
                class = %class,
                topic = %self.topic,
                category = %category,
                "Device announced"
            ),
            Err(e) => warn!(
                device = %short_uuid(&self.uuid),
                category = %category,
                error = %e,
                "Failed to publish announcement"
            ),
        }
    }
}

/// Control handle of a running simulator
pub struct DeviceHandle {
    uuid: String,
    class: DeviceClass,
    state: Arc<DeviceState>,
    stop_tx: watch::Sender<bool>,
    join: Option<JoinHandle<()>>,
}

impl DeviceHandle {
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn class(&self) -> DeviceClass {
        self.class
    }

    /// Inactive devices stop emitting from their next tick on
    pub fn set_active(&self, active: bool) {
        self.state.active.store(active, Ordering::SeqCst);
        debug!(device = %short_uuid(&self.uuid), active, "Device active flag set");
    }

    pub fn is_active(&self) -> bool {
        self.state.active.load(Ordering::SeqCst)
    }

    /// DATA messages published so far
    pub fn msg_count(&self) -> u64 {
        self.state.msg_count.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.join.as_ref().map(|j| !j.is_finished()).unwrap_or(false)
    }

    /// Stop the simulator and wait for its DISCONNECTED announcement
    pub async fn stop(&mut self) {
        let _ = self.stop_tx.send(true);
        if let Some(join) = self.join.take() {
            if let Err(e) = join.await {
                warn!(device = %short_uuid(&self.uuid), error = %e, "Simulator task failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::NoiseSensor;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        messages: Mutex<Vec<DeviceMessage>>,
    }

    impl RecordingSink {
        fn messages(&self) -> Vec<DeviceMessage> {
            self.messages.lock().unwrap().clone()
        }

        fn count(&self, category: Category) -> usize {
            self.messages().iter().filter(|m| m.category == category).count()
        }
    }

    #[async_trait]
    impl MessageSink for RecordingSink {
        async fn publish(&self, message: &DeviceMessage) -> Result<()> {
            self.messages.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl MessageSink for FailingSink {
        async fn publish(&self, _message: &DeviceMessage) -> Result<()> {
            anyhow::bail!("bus down")
        }
    }

    fn noise_spec(uuid: &str) -> DeviceSpec {
        DeviceSpec {
            class: "NoiseSensor".to_string(),
            uuid: uuid.to_string(),
            ..Default::default()
        }
    }

    fn simulator(uuid: &str) -> DeviceSimulator {
        DeviceSimulator::new(Box::new(NoiseSensor::new(0.0)), &noise_spec(uuid))
            .unwrap()
            .with_interval(Duration::from_millis(10))
            .with_start_delay(Duration::ZERO)
            .with_park_poll(Duration::from_millis(10))
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[test]
    fn test_new_applies_defaults() {
        let sim = DeviceSimulator::new(Box::new(NoiseSensor::new(0.0)), &noise_spec("")).unwrap();
        assert!(uuid::Uuid::parse_str(sim.uuid()).is_ok());
        assert_eq!(sim.topic, "safetyenvironmental");
        assert_eq!(sim.interval, Duration::from_secs(20));
        assert_eq!(sim.module_uuids().len(), 1);

        let mut spec = noise_spec("n1");
        spec.interval = Some(0);
        assert_eq!(
            DeviceSimulator::new(Box::new(NoiseSensor::new(0.0)), &spec).err(),
            Some(ConfigError::InvalidInterval("n1".to_string()))
        );
    }

    #[tokio::test]
    async fn test_connected_then_data_then_disconnected() {
        let sink = Arc::new(RecordingSink::default());
        let sim = simulator("7fc17e8f-1e1c-43f8-a2d1-9ff4bcfbf9ff");
        let module_uuid = sim.module_uuids()[0].clone();
        let mut handle = sim.spawn(sink.clone());

        wait_until(|| handle.msg_count() >= 3).await;
        handle.stop().await;
        assert!(!handle.is_running());

        let messages = sink.messages();
        assert_eq!(messages.first().unwrap().category, Category::Connected);
        assert_eq!(messages.last().unwrap().category, Category::Disconnected);
        assert_eq!(sink.count(Category::Connected), 1);
        assert_eq!(sink.count(Category::Disconnected), 1);

        let data = &messages[1];
        assert_eq!(data.category, Category::Data);
        assert_eq!(data.name, "NoiseSensor");
        assert_eq!(data.topic, "safetyenvironmental");
        assert_eq!(data.module_uuids, vec![module_uuid.clone()]);
        assert_eq!(data.data["noise_sensor"]["uuid"], Value::String(module_uuid));
        let noise = data.data["noise_sensor"]["noise"].as_f64().unwrap();
        assert!((68.0..=72.0).contains(&noise));
    }

    #[tokio::test]
    async fn test_print_logs_device_keeps_publishing() {
        let sink = Arc::new(RecordingSink::default());
        let mut spec = noise_spec("noisy");
        spec.print_logs = true;
        let sim = DeviceSimulator::new(Box::new(NoiseSensor::new(0.0)), &spec)
            .unwrap()
            .with_interval(Duration::from_millis(10))
            .with_start_delay(Duration::ZERO);
        assert!(sim.print_logs);
        let mut handle = sim.spawn(sink.clone());

        wait_until(|| handle.msg_count() >= 2).await;
        handle.stop().await;
        assert!(sink.count(Category::Data) >= 2);
        assert_eq!(sink.count(Category::Disconnected), 1);
    }

    #[tokio::test]
    async fn test_inactive_device_does_not_emit() {
        let sink = Arc::new(RecordingSink::default());
        let mut handle = simulator("robot").spawn(sink.clone());

        wait_until(|| handle.msg_count() >= 1).await;
        handle.set_active(false);
        assert!(!handle.is_active());
        // Let an in-flight tick finish
        tokio::time::sleep(Duration::from_millis(30)).await;

        let parked_at = handle.msg_count();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(handle.msg_count(), parked_at);
        assert_eq!(sink.count(Category::Data) as u64, parked_at);

        handle.set_active(true);
        wait_until(|| handle.msg_count() > parked_at).await;
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_stop_while_parked_announces_disconnect() {
        let sink = Arc::new(RecordingSink::default());
        let mut handle = simulator("parked").spawn(sink.clone());
        handle.set_active(false);

        tokio::time::sleep(Duration::from_millis(30)).await;
        handle.stop().await;
        assert_eq!(sink.count(Category::Disconnected), 1);
    }

    #[tokio::test]
    async fn test_publish_failures_are_not_counted() {
        let mut handle = simulator("offline").spawn(Arc::new(FailingSink));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(handle.is_running());
        assert_eq!(handle.msg_count(), 0);
        handle.stop().await;
    }
}
