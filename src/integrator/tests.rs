use super::*;
use crate::graph::GraphStore;
use crate::message::{Category, DeviceMessage};
use crate::sdf::SdfRegistry;
use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::watch;
use tracing::field::{Field, Visit};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

#[derive(Clone, Debug, PartialEq)]
enum Op {
    Define,
    Insert,
    Update,
}

/// Records every transaction; optionally fails one kind of request
#[derive(Default)]
struct RecordingStore {
    log: Mutex<Vec<(Op, String)>>,
    fail: Mutex<Option<Op>>,
    devices: Vec<Value>,
    modules: Vec<Value>,
}

impl RecordingStore {
    fn record(&self, op: Op, query: &str) -> Result<()> {
        if self.fail.lock().unwrap().as_ref() == Some(&op) {
            bail!("connection reset");
        }
        self.log.lock().unwrap().push((op, query.to_string()));
        Ok(())
    }

    fn count(&self, op: Op) -> usize {
        self.log.lock().unwrap().iter().filter(|(o, _)| *o == op).count()
    }

    fn queries(&self, op: Op) -> Vec<String> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|(o, _)| *o == op)
            .map(|(_, q)| q.clone())
            .collect()
    }

    fn total(&self) -> usize {
        self.log.lock().unwrap().len()
    }

    fn fail_on(&self, op: Option<Op>) {
        *self.fail.lock().unwrap() = op;
    }
}

#[async_trait]
impl GraphStore for RecordingStore {
    async fn define(&self, query: &str) -> Result<()> {
        self.record(Op::Define, query)
    }

    async fn insert(&self, query: &str) -> Result<()> {
        self.record(Op::Insert, query)
    }

    async fn update(&self, query: &str) -> Result<()> {
        self.record(Op::Update, query)
    }

    async fn match_values(&self, query: &str, _var: &str) -> Result<Vec<Value>> {
        if query.contains("includes") {
            Ok(self.modules.clone())
        } else {
            Ok(self.devices.clone())
        }
    }
}

fn write(dir: &Path, name: &str, value: Value) {
    fs::write(dir.join(name), serde_json::to_string_pretty(&value).unwrap()).unwrap();
}

fn thing(class: &str, objects: Value) -> Value {
    json!({ "sdfThing": { class: { "sdfObject": objects } } })
}

fn sdf_dir() -> TempDir {
    let dir = TempDir::new().unwrap();

    write(
        dir.path(),
        "common.json",
        json!({
            "sdfProperty": {
                "temperature": { "type": "number" },
                "humidity": { "type": "number" },
                "pm": { "type": "number" }
            }
        }),
    );
    write(
        dir.path(),
        "AirQuality.json",
        thing(
            "AirQuality",
            json!({
                "temperature_sensor": { "sdfProperty": { "temperature": { "sdfRef": "common/sdfProperty.temperature" } } },
                "humidity_sensor": { "sdfProperty": { "humidity": { "sdfRef": "common/sdfProperty.humidity" } } },
                "pressure_sensor": { "sdfProperty": { "pressure": { "type": "number" } } },
                "air_quality_sensor": { "sdfProperty": {
                    "pm1": { "sdfRef": "common/sdfProperty.pm" },
                    "pm25": { "sdfRef": "common/sdfProperty.pm" },
                    "pm10": { "sdfRef": "common/sdfProperty.pm" }
                } }
            }),
        ),
    );
    write(
        dir.path(),
        "AirQualityModified.json",
        thing(
            "AirQualityModified",
            json!({
                "temperature_humidity_sensor": { "sdfProperty": {
                    "temperature": { "sdfRef": "common/sdfProperty.temperature" },
                    "humidity": { "sdfRef": "common/sdfProperty.humidity" }
                } },
                "air_quality_sensor": { "sdfProperty": {
                    "pm25": { "sdfRef": "common/sdfProperty.pm" },
                    "pm10": { "sdfRef": "common/sdfProperty.pm" }
                } }
            }),
        ),
    );
    write(
        dir.path(),
        "Tracker.json",
        thing(
            "Tracker",
            json!({
                "locator": { "sdfProperty": {
                    "vec": { "type": "array", "items": { "type": "number" }, "maxItems": 3 },
                    "count": { "type": "integer" }
                } }
            }),
        ),
    );
    write(
        dir.path(),
        "Thermostat.json",
        thing(
            "Thermostat",
            json!({ "dial": { "sdfProperty": { "temperature": { "type": "integer" } } } }),
        ),
    );

    dir
}

fn setup(store: RecordingStore) -> (TempDir, Arc<RecordingStore>, Integrator) {
    let dir = sdf_dir();
    let store = Arc::new(store);
    let registry = Arc::new(SdfRegistry::new(dir.path()));
    let integrator = Integrator::new(store.clone(), registry);
    (dir, store, integrator)
}

fn message(class: &str, uuid: &str, data: Value) -> DeviceMessage {
    let module_uuids: Vec<Value> = data
        .as_object()
        .unwrap()
        .values()
        .map(|m| m["uuid"].clone())
        .collect();
    serde_json::from_value(json!({
        "name": class,
        "topic": "safetyenvironmental",
        "uuid": uuid,
        "timestamp": "2024-03-01T10:15:00",
        "category": "DATA",
        "module_uuids": module_uuids,
        "data": data
    }))
    .unwrap()
}

fn air_quality(uuid: &str, prefix: &str) -> DeviceMessage {
    message(
        "AirQuality",
        uuid,
        json!({
            "temperature_sensor": { "uuid": format!("{}-t", prefix), "temperature": 21.5 },
            "humidity_sensor": { "uuid": format!("{}-h", prefix), "humidity": 40.0 },
            "pressure_sensor": { "uuid": format!("{}-p", prefix), "pressure": 1013.2 },
            "air_quality_sensor": { "uuid": format!("{}-a", prefix), "pm1": 3.1, "pm25": 7.0, "pm10": 11.2 }
        }),
    )
}

#[tokio::test]
async fn test_first_message_defines_schema_once_per_class() {
    let (_dir, store, mut integrator) = setup(RecordingStore::default());

    let outcome = integrator.integrate(&air_quality("aq-1", "a")).await.unwrap();
    assert!(outcome.placed);
    assert!(outcome.schema_defined);
    assert_eq!(outcome.modules_inserted, 4);
    assert!(outcome.updated);
    assert_eq!(store.count(Op::Define), 1);
    // bare device + modules
    assert_eq!(store.count(Op::Insert), 2);
    assert_eq!(store.count(Op::Update), 1);

    let define = &store.queries(Op::Define)[0];
    for attribute in ["temperature", "humidity", "pressure", "pm1", "pm25", "pm10"] {
        assert!(define.contains(&format!("attribute {}, value double;", attribute)));
    }
    assert!(define.contains("entity air_quality_sensor sub module, owns pm1, owns pm25, owns pm10;"));

    let outcome = integrator.integrate(&air_quality("aq-2", "b")).await.unwrap();
    assert!(outcome.placed);
    assert!(!outcome.schema_defined);
    assert_eq!(outcome.modules_inserted, 4);
    assert_eq!(store.count(Op::Define), 1);
}

#[tokio::test]
async fn test_redelivery_only_rewrites_values() {
    let (_dir, store, mut integrator) = setup(RecordingStore::default());
    let msg = air_quality("aq-1", "a");

    integrator.integrate(&msg).await.unwrap();
    let before = store.total();

    let outcome = integrator.integrate(&msg).await.unwrap();
    assert!(!outcome.placed);
    assert!(!outcome.schema_defined);
    assert_eq!(outcome.modules_inserted, 0);
    assert_eq!(store.total(), before + 1);

    let updates = store.queries(Op::Update);
    assert_eq!(updates.len(), 2);
    assert_eq!(updates[0], updates[1]);
    assert_eq!(integrator.known_devices().get("aq-1").unwrap().module_uuids.len(), 4);
}

#[tokio::test]
async fn test_array_property_expands_to_scalar_attributes() {
    let (_dir, store, mut integrator) = setup(RecordingStore::default());
    let msg = message(
        "Tracker",
        "tr-1",
        json!({ "locator": { "uuid": "loc", "vec": [0.5, 1.25, -2.0], "count": 4 } }),
    );

    integrator.integrate(&msg).await.unwrap();

    let define = &store.queries(Op::Define)[0];
    assert!(define.contains("attribute vec_1, value double;"));
    assert!(define.contains("attribute vec_2, value double;"));
    assert!(define.contains("attribute vec_3, value double;"));
    assert!(define.contains("attribute count, value integer;"));

    let inserts = store.queries(Op::Insert);
    assert!(inserts[1].contains("has vec_1 0.0, has vec_2 0.0, has vec_3 0.0, has count 0"));

    let update = &store.queries(Op::Update)[0];
    assert!(update.contains("$mod1 has vec_1 0.50000;"));
    assert!(update.contains("$mod1 has vec_2 1.25000;"));
    assert!(update.contains("$mod1 has vec_3 -2.00000;"));
    assert!(update.contains("$mod1 has count 4;"));
}

#[tokio::test]
async fn test_wrong_array_length_is_dropped_before_any_transaction() {
    let (_dir, store, mut integrator) = setup(RecordingStore::default());
    let msg = message(
        "Tracker",
        "tr-1",
        json!({ "locator": { "uuid": "loc", "vec": [0.5, 1.25] } }),
    );

    let err = integrator.integrate(&msg).await.unwrap_err();
    assert!(matches!(err, IntegrationError::TypeMismatch { ref property, .. } if property == "vec"));
    assert_eq!(store.total(), 0);
    assert!(!integrator.known_devices().contains("tr-1"));
}

#[tokio::test]
async fn test_integer_property_rejects_fractional_value() {
    let (_dir, store, mut integrator) = setup(RecordingStore::default());
    let msg = message(
        "Tracker",
        "tr-1",
        json!({ "locator": { "uuid": "loc", "count": 2.5 } }),
    );

    let err = integrator.integrate(&msg).await.unwrap_err();
    assert!(matches!(err, IntegrationError::TypeMismatch { .. }));
    assert_eq!(store.total(), 0);
}

#[tokio::test]
async fn test_unknown_class_leaves_device_unknown() {
    let (_dir, store, mut integrator) = setup(RecordingStore::default());
    let msg = message("Teleporter", "tp-1", json!({ "coil": { "uuid": "c", "charge": 1.0 } }));

    let err = integrator.integrate(&msg).await.unwrap_err();
    assert!(matches!(err, IntegrationError::Description(_)));
    assert_eq!(store.total(), 0);
    assert!(integrator.known_devices().is_empty());
}

#[tokio::test]
async fn test_undeclared_module_and_property_are_rejected() {
    let (_dir, store, mut integrator) = setup(RecordingStore::default());

    let msg = message("Tracker", "tr-1", json!({ "antenna": { "uuid": "a", "gain": 1.0 } }));
    let err = integrator.integrate(&msg).await.unwrap_err();
    assert!(matches!(err, IntegrationError::UnknownModule { .. }));

    let msg = message("Tracker", "tr-1", json!({ "locator": { "uuid": "l", "speed": 1.0 } }));
    let err = integrator.integrate(&msg).await.unwrap_err();
    assert!(matches!(err, IntegrationError::UnknownProperty { .. }));

    assert_eq!(store.total(), 0);
}

#[tokio::test]
async fn test_conflicting_attribute_type_keeps_prior_schema() {
    let (_dir, store, mut integrator) = setup(RecordingStore::default());
    integrator.integrate(&air_quality("aq-1", "a")).await.unwrap();
    let before = store.total();

    let msg = message("Thermostat", "th-1", json!({ "dial": { "uuid": "d", "temperature": 20 } }));
    let err = integrator.integrate(&msg).await.unwrap_err();
    assert_eq!(
        err,
        IntegrationError::SchemaConflict {
            attribute: "temperature".to_string(),
            defined: crate::sdf::ValueType::Double,
            requested: crate::sdf::ValueType::Integer,
        }
    );
    assert_eq!(store.total(), before);
    assert!(!integrator.known_devices().contains("th-1"));
    assert_eq!(
        integrator.schema().attribute_type("temperature"),
        Some(crate::sdf::ValueType::Double)
    );
}

#[tokio::test]
async fn test_transaction_failure_is_surfaced_and_later_messages_proceed() {
    let (_dir, store, mut integrator) = setup(RecordingStore::default());
    integrator.integrate(&air_quality("aq-1", "a")).await.unwrap();

    store.fail_on(Some(Op::Update));
    let err = integrator.integrate(&air_quality("aq-1", "a")).await.unwrap_err();
    assert!(err.is_transaction());

    store.fail_on(None);
    let outcome = integrator.integrate(&air_quality("aq-1", "a")).await.unwrap();
    assert!(outcome.updated);
}

#[tokio::test]
async fn test_failed_define_is_retried_on_next_message() {
    let (_dir, store, mut integrator) = setup(RecordingStore::default());

    store.fail_on(Some(Op::Define));
    let err = integrator.integrate(&air_quality("aq-1", "a")).await.unwrap_err();
    assert!(err.is_transaction());
    // Device was placed before the schema step
    assert!(integrator.known_devices().contains("aq-1"));

    store.fail_on(None);
    let outcome = integrator.integrate(&air_quality("aq-1", "a")).await.unwrap();
    assert!(!outcome.placed);
    assert!(outcome.schema_defined);
    assert_eq!(outcome.modules_inserted, 4);
}

#[tokio::test]
async fn test_replacement_under_same_uuid_adopts_new_class() {
    let (_dir, store, mut integrator) = setup(RecordingStore::default());
    integrator
        .integrate(&air_quality("indoors_airquality", "old"))
        .await
        .unwrap();

    let replacement = message(
        "AirQualityModified",
        "indoors_airquality",
        json!({
            "temperature_humidity_sensor": { "uuid": "new-th", "temperature": 22.0, "humidity": 41.0 },
            "air_quality_sensor": { "uuid": "new-a", "pm25": 6.0, "pm10": 10.0 }
        }),
    );
    let outcome = integrator.integrate(&replacement).await.unwrap();
    assert!(outcome.replaced);
    assert!(!outcome.placed);
    assert!(outcome.schema_defined);
    assert_eq!(outcome.modules_inserted, 2);

    // Only the new module sub-type is declared; attributes already exist
    let define = store.queries(Op::Define).pop().unwrap();
    assert_eq!(
        define,
        "define\nentity temperature_humidity_sensor sub module, owns temperature, owns humidity;\n"
    );

    let device = integrator.known_devices().get("indoors_airquality").unwrap();
    assert_eq!(device.module_uuids.len(), 6);
    assert!(device.module_uuids.contains("old-t"));
    assert_eq!(
        device.description.as_ref().unwrap().class_name,
        "AirQualityModified"
    );
}

/// Collects the message of every tracing event
#[derive(Clone, Default)]
struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    fn count(&self, message: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|m| *m == message).count()
    }
}

struct MessageField<'a>(&'a mut Option<String>);

impl Visit for MessageField<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            *self.0 = Some(format!("{:?}", value));
        }
    }
}

impl<S: tracing::Subscriber> Layer<S> for EventLog {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut message = None;
        event.record(&mut MessageField(&mut message));
        if let Some(message) = message {
            self.0.lock().unwrap().push(message);
        }
    }
}

#[tokio::test]
async fn test_device_tree_is_logged_when_modules_are_added() {
    let events = EventLog::default();
    let _guard =
        tracing::subscriber::set_default(tracing_subscriber::registry().with(events.clone()));
    let (_dir, _store, mut integrator) = setup(RecordingStore::default());

    let msg = air_quality("indoors_airquality", "old");
    integrator.integrate(&msg).await.unwrap();
    assert_eq!(events.count("Device tree"), 1);

    // Nothing new to extend
    integrator.integrate(&msg).await.unwrap();
    assert_eq!(events.count("Device tree"), 1);

    let replacement = message(
        "AirQualityModified",
        "indoors_airquality",
        json!({
            "temperature_humidity_sensor": { "uuid": "new-th", "temperature": 22.0, "humidity": 41.0 },
            "air_quality_sensor": { "uuid": "new-a", "pm25": 6.0, "pm10": 10.0 }
        }),
    );
    integrator.integrate(&replacement).await.unwrap();
    assert_eq!(events.count("Device tree"), 2);
    assert!(events.count("  module temperature_humidity_sensor") >= 1);
}

#[tokio::test]
async fn test_announcements() {
    let (_dir, store, mut integrator) = setup(RecordingStore::default());

    let connected = DeviceMessage::announcement("AirQuality", "safetyenvironmental", "aq-1", Category::Connected);
    let outcome = integrator.integrate(&connected).await.unwrap();
    assert!(outcome.placed);
    assert_eq!(store.count(Op::Insert), 1);
    assert_eq!(store.count(Op::Define), 0);

    // Already known: nothing to do
    integrator.integrate(&connected).await.unwrap();
    assert_eq!(store.total(), 1);

    let disconnected = DeviceMessage::announcement("AirQuality", "safetyenvironmental", "aq-9", Category::Disconnected);
    let outcome = integrator.integrate(&disconnected).await.unwrap();
    assert!(!outcome.placed);
    assert_eq!(store.total(), 1);
    assert!(!integrator.known_devices().contains("aq-9"));
}

#[tokio::test]
async fn test_known_devices_seeded_from_graph() {
    let store = RecordingStore {
        devices: vec![json!("aq-1")],
        modules: vec![json!("a-t"), json!("a-h"), json!("a-p"), json!("a-a")],
        ..Default::default()
    };
    let (_dir, store, mut integrator) = setup(store);

    assert_eq!(integrator.load_known_devices().await.unwrap(), 1);
    assert!(integrator.known_devices().get("aq-1").unwrap().description.is_none());

    let outcome = integrator.integrate(&air_quality("aq-1", "a")).await.unwrap();
    assert!(!outcome.placed);
    assert_eq!(outcome.modules_inserted, 0);
    assert_eq!(store.count(Op::Insert), 0);
    assert_eq!(store.count(Op::Update), 1);
    assert!(integrator.known_devices().get("aq-1").unwrap().description.is_some());
}

#[tokio::test]
async fn test_run_drops_bad_payloads_and_keeps_going() {
    let (_dir, store, mut integrator) = setup(RecordingStore::default());
    let good = serde_json::to_vec(&air_quality("aq-1", "a")).unwrap();
    let payloads = vec![b"not json".to_vec(), good];

    let (_tx, rx) = watch::channel(false);
    integrator
        .run(futures::stream::iter(payloads), rx)
        .await
        .unwrap();

    let stats = integrator.stats();
    assert_eq!(stats.received, 2);
    assert_eq!(stats.dropped, 1);
    assert_eq!(stats.integrated, 1);
    assert_eq!(stats.devices_placed, 1);
    assert_eq!(stats.schema_defines, 1);
    assert_eq!(store.count(Op::Update), 1);
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let (_dir, _store, mut integrator) = setup(RecordingStore::default());
    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();

    integrator
        .run(futures::stream::pending::<Vec<u8>>(), rx)
        .await
        .unwrap();
    assert_eq!(integrator.stats().received, 0);
}
