use plantgraph::nats::{PRODUCTION_ROOT, SAFETY_ROOT};
use rand::rngs::StdRng;
use serde_json::{Map, Value};
use std::fmt;

/// Module name and its property values, in emission order
pub type ModuleData = (String, Map<String, Value>);

/// Data generator of one emulated device.
///
/// A model owns the evolving state of its modules; the simulator owns
/// identity, cadence and publishing.
pub trait DeviceModel: Send + Sync {
    fn class(&self) -> DeviceClass;

    /// Next reading of every module.
    ///
    /// `elapsed` is seconds on a monotonic clock since the simulator started.
    fn sample(&mut self, rng: &mut StdRng, elapsed: f64) -> Vec<ModuleData>;
}

/// Build one module entry from `(property, value)` pairs
pub fn module<I>(name: &str, properties: I) -> ModuleData
where
    I: IntoIterator<Item = (&'static str, Value)>,
{
    let map = properties
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
    (name.to_string(), map)
}

/// Every device class the fleet can emulate
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeviceClass {
    ConveyorBelt,
    TagScanner,
    ProductionControl,
    RepairControl,
    ConfigurationScanner,
    QualityScanner,
    FaultNotifier,
    PoseDetector,
    PieceDetector,
    PickUpRobot,
    ClampingRobot,
    DrillingRobot,
    MillingRobot,
    AirQuality,
    AirQualityModified,
    NoiseSensor,
    SmokeSensor,
    SeismicSensor,
    RainSensor,
    WindSensor,
    IndoorsAlarm,
    OutdoorsAlarm,
}

impl DeviceClass {
    pub const ALL: [DeviceClass; 22] = [
        DeviceClass::ConveyorBelt,
        DeviceClass::TagScanner,
        DeviceClass::ProductionControl,
        DeviceClass::RepairControl,
        DeviceClass::ConfigurationScanner,
        DeviceClass::QualityScanner,
        DeviceClass::FaultNotifier,
        DeviceClass::PoseDetector,
        DeviceClass::PieceDetector,
        DeviceClass::PickUpRobot,
        DeviceClass::ClampingRobot,
        DeviceClass::DrillingRobot,
        DeviceClass::MillingRobot,
        DeviceClass::AirQuality,
        DeviceClass::AirQualityModified,
        DeviceClass::NoiseSensor,
        DeviceClass::SmokeSensor,
        DeviceClass::SeismicSensor,
        DeviceClass::RainSensor,
        DeviceClass::WindSensor,
        DeviceClass::IndoorsAlarm,
        DeviceClass::OutdoorsAlarm,
    ];

    /// Class name on the wire, also the self-description file name
    pub fn name(&self) -> &'static str {
        match self {
            DeviceClass::ConveyorBelt => "ConveyorBelt",
            DeviceClass::TagScanner => "TagScanner",
            DeviceClass::ProductionControl => "ProductionControl",
            DeviceClass::RepairControl => "RepairControl",
            DeviceClass::ConfigurationScanner => "ConfigurationScanner",
            DeviceClass::QualityScanner => "QualityScanner",
            DeviceClass::FaultNotifier => "FaultNotifier",
            DeviceClass::PoseDetector => "PoseDetector",
            DeviceClass::PieceDetector => "PieceDetector",
            DeviceClass::PickUpRobot => "PickUpRobot",
            DeviceClass::ClampingRobot => "ClampingRobot",
            DeviceClass::DrillingRobot => "DrillingRobot",
            DeviceClass::MillingRobot => "MillingRobot",
            DeviceClass::AirQuality => "AirQuality",
            DeviceClass::AirQualityModified => "AirQualityModified",
            DeviceClass::NoiseSensor => "NoiseSensor",
            DeviceClass::SmokeSensor => "SmokeSensor",
            DeviceClass::SeismicSensor => "SeismicSensor",
            DeviceClass::RainSensor => "RainSensor",
            DeviceClass::WindSensor => "WindSensor",
            DeviceClass::IndoorsAlarm => "IndoorsAlarm",
            DeviceClass::OutdoorsAlarm => "OutdoorsAlarm",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.name() == name)
    }

    /// Default seconds between emissions
    pub fn default_interval(&self) -> u64 {
        match self {
            DeviceClass::ConveyorBelt => 5,
            DeviceClass::TagScanner | DeviceClass::ProductionControl => 180,
            DeviceClass::RepairControl => 120,
            DeviceClass::ConfigurationScanner
            | DeviceClass::QualityScanner
            | DeviceClass::FaultNotifier => 30,
            DeviceClass::PoseDetector
            | DeviceClass::PieceDetector
            | DeviceClass::PickUpRobot
            | DeviceClass::ClampingRobot
            | DeviceClass::DrillingRobot
            | DeviceClass::MillingRobot
            | DeviceClass::AirQuality
            | DeviceClass::AirQualityModified => 10,
            DeviceClass::NoiseSensor
            | DeviceClass::SmokeSensor
            | DeviceClass::SeismicSensor
            | DeviceClass::RainSensor
            | DeviceClass::WindSensor => 20,
            DeviceClass::IndoorsAlarm | DeviceClass::OutdoorsAlarm => 15,
        }
    }

    /// Topic root the class publishes under by default
    pub fn default_topic(&self) -> &'static str {
        if self.is_production() {
            PRODUCTION_ROOT
        } else {
            SAFETY_ROOT
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(
            self,
            DeviceClass::ConveyorBelt
                | DeviceClass::TagScanner
                | DeviceClass::ProductionControl
                | DeviceClass::RepairControl
                | DeviceClass::ConfigurationScanner
                | DeviceClass::QualityScanner
                | DeviceClass::FaultNotifier
                | DeviceClass::PoseDetector
                | DeviceClass::PieceDetector
                | DeviceClass::PickUpRobot
                | DeviceClass::ClampingRobot
                | DeviceClass::DrillingRobot
                | DeviceClass::MillingRobot
        )
    }

    /// Ambient variables the class reads from its zone
    pub fn zone_variables(&self) -> &'static [&'static str] {
        match self {
            DeviceClass::AirQuality => &["temperature", "humidity", "pressure", "pm1", "pm25", "pm10"],
            DeviceClass::AirQualityModified => &["temperature", "humidity", "pm25", "pm10"],
            DeviceClass::RainSensor => &["rain_cumdepth"],
            DeviceClass::WindSensor => &["wind_speed", "wind_direction"],
            _ => &[],
        }
    }

    /// Module names in emission order
    pub fn modules(&self) -> &'static [&'static str] {
        match self {
            DeviceClass::ConveyorBelt => &["conveyor_belt"],
            DeviceClass::TagScanner => &["rfid_scanner"],
            DeviceClass::ProductionControl => &["production_control"],
            DeviceClass::RepairControl => &["repair_control"],
            DeviceClass::ConfigurationScanner | DeviceClass::QualityScanner => &[
                "left_cam",
                "right_cam",
                "front_cam",
                "back_cam",
                "top_cam",
                "bottom_cam",
            ],
            DeviceClass::FaultNotifier => &["fault_notifier"],
            DeviceClass::PoseDetector => &["pose_detection_cam"],
            DeviceClass::PieceDetector => &["piece_detection_cam"],
            DeviceClass::PickUpRobot
            | DeviceClass::ClampingRobot
            | DeviceClass::DrillingRobot
            | DeviceClass::MillingRobot => &["joint1", "joint2", "joint3", "actuator"],
            DeviceClass::AirQuality => &[
                "temperature_sensor",
                "humidity_sensor",
                "pressure_sensor",
                "air_quality_sensor",
            ],
            DeviceClass::AirQualityModified => &["temperature_humidity_sensor", "air_quality_sensor"],
            DeviceClass::NoiseSensor => &["noise_sensor"],
            DeviceClass::SmokeSensor => &["smoke_sensor"],
            DeviceClass::SeismicSensor => &["seismic_sensor"],
            DeviceClass::RainSensor => &["rain_sensor"],
            DeviceClass::WindSensor => &["wind_sensor"],
            DeviceClass::IndoorsAlarm => &[
                "air_quality_alarm",
                "temperature_alarm",
                "humidity_alarm",
                "fire_alarm",
                "seismic_alarm",
            ],
            DeviceClass::OutdoorsAlarm => &[
                "air_quality_alarm",
                "temperature_alarm",
                "humidity_alarm",
                "rain_alarm",
                "wind_alarm",
            ],
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
