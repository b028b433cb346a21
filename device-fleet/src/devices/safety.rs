use crate::ambient::AmbientZone;
use crate::device::{module, DeviceClass, DeviceModel, ModuleData};
use crate::sampling::{clamped_normal, coin, markov_bool};
use rand::rngs::StdRng;
use rand::Rng;
use serde_json::json;
use std::sync::Arc;

/// Deviation of an ambient-coupled reading around the zone value
pub const AMBIENT_SIGMA: f64 = 0.1;

/// `(module, [(property, zone variable)])`
type AmbientLayout = &'static [(&'static str, &'static [(&'static str, &'static str)])];

const AIR_QUALITY: AmbientLayout = &[
    ("temperature_sensor", &[("temperature", "temperature")]),
    ("humidity_sensor", &[("humidity", "humidity")]),
    ("pressure_sensor", &[("pressure", "pressure")]),
    (
        "air_quality_sensor",
        &[("pm1", "pm1"), ("pm25", "pm25"), ("pm10", "pm10")],
    ),
];

const AIR_QUALITY_MODIFIED: AmbientLayout = &[
    (
        "temperature_humidity_sensor",
        &[("temperature", "temperature"), ("humidity", "humidity")],
    ),
    ("air_quality_sensor", &[("pm25", "pm25"), ("pm10", "pm10")]),
];

const RAIN: AmbientLayout = &[("rain_sensor", &[("cumdepth", "rain_cumdepth")])];

const WIND: AmbientLayout = &[(
    "wind_sensor",
    &[("speed", "wind_speed"), ("direction", "wind_direction")],
)];

/// Sensor sampling its zone's current values.
///
/// Every reading is an independent `clamped_normal(zone value, 0.1)`, so
/// co-located sensors see correlated but not identical values.
pub struct AmbientSensor {
    class: DeviceClass,
    zone: Arc<AmbientZone>,
    modifier: f64,
    layout: AmbientLayout,
}

impl AmbientSensor {
    /// None for classes that do not read a zone
    pub fn new(class: DeviceClass, zone: Arc<AmbientZone>, modifier: f64) -> Option<Self> {
        let layout = match class {
            DeviceClass::AirQuality => AIR_QUALITY,
            DeviceClass::AirQualityModified => AIR_QUALITY_MODIFIED,
            DeviceClass::RainSensor => RAIN,
            DeviceClass::WindSensor => WIND,
            _ => return None,
        };
        Some(Self {
            class,
            zone,
            modifier,
            layout,
        })
    }

    pub fn zone(&self) -> &str {
        self.zone.name()
    }
}

impl DeviceModel for AmbientSensor {
    fn class(&self) -> DeviceClass {
        self.class
    }

    fn sample(&mut self, rng: &mut StdRng, _elapsed: f64) -> Vec<ModuleData> {
        self.layout
            .iter()
            .map(|(name, properties)| {
                let entries: Vec<_> = properties
                    .iter()
                    .map(|(property, var)| {
                        let mu = self.zone.get(var).unwrap_or(0.0);
                        (*property, json!(clamped_normal(rng, mu, AMBIENT_SIGMA, self.modifier)))
                    })
                    .collect();
                module(name, entries)
            })
            .collect()
    }
}

pub struct NoiseSensor {
    modifier: f64,
}

impl NoiseSensor {
    pub fn new(modifier: f64) -> Self {
        Self { modifier }
    }
}

impl DeviceModel for NoiseSensor {
    fn class(&self) -> DeviceClass {
        DeviceClass::NoiseSensor
    }

    fn sample(&mut self, rng: &mut StdRng, _elapsed: f64) -> Vec<ModuleData> {
        let noise = clamped_normal(rng, 70.0, 2.0, self.modifier);
        vec![module("noise_sensor", [("noise", json!(noise))])]
    }
}

pub struct SmokeSensor {
    smoke: bool,
}

impl SmokeSensor {
    pub const STAY_ON: f64 = 0.05;
    pub const IGNITION: f64 = 0.05;

    pub fn new() -> Self {
        Self { smoke: false }
    }
}

impl DeviceModel for SmokeSensor {
    fn class(&self) -> DeviceClass {
        DeviceClass::SmokeSensor
    }

    fn sample(&mut self, rng: &mut StdRng, _elapsed: f64) -> Vec<ModuleData> {
        self.smoke = markov_bool(rng, self.smoke, Self::STAY_ON, Self::IGNITION);
        vec![module("smoke_sensor", [("smoke", json!(self.smoke))])]
    }
}

pub struct SeismicSensor {
    intensity: i64,
}

impl SeismicSensor {
    pub fn new(rng: &mut StdRng) -> Self {
        Self {
            intensity: rng.gen_range(0..=1),
        }
    }
}

impl DeviceModel for SeismicSensor {
    fn class(&self) -> DeviceClass {
        DeviceClass::SeismicSensor
    }

    fn sample(&mut self, rng: &mut StdRng, _elapsed: f64) -> Vec<ModuleData> {
        self.intensity = if coin(rng, 0.95) {
            rng.gen_range(0..=1)
        } else {
            rng.gen_range(2..=8)
        };
        vec![module("seismic_sensor", [("intensity", json!(self.intensity))])]
    }
}

/// Alarm panel with five independent slots
pub struct AlarmPanel {
    class: DeviceClass,
}

impl AlarmPanel {
    pub const TRIGGER: f64 = 0.005;

    pub fn indoors() -> Self {
        Self {
            class: DeviceClass::IndoorsAlarm,
        }
    }

    pub fn outdoors() -> Self {
        Self {
            class: DeviceClass::OutdoorsAlarm,
        }
    }
}

impl DeviceModel for AlarmPanel {
    fn class(&self) -> DeviceClass {
        self.class
    }

    fn sample(&mut self, rng: &mut StdRng, _elapsed: f64) -> Vec<ModuleData> {
        self.class
            .modules()
            .iter()
            .map(|slot| module(slot, [("status", json!(coin(rng, Self::TRIGGER)))]))
            .collect()
    }
}
