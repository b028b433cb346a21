//! Device models for every emulated class, and the factory that builds them
//! from a `[[devices]]` entry.

mod production;
mod safety;

pub use production::{
    CameraScanner, ConveyorBelt, FaultNotifier, PieceDetector, PoseDetector, ProductionControl,
    RepairControl, RobotArm, TagScanner, CAR_PARTS, CAR_UNDERPANS,
};
pub use safety::{AlarmPanel, AmbientSensor, NoiseSensor, SeismicSensor, SmokeSensor, AMBIENT_SIGMA};

use crate::ambient::AmbientZone;
use crate::config::{ConfigError, DeviceSpec};
use crate::device::{DeviceClass, DeviceModel};
use crate::sampling::SineParams;
use rand::rngs::StdRng;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Task presets, `task -> role -> parameters`
pub type Tasks = BTreeMap<String, BTreeMap<String, Vec<f64>>>;

/// Build the model described by `spec`.
///
/// Zone, task and focus references are checked here so a bad entry fails
/// before any simulator starts.
pub fn build_device(
    spec: &DeviceSpec,
    zones: &HashMap<String, Arc<AmbientZone>>,
    tasks: &Tasks,
    rng: &mut StdRng,
) -> Result<Box<dyn DeviceModel>, ConfigError> {
    let class = DeviceClass::from_name(&spec.class)
        .ok_or_else(|| ConfigError::UnknownClass(spec.class.clone()))?;
    let m = spec.modifier;

    let model: Box<dyn DeviceModel> = match class {
        DeviceClass::ConveyorBelt => {
            let speed = task_params(spec, tasks, 2)?.map(|p| (p[0], p[1]));
            Box::new(ConveyorBelt::new(rng, m, speed))
        }
        DeviceClass::TagScanner => Box::new(TagScanner::new(rng)),
        DeviceClass::ProductionControl => Box::new(ProductionControl::new()),
        DeviceClass::RepairControl => Box::new(RepairControl::new()),
        DeviceClass::ConfigurationScanner => Box::new(CameraScanner::configuration()),
        DeviceClass::QualityScanner => Box::new(CameraScanner::quality()),
        DeviceClass::FaultNotifier => {
            let focus = parse_focus(spec, &["configuration", "quality"])?;
            Box::new(FaultNotifier::new(focus))
        }
        DeviceClass::PoseDetector => Box::new(PoseDetector::new(rng, m)),
        DeviceClass::PieceDetector => {
            let focus = parse_focus(spec, &["parts", "underpans"])?;
            Box::new(PieceDetector::new(rng, m, focus))
        }
        DeviceClass::PickUpRobot
        | DeviceClass::ClampingRobot
        | DeviceClass::DrillingRobot
        | DeviceClass::MillingRobot => {
            let params = task_params(spec, tasks, 4)?.map(|p| SineParams::new(p[0], p[1], p[2], p[3]));
            Box::new(RobotArm::new(class, params))
        }
        DeviceClass::AirQuality
        | DeviceClass::AirQualityModified
        | DeviceClass::RainSensor
        | DeviceClass::WindSensor => {
            let zone = resolve_zone(spec, class, zones)?;
            match AmbientSensor::new(class, zone, m) {
                Some(sensor) => Box::new(sensor),
                None => return Err(ConfigError::UnknownClass(spec.class.clone())),
            }
        }
        DeviceClass::NoiseSensor => Box::new(NoiseSensor::new(m)),
        DeviceClass::SmokeSensor => Box::new(SmokeSensor::new()),
        DeviceClass::SeismicSensor => Box::new(SeismicSensor::new(rng)),
        DeviceClass::IndoorsAlarm => Box::new(AlarmPanel::indoors()),
        DeviceClass::OutdoorsAlarm => Box::new(AlarmPanel::outdoors()),
    };

    Ok(model)
}

/// Zone of an ambient-coupled device, checked for every variable the class reads
fn resolve_zone(
    spec: &DeviceSpec,
    class: DeviceClass,
    zones: &HashMap<String, Arc<AmbientZone>>,
) -> Result<Arc<AmbientZone>, ConfigError> {
    let name = spec
        .zone
        .as_deref()
        .ok_or_else(|| ConfigError::MissingZone(spec.class.clone()))?;
    let zone = zones
        .get(name)
        .ok_or_else(|| ConfigError::UnknownZone(name.to_string()))?;

    if let Some(missing) = class.zone_variables().iter().find(|v| !zone.contains(v)) {
        return Err(ConfigError::MissingZoneVariable {
            zone: name.to_string(),
            variable: missing.to_string(),
        });
    }
    Ok(zone.clone())
}

/// Task preset for `spec.task` / `spec.role`; None when the device names no task
fn task_params<'a>(
    spec: &DeviceSpec,
    tasks: &'a Tasks,
    expected: usize,
) -> Result<Option<&'a [f64]>, ConfigError> {
    let Some(task) = spec.task.as_deref() else {
        return Ok(None);
    };
    // A task without a role falls back to the class defaults
    let Some(role) = spec.role.as_deref() else {
        return Ok(None);
    };

    let roles = tasks
        .get(task)
        .ok_or_else(|| ConfigError::UnknownTask(task.to_string()))?;
    let params = roles.get(role).ok_or_else(|| ConfigError::UnknownRole {
        task: task.to_string(),
        role: role.to_string(),
    })?;

    if params.len() != expected {
        return Err(ConfigError::InvalidParams {
            task: task.to_string(),
            role: role.to_string(),
            expected,
        });
    }
    Ok(Some(params))
}

/// Index of `spec.focus` within `choices`; unset means the first choice
fn parse_focus(spec: &DeviceSpec, choices: &[&str]) -> Result<i64, ConfigError> {
    match spec.focus.as_deref() {
        None => Ok(0),
        Some(focus) => choices
            .iter()
            .position(|c| *c == focus)
            .map(|i| i as i64)
            .ok_or_else(|| ConfigError::InvalidFocus {
                class: spec.class.clone(),
                focus: focus.to_string(),
            }),
    }
}
