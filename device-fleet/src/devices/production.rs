use crate::device::{module, DeviceClass, DeviceModel, ModuleData};
use crate::sampling::{clamped_normal, coin, drift, markov_bool, SineParams};
use rand::rngs::StdRng;
use rand::Rng;
use serde_json::{json, Value};
use std::f64::consts::PI;

pub const CAR_PARTS: [&str; 5] = ["door", "window", "wheel", "seat", "mirror"];
pub const CAR_UNDERPANS: [&str; 5] = ["S60", "S80", "V60", "XC60", "XC70"];

const POSE_PROPERTIES: [&str; 6] = [
    "x_position",
    "y_position",
    "z_position",
    "roll_orientation",
    "pitch_orientation",
    "yaw_orientation",
];

fn pose_entries(pose: &[f64; 6]) -> impl Iterator<Item = (&'static str, Value)> + '_ {
    POSE_PROPERTIES.iter().zip(pose.iter()).map(|(k, v)| (*k, json!(v)))
}

pub struct ConveyorBelt {
    status: bool,
    linear_speed: f64,
    rotational_speed: f64,
    weight: f64,
}

impl ConveyorBelt {
    /// `speed` overrides the `(mean, sigma)` of the linear speed
    pub fn new(rng: &mut StdRng, modifier: f64, speed: Option<(f64, f64)>) -> Self {
        let (mean, sigma) = speed.unwrap_or((3.5, 0.5));
        Self {
            status: true,
            linear_speed: clamped_normal(rng, mean, sigma, modifier),
            rotational_speed: clamped_normal(rng, 24.0, 0.5, modifier),
            weight: clamped_normal(rng, 10.0, 0.5, modifier),
        }
    }
}

impl DeviceModel for ConveyorBelt {
    fn class(&self) -> DeviceClass {
        DeviceClass::ConveyorBelt
    }

    fn sample(&mut self, rng: &mut StdRng, _elapsed: f64) -> Vec<ModuleData> {
        self.status = markov_bool(rng, self.status, 0.95, 0.6);
        self.linear_speed = drift(rng, self.linear_speed);
        self.rotational_speed = drift(rng, self.rotational_speed);
        self.weight = drift(rng, self.weight);

        // A stopped belt reports zero speed but keeps its internal state
        let running = if self.status { 1.0 } else { 0.0 };
        vec![module(
            "conveyor_belt",
            [
                ("status", json!(self.status)),
                ("linear_speed", json!(self.linear_speed * running)),
                ("rotational_speed", json!(self.rotational_speed * running)),
                ("weight", json!(self.weight)),
            ],
        )]
    }
}

pub struct TagScanner {
    product_id: i64,
    process_id: i64,
}

impl TagScanner {
    pub fn new(rng: &mut StdRng) -> Self {
        Self {
            product_id: rng.gen_range(0..10),
            process_id: rng.gen_range(0..10),
        }
    }
}

impl DeviceModel for TagScanner {
    fn class(&self) -> DeviceClass {
        DeviceClass::TagScanner
    }

    fn sample(&mut self, rng: &mut StdRng, _elapsed: f64) -> Vec<ModuleData> {
        if !coin(rng, 0.7) {
            self.product_id = rng.gen_range(0..10);
        }
        if !coin(rng, 0.7) {
            self.process_id = rng.gen_range(0..10);
        }
        vec![module(
            "rfid_scanner",
            [
                ("product_id", json!(self.product_id)),
                ("process_id", json!(self.process_id)),
            ],
        )]
    }
}

pub struct ProductionControl {
    production_status: bool,
}

impl ProductionControl {
    pub fn new() -> Self {
        Self {
            production_status: true,
        }
    }
}

impl DeviceModel for ProductionControl {
    fn class(&self) -> DeviceClass {
        DeviceClass::ProductionControl
    }

    fn sample(&mut self, rng: &mut StdRng, _elapsed: f64) -> Vec<ModuleData> {
        self.production_status = markov_bool(rng, self.production_status, 0.95, 0.6);
        vec![module(
            "production_control",
            [("production_status", json!(self.production_status))],
        )]
    }
}

/// Repair state: starts at 2, then toggles between 0 and 1
pub struct RepairControl {
    repair_status: i64,
}

impl RepairControl {
    pub fn new() -> Self {
        Self { repair_status: 2 }
    }
}

impl DeviceModel for RepairControl {
    fn class(&self) -> DeviceClass {
        DeviceClass::RepairControl
    }

    fn sample(&mut self, rng: &mut StdRng, _elapsed: f64) -> Vec<ModuleData> {
        if !coin(rng, 0.8) {
            self.repair_status = (self.repair_status + 1) % 2;
        }
        vec![module(
            "repair_control",
            [("repair_status", json!(self.repair_status))],
        )]
    }
}

/// Six-camera scanner reporting one pass/fail flag per camera
pub struct CameraScanner {
    class: DeviceClass,
    property: &'static str,
}

impl CameraScanner {
    pub fn configuration() -> Self {
        Self {
            class: DeviceClass::ConfigurationScanner,
            property: "config_status",
        }
    }

    pub fn quality() -> Self {
        Self {
            class: DeviceClass::QualityScanner,
            property: "quality_status",
        }
    }
}

impl DeviceModel for CameraScanner {
    fn class(&self) -> DeviceClass {
        self.class
    }

    fn sample(&mut self, rng: &mut StdRng, _elapsed: f64) -> Vec<ModuleData> {
        self.class
            .modules()
            .iter()
            .map(|cam| module(cam, [(self.property, json!(coin(rng, 0.975)))]))
            .collect()
    }
}

pub struct FaultNotifier {
    focus: i64,
    alarm: bool,
}

impl FaultNotifier {
    /// `focus` 0 watches configuration, 1 watches quality
    pub fn new(focus: i64) -> Self {
        Self {
            focus,
            alarm: false,
        }
    }
}

impl DeviceModel for FaultNotifier {
    fn class(&self) -> DeviceClass {
        DeviceClass::FaultNotifier
    }

    fn sample(&mut self, rng: &mut StdRng, _elapsed: f64) -> Vec<ModuleData> {
        self.alarm = markov_bool(rng, self.alarm, 0.6, 0.05);
        vec![module(
            "fault_notifier",
            [("focus", json!(self.focus)), ("alarm", json!(self.alarm))],
        )]
    }
}

pub struct PoseDetector {
    pose: [f64; 6],
}

impl PoseDetector {
    pub fn new(rng: &mut StdRng, modifier: f64) -> Self {
        let mut pose = [0.0; 6];
        for (i, value) in pose.iter_mut().enumerate() {
            let sigma = if i < 3 { 2.0 } else { 10.0 };
            *value = clamped_normal(rng, 0.0, sigma, modifier);
        }
        Self { pose }
    }
}

impl DeviceModel for PoseDetector {
    fn class(&self) -> DeviceClass {
        DeviceClass::PoseDetector
    }

    fn sample(&mut self, rng: &mut StdRng, _elapsed: f64) -> Vec<ModuleData> {
        for value in self.pose.iter_mut() {
            *value = drift(rng, *value);
        }
        vec![module("pose_detection_cam", pose_entries(&self.pose))]
    }
}

pub struct PieceDetector {
    focus: i64,
    pieces: &'static [&'static str],
    piece_id: i64,
    pose: [f64; 6],
}

impl PieceDetector {
    /// `focus` 0 detects car parts, 1 detects underpans
    pub fn new(rng: &mut StdRng, modifier: f64, focus: i64) -> Self {
        let pieces: &'static [&'static str] = if focus == 0 { &CAR_PARTS } else { &CAR_UNDERPANS };
        let mut pose = [0.0; 6];
        for (i, value) in pose.iter_mut().enumerate() {
            *value = if i < 3 {
                clamped_normal(rng, 0.5, 2.0, modifier)
            } else {
                clamped_normal(rng, 0.0, 5.0, modifier)
            };
        }
        Self {
            focus,
            pieces,
            piece_id: rng.gen_range(0..pieces.len() as i64),
            pose,
        }
    }

    pub fn piece(&self) -> &'static str {
        self.pieces[self.piece_id as usize]
    }
}

impl DeviceModel for PieceDetector {
    fn class(&self) -> DeviceClass {
        DeviceClass::PieceDetector
    }

    fn sample(&mut self, rng: &mut StdRng, _elapsed: f64) -> Vec<ModuleData> {
        for value in self.pose.iter_mut() {
            *value = drift(rng, *value);
        }
        if !coin(rng, 0.7) {
            self.piece_id = rng.gen_range(0..self.pieces.len() as i64);
        }

        let mut entries = vec![("focus", json!(self.focus)), ("piece_id", json!(self.piece_id))];
        entries.extend(pose_entries(&self.pose));
        vec![module("piece_detection_cam", entries)]
    }
}

/// Robotic arm with three joints and an actuator following task sinusoids
pub struct RobotArm {
    class: DeviceClass,
    params: SineParams,
    /// `(on_if_off, on_if_on)` of the actuator
    actuator_rates: (f64, f64),
    actuator_status: bool,
}

/// Per-joint coefficient of the pitch/yaw phase offset, in quarter turns
const JOINT_PHASE: [f64; 4] = [6.0, 3.0, 2.0, 1.0];

impl RobotArm {
    pub fn new(class: DeviceClass, params: Option<SineParams>) -> Self {
        let (default_params, actuator_rates) = match class {
            DeviceClass::ClampingRobot => (SineParams::new(0.0, 3.0, 20.0, PI), (0.15, 0.5)),
            DeviceClass::DrillingRobot => (SineParams::new(0.0, 2.0, 20.0, PI / 2.0), (0.25, 0.3)),
            DeviceClass::MillingRobot => (SineParams::new(0.0, 0.5, 70.0, 0.0), (0.1, 0.6)),
            _ => (SineParams::new(0.0, 1.0, 20.0, 0.0), (0.2, 0.4)),
        };
        Self {
            class,
            params: params.unwrap_or(default_params),
            actuator_rates,
            actuator_status: false,
        }
    }

    pub fn params(&self) -> SineParams {
        self.params
    }

    fn joint(&self, rng: &mut StdRng, k: usize, t: f64) -> [f64; 6] {
        let p = self.params;
        let kf = k as f64;
        let quarter = JOINT_PHASE[k - 1] * PI / 4.0;
        let wave = |offset: f64, amplitude: f64, period: f64| SineParams::new(offset, amplitude, period, p.phase);
        [
            wave(p.offset, p.amplitude, p.period).sample(rng, t),
            wave(p.offset + kf, p.amplitude * 2.0, p.period / 2.0).sample(rng, t),
            wave(p.offset - kf, p.amplitude / 2.0, p.period * 2.0).sample(rng, t),
            wave(p.offset + PI / 2.0, p.amplitude, p.period).sample(rng, t),
            wave(p.offset + quarter, p.amplitude * 2.0, p.period / 2.0).sample(rng, t),
            wave(p.offset - quarter, p.amplitude / 2.0, p.period * 2.0).sample(rng, t),
        ]
    }
}

impl DeviceModel for RobotArm {
    fn class(&self) -> DeviceClass {
        self.class
    }

    fn sample(&mut self, rng: &mut StdRng, elapsed: f64) -> Vec<ModuleData> {
        let (on_if_off, on_if_on) = self.actuator_rates;
        self.actuator_status = markov_bool(rng, self.actuator_status, on_if_on, on_if_off);

        let mut modules = Vec::with_capacity(4);
        for (i, name) in self.class.modules().iter().enumerate() {
            let pose = self.joint(rng, i + 1, elapsed);
            let mut entries: Vec<_> = pose_entries(&pose).collect();
            if *name == "actuator" {
                entries.push(("actuator_status", json!(self.actuator_status)));
            }
            modules.push(module(name, entries));
        }
        modules
    }
}
