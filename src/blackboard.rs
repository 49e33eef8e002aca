use parking_lot::RwLock;
use std::{sync::Arc, time::Instant};

use trundle_odometry::{Point, Pose, WheelPair};

/// Latest shared view of the robot, written by the odometry and navigation
/// tasks and read by anyone who wants a snapshot.
#[derive(Clone)]
pub struct State {
    pub pose: Pose,
    pub wheel_command: WheelPair<f64>,
    pub goal: Point,
    pub distance_to_goal: f64,
    pub last_cmd_ts: Instant,
    pub faults: Vec<String>,
}

impl Default for State {
    fn default() -> Self {
        State {
            pose: Pose::default(),
            wheel_command: WheelPair::default(),
            goal: Point::default(),
            distance_to_goal: 0.0,
            last_cmd_ts: Instant::now(),
            faults: Vec::new(),
        }
    }
}

pub type Blackboard = Arc<RwLock<State>>;

pub fn snapshot(bb: &Blackboard) -> State {
    (*bb.read()).clone()
}

pub fn touch_cmd(bb: &Blackboard) {
    bb.write().last_cmd_ts = Instant::now();
}

pub fn raise_fault(bb: &Blackboard, msg: &str) {
    let mut g = bb.write();
    if !g.faults.iter().any(|s| s == msg) {
        g.faults.push(msg.to_string());
    }
}
