use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Deserialize;
use tokio::sync::broadcast;
use tokio::time;
use tracing;

use trundle_odometry::{Pose, WheelPair, mix_command};

use crate::blackboard::{Blackboard, raise_fault, touch_cmd};

/// Estimator outputs the steering loop consumes, published once per odometry
/// update.
#[derive(Debug, Clone, Copy)]
pub struct NavSignals {
    pub pose: Pose,
    /// Normalized heading error toward the goal, in [-1, 1]. Positive means
    /// rotate clockwise.
    pub heading_error: f64,
    pub distance_to_goal: f64,
    pub linear_velocity: f64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SteeringConfig {
    /// Proportional gain from distance to the normalized linear command.
    pub k_linear: f64,
    /// Proportional gain from heading error to the normalized turn command.
    pub k_heading: f64,
    /// Cap on the normalized linear command.
    pub max_linear: f64,
    /// Distance below which the goal counts as reached.
    pub stop_radius: f64,
    pub rate_hz: u64,
}

/// Fixed-rate steering task: turns the latest estimator signals into a
/// normalized per-wheel command. This is the closed-loop correction the
/// estimator core deliberately leaves to its caller.
pub async fn nav_task(
    bb: Blackboard,
    signals_rx: &mut broadcast::Receiver<Arc<NavSignals>>,
    command: Arc<RwLock<WheelPair<f64>>>,
    cfg: SteeringConfig,
) -> anyhow::Result<()> {
    tracing::info!("Navigation task started.");
    let mut ticker = time::interval(Duration::from_millis(1000 / cfg.rate_hz.max(1)));
    let mut latest: Option<Arc<NavSignals>> = None;
    let mut announced_arrival = false;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Some(signals) = latest.as_deref() else { continue };
                let cmd = compute_command(signals, &cfg);
                tracing::debug!(
                    left = cmd.left,
                    right = cmd.right,
                    distance = signals.distance_to_goal,
                    heading_error = signals.heading_error,
                    linear_velocity = signals.linear_velocity,
                    "steering command"
                );
                *command.write() = cmd;
                touch_cmd(&bb);
                bb.write().wheel_command = cmd;

                if signals.distance_to_goal < cfg.stop_radius {
                    if !announced_arrival {
                        tracing::info!(pose = %signals.pose, "goal reached, holding position");
                        announced_arrival = true;
                    }
                } else {
                    announced_arrival = false;
                }
            }
            result = signals_rx.recv() => {
                match result {
                    Ok(signals) => latest = Some(signals),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "navigation fell behind odometry");
                        raise_fault(&bb, "navigation fell behind odometry");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        anyhow::bail!("odometry signal channel closed");
                    }
                }
            }
        }
    }
}

/// Proportional steering from the estimator's normalized signals.
///
/// A positive heading error means the left wheel must speed up, which the
/// open-loop mixer expresses as a negative angular command. When the error
/// exceeds half scale (more than 90 degrees off) the vehicle turns in place
/// before driving forward.
pub fn compute_command(signals: &NavSignals, cfg: &SteeringConfig) -> WheelPair<f64> {
    if signals.distance_to_goal < cfg.stop_radius {
        return WheelPair::new(0.0, 0.0);
    }

    let angular = (-cfg.k_heading * signals.heading_error).clamp(-1.0, 1.0);
    let mut linear = (cfg.k_linear * signals.distance_to_goal).clamp(0.0, cfg.max_linear);
    if signals.heading_error.abs() > 0.5 {
        linear = 0.0;
    }

    mix_command(linear, angular)
}
