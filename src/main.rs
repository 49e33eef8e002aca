mod blackboard;
mod bus;
mod navigation;
mod sim;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use parking_lot::RwLock;
use serde::Deserialize;
use tokio::time;
use tracing::{debug, info};
use tracing_subscriber::{self, EnvFilter};

use trundle_odometry::{
    DiagnosticEvent, DiagnosticSink, Odometer, Point, WheelPair, WheelSpec,
};

use blackboard::{Blackboard, snapshot};
use bus::Topic;
use navigation::{NavSignals, SteeringConfig};
use sim::{PhysicsParams, SimClock, SimEncoder, spawn_physics};

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[derive(Debug, Clone, Copy, Deserialize)]
struct WheelConfig {
    diameter: f64,
    counts_per_revolution: f64,
    forward: bool,
}

impl WheelConfig {
    fn spec(&self) -> WheelSpec {
        WheelSpec::new(self.diameter, self.counts_per_revolution, self.forward)
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct WheelsConfig {
    left: WheelConfig,
    right: WheelConfig,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct ChassisConfig {
    track_width: f64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct GoalConfig {
    x: f64,
    y: f64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct SimConfig {
    max_wheel_speed: f64,
    rate_hz: u32,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct OdometryConfig {
    rate_hz: u64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct AppConfig {
    wheel: WheelsConfig,
    chassis: ChassisConfig,
    goal: GoalConfig,
    sim: SimConfig,
    odometry: OdometryConfig,
    steering: SteeringConfig,
}

fn load_config() -> anyhow::Result<AppConfig> {
    info!("Loading configuration from {}", DEFAULT_CONFIG_PATH);
    let settings = config::Config::builder()
        .add_source(config::File::new(
            DEFAULT_CONFIG_PATH,
            config::FileFormat::Toml,
        ))
        .build()
        .context("failed to read configuration")?;
    let cfg: AppConfig = settings
        .try_deserialize()
        .context("failed to parse configuration")?;
    validate_rates(&cfg)?;
    Ok(cfg)
}

/// Loop rates feed millisecond interval periods, so anything above 1 kHz
/// truncates to a zero period and anything at zero never ticks.
fn validate_rates(cfg: &AppConfig) -> anyhow::Result<()> {
    anyhow::ensure!(
        (1..=1000).contains(&cfg.odometry.rate_hz),
        "odometry.rate_hz must be between 1 and 1000, got {}",
        cfg.odometry.rate_hz
    );
    anyhow::ensure!(
        (1..=1000).contains(&cfg.steering.rate_hz),
        "steering.rate_hz must be between 1 and 1000, got {}",
        cfg.steering.rate_hz
    );
    anyhow::ensure!(
        (1..=10_000).contains(&cfg.sim.rate_hz),
        "sim.rate_hz must be between 1 and 10000, got {}",
        cfg.sim.rate_hz
    );
    Ok(())
}

/// Forwards estimator diagnostics to the tracing pipeline.
struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn note(&mut self, event: DiagnosticEvent) {
        match event {
            DiagnosticEvent::Configured {
                distance_per_count,
                track_width,
            } => info!(%distance_per_count, track_width, "odometer configured"),
            DiagnosticEvent::CountersReset => {
                info!("tick counters reset before overflow")
            }
            DiagnosticEvent::ZeroWheelVelocity(side) => {
                debug!(?side, "zero wheel velocity")
            }
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cfg = load_config()?;
    info!(?cfg, "configuration loaded");

    let left = SimEncoder::new();
    let right = SimEncoder::new();
    let command: Arc<RwLock<WheelPair<f64>>> = Arc::new(RwLock::new(WheelPair::new(0.0, 0.0)));

    let specs = WheelPair::new(cfg.wheel.left.spec(), cfg.wheel.right.spec());
    spawn_physics(
        Arc::clone(&command),
        WheelPair::new(left.handle(), right.handle()),
        PhysicsParams {
            distance_per_count: specs
                .map(|spec| std::f64::consts::PI * spec.diameter / spec.counts_per_revolution),
            direction: specs.map(|spec| if spec.forward { 1 } else { -1 }),
            max_wheel_speed: cfg.sim.max_wheel_speed,
            rate_hz: cfg.sim.rate_hz,
        },
    )
    .context("failed to spawn physics thread")?;

    let mut odometer = Odometer::new(
        WheelPair::new(left, right),
        specs,
        cfg.chassis.track_width,
        SimClock::new(),
        TracingSink,
    )
    .context("invalid odometry calibration")?;
    odometer.set_goal(cfg.goal.x, cfg.goal.y);

    let bb: Blackboard = Arc::default();
    bb.write().goal = Point::new(cfg.goal.x, cfg.goal.y);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async_runtime(odometer, bb, command, cfg))
}

async fn async_runtime(
    odometer: Odometer<SimEncoder, SimClock, TracingSink>,
    bb: Blackboard,
    command: Arc<RwLock<WheelPair<f64>>>,
    cfg: AppConfig,
) -> anyhow::Result<()> {
    let signals_topic: Topic<NavSignals> = Topic::new(16);
    let mut signals_rx = signals_topic.subscribe();

    tokio::try_join!(
        odometry_task(odometer, bb.clone(), signals_topic.clone(), cfg.odometry),
        navigation::nav_task(bb.clone(), &mut signals_rx, command, cfg.steering),
        status_task(bb),
    )?;
    Ok(())
}

/// Fixed-rate dead-reckoning loop: integrate the encoders, then publish the
/// derived steering signals for the navigation task.
async fn odometry_task(
    mut odometer: Odometer<SimEncoder, SimClock, TracingSink>,
    bb: Blackboard,
    signals_tx: Topic<NavSignals>,
    cfg: OdometryConfig,
) -> anyhow::Result<()> {
    info!("Odometry task started.");
    let mut ticker = time::interval(Duration::from_millis(1000 / cfg.rate_hz.max(1)));
    loop {
        ticker.tick().await;
        odometer.update();

        let signals = NavSignals {
            pose: odometer.pose(),
            heading_error: odometer.heading_error_to_goal(),
            distance_to_goal: odometer.distance_to_goal(),
            linear_velocity: odometer.linear_velocity(),
        };
        {
            let mut g = bb.write();
            g.pose = signals.pose;
            g.distance_to_goal = signals.distance_to_goal;
        }
        signals_tx.publish(signals);
    }
}

async fn status_task(bb: Blackboard) -> anyhow::Result<()> {
    let mut ticker = time::interval(Duration::from_secs(1));
    loop {
        ticker.tick().await;
        let s = snapshot(&bb);
        info!(
            pose = %s.pose,
            goal = %s.goal,
            distance = s.distance_to_goal,
            left_cmd = s.wheel_command.left,
            right_cmd = s.wheel_command.right,
            cmd_age_ms = s.last_cmd_ts.elapsed().as_millis() as u64,
            faults = s.faults.len(),
            "status"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> AppConfig {
        let wheel = WheelConfig {
            diameter: 0.07,
            counts_per_revolution: 1200.0,
            forward: true,
        };
        AppConfig {
            wheel: WheelsConfig {
                left: wheel,
                right: wheel,
            },
            chassis: ChassisConfig { track_width: 0.235 },
            goal: GoalConfig { x: 2.0, y: 1.5 },
            sim: SimConfig {
                max_wheel_speed: 0.4,
                rate_hz: 200,
            },
            odometry: OdometryConfig { rate_hz: 50 },
            steering: SteeringConfig {
                k_linear: 0.8,
                k_heading: 2.0,
                max_linear: 0.8,
                stop_radius: 0.05,
                rate_hz: 20,
            },
        }
    }

    #[test]
    fn test_rates_accept_control_loop_range() {
        assert!(validate_rates(&test_config()).is_ok());
    }

    #[test]
    fn test_rates_reject_sub_millisecond_periods() {
        let mut cfg = test_config();
        cfg.odometry.rate_hz = 2000;
        assert!(validate_rates(&cfg).is_err());

        let mut cfg = test_config();
        cfg.steering.rate_hz = 5000;
        assert!(validate_rates(&cfg).is_err());
    }

    #[test]
    fn test_rates_reject_zero() {
        let mut cfg = test_config();
        cfg.sim.rate_hz = 0;
        assert!(validate_rates(&cfg).is_err());

        let mut cfg = test_config();
        cfg.odometry.rate_hz = 0;
        assert!(validate_rates(&cfg).is_err());
    }
}
