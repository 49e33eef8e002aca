//! Simulated hardware collaborators: wheel encoders fed by a physics thread
//! and a wall-clock millisecond source.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use spin_sleep::SpinSleeper;
use tracing::info;

use trundle_odometry::{Clock, Encoder, WheelPair};

/// A cumulative tick counter shared between the physics thread (writer) and
/// the odometry loop (reader/reset).
#[derive(Clone)]
pub struct SimEncoder {
    ticks: Arc<AtomicI64>,
}

impl SimEncoder {
    pub fn new() -> Self {
        SimEncoder {
            ticks: Arc::new(AtomicI64::new(0)),
        }
    }

    /// Handle for the physics thread to accrue ticks through.
    pub fn handle(&self) -> Arc<AtomicI64> {
        Arc::clone(&self.ticks)
    }
}

impl Encoder for SimEncoder {
    fn read(&self) -> i64 {
        self.ticks.load(Ordering::Relaxed)
    }

    fn reset(&mut self) {
        self.ticks.store(0, Ordering::Relaxed);
    }
}

/// Monotonic milliseconds since construction.
pub struct SimClock {
    start: Instant,
}

impl SimClock {
    pub fn new() -> Self {
        SimClock {
            start: Instant::now(),
        }
    }
}

impl Clock for SimClock {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PhysicsParams {
    /// Linear distance one tick represents, per wheel.
    pub distance_per_count: WheelPair<f64>,
    /// Count direction per wheel: -1 models reversed encoder wiring.
    pub direction: WheelPair<i64>,
    /// Wheel surface speed at a full-scale command (distance units per second).
    pub max_wheel_speed: f64,
    pub rate_hz: u32,
}

/// Spawn the thread that plays the role of the physical drivetrain: it reads
/// the latest normalized wheel command and accrues encoder ticks at a fixed
/// rate, carrying the sub-tick remainder between steps so slow commands still
/// accumulate travel.
///
/// Ticks are accrued with `fetch_add`, so an encoder reset from the odometry
/// loop composes with a concurrent physics step the same way a hardware
/// counter reset would: at most the in-flight step's ticks are lost.
pub fn spawn_physics(
    command: Arc<RwLock<WheelPair<f64>>>,
    ticks: WheelPair<Arc<AtomicI64>>,
    params: PhysicsParams,
) -> std::io::Result<std::thread::JoinHandle<()>> {
    std::thread::Builder::new()
        .name("physics".into())
        .spawn(move || {
            info!("Physics thread started.");
            let sleeper = SpinSleeper::new(100_000);
            let period = Duration::from_secs_f64(1.0 / params.rate_hz as f64);
            let dt = period.as_secs_f64();
            let mut carry = WheelPair::new(0.0, 0.0);

            loop {
                let cmd = *command.read();

                carry.left += cmd.left * params.max_wheel_speed * dt;
                carry.right += cmd.right * params.max_wheel_speed * dt;

                let whole_left = (carry.left / params.distance_per_count.left).trunc();
                let whole_right = (carry.right / params.distance_per_count.right).trunc();
                carry.left -= whole_left * params.distance_per_count.left;
                carry.right -= whole_right * params.distance_per_count.right;

                ticks
                    .left
                    .fetch_add(whole_left as i64 * params.direction.left, Ordering::Relaxed);
                ticks.right.fetch_add(
                    whole_right as i64 * params.direction.right,
                    Ordering::Relaxed,
                );

                sleeper.sleep(period);
            }
        })
}
