#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

//! A `no_std` library for differential-drive dead reckoning.
//!
//! This crate turns a stream of cumulative wheel-encoder tick counts and a
//! millisecond clock into a planar pose estimate `(x, y, heading)` together
//! with per-wheel and angular velocity estimates. It also derives the
//! normalized heading-error and distance-to-goal signals a motion controller
//! feeds into its own correction loop, and provides the open-loop mixer that
//! maps a normalized `(linear, angular)` command onto per-wheel commands.
//!
//! The estimator is intentionally pure kinematics: no sensor fusion, no slip
//! compensation, and no closed-loop control. Encoders, the clock, and an
//! optional diagnostic sink are injected through traits so the numerical core
//! can be exercised without hardware.

#[cfg(feature = "std")]
extern crate std;

use core::f64::consts::PI;
use core::fmt;
use libm::{atan2, cos, sin, sqrt};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub mod error;
pub use error::OdometryError;

/// Raw cumulative tick magnitude beyond which the counting basis is reset.
///
/// Chosen near the positive range of a 16-bit signed counter so that the
/// reset always happens long before a hardware counter could wrap. The reset
/// discards the current count basis but never the integrated pose.
pub const TICK_RESET_THRESHOLD: i64 = 32_000;

/// Identifies one side of the drive train.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// The left wheel.
    Left,
    /// The right wheel.
    Right,
}

/// A 2-D pose `(x, y, heading)` in consistent distance units and radians
/// (heading measured counter-clockwise from the x-axis in the world frame).
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose {
    /// World-frame x position.
    pub x: f64,
    /// World-frame y position.
    pub y: f64,
    /// Heading (rad), normalized to `(-PI, PI]`.
    pub heading: f64,
}

impl Pose {
    /// Construct a new pose.
    ///
    /// # Arguments
    ///
    /// * `x`: World-frame x position.
    /// * `y`: World-frame y position.
    /// * `heading`: Heading in radians.
    pub const fn new(x: f64, y: f64, heading: f64) -> Self {
        Pose { x, y, heading }
    }

    /// Normalize an angle to be within `(-PI, PI]`.
    ///
    /// Uses the two-argument arctangent of `(sin, cos)`, which wraps any
    /// angle in a single step without iteration, even values many multiples
    /// of `2 * PI` away.
    ///
    /// # Arguments
    ///
    /// * `angle`: The angle in radians to normalize.
    ///
    /// # Returns
    ///
    /// The normalized angle in radians.
    pub fn normalize_angle(angle: f64) -> f64 {
        atan2(sin(angle), cos(angle))
    }
}

impl fmt::Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(x: {:.3}, y: {:.3}, heading: {:.3} rad)",
            self.x, self.y, self.heading
        )
    }
}

/// A 2-D point in the world frame, used for goal positions.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    /// World-frame x position.
    pub x: f64,
    /// World-frame y position.
    pub y: f64,
}

impl Point {
    /// Construct a new point.
    pub const fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(x: {:.3}, y: {:.3})", self.x, self.y)
    }
}

/// A left/right pair of per-wheel values.
///
/// Replaces index-by-side arrays with named fields so a swapped index cannot
/// silently exchange the wheels.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WheelPair<T> {
    /// Value for the left wheel.
    pub left: T,
    /// Value for the right wheel.
    pub right: T,
}

impl<T> WheelPair<T> {
    /// Construct a pair from left and right values.
    pub const fn new(left: T, right: T) -> Self {
        WheelPair { left, right }
    }

    /// Apply a function to both sides, producing a new pair.
    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> WheelPair<U> {
        WheelPair {
            left: f(self.left),
            right: f(self.right),
        }
    }
}

impl<T: fmt::Display> fmt::Display for WheelPair<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(left: {}, right: {})", self.left, self.right)
    }
}

/// Physical calibration constants for one wheel.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelSpec {
    /// Wheel diameter, in the same distance units as the track width.
    pub diameter: f64,
    /// Encoder ticks per full wheel revolution.
    pub counts_per_revolution: f64,
    /// `false` when the encoder is wired so its count runs backwards.
    pub forward: bool,
}

impl WheelSpec {
    /// Construct a wheel calibration record.
    ///
    /// # Arguments
    ///
    /// * `diameter`: Wheel diameter.
    /// * `counts_per_revolution`: Encoder ticks per wheel revolution.
    /// * `forward`: Whether positive counts correspond to forward travel.
    pub const fn new(diameter: f64, counts_per_revolution: f64, forward: bool) -> Self {
        WheelSpec {
            diameter,
            counts_per_revolution,
            forward,
        }
    }
}

/// A cumulative wheel-rotation counter.
///
/// Counts are signed, grow in the wheel's forward direction (up to wiring
/// polarity, handled by [`WheelSpec::forward`]), and can be reset to zero.
pub trait Encoder {
    /// Current cumulative tick count.
    fn read(&self) -> i64;

    /// Reset the cumulative count to zero.
    fn reset(&mut self);
}

/// A monotonic millisecond clock.
pub trait Clock {
    /// Milliseconds since an arbitrary fixed origin; never decreases.
    fn now_ms(&self) -> u64;
}

/// Noteworthy estimator events, delivered to an injected [`DiagnosticSink`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DiagnosticEvent {
    /// Emitted once at construction with the derived calibration.
    Configured {
        /// Linear distance represented by one tick, per wheel.
        distance_per_count: WheelPair<f64>,
        /// Distance between the wheel contact patches.
        track_width: f64,
    },
    /// The tick-count basis was reset because a raw count approached the
    /// overflow threshold. The integrated pose is unaffected.
    CountersReset,
    /// A wheel velocity estimate came out exactly zero on a timed update.
    ZeroWheelVelocity(Side),
}

/// Receiver for [`DiagnosticEvent`]s.
///
/// The sink is informational only; estimator behavior is identical with
/// [`NullSink`].
pub trait DiagnosticSink {
    /// Deliver one event.
    fn note(&mut self, event: DiagnosticEvent);
}

/// A sink that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn note(&mut self, _event: DiagnosticEvent) {}
}

/// Map a normalized `(linear, angular)` command onto per-wheel commands.
///
/// Left = linear - angular, right = linear + angular, each clamped to
/// `[-1, 1]` independently. A positive angular command turns the vehicle
/// counter-clockwise (right wheel faster).
///
/// This is an open-loop differential mixer, not a controller: it applies no
/// feedback. Closed-loop correction belongs to the caller, driven by
/// [`Odometer::heading_error`].
///
/// # Arguments
///
/// * `linear`: Normalized forward velocity command, nominally in `[-1, 1]`.
/// * `angular`: Normalized turn-rate command, nominally in `[-1, 1]`.
///
/// # Returns
///
/// Normalized per-wheel velocity commands, each in `[-1, 1]`.
pub fn mix_command(linear: f64, angular: f64) -> WheelPair<f64> {
    let left = (linear - angular).clamp(-1.0, 1.0);
    let right = (linear + angular).clamp(-1.0, 1.0);
    WheelPair::new(left, right)
}

/// Midpoint (Euler) position update for one interval.
///
/// Averages the two wheel arc distances into a scalar forward displacement
/// and projects it onto the current heading. Accurate for the small per-call
/// displacements of a fast control loop; see [`exact_arc_deltas`] for the
/// closed-form alternative.
///
/// # Arguments
///
/// * `heading`: Heading at the start of the interval (rad).
/// * `d_left`: Arc distance covered by the left wheel.
/// * `d_right`: Arc distance covered by the right wheel.
///
/// # Returns
///
/// World-frame `(delta_x, delta_y)` displacement.
pub fn midpoint_deltas(heading: f64, d_left: f64, d_right: f64) -> (f64, f64) {
    let distance = 0.5 * (d_left + d_right);
    (distance * cos(heading), distance * sin(heading))
}

/// Closed-form position update assuming constant wheel speeds over the
/// interval (both wheels sweep arcs about a common instantaneous center of
/// rotation).
///
/// More accurate than [`midpoint_deltas`] for large per-interval heading
/// change, but numerically unstable as `d_right - d_left` approaches zero:
/// the turning radius diverges and the expression divides by the vanishing
/// difference. [`Odometer::update`] therefore uses the midpoint form; this
/// function is provided for callers integrating coarse intervals with
/// clearly unequal wheel distances.
///
/// # Arguments
///
/// * `heading`: Heading at the start of the interval (rad).
/// * `d_left`: Arc distance covered by the left wheel.
/// * `d_right`: Arc distance covered by the right wheel. Must differ from
///   `d_left`.
/// * `track_width`: Distance between the wheel contact patches.
///
/// # Returns
///
/// World-frame `(delta_x, delta_y)` displacement.
pub fn exact_arc_deltas(heading: f64, d_left: f64, d_right: f64, track_width: f64) -> (f64, f64) {
    let delta_heading = (d_right - d_left) / track_width;
    let radius = (track_width * (d_left + d_right)) / (2.0 * (d_right - d_left));
    let dx = radius * (sin(heading + delta_heading) - sin(heading));
    let dy = -radius * (cos(heading + delta_heading) - cos(heading));
    (dx, dy)
}

/// Dead-reckoning pose estimator for a two-wheeled differential drive.
///
/// Owns the encoder, clock, and diagnostic collaborators plus the calibration
/// constants and pose/velocity/goal state. Designed to be polled from a
/// single control loop: call [`Odometer::update`] once per fixed control
/// tick, then read the derived steering signals. Accuracy depends on the
/// loop running fast relative to vehicle speed, since each interval is
/// integrated with a small-displacement approximation.
pub struct Odometer<E, C, D = NullSink> {
    encoders: WheelPair<E>,
    clock: C,
    sink: D,

    // Calibration, fixed after construction.
    distance_per_count: WheelPair<f64>,
    encode_direction: WheelPair<i64>,
    track_width: f64,

    // Estimated state, mutated only by update/set_pose/reset_counters.
    pose: Pose,
    wheel_velocity: WheelPair<f64>,
    angular_velocity: f64,
    previous_ticks: WheelPair<i64>,
    previous_update_ms: u64,

    goal: Point,
}

impl<E: Encoder, C: Clock, D: DiagnosticSink> Odometer<E, C, D> {
    /// Construct an estimator from its collaborators and calibration.
    ///
    /// Derives each wheel's distance-per-count as
    /// `PI * diameter / counts_per_revolution`, zeroes pose, velocity, and
    /// goal state, then resets the encoder counters so the first update
    /// measures deltas from zero.
    ///
    /// # Arguments
    ///
    /// * `encoders`: Cumulative tick counters, one per wheel.
    /// * `specs`: Per-wheel diameter, encoder resolution, and wiring polarity.
    /// * `track_width`: Distance between the wheel contact patches, in the
    ///   same units as the wheel diameters.
    /// * `clock`: Monotonic millisecond clock.
    /// * `sink`: Diagnostic event receiver ([`NullSink`] to discard).
    ///
    /// # Errors
    ///
    /// Returns `Err(OdometryError::InvalidWheelDiameter)`,
    /// `Err(OdometryError::InvalidCountsPerRevolution)`, or
    /// `Err(OdometryError::InvalidTrackWidth)` when the corresponding
    /// constant is not positive.
    pub fn new(
        encoders: WheelPair<E>,
        specs: WheelPair<WheelSpec>,
        track_width: f64,
        clock: C,
        mut sink: D,
    ) -> Result<Self, OdometryError> {
        for spec in [&specs.left, &specs.right] {
            if spec.diameter <= 0.0 {
                return Err(OdometryError::InvalidWheelDiameter("must be positive"));
            }
            if spec.counts_per_revolution <= 0.0 {
                return Err(OdometryError::InvalidCountsPerRevolution("must be positive"));
            }
        }
        if track_width <= 0.0 {
            return Err(OdometryError::InvalidTrackWidth("must be positive"));
        }

        let distance_per_count =
            specs.map(|spec| (PI * spec.diameter) / spec.counts_per_revolution);
        let encode_direction = specs.map(|spec| if spec.forward { 1 } else { -1 });

        sink.note(DiagnosticEvent::Configured {
            distance_per_count,
            track_width,
        });

        let mut odometer = Odometer {
            encoders,
            clock,
            sink,
            distance_per_count,
            encode_direction,
            track_width,
            pose: Pose::default(),
            wheel_velocity: WheelPair::default(),
            angular_velocity: 0.0,
            previous_ticks: WheelPair::default(),
            previous_update_ms: 0,
            goal: Point::default(),
        };
        odometer.reset_counters();
        Ok(odometer)
    }

    /// Reset the tick-counting basis without touching the pose.
    ///
    /// Zeroes both encoders and the stored previous counts, and stamps the
    /// previous-update time from the clock, so the next [`Odometer::update`]
    /// measures deltas from zero. The estimator's own bookkeeping is cleared
    /// in lock-step with the hardware counters, so no delta ever straddles a
    /// reset undetected.
    pub fn reset_counters(&mut self) {
        self.encoders.left.reset();
        self.encoders.right.reset();
        self.previous_ticks = WheelPair::new(0, 0);
        self.previous_update_ms = self.clock.now_ms();
    }

    /// Overwrite the pose from an external, higher-confidence source.
    ///
    /// Resets the counters first so dead reckoning resumes cleanly from the
    /// supplied pose.
    pub fn set_pose(&mut self, x: f64, y: f64, heading: f64) {
        self.reset_counters();
        self.pose = Pose::new(x, y, heading);
    }

    /// Set the goal position. Any finite coordinates are accepted.
    pub fn set_goal(&mut self, x: f64, y: f64) {
        self.goal = Point::new(x, y);
    }

    /// Integrate one interval of encoder and clock readings into the pose.
    ///
    /// Intended to run once per fixed control tick. Reads both encoders and
    /// the clock, converts tick deltas into per-wheel arc distances, derives
    /// the heading change from their difference over the track width, and
    /// advances the position with the midpoint model (forward displacement
    /// projected onto the current heading). The heading is re-wrapped into
    /// `(-PI, PI]` on every call.
    ///
    /// A call with zero elapsed time is valid: displacement still integrates
    /// (it is zero only if the ticks are also zero) and the velocity fields
    /// keep their previous values rather than dividing by zero. Velocities
    /// are expressed per second.
    ///
    /// When a raw cumulative count's magnitude exceeds
    /// [`TICK_RESET_THRESHOLD`], the counting basis is reset immediately.
    /// This is a deliberately lossy guard against counter wrap-around: the
    /// interval in flight at the reset loses its count basis, while the
    /// integrated pose is preserved. At a sane control-loop rate the reset
    /// is rare relative to updates.
    pub fn update(&mut self) {
        let ticks = WheelPair::new(
            self.encoders.left.read() * self.encode_direction.left,
            self.encoders.right.read() * self.encode_direction.right,
        );
        let delta_ticks = WheelPair::new(
            ticks.left - self.previous_ticks.left,
            ticks.right - self.previous_ticks.right,
        );
        self.previous_ticks = ticks;

        let now_ms = self.clock.now_ms();
        let delta_ms = now_ms.saturating_sub(self.previous_update_ms);
        self.previous_update_ms = now_ms;

        let delta_distance = WheelPair::new(
            delta_ticks.left as f64 * self.distance_per_count.left,
            delta_ticks.right as f64 * self.distance_per_count.right,
        );

        let delta_heading = (delta_distance.right - delta_distance.left) / self.track_width;
        let (delta_x, delta_y) =
            midpoint_deltas(self.pose.heading, delta_distance.left, delta_distance.right);

        if delta_ms != 0 {
            let dt = delta_ms as f64;
            self.wheel_velocity = WheelPair::new(
                delta_distance.left * 1000.0 / dt,
                delta_distance.right * 1000.0 / dt,
            );
            self.angular_velocity = delta_heading * 1000.0 / dt;

            if self.wheel_velocity.left == 0.0 {
                self.sink.note(DiagnosticEvent::ZeroWheelVelocity(Side::Left));
            }
            if self.wheel_velocity.right == 0.0 {
                self.sink.note(DiagnosticEvent::ZeroWheelVelocity(Side::Right));
            }
        }

        self.pose.x += delta_x;
        self.pose.y += delta_y;
        self.pose.heading = Pose::normalize_angle(self.pose.heading + delta_heading);

        if self.previous_ticks.left.abs() > TICK_RESET_THRESHOLD
            || self.previous_ticks.right.abs() > TICK_RESET_THRESHOLD
        {
            self.sink.note(DiagnosticEvent::CountersReset);
            self.reset_counters();
        }
    }

    /// Current pose estimate.
    pub fn pose(&self) -> Pose {
        self.pose
    }

    /// Most recent per-wheel linear velocity estimates (distance per second).
    pub fn wheel_velocities(&self) -> WheelPair<f64> {
        self.wheel_velocity
    }

    /// Most recent heading-rate estimate (rad per second).
    pub fn angular_velocity(&self) -> f64 {
        self.angular_velocity
    }

    /// Velocity of the vehicle center: the mean of the wheel velocities.
    /// Negative when reversing.
    pub fn linear_velocity(&self) -> f64 {
        (self.wheel_velocity.left + self.wheel_velocity.right) / 2.0
    }

    /// Current goal position.
    pub fn goal(&self) -> Point {
        self.goal
    }

    /// Heading (rad) that points from the current position at the goal.
    ///
    /// When the goal coincides exactly with the current position this is the
    /// `atan2(0, 0)` convention, `0.0`; callers must treat a near-zero
    /// [`Odometer::distance_to_goal`] as the arrival condition rather than
    /// steering on this value.
    pub fn goal_heading(&self) -> f64 {
        atan2(self.goal.y - self.pose.y, self.goal.x - self.pose.x)
    }

    /// Normalized heading error against an arbitrary required heading.
    ///
    /// The wrapped difference `heading - required_heading` scaled by `1/PI`,
    /// always in `[-1, 1]`. Positive means the vehicle must rotate clockwise
    /// (speed up the left wheel) to correct. Suitable as the input to a
    /// caller-side correction loop.
    pub fn heading_error(&self, required_heading: f64) -> f64 {
        let diff = self.pose.heading - required_heading;
        atan2(sin(diff), cos(diff)) / PI
    }

    /// Normalized heading error against the heading to the goal point.
    ///
    /// Equivalent to `heading_error(goal_heading())`; the same degenerate
    /// case applies when the goal coincides with the current position.
    pub fn heading_error_to_goal(&self) -> f64 {
        self.heading_error(self.goal_heading())
    }

    /// Euclidean distance from the current position to the goal.
    pub fn distance_to_goal(&self) -> f64 {
        let dx = self.goal.x - self.pose.x;
        let dy = self.goal.y - self.pose.y;
        sqrt(dx * dx + dy * dy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;
    use std::vec::Vec;

    const EPSILON: f64 = 1e-9;

    #[derive(Clone)]
    struct MockEncoder {
        count: Rc<Cell<i64>>,
    }

    impl MockEncoder {
        fn new() -> (Self, Rc<Cell<i64>>) {
            let count = Rc::new(Cell::new(0));
            (
                MockEncoder {
                    count: Rc::clone(&count),
                },
                count,
            )
        }
    }

    impl Encoder for MockEncoder {
        fn read(&self) -> i64 {
            self.count.get()
        }

        fn reset(&mut self) {
            self.count.set(0);
        }
    }

    #[derive(Clone)]
    struct MockClock {
        ms: Rc<Cell<u64>>,
    }

    impl MockClock {
        fn new() -> (Self, Rc<Cell<u64>>) {
            let ms = Rc::new(Cell::new(0));
            (MockClock { ms: Rc::clone(&ms) }, ms)
        }
    }

    impl Clock for MockClock {
        fn now_ms(&self) -> u64 {
            self.ms.get()
        }
    }

    #[derive(Clone, Default)]
    struct RecordingSink {
        events: Rc<Cell<Vec<DiagnosticEvent>>>,
    }

    impl RecordingSink {
        fn take(&self) -> Vec<DiagnosticEvent> {
            self.events.take()
        }
    }

    impl DiagnosticSink for RecordingSink {
        fn note(&mut self, event: DiagnosticEvent) {
            let mut events = self.events.take();
            events.push(event);
            self.events.set(events);
        }
    }

    struct Rig {
        left: Rc<Cell<i64>>,
        right: Rc<Cell<i64>>,
        ms: Rc<Cell<u64>>,
    }

    // Calibration with distance_per_count of exactly 1.0 per wheel
    // (diameter = cpr / PI) and a track width of 10, so tick arithmetic maps
    // directly onto distances.
    fn unit_specs() -> WheelPair<WheelSpec> {
        let spec = WheelSpec::new(1000.0 / PI, 1000.0, true);
        WheelPair::new(spec, spec)
    }

    fn test_odometer() -> (Odometer<MockEncoder, MockClock, NullSink>, Rig) {
        test_odometer_with_specs(unit_specs())
    }

    fn test_odometer_with_specs(
        specs: WheelPair<WheelSpec>,
    ) -> (Odometer<MockEncoder, MockClock, NullSink>, Rig) {
        let (left_enc, left) = MockEncoder::new();
        let (right_enc, right) = MockEncoder::new();
        let (clock, ms) = MockClock::new();
        let odometer = Odometer::new(
            WheelPair::new(left_enc, right_enc),
            specs,
            10.0,
            clock,
            NullSink,
        )
        .unwrap();
        (odometer, Rig { left, right, ms })
    }

    impl Rig {
        fn advance(&self, left_ticks: i64, right_ticks: i64, ms: u64) {
            self.left.set(self.left.get() + left_ticks);
            self.right.set(self.right.get() + right_ticks);
            self.ms.set(self.ms.get() + ms);
        }
    }

    #[test]
    fn test_constructor_rejects_bad_diameter() {
        let (left_enc, _) = MockEncoder::new();
        let (right_enc, _) = MockEncoder::new();
        let (clock, _) = MockClock::new();
        let bad = WheelSpec::new(0.0, 1000.0, true);
        let result = Odometer::new(
            WheelPair::new(left_enc, right_enc),
            WheelPair::new(bad, unit_specs().right),
            10.0,
            clock,
            NullSink,
        );
        assert!(matches!(
            result,
            Err(OdometryError::InvalidWheelDiameter("must be positive"))
        ));
    }

    #[test]
    fn test_constructor_rejects_bad_counts_per_revolution() {
        let (left_enc, _) = MockEncoder::new();
        let (right_enc, _) = MockEncoder::new();
        let (clock, _) = MockClock::new();
        let bad = WheelSpec::new(0.1, -100.0, true);
        let result = Odometer::new(
            WheelPair::new(left_enc, right_enc),
            WheelPair::new(unit_specs().left, bad),
            10.0,
            clock,
            NullSink,
        );
        assert!(matches!(
            result,
            Err(OdometryError::InvalidCountsPerRevolution("must be positive"))
        ));
    }

    #[test]
    fn test_constructor_rejects_bad_track_width() {
        let (left_enc, _) = MockEncoder::new();
        let (right_enc, _) = MockEncoder::new();
        let (clock, _) = MockClock::new();
        let result = Odometer::new(
            WheelPair::new(left_enc, right_enc),
            unit_specs(),
            -1.0,
            clock,
            NullSink,
        );
        assert!(matches!(
            result,
            Err(OdometryError::InvalidTrackWidth("must be positive"))
        ));
    }

    #[test]
    fn test_straight_drive_advances_along_heading() {
        let (mut odometer, rig) = test_odometer();
        for _ in 0..5 {
            rig.advance(100, 100, 50);
            odometer.update();
        }
        let pose = odometer.pose();
        assert!((pose.x - 500.0).abs() < EPSILON);
        assert!((pose.y - 0.0).abs() < EPSILON);
        assert!((pose.heading - 0.0).abs() < EPSILON);
        // 100 distance units per 50 ms is 2000 per second.
        assert!((odometer.linear_velocity() - 2000.0).abs() < EPSILON);
    }

    #[test]
    fn test_straight_drive_respects_initial_heading() {
        let (mut odometer, rig) = test_odometer();
        odometer.set_pose(1.0, 2.0, PI / 2.0);
        rig.advance(100, 100, 100);
        odometer.update();
        let pose = odometer.pose();
        assert!((pose.x - 1.0).abs() < 1e-6);
        assert!((pose.y - 102.0).abs() < 1e-6);
        assert!((pose.heading - PI / 2.0).abs() < EPSILON);
    }

    #[test]
    fn test_in_place_rotation() {
        let (mut odometer, rig) = test_odometer();
        // Opposite deltas of 5 ticks over a track width of 10: one radian.
        rig.advance(-5, 5, 100);
        odometer.update();
        let pose = odometer.pose();
        assert!((pose.x - 0.0).abs() < EPSILON);
        assert!((pose.y - 0.0).abs() < EPSILON);
        assert!((pose.heading - 1.0).abs() < EPSILON);
        assert!((odometer.linear_velocity() - 0.0).abs() < EPSILON);
        // One radian per 100 ms is 10 rad/s.
        assert!((odometer.angular_velocity() - 10.0).abs() < EPSILON);
    }

    #[test]
    fn test_reversed_encoder_wiring_integrates_forward() {
        let spec_forward = WheelSpec::new(1000.0 / PI, 1000.0, true);
        let spec_reversed = WheelSpec::new(1000.0 / PI, 1000.0, false);
        let (mut odometer, rig) =
            test_odometer_with_specs(WheelPair::new(spec_reversed, spec_forward));
        // The reversed left encoder counts down while the wheel rolls forward.
        rig.advance(-100, 100, 100);
        odometer.update();
        let pose = odometer.pose();
        assert!((pose.x - 100.0).abs() < EPSILON);
        assert!((pose.heading - 0.0).abs() < EPSILON);
    }

    #[test]
    fn test_zero_elapsed_time_keeps_previous_velocities() {
        let (mut odometer, rig) = test_odometer();
        rig.advance(100, 100, 50);
        odometer.update();
        let velocity_before = odometer.wheel_velocities();
        let omega_before = odometer.angular_velocity();

        // More ticks, no elapsed time: displacement integrates, velocities hold.
        rig.advance(10, 20, 0);
        odometer.update();
        assert_eq!(odometer.wheel_velocities(), velocity_before);
        assert_eq!(odometer.angular_velocity(), omega_before);
        assert!((odometer.pose().x - 115.0).abs() < 1e-6);
    }

    #[test]
    fn test_heading_stays_wrapped_for_adversarial_deltas() {
        let (mut odometer, rig) = test_odometer();
        // Differential distance of 220 over a track width of 10: a heading
        // jump of 22 radians, several full turns in one interval.
        rig.advance(-110, 110, 100);
        odometer.update();
        let heading = odometer.pose().heading;
        assert!(heading > -PI && heading <= PI);
        assert!((heading - Pose::normalize_angle(22.0)).abs() < EPSILON);
    }

    #[test]
    fn test_mix_command_identities() {
        assert_eq!(mix_command(1.0, 0.0), WheelPair::new(1.0, 1.0));
        assert_eq!(mix_command(0.0, 1.0), WheelPair::new(-1.0, 1.0));
    }

    #[test]
    fn test_mix_command_clamps_per_side() {
        let pair = mix_command(0.5, 0.8);
        // Left stays in range at -0.3; right saturates at 1.0.
        assert!((pair.left - (-0.3)).abs() < EPSILON);
        assert!((pair.right - 1.0).abs() < EPSILON);

        let reverse = mix_command(-0.9, -0.4);
        assert!((reverse.left - (-0.5)).abs() < EPSILON);
        assert!((reverse.right - (-1.0)).abs() < EPSILON);
    }

    #[test]
    fn test_heading_error_against_self_is_zero() {
        let (mut odometer, _rig) = test_odometer();
        for heading in [0.0, 1.0, -2.5, PI, -PI + 0.1] {
            odometer.set_pose(0.0, 0.0, heading);
            assert!(odometer.heading_error(heading).abs() < EPSILON);
        }
    }

    #[test]
    fn test_heading_error_sign_convention() {
        let (mut odometer, _rig) = test_odometer();
        // Facing +x with the goal straight up: must turn counter-clockwise,
        // so the error is negative.
        odometer.set_goal(0.0, 10.0);
        assert!((odometer.heading_error_to_goal() - (-0.5)).abs() < EPSILON);

        // Facing +y with the goal along +x: rotate clockwise, positive error.
        odometer.set_pose(0.0, 0.0, PI / 2.0);
        odometer.set_goal(10.0, 0.0);
        assert!((odometer.heading_error_to_goal() - 0.5).abs() < EPSILON);

        odometer.set_goal(10.0, 10.0);
        assert!((odometer.heading_error_to_goal() - 0.25).abs() < EPSILON);
    }

    #[test]
    fn test_distance_to_goal() {
        let (mut odometer, _rig) = test_odometer();
        odometer.set_goal(3.0, 4.0);
        assert!((odometer.distance_to_goal() - 5.0).abs() < EPSILON);
    }

    #[test]
    fn test_goal_heading_degenerate_goal() {
        let (mut odometer, _rig) = test_odometer();
        odometer.set_pose(2.0, 3.0, 1.0);
        odometer.set_goal(2.0, 3.0);
        assert_eq!(odometer.goal_heading(), 0.0);
        assert!((odometer.distance_to_goal() - 0.0).abs() < EPSILON);
    }

    #[test]
    fn test_overflow_triggers_counter_reset_and_preserves_pose() {
        let (mut odometer, rig) = test_odometer();
        rig.advance(33_000, 33_000, 100);
        odometer.update();

        // Pose keeps the full integrated distance while the counting basis
        // drops back to zero, hardware counters included.
        assert!((odometer.pose().x - 33_000.0).abs() < EPSILON);
        assert_eq!(rig.left.get(), 0);
        assert_eq!(rig.right.get(), 0);

        // Dead reckoning continues seamlessly from the fresh basis.
        rig.advance(100, 100, 100);
        odometer.update();
        assert!((odometer.pose().x - 33_100.0).abs() < EPSILON);
    }

    #[test]
    fn test_overflow_reset_reported_to_sink() {
        let (left_enc, left) = MockEncoder::new();
        let (right_enc, right) = MockEncoder::new();
        let (clock, ms) = MockClock::new();
        let sink = RecordingSink::default();
        let mut odometer = Odometer::new(
            WheelPair::new(left_enc, right_enc),
            unit_specs(),
            10.0,
            clock,
            sink.clone(),
        )
        .unwrap();
        assert!(matches!(
            sink.take().as_slice(),
            [DiagnosticEvent::Configured { .. }]
        ));

        // Reverse travel past the threshold magnitude must also reset.
        left.set(-32_500);
        right.set(-32_500);
        ms.set(100);
        odometer.update();
        assert!(sink
            .take()
            .iter()
            .any(|event| *event == DiagnosticEvent::CountersReset));
        assert_eq!(left.get(), 0);
    }

    #[test]
    fn test_set_pose_resets_counters() {
        let (mut odometer, rig) = test_odometer();
        rig.advance(500, 500, 100);
        odometer.update();

        odometer.set_pose(5.0, 5.0, PI / 2.0);
        assert_eq!(rig.left.get(), 0);
        assert_eq!(rig.right.get(), 0);

        rig.advance(10, 10, 100);
        odometer.update();
        let pose = odometer.pose();
        assert!((pose.x - 5.0).abs() < 1e-6);
        assert!((pose.y - 15.0).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_angle() {
        assert!((Pose::normalize_angle(0.0) - 0.0).abs() < EPSILON);
        assert!((Pose::normalize_angle(2.5 * PI) - 0.5 * PI).abs() < 1e-9);
        assert!((Pose::normalize_angle(-2.5 * PI) - -0.5 * PI).abs() < 1e-9);
        assert!((Pose::normalize_angle(PI) - PI).abs() < 1e-9);
        for k in -6..=6 {
            let angle = 0.7 + (k as f64) * 2.0 * PI;
            assert!((Pose::normalize_angle(angle) - 0.7).abs() < 1e-9);
        }
    }

    #[test]
    fn test_exact_arc_quarter_circle() {
        // Unit turning radius, quarter turn, track width 1: the closed form
        // must land exactly on (1, 1) from the origin facing +x.
        let d_left = (PI / 2.0) * 0.5;
        let d_right = (PI / 2.0) * 1.5;
        let (dx, dy) = exact_arc_deltas(0.0, d_left, d_right, 1.0);
        assert!((dx - 1.0).abs() < EPSILON);
        assert!((dy - 1.0).abs() < EPSILON);
    }

    #[test]
    fn test_exact_arc_agrees_with_fine_midpoint_integration() {
        let track_width = 1.0;
        let d_left = 0.9;
        let d_right = 1.1;

        let (exact_dx, exact_dy) = exact_arc_deltas(0.0, d_left, d_right, track_width);

        // Integrate the same arc in 10,000 midpoint steps.
        let steps = 10_000;
        let mut x = 0.0;
        let mut y = 0.0;
        let mut heading = 0.0;
        for _ in 0..steps {
            let step_left = d_left / steps as f64;
            let step_right = d_right / steps as f64;
            let (dx, dy) = midpoint_deltas(heading, step_left, step_right);
            x += dx;
            y += dy;
            heading += (step_right - step_left) / track_width;
        }

        // The stepped reference is first-order, so its error dominates the
        // comparison; 1e-4 leaves an order of magnitude of headroom over the
        // ~1e-5 it converges to at this step count.
        assert!((exact_dx - x).abs() < 1e-4);
        assert!((exact_dy - y).abs() < 1e-4);
    }
}
