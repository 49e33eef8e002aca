use std::cell::Cell;
use std::rc::Rc;

use trundle_odometry::*;

#[derive(Clone)]
struct SharedEncoder {
    count: Rc<Cell<i64>>,
}

impl SharedEncoder {
    fn new() -> (Self, Rc<Cell<i64>>) {
        let count = Rc::new(Cell::new(0));
        (
            SharedEncoder {
                count: Rc::clone(&count),
            },
            count,
        )
    }
}

impl Encoder for SharedEncoder {
    fn read(&self) -> i64 {
        self.count.get()
    }

    fn reset(&mut self) {
        self.count.set(0);
    }
}

#[derive(Clone)]
struct StepClock {
    ms: Rc<Cell<u64>>,
}

impl Clock for StepClock {
    fn now_ms(&self) -> u64 {
        self.ms.get()
    }
}

struct StdoutSink;

impl DiagnosticSink for StdoutSink {
    fn note(&mut self, event: DiagnosticEvent) {
        println!("[diagnostic] {:?}", event);
    }
}

fn main() {
    // A small robot: 7 cm wheels, 1200-tick encoders, 23.5 cm track (meters).
    let spec = WheelSpec::new(0.07, 1200.0, true);
    let specs = WheelPair::new(spec, spec);
    let track_width = 0.235;
    let distance_per_count = std::f64::consts::PI * spec.diameter / spec.counts_per_revolution;

    let (left_enc, left_ticks) = SharedEncoder::new();
    let (right_enc, right_ticks) = SharedEncoder::new();
    let ms = Rc::new(Cell::new(0u64));
    let clock = StepClock { ms: Rc::clone(&ms) };

    let odometer_result = Odometer::new(
        WheelPair::new(left_enc, right_enc),
        specs,
        track_width,
        clock,
        StdoutSink,
    );

    let mut odometer = match odometer_result {
        Ok(odometer) => odometer,
        Err(e) => {
            eprintln!("Failed to configure odometer: {}", e);
            return;
        }
    };

    odometer.set_goal(1.0, 0.6);
    println!("Driving toward goal {}", odometer.goal());

    let dt_ms = 20u64;
    let max_wheel_speed = 0.4; // m/s at a full-scale command
    let stop_radius = 0.02;

    for step in 0..2000 {
        // Steer with a proportional correction on the normalized heading
        // error; positive error means the left wheel must speed up, which the
        // mixer expresses as a negative angular command.
        let error = odometer.heading_error_to_goal();
        let distance = odometer.distance_to_goal();
        if distance < stop_radius {
            println!("Arrived after {} steps at {}", step, odometer.pose());
            return;
        }

        let linear = (4.0 * distance).clamp(0.0, 1.0) * (1.0 - error.abs());
        let angular = (-2.0 * error).clamp(-1.0, 1.0);
        let command = mix_command(linear, angular);

        // Perfect actuation: each wheel covers command * max speed * dt.
        let dt = dt_ms as f64 / 1000.0;
        let left_travel = command.left * max_wheel_speed * dt;
        let right_travel = command.right * max_wheel_speed * dt;
        left_ticks.set(left_ticks.get() + (left_travel / distance_per_count).round() as i64);
        right_ticks.set(right_ticks.get() + (right_travel / distance_per_count).round() as i64);
        ms.set(ms.get() + dt_ms);

        odometer.update();

        if step % 25 == 0 {
            println!(
                "step {:>4}: pose {} distance {:.3} heading error {:+.3}",
                step,
                odometer.pose(),
                distance,
                error
            );
        }
    }

    println!("Ran out of steps at {}", odometer.pose());
}
