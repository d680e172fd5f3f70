#![no_std]

use log::error;
#[allow(unused_imports)]
use micromath::F32Ext;
use motioncore::{
    drive::{Chassis, MotorMode, XChassis},
    odometry::{ChassisScales, EncoderModel, Odometry, SensorValues},
    time::Clock,
    utils::{SideData, XDriveData},
    Pose,
};
use spin::Mutex;
use typed_builder::TypedBuilder;
use uom::si::{
    angle::radian,
    f32::{Angle, Length, Time, Velocity},
    length::meter,
    ratio::ratio,
    time::{millisecond, second},
    velocity::meter_per_second,
};

/// Body frame motion in SI units: forward and rightward velocity and the
/// clockwise yaw rate.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Motion {
    forward: f32,
    strafe: f32,
    yaw: f32,
}

/// Kinematic drivetrain simulator.
///
/// Commands are fractions of `max_velocity` for each wheel. The body
/// velocity follows the command through a first order lag with
/// `time_constant`, and the tracking wheels described by `scales` are
/// integrated into tick counts.
#[derive(Debug, TypedBuilder)]
pub struct Simulator {
    scales: ChassisScales,
    max_velocity: Velocity,
    period: Time,
    #[builder(default)]
    pose: Pose,
    #[builder(default = Time::new::<millisecond>(20.0))]
    time_constant: Time,
    #[builder(default, setter(skip))]
    target: Motion,
    #[builder(default, setter(skip))]
    current: Motion,
    #[builder(default, setter(skip))]
    ticks: [f32; 3],
}

impl Simulator {
    pub fn period(&self) -> Time {
        self.period
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    pub fn set_pose(&mut self, pose: Pose) {
        self.pose = pose;
    }

    /// Current forward velocity of the tracking center.
    pub fn velocity(&self) -> Velocity {
        Velocity::new::<meter_per_second>(self.current.forward)
    }

    pub fn apply(&mut self, command: SideData<f32>) {
        let max = self.max_velocity.get::<meter_per_second>();
        let left = command.left.clamp(-1.0, 1.0) * max;
        let right = command.right.clamp(-1.0, 1.0) * max;
        self.target = Motion {
            forward: (left + right) / 2.0,
            strafe: 0.0,
            yaw: (left - right) / self.scales.wheel_track.get::<meter>(),
        };
    }

    pub fn apply_x(&mut self, command: XDriveData<f32>) {
        let max = self.max_velocity.get::<meter_per_second>();
        let wheels = command.map(|value| value.clamp(-1.0, 1.0) * max);
        let forward = (wheels.top_left + wheels.top_right + wheels.bottom_left + wheels.bottom_right) / 4.0;
        let strafe = (wheels.top_left - wheels.top_right - wheels.bottom_left + wheels.bottom_right) / 4.0;
        let yaw = (wheels.top_left - wheels.top_right + wheels.bottom_left - wheels.bottom_right) / 4.0;
        self.target = Motion {
            forward,
            strafe,
            yaw: 2.0 * yaw / self.scales.wheel_track.get::<meter>(),
        };
    }

    /// Advances the simulation by one period.
    pub fn step(&mut self) {
        let dt = self.period.get::<second>();
        let alpha = (self.time_constant / (self.time_constant + self.period)).get::<ratio>();
        let follow = |current: f32, target: f32| current * alpha + target * (1.0 - alpha);
        self.current = Motion {
            forward: follow(self.current.forward, self.target.forward),
            strafe: follow(self.current.strafe, self.target.strafe),
            yaw: follow(self.current.yaw, self.target.yaw),
        };

        let Motion {
            forward,
            strafe,
            yaw,
        } = self.current;
        let dtheta = yaw * dt;
        let (chord, strafe_chord, half) = if dtheta == 0.0 {
            (forward * dt, strafe * dt, 0.0)
        } else {
            let half = dtheta / 2.0;
            let scale = 2.0 * half.sin() / dtheta;
            (forward * dt * scale, strafe * dt * scale, half)
        };
        let heading = self.pose.theta.value + half;
        let (sin, cos) = (heading.sin(), heading.cos());
        self.pose.x += Length::new::<meter>(chord * sin + strafe_chord * cos);
        self.pose.y += Length::new::<meter>(chord * cos - strafe_chord * sin);
        self.pose.theta += Angle::new::<radian>(dtheta);

        let straight = self.scales.straight();
        let half_track = self.scales.wheel_track.get::<meter>() / 2.0;
        self.ticks[0] += (forward + yaw * half_track) * dt * straight;
        self.ticks[1] += (forward - yaw * half_track) * dt * straight;
        if let (Some(middle), Some(scale)) = (self.scales.middle, self.scales.middle_scale()) {
            self.ticks[2] += (strafe - yaw * middle.distance.get::<meter>()) * dt * scale;
        }
    }

    pub fn sensor_values(&self) -> SensorValues {
        let count = self.scales.expected_sensors();
        self.ticks
            .iter()
            .take(count)
            .map(|ticks| ticks.round() as i32)
            .collect()
    }

    pub fn reset_sensors(&mut self) {
        self.ticks = [0.0; 3];
    }
}

/// A simulator shared between the chassis, the encoders and the clock.
#[derive(Debug)]
pub struct Robot {
    sim: Mutex<Simulator>,
}

impl Robot {
    pub fn new(sim: Simulator) -> Self {
        Self {
            sim: Mutex::new(sim),
        }
    }

    pub fn step(&self) {
        self.sim.lock().step();
    }

    pub fn pose(&self) -> Pose {
        self.sim.lock().pose()
    }

    pub fn period(&self) -> Time {
        self.sim.lock().period()
    }

    pub fn velocity(&self) -> Velocity {
        self.sim.lock().velocity()
    }

    pub fn with<T>(&self, f: impl FnOnce(&mut Simulator) -> T) -> T {
        f(&mut self.sim.lock())
    }
}

impl EncoderModel for Robot {
    fn sensor_values(&self) -> SensorValues {
        self.sim.lock().sensor_values()
    }

    fn reset_sensors(&self) {
        self.sim.lock().reset_sensors();
    }
}

// every mode drives the same kinematic model
impl Chassis for &Robot {
    fn drive(&mut self, command: SideData<f32>, _mode: MotorMode) {
        self.sim.lock().apply(command);
    }
}

impl XChassis for &Robot {
    fn drive_x(&mut self, command: XDriveData<f32>, _mode: MotorMode) {
        self.sim.lock().apply_x(command);
    }
}

/// Clock that advances simulated time instead of sleeping. Each delay steps
/// the simulator and the odometry once per simulator period.
pub struct SimClock<'a, M> {
    robot: &'a Robot,
    odometry: &'a Odometry<M>,
    now: Time,
}

impl<'a, M: EncoderModel> SimClock<'a, M> {
    pub fn new(robot: &'a Robot, odometry: &'a Odometry<M>) -> Self {
        Self {
            robot,
            odometry,
            now: Time::default(),
        }
    }
}

impl<M: EncoderModel> Clock for SimClock<'_, M> {
    fn now(&self) -> Time {
        self.now
    }

    fn delay_until(&mut self, period: Time) {
        let steps = (period / self.robot.period()).get::<ratio>().round().max(1.0) as usize;
        for _ in 0..steps {
            self.robot.step();
            if let Err(err) = self.odometry.step() {
                error!("simulated odometry failed: {}", err);
            }
        }
        self.now += period;
    }
}
