use log::{debug, info, warn};
use typed_builder::TypedBuilder;
use uom::si::{
    angle::degree,
    f32::{Angle, Length, Time},
    length::{inch, millimeter},
    time::millisecond,
};

use crate::{
    drive::{drive_vector, strafe_vector, Chassis, MotorMode, XChassis},
    geometry::{closest, normalize_angle_180, normalize_angle_90, Pose, Vector},
    odometry::{EncoderModel, Odometry},
    pid::PidController,
    settle::{ControlStatus, Exit, Settler},
    time::{Cancellation, Clock},
    utils::SideData,
};

/// Source of the heading error while turning or driving.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AngleTarget {
    None,
    /// Field heading.
    Absolute(Angle),
    /// Face a point.
    Point(Vector),
    /// Fixed error regardless of the pose.
    Constant(Angle),
}

impl AngleTarget {
    pub fn error(&self, state: &Pose) -> Angle {
        match *self {
            AngleTarget::None => Angle::default(),
            AngleTarget::Absolute(angle) => normalize_angle_180(angle - state.theta),
            AngleTarget::Point(point) => state.angle_to(&point),
            AngleTarget::Constant(angle) => angle,
        }
    }
}

/// How a turn command is applied to the chassis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Turner {
    PointTurn,
    LeftPivot,
    RightPivot,
}

impl Turner {
    pub fn apply<C: Chassis + ?Sized>(&self, chassis: &mut C, velocity: f32) {
        let command = match self {
            Turner::PointTurn => SideData {
                left: velocity,
                right: -velocity,
            },
            Turner::LeftPivot => SideData {
                left: (2.0 * velocity).clamp(-1.0, 1.0),
                right: 0.0,
            },
            Turner::RightPivot => SideData {
                left: 0.0,
                right: (-2.0 * velocity).clamp(-1.0, 1.0),
            },
        };
        chassis.drive(command, MotorMode::Voltage);
    }
}

/// PID motion primitives driven by odometry.
///
/// The controller owns its chassis handle and every primitive borrows it
/// mutably, so only one motion can drive the chassis at a time. Distance
/// loops run on millimeters and angle loops on degrees.
#[derive(TypedBuilder)]
pub struct OdomController<'a, C, M, K> {
    chassis: C,
    odometry: &'a Odometry<M>,
    clock: K,
    distance_pid: PidController,
    turn_pid: PidController,
    angle_pid: PidController,
    /// Inside this radius `drive_to_point` stops correcting its heading.
    #[builder(default = Length::new::<inch>(6.0))]
    drive_radius: Length,
    #[builder(default = Time::new::<millisecond>(10.0))]
    period: Time,
    #[builder(default, setter(strip_option))]
    cancellation: Option<&'a Cancellation>,
    #[builder(default, setter(skip))]
    distance_error: Length,
    #[builder(default, setter(skip))]
    angle_error: Angle,
}

impl<'a, C, M, K> OdomController<'a, C, M, K>
where
    C: Chassis,
    M: EncoderModel,
    K: Clock,
{
    pub fn state(&self) -> Pose {
        self.odometry.state()
    }

    pub fn distance_error(&self) -> Length {
        self.distance_error
    }

    pub fn angle_error(&self) -> Angle {
        self.angle_error
    }

    pub fn chassis(&mut self) -> &mut C {
        &mut self.chassis
    }

    pub fn reset_pid(&mut self) {
        self.distance_pid.reset();
        self.turn_pid.reset();
        self.angle_pid.reset();
        self.distance_error = Length::default();
        self.angle_error = Angle::default();
    }

    fn is_cancelled(&self) -> bool {
        self.cancellation.map_or(false, Cancellation::is_cancelled)
    }

    fn status(&self, state: Pose, start: Time) -> ControlStatus {
        ControlStatus {
            state,
            distance_error: self.distance_error,
            angle_error: self.angle_error,
            distance_settled: self.distance_pid.is_settled(),
            turn_settled: self.turn_pid.is_settled(),
            angle_settled: self.angle_pid.is_settled(),
            elapsed: self.clock.now() - start,
        }
    }

    // Runs `step` every period until the settler ends the motion, then stops
    // the chassis.
    fn run<F>(&mut self, mut settler: Settler, mut step: F) -> Exit
    where
        F: FnMut(&mut Self, &Pose),
    {
        let start = self.clock.now();
        let exit = loop {
            if self.is_cancelled() {
                break Exit::Cancelled;
            }
            let state = self.odometry.state();
            step(self, &state);
            let status = self.status(state, start);
            if let Some(exit) = settler.check(&status) {
                break exit;
            }
            self.clock.delay_until(self.period);
        };
        self.chassis.stop();

        match exit {
            Exit::Stalled => warn!("motion aborted, drive stalled"),
            Exit::Cancelled => info!("motion cancelled"),
            Exit::Settled | Exit::Excepted => debug!("motion finished: {:?}", exit),
        }
        exit
    }

    pub fn turn(&mut self, target: AngleTarget, turner: Turner, settler: Settler) -> Exit {
        // turns never update the distance error, so a stall detector would always fire
        let settler = settler.no_abort();
        self.reset_pid();
        debug!("turn toward {:?}", target);
        self.run(settler, |this, state| {
            this.angle_error = target.error(state);
            let velocity = this.turn_pid.step(this.angle_error.get::<degree>());
            turner.apply(&mut this.chassis, velocity);
        })
    }

    pub fn turn_to_angle(&mut self, angle: Angle, turner: Turner, settler: Settler) -> Exit {
        self.turn(AngleTarget::Absolute(angle), turner, settler)
    }

    /// Turns by `angle` relative to the current heading.
    pub fn turn_angle(&mut self, angle: Angle, turner: Turner, settler: Settler) -> Exit {
        let target = angle + self.state().theta;
        self.turn(AngleTarget::Absolute(target), turner, settler)
    }

    pub fn turn_to_point(&mut self, point: Vector, turner: Turner, settler: Settler) -> Exit {
        self.turn(AngleTarget::Point(point), turner, settler)
    }

    /// Drives `distance` measured by the side encoders while the angle loop
    /// corrects toward `angle`.
    pub fn move_distance_at_angle(
        &mut self,
        distance: Length,
        angle: AngleTarget,
        turn_scale: f32,
        settler: Settler,
    ) -> Exit {
        self.reset_pid();
        debug!("move {:?} at {:?}", distance, angle);
        let start = self.odometry.encoder_distance();
        self.run(settler, |this, state| {
            let travelled = this.odometry.encoder_distance() - start;
            this.distance_error = distance - travelled;
            this.angle_error = angle.error(state);
            let distance_velocity = this.distance_pid.step(this.distance_error.get::<millimeter>());
            let angle_velocity = this.angle_pid.step(this.angle_error.get::<degree>());
            this.chassis.drive(
                drive_vector(distance_velocity, angle_velocity * turn_scale),
                MotorMode::Voltage,
            );
        })
    }

    /// Drives `distance` holding the current heading.
    pub fn move_distance(&mut self, distance: Length, settler: Settler) -> Exit {
        let heading = self.state().theta;
        self.move_distance_at_angle(distance, AngleTarget::Absolute(heading), 1.0, settler)
    }

    /// Drives to `point`, reversing when it lies behind the robot.
    ///
    /// The distance loop runs on the target projected onto the heading ray.
    /// Inside the drive radius the heading correction is dropped and the
    /// projected distance alone finishes the motion.
    pub fn drive_to_point(&mut self, point: Vector, turn_scale: f32, settler: Settler) -> Exit {
        self.reset_pid();
        debug!("drive to {:?}", point);
        self.run(settler, |this, state| {
            let close_point = closest(state, &point);
            let angle_to_close = state.angle_to(&close_point);
            let mut distance_to_close = state.distance_to(&close_point);
            if angle_to_close.abs() >= Angle::new::<degree>(90.0) {
                distance_to_close = -distance_to_close;
            }

            let distance_to_target = state.distance_to(&point);
            let (angle_error, distance_error) = if distance_to_target < this.drive_radius {
                (Angle::default(), distance_to_close)
            } else {
                (state.angle_to(&point), distance_to_target)
            };
            this.angle_error = normalize_angle_90(angle_error);
            this.distance_error = distance_error;

            let angle_velocity = this.angle_pid.step(this.angle_error.get::<degree>());
            let distance_velocity = this.distance_pid.step(distance_to_close.get::<millimeter>());
            this.chassis.drive(
                drive_vector(distance_velocity, angle_velocity * turn_scale),
                MotorMode::Voltage,
            );
        })
    }

    /// Turns to face `point`, then drives the remaining distance toward it.
    pub fn drive_to_point2(&mut self, point: Vector, turn_scale: f32, settler: Settler) -> Exit {
        let exit = self.turn_to_point(point, Turner::PointTurn, Settler::turn());
        if exit == Exit::Cancelled {
            return exit;
        }
        let distance = self.state().distance_to(&point);
        self.move_distance_at_angle(distance, AngleTarget::Point(point), turn_scale, settler)
    }
}

impl<'a, C, M, K> OdomController<'a, C, M, K>
where
    C: XChassis,
    M: EncoderModel,
    K: Clock,
{
    /// Translates to `point` without turning toward it; the angle loop
    /// follows `angle` meanwhile.
    pub fn strafe_to_point(
        &mut self,
        point: Vector,
        angle: AngleTarget,
        turn_scale: f32,
        settler: Settler,
    ) -> Exit {
        self.reset_pid();
        debug!("strafe to {:?}", point);
        self.run(settler, |this, state| {
            this.distance_error = state.distance_to(&point);
            this.angle_error = angle.error(state);
            let direction = state.angle_to(&point);
            let distance_velocity = this.distance_pid.step(this.distance_error.get::<millimeter>());
            let angle_velocity = this.angle_pid.step(this.angle_error.get::<degree>());
            this.chassis.drive_x(
                strafe_vector(distance_velocity, angle_velocity * turn_scale, direction),
                MotorMode::Voltage,
            );
        })
    }

    /// Strafes `distance` along the field heading `direction`.
    pub fn strafe_absolute_direction(
        &mut self,
        distance: Length,
        direction: Angle,
        angle: AngleTarget,
        turn_scale: f32,
        settler: Settler,
    ) -> Exit {
        let target = self.state().point() + Vector::polar(distance, direction);
        self.strafe_to_point(target, angle, turn_scale, settler)
    }

    /// Strafes `distance` along `direction` relative to the current heading.
    pub fn strafe_relative_direction(
        &mut self,
        distance: Length,
        direction: Angle,
        angle: AngleTarget,
        turn_scale: f32,
        settler: Settler,
    ) -> Exit {
        let heading = self.state().theta;
        self.strafe_absolute_direction(distance, direction + heading, angle, turn_scale, settler)
    }
}
