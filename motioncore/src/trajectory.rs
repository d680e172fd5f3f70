pub mod profile;

use core::{
    f32::consts::{FRAC_PI_4, SQRT_2},
    ops::ControlFlow,
};

use heapless::Vec;
use log::{debug, info};
#[allow(unused_imports)]
use micromath::F32Ext;
use typed_builder::TypedBuilder;
use uom::si::{
    angular_velocity::{radian_per_second, revolution_per_second},
    f32::{AngularVelocity, Length, Time, Velocity},
    length::meter,
    time::{millisecond, second},
    velocity::meter_per_second,
};

use self::profile::{Kinematics, PiecewiseTrapezoidal, ProfileFlags, TrajectoryLimits};
use crate::{
    drive::{Chassis, MotorMode, XChassis},
    error::PathError,
    geometry::{Curvature, Pose},
    odometry::ChassisScales,
    path::spline::Spline,
    pursuit::wheel_speed,
    settle::Exit,
    time::{Cancellation, Clock},
    utils::{SideData, XDriveData},
};

const MAX_STEPS: usize = 100_000;

/// One timeslice of a generated trajectory.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Step {
    pub pose: Pose,
    pub kinematics: Kinematics,
    pub omega: AngularVelocity,
    pub curvature: Curvature,
    /// Profile velocity before the drive limits were applied.
    pub profiled_vel: Velocity,
    /// Wheel commands as fractions of the gearset. X-drive steps carry the
    /// top left and top right wheels; the diagonal partners match them.
    pub wheels: SideData<f32>,
}

type StepSink<'s> = &'s mut dyn FnMut(&Step) -> ControlFlow<()>;

/// Walks `spline` at the velocities of a piecewise trapezoidal profile, one
/// `dt` at a time.
///
/// `modifier` sees the spline parameter of every slice together with the
/// profiled kinematics and may lower the velocity. Returning `Break` ends
/// the walk. A profile ending at rest gets a last call at `t = 1`.
pub fn generate<S, F>(
    spline: &S,
    limits: &TrajectoryLimits,
    dt: Time,
    flags: &ProfileFlags,
    markers: &[(f32, f32)],
    mut modifier: F,
) -> Result<PiecewiseTrapezoidal, PathError>
where
    S: Spline + ?Sized,
    F: FnMut(f32, &mut Kinematics) -> ControlFlow<()>,
{
    if !(dt.value.is_finite() && dt.value > 0.0) {
        return Err(PathError::InvalidStep);
    }
    let length = spline.length();
    let profile = PiecewiseTrapezoidal::new(limits, length, flags, markers)?;

    let mut t = 0.0;
    let mut distance = Length::default();
    let mut k = profile.begin();
    if k.v.value <= 0.0 {
        k = profile.at_time(dt);
    }
    let mut steps = 0;
    while distance <= length && t <= 1.0 && steps < MAX_STEPS {
        if modifier(t, &mut k).is_break() {
            return Ok(profile);
        }
        if !(k.v.value > 0.0) {
            break;
        }
        let travelled: Length = k.v * dt;
        distance += travelled;
        t = spline.advance(t, travelled);
        k = profile.at_distance(distance);
        if k.v.value <= 0.0 && distance < length {
            // stopped at a marker, move on from the next slice
            k = profile.at_time(k.t + dt);
        }
        steps += 1;
    }

    let mut end = profile.end();
    if end.v.value == 0.0 {
        let _ = modifier(1.0, &mut end);
    }
    Ok(profile)
}

fn min(a: Velocity, b: Velocity) -> Velocity {
    if b < a {
        b
    } else {
        a
    }
}

// wheel velocity as a fraction of the gearset
fn to_wheel(velocity: Velocity, scales: &ChassisScales, gearset: AngularVelocity) -> f32 {
    wheel_speed(velocity, scales.wheel_diameter).get::<revolution_per_second>()
        / gearset.get::<revolution_per_second>()
}

fn collect<const N: usize>(
    walk: impl FnOnce(StepSink) -> Result<PiecewiseTrapezoidal, PathError>,
) -> Result<(PiecewiseTrapezoidal, Vec<Step, N>), PathError> {
    let mut steps = Vec::new();
    let mut overflow = false;
    let profile = walk(&mut |step: &Step| {
        if steps.push(*step).is_err() {
            overflow = true;
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    })?;
    if overflow {
        return Err(PathError::CapacityExceeded(N));
    }
    Ok((profile, steps))
}

// hands every step to `drive` and waits `dt` after it
fn run<K: Clock>(
    clock: &mut K,
    dt: Time,
    cancellation: Option<&Cancellation>,
    walk: impl FnOnce(StepSink) -> Result<PiecewiseTrapezoidal, PathError>,
    mut drive: impl FnMut(&Step),
) -> Result<Exit, PathError> {
    let mut exit = Exit::Settled;
    let profile = walk(&mut |step: &Step| {
        if cancellation.map_or(false, Cancellation::is_cancelled) {
            exit = Exit::Cancelled;
            return ControlFlow::Break(());
        }
        debug!(
            "t {:.3} s velocity {:.3} m/s wheels {:.3} {:.3}",
            step.kinematics.t.get::<second>(),
            step.kinematics.v.get::<meter_per_second>(),
            step.wheels.left,
            step.wheels.right
        );
        drive(step);
        clock.delay_until(dt);
        ControlFlow::Continue(())
    })?;
    match exit {
        Exit::Cancelled => info!("trajectory cancelled"),
        _ => info!("trajectory of {:.3} s finished", profile.time().get::<second>()),
    }
    Ok(exit)
}

#[derive(Clone, Copy, Debug)]
struct SkidDrive {
    scales: ChassisScales,
    gearset: AngularVelocity,
    limits: TrajectoryLimits,
    dt: Time,
    x_drive: bool,
}

impl SkidDrive {
    fn walk<S: Spline + ?Sized>(
        &self,
        spline: &S,
        backwards: bool,
        flags: &ProfileFlags,
        markers: &[(f32, f32)],
        on_step: StepSink,
    ) -> Result<PiecewiseTrapezoidal, PathError> {
        let mut limits = self.limits;
        if self.x_drive {
            limits.max_vel *= SQRT_2;
        }
        let half_track = self.scales.wheel_track.get::<meter>() / 2.0;
        generate(spline, &limits, self.dt, flags, markers, |t, k| {
            let profiled_vel = k.v;
            let curvature = spline.curvature(t);
            // the curvature reached by the end of the slice bounds it too
            let upcoming = spline.curvature(spline.advance(t, k.v * self.dt).min(1.0));
            k.v = min(
                min(k.v, limits.max_vel_at_curvature(curvature)),
                limits.max_vel_at_curvature(upcoming),
            );
            let omega = AngularVelocity::new::<radian_per_second>(curvature.value * k.v.value);

            let vel = if self.x_drive { k.v / SQRT_2 } else { k.v };
            let turn = Velocity::new::<meter_per_second>(omega.value * half_track);
            let left = to_wheel(vel + turn, &self.scales, self.gearset);
            let right = to_wheel(vel - turn, &self.scales, self.gearset);
            let wheels = if backwards {
                SideData {
                    left: -right,
                    right: -left,
                }
            } else {
                SideData { left, right }
            };
            on_step(&Step {
                pose: spline.sample(t),
                kinematics: *k,
                omega,
                curvature,
                profiled_vel,
                wheels,
            })
        })
    }
}

/// Open loop trajectory follower for a differential drive.
///
/// An X drive can be driven like one by setting `x_drive`. Its wheels cover
/// `1/√2` of their speed along the heading, so the velocity limit is raised
/// and the wheel speeds are scaled down by that factor.
#[derive(TypedBuilder)]
pub struct SkidSteerGenerator<'a, C, K> {
    chassis: C,
    clock: K,
    scales: ChassisScales,
    gearset: AngularVelocity,
    limits: TrajectoryLimits,
    #[builder(default = Time::new::<millisecond>(10.0))]
    dt: Time,
    #[builder(default)]
    x_drive: bool,
    #[builder(default = MotorMode::Velocity)]
    mode: MotorMode,
    #[builder(default, setter(strip_option))]
    cancellation: Option<&'a Cancellation>,
}

impl<'a, C, K> SkidSteerGenerator<'a, C, K>
where
    C: Chassis,
    K: Clock,
{
    fn drive(&self) -> SkidDrive {
        SkidDrive {
            scales: self.scales,
            gearset: self.gearset,
            limits: self.limits,
            dt: self.dt,
            x_drive: self.x_drive,
        }
    }

    /// Steps of the trajectory along `spline`, without driving.
    pub fn plan<S: Spline + ?Sized, const N: usize>(
        &self,
        spline: &S,
        backwards: bool,
        flags: &ProfileFlags,
        markers: &[(f32, f32)],
    ) -> Result<(PiecewiseTrapezoidal, Vec<Step, N>), PathError> {
        let drive = self.drive();
        collect(|sink| drive.walk(spline, backwards, flags, markers, sink))
    }

    /// Drives the trajectory along `spline`, one step every `dt`. With
    /// `backwards` the robot reverses along it.
    pub fn follow<S: Spline + ?Sized>(
        &mut self,
        spline: &S,
        backwards: bool,
        flags: &ProfileFlags,
        markers: &[(f32, f32)],
    ) -> Result<Exit, PathError> {
        info!("following trajectory{}", if backwards { " backwards" } else { "" });
        let drive = self.drive();
        let mode = self.mode;
        let chassis = &mut self.chassis;
        let exit = run(
            &mut self.clock,
            self.dt,
            self.cancellation,
            |sink| drive.walk(spline, backwards, flags, markers, sink),
            |step| chassis.drive(step.wheels, mode),
        );
        self.chassis.stop();
        exit
    }
}

#[derive(Clone, Copy, Debug)]
struct HolonomicDrive {
    scales: ChassisScales,
    gearset: AngularVelocity,
    limits: TrajectoryLimits,
    dt: Time,
}

impl HolonomicDrive {
    fn walk<S: Spline + ?Sized>(
        &self,
        spline: &S,
        flags: &ProfileFlags,
        markers: &[(f32, f32)],
        on_step: StepSink,
    ) -> Result<PiecewiseTrapezoidal, PathError> {
        let limits = self.limits;
        generate(spline, &limits, self.dt, flags, markers, |t, k| {
            let profiled_vel = k.v;
            let pose = spline.sample(t);
            let theta = pose.theta.value;
            // diagonal travel splits the speed over both wheel pairs
            k.v = min(k.v, limits.max_vel / (theta.sin().abs() + theta.cos().abs()));
            let top_left = k.v * (theta + FRAC_PI_4).sin();
            let top_right = k.v * (theta + FRAC_PI_4).cos();
            on_step(&Step {
                pose,
                kinematics: *k,
                omega: AngularVelocity::default(),
                curvature: spline.curvature(t),
                profiled_vel,
                wheels: SideData {
                    left: to_wheel(top_left, &self.scales, self.gearset),
                    right: to_wheel(top_right, &self.scales, self.gearset),
                },
            })
        })
    }
}

/// Open loop trajectory follower that strafes an X drive along the spline
/// while keeping its heading.
#[derive(TypedBuilder)]
pub struct XGenerator<'a, C, K> {
    chassis: C,
    clock: K,
    scales: ChassisScales,
    gearset: AngularVelocity,
    limits: TrajectoryLimits,
    #[builder(default = Time::new::<millisecond>(10.0))]
    dt: Time,
    #[builder(default = MotorMode::Velocity)]
    mode: MotorMode,
    #[builder(default, setter(strip_option))]
    cancellation: Option<&'a Cancellation>,
}

impl<'a, C, K> XGenerator<'a, C, K>
where
    C: XChassis,
    K: Clock,
{
    fn drive(&self) -> HolonomicDrive {
        HolonomicDrive {
            scales: self.scales,
            gearset: self.gearset,
            limits: self.limits,
            dt: self.dt,
        }
    }

    pub fn plan<S: Spline + ?Sized, const N: usize>(
        &self,
        spline: &S,
        flags: &ProfileFlags,
        markers: &[(f32, f32)],
    ) -> Result<(PiecewiseTrapezoidal, Vec<Step, N>), PathError> {
        let drive = self.drive();
        collect(|sink| drive.walk(spline, flags, markers, sink))
    }

    pub fn follow<S: Spline + ?Sized>(
        &mut self,
        spline: &S,
        flags: &ProfileFlags,
        markers: &[(f32, f32)],
    ) -> Result<Exit, PathError> {
        info!("strafing along trajectory");
        let drive = self.drive();
        let mode = self.mode;
        let chassis = &mut self.chassis;
        let exit = run(
            &mut self.clock,
            self.dt,
            self.cancellation,
            |sink| drive.walk(spline, flags, markers, sink),
            |step| {
                let SideData { left, right } = step.wheels;
                let command = XDriveData {
                    top_left: left,
                    top_right: right,
                    bottom_left: right,
                    bottom_right: left,
                };
                chassis.drive_x(command, mode)
            },
        );
        self.chassis.stop();
        exit
    }
}
