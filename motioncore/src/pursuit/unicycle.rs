#[allow(unused_imports)]
use micromath::F32Ext;
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;
use uom::si::{
    angular_velocity::{radian_per_second, revolution_per_second},
    f32::AngularVelocity,
    length::meter,
};

use crate::{
    drive::{Chassis, MotorMode},
    geometry::{normalize_angle_180, Pose},
    odometry::{ChassisScales, EncoderModel, Odometry},
    utils::SideData,
};

/// Gains of the pose regulator. `kv` pulls the robot toward the reference
/// point, `ka` turns it toward the bearing and `h` weighs the final heading.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UnicycleGains {
    pub h: f32,
    pub kv: f32,
    pub ka: f32,
}

impl UnicycleGains {
    pub fn new(h: f32, kv: f32, ka: f32) -> Self {
        Self { h, kv, ka }
    }
}

// sin(x) cos(x) / x
fn sinc_cos(x: f32) -> f32 {
    if x.abs() < 1e-6 {
        1.0
    } else {
        x.sin() * x.cos() / x
    }
}

/// Side commands steering `state` onto `reference`, as fractions of
/// `gearset`.
///
/// Angles are compass angles, so the turn rate is clockwise positive. When
/// either part saturates the larger one is pinned at full scale and the
/// other shrinks with it.
pub fn unicycle_command(
    state: &Pose,
    reference: &Pose,
    gains: &UnicycleGains,
    scales: &ChassisScales,
    gearset: AngularVelocity,
) -> SideData<f32> {
    let target = reference.point();
    let rho = state.distance_to(&target).get::<meter>();
    if rho == 0.0 {
        return SideData::default();
    }
    let bearing = state.point().angle(&target);
    let alpha = state.angle_to(&target).value;
    let phi = normalize_angle_180(bearing - reference.theta).value;

    let v = gains.kv * rho * alpha.cos();
    let omega = gains.ka * alpha + gains.kv * sinc_cos(alpha) * (alpha + gains.h * phi);

    let diameter = scales.wheel_diameter.get::<meter>();
    let forward = v / (core::f32::consts::PI * diameter) / gearset.get::<revolution_per_second>();
    let turn = omega * scales.wheel_track.get::<meter>() / diameter / gearset.get::<radian_per_second>();

    let scale = forward.abs().max(turn.abs()).max(1.0);
    let (forward, turn) = if scale == 1.0 {
        (forward, turn)
    } else if forward.abs() >= turn.abs() {
        (forward.signum(), turn / scale)
    } else {
        (forward / scale, turn.signum())
    };
    SideData {
        left: (forward + turn).clamp(-1.0, 1.0),
        right: (forward - turn).clamp(-1.0, 1.0),
    }
}

/// Drives toward a reference pose one control cycle at a time. The caller
/// owns the loop and its timing.
#[derive(TypedBuilder)]
pub struct UnicycleFollower<'a, C, M> {
    chassis: C,
    odometry: &'a Odometry<M>,
    scales: ChassisScales,
    gearset: AngularVelocity,
    #[builder(default = MotorMode::Voltage)]
    mode: MotorMode,
}

impl<'a, C, M> UnicycleFollower<'a, C, M>
where
    C: Chassis,
    M: EncoderModel,
{
    /// Issues one command toward `reference` and returns it.
    pub fn seek(&mut self, reference: &Pose, gains: &UnicycleGains) -> SideData<f32> {
        let state = self.odometry.state();
        let command = unicycle_command(&state, reference, gains, &self.scales, self.gearset);
        self.chassis.drive(command, self.mode);
        command
    }

    pub fn stop(&mut self) {
        self.chassis.stop();
    }
}
