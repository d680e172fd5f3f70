#[allow(unused_imports)]
use micromath::F32Ext;
use serde::{Deserialize, Serialize};
use uom::si::f32::Angle;

use crate::utils::{SideData, XDriveData};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotorMode {
    Voltage,
    Velocity,
}

/// Differential drive actuators. Commands are normalized to `[-1, 1]` of
/// the motor's voltage or free speed.
pub trait Chassis {
    fn drive(&mut self, command: SideData<f32>, mode: MotorMode);

    fn stop(&mut self) {
        self.drive(SideData::default(), MotorMode::Voltage);
    }
}

/// Four independently driven wheels at 45 degrees.
pub trait XChassis: Chassis {
    fn drive_x(&mut self, command: XDriveData<f32>, mode: MotorMode);
}

impl<T: Chassis + ?Sized> Chassis for &mut T {
    fn drive(&mut self, command: SideData<f32>, mode: MotorMode) {
        (**self).drive(command, mode)
    }

    fn stop(&mut self) {
        (**self).stop()
    }
}

impl<T: XChassis + ?Sized> XChassis for &mut T {
    fn drive_x(&mut self, command: XDriveData<f32>, mode: MotorMode) {
        (**self).drive_x(command, mode)
    }
}

/// Mixes a forward and a yaw command into side commands.
///
/// Forward is clamped to `[-1, 1]`; when a side would saturate both sides are
/// scaled by the same factor so the turn ratio is kept.
pub fn drive_vector(forward: f32, yaw: f32) -> SideData<f32> {
    let forward = forward.clamp(-1.0, 1.0);
    let left = forward + yaw;
    let right = forward - yaw;
    let max = left.abs().max(right.abs());
    if max > 1.0 {
        SideData {
            left: left / max,
            right: right / max,
        }
    } else {
        SideData { left, right }
    }
}

/// Mixes a translation toward the robot-relative `direction` and a yaw
/// command into X-drive wheel commands.
pub fn strafe_vector(speed: f32, yaw: f32, direction: Angle) -> XDriveData<f32> {
    let speed = speed.clamp(-1.0, 1.0);
    let forward = speed * direction.value.cos();
    let strafe = speed * direction.value.sin();
    let wheels = XDriveData {
        top_left: forward + strafe + yaw,
        top_right: forward - strafe - yaw,
        bottom_left: forward - strafe + yaw,
        bottom_right: forward + strafe - yaw,
    };
    let max = wheels
        .top_left
        .abs()
        .max(wheels.top_right.abs())
        .max(wheels.bottom_left.abs())
        .max(wheels.bottom_right.abs());
    if max > 1.0 {
        wheels.map(|value| value / max)
    } else {
        wheels
    }
}
