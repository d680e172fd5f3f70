use serde::{Deserialize, Serialize};
use uom::si::{
    angular_velocity::radian_per_second,
    f32::{Acceleration, AngularVelocity, Length, Time, Velocity},
    length::meter,
    velocity::meter_per_second,
};

use crate::{error::PathError, geometry::Curvature};

/// Kinematic limits of a path traversal.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PursuitLimits {
    pub min_vel: Velocity,
    pub accel: Acceleration,
    pub max_vel: Velocity,
    pub decel: Acceleration,
    pub final_vel: Velocity,
    /// Turn constant. Velocity through a curve is capped at `k / |curvature|`.
    pub k: Option<Velocity>,
}

impl PursuitLimits {
    /// Symmetric limits that end the path at `min_vel`.
    pub fn new(min_vel: Velocity, accel: Acceleration, max_vel: Velocity, k: Option<Velocity>) -> Self {
        Self::with_decel(min_vel, accel, max_vel, accel, min_vel, k)
    }

    pub fn with_decel(
        min_vel: Velocity,
        accel: Acceleration,
        max_vel: Velocity,
        decel: Acceleration,
        final_vel: Velocity,
        k: Option<Velocity>,
    ) -> Self {
        Self {
            min_vel,
            accel,
            max_vel,
            decel,
            final_vel,
            k,
        }
    }

    /// Limits given as the time to ramp from `min_vel` up to `max_vel` and
    /// from `max_vel` down to `final_vel`.
    pub fn from_times(
        min_vel: Velocity,
        accel_time: Time,
        max_vel: Velocity,
        decel_time: Time,
        final_vel: Velocity,
        k: Option<Velocity>,
    ) -> Self {
        let accel: Acceleration = (max_vel - min_vel) / accel_time;
        let decel: Acceleration = (max_vel - final_vel) / decel_time;
        Self::with_decel(min_vel, accel, max_vel, decel, final_vel, k)
    }

    /// Like [`PursuitLimits::from_times`] with `max_vel` set to the free
    /// speed of the drive.
    pub fn from_top_speed(
        min_vel: Velocity,
        accel_time: Time,
        wheel_diameter: Length,
        gearset: AngularVelocity,
        decel_time: Time,
        final_vel: Velocity,
        k: Option<Velocity>,
    ) -> Self {
        let max_vel = top_speed(wheel_diameter, gearset);
        Self::from_times(min_vel, accel_time, max_vel, decel_time, final_vel, k)
    }

    pub fn validate(&self) -> Result<(), PathError> {
        let positive = |value: f32| value.is_finite() && value > 0.0;
        if positive(self.accel.value) && positive(self.decel.value) {
            Ok(())
        } else {
            Err(PathError::InvalidLimits)
        }
    }

    /// Fastest velocity allowed through a point of the given curvature.
    pub fn cornering_velocity(&self, curvature: Curvature) -> Velocity {
        let curvature = curvature.value.abs();
        match self.k {
            Some(k) if curvature > 0.0 => {
                let limit = Velocity::new::<meter_per_second>(k.value / curvature);
                if limit < self.max_vel {
                    limit
                } else {
                    self.max_vel
                }
            }
            _ => self.max_vel,
        }
    }
}

/// Linear free speed of a wheel spun at `gearset`.
pub fn top_speed(wheel_diameter: Length, gearset: AngularVelocity) -> Velocity {
    Velocity::new::<meter_per_second>(
        gearset.get::<radian_per_second>() * wheel_diameter.get::<meter>() / 2.0,
    )
}
