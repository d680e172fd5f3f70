use heapless::Vec;
#[allow(unused_imports)]
use micromath::F32Ext;
use serde::{Deserialize, Serialize};
use uom::si::{
    acceleration::meter_per_second_squared,
    angular_velocity::radian_per_second,
    f32::{Acceleration, AngularVelocity, Length, Time, Velocity},
    length::meter,
    time::second,
    velocity::meter_per_second,
};

use crate::{error::PathError, geometry::Curvature, odometry::ChassisScales, pursuit::limits::top_speed};

pub const MAX_MARKERS: usize = 8;

/// Kinematic limits of a timed trajectory.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryLimits {
    pub accel: Acceleration,
    pub max_vel: Velocity,
    pub max_omega: AngularVelocity,
}

impl TrajectoryLimits {
    pub fn new(accel: Acceleration, max_vel: Velocity, max_omega: AngularVelocity) -> Self {
        Self {
            accel,
            max_vel,
            max_omega,
        }
    }

    /// Limits reaching `max_vel` from rest in `accel_time`.
    pub fn from_times(accel_time: Time, max_vel: Velocity, max_omega: AngularVelocity) -> Self {
        Self::new(max_vel / accel_time, max_vel, max_omega)
    }

    /// Limits as fractions of what a drive geared to `gearset` can do.
    pub fn from_gearset(
        scales: &ChassisScales,
        gearset: AngularVelocity,
        accel_time: Time,
        vel_fraction: f32,
        omega_fraction: f32,
    ) -> Self {
        let max_vel = top_speed(scales.wheel_diameter, gearset) * vel_fraction;
        let max_omega = AngularVelocity::new::<radian_per_second>(
            omega_fraction * gearset.get::<radian_per_second>() * scales.wheel_diameter.get::<meter>()
                / scales.wheel_track.get::<meter>(),
        );
        Self::from_times(accel_time, max_vel, max_omega)
    }

    pub fn validate(&self) -> Result<(), PathError> {
        let positive = |value: f32| value.is_finite() && value > 0.0;
        if positive(self.accel.value) && positive(self.max_vel.value) && positive(self.max_omega.value) {
            Ok(())
        } else {
            Err(PathError::InvalidLimits)
        }
    }

    /// Fastest velocity whose turn rate through `curvature` leaves the sum
    /// of linear and angular utilization at one.
    pub fn max_vel_at_curvature(&self, curvature: Curvature) -> Velocity {
        let (v, w) = (self.max_vel.value, self.max_omega.value);
        Velocity::new::<meter_per_second>(w * v / (curvature.value.abs() * v + w))
    }

    /// Linear velocity left over while turning at `omega`.
    pub fn max_vel_at_omega(&self, omega: AngularVelocity) -> Velocity {
        let (v, w) = (self.max_vel.value, self.max_omega.value);
        Velocity::new::<meter_per_second>((v - v * omega.value.abs() / w).max(0.0))
    }
}

/// Start, end and top velocity of a profile as fractions of `max_vel`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProfileFlags {
    pub start_v: f32,
    pub end_v: f32,
    pub top_v: f32,
}

impl Default for ProfileFlags {
    fn default() -> Self {
        Self {
            start_v: 0.0,
            end_v: 0.0,
            top_v: 1.0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Kinematics {
    pub t: Time,
    pub d: Length,
    pub a: Acceleration,
    pub v: Velocity,
}

impl Kinematics {
    fn new(t: f32, d: f32, a: f32, v: f32) -> Self {
        Self {
            t: Time::new::<second>(t),
            d: Length::new::<meter>(d),
            a: Acceleration::new::<meter_per_second_squared>(a),
            v: Velocity::new::<meter_per_second>(v),
        }
    }
}

/// Accelerate, cruise, decelerate over a fixed distance.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Trapezoidal {
    accel: f32,
    length: f32,
    start_v: f32,
    end_v: f32,
    vel: f32,
    accel_t: f32,
    cruise_t: f32,
    accel_d: f32,
    cruise_d: f32,
    time: f32,
}

impl Trapezoidal {
    pub fn new(limits: &TrajectoryLimits, length: Length, flags: &ProfileFlags) -> Result<Self, PathError> {
        limits.validate()?;
        let a = limits.accel.get::<meter_per_second_squared>();
        let max_vel = limits.max_vel.get::<meter_per_second>();
        let length = length.get::<meter>();
        let start_v = max_vel * flags.start_v;
        let end_v = max_vel * flags.end_v;
        let top_v = max_vel * flags.top_v;

        let offset = (start_v * start_v + end_v * end_v) / 2.0;
        let mut cruise_d = length + (offset - top_v * top_v) / a;
        let vel = if cruise_d < 0.0 {
            // never reaches top speed
            cruise_d = 0.0;
            (a * length + offset).sqrt()
        } else {
            top_v
        };

        let accel_t = (vel - start_v) / a;
        let decel_t = (vel - end_v) / a;
        if !(accel_t >= 0.0 && decel_t >= 0.0) {
            return Err(PathError::InfeasibleProfile);
        }
        let accel_d = start_v * accel_t + 0.5 * a * accel_t * accel_t;
        let cruise_t = if vel > 0.0 { cruise_d / vel } else { 0.0 };

        Ok(Self {
            accel: a,
            length,
            start_v,
            end_v,
            vel,
            accel_t,
            cruise_t,
            accel_d,
            cruise_d,
            time: accel_t + cruise_t + decel_t,
        })
    }

    pub fn time(&self) -> Time {
        Time::new::<second>(self.time)
    }

    pub fn length(&self) -> Length {
        Length::new::<meter>(self.length)
    }

    /// Top speed actually reached.
    pub fn peak_velocity(&self) -> Velocity {
        Velocity::new::<meter_per_second>(self.vel)
    }

    pub fn begin(&self) -> Kinematics {
        Kinematics::new(0.0, 0.0, self.accel, self.start_v)
    }

    pub fn end(&self) -> Kinematics {
        Kinematics::new(self.time, self.length, -self.accel, self.end_v)
    }

    pub fn at_time(&self, t: Time) -> Kinematics {
        let a = self.accel;
        let t = t.get::<second>().clamp(0.0, self.time);
        if t <= self.accel_t {
            let v = self.start_v + a * t;
            let d = self.start_v * t + 0.5 * a * t * t;
            Kinematics::new(t, d, a, v)
        } else if t < self.accel_t + self.cruise_t {
            let d = self.accel_d + self.vel * (t - self.accel_t);
            Kinematics::new(t, d, 0.0, self.vel)
        } else {
            let decel_t = t - self.accel_t - self.cruise_t;
            let v = self.vel - a * decel_t;
            let d = self.accel_d + self.cruise_d + self.vel * decel_t - 0.5 * a * decel_t * decel_t;
            Kinematics::new(t, d, -a, v)
        }
    }

    pub fn at_distance(&self, d: Length) -> Kinematics {
        let a = self.accel;
        let d = d.get::<meter>().clamp(0.0, self.length);
        if d <= self.accel_d {
            let v = (self.start_v * self.start_v + 2.0 * a * d).sqrt();
            Kinematics::new((v - self.start_v) / a, d, a, v)
        } else if d < self.accel_d + self.cruise_d {
            let t = self.accel_t + (d - self.accel_d) / self.vel;
            Kinematics::new(t, d, 0.0, self.vel)
        } else {
            let decel_d = d - self.accel_d - self.cruise_d;
            let v = (self.vel * self.vel - 2.0 * a * decel_d).max(0.0).sqrt();
            let t = self.accel_t + self.cruise_t + (self.vel - v) / a;
            Kinematics::new(t, d, -a, v)
        }
    }
}

/// Trapezoidal segments chained through velocity markers.
#[derive(Clone, Debug, PartialEq)]
pub struct PiecewiseTrapezoidal {
    segments: Vec<Trapezoidal, { MAX_MARKERS + 1 }>,
}

impl PiecewiseTrapezoidal {
    /// `markers` are pairs of a fraction of `length` and the velocity, as a
    /// fraction of `max_vel`, to pass that point at.
    pub fn new(
        limits: &TrajectoryLimits,
        length: Length,
        flags: &ProfileFlags,
        markers: &[(f32, f32)],
    ) -> Result<Self, PathError> {
        if markers.len() > MAX_MARKERS {
            return Err(PathError::CapacityExceeded(MAX_MARKERS));
        }
        let mut segments = Vec::new();
        let mut prev = (0.0, flags.start_v);
        for &marker in markers.iter().chain(core::iter::once(&(1.0, flags.end_v))) {
            if !(marker.0 > prev.0 && marker.0 <= 1.0) {
                return Err(PathError::InvalidMarker);
            }
            let segment_flags = ProfileFlags {
                start_v: prev.1,
                end_v: marker.1,
                top_v: flags.top_v,
            };
            let segment = Trapezoidal::new(limits, length * (marker.0 - prev.0), &segment_flags)?;
            segments
                .push(segment)
                .map_err(|_| PathError::CapacityExceeded(MAX_MARKERS))?;
            prev = marker;
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Trapezoidal] {
        &self.segments
    }

    pub fn time(&self) -> Time {
        self.segments.iter().map(Trapezoidal::time).sum()
    }

    pub fn length(&self) -> Length {
        self.segments.iter().map(Trapezoidal::length).sum()
    }

    pub fn begin(&self) -> Kinematics {
        self.segments.first().map(Trapezoidal::begin).unwrap_or_default()
    }

    pub fn end(&self) -> Kinematics {
        let mut end = self.segments.last().map(Trapezoidal::end).unwrap_or_default();
        end.t = self.time();
        end.d = self.length();
        end
    }

    pub fn at_time(&self, t: Time) -> Kinematics {
        let (mut time, mut distance) = (Time::default(), Length::default());
        for segment in &self.segments {
            if t <= time + segment.time() {
                let mut k = segment.at_time(t - time);
                k.t += time;
                k.d += distance;
                return k;
            }
            time += segment.time();
            distance += segment.length();
        }
        self.end()
    }

    pub fn at_distance(&self, d: Length) -> Kinematics {
        let (mut time, mut distance) = (Time::default(), Length::default());
        for segment in &self.segments {
            if d <= distance + segment.length() {
                let mut k = segment.at_distance(d - distance);
                k.t += time;
                k.d += distance;
                return k;
            }
            time += segment.time();
            distance += segment.length();
        }
        self.end()
    }
}
