use core::f32::consts::PI;

use heapless::Vec;
#[allow(unused_imports)]
use micromath::F32Ext;
use serde::{Deserialize, Serialize};
use spin::Mutex;
use typed_builder::TypedBuilder;
use uom::si::{
    angle::radian,
    f32::{Angle, Length},
    length::meter,
};

use crate::{
    error::OdometryError,
    geometry::{Pose, StateMode},
};

/// Raw encoder ticks in the order left, right, middle.
pub type SensorValues = Vec<i32, 4>;

/// Source of raw tracking-wheel ticks.
pub trait EncoderModel {
    fn sensor_values(&self) -> SensorValues;
    fn reset_sensors(&self);
}

impl<T: EncoderModel + ?Sized> EncoderModel for &T {
    fn sensor_values(&self) -> SensorValues {
        (**self).sensor_values()
    }

    fn reset_sensors(&self) {
        (**self).reset_sensors()
    }
}

#[cfg(feature = "std")]
impl<T: EncoderModel + ?Sized> EncoderModel for std::sync::Arc<T> {
    fn sensor_values(&self) -> SensorValues {
        (**self).sensor_values()
    }

    fn reset_sensors(&self) {
        (**self).reset_sensors()
    }
}

/// Perpendicular tracking wheel.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MiddleWheel {
    /// Signed distance from the tracking center, positive behind it.
    pub distance: Length,
    pub diameter: Length,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, TypedBuilder)]
pub struct ChassisScales {
    pub wheel_diameter: Length,
    pub wheel_track: Length,
    #[builder(default, setter(strip_option))]
    pub middle: Option<MiddleWheel>,
    pub ticks_per_rev: f32,
}

impl ChassisScales {
    /// Side wheel ticks per meter.
    pub fn straight(&self) -> f32 {
        self.ticks_per_rev / (PI * self.wheel_diameter.get::<meter>())
    }

    /// Middle wheel ticks per meter.
    pub fn middle_scale(&self) -> Option<f32> {
        self.middle
            .map(|middle| self.ticks_per_rev / (PI * middle.diameter.get::<meter>()))
    }

    pub fn expected_sensors(&self) -> usize {
        if self.middle.is_some() {
            3
        } else {
            2
        }
    }

    pub fn ticks_to_length(&self, ticks: f32) -> Length {
        Length::new::<meter>(ticks / self.straight())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TickDelta {
    pub left: i32,
    pub right: i32,
    pub middle: i32,
}

#[derive(Debug, Default)]
struct Inner {
    last_ticks: [i32; 3],
    state: Pose,
}

/// Dead-reckoning pose tracker.
///
/// The pose is guarded by a spin lock: one task calls [`Odometry::step`] while
/// any number of readers take snapshots through [`Odometry::state`]. Step at
/// least twice as often as the fastest reader to bound staleness.
#[derive(Debug)]
pub struct Odometry<M> {
    model: M,
    scales: ChassisScales,
    inner: Mutex<Inner>,
}

impl<M: EncoderModel> Odometry<M> {
    pub fn new(model: M, scales: ChassisScales) -> Result<Self, OdometryError> {
        let values = model.sensor_values();
        let last_ticks = Self::validate(&scales, &values)?;
        Ok(Self {
            model,
            scales,
            inner: Mutex::new(Inner {
                last_ticks,
                state: Pose::default(),
            }),
        })
    }

    fn validate(scales: &ChassisScales, values: &SensorValues) -> Result<[i32; 3], OdometryError> {
        let expected = scales.expected_sensors();
        if values.len() < expected {
            return Err(OdometryError::MissingSensors {
                expected,
                found: values.len(),
            });
        }
        let middle = if expected == 3 { values[2] } else { 0 };
        Ok([values[0], values[1], middle])
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn scales(&self) -> &ChassisScales {
        &self.scales
    }

    /// Reads the encoders once and integrates the change since the last step.
    pub fn step(&self) -> Result<Pose, OdometryError> {
        let values = self.model.sensor_values();
        let ticks = Self::validate(&self.scales, &values)?;

        let mut inner = self.inner.lock();
        let delta = TickDelta {
            left: ticks[0].wrapping_sub(inner.last_ticks[0]),
            right: ticks[1].wrapping_sub(inner.last_ticks[1]),
            middle: ticks[2].wrapping_sub(inner.last_ticks[2]),
        };
        inner.last_ticks = ticks;
        inner.state = self.estimate(inner.state, &delta);
        Ok(inner.state)
    }

    pub fn estimate(&self, mut state: Pose, delta: &TickDelta) -> Pose {
        let straight = self.scales.straight();
        let left = delta.left as f32 / straight;
        let right = delta.right as f32 / straight;
        let (middle, middle_distance) = match (self.scales.middle, self.scales.middle_scale()) {
            (Some(wheel), Some(scale)) => (delta.middle as f32 / scale, wheel.distance.get::<meter>()),
            _ => (0.0, 0.0),
        };
        let track = self.scales.wheel_track.get::<meter>();

        let dtheta = (left - right) / track;
        let (chord, strafe_chord, half) = if dtheta == 0.0 {
            // straight approximation
            (right, middle, 0.0)
        } else {
            // arc approximation
            let half = dtheta / 2.0;
            let sin_half = half.sin();
            (
                2.0 * (right / dtheta + track / 2.0) * sin_half,
                2.0 * (middle / dtheta + middle_distance) * sin_half,
                half,
            )
        };

        let theta_m = state.theta.value + half;
        let sin_th = theta_m.sin();
        let cos_th = theta_m.cos();
        state.x += Length::new::<meter>(chord * sin_th + strafe_chord * cos_th);
        state.y += Length::new::<meter>(chord * cos_th - strafe_chord * sin_th);
        state.theta += Angle::new::<radian>(dtheta);
        state
    }

    /// Average distance the side wheels report since the last sensor reset.
    pub fn encoder_distance(&self) -> Length {
        let values = self.model.sensor_values();
        let left = values.first().copied().unwrap_or_default() as f32;
        let right = values.get(1).copied().unwrap_or_default() as f32;
        self.scales.ticks_to_length((left + right) / 2.0)
    }

    pub fn state(&self) -> Pose {
        self.inner.lock().state
    }

    pub fn set_state(&self, state: Pose) {
        self.inner.lock().state = state;
    }

    pub fn state_in(&self, mode: StateMode) -> Pose {
        self.state().to_mode(mode)
    }

    pub fn set_state_in(&self, state: &Pose, mode: StateMode) {
        self.set_state(Pose::from_mode(state, mode));
    }

    /// Zeroes the encoders, the tick history and the pose.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        self.model.reset_sensors();
        *inner = Inner::default();
    }
}

#[cfg(feature = "std")]
impl<M: EncoderModel + Send + Sync + 'static> Odometry<M> {
    /// Runs [`Odometry::step`] every `period` on a dedicated thread until the
    /// task is stopped or a step fails.
    pub fn spawn(
        odometry: std::sync::Arc<Self>,
        period: std::time::Duration,
    ) -> std::io::Result<crate::task::PeriodicTask> {
        use core::ops::ControlFlow;

        crate::task::PeriodicTask::spawn("odometry", period, move || match odometry.step() {
            Ok(_) => ControlFlow::Continue(()),
            Err(err) => {
                log::error!("odometry stopped: {}", err);
                ControlFlow::Break(())
            }
        })
    }
}
