#[allow(unused_imports)]
use micromath::F32Ext;
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;
use uom::si::{
    f32::Time,
    time::{millisecond, second},
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PidGains {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
}

impl PidGains {
    pub fn new(kp: f32, ki: f32, kd: f32) -> Self {
        Self { kp, ki, kd }
    }
}

/// Reports settling once the error and its per-sample change have stayed
/// inside their bands for `at_target_time`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, TypedBuilder)]
pub struct SettledUtil {
    #[builder(default = 50.0)]
    at_target_error: f32,
    #[builder(default = 5.0)]
    at_target_derivative: f32,
    #[builder(default = Time::new::<millisecond>(250.0))]
    at_target_time: Time,
    #[serde(skip)]
    #[builder(default, setter(skip))]
    last_error: f32,
    #[serde(skip)]
    #[builder(default, setter(skip))]
    entered_at: Option<Time>,
}

impl Default for SettledUtil {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl SettledUtil {
    pub fn is_settled(&mut self, error: f32, now: Time) -> bool {
        let derivative = error - self.last_error;
        self.last_error = error;
        if error.abs() < self.at_target_error && derivative.abs() < self.at_target_derivative {
            let entered = *self.entered_at.get_or_insert(now);
            now - entered >= self.at_target_time
        } else {
            self.entered_at = None;
            false
        }
    }

    pub fn reset(&mut self) {
        self.last_error = 0.0;
        self.entered_at = None;
    }
}

/// Discrete PID loop stepped once per control period.
///
/// The output is clamped to `[-1, 1]`, the range of a normalized chassis
/// command.
#[derive(Clone, Debug, TypedBuilder)]
pub struct PidController {
    gains: PidGains,
    period: Time,
    /// Bound on the integral contribution to the output.
    #[builder(default = 1.0)]
    integral_limit: f32,
    #[builder(default)]
    settled_util: SettledUtil,
    #[builder(default, setter(skip))]
    integral: f32,
    #[builder(default, setter(skip))]
    last_error: f32,
    #[builder(default, setter(skip))]
    elapsed: Time,
    #[builder(default, setter(skip))]
    output: f32,
    #[builder(default, setter(skip))]
    settled: bool,
}

impl PidController {
    /// Steps the loop with `error` (target minus measurement).
    pub fn step(&mut self, error: f32) -> f32 {
        let dt = self.period.get::<second>();
        let limit = self.integral_limit.abs();
        let derivative = if dt > 0.0 {
            (error - self.last_error) / dt
        } else {
            0.0
        };
        self.integral = (self.integral + self.gains.ki * error * dt).clamp(-limit, limit);
        self.last_error = error;
        self.elapsed += self.period;
        self.settled = self.settled_util.is_settled(error, self.elapsed);

        let output = self.gains.kp * error + self.integral + self.gains.kd * derivative;
        self.output = output.clamp(-1.0, 1.0);
        self.output
    }

    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.last_error = 0.0;
        self.elapsed = Time::default();
        self.output = 0.0;
        self.settled = false;
        self.settled_util.reset();
    }

    pub fn is_settled(&self) -> bool {
        self.settled
    }

    pub fn error(&self) -> f32 {
        self.last_error
    }

    pub fn output(&self) -> f32 {
        self.output
    }

    pub fn gains(&self) -> &PidGains {
        &self.gains
    }

    pub fn set_gains(&mut self, gains: PidGains) {
        self.gains = gains;
    }
}
