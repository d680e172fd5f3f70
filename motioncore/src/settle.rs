use heapless::Vec;
use log::warn;
use serde::{Deserialize, Serialize};
use uom::si::{
    f32::{Angle, Length, Time},
    length::millimeter,
    time::millisecond,
};

use crate::{
    geometry::{normalize_angle_180, Pose, Vector},
    pid::SettledUtil,
};

const MAX_CONDITIONS: usize = 8;

/// Snapshot of a control loop handed to the settler every iteration.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ControlStatus {
    pub state: Pose,
    pub distance_error: Length,
    pub angle_error: Angle,
    pub distance_settled: bool,
    pub turn_settled: bool,
    pub angle_settled: bool,
    pub elapsed: Time,
}

/// How a motion primitive ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Exit {
    Settled,
    Excepted,
    Stalled,
    Cancelled,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Condition {
    DistanceTo { point: Vector, within: Length },
    AngleToPoint { point: Vector, within: Angle },
    AngleToHeading { heading: Angle, within: Angle },
    DistanceError(Length),
    AngleError(Angle),
    DistanceSettled,
    TurnSettled,
    AngleSettled,
    MaxTime(Time),
}

impl Condition {
    pub fn check(&self, status: &ControlStatus) -> bool {
        match *self {
            Condition::DistanceTo { point, within } => status.state.distance_to(&point) < within,
            Condition::AngleToPoint { point, within } => {
                status.state.angle_to(&point).abs() < within
            }
            Condition::AngleToHeading { heading, within } => {
                normalize_angle_180(heading - status.state.theta).abs() < within
            }
            Condition::DistanceError(within) => status.distance_error.abs() < within,
            Condition::AngleError(within) => status.angle_error.abs() < within,
            Condition::DistanceSettled => status.distance_settled,
            Condition::TurnSettled => status.turn_settled,
            Condition::AngleSettled => status.angle_settled,
            Condition::MaxTime(limit) => status.elapsed >= limit,
        }
    }
}

/// Fires once the distance error stops changing while the robot is still
/// away from the target.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StallDetector {
    util: SettledUtil,
    #[serde(skip)]
    last_error: Option<Length>,
}

impl StallDetector {
    /// `util` watches the change of the distance error in millimeters per cycle.
    pub fn new(util: SettledUtil) -> Self {
        Self {
            util,
            last_error: None,
        }
    }

    pub fn check(&mut self, distance_error: Length, now: Time) -> bool {
        let change = match self.last_error.replace(distance_error) {
            Some(last) => (distance_error - last).get::<millimeter>(),
            None => return false,
        };
        self.util.is_settled(change, now)
    }
}

impl Default for StallDetector {
    fn default() -> Self {
        Self::new(
            SettledUtil::builder()
                .at_target_error(0.5)
                .at_target_derivative(0.5)
                .at_target_time(Time::new::<millisecond>(500.0))
                .build(),
        )
    }
}

/// Exit condition of a motion primitive.
///
/// The loop ends when the stall detector fires, when any exception holds, or
/// when every requirement holds. A settler without requirements settles on
/// its first check.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Settler {
    requirements: Vec<Condition, MAX_CONDITIONS>,
    exceptions: Vec<Condition, MAX_CONDITIONS>,
    abort: Option<StallDetector>,
}

impl Settler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Settles on the turn loop.
    pub fn turn() -> Self {
        Self::new().requirement(Condition::TurnSettled)
    }

    /// Settles on the distance loop and aborts when the drive stalls.
    pub fn drive() -> Self {
        Self::new()
            .requirement(Condition::DistanceSettled)
            .abort(StallDetector::default())
    }

    pub fn requirement(mut self, condition: Condition) -> Self {
        if self.requirements.push(condition).is_err() {
            warn!("settler keeps at most {} requirements, dropped {:?}", MAX_CONDITIONS, condition);
        }
        self
    }

    pub fn exception(mut self, condition: Condition) -> Self {
        if self.exceptions.push(condition).is_err() {
            warn!("settler keeps at most {} exceptions, dropped {:?}", MAX_CONDITIONS, condition);
        }
        self
    }

    pub fn max_time(self, limit: Time) -> Self {
        self.exception(Condition::MaxTime(limit))
    }

    pub fn abort(mut self, detector: StallDetector) -> Self {
        self.abort = Some(detector);
        self
    }

    pub fn no_abort(mut self) -> Self {
        self.abort = None;
        self
    }

    pub fn check(&mut self, status: &ControlStatus) -> Option<Exit> {
        if let Some(detector) = self.abort.as_mut() {
            if detector.check(status.distance_error, status.elapsed) {
                return Some(Exit::Stalled);
            }
        }
        if self.exceptions.iter().any(|condition| condition.check(status)) {
            return Some(Exit::Excepted);
        }
        if self.requirements.iter().all(|condition| condition.check(status)) {
            return Some(Exit::Settled);
        }
        None
    }
}
