use core::fmt;

use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum OdometryError {
    #[error("odometry needs {expected} encoder values but the model reports {found}")]
    MissingSensors { expected: usize, found: usize },
}

/// Optional per-waypoint data filled in by the path generator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Annotation {
    Curvature,
    Velocity,
    Distance,
    Heading,
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Annotation::Curvature => "curvature",
            Annotation::Velocity => "velocity",
            Annotation::Distance => "distance",
            Annotation::Heading => "heading",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("interpolation step count must be at least one")]
    InvalidSteps,
    #[error("sampling step must be positive and finite")]
    InvalidStep,
    #[error("smoothing weight must lie strictly between 0 and 1")]
    InvalidWeight,
    #[error("path capacity of {0} points exceeded")]
    CapacityExceeded(usize),
    #[error("waypoint has no {0} annotation")]
    MissingAnnotation(Annotation),
    #[error("acceleration and deceleration limits must be positive")]
    InvalidLimits,
    #[error("spline needs at least {0} control points")]
    TooFewControlPoints(usize),
    #[error("profile cannot reach its end velocity within its length")]
    InfeasibleProfile,
    #[error("profile markers must lie strictly inside (0, 1) in increasing order")]
    InvalidMarker,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum PursuitError {
    #[error("path must contain at least two waypoints")]
    PathTooShort,
    #[error("path carries no velocity limits")]
    MissingLimits,
    #[error(transparent)]
    Path(#[from] PathError),
}
