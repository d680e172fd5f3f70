use core::{
    f32::consts::{FRAC_PI_2, PI, TAU},
    marker::PhantomData,
    ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign},
};

#[allow(unused_imports)]
use micromath::F32Ext;
use serde::{Deserialize, Serialize};
use typenum::{N1, Z0};
use uom::{
    si::{
        angle::radian,
        f32::{Angle, Length},
        length::meter,
        Quantity, ISQ, SI,
    },
    Kind,
};

/// Inverse length. Positive values bend clockwise.
pub type Curvature = Quantity<ISQ<N1, Z0, Z0, Z0, Z0, Z0, Z0, dyn Kind>, SI<f32>, f32>;

pub fn curvature(value: f32) -> Curvature {
    Curvature {
        value,
        dimension: PhantomData,
        units: PhantomData,
    }
}

/// A point on the field. Headings are measured clockwise from +y.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Vector {
    pub x: Length,
    pub y: Length,
}

impl Vector {
    pub fn new(x: Length, y: Length) -> Self {
        Self { x, y }
    }

    /// Point `distance` away from the origin along `heading`.
    pub fn polar(distance: Length, heading: Angle) -> Self {
        Self {
            x: distance * heading.value.sin(),
            y: distance * heading.value.cos(),
        }
    }

    /// Dot product in square meters.
    pub fn dot(&self, other: &Vector) -> f32 {
        self.x.value * other.x.value + self.y.value * other.y.value
    }

    pub fn magnitude(&self) -> Length {
        Length::new::<meter>(self.dot(self).sqrt())
    }

    pub fn distance(&self, other: &Vector) -> Length {
        (*other - *self).magnitude()
    }

    /// Heading of the ray from `self` through `other`.
    pub fn angle(&self, other: &Vector) -> Angle {
        let diff = *other - *self;
        Angle::new::<radian>(diff.x.value.atan2(diff.y.value))
    }

    /// Vector of unit magnitude in meters. The zero vector stays zero.
    pub fn normalize(&self) -> Vector {
        let magnitude = self.magnitude().value;
        if magnitude == 0.0 {
            *self
        } else {
            *self / magnitude
        }
    }

    /// Rotates clockwise by `angle`.
    pub fn rotate(&self, angle: Angle) -> Vector {
        let (sin, cos) = (angle.value.sin(), angle.value.cos());
        Vector {
            x: self.x * cos + self.y * sin,
            y: self.y * cos - self.x * sin,
        }
    }
}

impl Add for Vector {
    type Output = Vector;

    fn add(self, rhs: Vector) -> Vector {
        Vector {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl AddAssign for Vector {
    fn add_assign(&mut self, rhs: Vector) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Vector {
    type Output = Vector;

    fn sub(self, rhs: Vector) -> Vector {
        Vector {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

impl SubAssign for Vector {
    fn sub_assign(&mut self, rhs: Vector) {
        self.x -= rhs.x;
        self.y -= rhs.y;
    }
}

impl Mul<f32> for Vector {
    type Output = Vector;

    fn mul(self, rhs: f32) -> Vector {
        Vector {
            x: self.x * rhs,
            y: self.y * rhs,
        }
    }
}

impl Div<f32> for Vector {
    type Output = Vector;

    fn div(self, rhs: f32) -> Vector {
        Vector {
            x: self.x / rhs,
            y: self.y / rhs,
        }
    }
}

impl Neg for Vector {
    type Output = Vector;

    fn neg(self) -> Vector {
        Vector {
            x: -self.x,
            y: -self.y,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Pose {
    pub x: Length,
    pub y: Length,
    pub theta: Angle,
}

/// Axis convention used when exchanging poses with other components.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub enum StateMode {
    /// Native convention, x to the right and y forward.
    Cartesian,
    /// Field frame with the axes swapped.
    Frame,
}

impl Pose {
    pub fn new(x: Length, y: Length, theta: Angle) -> Self {
        Self { x, y, theta }
    }

    pub fn point(&self) -> Vector {
        Vector::new(self.x, self.y)
    }

    pub fn distance_to(&self, point: &Vector) -> Length {
        self.point().distance(point)
    }

    /// Signed turn needed to face `point`, in `[-π, π)`.
    pub fn angle_to(&self, point: &Vector) -> Angle {
        normalize_angle_180(self.point().angle(point) - self.theta)
    }

    pub fn to_mode(&self, mode: StateMode) -> Pose {
        match mode {
            StateMode::Cartesian => *self,
            StateMode::Frame => Pose {
                x: self.y,
                y: self.x,
                theta: self.theta,
            },
        }
    }

    pub fn from_mode(pose: &Pose, mode: StateMode) -> Pose {
        // the swap is its own inverse
        pose.to_mode(mode)
    }
}

// wraps `value` into [lower, lower + TAU)
fn wrap(value: f32, lower: f32) -> f32 {
    let upper = lower + TAU;
    if !value.is_finite() || (value >= lower && value < upper) {
        return value;
    }
    let mut wrapped = value - TAU * ((value - lower) / TAU).floor();
    if wrapped >= upper {
        wrapped -= TAU;
    }
    if wrapped < lower {
        wrapped = lower;
    }
    wrapped
}

/// Rolls an angle into `[-π, π)`.
pub fn normalize_angle_180(angle: Angle) -> Angle {
    Angle::new::<radian>(wrap(angle.value, -PI))
}

/// Rolls an angle into `[0, 2π)`.
pub fn normalize_angle_360(angle: Angle) -> Angle {
    Angle::new::<radian>(wrap(angle.value, 0.0))
}

/// Folds an angle into `[-π/2, π/2]`, flipping by π when it points backwards.
pub fn normalize_angle_90(angle: Angle) -> Angle {
    let rolled = normalize_angle_180(angle);
    if rolled.value.abs() > FRAC_PI_2 {
        normalize_angle_180(rolled + Angle::new::<radian>(PI))
    } else {
        rolled
    }
}

/// Projects `target` onto the ray through `pose` along its heading.
pub fn closest(pose: &Pose, target: &Vector) -> Vector {
    let heading = Vector::polar(Length::new::<meter>(1.0), pose.theta);
    let along = (*target - pose.point()).dot(&heading);
    pose.point() + heading * along
}
