use heapless::Vec;
#[allow(unused_imports)]
use micromath::F32Ext;
use serde::{Deserialize, Serialize};
use uom::si::{
    angle::radian,
    f32::{Angle, Length},
    length::meter,
};

use crate::{
    error::PathError,
    geometry::{curvature, normalize_angle_180, Curvature, Pose, Vector},
};

const LENGTH_SEGMENTS: usize = 100;
const STALL_STEP: f32 = 1e-3;
const MAX_T_STEP: f32 = 0.01;
pub const MAX_CONTROL_POINTS: usize = 8;

/// Position and its first two derivatives with respect to the curve parameter.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Derivatives {
    pub point: Vector,
    pub first: Vector,
    pub second: Vector,
}

/// A curve parameterized over `t` in `[0, 1]`.
pub trait Spline {
    fn derivatives(&self, t: f32) -> Derivatives;

    /// Position and heading of travel at `t`.
    fn sample(&self, t: f32) -> Pose {
        let d = self.derivatives(t);
        let heading = d.first.x.value.atan2(d.first.y.value);
        Pose::new(d.point.x, d.point.y, Angle::new::<radian>(heading))
    }

    fn curvature(&self, t: f32) -> Curvature {
        let d = self.derivatives(t);
        let speed = d.first.magnitude().value;
        if speed == 0.0 {
            return curvature(0.0);
        }
        let cross = d.first.y.value * d.second.x.value - d.first.x.value * d.second.y.value;
        curvature(cross / (speed * speed * speed))
    }

    /// Distance travelled per unit of `t`.
    fn velocity(&self, t: f32) -> Length {
        self.derivatives(t).first.magnitude()
    }

    /// Parameter roughly `distance` further along the curve than `t`. Where
    /// the curve has zero speed, `t` creeps forward until it moves again.
    fn advance(&self, t: f32, distance: Length) -> f32 {
        let mut t = t;
        let mut remaining = distance.value;
        while t < 1.0 {
            let speed = self.velocity(t).value;
            if !(speed > 0.0) {
                t += STALL_STEP;
                continue;
            }
            let step = remaining / speed;
            if step <= MAX_T_STEP {
                return t + step;
            }
            t += MAX_T_STEP;
            remaining -= MAX_T_STEP * speed;
        }
        t
    }

    fn length(&self) -> Length {
        let mut total = Length::default();
        let mut prev = self.sample(0.0).point();
        for i in 1..=LENGTH_SEGMENTS {
            let next = self.sample(i as f32 / LENGTH_SEGMENTS as f32).point();
            total += prev.distance(&next);
            prev = next;
        }
        total
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub start: Vector,
    pub end: Vector,
}

impl Line {
    pub fn new(start: Vector, end: Vector) -> Self {
        Self { start, end }
    }
}

impl Spline for Line {
    fn derivatives(&self, t: f32) -> Derivatives {
        let first = self.end - self.start;
        Derivatives {
            point: self.start + first * t,
            first,
            second: Vector::default(),
        }
    }

    fn curvature(&self, _t: f32) -> Curvature {
        curvature(0.0)
    }

    fn length(&self) -> Length {
        self.start.distance(&self.end)
    }
}

/// Circular arc between two poses. The sweep is the change of heading and the
/// arc leaves `start` at the heading that makes it pass through `end`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Arc {
    start: Vector,
    /// Signed sweep in radians, clockwise positive.
    sweep: f32,
    /// Signed radius in meters, `None` when the arc is a straight segment.
    radius: Option<f32>,
    /// Heading at `t = 0` in radians.
    rotation: f32,
    chord: f32,
}

impl Arc {
    pub fn new(start: Pose, end: Pose) -> Self {
        let sweep = normalize_angle_180(end.theta - start.theta).value;
        let chord = start.distance_to(&end.point()).value;
        let radius = if sweep.abs() < 1e-6 {
            None
        } else {
            Some(chord / (2.0 * (sweep / 2.0).sin()))
        };
        let rotation = start.point().angle(&end.point()).value - sweep / 2.0;
        Self {
            start: start.point(),
            sweep,
            radius,
            rotation,
            chord,
        }
    }
}

impl Spline for Arc {
    fn derivatives(&self, t: f32) -> Derivatives {
        let meters = |x: f32, y: f32| Vector::new(Length::new::<meter>(x), Length::new::<meter>(y));
        match self.radius {
            None => {
                let (sin, cos) = (self.rotation.sin(), self.rotation.cos());
                let first = meters(self.chord * sin, self.chord * cos);
                Derivatives {
                    point: self.start + first * t,
                    first,
                    second: Vector::default(),
                }
            }
            Some(r) => {
                let heading = self.rotation + self.sweep * t;
                let (sin, cos) = (heading.sin(), heading.cos());
                let (sin0, cos0) = (self.rotation.sin(), self.rotation.cos());
                let speed = r * self.sweep;
                Derivatives {
                    point: self.start + meters(r * (cos0 - cos), r * (sin - sin0)),
                    first: meters(speed * sin, speed * cos),
                    second: meters(speed * self.sweep * cos, -speed * self.sweep * sin),
                }
            }
        }
    }

    fn curvature(&self, _t: f32) -> Curvature {
        curvature(self.radius.map_or(0.0, |r| 1.0 / r))
    }

    fn length(&self) -> Length {
        Length::new::<meter>(match self.radius {
            Some(r) => (r * self.sweep).abs(),
            None => self.chord,
        })
    }
}

/// Bezier curve of up to [`MAX_CONTROL_POINTS`] control points.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bezier {
    points: Vec<Vector, MAX_CONTROL_POINTS>,
}

impl Bezier {
    pub fn new(points: &[Vector]) -> Result<Self, PathError> {
        if points.len() < 2 {
            return Err(PathError::TooFewControlPoints(2));
        }
        let points = Vec::from_slice(points)
            .map_err(|_| PathError::CapacityExceeded(MAX_CONTROL_POINTS))?;
        Ok(Self { points })
    }

    pub fn points(&self) -> &[Vector] {
        &self.points
    }
}

// evaluates the Bernstein polynomial of `points` at `t`
fn de_casteljau(points: &[Vector], t: f32) -> Vector {
    let mut work: Vec<Vector, MAX_CONTROL_POINTS> = points.iter().copied().collect();
    for round in 1..work.len() {
        for i in 0..work.len() - round {
            work[i] = work[i] * (1.0 - t) + work[i + 1] * t;
        }
    }
    work.first().copied().unwrap_or_default()
}

fn differences(points: &[Vector]) -> Vec<Vector, MAX_CONTROL_POINTS> {
    points.windows(2).map(|pair| pair[1] - pair[0]).collect()
}

impl Spline for Bezier {
    fn derivatives(&self, t: f32) -> Derivatives {
        let degree = (self.points.len() - 1) as f32;
        let first = differences(&self.points);
        let second = differences(&first);
        Derivatives {
            point: de_casteljau(&self.points, t),
            first: de_casteljau(&first, t) * degree,
            second: de_casteljau(&second, t) * (degree * (degree - 1.0)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HermiteOrder {
    Cubic,
    Quintic,
}

/// Hermite spline matching position and heading at both ends. The quintic
/// form also starts and ends with zero second derivative.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Hermite {
    x: [f32; 6],
    y: [f32; 6],
}

impl Hermite {
    /// Tangents are as long as the chord between the poses.
    pub fn new(start: Pose, end: Pose, order: HermiteOrder) -> Self {
        let chord = start.distance_to(&end.point());
        Self::with_slopes(start, end, chord, chord, order)
    }

    pub fn with_slopes(
        start: Pose,
        end: Pose,
        start_slope: Length,
        end_slope: Length,
        order: HermiteOrder,
    ) -> Self {
        let start_tangent = Vector::polar(start_slope, start.theta);
        let end_tangent = Vector::polar(end_slope, end.theta);
        Self {
            x: coefficients(
                start.x.value,
                start_tangent.x.value,
                end.x.value,
                end_tangent.x.value,
                order,
            ),
            y: coefficients(
                start.y.value,
                start_tangent.y.value,
                end.y.value,
                end_tangent.y.value,
                order,
            ),
        }
    }
}

fn coefficients(start: f32, start_slope: f32, end: f32, end_slope: f32, order: HermiteOrder) -> [f32; 6] {
    match order {
        HermiteOrder::Cubic => {
            let u = end - start;
            [
                start,
                start_slope,
                3.0 * u - 2.0 * start_slope - end_slope,
                -2.0 * u + start_slope + end_slope,
                0.0,
                0.0,
            ]
        }
        HermiteOrder::Quintic => {
            let u = end - start - start_slope;
            let v = end_slope - start_slope;
            [
                start,
                start_slope,
                0.0,
                10.0 * u - 4.0 * v,
                -15.0 * u + 7.0 * v,
                6.0 * u - 3.0 * v,
            ]
        }
    }
}

// value, first and second derivative of the polynomial at `t`
fn polynomial(coeffs: &[f32; 6], t: f32) -> [f32; 3] {
    let mut out = [0.0; 3];
    let mut power = 1.0;
    for (n, c) in coeffs.iter().enumerate() {
        out[0] += c * power;
        if n + 1 < coeffs.len() {
            out[1] += (n + 1) as f32 * coeffs[n + 1] * power;
        }
        if n + 2 < coeffs.len() {
            out[2] += ((n + 2) * (n + 1)) as f32 * coeffs[n + 2] * power;
        }
        power *= t;
    }
    out
}

impl Spline for Hermite {
    fn derivatives(&self, t: f32) -> Derivatives {
        let [x, dx, ddx] = polynomial(&self.x, t);
        let [y, dy, ddy] = polynomial(&self.y, t);
        let meters = |x: f32, y: f32| Vector::new(Length::new::<meter>(x), Length::new::<meter>(y));
        Derivatives {
            point: meters(x, y),
            first: meters(dx, dy),
            second: meters(ddx, ddy),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Curve {
    Line(Line),
    Arc(Arc),
    Bezier(Bezier),
    Hermite(Hermite),
}

impl Spline for Curve {
    fn derivatives(&self, t: f32) -> Derivatives {
        match self {
            Curve::Line(line) => line.derivatives(t),
            Curve::Arc(arc) => arc.derivatives(t),
            Curve::Bezier(bezier) => bezier.derivatives(t),
            Curve::Hermite(hermite) => hermite.derivatives(t),
        }
    }

    fn curvature(&self, t: f32) -> Curvature {
        match self {
            Curve::Line(line) => line.curvature(t),
            Curve::Arc(arc) => arc.curvature(t),
            Curve::Bezier(bezier) => bezier.curvature(t),
            Curve::Hermite(hermite) => hermite.curvature(t),
        }
    }

    fn length(&self) -> Length {
        match self {
            Curve::Line(line) => line.length(),
            Curve::Arc(arc) => arc.length(),
            Curve::Bezier(bezier) => bezier.length(),
            Curve::Hermite(hermite) => hermite.length(),
        }
    }
}

/// Segments joined end to end, each taking an equal share of `t`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Piecewise<const N: usize> {
    segments: Vec<Curve, N>,
}

impl<const N: usize> Piecewise<N> {
    pub fn new(segments: &[Curve]) -> Result<Self, PathError> {
        let mut piecewise = Self::default();
        for segment in segments {
            piecewise.push(segment.clone())?;
        }
        Ok(piecewise)
    }

    /// Arcs between consecutive poses.
    pub fn arcs(poses: &[Pose]) -> Result<Self, PathError> {
        Self::connect(poses, |start, end| Curve::Arc(Arc::new(start, end)))
    }

    /// Hermite splines between consecutive poses.
    pub fn hermites(poses: &[Pose], order: HermiteOrder) -> Result<Self, PathError> {
        Self::connect(poses, |start, end| Curve::Hermite(Hermite::new(start, end, order)))
    }

    fn connect(poses: &[Pose], mut make: impl FnMut(Pose, Pose) -> Curve) -> Result<Self, PathError> {
        let mut piecewise = Self::default();
        for pair in poses.windows(2) {
            piecewise.push(make(pair[0], pair[1]))?;
        }
        Ok(piecewise)
    }

    pub fn push(&mut self, segment: Curve) -> Result<(), PathError> {
        self.segments
            .push(segment)
            .map_err(|_| PathError::CapacityExceeded(N))
    }

    pub fn segments(&self) -> &[Curve] {
        &self.segments
    }

    // segment index and local parameter for a global `t`
    fn locate(&self, t: f32) -> Option<(&Curve, f32)> {
        let count = self.segments.len();
        if count == 0 {
            return None;
        }
        let scaled = t.clamp(0.0, 1.0) * count as f32;
        let index = (scaled as usize).min(count - 1);
        Some((&self.segments[index], scaled - index as f32))
    }
}

impl<const N: usize> Spline for Piecewise<N> {
    fn derivatives(&self, t: f32) -> Derivatives {
        let count = self.segments.len() as f32;
        match self.locate(t) {
            Some((segment, local)) => {
                let d = segment.derivatives(local);
                Derivatives {
                    point: d.point,
                    first: d.first * count,
                    second: d.second * (count * count),
                }
            }
            None => Derivatives::default(),
        }
    }

    fn curvature(&self, t: f32) -> Curvature {
        self.locate(t)
            .map_or(curvature(0.0), |(segment, local)| segment.curvature(local))
    }

    fn length(&self) -> Length {
        self.segments.iter().map(|segment| segment.length()).fold(Length::default(), |a, b| a + b)
    }
}

/// How a spline is sampled into discrete poses. The endpoint is always
/// included.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum StepBy {
    /// This many equal steps of `t`.
    Count(usize),
    /// Steps of `t` of this size, in `(0, 1]`.
    T(f32),
    /// Steps of roughly this distance along the curve.
    Dist(Length),
}

impl StepBy {
    pub fn sample<S: Spline + ?Sized, const N: usize>(&self, spline: &S) -> Result<Vec<Pose, N>, PathError> {
        let mut poses = Vec::new();
        let mut push = |t: f32| {
            poses
                .push(spline.sample(t))
                .map_err(|_| PathError::CapacityExceeded(N))
        };
        match *self {
            StepBy::Count(count) => {
                if count == 0 {
                    return Err(PathError::InvalidSteps);
                }
                for i in 0..=count {
                    push(i as f32 / count as f32)?;
                }
            }
            StepBy::T(dt) => {
                if !(dt.is_finite() && dt > 0.0 && dt <= 1.0) {
                    return Err(PathError::InvalidStep);
                }
                // absorbs rounding of exact reciprocals such as 0.1
                let count = (1.0 / dt + 1e-4) as usize;
                return StepBy::Count(count).sample(spline);
            }
            StepBy::Dist(distance) => {
                if !(distance.value.is_finite() && distance.value > 0.0) {
                    return Err(PathError::InvalidStep);
                }
                let mut t = 0.0;
                loop {
                    push(t)?;
                    let next = spline.advance(t, distance);
                    if !(next < 1.0) {
                        if t < 1.0 {
                            push(1.0)?;
                        }
                        break;
                    }
                    t = next;
                }
            }
        }
        Ok(poses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use core::f32::consts::PI;
    use proptest::prelude::*;
    use uom::si::angle::degree;

    fn vector(x: f32, y: f32) -> Vector {
        Vector::new(Length::new::<meter>(x), Length::new::<meter>(y))
    }

    fn pose(x: f32, y: f32, theta: f32) -> Pose {
        Pose::new(
            Length::new::<meter>(x),
            Length::new::<meter>(y),
            Angle::new::<degree>(theta),
        )
    }

    fn assert_pose(actual: Pose, expected: Pose) {
        assert_relative_eq!(actual.x.get::<meter>(), expected.x.get::<meter>(), epsilon = 1e-4);
        assert_relative_eq!(actual.y.get::<meter>(), expected.y.get::<meter>(), epsilon = 1e-4);
        assert_relative_eq!(
            normalize_angle_180(actual.theta - expected.theta).get::<degree>(),
            0.0,
            epsilon = 1e-2
        );
    }

    #[test]
    fn test_line() {
        let line = Line::new(vector(0.0, 0.0), vector(3.0, 4.0));
        let mid = line.sample(0.5);
        assert_relative_eq!(mid.x.get::<meter>(), 1.5);
        assert_relative_eq!(mid.y.get::<meter>(), 2.0);
        assert_relative_eq!(mid.theta.value, 3.0f32.atan2(4.0));
        assert_eq!(line.curvature(0.3).value, 0.0);
        assert_relative_eq!(line.length().get::<meter>(), 5.0);
        assert_relative_eq!(line.velocity(0.7).get::<meter>(), 5.0);
    }

    #[test]
    fn test_quarter_arc() {
        let arc = Arc::new(pose(0.0, 0.0, 0.0), pose(1.0, 1.0, 90.0));
        assert_pose(arc.sample(0.0), pose(0.0, 0.0, 0.0));
        assert_pose(arc.sample(1.0), pose(1.0, 1.0, 90.0));
        let mid = arc.sample(0.5);
        // centered on (1, 0) with unit radius
        assert_relative_eq!(mid.point().distance(&vector(1.0, 0.0)).get::<meter>(), 1.0, epsilon = 1e-5);
        assert_relative_eq!(arc.curvature(0.5).value, 1.0, epsilon = 1e-5);
        assert_relative_eq!(arc.length().get::<meter>(), PI / 2.0, epsilon = 1e-5);
        // the derivative based curvature agrees with the radius
        let d = arc.derivatives(0.3);
        let speed = d.first.magnitude().value;
        let cross = d.first.y.value * d.second.x.value - d.first.x.value * d.second.y.value;
        assert_relative_eq!(cross / (speed * speed * speed), 1.0, epsilon = 1e-4);
    }

    #[test]
    fn test_left_arc_has_negative_curvature() {
        let arc = Arc::new(pose(0.0, 0.0, 0.0), pose(-1.0, 1.0, -90.0));
        assert_pose(arc.sample(1.0), pose(-1.0, 1.0, -90.0));
        assert_relative_eq!(arc.curvature(0.0).value, -1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_straight_arc() {
        let arc = Arc::new(pose(0.0, 0.0, 0.0), pose(0.0, 2.0, 0.0));
        assert_pose(arc.sample(0.5), pose(0.0, 1.0, 0.0));
        assert_eq!(arc.curvature(0.5).value, 0.0);
        assert_relative_eq!(arc.length().get::<meter>(), 2.0);
    }

    #[test]
    fn test_bezier() {
        assert_eq!(
            Bezier::new(&[vector(0.0, 0.0)]),
            Err(PathError::TooFewControlPoints(2))
        );
        let many = [vector(0.0, 0.0); 9];
        assert_eq!(
            Bezier::new(&many),
            Err(PathError::CapacityExceeded(MAX_CONTROL_POINTS))
        );

        let bezier = Bezier::new(&[vector(0.0, 0.0), vector(0.0, 1.0), vector(1.0, 1.0)]).unwrap();
        assert_pose(bezier.sample(0.0), pose(0.0, 0.0, 0.0));
        assert_pose(bezier.sample(1.0), pose(1.0, 1.0, 90.0));
        let mid = bezier.sample(0.5);
        assert_relative_eq!(mid.x.get::<meter>(), 0.25);
        assert_relative_eq!(mid.y.get::<meter>(), 0.75);
        assert_relative_eq!(bezier.curvature(0.0).value, 0.5, epsilon = 1e-5);
        let length = bezier.length().get::<meter>();
        assert!(length > 2.0f32.sqrt() && length < 2.0);
    }

    #[test]
    fn test_dist_steps_past_stationary_start() {
        let bezier = Bezier::new(&[
            vector(0.0, 0.0),
            vector(0.0, 0.0),
            vector(0.0, 1.0),
            vector(0.0, 2.0),
        ])
        .unwrap();
        assert_eq!(bezier.velocity(0.0).value, 0.0);
        let poses: Vec<Pose, 32> = StepBy::Dist(Length::new::<meter>(0.25)).sample(&bezier).unwrap();
        assert!(poses.len() > 4);
        assert_relative_eq!(poses[0].y.get::<meter>(), 0.0);
        assert_relative_eq!(poses[poses.len() - 1].y.get::<meter>(), 2.0, epsilon = 1e-5);
        for pair in poses.windows(2) {
            let gap = pair[0].distance_to(&pair[1].point()).get::<meter>();
            assert!(gap < 0.5);
        }
    }

    #[test]
    fn test_hermite() {
        for order in [HermiteOrder::Cubic, HermiteOrder::Quintic] {
            let hermite = Hermite::new(pose(0.0, 0.0, 0.0), pose(1.0, 1.0, 90.0), order);
            assert_pose(hermite.sample(0.0), pose(0.0, 0.0, 0.0));
            assert_pose(hermite.sample(1.0), pose(1.0, 1.0, 90.0));
            assert!(hermite.curvature(0.5).value > 0.0);
        }
        let quintic = Hermite::new(pose(0.0, 0.0, 0.0), pose(1.0, 1.0, 90.0), HermiteOrder::Quintic);
        let d = quintic.derivatives(1.0);
        assert_relative_eq!(d.second.x.value, 0.0, epsilon = 1e-3);
        assert_relative_eq!(d.second.y.value, 0.0, epsilon = 1e-3);
    }

    #[test]
    fn test_piecewise_arcs() {
        let poses = [pose(0.0, 0.0, 0.0), pose(1.0, 1.0, 90.0), pose(2.0, 0.0, 180.0)];
        let piecewise = Piecewise::<4>::arcs(&poses).unwrap();
        assert_eq!(piecewise.segments().len(), 2);
        assert_pose(piecewise.sample(0.0), poses[0]);
        assert_pose(piecewise.sample(0.5), poses[1]);
        assert_pose(piecewise.sample(1.0), poses[2]);
        assert_relative_eq!(piecewise.length().get::<meter>(), PI, epsilon = 1e-4);
        assert_relative_eq!(piecewise.curvature(0.75).value, 1.0, epsilon = 1e-5);
        // each segment covers half of t
        assert_relative_eq!(piecewise.velocity(0.25).get::<meter>(), PI, epsilon = 1e-4);

        assert_eq!(
            Piecewise::<1>::arcs(&poses),
            Err(PathError::CapacityExceeded(1))
        );
        let empty = Piecewise::<1>::default();
        assert_eq!(empty.length().value, 0.0);
    }

    #[test]
    fn test_step_by() {
        let line = Line::new(vector(0.0, 0.0), vector(0.0, 1.0));

        let poses: Vec<Pose, 8> = StepBy::Count(4).sample(&line).unwrap();
        assert_eq!(poses.len(), 5);
        assert_relative_eq!(poses[1].y.get::<meter>(), 0.25);

        let poses: Vec<Pose, 16> = StepBy::T(0.1).sample(&line).unwrap();
        assert_eq!(poses.len(), 11);

        let poses: Vec<Pose, 8> = StepBy::Dist(Length::new::<meter>(0.3)).sample(&line).unwrap();
        assert_eq!(poses.len(), 5);
        assert_relative_eq!(poses[3].y.get::<meter>(), 0.9, epsilon = 1e-5);
        assert_relative_eq!(poses[4].y.get::<meter>(), 1.0);

        assert_eq!(StepBy::Count(0).sample::<_, 8>(&line), Err(PathError::InvalidSteps));
        assert_eq!(StepBy::T(0.0).sample::<_, 8>(&line), Err(PathError::InvalidStep));
        assert_eq!(StepBy::T(1.5).sample::<_, 8>(&line), Err(PathError::InvalidStep));
        assert_eq!(
            StepBy::Dist(Length::new::<meter>(-1.0)).sample::<_, 8>(&line),
            Err(PathError::InvalidStep)
        );
        assert_eq!(
            StepBy::Count(10).sample::<_, 4>(&line),
            Err(PathError::CapacityExceeded(4))
        );
    }

    #[test]
    fn test_curve_dispatch() {
        let curve = Curve::Arc(Arc::new(pose(0.0, 0.0, 0.0), pose(1.0, 1.0, 90.0)));
        assert_relative_eq!(curve.curvature(0.2).value, 1.0, epsilon = 1e-5);
        assert_relative_eq!(curve.length().get::<meter>(), PI / 2.0, epsilon = 1e-5);
        let json = serde_json::to_string(&curve).unwrap();
        let restored: Curve = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, curve);
    }

    proptest! {
        #[test]
        fn test_bezier_hits_end_points(
            points in prop::collection::vec((-5.0f32..5.0, -5.0f32..5.0), 2..8),
            count in 1usize..16,
        ) {
            let points: std::vec::Vec<Vector> = points.into_iter().map(|(x, y)| vector(x, y)).collect();
            let bezier = Bezier::new(&points).unwrap();
            let poses: Vec<Pose, 32> = StepBy::Count(count).sample(&bezier).unwrap();
            prop_assert_eq!(poses.len(), count + 1);
            let first = poses[0].point();
            let last = poses[count].point();
            prop_assert!(first.distance(&points[0]).get::<meter>() < 1e-4);
            prop_assert!(last.distance(&points[points.len() - 1]).get::<meter>() < 1e-3);
        }
    }
}
