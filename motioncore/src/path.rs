pub mod generator;
pub mod spline;

use heapless::Vec;
#[allow(unused_imports)]
use micromath::F32Ext;
use serde::{Deserialize, Serialize};
use uom::si::{
    f32::{Angle, Length, Velocity},
    length::meter,
};

use crate::{
    error::{Annotation, PathError},
    geometry::{Curvature, Pose, Vector},
    pursuit::limits::PursuitLimits,
};

pub use self::{
    generator::{generate, generate_ramped, generate_with_headings},
    spline::{Curve, Piecewise, Spline, StepBy},
};

const SMOOTHING_ITERATIONS: usize = 10_000;

/// Ordered sequence of points.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SimplePath<const N: usize> {
    points: Vec<Vector, N>,
}

impl<const N: usize> SimplePath<N> {
    pub fn new() -> Self {
        Self { points: Vec::new() }
    }

    pub fn from_points(points: &[Vector]) -> Result<Self, PathError> {
        let mut path = Self::new();
        for point in points {
            path.push(*point)?;
        }
        Ok(path)
    }

    /// Samples `spline` into a path.
    pub fn from_spline<S: Spline + ?Sized>(spline: &S, step: StepBy) -> Result<Self, PathError> {
        let poses: Vec<Pose, N> = step.sample(spline)?;
        Ok(Self {
            points: poses.iter().map(Pose::point).collect(),
        })
    }

    pub fn push(&mut self, point: Vector) -> Result<(), PathError> {
        self.points
            .push(point)
            .map_err(|_| PathError::CapacityExceeded(N))
    }

    pub fn points(&self) -> &[Vector] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Splits every segment into `steps` pieces, keeping the final point.
    pub fn interpolate<const M: usize>(&self, steps: usize) -> Result<SimplePath<M>, PathError> {
        if steps == 0 {
            return Err(PathError::InvalidSteps);
        }
        let mut path = SimplePath::new();
        for segment in self.points.windows(2) {
            let (start, end) = (segment[0], segment[1]);
            for step in 0..steps {
                path.push(start + (end - start) * (step as f32 / steps as f32))?;
            }
        }
        if let Some(last) = self.points.last() {
            path.push(*last)?;
        }
        Ok(path)
    }

    /// Pulls interior points toward their neighbours until the total change
    /// of an iteration drops below `tolerance`. Endpoints stay fixed.
    pub fn smoothen(&self, weight: f32, tolerance: Length) -> Result<Self, PathError> {
        if !(weight > 0.0 && weight < 1.0) {
            return Err(PathError::InvalidWeight);
        }
        let data_weight = 1.0 - weight;
        let original: Vec<[f32; 2], N> = self
            .points
            .iter()
            .map(|point| [point.x.value, point.y.value])
            .collect();
        let mut smooth = original.clone();

        for _ in 0..SMOOTHING_ITERATIONS {
            let mut change = 0.0;
            for i in 1..smooth.len().saturating_sub(1) {
                for axis in 0..2 {
                    let current = smooth[i][axis];
                    let delta = data_weight * (original[i][axis] - current)
                        + weight * (smooth[i - 1][axis] + smooth[i + 1][axis] - 2.0 * current);
                    smooth[i][axis] = current + delta;
                    change += delta.abs();
                }
            }
            if change < tolerance.value {
                break;
            }
        }

        let mut path = Self::new();
        for [x, y] in smooth {
            path.push(Vector::new(Length::new::<meter>(x), Length::new::<meter>(y)))?;
        }
        Ok(path)
    }
}

/// Path point with the annotations the follower consumes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub point: Vector,
    pub curvature: Option<Curvature>,
    pub velocity: Option<Velocity>,
    /// Distance travelled along the path from its first point.
    pub distance: Option<Length>,
    pub heading: Option<Angle>,
}

impl Waypoint {
    pub fn new(point: Vector) -> Self {
        Self {
            point,
            ..Default::default()
        }
    }

    pub fn curvature(&self) -> Result<Curvature, PathError> {
        self.curvature
            .ok_or(PathError::MissingAnnotation(Annotation::Curvature))
    }

    pub fn velocity(&self) -> Result<Velocity, PathError> {
        self.velocity
            .ok_or(PathError::MissingAnnotation(Annotation::Velocity))
    }

    pub fn distance(&self) -> Result<Length, PathError> {
        self.distance
            .ok_or(PathError::MissingAnnotation(Annotation::Distance))
    }

    pub fn heading(&self) -> Result<Angle, PathError> {
        self.heading
            .ok_or(PathError::MissingAnnotation(Annotation::Heading))
    }
}

/// Annotated path ready for the pure pursuit follower.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PursuitPath<const N: usize> {
    waypoints: Vec<Waypoint, N>,
    limits: Option<PursuitLimits>,
}

impl<const N: usize> PursuitPath<N> {
    pub fn new(waypoints: Vec<Waypoint, N>, limits: Option<PursuitLimits>) -> Self {
        Self { waypoints, limits }
    }

    /// Bare path without annotations or limits.
    pub fn from_points(points: &[Vector]) -> Result<Self, PathError> {
        let mut waypoints = Vec::new();
        for point in points {
            waypoints
                .push(Waypoint::new(*point))
                .map_err(|_| PathError::CapacityExceeded(N))?;
        }
        Ok(Self::new(waypoints, None))
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    pub fn waypoints_mut(&mut self) -> &mut [Waypoint] {
        &mut self.waypoints
    }

    pub fn limits(&self) -> Option<&PursuitLimits> {
        self.limits.as_ref()
    }

    pub fn with_limits(mut self, limits: PursuitLimits) -> Self {
        self.limits = Some(limits);
        self
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn vector(x: f32, y: f32) -> Vector {
        Vector::new(Length::new::<meter>(x), Length::new::<meter>(y))
    }

    #[test]
    fn test_interpolate() {
        let path = SimplePath::<4>::from_points(&[vector(0.0, 0.0), vector(0.0, 1.0), vector(1.0, 1.0)])
            .unwrap();
        let dense: SimplePath<16> = path.interpolate(4).unwrap();
        assert_eq!(dense.len(), 9);
        assert_eq!(dense.points()[0], vector(0.0, 0.0));
        assert_eq!(dense.points()[4], vector(0.0, 1.0));
        assert_eq!(dense.points()[8], vector(1.0, 1.0));
        assert_relative_eq!(dense.points()[2].y.get::<meter>(), 0.5);
        assert_relative_eq!(dense.points()[6].x.get::<meter>(), 0.5);
    }

    #[test]
    fn test_interpolate_rejects_zero_steps() {
        let path = SimplePath::<4>::from_points(&[vector(0.0, 0.0), vector(0.0, 1.0)]).unwrap();
        assert_eq!(path.interpolate::<8>(0), Err(PathError::InvalidSteps));
    }

    #[test]
    fn test_interpolate_edge_cases() {
        let empty = SimplePath::<4>::new();
        assert!(empty.interpolate::<4>(3).unwrap().is_empty());
        let single = SimplePath::<4>::from_points(&[vector(1.0, 2.0)]).unwrap();
        assert_eq!(single.interpolate::<4>(3).unwrap().points(), &[vector(1.0, 2.0)]);
    }

    #[test]
    fn test_capacity() {
        let points = [vector(0.0, 0.0), vector(0.0, 1.0), vector(0.0, 2.0)];
        assert_eq!(
            SimplePath::<2>::from_points(&points),
            Err(PathError::CapacityExceeded(2))
        );
        let path = SimplePath::<4>::from_points(&points).unwrap();
        assert_eq!(
            path.interpolate::<4>(2).map(|path| path.len()),
            Err(PathError::CapacityExceeded(4))
        );
    }

    #[test]
    fn test_smoothen() {
        let path = SimplePath::<8>::from_points(&[
            vector(0.0, 0.0),
            vector(0.0, 1.0),
            vector(1.0, 1.0),
            vector(1.0, 2.0),
        ])
        .unwrap();
        let smooth = path.smoothen(0.5, Length::new::<meter>(1e-4)).unwrap();
        assert_eq!(smooth.len(), 4);
        assert_eq!(smooth.points()[0], vector(0.0, 0.0));
        assert_eq!(smooth.points()[3], vector(1.0, 2.0));
        // the corner is pulled inward
        assert!(smooth.points()[1].x.get::<meter>() > 0.0);
        assert!(smooth.points()[2].x.get::<meter>() < 1.0);

        assert_eq!(
            path.smoothen(1.0, Length::new::<meter>(1e-4)),
            Err(PathError::InvalidWeight)
        );
    }

    #[test]
    fn test_from_spline() {
        let arc = spline::Arc::new(
            Pose::new(Length::default(), Length::default(), Angle::default()),
            Pose::new(
                Length::new::<meter>(1.0),
                Length::new::<meter>(1.0),
                Angle::new::<uom::si::angle::degree>(90.0),
            ),
        );
        let path = SimplePath::<8>::from_spline(&arc, StepBy::Count(4)).unwrap();
        assert_eq!(path.len(), 5);
        assert_relative_eq!(path.points()[4].x.get::<meter>(), 1.0, epsilon = 1e-5);
        assert_relative_eq!(path.points()[4].y.get::<meter>(), 1.0, epsilon = 1e-5);
        assert_eq!(
            SimplePath::<4>::from_spline(&arc, StepBy::Count(4)),
            Err(PathError::CapacityExceeded(4))
        );
    }

    #[test]
    fn test_missing_annotation() {
        let waypoint = Waypoint::new(vector(0.0, 0.0));
        assert_eq!(
            waypoint.velocity(),
            Err(PathError::MissingAnnotation(Annotation::Velocity))
        );
        assert_eq!(
            waypoint.heading(),
            Err(PathError::MissingAnnotation(Annotation::Heading))
        );
        let path = PursuitPath::<4>::from_points(&[vector(0.0, 0.0)]).unwrap();
        assert!(path.limits().is_none());
    }

    #[test]
    fn test_path_json_round_trip() {
        let path = SimplePath::<4>::from_points(&[vector(0.0, 0.5), vector(1.0, 2.0)]).unwrap();
        let json = serde_json::to_string(&path).unwrap();
        let restored: SimplePath<4> = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, path);
    }
}
