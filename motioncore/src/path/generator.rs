use heapless::Vec;
#[allow(unused_imports)]
use micromath::F32Ext;
use uom::si::{
    f32::{Angle, Length, Velocity},
    velocity::meter_per_second,
};

use super::{PursuitPath, Waypoint};
use crate::{
    error::PathError,
    geometry::{curvature, Curvature, Pose, Vector},
    pursuit::limits::PursuitLimits,
};

/// Annotates `points` with curvature, distance, heading and the fastest
/// velocity that can still slow down to `final_vel` through every curve.
pub fn generate<const N: usize>(
    points: &[Vector],
    limits: &PursuitLimits,
) -> Result<PursuitPath<N>, PathError> {
    build(points.iter().map(|point| (*point, None)), limits, false)
}

/// Like [`generate`], and additionally ramps the start up from `min_vel` at
/// `accel`.
pub fn generate_ramped<const N: usize>(
    points: &[Vector],
    limits: &PursuitLimits,
) -> Result<PursuitPath<N>, PathError> {
    build(points.iter().map(|point| (*point, None)), limits, true)
}

/// Like [`generate`] but keeps each pose's heading as the heading annotation.
pub fn generate_with_headings<const N: usize>(
    poses: &[Pose],
    limits: &PursuitLimits,
) -> Result<PursuitPath<N>, PathError> {
    build(
        poses.iter().map(|pose| (pose.point(), Some(pose.theta))),
        limits,
        false,
    )
}

fn build<const N: usize, I>(
    points: I,
    limits: &PursuitLimits,
    ramp_up: bool,
) -> Result<PursuitPath<N>, PathError>
where
    I: Iterator<Item = (Vector, Option<Angle>)>,
{
    limits.validate()?;
    let mut waypoints: Vec<Waypoint, N> = Vec::new();
    for (point, heading) in points {
        waypoints
            .push(Waypoint {
                heading,
                ..Waypoint::new(point)
            })
            .map_err(|_| PathError::CapacityExceeded(N))?;
    }

    if !waypoints.is_empty() {
        set_curvatures(&mut waypoints);
        set_distances(&mut waypoints);
        set_headings(&mut waypoints);
        set_max_velocity(&mut waypoints, limits);
        if ramp_up {
            set_min_velocity(&mut waypoints, limits);
        }
    }
    Ok(PursuitPath::new(waypoints, Some(*limits)))
}

/// Signed curvature of the circle through three points, 0 when they are
/// colinear or coincide.
pub fn calculate_curvature(prev: &Vector, point: &Vector, next: &Vector) -> Curvature {
    let a = prev.distance(point).value;
    let b = point.distance(next).value;
    let c = next.distance(prev).value;
    let first = *point - *prev;
    let second = *next - *point;
    // twice the signed triangle area, positive for left turns
    let cross = first.x.value * second.y.value - first.y.value * second.x.value;
    let product = a * b * c;
    // r = abc / 4A
    let value = -2.0 * cross / product;
    if product == 0.0 || !value.is_normal() {
        curvature(0.0)
    } else {
        curvature(value)
    }
}

fn set_curvatures(waypoints: &mut [Waypoint]) {
    let len = waypoints.len();
    for i in 0..len {
        let value = if i == 0 || i == len - 1 {
            curvature(0.0)
        } else {
            calculate_curvature(
                &waypoints[i - 1].point,
                &waypoints[i].point,
                &waypoints[i + 1].point,
            )
        };
        waypoints[i].curvature = Some(value);
    }
}

fn set_distances(waypoints: &mut [Waypoint]) {
    let mut total = Length::default();
    let mut prev = waypoints[0].point;
    for waypoint in waypoints.iter_mut() {
        total += prev.distance(&waypoint.point);
        prev = waypoint.point;
        waypoint.distance = Some(total);
    }
}

// fills in missing headings with the direction of travel
fn set_headings(waypoints: &mut [Waypoint]) {
    let len = waypoints.len();
    if len < 2 {
        return;
    }
    for i in 0..len {
        if waypoints[i].heading.is_some() {
            continue;
        }
        let (from, to) = if i + 1 < len { (i, i + 1) } else { (i - 1, i) };
        waypoints[i].heading = Some(waypoints[from].point.angle(&waypoints[to].point));
    }
}

fn reachable(next: Velocity, rate: f32, distance: Length) -> Velocity {
    let next = next.get::<meter_per_second>();
    Velocity::new::<meter_per_second>((next * next + 2.0 * rate * distance.value).sqrt())
}

fn min(a: Velocity, b: Velocity) -> Velocity {
    if a < b {
        a
    } else {
        b
    }
}

fn max(a: Velocity, b: Velocity) -> Velocity {
    if a > b {
        a
    } else {
        b
    }
}

fn set_max_velocity(waypoints: &mut [Waypoint], limits: &PursuitLimits) {
    let last = waypoints.len() - 1;
    waypoints[last].velocity = Some(limits.final_vel);
    let decel = limits.decel.value;
    for i in (0..last).rev() {
        let next = waypoints[i + 1].velocity.unwrap_or(limits.final_vel);
        let distance = waypoints[i].point.distance(&waypoints[i + 1].point);
        let wanted = limits.cornering_velocity(waypoints[i].curvature.unwrap_or_default());
        waypoints[i].velocity = Some(min(wanted, reachable(next, decel, distance)));
    }
}

fn set_min_velocity(waypoints: &mut [Waypoint], limits: &PursuitLimits) {
    let last = waypoints.len() - 1;
    if last == 0 {
        return;
    }
    let first = waypoints[0].velocity.unwrap_or(limits.min_vel);
    waypoints[0].velocity = Some(min(first, limits.min_vel));
    let accel = limits.accel.value;
    for i in 1..last {
        let prev = waypoints[i - 1].velocity.unwrap_or(limits.min_vel);
        let distance = waypoints[i - 1].point.distance(&waypoints[i].point);
        let backward = waypoints[i].velocity.unwrap_or(limits.max_vel);
        // the deceleration bound wins over the minimum velocity
        let ramped = max(limits.min_vel, reachable(prev, accel, distance));
        waypoints[i].velocity = Some(min(backward, ramped));
    }
}
