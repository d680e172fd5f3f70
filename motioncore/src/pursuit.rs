pub mod limits;
pub mod unicycle;

use core::f32::consts::PI;

use log::{debug, info, warn};
#[allow(unused_imports)]
use micromath::F32Ext;
use typed_builder::TypedBuilder;
use uom::si::{
    angle::degree,
    angular_velocity::revolution_per_second,
    f32::{Angle, AngularVelocity, Length, Time, Velocity},
    length::meter,
    time::millisecond,
    velocity::meter_per_second,
};

use self::limits::PursuitLimits;
use crate::{
    drive::{strafe_vector, Chassis, MotorMode, XChassis},
    error::PursuitError,
    geometry::{curvature, normalize_angle_180, normalize_angle_90, Curvature, Pose, Vector},
    odometry::{ChassisScales, EncoderModel, Odometry},
    path::{PursuitPath, Waypoint},
    pid::PidController,
    settle::Exit,
    time::{Cancellation, Clock},
    utils::SideData,
};

const INTERSECT_TOLERANCE: f32 = 1e-5;

/// Search state of one path traversal. Indices only move forward until
/// [`PursuitState::reset`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PursuitState {
    pub last_closest: Option<usize>,
    pub last_look_index: usize,
    pub last_look_t: f32,
}

impl PursuitState {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Index of the waypoint nearest `pos`, searched from the last closest
    /// point up to one past the lookahead segment, or to the end once the
    /// last point is within `lookahead`.
    pub fn find_closest(&mut self, path: &[Waypoint], pos: &Vector, lookahead: Length) -> usize {
        let start = self.last_closest.unwrap_or(0);
        let end = match path.last() {
            Some(last) if pos.distance(&last.point) > lookahead => {
                (self.last_look_index + 2).min(path.len())
            }
            _ => path.len(),
        };

        let mut closest = start;
        let mut closest_distance = f32::MAX;
        for (i, waypoint) in path.iter().enumerate().take(end).skip(start) {
            let distance = pos.distance(&waypoint.point).value;
            if distance < closest_distance {
                closest_distance = distance;
                closest = i;
            }
        }
        self.last_closest = Some(closest);
        closest
    }

    /// Intersection of the lookahead circle with the path that lies furthest
    /// along it, never behind the previous one.
    pub fn find_lookahead_point(&mut self, path: &[Waypoint], pos: &Vector, lookahead: Length) -> Vector {
        let len = path.len();
        if len < 2 {
            return path.first().map_or(*pos, |waypoint| waypoint.point);
        }

        // starting inside the lookahead of the end would only find
        // intersections behind the robot
        if self.last_closest.is_none() && pos.distance(&path[len - 1].point) < lookahead {
            self.last_closest = Some(len - 2);
            self.last_look_index = len - 2;
            self.last_look_t = 1.0;
        }

        let start = self.last_look_index.max(self.last_closest.unwrap_or(0));
        let mut first_hit: Option<usize> = None;
        for i in start..len - 1 {
            let segment_start = path[i].point;
            let segment_end = path[i + 1].point;
            if let Some(t) = find_intersect_t(&segment_start, &segment_end, pos, lookahead) {
                if i > self.last_look_index || t > self.last_look_t {
                    self.last_look_index = i;
                    self.last_look_t = t;
                    if first_hit.is_some() {
                        break;
                    }
                    first_hit = Some(i);
                }
            }
            if let Some(hit) = first_hit {
                if path[i].point.distance(&path[hit].point) >= lookahead * 2.0 {
                    break;
                }
            }
        }

        let start = path[self.last_look_index].point;
        let end = path[self.last_look_index + 1].point;
        start + (end - start) * self.last_look_t
    }
}

/// Fraction along `start -> end` where the segment crosses the circle of
/// `radius` around `pos`. The crossing further along the segment wins.
pub fn find_intersect_t(start: &Vector, end: &Vector, pos: &Vector, radius: Length) -> Option<f32> {
    let d = *end - *start;
    let f = *start - *pos;
    let a = d.dot(&d);
    if a == 0.0 {
        return None;
    }
    let b = 2.0 * d.dot(&f);
    let radius = radius.get::<meter>();
    let c = f.dot(&f) - radius * radius;
    let discriminant = b * b - 4.0 * a * c;
    if discriminant < 0.0 {
        return None;
    }
    let root = discriminant.sqrt();
    let t1 = (-b - root) / (2.0 * a);
    let t2 = (-b + root) / (2.0 * a);
    let within = |t: f32| (-INTERSECT_TOLERANCE..=1.0 + INTERSECT_TOLERANCE).contains(&t);
    [t2, t1]
        .into_iter()
        .find(|t| within(*t))
        .map(|t| t.clamp(0.0, 1.0))
}

/// Signed curvature of the arc from `state` through `look`, positive when
/// the point lies to the right.
pub fn calculate_curvature(state: &Pose, look: &Vector) -> Curvature {
    let diff = *look - state.point();
    let (sin, cos) = (state.theta.value.sin(), state.theta.value.cos());
    let lateral = diff.x.value * cos - diff.y.value * sin;
    let length_squared = diff.dot(&diff);
    if length_squared == 0.0 {
        curvature(0.0)
    } else {
        curvature(2.0 * lateral / length_squared)
    }
}

/// Side velocities of a differential drive following `curvature` at
/// `velocity`, each clamped to `max_vel`.
pub fn calculate_velocity(
    velocity: Velocity,
    curvature: Curvature,
    track: Length,
    max_vel: Velocity,
) -> SideData<Velocity> {
    let turn = track.get::<meter>() * curvature.value;
    let clamp = |side: Velocity| {
        if side > max_vel {
            max_vel
        } else if side < -max_vel {
            -max_vel
        } else {
            side
        }
    };
    SideData {
        left: clamp(velocity * (2.0 + turn) / 2.0),
        right: clamp(velocity * (2.0 - turn) / 2.0),
    }
}

/// Angular velocity of a wheel of `diameter` rolling at `velocity`.
pub fn wheel_speed(velocity: Velocity, diameter: Length) -> AngularVelocity {
    AngularVelocity::new::<revolution_per_second>(
        velocity.get::<meter_per_second>() / (PI * diameter.get::<meter>()),
    )
}

/// Velocity to command this cycle: the cornering limit applied to `base`,
/// floored at `min_vel` and ramped up from `last` no faster than `accel`.
pub fn target_velocity(
    base: Velocity,
    curvature: Curvature,
    limits: &PursuitLimits,
    last: Velocity,
    dt: Time,
) -> Velocity {
    let mut target = base;
    if let (Some(k), bend) = (limits.k, curvature.value.abs()) {
        if bend > 0.0 {
            let cornering = Velocity::new::<meter_per_second>(k.value / bend);
            if cornering < target {
                target = cornering;
            }
        }
    }
    if target < limits.min_vel {
        target = limits.min_vel;
    }
    let ramp = Velocity::new::<meter_per_second>(last.value + limits.accel.value * dt.value);
    if target > ramp {
        ramp
    } else {
        target
    }
}

/// Pure pursuit follower.
///
/// `scales` describes the driven wheels; `gearset` is their free speed, so
/// wheel commands are fractions of it. Setting `drive_radius` makes tank
/// runs finish with a straight approach to the last waypoint.
#[derive(TypedBuilder)]
pub struct PathFollower<'a, C, M, K> {
    chassis: C,
    odometry: &'a Odometry<M>,
    clock: K,
    scales: ChassisScales,
    lookahead: Length,
    gearset: AngularVelocity,
    #[builder(default = MotorMode::Velocity)]
    mode: MotorMode,
    #[builder(default = Time::new::<millisecond>(10.0))]
    period: Time,
    #[builder(default, setter(strip_option))]
    drive_radius: Option<Length>,
    #[builder(default, setter(strip_option))]
    cancellation: Option<&'a Cancellation>,
    #[builder(default, setter(skip))]
    session: PursuitState,
}

// a traversal step: closest index, on-path flag, the steering target and
// the lookahead intersection it was derived from
struct Tracking {
    closest: usize,
    on_path: bool,
    look: Vector,
    intersection: Vector,
}

impl<'a, C, M, K> PathFollower<'a, C, M, K>
where
    C: Chassis,
    M: EncoderModel,
    K: Clock,
{
    pub fn session(&self) -> &PursuitState {
        &self.session
    }

    pub fn chassis(&mut self) -> &mut C {
        &mut self.chassis
    }

    fn is_cancelled(&self) -> bool {
        self.cancellation.map_or(false, Cancellation::is_cancelled)
    }

    fn check<const N: usize>(path: &PursuitPath<N>) -> Result<PursuitLimits, PursuitError> {
        if path.len() < 2 {
            return Err(PursuitError::PathTooShort);
        }
        let limits = *path.limits().ok_or(PursuitError::MissingLimits)?;
        limits.validate()?;
        for waypoint in path.waypoints() {
            waypoint.velocity()?;
        }
        Ok(limits)
    }

    fn track(&mut self, path: &[Waypoint], pos: &Vector) -> Tracking {
        let closest = self.session.find_closest(path, pos, self.lookahead);
        let intersection = self.session.find_lookahead_point(path, pos, self.lookahead);
        let on_path = pos.distance(&path[closest].point) <= self.lookahead;
        // off the path the lookahead point may be far away, steer toward its
        // projection onto the lookahead circle instead
        let look = if on_path {
            intersection
        } else {
            *pos + (intersection - *pos).normalize() * self.lookahead.get::<meter>()
        };
        Tracking {
            closest,
            on_path,
            look,
            intersection,
        }
    }

    // side velocities as fractions of the gearset, scaled down together
    fn wheel_command(&self, sides: SideData<Velocity>) -> SideData<f32> {
        let diameter = self.scales.wheel_diameter;
        let gearset = self.gearset.get::<revolution_per_second>();
        let command = sides.map(|side| wheel_speed(side, diameter).get::<revolution_per_second>() / gearset);
        let max = command.left.abs().max(command.right.abs());
        if max > 1.0 {
            command.map(|side| side / max)
        } else {
            command
        }
    }

    fn finish(&mut self, exit: Exit) -> Exit {
        self.chassis.stop();
        match exit {
            Exit::Cancelled => info!("path following cancelled"),
            Exit::Stalled => warn!("path following stalled"),
            Exit::Settled | Exit::Excepted => info!("path finished"),
        }
        exit
    }

    // the lookahead point, the robot and the closest waypoint are all near the end
    fn near_end(&self, tracking: &Tracking, path: &[Waypoint], pos: &Vector) -> bool {
        let end = path[path.len() - 1].point;
        self.drive_radius.map_or(false, |radius| {
            [tracking.intersection, *pos, path[tracking.closest].point]
                .iter()
                .all(|point| point.distance(&end) < radius)
        })
    }

    /// Drives along `path`, in reverse when `backwards` is set. The velocity
    /// ramps up from `start_speed`, or from `min_vel` when there is none.
    ///
    /// Without a drive radius the run ends once the closest waypoint is the
    /// last one. With one, the follower drives straight at the end once
    /// within the radius, turning onto the heading of the final segment, and
    /// stops after passing it.
    pub fn follow_path<const N: usize>(
        &mut self,
        path: &PursuitPath<N>,
        backwards: bool,
        start_speed: Option<Velocity>,
    ) -> Result<Exit, PursuitError> {
        let limits = Self::check(path)?;
        let waypoints = path.waypoints();
        let last = waypoints.len() - 1;
        let end = waypoints[last].point;
        let mut exit_heading = waypoints[last - 1].point.angle(&end);
        if backwards {
            exit_heading += Angle::new::<degree>(180.0);
        }
        self.session.reset();
        info!(
            "following path of {} waypoints{}",
            waypoints.len(),
            if backwards { " backwards" } else { "" }
        );

        let right_angle = Angle::new::<degree>(90.0);
        let mut last_velocity = start_speed.unwrap_or(limits.min_vel);
        let mut last_time = self.clock.now();
        let exit = loop {
            if self.is_cancelled() {
                break Exit::Cancelled;
            }
            let state = self.odometry.state();
            let pos = state.point();
            let tracking = self.track(waypoints, &pos);
            let near_end = self.near_end(&tracking, waypoints, &pos);
            let angle_to_end = state.angle_to(&end).abs();
            let past_end = if backwards {
                angle_to_end < right_angle
            } else {
                angle_to_end > right_angle
            };
            let finished = match self.drive_radius {
                Some(_) => past_end && near_end,
                None => tracking.closest >= last,
            };
            if finished {
                break Exit::Settled;
            }

            let curvature = if near_end {
                curvature(0.0)
            } else {
                calculate_curvature(&state, &tracking.look)
            };
            let base = if tracking.on_path {
                waypoints[tracking.closest].velocity()?
            } else {
                limits.max_vel
            };
            let now = self.clock.now();
            let velocity = target_velocity(base, curvature, &limits, last_velocity, now - last_time);
            last_time = now;
            last_velocity = velocity;

            let track = self.scales.wheel_track;
            let mut sides = calculate_velocity(velocity, curvature, track, limits.max_vel);
            // near the end, back up onto it if it has been overshot
            let reverse = if near_end { angle_to_end > right_angle } else { backwards };
            if reverse {
                sides = sides.map(|side| -side);
            }
            if near_end {
                let error = normalize_angle_90(exit_heading - state.theta);
                let distance = pos.distance(&tracking.intersection);
                if distance.value > 0.0 && velocity.value > 0.0 {
                    // rotation that reaches the exit heading by the lookahead point
                    let rotation = error.value * velocity.value / distance.value;
                    let turn = Velocity::new::<meter_per_second>(rotation * track.get::<meter>() / 2.0);
                    sides.left += turn;
                    sides.right -= turn;
                }
            }

            let command = self.wheel_command(sides);
            debug!(
                "closest {} velocity {:.3} m/s curvature {:.3}{}",
                tracking.closest,
                velocity.get::<meter_per_second>(),
                curvature.value,
                if near_end { " near end" } else { "" }
            );
            self.chassis.drive(command, self.mode);
            self.clock.delay_until(self.period);
        };
        Ok(self.finish(exit))
    }
}

impl<'a, C, M, K> PathFollower<'a, C, M, K>
where
    C: XChassis,
    M: EncoderModel,
    K: Clock,
{
    /// Strafes along `path` while `turn_pid` holds the heading annotation of
    /// the closest waypoint.
    pub fn follow_path_x<const N: usize>(
        &mut self,
        path: &PursuitPath<N>,
        turn_pid: &mut PidController,
    ) -> Result<Exit, PursuitError> {
        let limits = Self::check(path)?;
        let waypoints = path.waypoints();
        for waypoint in waypoints {
            waypoint.heading()?;
        }
        let last = waypoints.len() - 1;
        self.session.reset();
        turn_pid.reset();
        info!("strafing along path of {} waypoints", waypoints.len());

        let gearset = self.gearset.get::<revolution_per_second>();
        let mut last_velocity = limits.min_vel;
        let mut last_time = self.clock.now();
        let exit = loop {
            if self.is_cancelled() {
                break Exit::Cancelled;
            }
            let state = self.odometry.state();
            let pos = state.point();
            let tracking = self.track(waypoints, &pos);
            if tracking.closest >= last {
                break Exit::Settled;
            }

            let closest = &waypoints[tracking.closest];
            let base = if tracking.on_path {
                closest.velocity()?
            } else {
                limits.max_vel
            };
            let now = self.clock.now();
            let velocity = target_velocity(base, curvature(0.0), &limits, last_velocity, now - last_time);
            last_time = now;
            last_velocity = velocity;

            let heading_error = normalize_angle_180(closest.heading()? - state.theta);
            let yaw = turn_pid.step(heading_error.get::<degree>());
            let speed = wheel_speed(velocity, self.scales.wheel_diameter).get::<revolution_per_second>() / gearset;
            let direction = state.angle_to(&tracking.look);
            self.chassis.drive_x(strafe_vector(speed, yaw, direction), self.mode);
            self.clock.delay_until(self.period);
        };
        Ok(self.finish(exit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        odometry::SensorValues,
        path::generate,
        pid::PidGains,
        utils::XDriveData,
    };
    use approx::assert_relative_eq;
    use proptest::prelude::*;
    use uom::si::{
        acceleration::meter_per_second_squared,
        angle::degree,
        angular_velocity::revolution_per_minute,
        f32::{Acceleration, Angle},
        length::{foot, inch},
        time::second,
    };

    fn vector(x: f32, y: f32) -> Vector {
        Vector::new(Length::new::<meter>(x), Length::new::<meter>(y))
    }

    fn waypoints(points: &[(f32, f32)]) -> std::vec::Vec<Waypoint> {
        points.iter().map(|&(x, y)| Waypoint::new(vector(x, y))).collect()
    }

    fn mps(value: f32) -> Velocity {
        Velocity::new::<meter_per_second>(value)
    }

    #[test]
    fn test_find_closest() {
        let path: std::vec::Vec<Waypoint> = (0..5)
            .map(|i| {
                let ft = Length::new::<foot>(i as f32);
                Waypoint::new(Vector::new(ft, ft))
            })
            .collect();
        let lookahead = Length::new::<inch>(6.0);
        let mut state = PursuitState {
            last_look_index: 4,
            ..Default::default()
        };
        let query = |x: f32, y: f32| Vector::new(Length::new::<foot>(x), Length::new::<foot>(y));

        let test_cases = vec![((1.0, 1.0), 1), ((0.0, 0.0), 1), ((3.0, 3.3), 3), ((6.0, 6.0), 4), ((0.0, 0.0), 4)];
        for ((x, y), expected) in test_cases {
            assert_eq!(state.find_closest(&path, &query(x, y), lookahead), expected);
        }
    }

    #[test]
    fn test_find_lookahead_point() {
        let path = waypoints(&[(0.0, 0.0), (0.0, 1.0), (0.0, 2.0), (0.0, 3.0), (0.0, 4.0)]);
        let lookahead = Length::new::<meter>(0.5);
        let mut state = PursuitState::default();

        let test_cases = vec![(1.0, 1.5), (1.0, 1.5), (2.0, 2.5), (0.0, 2.5), (3.5, 4.0), (4.0, 4.0), (2.0, 4.0)];
        for (y, expected) in test_cases {
            let look = state.find_lookahead_point(&path, &vector(0.0, y), lookahead);
            assert_relative_eq!(look.x.get::<meter>(), 0.0);
            assert_relative_eq!(look.y.get::<meter>(), expected, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_lookahead_jumps_to_end_when_starting_near_it() {
        let path = waypoints(&[(0.0, 0.0), (0.0, 1.0), (0.0, 2.0)]);
        let mut state = PursuitState::default();
        let look = state.find_lookahead_point(&path, &vector(0.0, 1.8), Length::new::<meter>(0.5));
        assert_relative_eq!(look.y.get::<meter>(), 2.0);
        assert_eq!(state.last_closest, Some(1));
    }

    #[test]
    fn test_find_intersect_t() {
        let start = vector(0.0, 0.0);
        let end = vector(0.0, 1.0);
        let radius = Length::new::<meter>(0.5);
        assert_relative_eq!(find_intersect_t(&start, &end, &vector(0.0, 0.5), radius).unwrap(), 1.0);
        assert_relative_eq!(find_intersect_t(&start, &end, &vector(0.0, 0.0), radius).unwrap(), 0.5);
        assert_eq!(find_intersect_t(&start, &end, &vector(2.0, 0.5), radius), None);
        assert_eq!(find_intersect_t(&start, &start, &vector(0.0, 0.0), radius), None);
    }

    #[test]
    fn test_calculate_curvature() {
        let pose = |theta: f32| Pose::new(Length::default(), Length::default(), Angle::new::<degree>(theta));
        let point = |x: f32, y: f32| Vector::new(Length::new::<inch>(x), Length::new::<inch>(y));

        let straight = vec![
            (0.0, (0.0, 5.0)),
            (90.0, (5.0, 0.0)),
            (90.0, (-5.0, 0.0)),
            (45.0, (5.0, 5.0)),
            (45.0, (-5.0, -5.0)),
            (-45.0, (-5.0, 5.0)),
        ];
        for (theta, (x, y)) in straight {
            assert!(calculate_curvature(&pose(theta), &point(x, y)).value.abs() < 1e-4);
        }

        let right = calculate_curvature(&pose(45.0), &point(10.0, 5.0));
        assert!(right.value > 2.0);
        let left = calculate_curvature(&pose(200.0), &point(10.0, 5.0));
        assert!(left.value < -4.0);
        assert_eq!(calculate_curvature(&pose(0.0), &Vector::default()).value, 0.0);
    }

    #[test]
    fn test_calculate_velocity() {
        let diameter = Length::new::<meter>(1.0 / PI);
        let track = Length::new::<meter>(10.0);

        let straight = calculate_velocity(mps(1.0), curvature(0.0), track, mps(10.0));
        assert_relative_eq!(
            wheel_speed(straight.left, diameter).get::<revolution_per_minute>(),
            60.0,
            epsilon = 1e-3
        );
        assert_relative_eq!(
            wheel_speed(straight.right, diameter).get::<revolution_per_minute>(),
            60.0,
            epsilon = 1e-3
        );

        let curved = calculate_velocity(mps(1.0), curvature(1.0), track, mps(10.0));
        assert!(curved.left > mps(1.0));
        assert!(curved.right < mps(1.0));

        let clamped = calculate_velocity(mps(1.0), curvature(1.0), track, mps(2.0));
        assert_eq!(clamped.left, mps(2.0));
        assert_eq!(clamped.right, mps(-2.0));
    }

    #[test]
    fn test_target_velocity() {
        let limits = PursuitLimits::new(
            mps(0.2),
            Acceleration::new::<meter_per_second_squared>(1.0),
            mps(2.0),
            Some(mps(0.5)),
        );
        let dt = Time::new::<second>(0.1);
        // ramp from the last command
        assert_relative_eq!(
            target_velocity(mps(2.0), curvature(0.0), &limits, mps(0.5), dt).get::<meter_per_second>(),
            0.6,
            epsilon = 1e-5
        );
        // cornering limit
        assert_relative_eq!(
            target_velocity(mps(2.0), curvature(1.0), &limits, mps(2.0), dt).get::<meter_per_second>(),
            0.5,
            epsilon = 1e-5
        );
        // floor at min_vel
        assert_relative_eq!(
            target_velocity(mps(0.0), curvature(0.0), &limits, mps(1.0), dt).get::<meter_per_second>(),
            0.2,
            epsilon = 1e-5
        );
    }

    struct FixedModel;

    impl EncoderModel for FixedModel {
        fn sensor_values(&self) -> SensorValues {
            let mut values = SensorValues::new();
            values.extend_from_slice(&[0, 0]).unwrap();
            values
        }

        fn reset_sensors(&self) {}
    }

    #[derive(Default)]
    struct Recorder {
        commands: std::vec::Vec<SideData<f32>>,
        wheels: std::vec::Vec<XDriveData<f32>>,
    }

    impl Chassis for Recorder {
        fn drive(&mut self, command: SideData<f32>, _mode: MotorMode) {
            self.commands.push(command);
        }
    }

    impl XChassis for Recorder {
        fn drive_x(&mut self, command: XDriveData<f32>, _mode: MotorMode) {
            self.wheels.push(command);
        }
    }

    // cancels `token` after `after` periods
    #[derive(Default)]
    struct StepClock<'t> {
        now: f32,
        delays: usize,
        stop: Option<(usize, &'t Cancellation)>,
    }

    impl<'t> StepClock<'t> {
        fn cancelling(after: usize, token: &'t Cancellation) -> Self {
            Self {
                stop: Some((after, token)),
                ..Default::default()
            }
        }
    }

    impl Clock for StepClock<'_> {
        fn now(&self) -> Time {
            Time::new::<second>(self.now)
        }

        fn delay_until(&mut self, period: Time) {
            self.now += period.get::<second>();
            self.delays += 1;
            if let Some((after, token)) = self.stop {
                if self.delays >= after {
                    token.cancel();
                }
            }
        }
    }

    fn scales() -> ChassisScales {
        ChassisScales::builder()
            .wheel_diameter(Length::new::<inch>(4.0))
            .wheel_track(Length::new::<inch>(10.0))
            .ticks_per_rev(360.0)
            .build()
    }

    fn limits() -> PursuitLimits {
        PursuitLimits::new(
            mps(0.1),
            Acceleration::new::<meter_per_second_squared>(0.5),
            mps(1.0),
            Some(mps(1.0)),
        )
    }

    fn follower<'a, 't>(
        odometry: &'a Odometry<FixedModel>,
        chassis: &'a mut Recorder,
        clock: &'a mut StepClock<'t>,
        cancellation: &'a Cancellation,
    ) -> PathFollower<'a, &'a mut Recorder, FixedModel, &'a mut StepClock<'t>> {
        PathFollower::builder()
            .chassis(chassis)
            .odometry(odometry)
            .clock(clock)
            .scales(scales())
            .lookahead(Length::new::<inch>(6.0))
            .gearset(AngularVelocity::new::<revolution_per_minute>(200.0))
            .cancellation(cancellation)
            .build()
    }

    #[test]
    fn test_rejects_unusable_paths() {
        let odometry = Odometry::new(FixedModel, scales()).unwrap();
        let mut chassis = Recorder::default();
        let mut clock = StepClock::default();
        let token = Cancellation::new();
        let mut follower = follower(&odometry, &mut chassis, &mut clock, &token);

        let short: PursuitPath<4> = generate(&[vector(0.0, 0.0)], &limits()).unwrap();
        assert_eq!(follower.follow_path(&short, false, None), Err(PursuitError::PathTooShort));

        let bare = PursuitPath::<4>::from_points(&[vector(0.0, 0.0), vector(0.0, 1.0)]).unwrap();
        assert_eq!(follower.follow_path(&bare, false, None), Err(PursuitError::MissingLimits));

        let unannotated = bare.with_limits(limits());
        assert_eq!(
            follower.follow_path(&unannotated, false, None),
            Err(PursuitError::Path(crate::error::PathError::MissingAnnotation(
                crate::error::Annotation::Velocity
            )))
        );
        drop(follower);
        assert!(chassis.commands.is_empty());
    }

    #[test]
    fn test_already_at_the_end() {
        let odometry = Odometry::new(FixedModel, scales()).unwrap();
        odometry.set_state(Pose::new(Length::default(), Length::new::<meter>(1.0), Angle::default()));
        let mut chassis = Recorder::default();
        let mut clock = StepClock::default();
        let token = Cancellation::new();
        let path: PursuitPath<4> = generate(&[vector(0.0, 0.0), vector(0.0, 1.0)], &limits()).unwrap();
        let exit = follower(&odometry, &mut chassis, &mut clock, &token).follow_path(&path, false, None);
        assert_eq!(exit, Ok(Exit::Settled));
        assert_eq!(chassis.commands, vec![SideData::default()]);
    }

    #[test]
    fn test_drives_forward_and_ramps() {
        let odometry = Odometry::new(FixedModel, scales()).unwrap();
        let mut chassis = Recorder::default();
        let token = Cancellation::new();
        // the odometry never moves, so the clock cancels the run
        let mut clock = StepClock::cancelling(20, &token);
        let points: std::vec::Vec<Vector> = (0..11).map(|i| vector(0.0, i as f32 * 0.1)).collect();
        let path: PursuitPath<16> = generate(&points, &limits()).unwrap();

        let mut follower = follower(&odometry, &mut chassis, &mut clock, &token);
        assert_eq!(follower.follow_path(&path, false, None), Ok(Exit::Cancelled));
        assert_eq!(follower.session().last_closest, Some(0));
        drop(follower);

        assert_eq!(chassis.commands.len(), 21);
        let forward = &chassis.commands[..20];
        assert!(forward[0].left > 0.0);
        assert!(forward.iter().all(|command| command.left == command.right));
        assert!(forward.windows(2).all(|pair| pair[1].left > pair[0].left));
        assert_eq!(chassis.commands.last().copied(), Some(SideData::default()));
    }

    #[test]
    fn test_backwards_negates_both_sides() {
        let odometry = Odometry::new(FixedModel, scales()).unwrap();
        let mut chassis = Recorder::default();
        let token = Cancellation::new();
        let mut clock = StepClock::cancelling(5, &token);
        let points: std::vec::Vec<Vector> = (0..11).map(|i| vector(0.0, i as f32 * -0.1)).collect();
        let path: PursuitPath<16> = generate(&points, &limits()).unwrap();

        let exit = follower(&odometry, &mut chassis, &mut clock, &token).follow_path(&path, true, None);
        assert_eq!(exit, Ok(Exit::Cancelled));
        let reverse = &chassis.commands[..5];
        assert!(reverse.iter().all(|command| command.left < 0.0));
        assert!(reverse.iter().all(|command| command.left == command.right));
    }

    #[test]
    fn test_start_speed_seeds_the_ramp() {
        let odometry = Odometry::new(FixedModel, scales()).unwrap();
        let mut chassis = Recorder::default();
        let token = Cancellation::new();
        let mut clock = StepClock::cancelling(1, &token);
        let points: std::vec::Vec<Vector> = (0..11).map(|i| vector(0.0, i as f32 * 0.1)).collect();
        let path: PursuitPath<16> = generate(&points, &limits()).unwrap();

        let exit = follower(&odometry, &mut chassis, &mut clock, &token)
            .follow_path(&path, false, Some(mps(0.5)));
        assert_eq!(exit, Ok(Exit::Cancelled));
        // 0.5 m/s on 4 inch wheels against a 200 rpm gearset
        let expected = 0.5 / (PI * 0.1016) / (200.0 / 60.0);
        assert_relative_eq!(chassis.commands[0].left, expected, epsilon = 1e-4);
        assert_relative_eq!(chassis.commands[0].right, expected, epsilon = 1e-4);
    }

    fn follower_with_radius<'a, 't>(
        odometry: &'a Odometry<FixedModel>,
        chassis: &'a mut Recorder,
        clock: &'a mut StepClock<'t>,
        cancellation: &'a Cancellation,
        radius: f32,
    ) -> PathFollower<'a, &'a mut Recorder, FixedModel, &'a mut StepClock<'t>> {
        PathFollower::builder()
            .chassis(chassis)
            .odometry(odometry)
            .clock(clock)
            .scales(scales())
            .lookahead(Length::new::<inch>(6.0))
            .gearset(AngularVelocity::new::<revolution_per_minute>(200.0))
            .drive_radius(Length::new::<meter>(radius))
            .cancellation(cancellation)
            .build()
    }

    #[test]
    fn test_end_approach_turns_onto_exit_heading() {
        let odometry = Odometry::new(FixedModel, scales()).unwrap();
        let mut chassis = Recorder::default();
        let token = Cancellation::new();
        let mut clock = StepClock::cancelling(1, &token);
        let path: PursuitPath<4> =
            generate(&[vector(0.0, 0.0), vector(0.0, 0.1), vector(0.1, 0.2)], &limits()).unwrap();

        let exit = follower_with_radius(&odometry, &mut chassis, &mut clock, &token, 0.3)
            .follow_path(&path, false, None);
        assert_eq!(exit, Ok(Exit::Cancelled));
        // 45 degrees of error closed over the 6 inch lookahead at 0.1 m/s
        let turn = (PI / 4.0) * 0.1 / 0.1524 * (0.254 / 2.0);
        let fraction = |velocity: f32| velocity / (PI * 0.1016) / (200.0 / 60.0);
        let first = chassis.commands[0];
        assert_relative_eq!(first.left, fraction(0.1 + turn), epsilon = 1e-3);
        assert_relative_eq!(first.right, fraction(0.1 - turn), epsilon = 1e-3);
        assert!(first.right > 0.0);
    }

    #[test]
    fn test_end_approach_runs_until_past_the_end() {
        let token = Cancellation::new();
        let path: PursuitPath<4> =
            generate(&[vector(0.0, -0.35), vector(0.0, -0.2), vector(0.0, -0.05)], &limits()).unwrap();

        // closest to the last waypoint but still short of it
        let odometry = Odometry::new(FixedModel, scales()).unwrap();
        odometry.set_state(Pose::new(Length::default(), Length::new::<meter>(-0.1), Angle::default()));
        let mut chassis = Recorder::default();
        let mut clock = StepClock::cancelling(3, &token);
        let exit = follower_with_radius(&odometry, &mut chassis, &mut clock, &token, 0.4)
            .follow_path(&path, false, None);
        assert_eq!(exit, Ok(Exit::Cancelled));
        assert_eq!(chassis.commands.len(), 4);
        assert!(chassis.commands[0].left > 0.0);
        assert_relative_eq!(chassis.commands[0].left, chassis.commands[0].right);

        // already beyond it
        let token = Cancellation::new();
        let odometry = Odometry::new(FixedModel, scales()).unwrap();
        let mut chassis = Recorder::default();
        let mut clock = StepClock::default();
        let exit = follower_with_radius(&odometry, &mut chassis, &mut clock, &token, 0.4)
            .follow_path(&path, false, None);
        assert_eq!(exit, Ok(Exit::Settled));
        assert_eq!(chassis.commands, vec![SideData::default()]);
    }

    #[test]
    fn test_follow_path_x_holds_heading() {
        let odometry = Odometry::new(FixedModel, scales()).unwrap();
        let path: PursuitPath<4> = generate(&[vector(0.0, 0.0), vector(1.0, 0.0)], &limits()).unwrap();
        let mut turn_pid = PidController::builder()
            .gains(PidGains::new(0.02, 0.0, 0.0))
            .period(Time::new::<millisecond>(10.0))
            .build();

        let token = Cancellation::new();
        token.cancel();
        let mut chassis = Recorder::default();
        let mut clock = StepClock::default();
        let exit = follower(&odometry, &mut chassis, &mut clock, &token).follow_path_x(&path, &mut turn_pid);
        assert_eq!(exit, Ok(Exit::Cancelled));
        assert!(chassis.wheels.is_empty());
        assert_eq!(chassis.commands, vec![SideData::default()]);

        let token = Cancellation::new();
        let mut chassis = Recorder::default();
        let mut clock = StepClock::cancelling(3, &token);
        let exit = follower(&odometry, &mut chassis, &mut clock, &token).follow_path_x(&path, &mut turn_pid);
        assert_eq!(exit, Ok(Exit::Cancelled));
        assert_eq!(chassis.wheels.len(), 3);
        // strafing toward +x while turning toward the 90 degree path heading
        let first = chassis.wheels[0];
        assert_relative_eq!(first.top_left, 1.0, epsilon = 1e-5);
        assert_relative_eq!(first.top_right, -1.0, epsilon = 1e-5);
        assert!(first.bottom_left > 0.0 && first.bottom_left < first.top_left);
        assert!(first.bottom_right < 0.0);
    }

    proptest! {
        #[test]
        fn test_closest_is_monotonic(queries in prop::collection::vec((-1.0f32..5.0, -1.0f32..5.0), 1..40)) {
            let path = waypoints(&[(0.0, 0.0), (0.0, 1.0), (1.0, 2.0), (2.0, 2.0), (3.0, 3.0), (3.0, 4.0)]);
            let lookahead = Length::new::<meter>(0.5);
            let mut state = PursuitState::default();
            let mut last = 0;
            for (x, y) in queries {
                let pos = vector(x, y);
                let closest = state.find_closest(&path, &pos, lookahead);
                state.find_lookahead_point(&path, &pos, lookahead);
                prop_assert!(closest >= last);
                prop_assert!(closest < path.len());
                last = closest;
            }
        }
    }
}
