#![allow(dead_code)]

use motioncore::{
    odometry::{ChassisScales, MiddleWheel},
    pid::{PidController, PidGains, SettledUtil},
};
use motionsim::{Robot, Simulator};
use simplelog::{Config, LevelFilter, TestLogger};
use uom::si::{
    f32::{Length, Time, Velocity},
    length::inch,
    time::millisecond,
    velocity::meter_per_second,
};

pub fn init_logger() {
    // every test calls this, only the first registration succeeds
    let _ = TestLogger::init(LevelFilter::Debug, Config::default());
}

pub fn tank_scales() -> ChassisScales {
    ChassisScales::builder()
        .wheel_diameter(Length::new::<inch>(4.0))
        .wheel_track(Length::new::<inch>(10.0))
        .ticks_per_rev(360.0)
        .build()
}

pub fn x_scales() -> ChassisScales {
    ChassisScales::builder()
        .wheel_diameter(Length::new::<inch>(4.0))
        .wheel_track(Length::new::<inch>(10.0))
        .middle(MiddleWheel {
            distance: Length::new::<inch>(5.0),
            diameter: Length::new::<inch>(4.0),
        })
        .ticks_per_rev(360.0)
        .build()
}

pub fn robot(scales: ChassisScales) -> Robot {
    Robot::new(
        Simulator::builder()
            .scales(scales)
            .max_velocity(Velocity::new::<meter_per_second>(1.0))
            .period(Time::new::<millisecond>(5.0))
            .build(),
    )
}

pub fn pid(kp: f32, at_target_error: f32, at_target_derivative: f32) -> PidController {
    PidController::builder()
        .gains(PidGains::new(kp, 0.0, 0.0))
        .period(Time::new::<millisecond>(10.0))
        .settled_util(
            SettledUtil::builder()
                .at_target_error(at_target_error)
                .at_target_derivative(at_target_derivative)
                .at_target_time(Time::new::<millisecond>(100.0))
                .build(),
        )
        .build()
}
