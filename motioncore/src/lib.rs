#![cfg_attr(not(any(test, feature = "std")), no_std)]

pub mod control;
pub mod drive;
pub mod error;
pub mod geometry;
pub mod odometry;
pub mod path;
pub mod pid;
pub mod pursuit;
pub mod settle;
#[cfg(feature = "std")]
pub mod task;
pub mod time;
pub mod trajectory;
pub mod utils;

pub use error::{OdometryError, PathError, PursuitError};
pub use geometry::{Pose, Vector};
