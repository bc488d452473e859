//! Shared types for the motion arbiter.
//!
//! This crate holds everything that does not need a runtime:
//! - **Frames and poses** ([`FrameId`], [`StampedPose`]) built on nalgebra's `Isometry3<f64>`
//! - **Geometry kernel** ([`interpolate_pose`], [`interpolate_linear`])
//! - **Messages** exchanged with requesters and with the planning backend
//! - **Errors** and **settings**
//!
//! # Example
//!
//! ```rust
//! use motion_arbiter_common::{interpolate_linear, FrameId, StampedPose};
//!
//! let start = StampedPose::from_translation(0.0, 0.0, 0.0, FrameId::World);
//! let target = StampedPose::from_translation(0.0, 0.0, 1.0, FrameId::World);
//!
//! let heights: Vec<f64> = interpolate_linear(&start, &target, 0.3)
//!     .unwrap()
//!     .map(|waypoint| waypoint.position().z)
//!     .collect();
//! assert_eq!(heights.len(), 4);
//! ```

pub mod error;
pub mod frame;
pub mod interpolation;
pub mod messages;
pub mod pose;
pub mod settings;

pub use error::{FrameLookupError, MotionError, SettingsError, ValidationError};
pub use frame::FrameId;
pub use interpolation::{interpolate_linear, interpolate_pose, slerp_shortest, LinearWaypoints};
pub use messages::*;
pub use pose::{StampedPose, LATEST, UNIT_NORM_TOLERANCE};
pub use settings::{ArbiterSettings, ConstraintTolerances, MAX_FRAME_LOOKUP_TIMEOUT_SECS, PathParameters};
