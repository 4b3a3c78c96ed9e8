//! # Contracts
//!
//! Frozen interface contracts shared by every crate of the time synchronizer.
//! Business crates depend on this crate only; reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Message stamps are seconds (`f64`) on the sensors' nominal clock
//! - Every output of one round carries a single shared reference stamp

mod blueprint;
mod cloud;
mod diagnostics;
mod error;
mod sink;
mod sync;
mod topic;
mod transform;
mod velocity;

pub use blueprint::*;
pub use cloud::*;
pub use diagnostics::*;
pub use error::*;
pub use sink::*;
pub use sync::*;
pub use topic::{synchronized_topic, TopicId, SYNCHRONIZED_SUFFIX};
pub use transform::*;
pub use velocity::*;

