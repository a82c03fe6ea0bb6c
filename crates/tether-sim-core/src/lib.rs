//! Deterministic movement simulation shared by the authority and predicting clients.
//!
//! Nothing in here logs or allocates per tick; every function is a plain value
//! transform so both peers reach bit-identical results from identical inputs.

pub mod classification;
pub mod scheduler;
pub mod simulate;
pub mod speed;
pub mod state;

pub use classification::{ActionState, AnimState, Classification};
pub use scheduler::{FixedTickScheduler, TickPhase, TickRoles};
pub use simulate::{simulate, step, yaw_look_rotation};
pub use speed::{SpeedResolver, SpeedTable};
pub use state::{InputSample, MovementState};
