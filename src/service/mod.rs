//! Service layer
//!
//! Contains business logic separated from HTTP handlers.
//! Services orchestrate database, admission, and notification work.

mod admission;
mod intake;

pub use admission::{AudienceRateLimiter, Fingerprint};
pub use intake::IntakeService;
