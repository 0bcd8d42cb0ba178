//! Attempt throttling logic and state management.

mod clock;
mod policy;
mod registry;
mod shared;
mod subject;
mod throttler;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use policy::ThrottlePolicy;
pub use registry::ThrottleRegistry;
pub use shared::SharedThrottler;
pub use subject::SubjectKey;
pub use throttler::{AttemptThrottler, Decision, ThrottleState};
