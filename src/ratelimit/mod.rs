//! Sliding window rate limiting logic and state management.

mod backend;
mod clock;
mod decision;
mod overrides;
mod registry;
mod sender;
mod token;
mod window;

pub use backend::PolicyBackend;
pub use clock::{Clock, SystemClock};
pub use decision::{Decision, DEFER_ACTION, PERMIT_ACTION};
pub use overrides::{MemoryMap, OverrideMap};
pub use registry::TokenRegistry;
pub use sender::SenderKey;
pub use token::{bucket_width, truncate_to_bucket, Admission, Token, BUCKET_SECS};
pub use window::{
    LockStrategy, WindowController, DEFAULT_DEFER_MESSAGE, DEFAULT_INTERVAL, DEFAULT_LIMIT,
};
