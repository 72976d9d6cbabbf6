pub mod cache;
pub mod refresh;
pub mod responder;

pub use cache::{CachedStill, LatestCapture};
pub use refresh::{RefreshPolicy, RefreshScheduler, RefreshStats};
