pub mod part;
pub mod registry;
pub mod session;
pub mod sink;

pub use registry::{SessionCompletion, SessionRegistry, SessionSlot};
pub use session::{SessionState, StreamSession};
pub use sink::{ChannelSink, ChannelSource, PartSink};
