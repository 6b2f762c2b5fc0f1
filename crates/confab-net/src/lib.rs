// Boundary plumbing between the session engine and the daemon: the command
// trait, the in-process event bus, and a recording boundary for tests.

pub mod boundary;
pub mod bus;
pub mod recording;

pub use boundary::{fire_and_forget, DaemonBoundary};
pub use bus::{EventBus, Subscription};
pub use recording::RecordingBoundary;
