// Call and conference state: the registry that reconciles daemon reports,
// and the tracker that follows a conference across merge and split.

pub mod call;
pub mod conference;
pub mod registry;
pub mod tracking;

pub use call::Call;
pub use conference::{ConferenceSnapshot, ParticipantInfo};
pub use registry::CallRegistry;
pub use tracking::{ConferenceObserver, ConferenceTracker, TrackState};
