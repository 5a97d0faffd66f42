pub mod alerts;
pub mod events;
pub mod observation_log;
pub mod registry;
pub mod session;
pub mod store;
pub mod tracker;

pub use alerts::{Alert, AlertRule};
pub use events::{EventBus, TrackingEvent};
pub use observation_log::{Observation, ObservationLog};
pub use registry::TrackerRegistry;
pub use session::{ObservationScope, RecordMode, StopReason, TrackerState, TrackingSession};
pub use store::{TrackedSearch, TrackedStore};
pub use tracker::{PollOutcome, Tracker, TrackingHandle};
