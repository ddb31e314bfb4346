//! Autocaster director.
//!
//! This crate provides:
//! - The view scheduler (priority tiers, dwell, revisit suppression, forced rotation)
//! - The session controller (lifecycle FSM with timeouts and retry budgets)
//! - The capture worker and the tick loop that ties perception to the camera
//! - Collaborator ports plus replay adapters for offline runs
//! - Snapshot observers (heatmap PNG, position log)
//! - Configuration, metrics and structured session logging

pub mod candidates;
pub mod capture;
pub mod config;
pub mod context;
pub mod director;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod observers;
pub mod ports;
pub mod replay;
pub mod retry;
pub mod scheduler;
pub mod session;

pub use config::DirectorConfig;
pub use context::{SessionClock, SessionContext};
pub use director::Director;
pub use error::{DirectorError, DirectorResult};
pub use logging::SessionLogger;
pub use ports::{
    CameraActuator, Collaborators, FrameSource, MatchProbe, ProcessLifecycle, StreamScene,
    WindowFocus,
};
pub use scheduler::{SchedulerConfig, ViewScheduler};
pub use session::{SessionConfig, SessionController, StatePolicy, Transition, TransitionKind};
