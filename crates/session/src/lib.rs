pub mod cache;
pub mod clock;
pub mod collaborators;
pub mod config;
pub mod controller;
pub mod errors;
pub mod frame;
pub mod messages;
pub mod mode;
pub mod playback;
pub mod plugins;
pub mod sequencer;
pub mod timer;

pub use cache::RecentFrameCache;
pub use clock::{Clock, ManualClock, SystemClock};
pub use collaborators::{BatchInfo, CameraDevice, Display, FrameEncoder, FrameSink, FrameStore};
pub use config::SessionConfig;
pub use controller::{MAX_ONION_DEPTH, SessionController, SessionParts, ViewState, redraw_listener};
pub use errors::SessionError;
pub use frame::{Controls, Frame, Resolution};
pub use messages::{MessageBus, MessageKey, MessageListener};
pub use mode::{Mode, ModeStateMachine};
pub use plugins::{Plugin, PluginContext, PluginFactory, PluginRegistry, PluginSettings};
pub use sequencer::{CAPTURE_KEY, CaptureOutcome, FrameDecision, SnapshotJob};
pub use timer::TimerHandle;
