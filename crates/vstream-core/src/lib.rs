//! Pure playback-engine core: clocking, queueing, the node graph, the
//! timeline data model, frame caching, compositing and the playback
//! controller. Free of any codec or hardware dependency — those live in a
//! sibling crate behind the traits declared in [`external`].

pub mod clip_source;
pub mod clock;
pub mod compositor;
pub mod config;
pub mod error;
pub mod external;
pub mod frame;
pub mod frame_cache;
pub mod node;
pub mod nodes;
pub mod pin;
pub mod pipeline;
pub mod playback_engine;
pub mod pool;
pub mod queue;
pub mod ring_buffer;
pub mod signal;
pub mod time;
pub mod timeline;

pub use clip_source::ClipFrameProvider;
pub use clock::{MasterClock, SyncAction};
pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use frame::{AudioFrame, MediaKind, Packet, VideoFrame};
pub use pipeline::{Pipeline, PipelineState};
pub use playback_engine::{PlaybackEngine, PlaybackState};
pub use time::{Duration, Rational, Timestamp};
