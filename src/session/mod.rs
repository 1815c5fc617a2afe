//! Session layer: per-device sessions, the registry that owns them, and the
//! liveness sweeper that evicts unresponsive ones.

pub mod device_session;
pub mod registry;
pub mod sweeper;

pub use device_session::{
    DeviceSession, Outbound, SessionRef, SessionState, SessionSummary, SessionTransport,
};
pub use registry::{SessionRegistry, SweepReport};
pub use sweeper::spawn_sweeper;
