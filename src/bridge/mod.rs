//! State subscription bridge: store listeners per session, forwarding
//! value changes into the session's outbound channel.

pub mod aspect;
pub mod state_bridge;
pub mod subscription;

pub use aspect::StateAspect;
pub use state_bridge::StateBridge;
pub use subscription::SubscriptionHandle;
