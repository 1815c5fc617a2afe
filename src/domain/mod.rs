//! Domain layer: device identity, color model, and the wire protocol.
//!
//! Everything in here is pure and synchronous. The session and bridge
//! layers build on these types to decide *what* to send; this module only
//! decides *how it looks on the wire*.

pub mod color;
pub mod command;
pub mod device_id;
pub mod packet;

pub use color::{ColorValue, Hsv, Rgb, rgb_to_hsv};
pub use command::{DeviceCommand, OutboundFormat};
pub use device_id::DeviceId;
pub use packet::{FRAME_LEN, Opcode, Packet};
