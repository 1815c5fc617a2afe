//! WebSocket layer: device upgrade, connection loop, and message rendering.
//!
//! Devices connect to `/ws?deviceId=<id>`. Each connection gets one task
//! that owns the socket for its whole life.

pub mod connection;
pub mod handler;
pub mod messages;
