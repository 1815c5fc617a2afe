//! Data Transfer Objects for HTTP request/response serialization.

pub mod device_dto;

pub use device_dto::*;
