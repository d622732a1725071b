//! Session-partitioned fan-out of server pushes to live connections.
//!
//! [`Hub`] maps session ids to per-session actors ([`session_hub`]); each
//! actor owns its clients and handles register, unregister and broadcast
//! one at a time, so sessions never contend with each other.

pub mod client;
pub mod hub;
pub mod session_hub;

pub use client::{ClientHandle, UserType};
pub use hub::Hub;
pub use session_hub::{FanOut, SessionStats};
