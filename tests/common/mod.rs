//! Common test utilities for stickerpack-dl integration tests

#[allow(dead_code)]
pub mod bot_api;
#[allow(dead_code)]
pub mod recorders;

#[allow(unused_imports)]
pub use bot_api::*;
#[allow(unused_imports)]
pub use recorders::*;
