// src/core/protocol/mod.rs

pub mod message;
pub mod resp_frame;
pub use message::{Message, parse};
pub use resp_frame::{RespFrame, RespFrameCodec};
