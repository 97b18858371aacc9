//! Wire framing and command layout shared by the device protocol engine
//! and the host device client (spec.md §6, §4.3).

pub mod command;
pub mod frame;

pub use command::{CommandCode, PayloadError, Status, SubCode, RSP_UNKNOWN_CMD};
pub use frame::{Endpoint, Frame, FrameError, FrameHeader, FrameLen};
