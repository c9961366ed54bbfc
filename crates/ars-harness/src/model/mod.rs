//! Model-based testing of a single channel.

mod driver;
mod operation;

pub use driver::{ChannelDriver, MODEL_TEAM};
pub use operation::{MODEL_EPOCH, Operation, SmallMessage, SmallPage};
