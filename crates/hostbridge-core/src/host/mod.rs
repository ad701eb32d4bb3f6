mod context;
mod services;
pub mod testing;

pub use context::{AttachStatus, HostContext, HostRuntime, HostValue, RuntimeBridge};
pub use services::{method, HostServices};
