//! Host capability traits and the in-memory host.

pub mod memory;
mod traits;

pub use memory::{InMemoryDevices, InMemoryVariables, RecordingActions};
pub use traits::{ActionSink, DeviceStore, HostError, VariableStore};
