pub mod storage;

pub use storage::{MemoryTransport, MemoryTransportConfig};
