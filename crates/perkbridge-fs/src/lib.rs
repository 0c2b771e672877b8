pub mod atomic;
pub mod queue;
pub mod snapshot;

pub use atomic::*;
pub use queue::*;
pub use snapshot::*;
