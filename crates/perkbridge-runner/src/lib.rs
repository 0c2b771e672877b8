pub mod config;
pub mod consumer;
pub mod publisher;
pub mod scheduler;
pub mod trigger;
pub mod world;

pub use config::*;
pub use consumer::*;
pub use publisher::*;
pub use scheduler::*;
pub use trigger::*;
pub use world::*;
