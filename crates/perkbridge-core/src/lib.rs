pub mod command;
pub mod ids;
pub mod model;
pub mod stock;
pub mod world;

pub use command::*;
pub use ids::*;
pub use model::*;
pub use stock::*;
pub use world::*;
