use thiserror::Error;

use crate::{ItemStack, ShopRecord};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContainerError {
    /// Backing chunk or world is not loaded right now.
    #[error("container at {0} is not accessible (unloaded)")]
    Unavailable(String),
    /// The block at the shop's container position no longer holds an inventory.
    #[error("block at {0} is not a container")]
    NotAContainer(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("usage: {0}")]
    Usage(String),
    #[error("{0}")]
    Failed(String),
}

/// Read access to the shops living in the host world.
///
/// Only ever called on the thread that owns the world.
pub trait ShopRegistry {
    /// Every shop known to the host, in a stable order.
    fn shops(&self) -> Vec<ShopRecord>;

    /// Full slot listing of a shop's backing container. Double containers
    /// report all of their slots in one listing.
    fn container_contents(&self, shop: &ShopRecord) -> Result<Vec<Option<ItemStack>>, ContainerError>;
}

/// Executes a validated, namespace-stripped command line with console privileges.
///
/// Only ever called on the thread that owns the world.
pub trait CommandDispatcher {
    fn dispatch_console(&mut self, command_line: &str) -> Result<(), DispatchError>;
}
