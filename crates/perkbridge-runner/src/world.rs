use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use perkbridge_core::{
    normalize_item_key, CommandDispatcher, ContainerError, ContainerPos, DispatchError, ItemStack, ShopRecord,
    ShopRegistry,
};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Inventory block placed in the world.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerState {
    pub pos: ContainerPos,
    #[serde(default = "loaded_by_default")]
    pub loaded: bool,
    #[serde(default)]
    pub slots: Vec<Option<ItemStack>>,
}

fn loaded_by_default() -> bool {
    true
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerState {
    /// rank -> duration (`30d`, `permanent`)
    #[serde(default)]
    pub ranks: BTreeMap<String, String>,
    /// normalized item key -> delivered quantity
    #[serde(default)]
    pub items: BTreeMap<String, u64>,
}

/// Small in-memory host world: shops, their containers and players.
///
/// Loadable from JSON so the bridge can run without a real game server.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryWorld {
    #[serde(default)]
    pub shops: Vec<ShopRecord>,
    #[serde(default)]
    pub containers: Vec<ContainerState>,
    #[serde(default)]
    pub players: BTreeMap<String, PlayerState>,
    #[serde(default)]
    pub broadcasts: Vec<String>,
    /// Console command lines executed since load.
    #[serde(skip)]
    pub executed: Vec<String>,
}

impl MemoryWorld {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("read world {}", path.display()))?;
        let world = serde_json::from_slice(&bytes).with_context(|| format!("parse world {}", path.display()))?;
        Ok(world)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(self)?;
        perkbridge_fs::write_atomic(path, &bytes)
    }

    pub fn container_mut(&mut self, pos: &ContainerPos) -> Option<&mut ContainerState> {
        self.containers.iter_mut().find(|c| &c.pos == pos)
    }

    fn grant_rank(&mut self, args: &[&str]) -> Result<(), DispatchError> {
        let [player, rank, duration] = args else {
            return Err(DispatchError::Usage("grant_rank <player> <rank> <duration>".into()));
        };
        self.players
            .entry(player.to_string())
            .or_default()
            .ranks
            .insert(rank.to_string(), duration.to_string());
        info!(player, rank, duration, "granted rank");
        Ok(())
    }

    fn deliver_item(&mut self, args: &[&str]) -> Result<(), DispatchError> {
        let [player, item, qty] = args else {
            return Err(DispatchError::Usage("deliver_item <player> <item> <quantity>".into()));
        };
        let qty: u64 = qty
            .parse()
            .map_err(|_| DispatchError::Usage(format!("quantity must be a number, got {qty:?}")))?;
        *self
            .players
            .entry(player.to_string())
            .or_default()
            .items
            .entry(normalize_item_key(item))
            .or_default() += qty;
        info!(player, item, qty, "delivered item");
        Ok(())
    }
}

fn describe(pos: &ContainerPos) -> String {
    format!("{}@{},{},{}", pos.world, pos.x, pos.y, pos.z)
}

impl ShopRegistry for MemoryWorld {
    fn shops(&self) -> Vec<ShopRecord> {
        self.shops.clone()
    }

    fn container_contents(&self, shop: &ShopRecord) -> Result<Vec<Option<ItemStack>>, ContainerError> {
        let Some(pos) = shop.container.as_ref() else {
            return Err(ContainerError::NotAContainer(format!("shop {}", shop.shop_id)));
        };
        match self.containers.iter().find(|c| &c.pos == pos) {
            None => Err(ContainerError::NotAContainer(describe(pos))),
            Some(c) if !c.loaded => Err(ContainerError::Unavailable(describe(pos))),
            Some(c) => Ok(c.slots.clone()),
        }
    }
}

impl CommandDispatcher for MemoryWorld {
    fn dispatch_console(&mut self, command_line: &str) -> Result<(), DispatchError> {
        let tokens: Vec<&str> = command_line.split_whitespace().collect();
        let Some((&action, args)) = tokens.split_first() else {
            return Err(DispatchError::UnknownCommand(String::new()));
        };
        match action.to_ascii_lowercase().as_str() {
            "grant_rank" => self.grant_rank(args)?,
            "deliver_item" => self.deliver_item(args)?,
            "say" => self.broadcasts.push(args.join(" ")),
            _ => return Err(DispatchError::UnknownCommand(action.to_string())),
        }
        self.executed.push(command_line.to_string());
        Ok(())
    }
}
