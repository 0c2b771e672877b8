use serde::{Deserialize, Serialize};

use crate::ids::{CommandId, ShopId};

/// One externally submitted directive, as stored in the queue file.
///
/// Missing fields decode as empty strings and then fail command validation.
/// Fields of the wrong type fail decoding; the queue reader decodes entries
/// one at a time so that only loses the broken entry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedCommand {
    #[serde(default)]
    pub id: CommandId,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub timestamp: String,
}

/// Aggregate quantity of one item type inside one shop's container.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockEntry {
    #[serde(rename = "shop_uuid")]
    pub shop_id: ShopId,
    #[serde(rename = "item_type")]
    pub item_key: String,
    #[serde(rename = "stock_remaining")]
    pub quantity: u32,
}

impl StockEntry {
    pub fn new(shop_id: ShopId, item_key: impl Into<String>, quantity: u32) -> Self {
        Self {
            shop_id,
            item_key: item_key.into(),
            quantity,
        }
    }
}

/// One occupied inventory slot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    pub item_type: String,
    pub amount: u32,
}

impl ItemStack {
    pub fn new(item_type: impl Into<String>, amount: u32) -> Self {
        Self {
            item_type: item_type.into(),
            amount,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShopKind {
    #[default]
    Player,
    Admin,
}

/// Block position of a shop's backing container.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerPos {
    pub world: String,
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

/// A shop as seen by the registry: identity, ownership and where its stock lives.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopRecord {
    pub shop_id: ShopId,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub kind: ShopKind,
    #[serde(default)]
    pub container: Option<ContainerPos>,
}
