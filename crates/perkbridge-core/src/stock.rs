use std::collections::HashMap;

use crate::{ItemStack, ShopId, StockEntry};

/// Namespace given to item types that arrive without one.
pub const DEFAULT_ITEM_NAMESPACE: &str = "minecraft";

/// Lower-case an item type and make sure it carries a namespace.
///
/// `ELYTRA` and `minecraft:Elytra` both become `minecraft:elytra`.
pub fn normalize_item_key(item_type: &str) -> String {
    let lowered = item_type.trim().to_ascii_lowercase();
    if lowered.contains(':') {
        lowered
    } else {
        format!("{DEFAULT_ITEM_NAMESPACE}:{lowered}")
    }
}

/// Sum stack counts per normalized item key for one container.
///
/// Empty slots and zero-sized stacks are ignored. Keys come out in the order
/// they were first seen.
pub fn count_items<'a, I>(slots: I) -> Vec<(String, u32)>
where
    I: IntoIterator<Item = &'a Option<ItemStack>>,
{
    let mut order: Vec<(String, u32)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for stack in slots.into_iter().flatten() {
        if stack.amount == 0 {
            continue;
        }
        let key = normalize_item_key(&stack.item_type);
        match index.get(&key) {
            Some(&i) => order[i].1 = order[i].1.saturating_add(stack.amount),
            None => {
                index.insert(key.clone(), order.len());
                order.push((key, stack.amount));
            }
        }
    }
    order
}

/// Turn one container's counts into stock entries for `shop_id`.
pub fn container_entries(shop_id: &ShopId, counts: Vec<(String, u32)>) -> Vec<StockEntry> {
    counts
        .into_iter()
        .map(|(key, qty)| StockEntry::new(shop_id.clone(), key, qty))
        .collect()
}

/// Collapse entries sharing a `(shop_id, item_key)` pair.
///
/// The last value produced for a key wins; the key keeps the slot of its
/// first occurrence, so output order is deterministic for a deterministic
/// enumeration order.
pub fn dedup_last_wins(entries: Vec<StockEntry>) -> Vec<StockEntry> {
    let mut out: Vec<StockEntry> = Vec::with_capacity(entries.len());
    let mut index: HashMap<(ShopId, String), usize> = HashMap::with_capacity(entries.len());

    for entry in entries {
        let key = (entry.shop_id.clone(), entry.item_key.clone());
        match index.get(&key) {
            Some(&i) => out[i] = entry,
            None => {
                index.insert(key, out.len());
                out.push(entry);
            }
        }
    }
    out
}
