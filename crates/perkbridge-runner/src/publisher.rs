use anyhow::Result;
use perkbridge_core::{
    container_entries, count_items, dedup_last_wins, ContainerError, ShopKind, ShopRegistry, StockEntry,
};
use perkbridge_fs::SnapshotFile;
use perkbridge_host::{HostError, HostHandle};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn};

use crate::Config;

/// Deduplicated stock gathered from the world in one pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StockScan {
    pub entries: Vec<StockEntry>,
    /// Entries produced before deduplication.
    pub raw_entries: usize,
    /// Player shops whose container was read.
    pub shops_scanned: usize,
    /// Player shops skipped because their container was unreachable.
    pub shops_unavailable: usize,
}

/// Walk every player shop and aggregate its container contents.
///
/// Must run on the thread that owns the world. A shop whose container cannot
/// be reached is logged and skipped; it never aborts the scan.
pub fn collect_stock<R>(registry: &R) -> StockScan
where
    R: ShopRegistry + ?Sized,
{
    info!("starting live shop stock update");
    let mut scan = StockScan::default();
    let mut all: Vec<StockEntry> = Vec::new();

    for shop in registry.shops() {
        if shop.kind != ShopKind::Player || shop.container.is_none() {
            continue;
        }
        let slots = match registry.container_contents(&shop) {
            Ok(slots) => slots,
            Err(ContainerError::NotAContainer(at)) => {
                debug!(shop = %shop.shop_id, at = %at, "shop container is no longer a container");
                continue;
            }
            Err(e @ ContainerError::Unavailable(_)) => {
                warn!(
                    shop = %shop.shop_id,
                    owner = shop.owner_id.as_deref().unwrap_or("-"),
                    error = %e,
                    "could not access container for shopkeeper"
                );
                scan.shops_unavailable += 1;
                continue;
            }
        };
        scan.shops_scanned += 1;
        all.extend(container_entries(&shop.shop_id, count_items(&slots)));
    }

    scan.raw_entries = all.len();
    scan.entries = dedup_last_wins(all);
    info!(from = scan.raw_entries, to = scan.entries.len(), "deduped stock data");
    scan
}

/// Writes stock scans to the snapshot file.
#[derive(Clone, Debug)]
pub struct SnapshotPublisher {
    file: SnapshotFile,
}

impl SnapshotPublisher {
    pub fn new(file: SnapshotFile) -> Self {
        Self { file }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(SnapshotFile::new(cfg.stock_path()))
    }

    pub fn file(&self) -> &SnapshotFile {
        &self.file
    }

    /// Atomically replace the snapshot with `scan`. On error the previous
    /// snapshot stays in place.
    pub fn write_scan(&self, scan: &StockScan) -> Result<()> {
        match self.file.write(&scan.entries) {
            Ok(()) => {
                info!(entries = scan.entries.len(), "live shop stock update complete");
                Ok(())
            }
            Err(e) => {
                error!(path = %self.file.path().display(), error = %format!("{e:#}"), "failed to write stock data");
                Err(e)
            }
        }
    }

    /// Scan and publish in one go, on the calling thread.
    pub fn publish_snapshot<R>(&self, registry: &R) -> Result<StockScan>
    where
        R: ShopRegistry + ?Sized,
    {
        let scan = collect_stock(registry);
        self.write_scan(&scan)?;
        Ok(scan)
    }
}

/// Requests a publish: the scan runs on the owner thread and the result goes
/// to the single snapshot writer.
pub struct PublishTrigger<W> {
    host: HostHandle<W>,
    writer: UnboundedSender<StockScan>,
}

impl<W> Clone for PublishTrigger<W> {
    fn clone(&self) -> Self {
        Self {
            host: self.host.clone(),
            writer: self.writer.clone(),
        }
    }
}

impl<W> PublishTrigger<W>
where
    W: ShopRegistry + 'static,
{
    pub fn new(host: HostHandle<W>, writer: UnboundedSender<StockScan>) -> Self {
        Self { host, writer }
    }

    pub fn request_publish(&self) -> Result<(), HostError> {
        let writer = self.writer.clone();
        self.host.submit(move |world: &mut W| {
            let scan = collect_stock(world);
            if writer.send(scan).is_err() {
                warn!("snapshot writer has stopped; dropping scan");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perkbridge_core::{ContainerPos, ItemStack, ShopId, ShopRecord};
    use std::collections::HashMap;
    use std::fs;
    use tempfile::tempdir;

    #[derive(Default)]
    struct FakeShops {
        shops: Vec<ShopRecord>,
        contents: HashMap<ContainerPos, Result<Vec<Option<ItemStack>>, ContainerError>>,
    }

    impl FakeShops {
        fn add(&mut self, id: &str, x: i32, kind: ShopKind, contents: Result<Vec<Option<ItemStack>>, ContainerError>) {
            let pos = ContainerPos { world: "world".into(), x, y: 64, z: 0 };
            self.shops.push(ShopRecord {
                shop_id: ShopId::from_str(id),
                owner_id: Some(format!("owner-{id}")),
                kind,
                container: Some(pos.clone()),
            });
            self.contents.insert(pos, contents);
        }
    }

    impl ShopRegistry for FakeShops {
        fn shops(&self) -> Vec<ShopRecord> {
            self.shops.clone()
        }

        fn container_contents(&self, shop: &ShopRecord) -> Result<Vec<Option<ItemStack>>, ContainerError> {
            let pos = shop.container.as_ref().expect("fake shops always have a container");
            self.contents.get(pos).cloned().unwrap_or_else(|| Err(ContainerError::NotAContainer(format!("{pos:?}"))))
        }
    }

    fn stacks(items: &[(&str, u32)]) -> Vec<Option<ItemStack>> {
        items.iter().map(|(t, n)| Some(ItemStack::new(*t, *n))).collect()
    }

    #[test]
    fn double_chest_halves_sum_into_one_entry() {
        let mut world = FakeShops::default();
        world.add("S", 0, ShopKind::Player, Ok(stacks(&[("minecraft:dirt", 32), ("minecraft:dirt", 32)])));
        let scan = collect_stock(&world);
        assert_eq!(scan.entries, vec![StockEntry::new(ShopId::from_str("S"), "minecraft:dirt", 64)]);
    }

    #[test]
    fn same_shop_id_twice_keeps_last_value() {
        let mut world = FakeShops::default();
        world.add("S", 0, ShopKind::Player, Ok(stacks(&[("DIRT", 10)])));
        world.add("S", 1, ShopKind::Player, Ok(stacks(&[("DIRT", 7)])));
        let scan = collect_stock(&world);
        assert_eq!(scan.raw_entries, 2);
        assert_eq!(scan.entries, vec![StockEntry::new(ShopId::from_str("S"), "minecraft:dirt", 7)]);
    }

    #[test]
    fn skips_admin_missing_and_unloaded_containers() {
        let mut world = FakeShops::default();
        world.add("A", 0, ShopKind::Admin, Ok(stacks(&[("DIAMOND", 1)])));
        world.add("U", 1, ShopKind::Player, Err(ContainerError::Unavailable("world@1".into())));
        world.add("N", 2, ShopKind::Player, Err(ContainerError::NotAContainer("world@2".into())));
        world.add("P", 3, ShopKind::Player, Ok(stacks(&[("ELYTRA", 2)])));
        world.shops.push(ShopRecord {
            shop_id: ShopId::from_str("X"),
            owner_id: None,
            kind: ShopKind::Player,
            container: None,
        });

        let scan = collect_stock(&world);
        assert_eq!(scan.shops_scanned, 1);
        assert_eq!(scan.shops_unavailable, 1);
        assert_eq!(scan.entries, vec![StockEntry::new(ShopId::from_str("P"), "minecraft:elytra", 2)]);
    }

    #[test]
    fn publish_writes_snapshot_file() {
        let dir = tempdir().unwrap();
        let publisher = SnapshotPublisher::new(SnapshotFile::new(dir.path().join("shop_stock.json")));
        let mut world = FakeShops::default();
        world.add("S", 0, ShopKind::Player, Ok(stacks(&[("minecraft:dirt", 32), ("minecraft:dirt", 32)])));

        publisher.publish_snapshot(&world).unwrap();
        assert_eq!(
            fs::read_to_string(publisher.file().path()).unwrap(),
            r#"[{"shop_uuid":"S","item_type":"minecraft:dirt","stock_remaining":64}]"#
        );
    }

    #[test]
    fn failed_publish_leaves_previous_snapshot_untouched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shop_stock.json");
        let publisher = SnapshotPublisher::new(SnapshotFile::new(&path));
        let mut world = FakeShops::default();
        world.add("S", 0, ShopKind::Player, Ok(stacks(&[("DIRT", 1)])));
        publisher.publish_snapshot(&world).unwrap();
        let before = fs::read(&path).unwrap();

        world.add("T", 1, ShopKind::Player, Ok(stacks(&[("STONE", 9)])));
        fs::create_dir(dir.path().join("shop_stock.json.tmp")).unwrap();
        assert!(publisher.publish_snapshot(&world).is_err());
        assert_eq!(fs::read(&path).unwrap(), before);
    }
}
