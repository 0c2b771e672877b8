use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use perkbridge_core::NAMESPACE;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub commands: CommandsConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Directory shared with the web backend. `~` is expanded.
    pub dir: String,
    #[serde(default = "default_queue_file")]
    pub queue_file: String,
    #[serde(default = "default_stock_file")]
    pub stock_file: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub queue_initial_delay_ms: u64,
    pub queue_interval_ms: u64,
    pub stock_initial_delay_ms: u64,
    pub stock_interval_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandsConfig {
    pub namespace: String,
    /// How many ids from an undeleted queue file to remember so its replay is skipped (0 = off).
    pub remember_ids: usize,
}

fn default_queue_file() -> String {
    "command_queue.json".to_string()
}

fn default_stock_file() -> String {
    "shop_stock.json".to_string()
}

impl Default for ScheduleConfig {
    // One second for the queue and five minutes for stock, like the 20/6000-tick server timers.
    fn default() -> Self {
        Self {
            queue_initial_delay_ms: 1_000,
            queue_interval_ms: 1_000,
            stock_initial_delay_ms: 5_000,
            stock_interval_secs: 300,
        }
    }
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            namespace: NAMESPACE.to_string(),
            remember_ids: 256,
        }
    }
}

impl Config {
    pub fn default_for_dir(dir: &str) -> Self {
        Self {
            bridge: BridgeConfig {
                dir: dir.to_string(),
                queue_file: default_queue_file(),
                stock_file: default_stock_file(),
            },
            schedule: ScheduleConfig::default(),
            commands: CommandsConfig::default(),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let cfg: Config = toml::from_str(&s).with_context(|| format!("parse {}", path.display()))?;
        Ok(cfg)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| format!("create dir {}", parent.display()))?;
        }
        let s = toml::to_string_pretty(self).context("serialize toml")?;
        std::fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    /// Load `path`, or write a default config there (bridge dir next to it) and return that.
    pub fn load_or_init(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load_from(path);
        }
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .join("bridge");
        let cfg = Self::default_for_dir(&dir.to_string_lossy());
        cfg.save_to(path)?;
        Ok(cfg)
    }

    pub fn bridge_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.bridge.dir).to_string())
    }

    pub fn queue_path(&self) -> PathBuf {
        self.bridge_dir().join(&self.bridge.queue_file)
    }

    pub fn stock_path(&self) -> PathBuf {
        self.bridge_dir().join(&self.bridge.stock_file)
    }

    pub fn default_path(root: &Path) -> PathBuf {
        root.join("perkbridge.toml")
    }
}

impl ScheduleConfig {
    pub fn queue_initial_delay(&self) -> Duration {
        Duration::from_millis(self.queue_initial_delay_ms)
    }

    pub fn queue_interval(&self) -> Duration {
        Duration::from_millis(self.queue_interval_ms.max(1))
    }

    pub fn stock_initial_delay(&self) -> Duration {
        Duration::from_millis(self.stock_initial_delay_ms)
    }

    pub fn stock_interval(&self) -> Duration {
        Duration::from_secs(self.stock_interval_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("perkbridge.toml");
        let cfg = Config::default_for_dir("/srv/automation");
        cfg.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), cfg);
    }

    #[test]
    fn missing_sections_take_defaults() {
        let cfg: Config = toml::from_str("[bridge]\ndir = \"/srv/automation\"\n").unwrap();
        assert_eq!(cfg.queue_path(), PathBuf::from("/srv/automation/command_queue.json"));
        assert_eq!(cfg.stock_path(), PathBuf::from("/srv/automation/shop_stock.json"));
        assert_eq!(cfg.schedule.stock_interval(), Duration::from_secs(300));
        assert_eq!(cfg.commands.namespace, "webperks");
    }

    #[test]
    fn partial_sections_fill_in_missing_keys() {
        let cfg: Config = toml::from_str(
            "[bridge]\ndir = \"/srv/automation\"\n[schedule]\nqueue_interval_ms = 500\n[commands]\nremember_ids = 0\n",
        )
        .unwrap();
        assert_eq!(cfg.schedule.queue_interval_ms, 500);
        assert_eq!(cfg.schedule.queue_initial_delay_ms, 1_000);
        assert_eq!(cfg.schedule.stock_interval_secs, 300);
        assert_eq!(cfg.commands.remember_ids, 0);
        assert_eq!(cfg.commands.namespace, "webperks");
    }

    #[test]
    fn load_or_init_writes_defaults() {
        let dir = tempdir().unwrap();
        let path = Config::default_path(dir.path());
        let cfg = Config::load_or_init(&path).unwrap();
        assert!(path.exists());
        assert_eq!(cfg.bridge_dir(), dir.path().join("bridge"));
    }
}
