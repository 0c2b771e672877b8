use anyhow::Result;
use perkbridge_core::ShopRegistry;
use tracing::info;

use crate::PublishTrigger;

/// Who issued an admin command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandSender {
    Console,
    Player { name: String, op: bool },
}

impl CommandSender {
    fn is_privileged(&self) -> bool {
        match self {
            CommandSender::Console => true,
            CommandSender::Player { op, .. } => *op,
        }
    }
}

/// Anything that can ask for an immediate stock publish.
pub trait SnapshotTrigger {
    fn request_snapshot(&self) -> Result<()>;
}

impl<W> SnapshotTrigger for PublishTrigger<W>
where
    W: ShopRegistry + 'static,
{
    fn request_snapshot(&self) -> Result<()> {
        self.request_publish()?;
        Ok(())
    }
}

/// Lines sent back to the sender of an admin command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdminReply {
    pub handled: bool,
    pub lines: Vec<String>,
}

impl AdminReply {
    fn handled(lines: &[&str]) -> Self {
        Self {
            handled: true,
            lines: lines.iter().map(|s| s.to_string()).collect(),
        }
    }
}

pub const MANUAL_STOCK_UPDATE: &str = "manual_stock_update";

/// Handle `/webperks <action> <args...>` from the admin surface.
///
/// `args` excludes the `webperks` label itself.
pub fn handle_admin_command(sender: &CommandSender, args: &[&str], trigger: &dyn SnapshotTrigger) -> AdminReply {
    if !sender.is_privileged() {
        return AdminReply::handled(&["You do not have permission to run webperks commands."]);
    }

    let Some(action) = args.first() else {
        return AdminReply::handled(&["Usage: /webperks <action> <args...>", "  webperks manual_stock_update"]);
    };

    match action.to_ascii_lowercase().as_str() {
        MANUAL_STOCK_UPDATE => {
            info!(?sender, "triggering manual stock update");
            match trigger.request_snapshot() {
                Ok(()) => AdminReply::handled(&["Stock update triggered successfully."]),
                Err(e) => AdminReply {
                    handled: true,
                    lines: vec![format!("Stock update could not be scheduled: {e}")],
                },
            }
        }
        other => AdminReply {
            handled: false,
            lines: vec![format!("Unknown webperks action: {other}")],
        },
    }
}
