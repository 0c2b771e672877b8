use std::collections::{HashSet, VecDeque};

use perkbridge_core::{strip_namespace, CommandDispatcher, CommandId};
use perkbridge_fs::{Drain, DrainStatus, QueueFile};
use perkbridge_host::HostHandle;
use tracing::{error, info, warn};

use crate::Config;

/// What one drain cycle did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Entries found in the queue file.
    pub read: usize,
    /// Commands handed to the owner thread.
    pub submitted: usize,
    /// Entries that did not decode or failed format validation.
    pub rejected: usize,
    /// Commands skipped because the same undeleted file was already executed.
    pub skipped_seen: usize,
    /// Whether the queue file is gone after the cycle.
    pub cleared: bool,
    /// The owner thread stopped accepting work during this cycle.
    pub host_closed: bool,
}

/// Bounded memory of command ids read from a queue file that could not be
/// deleted. Empty whenever the last drain left no file behind.
#[derive(Debug, Default)]
pub struct RecentIds {
    capacity: usize,
    order: VecDeque<CommandId>,
    seen: HashSet<CommandId>,
}

impl RecentIds {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            seen: HashSet::with_capacity(capacity),
        }
    }

    pub fn contains(&self, id: &CommandId) -> bool {
        !id.is_empty() && self.seen.contains(id)
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.seen.clear();
    }

    pub fn remember(&mut self, id: CommandId) {
        if self.capacity == 0 || id.is_empty() || self.seen.contains(&id) {
            return;
        }
        if self.order.len() == self.capacity {
            if let Some(old) = self.order.pop_front() {
                self.seen.remove(&old);
            }
        }
        self.seen.insert(id.clone());
        self.order.push_back(id);
    }
}

/// Drains the queue file and marshals each valid command onto the owner thread.
#[derive(Debug)]
pub struct CommandQueueConsumer {
    queue: QueueFile,
    namespace: String,
    recent: RecentIds,
}

impl CommandQueueConsumer {
    pub fn new(queue: QueueFile, namespace: impl Into<String>, remember_ids: usize) -> Self {
        Self {
            queue,
            namespace: namespace.into(),
            recent: RecentIds::new(remember_ids),
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(
            QueueFile::new(cfg.queue_path()),
            cfg.commands.namespace.clone(),
            cfg.commands.remember_ids,
        )
    }

    pub fn queue(&self) -> &QueueFile {
        &self.queue
    }

    /// One full cycle: read and clear the queue file, then submit its commands.
    ///
    /// Does blocking file I/O; call it from a worker, never from the owner thread.
    pub fn drain_and_execute<W>(&mut self, host: &HostHandle<W>) -> DrainReport
    where
        W: CommandDispatcher + 'static,
    {
        let drain = self.queue.drain();
        self.execute_batch(drain, host)
    }

    /// Validate and submit an already drained batch, in file order.
    pub fn execute_batch<W>(&mut self, drain: Drain, host: &HostHandle<W>) -> DrainReport
    where
        W: CommandDispatcher + 'static,
    {
        let Drain { status, commands, undecodable, cleared } = drain;
        let mut report = DrainReport {
            read: commands.len() + undecodable,
            rejected: undecodable,
            cleared,
            ..DrainReport::default()
        };
        let mut batch_ids = Vec::with_capacity(commands.len());

        for cmd in commands {
            if self.recent.contains(&cmd.id) {
                warn!(id = %cmd.id, "command already executed from this undeleted queue file; skipping");
                report.skipped_seen += 1;
                continue;
            }

            let line = match strip_namespace(&self.namespace, &cmd.command) {
                Ok(line) => line.to_string(),
                Err(e) => {
                    error!(id = %cmd.id, error = %e, "rejecting queued command: invalid command format");
                    report.rejected += 1;
                    continue;
                }
            };

            let id = cmd.id.clone();
            let submitted = host.submit(move |world: &mut W| {
                info!(id = %id, command = %line, "executing web command");
                if let Err(e) = world.dispatch_console(&line) {
                    error!(id = %id, error = %e, "failed to execute command");
                }
            });

            match submitted {
                Ok(()) => {
                    report.submitted += 1;
                    batch_ids.push(cmd.id);
                }
                Err(e) => {
                    error!(id = %cmd.id, error = %e, "could not hand command to the owner thread");
                    report.host_closed = true;
                }
            }
        }

        match status {
            DrainStatus::Idle => self.recent.clear(),
            DrainStatus::ReadFailed(_) => {}
            DrainStatus::Parsed | DrainStatus::Malformed(_) if cleared => self.recent.clear(),
            DrainStatus::Parsed | DrainStatus::Malformed(_) => {
                for id in batch_ids {
                    self.recent.remember(id);
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perkbridge_core::{DispatchError, QueuedCommand};
    use perkbridge_host::channel;
    use std::fs;
    use tempfile::tempdir;

    #[derive(Default)]
    struct Recorder {
        lines: Vec<String>,
    }

    impl CommandDispatcher for Recorder {
        fn dispatch_console(&mut self, command_line: &str) -> Result<(), DispatchError> {
            self.lines.push(command_line.to_string());
            if command_line.starts_with("fail") {
                return Err(DispatchError::Failed("nope".into()));
            }
            Ok(())
        }
    }

    fn consumer_in(dir: &std::path::Path) -> CommandQueueConsumer {
        CommandQueueConsumer::new(QueueFile::new(dir.join("command_queue.json")), "webperks", 16)
    }

    #[test]
    fn single_command_is_stripped_and_executed() {
        let dir = tempdir().unwrap();
        let mut consumer = consumer_in(dir.path());
        fs::write(
            consumer.queue().path(),
            r#"[{"id":"1","command":"webperks grant_rank alice vip 7d","timestamp":"t1"}]"#,
        )
        .unwrap();

        let (handle, mut host) = channel(Recorder::default());
        let report = consumer.drain_and_execute(&handle);
        assert_eq!(report.submitted, 1);
        assert!(report.cleared);

        host.run_pending();
        assert_eq!(host.state().lines, vec!["grant_rank alice vip 7d"]);
    }

    #[test]
    fn bad_entries_do_not_block_siblings() {
        let dir = tempdir().unwrap();
        let mut consumer = consumer_in(dir.path());
        fs::write(
            consumer.queue().path(),
            r#"[
                {"id":"1","command":"webperks say one","timestamp":"t"},
                {"id":"2","command":"op mallory","timestamp":"t"},
                {"id":"3","command":"webperks","timestamp":"t"},
                {"id":"4","timestamp":"t"},
                {"id":"5","command":"webperks fail hard","timestamp":"t"},
                {"id":"6","command":"WEBPERKS say two","timestamp":"t"}
            ]"#,
        )
        .unwrap();

        let (handle, mut host) = channel(Recorder::default());
        let report = consumer.drain_and_execute(&handle);
        assert_eq!(report.read, 6);
        assert_eq!(report.rejected, 3);
        assert_eq!(report.submitted, 3);

        host.run_pending();
        assert_eq!(host.state().lines, vec!["say one", "fail hard", "say two"]);
    }

    #[test]
    fn absent_queue_submits_nothing_and_creates_nothing() {
        let dir = tempdir().unwrap();
        let mut consumer = consumer_in(dir.path());
        let (handle, mut host) = channel(Recorder::default());
        let report = consumer.drain_and_execute(&handle);
        assert_eq!(report, DrainReport::default());
        assert_eq!(host.run_pending(), 0);
        assert!(!consumer.queue().path().exists());
    }

    #[test]
    fn reused_ids_run_again_once_the_file_was_cleared() {
        let dir = tempdir().unwrap();
        let mut consumer = consumer_in(dir.path());
        let (handle, mut host) = channel(Recorder::default());

        fs::write(
            consumer.queue().path(),
            r#"[{"id":"1","command":"webperks grant_rank alice vip 7d","timestamp":"t"}]"#,
        )
        .unwrap();
        assert_eq!(consumer.drain_and_execute(&handle).submitted, 1);
        fs::write(
            consumer.queue().path(),
            r#"[{"id":"1","command":"webperks grant_rank bob vip 7d","timestamp":"t"}]"#,
        )
        .unwrap();
        let second = consumer.drain_and_execute(&handle);
        assert_eq!(second.submitted, 1);
        assert_eq!(second.skipped_seen, 0);

        host.run_pending();
        assert_eq!(host.state().lines, vec!["grant_rank alice vip 7d", "grant_rank bob vip 7d"]);
    }

    fn parsed(commands: &[(&str, &str)], cleared: bool) -> Drain {
        Drain {
            status: DrainStatus::Parsed,
            commands: commands
                .iter()
                .map(|(id, command)| QueuedCommand {
                    id: CommandId::from_str(*id),
                    command: command.to_string(),
                    timestamp: "t".into(),
                })
                .collect(),
            undecodable: 0,
            cleared,
        }
    }

    #[test]
    fn undeleted_file_still_executes_and_its_replay_is_skipped() {
        let dir = tempdir().unwrap();
        let mut consumer = consumer_in(dir.path());
        let (handle, mut host) = channel(Recorder::default());
        let batch = [("a", "webperks say one"), ("b", "webperks say two")];

        let first = consumer.execute_batch(parsed(&batch, false), &handle);
        assert_eq!(first.submitted, 2);
        assert!(!first.cleared);

        // Same file read again, now with a new entry appended, and deleted this time.
        let replay = consumer.execute_batch(
            parsed(&[batch[0], batch[1], ("c", "webperks say three")], true),
            &handle,
        );
        assert_eq!(replay.submitted, 1);
        assert_eq!(replay.skipped_seen, 2);

        // The file is gone, so the window is disarmed.
        let fresh = consumer.execute_batch(parsed(&batch, true), &handle);
        assert_eq!(fresh.submitted, 2);

        host.run_pending();
        assert_eq!(
            host.state().lines,
            vec!["say one", "say two", "say three", "say one", "say two"]
        );
    }

    #[test]
    fn remember_ids_zero_disables_the_replay_window() {
        let dir = tempdir().unwrap();
        let mut consumer =
            CommandQueueConsumer::new(QueueFile::new(dir.path().join("command_queue.json")), "webperks", 0);
        let (handle, _host) = channel(Recorder::default());
        let batch = [("a", "webperks say one")];
        assert_eq!(consumer.execute_batch(parsed(&batch, false), &handle).submitted, 1);
        assert_eq!(consumer.execute_batch(parsed(&batch, false), &handle).submitted, 1);
    }

    #[test]
    fn undecodable_entries_are_rejected_and_siblings_run() {
        let dir = tempdir().unwrap();
        let mut consumer = consumer_in(dir.path());
        fs::write(
            consumer.queue().path(),
            r#"[{"id":"1","command":"webperks say one"},{"id":"2","command":null},{"id":"3","command":"webperks say three"}]"#,
        )
        .unwrap();

        let (handle, mut host) = channel(Recorder::default());
        let report = consumer.drain_and_execute(&handle);
        assert_eq!(report.read, 3);
        assert_eq!(report.rejected, 1);
        assert_eq!(report.submitted, 2);
        assert!(report.cleared);
        assert!(!consumer.queue().path().exists());

        host.run_pending();
        assert_eq!(host.state().lines, vec!["say one", "say three"]);
    }

    #[test]
    fn duplicate_ids_within_one_batch_all_run() {
        let dir = tempdir().unwrap();
        let mut consumer = consumer_in(dir.path());
        fs::write(
            consumer.queue().path(),
            r#"[{"id":"x","command":"webperks say a","timestamp":"t"},{"id":"x","command":"webperks say b","timestamp":"t"}]"#,
        )
        .unwrap();
        let (handle, _host) = channel(Recorder::default());
        assert_eq!(consumer.drain_and_execute(&handle).submitted, 2);
    }

    #[test]
    fn closed_host_is_reported() {
        let dir = tempdir().unwrap();
        let mut consumer = consumer_in(dir.path());
        fs::write(consumer.queue().path(), r#"[{"id":"1","command":"webperks say a","timestamp":"t"}]"#).unwrap();
        let (handle, host) = channel(Recorder::default());
        drop(host);
        let report = consumer.drain_and_execute(&handle);
        assert!(report.host_closed);
        assert_eq!(report.submitted, 0);
    }

    #[test]
    fn recent_ids_forget_oldest() {
        let mut recent = RecentIds::new(2);
        for id in ["a", "b", "c"] {
            recent.remember(CommandId::from_str(id));
        }
        assert!(!recent.contains(&CommandId::from_str("a")));
        assert!(recent.contains(&CommandId::from_str("c")));
        assert!(!recent.contains(&CommandId::default()));
        recent.clear();
        assert!(recent.is_empty());
        assert!(!recent.contains(&CommandId::from_str("c")));
    }
}
