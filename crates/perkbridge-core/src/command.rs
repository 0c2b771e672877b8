use thiserror::Error;

/// Namespace token every queued command starts with.
pub const NAMESPACE: &str = "webperks";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("command is empty")]
    Empty,
    #[error("command has no action after the namespace: {0:?}")]
    MissingAction(String),
    #[error("command does not start with namespace {expected:?}: {command:?}")]
    WrongNamespace { expected: String, command: String },
}

/// Validate a queued command line and strip its namespace token.
///
/// The line must hold at least two whitespace-separated tokens and the first
/// one must equal `namespace` (ASCII case-insensitive). The remainder is
/// returned with its internal spacing preserved.
pub fn strip_namespace<'a>(namespace: &str, command: &'a str) -> Result<&'a str, CommandError> {
    let line = command.trim();
    if line.is_empty() {
        return Err(CommandError::Empty);
    }

    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim_start()),
        None => (line, ""),
    };

    if !head.eq_ignore_ascii_case(namespace) {
        return Err(CommandError::WrongNamespace {
            expected: namespace.to_string(),
            command: command.to_string(),
        });
    }
    if rest.is_empty() {
        return Err(CommandError::MissingAction(command.to_string()));
    }
    Ok(rest)
}

/// How long a granted rank lasts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RankDuration {
    Days(u32),
    Permanent,
}

impl std::fmt::Display for RankDuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RankDuration::Days(d) => write!(f, "{d}d"),
            RankDuration::Permanent => f.write_str("permanent"),
        }
    }
}

/// `webperks grant_rank <player> <rank> <duration>`
pub fn grant_rank_command(player: &str, rank: &str, duration: RankDuration) -> String {
    format!("{NAMESPACE} grant_rank {player} {rank} {duration}")
}

/// `webperks deliver_item <player> <item> <quantity>`
pub fn deliver_item_command(player: &str, item_id: &str, quantity: u32) -> String {
    format!("{NAMESPACE} deliver_item {player} {item_id} {quantity}")
}
