//! Typed external process invocation.
//!
//! Commands are built from an argument list, never from an interpolated
//! shell string, and always come back as a structured
//! `(exit_code, stdout, stderr)` result.

mod error;
mod runner;
mod types;

pub use error::CommandError;
pub use runner::{CommandRunner, TokioCommandRunner};
pub use types::{tail_lines, CommandOutput, CommandSpec};

/// Quote one word for a POSIX shell.
///
/// Only needed where a remote side re-parses arguments (ssh), never for
/// local invocations.
pub fn shell_quote(word: &str) -> String {
    if !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@%+,".contains(c))
    {
        return word.to_string();
    }
    format!("'{}'", word.replace('\'', r"'\''"))
}

/// Name of this host, used as the `location` in status reports.
pub fn hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}
