use super::command::Command;
use crate::error::{Result, SettlementError};
use std::io::BufRead;

/// Reads settlement commands from a JSON-lines source.
///
/// Blank lines and lines starting with `#` are skipped. A malformed line
/// yields an error for that line only; reading continues with the next one.
pub struct CommandReader<R: BufRead> {
    source: R,
}

impl<R: BufRead> CommandReader<R> {
    /// Creates a new `CommandReader` from any buffered source (e.g., `BufReader<File>`).
    pub fn new(source: R) -> Self {
        Self { source }
    }

    /// Returns an iterator that lazily reads and parses commands.
    pub fn commands(self) -> impl Iterator<Item = Result<Command>> {
        self.source
            .lines()
            .enumerate()
            .filter_map(|(index, line)| match line {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() || trimmed.starts_with('#') {
                        None
                    } else {
                        Some(serde_json::from_str(trimmed).map_err(|err| {
                            SettlementError::ValidationError(format!(
                                "line {}: {err}",
                                index + 1
                            ))
                        }))
                    }
                }
                Err(err) => Some(Err(SettlementError::from(err))),
            })
    }
}
