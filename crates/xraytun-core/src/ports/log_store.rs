//! Durable sink for engine output lines.

/// Append-only store for engine log lines.
///
/// `append` is called synchronously from the output read loop before
/// any batched notification is emitted, so lines survive even if the
/// host process is killed immediately afterwards.
pub trait LogStore: Send + Sync {
    fn append(&self, line: &str);

    /// Drop all stored lines. Called when a new session starts.
    fn clear(&self);
}
