//! Session state shared between the capture path and the consumer

use crate::protocol::ShockCommand;

/// Whether the session is currently capturing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionStatus {
    Running,
    #[default]
    Stopped,
}

/// Dispatch loop counters and the most recent command pair
#[derive(Debug, Clone, Default)]
pub struct DispatchStats {
    /// Buffers handed to the dispatch loop
    pub buffers: u64,

    /// Buffers answered with the silence pair without analysis
    pub degenerate: u64,

    /// Command pairs written to the peripheral
    pub sent: u64,

    /// Command pairs dropped because the peripheral was not ready
    pub skipped: u64,

    /// Command pairs whose write failed
    pub failed: u64,

    /// Buffers replaced in the mailbox before dispatch (drop-oldest policy)
    pub dropped: u64,

    /// Last command pair produced (channel A, channel B)
    pub last: Option<(ShockCommand, ShockCommand)>,
}

/// Snapshot of a session
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub status: SessionStatus,
    pub stats: DispatchStats,
}
