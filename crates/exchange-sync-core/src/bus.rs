//! The internal bus (spec.md §5, §6). Multi-producer/multi-consumer,
//! approximated with a `tokio::broadcast` channel of sufficient capacity; a
//! lagged subscriber treats the gap as "assume interesting" (conservative
//! and safe per the dispatch-idempotence property in spec.md §8).

use crate::model::ChangeKind;

/// Events this core publishes for downstream workers to consume (spec.md
/// §6 "Internal bus events (emitted)").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeEvent {
    /// A change of this kind was observed; downstream workers re-read the
    /// resources that moved.
    ExchangeChange(ChangeKind),
    /// Heartbeat edge transition (spec.md §4.F).
    NodeHeartbeatStateChange {
        restored: bool,
        org: String,
        id: String,
    },
    /// HTTP 401 fast-path (spec.md §4.F "Special").
    NodeShutdown,
}

/// Events this core consumes from the rest of the agent (spec.md §6
/// "Internal bus events (consumed)"). Mapped 1:1 onto `WorkerCommand` by
/// the event-intake task (spec.md §5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    DeviceRegistered {
        org: String,
        id: String,
        token: String,
    },
    AgreementReached,
    NodePolicy,
    NodeUserInput,
    AgreementEnded,
    /// Either `ExchangeChangesShutdown` or `NodeShutdownComplete` — spec.md
    /// §9 unifies both terminate messages behind one shutdown command.
    Shutdown { reason: ShutdownReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    MessageStop,
    UnconfigureComplete,
}
