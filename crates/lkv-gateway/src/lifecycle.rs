use std::fmt;

use crate::error::{GatewayError, GatewayResult};

/// Phase of one gateway operation.
///
/// ```text
/// Idle -> SessionOpening -> IdentityResolving -> ConnectionEstablished
///      -> Dispatching -> Completed | Failed -> Closing -> Closed
/// ```
///
/// Any phase before `Closing` may move to `Failed`, and `Failed` always
/// proceeds to `Closing`. `Closed` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationPhase {
    Idle,
    SessionOpening,
    IdentityResolving,
    ConnectionEstablished,
    Dispatching,
    Completed,
    Failed,
    Closing,
    Closed,
}

impl OperationPhase {
    pub fn is_terminal(self) -> bool {
        self == Self::Closed
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: OperationPhase) -> bool {
        use OperationPhase::*;
        match (self, next) {
            (Idle, SessionOpening)
            | (SessionOpening, IdentityResolving)
            | (IdentityResolving, ConnectionEstablished)
            | (ConnectionEstablished, Dispatching)
            | (Dispatching, Completed)
            | (Completed, Closing)
            | (Failed, Closing)
            | (Closing, Closed) => true,
            (Idle | SessionOpening | IdentityResolving | ConnectionEstablished | Dispatching, Failed) => {
                true
            }
            _ => false,
        }
    }
}

impl fmt::Display for OperationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::SessionOpening => "session_opening",
            Self::IdentityResolving => "identity_resolving",
            Self::ConnectionEstablished => "connection_established",
            Self::Dispatching => "dispatching",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Tracks the phases one operation has passed through.
#[derive(Clone, Debug)]
pub struct OperationLifecycle {
    phase: OperationPhase,
    history: Vec<OperationPhase>,
}

impl Default for OperationLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationLifecycle {
    pub fn new() -> Self {
        Self {
            phase: OperationPhase::Idle,
            history: vec![OperationPhase::Idle],
        }
    }

    pub fn phase(&self) -> OperationPhase {
        self.phase
    }

    /// Every phase entered so far, starting with `Idle`.
    pub fn history(&self) -> &[OperationPhase] {
        &self.history
    }

    pub fn advance(&mut self, next: OperationPhase) -> GatewayResult<()> {
        if !self.phase.can_transition_to(next) {
            return Err(GatewayError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        tracing::trace!(from = %self.phase, to = %next, "operation phase");
        self.phase = next;
        self.history.push(next);
        Ok(())
    }

    /// Mark the operation failed. No-op once dispatch has finished or
    /// teardown has started.
    pub fn fail(&mut self) {
        if self.phase.can_transition_to(OperationPhase::Failed) {
            self.phase = OperationPhase::Failed;
            self.history.push(OperationPhase::Failed);
        }
    }

    /// Run teardown phases from `Completed` or `Failed` through `Closed`.
    /// An operation still in progress is failed first.
    pub fn close(&mut self) {
        if self.phase.is_terminal() {
            return;
        }
        self.fail();
        for next in [OperationPhase::Closing, OperationPhase::Closed] {
            if self.phase.can_transition_to(next) {
                self.phase = next;
                self.history.push(next);
            }
        }
    }
}
