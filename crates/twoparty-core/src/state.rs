//! Lifecycle of a single operation

use crate::{wire::Operation, Error, Result};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Idle,
    Connecting,
    /// Waiting on or processing round `n` (1-based)
    RoundExchange(u8),
    Finalizing,
    Done,
    Aborted,
}

impl OperationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, OperationState::Done | OperationState::Aborted)
    }

    /// Whether `next` may follow `self`
    pub fn can_advance_to(self, next: OperationState) -> bool {
        use OperationState::*;
        match (self, next) {
            (Done | Aborted, _) => false,
            (_, Aborted) => true,
            (Idle, Connecting) => true,
            (Connecting, RoundExchange(1)) => true,
            (RoundExchange(n), RoundExchange(m)) => m == n.saturating_add(1),
            (RoundExchange(_), Finalizing) => true,
            (Finalizing, Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationState::Idle => f.write_str("idle"),
            OperationState::Connecting => f.write_str("connecting"),
            OperationState::RoundExchange(n) => write!(f, "round-{n}"),
            OperationState::Finalizing => f.write_str("finalizing"),
            OperationState::Done => f.write_str("done"),
            OperationState::Aborted => f.write_str("aborted"),
        }
    }
}

/// Tracks one operation through its states, refusing illegal transitions
#[derive(Debug)]
pub struct StateMachine {
    operation: Operation,
    state: OperationState,
}

impl StateMachine {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            state: OperationState::Idle,
        }
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn state(&self) -> OperationState {
        self.state
    }

    pub fn advance(&mut self, next: OperationState) -> Result<()> {
        if !self.state.can_advance_to(next) {
            return Err(Error::Internal(format!(
                "{} cannot move from {} to {}",
                self.operation, self.state, next
            )));
        }
        debug!(operation = %self.operation, from = %self.state, to = %next, "State transition");
        self.state = next;
        Ok(())
    }

    /// Move to `Aborted`; no-op once terminal
    pub fn abort(&mut self) {
        if !self.state.is_terminal() {
            debug!(operation = %self.operation, from = %self.state, "Operation aborted");
            self.state = OperationState::Aborted;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut machine = StateMachine::new(Operation::Sign);
        machine.advance(OperationState::Connecting).unwrap();
        machine.advance(OperationState::RoundExchange(1)).unwrap();
        machine.advance(OperationState::RoundExchange(2)).unwrap();
        machine.advance(OperationState::Finalizing).unwrap();
        machine.advance(OperationState::Done).unwrap();
        assert!(machine.state().is_terminal());
    }

    #[test]
    fn test_rounds_must_be_consecutive() {
        let mut machine = StateMachine::new(Operation::Keygen);
        machine.advance(OperationState::Connecting).unwrap();
        assert!(machine.advance(OperationState::RoundExchange(2)).is_err());
        machine.advance(OperationState::RoundExchange(1)).unwrap();
        assert!(machine.advance(OperationState::RoundExchange(3)).is_err());
    }

    #[test]
    fn test_abort_from_any_live_state() {
        for state in [
            OperationState::Idle,
            OperationState::Connecting,
            OperationState::RoundExchange(2),
            OperationState::Finalizing,
        ] {
            assert!(state.can_advance_to(OperationState::Aborted));
        }
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut machine = StateMachine::new(Operation::Rotate);
        machine.abort();
        assert_eq!(machine.state(), OperationState::Aborted);
        assert!(machine.advance(OperationState::Connecting).is_err());
        machine.abort();
        assert_eq!(machine.state(), OperationState::Aborted);
        assert!(!OperationState::Done.can_advance_to(OperationState::Aborted));
    }
}
