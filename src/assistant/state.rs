//! Assistant state shared with the interactive layer
//!
//! Stored in an `AtomicU8` so the console can read it without locking while
//! the worker transitions.

use std::sync::atomic::{AtomicU8, Ordering};

/// Where the assistant loop is in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AssistantState {
    /// Not started, or waiting for a microphone
    Idle = 0,
    /// Capturing and recognizing a phrase
    Listening = 1,
    /// Choosing a reply
    Dispatching = 2,
    /// Synthesizing and playing the reply
    Speaking = 3,
    /// The loop has exited
    Stopped = 4,
}

impl AssistantState {
    const fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Listening,
            2 => Self::Dispatching,
            3 => Self::Speaking,
            4 => Self::Stopped,
            _ => Self::Idle,
        }
    }
}

impl std::fmt::Display for AssistantState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Listening => write!(f, "listening"),
            Self::Dispatching => write!(f, "dispatching"),
            Self::Speaking => write!(f, "speaking"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Lock-free holder for the current [`AssistantState`]
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl Default for StateCell {
    fn default() -> Self {
        Self(AtomicU8::new(AssistantState::Idle as u8))
    }
}

impl StateCell {
    #[must_use]
    pub fn get(&self) -> AssistantState {
        AssistantState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Store `next`, returning the previous state
    pub fn set(&self, next: AssistantState) -> AssistantState {
        AssistantState::from_u8(self.0.swap(next as u8, Ordering::AcqRel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_cell_swaps() {
        let cell = StateCell::default();
        assert_eq!(cell.get(), AssistantState::Idle);
        assert_eq!(cell.set(AssistantState::Listening), AssistantState::Idle);
        assert_eq!(cell.set(AssistantState::Speaking), AssistantState::Listening);
        assert_eq!(cell.get(), AssistantState::Speaking);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(AssistantState::Dispatching.to_string(), "dispatching");
        assert_eq!(AssistantState::Stopped.to_string(), "stopped");
    }
}
