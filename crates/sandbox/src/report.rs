use rumble::{InitResult, TurnResult};

/// Outcome of a session's init phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitReport {
    pub result: InitResult,
    /// Whatever the guest wrote to stderr. Never part of the result.
    pub diagnostics: String,
}

/// Outcome of one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReport {
    pub result: TurnResult,
    /// Whatever the guest wrote to stderr. Never part of the result.
    pub diagnostics: String,
}

/// Lifecycle shared by both transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Fresh,
    Ready,
    Faulted,
}

impl Phase {
    pub(crate) const fn check_turn(self) -> crate::Result<()> {
        match self {
            Self::Fresh => Err(crate::Error::NotInitialized),
            Self::Ready => Ok(()),
            Self::Faulted => Err(crate::Error::Faulted),
        }
    }

    pub(crate) const fn check_init(self) -> crate::Result<()> {
        match self {
            Self::Fresh => Ok(()),
            Self::Ready | Self::Faulted => Err(crate::Error::AlreadyInitialized),
        }
    }

    pub(crate) const fn after_init(result: &InitResult) -> Self {
        if result.is_ok() { Self::Ready } else { Self::Faulted }
    }
}
