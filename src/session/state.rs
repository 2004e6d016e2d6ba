//! Session state machine.

/// Connection state of the single wallet session slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No valid session is cached.
    #[default]
    Absent,
    /// A session is cached and has not expired.
    Active,
}

/// What moved the slot from one state to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Create,
    Extend,
    Terminate,
    Expire,
}

impl SessionState {
    /// Check if `transition` is allowed from this state.
    ///
    /// Valid transitions:
    /// - Absent -> Active (create)
    /// - Active -> Active (create supersedes, extend)
    /// - Active -> Absent (terminate, expire)
    pub fn can_apply(&self, transition: Transition) -> bool {
        use SessionState::*;
        use Transition::*;
        matches!(
            (*self, transition),
            (Absent, Create)
                | (Active, Create)
                | (Active, Extend)
                | (Active, Terminate)
                | (Active, Expire)
        )
    }

    /// Apply a transition, returning the resulting state.
    ///
    /// Disallowed transitions leave the state unchanged and return `None`.
    pub fn apply(&mut self, transition: Transition) -> Option<SessionState> {
        if !self.can_apply(transition) {
            return None;
        }
        *self = match transition {
            Transition::Create | Transition::Extend => SessionState::Active,
            Transition::Terminate | Transition::Expire => SessionState::Absent,
        };
        Some(*self)
    }

    /// Check if a session is held.
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Active)
    }
}
