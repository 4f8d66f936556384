use crate::{
    error::ScanError,
    types::{ScanOutcome, SessionEvent, SessionState},
};

/// Input driving a scan session transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionInput {
    /// Host started the session.
    Start,
    /// User asked to try permission again after a denial.
    RetryPermission,
    /// The OS permission prompt granted access.
    PermissionGranted,
    /// The OS permission prompt denied access.
    PermissionDenied,
    /// Resolve the session with an outcome.
    Resolve(ScanOutcome),
}

impl SessionInput {
    fn action(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::RetryPermission => "retry_permission",
            Self::PermissionGranted => "permission_granted",
            Self::PermissionDenied => "permission_denied",
            Self::Resolve(ScanOutcome::Found { .. }) => "decode_candidate",
            Self::Resolve(ScanOutcome::Cancelled) => "cancel",
            Self::Resolve(ScanOutcome::Error { .. }) => "fatal_error",
        }
    }
}

/// Pure session transition table. Callers serialize access.
#[derive(Debug, Clone, Default)]
pub struct ScanStateMachine {
    state: SessionState,
    outcome: Option<ScanOutcome>,
}

impl ScanStateMachine {
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Outcome recorded by the resolving transition.
    pub fn outcome(&self) -> Option<&ScanOutcome> {
        self.outcome.as_ref()
    }

    pub fn apply(&mut self, input: &SessionInput) -> Result<Vec<SessionEvent>, ScanError> {
        use SessionState::*;

        if self.state == Resolved {
            return Err(match input {
                SessionInput::Resolve(ScanOutcome::Found { .. }) => {
                    ScanError::candidate_after_resolution()
                }
                other => ScanError::session_resolved(other.action()),
            });
        }

        match input {
            SessionInput::Start => self.transition_from_state(Idle, AwaitingPermission, input),
            SessionInput::RetryPermission => {
                self.transition_from_state(PermissionDenied, AwaitingPermission, input)
            }
            SessionInput::PermissionGranted => {
                self.transition_from_state(AwaitingPermission, Scanning, input)
            }
            SessionInput::PermissionDenied => {
                self.transition_from_state(AwaitingPermission, PermissionDenied, input)
            }
            SessionInput::Resolve(outcome) => {
                let allowed: &[SessionState] = match outcome {
                    ScanOutcome::Found { .. } => &[Scanning],
                    ScanOutcome::Cancelled => &[Idle, AwaitingPermission, PermissionDenied, Scanning],
                    ScanOutcome::Error { .. } => &[AwaitingPermission, PermissionDenied, Scanning],
                };
                let events = self.transition_from_any_of(allowed, Resolved, input)?;
                self.outcome = Some(outcome.clone());
                Ok(events)
            }
        }
    }

    fn transition_from_state(
        &mut self,
        expected: SessionState,
        next: SessionState,
        input: &SessionInput,
    ) -> Result<Vec<SessionEvent>, ScanError> {
        self.transition_from_any_of(&[expected], next, input)
    }

    fn transition_from_any_of(
        &mut self,
        expected: &[SessionState],
        next: SessionState,
        input: &SessionInput,
    ) -> Result<Vec<SessionEvent>, ScanError> {
        if !expected.contains(&self.state) {
            return Err(ScanError::invalid_state(self.state, input.action()));
        }
        self.state = next;
        Ok(vec![SessionEvent::StateChanged { state: next }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BarcodeFormat;

    fn found(raw: &str) -> SessionInput {
        SessionInput::Resolve(ScanOutcome::Found {
            raw_content: raw.to_owned(),
            format: BarcodeFormat::Qr,
            format_note: String::new(),
        })
    }

    fn scanning() -> ScanStateMachine {
        let mut sm = ScanStateMachine::default();
        sm.apply(&SessionInput::Start).expect("start must work");
        sm.apply(&SessionInput::PermissionGranted)
            .expect("grant must work");
        sm
    }

    #[test]
    fn runs_happy_path_state_transitions() {
        let mut sm = ScanStateMachine::default();
        assert_eq!(sm.state(), SessionState::Idle);

        let events = sm.apply(&SessionInput::Start).expect("start must work");
        assert_eq!(
            events,
            vec![SessionEvent::StateChanged {
                state: SessionState::AwaitingPermission
            }]
        );

        sm.apply(&SessionInput::PermissionGranted)
            .expect("grant must work");
        assert_eq!(sm.state(), SessionState::Scanning);

        sm.apply(&found("ABC")).expect("first candidate must resolve");
        assert_eq!(sm.state(), SessionState::Resolved);
        assert!(matches!(
            sm.outcome(),
            Some(ScanOutcome::Found { raw_content, .. }) if raw_content == "ABC"
        ));
    }

    #[test]
    fn first_candidate_wins_and_later_ones_are_flagged() {
        let mut sm = scanning();
        sm.apply(&found("ABC")).expect("first candidate must resolve");

        let err = sm
            .apply(&found("XYZ"))
            .expect_err("second candidate must be rejected");
        assert_eq!(err.code, "candidate_after_resolution");
        assert!(matches!(
            sm.outcome(),
            Some(ScanOutcome::Found { raw_content, .. }) if raw_content == "ABC"
        ));
    }

    #[test]
    fn denial_and_retry_reenter_awaiting_permission() {
        let mut sm = ScanStateMachine::default();
        sm.apply(&SessionInput::Start).expect("start must work");
        sm.apply(&SessionInput::PermissionDenied)
            .expect("deny must work");
        assert_eq!(sm.state(), SessionState::PermissionDenied);

        sm.apply(&SessionInput::RetryPermission)
            .expect("retry must work");
        assert_eq!(sm.state(), SessionState::AwaitingPermission);
    }

    #[test]
    fn cancel_resolves_from_any_live_state() {
        for prefix in [
            vec![],
            vec![SessionInput::Start],
            vec![SessionInput::Start, SessionInput::PermissionDenied],
            vec![SessionInput::Start, SessionInput::PermissionGranted],
        ] {
            let mut sm = ScanStateMachine::default();
            for input in &prefix {
                sm.apply(input).expect("prefix must apply");
            }
            sm.apply(&SessionInput::Resolve(ScanOutcome::Cancelled))
                .expect("cancel must resolve");
            assert_eq!(sm.outcome(), Some(&ScanOutcome::Cancelled));
        }
    }

    #[test]
    fn cancel_after_resolution_is_rejected_without_changing_outcome() {
        let mut sm = scanning();
        sm.apply(&SessionInput::Resolve(ScanOutcome::Cancelled))
            .expect("cancel must resolve");

        let err = sm
            .apply(&SessionInput::Resolve(ScanOutcome::Cancelled))
            .expect_err("second cancel must be rejected");
        assert_eq!(err.code, "session_resolved");
        assert_eq!(sm.outcome(), Some(&ScanOutcome::Cancelled));
    }

    #[test]
    fn rejects_candidates_before_scanning() {
        let mut sm = ScanStateMachine::default();
        sm.apply(&SessionInput::Start).expect("start must work");

        let err = sm
            .apply(&found("early"))
            .expect_err("candidate must fail while awaiting permission");
        assert_eq!(err.code, "invalid_state_transition");
        assert_eq!(sm.state(), SessionState::AwaitingPermission);
    }

    #[test]
    fn fatal_error_needs_a_started_session() {
        let mut sm = ScanStateMachine::default();
        let err = sm
            .apply(&SessionInput::Resolve(ScanOutcome::error("boom")))
            .expect_err("fatal error must fail while idle");
        assert_eq!(err.code, "invalid_state_transition");

        sm.apply(&SessionInput::Start).expect("start must work");
        sm.apply(&SessionInput::Resolve(ScanOutcome::error("boom")))
            .expect("fatal error must resolve while awaiting permission");
        assert_eq!(sm.outcome(), Some(&ScanOutcome::error("boom")));
    }

    #[test]
    fn rejects_double_start() {
        let mut sm = ScanStateMachine::default();
        sm.apply(&SessionInput::Start).expect("start must work");
        let err = sm
            .apply(&SessionInput::Start)
            .expect_err("second start must fail");
        assert_eq!(err.code, "invalid_state_transition");
    }
}
