//! Routes decoded relay envelopes to call state machine handlers.
//!
//! Envelopes with a missing or unknown `type`, or a known type without the
//! payload its handler needs, are dropped with a warning. Nothing here is
//! ever fatal and a dropped envelope never touches session state.

use tracing::{debug, warn};

use super::protocol::{Envelope, EnvelopeKind};
use crate::call::CallMachine;

/// Result of dispatching one envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchResult {
    /// Handed to the state machine (which may still ignore it for its state).
    Handled(EnvelopeKind),
    /// Not routable; the reason is for diagnostics.
    Dropped(String),
}

/// Route one envelope by its `type`.
pub fn dispatch(machine: &mut CallMachine, envelope: Envelope) -> DispatchResult {
    let Some(kind) = envelope.kind else {
        return drop_envelope("missing type".to_string());
    };
    debug!(kind = kind.as_str(), "dispatching envelope");

    match kind {
        EnvelopeKind::Login => match envelope.success {
            Some(success) => machine.handle_login(success),
            None => return drop_envelope("login without success flag".to_string()),
        },
        EnvelopeKind::Offer => match (envelope.offer, envelope.name) {
            (Some(offer), Some(name)) if !name.is_empty() => machine.handle_offer(offer, name),
            (None, _) => return drop_envelope("offer without description".to_string()),
            _ => return drop_envelope("offer without caller name".to_string()),
        },
        EnvelopeKind::Answer => match envelope.answer {
            Some(answer) => machine.handle_answer(answer, envelope.name.as_deref()),
            None => return drop_envelope("answer without description".to_string()),
        },
        EnvelopeKind::Candidate => match envelope.candidate {
            Some(candidate) => {
                machine.handle_candidate(candidate, envelope.name.as_deref())
            }
            None => return drop_envelope("candidate without payload".to_string()),
        },
        EnvelopeKind::Leave => machine.handle_leave(envelope.name.as_deref()),
        EnvelopeKind::Unknown => return drop_envelope("unknown type".to_string()),
    }
    DispatchResult::Handled(kind)
}

fn drop_envelope(reason: String) -> DispatchResult {
    warn!(%reason, "dropping relay envelope");
    DispatchResult::Dropped(reason)
}
