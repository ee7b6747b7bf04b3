//! Signaling error taxonomy, error codes, and user-facing recovery hints.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignalError {
    /// A frame or envelope that could not be decoded. Dropped, never fatal.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The peer transport rejected an offer/answer or a description.
    #[error("negotiation failed: {0}")]
    Negotiation(String),

    /// The relay connection failed or closed.
    #[error("relay connection lost: {0}")]
    Channel(String),

    /// The relay refused the login name.
    #[error("name {name:?} is already taken")]
    IdentityCollision { name: String },

    #[error("name must not be empty")]
    EmptyName,

    #[error("cannot call {0:?}")]
    InvalidTarget(String),

    #[error("no call in progress")]
    NotInCall,

    #[error("no answer from {peer}")]
    NegotiationTimeout { peer: String },
}

impl SignalError {
    pub fn error_code(&self) -> &str {
        match self {
            Self::Protocol(_) => "protocol",
            Self::Negotiation(_) => "negotiation",
            Self::Channel(_) => "channel",
            Self::IdentityCollision { .. } => "identity_collision",
            Self::EmptyName => "empty_name",
            Self::InvalidTarget(_) => "invalid_target",
            Self::NotInCall => "not_in_call",
            Self::NegotiationTimeout { .. } => "negotiation_timeout",
        }
    }

    /// What the user can do about it.
    pub fn hint(&self) -> &'static str {
        match self {
            Self::Protocol(_) => "the message was ignored",
            Self::Negotiation(_) | Self::NegotiationTimeout { .. } => {
                "the call was aborted; try calling again"
            }
            Self::Channel(_) => "restart the client to reconnect",
            Self::IdentityCollision { .. } => "try a different username",
            Self::EmptyName => "enter a username",
            Self::InvalidTarget(_) => "enter the name of another user",
            Self::NotInCall => "start a call first",
        }
    }

    /// Whether the client cannot continue after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Channel(_))
    }
}
