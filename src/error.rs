use crate::base::EndpointState;
use thiserror::Error;

/// Broad failure categories an endpoint role can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The bus interface could not open an input or output path.
    InterfaceOpen,
    /// Node identity could not be bound into the transport endpoint.
    Binding,
    /// The transport endpoint rejected a subscription.
    Registration,
    /// Draining bus activity failed.
    Receive,
    /// Sending a transfer failed.
    Transmit,
    /// An operation was called in the wrong lifecycle state.
    Usage,
    /// Invalid configuration or bus setup.
    Configuration,
}

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to open interface {interface}: {reason}")]
    InterfaceOpen { interface: String, reason: String },

    #[error("Failed to bind node identity: {0}")]
    Binding(String),

    #[error("Failed to register port {port}: {reason}")]
    Registration { port: u16, reason: String },

    #[error("Invalid port ID: {0}")]
    InvalidPortId(u16),

    #[error("Subscription limit exceeded: {0}")]
    SubscriptionLimitExceeded(usize),

    #[error("Memory resource exhausted: requested {requested} bytes, {available} available")]
    MemoryExhausted { requested: usize, available: usize },

    #[error("Failed to receive: {0}")]
    Receive(String),

    #[error("Failed to transmit: {0}")]
    Transmit(String),

    #[error("Payload of {size} bytes does not fit a single frame (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Cannot {operation} while endpoint is {state}")]
    InvalidState {
        operation: &'static str,
        state: EndpointState,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Bus already exists: {0}")]
    BusExists(String),

    #[error("Bus not found: {0}")]
    BusNotFound(String),

    #[error("Bus is closed: {0}")]
    BusClosed(String),
}

impl Error {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InterfaceOpen { .. } => ErrorKind::InterfaceOpen,
            Error::Binding(_) => ErrorKind::Binding,
            Error::Registration { .. }
            | Error::InvalidPortId(_)
            | Error::SubscriptionLimitExceeded(_)
            | Error::MemoryExhausted { .. } => ErrorKind::Registration,
            Error::Receive(_) => ErrorKind::Receive,
            Error::Transmit(_) | Error::PayloadTooLarge { .. } => ErrorKind::Transmit,
            Error::InvalidState { .. } => ErrorKind::Usage,
            Error::InvalidConfig(_)
            | Error::BusExists(_)
            | Error::BusNotFound(_)
            | Error::BusClosed(_) => ErrorKind::Configuration,
        }
    }

    /// Short stable label (snake_case) for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            Error::InterfaceOpen { .. } => "interface_open",
            Error::Binding(_) => "binding",
            Error::Registration { .. } => "registration",
            Error::InvalidPortId(_) => "invalid_port_id",
            Error::SubscriptionLimitExceeded(_) => "subscription_limit_exceeded",
            Error::MemoryExhausted { .. } => "memory_exhausted",
            Error::Receive(_) => "receive",
            Error::Transmit(_) => "transmit",
            Error::PayloadTooLarge { .. } => "payload_too_large",
            Error::InvalidState { .. } => "invalid_state",
            Error::InvalidConfig(_) => "invalid_config",
            Error::BusExists(_) => "bus_exists",
            Error::BusNotFound(_) => "bus_not_found",
            Error::BusClosed(_) => "bus_closed",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Outcome of an operation that produces no value.
pub type Status = Result<()>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_groups_registration_failures() {
        assert_eq!(Error::InvalidPortId(9000).kind(), ErrorKind::Registration);
        assert_eq!(
            Error::SubscriptionLimitExceeded(4).kind(),
            ErrorKind::Registration
        );
        assert_eq!(
            Error::MemoryExhausted {
                requested: 64,
                available: 0
            }
            .kind(),
            ErrorKind::Registration
        );
    }

    #[test]
    fn test_invalid_state_message() {
        let err = Error::InvalidState {
            operation: "receive",
            state: EndpointState::Constructed,
        };
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert_eq!(err.as_label(), "invalid_state");
        assert_eq!(err.to_string(), "Cannot receive while endpoint is constructed");
    }
}
