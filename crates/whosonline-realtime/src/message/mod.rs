//! Message-bus frames and the presence payloads they carry.

pub mod envelope;
pub mod types;
pub mod validator;

pub use envelope::BusEnvelope;
pub use types::PushMessage;
