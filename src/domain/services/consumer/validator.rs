use async_trait::async_trait;
use thiserror::Error;

use crate::domain::models::EventMessage;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Envelope field {0} is missing or blank")]
    MissingField(&'static str),

    #[error("Envelope rejected: {0}")]
    Rejected(String),
}

/// Checks an envelope before it is processed.
///
/// A failed validation is retried like a processing failure, since a
/// validator may depend on state outside the message.
#[async_trait]
pub trait MessageValidator: Send + Sync {
    async fn validate(&self, envelope: &EventMessage) -> Result<(), ValidationError>;
}

/// Structural checks on fields decoding alone cannot enforce.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultMessageValidator;

#[async_trait]
impl MessageValidator for DefaultMessageValidator {
    async fn validate(&self, envelope: &EventMessage) -> Result<(), ValidationError> {
        if envelope.id.trim().is_empty() {
            return Err(ValidationError::MissingField("id"));
        }
        if envelope.version.trim().is_empty() {
            return Err(ValidationError::MissingField("version"));
        }
        if envelope.routing_key().trim().is_empty() {
            return Err(ValidationError::MissingField("metadata.routing.key"));
        }
        Ok(())
    }
}
