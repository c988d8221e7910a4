//! Outbound email for magic links.
//!
//! Delivery itself is an external collaborator. The core only needs
//! [`EmailTransport`]; [`LogTransport`] is the stand-in used until a real
//! provider is wired in.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Email delivery errors
#[derive(Debug, Error)]
pub enum EmailError {
    /// Transport refused or failed to deliver the message
    #[error("Delivery failed: {0}")]
    Delivery(String),

    /// Transport is not configured
    #[error("Email transport unavailable")]
    Unavailable,
}

/// Magic-link message handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MagicLinkEmail {
    pub to: String,
    pub from: String,
    pub link: String,
    pub expires_in_secs: i64,
}

/// Sends magic-link emails.
#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send_magic_link(&self, message: &MagicLinkEmail) -> Result<(), EmailError>;
}

/// Transport that only records the send in the log.
#[derive(Debug, Default, Clone)]
pub struct LogTransport;

#[async_trait]
impl EmailTransport for LogTransport {
    async fn send_magic_link(&self, message: &MagicLinkEmail) -> Result<(), EmailError> {
        // The link itself is a credential and stays out of the log.
        log::info!(
            "Scheduled magic link email to {} from {} (expires in {}s)",
            message.to,
            message.from,
            message.expires_in_secs
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_transport_always_succeeds() {
        let message = MagicLinkEmail {
            to: "a@x.com".to_string(),
            from: "noreply@analyzer.local".to_string(),
            link: "http://localhost/auth/magic-link/consume?token=abc".to_string(),
            expires_in_secs: 900,
        };
        assert!(LogTransport.send_magic_link(&message).await.is_ok());
    }
}
