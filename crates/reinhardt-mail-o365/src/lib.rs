//! # Reinhardt Office 365 Email
//!
//! Django-style email backend that delivers messages through an Office 365
//! mailbox API instead of SMTP.
//!
//! ## Features
//!
//! - **O365Backend**: authenticates with client credentials, opens a mailbox
//!   session scoped to the sender address and sends each message through it
//! - **Fail Silently**: optionally absorb delivery failures and report them
//!   only through the sent count
//! - **HTML Alternatives**: the first `text/html` alternative becomes the
//!   message body
//! - **Attachments**: file references and in-memory content
//! - **Settings**: explicit values, environment variables or TOML
//! - **Memory Provider**: in-memory mailbox that records every call, for tests
//!
//! The mailbox API itself is not implemented here. It is reached through the
//! [`provider`] traits, which an HTTP client for the provider implements.
//!
//! ## Examples
//!
//! ```rust,no_run
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use reinhardt_mail_o365::memory::MemoryAuthClient;
//! use reinhardt_mail_o365::{EmailBackend, EmailMessage, O365Backend, O365Settings};
//! use std::sync::Arc;
//!
//! let settings = O365Settings::merge(
//!     O365Settings::new().with_sender("noreply@example.com"),
//!     O365Settings::from_env()?,
//! );
//!
//! let client = MemoryAuthClient::new();
//! let backend = O365Backend::new(settings, Arc::new(client.clone()));
//!
//! let email = EmailMessage::builder()
//!     .from("Example <noreply@example.com>")
//!     .to(vec!["user@example.com".to_string()])
//!     .subject("Welcome!")
//!     .body("Welcome to our service")
//!     .html("<h1>Welcome to our service</h1>")
//!     .build()?;
//!
//! let sent = backend.send_messages(&[email]).await?;
//! assert_eq!(sent, 1);
//! # Ok(())
//! # }
//! ```

pub mod address;
pub mod backend;
pub mod memory;
pub mod message;
pub mod provider;
pub mod settings;

use thiserror::Error;

pub use address::{parse_address, sanitize_address};
pub use backend::{EmailBackend, O365Backend};
pub use message::{Alternative, Attachment, EmailMessage, EmailMessageBuilder};
pub use provider::{
	Account, AttachmentSource, AuthClient, AuthFlow, BodyType, ClientCredentials, Mailbox,
	OutgoingMessage, TransportError, TransportResult,
};
pub use settings::O365Settings;

#[derive(Debug, Error)]
pub enum EmailError {
	#[error("Configuration error: {0}")]
	Configuration(String),

	#[error("Authentication failed: {0}")]
	Authentication(String),

	#[error("Transport error: {0}")]
	Transport(#[source] TransportError),

	#[error("Invalid email address: {0}")]
	InvalidAddress(String),

	#[error("Header injection attempt detected: {0}")]
	HeaderInjection(String),

	#[error("Unknown encoding: {0}")]
	UnknownEncoding(String),
}

impl EmailError {
	/// Whether the error was raised by the mailbox provider rather than by
	/// local configuration or message validation.
	pub fn is_transport(&self) -> bool {
		matches!(self, EmailError::Transport(_))
	}
}

pub type EmailResult<T> = std::result::Result<T, EmailError>;
