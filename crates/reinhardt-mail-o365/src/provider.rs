//! Mailbox provider interface
//!
//! The backend never speaks the mailbox wire protocol itself. It drives a
//! provider through these traits: an [`AuthClient`] exchanges client
//! credentials for an [`Account`], the account derives a [`Mailbox`] scoped to
//! the sender address, and the mailbox constructs [`OutgoingMessage`]s that are
//! populated and sent.
//!
//! # Examples
//!
//! ```rust
//! use reinhardt_mail_o365::provider::{
//!     Account, AuthClient, AuthFlow, ClientCredentials, TransportResult,
//! };
//! use async_trait::async_trait;
//!
//! struct DenyAll;
//!
//! #[async_trait]
//! impl AuthClient for DenyAll {
//!     async fn authenticate(
//!         &self,
//!         _credentials: &ClientCredentials,
//!         _flow: AuthFlow,
//!     ) -> TransportResult<Option<Box<dyn Account>>> {
//!         Ok(None)
//!     }
//! }
//! ```

use async_trait::async_trait;
use std::fmt;
use std::io::Cursor;

/// Opaque error raised by a provider implementation.
pub type TransportError = Box<dyn std::error::Error + Send + Sync>;

pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// OAuth flow requested from the auth client.
///
/// The backend authenticates as the application itself. New flows can be
/// added without breaking provider implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum AuthFlow {
	/// Client credentials grant (application permissions)
	Credentials,
}

impl AuthFlow {
	pub fn as_str(&self) -> &'static str {
		match self {
			AuthFlow::Credentials => "credentials",
		}
	}
}

impl fmt::Display for AuthFlow {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Application credentials handed to the auth client.
///
/// The secret never appears in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredentials {
	tenant_id: String,
	client_id: String,
	client_secret: String,
}

impl ClientCredentials {
	pub fn new(
		tenant_id: impl Into<String>,
		client_id: impl Into<String>,
		client_secret: impl Into<String>,
	) -> Self {
		Self {
			tenant_id: tenant_id.into(),
			client_id: client_id.into(),
			client_secret: client_secret.into(),
		}
	}

	pub fn tenant_id(&self) -> &str {
		&self.tenant_id
	}

	pub fn client_id(&self) -> &str {
		&self.client_id
	}

	pub fn client_secret(&self) -> &str {
		&self.client_secret
	}
}

impl fmt::Debug for ClientCredentials {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ClientCredentials")
			.field("tenant_id", &self.tenant_id)
			.field("client_id", &self.client_id)
			.field("client_secret", &"[REDACTED]")
			.finish()
	}
}

impl Drop for ClientCredentials {
	fn drop(&mut self) {
		zeroize::Zeroize::zeroize(&mut self.client_secret);
	}
}

/// Content type of a provider message body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyType {
	Text,
	Html,
}

impl BodyType {
	/// Name used by the mailbox API (`"Text"` or `"HTML"`).
	pub fn as_str(&self) -> &'static str {
		match self {
			BodyType::Text => "Text",
			BodyType::Html => "HTML",
		}
	}
}

impl fmt::Display for BodyType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Argument of a single attachment-add call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentSource {
	/// File reference; the provider resolves it when the message is sent
	Path(String),
	/// In-memory content as `(stream, filename)` pairs
	Streams(Vec<(Cursor<Vec<u8>>, String)>),
}

/// Authenticates application credentials.
#[async_trait]
pub trait AuthClient: Send + Sync {
	/// Exchange credentials for an authenticated account.
	///
	/// Returns `Ok(None)` when the provider rejects the credentials.
	async fn authenticate(
		&self,
		credentials: &ClientCredentials,
		flow: AuthFlow,
	) -> TransportResult<Option<Box<dyn Account>>>;
}

/// Authenticated account handle.
pub trait Account: Send + Sync {
	/// Derive a mailbox session scoped to `resource` (a mailbox address).
	fn mailbox(&self, resource: &str) -> TransportResult<Box<dyn Mailbox>>;
}

/// Mailbox session through which outgoing messages are built.
pub trait Mailbox: Send + Sync {
	/// Mailbox address the session is scoped to
	fn resource(&self) -> &str;

	fn new_message(&self) -> TransportResult<Box<dyn OutgoingMessage>>;
}

/// Provider-side message under construction.
#[async_trait]
pub trait OutgoingMessage: Send {
	fn add_recipient(&mut self, address: &str) -> TransportResult<()>;

	fn set_subject(&mut self, subject: &str);

	fn set_body(&mut self, body: &str, body_type: BodyType);

	fn add_attachments(&mut self, source: AttachmentSource) -> TransportResult<()>;

	async fn send(&mut self) -> TransportResult<()>;
}
