//! In-memory mailbox provider
//!
//! Implements the [`provider`](crate::provider) traits without any network
//! access. Every call is recorded so tests can inspect what the backend asked
//! the provider to do, and failures can be injected at specific calls.
//!
//! # Examples
//!
//! ```
//! use reinhardt_mail_o365::memory::MemoryAuthClient;
//! use reinhardt_mail_o365::{EmailBackend, EmailMessage, O365Backend, O365Settings};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = MemoryAuthClient::new();
//!     let settings = O365Settings::new()
//!         .with_tenant_id("tenant")
//!         .with_client_id("client")
//!         .with_client_secret("secret")
//!         .with_sender("sender@example.com");
//!     let backend = O365Backend::new(settings, Arc::new(client.clone()));
//!
//!     let email = EmailMessage::builder()
//!         .from("sender@example.com")
//!         .to(vec!["recipient@example.com".to_string()])
//!         .subject("Test")
//!         .body("Hello!")
//!         .build()
//!         .unwrap();
//!
//!     backend.send_messages(&[email]).await.unwrap();
//!
//!     let sent = client.sent_messages();
//!     assert_eq!(sent.len(), 1);
//!     assert_eq!(sent[0].subject, "Test");
//! }
//! ```

use crate::provider::{
	Account, AttachmentSource, AuthClient, AuthFlow, BodyType, ClientCredentials, Mailbox,
	OutgoingMessage, TransportResult,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

/// Failure injected into the memory provider.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct MemoryProviderError(pub String);

/// One credential exchange seen by the auth client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRecord {
	pub credentials: ClientCredentials,
	pub flow: AuthFlow,
}

/// A message as it was handed to the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SentMessage {
	/// Mailbox the message was sent from
	pub resource: String,
	pub recipients: Vec<String>,
	pub subject: String,
	pub body: String,
	pub body_type: Option<BodyType>,
	/// One entry per attachment-add call, in call order
	pub attachments: Vec<AttachmentSource>,
}

#[derive(Default)]
struct Recorder {
	authentications: Vec<AuthRecord>,
	mailbox_resources: Vec<String>,
	new_message_calls: usize,
	send_calls: usize,
	sent: Vec<SentMessage>,
	reject_credentials: bool,
	fail_authentication: bool,
	fail_mailbox: bool,
	fail_new_message_at: HashSet<usize>,
	fail_send_at: HashSet<usize>,
}

/// In-memory auth client and everything derived from it.
///
/// Clones share the same record.
#[derive(Clone, Default)]
pub struct MemoryAuthClient {
	state: Arc<RwLock<Recorder>>,
}

impl MemoryAuthClient {
	pub fn new() -> Self {
		Self::default()
	}

	/// Report every later credential exchange as rejected.
	pub fn reject_credentials(&self) -> &Self {
		self.state.write().reject_credentials = true;
		self
	}

	/// Make every later credential exchange return an error instead of a
	/// rejection.
	pub fn fail_authentication(&self) -> &Self {
		self.state.write().fail_authentication = true;
		self
	}

	/// Make every later mailbox lookup on an authenticated account fail.
	pub fn fail_mailbox(&self) -> &Self {
		self.state.write().fail_mailbox = true;
		self
	}

	/// Fail the `index`-th call (0-based, counted across all mailboxes) to
	/// `new_message`.
	pub fn fail_new_message_at(&self, index: usize) -> &Self {
		self.state.write().fail_new_message_at.insert(index);
		self
	}

	/// Fail the `index`-th call (0-based) to `send`.
	pub fn fail_send_at(&self, index: usize) -> &Self {
		self.state.write().fail_send_at.insert(index);
		self
	}

	pub fn authentications(&self) -> Vec<AuthRecord> {
		self.state.read().authentications.clone()
	}

	/// Resources mailbox sessions were derived for, in call order.
	pub fn mailbox_resources(&self) -> Vec<String> {
		self.state.read().mailbox_resources.clone()
	}

	pub fn new_message_calls(&self) -> usize {
		self.state.read().new_message_calls
	}

	pub fn send_calls(&self) -> usize {
		self.state.read().send_calls
	}

	/// Messages that were sent successfully.
	pub fn sent_messages(&self) -> Vec<SentMessage> {
		self.state.read().sent.clone()
	}

	pub fn count(&self) -> usize {
		self.state.read().sent.len()
	}

	pub fn find_by_subject(&self, subject: &str) -> Vec<SentMessage> {
		self.state
			.read()
			.sent
			.iter()
			.filter(|message| message.subject == subject)
			.cloned()
			.collect()
	}

	pub fn find_by_recipient(&self, recipient: &str) -> Vec<SentMessage> {
		self.state
			.read()
			.sent
			.iter()
			.filter(|message| message.recipients.iter().any(|r| r == recipient))
			.cloned()
			.collect()
	}

	/// Forget recorded calls and sent messages. Injected failures stay.
	pub fn clear(&self) {
		let mut state = self.state.write();
		state.authentications.clear();
		state.mailbox_resources.clear();
		state.new_message_calls = 0;
		state.send_calls = 0;
		state.sent.clear();
	}
}

#[async_trait]
impl AuthClient for MemoryAuthClient {
	async fn authenticate(
		&self,
		credentials: &ClientCredentials,
		flow: AuthFlow,
	) -> TransportResult<Option<Box<dyn Account>>> {
		let mut state = self.state.write();
		state.authentications.push(AuthRecord {
			credentials: credentials.clone(),
			flow,
		});

		if state.fail_authentication {
			return Err(Box::new(MemoryProviderError(
				"token endpoint unreachable".to_string(),
			)));
		}
		if state.reject_credentials {
			return Ok(None);
		}

		Ok(Some(Box::new(MemoryAccount {
			state: Arc::clone(&self.state),
		})))
	}
}

struct MemoryAccount {
	state: Arc<RwLock<Recorder>>,
}

impl Account for MemoryAccount {
	fn mailbox(&self, resource: &str) -> TransportResult<Box<dyn Mailbox>> {
		let mut state = self.state.write();
		state.mailbox_resources.push(resource.to_string());

		if state.fail_mailbox {
			return Err(Box::new(MemoryProviderError(format!(
				"no mailbox for {}",
				resource
			))));
		}

		Ok(Box::new(MemoryMailbox {
			resource: resource.to_string(),
			state: Arc::clone(&self.state),
		}))
	}
}

struct MemoryMailbox {
	resource: String,
	state: Arc<RwLock<Recorder>>,
}

impl Mailbox for MemoryMailbox {
	fn resource(&self) -> &str {
		&self.resource
	}

	fn new_message(&self) -> TransportResult<Box<dyn OutgoingMessage>> {
		let mut state = self.state.write();
		let index = state.new_message_calls;
		state.new_message_calls += 1;

		if state.fail_new_message_at.contains(&index) {
			return Err(Box::new(MemoryProviderError(format!(
				"new_message call {} failed",
				index
			))));
		}

		Ok(Box::new(MemoryOutgoingMessage {
			draft: SentMessage {
				resource: self.resource.clone(),
				..SentMessage::default()
			},
			state: Arc::clone(&self.state),
		}))
	}
}

struct MemoryOutgoingMessage {
	draft: SentMessage,
	state: Arc<RwLock<Recorder>>,
}

#[async_trait]
impl OutgoingMessage for MemoryOutgoingMessage {
	fn add_recipient(&mut self, address: &str) -> TransportResult<()> {
		self.draft.recipients.push(address.to_string());
		Ok(())
	}

	fn set_subject(&mut self, subject: &str) {
		self.draft.subject = subject.to_string();
	}

	fn set_body(&mut self, body: &str, body_type: BodyType) {
		self.draft.body = body.to_string();
		self.draft.body_type = Some(body_type);
	}

	fn add_attachments(&mut self, source: AttachmentSource) -> TransportResult<()> {
		self.draft.attachments.push(source);
		Ok(())
	}

	async fn send(&mut self) -> TransportResult<()> {
		let mut state = self.state.write();
		let index = state.send_calls;
		state.send_calls += 1;

		if state.fail_send_at.contains(&index) {
			return Err(Box::new(MemoryProviderError(format!(
				"send call {} failed",
				index
			))));
		}

		state.sent.push(self.draft.clone());
		Ok(())
	}
}
