//! Email backends
//!
//! [`O365Backend`] sends through an Office 365 mailbox. The mailbox session is
//! opened again, with a fresh credential exchange, at the start of every
//! batch, and the backend's lock is held until the whole batch is sent, so at
//! most one authentication or send is in flight per backend.

use crate::address::{parse_address, sanitize_address};
use crate::message::{Attachment, EmailMessage};
use crate::provider::{AttachmentSource, AuthClient, AuthFlow, BodyType, Mailbox};
use crate::settings::O365Settings;
use crate::{EmailError, EmailResult};
use async_trait::async_trait;
use std::io::Cursor;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Backend capable of delivering a batch of messages.
#[async_trait]
pub trait EmailBackend: Send + Sync {
	/// Send `messages` in order and return how many were handed off.
	async fn send_messages(&self, messages: &[EmailMessage]) -> EmailResult<usize>;
}

/// Office 365 mailbox backend
///
/// # Examples
///
/// ```rust,no_run
/// use reinhardt_mail_o365::memory::MemoryAuthClient;
/// use reinhardt_mail_o365::{EmailBackend, EmailMessage, O365Backend, O365Settings};
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let settings = O365Settings::from_env()?.with_fail_silently(true);
/// let backend = O365Backend::new(settings, Arc::new(MemoryAuthClient::new()));
///
/// let email = EmailMessage::builder()
///     .from("Reports <reports@example.com>")
///     .to(vec!["team@example.com".to_string()])
///     .subject("Weekly report")
///     .body("See attached.")
///     .attachment(("report.csv", b"a,b\n1,2\n".to_vec(), "text/csv"))
///     .build()?;
///
/// let sent = backend.send_messages(&[email]).await?;
/// # Ok(())
/// # }
/// ```
pub struct O365Backend {
	settings: O365Settings,
	auth_client: Arc<dyn AuthClient>,
	session: Mutex<Option<Box<dyn Mailbox>>>,
}

impl O365Backend {
	/// Create a backend. Settings are not validated until a session is opened.
	pub fn new(settings: O365Settings, auth_client: Arc<dyn AuthClient>) -> Self {
		Self {
			settings,
			auth_client,
			session: Mutex::new(None),
		}
	}

	pub fn with_fail_silently(mut self, fail_silently: bool) -> Self {
		self.settings.fail_silently = fail_silently;
		self
	}

	pub fn settings(&self) -> &O365Settings {
		&self.settings
	}

	pub fn fail_silently(&self) -> bool {
		self.settings.fail_silently
	}

	/// Authenticate and open a mailbox session scoped to the sender.
	///
	/// Replaces any session already held.
	pub async fn open(&self) -> EmailResult<bool> {
		let mut session = self.session.lock().await;
		self.open_session(&mut session).await
	}

	/// Drop the current mailbox session, if any.
	pub async fn close(&self) {
		if self.session.lock().await.take().is_some() {
			tracing::debug!("Closed Office 365 mailbox session");
		}
	}

	pub async fn has_session(&self) -> bool {
		self.session.lock().await.is_some()
	}

	// Caller holds the session lock.
	async fn open_session(&self, session: &mut Option<Box<dyn Mailbox>>) -> EmailResult<bool> {
		let credentials = self.settings.credentials()?;
		let sender = self.settings.sender().unwrap_or_default();

		tracing::debug!(
			tenant_id = credentials.tenant_id(),
			client_id = credentials.client_id(),
			sender,
			"Authenticating with Office 365"
		);

		let account = self
			.auth_client
			.authenticate(&credentials, AuthFlow::Credentials)
			.await
			.map_err(|e| EmailError::Authentication(e.to_string()))?
			.ok_or_else(|| {
				EmailError::Authentication("O365 authentication failed.".to_string())
			})?;

		*session = Some(account.mailbox(sender).map_err(EmailError::Transport)?);
		Ok(true)
	}

	// Caller holds the session lock.
	async fn send_one(&self, mailbox: &dyn Mailbox, message: &EmailMessage) -> EmailResult<bool> {
		let recipients = message.recipients();
		if recipients.is_empty() {
			return Ok(false);
		}

		let charset = message
			.encoding()
			.unwrap_or_else(|| self.settings.default_charset());

		let from_email = match message.from_email() {
			"" => self.settings.sender().unwrap_or_default(),
			from_email => from_email,
		};
		let from_address = parse_address(&sanitize_address(from_email, charset)?);

		let recipients = recipients
			.into_iter()
			.map(|recipient| sanitize_address(recipient, charset).map(|a| parse_address(&a)))
			.collect::<EmailResult<Vec<_>>>()?;

		tracing::debug!(
			from = %from_address,
			resource = mailbox.resource(),
			recipients = recipients.len(),
			subject = message.subject(),
			"Sending message through Office 365"
		);

		match deliver(mailbox, message, &recipients).await {
			Ok(()) => Ok(true),
			Err(e) if self.settings.fail_silently => {
				tracing::warn!(
					error = %e,
					subject = message.subject(),
					"Failed to send message, continuing because fail_silently is set"
				);
				Ok(false)
			}
			Err(e) => Err(e),
		}
	}
}

/// Build the provider message and send it.
async fn deliver(
	mailbox: &dyn Mailbox,
	message: &EmailMessage,
	recipients: &[String],
) -> EmailResult<()> {
	let mut outgoing = mailbox.new_message().map_err(EmailError::Transport)?;

	for recipient in recipients {
		outgoing
			.add_recipient(recipient)
			.map_err(EmailError::Transport)?;
	}
	outgoing.set_subject(message.subject());

	match message.html_alternative() {
		Some(html) => outgoing.set_body(html.content(), BodyType::Html),
		None => outgoing.set_body(message.body(), BodyType::Text),
	}

	for attachment in message.attachments() {
		outgoing
			.add_attachments(attachment_source(attachment))
			.map_err(EmailError::Transport)?;
	}

	outgoing.send().await.map_err(EmailError::Transport)
}

fn attachment_source(attachment: &Attachment) -> AttachmentSource {
	match attachment {
		Attachment::Path(path) => AttachmentSource::Path(path.clone()),
		Attachment::Content {
			filename, content, ..
		} => AttachmentSource::Streams(vec![(Cursor::new(content.clone()), filename.clone())]),
	}
}

#[async_trait]
impl EmailBackend for O365Backend {
	async fn send_messages(&self, messages: &[EmailMessage]) -> EmailResult<usize> {
		if messages.is_empty() {
			return Ok(0);
		}

		let mut session = self.session.lock().await;

		if let Err(e) = self.open_session(&mut session).await {
			if self.settings.fail_silently {
				tracing::warn!(error = %e, "Could not open Office 365 mailbox session");
				return Ok(0);
			}
			return Err(e);
		}

		let mailbox = session.as_deref().ok_or_else(|| {
			EmailError::Configuration("mailbox session is not open".to_string())
		})?;

		let mut sent = 0;
		for message in messages {
			if self.send_one(mailbox, message).await? {
				sent += 1;
			}
		}

		tracing::debug!(sent, total = messages.len(), "Office 365 batch finished");
		Ok(sent)
	}
}
