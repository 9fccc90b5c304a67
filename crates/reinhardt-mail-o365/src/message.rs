use std::path::Path;

/// Represents an alternative content type for an email message.
///
/// Alternatives carry a different representation of the body, typically an
/// HTML version of the plain text.
///
/// # Examples
///
/// ```
/// use reinhardt_mail_o365::Alternative;
///
/// let alternative = Alternative::new("<h1>Hello!</h1>", "text/html");
/// assert_eq!(alternative.mime_type(), "text/html");
/// assert!(alternative.is_html());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alternative {
	content: String,
	mime_type: String,
}

impl Alternative {
	pub fn new(content: impl Into<String>, mime_type: impl Into<String>) -> Self {
		Self {
			content: content.into(),
			mime_type: mime_type.into(),
		}
	}

	/// Create an HTML alternative
	///
	/// # Examples
	///
	/// ```
	/// use reinhardt_mail_o365::Alternative;
	///
	/// let html = Alternative::html("<h1>Welcome!</h1>");
	/// assert_eq!(html.mime_type(), "text/html");
	/// ```
	pub fn html(content: impl Into<String>) -> Self {
		Self::new(content, "text/html")
	}

	pub fn content(&self) -> &str {
		&self.content
	}

	pub fn mime_type(&self) -> &str {
		&self.mime_type
	}

	/// Exact match on `text/html`; parameters such as `charset` disqualify it.
	pub fn is_html(&self) -> bool {
		self.mime_type == "text/html"
	}
}

/// Represents a file attachment for an email message.
///
/// A [`Attachment::Path`] is a reference the mailbox provider resolves when
/// the message is sent. [`Attachment::Content`] carries the bytes inline.
///
/// # Examples
///
/// ```
/// use reinhardt_mail_o365::Attachment;
///
/// let report = Attachment::path("reports/march.pdf");
/// assert_eq!(report.filename(), "march.pdf");
///
/// let notes = Attachment::content("notes.txt", b"content".to_vec(), "text/plain");
/// assert_eq!(notes.filename(), "notes.txt");
/// assert_eq!(notes.mime_type(), Some("text/plain"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attachment {
	Path(String),
	Content {
		filename: String,
		content: Vec<u8>,
		mime_type: String,
	},
}

impl Attachment {
	pub fn path(path: impl Into<String>) -> Self {
		Attachment::Path(path.into())
	}

	pub fn content(
		filename: impl Into<String>,
		content: Vec<u8>,
		mime_type: impl Into<String>,
	) -> Self {
		Attachment::Content {
			filename: filename.into(),
			content,
			mime_type: mime_type.into(),
		}
	}

	/// File name as the recipient will see it.
	pub fn filename(&self) -> &str {
		match self {
			Attachment::Path(path) => Path::new(path)
				.file_name()
				.and_then(|name| name.to_str())
				.unwrap_or(path.as_str()),
			Attachment::Content { filename, .. } => filename,
		}
	}

	/// MIME type, known only for in-memory content.
	pub fn mime_type(&self) -> Option<&str> {
		match self {
			Attachment::Path(_) => None,
			Attachment::Content { mime_type, .. } => Some(mime_type),
		}
	}
}

impl From<&str> for Attachment {
	fn from(path: &str) -> Self {
		Attachment::Path(path.to_string())
	}
}

impl From<(&str, Vec<u8>, &str)> for Attachment {
	fn from((filename, content, mime_type): (&str, Vec<u8>, &str)) -> Self {
		Attachment::content(filename, content, mime_type)
	}
}

/// Generic outbound email message.
///
/// All fields are private; construct through [`EmailMessage::builder`].
#[derive(Debug, Clone)]
pub struct EmailMessage {
	subject: String,
	body: String,
	from_email: String,
	to: Vec<String>,
	cc: Vec<String>,
	bcc: Vec<String>,
	encoding: Option<String>,
	alternatives: Vec<Alternative>,
	attachments: Vec<Attachment>,
}

impl EmailMessage {
	/// Create a new builder for constructing an `EmailMessage`.
	pub fn builder() -> EmailMessageBuilder {
		EmailMessageBuilder::default()
	}

	/// Get the subject.
	pub fn subject(&self) -> &str {
		&self.subject
	}

	/// Get the plain text body.
	pub fn body(&self) -> &str {
		&self.body
	}

	/// Get the from email address, possibly with a display name.
	pub fn from_email(&self) -> &str {
		&self.from_email
	}

	/// Get the list of recipients.
	pub fn to(&self) -> &[String] {
		&self.to
	}

	/// Get the list of CC recipients.
	pub fn cc(&self) -> &[String] {
		&self.cc
	}

	/// Get the list of BCC recipients.
	pub fn bcc(&self) -> &[String] {
		&self.bcc
	}

	/// Charset requested for this message, if any.
	pub fn encoding(&self) -> Option<&str> {
		self.encoding.as_deref()
	}

	/// Get the alternative bodies, in the order they were added.
	pub fn alternatives(&self) -> &[Alternative] {
		&self.alternatives
	}

	/// Get the attachments, in the order they were added.
	pub fn attachments(&self) -> &[Attachment] {
		&self.attachments
	}

	/// All recipients: `to`, then `cc`, then `bcc`. Duplicates are kept.
	///
	/// # Examples
	///
	/// ```
	/// use reinhardt_mail_o365::EmailMessage;
	///
	/// let email = EmailMessage::builder()
	///     .to(vec!["a@example.com".to_string()])
	///     .cc(vec!["b@example.com".to_string()])
	///     .bcc(vec!["a@example.com".to_string()])
	///     .build()
	///     .unwrap();
	///
	/// assert_eq!(
	///     email.recipients(),
	///     vec!["a@example.com", "b@example.com", "a@example.com"]
	/// );
	/// ```
	pub fn recipients(&self) -> Vec<&str> {
		self.to
			.iter()
			.chain(&self.cc)
			.chain(&self.bcc)
			.map(String::as_str)
			.collect()
	}

	/// First `text/html` alternative, if any.
	pub fn html_alternative(&self) -> Option<&Alternative> {
		self.alternatives.iter().find(|alt| alt.is_html())
	}

	/// Send the email using the given backend.
	pub async fn send(
		&self,
		backend: &dyn crate::backend::EmailBackend,
	) -> crate::EmailResult<usize> {
		backend.send_messages(std::slice::from_ref(self)).await
	}
}

/// Builder for [`EmailMessage`].
///
/// # Examples
///
/// ```
/// use reinhardt_mail_o365::EmailMessage;
///
/// let email = EmailMessage::builder()
///     .from("Reports <reports@example.com>")
///     .to(vec!["team@example.com".to_string()])
///     .cc(vec!["lead@example.com".to_string()])
///     .subject("Weekly report")
///     .body("Numbers are attached.")
///     .html("<p>Numbers are attached.</p>")
///     .attachment("reports/week-12.pdf")
///     .build()
///     .unwrap();
///
/// assert_eq!(email.recipients(), vec!["team@example.com", "lead@example.com"]);
/// assert_eq!(email.attachments()[0].filename(), "week-12.pdf");
/// ```
#[derive(Default)]
pub struct EmailMessageBuilder {
	subject: String,
	body: String,
	from_email: String,
	to: Vec<String>,
	cc: Vec<String>,
	bcc: Vec<String>,
	encoding: Option<String>,
	alternatives: Vec<Alternative>,
	attachments: Vec<Attachment>,
}

impl EmailMessageBuilder {
	/// Set the subject. Line breaks are rejected by [`build`](Self::build).
	pub fn subject(mut self, subject: impl Into<String>) -> Self {
		self.subject = subject.into();
		self
	}

	/// Set the plain text body.
	pub fn body(mut self, body: impl Into<String>) -> Self {
		self.body = body.into();
		self
	}

	/// Set the from address. Left empty, the backend's sender is used.
	pub fn from(mut self, from: impl Into<String>) -> Self {
		self.from_email = from.into();
		self
	}

	/// Set the recipients.
	pub fn to(mut self, to: Vec<String>) -> Self {
		self.to = to;
		self
	}

	/// Set the CC recipients.
	pub fn cc(mut self, cc: Vec<String>) -> Self {
		self.cc = cc;
		self
	}

	/// Set the BCC recipients.
	pub fn bcc(mut self, bcc: Vec<String>) -> Self {
		self.bcc = bcc;
		self
	}

	/// Set the charset used to encode non-ASCII addresses.
	pub fn encoding(mut self, encoding: impl Into<String>) -> Self {
		self.encoding = Some(encoding.into());
		self
	}

	/// Add a `text/html` alternative.
	pub fn html(self, html: impl Into<String>) -> Self {
		self.alternative(Alternative::html(html))
	}

	/// Add an alternative body.
	pub fn alternative(mut self, alternative: Alternative) -> Self {
		self.alternatives.push(alternative);
		self
	}

	/// Add an attachment: a path, or a `(filename, content, mime_type)` triple.
	pub fn attachment(mut self, attachment: impl Into<Attachment>) -> Self {
		self.attachments.push(attachment.into());
		self
	}

	/// Build the email message.
	///
	/// Rejects a subject containing line breaks. Addresses are checked when
	/// the message is sent, against the charset in effect at that time.
	pub fn build(self) -> crate::EmailResult<EmailMessage> {
		if self.subject.contains(['\r', '\n']) {
			return Err(crate::EmailError::HeaderInjection(
				"subject cannot contain newlines".to_string(),
			));
		}

		Ok(EmailMessage {
			subject: self.subject,
			body: self.body,
			from_email: self.from_email,
			to: self.to,
			cc: self.cc,
			bcc: self.bcc,
			encoding: self.encoding,
			alternatives: self.alternatives,
			attachments: self.attachments,
		})
	}
}
