//! Backend configuration
//!
//! [`O365Settings`] is resolved once, before the backend is constructed.
//! Values passed explicitly by the caller take precedence over defaults read
//! from the environment or a TOML document; see [`O365Settings::merge`].

use crate::provider::ClientCredentials;
use crate::{EmailError, EmailResult};
use serde::Deserialize;
use std::fmt;
use zeroize::Zeroize;

pub const TENANT_ID_KEY: &str = "EMAIL_O365_TENANT_ID";
pub const CLIENT_ID_KEY: &str = "EMAIL_O365_CLIENT_ID";
pub const CLIENT_SECRET_KEY: &str = "EMAIL_O365_CLIENT_SECRET";
pub const SENDER_KEY: &str = "EMAIL_O365_SENDER";
pub const FAIL_SILENTLY_KEY: &str = "EMAIL_O365_FAIL_SILENTLY";
pub const DEFAULT_CHARSET_KEY: &str = "DEFAULT_CHARSET";

/// Charset used when neither the message nor the settings name one.
pub const FALLBACK_CHARSET: &str = "utf-8";

/// Office 365 backend settings.
///
/// A field that is `None` or an empty string counts as not configured.
#[derive(Clone, Deserialize)]
pub struct O365Settings {
	/// Azure AD tenant the application is registered in
	pub tenant_id: Option<String>,
	/// Application (client) id
	pub client_id: Option<String>,
	/// Application secret; redacted in `Debug` output and zeroized on drop
	pub client_secret: Option<String>,
	/// Mailbox messages are sent from
	pub sender: Option<String>,
	/// Absorb send failures instead of returning them
	#[serde(default)]
	pub fail_silently: bool,
	/// Charset used for addresses when a message does not name one
	pub default_charset: Option<String>,
}

impl Default for O365Settings {
	fn default() -> Self {
		Self {
			tenant_id: None,
			client_id: None,
			client_secret: None,
			sender: None,
			fail_silently: false,
			default_charset: None,
		}
	}
}

impl Drop for O365Settings {
	fn drop(&mut self) {
		self.client_secret.zeroize();
	}
}

impl fmt::Debug for O365Settings {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("O365Settings")
			.field("tenant_id", &self.tenant_id)
			.field("client_id", &self.client_id)
			.field(
				"client_secret",
				&self.client_secret.as_ref().map(|_| "[REDACTED]"),
			)
			.field("sender", &self.sender)
			.field("fail_silently", &self.fail_silently)
			.field("default_charset", &self.default_charset)
			.finish()
	}
}

#[derive(Deserialize)]
struct SettingsDocument {
	email: Option<EmailSection>,
}

#[derive(Deserialize)]
struct EmailSection {
	o365: Option<O365Settings>,
}

impl O365Settings {
	/// Create new settings with defaults
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
		self.tenant_id = Some(tenant_id.into());
		self
	}

	pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
		self.client_id = Some(client_id.into());
		self
	}

	pub fn with_client_secret(mut self, client_secret: impl Into<String>) -> Self {
		self.client_secret = Some(client_secret.into());
		self
	}

	pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
		self.sender = Some(sender.into());
		self
	}

	pub fn with_fail_silently(mut self, fail_silently: bool) -> Self {
		self.fail_silently = fail_silently;
		self
	}

	pub fn with_default_charset(mut self, charset: impl Into<String>) -> Self {
		self.default_charset = Some(charset.into());
		self
	}

	/// Load settings from environment variables
	pub fn from_env() -> EmailResult<Self> {
		Self::from_lookup(|key| std::env::var(key).ok())
	}

	/// Load settings through `lookup`, which maps a variable name to its value.
	///
	/// # Examples
	///
	/// ```
	/// use reinhardt_mail_o365::O365Settings;
	/// use std::collections::HashMap;
	///
	/// let vars = HashMap::from([
	///     ("EMAIL_O365_SENDER", "noreply@example.com"),
	///     ("EMAIL_O365_FAIL_SILENTLY", "yes"),
	/// ]);
	///
	/// let settings = O365Settings::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap();
	/// assert_eq!(settings.sender(), Some("noreply@example.com"));
	/// assert!(settings.fail_silently);
	/// ```
	pub fn from_lookup<F>(lookup: F) -> EmailResult<Self>
	where
		F: Fn(&str) -> Option<String>,
	{
		let mut settings = Self::default();
		settings.tenant_id = lookup(TENANT_ID_KEY);
		settings.client_id = lookup(CLIENT_ID_KEY);
		settings.client_secret = lookup(CLIENT_SECRET_KEY);
		settings.sender = lookup(SENDER_KEY);

		if let Some(value) = lookup(FAIL_SILENTLY_KEY) {
			settings.fail_silently = parse_bool(FAIL_SILENTLY_KEY, &value)?;
		}

		settings.default_charset = lookup(DEFAULT_CHARSET_KEY);

		Ok(settings)
	}

	/// Parse settings from TOML, either flat or under an `[email.o365]` table.
	///
	/// A document with an `[email]` table must carry the `o365` subtable.
	///
	/// # Examples
	///
	/// ```
	/// use reinhardt_mail_o365::O365Settings;
	///
	/// let settings = O365Settings::from_toml(r#"
	///     [email.o365]
	///     tenant_id = "tenant"
	///     sender = "noreply@example.com"
	/// "#).unwrap();
	///
	/// assert_eq!(settings.tenant_id(), Some("tenant"));
	/// assert_eq!(settings.default_charset(), "utf-8");
	/// ```
	pub fn from_toml(source: &str) -> EmailResult<Self> {
		let document: SettingsDocument = toml::from_str(source)
			.map_err(|e| EmailError::Configuration(format!("invalid settings: {}", e)))?;

		match document.email {
			Some(EmailSection { o365: Some(settings) }) => Ok(settings),
			Some(EmailSection { o365: None }) => Err(EmailError::Configuration(
				"[email] table has no [email.o365] section".to_string(),
			)),
			None => toml::from_str(source)
				.map_err(|e| EmailError::Configuration(format!("invalid settings: {}", e))),
		}
	}

	/// Combine explicitly supplied settings with defaults.
	///
	/// Each credential field is taken from `explicit` unless it is missing or
	/// empty there, and so is the charset. `fail_silently` is set if either
	/// side sets it.
	///
	/// # Examples
	///
	/// ```
	/// use reinhardt_mail_o365::O365Settings;
	///
	/// let explicit = O365Settings::new().with_sender("override@example.com");
	/// let defaults = O365Settings::new()
	///     .with_tenant_id("tenant")
	///     .with_sender("default@example.com");
	///
	/// let settings = O365Settings::merge(explicit, defaults);
	/// assert_eq!(settings.sender(), Some("override@example.com"));
	/// assert_eq!(settings.tenant_id(), Some("tenant"));
	/// ```
	pub fn merge(mut explicit: Self, mut defaults: Self) -> Self {
		fn pick(explicit: &mut Option<String>, default: &mut Option<String>) -> Option<String> {
			match explicit.take() {
				Some(value) if !value.is_empty() => Some(value),
				_ => default.take(),
			}
		}

		Self {
			tenant_id: pick(&mut explicit.tenant_id, &mut defaults.tenant_id),
			client_id: pick(&mut explicit.client_id, &mut defaults.client_id),
			client_secret: pick(&mut explicit.client_secret, &mut defaults.client_secret),
			sender: pick(&mut explicit.sender, &mut defaults.sender),
			fail_silently: explicit.fail_silently || defaults.fail_silently,
			default_charset: pick(&mut explicit.default_charset, &mut defaults.default_charset),
		}
	}

	pub fn tenant_id(&self) -> Option<&str> {
		non_empty(&self.tenant_id)
	}

	pub fn client_id(&self) -> Option<&str> {
		non_empty(&self.client_id)
	}

	pub fn client_secret(&self) -> Option<&str> {
		non_empty(&self.client_secret)
	}

	pub fn sender(&self) -> Option<&str> {
		non_empty(&self.sender)
	}

	/// Configured charset, or `utf-8`.
	pub fn default_charset(&self) -> &str {
		self.default_charset
			.as_deref()
			.map(str::trim)
			.filter(|c| !c.is_empty())
			.unwrap_or(FALLBACK_CHARSET)
	}

	/// Check that every setting needed to open a mailbox session is present.
	pub fn validate(&self) -> EmailResult<()> {
		let required = [
			(TENANT_ID_KEY, self.tenant_id()),
			(CLIENT_ID_KEY, self.client_id()),
			(CLIENT_SECRET_KEY, self.client_secret()),
			(SENDER_KEY, self.sender()),
		];

		match required.iter().find(|(_, value)| value.is_none()) {
			Some((key, _)) => Err(EmailError::Configuration(format!(
				"O365 credentials or sender not configured ({} is missing)",
				key
			))),
			None => Ok(()),
		}
	}

	/// Credentials for the auth client, once [`validate`](Self::validate) passes.
	pub fn credentials(&self) -> EmailResult<ClientCredentials> {
		self.validate()?;
		Ok(ClientCredentials::new(
			self.tenant_id().unwrap_or_default(),
			self.client_id().unwrap_or_default(),
			self.client_secret().unwrap_or_default(),
		))
	}
}

fn non_empty(value: &Option<String>) -> Option<&str> {
	value.as_deref().filter(|v| !v.is_empty())
}

fn parse_bool(key: &str, value: &str) -> EmailResult<bool> {
	match value.trim().to_ascii_lowercase().as_str() {
		"true" | "1" | "yes" | "on" => Ok(true),
		"false" | "0" | "no" | "off" | "" => Ok(false),
		_ => Err(EmailError::Configuration(format!(
			"{} must be a boolean, got {:?}",
			key, value
		))),
	}
}
