//! Address sanitization
//!
//! Addresses arrive either bare (`user@example.com`) or with a display name
//! (`"Doe, Jane" <jane@example.com>`). Before they reach the mailbox provider
//! they are checked for header injection, non-ASCII display names and local
//! parts are encoded as RFC 2047 words in the message charset, and domains are
//! converted to their IDNA ASCII form.

use crate::{EmailError, EmailResult};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use encoding_rs::{Encoding, UTF_8};

/// Characters that force a display name to be quoted.
const SPECIALS: &[char] = &[
	'(', ')', '<', '>', '[', ']', ':', ';', '@', '\\', ',', '.', '"',
];

/// Sanitize an address for transmission, keeping its display name.
///
/// Accepts `addr-spec`, `name <addr-spec>` and `addr-spec (comment)`, where
/// the comment is taken as the display name. A local part may be a quoted
/// string containing spaces. Non-ASCII text asked to be encoded in `us-ascii`
/// is encoded as UTF-8.
///
/// # Examples
///
/// ```
/// use reinhardt_mail_o365::sanitize_address;
///
/// assert_eq!(
///     sanitize_address("Jane <jane@example.com>", "utf-8").unwrap(),
///     "Jane <jane@example.com>"
/// );
/// assert_eq!(
///     sanitize_address("Jörg <jorg@bücher.example>", "utf-8").unwrap(),
///     "=?utf-8?b?SsO2cmc=?= <jorg@xn--bcher-kva.example>"
/// );
/// ```
pub fn sanitize_address(addr: &str, charset: &str) -> EmailResult<String> {
	if addr.contains(['\r', '\n']) {
		return Err(EmailError::HeaderInjection(
			"address parts cannot contain newlines".to_string(),
		));
	}

	let (name, addr_spec) = split_mailbox(addr)?;
	let (local_part, domain) = match addr_spec.rsplit_once('@') {
		Some((local_part, domain)) => (local_part, Some(domain)),
		None => (addr_spec.as_str(), None),
	};

	if local_part.is_empty() {
		return Err(EmailError::InvalidAddress(format!(
			"missing local part in {:?}",
			addr
		)));
	}

	let local_part = if local_part.is_ascii() {
		local_part.to_string()
	} else {
		encode_word(local_part, charset)?
	};

	let addr_spec = match domain {
		Some(domain) => {
			let domain = idna::domain_to_ascii(domain).map_err(|_| {
				EmailError::InvalidAddress(format!("invalid domain {:?} in {:?}", domain, addr))
			})?;
			if domain.is_empty() {
				return Err(EmailError::InvalidAddress(format!(
					"missing domain in {:?}",
					addr
				)));
			}
			format!("{}@{}", local_part, domain)
		}
		None => local_part,
	};

	if name.is_empty() {
		return Ok(addr_spec);
	}

	let name = if name.is_ascii() {
		quote_display_name(&name)
	} else {
		encode_word(&name, charset)?
	};

	Ok(format!("{} <{}>", name, addr_spec))
}

/// Strip the display name from an address, returning the bare `addr-spec`.
///
/// # Examples
///
/// ```
/// use reinhardt_mail_o365::parse_address;
///
/// assert_eq!(parse_address("Jane <jane@example.com>"), "jane@example.com");
/// assert_eq!(parse_address("jane@example.com"), "jane@example.com");
/// ```
pub fn parse_address(addr: &str) -> String {
	let addr = addr.trim();
	match (addr.rfind('<'), addr.ends_with('>')) {
		(Some(start), true) => addr[start + 1..addr.len() - 1].trim().to_string(),
		_ => addr.to_string(),
	}
}

/// Split `name <addr-spec>` into its parts. A bare address has an empty name.
fn split_mailbox(addr: &str) -> EmailResult<(String, String)> {
	let addr = addr.trim();
	if addr.is_empty() {
		return Err(EmailError::InvalidAddress("empty address".to_string()));
	}

	let (name, addr_spec) = match (addr.rfind('<'), addr.ends_with('>')) {
		(Some(start), true) => (
			unquote(addr[..start].trim()),
			addr[start + 1..addr.len() - 1].trim(),
		),
		_ => match trailing_comment(addr) {
			Some((addr_spec, comment)) => (comment.to_string(), addr_spec),
			None => (String::new(), addr),
		},
	};

	if addr_spec.is_empty() || is_malformed(addr_spec) {
		return Err(EmailError::InvalidAddress(format!(
			"could not parse an address from {:?}",
			addr
		)));
	}

	Ok((name, addr_spec.to_string()))
}

/// Split `addr-spec (comment)`.
fn trailing_comment(addr: &str) -> Option<(&str, &str)> {
	let open = addr.strip_suffix(')')?.rfind('(')?;
	Some((addr[..open].trim(), addr[open + 1..addr.len() - 1].trim()))
}

/// Angle brackets or whitespace outside a quoted string, or an unterminated
/// quote.
fn is_malformed(addr_spec: &str) -> bool {
	let mut quoted = false;
	let mut escaped = false;
	for c in addr_spec.chars() {
		match c {
			_ if escaped => escaped = false,
			'\\' if quoted => escaped = true,
			'"' => quoted = !quoted,
			'<' | '>' if !quoted => return true,
			c if !quoted && c.is_whitespace() => return true,
			_ => {}
		}
	}
	quoted
}

fn unquote(name: &str) -> String {
	match name.strip_prefix('"').and_then(|n| n.strip_suffix('"')) {
		Some(inner) => inner.replace("\\\"", "\"").replace("\\\\", "\\"),
		None => name.to_string(),
	}
}

fn quote_display_name(name: &str) -> String {
	if name.contains(SPECIALS) {
		format!("\"{}\"", name.replace('\\', "\\\\").replace('"', "\\\""))
	} else {
		name.to_string()
	}
}

/// Encode `text` as an RFC 2047 base64 encoded-word in `charset`.
fn encode_word(text: &str, charset: &str) -> EmailResult<String> {
	let label = charset.trim();
	// Non-ASCII text never fits an ASCII charset; it goes out as UTF-8.
	let encoding = if ["us-ascii", "ascii"]
		.iter()
		.any(|ascii| label.eq_ignore_ascii_case(ascii))
	{
		UTF_8
	} else {
		Encoding::for_label(label.as_bytes())
			.ok_or_else(|| EmailError::UnknownEncoding(charset.to_string()))?
	};
	let (bytes, encoding, had_errors) = encoding.encode(text);
	if had_errors {
		return Err(EmailError::InvalidAddress(format!(
			"{:?} cannot be represented in {}",
			text,
			encoding.name()
		)));
	}

	Ok(format!(
		"=?{}?b?{}?=",
		encoding.name().to_ascii_lowercase(),
		STANDARD.encode(&bytes)
	))
}
