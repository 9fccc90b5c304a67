//! Office 365 backend integration tests
//!
//! Drives O365Backend against the in-memory provider, covering session
//! opening, configuration and authentication failures, body selection,
//! attachments, address normalization, fail_silently and batch accounting.

use reinhardt_mail_o365::memory::MemoryAuthClient;
use reinhardt_mail_o365::{
	Alternative, AttachmentSource, AuthFlow, BodyType, EmailBackend, EmailError, EmailMessage,
	O365Backend, O365Settings,
};
use rstest::*;
use std::io::Read;
use std::sync::Arc;

fn complete_settings() -> O365Settings {
	O365Settings::new()
		.with_tenant_id("tenant")
		.with_client_id("client")
		.with_client_secret("secret")
		.with_sender("sender@example.com")
}

/// Fixture: complete settings
#[fixture]
fn settings() -> O365Settings {
	complete_settings()
}

/// Fixture: memory provider
#[fixture]
fn client() -> MemoryAuthClient {
	MemoryAuthClient::new()
}

fn backend(settings: O365Settings, client: &MemoryAuthClient) -> O365Backend {
	O365Backend::new(settings, Arc::new(client.clone()))
}

fn message(to: &[&str]) -> EmailMessage {
	EmailMessage::builder()
		.from("sender@example.com")
		.to(to.iter().map(|s| s.to_string()).collect())
		.subject("Test Subject")
		.body("Test Body")
		.build()
		.unwrap()
}

/// Test: simple message goes through the whole call sequence
#[rstest]
#[tokio::test]
async fn test_send_simple_email(settings: O365Settings, client: MemoryAuthClient) {
	// Arrange
	let backend = backend(settings, &client);

	// Act
	let sent = backend
		.send_messages(&[message(&["recipient@example.com"])])
		.await
		.unwrap();

	// Assert
	assert_eq!(sent, 1);
	let auths = client.authentications();
	assert_eq!(auths.len(), 1);
	assert_eq!(auths[0].flow, AuthFlow::Credentials);
	assert_eq!(auths[0].credentials.tenant_id(), "tenant");
	assert_eq!(auths[0].credentials.client_id(), "client");
	assert_eq!(auths[0].credentials.client_secret(), "secret");
	assert_eq!(client.mailbox_resources(), vec!["sender@example.com"]);
	assert_eq!(client.new_message_calls(), 1);

	let messages = client.sent_messages();
	assert_eq!(messages.len(), 1);
	assert_eq!(messages[0].resource, "sender@example.com");
	assert_eq!(messages[0].recipients, vec!["recipient@example.com"]);
	assert_eq!(messages[0].subject, "Test Subject");
	assert_eq!(messages[0].body, "Test Body");
	assert_eq!(messages[0].body_type, Some(BodyType::Text));
	assert!(messages[0].attachments.is_empty());
}

/// Test: empty batch never opens a session
#[rstest]
#[tokio::test]
async fn test_empty_batch_returns_zero_without_authenticating(client: MemoryAuthClient) {
	// Settings are incomplete on purpose: opening a session would fail.
	let backend = backend(O365Settings::new(), &client);

	let sent = backend.send_messages(&[]).await.unwrap();

	assert_eq!(sent, 0);
	assert!(client.authentications().is_empty());
	assert!(!backend.has_session().await);
}

/// Test: each missing required setting is a configuration error, checked
/// before any authentication attempt
#[rstest]
#[case(complete_settings().with_tenant_id(""))]
#[case(complete_settings().with_client_id(""))]
#[case(complete_settings().with_client_secret(""))]
#[case(complete_settings().with_sender(""))]
#[case(O365Settings::new())]
#[tokio::test]
async fn test_missing_settings_raise_configuration_error(
	#[case] settings: O365Settings,
	client: MemoryAuthClient,
) {
	// Arrange
	let backend = backend(settings, &client);

	// Act
	let result = backend.open().await;

	// Assert
	assert!(matches!(result, Err(EmailError::Configuration(_))));
	assert!(client.authentications().is_empty());
}

/// Test: rejected credentials raise an authentication error and no mailbox
/// is derived
#[rstest]
#[tokio::test]
async fn test_authentication_failure(settings: O365Settings, client: MemoryAuthClient) {
	// Arrange
	client.reject_credentials();
	let backend = backend(settings, &client);

	// Act
	let result = backend.open().await;

	// Assert
	assert!(matches!(result, Err(EmailError::Authentication(_))));
	assert_eq!(client.authentications().len(), 1);
	assert!(client.mailbox_resources().is_empty());
	assert!(!backend.has_session().await);
}

/// Test: session failures propagate from send_messages unless fail_silently
#[rstest]
#[tokio::test]
async fn test_open_failure_in_batch(settings: O365Settings, client: MemoryAuthClient) {
	// Arrange
	client.reject_credentials();
	let loud = backend(settings.clone(), &client);
	let silent = backend(settings, &client).with_fail_silently(true);
	let batch = [message(&["to@example.com"])];

	// Act
	let loud_result = loud.send_messages(&batch).await;
	let silent_result = silent.send_messages(&batch).await;

	// Assert
	assert!(matches!(loud_result, Err(EmailError::Authentication(_))));
	assert_eq!(silent_result.unwrap(), 0);
	assert_eq!(client.new_message_calls(), 0);
}

/// Test: an error from the credential exchange is an authentication error
#[rstest]
#[tokio::test]
async fn test_authentication_exchange_error(settings: O365Settings, client: MemoryAuthClient) {
	// Arrange
	client.fail_authentication();
	let loud = backend(settings.clone(), &client);
	let silent = backend(settings, &client).with_fail_silently(true);
	let batch = [message(&["to@example.com"])];

	// Act
	let open_result = loud.open().await;
	let loud_result = loud.send_messages(&batch).await;
	let silent_result = silent.send_messages(&batch).await;

	// Assert
	assert!(matches!(open_result, Err(EmailError::Authentication(_))));
	assert!(matches!(loud_result, Err(EmailError::Authentication(_))));
	assert_eq!(silent_result.unwrap(), 0);
	assert!(client.mailbox_resources().is_empty());
	assert!(!loud.has_session().await);
	assert!(!silent.has_session().await);
	assert_eq!(client.new_message_calls(), 0);
}

/// Test: failing to derive the sender mailbox is a transport error
#[rstest]
#[tokio::test]
async fn test_mailbox_lookup_error(settings: O365Settings, client: MemoryAuthClient) {
	// Arrange
	client.fail_mailbox();
	let loud = backend(settings.clone(), &client);
	let silent = backend(settings, &client).with_fail_silently(true);
	let batch = [message(&["to@example.com"])];

	// Act
	let open_result = loud.open().await;
	let loud_result = loud.send_messages(&batch).await;
	let silent_result = silent.send_messages(&batch).await;

	// Assert
	assert!(matches!(open_result, Err(EmailError::Transport(_))));
	assert!(matches!(loud_result, Err(EmailError::Transport(_))));
	assert_eq!(silent_result.unwrap(), 0);
	assert_eq!(client.authentications().len(), 3);
	assert!(!loud.has_session().await);
	assert!(!silent.has_session().await);
	assert_eq!(client.new_message_calls(), 0);
}

/// Test: configuration errors are absorbed by a fail_silently batch too
#[rstest]
#[tokio::test]
async fn test_configuration_error_absorbed_when_silent(client: MemoryAuthClient) {
	let backend = backend(O365Settings::new().with_fail_silently(true), &client);

	let sent = backend
		.send_messages(&[message(&["to@example.com"])])
		.await
		.unwrap();

	assert_eq!(sent, 0);
	assert!(client.authentications().is_empty());
}

/// Test: message without recipients is skipped without provider calls
#[rstest]
#[tokio::test]
async fn test_send_message_with_no_recipients(settings: O365Settings, client: MemoryAuthClient) {
	// Arrange
	let backend = backend(settings, &client);
	let email = EmailMessage::builder()
		.from("sender@example.com")
		.subject("No Recipients")
		.body("Body")
		.build()
		.unwrap();

	// Act
	let sent = backend.send_messages(&[email]).await.unwrap();

	// Assert
	assert_eq!(sent, 0);
	assert_eq!(client.new_message_calls(), 0);
	assert_eq!(client.send_calls(), 0);
}

/// Test: the first text/html alternative becomes the body
#[rstest]
#[tokio::test]
async fn test_html_alternative_becomes_body(settings: O365Settings, client: MemoryAuthClient) {
	// Arrange
	let backend = backend(settings, &client);
	let email = EmailMessage::builder()
		.from("sender@example.com")
		.to(vec!["to@example.com".to_string()])
		.subject("HTML")
		.body("plain")
		.alternative(Alternative::new("<p>hi</p>", "text/html"))
		.alternative(Alternative::new("<p>later</p>", "text/html"))
		.build()
		.unwrap();

	// Act
	backend.send_messages(&[email]).await.unwrap();

	// Assert
	let sent = &client.sent_messages()[0];
	assert_eq!(sent.body, "<p>hi</p>");
	assert_eq!(sent.body_type, Some(BodyType::Html));
	assert_eq!(sent.body_type.map(|t| t.as_str()), Some("HTML"));
}

/// Test: alternatives without text/html fall back to the plain body
#[rstest]
#[tokio::test]
async fn test_non_html_alternatives_use_plain_body(
	settings: O365Settings,
	client: MemoryAuthClient,
) {
	// Arrange
	let backend = backend(settings, &client);
	let email = EmailMessage::builder()
		.from("sender@example.com")
		.to(vec!["to@example.com".to_string()])
		.subject("Plain")
		.body("plain body")
		.alternative(Alternative::new("# markdown", "text/markdown"))
		.build()
		.unwrap();

	// Act
	backend.send_messages(&[email]).await.unwrap();

	// Assert
	let sent = &client.sent_messages()[0];
	assert_eq!(sent.body, "plain body");
	assert_eq!(sent.body_type, Some(BodyType::Text));
}

/// Test: path attachment is added by reference
#[rstest]
#[tokio::test]
async fn test_send_message_with_path_attachment(
	settings: O365Settings,
	client: MemoryAuthClient,
) {
	// Arrange
	let backend = backend(settings, &client);
	let email = EmailMessage::builder()
		.from("sender@example.com")
		.to(vec!["to@example.com".to_string()])
		.subject("With Attachment")
		.body("Body")
		.attachment("file.pdf")
		.build()
		.unwrap();

	// Act
	let sent = backend.send_messages(&[email]).await.unwrap();

	// Assert
	assert_eq!(sent, 1);
	assert_eq!(
		client.sent_messages()[0].attachments,
		vec![AttachmentSource::Path("file.pdf".to_string())]
	);
}

/// Test: in-memory attachment is added as a single (stream, filename) pair
#[rstest]
#[tokio::test]
async fn test_send_message_with_content_attachment(
	settings: O365Settings,
	client: MemoryAuthClient,
) {
	// Arrange
	let backend = backend(settings, &client);
	let email = EmailMessage::builder()
		.from("sender@example.com")
		.to(vec!["to@example.com".to_string()])
		.subject("With Content Attachment")
		.body("Body")
		.attachment(("file.txt", b"content".to_vec(), "text/plain"))
		.build()
		.unwrap();

	// Act
	let sent = backend.send_messages(&[email]).await.unwrap();

	// Assert
	assert_eq!(sent, 1);
	let mut attachments = client.sent_messages()[0].attachments.clone();
	assert_eq!(attachments.len(), 1);
	let AttachmentSource::Streams(streams) = &mut attachments[0] else {
		panic!("expected an in-memory attachment");
	};
	assert_eq!(streams.len(), 1);
	let (stream, filename) = &mut streams[0];
	assert_eq!(filename.as_str(), "file.txt");
	let mut content = Vec::new();
	stream.read_to_end(&mut content).unwrap();
	assert_eq!(content, b"content");
}

/// Test: attachments keep message order
#[rstest]
#[tokio::test]
async fn test_attachments_keep_order(settings: O365Settings, client: MemoryAuthClient) {
	let backend = backend(settings, &client);
	let email = EmailMessage::builder()
		.from("sender@example.com")
		.to(vec!["to@example.com".to_string()])
		.subject("Order")
		.attachment(("a.txt", b"a".to_vec(), "text/plain"))
		.attachment("b.pdf")
		.build()
		.unwrap();

	backend.send_messages(&[email]).await.unwrap();

	let attachments = &client.sent_messages()[0].attachments;
	assert_eq!(attachments.len(), 2);
	assert!(matches!(&attachments[0], AttachmentSource::Streams(s) if s[0].1 == "a.txt"));
	assert_eq!(attachments[1], AttachmentSource::Path("b.pdf".to_string()));
}

/// Test: display names are stripped from recipients, order and duplicates kept
#[rstest]
#[tokio::test]
async fn test_recipients_are_normalized(settings: O365Settings, client: MemoryAuthClient) {
	// Arrange
	let backend = backend(settings, &client);
	let email = EmailMessage::builder()
		.from("Sender Name <sender@example.com>")
		.to(vec![
			"First <first@example.com>".to_string(),
			"second@bücher.example".to_string(),
		])
		.cc(vec!["\"Doe, Jane\" <jane@example.com>".to_string()])
		.bcc(vec!["first@example.com".to_string()])
		.subject("Recipients")
		.body("Body")
		.build()
		.unwrap();

	// Act
	backend.send_messages(&[email]).await.unwrap();

	// Assert
	assert_eq!(
		client.sent_messages()[0].recipients,
		vec![
			"first@example.com",
			"second@xn--bcher-kva.example",
			"jane@example.com",
			"first@example.com",
		]
	);
}

/// Test: invalid addresses propagate even when fail_silently is set
#[rstest]
#[tokio::test]
async fn test_address_errors_always_propagate(
	settings: O365Settings,
	client: MemoryAuthClient,
) {
	let backend = backend(settings.with_fail_silently(true), &client);
	let email = message(&["victim@example.com\nBcc: other@example.com"]);

	let result = backend.send_messages(&[email]).await;

	assert!(matches!(result, Err(EmailError::HeaderInjection(_))));
	assert_eq!(client.new_message_calls(), 0);
}

/// Test: an empty from address falls back to the configured sender
#[rstest]
#[tokio::test]
async fn test_empty_from_uses_sender(settings: O365Settings, client: MemoryAuthClient) {
	let backend = backend(settings, &client);
	let email = EmailMessage::builder()
		.to(vec!["to@example.com".to_string()])
		.subject("No From")
		.build()
		.unwrap();

	let sent = backend.send_messages(&[email]).await.unwrap();

	assert_eq!(sent, 1);
}

/// Test: message charset overrides the default charset
#[rstest]
#[tokio::test]
async fn test_message_encoding_overrides_default(
	settings: O365Settings,
	client: MemoryAuthClient,
) {
	// Arrange
	let backend = backend(settings.with_default_charset("not-a-charset"), &client);
	let with_encoding = EmailMessage::builder()
		.from("Jörg <sender@example.com>")
		.to(vec!["to@example.com".to_string()])
		.subject("Charset")
		.encoding("utf-8")
		.build()
		.unwrap();
	let without_encoding = EmailMessage::builder()
		.from("Jörg <sender@example.com>")
		.to(vec!["to@example.com".to_string()])
		.subject("Charset")
		.build()
		.unwrap();

	// Act
	let first = backend.send_messages(&[with_encoding]).await;
	let second = backend.send_messages(&[without_encoding]).await;

	// Assert
	assert_eq!(first.unwrap(), 1);
	assert!(matches!(second, Err(EmailError::UnknownEncoding(_))));
}

/// Test: non-ASCII display names under an ASCII default charset are sent as
/// UTF-8 encoded words
#[rstest]
#[tokio::test]
async fn test_ascii_default_charset_sends_non_ascii_names(
	settings: O365Settings,
	client: MemoryAuthClient,
) {
	// Arrange
	let backend = backend(
		settings
			.with_default_charset("us-ascii")
			.with_fail_silently(true),
		&client,
	);
	let cjk = EmailMessage::builder()
		.from("山田 <sender@example.com>")
		.to(vec!["田中 <tanaka@example.com>".to_string()])
		.subject("CJK")
		.build()
		.unwrap();
	let batch = [message(&["to@example.com"]), cjk];

	// Act
	let sent = backend.send_messages(&batch).await.unwrap();

	// Assert
	assert_eq!(sent, 2);
	assert_eq!(
		client.sent_messages()[1].recipients,
		vec!["tanaka@example.com"]
	);
}

/// Test: send failure is absorbed with fail_silently
#[rstest]
#[tokio::test]
async fn test_send_failure_fail_silently(settings: O365Settings, client: MemoryAuthClient) {
	// Arrange
	client.fail_send_at(0);
	let backend = backend(settings.with_fail_silently(true), &client);

	// Act
	let sent = backend
		.send_messages(&[message(&["to@example.com"])])
		.await
		.unwrap();

	// Assert
	assert_eq!(sent, 0);
	assert_eq!(client.send_calls(), 1);
	assert_eq!(client.count(), 0);
}

/// Test: send failure propagates without fail_silently and aborts the batch
#[rstest]
#[tokio::test]
async fn test_send_failure_propagates(settings: O365Settings, client: MemoryAuthClient) {
	// Arrange
	client.fail_new_message_at(0);
	let backend = backend(settings, &client);
	let batch = [message(&["a@example.com"]), message(&["b@example.com"])];

	// Act
	let result = backend.send_messages(&batch).await;

	// Assert
	match result {
		Err(error) => assert!(error.is_transport(), "unexpected error {:?}", error),
		Ok(sent) => panic!("expected a transport error, sent {}", sent),
	}
	assert_eq!(client.new_message_calls(), 1);
	assert_eq!(client.count(), 0);
}

/// Test: a failing message does not stop the rest of a fail_silently batch
#[rstest]
#[tokio::test]
async fn test_partial_batch_fail_silently(settings: O365Settings, client: MemoryAuthClient) {
	// Arrange
	client.fail_new_message_at(1);
	let backend = backend(settings.with_fail_silently(true), &client);
	let batch = [message(&["a@example.com"]), message(&["b@example.com"])];

	// Act
	let sent = backend.send_messages(&batch).await.unwrap();

	// Assert
	assert_eq!(sent, 1);
	assert_eq!(client.sent_messages()[0].recipients, vec!["a@example.com"]);
}

/// Test: batch count only includes messages with recipients that were sent
#[rstest]
#[tokio::test]
async fn test_batch_count(settings: O365Settings, client: MemoryAuthClient) {
	// Arrange
	client.fail_send_at(2);
	let backend = backend(settings.with_fail_silently(true), &client);
	let batch = [
		message(&["one@example.com"]),
		message(&[]),
		message(&["two@example.com"]),
		message(&["three@example.com"]),
		message(&["four@example.com"]),
	];

	// Act
	let sent = backend.send_messages(&batch).await.unwrap();

	// Assert
	assert_eq!(sent, 3);
	let recipients: Vec<_> = client
		.sent_messages()
		.into_iter()
		.flat_map(|m| m.recipients)
		.collect();
	assert_eq!(
		recipients,
		vec!["one@example.com", "two@example.com", "four@example.com"]
	);
}

/// Test: every batch re-authenticates and replaces the session
#[rstest]
#[tokio::test]
async fn test_each_batch_reauthenticates(settings: O365Settings, client: MemoryAuthClient) {
	let backend = backend(settings, &client);

	backend
		.send_messages(&[message(&["a@example.com"])])
		.await
		.unwrap();
	backend
		.send_messages(&[message(&["b@example.com"])])
		.await
		.unwrap();

	assert_eq!(client.authentications().len(), 2);
	assert_eq!(client.mailbox_resources().len(), 2);
	assert!(backend.has_session().await);
}

/// Test: EmailMessage::send goes through the backend
#[rstest]
#[tokio::test]
async fn test_message_send_helper(settings: O365Settings, client: MemoryAuthClient) {
	let backend = backend(settings, &client);

	let sent = message(&["to@example.com"]).send(&backend).await.unwrap();

	assert_eq!(sent, 1);
	assert_eq!(client.count(), 1);
}
