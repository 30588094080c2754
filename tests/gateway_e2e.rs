//! End-to-end tests for the translation gateway.
//!
//! Each test spins up the real SMTP server on a random port with
//! substitute collaborators (name service, XMTP transport, email sender),
//! speaks SMTP over a real TCP socket, and asserts on what reached the
//! fakes.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use xmtp_mx::email::EmailSender;
use xmtp_mx::error::{EmailError, ResolveError, XmtpError};
use xmtp_mx::pipeline::{
    EmailToXmtp, ErrorNotifier, MessageSender, StreamConsumer, XmtpToEmail,
};
use xmtp_mx::resolver::{EnsResolver, NameService};
use xmtp_mx::smtp::SmtpServer;
use xmtp_mx::xmtp::{
    Conversation, ConversationStream, XmtpMessage, XmtpMessageStream, XmtpTransport,
};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

const CAROL: &str = "0xC0FFEE0000000000000000000000000000000001";
const FALLBACK: &str = "0x1234567890123456789012345678901234567890";

// ── Substitute collaborators ────────────────────────────────────────

struct TableNames;

#[async_trait]
impl NameService for TableNames {
    async fn lookup(&self, name: &str) -> Result<Option<String>, ResolveError> {
        Ok((name == "carol.eth").then(|| CAROL.to_string()))
    }
}

#[derive(Default)]
struct RecordingTransport {
    sends: Mutex<Vec<(String, String, String)>>,
}

#[async_trait]
impl XmtpTransport for RecordingTransport {
    async fn can_message(&self, _address: &str) -> Result<bool, XmtpError> {
        Ok(true)
    }

    async fn send(
        &self,
        address: &str,
        conversation_id: &str,
        content: &str,
    ) -> Result<(), XmtpError> {
        self.sends.lock().unwrap().push((
            address.to_string(),
            conversation_id.to_string(),
            content.to_string(),
        ));
        Ok(())
    }

    fn stream_conversations(&self, _cancel: CancellationToken) -> ConversationStream {
        Box::pin(futures::stream::empty())
    }

    fn stream_messages(
        &self,
        _conversation: &Conversation,
        _cancel: CancellationToken,
    ) -> XmtpMessageStream {
        Box::pin(futures::stream::empty())
    }
}

/// Transport that replays one conversation of scripted messages.
struct OneConversationTransport {
    messages: Vec<XmtpMessage>,
}

#[async_trait]
impl XmtpTransport for OneConversationTransport {
    async fn can_message(&self, _address: &str) -> Result<bool, XmtpError> {
        Ok(true)
    }

    async fn send(
        &self,
        _address: &str,
        _conversation_id: &str,
        _content: &str,
    ) -> Result<(), XmtpError> {
        Ok(())
    }

    fn stream_conversations(&self, _cancel: CancellationToken) -> ConversationStream {
        Box::pin(futures::stream::iter(vec![Conversation {
            topic: "t-1".into(),
            peer_address: "0xsender".into(),
        }]))
    }

    fn stream_messages(
        &self,
        _conversation: &Conversation,
        _cancel: CancellationToken,
    ) -> XmtpMessageStream {
        Box::pin(futures::stream::iter(self.messages.clone()))
    }
}

#[derive(Default)]
struct RecordingEmail {
    sent: Mutex<Vec<(String, String, String)>>,
}

#[async_trait]
impl EmailSender for RecordingEmail {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), EmailError> {
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), subject.to_string(), body.to_string()));
        Ok(())
    }
}

// ── SMTP harness ────────────────────────────────────────────────────

/// Start the SMTP server on a random port, return its port.
async fn start_smtp(transport: Arc<RecordingTransport>) -> (u16, CancellationToken) {
    let resolver = Arc::new(EnsResolver::new(Arc::new(TableNames), FALLBACK.into()));
    let sender = MessageSender::new(
        transport as Arc<dyn XmtpTransport>,
        "xmtpmx.eth".into(),
    );
    let pipeline = Arc::new(EmailToXmtp::new(resolver, sender));

    let cancel = CancellationToken::new();
    let server = SmtpServer::new(
        "127.0.0.1:0".into(),
        "xmtp.mx".into(),
        pipeline,
        1024 * 1024,
        cancel.clone(),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        server.serve(listener).await.unwrap();
    });

    (port, cancel)
}

/// Send one command and read one reply line.
async fn roundtrip(
    reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>,
    writer: &mut tokio::net::tcp::OwnedWriteHalf,
    command: &str,
) -> String {
    writer.write_all(command.as_bytes()).await.unwrap();
    writer.write_all(b"\r\n").await.unwrap();
    read_reply(reader).await
}

/// Read one complete (possibly multi-line) SMTP reply.
async fn read_reply(reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>) -> String {
    let mut full = String::new();
    loop {
        let mut line = String::new();
        timeout(TEST_TIMEOUT, reader.read_line(&mut line))
            .await
            .expect("reply within timeout")
            .unwrap();
        full.push_str(&line);
        // "250-..." continues, "250 ..." ends the reply.
        if line.len() < 4 || line.as_bytes()[3] != b'-' {
            return full;
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn inbound_email_reaches_network_exactly_once() {
    let transport = Arc::new(RecordingTransport::default());
    let (port, cancel) = start_smtp(Arc::clone(&transport)).await;

    let stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let (read_half, mut writer) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    assert!(read_reply(&mut reader).await.starts_with("220"));
    assert!(
        roundtrip(&mut reader, &mut writer, "EHLO client.example")
            .await
            .starts_with("250")
    );
    assert!(
        roundtrip(&mut reader, &mut writer, "MAIL FROM:<someone@example.com>")
            .await
            .starts_with("250")
    );
    assert!(
        roundtrip(&mut reader, &mut writer, "RCPT TO:<carol.eth@gw>")
            .await
            .starts_with("250")
    );
    assert!(
        roundtrip(&mut reader, &mut writer, "DATA")
            .await
            .starts_with("354")
    );

    let payload = "From: someone@example.com\r\n\
                   To: carol.eth@gw\r\n\
                   Subject: test\r\n\
                   \r\n\
                   ping\r\n\
                   .";
    assert!(
        roundtrip(&mut reader, &mut writer, payload)
            .await
            .starts_with("250")
    );
    assert!(
        roundtrip(&mut reader, &mut writer, "QUIT")
            .await
            .starts_with("221")
    );

    // Exactly one network send, to the resolved address, body verbatim.
    let sends = transport.sends.lock().unwrap();
    assert_eq!(sends.len(), 1);
    assert_eq!(sends[0].0, CAROL);
    assert_eq!(sends[0].1, "xmtpmx.eth");
    assert_eq!(sends[0].2.trim_end(), "ping");

    cancel.cancel();
}

#[tokio::test]
async fn unresolvable_name_goes_to_fallback_address() {
    let transport = Arc::new(RecordingTransport::default());
    let (port, cancel) = start_smtp(Arc::clone(&transport)).await;

    let stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let (read_half, mut writer) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    read_reply(&mut reader).await;
    roundtrip(&mut reader, &mut writer, "HELO c").await;
    roundtrip(&mut reader, &mut writer, "MAIL FROM:<a@b.c>").await;
    roundtrip(&mut reader, &mut writer, "RCPT TO:<unknown.eth@gw>").await;
    roundtrip(&mut reader, &mut writer, "DATA").await;
    let reply = roundtrip(
        &mut reader,
        &mut writer,
        "To: unknown.eth@gw\r\n\r\nhello\r\n.",
    )
    .await;

    // Resolution failure is not a delivery failure.
    assert!(reply.starts_with("250"));
    let sends = transport.sends.lock().unwrap();
    assert_eq!(sends.len(), 1);
    assert_eq!(sends[0].0, FALLBACK);

    cancel.cancel();
}

#[tokio::test]
async fn malformed_recipient_is_rejected_and_nothing_sent() {
    let transport = Arc::new(RecordingTransport::default());
    let (port, cancel) = start_smtp(Arc::clone(&transport)).await;

    let stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let (read_half, mut writer) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    read_reply(&mut reader).await;
    roundtrip(&mut reader, &mut writer, "HELO c").await;
    roundtrip(&mut reader, &mut writer, "MAIL FROM:<a@b.c>").await;
    roundtrip(&mut reader, &mut writer, "RCPT TO:<plain@example.com>").await;
    roundtrip(&mut reader, &mut writer, "DATA").await;
    let reply = roundtrip(
        &mut reader,
        &mut writer,
        "To: plain@example.com\r\n\r\nhello\r\n.",
    )
    .await;

    assert!(reply.starts_with("554"));
    assert!(transport.sends.lock().unwrap().is_empty());

    cancel.cancel();
}

// ── XMTP → email direction ──────────────────────────────────────────

fn network_message(content: &str) -> XmtpMessage {
    XmtpMessage {
        sender_address: "0xsender".into(),
        content: content.into(),
        sent_at: chrono::Utc::now(),
    }
}

#[tokio::test]
async fn network_message_is_relayed_to_email() {
    let transport = Arc::new(OneConversationTransport {
        messages: vec![network_message(
            "To: test.eth@xmtp.mx\nSubject: Test Subject\n\nThis is a test message body.",
        )],
    });
    let email = Arc::new(RecordingEmail::default());

    let notifier = ErrorNotifier::new(Arc::clone(&email) as Arc<dyn EmailSender>);
    let pipeline = Arc::new(XmtpToEmail::new(
        Arc::clone(&email) as Arc<dyn EmailSender>,
        notifier,
        "operator@xmtp.mx".into(),
    ));
    let consumer = StreamConsumer::new(
        transport as Arc<dyn XmtpTransport>,
        pipeline,
        Arc::clone(&email) as Arc<dyn EmailSender>,
        "operator@xmtp.mx".into(),
        CancellationToken::new(),
    );

    timeout(TEST_TIMEOUT, consumer.run())
        .await
        .expect("consumer drains the scripted stream")
        .unwrap();

    let sent = email.sent.lock().unwrap();
    // Startup notification first, then the relay.
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].0, "test.eth@xmtp.mx");
    assert_eq!(sent[1].1, "Test Subject");
    assert_eq!(sent[1].2, "This is a test message body.");
}

#[tokio::test]
async fn invalid_relay_recipient_triggers_two_notifications() {
    let transport = Arc::new(OneConversationTransport {
        messages: vec![network_message(
            "To: invalid.address\nSubject: Invalid Test\n\nThis should trigger an error.",
        )],
    });
    let email = Arc::new(RecordingEmail::default());

    let notifier = ErrorNotifier::new(Arc::clone(&email) as Arc<dyn EmailSender>);
    let pipeline = Arc::new(XmtpToEmail::new(
        Arc::clone(&email) as Arc<dyn EmailSender>,
        notifier,
        "operator@xmtp.mx".into(),
    ));
    let consumer = StreamConsumer::new(
        transport as Arc<dyn XmtpTransport>,
        pipeline,
        Arc::clone(&email) as Arc<dyn EmailSender>,
        "operator@xmtp.mx".into(),
        CancellationToken::new(),
    );

    timeout(TEST_TIMEOUT, consumer.run())
        .await
        .expect("consumer drains the scripted stream")
        .unwrap();

    let sent = email.sent.lock().unwrap();
    // Startup notification, then operator + sender diagnostics.
    assert_eq!(sent.len(), 3);
    let recipients: Vec<&str> = sent[1..].iter().map(|(to, _, _)| to.as_str()).collect();
    assert_eq!(recipients, vec!["operator@xmtp.mx", "0xsender"]);
}
