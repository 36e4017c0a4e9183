//! Integration tests for the Gmail client.
//!
//! A local listener plays the API with canned responses, one connection per
//! request, so no network access or real account is needed.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use billdigest_core::{MailApi, MailSender, OutgoingMail};
use billdigest_gmail::{Error, GmailClient};
use billdigest_oauth::{AccessTokens, OAuthClient, Provider, Token, TokenStore};
use chrono::{NaiveDate, Utc};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Request line and body of every request the server received.
type Seen = Arc<Mutex<Vec<(String, String)>>>;

/// Serves `responses` in order, then stops accepting.
async fn serve(responses: Vec<(u16, &'static str)>) -> (String, Seen) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let seen: Seen = Arc::default();
    let log = Arc::clone(&seen);

    tokio::spawn(async move {
        for (status, body) in responses {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            log.lock().unwrap().push(request);

            let response = format!(
                "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        }
    });

    (base, seen)
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> (String, String) {
    let mut data = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = socket.read(&mut chunk).await.unwrap();
        data.extend_from_slice(&chunk[..n]);
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        assert!(n > 0, "connection closed before headers");
    };

    let head = String::from_utf8_lossy(&data[..header_end]).to_string();
    let length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);

    while data.len() < header_end + length {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        data.extend_from_slice(&chunk[..n]);
    }

    let request_line = head.lines().next().unwrap_or_default().to_string();
    let body = String::from_utf8_lossy(&data[header_end..]).to_string();
    (request_line, body)
}

/// A client whose stored token is valid, talking to `base`.
async fn client(base: &str, dir: &tempfile::TempDir, token: Token) -> GmailClient {
    let store = TokenStore::new(dir.path().join("token.json"));
    store.save(&token).await.unwrap();

    let provider = Provider::new(
        "Local",
        format!("{base}/auth"),
        format!("{base}/token"),
    )
    .unwrap();
    let tokens = AccessTokens::new(OAuthClient::new("client", provider), store);

    GmailClient::with_base_url(tokens, base).with_retry_base(Duration::from_millis(1))
}

fn valid_token() -> Token {
    Token::new("good", "Bearer")
        .with_refresh_token("refresh")
        .with_expires_at(Utc::now() + chrono::Duration::hours(1))
}

#[tokio::test]
async fn test_list_labels() {
    let (base, seen) = serve(vec![(
        200,
        r#"{"labels":[{"id":"INBOX","name":"INBOX","type":"system"},{"id":"Label_1","name":"Electric","type":"user"}]}"#,
    )])
    .await;
    let dir = tempfile::tempdir().unwrap();
    let gmail = client(&base, &dir, valid_token()).await;

    let labels = gmail.list_labels().await.unwrap();
    assert_eq!(labels.len(), 2);
    assert_eq!(labels[1].name, "Electric");
    assert_eq!(labels[1].id, "Label_1");
    assert_eq!(seen.lock().unwrap()[0].0, "GET /users/me/labels HTTP/1.1");
}

#[tokio::test]
async fn test_list_message_ids_follows_pages() {
    let (base, seen) = serve(vec![
        (200, r#"{"messages":[{"id":"m1","threadId":"t1"}],"nextPageToken":"p2"}"#),
        (200, r#"{"messages":[{"id":"m2","threadId":"t2"}],"resultSizeEstimate":2}"#),
    ])
    .await;
    let dir = tempfile::tempdir().unwrap();
    let gmail = client(&base, &dir, valid_token()).await;

    let since = NaiveDate::from_ymd_opt(2024, 2, 4).unwrap();
    let ids = gmail.list_message_ids("Label_1", since).await.unwrap();
    assert_eq!(ids, vec!["m1", "m2"]);

    let seen = seen.lock().unwrap();
    assert!(seen[0].0.contains("labelIds=Label_1"));
    assert!(seen[0].0.contains("q=after%3A2024%2F02%2F04"));
    assert!(!seen[0].0.contains("pageToken"));
    assert!(seen[1].0.contains("pageToken=p2"));
}

#[tokio::test]
async fn test_get_message_retries_server_errors() {
    let (base, seen) = serve(vec![
        (503, r#"{"error":{"code":503,"message":"Backend Error"}}"#),
        (
            200,
            r#"{"id":"m1","labelIds":["Label_1"],"internalDate":"1700000000000","payload":{"mimeType":"text/plain","body":{"size":2,"data":"aGk"}}}"#,
        ),
    ])
    .await;
    let dir = tempfile::tempdir().unwrap();
    let gmail = client(&base, &dir, valid_token()).await;

    let message = gmail.get_message("m1").await.unwrap();
    assert_eq!(message.id, "m1");
    assert_eq!(message.received_at_millis(), Some(1_700_000_000_000));

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert!(seen[1].0.starts_with("GET /users/me/messages/m1?format=full"));
}

#[tokio::test]
async fn test_retries_exhausted() {
    let (base, _seen) = serve(vec![
        (500, "oops"),
        (500, "oops"),
        (500, r#"{"error":{"code":500,"message":"Internal error"}}"#),
    ])
    .await;
    let dir = tempfile::tempdir().unwrap();
    let gmail = client(&base, &dir, valid_token()).await.with_max_retries(2);

    let err = gmail.get_attachment("m1", "att1").await.unwrap_err();
    assert_eq!(err.status(), Some(500));
    assert!(err.to_string().contains("Internal error"));
}

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let (base, seen) = serve(vec![(404, r#"{"error":{"code":404,"message":"Not Found"}}"#)]).await;
    let dir = tempfile::tempdir().unwrap();
    let gmail = client(&base, &dir, valid_token()).await;

    let err = gmail.get_message("gone").await.unwrap_err();
    assert!(matches!(err, Error::Api { status: 404, .. }));
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_unauthorized_refreshes_token_once() {
    let (base, seen) = serve(vec![
        (401, r#"{"error":{"code":401,"message":"Invalid Credentials"}}"#),
        (200, r#"{"access_token":"fresh","token_type":"Bearer","expires_in":3599}"#),
        (200, r#"{"size":4,"data":"JVBERg"}"#),
    ])
    .await;
    let dir = tempfile::tempdir().unwrap();
    let gmail = client(&base, &dir, valid_token()).await;

    let data = gmail.get_attachment("m1", "att1").await.unwrap();
    assert_eq!(data, "JVBERg");

    let seen = seen.lock().unwrap();
    assert_eq!(seen[1].0, "POST /token HTTP/1.1");
    assert!(seen[1].1.contains("grant_type=refresh_token"));
    assert!(seen[2].0.starts_with("GET /users/me/messages/m1/attachments/att1"));

    let stored = std::fs::read_to_string(dir.path().join("token.json")).unwrap();
    let stored: Token = serde_json::from_str(&stored).unwrap();
    assert_eq!(stored.access_token, "fresh");
    assert_eq!(stored.refresh_token.as_deref(), Some("refresh"));
}

#[tokio::test]
async fn test_send_mail_posts_raw_message() {
    let (base, seen) = serve(vec![(
        200,
        r#"{"id":"sent1","threadId":"sent1","labelIds":["SENT"]}"#,
    )])
    .await;
    let dir = tempfile::tempdir().unwrap();
    let gmail = client(&base, &dir, valid_token()).await;

    let mail = OutgoingMail {
        from: "Bill Digest <bills@example.com>".to_string(),
        to: vec!["me@example.com".to_string()],
        subject: "Bills".to_string(),
        text: "Total: $1.00".to_string(),
        html: "<b>$1.00</b>".to_string(),
        attachments: vec![],
    };

    assert_eq!(gmail.send_mail(&mail).await.unwrap(), "sent1");

    let seen = seen.lock().unwrap();
    assert_eq!(seen[0].0, "POST /users/me/messages/send HTTP/1.1");
    let body: serde_json::Value = serde_json::from_str(&seen[0].1).unwrap();
    let raw = body["raw"].as_str().unwrap();
    let decoded = billdigest_mime::encoding::decode_transport_text(raw).unwrap();
    assert!(decoded.contains("To: me@example.com\r\n"));
    assert!(decoded.contains("Subject: Bills\r\n"));
}

#[tokio::test]
async fn test_send_mail_does_not_retry_server_errors() {
    let (base, seen) = serve(vec![(502, "Bad Gateway")]).await;
    let dir = tempfile::tempdir().unwrap();
    let gmail = client(&base, &dir, valid_token()).await;

    let mail = OutgoingMail {
        from: "bills@example.com".to_string(),
        to: vec!["me@example.com".to_string()],
        subject: "Bills".to_string(),
        text: String::new(),
        html: String::new(),
        attachments: vec![],
    };

    let err = gmail.send_mail(&mail).await.unwrap_err();
    assert_eq!(err.status(), Some(502));
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_invalid_message_id_is_rejected_locally() {
    let (base, seen) = serve(vec![]).await;
    let dir = tempfile::tempdir().unwrap();
    let gmail = client(&base, &dir, valid_token()).await;

    assert!(matches!(
        gmail.get_message("../labels").await,
        Err(Error::InvalidId(_))
    ));
    assert!(seen.lock().unwrap().is_empty());
}
