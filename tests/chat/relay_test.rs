//! End-to-end relay tests against a local HTTP server.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::instrument::WithSubscriber;

use tianxing_chatbot::chat::tianxing::TianxingChatbot;
use tianxing_chatbot::chat::{Chatbot, Delivery, DropReason, UuidSource};
use tianxing_chatbot::sink::ChannelSink;

use super::support::{
    chatbot, endpoint, serve, serve_silence, LogCapture, LoopbackResolver, TEST_HOST, TEST_KEY,
    TEST_UUID,
};

const TWO_REPLIES: &str = r#"{"code":200,"newslist":[{"reply":"a<br/>b"},{"reply":"c"}]}"#;
const ONE_REPLY: &str = r#"{"code":200,"newslist":[{"reply":"hi"}]}"#;

fn request_line(head: &str) -> &str {
    head.lines().next().unwrap_or_default()
}

#[tokio::test]
async fn replies_are_forwarded_in_order_with_line_breaks() {
    let (port, mut requests) = serve(vec![TWO_REPLIES]).await;
    let (bot, mut replies) = chatbot(endpoint(port), Arc::new(LoopbackResolver::new()));

    let outcome = bot.handle_message("hello").await;
    assert_eq!(outcome, Delivery::Delivered(2));

    let batch = replies.try_recv().expect("one batch should be forwarded");
    assert_eq!(batch, vec!["a\nb".to_owned(), "c".to_owned()]);
    assert!(replies.try_recv().is_err(), "replies arrive in a single call");

    let head = requests.recv().await.expect("server should see the request");
    assert!(request_line(&head).starts_with("GET /txapi/robot/index?"));
}

#[tokio::test]
async fn request_carries_key_userid_and_encoded_question() {
    let (port, mut requests) = serve(vec![ONE_REPLY]).await;
    let (bot, _replies) = chatbot(endpoint(port), Arc::new(LoopbackResolver::new()));

    let outcome = bot.handle_message("你好 world&x=1").await;
    assert_eq!(outcome, Delivery::Delivered(1));

    let head = requests.recv().await.expect("server should see the request");
    let expected = format!(
        "GET /txapi/robot/index?key={TEST_KEY}&userid={TEST_UUID}&question=%E4%BD%A0%E5%A5%BD+world%26x%3D1 HTTP/1.1"
    );
    assert_eq!(request_line(&head), expected);
    assert!(
        head.to_ascii_lowercase()
            .contains(&format!("host: {TEST_HOST}")),
        "host header should name the api host: {head}"
    );
}

#[tokio::test]
async fn switch_type_changes_request_path() {
    let (port, mut requests) = serve(vec![ONE_REPLY, ONE_REPLY]).await;
    let (bot, _replies) = chatbot(endpoint(port), Arc::new(LoopbackResolver::new()));

    bot.switch_type();
    assert_eq!(bot.handle_message("one").await, Delivery::Delivered(1));
    let head = requests.recv().await.expect("first request");
    assert!(request_line(&head).starts_with("GET /txapi/tuling/index?"));

    bot.switch_type();
    assert_eq!(bot.handle_message("two").await, Delivery::Delivered(1));
    let head = requests.recv().await.expect("second request");
    assert!(request_line(&head).starts_with("GET /txapi/robot/index?"));
}

#[tokio::test]
async fn take_message_runs_in_background() {
    let (port, _requests) = serve(vec![ONE_REPLY]).await;
    let (bot, mut replies) = chatbot(endpoint(port), Arc::new(LoopbackResolver::new()));

    let handle = Arc::clone(&bot).take_message("hello".to_owned());
    let batch = replies.recv().await.expect("batch should arrive");
    assert_eq!(batch, vec!["hi".to_owned()]);
    assert!(matches!(handle.await, Ok(Delivery::Delivered(1))));
}

#[tokio::test]
async fn non_success_code_forwards_nothing_and_logs_error() {
    let (port, _requests) = serve(vec![r#"{"code":404}"#]).await;
    let (bot, mut replies) = chatbot(endpoint(port), Arc::new(LoopbackResolver::new()));
    let logs = LogCapture::default();

    let outcome = bot
        .handle_message("hello")
        .with_subscriber(logs.subscriber())
        .await;

    assert_eq!(outcome, Delivery::Dropped(DropReason::Application));
    assert!(replies.try_recv().is_err());
    let output = logs.contents();
    assert!(
        output
            .lines()
            .any(|line| line.contains("ERROR") && line.contains("code=404")),
        "error should be logged: {output}"
    );
}

#[tokio::test]
async fn non_success_code_wins_over_malformed_replies() {
    let (port, _requests) = serve(vec![r#"{"code":250,"msg":"x","newslist":[{"msg":"quota"}]}"#]).await;
    let (bot, mut replies) = chatbot(endpoint(port), Arc::new(LoopbackResolver::new()));
    let logs = LogCapture::default();

    let outcome = bot
        .handle_message("hello")
        .with_subscriber(logs.subscriber())
        .await;

    assert_eq!(outcome, Delivery::Dropped(DropReason::Application));
    assert!(replies.try_recv().is_err());
    let output = logs.contents();
    assert!(
        output
            .lines()
            .any(|line| line.contains("code is not 200") && line.contains("code=250")),
        "application error should be logged: {output}"
    );
    assert!(!output.contains("is not valid"), "not a malformed body: {output}");
}

#[tokio::test]
async fn non_json_body_is_logged_verbatim() {
    let (port, _requests) = serve(vec!["not json"]).await;
    let (bot, mut replies) = chatbot(endpoint(port), Arc::new(LoopbackResolver::new()));
    let logs = LogCapture::default();

    let outcome = bot
        .handle_message("hello")
        .with_subscriber(logs.subscriber())
        .await;

    assert_eq!(outcome, Delivery::Dropped(DropReason::Malformed));
    assert!(replies.try_recv().is_err());
    let output = logs.contents();
    assert!(
        output
            .lines()
            .any(|line| line.contains("ERROR") && line.contains("not json")),
        "raw body should be logged: {output}"
    );
}

#[tokio::test]
async fn missing_reply_field_is_contained() {
    let (port, _requests) = serve(vec![r#"{"code":200,"newslist":[{"notreply":"x"}]}"#]).await;
    let (bot, mut replies) = chatbot(endpoint(port), Arc::new(LoopbackResolver::new()));

    let handle = Arc::clone(&bot).take_message("hello".to_owned());
    let joined = handle.await;
    assert!(matches!(
        joined,
        Ok(Delivery::Dropped(DropReason::Malformed))
    ));
    assert!(replies.try_recv().is_err());
}

#[tokio::test]
async fn refused_connection_is_a_transport_failure() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("should bind");
        listener.local_addr().expect("should have addr").port()
    };
    let (bot, mut replies) = chatbot(endpoint(port), Arc::new(LoopbackResolver::new()));

    let outcome = bot.handle_message("hello").await;
    assert_eq!(outcome, Delivery::Dropped(DropReason::Transport));
    assert!(replies.try_recv().is_err());
    assert!(bot.is_connected(), "the handle survives transport failures");
}

#[tokio::test]
async fn silent_server_times_out() {
    let port = serve_silence().await;
    let mut endpoint = endpoint(port);
    endpoint.timeout = Duration::from_millis(200);
    let (bot, mut replies) = chatbot(endpoint, Arc::new(LoopbackResolver::new()));

    let outcome = bot.handle_message("hello").await;
    assert_eq!(outcome, Delivery::Dropped(DropReason::Transport));
    assert!(replies.try_recv().is_err());
}

struct RotatingUuid(Mutex<Vec<&'static str>>);

impl UuidSource for RotatingUuid {
    fn uuid(&self) -> String {
        match self.0.lock() {
            Ok(mut ids) => ids.pop().unwrap_or_default().to_owned(),
            Err(_) => String::new(),
        }
    }
}

#[tokio::test]
async fn uuid_is_read_for_every_request() {
    let (port, mut requests) = serve(vec![ONE_REPLY, ONE_REPLY]).await;
    let (sink, _replies) = ChannelSink::new();
    let bot = TianxingChatbot::new(
        endpoint(port),
        Arc::new(LoopbackResolver::new()),
        Arc::new(sink),
        Arc::new(RotatingUuid(Mutex::new(vec!["second", "first"]))),
    );
    assert!(bot.init(TEST_KEY).is_ok());

    assert_eq!(bot.handle_message("a").await, Delivery::Delivered(1));
    assert_eq!(bot.handle_message("b").await, Delivery::Delivered(1));

    let first = requests.recv().await.expect("first request");
    let second = requests.recv().await.expect("second request");
    assert!(request_line(&first).contains("userid=first&"));
    assert!(request_line(&second).contains("userid=second&"));
}
