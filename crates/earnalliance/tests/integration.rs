//! Integration tests for the Earn Alliance SDK.

use earnalliance::{Client, ClientBuilder, Error, Identifier, Identifiers, Signer, Traits};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const EVENTS_PATH: &str = "/v2/custom-events";

fn ok() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "message": "OK" }))
}

async fn mount_ok(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(EVENTS_PATH))
        .respond_with(ok())
        .mount(server)
        .await;
}

/// A builder pointed at the mock server with background flushing disabled.
fn builder(server: &MockServer) -> ClientBuilder {
    Client::builder()
        .client_id("a")
        .client_secret("b")
        .game_id("c")
        .dsn(format!("{}{}", server.uri(), EVENTS_PATH))
        .flush_interval(Duration::ZERO)
        .retry_backoff(Duration::from_millis(10))
}

async fn requests(server: &MockServer) -> Vec<Request> {
    server.received_requests().await.unwrap_or_default()
}

fn body(request: &Request) -> Value {
    serde_json::from_slice(&request.body).unwrap()
}

/// Poll until the server has seen `count` requests or the timeout passes.
async fn wait_for_requests(server: &MockServer, count: usize, timeout: Duration) -> Vec<Request> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let received = requests(server).await;
        if received.len() >= count || tokio::time::Instant::now() >= deadline {
            return received;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn test_flush_sends_signed_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(EVENTS_PATH))
        .and(header("x-client-id", "a"))
        .and(header("content-type", "application/json"))
        .and(header("accept", "application/json"))
        .respond_with(ok())
        .expect(1)
        .mount(&server)
        .await;

    let client = builder(&server).build().unwrap();

    client.track("asd", "DEATH").send().await;
    client.flush().await.unwrap();

    let received = requests(&server).await;
    assert_eq!(received.len(), 1);

    let request = &received[0];
    let timestamp = request.headers.get("x-timestamp").unwrap().to_str().unwrap();
    let signature = request.headers.get("x-signature").unwrap().to_str().unwrap();
    assert!(timestamp.parse::<i64>().is_ok());
    assert_eq!(signature, Signer::new("a", "b").sign(&request.body, timestamp));

    let payload = body(request);
    assert_eq!(payload["gameId"], "c");
    assert_eq!(payload["identifiers"], json!([]));
    let event = &payload["events"][0];
    assert_eq!(event["userId"], "asd");
    assert_eq!(event["event"], "DEATH");
    assert_eq!(event["groupId"], "");
    assert!(event.get("traits").is_none());
    assert!(event.get("value").is_none());

    client.close().await;
}

#[tokio::test]
async fn test_tracks_below_batch_size_are_held() {
    let server = MockServer::start().await;
    mount_ok(&server).await;

    let client = builder(&server).batch_size(10).build().unwrap();

    for i in 0..5 {
        client.track("asd", "kill").value(i).send().await;
    }
    client.start_game("asd").await;

    assert!(requests(&server).await.is_empty());
    assert_eq!(client.pending_count().await, 6);

    client.close().await;
}

#[tokio::test]
async fn test_batch_size_one_drains_each_track() {
    let server = MockServer::start().await;
    mount_ok(&server).await;

    let client = builder(&server).batch_size(1).build().unwrap();

    client.track("asd", "kill").value(1).send().await;

    let received = requests(&server).await;
    assert_eq!(received.len(), 1);
    let events = body(&received[0])["events"].clone();
    assert_eq!(events.as_array().unwrap().len(), 1);
    assert_eq!(events[0]["value"], 1);
    assert_eq!(client.pending_count().await, 0);

    client.close().await;
}

#[tokio::test]
async fn test_full_batch_is_sent_and_excess_kept() {
    let server = MockServer::start().await;
    mount_ok(&server).await;

    let client = builder(&server).batch_size(5).build().unwrap();

    for i in 0..7 {
        client.track("asd", "kill").value(i).send().await;
    }

    let received = requests(&server).await;
    assert_eq!(received.len(), 1);
    let values: Vec<_> = body(&received[0])["events"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["value"].as_i64().unwrap())
        .collect();
    assert_eq!(values, vec![0, 1, 2, 3, 4]);
    assert_eq!(client.pending_count().await, 2);

    client.close().await;
}

#[tokio::test]
async fn test_flush_during_cooldown_is_deferred() {
    let server = MockServer::start().await;
    mount_ok(&server).await;

    let client = builder(&server)
        .flush_cooldown(Duration::from_secs(1))
        .build()
        .unwrap();

    client.start_game("asd").await;
    client.flush().await.unwrap();

    let received = requests(&server).await;
    assert_eq!(received.len(), 1);
    assert_eq!(body(&received[0])["events"][0]["userId"], "asd");
    assert_eq!(body(&received[0])["events"][0]["event"], "START_GAME");

    client.start_game("asd2").await;
    client.flush().await.unwrap();
    assert!(client.has_pending_flush().await);
    assert_eq!(requests(&server).await.len(), 1);

    let received = wait_for_requests(&server, 2, Duration::from_secs(3)).await;
    assert_eq!(received.len(), 2);
    assert_eq!(body(&received[1])["events"][0]["userId"], "asd2");
    assert!(!client.has_pending_flush().await);

    client.close().await;
}

#[tokio::test]
async fn test_rapid_flushes_coalesce() {
    let server = MockServer::start().await;
    mount_ok(&server).await;

    let client = builder(&server)
        .flush_cooldown(Duration::from_millis(300))
        .build()
        .unwrap();

    // Starts the cooldown; the queue is empty so nothing is sent.
    client.flush().await.unwrap();

    client.track("asd", "kill").send().await;
    for _ in 0..20 {
        client.flush().await.unwrap();
    }
    assert!(requests(&server).await.is_empty());

    tokio::time::sleep(Duration::from_millis(700)).await;

    let received = requests(&server).await;
    assert_eq!(received.len(), 1);
    assert_eq!(client.pending_count().await, 0);

    client.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_identifiers_share_one_deferred_flush() {
    let server = MockServer::start().await;
    mount_ok(&server).await;

    let client = Arc::new(
        builder(&server)
            .batch_size(1000)
            .flush_cooldown(Duration::from_secs(1))
            .build()
            .unwrap(),
    );

    client
        .set_identifiers("asd", Identifiers::default().discord_id("first"))
        .await;
    assert_eq!(requests(&server).await.len(), 1);

    let mut handles = vec![];
    for i in 0..99 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            client
                .set_identifiers("asd", Identifiers::default().discord_id(format!("id{}", i)))
                .await;
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert!(client.has_pending_flush().await);
    assert_eq!(requests(&server).await.len(), 1);

    let received = wait_for_requests(&server, 2, Duration::from_secs(3)).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(requests(&server).await.len(), 2);

    let identifiers = body(&received[1])["identifiers"].clone();
    assert_eq!(identifiers.as_array().unwrap().len(), 99);
    assert_eq!(client.pending_count().await, 0);

    client.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_burst_of_identifiers_is_not_sent_per_call() {
    let server = MockServer::start().await;
    mount_ok(&server).await;

    let client = Arc::new(
        builder(&server)
            .batch_size(1000)
            .flush_cooldown(Duration::from_millis(500))
            .build()
            .unwrap(),
    );

    let mut handles = vec![];
    for i in 0..100 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            client
                .set_identifiers(format!("user{}", i), Identifiers::default().steam_id("s"))
                .await;
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    tokio::time::sleep(Duration::from_millis(1000)).await;

    let received = requests(&server).await;
    assert!(!received.is_empty() && received.len() <= 2);
    let total: usize = received
        .iter()
        .map(|r| body(r)["identifiers"].as_array().unwrap().len())
        .sum();
    assert_eq!(total, 100);

    client.close().await;
}

#[tokio::test]
async fn test_periodic_flush_sends_queue() {
    let server = MockServer::start().await;
    mount_ok(&server).await;

    let client = builder(&server)
        .flush_interval(Duration::from_millis(200))
        .flush_cooldown(Duration::ZERO)
        .build()
        .unwrap();

    client.track("asd", "kill").send().await;
    assert!(requests(&server).await.is_empty());

    let received = wait_for_requests(&server, 1, Duration::from_secs(2)).await;
    assert_eq!(received.len(), 1);
    assert_eq!(body(&received[0])["events"][0]["event"], "kill");

    // Later ticks find the queue empty.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(requests(&server).await.len(), 1);

    client.close().await;
}

#[tokio::test]
async fn test_close_cancels_deferred_flush() {
    let server = MockServer::start().await;
    mount_ok(&server).await;

    let client = builder(&server)
        .flush_cooldown(Duration::from_millis(300))
        .build()
        .unwrap();

    client.flush().await.unwrap();
    client.track("asd", "kill").send().await;
    client.flush().await.unwrap();
    assert!(client.has_pending_flush().await);

    client.close().await;
    assert!(!client.has_pending_flush().await);

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(requests(&server).await.is_empty());
}

#[tokio::test]
async fn test_close_stops_periodic_flush() {
    let server = MockServer::start().await;
    mount_ok(&server).await;

    let client = builder(&server)
        .flush_interval(Duration::from_millis(100))
        .build()
        .unwrap();

    client.track("asd", "kill").send().await;
    client.close().await;

    // Unsent records are discarded, not flushed.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(requests(&server).await.is_empty());
    assert_eq!(client.pending_count().await, 1);
}

#[tokio::test]
async fn test_round_events_carry_group_and_traits() {
    let server = MockServer::start().await;
    mount_ok(&server).await;

    let client = builder(&server).build().unwrap();

    let round = client.start_round(
        "round-1",
        Traits::from([
            ("map".to_string(), json!("nuclear_wasteland")),
            ("mode".to_string(), json!("ranked")),
        ]),
    );
    round
        .track("asd", "kill")
        .trait_("map", "nuclear_utopia")
        .value(2)
        .send()
        .await;
    client.flush().await.unwrap();

    let received = requests(&server).await;
    let event = body(&received[0])["events"][0].clone();
    assert_eq!(event["groupId"], "round-1");
    assert_eq!(event["value"], 2);
    assert_eq!(event["traits"], json!({"map": "nuclear_utopia", "mode": "ranked"}));

    client.close().await;
}

#[tokio::test]
async fn test_identifiers_wire_encoding() {
    let server = MockServer::start().await;
    mount_ok(&server).await;

    let client = builder(&server).build().unwrap();

    client.track("asd", "kill").send().await;
    client
        .set_identifiers(
            "asd",
            Identifiers::default()
                .discord_id(Identifier::remove())
                .wallet_address("0xabc"),
        )
        .await;

    let received = requests(&server).await;
    assert_eq!(received.len(), 1);

    let payload = body(&received[0]);
    assert_eq!(
        payload["identifiers"],
        json!([{"userId": "asd", "discordId": null, "walletAddress": "0xabc"}])
    );
    assert_eq!(payload["events"].as_array().unwrap().len(), 1);

    client.close().await;
}

#[tokio::test]
async fn test_server_error_is_returned_and_batch_dropped() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "invalid signature"})))
        .mount(&server)
        .await;

    let client = builder(&server).build().unwrap();

    client.track("asd", "kill").send().await;
    match client.flush().await {
        Err(Error::Server(msg)) => assert_eq!(msg, "invalid signature"),
        other => panic!("expected server error, got {:?}", other),
    }
    assert_eq!(client.pending_count().await, 0);

    client.close().await;
}

#[tokio::test]
async fn test_unexpected_response_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "fine"})))
        .mount(&server)
        .await;

    let client = builder(&server).build().unwrap();

    client.start_game("asd").await;
    assert!(matches!(
        client.flush().await,
        Err(Error::UnexpectedResponse(_))
    ));

    client.close().await;
}

#[tokio::test]
async fn test_background_errors_go_to_sink() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "unknown game"})))
        .mount(&server)
        .await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let client = builder(&server).batch_size(1).error_sink(tx).build().unwrap();

    client.track("asd", "kill").send().await;

    let err = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(err, Error::Server(ref msg) if msg == "unknown game"));

    client.close().await;
}

async fn mount_rejection(server: &MockServer, message: &str) {
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "error": message })))
        .mount(server)
        .await;
}

async fn recv_error(rx: &mut mpsc::UnboundedReceiver<Error>) -> Error {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("no error reported in time")
        .expect("error sink closed")
}

#[tokio::test]
async fn test_deferred_flush_errors_go_to_sink() {
    let server = MockServer::start().await;
    mount_rejection(&server, "deferred failure").await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let client = builder(&server)
        .flush_cooldown(Duration::from_millis(200))
        .error_sink(tx)
        .build()
        .unwrap();

    // Starts the cooldown with nothing queued.
    client.flush().await.unwrap();

    client.track("asd", "kill").send().await;
    assert!(client.flush().await.is_ok());
    assert!(client.has_pending_flush().await);
    assert!(rx.try_recv().is_err());

    let err = recv_error(&mut rx).await;
    assert!(matches!(err, Error::Server(ref msg) if msg == "deferred failure"));
    assert_eq!(requests(&server).await.len(), 1);

    client.close().await;
}

#[tokio::test]
async fn test_periodic_flush_errors_go_to_sink() {
    let server = MockServer::start().await;
    mount_rejection(&server, "periodic failure").await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let client = builder(&server)
        .flush_interval(Duration::from_millis(100))
        .flush_cooldown(Duration::ZERO)
        .error_sink(tx)
        .build()
        .unwrap();

    client.track("asd", "kill").send().await;

    let err = recv_error(&mut rx).await;
    assert!(matches!(err, Error::Server(ref msg) if msg == "periodic failure"));
    assert_eq!(client.pending_count().await, 0);

    client.close().await;
}

#[tokio::test]
async fn test_retries_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    mount_ok(&server).await;

    let client = builder(&server).max_retry_attempts(2).build().unwrap();

    client.track("asd", "kill").send().await;
    client.flush().await.unwrap();

    assert_eq!(requests(&server).await.len(), 3);

    client.close().await;
}

#[tokio::test]
async fn test_gives_up_after_max_retries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let client = builder(&server).max_retry_attempts(1).build().unwrap();

    client.track("asd", "kill").send().await;
    match client.flush().await {
        Err(Error::Status { status, body }) => {
            assert_eq!(status.as_u16(), 500);
            assert_eq!(body, "boom");
        }
        other => panic!("expected status error, got {:?}", other),
    }
    assert_eq!(requests(&server).await.len(), 2);

    client.close().await;
}

#[tokio::test]
async fn test_invalid_config_fails_to_build() {
    let result = Client::builder().client_id("a").game_id("c").build();
    assert!(matches!(result, Err(Error::Config(_))));

    let result = Client::builder()
        .client_id("a")
        .client_secret("b")
        .game_id("c")
        .dsn("::not a url::")
        .build();
    assert!(matches!(result, Err(Error::Config(_))));
}
