// tests/channel_memory.rs

use serde_json::json;
use tokio::time::{timeout, Duration};

use relay_rpc::{
    // ---
    CorrelationId,
    Message,
    RpcConfig,
    Side,
};

#[tokio::test]
async fn memory_post_then_subscribe_delivers_in_order() {
    // ---
    // Arrange
    // ---
    let config = RpcConfig::new("mpsdo");
    let (host, client) = relay_rpc::create_memory_channel_pair(&config);

    assert_eq!(host.side(), Side::Host);
    assert_eq!(client.side(), Side::Client);

    let id = CorrelationId::generate();
    let messages = vec![
        Message::StreamRequest {
            address: "chat.ChatService.talk".into(),
            body: json!({}),
            correlation_id: id.clone(),
        },
        Message::Write {
            body: json!("one"),
            correlation_id: id.clone(),
        },
        Message::ClientEnd {
            correlation_id: id.clone(),
        },
    ];

    // ---
    // Act
    // ---
    for message in &messages {
        client
            .post(message.encode().expect("encode failed"))
            .await
            .expect("post failed");
    }
    let mut listener = host.subscribe().await.expect("subscribe failed");

    // ---
    // Assert
    // ---
    for expected in messages {
        let frame = timeout(Duration::from_millis(100), listener.inbox.recv())
            .await
            .expect("timed out waiting for frame")
            .expect("listener closed unexpectedly");

        assert_eq!(Message::decode(&frame).expect("decode failed"), expected);
    }
}
