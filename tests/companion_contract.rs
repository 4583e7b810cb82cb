//! HTTP contract for `POST /chat/message`.

use mood_twin::companion::{Companion, HttpCompanion, ReplyRequest};
use mood_twin::conversation::{ConversationController, DeliveryState, ReplyUpdate, Sender};
use mood_twin::error::ChatError;
use mood_twin::service::ServiceConfig;
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn companion(server: &MockServer) -> HttpCompanion {
    HttpCompanion::new(&ServiceConfig::new(format!("{}/api/v1", server.uri()))).expect("client")
}

#[tokio::test]
async fn sends_message_with_stress_context() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/message"))
        .and(body_json(json!({"message": "I feel tense", "context_stress_level": 65})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"reply": "Let's breathe."})))
        .expect(1)
        .mount(&server)
        .await;

    let reply = companion(&server)
        .reply(ReplyRequest {
            message: "I feel tense".to_string(),
            context_stress_level: Some(65),
        })
        .await
        .expect("reply");
    assert_eq!(reply, "Let's breathe.");
}

#[tokio::test]
async fn error_status_and_missing_reply_are_mapped() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let client = companion(&server);
    let request = ReplyRequest {
        message: "hello".to_string(),
        context_stress_level: None,
    };
    assert_eq!(
        client.reply(request.clone()).await.expect_err("500"),
        ChatError::Service { status_code: 500 }
    );
    assert!(matches!(
        client.reply(request).await.expect_err("no reply"),
        ChatError::Protocol(_)
    ));
}

#[tokio::test]
async fn conversation_marks_delivery_from_remote_reply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/message"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"reply": "I'm here."})))
        .mount(&server)
        .await;

    let mut chat = ConversationController::new(Arc::new(companion(&server)));
    let id = chat.send("hi").expect("sent");
    assert!(matches!(chat.next_update().await, Some(ReplyUpdate::Appended(_))));

    let log = chat.session().messages();
    assert_eq!(log.len(), 2);
    assert_eq!(log[1].sender, Sender::Companion);
    assert_eq!(log[1].text, "I'm here.");
    assert_eq!(
        chat.session().message(id).expect("user").delivery_state,
        DeliveryState::Delivered
    );
}
