//! LINE webhook event types and canned replies

use serde::Deserialize;

/// Webhook request envelope
#[derive(Debug, Clone, Deserialize)]
pub struct LineWebhookRequest {
    pub destination: Option<String>,
    #[serde(default)]
    pub events: Vec<LineWebhookEvent>,
}

/// A single webhook event
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineWebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub reply_token: Option<String>,
    pub source: Option<EventSource>,
    pub message: Option<EventMessage>,
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSource {
    #[serde(rename = "type")]
    pub source_type: String,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    pub id: Option<String>,
    pub text: Option<String>,
}

/// Welcome message sent once per user on follow.
pub const WELCOME_MESSAGE: &str =
    "友だち追加ありがとうございます！ご質問があればメッセージをお送りください。";

/// Canned reply for an incoming text message.
///
/// A handful of keywords get specific answers; everything else gets a
/// generic acknowledgment. Bot conversations beyond this live in the
/// per-company bot deployment, not here.
pub fn canned_reply(text: &str) -> &'static str {
    let lower = text.to_lowercase();
    if lower.contains("料金") || lower.contains("price") {
        "料金プランについては管理画面の「契約内容」をご確認ください。"
    } else if lower.contains("解約") || lower.contains("cancel") {
        "ご解約の手続きは管理画面から行えます。お手続き後も期間末までご利用いただけます。"
    } else if lower.contains("help") || lower.contains("ヘルプ") {
        "ご用件をメッセージでお送りください。担当者より返信いたします。"
    } else {
        "メッセージありがとうございます。内容を確認して折り返しご連絡いたします。"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_follow_event() {
        let body = r#"{
            "destination": "U0000",
            "events": [{
                "type": "follow",
                "replyToken": "token-1",
                "timestamp": 1700000000000,
                "source": { "type": "user", "userId": "U1234" }
            }]
        }"#;

        let request: LineWebhookRequest = serde_json::from_str(body).unwrap();
        assert_eq!(request.events.len(), 1);
        let event = &request.events[0];
        assert_eq!(event.event_type, "follow");
        assert_eq!(event.reply_token.as_deref(), Some("token-1"));
        assert_eq!(
            event.source.as_ref().unwrap().user_id.as_deref(),
            Some("U1234")
        );
    }

    #[test]
    fn parses_message_event_text() {
        let body = r#"{
            "events": [{
                "type": "message",
                "replyToken": "token-2",
                "source": { "type": "user", "userId": "U1234" },
                "message": { "type": "text", "id": "m1", "text": "料金を教えて" }
            }]
        }"#;

        let request: LineWebhookRequest = serde_json::from_str(body).unwrap();
        let event = &request.events[0];
        assert_eq!(event.message.as_ref().unwrap().text.as_deref(), Some("料金を教えて"));
    }

    #[test]
    fn keyword_replies() {
        assert!(canned_reply("料金はいくらですか").contains("料金プラン"));
        assert!(canned_reply("I want to cancel").contains("解約"));
        assert!(canned_reply("こんにちは").contains("メッセージありがとうございます"));
    }
}
