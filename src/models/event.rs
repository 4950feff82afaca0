use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A confidence-scored intent produced by the external NLU predictor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub name: String,
    pub confidence: f64,
}

impl Prediction {
    pub fn new(name: impl Into<String>, confidence: f64) -> Self {
        Self {
            name: name.into(),
            confidence,
        }
    }
}

/// NLU block attached to an inbound event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NluPayload {
    #[serde(default)]
    pub predictions: Vec<Prediction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detected_language: Option<String>,
}

/// An inbound event for one conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: Uuid,
    pub bot_id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nlu: Option<NluPayload>,
    pub created_at: DateTime<Utc>,
}

impl Event {
    pub fn new(bot_id: impl Into<String>, event_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::now_v7(),
            bot_id: bot_id.into(),
            event_type: event_type.into(),
            payload,
            nlu: None,
            created_at: Utc::now(),
        }
    }

    /// Shorthand for a `text` event with `{ "text": ... }` payload.
    pub fn text(bot_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(bot_id, "text", serde_json::json!({ "text": text.into() }))
    }

    pub fn with_predictions(mut self, predictions: Vec<Prediction>) -> Self {
        self.nlu.get_or_insert_with(NluPayload::default).predictions = predictions;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.nlu.get_or_insert_with(NluPayload::default).detected_language = Some(language.into());
        self
    }

    pub fn predictions(&self) -> &[Prediction] {
        self.nlu.as_ref().map(|nlu| nlu.predictions.as_slice()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_shape() {
        let event = Event::text("bot", "hello").with_language("en");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "text");
        assert_eq!(value["botId"], "bot");
        assert_eq!(value["payload"]["text"], "hello");
        assert_eq!(value["nlu"]["detectedLanguage"], "en");
    }

    #[test]
    fn test_predictions_default_empty() {
        let event = Event::text("bot", "hi");
        assert!(event.predictions().is_empty());

        let event = event.with_predictions(vec![Prediction::new("greet", 0.9)]);
        assert_eq!(event.predictions().len(), 1);
    }
}
