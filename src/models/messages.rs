use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RenderMessage {
    pub html: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RenderErrorMessage {
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ClosedMessage {
    pub reason: String,
}

/// Messages pushed to a live preview connection
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum SendMessage {
    #[serde(rename = "render")]
    Render(RenderMessage),
    #[serde(rename = "error")]
    Error(RenderErrorMessage),
    #[serde(rename = "closed")]
    Closed(ClosedMessage),
}

impl SendMessage {
    pub fn render(html: impl Into<String>) -> Self {
        SendMessage::Render(RenderMessage { html: html.into() })
    }

    pub fn error(message: impl Into<String>) -> Self {
        SendMessage::Error(RenderErrorMessage {
            message: message.into(),
        })
    }

    pub fn closed(reason: impl Into<String>) -> Self {
        SendMessage::Closed(ClosedMessage {
            reason: reason.into(),
        })
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, SendMessage::Closed(_))
    }
}
