//! Conversation message: one system, user, or assistant turn.
//!
//! The wire/persisted shape is `{"role": ..., "content": ...}`; the in-memory
//! shape is a plain enum so match sites stay terse.

use serde::{Deserialize, Serialize};

/// A single conversation message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", content = "content", rename_all = "lowercase")]
pub enum Message {
    System(String),
    User(String),
    Assistant(String),
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self::System(content.into())
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::User(content.into())
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant(content.into())
    }

    pub fn role(&self) -> &'static str {
        match self {
            Self::System(_) => "system",
            Self::User(_) => "user",
            Self::Assistant(_) => "assistant",
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Self::System(c) | Self::User(c) | Self::Assistant(c) => c,
        }
    }
}

/// Base64 image attachment for multimodal queries. The payload may carry a
/// `data:<mime>;base64,` prefix; [`ImageAttachment::mime_and_data`] strips it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImageAttachment {
    pub base64: String,
    pub name: String,
}

impl ImageAttachment {
    /// Splits the payload into (mime type, raw base64 data). Without a data
    /// URI prefix the MIME type defaults to `image/jpeg`.
    pub fn mime_and_data(&self) -> (String, &str) {
        if let Some(rest) = self.base64.strip_prefix("data:") {
            if let Some((header, data)) = rest.split_once(",") {
                let mime = header.split(';').next().unwrap_or("image/jpeg");
                return (mime.to_string(), data);
            }
        }
        ("image/jpeg".to_string(), self.base64.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_serializes_as_role_content() {
        let m = Message::user("hi");
        let v = serde_json::to_value(&m).unwrap();
        assert_eq!(v["role"], "user");
        assert_eq!(v["content"], "hi");
        let back: Message = serde_json::from_value(v).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn image_attachment_parses_data_uri() {
        let img = ImageAttachment {
            base64: "data:image/png;base64,iVBOR".to_string(),
            name: "doc.png".to_string(),
        };
        let (mime, data) = img.mime_and_data();
        assert_eq!(mime, "image/png");
        assert_eq!(data, "iVBOR");
    }

    #[test]
    fn image_attachment_defaults_to_jpeg_without_prefix() {
        let img = ImageAttachment {
            base64: "/9j/4AAQ".to_string(),
            name: "photo".to_string(),
        };
        let (mime, data) = img.mime_and_data();
        assert_eq!(mime, "image/jpeg");
        assert_eq!(data, "/9j/4AAQ");
    }
}
