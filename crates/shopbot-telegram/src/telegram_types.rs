//! Message shapes exchanged with the Bot API.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseMode {
    #[serde(rename = "HTML")]
    Html,
}

impl ParseMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Html => "HTML",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineButton {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl InlineButton {
    pub fn callback(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: Some(data.into()),
            url: None,
        }
    }

    pub fn link(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: None,
            url: Some(url.into()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineKeyboard {
    #[serde(rename = "inline_keyboard")]
    pub rows: Vec<Vec<InlineButton>>,
}

impl InlineKeyboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row(mut self, buttons: Vec<InlineButton>) -> Self {
        self.rows.push(buttons);
        self
    }

    pub fn button(self, text: impl Into<String>, data: impl Into<String>) -> Self {
        self.row(vec![InlineButton::callback(text, data)])
    }

    /// Every callback payload in the keyboard, row-major.
    pub fn callback_data(&self) -> Vec<&str> {
        self.rows
            .iter()
            .flatten()
            .filter_map(|button| button.callback_data.as_deref())
            .collect()
    }
}

/// Bot API cap on message text after entity parsing, in UTF-16 code units.
pub const MESSAGE_TEXT_LIMIT: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub text: String,
    pub parse_mode: Option<ParseMode>,
    pub keyboard: Option<InlineKeyboard>,
    pub disable_link_preview: bool,
}

impl OutboundMessage {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parse_mode: None,
            keyboard: None,
            disable_link_preview: false,
        }
    }

    pub fn html(text: impl Into<String>) -> Self {
        Self {
            parse_mode: Some(ParseMode::Html),
            ..Self::plain(text)
        }
    }

    pub fn with_keyboard(mut self, keyboard: InlineKeyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }

    pub fn without_link_preview(mut self) -> Self {
        self.disable_link_preview = true;
        self
    }

    /// Length the Bot API checks against [`MESSAGE_TEXT_LIMIT`].
    pub fn visible_len(&self) -> usize {
        visible_text(&self.text, self.parse_mode)
            .encode_utf16()
            .count()
    }

    pub fn fits_text_limit(&self) -> bool {
        self.visible_len() <= MESSAGE_TEXT_LIMIT
    }

    /// Bot API body fields shared by `sendMessage` and `editMessageText`.
    pub(crate) fn body_fields(&self, mut base: Value) -> Value {
        base["text"] = json!(self.text);
        if let Some(parse_mode) = self.parse_mode {
            base["parse_mode"] = json!(parse_mode.as_str());
        }
        if let Some(keyboard) = self.keyboard.as_ref() {
            base["reply_markup"] = serde_json::to_value(keyboard).unwrap_or(Value::Null);
        }
        if self.disable_link_preview {
            base["link_preview_options"] = json!({"is_disabled": true});
        }
        base
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A message as read back from the platform: entities stripped, plain text.
pub struct RemoteMessage {
    pub message_id: i64,
    pub text: String,
}

/// Escapes the three characters the Bot API HTML mode treats specially.
pub fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Text a reader (or `getChat`) sees once formatting entities are applied.
pub fn visible_text(text: &str, parse_mode: Option<ParseMode>) -> String {
    match parse_mode {
        None => text.to_string(),
        Some(ParseMode::Html) => {
            let mut stripped = String::with_capacity(text.len());
            let mut in_tag = false;
            for ch in text.chars() {
                match ch {
                    '<' => in_tag = true,
                    '>' if in_tag => in_tag = false,
                    other if !in_tag => stripped.push(other),
                    _ => {}
                }
            }
            stripped
                .replace("&lt;", "<")
                .replace("&gt;", ">")
                .replace("&quot;", "\"")
                .replace("&amp;", "&")
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn unit_visible_len_ignores_markup_and_counts_utf16_units() {
        let message = OutboundMessage::html("<b>Rabatt</b> &amp; 🎟️");
        assert_eq!(visible_text(&message.text, message.parse_mode), "Rabatt & 🎟️");
        assert_eq!(message.visible_len(), "Rabatt & ".len() + 3);
        assert!(message.fits_text_limit());
        let long = OutboundMessage::html(format!("<i>{}</i>", "x".repeat(MESSAGE_TEXT_LIMIT)));
        assert!(long.fits_text_limit());
        let too_long = OutboundMessage::plain("x".repeat(MESSAGE_TEXT_LIMIT + 1));
        assert!(!too_long.fits_text_limit());
    }

    #[test]
    fn unit_keyboard_serializes_to_inline_keyboard_markup() {
        let keyboard = InlineKeyboard::new()
            .button("Vorschau", "show_preview_options")
            .row(vec![InlineButton::link("Zahlen", "https://example.com/pay")]);
        assert_eq!(
            serde_json::to_value(&keyboard).expect("encode"),
            json!({"inline_keyboard": [
                [{"text": "Vorschau", "callback_data": "show_preview_options"}],
                [{"text": "Zahlen", "url": "https://example.com/pay"}]
            ]})
        );
        assert_eq!(keyboard.callback_data(), vec!["show_preview_options"]);
    }

    #[test]
    fn unit_html_visible_text_strips_tags_and_unescapes() {
        let raw = format!(
            "<b>Header</b>\n<tg-spoiler>{}</tg-spoiler>",
            escape_html("{\"a\":\"<x> & y\"}")
        );
        assert_eq!(
            visible_text(&raw, Some(ParseMode::Html)),
            "Header\n{\"a\":\"<x> & y\"}"
        );
    }

    #[test]
    fn functional_body_fields_include_optional_parts() {
        let message = OutboundMessage::html("<b>hi</b>")
            .with_keyboard(InlineKeyboard::new().button("ok", "noop"))
            .without_link_preview();
        let body = message.body_fields(json!({"chat_id": 5}));
        assert_eq!(body["chat_id"], 5);
        assert_eq!(body["parse_mode"], "HTML");
        assert_eq!(body["reply_markup"]["inline_keyboard"][0][0]["callback_data"], "noop");
        assert_eq!(body["link_preview_options"]["is_disabled"], true);
    }
}
