use std::fmt;

pub(crate) const REASON_TRANSPORT_ERROR: &str = "delivery_transport_error";
pub(crate) const REASON_RATE_LIMITED: &str = "delivery_rate_limited";
pub(crate) const REASON_PROVIDER_UNAVAILABLE: &str = "delivery_provider_unavailable";
pub(crate) const REASON_REQUEST_REJECTED: &str = "delivery_request_rejected";
pub(crate) const REASON_INVALID_RESPONSE: &str = "delivery_invalid_response";

const NOT_MODIFIED_MARKER: &str = "message is not modified";
const MISSING_MARKERS: [&str; 3] = ["not found", "can't be edited", "message_id_invalid"];

#[derive(Debug, Clone, PartialEq, Eq)]
/// Structured failure of one Bot API call.
pub struct TelegramDeliveryError {
    pub reason_code: String,
    pub detail: String,
    pub retryable: bool,
    pub method: String,
    pub http_status: Option<u16>,
}

impl TelegramDeliveryError {
    pub fn new(
        method: &str,
        reason_code: &str,
        detail: impl Into<String>,
        retryable: bool,
        http_status: Option<u16>,
    ) -> Self {
        Self {
            reason_code: reason_code.to_string(),
            detail: detail.into(),
            retryable,
            method: method.to_string(),
            http_status,
        }
    }

    pub fn rejected(method: &str, detail: impl Into<String>) -> Self {
        Self::new(method, REASON_REQUEST_REJECTED, detail, false, Some(400))
    }

    /// Edit carried content identical to what is already displayed.
    pub fn is_not_modified(&self) -> bool {
        self.detail.to_ascii_lowercase().contains(NOT_MODIFIED_MARKER)
    }

    /// Target message was deleted or can no longer be edited.
    pub fn is_message_missing(&self) -> bool {
        let detail = self.detail.to_ascii_lowercase();
        MISSING_MARKERS
            .iter()
            .any(|marker| detail.contains(marker))
    }
}

impl fmt::Display for TelegramDeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "method={} reason_code={} retryable={} http_status={} detail={}",
            self.method,
            self.reason_code,
            self.retryable,
            self.http_status
                .map(|status| status.to_string())
                .unwrap_or_else(|| "none".to_string()),
            self.detail
        )
    }
}

impl std::error::Error for TelegramDeliveryError {}

pub(crate) fn classify_http_status(status: u16) -> (&'static str, bool) {
    match status {
        429 => (REASON_RATE_LIMITED, true),
        500..=599 => (REASON_PROVIDER_UNAVAILABLE, true),
        400..=499 => (REASON_REQUEST_REJECTED, false),
        _ => (REASON_INVALID_RESPONSE, true),
    }
}
