//! Naming convention linking request, response and notification fields.
//!
//! DESIGN
//! ======
//! Routing never inspects payloads; it only compares field names. The
//! transforms below are the whole contract:
//!
//! - `<Verb><Noun>Request`   ⇄ `<Verb><Noun>Response`
//! - `notify<Noun>Request`   → `<noun>Notification`  (subscribe)
//! - `<noun>Notification`    → `notify<Noun>Request` (replay)
//!
//! Inbound fields are folded onto event keys with [`event_key`], so a
//! subscribe echo (`notifyXRequest`) and a push (`xNotification`) land on the
//! same subscribers.

pub const REQUEST_SUFFIX: &str = "Request";
pub const RESPONSE_SUFFIX: &str = "Response";
pub const NOTIFICATION_SUFFIX: &str = "Notification";
pub const NOTIFY_PREFIX: &str = "notify";

/// Error returned when a method name does not follow the convention.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    #[error("method `{0}` does not end with `Request`")]
    MissingRequestSuffix(String),
    #[error("method `{0}` does not start with `notify`")]
    MissingNotifyPrefix(String),
    #[error("event `{0}` does not end with `Notification`")]
    MissingNotificationSuffix(String),
    #[error("name `{0}` has an empty stem")]
    EmptyStem(String),
    #[error("method `{0}` must name its event with an uppercase letter after `notify`")]
    LowercaseEvent(String),
}

/// Role of a field name under the convention.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    /// `<Verb><Noun>Request`
    Request,
    /// `<Verb><Noun>Response`
    Response,
    /// `notify<Noun>Request`
    Subscribe,
    /// `<noun>Notification`
    Notification,
    /// Anything else.
    Unknown,
}

#[must_use]
pub fn classify(name: &str) -> FieldKind {
    if name.starts_with(NOTIFY_PREFIX) && name.ends_with(REQUEST_SUFFIX) {
        FieldKind::Subscribe
    } else if name.ends_with(REQUEST_SUFFIX) {
        FieldKind::Request
    } else if name.ends_with(RESPONSE_SUFFIX) {
        FieldKind::Response
    } else if name.ends_with(NOTIFICATION_SUFFIX) {
        FieldKind::Notification
    } else {
        FieldKind::Unknown
    }
}

// =============================================================================
// REQUEST / RESPONSE
// =============================================================================

/// `getInfoRequest` → `getInfoResponse`.
///
/// # Errors
///
/// Fails when the name lacks the `Request` suffix or has nothing before it.
pub fn response_name(request: &str) -> Result<String, NameError> {
    let Some(stem) = request.strip_suffix(REQUEST_SUFFIX) else {
        return Err(NameError::MissingRequestSuffix(request.to_owned()));
    };
    if stem.is_empty() {
        return Err(NameError::EmptyStem(request.to_owned()));
    }
    Ok(format!("{stem}{RESPONSE_SUFFIX}"))
}

/// `getInfoResponse` → `getInfoRequest`. `None` for anything that is not a
/// response field.
#[must_use]
pub fn request_name(response: &str) -> Option<String> {
    let stem = response.strip_suffix(RESPONSE_SUFFIX)?;
    Some(format!("{stem}{REQUEST_SUFFIX}"))
}

// =============================================================================
// SUBSCRIPTIONS
// =============================================================================

/// `notifyBlockAddedRequest` → `blockAddedNotification`.
///
/// The noun must start with an uppercase ASCII letter so that
/// [`notify_method`] reconstructs the exact method on replay.
///
/// # Errors
///
/// Fails when the method is not `notify<Noun>Request`.
pub fn event_name(method: &str) -> Result<String, NameError> {
    let Some(rest) = method.strip_prefix(NOTIFY_PREFIX) else {
        return Err(NameError::MissingNotifyPrefix(method.to_owned()));
    };
    let Some(noun) = rest.strip_suffix(REQUEST_SUFFIX) else {
        return Err(NameError::MissingRequestSuffix(method.to_owned()));
    };
    match noun.chars().next() {
        None => Err(NameError::EmptyStem(method.to_owned())),
        Some(first) if !first.is_ascii_uppercase() => {
            Err(NameError::LowercaseEvent(method.to_owned()))
        }
        Some(_) => Ok(lowercase_first(&format!("{noun}{NOTIFICATION_SUFFIX}"))),
    }
}

/// Fold any inbound field name onto the key subscribers are stored under.
///
/// Strips a leading `notify`, turns a trailing `Request` into
/// `Notification` and lowercases the first character. Names outside the
/// notification family map to keys nobody subscribes to.
#[must_use]
pub fn event_key(field: &str) -> String {
    let rest = field.strip_prefix(NOTIFY_PREFIX).unwrap_or(field);
    match rest.strip_suffix(REQUEST_SUFFIX) {
        Some(stem) => lowercase_first(&format!("{stem}{NOTIFICATION_SUFFIX}")),
        None => lowercase_first(rest),
    }
}

/// `blockAddedNotification` → `notifyBlockAddedRequest`.
///
/// # Errors
///
/// Fails when the event lacks the `Notification` suffix or has nothing
/// before it.
pub fn notify_method(event: &str) -> Result<String, NameError> {
    let Some(noun) = event.strip_suffix(NOTIFICATION_SUFFIX) else {
        return Err(NameError::MissingNotificationSuffix(event.to_owned()));
    };
    if noun.is_empty() {
        return Err(NameError::EmptyStem(event.to_owned()));
    }
    Ok(format!("{NOTIFY_PREFIX}{}{REQUEST_SUFFIX}", uppercase_first(noun)))
}

fn lowercase_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn uppercase_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
#[path = "names_test.rs"]
mod tests;
