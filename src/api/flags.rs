use http::HeaderMap;

use crate::config::ChannelConfig;

/// Header that switches reasoning-to-content rewriting on for a request.
pub const THINK_TO_CONTENT_HEADER: &str = "X-Thinking-To-Content";

/// Parse a boolean flag the way `strconv.ParseBool`-style configs expect:
/// `1 t T TRUE true True` and `0 f F FALSE false False`.
#[must_use]
pub fn parse_bool_flag(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

/// Resolve whether reasoning should be rewritten into content.
///
/// The inbound request header wins; otherwise the channel's configured
/// header applies. Missing or unparsable values mean `false`.
#[must_use]
pub fn resolve_think_to_content(inbound: &HeaderMap, channel: Option<&ChannelConfig>) -> bool {
    let inbound_value = inbound
        .get(THINK_TO_CONTENT_HEADER)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
        .filter(|value| !value.is_empty());

    let value = inbound_value.or_else(|| {
        channel
            .and_then(|channel| channel.header(THINK_TO_CONTENT_HEADER))
            .map(str::to_owned)
    });

    let Some(value) = value else {
        return false;
    };
    match parse_bool_flag(&value) {
        Some(enabled) => enabled,
        None => {
            tracing::error!("Header {THINK_TO_CONTENT_HEADER}: invalid value {value:?}");
            false
        }
    }
}
