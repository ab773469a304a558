//! Chat message sanitization (spec §4.4: messages are HTML-escaped before
//! broadcast so a client cannot inject markup into another client's view).

use ammonia::clean_text;

/// Escapes HTML metacharacters in a chat message body. Unlike a rich-text
/// filter this never preserves any tags — chat is plain text end to end.
pub fn sanitize_chat_message(message: &str) -> String {
    clean_text(message.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_script_tags() {
        let sanitized = sanitize_chat_message("<script>alert(1)</script>");
        assert!(!sanitized.contains("<script>"));
    }

    #[test]
    fn leaves_plain_text_untouched() {
        assert_eq!(sanitize_chat_message("good movie tonight"), "good movie tonight");
    }

    #[test]
    fn trims_surrounding_whitespace() {
        assert_eq!(sanitize_chat_message("  hello  "), "hello");
    }
}
