//! # Terminal
//!
//! Terminal formatting helpers

/// Create a clickable hyperlink using the OSC-8 escape sequence
/// https://gist.github.com/egmontkob/eb114294efbcd5adb1944c9f3cb5feda
///
/// When `plain` is set the text is returned without any escape codes
pub fn link(text: &str, url: &str, plain: bool) -> String {
    if plain {
        return text.to_string();
    }

    format!("\x1B]8;;{url}\x07{text}\x1B]8;;\x07")
}

#[cfg(test)]
mod tests {
    use super::link;

    #[test]
    fn test_link() {
        let value = link("owner/repo #1", "https://example.com/pull/1", false);
        assert_eq!(
            value,
            "\x1B]8;;https://example.com/pull/1\x07owner/repo #1\x1B]8;;\x07"
        );
    }

    #[test]
    fn test_link_plain() {
        let value = link("owner/repo #1", "https://example.com/pull/1", true);
        assert_eq!(value, "owner/repo #1");
    }
}
