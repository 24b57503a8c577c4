//! Turns a [`Post`] into announcement text.
//!
//! Layout:
//!
//! ```text
//! 📝 {title}
//!
//! {link}
//!
//! {hashtags}
//! ```
//!
//! When the message is too long only the title is shortened; the link and
//! hashtags are always emitted in full.

use serde::Deserialize;

use crate::feed::Post;
use crate::util::{char_len, truncate_chars};

/// Both Bluesky (300) and Mastodon (500) accept this comfortably.
pub const DEFAULT_MAX_LENGTH: usize = 280;

/// Fixed parts of the message template.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MessageFormat {
    /// Leading marker, usually an emoji.
    pub marker: String,
    /// Space-separated hashtags appended after the link.
    pub hashtags: String,
}

impl Default for MessageFormat {
    fn default() -> Self {
        Self {
            marker: "📝".to_string(),
            hashtags: "#Salesforce #SalesforceDeveloper".to_string(),
        }
    }
}

impl MessageFormat {
    /// Formats `post` into at most `max_length` characters.
    ///
    /// If the link, hashtags and template overhead alone exceed
    /// `max_length`, the title is dropped entirely and the result is longer
    /// than `max_length`; see [`MessageFormat::fits`].
    pub fn format(&self, post: &Post, max_length: usize) -> String {
        let full = self.assemble(&post.title, &post.link);
        if char_len(&full) <= max_length {
            return full;
        }

        let fixed = char_len(&self.assemble("", &post.link));
        let title_budget = max_length.saturating_sub(fixed);
        let title = truncate_chars(&post.title, title_budget);
        self.assemble(&title, &post.link)
    }

    /// True if a message for `link` can be made to fit in `max_length`.
    pub fn fits(&self, link: &str, max_length: usize) -> bool {
        char_len(&self.assemble("", link)) <= max_length
    }

    fn assemble(&self, title: &str, link: &str) -> String {
        let mut text = String::new();
        if !self.marker.is_empty() {
            text.push_str(&self.marker);
            text.push(' ');
        }
        text.push_str(title);
        text.push_str("\n\n");
        text.push_str(link);
        if !self.hashtags.is_empty() {
            text.push_str("\n\n");
            text.push_str(&self.hashtags);
        }
        text
    }
}

/// Formats with the default template.
pub fn format_message(post: &Post, max_length: usize) -> String {
    MessageFormat::default().format(post, max_length)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn post(title: &str, link: &str) -> Post {
        Post {
            guid: "g".into(),
            title: title.into(),
            link: link.into(),
            published_at: Utc::now(),
            description: None,
        }
    }

    #[test]
    fn test_short_message_untouched() {
        let text = format_message(&post("Hello", "https://e.com/hello"), 280);
        assert_eq!(
            text,
            "📝 Hello\n\nhttps://e.com/hello\n\n#Salesforce #SalesforceDeveloper"
        );
    }

    #[test]
    fn test_long_title_truncated_with_ellipsis() {
        let title = "A".repeat(400);
        let link = "https://developer.salesforce.com/blogs/2025/06/some-long-slug";
        let text = format_message(&post(&title, link), 280);

        assert_eq!(char_len(&text), 280);
        assert!(text.starts_with("📝 AAA"));
        assert!(text.contains("...\n\n"));
        assert!(text.ends_with(&format!("{link}\n\n#Salesforce #SalesforceDeveloper")));
    }

    #[test]
    fn test_exact_fit_not_truncated() {
        let format = MessageFormat {
            marker: String::new(),
            hashtags: String::new(),
        };
        // "abc\n\nxy" = 7 chars
        assert_eq!(format.format(&post("abc", "xy"), 7), "abc\n\nxy");
        assert_eq!(format.format(&post("abcd", "xy"), 7), "abc\n\nxy");
    }

    #[test]
    fn test_link_too_long_drops_title() {
        let link = format!("https://e.com/{}", "x".repeat(300));
        let format = MessageFormat::default();
        assert!(!format.fits(&link, 280));

        let text = format.format(&post("Title", &link), 280);
        assert!(!text.contains("Title"));
        assert!(text.contains(&link));
    }

    #[test]
    fn test_custom_format() {
        let format = MessageFormat {
            marker: "🚀".into(),
            hashtags: "#rust".into(),
        };
        assert_eq!(
            format.format(&post("Release", "https://e.com/r"), 100),
            "🚀 Release\n\nhttps://e.com/r\n\n#rust"
        );
    }

    proptest! {
        #[test]
        fn prop_never_exceeds_and_keeps_link_and_hashtags(
            title in "\\PC{0,400}",
            slug in "[a-z0-9-]{1,60}",
            max_length in 120usize..600,
        ) {
            let link = format!("https://example.com/{slug}");
            let text = format_message(&post(&title, &link), max_length);
            let suffix = format!("\n\n{link}\n\n#Salesforce #SalesforceDeveloper");

            prop_assert!(char_len(&text) <= max_length);
            prop_assert!(text.ends_with(&suffix));
            prop_assert!(text.starts_with("📝 "));
        }
    }
}
