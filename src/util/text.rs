use std::borrow::Cow;

/// Ellipsis appended to truncated text
const ELLIPSIS: &str = "...";
/// Length of the ellipsis in characters
const ELLIPSIS_LEN: usize = 3;

/// Counts the Unicode scalar values in a string.
///
/// Message limits on both Bluesky and Mastodon are expressed in characters,
/// not bytes, so every length check in the formatter goes through here.
///
/// # Examples
///
/// ```
/// use reposter::util::char_len;
///
/// assert_eq!(char_len("Hello"), 5);
/// assert_eq!(char_len("📝 Hi"), 4);
/// ```
pub fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Truncates a string to at most `max_chars` characters.
///
/// If truncation is necessary, the last three characters of the budget are
/// replaced with "..." so the result is still `max_chars` long.
///
/// # Returns
///
/// - If `max_chars == 0`, returns `Cow::Borrowed("")`
/// - If the string fits, returns `Cow::Borrowed(s)` (no allocation)
/// - If `max_chars <= 3`, returns the first `max_chars` characters without ellipsis
/// - Otherwise returns `Cow::Owned` with truncated text and "..." appended
///
/// Trailing whitespace before the ellipsis is trimmed so titles never read
/// `"Hello ..."`.
///
/// # Examples
///
/// ```
/// use reposter::util::truncate_chars;
///
/// assert_eq!(truncate_chars("Short", 10), "Short");
/// assert_eq!(truncate_chars("Hello World", 8), "Hello...");
/// assert_eq!(truncate_chars("Test", 2), "Te");
/// ```
pub fn truncate_chars(s: &str, max_chars: usize) -> Cow<'_, str> {
    if max_chars == 0 {
        return Cow::Borrowed("");
    }

    // Single pass: find the byte offset of the cut point and whether we need one
    let mut cut_at = None;
    let mut keep_end = 0;
    let keep = max_chars.saturating_sub(ELLIPSIS_LEN);
    for (count, (idx, _)) in s.char_indices().enumerate() {
        if count == keep {
            keep_end = idx;
        }
        if count == max_chars {
            cut_at = Some(idx);
            break;
        }
    }

    let Some(cut_at) = cut_at else {
        return Cow::Borrowed(s);
    };

    if max_chars <= ELLIPSIS_LEN {
        return Cow::Owned(s[..cut_at].to_string());
    }

    let head = s[..keep_end].trim_end();
    let mut out = String::with_capacity(head.len() + ELLIPSIS.len());
    out.push_str(head);
    out.push_str(ELLIPSIS);
    Cow::Owned(out)
}
