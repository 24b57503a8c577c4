use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::LazyLock;

/// A normalized article extracted from a feed `<item>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    /// Stable unique identifier; the dedup key.
    pub guid: String,
    pub title: String,
    pub link: String,
    pub published_at: DateTime<Utc>,
    pub description: Option<String>,
}

/// Matches one `<item>` block. Tag names are case-insensitive and the
/// opening tag may carry attributes.
static ITEM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<item(?:\s[^>]*)?>(.*?)</item\s*>").expect("static regex")
});

/// Matches a stray `<item>` opening tag inside a captured item body, which
/// happens when the previous item never closed.
static ITEM_OPEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<item(?:\s[^>]*)?>").expect("static regex"));

static CDATA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!\[CDATA\[(.*?)\]\]>").expect("static regex"));

static TITLE_RE: LazyLock<Regex> = LazyLock::new(|| tag_regex("title"));
static LINK_RE: LazyLock<Regex> = LazyLock::new(|| tag_regex("link"));
static PUB_DATE_RE: LazyLock<Regex> = LazyLock::new(|| tag_regex("pubDate"));
static GUID_RE: LazyLock<Regex> = LazyLock::new(|| tag_regex("guid"));
static DESCRIPTION_RE: LazyLock<Regex> = LazyLock::new(|| tag_regex("description"));

/// Builds a case-insensitive matcher for `<tag attr="...">content</tag>`.
///
/// Whitespace alone after the tag name (`<title >`) is accepted. Self-closing
/// tags (`<link href="..."/>`) are not matched: a non-empty attribute run
/// must end in something other than `/`.
fn tag_regex(tag: &str) -> Regex {
    Regex::new(&format!(r"(?is)<{tag}(?:\s(?:[^>]*[^/>])?)?>(.*?)</{tag}\s*>"))
        .expect("static regex")
}

/// Parses raw feed markup into posts, in document order.
///
/// Each `<item>` is handled independently. An item missing `title`, `link`
/// or `guid`, or whose `pubDate` is absent or unparseable, is dropped and
/// logged; it never aborts the parse.
///
/// # Examples
///
/// ```
/// use reposter::feed::parse_feed;
///
/// let xml = r#"<rss><channel>
///   <item>
///     <title><![CDATA[Hello &amp; welcome]]></title>
///     <link>https://example.com/hello</link>
///     <guid isPermaLink="false">post-1</guid>
///     <pubDate>Tue, 10 Jun 2025 15:00:00 GMT</pubDate>
///   </item>
/// </channel></rss>"#;
///
/// let posts = parse_feed(xml);
/// assert_eq!(posts.len(), 1);
/// assert_eq!(posts[0].title, "Hello & welcome");
/// ```
pub fn parse_feed(raw: &str) -> Vec<Post> {
    let mut posts = Vec::new();
    let mut skipped = 0usize;

    for (index, caps) in ITEM_RE.captures_iter(raw).enumerate() {
        let Some(body) = caps.get(1).map(|m| m.as_str()) else {
            continue;
        };
        match parse_item(last_item_segment(body)) {
            Ok(post) => posts.push(post),
            Err(reason) => {
                skipped += 1;
                tracing::debug!(item = index, reason, "Skipping malformed feed item");
            }
        }
    }

    if skipped > 0 {
        tracing::warn!(
            parsed = posts.len(),
            skipped = skipped,
            "Some feed items were malformed and skipped"
        );
    }

    posts
}

/// If an unclosed item swallowed the start of the next one, keep only the
/// innermost (last opened) item.
fn last_item_segment(body: &str) -> &str {
    match ITEM_OPEN_RE.find_iter(body).last() {
        Some(m) => &body[m.end()..],
        None => body,
    }
}

fn parse_item(body: &str) -> Result<Post, &'static str> {
    let title = extract_tag(&TITLE_RE, body).ok_or("missing title")?;
    let link = extract_tag(&LINK_RE, body).ok_or("missing link")?;
    let guid = extract_tag(&GUID_RE, body).ok_or("missing guid")?;
    let pub_date = extract_tag(&PUB_DATE_RE, body).ok_or("missing pubDate")?;
    let published_at = parse_date(&pub_date).ok_or("unparseable pubDate")?;
    let description = extract_tag(&DESCRIPTION_RE, body);

    Ok(Post {
        guid,
        title,
        link,
        published_at,
        description,
    })
}

/// Looks up the first occurrence of a tag and returns its decoded text,
/// or `None` if the tag is absent or decodes to an empty string.
fn extract_tag(re: &Regex, body: &str) -> Option<String> {
    let raw = re.captures(body)?.get(1)?.as_str();
    let text = decode_text(raw);
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Strips CDATA wrappers, unescapes the five standard entities and trims.
///
/// `&amp;` is unescaped after `&lt;`/`&gt;`, so `&amp;lt;` decodes to the
/// literal text `&lt;`.
pub fn decode_text(raw: &str) -> String {
    let unwrapped = CDATA_RE.replace_all(raw, "$1");
    unwrapped
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .trim()
        .to_string()
}

/// RSS uses RFC 2822 dates; some generators emit RFC 3339 instead.
fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}
