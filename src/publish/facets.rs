//! Bluesky rich-text facets.
//!
//! A facet marks a span of the post text as a link or a hashtag. Spans are
//! addressed by UTF-8 byte offsets, which is also how Rust indexes `str`,
//! so `str::find` and regex match positions can be used directly.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

static HASHTAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#\w+").expect("static regex"));

/// Half-open byte range `[byte_start, byte_end)` into the UTF-8 text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ByteSlice {
    pub byte_start: usize,
    pub byte_end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "$type")]
pub enum FacetFeature {
    #[serde(rename = "app.bsky.richtext.facet#link")]
    Link { uri: String },
    #[serde(rename = "app.bsky.richtext.facet#tag")]
    Tag { tag: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Facet {
    pub index: ByteSlice,
    pub features: Vec<FacetFeature>,
}

/// Finds the link (first exact occurrence of `url`) and every hashtag in
/// `text`.
///
/// Hashtags inside the link span (a `#fragment`) are not tagged.
///
/// # Examples
///
/// ```
/// use reposter::publish::extract_facets;
///
/// let text = "📝 New\n\nhttps://e.com\n\n#rust";
/// let facets = extract_facets(text, Some("https://e.com"));
/// // "📝" is 4 bytes, so the link starts at byte 10, not char 7
/// assert_eq!(facets[0].index.byte_start, 10);
/// ```
pub fn extract_facets(text: &str, url: Option<&str>) -> Vec<Facet> {
    let mut facets = Vec::new();

    let link_span = url.filter(|u| !u.is_empty()).and_then(|url| {
        let start = text.find(url)?;
        Some((start, start + url.len(), url))
    });

    if let Some((start, end, url)) = link_span {
        facets.push(Facet {
            index: ByteSlice {
                byte_start: start,
                byte_end: end,
            },
            features: vec![FacetFeature::Link {
                uri: url.to_string(),
            }],
        });
    }

    for m in HASHTAG_RE.find_iter(text) {
        let inside_link = link_span
            .map(|(start, end, _)| m.start() < end && m.end() > start)
            .unwrap_or(false);
        if inside_link {
            continue;
        }

        facets.push(Facet {
            index: ByteSlice {
                byte_start: m.start(),
                byte_end: m.end(),
            },
            features: vec![FacetFeature::Tag {
                tag: m.as_str()[1..].to_string(),
            }],
        });
    }

    facets
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_link_offset_is_bytes_not_chars() {
        let url = "https://example.com/post";
        let text = format!("📝 Title\n\n{url}");
        let prefix = "📝 Title\n\n";

        let facets = extract_facets(&text, Some(url));
        assert_eq!(facets.len(), 1);
        assert_eq!(facets[0].index.byte_start, prefix.len());
        assert_eq!(facets[0].index.byte_end, prefix.len() + url.len());
        // The character count differs because the emoji is 4 bytes
        assert_ne!(facets[0].index.byte_start, prefix.chars().count());
        assert_eq!(&text[facets[0].index.byte_start..facets[0].index.byte_end], url);
    }

    #[test]
    fn test_hashtags_after_multibyte_text() {
        let text = "📝 Café ☕\n\nhttps://e.com\n\n#Salesforce #SalesforceDeveloper";
        let facets = extract_facets(text, Some("https://e.com"));

        let tags: Vec<_> = facets
            .iter()
            .filter_map(|f| match &f.features[0] {
                FacetFeature::Tag { tag } => Some((tag.as_str(), f.index)),
                _ => None,
            })
            .collect();

        assert_eq!(tags.len(), 2);
        for (tag, index) in tags {
            assert_eq!(&text[index.byte_start..index.byte_end], format!("#{tag}"));
        }
    }

    #[test]
    fn test_missing_url_produces_no_link_facet() {
        let facets = extract_facets("no link here #tag", Some("https://absent.example"));
        assert_eq!(facets.len(), 1);
        assert!(matches!(facets[0].features[0], FacetFeature::Tag { .. }));
    }

    #[test]
    fn test_fragment_in_link_not_tagged() {
        let url = "https://e.com/page#section";
        let facets = extract_facets(&format!("see {url} #real"), Some(url));
        let tags: Vec<_> = facets
            .iter()
            .filter(|f| matches!(f.features[0], FacetFeature::Tag { .. }))
            .collect();
        assert_eq!(tags.len(), 1);
    }

    #[test]
    fn test_serializes_to_bluesky_shape() {
        let facets = extract_facets("https://e.com #x", Some("https://e.com"));
        let json = serde_json::to_value(&facets).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                {
                    "index": { "byteStart": 0, "byteEnd": 13 },
                    "features": [{ "$type": "app.bsky.richtext.facet#link", "uri": "https://e.com" }]
                },
                {
                    "index": { "byteStart": 14, "byteEnd": 16 },
                    "features": [{ "$type": "app.bsky.richtext.facet#tag", "tag": "x" }]
                }
            ])
        );
    }
}
