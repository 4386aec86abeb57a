//! Page content limits and the permission-request flow.

// ============================================================================
// Imports
// ============================================================================

use url::Url;

use crate::error::Result;
use crate::protocol::PageLink;

// ============================================================================
// Constants
// ============================================================================

/// Characters of page text returned per request.
pub const MAX_CONTENT_LENGTH: usize = 50_000;

// ============================================================================
// ContentScriptArgs
// ============================================================================

/// Arguments passed to the content-extraction script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentScriptArgs {
    /// Character offset into the page text.
    pub offset: usize,
    /// Maximum characters to return.
    pub max_length: usize,
}

impl Default for ContentScriptArgs {
    fn default() -> Self {
        Self {
            offset: 0,
            max_length: MAX_CONTENT_LENGTH,
        }
    }
}

// ============================================================================
// ExtractedContent
// ============================================================================

/// Output of the content-extraction script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedContent {
    /// Text from the offset, at most `max_length` characters.
    pub full_text: String,
    /// Whether text was cut at `max_length`.
    pub is_truncated: bool,
    /// Characters in the whole page text.
    pub total_length: usize,
    /// Links that pass [`is_reportable_link`].
    pub links: Vec<PageLink>,
}

impl ExtractedContent {
    /// Applies offset, truncation and link filtering to raw page data.
    ///
    /// Lengths and offsets count characters.
    #[must_use]
    pub fn from_page(page_text: &str, links: Vec<PageLink>, args: ContentScriptArgs) -> Self {
        let total_length = page_text.chars().count();

        let mut rest = page_text.chars().skip(args.offset);
        let full_text: String = rest.by_ref().take(args.max_length).collect();
        let is_truncated = rest.next().is_some();

        Self {
            full_text,
            is_truncated,
            total_length,
            links: links.into_iter().filter(is_reportable_link).collect(),
        }
    }
}

/// Returns `true` for links worth reporting.
///
/// The text must be non-empty, the target `https://` and fragment-free.
#[must_use]
pub fn is_reportable_link(link: &PageLink) -> bool {
    !link.text.trim().is_empty() && link.url.starts_with("https://") && !link.url.contains('#')
}

// ============================================================================
// Permissions
// ============================================================================

/// Returns the origin of `url` and the host-permission pattern covering it.
///
/// # Errors
///
/// Returns [`crate::Error::Url`] if `url` does not parse.
pub fn origin_pattern(url: &str) -> Result<(String, String)> {
    let origin = Url::parse(url)?.origin().ascii_serialization();
    let pattern = format!("{origin}/*");
    Ok((origin, pattern))
}

/// Builds the options-page URL that asks for access to `request_url`.
#[must_use]
pub fn permission_request_url(options_page: &str, request_url: &str) -> String {
    format!(
        "{options_page}?requestUrl={}",
        urlencoding::encode(request_url)
    )
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn link(url: &str, text: &str) -> PageLink {
        PageLink {
            url: url.into(),
            text: text.into(),
        }
    }

    #[test]
    fn test_short_page_is_not_truncated() {
        let content = ExtractedContent::from_page("hello", vec![], ContentScriptArgs::default());
        assert_eq!(content.full_text, "hello");
        assert!(!content.is_truncated);
        assert_eq!(content.total_length, 5);
    }

    #[test]
    fn test_truncation_and_offset() {
        let page = "a".repeat(MAX_CONTENT_LENGTH + 10);

        let first = ExtractedContent::from_page(&page, vec![], ContentScriptArgs::default());
        assert_eq!(first.full_text.len(), MAX_CONTENT_LENGTH);
        assert!(first.is_truncated);
        assert_eq!(first.total_length, MAX_CONTENT_LENGTH + 10);

        let args = ContentScriptArgs {
            offset: MAX_CONTENT_LENGTH,
            ..Default::default()
        };
        let second = ExtractedContent::from_page(&page, vec![], args);
        assert_eq!(second.full_text.len(), 10);
        assert!(!second.is_truncated);
    }

    #[test]
    fn test_exact_limit_is_not_truncated() {
        let page = "b".repeat(MAX_CONTENT_LENGTH);
        let content = ExtractedContent::from_page(&page, vec![], ContentScriptArgs::default());
        assert!(!content.is_truncated);
    }

    #[test]
    fn test_offset_counts_characters() {
        let args = ContentScriptArgs {
            offset: 2,
            max_length: 2,
        };
        let content = ExtractedContent::from_page("héllo", vec![], args);
        assert_eq!(content.full_text, "ll");
        assert!(content.is_truncated);
        assert_eq!(content.total_length, 5);
    }

    #[test]
    fn test_link_filter() {
        let links = vec![
            link("https://a.com", "A"),
            link("http://b.com", "B"),
            link("https://c.com/#top", "C"),
            link("https://d.com", "  "),
        ];
        let content = ExtractedContent::from_page("", links, ContentScriptArgs::default());
        assert_eq!(content.links, vec![link("https://a.com", "A")]);
    }

    #[test]
    fn test_origin_pattern() {
        let (origin, pattern) = origin_pattern("https://Example.com:8443/a/b?c").expect("parse");
        assert_eq!(origin, "https://example.com:8443");
        assert_eq!(pattern, "https://example.com:8443/*");
    }

    #[test]
    fn test_permission_request_url() {
        assert_eq!(
            permission_request_url("moz-extension://id/options.html", "https://a.com/x?y=1"),
            "moz-extension://id/options.html?requestUrl=https%3A%2F%2Fa.com%2Fx%3Fy%3D1"
        );
    }
}
