//! Resource messages sent back by the executing side.
//!
//! Resources are internally tagged by `resource`, mirroring the command set.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::identifiers::{CorrelationId, GroupId, TabId};

// ============================================================================
// Resource
// ============================================================================

/// Result payload of a successfully executed command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "resource", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum Resource {
    /// Answer to `open-tab`.
    OpenedTabId {
        /// Id of the new tab, if the browser reported one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tab_id: Option<TabId>,
    },

    /// Answer to `get-tab-list`.
    Tabs {
        /// All open tabs.
        tabs: Vec<BrowserTab>,
    },

    /// Answer to `get-browser-recent-history`.
    History {
        /// Matching history entries, each with a URL.
        history_items: Vec<HistoryItem>,
    },

    /// Answer to `get-tab-content`.
    TabContent(TabContent),

    /// Answer to `reorder-tabs`.
    TabsReordered {
        /// The order that was applied.
        tab_order: Vec<TabId>,
    },

    /// Answer to `find-highlight`.
    FindHighlightResult {
        /// Number of matches found.
        no_of_results: u32,
    },

    /// Answer to `close-tabs`.
    TabsClosed,

    /// Answer to `group-tabs`.
    NewTabGroup {
        /// Id of the created group.
        group_id: GroupId,
    },
}

impl Resource {
    /// Returns the kind tag of this resource.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        match self {
            Self::OpenedTabId { .. } => ResourceKind::OpenedTabId,
            Self::Tabs { .. } => ResourceKind::Tabs,
            Self::History { .. } => ResourceKind::History,
            Self::TabContent(_) => ResourceKind::TabContent,
            Self::TabsReordered { .. } => ResourceKind::TabsReordered,
            Self::FindHighlightResult { .. } => ResourceKind::FindHighlightResult,
            Self::TabsClosed => ResourceKind::TabsClosed,
            Self::NewTabGroup { .. } => ResourceKind::NewTabGroup,
        }
    }
}

// ============================================================================
// ResourceKind
// ============================================================================

/// Tag identifying a [`Resource`] variant without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// `opened-tab-id`
    OpenedTabId,
    /// `tabs`
    Tabs,
    /// `history`
    History,
    /// `tab-content`
    TabContent,
    /// `tabs-reordered`
    TabsReordered,
    /// `find-highlight-result`
    FindHighlightResult,
    /// `tabs-closed`
    TabsClosed,
    /// `new-tab-group`
    NewTabGroup,
}

impl ResourceKind {
    /// Returns the wire tag.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OpenedTabId => "opened-tab-id",
            Self::Tabs => "tabs",
            Self::History => "history",
            Self::TabContent => "tab-content",
            Self::TabsReordered => "tabs-reordered",
            Self::FindHighlightResult => "find-highlight-result",
            Self::TabsClosed => "tabs-closed",
            Self::NewTabGroup => "new-tab-group",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ResourceMessage
// ============================================================================

/// A resource paired with the correlation id of the command it answers.
///
/// # Format
///
/// ```json
/// { "resource": "opened-tab-id", "tabId": 123, "correlationId": "..." }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceMessage {
    /// The resource and its fields.
    #[serde(flatten)]
    pub resource: Resource,

    /// Correlation id of the answered command.
    #[serde(rename = "correlationId")]
    pub correlation_id: CorrelationId,
}

impl ResourceMessage {
    /// Creates a resource message answering `correlation_id`.
    #[inline]
    #[must_use]
    pub fn new(correlation_id: CorrelationId, resource: Resource) -> Self {
        Self {
            resource,
            correlation_id,
        }
    }

    /// Returns the kind tag of the carried resource.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        self.resource.kind()
    }
}

// ============================================================================
// Payload Types
// ============================================================================

/// A tab as reported by the browser.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserTab {
    /// Tab id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<TabId>,
    /// Current URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Page title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Last access time in milliseconds since the epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_accessed: Option<f64>,
}

/// A browser history entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    /// Visited URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Page title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Last visit time in milliseconds since the epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_visit_time: Option<f64>,
}

/// A hyperlink found in page content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLink {
    /// Absolute link target.
    pub url: String,
    /// Visible link text.
    pub text: String,
}

/// Text and links read from a tab.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabContent {
    /// Tab the content came from.
    pub tab_id: TabId,
    /// Page text starting at the requested offset.
    pub full_text: String,
    /// Whether `full_text` was cut at the length limit.
    pub is_truncated: bool,
    /// Length of the whole page text, before offset and truncation.
    pub total_length: usize,
    /// Links on the page.
    pub links: Vec<PageLink>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_opened_tab_id_wire_format() {
        let message = ResourceMessage::new(
            CorrelationId::from("test-correlation-id"),
            Resource::OpenedTabId {
                tab_id: Some(TabId::new(123)),
            },
        );

        assert_eq!(
            serde_json::to_value(&message).expect("serialize"),
            json!({
                "resource": "opened-tab-id",
                "tabId": 123,
                "correlationId": "test-correlation-id"
            })
        );
    }

    #[test]
    fn test_tabs_closed_wire_format() {
        let message = ResourceMessage::new(CorrelationId::from("c1"), Resource::TabsClosed);
        assert_eq!(
            serde_json::to_value(&message).expect("serialize"),
            json!({ "resource": "tabs-closed", "correlationId": "c1" })
        );
    }

    #[test]
    fn test_parse_tab_content() {
        let message: ResourceMessage = serde_json::from_value(json!({
            "resource": "tab-content",
            "tabId": 5,
            "correlationId": "c2",
            "isTruncated": true,
            "fullText": "hello",
            "links": [{ "url": "https://a.com", "text": "A" }],
            "totalLength": 60000
        }))
        .expect("parse");

        assert_eq!(message.kind(), ResourceKind::TabContent);
        let Resource::TabContent(content) = message.resource else {
            panic!("expected tab content");
        };
        assert_eq!(content.tab_id, TabId::new(5));
        assert!(content.is_truncated);
        assert_eq!(content.total_length, 60_000);
        assert_eq!(content.links.len(), 1);
    }

    #[test]
    fn test_parse_tabs_with_browser_timestamps() {
        let message: ResourceMessage = serde_json::from_value(json!({
            "resource": "tabs",
            "correlationId": "c3",
            "tabs": [
                { "id": 1, "url": "https://a.com", "title": "A", "lastAccessed": 1700000000000.5 },
                { "id": 2 }
            ]
        }))
        .expect("parse");

        let Resource::Tabs { tabs } = message.resource else {
            panic!("expected tabs");
        };
        assert_eq!(tabs.len(), 2);
        assert_eq!(tabs[0].last_accessed, Some(1_700_000_000_000.5));
        assert!(tabs[1].url.is_none());
    }

    #[test]
    fn test_kind_matches_wire_tag() {
        let resources = [
            Resource::OpenedTabId { tab_id: None },
            Resource::Tabs { tabs: vec![] },
            Resource::History { history_items: vec![] },
            Resource::TabsReordered { tab_order: vec![] },
            Resource::FindHighlightResult { no_of_results: 0 },
            Resource::TabsClosed,
            Resource::NewTabGroup { group_id: GroupId::new(1) },
        ];

        for resource in resources {
            let value = serde_json::to_value(&resource).expect("serialize");
            assert_eq!(value["resource"], resource.kind().as_str());
        }
    }
}
