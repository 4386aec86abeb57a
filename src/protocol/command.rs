//! Command definitions sent from the issuing side to the executing side.
//!
//! Commands are internally tagged by `cmd` with kebab-case names and
//! camelCase fields.
//!
//! # Commands
//!
//! | `cmd` | Fields | Answered by |
//! |-------|--------|-------------|
//! | `open-tab` | `url` | `opened-tab-id` |
//! | `close-tabs` | `tabIds` | `tabs-closed` |
//! | `get-tab-list` | | `tabs` |
//! | `get-browser-recent-history` | `searchQuery?` | `history` |
//! | `get-tab-content` | `tabId`, `offset?` | `tab-content` |
//! | `reorder-tabs` | `tabOrder` | `tabs-reordered` |
//! | `find-highlight` | `tabId`, `queryPhrase` | `find-highlight-result` |
//! | `group-tabs` | `tabIds`, `isCollapsed`, `groupColor`, `groupTitle` | `new-tab-group` |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::identifiers::{CorrelationId, TabId};

use super::ResourceKind;

// ============================================================================
// Command
// ============================================================================

/// A browser action requested by the issuing side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum Command {
    /// Open a new tab.
    OpenTab {
        /// URL to open. Must be `https://`.
        url: String,
    },

    /// Close tabs by id.
    CloseTabs {
        /// Tabs to close.
        tab_ids: Vec<TabId>,
    },

    /// List all open tabs.
    GetTabList,

    /// Search recent history.
    GetBrowserRecentHistory {
        /// Text to match. Absent matches everything.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        search_query: Option<String>,
    },

    /// Read a tab's text and links.
    GetTabContent {
        /// Tab to read.
        tab_id: TabId,
        /// Character offset to start from.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        offset: Option<usize>,
    },

    /// Move tabs into the given order.
    ReorderTabs {
        /// Tab ids in their new order, index 0 first.
        tab_order: Vec<TabId>,
    },

    /// Find and highlight a phrase in a tab.
    FindHighlight {
        /// Tab to search.
        tab_id: TabId,
        /// Phrase to find.
        query_phrase: String,
    },

    /// Put tabs into a new group.
    GroupTabs {
        /// Tabs to group.
        tab_ids: Vec<TabId>,
        /// Whether the group starts collapsed.
        is_collapsed: bool,
        /// Group colour.
        group_color: TabGroupColor,
        /// Group title.
        group_title: String,
    },
}

impl Command {
    /// Returns the wire name of the command.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::OpenTab { .. } => "open-tab",
            Self::CloseTabs { .. } => "close-tabs",
            Self::GetTabList => "get-tab-list",
            Self::GetBrowserRecentHistory { .. } => "get-browser-recent-history",
            Self::GetTabContent { .. } => "get-tab-content",
            Self::ReorderTabs { .. } => "reorder-tabs",
            Self::FindHighlight { .. } => "find-highlight",
            Self::GroupTabs { .. } => "group-tabs",
        }
    }

    /// Returns the resource kind that answers this command.
    #[must_use]
    pub const fn expected_resource(&self) -> ResourceKind {
        match self {
            Self::OpenTab { .. } => ResourceKind::OpenedTabId,
            Self::CloseTabs { .. } => ResourceKind::TabsClosed,
            Self::GetTabList => ResourceKind::Tabs,
            Self::GetBrowserRecentHistory { .. } => ResourceKind::History,
            Self::GetTabContent { .. } => ResourceKind::TabContent,
            Self::ReorderTabs { .. } => ResourceKind::TabsReordered,
            Self::FindHighlight { .. } => ResourceKind::FindHighlightResult,
            Self::GroupTabs { .. } => ResourceKind::NewTabGroup,
        }
    }

    /// Returns the URL this command targets directly, if any.
    #[must_use]
    pub fn target_url(&self) -> Option<&str> {
        match self {
            Self::OpenTab { url } => Some(url),
            _ => None,
        }
    }
}

// ============================================================================
// CommandRequest
// ============================================================================

/// A command paired with its correlation id.
///
/// # Format
///
/// ```json
/// { "cmd": "open-tab", "url": "https://example.com", "correlationId": "..." }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRequest {
    /// The command and its fields.
    #[serde(flatten)]
    pub command: Command,

    /// Identifier the response must carry.
    #[serde(rename = "correlationId")]
    pub correlation_id: CorrelationId,
}

impl CommandRequest {
    /// Creates a request with a freshly generated correlation id.
    #[inline]
    #[must_use]
    pub fn new(command: Command) -> Self {
        Self {
            command,
            correlation_id: CorrelationId::generate(),
        }
    }

    /// Creates a request with a specific correlation id.
    #[inline]
    #[must_use]
    pub fn with_id(correlation_id: CorrelationId, command: Command) -> Self {
        Self {
            command,
            correlation_id,
        }
    }
}

// ============================================================================
// TabGroupColor
// ============================================================================

/// Colours available for tab groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TabGroupColor {
    /// Blue.
    Blue,
    /// Cyan.
    Cyan,
    /// Grey.
    Grey,
    /// Green.
    Green,
    /// Orange.
    Orange,
    /// Pink.
    Pink,
    /// Purple.
    Purple,
    /// Red.
    Red,
    /// Yellow.
    Yellow,
}

impl TabGroupColor {
    /// Returns the colour's wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Blue => "blue",
            Self::Cyan => "cyan",
            Self::Grey => "grey",
            Self::Green => "green",
            Self::Orange => "orange",
            Self::Pink => "pink",
            Self::Purple => "purple",
            Self::Red => "red",
            Self::Yellow => "yellow",
        }
    }
}

impl fmt::Display for TabGroupColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::{Value, json};

    fn to_value(request: &CommandRequest) -> Value {
        serde_json::to_value(request).expect("serialize")
    }

    #[test]
    fn test_open_tab_wire_format() {
        let request = CommandRequest::with_id(
            CorrelationId::from("test-correlation-id"),
            Command::OpenTab {
                url: "https://example.com".into(),
            },
        );

        assert_eq!(
            to_value(&request),
            json!({
                "cmd": "open-tab",
                "url": "https://example.com",
                "correlationId": "test-correlation-id"
            })
        );
    }

    #[test]
    fn test_unit_command_wire_format() {
        let request =
            CommandRequest::with_id(CorrelationId::from("c1"), Command::GetTabList);
        assert_eq!(
            to_value(&request),
            json!({ "cmd": "get-tab-list", "correlationId": "c1" })
        );
    }

    #[test]
    fn test_optional_fields_are_omitted() {
        let request = CommandRequest::with_id(
            CorrelationId::from("c1"),
            Command::GetBrowserRecentHistory { search_query: None },
        );
        assert_eq!(
            to_value(&request),
            json!({ "cmd": "get-browser-recent-history", "correlationId": "c1" })
        );
    }

    #[test]
    fn test_parse_group_tabs() {
        let request: CommandRequest = serde_json::from_value(json!({
            "cmd": "group-tabs",
            "tabIds": [1, 2],
            "isCollapsed": true,
            "groupColor": "purple",
            "groupTitle": "Research",
            "correlationId": "c2"
        }))
        .expect("parse");

        assert_eq!(request.correlation_id.as_str(), "c2");
        assert_eq!(
            request.command,
            Command::GroupTabs {
                tab_ids: vec![TabId::new(1), TabId::new(2)],
                is_collapsed: true,
                group_color: TabGroupColor::Purple,
                group_title: "Research".into(),
            }
        );
    }

    #[test]
    fn test_parse_tab_content_without_offset() {
        let request: CommandRequest = serde_json::from_value(json!({
            "cmd": "get-tab-content",
            "tabId": 9,
            "correlationId": "c3"
        }))
        .expect("parse");

        assert_eq!(
            request.command,
            Command::GetTabContent {
                tab_id: TabId::new(9),
                offset: None
            }
        );
    }

    #[test]
    fn test_unknown_command_is_rejected() {
        let result = serde_json::from_value::<CommandRequest>(json!({
            "cmd": "format-disk",
            "correlationId": "c4"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_color_is_rejected() {
        let result = serde_json::from_value::<CommandRequest>(json!({
            "cmd": "group-tabs",
            "tabIds": [1],
            "isCollapsed": false,
            "groupColor": "magenta",
            "groupTitle": "x",
            "correlationId": "c5"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_name_matches_wire_tag() {
        let commands = [
            Command::OpenTab { url: "https://a.com".into() },
            Command::CloseTabs { tab_ids: vec![] },
            Command::GetTabList,
            Command::GetBrowserRecentHistory { search_query: None },
            Command::GetTabContent { tab_id: TabId::new(1), offset: Some(10) },
            Command::ReorderTabs { tab_order: vec![] },
            Command::FindHighlight { tab_id: TabId::new(1), query_phrase: "x".into() },
            Command::GroupTabs {
                tab_ids: vec![],
                is_collapsed: false,
                group_color: TabGroupColor::Blue,
                group_title: String::new(),
            },
        ];

        for command in commands {
            let value = serde_json::to_value(&command).expect("serialize");
            assert_eq!(value["cmd"], command.name());
        }
    }

    #[test]
    fn test_expected_resource() {
        assert_eq!(
            Command::GetTabList.expected_resource(),
            ResourceKind::Tabs
        );
        assert_eq!(
            Command::CloseTabs { tab_ids: vec![] }.expected_resource(),
            ResourceKind::TabsClosed
        );
    }
}
