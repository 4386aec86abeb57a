//! The browser operations the dispatcher drives.
//!
//! Implemented by whatever hosts the executing side: a native-messaging
//! shim, a WebDriver session, or a scripted fake in tests.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;

use crate::error::Result;
use crate::identifiers::{GroupId, TabId};
use crate::protocol::{BrowserTab, HistoryItem, TabGroupColor};

use super::content::{ContentScriptArgs, ExtractedContent};

// ============================================================================
// Parameter Types
// ============================================================================

/// History search parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryQuery {
    /// Text to match; empty matches everything.
    pub text: String,
    /// Result cap.
    pub max_results: u32,
    /// Earliest visit time, milliseconds since the epoch.
    pub start_time: u64,
}

/// Options for [`BrowserAutomation::find_in_tab`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FindOptions {
    /// Match case exactly.
    pub case_sensitive: bool,
}

/// New properties for a tab group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupUpdate {
    /// Collapse the group.
    pub collapsed: bool,
    /// Group colour.
    pub color: TabGroupColor,
    /// Group title.
    pub title: String,
}

// ============================================================================
// BrowserAutomation
// ============================================================================

/// Browser operations available to the dispatcher.
///
/// Every method is one independent browser call. Errors are reported to
/// the issuer verbatim, so implementations should return the browser's own
/// message via [`crate::Error::browser`].
#[async_trait]
pub trait BrowserAutomation: Send + Sync {
    /// Opens `url` in a new tab.
    async fn open_tab(&self, url: &str) -> Result<Option<TabId>>;

    /// Closes the given tabs.
    async fn close_tabs(&self, tab_ids: &[TabId]) -> Result<()>;

    /// Lists all open tabs.
    async fn list_tabs(&self) -> Result<Vec<BrowserTab>>;

    /// Looks up one tab.
    async fn get_tab(&self, tab_id: TabId) -> Result<BrowserTab>;

    /// Searches browsing history.
    async fn search_history(&self, query: &HistoryQuery) -> Result<Vec<HistoryItem>>;

    /// Returns `true` if host access matching `origin_pattern` is granted.
    async fn has_origin_permission(&self, origin_pattern: &str) -> Result<bool>;

    /// URL of the page that asks the user for host permissions.
    fn options_page_url(&self) -> String;

    /// Runs the content-extraction script in a tab.
    async fn extract_content(
        &self,
        tab_id: TabId,
        args: ContentScriptArgs,
    ) -> Result<ExtractedContent>;

    /// Moves a tab to `index`.
    async fn move_tab(&self, tab_id: TabId, index: usize) -> Result<()>;

    /// Searches a tab and returns the match count.
    async fn find_in_tab(&self, tab_id: TabId, phrase: &str, options: FindOptions) -> Result<u32>;

    /// Highlights the results of the last search in a tab.
    async fn highlight_results(&self, tab_id: TabId) -> Result<()>;

    /// Makes a tab the active one.
    async fn activate_tab(&self, tab_id: TabId) -> Result<()>;

    /// Puts tabs into a new group.
    async fn group_tabs(&self, tab_ids: &[TabId]) -> Result<GroupId>;

    /// Updates a group and returns its id.
    async fn update_group(&self, group_id: GroupId, update: GroupUpdate) -> Result<GroupId>;
}
