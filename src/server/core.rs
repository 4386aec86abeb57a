//! Typed command API over the listening endpoint.
//!
//! Each method sends one command and waits for its correlated resource.
//!
//! # Example
//!
//! ```no_run
//! use browser_bridge::{BrowserApi, ServerConfig};
//!
//! # async fn example() -> browser_bridge::Result<()> {
//! let api = BrowserApi::start(ServerConfig::from_env()?).await?;
//! let tabs = api.get_tab_list().await?;
//! println!("{} tabs open", tabs.len());
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::error::{Error, Result};
use crate::identifiers::{GroupId, TabId};
use crate::protocol::{
    BrowserTab, Command, HistoryItem, Resource, ResourceKind, TabContent, TabGroupColor,
};
use crate::transport::ListenerEndpoint;

use super::builder::ServerBuilder;
use super::config::ServerConfig;

// ============================================================================
// BrowserApi
// ============================================================================

/// Issuing side of the bridge.
///
/// Cloning is cheap; clones share one endpoint. The endpoint shuts down
/// when the last clone is dropped or [`BrowserApi::shutdown`] runs.
#[derive(Clone)]
pub struct BrowserApi {
    endpoint: Arc<ListenerEndpoint>,
}

impl fmt::Debug for BrowserApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrowserApi")
            .field("port", &self.port())
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// BrowserApi - Constructors
// ============================================================================

impl BrowserApi {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Binds using `config` and installs signal handlers.
    ///
    /// # Errors
    ///
    /// See [`ServerBuilder::build`].
    pub async fn start(config: ServerConfig) -> Result<Self> {
        ServerBuilder::from_config(config)
            .with_signal_handlers()
            .build()
            .await
    }

    pub(crate) async fn bind(
        ip: IpAddr,
        ports: &[u16],
        secret: String,
        response_timeout: Duration,
    ) -> Result<Self> {
        let endpoint = ListenerEndpoint::bind_with_timeout(ip, ports, secret, response_timeout)
            .await?;
        Ok(Self { endpoint })
    }
}

// ============================================================================
// BrowserApi - Connection
// ============================================================================

impl BrowserApi {
    /// Returns the bound port.
    #[inline]
    #[must_use]
    pub fn port(&self) -> u16 {
        self.endpoint.port()
    }

    /// Returns the URL the extension should dial.
    #[inline]
    #[must_use]
    pub fn ws_url(&self) -> String {
        self.endpoint.ws_url()
    }

    /// Returns `true` if an extension is connected.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.endpoint.is_connected()
    }

    /// Returns the underlying endpoint.
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &Arc<ListenerEndpoint> {
        &self.endpoint
    }

    /// Replaces the shared secret.
    pub fn set_secret(&self, secret: impl Into<String>) {
        self.endpoint.set_secret(secret);
    }

    /// Shuts down on Ctrl+C or SIGTERM.
    pub fn spawn_signal_handlers(&self) {
        self.endpoint.spawn_signal_handlers();
    }

    /// Fails pending requests and releases the port.
    pub fn shutdown(&self) {
        self.endpoint.shutdown();
    }
}

// ============================================================================
// BrowserApi - Commands
// ============================================================================

impl BrowserApi {
    /// Opens `url` in a new tab and returns its id.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Remote`] if the extension rejects the URL, and
    /// with the transport errors of [`ListenerEndpoint::request`].
    pub async fn open_tab(&self, url: impl Into<String>) -> Result<Option<TabId>> {
        let command = Command::OpenTab { url: url.into() };
        match self.endpoint.request(command).await? {
            Resource::OpenedTabId { tab_id } => Ok(tab_id),
            other => Err(unexpected(ResourceKind::OpenedTabId, &other)),
        }
    }

    /// Closes the given tabs.
    ///
    /// # Errors
    ///
    /// See [`BrowserApi::open_tab`].
    pub async fn close_tabs(&self, tab_ids: Vec<TabId>) -> Result<()> {
        match self.endpoint.request(Command::CloseTabs { tab_ids }).await? {
            Resource::TabsClosed => Ok(()),
            other => Err(unexpected(ResourceKind::TabsClosed, &other)),
        }
    }

    /// Lists all open tabs.
    ///
    /// # Errors
    ///
    /// See [`BrowserApi::open_tab`].
    pub async fn get_tab_list(&self) -> Result<Vec<BrowserTab>> {
        match self.endpoint.request(Command::GetTabList).await? {
            Resource::Tabs { tabs } => Ok(tabs),
            other => Err(unexpected(ResourceKind::Tabs, &other)),
        }
    }

    /// Searches recent history. `None` returns the most recent entries.
    ///
    /// # Errors
    ///
    /// See [`BrowserApi::open_tab`].
    pub async fn get_browser_recent_history(
        &self,
        search_query: Option<String>,
    ) -> Result<Vec<HistoryItem>> {
        let command = Command::GetBrowserRecentHistory { search_query };
        match self.endpoint.request(command).await? {
            Resource::History { history_items } => Ok(history_items),
            other => Err(unexpected(ResourceKind::History, &other)),
        }
    }

    /// Reads a tab's text from `offset` characters in, plus its links.
    ///
    /// # Errors
    ///
    /// See [`BrowserApi::open_tab`].
    pub async fn get_tab_content(
        &self,
        tab_id: TabId,
        offset: Option<usize>,
    ) -> Result<TabContent> {
        let command = Command::GetTabContent { tab_id, offset };
        match self.endpoint.request(command).await? {
            Resource::TabContent(content) => Ok(content),
            other => Err(unexpected(ResourceKind::TabContent, &other)),
        }
    }

    /// Moves tabs into `tab_order` and returns the applied order.
    ///
    /// # Errors
    ///
    /// See [`BrowserApi::open_tab`].
    pub async fn reorder_tabs(&self, tab_order: Vec<TabId>) -> Result<Vec<TabId>> {
        match self.endpoint.request(Command::ReorderTabs { tab_order }).await? {
            Resource::TabsReordered { tab_order } => Ok(tab_order),
            other => Err(unexpected(ResourceKind::TabsReordered, &other)),
        }
    }

    /// Finds and highlights `query_phrase`, returning the match count.
    ///
    /// # Errors
    ///
    /// See [`BrowserApi::open_tab`].
    pub async fn find_highlight(
        &self,
        tab_id: TabId,
        query_phrase: impl Into<String>,
    ) -> Result<u32> {
        let command = Command::FindHighlight {
            tab_id,
            query_phrase: query_phrase.into(),
        };
        match self.endpoint.request(command).await? {
            Resource::FindHighlightResult { no_of_results } => Ok(no_of_results),
            other => Err(unexpected(ResourceKind::FindHighlightResult, &other)),
        }
    }

    /// Groups tabs and returns the new group's id.
    ///
    /// # Errors
    ///
    /// See [`BrowserApi::open_tab`].
    pub async fn group_tabs(
        &self,
        tab_ids: Vec<TabId>,
        is_collapsed: bool,
        group_color: TabGroupColor,
        group_title: impl Into<String>,
    ) -> Result<GroupId> {
        let command = Command::GroupTabs {
            tab_ids,
            is_collapsed,
            group_color,
            group_title: group_title.into(),
        };
        match self.endpoint.request(command).await? {
            Resource::NewTabGroup { group_id } => Ok(group_id),
            other => Err(unexpected(ResourceKind::NewTabGroup, &other)),
        }
    }
}

/// The registry only resolves matching kinds, so this is unreachable in
/// practice.
fn unexpected(expected: ResourceKind, got: &Resource) -> Error {
    debug!(expected = %expected, got = %got.kind(), "Unexpected resource");
    Error::protocol(format!(
        "Expected resource '{expected}', got '{}'",
        got.kind()
    ))
}

// ============================================================================
// Tests
// ============================================================================
