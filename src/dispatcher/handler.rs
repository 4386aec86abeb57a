//! Command dispatcher and policy gate.
//!
//! Each inbound command runs through:
//!
//! ```text
//! RECEIVED → POLICY_CHECK → { DENIED | EXECUTING } → { RESPONDED | ERRORED }
//! ```
//!
//! [`Dispatcher::handle_decoded_message`] returns policy and execution
//! failures to its caller; [`Dispatcher::handle`] turns them into an error
//! message carrying the original correlation id.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::error::{Error, Result};
use crate::identifiers::TabId;
use crate::policy::{AuditEntry, PolicyConfig, SettingsStore, tool_id_for};
use crate::protocol::{Command, CommandRequest, Resource, ResourceMessage, TabContent};

use super::ResourceSink;
use super::automation::{BrowserAutomation, FindOptions, GroupUpdate, HistoryQuery};
use super::content::{ContentScriptArgs, MAX_CONTENT_LENGTH, origin_pattern, permission_request_url};

// ============================================================================
// Constants
// ============================================================================

/// Result cap for history searches.
pub const HISTORY_MAX_RESULTS: u32 = 200;

// ============================================================================
// Dispatcher
// ============================================================================

/// Executes verified commands against the browser.
pub struct Dispatcher {
    browser: Arc<dyn BrowserAutomation>,
    settings: Arc<dyn SettingsStore>,
    sink: Arc<dyn ResourceSink>,
}

impl Dispatcher {
    /// Creates a dispatcher reporting through `sink`.
    #[must_use]
    pub fn new(
        browser: Arc<dyn BrowserAutomation>,
        settings: Arc<dyn SettingsStore>,
        sink: Arc<dyn ResourceSink>,
    ) -> Self {
        Self {
            browser,
            settings,
            sink,
        }
    }

    /// Returns a callback that runs each request on its own task.
    ///
    /// Suitable for [`crate::ConnectorEndpoint::add_message_listener`] and
    /// [`crate::ListenerEndpoint::set_request_handler`].
    #[must_use]
    pub fn into_listener(self: Arc<Self>) -> Arc<dyn Fn(CommandRequest) + Send + Sync> {
        Arc::new(move |request| {
            let dispatcher = Arc::clone(&self);
            tokio::spawn(async move {
                dispatcher.handle(request).await;
            });
        })
    }

    /// Runs a request and reports any failure to the issuer.
    pub async fn handle(&self, request: CommandRequest) {
        let correlation_id = request.correlation_id.clone();
        let cmd = request.command.name();

        if let Err(e) = self.handle_decoded_message(request).await {
            if e.is_policy_error() {
                debug!(correlation_id = %correlation_id, cmd, error = %e, "Command denied");
            } else {
                warn!(correlation_id = %correlation_id, cmd, error = %e, "Command failed");
            }

            if let Err(send_err) = self.sink.send_error(correlation_id, &e.to_string()) {
                error!(error = %send_err, "Failed to send error message");
            }
        }
    }

    /// Runs a request and sends its resource.
    ///
    /// # Errors
    ///
    /// - [`Error::CommandDisabled`] if the command's tool is switched off
    /// - [`Error::InvalidUrl`], [`Error::DomainDenied`], [`Error::TabDomainDenied`]
    ///   or [`Error::PermissionRequired`] from the per-command checks
    /// - any error from the browser or the sink
    pub async fn handle_decoded_message(&self, request: CommandRequest) -> Result<()> {
        let CommandRequest {
            command,
            correlation_id,
        } = request;

        let policy = self.settings.policy().await?;
        let cmd = command.name();

        if !policy.is_command_allowed(cmd) {
            return Err(Error::command_disabled(cmd));
        }

        if let Some(tool_id) = tool_id_for(cmd) {
            let entry = AuditEntry::now(tool_id, cmd, command.target_url().map(str::to_string));
            if let Err(e) = self.settings.append_audit(entry).await {
                warn!(error = %e, "Failed to append audit entry");
            }
        }

        debug!(correlation_id = %correlation_id, cmd, "Executing command");

        let resource = self.execute(&policy, command).await?;
        self.sink
            .send_resource(ResourceMessage::new(correlation_id, resource))
    }

    async fn execute(&self, policy: &PolicyConfig, command: Command) -> Result<Resource> {
        match command {
            Command::OpenTab { url } => self.open_tab(policy, &url).await,

            Command::CloseTabs { tab_ids } => {
                self.browser.close_tabs(&tab_ids).await?;
                Ok(Resource::TabsClosed)
            }

            Command::GetTabList => Ok(Resource::Tabs {
                tabs: self.browser.list_tabs().await?,
            }),

            Command::GetBrowserRecentHistory { search_query } => {
                let query = HistoryQuery {
                    text: search_query.unwrap_or_default(),
                    max_results: HISTORY_MAX_RESULTS,
                    start_time: 0,
                };
                let history_items = self
                    .browser
                    .search_history(&query)
                    .await?
                    .into_iter()
                    .filter(|item| item.url.is_some())
                    .collect();
                Ok(Resource::History { history_items })
            }

            Command::GetTabContent { tab_id, offset } => {
                self.tab_content(policy, tab_id, offset.unwrap_or(0))
                    .await
            }

            Command::ReorderTabs { tab_order } => {
                for (index, tab_id) in tab_order.iter().enumerate() {
                    self.browser.move_tab(*tab_id, index).await?;
                }
                Ok(Resource::TabsReordered { tab_order })
            }

            Command::FindHighlight {
                tab_id,
                query_phrase,
            } => {
                let options = FindOptions {
                    case_sensitive: true,
                };
                let count = self
                    .browser
                    .find_in_tab(tab_id, &query_phrase, options)
                    .await?;

                if count > 0 {
                    self.browser.activate_tab(tab_id).await?;
                    self.browser.highlight_results(tab_id).await?;
                }

                Ok(Resource::FindHighlightResult {
                    no_of_results: count,
                })
            }

            Command::GroupTabs {
                tab_ids,
                is_collapsed,
                group_color,
                group_title,
            } => {
                let group_id = self.browser.group_tabs(&tab_ids).await?;
                let update = GroupUpdate {
                    collapsed: is_collapsed,
                    color: group_color,
                    title: group_title,
                };
                let group_id = self.browser.update_group(group_id, update).await?;
                Ok(Resource::NewTabGroup { group_id })
            }
        }
    }

    async fn open_tab(&self, policy: &PolicyConfig, url: &str) -> Result<Resource> {
        if !url.starts_with("https://") {
            warn!(url, "Invalid URL");
            return Err(Error::invalid_url(url));
        }

        if policy.is_domain_denied(url) {
            return Err(Error::domain_denied(url));
        }

        let tab_id = self.browser.open_tab(url).await?;
        Ok(Resource::OpenedTabId { tab_id })
    }

    async fn tab_content(
        &self,
        policy: &PolicyConfig,
        tab_id: TabId,
        offset: usize,
    ) -> Result<Resource> {
        let tab = self.browser.get_tab(tab_id).await?;

        if let Some(url) = tab.url.as_deref() {
            if policy.is_domain_denied(url) {
                return Err(Error::tab_domain_denied(url));
            }

            let (origin, pattern) = origin_pattern(url)?;
            if !self.browser.has_origin_permission(&pattern).await? {
                let page = permission_request_url(&self.browser.options_page_url(), url);
                self.browser.open_tab(&page).await?;
                return Err(Error::permission_required(origin));
            }
        }

        let args = ContentScriptArgs {
            offset,
            max_length: MAX_CONTENT_LENGTH,
        };
        let content = self.browser.extract_content(tab_id, args).await?;

        Ok(Resource::TabContent(TabContent {
            tab_id,
            full_text: content.full_text,
            is_truncated: content.is_truncated,
            total_length: content.total_length,
            links: content.links,
        }))
    }
}

// ============================================================================
// Tests
// ============================================================================
