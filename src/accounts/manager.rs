use super::oauth_ops::{fetch_project_id, refresh_access_token};
use super::pool::{PoolEntry, RotationPool, RotationStrategy};
use super::refresher::{RefreshJob, refresh_accounts_concurrently};
use super::resource::{Account, AccountLease, AccountPatch, AccountSummary};
use super::variant::UpstreamVariant;
use crate::config::ResolvedVariantConfig;
use crate::error::CastorError;
use crate::store::TokenStore;
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Messages handled by an account-manager actor. One actor instance exists
/// per upstream variant; all pool and store mutation happens here, which is
/// what makes the store's read-merge-write safe without locks.
pub enum AccountManagerMessage {
    /// Dispense one ready account (refreshed, project id bootstrapped).
    /// Replies `None` when the pool has nothing usable; never errors.
    GetToken(RpcReplyPort<Option<AccountLease>>),

    /// A logical request completed successfully on this account.
    RecordRequest { token_id: String },

    /// The caller saw a quota-exhausted 429 on this account.
    ReportQuotaExhausted { token_id: String },

    /// The caller saw a credential-level 403 on a chat call; disable.
    ReportInvalid { token_id: String },

    /// Swap rotation policy; clears request counters, touches nothing else.
    UpdateRotation { strategy: RotationStrategy },

    // Admin surface, keyed by opaque tokenId.
    ListAccounts(RpcReplyPort<Vec<AccountSummary>>),
    AddAccount {
        refresh_token: String,
        project_id: Option<String>,
        reply: RpcReplyPort<Result<String, String>>,
    },
    UpdateAccount {
        token_id: String,
        patch: AccountPatch,
        reply: RpcReplyPort<Result<(), String>>,
    },
    DeleteAccount {
        token_id: String,
        reply: RpcReplyPort<Result<(), String>>,
    },
    RefreshAccount {
        token_id: String,
        reply: RpcReplyPort<Result<(), RefreshFailure>>,
    },
    FetchProjectId {
        token_id: String,
        reply: RpcReplyPort<Result<Option<String>, String>>,
    },
    ExportAccounts(RpcReplyPort<Result<Vec<Account>, String>>),
    ImportAccounts {
        accounts: Vec<Account>,
        reply: RpcReplyPort<Result<usize, String>>,
    },
}

/// Why one account's refresh failed; carried back to the admin surface with
/// the upstream status when one was observed.
#[derive(Debug)]
pub struct RefreshFailure {
    pub status: Option<axum::http::StatusCode>,
    pub message: String,
}

/// Cloneable handle for talking to one variant's manager actor.
#[derive(Clone)]
pub struct AccountManagerHandle {
    actor: ActorRef<AccountManagerMessage>,
}

impl AccountManagerHandle {
    pub async fn get_token(&self) -> Result<Option<AccountLease>, CastorError> {
        ractor::call!(self.actor, AccountManagerMessage::GetToken)
            .map_err(|e| CastorError::Ractor(format!("GetToken RPC failed: {e}")))
    }

    pub fn record_request(&self, token_id: &str) {
        let _ = ractor::cast!(
            self.actor,
            AccountManagerMessage::RecordRequest {
                token_id: token_id.to_string()
            }
        );
    }

    pub fn report_quota_exhausted(&self, token_id: &str) {
        let _ = ractor::cast!(
            self.actor,
            AccountManagerMessage::ReportQuotaExhausted {
                token_id: token_id.to_string()
            }
        );
    }

    pub fn report_invalid(&self, token_id: &str) {
        let _ = ractor::cast!(
            self.actor,
            AccountManagerMessage::ReportInvalid {
                token_id: token_id.to_string()
            }
        );
    }

    pub fn update_rotation(&self, strategy: RotationStrategy) {
        let _ = ractor::cast!(self.actor, AccountManagerMessage::UpdateRotation { strategy });
    }

    pub async fn list_accounts(&self) -> Result<Vec<AccountSummary>, CastorError> {
        ractor::call!(self.actor, AccountManagerMessage::ListAccounts)
            .map_err(|e| CastorError::Ractor(format!("ListAccounts RPC failed: {e}")))
    }

    pub async fn add_account(
        &self,
        refresh_token: String,
        project_id: Option<String>,
    ) -> Result<String, CastorError> {
        ractor::call!(self.actor, |reply| AccountManagerMessage::AddAccount {
            refresh_token,
            project_id,
            reply
        })
        .map_err(|e| CastorError::Ractor(format!("AddAccount RPC failed: {e}")))?
        .map_err(CastorError::Store)
    }

    pub async fn update_account(
        &self,
        token_id: String,
        patch: AccountPatch,
    ) -> Result<(), CastorError> {
        ractor::call!(self.actor, |reply| AccountManagerMessage::UpdateAccount {
            token_id,
            patch,
            reply
        })
        .map_err(|e| CastorError::Ractor(format!("UpdateAccount RPC failed: {e}")))?
        .map_err(CastorError::Store)
    }

    pub async fn delete_account(&self, token_id: String) -> Result<(), CastorError> {
        ractor::call!(self.actor, |reply| AccountManagerMessage::DeleteAccount {
            token_id,
            reply
        })
        .map_err(|e| CastorError::Ractor(format!("DeleteAccount RPC failed: {e}")))?
        .map_err(CastorError::Store)
    }

    pub async fn refresh_account(&self, token_id: String) -> Result<(), CastorError> {
        let id_for_error = token_id.clone();
        ractor::call!(self.actor, |reply| AccountManagerMessage::RefreshAccount {
            token_id,
            reply
        })
        .map_err(|e| CastorError::Ractor(format!("RefreshAccount RPC failed: {e}")))?
        .map_err(|failure| CastorError::TokenRefresh {
            token_id: id_for_error,
            status: failure.status,
            message: failure.message,
        })
    }

    pub async fn fetch_project_id(&self, token_id: String) -> Result<Option<String>, CastorError> {
        ractor::call!(self.actor, |reply| AccountManagerMessage::FetchProjectId {
            token_id,
            reply
        })
        .map_err(|e| CastorError::Ractor(format!("FetchProjectId RPC failed: {e}")))?
        .map_err(CastorError::Store)
    }

    pub async fn export_accounts(&self) -> Result<Vec<Account>, CastorError> {
        ractor::call!(self.actor, AccountManagerMessage::ExportAccounts)
            .map_err(|e| CastorError::Ractor(format!("ExportAccounts RPC failed: {e}")))?
            .map_err(CastorError::Store)
    }

    pub async fn import_accounts(&self, accounts: Vec<Account>) -> Result<usize, CastorError> {
        ractor::call!(self.actor, |reply| AccountManagerMessage::ImportAccounts {
            accounts,
            reply
        })
        .map_err(|e| CastorError::Ractor(format!("ImportAccounts RPC failed: {e}")))?
        .map_err(CastorError::Store)
    }
}

struct AccountManagerState {
    variant: UpstreamVariant,
    cfg: Arc<ResolvedVariantConfig>,
    store: TokenStore,
    pool: RotationPool,
    /// Dedicated client for OAuth and bootstrap calls (not the chat client).
    http: reqwest::Client,
}

impl AccountManagerState {
    fn refresh_buffer(&self) -> Duration {
        Duration::from_secs(self.cfg.refresh_buffer_secs)
    }

    fn lease_for(entry: &PoolEntry) -> AccountLease {
        AccountLease {
            token_id: Arc::from(entry.token_id.as_str()),
            access_token: Arc::from(entry.account.access_token.as_str()),
            project_id: entry.account.project_id.as_deref().map(Arc::from),
            email: entry.account.email.as_deref().map(Arc::from),
        }
    }

    async fn persist_account(&self, account: &Account) {
        let account = account.clone();
        let result = self
            .store
            .merge_write(move |mut all| {
                match all
                    .iter_mut()
                    .find(|existing| existing.refresh_token == account.refresh_token)
                {
                    Some(existing) => *existing = account,
                    None => all.push(account),
                }
                all
            })
            .await;
        if let Err(e) = result {
            warn!(variant = self.variant.name, "Store write failed: {e}");
        }
    }

    async fn disable_account(&mut self, token_id: &str, reason: &str) {
        let Some(removed) = self.pool.disable(token_id) else {
            return;
        };
        error!(
            variant = self.variant.name,
            token_id, reason, "Account disabled"
        );
        self.persist_account(&removed.account).await;
    }

    /// Refresh one pool entry in place. `Ok(true)` means usable now,
    /// `Ok(false)` means skipped (transient failure), disabling is handled
    /// internally.
    async fn ensure_fresh(&mut self, token_id: &str) -> bool {
        let buffer = self.refresh_buffer();
        let Some(entry) = self.pool.find(token_id) else {
            return false;
        };
        if !entry.account.is_expired(buffer) {
            return true;
        }

        let refresh_token = entry.account.refresh_token.clone();
        match refresh_access_token(&self.variant, &refresh_token, &self.http).await {
            Ok(refreshed) => {
                if let Some(entry) = self.pool.find_mut(token_id) {
                    entry
                        .account
                        .apply_refresh(refreshed.access_token, refreshed.expires_in);
                    if refreshed.email.is_some() {
                        entry.account.email = refreshed.email;
                    }
                    let account = entry.account.clone();
                    self.persist_account(&account).await;
                    info!(variant = self.variant.name, token_id, "Access token refreshed");
                }
                true
            }
            Err(err) if err.kills_account() => {
                self.disable_account(token_id, &format!("refresh failed: {err}"))
                    .await;
                false
            }
            Err(err) => {
                warn!(
                    variant = self.variant.name,
                    token_id, "Refresh failed transiently, skipping account: {err}"
                );
                false
            }
        }
    }

    /// Ensure the entry has a project id, bootstrapping if needed.
    async fn ensure_project(&mut self, token_id: &str) -> bool {
        if !self.variant.requires_project_id {
            return true;
        }
        let Some(entry) = self.pool.find(token_id) else {
            return false;
        };
        if entry.account.project_id.is_some() {
            return true;
        }

        let access_token = entry.account.access_token.clone();
        match fetch_project_id(&self.cfg.api_url, &access_token, &self.http).await {
            Ok(Some(project_id)) => {
                if let Some(entry) = self.pool.find_mut(token_id) {
                    entry.account.project_id = Some(project_id.clone());
                    let account = entry.account.clone();
                    self.persist_account(&account).await;
                    info!(
                        variant = self.variant.name,
                        token_id,
                        project_id = %account.project_id.as_deref().unwrap_or_default(),
                        "Companion project bootstrapped"
                    );
                }
                true
            }
            Ok(None) => {
                self.disable_account(token_id, "project bootstrap yielded no project id")
                    .await;
                false
            }
            Err(err) if err.kills_account() => {
                self.disable_account(token_id, &format!("project bootstrap failed: {err}"))
                    .await;
                false
            }
            Err(err) => {
                warn!(
                    variant = self.variant.name,
                    token_id, "Project bootstrap failed transiently, skipping account: {err}"
                );
                false
            }
        }
    }

    /// The `getToken` prepare loop: scan from `current_index`, readying each
    /// candidate; best-effort, at most one pass.
    async fn get_token(&mut self) -> Option<AccountLease> {
        let order: Vec<String> = self
            .pool
            .scan_order()
            .into_iter()
            .filter_map(|idx| self.pool.get(idx).map(|entry| entry.token_id.clone()))
            .collect();

        for token_id in order {
            if !self.ensure_fresh(&token_id).await {
                continue;
            }
            if !self.ensure_project(&token_id).await {
                continue;
            }
            let Some(selected) = self.pool.position(&token_id) else {
                continue;
            };
            let lease = Self::lease_for(self.pool.get(selected).expect("position just resolved"));
            self.pool.advance_after_success(selected);
            debug!(
                variant = self.variant.name,
                token_id = %lease.token_id,
                index = selected,
                "Account dispatched"
            );
            return Some(lease);
        }

        warn!(
            variant = self.variant.name,
            pool_len = self.pool.len(),
            "No available account"
        );
        None
    }

    fn summaries(&self) -> Vec<AccountSummary> {
        let buffer = self.refresh_buffer();
        self.pool
            .scan_order()
            .into_iter()
            .filter_map(|idx| self.pool.get(idx))
            .map(|entry| AccountSummary {
                token_id: entry.token_id.clone(),
                enable: entry.account.enable,
                expired: entry.account.is_expired(buffer),
                email: entry.account.email.clone(),
                project_id: entry.account.project_id.clone(),
                has_quota: entry.account.has_quota,
                request_count: self.pool.request_count(&entry.token_id),
            })
            .collect()
    }

    async fn reload_pool_from_store(&mut self) -> Result<(), CastorError> {
        let accounts = self.store.load_all().await?;
        let entries = accounts
            .into_iter()
            .filter(|account| account.enable)
            .map(|account| PoolEntry {
                token_id: self.store.token_id(&account.refresh_token),
                account,
            })
            .collect();
        self.pool.reload(entries);
        Ok(())
    }
}

struct AccountManagerActor;

pub struct AccountManagerArgs {
    pub variant: UpstreamVariant,
    pub cfg: Arc<ResolvedVariantConfig>,
    pub store: TokenStore,
    pub strategy: RotationStrategy,
}

#[ractor::async_trait]
impl Actor for AccountManagerActor {
    type Msg = AccountManagerMessage;
    type State = AccountManagerState;
    type Arguments = AccountManagerArgs;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let AccountManagerArgs {
            variant,
            cfg,
            store,
            strategy,
        } = args;

        let mut builder = reqwest::Client::builder()
            .user_agent(format!("{}-oauth/1.0", variant.name))
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30));
        if let Some(proxy_url) = cfg.proxy.clone() {
            let proxy = reqwest::Proxy::all(proxy_url.as_str())
                .map_err(|e| ActorProcessingErr::from(format!("invalid proxy url: {e}")))?;
            builder = builder.proxy(proxy);
        }
        let http = builder
            .build()
            .map_err(|e| ActorProcessingErr::from(format!("build OAuth client: {e}")))?;

        let mut state = AccountManagerState {
            variant,
            cfg,
            store,
            pool: RotationPool::new(strategy),
            http,
        };

        state
            .reload_pool_from_store()
            .await
            .map_err(|e| ActorProcessingErr::from(format!("load account store: {e}")))?;

        info!(
            variant = state.variant.name,
            accounts = state.pool.len(),
            "Account manager started"
        );

        // Concurrent refresh of everything already expired, with per-account
        // failure isolation. 400/403 results disable in one batch.
        let buffer = state.refresh_buffer();
        let jobs: Vec<RefreshJob> = state
            .pool
            .scan_order()
            .into_iter()
            .filter_map(|idx| state.pool.get(idx))
            .filter(|entry| entry.account.is_expired(buffer))
            .map(|entry| RefreshJob {
                token_id: entry.token_id.clone(),
                refresh_token: entry.account.refresh_token.clone(),
            })
            .collect();

        let outcomes =
            refresh_accounts_concurrently(&state.variant, jobs, &state.http, state.cfg.oauth_tps)
                .await;
        for outcome in outcomes {
            match outcome.result {
                Ok(refreshed) => {
                    if let Some(entry) = state.pool.find_mut(&outcome.token_id) {
                        entry
                            .account
                            .apply_refresh(refreshed.access_token, refreshed.expires_in);
                        if refreshed.email.is_some() {
                            entry.account.email = refreshed.email;
                        }
                        let account = entry.account.clone();
                        state.persist_account(&account).await;
                    }
                }
                Err(err) if err.kills_account() => {
                    state
                        .disable_account(&outcome.token_id, &format!("startup refresh: {err}"))
                        .await;
                }
                Err(err) => {
                    warn!(
                        variant = state.variant.name,
                        token_id = %outcome.token_id,
                        "Startup refresh failed transiently: {err}"
                    );
                }
            }
        }

        Ok(state)
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            AccountManagerMessage::GetToken(reply) => {
                let lease = state.get_token().await;
                let _ = reply.send(lease);
            }
            AccountManagerMessage::RecordRequest { token_id } => {
                state.pool.record_request(&token_id);
            }
            AccountManagerMessage::ReportQuotaExhausted { token_id } => {
                info!(
                    variant = state.variant.name,
                    token_id, "Quota exhausted reported"
                );
                state.pool.report_quota_exhausted(&token_id);
            }
            AccountManagerMessage::ReportInvalid { token_id } => {
                state
                    .disable_account(&token_id, "credential rejected by upstream")
                    .await;
            }
            AccountManagerMessage::UpdateRotation { strategy } => {
                info!(variant = state.variant.name, ?strategy, "Rotation policy updated");
                state.pool.set_strategy(strategy);
            }
            AccountManagerMessage::ListAccounts(reply) => {
                let _ = reply.send(state.summaries());
            }
            AccountManagerMessage::AddAccount {
                refresh_token,
                project_id,
                reply,
            } => {
                let result = handle_add_account(state, refresh_token, project_id).await;
                let _ = reply.send(result);
            }
            AccountManagerMessage::UpdateAccount {
                token_id,
                patch,
                reply,
            } => {
                let result = handle_update_account(state, &token_id, patch).await;
                let _ = reply.send(result);
            }
            AccountManagerMessage::DeleteAccount { token_id, reply } => {
                let result = handle_delete_account(state, &token_id).await;
                let _ = reply.send(result);
            }
            AccountManagerMessage::RefreshAccount { token_id, reply } => {
                let result = handle_refresh_account(state, &token_id).await;
                let _ = reply.send(result);
            }
            AccountManagerMessage::FetchProjectId { token_id, reply } => {
                let result = handle_fetch_project_id(state, &token_id).await;
                let _ = reply.send(result);
            }
            AccountManagerMessage::ExportAccounts(reply) => {
                let result = state.store.load_all().await.map_err(|e| e.to_string());
                let _ = reply.send(result);
            }
            AccountManagerMessage::ImportAccounts { accounts, reply } => {
                let result = handle_import_accounts(state, accounts).await;
                let _ = reply.send(result);
            }
        }
        Ok(())
    }
}

async fn handle_add_account(
    state: &mut AccountManagerState,
    refresh_token: String,
    project_id: Option<String>,
) -> Result<String, String> {
    let refresh_token = refresh_token.trim().to_string();
    if refresh_token.is_empty() {
        return Err("refresh_token must not be empty".to_string());
    }

    let mut account = Account::from_refresh_token(refresh_token.clone());
    account.project_id = project_id;
    let token_id = state.store.token_id(&refresh_token);

    let stored = account.clone();
    state
        .store
        .merge_write(move |mut all| {
            if !all.iter().any(|a| a.refresh_token == stored.refresh_token) {
                all.push(stored);
            }
            all
        })
        .await
        .map_err(|e| e.to_string())?;

    if state.pool.find(&token_id).is_none() {
        let mut entries: Vec<PoolEntry> = state
            .pool
            .scan_order()
            .into_iter()
            .filter_map(|idx| state.pool.get(idx).cloned())
            .collect();
        entries.push(PoolEntry {
            token_id: token_id.clone(),
            account,
        });
        state.pool.reload(entries);
    }

    info!(variant = state.variant.name, token_id = %token_id, "Account added");
    Ok(token_id)
}

async fn handle_update_account(
    state: &mut AccountManagerState,
    token_id: &str,
    patch: AccountPatch,
) -> Result<(), String> {
    // Apply to the persistent copy first, then mirror into the pool.
    let all = state.store.load_all().await.map_err(|e| e.to_string())?;
    let Some(mut account) = all
        .into_iter()
        .find(|a| state.store.token_id(&a.refresh_token) == token_id)
    else {
        return Err(format!("unknown token id: {token_id}"));
    };

    if let Some(enable) = patch.enable {
        account.enable = enable;
    }
    if let Some(project_id) = patch.project_id {
        account.project_id = Some(project_id);
    }
    if let Some(has_quota) = patch.has_quota {
        account.has_quota = Some(has_quota);
    }

    state.persist_account(&account).await;

    if account.enable {
        match state.pool.find_mut(token_id) {
            Some(entry) => entry.account = account,
            None => {
                let mut entries: Vec<PoolEntry> = state
                    .pool
                    .scan_order()
                    .into_iter()
                    .filter_map(|idx| state.pool.get(idx).cloned())
                    .collect();
                entries.push(PoolEntry {
                    token_id: token_id.to_string(),
                    account,
                });
                state.pool.reload(entries);
            }
        }
    } else {
        state.pool.disable(token_id);
    }
    Ok(())
}

async fn handle_delete_account(
    state: &mut AccountManagerState,
    token_id: &str,
) -> Result<(), String> {
    state.pool.disable(token_id);

    let all = state.store.load_all().await.map_err(|e| e.to_string())?;
    let Some(refresh_token) = all
        .into_iter()
        .map(|a| a.refresh_token)
        .find(|rt| state.store.token_id(rt) == token_id)
    else {
        return Err(format!("unknown token id: {token_id}"));
    };

    state
        .store
        .merge_write(move |mut all| {
            all.retain(|a| a.refresh_token != refresh_token);
            all
        })
        .await
        .map_err(|e| e.to_string())?;

    info!(variant = state.variant.name, token_id, "Account deleted");
    Ok(())
}

async fn handle_refresh_account(
    state: &mut AccountManagerState,
    token_id: &str,
) -> Result<(), RefreshFailure> {
    let Some(refresh_token) = state
        .pool
        .find(token_id)
        .map(|entry| entry.account.refresh_token.clone())
    else {
        return Err(RefreshFailure {
            status: None,
            message: format!("unknown token id: {token_id}"),
        });
    };

    match refresh_access_token(&state.variant, &refresh_token, &state.http).await {
        Ok(refreshed) => {
            if let Some(entry) = state.pool.find_mut(token_id) {
                entry
                    .account
                    .apply_refresh(refreshed.access_token, refreshed.expires_in);
                if refreshed.email.is_some() {
                    entry.account.email = refreshed.email;
                }
                let account = entry.account.clone();
                state.persist_account(&account).await;
            }
            Ok(())
        }
        Err(err) => {
            let failure = RefreshFailure {
                status: err.status(),
                message: err.to_string(),
            };
            if err.kills_account() {
                state.disable_account(token_id, &failure.message).await;
            }
            Err(failure)
        }
    }
}

async fn handle_fetch_project_id(
    state: &mut AccountManagerState,
    token_id: &str,
) -> Result<Option<String>, String> {
    if !state.ensure_fresh(token_id).await {
        return Err(format!("account not usable: {token_id}"));
    }
    let Some(entry) = state.pool.find(token_id) else {
        return Err(format!("unknown token id: {token_id}"));
    };

    let access_token = entry.account.access_token.clone();
    match fetch_project_id(&state.cfg.api_url, &access_token, &state.http).await {
        Ok(Some(project_id)) => {
            if let Some(entry) = state.pool.find_mut(token_id) {
                entry.account.project_id = Some(project_id.clone());
                let account = entry.account.clone();
                state.persist_account(&account).await;
            }
            Ok(Some(project_id))
        }
        Ok(None) => Ok(None),
        Err(err) => Err(err.to_string()),
    }
}

async fn handle_import_accounts(
    state: &mut AccountManagerState,
    accounts: Vec<Account>,
) -> Result<usize, String> {
    let imported = accounts.len();
    state
        .store
        .merge_write(move |mut all| {
            for incoming in accounts {
                match all
                    .iter_mut()
                    .find(|a| a.refresh_token == incoming.refresh_token)
                {
                    Some(existing) => *existing = incoming,
                    None => all.push(incoming),
                }
            }
            all
        })
        .await
        .map_err(|e| e.to_string())?;

    state
        .reload_pool_from_store()
        .await
        .map_err(|e| e.to_string())?;
    info!(
        variant = state.variant.name,
        imported,
        active = state.pool.len(),
        "Accounts imported"
    );
    Ok(imported)
}

/// Spawn one manager actor and return its handle.
pub async fn spawn(args: AccountManagerArgs) -> AccountManagerHandle {
    let name = format!("{}-accounts", args.variant.name);
    let (actor, _jh) = Actor::spawn(Some(name), AccountManagerActor, args)
        .await
        .expect("failed to spawn account manager actor");
    AccountManagerHandle { actor }
}
