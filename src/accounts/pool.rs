use super::resource::Account;
use crate::config::RotationStrategyName;
use std::collections::HashMap;

/// How `current_index` advances after a successful dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationStrategy {
    /// Advance by one per call.
    RoundRobin,
    /// Advance only after the current account has served `n` requests,
    /// then reset its counter.
    RequestCount(u32),
    /// Never advance on success; the caller reports quota exhaustion.
    QuotaExhausted,
}

impl RotationStrategy {
    pub fn from_config(name: RotationStrategyName, request_count: u32) -> Self {
        match name {
            RotationStrategyName::RoundRobin => RotationStrategy::RoundRobin,
            RotationStrategyName::RequestCount => RotationStrategy::RequestCount(request_count.max(1)),
            RotationStrategyName::QuotaExhausted => RotationStrategy::QuotaExhausted,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PoolEntry {
    pub token_id: String,
    pub account: Account,
}

/// Core rotation state for one account pool (no IO, no locks).
///
/// Holds only enabled accounts; `current_index` always stays within
/// `[0, len)` (0 when empty). Disabled accounts leave the pool immediately
/// and can never be yielded again.
pub struct RotationPool {
    entries: Vec<PoolEntry>,
    current_index: usize,
    request_counts: HashMap<String, u32>,
    strategy: RotationStrategy,
}

impl RotationPool {
    pub fn new(strategy: RotationStrategy) -> Self {
        Self {
            entries: Vec::new(),
            current_index: 0,
            request_counts: HashMap::new(),
            strategy,
        }
    }

    /// Atomically replace the active list. In-flight leases against removed
    /// accounts stay valid; they just won't be handed out again.
    pub fn reload(&mut self, entries: Vec<PoolEntry>) {
        self.entries = entries;
        self.entries.retain(|entry| entry.account.enable);
        self.clamp_index();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn strategy(&self) -> RotationStrategy {
        self.strategy
    }

    /// Swap the rotation policy; only the counters are reset.
    pub fn set_strategy(&mut self, strategy: RotationStrategy) {
        self.strategy = strategy;
        self.request_counts.clear();
    }

    /// Scan order for one `getToken` pass: every index once, starting at
    /// `current_index`.
    pub fn scan_order(&self) -> Vec<usize> {
        let len = self.entries.len();
        (0..len).map(|offset| (self.current_index + offset) % len).collect()
    }

    pub fn get(&self, index: usize) -> Option<&PoolEntry> {
        self.entries.get(index)
    }

    pub fn find(&self, token_id: &str) -> Option<&PoolEntry> {
        self.entries.iter().find(|entry| entry.token_id == token_id)
    }

    pub fn position(&self, token_id: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.token_id == token_id)
    }

    pub fn find_mut(&mut self, token_id: &str) -> Option<&mut PoolEntry> {
        self.entries.iter_mut().find(|entry| entry.token_id == token_id)
    }

    /// Remove an account from the active list. Returns the removed entry so
    /// the caller can persist `enable = false`.
    pub fn disable(&mut self, token_id: &str) -> Option<PoolEntry> {
        let position = self.entries.iter().position(|entry| entry.token_id == token_id)?;
        let mut removed = self.entries.remove(position);
        removed.account.enable = false;
        self.request_counts.remove(token_id);
        if position < self.current_index {
            self.current_index -= 1;
        }
        self.clamp_index();
        Some(removed)
    }

    /// Advance `current_index` after a successful dispatch of the account at
    /// `selected`, per strategy.
    pub fn advance_after_success(&mut self, selected: usize) {
        if self.entries.is_empty() {
            self.current_index = 0;
            return;
        }
        match self.strategy {
            RotationStrategy::RoundRobin => {
                self.current_index = (selected + 1) % self.entries.len();
            }
            RotationStrategy::RequestCount(limit) => {
                let Some(token_id) = self.entries.get(selected).map(|e| e.token_id.clone()) else {
                    return;
                };
                let served = self.request_counts.get(&token_id).copied().unwrap_or(0);
                if served >= limit {
                    self.request_counts.remove(&token_id);
                    self.current_index = (selected + 1) % self.entries.len();
                } else {
                    self.current_index = selected;
                }
            }
            RotationStrategy::QuotaExhausted => {
                self.current_index = selected;
            }
        }
    }

    /// Caller-reported successful request; drives the `request_count`
    /// strategy. Counted once per logical request, not per retry attempt.
    pub fn record_request(&mut self, token_id: &str) {
        *self.request_counts.entry(token_id.to_string()).or_insert(0) += 1;
    }

    pub fn request_count(&self, token_id: &str) -> u32 {
        self.request_counts.get(token_id).copied().unwrap_or(0)
    }

    /// Caller observed a 429 / quota-exhausted error on the current account;
    /// under `quota_exhausted` this is what moves the pool forward.
    pub fn report_quota_exhausted(&mut self, token_id: &str) {
        if self.strategy != RotationStrategy::QuotaExhausted {
            return;
        }
        if let Some(entry) = self.find_mut(token_id) {
            entry.account.has_quota = Some(false);
        }
        if !self.entries.is_empty() {
            self.current_index = (self.current_index + 1) % self.entries.len();
        }
    }

    fn clamp_index(&mut self) {
        if self.entries.is_empty() {
            self.current_index = 0;
        } else if self.current_index >= self.entries.len() {
            self.current_index = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn healthy(token_id: &str) -> PoolEntry {
        let mut account = Account::from_refresh_token(format!("rt-{token_id}"));
        account.apply_refresh("at".to_string(), 3600);
        PoolEntry {
            token_id: token_id.to_string(),
            account,
        }
    }

    fn pool_with(strategy: RotationStrategy, ids: &[&str]) -> RotationPool {
        let mut pool = RotationPool::new(strategy);
        pool.reload(ids.iter().map(|id| healthy(id)).collect());
        pool
    }

    /// Simulates the manager's selection loop: pick the first scannable
    /// entry, advance, return which account served.
    fn dispatch(pool: &mut RotationPool) -> String {
        let selected = pool.scan_order()[0];
        let token_id = pool.get(selected).unwrap().token_id.clone();
        pool.record_request(&token_id);
        pool.advance_after_success(selected);
        token_id
    }

    #[test]
    fn round_robin_is_fair_over_full_cycles() {
        let mut pool = pool_with(RotationStrategy::RoundRobin, &["a", "b", "c"]);
        let mut served: HashMap<String, u32> = HashMap::new();
        for _ in 0..12 {
            *served.entry(dispatch(&mut pool)).or_insert(0) += 1;
        }
        assert_eq!(served["a"], 4);
        assert_eq!(served["b"], 4);
        assert_eq!(served["c"], 4);
    }

    #[test]
    fn request_count_sticks_until_threshold() {
        let mut pool = pool_with(RotationStrategy::RequestCount(3), &["a", "b"]);
        let sequence: Vec<String> = (0..8).map(|_| dispatch(&mut pool)).collect();
        assert_eq!(sequence, ["a", "a", "a", "b", "b", "b", "a", "a"]);
        // Counter was reset when rotating away.
        assert_eq!(pool.request_count("a"), 2);
    }

    #[test]
    fn quota_exhausted_never_advances_on_success() {
        let mut pool = pool_with(RotationStrategy::QuotaExhausted, &["a", "b"]);
        for _ in 0..5 {
            assert_eq!(dispatch(&mut pool), "a");
        }
        pool.report_quota_exhausted("a");
        assert_eq!(dispatch(&mut pool), "b");
        assert_eq!(pool.find("a").unwrap().account.has_quota, Some(false));
    }

    #[test]
    fn quota_report_is_ignored_under_other_strategies() {
        let mut pool = pool_with(RotationStrategy::RoundRobin, &["a", "b"]);
        pool.report_quota_exhausted("a");
        assert_eq!(pool.current_index(), 0);
    }

    #[test]
    fn disabled_account_is_never_returned_again() {
        let mut pool = pool_with(RotationStrategy::RoundRobin, &["a", "b", "c"]);
        let removed = pool.disable("b").unwrap();
        assert!(!removed.account.enable);
        assert_eq!(pool.len(), 2);
        for _ in 0..10 {
            assert_ne!(dispatch(&mut pool), "b");
        }
    }

    #[test]
    fn disable_keeps_index_in_bounds() {
        let mut pool = pool_with(RotationStrategy::RoundRobin, &["a", "b", "c"]);
        dispatch(&mut pool); // index -> 1
        dispatch(&mut pool); // index -> 2
        pool.disable("c");
        assert!(pool.current_index() < pool.len());
        pool.disable("a");
        pool.disable("b");
        assert_eq!(pool.current_index(), 0);
        assert!(pool.is_empty());
    }

    #[test]
    fn reload_drops_disabled_accounts() {
        let mut disabled = healthy("d");
        disabled.account.enable = false;
        let mut pool = RotationPool::new(RotationStrategy::RoundRobin);
        pool.reload(vec![healthy("a"), disabled]);
        assert_eq!(pool.len(), 1);
        assert!(pool.find("d").is_none());
    }

    #[test]
    fn set_strategy_clears_counters_only() {
        let mut pool = pool_with(RotationStrategy::RequestCount(5), &["a", "b"]);
        dispatch(&mut pool);
        assert_eq!(pool.request_count("a"), 1);
        pool.set_strategy(RotationStrategy::RoundRobin);
        assert_eq!(pool.request_count("a"), 0);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn scan_order_starts_at_current_index() {
        let mut pool = pool_with(RotationStrategy::RoundRobin, &["a", "b", "c"]);
        dispatch(&mut pool);
        assert_eq!(pool.scan_order(), vec![1, 2, 0]);
    }
}
