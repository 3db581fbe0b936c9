use castor::accounts::{self, Account, AccountManagerArgs, AccountPatch, RotationStrategy};
use castor::config::Config;
use castor::store::TokenStore;
use chrono::Utc;
use std::sync::Arc;

fn healthy_account(refresh_token: &str, project_id: &str) -> Account {
    let mut account = Account::from_refresh_token(refresh_token);
    account.access_token = format!("at-{refresh_token}");
    account.expires_in = 3600;
    account.timestamp = Utc::now().timestamp_millis();
    account.project_id = Some(project_id.to_string());
    account
}

// NOTE: account-manager actors register by a fixed per-variant name within a
// process. Keep this test file to a single test.
#[tokio::test]
async fn admin_surface_manages_accounts_by_token_id() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = TokenStore::open(dir.path(), accounts::GEMINICLI.store_file, None)
        .await
        .expect("open store");

    let cfg = Config::default();
    let manager = accounts::spawn(AccountManagerArgs {
        variant: accounts::GEMINICLI,
        cfg: Arc::new(cfg.geminicli()),
        store,
        strategy: RotationStrategy::RoundRobin,
    })
    .await;

    // Import two ready accounts; no refresh needed, no network touched.
    let imported = manager
        .import_accounts(vec![
            healthy_account("rt1", "proj-1"),
            healthy_account("rt2", "proj-2"),
        ])
        .await
        .expect("import");
    assert_eq!(imported, 2);

    // Listing shows opaque token ids, never raw refresh tokens.
    let summaries = manager.list_accounts().await.expect("list");
    assert_eq!(summaries.len(), 2);
    for summary in &summaries {
        assert!(!summary.token_id.contains("rt1"));
        assert!(!summary.token_id.contains("rt2"));
        assert!(summary.enable);
        assert!(!summary.expired);
    }

    // A dispatched lease carries the bootstrapped project id.
    let lease = manager
        .get_token()
        .await
        .expect("GetToken should not error")
        .expect("account available");
    assert!(lease.project_id.is_some());

    // Disabling by token id removes the account from rotation and persists.
    let first_id = summaries[0].token_id.clone();
    manager
        .update_account(
            first_id.clone(),
            AccountPatch {
                enable: Some(false),
                ..Default::default()
            },
        )
        .await
        .expect("update");

    let remaining = manager.list_accounts().await.expect("list");
    assert_eq!(remaining.len(), 1);
    assert_ne!(remaining[0].token_id, first_id);

    let exported = manager.export_accounts().await.expect("export");
    let disabled = exported
        .iter()
        .find(|account| !account.enable)
        .expect("disabled account persisted");
    assert!(disabled.project_id.is_some());

    // Round-robin across the remaining single account still dispenses it,
    // and never the disabled one.
    for _ in 0..3 {
        let lease = manager
            .get_token()
            .await
            .expect("GetToken should not error")
            .expect("account available");
        assert_eq!(lease.token_id.as_ref(), remaining[0].token_id.as_str());
    }

    // Delete the remaining account; the pool is empty again.
    manager
        .delete_account(remaining[0].token_id.clone())
        .await
        .expect("delete");
    let lease = manager.get_token().await.expect("GetToken should not error");
    assert!(lease.is_none());
}
