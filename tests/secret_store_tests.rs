//! Secret store: encryption at rest, exclusive activation, rotation and
//! credential testing.

mod test_utils;

use std::sync::Arc;
use std::time::Duration;

use provisioning::connectors::AdapterFactory;
use provisioning::crypto::{CryptoKey, Vault};
use provisioning::error::EngineError;
use provisioning::models::ProviderTag;
use provisioning::models::secret_bundle;
use provisioning::repositories::SecretBundleRepository;
use provisioning::secrets::{SecretStore, TestOutcome};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use test_utils::{ACTOR, Script, ScriptedFactory, sample_secrets};

fn vault(active: (u8, &str), retired: &[(u8, &str)]) -> Arc<Vault> {
    let mut vault = Vault::new(active.0, CryptoKey::derive(active.1).unwrap());
    for (id, secret) in retired {
        vault = vault.with_retired_key(*id, CryptoKey::derive(secret).unwrap());
    }
    Arc::new(vault)
}

fn store_with(db: &DatabaseConnection, vault: Arc<Vault>, factory: Arc<ScriptedFactory>) -> SecretStore {
    let factory: Arc<dyn AdapterFactory> = factory;
    SecretStore::new(db.clone(), vault, factory, Duration::from_millis(300))
}

async fn active_count(db: &DatabaseConnection, provider: ProviderTag) -> usize {
    secret_bundle::Entity::find()
        .filter(secret_bundle::Column::Provider.eq(provider.as_str()))
        .filter(secret_bundle::Column::IsActive.eq(true))
        .all(db)
        .await
        .unwrap()
        .len()
}

#[tokio::test]
async fn test_bundles_are_stored_encrypted_and_inactive() {
    let db = test_utils::setup_test_db().await.unwrap();
    let store = store_with(&db, vault((1, "key-one"), &[]), ScriptedFactory::new());

    let bundle = store
        .create(ProviderTag::Slack, &sample_secrets(), ACTOR)
        .await
        .unwrap();
    assert!(!bundle.is_active);
    assert_ne!(bundle.client_secret, "client-secret");
    assert_ne!(bundle.bot_token.as_deref(), Some("xoxb-test"));
    assert!(bundle.user_token.is_none());

    let err = store.get_active(ProviderTag::Slack).await.unwrap_err();
    assert!(matches!(err, EngineError::NotConfigured { .. }));
    assert!(!store.has_active(ProviderTag::Slack).await.unwrap());

    store.activate(bundle.id, ACTOR).await.unwrap();
    let plain = store.get_active(ProviderTag::Slack).await.unwrap();
    assert_eq!(plain.client_secret, "client-secret");
    assert_eq!(plain.bot_token.as_deref(), Some("xoxb-test"));
}

#[tokio::test]
async fn test_missing_required_field_is_rejected() {
    let db = test_utils::setup_test_db().await.unwrap();
    let store = store_with(&db, vault((1, "key-one"), &[]), ScriptedFactory::new());

    let mut incomplete = sample_secrets();
    incomplete.signing_secret = String::new();
    let err = store
        .create(ProviderTag::Google, &incomplete, ACTOR)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn test_activation_leaves_exactly_one_active_bundle() {
    let db = test_utils::setup_test_db().await.unwrap();
    let store = store_with(&db, vault((1, "key-one"), &[]), ScriptedFactory::new());

    let first = store.create(ProviderTag::Google, &sample_secrets(), ACTOR).await.unwrap();
    let mut second_plain = sample_secrets();
    second_plain.client_id = "second-client".to_string();
    let second = store.create(ProviderTag::Google, &second_plain, ACTOR).await.unwrap();
    let other = store.create(ProviderTag::Slack, &sample_secrets(), ACTOR).await.unwrap();

    store.activate(first.id, ACTOR).await.unwrap();
    store.activate(other.id, ACTOR).await.unwrap();
    store.activate(second.id, ACTOR).await.unwrap();

    assert_eq!(active_count(&db, ProviderTag::Google).await, 1);
    assert_eq!(active_count(&db, ProviderTag::Slack).await, 1);
    let active = store.get_active(ProviderTag::Google).await.unwrap();
    assert_eq!(active.client_id, "second-client");
}

#[tokio::test]
async fn test_concurrent_activations_never_leave_two_active() {
    let db = test_utils::setup_test_db().await.unwrap();
    let store = store_with(&db, vault((1, "key-one"), &[]), ScriptedFactory::new());

    let mut ids = Vec::new();
    for _ in 0..4 {
        ids.push(
            store
                .create(ProviderTag::Github, &sample_secrets(), ACTOR)
                .await
                .unwrap()
                .id,
        );
    }

    let handles: Vec<_> = ids
        .iter()
        .map(|id| {
            let store = store.clone();
            let id = *id;
            tokio::spawn(async move { store.activate(id, ACTOR).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(active_count(&db, ProviderTag::Github).await, 1);
}

#[tokio::test]
async fn test_update_keeps_provider_and_active_flag() {
    let db = test_utils::setup_test_db().await.unwrap();
    let store = store_with(&db, vault((1, "key-one"), &[]), ScriptedFactory::new());
    let bundle = store.create(ProviderTag::Slack, &sample_secrets(), ACTOR).await.unwrap();
    store.activate(bundle.id, ACTOR).await.unwrap();

    let mut rotated = sample_secrets();
    rotated.client_secret = "new-secret".to_string();
    let updated = store
        .update(bundle.id, Some(ProviderTag::Slack), &rotated, ACTOR)
        .await
        .unwrap();
    assert!(updated.is_active);
    assert_eq!(
        store.get_active(ProviderTag::Slack).await.unwrap().client_secret,
        "new-secret"
    );

    let err = store
        .update(bundle.id, Some(ProviderTag::Google), &rotated, ACTOR)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn test_deleting_the_active_bundle_unconfigures_the_provider() {
    let db = test_utils::setup_test_db().await.unwrap();
    let store = store_with(&db, vault((1, "key-one"), &[]), ScriptedFactory::new());
    let bundle = store.create(ProviderTag::Slack, &sample_secrets(), ACTOR).await.unwrap();
    store.activate(bundle.id, ACTOR).await.unwrap();

    store.delete(bundle.id, ACTOR).await.unwrap();
    assert!(!store.has_active(ProviderTag::Slack).await.unwrap());

    let err = store.delete(bundle.id, ACTOR).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound { .. }));
}

#[tokio::test]
async fn test_wrong_key_is_an_integrity_error_not_plaintext() {
    let db = test_utils::setup_test_db().await.unwrap();
    let writer = store_with(&db, vault((1, "key-one"), &[]), ScriptedFactory::new());
    let bundle = writer.create(ProviderTag::Google, &sample_secrets(), ACTOR).await.unwrap();
    writer.activate(bundle.id, ACTOR).await.unwrap();

    let reader = store_with(&db, vault((1, "some-other-key"), &[]), ScriptedFactory::new());
    let err = reader.get_active(ProviderTag::Google).await.unwrap_err();
    assert!(matches!(err, EngineError::Integrity(_)));

    let err = reader.activate(bundle.id, ACTOR).await.unwrap_err();
    assert!(matches!(err, EngineError::Integrity(_)));
}

#[tokio::test]
async fn test_rotation_reencrypts_under_the_active_key() {
    let db = test_utils::setup_test_db().await.unwrap();
    let old = store_with(&db, vault((1, "key-one"), &[]), ScriptedFactory::new());
    let bundle = old.create(ProviderTag::Slack, &sample_secrets(), ACTOR).await.unwrap();
    old.activate(bundle.id, ACTOR).await.unwrap();

    let new = store_with(&db, vault((2, "key-two"), &[(1, "key-one")]), ScriptedFactory::new());
    let report = new.rotate(ACTOR).await.unwrap();
    assert_eq!(report.rotated, 1);
    assert_eq!(report.current, 0);
    assert!(report.failed.is_empty());

    let again = new.rotate(ACTOR).await.unwrap();
    assert_eq!(again.rotated, 0);
    assert_eq!(again.current, 1);

    // The retired key is no longer needed.
    let only_new = store_with(&db, vault((2, "key-two"), &[]), ScriptedFactory::new());
    let plain = only_new.get_active(ProviderTag::Slack).await.unwrap();
    assert_eq!(plain.client_secret, "client-secret");

    let stored = SecretBundleRepository::find_by_id(&db, bundle.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(Vault::stored_key_id(&stored.client_secret).unwrap(), 2);
}

#[tokio::test]
async fn test_rotation_reports_bundles_no_key_opens() {
    let db = test_utils::setup_test_db().await.unwrap();
    let old = store_with(&db, vault((1, "key-one"), &[]), ScriptedFactory::new());
    let bundle = old.create(ProviderTag::Slack, &sample_secrets(), ACTOR).await.unwrap();

    let new = store_with(&db, vault((2, "key-two"), &[]), ScriptedFactory::new());
    let report = new.rotate(ACTOR).await.unwrap();
    assert_eq!(report.rotated, 0);
    assert_eq!(report.failed, vec![bundle.id]);
}

#[tokio::test]
async fn test_credential_test_is_three_way_and_stores_nothing() {
    let db = test_utils::setup_test_db().await.unwrap();
    let factory = ScriptedFactory::new();
    factory.script(ProviderTag::Slack, Script::GroupsForbidden);
    factory.script(ProviderTag::Github, Script::Fail("unauthorized"));
    let store = store_with(&db, vault((1, "key-one"), &[]), factory);

    let ok = store.test(ProviderTag::Google, &sample_secrets()).await.unwrap();
    assert_eq!(ok.outcome, TestOutcome::Success);

    let partial = store.test(ProviderTag::Slack, &sample_secrets()).await.unwrap();
    assert_eq!(partial.outcome, TestOutcome::Partial);
    assert!(partial.checks.iter().any(|c| !c.ok && c.name == "list_groups"));

    let failed = store.test(ProviderTag::Github, &sample_secrets()).await.unwrap();
    assert_eq!(failed.outcome, TestOutcome::Failed);

    let mut unusable = sample_secrets();
    unusable.client_secret = "unusable".to_string();
    let rejected = store.test(ProviderTag::Google, &unusable).await.unwrap();
    assert_eq!(rejected.outcome, TestOutcome::Failed);
    assert_eq!(rejected.checks[0].name, "configuration");

    assert!(secret_bundle::Entity::find().all(&db).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_hanging_provider_fails_the_test_within_the_timeout() {
    let db = test_utils::setup_test_db().await.unwrap();
    let factory = ScriptedFactory::new();
    factory.script(ProviderTag::Microsoft, Script::Hang);
    let store = store_with(&db, vault((1, "key-one"), &[]), factory);

    let report = store
        .test(ProviderTag::Microsoft, &sample_secrets())
        .await
        .unwrap();
    assert_eq!(report.outcome, TestOutcome::Failed);
}
