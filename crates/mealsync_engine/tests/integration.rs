//! Integration tests for the sync engine against the reference server.

use chrono::NaiveDate;
use mealsync_engine::{
    BabyEntity, BabyPrivateFields, HttpRemote, LoopbackClient, LoopbackServer, MealPeriod,
    MemoryStore, PlanEntity, RecipeEntity, RetryConfig, SyncConfig, SyncEngine, SyncError,
    SyncOutcome, SyncReport, SyncStatus,
};
use mealsync_protocol::{ConflictPolicy, ConflictResolution, EntityKind};
use mealsync_server::{ServerConfig, SyncServer};
use std::sync::Arc;

/// Forwards loopback requests to an in-memory server.
struct ServerHandle(Arc<SyncServer>);

impl LoopbackServer for ServerHandle {
    fn handle(&self, method: &str, path: &str, body: &[u8]) -> Result<Vec<u8>, String> {
        self.0.handle_request(method, path, body)
    }
}

type Remote = HttpRemote<LoopbackClient<ServerHandle>>;

/// One client device: an engine over its own store.
struct Device {
    engine: SyncEngine<Remote, MemoryStore>,
    store: Arc<MemoryStore>,
}

impl Device {
    fn new(server: &Arc<SyncServer>, policy: ConflictPolicy) -> Self {
        let config = SyncConfig::new("memory://local")
            .with_conflict_policy(policy)
            .with_retry(RetryConfig::no_retry());
        let remote = Arc::new(HttpRemote::new(
            "memory://local",
            LoopbackClient::new(ServerHandle(Arc::clone(server))),
        ));
        let store = Arc::new(MemoryStore::new());
        let engine = SyncEngine::new(config, remote, Arc::clone(&store));
        Self { engine, store }
    }

    async fn sync(&self) -> SyncReport {
        match self.engine.sync().await {
            SyncOutcome::Success { report, .. } => report,
            other => panic!("sync failed: {other:?}"),
        }
    }

    fn recipe(&self, cloud_id: &str) -> Option<RecipeEntity> {
        self.store
            .all::<RecipeEntity>()
            .into_iter()
            .find(|r| r.meta.cloud_id.as_deref() == Some(cloud_id))
    }
}

fn server(config: ServerConfig) -> Arc<SyncServer> {
    Arc::new(SyncServer::new(config))
}

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, day).unwrap()
}

#[tokio::test]
async fn push_from_one_device_pull_on_another() {
    let server = server(ServerConfig::default());
    let phone = Device::new(&server, ConflictPolicy::RemoteWins);
    let tablet = Device::new(&server, ConflictPolicy::RemoteWins);

    let recipe = phone.store.create(RecipeEntity::new("Rice porridge", 6, 12));
    phone
        .store
        .create(PlanEntity::new(recipe.id, date(2), MealPeriod::Lunch));

    let report = phone.sync().await;
    assert_eq!(report.pushed, 2);
    assert_eq!(server.document_count(EntityKind::Recipe), 1);
    assert_eq!(server.document_count(EntityKind::Plan), 1);

    let pushed = phone.store.fetch::<RecipeEntity>(recipe.id).unwrap();
    assert_eq!(pushed.meta.sync_status, SyncStatus::Synced);
    assert_eq!(pushed.meta.version, 2);
    let cloud_id = pushed.meta.cloud_id.clone().unwrap();
    assert_eq!(server.version_of(EntityKind::Recipe, &cloud_id), Some(2));

    let report = tablet.sync().await;
    assert_eq!(report.inserted, 2);
    assert!(report.entity_errors.is_empty());

    let copy = tablet.recipe(&cloud_id).unwrap();
    assert_eq!(copy.name, "Rice porridge");
    assert_eq!(copy.meta.version, 2);
    let plans = tablet.store.all::<PlanEntity>();
    assert_eq!(plans.len(), 1);
    assert_eq!(plans[0].recipe_id, copy.id);
    assert_eq!(plans[0].meal_period, MealPeriod::Lunch);

    // Nothing changed since the checkpoint.
    let report = tablet.sync().await;
    assert_eq!(report.pulled_total(), 0);
    assert_eq!(report.pushed, 0);
}

#[tokio::test]
async fn stale_edit_is_a_conflict_and_is_not_overwritten() {
    let server = server(ServerConfig::default());
    let phone = Device::new(&server, ConflictPolicy::Manual);
    let tablet = Device::new(&server, ConflictPolicy::RemoteWins);

    let recipe = phone.store.create(RecipeEntity::new("Rice porridge", 6, 12));
    phone.sync().await;
    let cloud_id = phone
        .store
        .fetch::<RecipeEntity>(recipe.id)
        .and_then(|r| r.meta.cloud_id)
        .unwrap();

    // Tablet moves the remote copy to version 3, phone catches up.
    tablet.sync().await;
    let tablet_id = tablet.recipe(&cloud_id).unwrap().id;
    tablet
        .store
        .edit::<RecipeEntity>(tablet_id, |r| r.name = "Millet porridge".into())
        .unwrap();
    tablet.sync().await;
    phone.sync().await;
    assert_eq!(phone.recipe(&cloud_id).unwrap().meta.version, 3);

    // Tablet moves it to 4 while the phone edits its version 3.
    tablet
        .store
        .edit::<RecipeEntity>(tablet_id, |r| r.name = "Oat porridge".into())
        .unwrap();
    tablet.sync().await;
    phone
        .store
        .edit::<RecipeEntity>(recipe.id, |r| r.name = "Rice porridge with pear".into())
        .unwrap();

    let report = phone.sync().await;
    assert_eq!(report.conflicts.len(), 1);
    let conflict = &report.conflicts[0];
    assert_eq!(conflict.conflict.local_version, 3);
    assert_eq!(conflict.conflict.remote_version, 4);
    assert_eq!(conflict.resolution, ConflictResolution::Defer);
    assert_eq!(report.pushed, 0);

    let local = phone.store.fetch::<RecipeEntity>(recipe.id).unwrap();
    assert_eq!(local.name, "Rice porridge with pear");
    assert_eq!(local.meta.sync_status, SyncStatus::Conflict);
    assert_eq!(local.meta.version, 3);
    assert_eq!(server.documents().recipe(&cloud_id).unwrap().name, "Oat porridge");

    // The user keeps the local edit; it goes out against version 4.
    phone
        .engine
        .resolve_conflict(EntityKind::Recipe, &cloud_id, ConflictResolution::KeepLocal)
        .await
        .unwrap();
    let report = phone.sync().await;
    assert_eq!(report.pushed, 1);
    assert_eq!(server.version_of(EntityKind::Recipe, &cloud_id), Some(5));

    tablet.sync().await;
    let copy = tablet.recipe(&cloud_id).unwrap();
    assert_eq!(copy.name, "Rice porridge with pear");
    assert_eq!(copy.meta.version, 5);
}

#[tokio::test]
async fn remote_wins_replaces_stale_edit() {
    let server = server(ServerConfig::default());
    let phone = Device::new(&server, ConflictPolicy::RemoteWins);
    let tablet = Device::new(&server, ConflictPolicy::RemoteWins);

    let recipe = phone.store.create(RecipeEntity::new("Rice porridge", 6, 12));
    phone.sync().await;
    tablet.sync().await;

    let cloud_id = phone
        .store
        .fetch::<RecipeEntity>(recipe.id)
        .and_then(|r| r.meta.cloud_id)
        .unwrap();
    let tablet_id = tablet.recipe(&cloud_id).unwrap().id;
    tablet
        .store
        .edit::<RecipeEntity>(tablet_id, |r| r.name = "Oat porridge".into())
        .unwrap();
    tablet.sync().await;

    phone
        .store
        .edit::<RecipeEntity>(recipe.id, |r| r.name = "Stale rename".into())
        .unwrap();
    let report = phone.sync().await;

    assert_eq!(report.conflicts.len(), 1);
    assert_eq!(report.conflicts[0].resolution, ConflictResolution::AcceptRemote);
    let local = phone.store.fetch::<RecipeEntity>(recipe.id).unwrap();
    assert_eq!(local.name, "Oat porridge");
    assert_eq!(local.meta.sync_status, SyncStatus::Synced);
    assert_eq!(local.meta.version, 3);
    assert_eq!(server.version_of(EntityKind::Recipe, &cloud_id), Some(3));
}

#[tokio::test]
async fn deletes_propagate_as_tombstones() {
    let server = server(ServerConfig::default());
    let phone = Device::new(&server, ConflictPolicy::RemoteWins);
    let tablet = Device::new(&server, ConflictPolicy::RemoteWins);

    let recipe = phone.store.create(RecipeEntity::new("Rice porridge", 6, 12));
    phone.sync().await;
    tablet.sync().await;
    assert_eq!(tablet.store.count(EntityKind::Recipe), 1);

    phone
        .store
        .soft_delete(EntityKind::Recipe, recipe.id)
        .unwrap();
    let report = phone.sync().await;
    assert_eq!(report.pushed, 1);
    assert_eq!(phone.store.count(EntityKind::Recipe), 0);

    // The server keeps the tombstone so other devices learn of the delete.
    assert_eq!(server.document_count(EntityKind::Recipe), 1);

    let report = tablet.sync().await;
    assert_eq!(report.purged, 1);
    assert_eq!(tablet.store.count(EntityKind::Recipe), 0);
}

#[tokio::test]
async fn private_profile_fields_stay_on_device() {
    let server = server(ServerConfig::default());
    let phone = Device::new(&server, ConflictPolicy::RemoteWins);
    let tablet = Device::new(&server, ConflictPolicy::RemoteWins);

    let mut baby = BabyEntity::new("Mia", NaiveDate::from_ymd_opt(2025, 5, 1).unwrap());
    baby.allergies = vec!["peanut".into()];
    baby.weight = Some(7.5);
    baby.gender = Some("F".into());
    let baby = phone.store.create(baby);
    phone.sync().await;

    let cloud_id = phone
        .store
        .fetch::<BabyEntity>(baby.id)
        .and_then(|b| b.meta.cloud_id)
        .unwrap();
    let stored = server.documents().baby(&cloud_id).unwrap();
    let json = serde_json::to_value(&stored).unwrap();
    for field in ["name", "birthDate", "allergies", "weight", "height"] {
        assert!(json.get(field).is_none(), "{field} reached the server");
    }
    assert_eq!(json["gender"], "F");

    let report = tablet.sync().await;
    assert_eq!(tablet.store.count(EntityKind::Baby), 0);
    assert_eq!(report.unmaterialized_profiles.len(), 1);

    let private = BabyPrivateFields {
        name: "Mia".into(),
        birth_date: NaiveDate::from_ymd_opt(2025, 5, 1).unwrap(),
        allergies: Vec::new(),
        weight: None,
        height: None,
    };
    let id = tablet
        .engine
        .adopt_profile(&report.unmaterialized_profiles[0], private)
        .await
        .unwrap();
    let adopted = tablet.store.fetch::<BabyEntity>(id).unwrap();
    assert_eq!(adopted.name, "Mia");
    assert_eq!(adopted.gender.as_deref(), Some("F"));
    assert_eq!(adopted.meta.cloud_id.as_deref(), Some(cloud_id.as_str()));
    assert_eq!(adopted.meta.sync_status, SyncStatus::Synced);
}

#[tokio::test]
async fn large_pulls_continue_from_checkpoint() {
    let server = server(ServerConfig::new().with_max_pull_batch(2));
    let phone = Device::new(&server, ConflictPolicy::RemoteWins);
    let tablet = Device::new(&server, ConflictPolicy::RemoteWins);

    for name in ["Rice porridge", "Pumpkin puree", "Pear mash"] {
        phone.store.create(RecipeEntity::new(name, 6, 12));
    }
    phone.sync().await;

    let first = tablet.sync().await;
    assert_eq!(first.pulled_of(EntityKind::Recipe), 2);
    let second = tablet.sync().await;
    assert_eq!(second.pulled_of(EntityKind::Recipe), 1);
    assert_eq!(tablet.store.count(EntityKind::Recipe), 3);
}

#[tokio::test]
async fn oversized_push_is_rejected_and_kept_pending() {
    let server = server(ServerConfig::new().with_max_push_batch(1));
    let phone = Device::new(&server, ConflictPolicy::RemoteWins);

    let a = phone.store.create(RecipeEntity::new("Rice porridge", 6, 12));
    phone.store.create(RecipeEntity::new("Pumpkin puree", 6, 12));

    let outcome = phone.engine.sync().await;
    assert!(matches!(
        outcome,
        SyncOutcome::Error {
            cause: SyncError::ServerRejected(_),
            ..
        }
    ));
    assert!(server.documents().is_empty());

    let row = phone.store.fetch::<RecipeEntity>(a.id).unwrap();
    assert_eq!(row.meta.sync_status, SyncStatus::PendingUpload);
    assert!(row.meta.cloud_id.is_some());
}

#[tokio::test]
async fn plan_for_new_profile_lands_after_adoption() {
    let server = server(ServerConfig::default());
    let phone = Device::new(&server, ConflictPolicy::RemoteWins);
    let tablet = Device::new(&server, ConflictPolicy::RemoteWins);

    let recipe = phone.store.create(RecipeEntity::new("Rice porridge", 6, 12));
    let baby = phone
        .store
        .create(BabyEntity::new("Mia", NaiveDate::from_ymd_opt(2025, 5, 1).unwrap()));
    phone
        .store
        .create(PlanEntity::new(recipe.id, date(4), MealPeriod::Dinner).for_baby(baby.id));
    phone.sync().await;

    let report = tablet.sync().await;
    assert_eq!(report.unmaterialized_profiles.len(), 1);
    assert_eq!(report.entity_errors.len(), 1);
    assert_eq!(tablet.store.count(EntityKind::Plan), 0);

    let private = BabyPrivateFields {
        name: "Mia".into(),
        birth_date: NaiveDate::from_ymd_opt(2025, 5, 1).unwrap(),
        allergies: Vec::new(),
        weight: None,
        height: None,
    };
    let baby_id = tablet
        .engine
        .adopt_profile(&report.unmaterialized_profiles[0], private)
        .await
        .unwrap();

    // Nothing new on the server; the plan comes from the kept-back changes.
    let report = tablet.sync().await;
    assert_eq!(report.pulled_total(), 0);
    assert!(report.entity_errors.is_empty());
    let plans = tablet.store.all::<PlanEntity>();
    assert_eq!(plans.len(), 1);
    assert_eq!(plans[0].baby_id, Some(baby_id));
    assert_eq!(plans[0].meal_period, MealPeriod::Dinner);
}

#[tokio::test]
async fn local_edit_survives_remote_delete_with_local_wins() {
    let server = server(ServerConfig::default());
    let phone = Device::new(&server, ConflictPolicy::LocalWins);
    let tablet = Device::new(&server, ConflictPolicy::RemoteWins);

    let recipe = phone.store.create(RecipeEntity::new("Rice porridge", 6, 12));
    phone.sync().await;
    tablet.sync().await;
    let cloud_id = phone
        .store
        .fetch::<RecipeEntity>(recipe.id)
        .and_then(|r| r.meta.cloud_id)
        .unwrap();

    let tablet_id = tablet.recipe(&cloud_id).unwrap().id;
    tablet
        .store
        .soft_delete(EntityKind::Recipe, tablet_id)
        .unwrap();
    tablet.sync().await;
    assert_eq!(server.version_of(EntityKind::Recipe, &cloud_id), Some(3));
    assert!(server.documents().recipe(&cloud_id).unwrap().is_deleted);

    phone
        .store
        .edit::<RecipeEntity>(recipe.id, |r| r.name = "Rice porridge with pear".into())
        .unwrap();
    let report = phone.sync().await;

    assert_eq!(report.conflicts.len(), 1);
    assert_eq!(report.conflicts[0].resolution, ConflictResolution::KeepLocal);
    assert_eq!(report.pushed, 1);
    let local = phone.store.fetch::<RecipeEntity>(recipe.id).unwrap();
    assert_eq!(local.meta.sync_status, SyncStatus::Synced);
    assert_eq!(local.meta.version, 4);
    let stored = server.documents().recipe(&cloud_id).unwrap();
    assert!(!stored.is_deleted);
    assert_eq!(stored.name, "Rice porridge with pear");

    tablet.sync().await;
    let copy = tablet.recipe(&cloud_id).unwrap();
    assert_eq!(copy.name, "Rice porridge with pear");
    assert_eq!(copy.meta.version, 4);
}
