use partscout_core::AppError;
use partscout_core::models::{ApplianceType, ModelPart};
use partscout_core::snapshot::{CatalogSnapshot, SnapshotBuilder};
use partscout_core::testutil::{make_test_model, make_test_part};
use partscout_core::traits::CatalogStore;
use partscout_db::{CatalogRepository, Database};

use crate::integration::common::setup_test_db;

/// `models` model numbers, each linked to every part in `parts`.
fn refrigerator_snapshot(models: &[&str], parts: &[(&str, Option<f64>)]) -> CatalogSnapshot {
    let mut builder = SnapshotBuilder::new(ApplianceType::Refrigerator);
    for number in models {
        builder.add_model(make_test_model(number));
        builder.absorb(
            number,
            parts
                .iter()
                .map(|(part, price)| make_test_part(part, *price))
                .collect(),
        );
    }
    builder.build()
}

fn dishwasher_snapshot(model_number: &str, part_number: &str) -> CatalogSnapshot {
    let mut model = make_test_model(model_number);
    model.appliance_type = ApplianceType::Dishwasher;
    let mut part = make_test_part(part_number, Some(5.0));
    part.appliance_type = ApplianceType::Dishwasher;

    let mut builder = SnapshotBuilder::new(ApplianceType::Dishwasher);
    builder.add_model(model);
    builder.absorb(model_number, vec![part]);
    builder.build()
}

#[tokio::test]
async fn replace_writes_models_parts_and_links() {
    let (pool, _container) = setup_test_db().await;
    let repo = CatalogRepository::new(pool);

    let snapshot = refrigerator_snapshot(&["RF100", "RF200"], &[("PS1", Some(10.0)), ("PS2", None)]);
    let summary = repo.replace_partition(&snapshot).await.unwrap();

    assert_eq!(summary.models_written, 2);
    assert_eq!(summary.parts_written, 2);
    assert_eq!(summary.links_written, 4);
    assert_eq!(summary.models_deleted, 0);

    let model = repo.get_model("RF100").await.unwrap().expect("model stored");
    assert_eq!(model.appliance_type, ApplianceType::Refrigerator);

    let part = repo.get_part("PS2").await.unwrap().expect("part stored");
    assert_eq!(part.price, None);
    assert_eq!(part.description, "");
}

#[tokio::test]
async fn replace_is_idempotent() {
    let (pool, _container) = setup_test_db().await;
    let repo = CatalogRepository::new(pool);
    let snapshot = refrigerator_snapshot(&["RF100"], &[("PS1", Some(10.0)), ("PS2", Some(3.5))]);

    repo.replace_partition(&snapshot).await.unwrap();
    let first = repo
        .partition_counts(ApplianceType::Refrigerator)
        .await
        .unwrap();

    let second_summary = repo.replace_partition(&snapshot).await.unwrap();
    let second = repo
        .partition_counts(ApplianceType::Refrigerator)
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(second.models, 1);
    assert_eq!(second.parts, 2);
    assert_eq!(second.links, 2);
    assert_eq!(second_summary.models_deleted, 1);
    assert_eq!(second_summary.links_deleted, 2);
}

#[tokio::test]
async fn second_run_replaces_price() {
    let (pool, _container) = setup_test_db().await;
    let repo = CatalogRepository::new(pool);

    repo.replace_partition(&refrigerator_snapshot(&["RF100"], &[("PS1", Some(10.0))]))
        .await
        .unwrap();
    repo.replace_partition(&refrigerator_snapshot(&["RF100"], &[("PS1", Some(12.5))]))
        .await
        .unwrap();

    let part = repo.get_part("PS1").await.unwrap().unwrap();
    assert_eq!(part.price, Some(12.5));
}

#[tokio::test]
async fn replace_drops_rows_missing_from_new_snapshot() {
    let (pool, _container) = setup_test_db().await;
    let repo = CatalogRepository::new(pool);

    repo.replace_partition(&refrigerator_snapshot(
        &["RF100", "RF200"],
        &[("PS1", Some(1.0)), ("PS2", Some(2.0))],
    ))
    .await
    .unwrap();
    repo.replace_partition(&refrigerator_snapshot(&["RF100"], &[("PS1", Some(1.0))]))
        .await
        .unwrap();

    assert!(repo.get_model("RF200").await.unwrap().is_none());
    assert!(repo.get_part("PS2").await.unwrap().is_none());
    let counts = repo
        .partition_counts(ApplianceType::Refrigerator)
        .await
        .unwrap();
    assert_eq!(counts.links, 1);
}

#[tokio::test]
async fn partitions_are_isolated() {
    let (pool, _container) = setup_test_db().await;
    let repo = CatalogRepository::new(pool);

    repo.replace_partition(&dishwasher_snapshot("DW1", "PS900"))
        .await
        .unwrap();
    repo.replace_partition(&refrigerator_snapshot(&["RF100"], &[("PS1", Some(10.0))]))
        .await
        .unwrap();
    // Replacing the refrigerator partition again must not touch dishwashers.
    repo.replace_partition(&refrigerator_snapshot(&["RF300"], &[("PS3", Some(1.0))]))
        .await
        .unwrap();

    let dishwasher = repo
        .partition_counts(ApplianceType::Dishwasher)
        .await
        .unwrap();
    assert_eq!(dishwasher.models, 1);
    assert_eq!(dishwasher.parts, 1);
    assert_eq!(dishwasher.links, 1);
    assert!(repo.get_model("DW1").await.unwrap().is_some());
    assert!(repo.get_model("RF100").await.unwrap().is_none());
}

#[tokio::test]
async fn failed_replace_keeps_previous_partition() {
    let (pool, _container) = setup_test_db().await;
    let repo = CatalogRepository::new(pool);

    repo.replace_partition(&refrigerator_snapshot(&["RF100"], &[("PS1", Some(10.0))]))
        .await
        .unwrap();

    // A link to a part that is not in the snapshot violates the foreign key
    // after the deletes have already run.
    let mut broken = refrigerator_snapshot(&["RF200"], &[("PS2", Some(2.0))]);
    broken.links.push(ModelPart::new("RF200", "PS_MISSING"));

    let err = repo.replace_partition(&broken).await.unwrap_err();
    assert!(matches!(err, AppError::DatabaseError(_)));

    assert!(repo.get_model("RF100").await.unwrap().is_some());
    assert!(repo.get_model("RF200").await.unwrap().is_none());
    let part = repo.get_part("PS1").await.unwrap().unwrap();
    assert_eq!(part.price, Some(10.0));
}

#[tokio::test]
async fn shrink_guard_refuses_small_snapshot() {
    let (pool, _container) = setup_test_db().await;
    let repo = CatalogRepository::new(pool).with_min_model_ratio(0.5);

    let models: Vec<String> = (0..10).map(|i| format!("RF{i:03}")).collect();
    let model_refs: Vec<&str> = models.iter().map(String::as_str).collect();
    repo.replace_partition(&refrigerator_snapshot(&model_refs, &[("PS1", Some(1.0))]))
        .await
        .unwrap();

    let err = repo
        .replace_partition(&refrigerator_snapshot(&["RF000", "RF001"], &[("PS1", Some(1.0))]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::ShrinkGuard {
            existing: 10,
            incoming: 2
        }
    ));

    let counts = repo
        .partition_counts(ApplianceType::Refrigerator)
        .await
        .unwrap();
    assert_eq!(counts.models, 10);

    // Half the stored count is still allowed.
    repo.replace_partition(&refrigerator_snapshot(&model_refs[..5], &[("PS1", Some(1.0))]))
        .await
        .unwrap();
}

#[tokio::test]
async fn duplicate_parts_in_snapshot_last_wins() {
    let (pool, _container) = setup_test_db().await;
    let repo = CatalogRepository::new(pool);

    let mut snapshot = refrigerator_snapshot(&["RF100"], &[("PS1", Some(10.0))]);
    snapshot.parts.push(make_test_part("PS1", Some(11.0)));

    let summary = repo.replace_partition(&snapshot).await.unwrap();
    assert_eq!(summary.parts_written, 1);

    let part = repo.get_part("PS1").await.unwrap().unwrap();
    assert_eq!(part.price, Some(11.0));
}

#[tokio::test]
async fn parts_for_model_are_ordered() {
    let (pool, _container) = setup_test_db().await;
    let repo = CatalogRepository::new(pool);

    repo.replace_partition(&refrigerator_snapshot(
        &["RF100"],
        &[("PS30", Some(3.0)), ("PS10", Some(1.0)), ("PS20", None)],
    ))
    .await
    .unwrap();

    let numbers: Vec<String> = repo
        .parts_for_model("RF100")
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.part_number)
        .collect();
    assert_eq!(numbers, vec!["PS10", "PS20", "PS30"]);
    assert!(repo.parts_for_model("UNKNOWN").await.unwrap().is_empty());
}

#[tokio::test]
async fn empty_partition_counts_are_zero() {
    let (pool, _container) = setup_test_db().await;
    let db = Database::from_pool(pool);
    let repo = db.catalog_repo();

    repo.health_check().await.unwrap();
    let counts = CatalogStore::partition_counts(&repo, ApplianceType::Dishwasher)
        .await
        .unwrap();
    assert_eq!(counts.models, 0);
    assert_eq!(counts.parts, 0);
    assert_eq!(counts.links, 0);
}
