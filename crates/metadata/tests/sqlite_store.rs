//! Repository behavior against a throwaway SQLite database.

use bloom_store::models::*;
use bloom_store::repos::*;
use bloom_store::{MetadataStore, SqliteStore, StoreError};
use tempfile::TempDir;
use time::OffsetDateTime;
use time::macros::date;

async fn open_store() -> (SqliteStore, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::new(dir.path().join("bloom.db"), None).await.unwrap();
    (store, dir)
}

fn image_metadata(qr_code: &str, frame: i64) -> NewImageMetadata {
    NewImageMetadata {
        species: Some("arabidopsis".to_string()),
        experiment: Some("root-growth".to_string()),
        wave_number: Some(1),
        germ_day: Some(3),
        germ_day_color: Some("red".to_string()),
        plant_age_days: Some(7),
        date_scanned: Some(date!(2023 - 05 - 01)),
        device_name: Some("FastScanner".to_string()),
        plant_qr_code: Some(qr_code.to_string()),
        accession_name: Some("Col-0".to_string()),
        frame_number: Some(frame),
        scientist_name: Some("Ada Scientist".to_string()),
        scientist_email: Some("ada@salk.edu".to_string()),
        phenotyper_name: Some("Pat Phenotyper".to_string()),
        phenotyper_email: Some("pat@salk.edu".to_string()),
    }
}

fn flow(state: &str) -> NewFlowState {
    NewFlowState {
        user_id: "user-1".to_string(),
        provider: "gitlab".to_string(),
        state: state.to_string(),
        code_verifier: format!("verifier-{state}"),
        code_challenge: format!("challenge-{state}"),
        created_at: OffsetDateTime::now_utc(),
    }
}

#[tokio::test]
async fn flow_state_is_replaced_per_user_and_provider() {
    let (store, _dir) = open_store().await;

    store.replace_flow_state(&flow("first")).await.unwrap();
    store.replace_flow_state(&flow("second")).await.unwrap();

    assert_eq!(store.count_flow_states("user-1", "gitlab").await.unwrap(), 1);
    assert!(
        store
            .get_flow_state("user-1", "gitlab", "first")
            .await
            .unwrap()
            .is_none()
    );
    let current = store
        .get_flow_state("user-1", "gitlab", "second")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(current.code_verifier, "verifier-second");

    let mut other_user = flow("third");
    other_user.user_id = "user-2".to_string();
    store.replace_flow_state(&other_user).await.unwrap();
    assert_eq!(store.count_flow_states("user-1", "gitlab").await.unwrap(), 1);
    assert_eq!(store.count_flow_states("user-2", "gitlab").await.unwrap(), 1);
}

#[tokio::test]
async fn tokens_are_replaced_per_user_and_provider() {
    let (store, _dir) = open_store().await;
    let now = OffsetDateTime::now_utc();

    for access in ["aa:01", "bb:02"] {
        store
            .replace_tokens(&NewOAuthTokens {
                user_id: "user-1".to_string(),
                provider: "gitlab".to_string(),
                encrypted_access_token: access.to_string(),
                encrypted_refresh_token: "cc:03".to_string(),
                created_at: now,
                expires_at: now + time::Duration::hours(2),
            })
            .await
            .unwrap();
    }

    let tokens = store.get_tokens("user-1", "gitlab").await.unwrap().unwrap();
    assert_eq!(tokens.encrypted_access_token, "bb:02");
    assert!(store.get_tokens("user-1", "github").await.unwrap().is_none());
}

#[tokio::test]
async fn image_metadata_finds_or_creates_hierarchy() {
    let (store, _dir) = open_store().await;

    let first = store
        .insert_image_metadata(&image_metadata("QR-001", 1))
        .await
        .unwrap();
    let second = store
        .insert_image_metadata(&image_metadata("QR-001", 2))
        .await
        .unwrap();
    let again = store
        .insert_image_metadata(&image_metadata("QR-001", 1))
        .await
        .unwrap();
    store
        .insert_image_metadata(&image_metadata("QR-002", 1))
        .await
        .unwrap();

    assert_ne!(first, second);
    assert_eq!(first, again);

    let species = store.list_species_with_experiments().await.unwrap();
    assert_eq!(species.len(), 1);
    assert_eq!(species[0].common_name, "arabidopsis");
    assert_eq!(species[0].record_count, 1);

    let experiments = store.list_experiments(species[0].id).await.unwrap();
    assert_eq!(experiments.len(), 1);
    let experiment = store
        .get_experiment(experiments[0].id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(experiment.scientist_email.as_deref(), Some("ada@salk.edu"));

    let plants = store.experiment_plants(experiment.id).await.unwrap();
    assert_eq!(plants.len(), 2);
    assert_eq!(plants[0].wave_number, Some(1));
    assert_eq!(plants[0].accession_name.as_deref(), Some("Col-0"));

    let tree = store
        .accession_plants(experiment.id, "Col-0")
        .await
        .unwrap();
    assert_eq!(tree.len(), 2);
    assert_eq!(tree[0].plant.qr_code.as_deref(), Some("QR-001"));
    assert_eq!(tree[0].scans.len(), 1);
    // Only the first frame is attached to listings.
    assert_eq!(tree[0].scans[0].images.len(), 1);
    assert_eq!(tree[0].scans[0].images[0].frame_number, 1);

    let by_ids = store
        .wave_accession_plants(plants[0].wave_id, plants[0].accession_id.unwrap())
        .await
        .unwrap();
    assert_eq!(by_ids.len(), 2);

    let scan = store
        .get_scan(tree[0].scans[0].scan.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(scan.images.len(), 2);
    assert_eq!(scan.context.scanner_name.as_deref(), Some("FastScanner"));
    assert_eq!(scan.context.experiment_id, experiment.id);

    let timeline = store.wave_timeline().await.unwrap();
    assert_eq!(timeline.len(), 1);
    assert_eq!(timeline[0].count, 2);
    assert_eq!(timeline[0].date_scanned, Some(date!(2023 - 05 - 01)));
}

#[tokio::test]
async fn image_metadata_requires_every_field() {
    let (store, _dir) = open_store().await;
    let mut meta = image_metadata("QR-001", 1);
    meta.device_name = None;

    let err = store.insert_image_metadata(&meta).await.unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
    assert!(store.list_species().await.unwrap().is_empty());
}

#[tokio::test]
async fn update_image_sets_path_and_status() {
    let (store, _dir) = open_store().await;
    let image_id = store
        .insert_image_metadata(&image_metadata("QR-001", 1))
        .await
        .unwrap();

    store
        .update_image(image_id, "cyl-images/1.png", IMAGE_STATUS_SUCCESS)
        .await
        .unwrap();

    let image = store.get_image(image_id).await.unwrap().unwrap();
    assert_eq!(image.object_path.as_deref(), Some("cyl-images/1.png"));
    assert_eq!(image.qr_code.as_deref(), Some("QR-001"));

    let missing = store.update_image(9999, "x", IMAGE_STATUS_SUCCESS).await;
    assert!(matches!(missing, Err(StoreError::NotFound(_))));
}

#[tokio::test]
async fn scanners_reject_duplicates_and_missing_deletes() {
    let (store, _dir) = open_store().await;

    store.add_scanner("FastScanner").await.unwrap();
    store.add_scanner("SlowScanner").await.unwrap();
    assert!(matches!(
        store.add_scanner("FastScanner").await,
        Err(StoreError::AlreadyExists(_))
    ));

    let names: Vec<String> = store
        .list_scanners()
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.name)
        .collect();
    assert_eq!(names, vec!["FastScanner", "SlowScanner"]);

    store.delete_scanner("SlowScanner").await.unwrap();
    assert!(matches!(
        store.delete_scanner("SlowScanner").await,
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn species_are_unique_by_common_name() {
    let (store, _dir) = open_store().await;

    let id = store
        .create_species("pennycress", Some("Thlaspi"), Some("arvense"), "species/species_1.png")
        .await
        .unwrap();
    assert!(matches!(
        store.create_species("pennycress", None, None, "").await,
        Err(StoreError::AlreadyExists(_))
    ));

    store
        .update_species_illustration("pennycress", "species/species_2.png")
        .await
        .unwrap();
    let species = store.get_species(id).await.unwrap().unwrap();
    assert_eq!(species.illustration_path.as_deref(), Some("species/species_2.png"));
    assert_eq!(species.genus.as_deref(), Some("Thlaspi"));
}

#[tokio::test]
async fn trait_values_follow_experiment() {
    let (store, _dir) = open_store().await;
    let image_id = store
        .insert_image_metadata(&image_metadata("QR-001", 1))
        .await
        .unwrap();
    let scan_id = store.get_image(image_id).await.unwrap().unwrap().scan_id;

    sqlx::query("INSERT INTO cyl_traits (name) VALUES ('root_length')")
        .execute(store.pool())
        .await
        .unwrap();
    sqlx::query("INSERT INTO cyl_scan_traits (scan_id, trait_id, value) VALUES (?, 1, 4.5), (?, 1, NULL)")
        .bind(scan_id)
        .bind(scan_id)
        .execute(store.pool())
        .await
        .unwrap();

    let experiment_id = store.list_all_experiments().await.unwrap()[0].id;
    let values = store.experiment_trait_values(experiment_id).await.unwrap();
    assert_eq!(values.len(), 1);
    assert_eq!(values[0].trait_name, "root_length");
    assert_eq!(values[0].accession_name, "Col-0");
    assert_eq!(values[0].value, 4.5);
}

#[tokio::test]
async fn expression_dataset_genes_cells_and_counts() {
    let (store, _dir) = open_store().await;
    let species_id = store
        .create_species("arabidopsis", None, None, "")
        .await
        .unwrap();

    let dataset_id = store
        .create_dataset(&NewDataset {
            name: "root atlas".to_string(),
            species_id,
            scientist_id: None,
            url: None,
            assembly: Some("TAIR10".to_string()),
            annotation: None,
            strain: Some("Col-0".to_string()),
            metadata: Some(serde_json::json!({"tissue": "root"})),
        })
        .await
        .unwrap();

    let genes = vec!["AT1G01010".to_string(), "AT1G01020".to_string()];
    assert_eq!(store.insert_genes(dataset_id, &genes).await.unwrap(), 2);

    let cells = vec![
        NewCell {
            barcode: "AAAC".to_string(),
            x: 1.0,
            y: -2.0,
            cluster_id: Some("3".to_string()),
        },
        NewCell {
            barcode: "AAAG".to_string(),
            x: 0.5,
            y: 0.25,
            cluster_id: None,
        },
    ];
    assert_eq!(store.insert_cells(dataset_id, &cells).await.unwrap(), 2);

    let gene = store.find_gene(dataset_id, 1).await.unwrap().unwrap();
    assert_eq!(gene.gene_name, "AT1G01020");
    assert!(store.find_gene(dataset_id, 2).await.unwrap().is_none());

    store
        .insert_counts(dataset_id, gene.id, "counts/atlas_1_/AT1G01020.json")
        .await
        .unwrap();

    let stored_cells = store.dataset_cells(dataset_id).await.unwrap();
    assert_eq!(stored_cells[1].cell_number, 1);
    assert_eq!(stored_cells[1].barcode, "AAAG");

    let dataset = store.get_dataset(dataset_id).await.unwrap().unwrap();
    assert_eq!(dataset.species_common_name.as_deref(), Some("arabidopsis"));
    assert_eq!(dataset.metadata.unwrap()["tissue"], "root");

    let species = store.species_with_datasets().await.unwrap();
    assert_eq!(species[0].record_count, 1);
    assert_eq!(store.list_datasets(species_id).await.unwrap().len(), 1);
}
