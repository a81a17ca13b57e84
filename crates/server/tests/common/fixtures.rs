//! Seed data for page and API tests.

use super::server::TestServer;
use bloom_core::naming::{IMAGES_BUCKET, cyl_image_path, object_key};
use bloom_storage::ObjectStore;
use bloom_store::models::{IMAGE_STATUS_SUCCESS, NewCell, NewDataset, NewImageMetadata};
use bloom_store::repos::*;
use bytes::Bytes;
use time::macros::date;

/// Ids of the seeded phenotype hierarchy.
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct SeededScan {
    pub species_id: i64,
    pub experiment_id: i64,
    pub wave_id: i64,
    pub accession_id: i64,
    pub scan_id: i64,
    /// Frames 1..=3 of plant QR-001, in frame order.
    pub image_ids: Vec<i64>,
}

/// Deterministic stand-in for a scanner frame.
#[allow(dead_code)]
pub fn png_bytes(frame: u8) -> Bytes {
    let mut data = b"\x89PNG\r\n\x1a\n".to_vec();
    data.extend(std::iter::repeat_n(frame, 64));
    Bytes::from(data)
}

fn image_metadata(qr_code: &str, plant_age_days: i64, frame: i64) -> NewImageMetadata {
    NewImageMetadata {
        species: Some("arabidopsis".to_string()),
        experiment: Some("root-growth".to_string()),
        wave_number: Some(1),
        germ_day: Some(3),
        germ_day_color: Some("red".to_string()),
        plant_age_days: Some(plant_age_days),
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

/// Store one image row and its object, the way the upload tool does.
async fn upload_image(server: &TestServer, metadata: &NewImageMetadata, frame: u8) -> i64 {
    let image_id = server.sqlite.insert_image_metadata(metadata).await.unwrap();
    let path = cyl_image_path(image_id);
    server
        .storage
        .put(
            &object_key(IMAGES_BUCKET, &path),
            png_bytes(frame),
            Some("image/png"),
        )
        .await
        .unwrap();
    server
        .sqlite
        .update_image(image_id, &path, IMAGE_STATUS_SUCCESS)
        .await
        .unwrap();
    image_id
}

/// One species, experiment, wave and accession; plant QR-001 with a 3-frame scan
/// and plant QR-002 with a 1-frame scan.
#[allow(dead_code)]
pub async fn seed_phenotypes(server: &TestServer) -> SeededScan {
    let mut image_ids = Vec::new();
    for frame in 1..=3 {
        let id = upload_image(server, &image_metadata("QR-001", 7, frame), frame as u8).await;
        image_ids.push(id);
    }
    upload_image(server, &image_metadata("QR-002", 9, 1), 9).await;

    let scan = server
        .sqlite
        .get_scan(server.sqlite.get_image(image_ids[0]).await.unwrap().unwrap().scan_id)
        .await
        .unwrap()
        .unwrap();
    let experiment = server
        .sqlite
        .get_experiment(scan.context.experiment_id)
        .await
        .unwrap()
        .unwrap();
    let plant = server
        .sqlite
        .experiment_plants(experiment.id)
        .await
        .unwrap()
        .into_iter()
        .next()
        .unwrap();

    sqlx::query("UPDATE cyl_experiments SET description = ?, slack_channel_url = ? WHERE id = ?")
        .bind("Root growth under drought. ".repeat(10))
        .bind("https://salk.slack.com/archives/C0ROOT")
        .bind(experiment.id)
        .execute(server.sqlite.pool())
        .await
        .unwrap();

    SeededScan {
        species_id: experiment.species_id,
        experiment_id: experiment.id,
        wave_id: plant.wave_id,
        accession_id: plant.accession_id.unwrap(),
        scan_id: scan.context.scan_id,
        image_ids,
    }
}

/// `root_length` values for every scan of the seeded experiment.
#[allow(dead_code)]
pub async fn seed_trait_values(server: &TestServer, values: &[f64]) {
    let scan_ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM cyl_scans ORDER BY id")
        .fetch_all(server.sqlite.pool())
        .await
        .unwrap();
    sqlx::query("INSERT OR IGNORE INTO cyl_traits (name) VALUES ('root_length')")
        .execute(server.sqlite.pool())
        .await
        .unwrap();
    for (i, value) in values.iter().enumerate() {
        sqlx::query(
            "INSERT INTO cyl_scan_traits (scan_id, trait_id, value) \
             SELECT ?, id, ? FROM cyl_traits WHERE name = 'root_length'",
        )
        .bind(scan_ids[i % scan_ids.len()])
        .bind(value)
        .execute(server.sqlite.pool())
        .await
        .unwrap();
    }
}

/// One gene candidate owned by the seeded scientist.
#[allow(dead_code)]
pub async fn seed_gene_candidate(server: &TestServer) {
    sqlx::query("INSERT OR IGNORE INTO people (name, email) VALUES ('Ada Scientist', 'ada@salk.edu')")
        .execute(server.sqlite.pool())
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO genes (gene_id, standard_name, symbol, short_description) \
         VALUES ('AT1G01010', 'NAC001', 'ANAC001', 'NAC domain containing protein 1')",
    )
    .execute(server.sqlite.pool())
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO gene_candidates (gene, category, status, created_at, evidence_description, \
         disclosed_to_otd, publication_status, translation_approval_date, scientist_id) \
         SELECT 'AT1G01010', 'root depth', 'validated', '2023-01-02T00:00:00Z', 'GWAS hit', \
         1, 'unpublished', '2023-03-04', id FROM people WHERE email = 'ada@salk.edu'",
    )
    .execute(server.sqlite.pool())
    .await
    .unwrap();
}

/// A dataset with two genes and three cells across two clusters.
#[allow(dead_code)]
pub async fn seed_dataset(server: &TestServer) -> (i64, i64) {
    let species_id = server
        .sqlite
        .create_species("arabidopsis", Some("Arabidopsis"), Some("thaliana"), "")
        .await
        .unwrap();
    let dataset_id = server
        .sqlite
        .create_dataset(&NewDataset {
            name: "root atlas".to_string(),
            species_id,
            scientist_id: None,
            url: None,
            assembly: Some("TAIR10".to_string()),
            annotation: Some("Araport11".to_string()),
            strain: Some("Col-0".to_string()),
            metadata: Some(serde_json::json!({"tissue": "root"})),
        })
        .await
        .unwrap();
    server
        .sqlite
        .insert_genes(
            dataset_id,
            &["AT1G01010".to_string(), "AT1G01020".to_string()],
        )
        .await
        .unwrap();
    let cells: Vec<NewCell> = [("AAAC", Some("3")), ("AAAG", Some("3")), ("AAAT", Some("7"))]
        .into_iter()
        .enumerate()
        .map(|(i, (barcode, cluster))| NewCell {
            barcode: barcode.to_string(),
            x: i as f64,
            y: -(i as f64),
            cluster_id: cluster.map(str::to_string),
        })
        .collect();
    server.sqlite.insert_cells(dataset_id, &cells).await.unwrap();
    (species_id, dataset_id)
}
