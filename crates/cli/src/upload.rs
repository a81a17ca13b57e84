//! Data-writing commands that go straight to the store and object storage.

use anyhow::{Context, Result};
use bloom_core::naming::{
    IMAGES_BUCKET, SCRNA_BUCKET, SPECIES_ILLUSTRATIONS_BUCKET, counts_object_path, cyl_image_path,
    object_key, species_illustration_path,
};
use bloom_storage::ObjectStore;
use bloom_store::MetadataStore;
use bloom_store::models::{IMAGE_STATUS_SUCCESS, NewCell, NewDataset, NewImageMetadata};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

// =============================================================================
// Species
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct SpeciesEntry {
    pub common_name: String,
    #[serde(default)]
    pub genus: Option<String>,
    #[serde(default)]
    pub species: Option<String>,
    /// Resolved against the directory of the YAML file.
    #[serde(default)]
    pub image_path: Option<PathBuf>,
}

pub async fn read_species_file(path: &Path) -> Result<Vec<SpeciesEntry>> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let mut entries: Vec<SpeciesEntry> = serde_yaml::from_str(&contents)
        .with_context(|| format!("failed to parse {}", path.display()))?;

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    for entry in &mut entries {
        if let Some(image) = entry.image_path.take() {
            entry.image_path = Some(base.join(image));
        }
    }
    Ok(entries)
}

/// Create each species, then attach its illustration when one is given.
pub async fn create_species(
    store: &dyn MetadataStore,
    objects: &dyn ObjectStore,
    entries: &[SpeciesEntry],
) -> Result<usize> {
    for entry in entries {
        let id = store
            .create_species(
                &entry.common_name,
                entry.genus.as_deref(),
                entry.species.as_deref(),
                "",
            )
            .await
            .with_context(|| format!("failed to create species {}", entry.common_name))?;

        let Some(image) = &entry.image_path else {
            println!("Created species {} ({id})", entry.common_name);
            continue;
        };

        let data = tokio::fs::read(image)
            .await
            .with_context(|| format!("failed to read {}", image.display()))?;
        let path = species_illustration_path(&Uuid::new_v4().to_string());
        objects
            .put(
                &object_key(SPECIES_ILLUSTRATIONS_BUCKET, &path),
                Bytes::from(data),
                Some("image/png"),
            )
            .await
            .with_context(|| format!("failed to upload {}", image.display()))?;
        store
            .update_species_illustration(&entry.common_name, &path)
            .await?;
        println!("Created species {} ({id}) with {path}", entry.common_name);
    }
    Ok(entries.len())
}

// =============================================================================
// Expression
// =============================================================================

/// One cell of a `cells.json` file.
#[derive(Debug, Deserialize)]
pub struct CellRecord {
    pub id: String,
    pub c1: f64,
    pub c2: f64,
    #[serde(default)]
    pub label: Value,
}

impl From<CellRecord> for NewCell {
    fn from(cell: CellRecord) -> Self {
        let cluster_id = match cell.label {
            Value::Null => None,
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        };
        NewCell {
            barcode: cell.id,
            x: cell.c1,
            y: cell.c2,
            cluster_id,
        }
    }
}

/// `[gene_idx, barcode_idx, expression]`.
pub type CountTriple = (i64, i64, Number);

pub struct ExpressionUpload {
    pub dataset: NewDataset,
    pub genes: Vec<String>,
    pub cells: Vec<CellRecord>,
    pub counts: Vec<CountTriple>,
    /// Name of the counts file, used in object paths.
    pub counts_file_name: String,
}

pub async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&contents).with_context(|| format!("failed to parse {}", path.display()))
}

/// Group count triples by gene index into `[{barcode_idx: expression}, ...]` lists.
pub fn group_counts(counts: &[CountTriple]) -> BTreeMap<i64, Vec<Value>> {
    let mut grouped: BTreeMap<i64, Vec<Value>> = BTreeMap::new();
    for (gene, barcode, expression) in counts {
        let mut entry = Map::new();
        entry.insert(barcode.to_string(), Value::Number(expression.clone()));
        grouped.entry(*gene).or_default().push(Value::Object(entry));
    }
    grouped
}

/// Create a dataset with its genes and cells, then store one counts object per gene.
pub async fn upload_expression(
    store: &dyn MetadataStore,
    objects: &dyn ObjectStore,
    upload: ExpressionUpload,
) -> Result<i64> {
    let dataset_id = store
        .create_dataset(&upload.dataset)
        .await
        .context("failed to create dataset")?;
    println!("Created dataset {} ({dataset_id})", upload.dataset.name);

    let genes = store.insert_genes(dataset_id, &upload.genes).await?;
    let cells: Vec<NewCell> = upload.cells.into_iter().map(NewCell::from).collect();
    let cells = store.insert_cells(dataset_id, &cells).await?;
    println!("Inserted {genes} genes and {cells} cells");

    let grouped = group_counts(&upload.counts);
    for (gene_index, entries) in &grouped {
        // Count files index genes from 1.
        let gene = store
            .find_gene(dataset_id, gene_index - 1)
            .await?
            .with_context(|| format!("gene {gene_index} not found in dataset {dataset_id}"))?;

        let path = counts_object_path(&upload.counts_file_name, dataset_id, &gene.gene_name);
        let body = serde_json::to_vec(entries)?;
        objects
            .put(
                &object_key(SCRNA_BUCKET, &path),
                Bytes::from(body),
                Some("application/json"),
            )
            .await
            .with_context(|| format!("failed to upload counts for {}", gene.gene_name))?;
        store.insert_counts(dataset_id, gene.id, &path).await?;
        tracing::debug!(gene = %gene.gene_name, path = %path, "Uploaded counts");
    }
    println!("Uploaded counts for {} genes", grouped.len());

    Ok(dataset_id)
}

// =============================================================================
// Scanner images
// =============================================================================

/// `*.png` files directly inside `dir`, ordered by file name.
pub fn png_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))? {
        let path = entry?.path();
        let is_png = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("png"));
        if path.is_file() && is_png {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Upload every frame of one scan. `metadata` carries everything but the frame number.
pub async fn upload_images(
    store: &dyn MetadataStore,
    objects: &dyn ObjectStore,
    metadata: &NewImageMetadata,
    files: &[PathBuf],
) -> Result<Vec<i64>> {
    let mut ids = Vec::with_capacity(files.len());
    for (index, file) in files.iter().enumerate() {
        let frame = NewImageMetadata {
            frame_number: Some(index as i64 + 1),
            ..metadata.clone()
        };
        let image_id = store
            .insert_image_metadata(&frame)
            .await
            .with_context(|| format!("failed to record {}", file.display()))?;

        let data = tokio::fs::read(file)
            .await
            .with_context(|| format!("failed to read {}", file.display()))?;
        let path = cyl_image_path(image_id);
        objects
            .put(
                &object_key(IMAGES_BUCKET, &path),
                Bytes::from(data),
                Some("image/png"),
            )
            .await
            .with_context(|| format!("failed to upload {}", file.display()))?;
        store
            .update_image(image_id, &path, IMAGE_STATUS_SUCCESS)
            .await?;

        println!("Uploaded {} as image {image_id}", file.display());
        ids.push(image_id);
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bloom_storage::FilesystemBackend;
    use bloom_store::SqliteStore;
    use bloom_store::repos::*;
    use serde_json::json;
    use tempfile::TempDir;
    use time::macros::date;

    async fn stores() -> (TempDir, SqliteStore, FilesystemBackend) {
        let temp = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(temp.path().join("bloom.db"), None)
            .await
            .unwrap();
        let objects = FilesystemBackend::new(temp.path().join("objects"), None, None)
            .await
            .unwrap();
        (temp, store, objects)
    }

    #[tokio::test]
    async fn species_file_resolves_images_next_to_it() {
        let (temp, store, objects) = stores().await;
        let dir = temp.path().join("seed");
        std::fs::create_dir_all(dir.join("img")).unwrap();
        std::fs::write(dir.join("img/arabidopsis.png"), b"\x89PNG").unwrap();
        std::fs::write(
            dir.join("species.yml"),
            "- common_name: arabidopsis\n  genus: Arabidopsis\n  species: thaliana\n  image_path: img/arabidopsis.png\n\
             - common_name: sorghum\n",
        )
        .unwrap();

        let entries = read_species_file(&dir.join("species.yml")).await.unwrap();
        assert_eq!(entries[0].image_path, Some(dir.join("img/arabidopsis.png")));
        assert!(entries[1].image_path.is_none());

        assert_eq!(create_species(&store, &objects, &entries).await.unwrap(), 2);

        let species = store.list_species().await.unwrap();
        let arabidopsis = species.iter().find(|s| s.common_name == "arabidopsis").unwrap();
        let path = arabidopsis.illustration_path.clone().unwrap();
        assert!(path.starts_with("species/species_") && path.ends_with(".png"));
        let stored = objects
            .get(&object_key(SPECIES_ILLUSTRATIONS_BUCKET, &path))
            .await
            .unwrap();
        assert_eq!(stored.as_ref(), b"\x89PNG");

        let sorghum = species.iter().find(|s| s.common_name == "sorghum").unwrap();
        assert_eq!(sorghum.illustration_path.as_deref(), Some(""));
    }

    #[test]
    fn counts_are_grouped_per_gene() {
        let counts: Vec<CountTriple> =
            serde_json::from_value(json!([[1, 0, 2], [2, 1, 0.5], [1, 2, 7]])).unwrap();
        let grouped = group_counts(&counts);
        assert_eq!(grouped.len(), 2);
        assert_eq!(Value::Array(grouped[&1].clone()), json!([{"0": 2}, {"2": 7}]));
        assert_eq!(Value::Array(grouped[&2].clone()), json!([{"1": 0.5}]));
    }

    #[test]
    fn cell_labels_become_cluster_ids() {
        let cells: Vec<CellRecord> = serde_json::from_value(json!([
            {"id": "AAAC", "c1": 1.0, "c2": 2.0, "label": 3},
            {"id": "AAAG", "c1": 0.0, "c2": 0.0, "label": "7"},
            {"id": "AAAT", "c1": 0.0, "c2": 0.0}
        ]))
        .unwrap();
        let cells: Vec<NewCell> = cells.into_iter().map(NewCell::from).collect();
        assert_eq!(cells[0].cluster_id.as_deref(), Some("3"));
        assert_eq!(cells[1].cluster_id.as_deref(), Some("7"));
        assert_eq!(cells[2].cluster_id, None);
        assert_eq!(cells[0].barcode, "AAAC");
        assert_eq!(cells[0].y, 2.0);
    }

    #[tokio::test]
    async fn expression_upload_stores_counts_per_gene() {
        let (_temp, store, objects) = stores().await;
        let species_id = store
            .create_species("arabidopsis", None, None, "")
            .await
            .unwrap();

        let upload = ExpressionUpload {
            dataset: NewDataset {
                name: "root atlas".to_string(),
                species_id,
                scientist_id: None,
                url: None,
                assembly: Some("TAIR10".to_string()),
                annotation: None,
                strain: None,
                metadata: None,
            },
            genes: vec!["AT1G01010".to_string(), "AT1G/01020".to_string()],
            cells: serde_json::from_value(json!([
                {"id": "AAAC", "c1": 0.0, "c2": 0.0, "label": 1},
                {"id": "AAAG", "c1": 1.0, "c2": 1.0, "label": 2}
            ]))
            .unwrap(),
            counts: serde_json::from_value(json!([[1, 0, 4], [2, 1, 3], [2, 0, 1]])).unwrap(),
            counts_file_name: "root atlas.json".to_string(),
        };

        let dataset_id = upload_expression(&store, &objects, upload).await.unwrap();
        assert_eq!(store.dataset_genes(dataset_id).await.unwrap().len(), 2);
        assert_eq!(store.dataset_cells(dataset_id).await.unwrap().len(), 2);

        let key = object_key(
            SCRNA_BUCKET,
            &format!("counts/root_atlas_{dataset_id}_/AT1G_01020.json"),
        );
        let body: Value = serde_json::from_slice(&objects.get(&key).await.unwrap()).unwrap();
        assert_eq!(body, json!([{"1": 3}, {"0": 1}]));
    }

    #[tokio::test]
    async fn expression_upload_fails_on_unknown_gene() {
        let (_temp, store, objects) = stores().await;
        let species_id = store.create_species("rice", None, None, "").await.unwrap();
        let upload = ExpressionUpload {
            dataset: NewDataset {
                name: "leaf".to_string(),
                species_id,
                scientist_id: None,
                url: None,
                assembly: None,
                annotation: None,
                strain: None,
                metadata: None,
            },
            genes: vec!["OS01G0100100".to_string()],
            cells: Vec::new(),
            counts: serde_json::from_value(json!([[5, 0, 1]])).unwrap(),
            counts_file_name: "leaf.json".to_string(),
        };

        let err = upload_expression(&store, &objects, upload).await.unwrap_err();
        assert!(err.to_string().contains("gene 5 not found"));
    }

    #[tokio::test]
    async fn images_upload_in_name_order() {
        let (temp, store, objects) = stores().await;
        let dir = temp.path().join("scan");
        std::fs::create_dir_all(&dir).unwrap();
        for (name, byte) in [("frame_2.png", 2u8), ("frame_1.png", 1), ("frame_3.PNG", 3)] {
            std::fs::write(dir.join(name), [byte]).unwrap();
        }
        std::fs::write(dir.join("notes.txt"), b"skip me").unwrap();

        let files = png_files(&dir).unwrap();
        assert_eq!(files.len(), 3);
        assert!(files[0].ends_with("frame_1.png"));

        let metadata = NewImageMetadata {
            species: Some("arabidopsis".to_string()),
            experiment: Some("root-growth".to_string()),
            wave_number: Some(1),
            germ_day: Some(3),
            germ_day_color: Some("red".to_string()),
            plant_age_days: Some(7),
            date_scanned: Some(date!(2023 - 05 - 01)),
            device_name: Some("FastScanner".to_string()),
            plant_qr_code: Some("QR-001".to_string()),
            accession_name: Some("Col-0".to_string()),
            frame_number: None,
            scientist_name: Some("Ada Scientist".to_string()),
            scientist_email: Some("ada@salk.edu".to_string()),
            phenotyper_name: Some("Pat Phenotyper".to_string()),
            phenotyper_email: Some("pat@salk.edu".to_string()),
        };

        let ids = upload_images(&store, &objects, &metadata, &files).await.unwrap();
        assert_eq!(ids.len(), 3);

        for (index, id) in ids.iter().enumerate() {
            let image = store.get_image(*id).await.unwrap().unwrap();
            assert_eq!(image.frame_number, index as i64 + 1);
            assert_eq!(image.object_path.as_deref(), Some(cyl_image_path(*id).as_str()));
            let stored = objects
                .get(&object_key(IMAGES_BUCKET, &cyl_image_path(*id)))
                .await
                .unwrap();
            assert_eq!(stored.as_ref(), [index as u8 + 1]);
        }

        let scan = store.get_scan(store.get_image(ids[0]).await.unwrap().unwrap().scan_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(scan.images.len(), 3);
        assert!(scan.images.iter().all(|i| i.status.as_deref() == Some(IMAGE_STATUS_SUCCESS)));
    }
}
