//! Single-cell expression pages.

use super::{or_empty, record_page_view};
use crate::auth::CurrentUser;
use crate::html::{app_page, escape, link, not_found, table, text_or_none};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::Uri;
use axum::response::Response;
use bloom_store::models::ScrnaCellRow;
use std::collections::BTreeMap;
use std::fmt::Write;

const SECTION: &str = "expression";

/// Cells per cluster, unassigned cells under "None".
fn cluster_counts(cells: &[ScrnaCellRow]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for cell in cells {
        let cluster = cell
            .cluster_id
            .clone()
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| "None".to_string());
        *counts.entry(cluster).or_default() += 1;
    }
    counts
}

/// Bounding box of the embedding: (min x, max x, min y, max y).
fn embedding_extent(cells: &[ScrnaCellRow]) -> Option<(f64, f64, f64, f64)> {
    let first = cells.first()?;
    Some(cells.iter().fold(
        (first.x, first.x, first.y, first.y),
        |(min_x, max_x, min_y, max_y), c| {
            (min_x.min(c.x), max_x.max(c.x), min_y.min(c.y), max_y.max(c.y))
        },
    ))
}

/// GET /app/expression
pub async fn expression_index(
    State(state): State<AppState>,
    user: CurrentUser,
    uri: Uri,
) -> Response {
    record_page_view(&state, &user, &uri, SECTION);
    let species = or_empty(
        state.store.species_with_datasets().await,
        "species with datasets",
    );

    let rows: Vec<Vec<String>> = species
        .iter()
        .map(|s| {
            let suffix = if s.record_count == 1 { "" } else { "s" };
            vec![
                link(&format!("/app/expression/{}", s.id), &s.common_name),
                format!("{} dataset{suffix}", s.record_count),
            ]
        })
        .collect();
    app_page("Expression", &table(&["Species", "Datasets"], &rows))
}

/// GET /app/expression/{species_id}
pub async fn expression_species(
    State(state): State<AppState>,
    user: CurrentUser,
    uri: Uri,
    Path(species_id): Path<i64>,
) -> Response {
    record_page_view(&state, &user, &uri, SECTION);
    let Some(species) = or_empty(state.store.get_species(species_id).await, "species") else {
        return not_found("species");
    };
    let datasets = or_empty(state.store.list_datasets(species.id).await, "datasets");

    let rows: Vec<Vec<String>> = datasets
        .iter()
        .map(|d| {
            vec![
                link(&format!("/app/expression/{}/{}", species.id, d.id), &d.name),
                text_or_none(d.assembly.as_deref()),
                text_or_none(d.annotation.as_deref()),
                text_or_none(d.strain.as_deref()),
                text_or_none(d.scientist_name.as_deref()),
            ]
        })
        .collect();
    let body = table(
        &["Dataset", "Assembly", "Annotation", "Strain", "Scientist"],
        &rows,
    );
    app_page(&species.common_name, &body)
}

/// GET /app/expression/{species_id}/{dataset_id}
pub async fn expression_dataset(
    State(state): State<AppState>,
    user: CurrentUser,
    uri: Uri,
    Path((species_id, dataset_id)): Path<(i64, i64)>,
) -> Response {
    record_page_view(&state, &user, &uri, SECTION);
    let Some(dataset) = or_empty(state.store.get_dataset(dataset_id).await, "dataset")
        .filter(|d| d.species_id == species_id)
    else {
        return not_found("dataset");
    };

    let genes = or_empty(state.store.dataset_genes(dataset.id).await, "dataset genes");
    let cells = or_empty(state.store.dataset_cells(dataset.id).await, "dataset cells");

    let mut body = String::new();
    let _ = writeln!(
        body,
        "<dl><dt>Species</dt><dd>{}</dd><dt>Scientist</dt><dd>{}</dd><dt>Assembly</dt><dd>{}</dd><dt>Annotation</dt><dd>{}</dd><dt>Strain</dt><dd>{}</dd><dt>Genes</dt><dd>{}</dd><dt>Cells</dt><dd>{}</dd></dl>",
        text_or_none(dataset.species_common_name.as_deref()),
        text_or_none(dataset.scientist_email.as_deref()),
        text_or_none(dataset.assembly.as_deref()),
        text_or_none(dataset.annotation.as_deref()),
        text_or_none(dataset.strain.as_deref()),
        genes.len(),
        cells.len(),
    );
    if let Some(url) = dataset.url.as_deref() {
        let _ = writeln!(body, "<p>{}</p>", link(url, "Source"));
    }

    if let Some((min_x, max_x, min_y, max_y)) = embedding_extent(&cells) {
        let _ = writeln!(
            body,
            "<p>Embedding spans x {min_x:.2} to {max_x:.2}, y {min_y:.2} to {max_y:.2}.</p>"
        );
    }
    let clusters: Vec<Vec<String>> = cluster_counts(&cells)
        .into_iter()
        .map(|(cluster, count)| vec![escape(&cluster), count.to_string()])
        .collect();
    body.push_str("<h2>Clusters</h2>\n");
    body.push_str(&table(&["Cluster", "Cells"], &clusters));

    if let Some(metadata) = &dataset.metadata {
        let pretty = serde_json::to_string_pretty(metadata).unwrap_or_default();
        let _ = writeln!(body, "\n<h2>Metadata</h2>\n<pre>{}</pre>", escape(&pretty));
    }

    app_page(&dataset.name, &body)
}
