//! Phenotype and trait browsing pages.
//!
//! Both sections drill down species → experiment. Phenotypes continue through
//! wave and accession to plants, scans and image frames; traits show per-accession
//! boxplot statistics and jump straight to an accession's plants.

use super::{or_empty, record_page_view, signed_url};
use crate::auth::CurrentUser;
use crate::html::{app_page, escape, img, link, not_found, table, text_or_none};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::Uri;
use axum::response::Response;
use bloom_core::naming::{IMAGES_BUCKET, SPECIES_ILLUSTRATIONS_BUCKET};
use bloom_core::summary::{
    accession_count, display_name, experiment_count, replicate_count, truncate_description,
};
use bloom_core::BoxplotStats;
use bloom_store::models::{ExperimentDetailRow, ImageRow, PlantWithScans, SpeciesRow};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::fmt::Write;

/// Characters of an experiment description shown in listings.
const DESCRIPTION_PREVIEW_CHARS: usize = 100;

/// Width of image thumbnails in listings.
const THUMBNAIL_WIDTH: u32 = 160;

/// Top-level section a listing links into.
#[derive(Clone, Copy)]
enum Section {
    Phenotypes,
    Traits,
}

impl Section {
    fn root(self) -> &'static str {
        match self {
            Section::Phenotypes => "/app/phenotypes",
            Section::Traits => "/app/traits",
        }
    }

    fn title(self) -> &'static str {
        match self {
            Section::Phenotypes => "Phenotypes",
            Section::Traits => "Traits",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Section::Phenotypes => "phenotypes",
            Section::Traits => "traits",
        }
    }
}

async fn species_listing(state: &AppState, section: Section) -> Response {
    let species = or_empty(
        state.store.list_species_with_experiments().await,
        "species with experiments",
    );

    let mut body = String::from("<ul class=\"species\">\n");
    for row in &species {
        let illustration = match row.illustration_path.as_deref().filter(|p| !p.is_empty()) {
            Some(path) => signed_url(state, SPECIES_ILLUSTRATIONS_BUCKET, path)
                .await
                .map(|url| img(&url, &row.common_name, THUMBNAIL_WIDTH))
                .unwrap_or_default(),
            None => String::new(),
        };
        let _ = writeln!(
            body,
            "<li>{illustration}{} <span>{}</span></li>",
            link(&format!("{}/{}", section.root(), row.id), &row.common_name),
            experiment_count(usize::try_from(row.record_count).unwrap_or_default()),
        );
    }
    body.push_str("</ul>");

    app_page(section.title(), &body)
}

/// Species and the experiment that belongs to it, or the 404 page.
async fn load_experiment(
    state: &AppState,
    species_id: i64,
    experiment_id: i64,
) -> Result<(SpeciesRow, ExperimentDetailRow), Response> {
    let species = or_empty(state.store.get_species(species_id).await, "species")
        .ok_or_else(|| not_found("species"))?;
    let experiment = or_empty(state.store.get_experiment(experiment_id).await, "experiment")
        .filter(|e| e.species_id == species.id)
        .ok_or_else(|| not_found("experiment"))?;
    Ok((species, experiment))
}

async fn experiment_listing(state: &AppState, section: Section, species_id: i64) -> Response {
    let Some(species) = or_empty(state.store.get_species(species_id).await, "species") else {
        return not_found("species");
    };
    let experiments: Vec<ExperimentDetailRow> =
        or_empty(state.store.list_all_experiments().await, "experiments")
            .into_iter()
            .filter(|e| e.species_id == species.id)
            .collect();

    let mut rows = Vec::with_capacity(experiments.len());
    for experiment in &experiments {
        let plants = or_empty(
            state.store.experiment_plants(experiment.id).await,
            "experiment plants",
        );
        let accessions =
            accession_count(plants.iter().filter_map(|p| p.accession_name.as_deref()));
        let slack = experiment
            .slack_channel_url
            .as_deref()
            .map(|url| link(url, "Slack"))
            .unwrap_or_else(|| "None".to_string());
        let description = experiment
            .description
            .as_deref()
            .map(|d| escape(&truncate_description(d, DESCRIPTION_PREVIEW_CHARS)))
            .unwrap_or_default();

        rows.push(vec![
            link(
                &format!("{}/{}/{}", section.root(), species.id, experiment.id),
                &display_name(&experiment.name),
            ),
            format!(
                "{} / {}",
                escape(&accessions),
                escape(&replicate_count(plants.len()))
            ),
            text_or_none(experiment.scientist_email.as_deref()),
            slack,
            description,
        ]);
    }

    let body = table(
        &["Experiment", "Plants", "Scientist", "Channel", "Description"],
        &rows,
    );
    app_page(&species.common_name, &body)
}

/// Frame 1 of a scan, falling back to the lowest frame present.
fn first_frame(images: &[ImageRow]) -> Option<&ImageRow> {
    images
        .iter()
        .find(|image| image.frame_number == 1)
        .or_else(|| images.iter().min_by_key(|image| image.frame_number))
}

async fn thumbnail(state: &AppState, image: Option<&ImageRow>, alt: &str) -> String {
    let Some(path) = image.and_then(|i| i.object_path.as_deref()) else {
        return "None".to_string();
    };
    signed_url(state, IMAGES_BUCKET, path)
        .await
        .map(|url| img(&url, alt, THUMBNAIL_WIDTH))
        .unwrap_or_else(|| "None".to_string())
}

/// One row per scan, scans ordered by plant age. `scan_link` builds the detail link
/// for a scan's thumbnail and image.
async fn plant_rows(
    state: &AppState,
    plants: &mut [PlantWithScans],
    scan_link: impl Fn(i64, Option<i64>) -> Option<String>,
) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    for plant in plants.iter_mut() {
        plant
            .scans
            .sort_by_key(|s| (s.scan.plant_age_days, s.scan.id));
        let qr_code = text_or_none(plant.plant.qr_code.as_deref());
        for scan in &plant.scans {
            let frame = first_frame(&scan.images);
            let thumb = thumbnail(state, frame, &format!("scan {}", scan.scan.id)).await;
            let thumb = match scan_link(scan.scan.id, frame.map(|f| f.id)) {
                Some(href) => format!(r#"<a href="{}">{thumb}</a>"#, escape(&href)),
                None => thumb,
            };
            rows.push(vec![
                qr_code.clone(),
                scan.scan
                    .plant_age_days
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "None".to_string()),
                scan.scan
                    .date_scanned
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "None".to_string()),
                thumb,
            ]);
        }
    }
    rows
}

/// GET /app/phenotypes
pub async fn phenotypes_index(
    State(state): State<AppState>,
    user: CurrentUser,
    uri: Uri,
) -> Response {
    record_page_view(&state, &user, &uri, Section::Phenotypes.label());
    species_listing(&state, Section::Phenotypes).await
}

/// GET /app/phenotypes/{species_id}
pub async fn phenotypes_species(
    State(state): State<AppState>,
    user: CurrentUser,
    uri: Uri,
    Path(species_id): Path<i64>,
) -> Response {
    record_page_view(&state, &user, &uri, Section::Phenotypes.label());
    experiment_listing(&state, Section::Phenotypes, species_id).await
}

/// GET /app/phenotypes/{species_id}/{experiment_id}
///
/// Waves of the experiment with the accessions planted in each.
pub async fn phenotypes_experiment(
    State(state): State<AppState>,
    user: CurrentUser,
    uri: Uri,
    Path((species_id, experiment_id)): Path<(i64, i64)>,
) -> Response {
    record_page_view(&state, &user, &uri, Section::Phenotypes.label());
    let (species, experiment) = match load_experiment(&state, species_id, experiment_id).await {
        Ok(found) => found,
        Err(response) => return response,
    };

    let plants = or_empty(
        state.store.experiment_plants(experiment.id).await,
        "experiment plants",
    );

    // wave_id -> (wave label, accession_id -> (name, plant count))
    let mut waves: BTreeMap<i64, (String, BTreeMap<i64, (String, usize)>)> = BTreeMap::new();
    for plant in &plants {
        let Some(accession_id) = plant.accession_id else {
            continue;
        };
        let wave = waves.entry(plant.wave_id).or_insert_with(|| {
            let label = match (plant.wave_number, plant.wave_name.as_deref()) {
                (Some(n), Some(name)) => format!("Wave {n}: {name}"),
                (Some(n), None) => format!("Wave {n}"),
                (None, Some(name)) => name.to_string(),
                (None, None) => format!("Wave {}", plant.wave_id),
            };
            (label, BTreeMap::new())
        });
        let accession = wave.1.entry(accession_id).or_insert_with(|| {
            (
                plant
                    .accession_name
                    .clone()
                    .unwrap_or_else(|| accession_id.to_string()),
                0,
            )
        });
        accession.1 += 1;
    }

    let mut body = String::new();
    if let Some(description) = experiment.description.as_deref() {
        let _ = writeln!(body, "<p>{}</p>", escape(description));
    }
    for (wave_id, (label, accessions)) in &waves {
        let _ = writeln!(body, "<h2>{}</h2>\n<ul>", escape(label));
        for (accession_id, (name, count)) in accessions {
            let href = format!(
                "/app/phenotypes/{}/{}/{wave_id}/{accession_id}",
                species.id, experiment.id
            );
            let _ = writeln!(
                body,
                "<li>{} ({})</li>",
                link(&href, name),
                escape(&replicate_count(*count))
            );
        }
        body.push_str("</ul>\n");
    }
    if waves.is_empty() {
        body.push_str("<p>No plants recorded.</p>");
    }

    app_page(&display_name(&experiment.name), &body)
}

/// GET /app/phenotypes/{species_id}/{experiment_id}/{wave_id}/{accession_id}
pub async fn phenotypes_plants(
    State(state): State<AppState>,
    user: CurrentUser,
    uri: Uri,
    Path((species_id, experiment_id, wave_id, accession_id)): Path<(i64, i64, i64, i64)>,
) -> Response {
    record_page_view(&state, &user, &uri, Section::Phenotypes.label());
    let (species, experiment) = match load_experiment(&state, species_id, experiment_id).await {
        Ok(found) => found,
        Err(response) => return response,
    };

    let mut plants = or_empty(
        state.store.wave_accession_plants(wave_id, accession_id).await,
        "wave accession plants",
    );
    let base = format!(
        "/app/phenotypes/{}/{}/{wave_id}/{accession_id}",
        species.id, experiment.id
    );
    let rows = plant_rows(&state, &mut plants, |scan_id, _| {
        Some(format!("{base}/{scan_id}"))
    })
    .await;

    let body = format!(
        "<p>{}</p>\n{}",
        escape(&replicate_count(plants.len())),
        table(&["Plant", "Age (days)", "Scanned", "Frame 1"], &rows)
    );
    app_page(&display_name(&experiment.name), &body)
}

/// GET /app/phenotypes/{species_id}/{experiment_id}/{wave_id}/{accession_id}/{scan_id}
///
/// Every frame of the scan.
pub async fn phenotypes_scan(
    State(state): State<AppState>,
    user: CurrentUser,
    uri: Uri,
    Path((species_id, experiment_id, _wave_id, _accession_id, scan_id)): Path<(
        i64,
        i64,
        i64,
        i64,
        i64,
    )>,
) -> Response {
    record_page_view(&state, &user, &uri, Section::Phenotypes.label());
    let (_, experiment) = match load_experiment(&state, species_id, experiment_id).await {
        Ok(found) => found,
        Err(response) => return response,
    };
    let Some(scan) = or_empty(state.store.get_scan(scan_id).await, "scan")
        .filter(|s| s.context.experiment_id == experiment.id)
    else {
        return not_found("scan");
    };

    let mut images = scan.images;
    images.sort_by_key(|i| i.frame_number);
    let state = &state;
    let urls = join_all(images.iter().map(|image| async move {
        match image.object_path.as_deref() {
            Some(path) => signed_url(state, IMAGES_BUCKET, path).await,
            None => None,
        }
    }))
    .await;

    let ctx = &scan.context;
    let mut body = String::new();
    let _ = writeln!(
        body,
        "<dl><dt>Plant</dt><dd>{}</dd><dt>Accession</dt><dd>{}</dd><dt>Age (days)</dt><dd>{}</dd><dt>Scanned</dt><dd>{}</dd><dt>Scanner</dt><dd>{}</dd></dl>",
        text_or_none(ctx.qr_code.as_deref()),
        text_or_none(ctx.accession_name.as_deref()),
        ctx.plant_age_days.map(|d| d.to_string()).unwrap_or_else(|| "None".to_string()),
        ctx.date_scanned.map(|d| d.to_string()).unwrap_or_else(|| "None".to_string()),
        text_or_none(ctx.scanner_name.as_deref()),
    );
    body.push_str("<div class=\"frames\">\n");
    for (image, url) in images.iter().zip(urls) {
        if let Some(url) = url {
            let _ = writeln!(
                body,
                "<figure>{}<figcaption>Frame {}</figcaption></figure>",
                img(&url, &format!("frame {}", image.frame_number), THUMBNAIL_WIDTH),
                image.frame_number
            );
        }
    }
    body.push_str("</div>");

    app_page(&format!("Scan {}", ctx.scan_id), &body)
}

/// GET /app/traits
pub async fn traits_index(
    State(state): State<AppState>,
    user: CurrentUser,
    uri: Uri,
) -> Response {
    record_page_view(&state, &user, &uri, Section::Traits.label());
    species_listing(&state, Section::Traits).await
}

/// GET /app/traits/{species_id}
pub async fn traits_species(
    State(state): State<AppState>,
    user: CurrentUser,
    uri: Uri,
    Path(species_id): Path<i64>,
) -> Response {
    record_page_view(&state, &user, &uri, Section::Traits.label());
    experiment_listing(&state, Section::Traits, species_id).await
}

fn format_stat(value: f64) -> String {
    format!("{value:.3}")
}

/// GET /app/traits/{species_id}/{experiment_id}
///
/// Boxplot statistics for each trait, one row per accession.
pub async fn traits_experiment(
    State(state): State<AppState>,
    user: CurrentUser,
    uri: Uri,
    Path((species_id, experiment_id)): Path<(i64, i64)>,
) -> Response {
    record_page_view(&state, &user, &uri, Section::Traits.label());
    let (species, experiment) = match load_experiment(&state, species_id, experiment_id).await {
        Ok(found) => found,
        Err(response) => return response,
    };

    let values = or_empty(
        state.store.experiment_trait_values(experiment.id).await,
        "trait values",
    );
    let mut by_trait: BTreeMap<&str, BTreeMap<&str, Vec<f64>>> = BTreeMap::new();
    for row in &values {
        by_trait
            .entry(row.trait_name.as_str())
            .or_default()
            .entry(row.accession_name.as_str())
            .or_default()
            .push(row.value);
    }

    let mut body = String::new();
    for (trait_name, accessions) in &by_trait {
        let rows: Vec<Vec<String>> = accessions
            .iter()
            .filter_map(|(accession, values)| {
                let stats = BoxplotStats::from_values(values)?;
                let href = format!(
                    "/app/traits/{}/{}/{}",
                    species.id,
                    experiment.id,
                    urlencoding_segment(accession)
                );
                Some(vec![
                    link(&href, accession),
                    stats.count.to_string(),
                    format_stat(stats.min),
                    format_stat(stats.q1),
                    format_stat(stats.median),
                    format_stat(stats.q3),
                    format_stat(stats.max),
                    format_stat(stats.lower_whisker),
                    format_stat(stats.upper_whisker),
                ])
            })
            .collect();
        let _ = writeln!(
            body,
            "<h2>{}</h2>\n{}",
            escape(trait_name),
            table(
                &[
                    "Accession", "n", "Min", "Q1", "Median", "Q3", "Max", "Lower whisker",
                    "Upper whisker",
                ],
                &rows
            )
        );
    }
    if by_trait.is_empty() {
        body.push_str("<p>No trait values recorded.</p>");
    }

    app_page(&display_name(&experiment.name), &body)
}

/// Percent-encode an accession name for use as one path segment.
fn urlencoding_segment(value: &str) -> String {
    percent_encoding::utf8_percent_encode(value, percent_encoding::NON_ALPHANUMERIC).to_string()
}

/// GET /app/traits/{species_id}/{experiment_id}/{accession}
pub async fn traits_accession(
    State(state): State<AppState>,
    user: CurrentUser,
    uri: Uri,
    Path((species_id, experiment_id, accession)): Path<(i64, i64, String)>,
) -> Response {
    record_page_view(&state, &user, &uri, Section::Traits.label());
    let (species, experiment) = match load_experiment(&state, species_id, experiment_id).await {
        Ok(found) => found,
        Err(response) => return response,
    };

    let mut plants = or_empty(
        state.store.accession_plants(experiment.id, &accession).await,
        "accession plants",
    );
    let base = format!(
        "/app/traits/{}/{}/{}",
        species.id,
        experiment.id,
        urlencoding_segment(&accession)
    );
    let rows = plant_rows(&state, &mut plants, |_, image_id| {
        image_id.map(|id| format!("{base}/{id}"))
    })
    .await;

    let body = format!(
        "<p>{}</p>\n{}",
        escape(&replicate_count(plants.len())),
        table(&["Plant", "Age (days)", "Scanned", "Frame 1"], &rows)
    );
    app_page(&accession, &body)
}

/// GET /app/traits/{species_id}/{experiment_id}/{accession}/{image_id}
pub async fn traits_image(
    State(state): State<AppState>,
    user: CurrentUser,
    uri: Uri,
    Path((species_id, experiment_id, accession, image_id)): Path<(i64, i64, String, i64)>,
) -> Response {
    record_page_view(&state, &user, &uri, Section::Traits.label());
    if let Err(response) = load_experiment(&state, species_id, experiment_id).await {
        return response;
    }
    let Some(image) = or_empty(state.store.get_image(image_id).await, "image") else {
        return not_found("image");
    };

    let picture = match image.object_path.as_deref() {
        Some(path) => signed_url(&state, IMAGES_BUCKET, path)
            .await
            .map(|url| img(&url, &format!("image {}", image.image_id), 600))
            .unwrap_or_else(|| "<p>Image unavailable.</p>".to_string()),
        None => "<p>Image unavailable.</p>".to_string(),
    };
    let body = format!(
        "<dl><dt>Accession</dt><dd>{}</dd><dt>Plant</dt><dd>{}</dd><dt>Age (days)</dt><dd>{}</dd><dt>Frame</dt><dd>{}</dd></dl>\n{picture}",
        escape(&accession),
        text_or_none(image.qr_code.as_deref()),
        image
            .plant_age_days
            .map(|d| d.to_string())
            .unwrap_or_else(|| "None".to_string()),
        image.frame_number,
    );
    app_page(&format!("Image {}", image.image_id), &body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(id: i64, frame_number: i64) -> ImageRow {
        ImageRow {
            id,
            scan_id: 1,
            frame_number,
            object_path: Some(format!("cyl-images/{id}.png")),
            status: None,
        }
    }

    #[test]
    fn test_first_frame_prefers_frame_one() {
        let images = vec![image(10, 3), image(11, 1), image(12, 2)];
        assert_eq!(first_frame(&images).map(|i| i.id), Some(11));

        let images = vec![image(20, 5), image(21, 4)];
        assert_eq!(first_frame(&images).map(|i| i.id), Some(21));

        assert!(first_frame(&[]).is_none());
    }

    #[test]
    fn test_accession_segment_is_encoded() {
        assert_eq!(urlencoding_segment("Col 0/a"), "Col%200%2Fa");
    }
}
