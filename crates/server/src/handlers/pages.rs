//! Getting started, timeline, genes, translation, pipelines and the static pages.

use super::oauth::connected_projects;
use super::{or_empty, record_page_view};
use crate::auth::CurrentUser;
use crate::html::{app_page, escape, link, table, text_or_none};
use crate::state::AppState;
use axum::extract::State;
use axum::http::Uri;
use axum::response::Response;
use bloom_core::summary::{calendar_counts, display_name};
use std::fmt::Write;

const DOCS_URL: &str = "https://docs.bloom.salk.edu";

const CONNECT_GITLAB_FORM: &str = r#"<form method="post" action="/app/pipelines/connect"><button type="submit">Connect to GitLab</button></form>"#;

/// GET /app
pub async fn getting_started(
    State(state): State<AppState>,
    user: CurrentUser,
    uri: Uri,
) -> Response {
    record_page_view(&state, &user, &uri, "getting_started");
    let example = format!(
        "{}/app/phenotypes/1/6/PI458606",
        state.config.server.public_url.trim_end_matches('/')
    );
    let body = format!(
        r#"<p>Bloom is a web app for sharing data within the Salk Harnessing Plants Initiative.</p>
<ul>
<li><strong>Explore</strong> data using the links above.</li>
<li><strong>Share</strong> data with other Bloom users by sharing page URLs. Example: {}</li>
</ul>
<p>This project is a work in progress. Send comments or questions to {}.</p>"#,
        link(&example, &example),
        link("mailto:dbutler@salk.edu", "dbutler@salk.edu"),
    );
    app_page("Getting started", &body)
}

/// GET /app/timeline
///
/// Calendar of scanned plants per day, then the per-wave breakdown.
pub async fn timeline(State(state): State<AppState>, user: CurrentUser, uri: Uri) -> Response {
    record_page_view(&state, &user, &uri, "timeline");
    let rows = or_empty(state.store.wave_timeline().await, "wave timeline");

    let dated: Vec<(String, i64)> = rows
        .iter()
        .filter_map(|r| r.date_scanned.map(|d| (d.to_string(), r.count)))
        .collect();
    let calendar: Vec<Vec<String>> = calendar_counts(dated.iter().map(|(d, n)| (d.as_str(), *n)))
        .into_iter()
        .map(|(day, count)| vec![day.to_string(), count.to_string()])
        .collect();

    let waves: Vec<Vec<String>> = rows
        .iter()
        .map(|r| {
            vec![
                r.date_scanned
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "None".to_string()),
                text_or_none(r.species_name.as_deref()),
                r.experiment_name
                    .as_deref()
                    .map(|name| escape(&display_name(name)))
                    .unwrap_or_else(|| "None".to_string()),
                r.wave_number
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "None".to_string()),
                r.count.to_string(),
            ]
        })
        .collect();

    let mut body = String::from("<h2>Calendar</h2>\n");
    body.push_str(&table(&["Day", "Plants scanned"], &calendar));
    body.push_str("\n<h2>Waves</h2>\n");
    body.push_str(&table(
        &["Date", "Species", "Experiment", "Wave", "Plants"],
        &waves,
    ));
    app_page("Timeline", &body)
}

/// GET /app/genes
pub async fn genes(State(state): State<AppState>, user: CurrentUser, uri: Uri) -> Response {
    record_page_view(&state, &user, &uri, "genes");
    let candidates = or_empty(state.store.list_gene_candidates().await, "gene candidates");

    let rows: Vec<Vec<String>> = candidates
        .iter()
        .map(|g| {
            vec![
                escape(&g.gene),
                text_or_none(g.standard_name.as_deref()),
                text_or_none(g.symbol.as_deref()),
                text_or_none(g.category.as_deref()),
                text_or_none(g.status.as_deref()),
                text_or_none(g.scientist_name.as_deref()),
                text_or_none(g.short_description.as_deref()),
                text_or_none(g.evidence_description.as_deref()),
                text_or_none(g.publication_status.as_deref()),
                match g.disclosed_to_otd {
                    Some(true) => "Yes".to_string(),
                    Some(false) => "No".to_string(),
                    None => "None".to_string(),
                },
                g.translation_approval_date
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "None".to_string()),
            ]
        })
        .collect();

    let body = table(
        &[
            "Gene",
            "Standard name",
            "Symbol",
            "Category",
            "Status",
            "Scientist",
            "Description",
            "Evidence",
            "Publication",
            "Disclosed to OTD",
            "Translation approval",
        ],
        &rows,
    );
    app_page("Gene candidates", &body)
}

/// GET /app/translation
pub async fn translation(State(state): State<AppState>, user: CurrentUser, uri: Uri) -> Response {
    record_page_view(&state, &user, &uri, "translation");
    let projects = or_empty(
        state.store.list_translation_projects().await,
        "translation projects",
    );

    let mut rows: Vec<Vec<String>> = projects
        .iter()
        .map(|p| {
            vec![
                escape(&p.name),
                p.spreadsheet_url
                    .as_deref()
                    .map(|url| link(url, "Spreadsheet"))
                    .unwrap_or_else(|| "None".to_string()),
                p.created_at.date().to_string(),
            ]
        })
        .collect();
    if rows.is_empty() {
        rows.push(vec!["None".to_string(), String::new(), String::new()]);
    }

    app_page(
        "Translation projects",
        &table(&["Project", "Spreadsheet", "Created"], &rows),
    )
}

/// GET /app/software
pub async fn software(State(state): State<AppState>, user: CurrentUser, uri: Uri) -> Response {
    record_page_view(&state, &user, &uri, "software");
    let mut body = String::new();
    let _ = write!(
        body,
        "<p>To interact with Bloom data programmatically, install the {}.</p>",
        link(DOCS_URL, "Bloom Command-Line Interface (CLI)")
    );
    app_page("Software", &body)
}

/// GET /app/pipelines
///
/// Projects of the connected GitLab account, or a connect button.
pub async fn pipelines(State(state): State<AppState>, user: CurrentUser, uri: Uri) -> Response {
    record_page_view(&state, &user, &uri, "pipelines");
    let mut body = String::from("<p>Add computational pipelines via GitLab or GitHub.</p>\n");

    if !state.config.oauth.enabled {
        body.push_str("<p>The GitLab integration is not enabled.</p>");
        return app_page("Pipelines", &body);
    }

    match connected_projects(&state, Some(&user)).await {
        Ok(Some(projects)) => body.push_str(&projects_table(&projects)),
        Ok(None) => body.push_str(CONNECT_GITLAB_FORM),
        Err(e) => {
            tracing::error!(error = %e, "failed to load GitLab projects");
            body.push_str("<p>Could not load GitLab projects.</p>");
        }
    }
    app_page("Pipelines", &body)
}

fn projects_table(projects: &serde_json::Value) -> String {
    let str_field = |value: &serde_json::Value| text_or_none(value.as_str());
    let mut rows: Vec<Vec<String>> = projects
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .map(|p| {
            vec![
                str_field(&p["name_with_namespace"]),
                str_field(&p["namespace"]["name"]),
                str_field(&p["description"]),
                p["web_url"]
                    .as_str()
                    .map(|url| link(url, url))
                    .unwrap_or_else(|| "None".to_string()),
            ]
        })
        .collect();
    if rows.is_empty() {
        rows.push(vec!["None".to_string(), String::new(), String::new(), String::new()]);
    }
    table(&["Project", "Namespace", "Description", "URL"], &rows)
}

/// Page with a title and a one-line description, for sections without data yet.
fn placeholder(
    state: &AppState,
    user: &CurrentUser,
    uri: &Uri,
    section: &str,
    title: &str,
    description: &str,
) -> Response {
    record_page_view(state, user, uri, section);
    app_page(title, &format!("<p>{}</p>", escape(description)))
}

/// GET /app/accessions
pub async fn accessions(State(state): State<AppState>, user: CurrentUser, uri: Uri) -> Response {
    placeholder(
        &state,
        &user,
        &uri,
        "accessions",
        "Accessions",
        "Information about different plant accessions.",
    )
}

/// GET /app/genotypes
pub async fn genotypes(State(state): State<AppState>, user: CurrentUser, uri: Uri) -> Response {
    placeholder(
        &state,
        &user,
        &uri,
        "genotypes",
        "Genotypes",
        "Information about different plant genotypes.",
    )
}

/// GET /app/greenhouse
pub async fn greenhouse(State(state): State<AppState>, user: CurrentUser, uri: Uri) -> Response {
    placeholder(
        &state,
        &user,
        &uri,
        "greenhouse",
        "Greenhouse",
        "Information about sensor readings at the greenhouse - temperature, light, and humidity.",
    )
}

/// GET /app/pygcms
pub async fn pygcms(State(state): State<AppState>, user: CurrentUser, uri: Uri) -> Response {
    placeholder(
        &state,
        &user,
        &uri,
        "pygcms",
        "PyGCMS",
        "Information about PyGCMS data.",
    )
}
