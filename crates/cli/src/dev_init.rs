//! Local development bootstrap: test users, credential profiles and seed tables.

use crate::rest_client::{CreateUserOutcome, RestClient};
use anyhow::{Context, Result};
use serde_json::{Map, Number, Value};
use std::path::{Path, PathBuf};

/// Seed tables in foreign-key order.
pub const SEED_TABLES: &[&str] = &[
    "species",
    "phenotypers",
    "cyl_scanners",
    "people",
    "assemblies",
    "cyl_trait_sources",
    "cyl_experiments",
    "cyl_waves",
    "accessions",
    "cyl_plants",
    "cyl_scientists",
    "cyl_camera_settings",
    "cyl_scans",
    "cyl_images",
];

/// Development users and the profile each one is written to. The password
/// is the user name.
pub const DEV_USERS: &[(&str, &str)] = &[("testuser5", "dev1"), ("testuser6", "dev2")];

pub struct DevInitOptions {
    pub api_url: String,
    pub service_role_key: String,
    pub anon_key: String,
    pub data_dir: PathBuf,
    /// Directory receiving `credentials.<profile>.txt`; `~/.bloom` when unset.
    pub credentials_dir: Option<PathBuf>,
}

#[derive(Debug, PartialEq)]
pub enum TableOutcome {
    Loaded(usize),
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Default, PartialEq)]
pub struct LoadTotals {
    pub loaded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl LoadTotals {
    fn record(&mut self, outcome: &TableOutcome) {
        match outcome {
            TableOutcome::Loaded(_) => self.loaded += 1,
            TableOutcome::Skipped(_) => self.skipped += 1,
            TableOutcome::Failed(_) => self.failed += 1,
        }
    }
}

pub async fn handle_dev_init(options: DevInitOptions) -> Result<()> {
    let client = RestClient::new(&options.api_url, &options.service_role_key)?;

    for (user, _) in DEV_USERS {
        let email = format!("{user}@salk.edu");
        match client.create_user(&email, user).await {
            Ok(CreateUserOutcome::Created(created)) => {
                println!(
                    "Created user {} ({})",
                    created.email.as_deref().unwrap_or(&email),
                    created.id
                );
            }
            Ok(CreateUserOutcome::AlreadyRegistered) => {
                println!("User {email} already exists, skipping");
            }
            Err(err) => tracing::error!(email = %email, error = %err, "Failed to create user"),
        }
    }

    let credentials_dir = match options.credentials_dir {
        Some(dir) => dir,
        None => dirs::home_dir()
            .context("could not determine home directory")?
            .join(".bloom"),
    };
    for (user, profile) in DEV_USERS {
        let path = write_credentials(
            &credentials_dir,
            profile,
            &credentials_contents(
                &format!("{user}@salk.edu"),
                user,
                &options.api_url,
                &options.anon_key,
            ),
        )
        .await?;
        println!("Wrote {}", path.display());
    }

    println!();
    let totals = load_seed_tables(&client, &options.data_dir).await;
    println!();
    println!("Loaded: {} tables", totals.loaded);
    println!("Skipped: {} tables", totals.skipped);
    println!("Failed: {} tables", totals.failed);

    if totals.failed > 0 {
        anyhow::bail!("{} table(s) failed to load", totals.failed);
    }
    Ok(())
}

pub fn credentials_contents(email: &str, password: &str, api_url: &str, anon_key: &str) -> String {
    format!(
        "BLOOM_EMAIL={email}\nBLOOM_PASSWORD={password}\nBLOOM_API_URL={api_url}\nBLOOM_ANON_KEY={anon_key}\n"
    )
}

async fn write_credentials(dir: &Path, profile: &str, contents: &str) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("failed to create {}", dir.display()))?;
    let path = dir.join(format!("credentials.{profile}.txt"));
    tokio::fs::write(&path, contents)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;

    // Set restrictive permissions (0600) since the file contains a password
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&path, perms).await?;
    }

    Ok(path)
}

pub async fn load_seed_tables(client: &RestClient, data_dir: &Path) -> LoadTotals {
    let mut totals = LoadTotals::default();
    for table in SEED_TABLES {
        let outcome = load_table(client, table, &data_dir.join(format!("{table}.csv"))).await;
        match &outcome {
            TableOutcome::Loaded(count) => println!("[SUCCESS] {table}: {count} records loaded"),
            TableOutcome::Skipped(reason) => println!("[SKIP] {table}: {reason}"),
            TableOutcome::Failed(reason) => println!("[ERROR] {table}: {reason}"),
        }
        totals.record(&outcome);
    }
    totals
}

async fn load_table(client: &RestClient, table: &str, path: &Path) -> TableOutcome {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    if !path.exists() {
        return TableOutcome::Skipped(format!("{file_name} not found"));
    }

    let rows = match read_csv_rows(path) {
        Ok(rows) => rows,
        Err(err) => return TableOutcome::Failed(format!("{err:#}")),
    };
    if rows.is_empty() {
        return TableOutcome::Skipped(format!("no data in {file_name}"));
    }

    println!("[LOAD] {table} ({} records from {file_name})...", rows.len());
    match client.upsert_rows(table, &rows).await {
        Ok(count) => TableOutcome::Loaded(count),
        Err(err) => TableOutcome::Failed(format!("{err:#}")),
    }
}

/// Read a CSV file into JSON rows keyed by header. Empty cells become null;
/// integer and float cells become numbers.
pub fn read_csv_rows(path: &Path) -> Result<Vec<Map<String, Value>>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let headers = reader.headers()?.clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("failed to parse {}", path.display()))?;
        let row = headers
            .iter()
            .zip(record.iter())
            .map(|(header, cell)| (header.to_string(), cell_value(cell)))
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

fn cell_value(cell: &str) -> Value {
    if cell.is_empty() {
        return Value::Null;
    }
    if let Ok(n) = cell.parse::<i64>() {
        return Value::Number(n.into());
    }
    if let Some(n) = cell.parse::<f64>().ok().and_then(Number::from_f64) {
        return Value::Number(n);
    }
    Value::String(cell.to_string())
}
