//! Developer CLI for Bloom.

mod dev_init;
mod rest_client;
mod upload;

use anyhow::{Context, Result};
use bloom_core::config::AppConfig;
use bloom_core::{EncryptionKey, TokenCipher};
use bloom_storage::ObjectStore;
use bloom_store::MetadataStore;
use bloom_store::models::{NewDataset, NewImageMetadata};
use clap::{Args, Parser, Subcommand};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::Date;
use time::macros::format_description;

const DEFAULT_API_URL: &str = "http://localhost:8000";

#[derive(Parser)]
#[command(name = "bloom")]
#[command(about = "Developer CLI for Bloom")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct ConfigArgs {
    /// Configuration file shared with the server
    #[arg(long, env = "BLOOM_CONFIG", default_value = "config/server.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Create dev users, write credential profiles and load seed CSVs
    DevInit {
        /// Backend API URL
        #[arg(long, env = "BLOOM_API_URL", default_value = DEFAULT_API_URL)]
        api_url: String,
        /// Service role key used for admin and REST calls
        #[arg(long, env = "BLOOM_SERVICE_ROLE_KEY")]
        service_role_key: String,
        /// Anon key written to the credential profiles
        #[arg(long, env = "BLOOM_ANON_KEY")]
        anon_key: String,
        /// Directory holding `<table>.csv` seed files
        #[arg(long, default_value = "test_data")]
        data_dir: PathBuf,
        /// Where to write credential profiles (default: ~/.bloom)
        #[arg(long)]
        credentials_dir: Option<PathBuf>,
    },
    /// Species management commands
    Species {
        #[command(subcommand)]
        command: SpeciesCommands,
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Scanner management commands
    Scanners {
        #[command(subcommand)]
        command: ScannerCommands,
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Single-cell expression datasets
    Expression {
        #[command(subcommand)]
        command: ExpressionCommands,
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Scanner image uploads
    Images {
        #[command(subcommand)]
        command: ImageCommands,
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Token encryption key commands
    Key {
        #[command(subcommand)]
        command: KeyCommands,
    },
    /// Encrypt or decrypt provider tokens
    Token {
        #[command(subcommand)]
        command: TokenCommands,
        /// Hex token encryption key
        #[arg(long, env = "BLOOM_TOKEN_ENCRYPTION_KEY", hide_env_values = true)]
        key: Option<String>,
    },
}

#[derive(Subcommand)]
enum SpeciesCommands {
    /// Create species (and upload illustrations) from a YAML list
    Create {
        /// YAML file of `{common_name, genus, species, image_path}` entries
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum ScannerCommands {
    /// List scanners
    List,
    /// Add a scanner
    Add { name: String },
    /// Delete a scanner
    Delete { name: String },
}

#[derive(Subcommand)]
enum ExpressionCommands {
    /// Upload a dataset from genes, cells and counts JSON files
    Upload(ExpressionUploadArgs),
}

#[derive(Args)]
struct ExpressionUploadArgs {
    /// Dataset name
    #[arg(long)]
    name: String,
    #[arg(long)]
    species_id: i64,
    #[arg(long)]
    assembly: Option<String>,
    #[arg(long)]
    annotation: Option<String>,
    #[arg(long)]
    strain: Option<String>,
    /// JSON list of gene names
    #[arg(long)]
    genes: PathBuf,
    /// JSON list of `{id, c1, c2, label}` cells
    #[arg(long)]
    cells: PathBuf,
    /// JSON list of `[gene_idx, barcode_idx, expression]` triples
    #[arg(long)]
    counts: PathBuf,
    /// JSON object stored as dataset metadata
    #[arg(long)]
    metadata: Option<PathBuf>,
}

#[derive(Subcommand)]
enum ImageCommands {
    /// Upload every PNG in a directory as the frames of one scan
    Upload(ImageUploadArgs),
}

#[derive(Args)]
struct ImageUploadArgs {
    /// Directory of frames, ordered by file name
    dir: PathBuf,
    #[arg(long)]
    species: String,
    #[arg(long)]
    experiment: String,
    #[arg(long)]
    wave: i64,
    #[arg(long)]
    germ_day: i64,
    #[arg(long)]
    germ_day_color: String,
    #[arg(long)]
    plant_age_days: i64,
    /// Scan date (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    date_scanned: Date,
    /// Scanner name
    #[arg(long)]
    device: String,
    #[arg(long)]
    qr_code: String,
    #[arg(long)]
    accession: String,
    #[arg(long)]
    scientist_name: String,
    #[arg(long)]
    scientist_email: String,
    #[arg(long)]
    phenotyper_name: String,
    #[arg(long)]
    phenotyper_email: String,
}

impl From<&ImageUploadArgs> for NewImageMetadata {
    fn from(args: &ImageUploadArgs) -> Self {
        NewImageMetadata {
            species: Some(args.species.clone()),
            experiment: Some(args.experiment.clone()),
            wave_number: Some(args.wave),
            germ_day: Some(args.germ_day),
            germ_day_color: Some(args.germ_day_color.clone()),
            plant_age_days: Some(args.plant_age_days),
            date_scanned: Some(args.date_scanned),
            device_name: Some(args.device.clone()),
            plant_qr_code: Some(args.qr_code.clone()),
            accession_name: Some(args.accession.clone()),
            frame_number: None,
            scientist_name: Some(args.scientist_name.clone()),
            scientist_email: Some(args.scientist_email.clone()),
            phenotyper_name: Some(args.phenotyper_name.clone()),
            phenotyper_email: Some(args.phenotyper_email.clone()),
        }
    }
}

#[derive(Subcommand)]
enum KeyCommands {
    /// Print a new random token encryption key (64 hex characters)
    Generate,
}

#[derive(Subcommand)]
enum TokenCommands {
    /// Encrypt a token into an `iv:ciphertext` envelope
    Encrypt { text: String },
    /// Decrypt an `iv:ciphertext` envelope
    Decrypt { envelope: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let Cli { command } = Cli::parse();

    match command {
        Commands::DevInit {
            api_url,
            service_role_key,
            anon_key,
            data_dir,
            credentials_dir,
        } => {
            dev_init::handle_dev_init(dev_init::DevInitOptions {
                api_url,
                service_role_key,
                anon_key,
                data_dir,
                credentials_dir,
            })
            .await
        }
        Commands::Species { command, config } => handle_species_command(command, &config).await,
        Commands::Scanners { command, config } => handle_scanner_command(command, &config).await,
        Commands::Expression { command, config } => {
            handle_expression_command(command, &config).await
        }
        Commands::Images { command, config } => handle_image_command(command, &config).await,
        Commands::Key { command } => handle_key_command(command),
        Commands::Token { command, key } => handle_token_command(command, key.as_deref()),
    }
}

fn parse_date(value: &str) -> Result<Date, String> {
    Date::parse(value, format_description!("[year]-[month]-[day]"))
        .map_err(|e| format!("invalid date {value:?}: {e}"))
}

fn load_config(path: &str) -> Result<AppConfig> {
    let mut figment = Figment::new();
    if Path::new(path).exists() {
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::debug!("No config file found at {}", path);
    }
    figment = figment.merge(Env::prefixed("BLOOM_").split("__"));

    let config: AppConfig = figment
        .extract()
        .context("failed to load configuration")?;
    config
        .store
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid store configuration: {e}"))?;
    config
        .storage
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid storage configuration: {e}"))?;
    Ok(config)
}

async fn open_store(config: &ConfigArgs) -> Result<Arc<dyn MetadataStore>> {
    let config = load_config(&config.config)?;
    bloom_store::from_config(&config.store)
        .await
        .context("failed to open store")
}

async fn open_stores(config: &ConfigArgs) -> Result<(Arc<dyn MetadataStore>, Arc<dyn ObjectStore>)> {
    let app = load_config(&config.config)?;
    let store = bloom_store::from_config(&app.store)
        .await
        .context("failed to open store")?;
    let objects = bloom_storage::from_config(&app.storage)
        .await
        .context("failed to open object storage")?;
    Ok((store, objects.store))
}

async fn handle_species_command(command: SpeciesCommands, config: &ConfigArgs) -> Result<()> {
    match command {
        SpeciesCommands::Create { file } => {
            let entries = upload::read_species_file(&file).await?;
            let (store, objects) = open_stores(config).await?;
            let created = upload::create_species(store.as_ref(), objects.as_ref(), &entries).await?;
            println!("Created {created} species");
        }
    }
    Ok(())
}

async fn handle_scanner_command(command: ScannerCommands, config: &ConfigArgs) -> Result<()> {
    let store = open_store(config).await?;
    match command {
        ScannerCommands::List => {
            let scanners = store.list_scanners().await?;
            if scanners.is_empty() {
                println!("No scanners found");
            }
            for scanner in scanners {
                println!("{:>6}  {}", scanner.id, scanner.name);
            }
        }
        ScannerCommands::Add { name } => {
            let id = store
                .add_scanner(&name)
                .await
                .with_context(|| format!("failed to add scanner {name}"))?;
            println!("Added scanner {name} ({id})");
        }
        ScannerCommands::Delete { name } => {
            store
                .delete_scanner(&name)
                .await
                .with_context(|| format!("failed to delete scanner {name}"))?;
            println!("Deleted scanner {name}");
        }
    }
    Ok(())
}

async fn handle_expression_command(command: ExpressionCommands, config: &ConfigArgs) -> Result<()> {
    match command {
        ExpressionCommands::Upload(args) => {
            let metadata = match &args.metadata {
                Some(path) => Some(upload::read_json(path).await?),
                None => None,
            };
            let counts_file_name = args
                .counts
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .context("counts path has no file name")?;
            let expression = upload::ExpressionUpload {
                dataset: NewDataset {
                    name: args.name,
                    species_id: args.species_id,
                    scientist_id: None,
                    url: None,
                    assembly: args.assembly,
                    annotation: args.annotation,
                    strain: args.strain,
                    metadata,
                },
                genes: upload::read_json(&args.genes).await?,
                cells: upload::read_json(&args.cells).await?,
                counts: upload::read_json(&args.counts).await?,
                counts_file_name,
            };

            let (store, objects) = open_stores(config).await?;
            let dataset_id =
                upload::upload_expression(store.as_ref(), objects.as_ref(), expression).await?;
            println!("Dataset {dataset_id} uploaded");
        }
    }
    Ok(())
}

async fn handle_image_command(command: ImageCommands, config: &ConfigArgs) -> Result<()> {
    match command {
        ImageCommands::Upload(args) => {
            let files = upload::png_files(&args.dir)?;
            if files.is_empty() {
                anyhow::bail!("no .png files in {}", args.dir.display());
            }
            let metadata = NewImageMetadata::from(&args);
            let (store, objects) = open_stores(config).await?;
            let ids =
                upload::upload_images(store.as_ref(), objects.as_ref(), &metadata, &files).await?;
            println!("Uploaded {} images", ids.len());
        }
    }
    Ok(())
}

fn handle_key_command(command: KeyCommands) -> Result<()> {
    match command {
        KeyCommands::Generate => {
            println!("{}", EncryptionKey::generate().to_hex());
            println!("\nSet it as oauth.token_encryption_key (or BLOOM_OAUTH__TOKEN_ENCRYPTION_KEY).");
        }
    }
    Ok(())
}

fn handle_token_command(command: TokenCommands, key: Option<&str>) -> Result<()> {
    let cipher = TokenCipher::from_config(key)
        .context("a token key is required: pass --key or set BLOOM_TOKEN_ENCRYPTION_KEY")?;
    match command {
        TokenCommands::Encrypt { text } => println!("{}", cipher.encrypt(&text)),
        TokenCommands::Decrypt { envelope } => {
            let plaintext = cipher
                .decrypt(envelope.trim())
                .context("failed to decrypt token")?;
            println!("{plaintext}");
        }
    }
    Ok(())
}
