//! Kino CLI - Headless asset catalog and load-path driver
//!
//! Features:
//! - Custom asset catalog (add, list, show, remove) persisted to a JSON file
//! - Asset validation
//! - Load-path walks against a simulated platform, printing every state

use clap::{Parser, Subcommand};
use kino_loader::{AssetDescriptor, JsonFileStore, LoadPathConfig};
use std::collections::BTreeMap;
use std::path::PathBuf;

mod commands;
mod output;

/// Kino CLI - Asset catalog and load-path toolkit
#[derive(Parser)]
#[command(name = "kino-cli")]
#[command(author = "Purple Squirrel Media")]
#[command(version)]
#[command(about = "Asset catalog and load-path toolkit", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json, table)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Load-path configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Catalog store file
    #[arg(short, long, default_value = "kino-assets.json")]
    store: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List catalog assets
    List {
        /// Only featured assets
        #[arg(long)]
        featured: bool,

        /// Require a feature tag (repeatable)
        #[arg(long = "feature")]
        features: Vec<String>,

        /// Require a key system
        #[arg(short, long)]
        key_system: Option<String>,

        /// Include disabled assets
        #[arg(short, long)]
        all: bool,
    },

    /// Show one asset in detail
    Show {
        /// Asset name
        name: String,
    },

    /// Validate a descriptor file, or the whole catalog
    Validate {
        /// JSON file holding one descriptor or an array of them
        file: Option<PathBuf>,
    },

    /// Add a custom asset to the catalog
    Add {
        /// Asset name
        name: String,

        /// Manifest URI
        #[arg(short, long)]
        manifest: Option<String>,

        /// Read the whole descriptor from a JSON file instead
        #[arg(long, conflicts_with = "manifest")]
        from_json: Option<PathBuf>,

        /// Icon URI
        #[arg(long, default_value = "")]
        icon: String,

        /// Provenance (shaka, uplynk, media-tailor, ...)
        #[arg(long, default_value = "custom")]
        source: String,

        /// Manifest MIME type
        #[arg(long)]
        mime_type: Option<String>,

        /// Key system (repeatable)
        #[arg(short, long = "key-system")]
        key_systems: Vec<String>,

        /// License server as KEY_SYSTEM_ID=URI (repeatable)
        #[arg(short, long = "license-server")]
        license_servers: Vec<String>,

        /// License request header as NAME=VALUE (repeatable)
        #[arg(long = "license-header")]
        license_headers: Vec<String>,

        /// Server certificate URI
        #[arg(long)]
        certificate: Option<String>,

        /// Feature tag (repeatable)
        #[arg(long = "feature")]
        features: Vec<String>,

        /// Description paragraph (repeatable)
        #[arg(short, long = "description")]
        descriptions: Vec<String>,

        /// Client-side ad tag URI
        #[arg(long)]
        ad_tag: Option<String>,

        /// IMA DAI content source id (VOD, with --ima-video-id)
        #[arg(long)]
        ima_content_source_id: Option<String>,

        /// IMA DAI video id (VOD, with --ima-content-source-id)
        #[arg(long)]
        ima_video_id: Option<String>,

        /// IMA DAI asset key (live)
        #[arg(long)]
        ima_asset_key: Option<String>,

        /// IMA DAI manifest type (hls, dash)
        #[arg(long)]
        ima_manifest_type: Option<String>,

        /// MediaTailor session URL
        #[arg(long)]
        media_tailor: Option<String>,

        /// MediaTailor ads parameter as KEY=VALUE (repeatable)
        #[arg(long = "ads-param")]
        ads_params: Vec<String>,

        /// Mark as featured under this title
        #[arg(long)]
        featured: Option<String>,
    },

    /// Remove an asset from the catalog
    Remove {
        /// Asset name
        name: String,
    },

    /// Walk an asset through the load path on a simulated platform
    Play {
        /// Catalog asset name
        name: Option<String>,

        /// Play a bare URI instead of a catalog asset
        #[arg(short, long, conflicts_with = "name")]
        uri: Option<String>,

        /// MIME type override
        #[arg(long)]
        mime_type: Option<String>,

        /// Start position in seconds
        #[arg(long)]
        start_time: Option<f64>,

        /// Simulate a platform without a media pipeline
        #[arg(long)]
        no_media_source: bool,

        /// Fail this many manifest fetches first
        #[arg(long, default_value = "0")]
        fail_manifest: u32,

        /// Fail DRM setup
        #[arg(long)]
        fail_drm: bool,

        /// Delay per simulated step in milliseconds
        #[arg(long, default_value = "0")]
        step_delay: u64,

        /// Header on manifest responses as NAME=VALUE (repeatable)
        #[arg(long = "manifest-header")]
        manifest_headers: Vec<String>,

        /// Unload after loading
        #[arg(long)]
        unload: bool,
    },

    /// List feature tags
    Features,

    /// List key systems and their concrete ids
    KeySystems,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .init();
    kino_loader::init();

    let store = JsonFileStore::new(&cli.store);
    let config = match &cli.config {
        Some(path) => LoadPathConfig::from_file(path)?,
        None => LoadPathConfig::default(),
    };

    match cli.command {
        Commands::List { featured, features, key_system, all } => {
            let filter = commands::ListFilter {
                featured,
                features: features
                    .iter()
                    .map(|f| commands::parse_feature(f))
                    .collect::<anyhow::Result<_>>()?,
                key_system: key_system.as_deref().map(commands::parse_key_system).transpose()?,
                all,
            };
            commands::list(&store, filter, &cli.format)?;
        }
        Commands::Show { name } => {
            commands::show(&store, &name, &cli.format)?;
        }
        Commands::Validate { file } => {
            commands::validate(&store, file.as_deref())?;
        }
        Commands::Add {
            name,
            manifest,
            from_json,
            icon,
            source,
            mime_type,
            key_systems,
            license_servers,
            license_headers,
            certificate,
            features,
            descriptions,
            ad_tag,
            ima_content_source_id,
            ima_video_id,
            ima_asset_key,
            ima_manifest_type,
            media_tailor,
            ads_params,
            featured,
        } => {
            let asset = match from_json {
                Some(path) => {
                    let text = std::fs::read_to_string(&path)?;
                    AssetDescriptor::from_json(serde_json::from_str(&text)?)?.set_name(name)
                }
                None => {
                    let mut asset = AssetDescriptor::blank()
                        .set_name(name)
                        .set_icon_uri(icon)
                        .set_source(commands::parse_source(&source)?);
                    if let Some(uri) = manifest {
                        asset = asset.set_manifest_uri(uri);
                    }
                    if let Some(mime) = mime_type {
                        asset = asset.set_mime_type(mime);
                    }
                    for key_system in &key_systems {
                        asset = asset.add_key_system(commands::parse_key_system(key_system)?);
                    }
                    for pair in &license_servers {
                        let (id, uri) = commands::parse_pair(pair)?;
                        asset = asset.add_license_server(id, uri);
                    }
                    for pair in &license_headers {
                        let (header, value) = commands::parse_pair(pair)?;
                        asset = asset.add_license_request_header(header, value);
                    }
                    if let Some(cert) = certificate {
                        asset = asset.set_certificate_uri(cert);
                    }
                    for feature in &features {
                        asset = asset.add_feature(commands::parse_feature(feature)?);
                    }
                    for text in descriptions {
                        asset = asset.add_description(text);
                    }
                    if let Some(tag) = ad_tag {
                        asset = asset.set_ad_tag_uri(tag);
                    }
                    if let Some(id) = ima_content_source_id {
                        asset = asset.set_ima_content_source_id(id);
                    }
                    if let Some(id) = ima_video_id {
                        asset = asset.set_ima_video_id(id);
                    }
                    if let Some(key) = ima_asset_key {
                        asset = asset.set_ima_asset_key(key);
                    }
                    if let Some(kind) = ima_manifest_type {
                        asset = asset.set_ima_manifest_type(commands::parse_manifest_type(&kind)?);
                    }
                    if let Some(url) = media_tailor {
                        let params: BTreeMap<String, String> = ads_params
                            .iter()
                            .map(|p| commands::parse_pair(p))
                            .collect::<anyhow::Result<_>>()?;
                        asset = asset.set_media_tailor(url, Some(params).filter(|p| !p.is_empty()));
                    }
                    if let Some(title) = featured {
                        asset = asset.mark_as_featured(title);
                    }
                    asset
                }
            };
            commands::add(&store, asset).await?;
        }
        Commands::Remove { name } => {
            commands::remove(&store, &name).await?;
        }
        Commands::Play {
            name,
            uri,
            mime_type,
            start_time,
            no_media_source,
            fail_manifest,
            fail_drm,
            step_delay,
            manifest_headers,
            unload,
        } => {
            let options = commands::PlayOptions {
                name,
                uri,
                mime_type,
                start_time,
                no_media_source,
                fail_manifest,
                fail_drm,
                step_delay_ms: step_delay,
                manifest_headers: manifest_headers
                    .iter()
                    .map(|h| commands::parse_pair(h))
                    .collect::<anyhow::Result<_>>()?,
                unload,
            };
            commands::play(&store, config, options).await?;
        }
        Commands::Features => {
            commands::features(&cli.format)?;
        }
        Commands::KeySystems => {
            commands::key_systems(&cli.format)?;
        }
    }

    Ok(())
}
