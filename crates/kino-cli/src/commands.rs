//! CLI command implementations

use crate::output::{self, OutputFormat};
use anyhow::{anyhow, bail, Context};
use kino_loader::net::uplynk;
use kino_loader::{
    AssetCatalog, AssetDescriptor, Feature, ImaManifestType, JsonFileStore, KeySystem,
    LoadPathConfig, LoadPathController, LoadPathEvent, LoadRequest, MediaElement,
    SimulatedPlatform, Source,
};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::debug;

// ============================================================================
// Parsing helpers
// ============================================================================

/// Accept either a display name (`Widevine`) or a concrete id (`com.widevine.alpha`)
pub fn parse_key_system(value: &str) -> anyhow::Result<KeySystem> {
    KeySystem::ALL
        .into_iter()
        .find(|k| k.name().eq_ignore_ascii_case(value))
        .or_else(|| KeySystem::from_identifier(value))
        .ok_or_else(|| anyhow!("unknown key system '{}'", value))
}

pub fn parse_feature(value: &str) -> anyhow::Result<Feature> {
    Feature::parse(value).ok_or_else(|| anyhow!("unknown feature '{}'", value))
}

pub fn parse_source(value: &str) -> anyhow::Result<Source> {
    let tag = value.trim().replace(['-', ' '], "_").to_uppercase();
    serde_json::from_value(serde_json::Value::String(tag))
        .map_err(|_| anyhow!("unknown source '{}'", value))
}

pub fn parse_manifest_type(value: &str) -> anyhow::Result<ImaManifestType> {
    match value.to_lowercase().as_str() {
        "hls" => Ok(ImaManifestType::Hls),
        "dash" => Ok(ImaManifestType::Dash),
        _ => bail!("unknown manifest type '{}' (expected hls or dash)", value),
    }
}

/// Split `key=value`
pub fn parse_pair(value: &str) -> anyhow::Result<(String, String)> {
    let (key, val) = value
        .split_once('=')
        .ok_or_else(|| anyhow!("expected KEY=VALUE, got '{}'", value))?;
    Ok((key.trim().to_string(), val.trim().to_string()))
}

// ============================================================================
// Catalog commands
// ============================================================================

fn open_catalog(store: &JsonFileStore) -> anyhow::Result<AssetCatalog> {
    debug!(path = %store.path().display(), "Opening catalog");
    AssetCatalog::restore(store, None)
        .with_context(|| format!("reading catalog from {}", store.path().display()))
}

fn find<'a>(catalog: &'a AssetCatalog, name: &str) -> anyhow::Result<&'a AssetDescriptor> {
    catalog
        .get(name)
        .ok_or_else(|| anyhow!("no asset named '{}' in the catalog", name))
}

/// Filters for `list`
#[derive(Debug, Default)]
pub struct ListFilter {
    pub featured: bool,
    pub features: Vec<Feature>,
    pub key_system: Option<KeySystem>,
    pub all: bool,
}

/// List catalog assets
pub fn list(store: &JsonFileStore, filter: ListFilter, format: &str) -> anyhow::Result<()> {
    let catalog = open_catalog(store)?;

    let assets: Vec<&AssetDescriptor> = if filter.all {
        catalog.iter().collect()
    } else {
        catalog.listed().collect()
    };
    let selected = assets.into_iter().filter(|asset| {
        (!filter.featured || asset.is_featured())
            && filter.features.iter().all(|f| asset.has_feature(*f))
            && filter.key_system.map_or(true, |k| asset.key_systems().contains(&k))
    });

    output::print_assets(selected, OutputFormat::from(format))
}

/// Show one asset
pub fn show(store: &JsonFileStore, name: &str, format: &str) -> anyhow::Result<()> {
    let catalog = open_catalog(store)?;
    output::print_asset(find(&catalog, name)?, OutputFormat::from(format))
}

/// Validate either a descriptor file or every asset in the catalog
pub fn validate(store: &JsonFileStore, file: Option<&Path>) -> anyhow::Result<()> {
    let assets: Vec<AssetDescriptor> = match file {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let value: serde_json::Value = serde_json::from_str(&text)?;
            let values = match value {
                serde_json::Value::Array(items) => items,
                other => vec![other],
            };
            values
                .into_iter()
                .map(AssetDescriptor::from_json)
                .collect::<kino_loader::Result<Vec<_>>>()?
        }
        None => open_catalog(store)?.iter().cloned().collect(),
    };

    let mut failed = 0;
    for asset in &assets {
        match asset.validate() {
            Ok(()) => println!("  PASS {}", asset.name()),
            Err(e) => {
                println!("  FAIL {} ({})", asset.name(), e);
                failed += 1;
            }
        }
    }

    println!("\nResults: {} passed, {} failed", assets.len() - failed, failed);
    if failed > 0 {
        bail!("{} asset(s) failed validation", failed);
    }
    Ok(())
}

/// Add an asset and save the catalog
pub async fn add(store: &JsonFileStore, asset: AssetDescriptor) -> anyhow::Result<()> {
    let mut catalog = open_catalog(store)?;
    let name = asset.name().to_string();
    catalog.add(asset)?;
    catalog.save(store)?;
    println!("Added '{}' ({} assets)", name, catalog.len());
    Ok(())
}

/// Remove an asset and save the catalog
pub async fn remove(store: &JsonFileStore, name: &str) -> anyhow::Result<()> {
    let mut catalog = open_catalog(store)?;
    catalog.remove(name).await?;
    catalog.save(store)?;
    println!("Removed '{}' ({} assets)", name, catalog.len());
    Ok(())
}

// ============================================================================
// Reference listings
// ============================================================================

/// List every feature tag
pub fn features(format: &str) -> anyhow::Result<()> {
    if OutputFormat::from(format) == OutputFormat::Json {
        let rows: Vec<_> = Feature::ALL
            .iter()
            .map(|f| serde_json::json!({ "tag": f, "label": f.label() }))
            .collect();
        println!("{}", output::to_json(&rows)?);
        return Ok(());
    }
    for feature in Feature::ALL {
        let tag = serde_json::to_value(feature)?;
        println!("  {:<28} {}", tag.as_str().unwrap_or_default(), feature.label());
    }
    Ok(())
}

/// List every key system and its concrete ids
pub fn key_systems(format: &str) -> anyhow::Result<()> {
    if OutputFormat::from(format) == OutputFormat::Json {
        let rows: BTreeMap<&str, &[&str]> = KeySystem::ALL
            .iter()
            .map(|k| (k.name(), k.identifiers()))
            .collect();
        println!("{}", output::to_json(&rows)?);
        return Ok(());
    }
    for key_system in KeySystem::ALL {
        let ids = key_system.identifiers();
        if ids.is_empty() {
            println!("  {:<10} (no CDM)", key_system.name());
        } else {
            println!("  {:<10} {}", key_system.name(), ids.join(", "));
        }
    }
    Ok(())
}

// ============================================================================
// Play
// ============================================================================

/// What to play and how the simulated platform behaves
#[derive(Debug, Default)]
pub struct PlayOptions {
    pub name: Option<String>,
    pub uri: Option<String>,
    pub mime_type: Option<String>,
    pub start_time: Option<f64>,
    pub no_media_source: bool,
    pub fail_manifest: u32,
    pub fail_drm: bool,
    pub step_delay_ms: u64,
    pub manifest_headers: Vec<(String, String)>,
    pub unload: bool,
}

/// Walk an asset through the load path against the simulated platform
pub async fn play(
    store: &JsonFileStore,
    config: LoadPathConfig,
    options: PlayOptions,
) -> anyhow::Result<()> {
    let mut request = match (&options.name, &options.uri) {
        (Some(name), None) => {
            let catalog = open_catalog(store)?;
            let mut asset = find(&catalog, name)?.clone();
            if asset.source() == Source::Uplynk && asset.request_filter().is_none() {
                let (request_filter, response_filter) = uplynk::filters();
                asset = asset
                    .set_request_filter(request_filter)
                    .set_response_filter(response_filter);
            }
            LoadRequest::from_asset(&asset)?
        }
        (None, Some(uri)) => LoadRequest::uri(uri.clone()),
        _ => bail!("give exactly one of an asset name or --uri"),
    };
    if let Some(mime) = options.mime_type {
        request = request.with_mime_type(mime);
    }
    if let Some(start) = options.start_time {
        request = request.with_start_time(start);
    }

    let platform = SimulatedPlatform::new();
    platform.set_media_source_supported(!options.no_media_source);
    platform.fail_manifest_times(options.fail_manifest);
    platform.fail_drm(options.fail_drm);
    platform.set_step_delay(Duration::from_millis(options.step_delay_ms));
    for (name, value) in options.manifest_headers {
        platform.set_manifest_header(name, value);
    }

    let player = LoadPathController::new(platform.collaborators(), config);
    let mut events = player.subscribe();

    println!("Playing {}", request.source().direct_uri().unwrap_or("(resolved at load)"));

    player.attach(MediaElement::new("video")).await?;
    print_events(&mut events);

    let loaded = player.load(request).await;
    print_events(&mut events);
    match loaded {
        Ok(state) => println!("Loaded via {}", state),
        Err(e) => println!("Load failed: {}", e),
    }

    if options.unload {
        player.unload().await?;
        print_events(&mut events);
    }

    player.destroy().await?;
    print_events(&mut events);

    println!(
        "\nManifest attempts: {}, DRM sessions: {}, license requests: {}",
        platform.manifest_attempts(),
        platform.drm_inits(),
        platform.license_requests().len()
    );
    for request in platform.license_requests() {
        println!("  license -> {}", request.uris.first().map(String::as_str).unwrap_or(""));
    }
    Ok(())
}

fn print_events(events: &mut broadcast::Receiver<LoadPathEvent>) {
    while let Ok(event) = events.try_recv() {
        output::print_event(&event);
    }
}
