//! Output formatting for CLI

use console::style;
use kino_loader::{AssetDescriptor, LoadPathEvent, LoadPathState};
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
    Table,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "table" => OutputFormat::Table,
            _ => OutputFormat::Text,
        }
    }
}

/// Pretty JSON for any serializable value
pub fn to_json<T: Serialize>(data: &T) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(data)?)
}

// ============================================================================
// Assets
// ============================================================================

#[derive(Tabled)]
struct AssetRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "DRM")]
    drm: String,
    #[tabled(rename = "Features")]
    features: String,
    #[tabled(rename = "Manifest")]
    manifest: String,
}

impl AssetRow {
    fn from_asset(asset: &AssetDescriptor) -> Self {
        Self {
            name: asset.name().to_string(),
            source: format!("{:?}", asset.source()),
            drm: key_systems_label(asset),
            features: asset
                .features()
                .iter()
                .map(|f| f.label())
                .collect::<Vec<_>>()
                .join(", "),
            manifest: resolution_label(asset),
        }
    }
}

fn key_systems_label(asset: &AssetDescriptor) -> String {
    if asset.is_clear() {
        return "clear".to_string();
    }
    asset
        .key_systems()
        .iter()
        .map(|k| k.name())
        .collect::<Vec<_>>()
        .join(", ")
}

fn resolution_label(asset: &AssetDescriptor) -> String {
    if let Some(url) = asset.media_tailor_url() {
        format!("MediaTailor {}", url)
    } else if let Some(key) = asset.ima_asset_key() {
        format!("DAI live {}", key)
    } else if let (Some(src), Some(video)) = (asset.ima_content_src_id(), asset.ima_video_id()) {
        format!("DAI VOD {}/{}", src, video)
    } else {
        asset.manifest_uri().to_string()
    }
}

/// Print a list of assets in the selected format
pub fn print_assets<'a>(
    assets: impl IntoIterator<Item = &'a AssetDescriptor>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let assets: Vec<&AssetDescriptor> = assets.into_iter().collect();
    match format {
        OutputFormat::Json => {
            let values = assets
                .iter()
                .map(|asset| asset.to_json())
                .collect::<kino_loader::Result<Vec<_>>>()?;
            println!("{}", to_json(&values)?);
        }
        OutputFormat::Table => {
            let rows: Vec<AssetRow> = assets.iter().map(|a| AssetRow::from_asset(a)).collect();
            println!("{}", Table::new(rows).with(Style::rounded()));
        }
        OutputFormat::Text => {
            if assets.is_empty() {
                println!("No assets");
            }
            for asset in assets {
                let marker = if asset.is_featured() { "*" } else { " " };
                let disabled = if asset.is_disabled() { " (disabled)" } else { "" };
                println!(
                    "{} {}{}  [{}]  {}",
                    marker,
                    style(asset.name()).bold(),
                    disabled,
                    key_systems_label(asset),
                    resolution_label(asset)
                );
            }
        }
    }
    Ok(())
}

/// Print one asset in detail
pub fn print_asset(asset: &AssetDescriptor, format: OutputFormat) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        println!("{}", to_json(&asset.to_json()?)?);
        return Ok(());
    }

    println!("{}", style(asset.name()).bold());
    if let Some(short) = asset.short_name() {
        println!("  Short name: {}", short);
    }
    if let Some(description) = asset.description() {
        println!("  Description: {}", description.replace('\n', " "));
    }
    println!("  Source: {:?}", asset.source());
    println!("  Resolves via: {}", resolution_label(asset));
    if let Some(mime) = asset.mime_type() {
        println!("  MIME type: {}", mime);
    }
    println!("  DRM: {}", key_systems_label(asset));
    for (id, uri) in asset.license_servers() {
        println!("    {} -> {}", id, uri);
    }
    for (name, value) in asset.license_request_headers().iter() {
        println!("    header {}: {}", name, value);
    }
    if let Some(cert) = asset.certificate_uri() {
        println!("  Server certificate: {}", cert);
    }
    if !asset.features().is_empty() {
        println!("  Features:");
        for feature in asset.features() {
            println!("    - {}", feature);
        }
    }
    if let Some(title) = asset.featured_title() {
        println!("  Featured as: {}", title);
    }
    if asset.stored_progress() > 0.0 {
        println!("  Stored: {:.0}%", asset.stored_progress() * 100.0);
    }
    Ok(())
}

// ============================================================================
// Load path
// ============================================================================

/// One line per controller event
pub fn print_event(event: &LoadPathEvent) {
    match event {
        LoadPathEvent::StateChanged(state) => println!("  -> {}", state_label(*state)),
        LoadPathEvent::Idle(state) => println!("  {}", style(format!("idle at {}", state)).dim()),
        LoadPathEvent::Error { code, message } => {
            println!("  {} {}", style(format!("[{}]", code)).red().bold(), message)
        }
    }
}

fn state_label(state: LoadPathState) -> String {
    if state.is_loaded() {
        style(state.name()).green().bold().to_string()
    } else if state.is_teardown() {
        style(state.name()).yellow().to_string()
    } else {
        style(state.name()).cyan().to_string()
    }
}
