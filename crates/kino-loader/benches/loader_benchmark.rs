//! Benchmark tests for kino-loader operations
//!
//! Run with: cargo bench -p kino-loader

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use kino_loader::load_path::{next_step, Detours, Goal, LoadPath};
use kino_loader::{
    AssetCatalog, AssetDescriptor, Feature, KeySystem, LoadPathConfig, LoadPathController,
    LoadPathState, LoadRequest, MediaElement, MemoryStore, SimulatedPlatform, Source,
};

// ============================================================================
// Helpers
// ============================================================================

fn create_test_asset(index: usize) -> AssetDescriptor {
    AssetDescriptor::new(
        format!("Asset {index}"),
        "https://storage.example.com/icon.png",
        format!("https://storage.example.com/{index}/dash.mpd"),
        Source::Shaka,
    )
    .add_key_system(KeySystem::Widevine)
    .add_license_server("com.widevine.alpha", "https://license.example.com/wv")
    .add_license_request_header("X-Token", format!("token-{index}"))
    .add_feature(Feature::Dash)
    .add_feature(Feature::HighDefinition)
    .add_description("Benchmark asset")
}

fn create_test_catalog(count: usize) -> AssetCatalog {
    let mut catalog = AssetCatalog::new();
    for index in 0..count {
        catalog.add(create_test_asset(index)).unwrap();
    }
    catalog
}

// ============================================================================
// Catalog
// ============================================================================

fn bench_catalog_persistence(c: &mut Criterion) {
    let mut group = c.benchmark_group("Catalog Persistence");

    for &count in &[1, 10, 100] {
        let catalog = create_test_catalog(count);

        group.bench_with_input(BenchmarkId::new("save", count), &catalog, |b, catalog| {
            let store = MemoryStore::new();
            b.iter(|| catalog.save(black_box(&store)).unwrap());
        });

        let store = MemoryStore::new();
        catalog.save(&store).unwrap();
        group.bench_with_input(BenchmarkId::new("restore", count), &store, |b, store| {
            b.iter(|| black_box(AssetCatalog::restore(store, None).unwrap()));
        });
    }

    group.finish();
}

fn bench_asset_derivations(c: &mut Criterion) {
    let mut group = c.benchmark_group("Asset Derivations");
    let asset = create_test_asset(0).set_extra_config(serde_json::json!({
        "drm": { "retryParameters": { "maxAttempts": 5 } }
    }));

    group.bench_function("validate", |b| b.iter(|| black_box(&asset).validate().unwrap()));
    group.bench_function("player_configuration", |b| {
        b.iter(|| black_box(black_box(&asset).player_configuration()))
    });
    group.bench_function("load_request", |b| {
        b.iter(|| black_box(LoadRequest::from_asset(black_box(&asset)).unwrap()))
    });

    group.finish();
}

// ============================================================================
// Load path
// ============================================================================

fn route(from: LoadPathState, goal: Goal, mut detours: Detours) -> usize {
    let mut at = from;
    let mut steps = 0;
    while let Some(next) = next_step(at, goal, detours) {
        if next == LoadPathState::Unload {
            detours.unload = false;
        }
        if next == LoadPathState::Detach {
            detours.detach = false;
        }
        at = next;
        steps += 1;
    }
    steps
}

fn bench_routing(c: &mut Criterion) {
    let mut group = c.benchmark_group("Routing");
    let reload = Detours {
        unload: true,
        detach: false,
    };

    group.bench_function("detach_to_load", |b| {
        b.iter(|| {
            route(
                black_box(LoadPathState::Detach),
                Goal::Load {
                    path: LoadPath::MediaSource,
                },
                Detours::default(),
            )
        })
    });
    group.bench_function("reload", |b| {
        b.iter(|| {
            route(
                black_box(LoadPathState::Load),
                Goal::Load {
                    path: LoadPath::MediaSource,
                },
                reload,
            )
        })
    });

    group.finish();
}

fn bench_simulated_walks(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    let mut group = c.benchmark_group("Simulated Walks");

    group.bench_function("attach_load_unload", |b| {
        b.iter(|| {
            rt.block_on(async {
                let platform = SimulatedPlatform::new();
                let player =
                    LoadPathController::new(platform.collaborators(), LoadPathConfig::default());
                player.attach(MediaElement::new("video")).await.unwrap();
                player
                    .load(LoadRequest::uri("https://cdn.example.com/master.m3u8"))
                    .await
                    .unwrap();
                black_box(player.unload().await.unwrap())
            })
        });
    });

    group.finish();
}

criterion_group!(catalog_benches, bench_catalog_persistence, bench_asset_derivations);

criterion_group!(load_path_benches, bench_routing, bench_simulated_walks);

criterion_main!(catalog_benches, load_path_benches);
