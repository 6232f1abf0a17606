//! Headless bundling: `divided-edges [--config file.toml] [--input graph.json] [--export out.json]`
//!
//! The pipeline runs as a Bevy system. A request is placed in
//! [`PendingBundle`]; the next `update()` bundles it, writes the export and
//! stores the result in [`BundleOutcome`].

use bevy::prelude::*;
use std::path::PathBuf;

use crate::bundle::EdgeBundler;
use crate::core::config::BundleConfig;
use crate::core::error::BundleResult;
use crate::core::graph::BundledGraph;
use crate::core::progress::LogProgress;
use crate::io::file_io::{load_snapshot, save_bundled, write_bundled_to, GraphSnapshot};

/// Where the graph to bundle comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum BundleSource {
    Snapshot(GraphSnapshot),
    Path(PathBuf),
}

/// Bundling request, consumed by [`process_pending_bundle_system`].
#[derive(Resource, Default)]
pub struct PendingBundle(pub Option<BundleSource>);

/// Where finished bundles are written.
#[derive(Resource, Debug, Clone, Default)]
pub struct HeadlessExportConfig {
    pub export_path: Option<PathBuf>,
    /// Print to stdout when there is no export path.
    pub stdout: bool,
}

/// Result of the most recent request. `None` until one has run.
#[derive(Resource, Default)]
pub struct BundleOutcome(pub Option<BundleResult<BundledGraph>>);

/// Command-line options of the headless binary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeadlessArgs {
    pub config: Option<PathBuf>,
    pub input: Option<PathBuf>,
    pub export: Option<PathBuf>,
    pub help: bool,
}

pub const USAGE: &str = "usage: divided-edges [--config file.toml] [--input graph.json] [--export out.json]";

impl HeadlessArgs {
    pub fn parse(args: impl IntoIterator<Item = String>) -> Result<Self, String> {
        let mut parsed = Self::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            let slot = match arg.as_str() {
                "--config" => &mut parsed.config,
                "--input" => &mut parsed.input,
                "--export" => &mut parsed.export,
                "-h" | "--help" => {
                    parsed.help = true;
                    continue;
                }
                other => return Err(format!("unknown argument `{}`", other)),
            };
            match args.next() {
                Some(value) => *slot = Some(PathBuf::from(value)),
                None => return Err(format!("`{}` needs a value", arg)),
            }
        }
        Ok(parsed)
    }
}

/// Registers the bundling resources and system.
pub struct BundlingPlugin;

impl Plugin for BundlingPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<BundleConfig>()
            .init_resource::<PendingBundle>()
            .init_resource::<HeadlessExportConfig>()
            .init_resource::<BundleOutcome>()
            .add_systems(Update, process_pending_bundle_system);
    }
}

fn run_request(
    source: BundleSource,
    config: &BundleConfig,
    export: &HeadlessExportConfig,
) -> BundleResult<BundledGraph> {
    let snapshot = match source {
        BundleSource::Snapshot(snapshot) => snapshot,
        BundleSource::Path(path) => load_snapshot(&path)?,
    };
    let graph = snapshot.to_graph();
    let bundled = EdgeBundler::new(config.clone())
        .with_observer(LogProgress)
        .bundle(&graph)?;

    if let Some(path) = &export.export_path {
        save_bundled(path, &bundled)?;
    } else if export.stdout {
        write_bundled_to(std::io::stdout().lock(), &bundled)?;
    }
    Ok(bundled)
}

/// Runs a pending request, if any.
pub fn process_pending_bundle_system(
    mut pending: ResMut<PendingBundle>,
    mut outcome: ResMut<BundleOutcome>,
    config: Res<BundleConfig>,
    export: Res<HeadlessExportConfig>,
) {
    let Some(source) = pending.0.take() else {
        return;
    };
    let result = run_request(source, &config, &export);
    match &result {
        Ok(bundled) => info!("[BUNDLE] Bundled {} edges", bundled.edges.len()),
        Err(e) => error!("[BUNDLE] Failed: {}", e),
    }
    outcome.0 = Some(result);
}
