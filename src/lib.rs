//! Divided edge bundling for directed graphs with fixed node positions.
//! Library for embedding and testing; the binary wraps [`run`].

pub mod bundle;
pub mod core;
pub mod io;

use bevy::app::TaskPoolPlugin;
use bevy::log::LogPlugin;
use bevy::prelude::*;

pub use crate::bundle::{bundle_edges, max_lateral_offset, EdgeBundler};
pub use crate::core::config::{load_config, load_config_from, BundleConfig, SubdivisionGrowth};
pub use crate::core::error::{BundleError, BundleResult};
pub use crate::core::graph::{
    BundleOverlay, BundledEdge, BundledGraph, DirectedGraph, Edge, EdgeBundle, EdgeId, Node,
};
pub use crate::core::progress::{
    CancelToken, ChannelProgress, LogProgress, NoProgress, Phase, ProgressEvent, ProgressObserver,
};

use io::headless::{
    BundleOutcome, BundleSource, BundlingPlugin, HeadlessArgs, HeadlessExportConfig,
    PendingBundle, USAGE,
};

/// Run the headless bundler: read a snapshot, bundle it, export it, exit.
pub fn run() {
    let args = match HeadlessArgs::parse(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}\n{}", e, USAGE);
            std::process::exit(2);
        }
    };
    if args.help {
        println!("{}", USAGE);
        return;
    }

    let mut app = App::new();
    app.add_plugins((TaskPoolPlugin::default(), LogPlugin::default()));

    let config = match &args.config {
        Some(path) => match load_config_from(path) {
            Ok(config) => config,
            Err(e) => {
                error!("[CONFIG] {}: {}", path.display(), e);
                std::process::exit(2);
            }
        },
        None => load_config(),
    };

    let source = match args.input {
        Some(path) => BundleSource::Path(path),
        None => match io::stdin::read_stdin_snapshot() {
            Ok(Some(snapshot)) => BundleSource::Snapshot(snapshot),
            Ok(None) => {
                eprintln!("no input: pass --input or pipe a snapshot on stdin\n{}", USAGE);
                std::process::exit(2);
            }
            Err(e) => {
                error!("[LOAD] Failed to parse stdin: {}", e);
                std::process::exit(2);
            }
        },
    };

    let stdout = args.export.is_none();
    app.insert_resource(config)
        .insert_resource(HeadlessExportConfig {
            export_path: args.export,
            stdout,
        })
        .insert_resource(PendingBundle(Some(source)))
        .add_plugins(BundlingPlugin);
    app.update();

    let outcome = app.world_mut().resource_mut::<BundleOutcome>().0.take();
    match outcome {
        Some(Ok(_)) => {}
        Some(Err(e)) if e.is_configuration_error() => std::process::exit(2),
        _ => std::process::exit(1),
    }
}
