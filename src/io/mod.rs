pub mod file_io;
pub mod headless;
pub mod stdin;

pub use file_io::{
    load_snapshot, read_snapshot_from, save_bundled, write_bundled_to, BundledSnapshot,
    GraphSnapshot, SerializableBundledEdge, SerializableEdge, SerializableNode,
};
pub use headless::{
    process_pending_bundle_system, BundleOutcome, BundleSource, BundlingPlugin, HeadlessArgs,
    HeadlessExportConfig, PendingBundle,
};
