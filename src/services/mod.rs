pub mod export;
pub mod reconcile;

pub use export::CsvExporter;
pub use reconcile::{
    ConsoleProgress, Progress, ProgressSink, ReconcileService, ReconcileStats, build_cloud_index,
};
