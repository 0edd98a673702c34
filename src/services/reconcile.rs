use anyhow::Result;
use std::collections::HashMap;
use tracing::{info, warn};

use crate::clients::graph::GraphClient;
use crate::clients::ldap::DirectoryClient;
use crate::constants::USERNAME_PREFIXES;
use crate::models::user::{CloudUser, DirectoryUser, MergedUser, normalize_username};
use crate::services::export::CsvExporter;

/// Per-record progress events raised during both phases of a run.
pub enum Progress<'a> {
    CloudIndexed {
        count: usize,
        username: &'a str,
        display_name: &'a str,
    },
    Merged {
        count: usize,
        username: &'a str,
        in_cloud: bool,
    },
}

/// Receiver for progress events. The reconcile core takes this as a
/// parameter so it stays testable without capturing stdout.
pub trait ProgressSink {
    fn notify(&self, progress: Progress<'_>);
}

/// Prints one line per record, the way the tool reports on a terminal.
pub struct ConsoleProgress;

impl ProgressSink for ConsoleProgress {
    fn notify(&self, progress: Progress<'_>) {
        match progress {
            Progress::CloudIndexed {
                count,
                username,
                display_name,
            } => {
                println!("  [{count}] Indexed {username} ({display_name})");
            }
            Progress::Merged {
                count,
                username,
                in_cloud,
            } => {
                let marker = if in_cloud { "✓" } else { "○" };
                println!("  [{count}] {marker} {username}");
            }
        }
    }
}

/// Counters returned to the command layer for the end-of-run summary.
#[derive(Debug, Default)]
pub struct ReconcileStats {
    pub directory_users: usize,
    pub matched: usize,
    pub cloud_index_size: usize,
    pub failed_prefixes: Vec<char>,
}

/// Build the username -> cloud record index consumed by the merge phase.
///
/// Duplicate usernames (two principals sharing a local part) resolve
/// last-write-wins; each collision is logged so the ambiguity is visible.
/// The returned map is never mutated again.
pub fn build_cloud_index<I>(users: I, progress: &dyn ProgressSink) -> HashMap<String, CloudUser>
where
    I: IntoIterator<Item = CloudUser>,
{
    let mut index = HashMap::new();
    let mut count = 0;

    for user in users {
        count += 1;
        progress.notify(Progress::CloudIndexed {
            count,
            username: &user.username,
            display_name: &user.display_name,
        });

        if let Some(previous) = index.insert(user.username.clone(), user) {
            warn!(
                "Duplicate Entra principal local part '{}', keeping the later record",
                previous.username
            );
        }
    }

    index
}

/// Merge a batch of directory records against the cloud index and append
/// each result to the exporter immediately.
pub fn merge_and_emit(
    users: Vec<DirectoryUser>,
    index: &HashMap<String, CloudUser>,
    exporter: &mut CsvExporter,
    stats: &mut ReconcileStats,
    progress: &dyn ProgressSink,
) -> Result<()> {
    for user in users {
        let cloud = index.get(&normalize_username(&user.username));
        let merged = MergedUser::resolve(&user, cloud);

        stats.directory_users += 1;
        if cloud.is_some() {
            stats.matched += 1;
        }

        progress.notify(Progress::Merged {
            count: stats.directory_users,
            username: &user.username,
            in_cloud: cloud.is_some(),
        });

        exporter.append(&merged)?;
    }

    Ok(())
}

/// Drives the two-phase run: cloud index build, then prefix-partitioned
/// directory iteration with merge and emit.
pub struct ReconcileService {
    directory: DirectoryClient,
    graph: Option<GraphClient>,
    exporter: CsvExporter,
}

impl ReconcileService {
    #[must_use]
    pub fn new(
        directory: DirectoryClient,
        graph: Option<GraphClient>,
        exporter: CsvExporter,
    ) -> Self {
        Self {
            directory,
            graph,
            exporter,
        }
    }

    /// Run to completion. A cloud failure degrades to a directory-only
    /// export; a failed prefix query is skipped and recorded in the stats.
    pub async fn run(mut self, progress: &dyn ProgressSink) -> Result<ReconcileStats> {
        let index = match &self.graph {
            Some(graph) => match graph.list_users().await {
                Ok(users) => build_cloud_index(users, progress),
                Err(e) => {
                    warn!(
                        "Entra bulk query failed, continuing with directory data only: {e:#}"
                    );
                    HashMap::new()
                }
            },
            None => {
                info!("Entra source disabled, exporting directory data only");
                HashMap::new()
            }
        };

        let mut stats = ReconcileStats {
            cloud_index_size: index.len(),
            ..Default::default()
        };

        info!("Indexed {} Entra users", stats.cloud_index_size);

        for &prefix in USERNAME_PREFIXES {
            let users = match self.directory.search_users(prefix).await {
                Ok(users) => users,
                Err(e) => {
                    warn!("Skipping prefix '{prefix}' after directory query failure: {e:#}");
                    stats.failed_prefixes.push(prefix);
                    continue;
                }
            };

            merge_and_emit(users, &index, &mut self.exporter, &mut stats, progress)?;
        }

        Ok(stats)
    }
}
