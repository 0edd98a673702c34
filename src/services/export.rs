use anyhow::{Context, Result};
use std::fs::File;
use std::path::Path;

use crate::constants::CSV_COLUMNS;
use crate::models::user::MergedUser;

/// Append-only CSV sink for merged records.
///
/// The header is written and flushed at creation time, so a run that
/// produces no records still leaves a valid header-only file. Every
/// appended row is flushed individually; an interrupted run leaves a
/// readable partial export.
pub struct CsvExporter {
    writer: csv::Writer<File>,
}

impl CsvExporter {
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create output directory {}", parent.display()))?;
        }

        let file = File::create(path)
            .with_context(|| format!("Failed to create export file {}", path.display()))?;

        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(CSV_COLUMNS)?;
        writer.flush()?;

        Ok(Self { writer })
    }

    pub fn append(&mut self, user: &MergedUser) -> Result<()> {
        self.writer.write_record(user.to_record())?;
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::{CloudUser, DirectoryUser};

    #[test]
    fn test_header_only_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");

        let _exporter = CsvExporter::create(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        let header = lines.next().unwrap();
        assert_eq!(header.split(',').count(), CSV_COLUMNS.len());
        assert!(header.starts_with("Username,DisplayName"));
        assert!(header.ends_with("Entra_LastNonInteractiveSignIn"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn test_append_escapes_and_keeps_multibyte_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.csv");

        let directory = DirectoryUser {
            username: "ynakamura".to_string(),
            display_name: "中村 優子".to_string(),
            description: "Contractor, on loan".to_string(),
            enabled: true,
            ..Default::default()
        };
        let cloud = CloudUser {
            username: "ynakamura".to_string(),
            department: "研究開発".to_string(),
            ..Default::default()
        };

        let mut exporter = CsvExporter::create(&path).unwrap();
        exporter
            .append(&crate::models::user::MergedUser::resolve(
                &directory,
                Some(&cloud),
            ))
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("中村 優子"));
        assert!(content.contains("研究開発"));
        assert!(content.contains("\"Contractor, on loan\""));
        assert_eq!(content.lines().count(), 2);
    }
}
