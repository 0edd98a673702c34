use chrono::{DateTime, Utc};

/// A user as read from the on-premises directory.
///
/// One record per `sAMAccountName`; missing attributes come through as
/// empty strings so a sparse entry never fails the export.
#[derive(Debug, Clone, Default)]
pub struct DirectoryUser {
    pub username: String,
    pub display_name: String,
    pub department: String,
    pub title: String,
    pub email: String,
    pub enabled: bool,
    pub created: Option<DateTime<Utc>>,
    pub last_logon: Option<DateTime<Utc>>,
    pub when_changed: Option<DateTime<Utc>>,
    pub password_last_set: Option<DateTime<Utc>>,
    pub description: String,
    pub distinguished_name: String,
}

/// A user as read from Entra ID.
///
/// `username` is already normalized (lower-cased local part of the
/// userPrincipalName) and is the join key against the directory.
#[derive(Debug, Clone, Default)]
pub struct CloudUser {
    pub username: String,
    pub display_name: String,
    pub department: String,
    pub job_title: String,
    pub mail: String,
    pub enabled: bool,
    pub created: Option<DateTime<Utc>>,
    pub last_interactive_sign_in: Option<DateTime<Utc>>,
    pub last_non_interactive_sign_in: Option<DateTime<Utc>>,
}

/// One reconciled export row. All fields are the final strings written to
/// the CSV, so resolution happens exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedUser {
    pub username: String,
    pub display_name: String,
    pub department: String,
    pub title: String,
    pub email: String,
    pub in_directory: String,
    pub directory_enabled: String,
    pub directory_created: String,
    pub directory_last_logon: String,
    pub directory_when_changed: String,
    pub directory_password_last_set: String,
    pub description: String,
    pub distinguished_name: String,
    pub in_cloud: String,
    pub cloud_enabled: String,
    pub cloud_created: String,
    pub cloud_last_interactive_sign_in: String,
    pub cloud_last_non_interactive_sign_in: String,
}

impl MergedUser {
    /// Join a directory record with its optional Entra counterpart.
    ///
    /// Directory values win; empty directory fields fall back to the cloud
    /// equivalent (jobTitle -> Title, mail -> Email). Description and DN are
    /// directory-only. Pure function: same inputs always give the same row.
    #[must_use]
    pub fn resolve(directory: &DirectoryUser, cloud: Option<&CloudUser>) -> Self {
        Self {
            username: directory.username.clone(),
            display_name: fallback(
                &directory.display_name,
                cloud.map(|c| c.display_name.as_str()),
            ),
            department: fallback(&directory.department, cloud.map(|c| c.department.as_str())),
            title: fallback(&directory.title, cloud.map(|c| c.job_title.as_str())),
            email: fallback(&directory.email, cloud.map(|c| c.mail.as_str())),
            in_directory: "Yes".to_string(),
            directory_enabled: enabled_label(directory.enabled).to_string(),
            directory_created: format_date(directory.created),
            directory_last_logon: format_date(directory.last_logon),
            directory_when_changed: format_date(directory.when_changed),
            directory_password_last_set: format_date(directory.password_last_set),
            description: directory.description.clone(),
            distinguished_name: directory.distinguished_name.clone(),
            in_cloud: if cloud.is_some() { "Yes" } else { "No" }.to_string(),
            // An absent cloud record is indistinguishable from a disabled one.
            cloud_enabled: enabled_label(cloud.is_some_and(|c| c.enabled)).to_string(),
            cloud_created: format_date(cloud.and_then(|c| c.created)),
            cloud_last_interactive_sign_in: format_date(
                cloud.and_then(|c| c.last_interactive_sign_in),
            ),
            cloud_last_non_interactive_sign_in: format_date(
                cloud.and_then(|c| c.last_non_interactive_sign_in),
            ),
        }
    }

    /// Field values in export column order (see `constants::CSV_COLUMNS`).
    #[must_use]
    pub fn to_record(&self) -> [&str; 18] {
        [
            self.username.as_str(),
            self.display_name.as_str(),
            self.department.as_str(),
            self.title.as_str(),
            self.email.as_str(),
            self.in_directory.as_str(),
            self.directory_enabled.as_str(),
            self.directory_created.as_str(),
            self.directory_last_logon.as_str(),
            self.directory_when_changed.as_str(),
            self.directory_password_last_set.as_str(),
            self.description.as_str(),
            self.distinguished_name.as_str(),
            self.in_cloud.as_str(),
            self.cloud_enabled.as_str(),
            self.cloud_created.as_str(),
            self.cloud_last_interactive_sign_in.as_str(),
            self.cloud_last_non_interactive_sign_in.as_str(),
        ]
    }
}

/// Lower-cased local part of a principal name (`jdoe` from
/// `JDoe@contoso.com`). Plain usernames pass through lower-cased.
#[must_use]
pub fn normalize_username(principal: &str) -> String {
    principal
        .split('@')
        .next()
        .unwrap_or(principal)
        .trim()
        .to_lowercase()
}

/// Date-only rendering used for every timestamp column.
#[must_use]
pub fn format_date(value: Option<DateTime<Utc>>) -> String {
    value
        .map(|v| v.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

fn fallback(primary: &str, secondary: Option<&str>) -> String {
    if primary.is_empty() {
        secondary.unwrap_or_default().to_string()
    } else {
        primary.to_string()
    }
}

fn enabled_label(enabled: bool) -> &'static str {
    if enabled { "Enabled" } else { "Disabled" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn jdoe_directory() -> DirectoryUser {
        DirectoryUser {
            username: "jdoe".to_string(),
            display_name: "John Doe".to_string(),
            enabled: true,
            created: Utc.with_ymd_and_hms(2020, 3, 14, 9, 26, 53).single(),
            distinguished_name: "CN=John Doe,OU=Staff,DC=contoso,DC=com".to_string(),
            ..Default::default()
        }
    }

    fn jdoe_cloud() -> CloudUser {
        CloudUser {
            username: normalize_username("JDoe@contoso.com"),
            display_name: "John D.".to_string(),
            department: "Sales".to_string(),
            job_title: "Engineer".to_string(),
            enabled: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_directory_values_win_with_cloud_fallback() {
        let cloud = jdoe_cloud();
        let merged = MergedUser::resolve(&jdoe_directory(), Some(&cloud));

        assert_eq!(merged.username, "jdoe");
        assert_eq!(merged.display_name, "John Doe");
        assert_eq!(merged.department, "Sales");
        assert_eq!(merged.title, "Engineer");
        assert_eq!(merged.in_directory, "Yes");
        assert_eq!(merged.in_cloud, "Yes");
        assert_eq!(merged.directory_enabled, "Enabled");
        assert_eq!(merged.directory_created, "2020-03-14");
    }

    #[test]
    fn test_directory_only_user() {
        let directory = DirectoryUser {
            username: "asmith".to_string(),
            display_name: "Anna Smith".to_string(),
            enabled: false,
            ..Default::default()
        };
        let merged = MergedUser::resolve(&directory, None);

        assert_eq!(merged.in_directory, "Yes");
        assert_eq!(merged.in_cloud, "No");
        assert_eq!(merged.directory_enabled, "Disabled");
        assert_eq!(merged.cloud_enabled, "Disabled");
        assert_eq!(merged.cloud_created, "");
        assert_eq!(merged.cloud_last_interactive_sign_in, "");
        assert_eq!(merged.cloud_last_non_interactive_sign_in, "");
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let directory = jdoe_directory();
        let cloud = jdoe_cloud();
        assert_eq!(
            MergedUser::resolve(&directory, Some(&cloud)),
            MergedUser::resolve(&directory, Some(&cloud))
        );
    }

    #[test]
    fn test_record_matches_column_count() {
        let merged = MergedUser::resolve(&jdoe_directory(), None);
        assert_eq!(
            merged.to_record().len(),
            crate::constants::CSV_COLUMNS.len()
        );
    }

    #[test]
    fn test_normalize_username() {
        assert_eq!(normalize_username("JDoe@contoso.com"), "jdoe");
        assert_eq!(normalize_username("ASmith"), "asmith");
        assert_eq!(normalize_username("x@y@z"), "x");
        // Idempotent: normalizing a normalized name is a no-op.
        assert_eq!(normalize_username(&normalize_username("JDoe@contoso.com")), "jdoe");
    }

    #[test]
    fn test_format_date() {
        let dt = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).single();
        assert_eq!(format_date(dt), "2024-01-15");
        assert_eq!(format_date(None), "");
    }
}
