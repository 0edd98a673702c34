use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, Scope, SearchEntry};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::DirectoryConfig;
use crate::constants::ldap::USER_ATTRIBUTES;
use crate::models::user::DirectoryUser;

/// Seconds between the Windows FILETIME epoch (1601-01-01) and the Unix
/// epoch.
const FILETIME_EPOCH_OFFSET_SECS: i64 = 11_644_473_600;

/// userAccountControl bit marking a disabled account.
const UAC_ACCOUNT_DISABLED: u64 = 0x2;

/// Bound connection to the on-premises directory.
pub struct DirectoryClient {
    ldap: Ldap,
    base_dn: String,
}

impl DirectoryClient {
    /// Connect and bind. A failure here is fatal to the run; without the
    /// directory there is nothing to export.
    pub async fn connect(config: &DirectoryConfig) -> Result<Self> {
        let url = if config.use_ssl {
            format!("ldaps://{}:{}", config.host, config.port)
        } else {
            format!("ldap://{}:{}", config.host, config.port)
        };

        debug!("Connecting to directory at {}", url);

        let settings = LdapConnSettings::new()
            .set_conn_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .set_starttls(config.use_starttls);

        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &url)
            .await
            .with_context(|| format!("Failed to connect to directory at {url}"))?;

        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!("LDAP connection driver error: {}", e);
            }
        });

        let result = ldap
            .simple_bind(&config.bind_dn, &config.bind_password)
            .await
            .with_context(|| format!("LDAP bind failed for {}", config.bind_dn))?;

        if result.rc != 0 {
            anyhow::bail!(
                "LDAP bind failed with code {}: {}",
                result.rc,
                result.text
            );
        }

        Ok(Self {
            ldap,
            base_dn: config.base_dn.clone(),
        })
    }

    /// All user accounts whose sAMAccountName starts with `prefix`.
    /// Entries without a sAMAccountName are dropped.
    pub async fn search_users(&mut self, prefix: char) -> Result<Vec<DirectoryUser>> {
        let filter = user_prefix_filter(prefix);

        let (entries, _result) = self
            .ldap
            .search(
                &self.base_dn,
                Scope::Subtree,
                &filter,
                USER_ATTRIBUTES.to_vec(),
            )
            .await
            .with_context(|| format!("Directory search failed for prefix '{prefix}'"))?
            .success()
            .with_context(|| format!("Directory search returned an error for prefix '{prefix}'"))?;

        debug!("Prefix '{}' returned {} entries", prefix, entries.len());

        Ok(entries
            .into_iter()
            .map(SearchEntry::construct)
            .filter_map(|entry| map_entry(&entry))
            .collect())
    }
}

/// Filter for one prefix partition of the user population.
pub(crate) fn user_prefix_filter(prefix: char) -> String {
    format!(
        "(&(objectCategory=person)(objectClass=user)(sAMAccountName={}*))",
        escape_filter_value(&prefix.to_string())
    )
}

/// Escape special characters in LDAP filter values (RFC 4515).
fn escape_filter_value(value: &str) -> String {
    value
        .replace('\\', "\\5c")
        .replace('*', "\\2a")
        .replace('(', "\\28")
        .replace(')', "\\29")
        .replace('\0', "\\00")
}

fn map_entry(entry: &SearchEntry) -> Option<DirectoryUser> {
    let username = attr(entry, "sAMAccountName");
    if username.is_empty() {
        debug!("Skipping entry without sAMAccountName: {}", entry.dn);
        return None;
    }

    let uac: u64 = attr(entry, "userAccountControl").parse().unwrap_or(0);

    Some(DirectoryUser {
        username,
        display_name: attr(entry, "displayName"),
        department: attr(entry, "department"),
        title: attr(entry, "title"),
        email: attr(entry, "mail"),
        enabled: uac & UAC_ACCOUNT_DISABLED == 0,
        created: parse_generalized_time(&attr(entry, "whenCreated")),
        last_logon: filetime_to_datetime(&attr(entry, "lastLogonTimestamp")),
        when_changed: parse_generalized_time(&attr(entry, "whenChanged")),
        password_last_set: filetime_to_datetime(&attr(entry, "pwdLastSet")),
        description: attr(entry, "description"),
        distinguished_name: attr(entry, "distinguishedName"),
    })
}

fn attr(entry: &SearchEntry, name: &str) -> String {
    entry
        .attrs
        .get(name)
        .and_then(|values| values.first())
        .cloned()
        .unwrap_or_default()
}

/// Latest second this tool treats as a real timestamp
/// (9999-12-31T23:59:59Z). AD's "never" sentinel lands far beyond it.
const MAX_CALENDAR_SECS: i64 = 253_402_300_799;

/// Convert a Windows FILETIME string (100ns ticks since 1601-01-01) to a
/// UTC timestamp. Zero, negative and sentinel values come back as None.
pub(crate) fn filetime_to_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let ticks: i64 = raw.trim().parse().ok()?;
    if ticks <= 0 {
        return None;
    }

    let secs = ticks / 10_000_000 - FILETIME_EPOCH_OFFSET_SECS;
    if !(0..=MAX_CALENDAR_SECS).contains(&secs) {
        return None;
    }

    Utc.timestamp_opt(secs, 0).single()
}

/// Parse an AD GeneralizedTime value such as `20240115100000.0Z`.
pub(crate) fn parse_generalized_time(raw: &str) -> Option<DateTime<Utc>> {
    let compact = raw.trim().trim_end_matches('Z');
    let compact = compact.split('.').next()?;

    NaiveDateTime::parse_from_str(compact, "%Y%m%d%H%M%S")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn entry_with(attrs: &[(&str, &str)]) -> SearchEntry {
        SearchEntry {
            dn: "CN=Test,DC=contoso,DC=com".to_string(),
            attrs: attrs
                .iter()
                .map(|(k, v)| ((*k).to_string(), vec![(*v).to_string()]))
                .collect(),
            bin_attrs: HashMap::new(),
        }
    }

    #[test]
    fn test_prefix_filter() {
        assert_eq!(
            user_prefix_filter('a'),
            "(&(objectCategory=person)(objectClass=user)(sAMAccountName=a*))"
        );
        assert_eq!(
            user_prefix_filter('*'),
            "(&(objectCategory=person)(objectClass=user)(sAMAccountName=\\2a*))"
        );
    }

    #[test]
    fn test_filetime_conversion() {
        // 11_644_473_600 seconds in ticks lands exactly on the Unix epoch.
        let epoch = filetime_to_datetime("116444736000000000").unwrap();
        assert_eq!(epoch.format("%Y-%m-%d %H:%M:%S").to_string(), "1970-01-01 00:00:00");

        assert!(filetime_to_datetime("0").is_none());
        assert!(filetime_to_datetime("").is_none());
        assert!(filetime_to_datetime("not-a-number").is_none());
        // AD's "never expires" sentinel is outside the calendar window.
        assert!(filetime_to_datetime("9223372036854775807").is_none());
        // Pre-1601 underflow and anything past year 9999 are rejected too.
        assert!(filetime_to_datetime("1").is_none());
        assert!(filetime_to_datetime("2650467744000000000").is_none());
    }

    #[test]
    fn test_generalized_time() {
        let parsed = parse_generalized_time("20240115100000.0Z").unwrap();
        assert_eq!(parsed.format("%Y-%m-%d").to_string(), "2024-01-15");

        assert!(parse_generalized_time("").is_none());
        assert!(parse_generalized_time("garbage").is_none());
    }

    #[test]
    fn test_map_entry_full() {
        let entry = entry_with(&[
            ("sAMAccountName", "jdoe"),
            ("displayName", "John Doe"),
            ("department", "Sales"),
            ("title", "Engineer"),
            ("mail", "jdoe@contoso.com"),
            ("userAccountControl", "512"),
            ("whenCreated", "20200314092653.0Z"),
            ("pwdLastSet", "116444736000000000"),
            ("distinguishedName", "CN=John Doe,DC=contoso,DC=com"),
        ]);

        let user = map_entry(&entry).unwrap();
        assert_eq!(user.username, "jdoe");
        assert!(user.enabled);
        assert_eq!(user.email, "jdoe@contoso.com");
        assert_eq!(user.created.unwrap().format("%Y-%m-%d").to_string(), "2020-03-14");
        assert!(user.password_last_set.is_some());
        assert!(user.last_logon.is_none());
    }

    #[test]
    fn test_map_entry_disabled_account() {
        let entry = entry_with(&[("sAMAccountName", "asmith"), ("userAccountControl", "514")]);

        let user = map_entry(&entry).unwrap();
        assert!(!user.enabled);
    }

    #[test]
    fn test_map_entry_requires_username() {
        let entry = entry_with(&[("displayName", "Ghost")]);
        assert!(map_entry(&entry).is_none());
    }
}
