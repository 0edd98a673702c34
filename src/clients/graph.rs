use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::EntraConfig;
use crate::constants::graph::{PAGE_SIZE, USER_SELECT_FIELDS};
use crate::models::user::{CloudUser, normalize_username};

const LOGIN_ENDPOINT: &str = "https://login.microsoftonline.com";
const GRAPH_ENDPOINT: &str = "https://graph.microsoft.com";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_expired(&self, grace_period: Duration) -> bool {
        Utc::now() + grace_period >= self.expires_at
    }
}

#[derive(Debug, Deserialize)]
struct ODataPage<T> {
    value: Vec<T>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphUser {
    user_principal_name: Option<String>,
    display_name: Option<String>,
    department: Option<String>,
    job_title: Option<String>,
    mail: Option<String>,
    account_enabled: Option<bool>,
    created_date_time: Option<DateTime<Utc>>,
    sign_in_activity: Option<SignInActivity>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInActivity {
    last_sign_in_date_time: Option<DateTime<Utc>>,
    last_non_interactive_sign_in_date_time: Option<DateTime<Utc>>,
}

/// Microsoft Graph client scoped to the one bulk user listing this tool
/// needs. Tokens come from the client-credentials flow and are cached
/// until shortly before expiry.
pub struct GraphClient {
    client: Client,
    tenant_id: String,
    client_id: String,
    client_secret: String,
    cached_token: RwLock<Option<CachedToken>>,
}

impl GraphClient {
    #[must_use]
    pub fn new(config: &EntraConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| Client::new()),
            tenant_id: config.tenant_id.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            cached_token: RwLock::new(None),
        }
    }

    /// Fetch every user account, following `@odata.nextLink` until the
    /// listing is exhausted. Accounts without a userPrincipalName are
    /// skipped.
    pub async fn list_users(&self) -> Result<Vec<CloudUser>> {
        let mut users = Vec::new();
        let mut url = format!(
            "{GRAPH_ENDPOINT}/v1.0/users?$select={USER_SELECT_FIELDS}&$top={PAGE_SIZE}"
        );

        loop {
            let page = self.get_page(&url).await?;

            for raw in page.value {
                match map_graph_user(raw) {
                    Some(user) => users.push(user),
                    None => debug!("Skipping Entra account without userPrincipalName"),
                }
            }

            match page.next_link {
                Some(next) => url = next,
                None => break,
            }
        }

        Ok(users)
    }

    async fn get_page(&self, url: &str) -> Result<ODataPage<GraphUser>> {
        let token = self.get_token().await?;

        let response = self.client.get(url).bearer_auth(&token).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Graph API error: {} - {}", status, body));
        }

        Ok(response.json().await?)
    }

    async fn get_token(&self) -> Result<String> {
        {
            let cache = self.cached_token.read().await;
            if let Some(ref token) = *cache
                && !token.is_expired(Duration::minutes(5))
            {
                return Ok(token.access_token.clone());
            }
        }

        debug!("Acquiring Graph access token");
        let token = self.acquire_token().await?;
        let access_token = token.access_token.clone();

        {
            let mut cache = self.cached_token.write().await;
            *cache = Some(token);
        }

        Ok(access_token)
    }

    async fn acquire_token(&self) -> Result<CachedToken> {
        let token_url = format!(
            "{LOGIN_ENDPOINT}/{}/oauth2/v2.0/token",
            self.tenant_id
        );

        let scope = format!("{GRAPH_ENDPOINT}/.default");
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", scope.as_str()),
        ];

        let response = self.client.post(&token_url).form(&params).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "Token request failed: {} - {}",
                status,
                body
            ));
        }

        let token: TokenResponse = response.json().await?;
        let expires_at = Utc::now() + Duration::seconds(token.expires_in);

        Ok(CachedToken {
            access_token: token.access_token,
            expires_at,
        })
    }
}

fn map_graph_user(raw: GraphUser) -> Option<CloudUser> {
    let principal = raw.user_principal_name?;
    let activity = raw.sign_in_activity;

    Some(CloudUser {
        username: normalize_username(&principal),
        display_name: raw.display_name.unwrap_or_default(),
        department: raw.department.unwrap_or_default(),
        job_title: raw.job_title.unwrap_or_default(),
        mail: raw.mail.unwrap_or_default(),
        enabled: raw.account_enabled.unwrap_or_default(),
        created: raw.created_date_time,
        last_interactive_sign_in: activity.as_ref().and_then(|a| a.last_sign_in_date_time),
        last_non_interactive_sign_in: activity
            .as_ref()
            .and_then(|a| a.last_non_interactive_sign_in_date_time),
    })
}
