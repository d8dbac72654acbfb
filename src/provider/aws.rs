//! AWS IAM Query API client
//!
//! Talks to IAM over form-encoded, SigV4-signed POST requests and parses
//! the XML responses with quick-xml. List calls follow `Marker` until
//! `IsTruncated` is false.

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info};

use super::sigv4::{self, SigningRequest};
use super::{AccessKey, Account, IdentityProvider, KeyStatus};
use crate::error::ProviderError;

pub const DEFAULT_IAM_ENDPOINT: &str = "https://iam.amazonaws.com";
pub const DEFAULT_SIGNING_REGION: &str = "us-east-1";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const IAM_API_VERSION: &str = "2010-05-08";
const IAM_SERVICE: &str = "iam";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=utf-8";

/// Static or session credentials for request signing
#[derive(Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl std::fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Connection settings for [`AwsIamClient`]
#[derive(Debug, Clone)]
pub struct AwsIamConfig {
    pub endpoint: String,
    pub region: String,
    pub credentials: AwsCredentials,
    pub timeout: Duration,
}

impl AwsIamConfig {
    /// Read settings from the standard AWS environment variables.
    ///
    /// `AWS_ACCESS_KEY_ID` and `AWS_SECRET_ACCESS_KEY` are required;
    /// `AWS_SESSION_TOKEN`, `IAM_ENDPOINT`, `AWS_IAM_REGION` and
    /// `IAM_REQUEST_TIMEOUT_SECS` are optional.
    pub fn from_env() -> Result<Self, ProviderError> {
        let non_empty = |key: &str| env::var(key).ok().filter(|v| !v.trim().is_empty());

        let access_key_id = non_empty("AWS_ACCESS_KEY_ID").ok_or_else(|| {
            ProviderError::MissingCredentials("AWS_ACCESS_KEY_ID not set".to_string())
        })?;
        let secret_access_key = non_empty("AWS_SECRET_ACCESS_KEY").ok_or_else(|| {
            ProviderError::MissingCredentials("AWS_SECRET_ACCESS_KEY not set".to_string())
        })?;

        let timeout_secs = non_empty("IAM_REQUEST_TIMEOUT_SECS")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Ok(Self {
            endpoint: non_empty("IAM_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_IAM_ENDPOINT.to_string()),
            region: non_empty("AWS_IAM_REGION")
                .unwrap_or_else(|| DEFAULT_SIGNING_REGION.to_string()),
            credentials: AwsCredentials {
                access_key_id,
                secret_access_key,
                session_token: non_empty("AWS_SESSION_TOKEN"),
            },
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

/// IAM client implementing [`IdentityProvider`]
pub struct AwsIamClient {
    http_client: reqwest::Client,
    config: AwsIamConfig,
    host: String,
}

impl AwsIamClient {
    pub fn new(config: AwsIamConfig) -> Result<Self, ProviderError> {
        let url = reqwest::Url::parse(&config.endpoint).map_err(|e| {
            ProviderError::InvalidConfig(format!("IAM endpoint {}: {}", config.endpoint, e))
        })?;
        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(ProviderError::InvalidConfig(format!(
                    "IAM endpoint {} has no host",
                    config.endpoint
                )))
            }
        };

        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        info!(endpoint = %config.endpoint, region = %config.region, "IAM client initialized");

        Ok(Self {
            http_client,
            config,
            host,
        })
    }

    /// Build a client from the process environment
    pub fn from_env() -> Result<Self, ProviderError> {
        Self::new(AwsIamConfig::from_env()?)
    }

    /// Issue one IAM action and return the raw XML body
    async fn call(&self, action: &str, params: &[(&str, &str)]) -> Result<String, ProviderError> {
        let body = encode_form(action, params);
        let signed = sigv4::sign(
            &SigningRequest {
                method: "POST",
                host: &self.host,
                path: "/",
                query: "",
                content_type: FORM_CONTENT_TYPE,
                body: &body,
            },
            &self.config.credentials,
            &self.config.region,
            IAM_SERVICE,
            Utc::now(),
        )?;

        debug!(action = %action, "Calling IAM");

        let mut request = self
            .http_client
            .post(&self.config.endpoint)
            .header("content-type", FORM_CONTENT_TYPE)
            .header("x-amz-date", &signed.amz_date)
            .header("authorization", &signed.authorization)
            .body(body);
        if let Some(token) = &signed.security_token {
            request = request.header("x-amz-security-token", token);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(parse_error(status.as_u16(), &text));
        }

        Ok(text)
    }
}

#[async_trait]
impl IdentityProvider for AwsIamClient {
    async fn list_accounts(&self) -> Result<Vec<Account>, ProviderError> {
        let mut accounts = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let mut params = Vec::new();
            if let Some(m) = marker.as_deref() {
                params.push(("Marker", m));
            }
            let page = parse_list_users(&self.call("ListUsers", &params).await?)?;

            accounts.extend(page.items.into_iter().map(|u| Account::new(u.user_name)));

            match page.next_marker {
                Some(next) => marker = Some(next),
                None => break,
            }
        }

        debug!(count = accounts.len(), "Listed IAM users");
        Ok(accounts)
    }

    async fn list_access_keys(&self, account: &Account) -> Result<Vec<AccessKey>, ProviderError> {
        let mut keys = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let mut params = vec![("UserName", account.user_name.as_str())];
            if let Some(m) = marker.as_deref() {
                params.push(("Marker", m));
            }
            let page = parse_list_access_keys(&self.call("ListAccessKeys", &params).await?)?;

            for member in page.items {
                keys.push(member.into_access_key()?);
            }

            match page.next_marker {
                Some(next) => marker = Some(next),
                None => break,
            }
        }

        Ok(keys)
    }

    async fn last_used(&self, key_id: &str) -> Result<Option<DateTime<Utc>>, ProviderError> {
        let body = self
            .call("GetAccessKeyLastUsed", &[("AccessKeyId", key_id)])
            .await?;
        parse_last_used(&body)
    }

    async fn set_status(
        &self,
        key_id: &str,
        account: &Account,
        status: KeyStatus,
    ) -> Result<(), ProviderError> {
        self.call(
            "UpdateAccessKey",
            &[
                ("AccessKeyId", key_id),
                ("Status", status.as_str()),
                ("UserName", account.user_name.as_str()),
            ],
        )
        .await?;
        Ok(())
    }
}

fn encode_form(action: &str, params: &[(&str, &str)]) -> String {
    [("Action", action), ("Version", IAM_API_VERSION)]
        .iter()
        .chain(params.iter())
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ProviderError> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| ProviderError::InvalidResponse(format!("Bad timestamp {}: {}", raw, e)))
}

fn from_xml<T: serde::de::DeserializeOwned>(body: &str, what: &str) -> Result<T, ProviderError> {
    quick_xml::de::from_str(body).map_err(|e| {
        ProviderError::InvalidResponse(format!("Failed to parse {} response: {}", what, e))
    })
}

// ============================================================
// Response shapes
// ============================================================

#[derive(Debug, Deserialize)]
struct Members<T> {
    #[serde(rename = "member", default = "Vec::new")]
    members: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct UserMember {
    #[serde(rename = "UserName")]
    user_name: String,
}

#[derive(Debug, Deserialize)]
struct ListUsersResponse {
    #[serde(rename = "ListUsersResult")]
    result: ListUsersResult,
}

#[derive(Debug, Deserialize)]
struct ListUsersResult {
    #[serde(rename = "Users")]
    users: Option<Members<UserMember>>,
    #[serde(rename = "IsTruncated", default)]
    is_truncated: bool,
    #[serde(rename = "Marker")]
    marker: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AccessKeyMember {
    #[serde(rename = "UserName")]
    user_name: String,
    #[serde(rename = "AccessKeyId")]
    access_key_id: String,
    #[serde(rename = "Status")]
    status: String,
    #[serde(rename = "CreateDate")]
    create_date: String,
}

impl AccessKeyMember {
    fn into_access_key(self) -> Result<AccessKey, ProviderError> {
        Ok(AccessKey {
            status: self.status.parse()?,
            created_at: parse_timestamp(&self.create_date)?,
            key_id: self.access_key_id,
            user_name: self.user_name,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ListAccessKeysResponse {
    #[serde(rename = "ListAccessKeysResult")]
    result: ListAccessKeysResult,
}

#[derive(Debug, Deserialize)]
struct ListAccessKeysResult {
    #[serde(rename = "AccessKeyMetadata")]
    metadata: Option<Members<AccessKeyMember>>,
    #[serde(rename = "IsTruncated", default)]
    is_truncated: bool,
    #[serde(rename = "Marker")]
    marker: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GetAccessKeyLastUsedResponse {
    #[serde(rename = "GetAccessKeyLastUsedResult")]
    result: GetAccessKeyLastUsedResult,
}

#[derive(Debug, Deserialize)]
struct GetAccessKeyLastUsedResult {
    #[serde(rename = "AccessKeyLastUsed")]
    last_used: Option<AccessKeyLastUsed>,
}

#[derive(Debug, Deserialize)]
struct AccessKeyLastUsed {
    #[serde(rename = "LastUsedDate")]
    last_used_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(rename = "Error")]
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(rename = "Code")]
    code: String,
    #[serde(rename = "Message", default)]
    message: String,
}

/// One page of a paginated list call
struct Page<T> {
    items: Vec<T>,
    next_marker: Option<String>,
}

impl<T> Page<T> {
    fn new(
        members: Option<Members<T>>,
        is_truncated: bool,
        marker: Option<String>,
    ) -> Result<Self, ProviderError> {
        let next_marker = if is_truncated {
            Some(marker.ok_or_else(|| {
                ProviderError::InvalidResponse("Truncated response without Marker".to_string())
            })?)
        } else {
            None
        };

        Ok(Self {
            items: members.map(|m| m.members).unwrap_or_default(),
            next_marker,
        })
    }
}

fn parse_list_users(body: &str) -> Result<Page<UserMember>, ProviderError> {
    let response: ListUsersResponse = from_xml(body, "ListUsers")?;
    let r = response.result;
    Page::new(r.users, r.is_truncated, r.marker)
}

fn parse_list_access_keys(body: &str) -> Result<Page<AccessKeyMember>, ProviderError> {
    let response: ListAccessKeysResponse = from_xml(body, "ListAccessKeys")?;
    let r = response.result;
    Page::new(r.metadata, r.is_truncated, r.marker)
}

fn parse_last_used(body: &str) -> Result<Option<DateTime<Utc>>, ProviderError> {
    let response: GetAccessKeyLastUsedResponse = from_xml(body, "GetAccessKeyLastUsed")?;
    response
        .result
        .last_used
        .and_then(|l| l.last_used_date)
        .map(|raw| parse_timestamp(&raw))
        .transpose()
}

fn parse_error(status: u16, body: &str) -> ProviderError {
    match quick_xml::de::from_str::<ErrorResponse>(body) {
        Ok(response) => ProviderError::api(status, response.error.code, response.error.message),
        Err(_) => ProviderError::api(status, "HttpError", body.trim().to_string()),
    }
}
