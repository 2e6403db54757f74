use std::str::FromStr;

use async_trait::async_trait;
use http::header::AUTHORIZATION;
use http::{HeaderMap, HeaderValue, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::instrument;

use crate::db::prelude::{AgentId, AgentRecord, DateRange, Lead};
use crate::poller::source::{LeadSource, SourceResult};
use crate::util::env::{EnvErr, Var};
use crate::var;

const QUERY_DATE_FORMAT: &str = "%Y-%m-%d";

/// Client for the Adversus CRM.
///
/// This is the boundary where upstream records are normalized: ids arrive as numbers or numeric
/// strings, money as numbers or strings, and either camelCase or snake_case keys. Anything that
/// cannot be coerced is rejected or defaulted here and logged.
#[derive(Debug, Clone)]
pub struct AdversusClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl AdversusClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    pub async fn from_env() -> AdversusResult<Self> {
        let base_url = var!(Var::AdversusApiUrl).await?;
        let api_key = var!(Var::AdversusApiKey).await?;

        Ok(Self::new(base_url, api_key))
    }

    /// Fetches successful leads created within `range` (inclusive).
    #[instrument(skip(self), fields(from = %range.start_date, to = %range.end_date))]
    pub async fn fetch_success_leads(&self, range: DateRange) -> AdversusResult<Vec<Lead>> {
        let uri = format!("{}/v1/leads/", self.base_url);
        let query = [
            ("status", String::from("success")),
            ("from", range.start_date.format(QUERY_DATE_FORMAT).to_string()),
            ("to", range.end_date.format(QUERY_DATE_FORMAT).to_string()),
        ];

        let raw: Vec<RawLead> = self.get_json(&uri, &query).await?;
        let fetched = raw.len();

        let leads: Vec<Lead> = raw.into_iter().filter_map(RawLead::normalize).collect();
        if leads.len() != fetched {
            tracing::warn!(
                fetched,
                rejected = fetched - leads.len(),
                "rejected leads without a numeric user id"
            );
        }

        tracing::debug!(lead_count = leads.len(), "fetched success leads");
        Ok(leads)
    }

    /// Fetches every CRM user as an agent record without media urls.
    #[instrument(skip(self))]
    pub async fn fetch_all_users(&self) -> AdversusResult<Vec<AgentRecord>> {
        let uri = format!("{}/users", self.base_url);
        let raw: Vec<RawUser> = self.get_json(&uri, &[]).await?;
        let fetched = raw.len();

        let users: Vec<AgentRecord> = raw.into_iter().filter_map(RawUser::normalize).collect();
        if users.len() != fetched {
            tracing::warn!(
                fetched,
                rejected = fetched - users.len(),
                "rejected users without a numeric id"
            );
        }

        Ok(users)
    }

    /// Fetches one CRM user as an agent record without media urls.
    #[instrument(skip(self))]
    pub async fn fetch_user(&self, id: AgentId) -> AdversusResult<AgentRecord> {
        let uri = format!("{}/users/{id}", self.base_url);
        let raw: RawUser = self.get_json(&uri, &[]).await?;

        raw.normalize()
            .ok_or_else(|| AdversusErr::MalformedUser(id.to_string()))
    }

    fn headers(&self) -> AdversusResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|_| AdversusErr::InvalidApiKey)?;

        headers.insert(AUTHORIZATION, bearer);
        Ok(headers)
    }

    /// Performs a GET request and parses the body as `T`, turning non-2xx responses into
    /// [`AdversusErr::FetchErr`].
    #[instrument(skip(self, query))]
    async fn get_json<T>(&self, uri: &str, query: &[(&str, String)]) -> AdversusResult<T>
    where
        T: DeserializeOwned,
    {
        let res = self
            .client
            .get(uri)
            .headers(self.headers()?)
            .query(query)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            tracing::error!(code = %status, "non-2xx response from adversus");

            // error bodies are best-effort; fall back to the status text
            let message = match res.json::<Value>().await {
                Ok(body) => body["message"]
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| body.to_string()),
                Err(_) => status.to_string(),
            };

            return Err(AdversusErr::FetchErr { status, message });
        }

        Ok(res.json::<T>().await?)
    }
}

#[async_trait]
impl LeadSource for AdversusClient {
    async fn fetch_leads(&self, range: DateRange) -> SourceResult<Vec<Lead>> {
        Ok(self.fetch_success_leads(range).await?)
    }
}

#[derive(Debug, Deserialize)]
struct RawLead {
    #[serde(default)]
    id: Value,
    #[serde(default, rename = "userId")]
    user_id: Value,
    #[serde(default, rename = "user_id")]
    user_id_snake: Value,
    #[serde(default)]
    commission: Value,
    #[serde(default)]
    campaign: Value,
    #[serde(default, rename = "smsCount")]
    sms_count: Value,
    #[serde(default, rename = "sms_count")]
    sms_count_snake: Value,
}

impl RawLead {
    fn normalize(self) -> Option<Lead> {
        let Some(user_id) = coerce_u64(first_present(&self.user_id, &self.user_id_snake)) else {
            tracing::debug!(lead = ?self.id, user_id = ?self.user_id, "lead has no numeric user id");
            return None;
        };

        let commission = match coerce_decimal(&self.commission) {
            Some(c) if c.is_sign_negative() => {
                tracing::warn!(lead = ?self.id, %c, "negative commission, counted as zero");
                Decimal::ZERO
            }
            Some(c) => c,
            None => {
                if !is_absent(&self.commission) {
                    tracing::warn!(lead = ?self.id, commission = ?self.commission, "unparseable commission, counted as zero");
                }
                Decimal::ZERO
            }
        };

        let sms_count = coerce_u64(first_present(&self.sms_count, &self.sms_count_snake))
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(0);

        let campaign = match &self.campaign {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            _ => None,
        };

        Some(Lead {
            id: coerce_string(&self.id),
            user_id: AgentId(user_id),
            commission,
            campaign,
            sms_count,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawGroup {
    #[serde(default)]
    id: Value,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    group: Option<RawGroup>,
}

impl RawUser {
    fn normalize(self) -> Option<AgentRecord> {
        let user_id = coerce_u64(&self.id)?;

        Some(AgentRecord {
            user_id: AgentId(user_id),
            name: self.name.unwrap_or_else(|| format!("agent {user_id}")),
            email: self.email.filter(|e| !e.is_empty()),
            group_id: self.group.and_then(|g| coerce_u64(&g.id)),
            profile_image_url: None,
            personal_sound_url: None,
        })
    }
}

fn is_absent(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// The first of two alternative keys that carries a value.
fn first_present<'a>(primary: &'a Value, fallback: &'a Value) -> &'a Value {
    if is_absent(primary) { fallback } else { primary }
}

fn coerce_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f <= u64::MAX as f64)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}

fn coerce_decimal(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };

    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

fn coerce_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

pub type AdversusResult<T> = core::result::Result<T, AdversusErr>;

#[derive(Debug, Error)]
pub enum AdversusErr {
    #[error(transparent)]
    ReqwestError(#[from] reqwest::Error),

    #[error("adversus responded {status}: {message}")]
    FetchErr { status: StatusCode, message: String },

    #[error("api key is not a valid header value")]
    InvalidApiKey,

    #[error("user {0} has no numeric id")]
    MalformedUser(String),

    #[error(transparent)]
    EnvError(#[from] EnvErr),
}
