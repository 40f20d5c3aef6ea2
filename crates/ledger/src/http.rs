//! JSON:API client of the ledger platform.

use crate::{
    asset::{AssetSource, WatchedAsset},
    proxy::SignerProxy,
    request::{LedgerError, RequestPage, RequestQuery, RequestSource, RequestState, WithdrawRequest},
    review::{ReviewOp, SubmitError, SubmitResult},
    task::TaskSet,
};
use alloy_primitives::Address;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

const WITHDRAW_REQUESTS_PATH: &str = "/v3/create_withdraw_requests";
const ASSETS_PATH: &str = "/v3/assets";
const ASSET_PAGE_LIMIT: usize = 100;

/// Ledger platform client: reads over HTTP, reviews through the signer proxy.
#[derive(Debug, Clone)]
pub struct LedgerClient {
    http: reqwest::Client,
    base_url: String,
    proxy: SignerProxy,
}

impl LedgerClient {
    pub fn new(base_url: impl Into<String>, proxy: SignerProxy) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            proxy,
        }
    }

    /// Resolve a path or a `links.next` value against the base url.
    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> Result<T, LedgerError> {
        let url = self.url(path);
        debug!(%url, "Ledger request");

        let response = self.http.get(&url).query(params).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            return Err(LedgerError::Status { status, body });
        }

        Ok(response.json().await?)
    }
}

impl RequestSource for LedgerClient {
    async fn list(&self, query: &RequestQuery) -> Result<RequestPage, LedgerError> {
        let document = self
            .get_json(WITHDRAW_REQUESTS_PATH, &query.to_params())
            .await?;
        Ok(decode_request_page(document, query))
    }

    async fn next(&self, query: &RequestQuery, cursor: &str) -> Result<RequestPage, LedgerError> {
        let document = self.get_json(cursor, &[]).await?;
        Ok(decode_request_page(document, query))
    }

    async fn submit(&self, op: &ReviewOp, wait_for_result: bool) -> Result<SubmitResult, SubmitError> {
        self.proxy.submit(op, wait_for_result).await
    }
}

impl AssetSource for LedgerClient {
    async fn list_assets(&self, owner: &str) -> Result<Vec<WatchedAsset>, LedgerError> {
        let params = vec![
            ("filter[owner]".to_string(), owner.to_string()),
            ("page[limit]".to_string(), ASSET_PAGE_LIMIT.to_string()),
        ];

        let mut assets = Vec::new();
        let mut document: Document<AssetAttributes> = self.get_json(ASSETS_PATH, &params).await?;
        loop {
            let Document { data, links, .. } = document;
            let full_page = data.len() >= ASSET_PAGE_LIMIT;
            assets.extend(data.into_iter().filter_map(decode_asset));

            match links.next {
                Some(next) if full_page => document = self.get_json(&next, &[]).await?,
                _ => break,
            }
        }

        Ok(assets)
    }
}

#[derive(Debug, Deserialize)]
struct Document<A> {
    data: Vec<Resource<A>>,
    #[serde(default)]
    included: Vec<Resource<Value>>,
    #[serde(default)]
    links: Links,
}

#[derive(Debug, Default, Deserialize)]
struct Links {
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Resource<A> {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    attributes: A,
    #[serde(default)]
    relationships: HashMap<String, Value>,
}

impl<A> Resource<A> {
    /// Key of a to-one relationship.
    fn relation(&self, name: &str) -> Option<Key> {
        let data = self.relationships.get(name)?.get("data")?;
        Key::deserialize(data).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
struct Key {
    id: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct RequestAttributes {
    hash: String,
    pending_tasks: u32,
    state_i: u32,
    #[serde(default)]
    external_details: Option<ExternalDetails>,
}

#[derive(Debug, Default, Deserialize)]
struct ExternalDetails {
    #[serde(default)]
    data: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct WithdrawDetailsAttributes {
    amount: String,
    #[serde(default)]
    creator_details: Value,
}

#[derive(Debug, Deserialize)]
struct AssetAttributes {
    #[serde(default)]
    details: Value,
    trailing_digits: u8,
}

/// Join requests with their included details. Amounts are decoded with the
/// query's asset digits. Records that cannot be decoded are logged and left
/// out of the page.
fn decode_request_page(document: Document<RequestAttributes>, query: &RequestQuery) -> RequestPage {
    let included: HashMap<Key, Value> = document
        .included
        .into_iter()
        .map(|resource| {
            let key = Key {
                id: resource.id,
                kind: resource.kind,
            };
            (key, resource.attributes)
        })
        .collect();

    let requests = document
        .data
        .into_iter()
        .filter_map(|resource| {
            let id = resource.id.clone();
            decode_request(resource, &included, query)
                .inspect_err(|err| warn!(request_id = %id, error = %err, "Skipping withdraw request"))
                .ok()
        })
        .collect();

    RequestPage {
        requests,
        next: document.links.next,
    }
}

fn decode_request(
    resource: Resource<RequestAttributes>,
    included: &HashMap<Key, Value>,
    query: &RequestQuery,
) -> Result<WithdrawRequest, LedgerError> {
    let malformed = |reason: String| LedgerError::Malformed {
        id: resource.id.clone(),
        reason,
    };

    let id = resource
        .id
        .parse()
        .map_err(|_| malformed("request id is not numeric".to_string()))?;
    let state = RequestState::from_code(resource.attributes.state_i)
        .ok_or_else(|| malformed(format!("unknown state {}", resource.attributes.state_i)))?;

    let key = resource
        .relation("request_details")
        .ok_or_else(|| malformed("missing request_details relationship".to_string()))?;
    let details = included
        .get(&key)
        .ok_or_else(|| malformed("request_details not included".to_string()))?;
    let details = WithdrawDetailsAttributes::deserialize(details)
        .map_err(|e| malformed(format!("request_details: {e}")))?;

    let amount = parse_amount(&details.amount, query.amount_digits).ok_or_else(|| {
        malformed(format!(
            "amount {:?} does not fit {} digits",
            details.amount, query.amount_digits
        ))
    })?;

    Ok(WithdrawRequest {
        id,
        hash: resource.attributes.hash.clone(),
        asset: query.asset.clone(),
        state,
        amount,
        pending_tasks: TaskSet::from_bits(resource.attributes.pending_tasks),
        creator_details: embedded_json(details.creator_details),
        external_details: resource
            .attributes
            .external_details
            .as_ref()
            .map(|details| details.data.clone())
            .unwrap_or_default(),
    })
}

/// Creator details are sometimes served as a JSON document inside a string.
fn embedded_json(value: Value) -> Value {
    match value {
        Value::String(raw) => serde_json::from_str(&raw).unwrap_or(Value::String(raw)),
        other => other,
    }
}

fn decode_asset(resource: Resource<AssetAttributes>) -> Option<WatchedAsset> {
    let erc20 = &resource.attributes.details["erc20"];
    if erc20["withdraw"].as_bool() != Some(true) {
        return None;
    }

    let token = match erc20["address"].as_str().map(str::parse::<Address>) {
        Some(Ok(token)) => token,
        _ => {
            warn!(asset = %resource.id, address = %erc20["address"], "Asset has no valid ERC20 address");
            return None;
        }
    };
    let owner = resource.relation("owner")?.id;

    Some(WatchedAsset {
        id: resource.id,
        token,
        trailing_digits: resource.attributes.trailing_digits,
        owner,
    })
}

/// Parse a decimal amount string into fixed-point units with `precision`
/// fractional digits.
pub fn parse_amount(raw: &str, precision: u8) -> Option<u64> {
    let (int_part, frac_part) = raw.split_once('.').unwrap_or((raw, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    let is_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if !is_digits(int_part) || !is_digits(frac_part) {
        return None;
    }

    let frac_part = frac_part.trim_end_matches('0');
    let precision = u32::from(precision);
    let frac_len = u32::try_from(frac_part.len()).ok()?;
    if frac_len > precision {
        return None;
    }

    let int_value: u64 = if int_part.is_empty() { 0 } else { int_part.parse().ok()? };
    let frac_value: u64 = if frac_part.is_empty() { 0 } else { frac_part.parse().ok()? };

    int_value
        .checked_mul(10u64.checked_pow(precision)?)?
        .checked_add(frac_value.checked_mul(10u64.checked_pow(precision - frac_len)?)?)
}
