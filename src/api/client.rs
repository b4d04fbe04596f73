//! HTTP client for the world API
//!
//! Thin reqwest wrapper: bearer auth, `{"data": ...}` envelopes, paginated
//! static data, and status-code classification into [`ApiError`].

use crate::api::error::ApiError;
use crate::api::types::{ActionResponse, CharacterData, GameData, ItemInfo, MapTile, MonsterInfo, ResourceInfo};
use crate::api::{ApiResult, WorldApi};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// Page size used when downloading static data
const PAGE_SIZE: u32 = 100;

/// Upper bound on pages fetched per collection
const MAX_PAGES: u32 = 50;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    data: Vec<T>,
    #[serde(default)]
    pages: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
}

/// reqwest-backed [`WorldApi`]
pub struct HttpWorldApi {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpWorldApi {
    /// Create a new client
    ///
    /// # Arguments
    /// * `base_url` - API root, e.g. `https://api.artifactsmmo.com`
    /// * `token` - bearer token for `/my/...` endpoints
    /// * `timeout` - per-request timeout
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> ApiResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn get_data<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        let response = self
            .authorized(self.client.get(self.url(path)))
            .send()
            .await?;
        let envelope: Envelope<T> = decode(response).await?;
        Ok(envelope.data)
    }

    async fn get_all_pages<T: DeserializeOwned>(&self, path: &str) -> ApiResult<Vec<T>> {
        let mut all = Vec::new();
        let mut page = 1;

        loop {
            let response = self
                .client
                .get(self.url(path))
                .query(&[("page", page), ("size", PAGE_SIZE)])
                .send()
                .await?;
            let body: Page<T> = decode(response).await?;
            let fetched = body.data.len();
            all.extend(body.data);

            let last_page = body.pages.unwrap_or(page);
            if page >= last_page || fetched == 0 || page >= MAX_PAGES {
                break;
            }
            page += 1;
        }

        Ok(all)
    }

    async fn post_action(
        &self,
        name: &str,
        action: &str,
        body: Option<serde_json::Value>,
    ) -> ApiResult<ActionResponse> {
        let path = format!("/my/{}/action/{}", name, action);
        debug!(character = name, action, "POST {}", path);

        let mut request = self.authorized(self.client.post(self.url(&path)));
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let envelope: Envelope<ActionResponse> = decode(response).await?;
        Ok(envelope.data)
    }
}

/// Decode a success body or classify the failure status
async fn decode<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()));
    }

    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after);
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|b| b.error.message)
        .unwrap_or(text);

    Err(ApiError::from_status(status.as_u16(), retry_after, message))
}

/// Retry-After is either whole or fractional seconds
fn parse_retry_after(value: &str) -> Option<Duration> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}

#[async_trait]
impl WorldApi for HttpWorldApi {
    async fn get_character(&self, name: &str) -> ApiResult<CharacterData> {
        self.get_data(&format!("/characters/{}", name)).await
    }

    async fn get_map_tile(&self, x: i32, y: i32) -> ApiResult<MapTile> {
        self.get_data(&format!("/maps/{}/{}", x, y)).await
    }

    async fn load_game_data(&self) -> ApiResult<GameData> {
        let maps: Vec<MapTile> = self.get_all_pages("/maps").await?;
        let monsters: Vec<MonsterInfo> = self.get_all_pages("/monsters").await?;
        let resources: Vec<ResourceInfo> = self.get_all_pages("/resources").await?;
        let items: Vec<ItemInfo> = self.get_all_pages("/items").await?;

        debug!(
            maps = maps.len(),
            monsters = monsters.len(),
            resources = resources.len(),
            items = items.len(),
            "Loaded game data"
        );

        Ok(GameData {
            maps,
            monsters: monsters.into_iter().map(|m| (m.code.clone(), m)).collect(),
            resources: resources.into_iter().map(|r| (r.code.clone(), r)).collect(),
            items: items.into_iter().map(|i| (i.code.clone(), i)).collect(),
        })
    }

    async fn move_character(&self, name: &str, x: i32, y: i32) -> ApiResult<ActionResponse> {
        self.post_action(name, "move", Some(json!({ "x": x, "y": y })))
            .await
    }

    async fn fight(&self, name: &str) -> ApiResult<ActionResponse> {
        self.post_action(name, "fight", None).await
    }

    async fn gather(&self, name: &str) -> ApiResult<ActionResponse> {
        self.post_action(name, "gathering", None).await
    }

    async fn craft(&self, name: &str, code: &str, quantity: u32) -> ApiResult<ActionResponse> {
        self.post_action(
            name,
            "crafting",
            Some(json!({ "code": code, "quantity": quantity })),
        )
        .await
    }

    async fn rest(&self, name: &str) -> ApiResult<ActionResponse> {
        self.post_action(name, "rest", None).await
    }

    async fn equip(&self, name: &str, code: &str, slot: &str) -> ApiResult<ActionResponse> {
        self.post_action(name, "equip", Some(json!({ "code": code, "slot": slot })))
            .await
    }

    async fn unequip(&self, name: &str, slot: &str) -> ApiResult<ActionResponse> {
        self.post_action(name, "unequip", Some(json!({ "slot": slot })))
            .await
    }

    async fn deposit_items(&self, name: &str, items: &[(String, u32)]) -> ApiResult<ActionResponse> {
        let body: Vec<serde_json::Value> = items
            .iter()
            .map(|(code, quantity)| json!({ "code": code, "quantity": quantity }))
            .collect();
        self.post_action(name, "bank/deposit/item", Some(serde_json::Value::Array(body)))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation_trims_base_url() {
        let api = HttpWorldApi::new("https://example.test/", None, Duration::from_secs(5)).unwrap();
        assert_eq!(api.url("/maps/0/0"), "https://example.test/maps/0/0");
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after("3"), Some(Duration::from_secs(3)));
        assert_eq!(parse_retry_after(" 1.5 "), Some(Duration::from_millis(1500)));
        assert_eq!(parse_retry_after("soon"), None);
        assert_eq!(parse_retry_after("-1"), None);
    }

    #[test]
    fn test_action_response_envelope() {
        let json = r#"{"data":{
            "cooldown":{"total_seconds":5,"remaining_seconds":5,"reason":"movement"},
            "destination":{"name":"Forest","x":0,"y":1,"content":{"type":"monster","code":"chicken"}},
            "character":{"name":"ada","level":1,"hp":120,"max_hp":120,"x":0,"y":1}
        }}"#;
        let envelope: Envelope<ActionResponse> = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.data.cooldown.total_seconds, 5);
        assert_eq!(envelope.data.character.y, 1);
        assert!(envelope.data.fight.is_none());
    }

    #[test]
    fn test_error_body_message() {
        let body: ErrorBody =
            serde_json::from_str(r#"{"error":{"code":478,"message":"Missing item"}}"#).unwrap();
        assert_eq!(body.error.message, "Missing item");
    }
}
