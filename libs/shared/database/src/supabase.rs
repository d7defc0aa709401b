use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client,
};
use serde::de::DeserializeOwned;
use tracing::{debug, error};

use shared_config::AppConfig;

use crate::store::StoreError;

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            anon_key: config.supabase_anon_key.clone(),
        }
    }

    fn get_headers(&self, auth_token: Option<&str>) -> Result<HeaderMap, StoreError> {
        let mut headers = HeaderMap::new();

        let api_key = HeaderValue::from_str(&self.anon_key)
            .map_err(|e| StoreError::Backend(format!("Invalid anon key header: {}", e)))?;
        headers.insert("apikey", api_key);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = auth_token {
            let bearer = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| StoreError::Backend(format!("Invalid bearer header: {}", e)))?;
            headers.insert(AUTHORIZATION, bearer);
        }

        Ok(headers)
    }

    /// Read-only PostgREST query; `path` includes the query string.
    pub async fn get<T>(&self, path: &str, auth_token: Option<&str>) -> Result<T, StoreError>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making request to {}", url);

        let response = self
            .client
            .get(&url)
            .headers(self.get_headers(auth_token)?)
            .send()
            .await
            .map_err(|e| StoreError::Backend(format!("Request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("API error ({}): {}", status, error_text);

            return Err(StoreError::Backend(match status.as_u16() {
                401 | 403 => format!("Authentication error: {}", error_text),
                404 => format!("Resource not found: {}", error_text),
                _ => format!("API error ({}): {}", status, error_text),
            }));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| StoreError::Backend(format!("Invalid response body: {}", e)))
    }
}
