use anyhow::{Result, anyhow};
use crate::config::AzureSearchConfig;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use url::Url;

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub content: String,
    pub score: f32,
    pub metadata: Map<String, Value>,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    value: Vec<Map<String, Value>>,
}

/// REST client for the document search endpoint of an Azure Cognitive Search index.
#[derive(Clone)]
pub struct AzureSearchClient {
    api_key: String,
    client: Client,
    endpoint: Url,
}

impl AzureSearchClient {
    pub fn new(config: &AzureSearchConfig) -> Result<Self> {
        let base = format!(
            "https://{}.search.windows.net/indexes/{}/docs/search",
            config.service_name, config.index_name
        );
        let mut endpoint = Url::parse(&base)?;
        endpoint.query_pairs_mut().append_pair("api-version", &config.api_version);

        Ok(Self {
            api_key: config.api_key.clone(),
            client: Client::new(),
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub async fn search(&self, query: &str, top: usize, content_key: &str) -> Result<Vec<SearchHit>> {
        let response = self.client
            .post(self.endpoint.clone())
            .header("api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&json!({
                "search": query,
                "top": top,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Azure Cognitive Search error {}: {}", status, body));
        }

        let body: Value = response.json().await?;
        parse_hits(body, content_key)
    }
}

fn parse_hits(body: Value, content_key: &str) -> Result<Vec<SearchHit>> {
    let response: SearchResponse = serde_json::from_value(body)?;

    Ok(response.value
        .into_iter()
        .filter_map(|mut fields| {
            let content = match fields.remove(content_key)? {
                Value::String(s) => s,
                other => other.to_string(),
            };
            let score = fields.remove("@search.score")
                .and_then(|s| s.as_f64())
                .unwrap_or(0.0) as f32;
            fields.retain(|key, _| !key.starts_with("@search"));

            Some(SearchHit {
                content,
                score,
                metadata: fields,
            })
        })
        .collect())
}
