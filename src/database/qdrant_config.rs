use qdrant_client::{Qdrant, config::QdrantConfig};
use std::time::Duration;

/// Rewrites a Qdrant REST address into the gRPC address the client speaks.
pub fn grpc_url(url: &str) -> String {
    let clean_url = if url.contains("://") {
        url.split("://").nth(1).unwrap_or(url)
    } else {
        url
    };
    let clean_url = clean_url.trim_end_matches('/');

    // REST listens on 6333, gRPC on 6334
    let grpc = match clean_url.strip_suffix(":6333") {
        Some(host) => format!("{}:6334", host),
        None => clean_url.to_string(),
    };

    format!("http://{}", grpc)
}

pub async fn create_qdrant_client(url: &str) -> Result<Qdrant, Box<dyn std::error::Error + Send + Sync>> {
    let url_with_scheme = grpc_url(url);
    log::info!("Attempting to connect to Qdrant with URL: {}", url_with_scheme);

    let mut config = QdrantConfig::from_url(&url_with_scheme);
    config.check_compatibility = false;
    config.timeout = Duration::from_secs(30);
    config.connect_timeout = Duration::from_secs(10);
    if let Ok(api_key) = std::env::var("QDRANT_API_KEY") {
        config.api_key = Some(api_key);
    }

    let client = Qdrant::new(config)?;

    match client.list_collections().await {
        Ok(_) => {
            log::info!("Successfully connected to Qdrant");
            Ok(client)
        }
        Err(e) => {
            log::error!("Connection test failed: {}", e);
            Err(format!("Failed to connect to Qdrant: {}", e).into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rest_port_is_rewritten() {
        assert_eq!(grpc_url("http://localhost:6333"), "http://localhost:6334");
        assert_eq!(grpc_url("localhost:6333/"), "http://localhost:6334");
        assert_eq!(grpc_url("https://qdrant.internal:7000"), "http://qdrant.internal:7000");
    }
}
