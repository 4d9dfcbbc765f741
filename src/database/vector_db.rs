use thiserror::Error;
use qdrant_client::{
    qdrant::{
        with_payload_selector::SelectorOptions,
        point_id::PointIdOptions,
        CollectionExistsRequest, CreateCollection, DeleteCollection, Distance,
        PointId, PointStruct, SearchPoints, UpsertPoints, Value, VectorParams,
        VectorsConfig, WithPayloadSelector,
    },
    Qdrant,
};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;
use crate::database::qdrant_config::create_qdrant_client;

const UPSERT_BATCH: usize = 64;

#[derive(Error, Debug)]
pub enum VectorDBError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Operation failed: {0}")]
    Operation(String),
}

pub type Payload = HashMap<String, serde_json::Value>;

#[derive(Clone)]
pub struct VectorDB {
    client: Arc<Qdrant>,
}

impl VectorDB {
    pub async fn new(url: &str) -> Result<Self, VectorDBError> {
        let client = create_qdrant_client(url)
            .await
            .map_err(|e| VectorDBError::Connection(e.to_string()))?;
        Ok(Self {
            client: Arc::new(client),
        })
    }

    pub async fn create_collection(
        &self,
        name: &str,
        vector_size: u64,
    ) -> Result<(), VectorDBError> {
        let vectors_config = VectorParams {
            size: vector_size,
            distance: Distance::Cosine.into(),
            ..Default::default()
        };

        let vectors_config = VectorsConfig {
            config: Some(qdrant_client::qdrant::vectors_config::Config::Params(vectors_config)),
        };

        let create_collection = CreateCollection {
            collection_name: name.to_string(),
            vectors_config: Some(vectors_config),
            ..Default::default()
        };

        match self.client.create_collection(create_collection).await {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("AlreadyExists") => {
                log::info!("Collection {} already exists, skipping creation", name);
                Ok(())
            }
            Err(e) => Err(VectorDBError::Operation(e.to_string())),
        }
    }

    pub async fn delete_collection(&self, name: &str) -> Result<(), VectorDBError> {
        let exists = self.client
            .collection_exists(CollectionExistsRequest { collection_name: name.to_string() })
            .await
            .map_err(|e| VectorDBError::Operation(e.to_string()))?;
        if !exists {
            return Ok(());
        }

        self.client
            .delete_collection(DeleteCollection {
                collection_name: name.to_string(),
                ..Default::default()
            })
            .await
            .map_err(|e| VectorDBError::Operation(e.to_string()))?;
        Ok(())
    }

    /// Drops any previous collection of that name and creates an empty one.
    pub async fn recreate_collection(&self, name: &str, vector_size: u64) -> Result<(), VectorDBError> {
        self.delete_collection(name).await?;
        self.create_collection(name, vector_size).await
    }

    pub async fn store_vectors(
        &self,
        collection: &str,
        vectors: Vec<(Vec<f32>, Payload)>,
    ) -> Result<Vec<String>, VectorDBError> {
        let mut ids = Vec::with_capacity(vectors.len());
        let mut points = Vec::with_capacity(vectors.len());

        for (vector, payload) in vectors {
            let point_id = Uuid::new_v4().to_string();
            let payload: HashMap<String, Value> = payload.into_iter()
                .map(|(k, v)| (k, Value::from(v)))
                .collect();

            points.push(PointStruct {
                id: Some(PointId {
                    point_id_options: Some(PointIdOptions::Uuid(point_id.clone()))
                }),
                vectors: Some(vector.into()),
                payload,
            });
            ids.push(point_id);
        }

        while !points.is_empty() {
            let batch: Vec<PointStruct> = points.drain(..points.len().min(UPSERT_BATCH)).collect();
            let upsert_points = UpsertPoints {
                collection_name: collection.to_string(),
                wait: Some(true),
                points: batch,
                ..Default::default()
            };

            self.client.upsert_points(upsert_points)
                .await
                .map_err(|e| VectorDBError::Operation(e.to_string()))?;
        }

        log::info!("Stored {} vectors in {}", ids.len(), collection);
        Ok(ids)
    }

    pub async fn search_vectors(
        &self,
        collection: &str,
        query_vector: Vec<f32>,
        limit: u64,
    ) -> Result<Vec<(String, f32, Payload)>, VectorDBError> {
        let request = SearchPoints {
            collection_name: collection.to_string(),
            vector: query_vector,
            limit,
            with_payload: Some(WithPayloadSelector {
                selector_options: Some(SelectorOptions::Enable(true)),
            }),
            ..Default::default()
        };

        let results = self.client.search_points(request)
            .await
            .map_err(|e| VectorDBError::Operation(e.to_string()))?;

        let points = results.result
            .into_iter()
            .map(|point| {
                let id = match point.id.and_then(|id| id.point_id_options) {
                    Some(PointIdOptions::Uuid(uuid)) => uuid,
                    Some(PointIdOptions::Num(num)) => num.to_string(),
                    None => String::new(),
                };
                let payload = point.payload
                    .into_iter()
                    .map(|(k, v)| (k, serde_json::Value::try_from(v).unwrap_or(serde_json::Value::Null)))
                    .collect();
                (id, point.score, payload)
            })
            .collect();

        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_conversion_round_trip() {
        let original = json!({
            "text": "chunk",
            "metadata": {"source": "a.pdf", "page": 3, "score": 0.5, "tags": ["x", null, true]}
        });
        let stored: HashMap<String, Value> = original
            .as_object()
            .unwrap()
            .clone()
            .into_iter()
            .map(|(k, v)| (k, Value::from(v)))
            .collect();
        for (key, value) in stored {
            assert_eq!(serde_json::Value::try_from(value).unwrap(), original[&key]);
        }
    }
}
