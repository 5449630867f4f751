//! Typesense implementation of [`SearchEngineClient`].
//!
//! Talks to the Typesense REST API with a short, fixed request timeout
//! (`[engine].timeout_secs`, default 2 s) so an unreachable engine fails a
//! tick quickly instead of stalling it.
//!
//! Status mapping:
//! - `409` → [`EngineError::Conflict`]
//! - `404` → [`EngineError::NotFound`]
//! - other non-2xx → [`EngineError::Rejected`] with the engine's `message`
//! - timeouts / refused connections → [`EngineError::Connection`]

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;

use crate::config::EngineConfig;
use crate::engine::{SearchEngineClient, SearchParams, SearchResponse};
use crate::error::EngineError;
use crate::models::IndexedDocument;
use crate::schema::CollectionSchema;

const API_KEY_HEADER: &str = "X-TYPESENSE-API-KEY";

pub struct TypesenseClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: String,
}

/// Error body returned by Typesense: `{"message": "..."}`.
#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl TypesenseClient {
    pub fn new(config: &EngineConfig) -> anyhow::Result<Self> {
        Self::with_base_url(&config.base_url(), &config.api_key, config.timeout())
    }

    pub fn with_base_url(
        base_url: &str,
        api_key: &str,
        timeout: std::time::Duration,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        let base_url = Url::parse(base_url)
            .map_err(|e| anyhow::anyhow!("invalid engine URL '{}': {}", base_url, e))?;

        Ok(Self {
            http,
            base_url,
            api_key: api_key.to_string(),
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url, EngineError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| EngineError::Connection(format!("cannot-be-a-base URL: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http
            .request(method, url)
            .header(API_KEY_HEADER, &self.api_key)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, EngineError> {
        let response = request.send().await?;
        check_status(response).await
    }
}

async fn check_status(response: Response) -> Result<Response, EngineError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|b| b.message)
        .unwrap_or(text);

    Err(match status {
        StatusCode::CONFLICT => EngineError::Conflict(message),
        StatusCode::NOT_FOUND => EngineError::NotFound(message),
        other => EngineError::Rejected {
            status: other.as_u16(),
            message,
        },
    })
}

#[async_trait]
impl SearchEngineClient for TypesenseClient {
    async fn ensure_collection(&self, schema: &CollectionSchema) -> Result<(), EngineError> {
        let url = self.url(&["collections"])?;
        self.send(self.request(Method::POST, url).json(schema))
            .await?;
        Ok(())
    }

    async fn collection_exists(&self, collection: &str) -> Result<bool, EngineError> {
        let url = self.url(&["collections", collection])?;
        match self.send(self.request(Method::GET, url)).await {
            Ok(_) => Ok(true),
            Err(EngineError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn create_document(
        &self,
        collection: &str,
        doc: &IndexedDocument,
    ) -> Result<(), EngineError> {
        let url = self.url(&["collections", collection, "documents"])?;
        self.send(self.request(Method::POST, url).json(doc)).await?;
        Ok(())
    }

    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        doc: &IndexedDocument,
    ) -> Result<(), EngineError> {
        if doc.id != id {
            return Err(EngineError::Rejected {
                status: 400,
                message: format!("document id '{}' does not match '{}'", doc.id, id),
            });
        }
        // Full replace: a PATCH would merge and keep fields the document
        // no longer carries.
        let url = self.url(&["collections", collection, "documents"])?;
        self.send(
            self.request(Method::POST, url)
                .query(&[("action", "upsert")])
                .json(doc),
        )
        .await?;
        Ok(())
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<(), EngineError> {
        let url = self.url(&["collections", collection, "documents", id])?;
        self.send(self.request(Method::DELETE, url)).await?;
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        params: &SearchParams,
    ) -> Result<SearchResponse, EngineError> {
        let url = self.url(&["collections", collection, "documents", "search"])?;
        let response = self
            .send(self.request(Method::GET, url).query(params))
            .await?;
        response
            .json::<SearchResponse>()
            .await
            .map_err(|e| EngineError::Decode(e.to_string()))
    }

    async fn health(&self) -> Result<(), EngineError> {
        let url = self.url(&["collections"])?;
        self.send(self.request(Method::GET, url)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::product_schema;
    use std::time::Duration;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> TypesenseClient {
        TypesenseClient::with_base_url(&server.uri(), "secret", Duration::from_secs(2)).unwrap()
    }

    fn doc(id: &str) -> IndexedDocument {
        IndexedDocument {
            id: id.to_string(),
            title: "Amazing Spider-Man #1".to_string(),
            description: None,
            short_description: None,
            price: Some(12.5),
            categories: vec!["comics".to_string()],
            attribute_terms: vec![],
            product_type: "simple".to_string(),
            product_visibility: "visible".to_string(),
            stock_status: "instock".to_string(),
            author: None,
            publish_date: 1_700_000_000,
            auction_dates_from: None,
            auction_dates_to: None,
            auction_start_price: None,
            auction_has_started: None,
            product_image_url: None,
            product_image_html: None,
        }
    }

    #[tokio::test]
    async fn create_collection_conflict_maps_to_conflict() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/collections"))
            .and(header(API_KEY_HEADER, "secret"))
            .respond_with(
                ResponseTemplate::new(409)
                    .set_body_json(serde_json::json!({"message": "A collection with name `p` already exists."})),
            )
            .mount(&server)
            .await;

        let err = client(&server)
            .ensure_collection(&product_schema("p"))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert!(err.to_string().contains("already exists"));
    }

    #[tokio::test]
    async fn collection_exists_maps_404_to_false() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/collections/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({"message": "Not Found"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/collections/present"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"name": "present"})))
            .mount(&server)
            .await;

        let c = client(&server);
        assert!(!c.collection_exists("missing").await.unwrap());
        assert!(c.collection_exists("present").await.unwrap());
    }

    #[tokio::test]
    async fn update_replaces_the_whole_document() {
        let server = MockServer::start().await;
        let replacement = doc("42");
        Mock::given(method("POST"))
            .and(path("/collections/p/documents"))
            .and(query_param("action", "upsert"))
            .and(body_json(&replacement))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "42"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        client(&server)
            .update_document("p", "42", &replacement)
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        // Absent fields are left out, so the engine drops any stale value.
        assert!(body.get("description").is_none());
        assert!(body.get("auction_dates_from").is_none());
    }

    #[tokio::test]
    async fn update_rejects_mismatched_id() {
        let server = MockServer::start().await;
        let err = client(&server)
            .update_document("p", "7", &doc("42"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Rejected { status: 400, .. }));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejected_request_carries_engine_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/collections/p/documents"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(serde_json::json!({"message": "Field `title` must be a string."})),
            )
            .mount(&server)
            .await;

        let err = client(&server)
            .create_document("p", &doc("1"))
            .await
            .unwrap_err();
        match err {
            EngineError::Rejected { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Field `title` must be a string.");
            }
            other => panic!("expected Rejected, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn search_sends_params_and_decodes_hits() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/collections/p/documents/search"))
            .and(query_param("q", "spiderman"))
            .and(query_param("sort_by", "title:asc"))
            .and(query_param("include_fields", "id"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "found": 2,
                "page": 1,
                "hits": [
                    {"document": {"id": "7"}, "text_match": 100},
                    {"document": {"id": "3"}, "text_match": 90}
                ]
            })))
            .mount(&server)
            .await;

        let params = SearchParams {
            q: "spiderman".to_string(),
            query_by: "title".to_string(),
            filter_by: "product_visibility:!=hidden".to_string(),
            facet_by: "categories".to_string(),
            sort_by: "title:asc".to_string(),
            per_page: 48,
            page: 1,
            include_fields: "id".to_string(),
        };
        let response = client(&server).search("p", &params).await.unwrap();
        assert_eq!(response.found, 2);
        let ids: Vec<_> = response.hits.iter().map(|h| h.document.id.as_str()).collect();
        assert_eq!(ids, vec!["7", "3"]);
    }

    #[tokio::test]
    async fn unreachable_engine_is_connection_error() {
        // Port 9 (discard) is not expected to accept HTTP connections.
        let c = TypesenseClient::with_base_url("http://127.0.0.1:9", "k", Duration::from_millis(500))
            .unwrap();
        let err = c.health().await.unwrap_err();
        assert!(err.is_connection(), "got {:?}", err);
    }
}
