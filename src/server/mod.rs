//! HTTP front-end: crawl trigger, listing, bulk delete, CSV export,
//! grouped statistics and the GraphQL endpoint.

pub mod graphql;

use anyhow::{Result, Context};
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::crawler::model::{GroupField, RecordGroup};
use crate::crawler::pipeline::CrawlPipeline;
use crate::export;
use crate::storage::WebsiteStore;

use self::graphql::{create_schema, graphiql, graphql_handler, Schema};

const GENERIC_FAILURE: &str = "something went wrong!";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: CrawlPipeline,
    pub store: Arc<dyn WebsiteStore>,
    pub schema: Arc<Schema>,
}

impl AppState {
    pub fn new(pipeline: CrawlPipeline) -> Self {
        Self {
            store: pipeline.store().clone(),
            pipeline,
            schema: Arc::new(create_schema()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CrawlRequest {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct ExportParams {
    pub fields: Option<String>,
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/crawl", post(crawl_handler))
        .route("/website", get(list_websites).delete(delete_websites))
        .route("/v1/export-csv", get(export_csv))
        .route("/star", get(star_stats))
        .route("/city", get(city_stats))
        .route("/graphql", get(graphiql).post(graphql_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until ctrl-c
pub async fn serve(state: AppState, bind_address: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_address)
        .await
        .context(format!("Failed to bind {}", bind_address))?;

    info!("Listening on {}", bind_address);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
}

fn failure(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "status": "error", "message": message }))).into_response()
}

async fn crawl_handler(
    State(state): State<AppState>,
    payload: Result<Json<CrawlRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return failure(rejection.status(), &rejection.body_text()),
    };

    match state.pipeline.crawl(&request.url).await {
        Ok(website) => (
            StatusCode::OK,
            Json(json!({ "status": "success", "data": { "website": website } })),
        )
            .into_response(),
        // Stage and cause are logged by the pipeline
        Err(_) => failure(StatusCode::INTERNAL_SERVER_ERROR, GENERIC_FAILURE),
    }
}

async fn list_websites(State(state): State<AppState>) -> Response {
    match state.store.find_all().await {
        Ok(websites) => Json(json!({
            "status": "success",
            "result": websites.len(),
            "data": { "websites": websites },
        }))
        .into_response(),
        Err(e) => {
            error!("Listing websites failed: {}", e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, GENERIC_FAILURE)
        }
    }
}

async fn delete_websites(State(state): State<AppState>) -> Response {
    match state.store.delete_all().await {
        Ok(removed) => {
            info!("Deleted {} websites", removed);
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => {
            error!("Deleting websites failed: {}", e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, GENERIC_FAILURE)
        }
    }
}

async fn export_csv(State(state): State<AppState>, Query(params): Query<ExportParams>) -> Response {
    let fields = match export::parse_fields(params.fields.as_deref().unwrap_or_default()) {
        Ok(fields) => fields,
        Err(e) => return failure(StatusCode::BAD_REQUEST, &e.to_string()),
    };

    let websites = match state.store.find_all().await {
        Ok(websites) => websites,
        Err(e) => {
            error!("Loading websites for export failed: {}", e);
            return failure(StatusCode::INTERNAL_SERVER_ERROR, GENERIC_FAILURE);
        }
    };

    let mut body = Vec::new();
    if let Err(e) = export::write_csv(&websites, &fields, &mut body) {
        error!("CSV export failed: {:#}", e);
        return failure(StatusCode::INTERNAL_SERVER_ERROR, GENERIC_FAILURE);
    }

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"websites.csv\""),
        ],
        body,
    )
        .into_response()
}

async fn star_stats(State(state): State<AppState>) -> Response {
    grouped(&state, GroupField::StarRating, |group| {
        json!({
            "starRating": group.key,
            "numWebsites": group.count,
            "data": group.websites,
        })
    })
    .await
}

async fn city_stats(State(state): State<AppState>) -> Response {
    grouped(&state, GroupField::City, |group| {
        json!({
            "city": group.key,
            "count": group.count,
            "data": group.websites,
        })
    })
    .await
}

async fn grouped<F>(state: &AppState, field: GroupField, render: F) -> Response
where
    F: Fn(RecordGroup) -> serde_json::Value,
{
    match state.store.group_by(field).await {
        Ok(groups) => {
            let stats: Vec<_> = groups.into_iter().map(render).collect();
            Json(json!({ "status": "success", "data": { "stats": stats } })).into_response()
        }
        Err(e) => {
            error!("Grouping by {} failed: {}", field.field_name(), e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, GENERIC_FAILURE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::error::{FetchError, StoreError};
    use crate::crawler::fetcher::{MockPageFetcher, PageFetcher};
    use crate::crawler::model::RawDocument;
    use crate::storage::{MemoryStore, MockWebsiteStore};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    const PAGE: &str = r#"<html><body><table>
        <tr><th>Business Name</th><td>Acme Shop</td></tr>
        <tr><th>City</th><td>Springfield</td></tr>
        <tr><th>Rating</th><td>4-star</td></tr>
    </table></body></html>"#;

    fn page_fetcher() -> Arc<dyn PageFetcher> {
        let mut fetcher = MockPageFetcher::new();
        fetcher.expect_fetch().returning(|target| {
            Ok(RawDocument {
                url: target.as_str().to_string(),
                status: 200,
                content_type: Some("text/html".to_string()),
                body: PAGE.to_string(),
            })
        });
        Arc::new(fetcher)
    }

    fn app_with(fetcher: Arc<dyn PageFetcher>, store: Arc<dyn WebsiteStore>) -> Router {
        router(AppState::new(CrawlPipeline::new(fetcher, store)))
    }

    fn crawl_request(url: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/crawl")
            .header("content-type", "application/json")
            .body(Body::from(json!({ "url": url }).to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_crawl_returns_record() {
        let app = app_with(page_fetcher(), Arc::new(MemoryStore::new()));

        let response = app.oneshot(crawl_request("https://example.com/trust-seal/123")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["status"], "success");
        assert_eq!(body["data"]["website"]["businessName"], "Acme Shop");
        assert_eq!(body["data"]["website"]["starRating"], 4);
        assert_eq!(body["data"]["website"]["version"], 1);
    }

    #[tokio::test]
    async fn test_crawl_failure_hides_details() {
        let mut fetcher = MockPageFetcher::new();
        fetcher.expect_fetch().returning(|_| Err(FetchError::Timeout));
        let app = app_with(Arc::new(fetcher), Arc::new(MemoryStore::new()));

        let response = app.oneshot(crawl_request("https://example.com/trust-seal/123")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = json_body(response).await;
        assert_eq!(body, json!({ "status": "error", "message": GENERIC_FAILURE }));
    }

    #[tokio::test]
    async fn test_crawl_body_without_url_gets_error_payload() {
        let mut fetcher = MockPageFetcher::new();
        fetcher.expect_fetch().never();
        let app = app_with(Arc::new(fetcher), Arc::new(MemoryStore::new()));

        let request = Request::builder()
            .method("POST")
            .uri("/crawl")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"link":"https://example.com/trust-seal/123"}"#))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = json_body(response).await;
        assert_eq!(body["status"], "error");
        assert!(body["message"].as_str().unwrap().contains("url"));
    }

    #[tokio::test]
    async fn test_list_and_delete() {
        let store = Arc::new(MemoryStore::new());
        let app = app_with(page_fetcher(), store.clone());

        app.clone().oneshot(crawl_request("https://example.com/trust-seal/1")).await.unwrap();
        app.clone().oneshot(crawl_request("https://example.com/trust-seal/2")).await.unwrap();

        let body = json_body(app.clone().oneshot(get("/website")).await.unwrap()).await;
        assert_eq!(body["result"], 2);
        assert_eq!(body["data"]["websites"].as_array().unwrap().len(), 2);

        let request = Request::builder().method("DELETE").uri("/website").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(store.find_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_store_failure() {
        let mut store = MockWebsiteStore::new();
        store.expect_find_all()
            .returning(|| Err(StoreError::ConnectionLost("down".to_string())));
        let app = app_with(page_fetcher(), Arc::new(store));

        let response = app.oneshot(get("/website")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(response).await["status"], "error");
    }

    #[tokio::test]
    async fn test_export_csv() {
        let app = app_with(page_fetcher(), Arc::new(MemoryStore::new()));
        app.clone().oneshot(crawl_request("https://example.com/trust-seal/123")).await.unwrap();

        let response = app.clone().oneshot(get("/v1/export-csv?fields=url,city,starRating")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/csv; charset=utf-8");

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert_eq!(text, "url,city,starRating\nhttps://example.com/trust-seal/123,Springfield,4\n");

        let response = app.oneshot(get("/v1/export-csv?fields=url,owner")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_group_stats() {
        let app = app_with(page_fetcher(), Arc::new(MemoryStore::new()));
        app.clone().oneshot(crawl_request("https://example.com/trust-seal/1")).await.unwrap();
        app.clone().oneshot(crawl_request("https://example.com/trust-seal/2")).await.unwrap();

        let body = json_body(app.clone().oneshot(get("/star")).await.unwrap()).await;
        let stats = body["data"]["stats"].as_array().unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0]["starRating"], 4);
        assert_eq!(stats[0]["numWebsites"], 2);

        let body = json_body(app.oneshot(get("/city")).await.unwrap()).await;
        assert_eq!(body["status"], "success");
        assert_eq!(body["data"]["stats"][0]["city"], "Springfield");
        assert_eq!(body["data"]["stats"][0]["count"], 2);
    }

    #[tokio::test]
    async fn test_graphql_query() {
        let app = app_with(page_fetcher(), Arc::new(MemoryStore::new()));
        app.clone().oneshot(crawl_request("https://example.com/trust-seal/123")).await.unwrap();

        let query = json!({
            "query": "{ websites { url businessName starRating registrationStatus version } }"
        });
        let request = Request::builder()
            .method("POST")
            .uri("/graphql")
            .header("content-type", "application/json")
            .body(Body::from(query.to_string()))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        let website = &body["data"]["websites"][0];
        assert_eq!(website["url"], "https://example.com/trust-seal/123");
        assert_eq!(website["businessName"], "Acme Shop");
        assert_eq!(website["starRating"], 4);
        assert_eq!(website["registrationStatus"], "unknown");
        assert_eq!(website["version"], 1);
    }
}
