//! Read-only GraphQL view over the website collection.

use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use juniper::{EmptyMutation, EmptySubscription, FieldResult, RootNode};
use juniper::http::GraphQLRequest;
use std::sync::Arc;

use crate::crawler::model::WebsiteRecord;
use crate::server::AppState;
use crate::storage::WebsiteStore;

/// Per-request context handed to resolvers
pub struct GraphQLContext {
    pub store: Arc<dyn WebsiteStore>,
}

impl juniper::Context for GraphQLContext {}

/// A crawled trust-seal record
#[derive(Debug, Clone, juniper::GraphQLObject)]
#[graphql(name = "Website")]
pub struct WebsiteNode {
    pub id: String,
    pub url: String,
    pub business_name: String,
    pub city: String,
    /// Number of stars, null when the page showed none
    pub star_rating: Option<i32>,
    pub registration_status: String,
    pub crawled_at: DateTime<Utc>,
    pub version: i32,
}

impl From<WebsiteRecord> for WebsiteNode {
    fn from(record: WebsiteRecord) -> Self {
        Self {
            id: record.id,
            url: record.url,
            business_name: record.business_name,
            city: record.city,
            star_rating: record.star_rating.stars().map(i32::from),
            registration_status: record.registration_status.to_string(),
            crawled_at: record.crawled_at,
            version: i32::try_from(record.version).unwrap_or(i32::MAX),
        }
    }
}

pub struct Query;

#[juniper::graphql_object(context = GraphQLContext)]
impl Query {
    /// Every stored website
    async fn websites(context: &GraphQLContext) -> FieldResult<Vec<WebsiteNode>> {
        let records = context.store.find_all().await?;
        Ok(records.into_iter().map(WebsiteNode::from).collect())
    }

    /// The website stored for a URL
    async fn website(context: &GraphQLContext, url: String) -> FieldResult<Option<WebsiteNode>> {
        let record = context.store.find_by_url(&url).await?;
        Ok(record.map(WebsiteNode::from))
    }
}

pub type Schema = RootNode<'static, Query, EmptyMutation<GraphQLContext>, EmptySubscription<GraphQLContext>>;

pub fn create_schema() -> Schema {
    Schema::new(Query, EmptyMutation::new(), EmptySubscription::new())
}

/// GraphQL POST endpoint
pub async fn graphql_handler(
    State(state): State<AppState>,
    Json(request): Json<GraphQLRequest>,
) -> Response {
    let context = GraphQLContext {
        store: state.store.clone(),
    };

    let response = request.execute(&state.schema, &context).await;
    let status = if response.is_ok() {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };

    (status, Json(response)).into_response()
}

/// GraphiQL explorer
pub async fn graphiql() -> Html<String> {
    Html(juniper::http::graphiql::graphiql_source("/graphql", None))
}
