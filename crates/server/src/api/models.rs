//! Request and response data transfer objects for the REST API.
//!
//! Publications, questions and stars are returned as their core types, which
//! already serialize to the public JSON shape.

use chrono::NaiveDate;
use publications_core::publication::BlockchainStatus;
use serde::{Deserialize, Serialize};

/// An image in a create/replace request. Ids are assigned by the server.
#[derive(Debug, Deserialize)]
pub struct ImageRequest {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct LocationRequest {
    pub latitude: f64,
    pub longitude: f64,
}

/// Request body for `POST /v1/publications` and `PUT /v1/publications/:id`.
#[derive(Debug, Deserialize)]
pub struct PublicationRequest {
    pub user_id: i64,
    pub title: String,
    pub description: String,
    pub rooms: i64,
    pub beds: i64,
    pub bathrooms: i64,
    pub price_per_night: f64,
    pub images: Vec<ImageRequest>,
    pub loc: LocationRequest,
}

/// Request body for `PATCH /v1/publications/:id`. Absent fields are left unchanged.
#[derive(Debug, Default, Deserialize)]
pub struct PublicationPatchRequest {
    pub blockchain_status: Option<BlockchainStatus>,
    pub blockchain_transaction_hash: Option<String>,
    pub blockchain_id: Option<i64>,
}

/// Query string of `POST`/`DELETE /v1/publications/:id/star`.
#[derive(Debug, Deserialize)]
pub struct StarQuery {
    pub user_id: i64,
}

/// Request body for `POST /v1/publications/:id/questions`.
#[derive(Debug, Deserialize)]
pub struct QuestionRequest {
    pub question: String,
    pub user_id: i64,
}

/// Request body for `PATCH /v1/publications/:id/questions/:question_id`.
#[derive(Debug, Deserialize)]
pub struct ReplyRequest {
    pub reply: String,
}

/// Query string of `GET /v1/metrics`.
#[derive(Debug, Deserialize)]
pub struct MetricsQuery {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Generic success message response.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Response body for `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub publications_count: usize,
    pub blocked_count: usize,
    pub wal_size_bytes: u64,
}
