//! HTTP request handlers and shared application state.

use crate::api::errors::ApiError;
use crate::api::metrics;
use crate::api::models::*;
use crate::wal_async::WriteAheadLog;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use metrics_exporter_prometheus::PrometheusHandle;
use publications_core::config;
use publications_core::error::{FilterError, StoreError};
use publications_core::publication::{
    BlockchainPatch, GeoPoint, Publication, PublicationDraft, PublicationImage,
    PublicationQuestion, PublicationStar,
};
use publications_core::search::{
    publication_filters, star_filters, validate_and_compose, ComposedQuery, FilterRegistry,
};
use publications_core::stats::{self, Metric};
use publications_core::storage::{save_snapshot, PublicationStore, WalEntry};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Shared application state passed to every handler via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub store: PublicationStore,
    pub data_dir: PathBuf,
    pub wal: Arc<WriteAheadLog>,
    pub prometheus_handle: PrometheusHandle,
    pub start_time: Instant,
    /// Query parameters of `GET /v1/publications`.
    pub publication_filters: Arc<FilterRegistry<Publication>>,
    /// Query parameters of `GET /v1/publications/:id/star`.
    pub star_filters: Arc<FilterRegistry<PublicationStar>>,
}

impl AppState {
    pub fn new(
        store: PublicationStore,
        data_dir: PathBuf,
        wal: Arc<WriteAheadLog>,
        prometheus_handle: PrometheusHandle,
    ) -> Result<Self, FilterError> {
        Ok(Self {
            store,
            data_dir,
            wal,
            prometheus_handle,
            start_time: Instant::now(),
            publication_filters: Arc::new(publication_filters()?),
            star_filters: Arc::new(star_filters()?),
        })
    }
}

/// Saves a snapshot of the store and truncates the WAL, with commits paused.
///
/// Returns the number of publications saved.
pub async fn save_and_truncate(state: &AppState) -> io::Result<usize> {
    let _gate = state.wal.freeze().await;
    save_snapshot(&state.store, &state.data_dir)?;
    state.wal.truncate()?;
    Ok(state.store.len())
}

/// Logs `entry` to the WAL and applies it to the store.
///
/// The outer error is a server fault, the inner one is the store's verdict,
/// left to the caller to map since its meaning depends on the endpoint.
/// Entries the store would reject are not logged.
async fn commit(
    state: &AppState,
    entry: WalEntry,
) -> Result<Result<Arc<Publication>, StoreError>, ApiError> {
    if let Err(e) = state.store.check(&entry) {
        return Ok(Err(e));
    }
    let result = state
        .wal
        .commit(&entry, || state.store.apply(&entry))
        .await
        .map_err(|e| {
            tracing::error!(operation = entry.operation(), "WAL append failed: {}", e);
            ApiError::Internal("Write failed".into())
        })?;
    if result.is_ok() {
        metrics::record_write_operation(entry.operation());
    }
    Ok(result)
}

/// Maps a blocked publication with `blocked`, any other store error as usual.
fn map_blocked(err: StoreError, blocked: fn(String) -> ApiError) -> ApiError {
    match err {
        StoreError::PublicationBlocked(_) => blocked(err.to_string()),
        other => other.into(),
    }
}

fn validate_text(field: &str, value: &str, max_len: usize) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::BadRequest(format!("{} must not be empty", field)));
    }
    if value.len() > max_len {
        return Err(ApiError::BadRequest(format!(
            "{} exceeds maximum length of {} bytes",
            field, max_len
        )));
    }
    Ok(())
}

fn validate_count(field: &str, value: i64) -> Result<(), ApiError> {
    if value < 0 {
        return Err(ApiError::BadRequest(format!(
            "{} must not be negative",
            field
        )));
    }
    Ok(())
}

/// Validates a create/replace payload and turns it into a draft with fresh image ids.
fn validate_publication(req: PublicationRequest) -> Result<PublicationDraft, ApiError> {
    validate_text("title", &req.title, config::MAX_TITLE_LEN)?;
    if req.description.len() > config::MAX_DESCRIPTION_LEN {
        return Err(ApiError::BadRequest(format!(
            "description exceeds maximum length of {} bytes",
            config::MAX_DESCRIPTION_LEN
        )));
    }
    validate_count("rooms", req.rooms)?;
    validate_count("beds", req.beds)?;
    validate_count("bathrooms", req.bathrooms)?;
    if !req.price_per_night.is_finite() || req.price_per_night <= 0.0 {
        return Err(ApiError::BadRequest(
            "price_per_night must be a positive number".into(),
        ));
    }
    if req.images.len() > config::MAX_IMAGES {
        return Err(ApiError::BadRequest(format!(
            "At most {} images are allowed",
            config::MAX_IMAGES
        )));
    }
    for image in &req.images {
        validate_text("image url", &image.url, config::MAX_IMAGE_URL_LEN)?;
    }
    let loc = GeoPoint::new(req.loc.latitude, req.loc.longitude).map_err(ApiError::BadRequest)?;

    Ok(PublicationDraft {
        user_id: req.user_id,
        title: req.title,
        description: req.description,
        rooms: req.rooms,
        beds: req.beds,
        bathrooms: req.bathrooms,
        price_per_night: req.price_per_night,
        images: req
            .images
            .into_iter()
            .map(|image| PublicationImage::new(image.url))
            .collect(),
        loc,
    })
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: state.start_time.elapsed().as_secs(),
            publications_count: state.store.len(),
            blocked_count: state.store.blocked_count(),
            wal_size_bytes: state.wal.size_bytes(),
        }),
    )
}

/// `GET /metrics`
pub async fn metrics_endpoint(State(state): State<AppState>) -> String {
    state.prometheus_handle.render()
}

/// `POST /admin/snapshot`
pub async fn snapshot(State(state): State<AppState>) -> Result<Json<MessageResponse>, ApiError> {
    let count = save_and_truncate(&state).await.map_err(|e| {
        tracing::error!("Snapshot failed: {}", e);
        ApiError::Internal("Snapshot failed".into())
    })?;
    tracing::info!(publications = count, "Snapshot saved, WAL truncated");
    Ok(Json(MessageResponse {
        message: format!("Snapshot complete, {} publications saved", count),
    }))
}

/// `POST /v1/publications`
pub async fn create_publication(
    State(state): State<AppState>,
    payload: Result<Json<PublicationRequest>, JsonRejection>,
) -> Result<Json<Arc<Publication>>, ApiError> {
    let Json(req) = payload?;
    let draft = validate_publication(req)?;
    let id = state.store.next_publication_id();
    let user_id = draft.user_id;
    let entry = WalEntry::CreatePublication {
        publication: Publication::new(id, draft, Utc::now()),
    };
    let created = commit(&state, entry).await??;
    tracing::info!(publication_id = id, user_id, "Publication created");
    Ok(Json(created))
}

/// `GET /v1/publications`
///
/// Unrecognized query parameters are ignored.
pub async fn list_publications(
    State(state): State<AppState>,
    params: Result<Query<HashMap<String, String>>, QueryRejection>,
) -> Result<Json<Vec<Arc<Publication>>>, ApiError> {
    let Query(raw) = params?;
    let parsed = state.publication_filters.parse(&raw)?;
    let query = validate_and_compose(ComposedQuery::all(), &parsed)?;
    let search_type = if query.is_geo() { "geo" } else { "plain" };
    metrics::record_search_operation(search_type);

    let results = state.store.query(&query);
    tracing::debug!(
        search_type,
        predicates = query.predicates().len(),
        results = results.len(),
        "Publications listed"
    );
    Ok(Json(results))
}

/// `GET /v1/publications/:id`
pub async fn get_publication(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Arc<Publication>>, ApiError> {
    let publication = state
        .store
        .get(id)
        .ok_or(StoreError::PublicationNotFound(id))?;
    if publication.blocked {
        return Err(StoreError::PublicationBlocked(id).into());
    }
    Ok(Json(publication))
}

/// `PUT /v1/publications/:id`
pub async fn replace_publication(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    payload: Result<Json<PublicationRequest>, JsonRejection>,
) -> Result<Json<Arc<Publication>>, ApiError> {
    let Json(req) = payload?;
    let draft = validate_publication(req)?;
    let entry = WalEntry::ReplacePublication {
        publication_id: id,
        draft,
    };
    let replaced = commit(&state, entry).await??;
    tracing::info!(publication_id = id, "Publication replaced");
    Ok(Json(replaced))
}

/// `PATCH /v1/publications/:id`
pub async fn patch_publication(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    payload: Result<Json<PublicationPatchRequest>, JsonRejection>,
) -> Result<Json<Arc<Publication>>, ApiError> {
    let Json(req) = payload?;
    if let Some(hash) = &req.blockchain_transaction_hash {
        validate_text(
            "blockchain_transaction_hash",
            hash,
            config::MAX_TRANSACTION_HASH_LEN,
        )?;
    }
    let entry = WalEntry::PatchPublication {
        publication_id: id,
        patch: BlockchainPatch {
            blockchain_status: req.blockchain_status,
            blockchain_transaction_hash: req.blockchain_transaction_hash,
            blockchain_id: req.blockchain_id,
        },
    };
    let patched = commit(&state, entry).await??;
    tracing::info!(
        publication_id = id,
        blockchain_status = %patched.blockchain_status,
        "Publication patched"
    );
    Ok(Json(patched))
}

/// `DELETE /v1/publications/:id`
///
/// Blocks the publication; it stays stored but is hidden from default searches.
pub async fn block_publication(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<MessageResponse>, ApiError> {
    commit(&state, WalEntry::BlockPublication { publication_id: id })
        .await?
        .map_err(|e| map_blocked(e, ApiError::Conflict))?;
    tracing::info!(publication_id = id, "Publication blocked");
    Ok(Json(MessageResponse {
        message: "Publication was successfully blocked".into(),
    }))
}

/// `POST /v1/publications/:id/star?user_id=`
pub async fn star_publication(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    params: Result<Query<StarQuery>, QueryRejection>,
) -> Result<Json<PublicationStar>, ApiError> {
    let Query(StarQuery { user_id }) = params?;
    let star = PublicationStar {
        user_id,
        publication_id: id,
        created_at: Utc::now(),
    };
    commit(&state, WalEntry::StarPublication { star: star.clone() }).await??;
    tracing::info!(publication_id = id, user_id, "Publication starred");
    Ok(Json(star))
}

/// `DELETE /v1/publications/:id/star?user_id=`
pub async fn unstar_publication(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    params: Result<Query<StarQuery>, QueryRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Query(StarQuery { user_id }) = params?;
    commit(
        &state,
        WalEntry::UnstarPublication {
            publication_id: id,
            user_id,
        },
    )
    .await??;
    tracing::info!(publication_id = id, user_id, "Publication unstarred");
    Ok(Json(MessageResponse {
        message: "Successfully deleted".into(),
    }))
}

/// `GET /v1/publications/:id/star`
pub async fn list_stars(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    params: Result<Query<HashMap<String, String>>, QueryRejection>,
) -> Result<Json<Vec<PublicationStar>>, ApiError> {
    let Query(raw) = params?;
    let parsed = state.star_filters.parse(&raw)?;
    let query = validate_and_compose(ComposedQuery::all(), &parsed)?;
    Ok(Json(state.store.stars(id, &query)?))
}

/// `POST /v1/publications/:id/questions`
pub async fn ask_question(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    payload: Result<Json<QuestionRequest>, JsonRejection>,
) -> Result<Json<PublicationQuestion>, ApiError> {
    let Json(req) = payload?;
    validate_text("question", &req.question, config::MAX_QUESTION_LEN)?;
    let question = PublicationQuestion {
        id: state.store.next_question_id(),
        user_id: req.user_id,
        question: req.question,
        reply: None,
        created_at: Utc::now(),
        replied_at: None,
    };
    let entry = WalEntry::AskQuestion {
        publication_id: id,
        question: question.clone(),
    };
    commit(&state, entry)
        .await?
        .map_err(|e| map_blocked(e, ApiError::BadRequest))?;
    tracing::info!(
        publication_id = id,
        question_id = question.id,
        user_id = question.user_id,
        "Question asked"
    );
    Ok(Json(question))
}

/// `PATCH /v1/publications/:id/questions/:question_id`
pub async fn reply_question(
    State(state): State<AppState>,
    Path((id, question_id)): Path<(u64, u64)>,
    payload: Result<Json<ReplyRequest>, JsonRejection>,
) -> Result<Json<PublicationQuestion>, ApiError> {
    let Json(req) = payload?;
    validate_text("reply", &req.reply, config::MAX_QUESTION_LEN)?;
    let entry = WalEntry::ReplyQuestion {
        publication_id: id,
        question_id,
        reply: req.reply,
        replied_at: Utc::now(),
    };
    let publication = commit(&state, entry)
        .await?
        .map_err(|e| map_blocked(e, ApiError::BadRequest))?;
    let question = publication
        .questions
        .iter()
        .find(|q| q.id == question_id)
        .cloned()
        .ok_or(StoreError::QuestionNotFound {
            publication_id: id,
            question_id,
        })?;
    tracing::info!(publication_id = id, question_id, "Question replied");
    Ok(Json(question))
}

/// `GET /v1/metrics?start_date=&end_date=`
pub async fn publication_metrics(
    State(state): State<AppState>,
    params: Result<Query<MetricsQuery>, QueryRejection>,
) -> Result<Json<Vec<Metric>>, ApiError> {
    let Query(range) = params?;
    Ok(Json(stats::all_metrics(
        &state.store,
        range.start_date,
        range.end_date,
    )?))
}
