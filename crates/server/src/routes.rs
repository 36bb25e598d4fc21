use axum::body::Bytes;
use axum::extract::rejection::{BytesRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use imock_api::{ApiError, ErrorBody};
use imock_query::{ListQuery, Page};

use crate::AppState;

pub const TOTAL_COUNT_HEADER: HeaderName = HeaderName::from_static("x-total-count");
pub const PAGE_HEADER: HeaderName = HeaderName::from_static("x-page");
pub const LIMIT_HEADER: HeaderName = HeaderName::from_static("x-limit");

/// Error rendered as a JSON `{error, message}` response.
#[derive(Debug)]
pub enum HttpError {
    Api(ApiError),
    /// The request never reached the API: oversized body, undecodable path or query.
    Rejected { status: StatusCode, message: String },
}

impl HttpError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Api(e) => StatusCode::from_u16(e.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Self::Rejected { status, .. } => *status,
        }
    }

    pub fn body(&self) -> ErrorBody {
        match self {
            Self::Api(e) => e.body(),
            Self::Rejected { status, message } => ErrorBody {
                error: if *status == StatusCode::PAYLOAD_TOO_LARGE { "payload_too_large" } else { "bad_request" },
                message: message.clone(),
                status: None,
            },
        }
    }
}

impl From<ApiError> for HttpError {
    fn from(e: ApiError) -> Self { Self::Api(e) }
}

macro_rules! from_rejection {
    ($($rejection:ty),+) => {$(
        impl From<$rejection> for HttpError {
            fn from(r: $rejection) -> Self { Self::Rejected { status: r.status(), message: r.body_text() } }
        }
    )+};
}

from_rejection!(PathRejection, QueryRejection, BytesRejection);

impl IntoResponse for HttpError {
    fn into_response(self) -> Response { (self.status(), Json(self.body())).into_response() }
}

type HttpResult<T> = Result<T, HttpError>;

pub(crate) fn page_headers(page: &Page) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(TOTAL_COUNT_HEADER, HeaderValue::from(page.total as u64));
    headers.insert(PAGE_HEADER, HeaderValue::from(page.page));
    headers.insert(LIMIT_HEADER, HeaderValue::from(page.limit));
    headers
}

pub(crate) async fn health(State(st): State<AppState>) -> HttpResult<Response> {
    Ok(Json(st.api.health().await?).into_response())
}

pub(crate) async fn db(State(st): State<AppState>) -> HttpResult<Response> {
    Ok(Json(st.api.db().await?.resources).into_response())
}

pub(crate) async fn list(
    State(st): State<AppState>,
    resource: Result<Path<String>, PathRejection>,
    pairs: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> HttpResult<Response> {
    let (Path(resource), Query(pairs)) = (resource?, pairs?);
    let query = ListQuery::from_pairs(pairs);
    let out = st.api.list(&resource, &query).await?;
    Ok(match out.page {
        Some(page) => (page_headers(&page), Json(out.items)).into_response(),
        None => Json(out.items).into_response(),
    })
}

pub(crate) async fn create(
    State(st): State<AppState>,
    resource: Result<Path<String>, PathRejection>,
    body: Result<Bytes, BytesRejection>,
) -> HttpResult<Response> {
    let (Path(resource), body) = (resource?, body?);
    let record = st.api.create(&resource, &body).await?;
    Ok((StatusCode::CREATED, Json(record)).into_response())
}

pub(crate) async fn get_one(State(st): State<AppState>, path: Result<Path<(String, String)>, PathRejection>) -> HttpResult<Response> {
    let Path((resource, id)) = path?;
    Ok(Json(st.api.get(&resource, &id).await?).into_response())
}

pub(crate) async fn replace(
    State(st): State<AppState>,
    path: Result<Path<(String, String)>, PathRejection>,
    body: Result<Bytes, BytesRejection>,
) -> HttpResult<Response> {
    let (Path((resource, id)), body) = (path?, body?);
    Ok(Json(st.api.replace(&resource, &id, &body).await?).into_response())
}

pub(crate) async fn patch(
    State(st): State<AppState>,
    path: Result<Path<(String, String)>, PathRejection>,
    body: Result<Bytes, BytesRejection>,
) -> HttpResult<Response> {
    let (Path((resource, id)), body) = (path?, body?);
    Ok(Json(st.api.patch(&resource, &id, &body).await?).into_response())
}

pub(crate) async fn delete(State(st): State<AppState>, path: Result<Path<(String, String)>, PathRejection>) -> HttpResult<Response> {
    let Path((resource, id)) = path?;
    st.api.delete(&resource, &id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}
