use axum::{
	Json, Router,
	extract::{Path, Query, State},
	http::{HeaderMap, StatusCode},
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::state::AppState;
use rapport_domain::duplicates::DetectionStatus;
use rapport_service::{
	CreateQuestionRequest, CreateQuestionResponse, EngagementResponse, Error as ServiceError,
	MetadataUpdate, PoolReport, PreferenceResponse, PruneReport, ReviewRequest, ReviewResponse,
	SeenRequest, SelectRequest, SelectResponse, SimilarQuestion, SweepReport,
};
use rapport_storage::models::{DuplicateDetection, DuplicateSweep, Question};

pub const USER_ID_HEADER: &str = "x-rapport-user-id";

const DEFAULT_SIMILAR_LIMIT: u32 = 10;
const DEFAULT_DETECTION_LIMIT: u32 = 100;

#[derive(Debug, Deserialize)]
struct SimilarQuery {
	limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct DetectionQuery {
	status: Option<DetectionStatus>,
	limit: Option<u32>,
}

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/v1/questions", post(create_question))
		.route("/v1/questions/next", post(select_next))
		.route("/v1/questions/{question_id}/seen", post(mark_seen))
		.route("/v1/questions/{question_id}/like", post(toggle_like))
		.route("/v1/questions/{question_id}/hide", post(toggle_hide))
		.route("/v1/questions/{question_id}/similar", get(similar_questions))
		.route("/v1/styles/{style_id}/hide", post(hide_style))
		.route("/v1/tones/{tone_id}/hide", post(hide_tone))
		.with_state(state)
}

pub fn admin_router(state: AppState) -> Router {
	Router::new()
		.route("/v1/admin/users/{user_id}/preference", get(get_preference))
		.route("/v1/admin/questions/{question_id}/metadata", post(update_metadata))
		.route("/v1/admin/sweeps", post(start_sweep))
		.route("/v1/admin/sweeps/{sweep_id}", get(get_sweep))
		.route("/v1/admin/sweeps/{sweep_id}/step", post(run_sweep_step))
		.route("/v1/admin/sweeps/{sweep_id}/resume", post(resume_sweep))
		.route("/v1/admin/duplicates", get(list_detections))
		.route("/v1/admin/duplicates/{detection_id}/review", post(review_detection))
		.route("/v1/admin/pool", post(generate_pool))
		.route("/v1/admin/prune", post(prune))
		.with_state(state)
}

/// A missing or unparsable header leaves the user unresolved.
pub fn user_id(headers: &HeaderMap) -> Option<Uuid> {
	headers.get(USER_ID_HEADER)?.to_str().ok().and_then(|raw| Uuid::parse_str(raw.trim()).ok())
}

fn require_user(headers: &HeaderMap) -> Result<Uuid, ApiError> {
	user_id(headers).ok_or_else(|| {
		json_error(
			StatusCode::BAD_REQUEST,
			"invalid_request",
			format!("{USER_ID_HEADER} header must carry a user id."),
		)
	})
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn create_question(
	State(state): State<AppState>,
	Json(payload): Json<CreateQuestionRequest>,
) -> Result<Json<CreateQuestionResponse>, ApiError> {
	let response = state.service.create_question(payload).await?;

	Ok(Json(response))
}

async fn select_next(
	State(state): State<AppState>,
	headers: HeaderMap,
	Json(payload): Json<SelectRequest>,
) -> Result<Json<SelectResponse>, ApiError> {
	let response = state.service.select_next(user_id(&headers), payload).await?;

	Ok(Json(response))
}

async fn mark_seen(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path(question_id): Path<Uuid>,
	Json(payload): Json<SeenRequest>,
) -> Result<Json<EngagementResponse>, ApiError> {
	let user_id = require_user(&headers)?;
	let response = state.service.mark_seen(user_id, question_id, payload).await?;

	Ok(Json(response))
}

async fn toggle_like(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path(question_id): Path<Uuid>,
) -> Result<Json<EngagementResponse>, ApiError> {
	let user_id = require_user(&headers)?;
	let response = state.service.toggle_like(user_id, question_id).await?;

	Ok(Json(response))
}

async fn toggle_hide(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path(question_id): Path<Uuid>,
) -> Result<Json<EngagementResponse>, ApiError> {
	let user_id = require_user(&headers)?;
	let response = state.service.toggle_hide(user_id, question_id).await?;

	Ok(Json(response))
}

async fn similar_questions(
	State(state): State<AppState>,
	Path(question_id): Path<Uuid>,
	Query(query): Query<SimilarQuery>,
) -> Result<Json<Vec<SimilarQuestion>>, ApiError> {
	let limit = query.limit.unwrap_or(DEFAULT_SIMILAR_LIMIT);
	let response = state.service.similar_questions(question_id, limit).await?;

	Ok(Json(response))
}

async fn hide_style(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path(style_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
	let user_id = require_user(&headers)?;

	state.service.hide_style(user_id, style_id).await?;

	Ok(StatusCode::NO_CONTENT)
}

async fn hide_tone(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path(tone_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
	let user_id = require_user(&headers)?;

	state.service.hide_tone(user_id, tone_id).await?;

	Ok(StatusCode::NO_CONTENT)
}

async fn get_preference(
	State(state): State<AppState>,
	Path(user_id): Path<Uuid>,
) -> Result<Json<PreferenceResponse>, ApiError> {
	let response = state.service.get_preference_vector(user_id).await?;

	Ok(Json(response))
}

async fn update_metadata(
	State(state): State<AppState>,
	Path(question_id): Path<Uuid>,
	Json(payload): Json<MetadataUpdate>,
) -> Result<Json<Question>, ApiError> {
	let response = state.service.update_question_metadata(question_id, payload).await?;

	Ok(Json(response))
}

async fn start_sweep(State(state): State<AppState>) -> Result<Json<DuplicateSweep>, ApiError> {
	let response = state.service.start_sweep().await?;

	Ok(Json(response))
}

async fn get_sweep(
	State(state): State<AppState>,
	Path(sweep_id): Path<Uuid>,
) -> Result<Json<DuplicateSweep>, ApiError> {
	let response = state.service.get_sweep(sweep_id).await?;

	Ok(Json(response))
}

async fn run_sweep_step(
	State(state): State<AppState>,
	Path(sweep_id): Path<Uuid>,
) -> Result<Json<SweepReport>, ApiError> {
	let response = state.service.run_sweep_step(sweep_id).await?;

	Ok(Json(response))
}

async fn resume_sweep(
	State(state): State<AppState>,
	Path(sweep_id): Path<Uuid>,
) -> Result<Json<DuplicateSweep>, ApiError> {
	let response = state.service.resume_sweep(sweep_id).await?;

	Ok(Json(response))
}

async fn list_detections(
	State(state): State<AppState>,
	Query(query): Query<DetectionQuery>,
) -> Result<Json<Vec<DuplicateDetection>>, ApiError> {
	let limit = query.limit.unwrap_or(DEFAULT_DETECTION_LIMIT);
	let response = state.service.list_detections(query.status, limit).await?;

	Ok(Json(response))
}

async fn review_detection(
	State(state): State<AppState>,
	Path(detection_id): Path<Uuid>,
	Json(payload): Json<ReviewRequest>,
) -> Result<Json<ReviewResponse>, ApiError> {
	let response = state.service.review_detection(detection_id, payload.decision).await?;

	Ok(Json(response))
}

async fn generate_pool(State(state): State<AppState>) -> Result<Json<PoolReport>, ApiError> {
	let pool_date = OffsetDateTime::now_utc().date();

	match state.service.generate_pool(pool_date).await? {
		Some(report) => Ok(Json(report)),
		None => Err(json_error(
			StatusCode::CONFLICT,
			"conflict",
			format!("The pool for {pool_date} was already generated."),
		)),
	}
}

async fn prune(State(state): State<AppState>) -> Result<Json<PruneReport>, ApiError> {
	let response = state.service.prune_stale_questions().await?;

	Ok(Json(response))
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
}
impl ApiError {
	fn new(status: StatusCode, error_code: impl Into<String>, message: impl Into<String>) -> Self {
		Self { status, error_code: error_code.into(), message: message.into() }
	}
}
impl From<ServiceError> for ApiError {
	fn from(err: ServiceError) -> Self {
		match err {
			ServiceError::InvalidRequest { message } =>
				json_error(StatusCode::BAD_REQUEST, "invalid_request", message),
			ServiceError::NotFound { message } =>
				json_error(StatusCode::NOT_FOUND, "not_found", message),
			ServiceError::Conflict { message } =>
				json_error(StatusCode::CONFLICT, "conflict", message),
			ServiceError::RateLimited { .. } => json_error(
				StatusCode::BAD_GATEWAY,
				"provider_rate_limited",
				"The upstream provider is rate limiting requests.",
			),
			ServiceError::Provider { message } =>
				json_error(StatusCode::BAD_GATEWAY, "provider_error", message),
			err @ (ServiceError::Storage { .. } | ServiceError::Qdrant { .. }) => {
				tracing::error!(error = %err, "Request failed.");

				json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "Internal error.")
			},
		}
	}
}
impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body = ErrorBody { error_code: self.error_code, message: self.message };

		(self.status, Json(body)).into_response()
	}
}

pub fn json_error(status: StatusCode, code: &str, message: impl Into<String>) -> ApiError {
	ApiError::new(status, code, message)
}

#[cfg(test)]
mod tests {
	use axum::http::HeaderValue;

	use super::*;

	#[test]
	fn user_header_must_be_a_uuid() {
		let mut headers = HeaderMap::new();

		assert_eq!(user_id(&headers), None);

		headers.insert(USER_ID_HEADER, HeaderValue::from_static("not-a-uuid"));

		assert_eq!(user_id(&headers), None);

		headers.insert(
			USER_ID_HEADER,
			HeaderValue::from_static(" 6f1c2a56-2f5e-4b8e-9c54-0d7b3b8e9a01 "),
		);

		assert_eq!(
			user_id(&headers),
			Some(Uuid::from_u128(0x6f1c2a56_2f5e_4b8e_9c54_0d7b3b8e9a01))
		);
	}

	#[test]
	fn service_errors_map_to_statuses() {
		let cases = [
			(ServiceError::InvalidRequest { message: "x".to_string() }, StatusCode::BAD_REQUEST),
			(ServiceError::NotFound { message: "x".to_string() }, StatusCode::NOT_FOUND),
			(ServiceError::Conflict { message: "x".to_string() }, StatusCode::CONFLICT),
			(ServiceError::RateLimited { retry_after: None }, StatusCode::BAD_GATEWAY),
			(ServiceError::Provider { message: "x".to_string() }, StatusCode::BAD_GATEWAY),
			(ServiceError::Storage { message: "x".to_string() }, StatusCode::INTERNAL_SERVER_ERROR),
		];

		for (err, status) in cases {
			assert_eq!(ApiError::from(err).status, status);
		}
	}
}
