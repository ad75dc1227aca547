//! HTTP surface that forwards client requests to the Strava API with a bearer token attached.
//!
//! Every API route asks the [`TokenManager`](crate::manager::TokenManager) for a usable access
//! token before calling upstream. Successful upstream answers are passed through with their
//! status, `content-type`, and body untouched; every failure becomes a generic 500 rendered by
//! [`Error`]'s `IntoResponse` implementation. Extractor rejections (a non-numeric activity id or a
//! malformed JSON body) are folded into [`Error::InvalidRequest`] so they share the JSON body shape.

// std
use std::time::Duration as StdDuration;
// crates.io
use axum::{
	Json, Router,
	body::Body,
	extract::{
		Path, RawQuery, State,
		rejection::{JsonRejection, PathRejection},
	},
	http::{Method, header::CONTENT_TYPE},
	response::Response,
	routing::{get, post},
};
use reqwest::redirect::Policy;
use serde_json::Value;
use tower_http::trace::TraceLayer;
// self
use crate::{
	_prelude::*,
	config::UpstreamEndpoints,
	error::{ConfigError, UpstreamError},
	manager::ReqwestTokenManager,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

/// Shared state handed to every route handler.
#[derive(Clone, Debug)]
pub struct AppState {
	/// Token manager that supplies bearer tokens.
	pub manager: Arc<ReqwestTokenManager>,
	/// Upstream endpoints requests are forwarded to.
	pub endpoints: UpstreamEndpoints,
	client: ReqwestClient,
}
impl AppState {
	/// Builds state whose forwarded requests fail after `timeout`.
	pub fn new(
		manager: Arc<ReqwestTokenManager>,
		endpoints: UpstreamEndpoints,
		timeout: StdDuration,
	) -> Result<Self, ConfigError> {
		let client = ReqwestClient::builder().timeout(timeout).redirect(Policy::none()).build()?;

		Ok(Self::with_client(manager, endpoints, client))
	}

	/// Builds state around an existing reqwest client.
	pub fn with_client(
		manager: Arc<ReqwestTokenManager>,
		endpoints: UpstreamEndpoints,
		client: ReqwestClient,
	) -> Self {
		Self { manager, endpoints, client }
	}

	/// Sends `method path?query` upstream with the current bearer token and relays the answer.
	pub async fn forward(
		&self,
		method: Method,
		path: &str,
		query: Option<&str>,
		body: Option<Value>,
	) -> Result<Response> {
		const KIND: FlowKind = FlowKind::Forward;

		let span = FlowSpan::new(KIND, "forward");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.relay(method, path, query, body)).await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	async fn relay(
		&self,
		method: Method,
		path: &str,
		query: Option<&str>,
		body: Option<Value>,
	) -> Result<Response> {
		let token = self.manager.get_usable_token().await?;
		let url = self.endpoints.api_url(path, query)?;
		let mut request = self.client.request(method.clone(), url).bearer_auth(token.expose());

		if let Some(body) = body {
			request = request.json(&body);
		}

		let upstream = request.send().await.map_err(UpstreamError::from)?;
		let status = upstream.status();

		if !status.is_success() {
			return Err(UpstreamError::Status {
				method: method.to_string(),
				path: path.to_owned(),
				status: status.as_u16(),
			}
			.into());
		}

		let content_type = upstream.headers().get(CONTENT_TYPE).cloned();
		let bytes = upstream.bytes().await.map_err(UpstreamError::from)?;
		let mut response = Response::new(Body::from(bytes));

		*response.status_mut() = status;

		if let Some(value) = content_type {
			response.headers_mut().insert(CONTENT_TYPE, value);
		}

		tracing::debug!(%method, path, status = status.as_u16(), "Forwarded request.");

		Ok(response)
	}
}

/// Body accepted by `PUT /activities/{id}`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ActivityUpdate {
	/// New activity name.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	/// New activity type, such as `Run` or `Ride`.
	#[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
	pub kind: Option<String>,
}

/// Builds the gateway router over `state`.
pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/athlete", get(athlete))
		.route("/athlete/activities", get(athlete_activities))
		.route("/activities", post(create_activity))
		.route("/activities/{id}", get(activity).put(update_activity))
		.route("/activities/{id}/comments", get(activity_comments))
		.layer(TraceLayer::new_for_http())
		.with_state(state)
}

async fn health() -> Json<Value> {
	Json(serde_json::json!({ "status": "ok" }))
}

async fn athlete(State(state): State<AppState>, RawQuery(query): RawQuery) -> Result<Response> {
	state.forward(Method::GET, "/athlete", query.as_deref(), None).await
}

async fn athlete_activities(
	State(state): State<AppState>,
	RawQuery(query): RawQuery,
) -> Result<Response> {
	state.forward(Method::GET, "/athlete/activities", query.as_deref(), None).await
}

async fn create_activity(
	State(state): State<AppState>,
	body: Result<Json<Value>, JsonRejection>,
) -> Result<Response> {
	let Json(body) = body?;

	state.forward(Method::POST, "/activities", None, Some(body)).await
}

async fn activity(
	State(state): State<AppState>,
	id: Result<Path<u64>, PathRejection>,
	RawQuery(query): RawQuery,
) -> Result<Response> {
	let Path(id) = id?;

	state.forward(Method::GET, &format!("/activities/{id}"), query.as_deref(), None).await
}

async fn activity_comments(
	State(state): State<AppState>,
	id: Result<Path<u64>, PathRejection>,
	RawQuery(query): RawQuery,
) -> Result<Response> {
	let Path(id) = id?;

	state.forward(Method::GET, &format!("/activities/{id}/comments"), query.as_deref(), None).await
}

async fn update_activity(
	State(state): State<AppState>,
	id: Result<Path<u64>, PathRejection>,
	update: Result<Json<ActivityUpdate>, JsonRejection>,
) -> Result<Response> {
	let Path(id) = id?;
	let Json(update) = update?;
	let body = serde_json::to_value(update).map_err(|e| UpstreamError::Encode { source: e })?;

	state.forward(Method::PUT, &format!("/activities/{id}"), None, Some(body)).await
}
