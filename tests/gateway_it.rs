#![cfg(feature = "test")]

// std
use std::time::Duration as StdDuration;
// crates.io
use axum::{
	Router,
	body::{self, Body},
	http::{Request, StatusCode, header},
	response::Response,
};
use httpmock::prelude::*;
use tower::ServiceExt;
// self
use strava_gateway::{
	_preludet::*,
	auth::TokenRecord,
	gateway::{self, AppState},
};

async fn build_router(base: &str, record: Option<TokenRecord>) -> Router {
	let (manager, _store) = build_test_manager(base, record).await;
	let state = AppState::new(Arc::new(manager), test_endpoints(base), StdDuration::from_secs(5))
		.expect("Gateway state should build.");

	gateway::router(state)
}

fn fresh_record() -> Option<TokenRecord> {
	Some(record_expiring_in("A1", "R1", Duration::hours(1)))
}

async fn send(router: Router, request: Request<Body>) -> Response {
	router.oneshot(request).await.expect("Router should always produce a response.")
}

async fn json_of(response: Response) -> serde_json::Value {
	let bytes =
		body::to_bytes(response.into_body(), usize::MAX).await.expect("Body should be readable.");

	serde_json::from_slice(&bytes).expect("Body should be JSON.")
}

fn get(uri: &str) -> Request<Body> {
	Request::get(uri).body(Body::empty()).expect("Request should build.")
}

fn with_json(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
	Request::builder()
		.method(method)
		.uri(uri)
		.header(header::CONTENT_TYPE, "application/json")
		.body(Body::from(body.to_string()))
		.expect("Request should build.")
}

#[tokio::test]
async fn health_answers_without_token() {
	let router = build_router("http://127.0.0.1:9", None).await;
	let response = send(router, get("/health")).await;

	assert_eq!(response.status(), StatusCode::OK);
	assert_eq!(json_of(response).await, serde_json::json!({ "status": "ok" }));
}

#[tokio::test]
async fn athlete_is_forwarded_with_bearer_token() {
	let server = MockServer::start_async().await;
	let api_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/v3/athlete").header("authorization", "Bearer A1");
			then.status(200)
				.header("content-type", "application/json")
				.json_body(serde_json::json!({ "id": 1234, "firstname": "Ada" }));
		})
		.await;
	let router = build_router(&server.base_url(), fresh_record()).await;
	let response = send(router, get("/athlete")).await;

	api_mock.assert_calls_async(1).await;

	assert_eq!(response.status(), StatusCode::OK);
	assert_eq!(
		response.headers().get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()),
		Some("application/json")
	);
	assert_eq!(json_of(response).await, serde_json::json!({ "id": 1234, "firstname": "Ada" }));
}

#[tokio::test]
async fn athlete_activities_forward_query_string() {
	let server = MockServer::start_async().await;
	let api_mock = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/api/v3/athlete/activities")
				.query_param("page", "2")
				.query_param("per_page", "30");
			then.status(200)
				.header("content-type", "application/json")
				.json_body(serde_json::json!([{ "id": 1 }, { "id": 2 }]));
		})
		.await;
	let router = build_router(&server.base_url(), fresh_record()).await;
	let response = send(router, get("/athlete/activities?page=2&per_page=30")).await;

	api_mock.assert_calls_async(1).await;

	assert_eq!(response.status(), StatusCode::OK);
	assert_eq!(json_of(response).await, serde_json::json!([{ "id": 1 }, { "id": 2 }]));
}

#[tokio::test]
async fn activity_routes_target_the_activity_id() {
	let server = MockServer::start_async().await;
	let activity_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/v3/activities/42");
			then.status(200)
				.header("content-type", "application/json")
				.json_body(serde_json::json!({ "id": 42 }));
		})
		.await;
	let comments_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/v3/activities/42/comments");
			then.status(200)
				.header("content-type", "application/json")
				.json_body(serde_json::json!([]));
		})
		.await;
	let router = build_router(&server.base_url(), fresh_record()).await;
	let activity = send(router.clone(), get("/activities/42")).await;
	let comments = send(router, get("/activities/42/comments")).await;

	activity_mock.assert_calls_async(1).await;
	comments_mock.assert_calls_async(1).await;

	assert_eq!(json_of(activity).await, serde_json::json!({ "id": 42 }));
	assert_eq!(json_of(comments).await, serde_json::json!([]));
}

#[tokio::test]
async fn create_activity_passes_body_and_status_through() {
	let server = MockServer::start_async().await;
	let payload = serde_json::json!({
		"name": "Lunch Ride",
		"sport_type": "Ride",
		"start_date_local": "2025-01-01T12:00:00Z",
		"elapsed_time": 3600
	});
	let api_mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/api/v3/activities")
				.header("authorization", "Bearer A1")
				.json_body(payload.clone());
			then.status(201)
				.header("content-type", "application/json")
				.json_body(serde_json::json!({ "id": 99 }));
		})
		.await;
	let router = build_router(&server.base_url(), fresh_record()).await;
	let response = send(router, with_json("POST", "/activities", payload.clone())).await;

	api_mock.assert_calls_async(1).await;

	assert_eq!(response.status(), StatusCode::CREATED);
	assert_eq!(json_of(response).await, serde_json::json!({ "id": 99 }));
}

#[tokio::test]
async fn update_activity_sends_name_and_type() {
	let server = MockServer::start_async().await;
	let api_mock = server
		.mock_async(|when, then| {
			when.method(PUT)
				.path("/api/v3/activities/7")
				.json_body(serde_json::json!({ "name": "Evening Run", "type": "Run" }));
			then.status(200)
				.header("content-type", "application/json")
				.json_body(serde_json::json!({ "id": 7, "name": "Evening Run" }));
		})
		.await;
	let router = build_router(&server.base_url(), fresh_record()).await;
	let response = send(
		router,
		with_json(
			"PUT",
			"/activities/7",
			serde_json::json!({ "name": "Evening Run", "type": "Run", "ignored": true }),
		),
	)
	.await;

	api_mock.assert_calls_async(1).await;

	assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn upstream_error_becomes_generic_500() {
	let server = MockServer::start_async().await;
	let api_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/v3/activities/404");
			then.status(404)
				.header("content-type", "application/json")
				.json_body(serde_json::json!({ "message": "Record Not Found" }));
		})
		.await;
	let router = build_router(&server.base_url(), fresh_record()).await;
	let response = send(router, get("/activities/404")).await;

	api_mock.assert_calls_async(1).await;

	assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

	let body = json_of(response).await;

	assert_eq!(body["error"]["code"], "upstream_error");
	assert_eq!(body["error"]["message"], "Internal server error.");
}

#[tokio::test]
async fn stale_token_is_refreshed_before_forwarding() {
	let server = MockServer::start_async().await;
	let new_expiry = (now_truncated() + Duration::hours(6)).unix_timestamp();
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token");
			then.status(200).header("content-type", "application/json").json_body(
				serde_json::json!({
					"token_type": "Bearer",
					"access_token": "A2",
					"refresh_token": "R2",
					"expires_at": new_expiry
				}),
			);
		})
		.await;
	let api_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/v3/athlete").header("authorization", "Bearer A2");
			then.status(200)
				.header("content-type", "application/json")
				.json_body(serde_json::json!({ "id": 1 }));
		})
		.await;
	let router = build_router(
		&server.base_url(),
		Some(record_expiring_in("A1", "R1", Duration::seconds(-10))),
	)
	.await;
	let response = send(router, get("/athlete")).await;

	token_mock.assert_calls_async(1).await;
	api_mock.assert_calls_async(1).await;

	assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn failed_refresh_skips_the_upstream_call() {
	let server = MockServer::start_async().await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token");
			then.status(400)
				.header("content-type", "application/json")
				.json_body(serde_json::json!({ "error": "invalid_grant" }));
		})
		.await;
	let api_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/v3/athlete");
			then.status(200);
		})
		.await;
	let router = build_router(
		&server.base_url(),
		Some(record_expiring_in("A1", "R1", Duration::seconds(-10))),
	)
	.await;
	let response = send(router, get("/athlete")).await;

	token_mock.assert_calls_async(1).await;
	api_mock.assert_calls_async(0).await;

	assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
	assert_eq!(json_of(response).await["error"]["code"], "authentication_failed");
}

#[tokio::test]
async fn missing_token_record_is_a_500() {
	let router = build_router("http://127.0.0.1:9", None).await;
	let response = send(router, get("/athlete")).await;

	assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
	assert_eq!(json_of(response).await["error"]["code"], "token_not_found");
}

#[tokio::test]
async fn non_numeric_activity_id_is_a_json_400() {
	let server = MockServer::start_async().await;
	let api_mock = server
		.mock_async(|when, then| {
			when.any_request();
			then.status(200);
		})
		.await;
	let router = build_router(&server.base_url(), fresh_record()).await;
	let response = send(router, get("/activities/abc")).await;

	api_mock.assert_calls_async(0).await;

	assert_eq!(response.status(), StatusCode::BAD_REQUEST);
	assert_eq!(
		response.headers().get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()),
		Some("application/json")
	);
	assert_eq!(
		json_of(response).await,
		serde_json::json!({ "error": { "code": "invalid_request", "message": "Invalid request." } })
	);
}

#[tokio::test]
async fn malformed_json_body_is_a_json_400() {
	let server = MockServer::start_async().await;
	let api_mock = server
		.mock_async(|when, then| {
			when.any_request();
			then.status(200);
		})
		.await;
	let router = build_router(&server.base_url(), fresh_record()).await;
	let request = Request::builder()
		.method("POST")
		.uri("/activities")
		.header(header::CONTENT_TYPE, "application/json")
		.body(Body::from("{\"name\": "))
		.expect("Request should build.");
	let response = send(router.clone(), request).await;

	assert_eq!(response.status(), StatusCode::BAD_REQUEST);
	assert_eq!(json_of(response).await["error"]["code"], "invalid_request");

	let response = send(router, with_json("PUT", "/activities/7", serde_json::json!({ "name": 5 })))
		.await;

	api_mock.assert_calls_async(0).await;

	assert_eq!(response.status(), StatusCode::BAD_REQUEST);
	assert_eq!(json_of(response).await["error"]["code"], "invalid_request");
}
