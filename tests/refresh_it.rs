mod support;

// crates.io
use futures::future;
use serde_json::json;
use time::{Duration, OffsetDateTime};
// self
use hospitable_client::{
	auth::{ClientCredentials, Credential},
	error::Error,
	token::TokenStatus,
};
use support::*;

const CLIENT_ID: &str = "client-refresh";
const CLIENT_SECRET: &str = "secret-refresh";

fn expiring_credential(access: &str, lifetime: Duration) -> Credential {
	Credential::builder(access)
		.refresh_token("refresh-old")
		.client(ClientCredentials::new(CLIENT_ID, CLIENT_SECRET))
		.expires_at(OffsetDateTime::now_utc() + lifetime)
		.build()
		.expect("OAuth credential fixture should build.")
}

fn slow(step: Step) -> Step {
	step.after(std::time::Duration::from_millis(100))
}

#[tokio::test]
async fn concurrent_callers_share_one_refresh() {
	let rotated = Step::ok(json!({
		"access_token": "access-fresh",
		"refresh_token": "refresh-fresh",
		"token_type": "bearer",
		"expires_in": 43200
	}))
	.with_header("content-type", "application/json");
	let (client, transport) = client_with_credential(
		fast_config(),
		expiring_credential("access-old", Duration::seconds(10)),
		[slow(rotated)],
	);

	assert_eq!(client.tokens().status(), TokenStatus::Expiring);

	let results = future::join_all((0..8).map(|_| client.tokens().get_valid_credential())).await;

	for result in results {
		let credential = result.expect("Every caller should receive a credential.");

		assert_eq!(credential.access_token.expose(), "access-fresh");
		assert_eq!(
			credential.refresh_token.as_ref().map(|secret| secret.expose()),
			Some("refresh-fresh")
		);
	}

	assert_eq!(transport.calls(), 1);
	assert_eq!(client.tokens().metrics().successes(), 1);
	assert_eq!(client.tokens().metrics().reused(), 7);
	assert_eq!(client.tokens().status(), TokenStatus::Valid);
}

#[tokio::test]
async fn concurrent_callers_share_one_failed_refresh() {
	let (client, transport) = client_with_credential(
		fast_config(),
		expiring_credential("access-old", -Duration::minutes(1)),
		[slow(Step::status(503))],
	);
	let results = future::join_all((0..8).map(|_| client.tokens().get_valid_credential())).await;

	for result in results {
		let err = result.expect_err("Every caller should see the outage.");

		assert!(matches!(err, Error::Server { status: 503, .. }));
	}

	assert_eq!(transport.calls(), 1);
	assert_eq!(client.tokens().metrics().attempts(), 1);
	assert_eq!(client.tokens().metrics().failures(), 1);
	assert_eq!(client.tokens().status(), TokenStatus::Expired);
}

#[tokio::test]
async fn stale_credentials_refresh_before_the_request() {
	let (client, transport) = client_with_credential(
		fast_config(),
		expiring_credential("access-old", -Duration::minutes(1)),
		[
			token_response("access-fresh"),
			Step::ok(json!({ "data": { "id": "u-1", "email": "host@example.com" } })),
		],
	);

	assert_eq!(client.tokens().status(), TokenStatus::Expired);

	let body: serde_json::Value = client.get("/user").await.expect("User lookup should succeed.");
	let requests = transport.requests();

	assert_eq!(body["data"]["email"], "host@example.com");
	assert_eq!(requests.len(), 2);
	assert_eq!(requests[0].url.path(), "/oauth/token");

	let form = String::from_utf8_lossy(&requests[0].body);

	assert!(form.contains("grant_type=refresh_token"));
	assert!(form.contains("refresh_token=refresh-old"));
	assert_eq!(requests[1].url.path(), "/v2/user");
	assert_eq!(requests[1].authorization.as_deref(), Some("Bearer access-fresh"));

	// The refresh response carried no new refresh token, so the old one is kept.
	let credential = client.tokens().credential();
	let refresh_token = credential.refresh_token.as_ref().map(|secret| secret.expose());

	assert_eq!(refresh_token, Some("refresh-old"));
}

#[tokio::test]
async fn expiring_credentials_ride_out_a_token_endpoint_outage() {
	let (client, transport) = client_with_credential(
		fast_config(),
		expiring_credential("access-old", Duration::seconds(30)),
		[Step::status(503), Step::ok(json!({ "data": { "id": "u-1" } }))],
	);
	let body: serde_json::Value =
		client.get("/user").await.expect("Still-valid credential should carry the call.");
	let requests = transport.requests();

	assert_eq!(body["data"]["id"], "u-1");
	assert_eq!(requests.len(), 2);
	assert_eq!(requests[0].url.path(), "/oauth/token");
	assert_eq!(requests[1].url.path(), "/v2/user");
	assert_eq!(requests[1].authorization.as_deref(), Some("Bearer access-old"));
	assert_eq!(client.tokens().metrics().failures(), 1);
	assert_eq!(client.tokens().status(), TokenStatus::Expiring);
}

#[tokio::test]
async fn invalid_grant_fails_until_a_new_credential_arrives() {
	let revoked = Step::json(
		400,
		json!({ "error": "invalid_grant", "error_description": "refresh token revoked" }),
	)
	.with_header("content-type", "application/json");
	let (client, transport) = client_with_credential(
		fast_config(),
		expiring_credential("access-old", Duration::seconds(5)),
		[revoked],
	);
	let err = client
		.tokens()
		.get_valid_credential()
		.await
		.expect_err("Rejected refresh should surface to the caller.");

	assert!(matches!(err, Error::Authentication { status: Some(400), .. }));
	assert_eq!(client.tokens().status(), TokenStatus::Failed);

	let err = client
		.tokens()
		.get_valid_credential()
		.await
		.expect_err("Failed state should stick until a new credential arrives.");

	assert!(matches!(err, Error::Authentication { .. }));
	assert_eq!(transport.calls(), 1);

	client.tokens().replace_credential(
		Credential::personal_access_token("pat-replacement").expect("PAT fixture should build."),
	);

	assert_eq!(client.tokens().status(), TokenStatus::Valid);
	assert_eq!(
		client
			.tokens()
			.get_valid_credential()
			.await
			.expect("Replacement credential should be usable.")
			.access_token
			.expose(),
		"pat-replacement"
	);
}

#[tokio::test]
async fn token_endpoint_outages_do_not_poison_the_credential() {
	let (client, transport) = client_with_credential(
		fast_config(),
		expiring_credential("access-old", Duration::seconds(5)),
		[Step::status(503)],
	);
	let err = client.tokens().refresh().await.expect_err("Outage should surface.");

	assert!(err.is_retryable());
	assert_eq!(client.tokens().status(), TokenStatus::Expiring);
	assert_eq!(client.tokens().metrics().failures(), 1);
	assert_eq!(transport.calls(), 1);
}
