//! Demonstrates walking a paginated listing and sending a rate-limited message with the default
//! reqwest transport against a local mock of the API.

// crates.io
use color_eyre::Result;
use futures::TryStreamExt;
use httpmock::prelude::*;
use serde::Deserialize;
use serde_json::json;
use url::Url;
// self
use hospitable_client::{
	Client,
	auth::Credential,
	config::ClientConfig,
	endpoints::{messages, properties},
	http::ReqwestHttpClient,
	oauth::ReqwestTransportErrorMapper,
	reqwest,
};

#[derive(Debug, Deserialize)]
struct Property {
	id: String,
	name: String,
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let pages = [
		(
			1,
			json!([{ "id": "p-1", "name": "Harbour Loft" }, { "id": "p-2", "name": "Pine Cabin" }]),
		),
		(2, json!([{ "id": "p-3", "name": "Dune House" }])),
	];
	let mut page_mocks = Vec::new();

	for (page, data) in pages {
		let body = json!({
			"data": data,
			"meta": { "current_page": page, "last_page": 2, "per_page": 2, "total": 3 }
		});
		let mock = server
			.mock_async(|when, then| {
				when.method(GET)
					.path("/v2/properties")
					.query_param("page", page.to_string())
					.header("authorization", "Bearer demo-pat");
				then.status(200).header("content-type", "application/json").json_body(body);
			})
			.await;

		page_mocks.push(mock);
	}

	let message_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/v2/reservations/r-1/messages");
			then.status(202)
				.header("content-type", "application/json")
				.body("{\"data\":{\"sent_reference_id\":\"m-1\"}}");
		})
		.await;
	let config = ClientConfig::builder()
		.base_url(Url::parse(&server.url("/v2"))?)
		.user_agent("hospitable-client-demo/0.1")
		.build()?;
	// The mock server presents a self-signed certificate.
	let http_client = reqwest::Client::builder()
		.danger_accept_invalid_certs(true)
		.danger_accept_invalid_hostnames(true)
		.user_agent(config.user_agent.as_str())
		.build()?;
	let client = Client::with_http_client(
		config,
		Credential::personal_access_token("demo-pat")?,
		ReqwestHttpClient::with_client(http_client),
		ReqwestTransportErrorMapper,
	)?;
	let listing: Vec<Property> =
		client.items(properties::list(None).with_per_page(2)).try_collect().await?;

	for property in &listing {
		println!("Property {}: {}.", property.id, property.name);
	}

	let sent = client.send(&messages::send("r-1", "Your door code is 4821.", &[])?).await?;

	println!("Message accepted with status {}.", sent.status);

	for mock in page_mocks {
		mock.assert_async().await;
	}

	message_mock.assert_async().await;

	Ok(())
}
