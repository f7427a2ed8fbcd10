#![allow(dead_code)]

// std
use std::{
	collections::VecDeque,
	fmt::{Display, Formatter, Result as FmtResult},
	future::Future,
	pin::Pin,
	sync::Arc,
};
// crates.io
use parking_lot::Mutex;
use time::Duration;
// self
use hospitable_client::{
	Client,
	auth::Credential,
	config::{ClientConfig, ClientConfigBuilder},
	dispatch::BackoffPolicy,
	http::{ApiHttpClient, ResponseMetadata, ResponseMetadataSlot},
	http_types::{HeaderValue, Response},
	oauth::{
		DefaultTransportErrorMapper,
		oauth2::{AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse},
	},
	url::Url,
};

pub type ScriptedClient = Client<ScriptedHttpClient, DefaultTransportErrorMapper>;

#[derive(Debug)]
pub struct ConnectionReset;
impl Display for ConnectionReset {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("Connection reset by peer.")
	}
}
impl std::error::Error for ConnectionReset {}

/// One scripted transport outcome.
#[derive(Clone, Debug)]
pub enum Step {
	Respond { status: u16, headers: Vec<(&'static str, String)>, body: String },
	Fail,
	Hang,
	Delayed { delay: std::time::Duration, step: Box<Step> },
}
impl Step {
	pub fn json(status: u16, body: serde_json::Value) -> Self {
		Self::Respond { status, headers: Vec::new(), body: body.to_string() }
	}

	pub fn ok(body: serde_json::Value) -> Self {
		Self::json(200, body)
	}

	pub fn status(status: u16) -> Self {
		Self::Respond { status, headers: Vec::new(), body: String::new() }
	}

	pub fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
		if let Self::Respond { headers, .. } = &mut self {
			headers.push((name, value.into()));
		}

		self
	}

	/// Plays this step once `delay` has passed.
	pub fn after(self, delay: std::time::Duration) -> Self {
		Self::Delayed { delay, step: Box::new(self) }
	}
}

/// Request as seen by the transport.
#[derive(Clone, Debug)]
pub struct Recorded {
	pub method: String,
	pub url: Url,
	pub authorization: Option<String>,
	pub body: Vec<u8>,
}
impl Recorded {
	pub fn query(&self, key: &str) -> Option<String> {
		self.url.query_pairs().find(|(name, _)| name == key).map(|(_, value)| value.into_owned())
	}
}

/// Transport replaying scripted steps in order; `fallback` answers once the script runs out.
#[derive(Clone)]
pub struct ScriptedHttpClient {
	script: Arc<Mutex<VecDeque<Step>>>,
	fallback: Step,
	requests: Arc<Mutex<Vec<Recorded>>>,
}
impl ScriptedHttpClient {
	pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
		Self {
			script: Arc::new(Mutex::new(steps.into_iter().collect())),
			fallback: Step::status(599),
			requests: Default::default(),
		}
	}

	pub fn with_fallback(mut self, fallback: Step) -> Self {
		self.fallback = fallback;

		self
	}

	pub fn requests(&self) -> Vec<Recorded> {
		self.requests.lock().clone()
	}

	pub fn calls(&self) -> usize {
		self.requests.lock().len()
	}
}
impl ApiHttpClient for ScriptedHttpClient {
	type Handle = ScriptedHandle;
	type TransportError = ConnectionReset;

	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
		ScriptedHandle { client: self.clone(), slot }
	}
}

pub struct ScriptedHandle {
	client: ScriptedHttpClient,
	slot: ResponseMetadataSlot,
}
impl<'c> AsyncHttpClient<'c> for ScriptedHandle {
	type Error = HttpClientError<ConnectionReset>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send + Sync>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		let _ = self.slot.take();

		self.client.requests.lock().push(Recorded {
			method: request.method().to_string(),
			url: Url::parse(&request.uri().to_string()).expect("Request URI should be absolute."),
			authorization: request
				.headers()
				.get("authorization")
				.and_then(|value| value.to_str().ok())
				.map(str::to_owned),
			body: request.body().clone(),
		});

		let step =
			self.client.script.lock().pop_front().unwrap_or_else(|| self.client.fallback.clone());
		let (delay, step) = match step {
			Step::Delayed { delay, step } => (Some(delay), *step),
			step => (None, step),
		};
		let slot = self.slot.clone();

		Box::pin(async move {
			if let Some(delay) = delay {
				tokio::time::sleep(delay).await;
			}

			match step {
				Step::Respond { status, headers, body } => {
					let mut builder = Response::builder().status(status);

					for (name, value) in headers {
						builder = builder.header(
							name,
							HeaderValue::from_str(&value).expect("Header fixture should be valid."),
						);
					}

					let response = builder.body(body.into_bytes()).expect("Response should build.");

					slot.store(ResponseMetadata::from_headers(status, response.headers()));

					Ok(response)
				},
				Step::Fail => Err(HttpClientError::Reqwest(Box::new(ConnectionReset))),
				Step::Hang | Step::Delayed { .. } => std::future::pending().await,
			}
		})
	}
}

/// Config pointing at a loopback base URL with a fast retry schedule.
pub fn fast_config() -> ClientConfigBuilder {
	ClientConfig::builder()
		.base_url(Url::parse("http://127.0.0.1:9/v2").expect("Base URL fixture should parse."))
		.token_url(Url::parse("http://127.0.0.1:9/oauth/token").expect("Token URL should parse."))
		.backoff(BackoffPolicy {
			base: Duration::milliseconds(1),
			max_delay: Duration::milliseconds(20),
			max_attempts: BackoffPolicy::DEFAULT_MAX_ATTEMPTS,
		})
}

pub fn pat() -> Credential {
	Credential::personal_access_token("pat-token").expect("PAT fixture should build.")
}

/// Successful `grant_type=refresh_token` answer carrying no new refresh token.
pub fn token_response(access: &str) -> Step {
	let body =
		serde_json::json!({ "access_token": access, "token_type": "bearer", "expires_in": 3600 });

	Step::ok(body).with_header("content-type", "application/json")
}

pub fn scripted_client(
	config: ClientConfigBuilder,
	steps: impl IntoIterator<Item = Step>,
) -> (ScriptedClient, ScriptedHttpClient) {
	client_with_credential(config, pat(), steps)
}

pub fn client_with_credential(
	config: ClientConfigBuilder,
	credential: Credential,
	steps: impl IntoIterator<Item = Step>,
) -> (ScriptedClient, ScriptedHttpClient) {
	let transport = ScriptedHttpClient::new(steps);
	let client = Client::with_http_client(
		config.build().expect("Config fixture should be valid."),
		credential,
		transport.clone(),
		DefaultTransportErrorMapper,
	)
	.expect("Client should build.");

	(client, transport)
}

pub fn page(items: std::ops::Range<u32>, current: u32, last: u32) -> serde_json::Value {
	let data: Vec<_> = items.map(|id| serde_json::json!({ "id": format!("item-{id}") })).collect();

	serde_json::json!({
		"data": data,
		"meta": { "current_page": current, "last_page": last, "per_page": 10, "total": 24 },
		"links": { "next": null }
	})
}
