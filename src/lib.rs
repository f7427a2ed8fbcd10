//! Async client core for the Hospitable public API: credential lifecycle management, rate-limit
//! aware retrying dispatch, lazy pagination, and webhook verification in one crate.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod endpoints;
pub mod error;
pub mod http;
pub mod oauth;
pub mod obs;
pub mod pagination;
pub mod rate_limit;
pub mod response;
pub mod token;
pub mod webhook;

pub use client::Client;
#[cfg(feature = "reqwest")] pub use client::ReqwestApiClient;

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap, VecDeque},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize, de::DeserializeOwned};
	pub use serde_json::{Map as JsonMap, Value as JsonValue};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use oauth2::http as http_types;
#[cfg(feature = "reqwest")] pub use reqwest;
pub use tokio_util::sync::CancellationToken;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
