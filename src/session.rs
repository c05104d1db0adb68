//! HTTP plumbing: the [Session] seam every scraper borrows, and the reqwest-backed [BbSession].

use std::{sync::Arc, time::Duration};

use color_eyre::{
	Result,
	eyre::{WrapErr, eyre},
};
use derive_new::new;
use reqwest::{
	Url,
	cookie::Jar,
	multipart::{Form, Part},
};
use scraper::Html;
use serde::de::DeserializeOwned;

use crate::{config::AppConfig, error::ParserError};

/// One completed HTTP exchange
#[derive(Clone, Debug)]
pub struct Response {
	/// Final URL after redirects; relative links on the page resolve against it
	pub url: Url,
	pub status: u16,
	pub body: String,
}

impl Response {
	pub fn new(url: Url, status: u16, body: impl Into<String>) -> Self {
		Self { url, status, body: body.into() }
	}

	/// Parse the body as an HTML document.
	pub fn document(&self) -> Html {
		Html::parse_document(&self.body)
	}

	/// Decode the body as JSON, failing with a [ParserError] that keeps the response around.
	pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
		serde_json::from_str(&self.body).map_err(|e| ParserError::new(format!("Couldn't decode JSON: {e}"), self.clone()).into())
	}

	/// Resolve a scraped `href` against this response's URL.
	pub fn join(&self, href: &str) -> Result<String> {
		match self.url.join(href) {
			Ok(url) => Ok(url.into()),
			Err(e) => Err(ParserError::new(format!("Unusable link {href:?}: {e}"), self.clone()).into()),
		}
	}

	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}
}

/// A file part of a multipart POST
#[derive(Clone, Debug, new)]
pub struct FileUpload {
	pub field: String,
	pub filename: String,
	pub bytes: Vec<u8>,
}

/// Authenticated access to one course. Scrapers only ever borrow it.
///
/// Requests are issued one at a time; nothing here is shared across tasks.
#[allow(async_fn_in_trait)]
pub trait Session {
	fn course_id(&self) -> &str;

	/// Scheme and host of the installation, e.g. `https://bb.au.dk`
	fn base_url(&self) -> &str;

	async fn get(&self, url: &str) -> Result<Response>;

	/// Multipart POST. Fields go out in the given order, followed by the file parts.
	async fn post(&self, url: &str, fields: &[(String, String)], files: Vec<FileUpload>) -> Result<Response>;

	/// Raw bytes of a downloadable artifact
	async fn download(&self, url: &str) -> Result<Vec<u8>>;

	/// Absolute URL for a path on this installation
	fn url(&self, path_and_query: &str) -> String {
		format!("{}{}", self.base_url().trim_end_matches('/'), path_and_query)
	}
}

/// [Session] over a cookie-carrying reqwest client
#[derive(Debug)]
pub struct BbSession {
	http: reqwest::Client,
	base_url: String,
	course_id: String,
}

impl BbSession {
	/// Build a client whose cookie jar is seeded from `config.cookie` (`name=value; name2=value2`, as copied from a browser).
	pub fn new(config: &AppConfig) -> Result<Self> {
		let base: Url = config.base_url.parse().wrap_err_with(|| format!("Invalid base_url {:?}", config.base_url))?;
		let jar = Jar::default();
		for pair in config.cookie.split(';').map(str::trim).filter(|p| !p.is_empty()) {
			jar.add_cookie_str(pair, &base);
		}

		let http = reqwest::Client::builder()
			.cookie_provider(Arc::new(jar))
			.user_agent(&config.user_agent)
			.timeout(Duration::from_secs(config.timeout_secs))
			.build()
			.wrap_err("Failed to build HTTP client")?;

		Ok(Self {
			http,
			base_url: config.base_url.clone(),
			course_id: config.course_id.clone(),
		})
	}

	async fn finish(response: reqwest::Response) -> Result<Response> {
		let url = response.url().clone();
		let status = response.status();
		if !status.is_success() {
			tracing::warn!(%url, %status, "non-success response");
		}
		let body = response.text().await.wrap_err_with(|| format!("Failed to read response body from {url}"))?;
		Ok(Response::new(url, status.as_u16(), body))
	}
}

impl Session for BbSession {
	fn course_id(&self) -> &str {
		&self.course_id
	}

	fn base_url(&self) -> &str {
		&self.base_url
	}

	async fn get(&self, url: &str) -> Result<Response> {
		tracing::debug!(url, "GET");
		let response = self.http.get(url).send().await.wrap_err_with(|| format!("GET {url} failed"))?;
		Self::finish(response).await
	}

	async fn post(&self, url: &str, fields: &[(String, String)], files: Vec<FileUpload>) -> Result<Response> {
		tracing::debug!(url, fields = fields.len(), files = files.len(), "POST multipart");
		let mut form = Form::new();
		for (name, value) in fields {
			form = form.text(name.clone(), value.clone());
		}
		for file in files {
			form = form.part(file.field, Part::bytes(file.bytes).file_name(file.filename));
		}
		let response = self.http.post(url).multipart(form).send().await.wrap_err_with(|| format!("POST {url} failed"))?;
		Self::finish(response).await
	}

	async fn download(&self, url: &str) -> Result<Vec<u8>> {
		tracing::debug!(url, "download");
		let response = self.http.get(url).send().await.wrap_err_with(|| format!("GET {url} failed"))?;
		let status = response.status();
		if !status.is_success() {
			return Err(eyre!("Download of {url} failed with {status}"));
		}
		let bytes = response.bytes().await.wrap_err_with(|| format!("Failed to read {url}"))?;
		Ok(bytes.to_vec())
	}
}
