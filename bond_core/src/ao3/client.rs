use std::{
	sync::atomic::{AtomicBool, Ordering},
	time::Duration,
};

use reqwest::{
	Client, Response, StatusCode,
	header::{HeaderMap, RETRY_AFTER},
};
use scraper::{Html, Selector};
use tokio::{
	sync::Mutex,
	time::{Instant, sleep},
};
use tracing::{debug, info, warn};

use crate::{
	ao3::{
		error::{Ao3Error, PageError},
		parser::{SeriesMetadata, WorkMetadata, parse_series, parse_work, work_id_of_chapter},
		url::{Ao3Link, parse_link},
	},
	config::settings::Ao3Config,
};

/// Maps a non-success status to the error the queue understands
#[must_use]
pub fn status_error(status: StatusCode, headers: &HeaderMap) -> Option<Ao3Error> {
	if status.is_success() {
		return None;
	}
	Some(match status {
		StatusCode::NOT_FOUND | StatusCode::GONE => Ao3Error::NotFound,
		StatusCode::TOO_MANY_REQUESTS => Ao3Error::RateLimited {
			retry_after: headers
				.get(RETRY_AFTER)
				.and_then(|value| value.to_str().ok())
				.and_then(|value| value.trim().parse::<u64>().ok())
				.map(Duration::from_secs),
		},
		status if status.is_server_error() => Ao3Error::Server(status),
		status => Ao3Error::Status(status),
	})
}

/// `authenticity_token` of the login form
#[must_use]
pub fn authenticity_token(html: &str) -> Option<String> {
	let document = Html::parse_document(html);
	let input = Selector::parse("form#new_user input[name=\"authenticity_token\"]").ok()?;
	document
		.select(&input)
		.next()
		.and_then(|element| element.value().attr("value"))
		.map(ToOwned::to_owned)
}

fn shows_login_form(html: &str) -> bool {
	let document = Html::parse_document(html);
	Selector::parse("form#new_user").is_ok_and(|form| document.select(&form).next().is_some())
}

/// A fetched page and where it ended up after redirects
pub struct Page {
	pub url: String,
	pub body: String,
}

/// How `Ao3Client` reaches the archive
pub trait Transport: Send + Sync {
	/// GETs `url` with adult content shown
	fn get(&self, url: &str) -> impl Future<Output = Result<Page, Ao3Error>> + Send;

	fn post_form(
		&self,
		url: &str,
		form: &[(&str, &str)],
	) -> impl Future<Output = Result<Page, Ao3Error>> + Send;
}

/// Cookie-keeping `reqwest` session
pub struct HttpTransport {
	http: Client,
}

impl HttpTransport {
	pub fn new(config: &Ao3Config) -> Result<Self, Ao3Error> {
		let http = Client::builder()
			.cookie_store(true)
			.gzip(true)
			.user_agent(&config.user_agent)
			.timeout(Duration::from_secs(60))
			.build()?;
		Ok(Self { http })
	}

	async fn page(response: Response) -> Result<Page, Ao3Error> {
		let url = response.url().to_string();
		if let Some(error) = status_error(response.status(), response.headers()) {
			warn!("AO3 answered {} for {url}", response.status());
			return Err(error);
		}
		Ok(Page {
			url,
			body: response.text().await?,
		})
	}
}

impl Transport for HttpTransport {
	async fn get(&self, url: &str) -> Result<Page, Ao3Error> {
		debug!("GET {url}");
		let response = self
			.http
			.get(url)
			.query(&[("view_adult", "true")])
			.send()
			.await?;
		Self::page(response).await
	}

	async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<Page, Ao3Error> {
		debug!("POST {url}");
		let response = self.http.post(url).form(form).send().await?;
		Self::page(response).await
	}
}

/// Throttled AO3 session that logs in when a page needs it
pub struct Ao3Client<T = HttpTransport> {
	pub(crate) transport: T,
	config: Ao3Config,
	delay: Duration,
	last_request: Mutex<Option<Instant>>,
	logged_in: AtomicBool,
}

impl Ao3Client {
	pub fn new(config: Ao3Config) -> Result<Self, Ao3Error> {
		Ok(Self::with_transport(HttpTransport::new(&config)?, config))
	}
}

impl<T: Transport> Ao3Client<T> {
	#[must_use]
	pub fn with_transport(transport: T, config: Ao3Config) -> Self {
		Self {
			transport,
			delay: Duration::from_millis(config.request_delay_ms),
			config,
			last_request: Mutex::new(None),
			logged_in: AtomicBool::new(false),
		}
	}

	#[must_use]
	pub const fn config(&self) -> &Ao3Config {
		&self.config
	}

	async fn throttle(&self) {
		let mut last = self.last_request.lock().await;
		if let Some(previous) = *last {
			let elapsed = previous.elapsed();
			if elapsed < self.delay {
				sleep(self.delay.saturating_sub(elapsed)).await;
			}
		}
		*last = Some(Instant::now());
	}

	async fn get(&self, url: &str) -> Result<Page, Ao3Error> {
		self.throttle().await;
		self.transport.get(url).await
	}

	pub async fn login(&self) -> Result<(), Ao3Error> {
		let (Some(username), Some(password)) = (&self.config.username, &self.config.password)
		else {
			return Err(Ao3Error::Restricted);
		};
		let login_url = format!("{}/users/login", self.config.base_url);
		let form = self.get(&login_url).await?;
		let token = authenticity_token(&form.body).ok_or(Ao3Error::LoginFailed)?;

		self.throttle().await;
		let answer = self
			.transport
			.post_form(
				&login_url,
				&[
					("authenticity_token", token.as_str()),
					("user[login]", username.as_str()),
					("user[password]", password.as_str()),
					("user[remember_me]", "1"),
					("commit", "Log In"),
				],
			)
			.await?;
		if shows_login_form(&answer.body) {
			warn!("AO3 rejected the configured credentials");
			return Err(Ao3Error::LoginFailed);
		}
		self.logged_in.store(true, Ordering::Release);
		info!("Logged in to AO3 as {username}");
		Ok(())
	}

	/// Fetches and parses `url`, logging in once if the page is restricted
	async fn fetch_parsed<R>(
		&self,
		url: &str,
		parse: impl Fn(&Page) -> Result<R, PageError> + Send,
	) -> Result<R, Ao3Error> {
		let page = self.get(url).await?;
		match parse(&page) {
			Err(PageError::Restricted) if self.config.has_credentials() => {
				if self.logged_in.swap(false, Ordering::AcqRel) {
					debug!("AO3 session expired, logging in again");
				}
				self.login().await?;
				let page = self.get(url).await?;
				parse(&page).map_err(Ao3Error::from)
			}
			result => result.map_err(Ao3Error::from),
		}
	}

	pub async fn fetch_work(&self, work_id: u64) -> Result<WorkMetadata, Ao3Error> {
		let url = Ao3Link::Work(work_id).canonical_url(&self.config.base_url);
		self.fetch_parsed(&url, |page| parse_work(&page.body, work_id))
			.await
	}

	pub async fn fetch_series_page(
		&self,
		series_id: u64,
		page: u32,
	) -> Result<SeriesMetadata, Ao3Error> {
		let base = Ao3Link::Series(series_id).canonical_url(&self.config.base_url);
		let url = if page > 1 {
			format!("{base}?page={page}")
		} else {
			base
		};
		self.fetch_parsed(&url, |page| parse_series(&page.body, series_id))
			.await
	}

	/// Reads a series across up to `max_series_pages` pages of works
	pub async fn fetch_series(&self, series_id: u64) -> Result<SeriesMetadata, Ao3Error> {
		let mut series = self.fetch_series_page(series_id, 1).await?;
		let mut pages = 1;
		while let Some(next) = series.next_page {
			if pages >= self.config.max_series_pages {
				warn!("Series {series_id} has more than {pages} pages, stopping");
				break;
			}
			let page = self.fetch_series_page(series_id, next).await?;
			series.extend_with(page);
			pages += 1;
		}
		Ok(series)
	}

	/// Work id a chapter belongs to; AO3 redirects chapter links to their work
	pub async fn resolve_chapter(&self, chapter_id: u64) -> Result<u64, Ao3Error> {
		let url = Ao3Link::Chapter(chapter_id).canonical_url(&self.config.base_url);
		self.fetch_parsed(&url, |page| match parse_link(&page.url) {
			Ok(Ao3Link::Work(work_id)) => Ok(work_id),
			_ => work_id_of_chapter(&page.body),
		})
		.await
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use reqwest::{
		StatusCode,
		header::{HeaderMap, HeaderValue, RETRY_AFTER},
	};

	use super::{Ao3Client, Ao3Error, Page, authenticity_token, shows_login_form, status_error};
	use crate::{
		ao3::testing::{ScriptedAo3, page},
		config::settings::Ao3Config,
	};

	const LOGIN_WALL: &str = include_str!("../../tests/fixtures/login_wall.html");
	const WORK: &str = include_str!("../../tests/fixtures/work.html");
	const SERIES: &str = include_str!("../../tests/fixtures/series.html");
	const BASE: &str = "https://archiveofourown.org";

	fn client(credentials: bool, replies: Vec<Result<Page, Ao3Error>>) -> Ao3Client<ScriptedAo3> {
		let config = Ao3Config {
			username: credentials.then(|| "reader".to_owned()),
			password: credentials.then(|| "hunter2".to_owned()),
			request_delay_ms: 0,
			max_series_pages: 3,
			..Ao3Config::default()
		};
		Ao3Client::with_transport(ScriptedAo3::new(replies), config)
	}

	#[test]
	fn maps_statuses() {
		let empty = HeaderMap::new();
		assert!(status_error(StatusCode::OK, &empty).is_none());
		assert!(matches!(
			status_error(StatusCode::NOT_FOUND, &empty),
			Some(Ao3Error::NotFound)
		));
		assert!(matches!(
			status_error(StatusCode::BAD_GATEWAY, &empty),
			Some(Ao3Error::Server(StatusCode::BAD_GATEWAY))
		));
		assert!(matches!(
			status_error(StatusCode::FORBIDDEN, &empty),
			Some(Ao3Error::Status(StatusCode::FORBIDDEN))
		));

		let mut headers = HeaderMap::new();
		headers.insert(RETRY_AFTER, HeaderValue::from_static("120"));
		assert!(matches!(
			status_error(StatusCode::TOO_MANY_REQUESTS, &headers),
			Some(Ao3Error::RateLimited { retry_after: Some(after) }) if after == Duration::from_secs(120)
		));
		assert!(matches!(
			status_error(StatusCode::TOO_MANY_REQUESTS, &empty),
			Some(Ao3Error::RateLimited { retry_after: None })
		));
	}

	#[test]
	fn reads_the_login_form() {
		assert_eq!(
			authenticity_token(LOGIN_WALL).as_deref(),
			Some("fixture-token-123")
		);
		assert!(shows_login_form(LOGIN_WALL));
		assert!(!shows_login_form(WORK));
		assert_eq!(authenticity_token(WORK), None);
	}

	#[tokio::test]
	async fn restricted_works_log_in_once() {
		let work_url = format!("{BASE}/works/1234567");
		let login_url = format!("{BASE}/users/login");
		let client = client(
			true,
			vec![
				page(&work_url, LOGIN_WALL),
				page(&login_url, LOGIN_WALL),
				page(BASE, WORK),
				page(&work_url, WORK),
				page(&work_url, WORK),
			],
		);

		let work = client.fetch_work(1_234_567).await.unwrap();
		assert_eq!(work.title, "The Long Way Home");
		assert_eq!(
			client.transport.requests(),
			[
				format!("GET {work_url}"),
				format!("GET {login_url}"),
				format!("POST {login_url} fixture-token-123"),
				format!("GET {work_url}"),
			]
		);

		client.fetch_work(1_234_567).await.unwrap();
		assert_eq!(client.transport.requests().len(), 5);
	}

	#[tokio::test]
	async fn restricted_works_without_credentials_fail() {
		let client = client(false, vec![page(BASE, LOGIN_WALL)]);
		assert!(matches!(
			client.fetch_work(1_234_567).await,
			Err(Ao3Error::Restricted)
		));
		assert_eq!(client.transport.requests().len(), 1);
	}

	#[tokio::test]
	async fn rejected_credentials_fail_the_login() {
		let client = client(
			true,
			vec![page(BASE, LOGIN_WALL), page(BASE, LOGIN_WALL), page(BASE, LOGIN_WALL)],
		);
		assert!(matches!(
			client.fetch_work(1_234_567).await,
			Err(Ao3Error::LoginFailed)
		));
		assert_eq!(client.transport.requests().len(), 3);
	}

	#[tokio::test]
	async fn series_reading_stops_at_the_page_limit() {
		let client = client(false, (0..5).map(|_| page(BASE, SERIES)).collect());
		let series = client.fetch_series(998_877).await.unwrap();
		assert_eq!(series.works.len(), 6);
		assert_eq!(
			client.transport.requests(),
			[
				format!("GET {BASE}/series/998877"),
				format!("GET {BASE}/series/998877?page=2"),
				format!("GET {BASE}/series/998877?page=2"),
			]
		);
	}

	#[tokio::test]
	async fn chapters_resolve_through_the_redirect() {
		let client = client(false, vec![page(&format!("{BASE}/works/77/chapters/5"), WORK)]);
		assert_eq!(client.resolve_chapter(5).await.unwrap(), 77);
		assert_eq!(
			client.transport.requests(),
			[format!("GET {BASE}/chapters/5")]
		);
	}

	#[tokio::test]
	async fn transport_errors_pass_through() {
		let client = client(
			false,
			vec![Err(Ao3Error::Server(StatusCode::SERVICE_UNAVAILABLE))],
		);
		assert!(matches!(
			client.fetch_work(1).await,
			Err(Ao3Error::Server(StatusCode::SERVICE_UNAVAILABLE))
		));
	}
}
