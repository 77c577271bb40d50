use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

/// What a fetched page turned out to be when it isn't the page we asked for
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PageError {
	#[error("the page is only visible to logged-in users")]
	Restricted,
	#[error("the work is unrevealed")]
	Unrevealed,
	#[error("AO3 has no such page")]
	Missing,
	#[error("unexpected page layout: {0}")]
	Malformed(&'static str),
}

#[derive(Debug, Error)]
pub enum Ao3Error {
	#[error("request to AO3 failed: {0}")]
	Network(#[from] reqwest::Error),
	#[error("AO3 is rate limiting requests")]
	RateLimited { retry_after: Option<Duration> },
	#[error("AO3 returned server error {0}")]
	Server(StatusCode),
	#[error("AO3 returned unexpected status {0}")]
	Status(StatusCode),
	#[error("not found on AO3")]
	NotFound,
	#[error("the work is restricted to logged-in AO3 users and no login is configured")]
	Restricted,
	#[error("the work is unrevealed")]
	Unrevealed,
	#[error("logging in to AO3 failed")]
	LoginFailed,
	#[error("couldn't read the AO3 page: {0}")]
	Unparsable(&'static str),
}

impl Ao3Error {
	/// Transient failures are retried after a cooldown; everything else fails the job
	#[must_use]
	pub const fn is_transient(&self) -> bool {
		matches!(
			self,
			Self::Network(_) | Self::RateLimited { .. } | Self::Server(_) | Self::LoginFailed
		)
	}

	#[must_use]
	pub const fn retry_after(&self) -> Option<Duration> {
		match self {
			Self::RateLimited { retry_after } => *retry_after,
			_ => None,
		}
	}
}

impl From<PageError> for Ao3Error {
	fn from(error: PageError) -> Self {
		match error {
			PageError::Restricted => Self::Restricted,
			PageError::Unrevealed => Self::Unrevealed,
			PageError::Missing => Self::NotFound,
			PageError::Malformed(what) => Self::Unparsable(what),
		}
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use reqwest::StatusCode;

	use super::{Ao3Error, PageError};

	#[test]
	fn classifies_failures() {
		assert!(Ao3Error::Server(StatusCode::BAD_GATEWAY).is_transient());
		assert!(
			Ao3Error::RateLimited {
				retry_after: Some(Duration::from_secs(60))
			}
			.is_transient()
		);
		assert!(!Ao3Error::NotFound.is_transient());
		assert!(!Ao3Error::Status(StatusCode::FORBIDDEN).is_transient());
		assert!(!Ao3Error::from(PageError::Restricted).is_transient());
		assert!(!Ao3Error::from(PageError::Malformed("title")).is_transient());
	}

	#[test]
	fn only_rate_limits_carry_retry_after() {
		let limited = Ao3Error::RateLimited {
			retry_after: Some(Duration::from_secs(30)),
		};
		assert_eq!(limited.retry_after(), Some(Duration::from_secs(30)));
		assert_eq!(Ao3Error::Server(StatusCode::SERVICE_UNAVAILABLE).retry_after(), None);
	}
}
