use std::fmt;

use thiserror::Error;
use urlencoding::encode;
use winnow::{
	ModalResult, Parser as _,
	ascii::digit1,
	combinator::{alt, preceded},
	error::{ContextError, ErrMode},
	token::take_till,
};

use crate::config::constants::AO3_HOSTS;

/// An AO3 page the bots know how to catalogue
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Ao3Link {
	Work(u64),
	Series(u64),
	/// Chapter ids only resolve to a work through AO3 itself
	Chapter(u64),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LinkError {
	#[error("that doesn't look like an AO3 link")]
	NotAo3,
	#[error("only AO3 work, chapter and series links can be added")]
	UnsupportedPath,
}

impl Ao3Link {
	#[must_use]
	pub fn canonical_url(self, base: &str) -> String {
		match self {
			Self::Work(id) => format!("{base}/works/{id}"),
			Self::Series(id) => format!("{base}/series/{id}"),
			Self::Chapter(id) => format!("{base}/chapters/{id}"),
		}
	}

	#[must_use]
	pub const fn is_series(self) -> bool {
		matches!(self, Self::Series(_))
	}
}

impl fmt::Display for Ao3Link {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Work(id) => write!(f, "work {id}"),
			Self::Series(id) => write!(f, "series {id}"),
			Self::Chapter(id) => write!(f, "chapter {id}"),
		}
	}
}

fn ao3_id(input: &mut &str) -> ModalResult<u64> {
	digit1.parse_to().parse_next(input)
}

fn work(input: &mut &str) -> ModalResult<Ao3Link> {
	preceded("/works/", ao3_id)
		.map(Ao3Link::Work)
		.parse_next(input)
}

fn collection_work(input: &mut &str) -> ModalResult<Ao3Link> {
	preceded(("/collections/", take_till(1.., '/')), work).parse_next(input)
}

fn series(input: &mut &str) -> ModalResult<Ao3Link> {
	preceded("/series/", ao3_id)
		.map(Ao3Link::Series)
		.parse_next(input)
}

fn chapter(input: &mut &str) -> ModalResult<Ao3Link> {
	preceded("/chapters/", ao3_id)
		.map(Ao3Link::Chapter)
		.parse_next(input)
}

fn link_path(input: &mut &str) -> ModalResult<Ao3Link> {
	let link = alt((work, collection_work, series, chapter)).parse_next(input)?;
	// `/works/12abc` is not work 12
	if input.is_empty() || input.starts_with('/') {
		Ok(link)
	} else {
		Err(ErrMode::Backtrack(ContextError::new()))
	}
}

/// Parses anything a user might paste: with or without scheme or `www.`,
/// any AO3 mirror host, trailing chapter paths, query strings and fragments.
pub fn parse_link(input: &str) -> Result<Ao3Link, LinkError> {
	let trimmed = input
		.trim()
		.trim_start_matches('<')
		.trim_end_matches('>');
	let without_scheme = trimmed
		.strip_prefix("https://")
		.or_else(|| trimmed.strip_prefix("http://"))
		.unwrap_or(trimmed);

	let (host, path) = without_scheme
		.find('/')
		.map_or((without_scheme, ""), |index| without_scheme.split_at(index));
	let host = host.to_ascii_lowercase();
	let host = host.strip_prefix("www.").unwrap_or(&host);
	if !AO3_HOSTS.contains(&host) {
		return Err(LinkError::NotAo3);
	}

	let path = path
		.split(['?', '#'])
		.next()
		.unwrap_or_default();
	let mut path = path;
	link_path(&mut path).map_err(|_| LinkError::UnsupportedPath)
}

/// AO3 escapes a few characters in tag URLs, the rest is percent-encoded
#[must_use]
pub fn tag_url(base: &str, tag: &str) -> String {
	let mut path = String::with_capacity(tag.len());
	let mut buf = [0; 4];
	for ch in tag.chars() {
		match ch {
			'*' | '/' => path.push_str("*s*"),
			'&' => path.push_str("*a*"),
			'.' => path.push_str("*d*"),
			'?' => path.push_str("*q*"),
			'#' => path.push_str("*h*"),
			other => path.push_str(&encode(other.encode_utf8(&mut buf))),
		}
	}
	format!("{base}/tags/{path}/works")
}

#[cfg(test)]
mod tests {
	use super::{Ao3Link, LinkError, parse_link, tag_url};

	const BASE: &str = "https://archiveofourown.org";

	#[test]
	fn accepts_the_usual_work_links() {
		for input in [
			"https://archiveofourown.org/works/123456",
			"http://archiveofourown.org/works/123456/",
			"archiveofourown.org/works/123456",
			"https://www.archiveofourown.org/works/123456?view_adult=true",
			"https://archiveofourown.org/works/123456/chapters/987#workskin",
			"https://ao3.org/works/123456",
			"https://ArchiveOfOurOwn.com/works/123456",
			"<https://archiveofourown.org/works/123456>",
			"  https://archiveofourown.net/works/123456  ",
			"https://archiveofourown.org/collections/Some_Fest_2024/works/123456",
		] {
			assert_eq!(parse_link(input), Ok(Ao3Link::Work(123_456)), "{input}");
		}
	}

	#[test]
	fn accepts_series_and_chapters() {
		assert_eq!(
			parse_link("https://archiveofourown.org/series/42?page=2"),
			Ok(Ao3Link::Series(42))
		);
		assert_eq!(
			parse_link("https://archiveofourown.org/chapters/777"),
			Ok(Ao3Link::Chapter(777))
		);
	}

	#[test]
	fn rejects_other_sites_and_pages() {
		assert_eq!(
			parse_link("https://fanfiction.net/s/123"),
			Err(LinkError::NotAo3)
		);
		assert_eq!(
			parse_link("https://archiveofourown.org.evil.com/works/1"),
			Err(LinkError::NotAo3)
		);
		assert_eq!(
			parse_link("https://archiveofourown.org/users/someone/works"),
			Err(LinkError::UnsupportedPath)
		);
		assert_eq!(
			parse_link("https://archiveofourown.org/works/12abc"),
			Err(LinkError::UnsupportedPath)
		);
		assert_eq!(
			parse_link("https://archiveofourown.org/works/"),
			Err(LinkError::UnsupportedPath)
		);
		assert_eq!(parse_link(""), Err(LinkError::NotAo3));
	}

	#[test]
	fn equivalent_links_share_a_canonical_url() {
		let a = parse_link("ao3.org/works/5/chapters/9").unwrap();
		let b = parse_link("https://www.archiveofourown.org/works/5?view_full_work=true").unwrap();
		assert_eq!(a.canonical_url(BASE), b.canonical_url(BASE));
		assert_eq!(a.canonical_url(BASE), "https://archiveofourown.org/works/5");
	}

	#[test]
	fn tag_urls_use_ao3_escapes() {
		assert_eq!(
			tag_url(BASE, "Castiel/Dean Winchester"),
			"https://archiveofourown.org/tags/Castiel*s*Dean%20Winchester/works"
		);
		assert_eq!(
			tag_url(BASE, "Dr. Who"),
			"https://archiveofourown.org/tags/Dr*d*%20Who/works"
		);
		assert_eq!(
			tag_url(BASE, "Kirk & Spock*"),
			"https://archiveofourown.org/tags/Kirk%20*a*%20Spock*s*/works"
		);
		assert_eq!(
			tag_url(BASE, "Naïve?#"),
			"https://archiveofourown.org/tags/Na%C3%AFve*q**h*/works"
		);
	}
}
