//! Selector based reading of AO3 work and series pages.
//!
//! Missing optional fields come back as `None` or empty lists; only a page
//! without a title is treated as unreadable.

use bond_db::{recommendation::NewRecommendation, series::NewSeries};
use scraper::{ElementRef, Html, Selector};
use winnow::{
	ModalResult, Parser as _,
	ascii::{digit1, space1},
	combinator::{alt, preceded, separated, separated_pair},
	error::{ContextError, ErrMode},
};

use crate::ao3::error::PageError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeriesMembership {
	pub series_id: u64,
	pub position: Option<u32>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkMetadata {
	pub work_id: u64,
	pub title: String,
	pub authors: Vec<String>,
	pub summary: Option<String>,
	pub rating: Option<String>,
	pub warnings: Vec<String>,
	pub categories: Vec<String>,
	pub fandoms: Vec<String>,
	pub relationships: Vec<String>,
	pub characters: Vec<String>,
	pub tags: Vec<String>,
	pub language: Option<String>,
	pub words: Option<i64>,
	pub chapters_written: Option<i32>,
	pub chapters_total: Option<i32>,
	pub complete: bool,
	pub kudos: Option<i64>,
	pub hits: Option<i64>,
	pub bookmarks: Option<i64>,
	pub published: Option<String>,
	pub updated: Option<String>,
	pub series: Vec<SeriesMembership>,
}

impl WorkMetadata {
	#[must_use]
	pub fn into_new_recommendation(
		self,
		url: String,
		recommended_by: i64,
		notes: Option<String>,
	) -> NewRecommendation {
		NewRecommendation {
			ao3_work_id: self.work_id.cast_signed(),
			url,
			title: self.title,
			authors: self.authors,
			summary: self.summary,
			rating: self.rating,
			warnings: self.warnings,
			categories: self.categories,
			fandoms: self.fandoms,
			relationships: self.relationships,
			characters: self.characters,
			tags: self.tags,
			language: self.language,
			words: self.words,
			chapters_written: self.chapters_written,
			chapters_total: self.chapters_total,
			complete: self.complete,
			kudos: self.kudos,
			hits: self.hits,
			bookmarks: self.bookmarks,
			published: self.published,
			updated: self.updated,
			ao3_series_ids: self
				.series
				.iter()
				.map(|membership| membership.series_id.cast_signed())
				.collect(),
			recommended_by,
			notes,
		}
	}
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeriesWork {
	pub work_id: u64,
	pub title: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SeriesMetadata {
	pub series_id: u64,
	pub name: String,
	pub creators: Vec<String>,
	pub summary: Option<String>,
	pub words: Option<i64>,
	pub works_count: Option<i32>,
	pub complete: bool,
	/// In series order, across every page read so far
	pub works: Vec<SeriesWork>,
	/// Number of the next works page, if the list is paginated
	pub next_page: Option<u32>,
}

impl SeriesMetadata {
	/// Appends the works of a later page of the same series
	pub fn extend_with(&mut self, page: Self) {
		self.works.extend(page.works);
		self.next_page = page.next_page;
	}

	#[must_use]
	pub fn into_new_series(self, url: String, recommended_by: i64, notes: Option<String>) -> NewSeries {
		let works_count = self
			.works_count
			.or_else(|| i32::try_from(self.works.len()).ok())
			.unwrap_or_default();
		NewSeries {
			ao3_series_id: self.series_id.cast_signed(),
			url,
			name: self.name,
			creators: self.creators,
			summary: self.summary,
			words: self.words,
			works_count,
			complete: self.complete,
			work_ids: self
				.works
				.iter()
				.map(|work| work.work_id.cast_signed())
				.collect(),
			recommended_by,
			notes,
		}
	}
}

fn selector(css: &'static str) -> Result<Selector, PageError> {
	Selector::parse(css).map_err(|_| PageError::Malformed(css))
}

fn collapse<'a>(parts: impl Iterator<Item = &'a str>) -> String {
	let joined: String = parts.collect();
	let mut out = String::with_capacity(joined.len());
	for word in joined.split_whitespace() {
		if !out.is_empty() {
			out.push(' ');
		}
		out.push_str(word);
	}
	out
}

fn text_of(element: ElementRef<'_>) -> String {
	collapse(element.text())
}

/// Paragraph-preserving plain text of a `userstuff` block
fn block_text(element: ElementRef<'_>) -> Result<Option<String>, PageError> {
	let paragraph = selector("p")?;
	let paragraphs: Vec<String> = element
		.select(&paragraph)
		.map(text_of)
		.filter(|text| !text.is_empty())
		.collect();
	let text = if paragraphs.is_empty() {
		text_of(element)
	} else {
		paragraphs.join("\n\n")
	};
	Ok((!text.is_empty()).then_some(text))
}

fn first_text(root: ElementRef<'_>, css: &'static str) -> Result<Option<String>, PageError> {
	Ok(root
		.select(&selector(css)?)
		.next()
		.map(text_of)
		.filter(|text| !text.is_empty()))
}

fn all_texts(root: ElementRef<'_>, css: &'static str) -> Result<Vec<String>, PageError> {
	Ok(root
		.select(&selector(css)?)
		.map(text_of)
		.filter(|text| !text.is_empty())
		.collect())
}

fn grouped_number(input: &mut &str) -> ModalResult<i64> {
	let groups: Vec<&str> = separated(1.., digit1, ',').parse_next(input)?;
	groups
		.concat()
		.parse()
		.map_err(|_| ErrMode::Cut(ContextError::new()))
}

/// `1,234` style counts as AO3 prints them
#[must_use]
pub fn parse_count(text: &str) -> Option<i64> {
	grouped_number.parse(text.trim()).ok()
}

fn chapter_counts(input: &mut &str) -> ModalResult<(i32, Option<i32>)> {
	separated_pair(
		digit1.parse_to(),
		'/',
		alt(('?'.value(None), digit1.parse_to().map(Some))),
	)
	.parse_next(input)
}

/// `3/10` or `3/?`
#[must_use]
pub fn parse_chapters(text: &str) -> Option<(i32, Option<i32>)> {
	chapter_counts.parse(text.trim()).ok()
}

fn series_position(input: &mut &str) -> ModalResult<u32> {
	preceded(("Part", space1), digit1.parse_to()).parse_next(input)
}

/// Numeric id following `marker` in an AO3 href, relative or absolute
fn id_after(href: &str, marker: &str) -> Option<u64> {
	let (_, rest) = href.split_once(marker)?;
	let digits: &str = rest
		.split(|c: char| !c.is_ascii_digit())
		.next()
		.unwrap_or_default();
	digits.parse().ok()
}

/// Recognises pages that stand in for the one requested.
#[must_use]
pub fn classify_page(document: &Html) -> Option<PageError> {
	let found = |css: &'static str| {
		selector(css).is_ok_and(|sel| document.select(&sel).next().is_some())
	};
	let notice_contains = |needle: &str| {
		selector("#main p.notice, #main div.flash.notice").is_ok_and(|sel| {
			document
				.select(&sel)
				.any(|notice| text_of(notice).to_lowercase().contains(needle))
		})
	};

	if found("#main.error-404") {
		return Some(PageError::Missing);
	}
	if found("h2.title.heading") || found("ul.series.work.index") {
		return None;
	}
	if found("#main h2.heading")
		&& (notice_contains("will be revealed") || notice_contains("unrevealed"))
	{
		return Some(PageError::Unrevealed);
	}
	if found("form#new_user") || found("#loginform") || notice_contains("registered users") {
		return Some(PageError::Restricted);
	}
	if found("p.caution") {
		return Some(PageError::Malformed("adult content interstitial"));
	}
	None
}

pub fn parse_work(html: &str, work_id: u64) -> Result<WorkMetadata, PageError> {
	let document = Html::parse_document(html);
	if let Some(error) = classify_page(&document) {
		return Err(error);
	}
	let root = document.root_element();

	let title =
		first_text(root, "h2.title.heading")?.ok_or(PageError::Malformed("work title"))?;
	let mut authors = all_texts(root, "h3.byline.heading a[rel=\"author\"]")?;
	if authors.is_empty() {
		authors.push("Anonymous".to_owned());
	}
	let summary = match root
		.select(&selector("div.preface .summary blockquote.userstuff")?)
		.next()
	{
		Some(block) => block_text(block)?,
		None => None,
	};

	let stat = |css: &'static str| -> Result<Option<i64>, PageError> {
		Ok(first_text(root, css)?.as_deref().and_then(parse_count))
	};
	let chapters = first_text(root, "dl.stats dd.chapters")?
		.as_deref()
		.and_then(parse_chapters);
	let (chapters_written, chapters_total) = chapters.map_or((None, None), |(written, total)| {
		(Some(written), total)
	});

	let mut series = Vec::new();
	let link = selector("a[href]")?;
	for position in root.select(&selector("dd.series span.position")?) {
		let Some(series_id) = position
			.select(&link)
			.find_map(|a| a.value().attr("href").and_then(|href| id_after(href, "/series/")))
		else {
			continue;
		};
		let text = text_of(position);
		let mut input = text.as_str();
		series.push(SeriesMembership {
			series_id,
			position: series_position(&mut input).ok(),
		});
	}

	Ok(WorkMetadata {
		work_id,
		title,
		authors,
		summary,
		rating: first_text(root, "dd.rating.tags a.tag")?,
		warnings: all_texts(root, "dd.warning.tags a.tag")?,
		categories: all_texts(root, "dd.category.tags a.tag")?,
		fandoms: all_texts(root, "dd.fandom.tags a.tag")?,
		relationships: all_texts(root, "dd.relationship.tags a.tag")?,
		characters: all_texts(root, "dd.character.tags a.tag")?,
		tags: all_texts(root, "dd.freeform.tags a.tag")?,
		language: first_text(root, "dl.work.meta dd.language")?,
		words: stat("dl.stats dd.words")?,
		chapters_written,
		chapters_total,
		complete: chapters_written.is_some() && chapters_written == chapters_total,
		kudos: stat("dl.stats dd.kudos")?,
		hits: stat("dl.stats dd.hits")?,
		bookmarks: stat("dl.stats dd.bookmarks")?,
		published: first_text(root, "dl.stats dd.published")?,
		updated: first_text(root, "dl.stats dd.status")?,
		series,
	})
}

pub fn parse_series(html: &str, series_id: u64) -> Result<SeriesMetadata, PageError> {
	let document = Html::parse_document(html);
	if let Some(error) = classify_page(&document) {
		return Err(error);
	}
	let root = document.root_element();

	let name = first_text(root, "#main h2.heading")?.ok_or(PageError::Malformed("series name"))?;
	let mut metadata = SeriesMetadata {
		series_id,
		name,
		..SeriesMetadata::default()
	};

	let terms = selector("dl.series.meta > dt")?;
	let definitions = selector("dl.series.meta > dd")?;
	let author = selector("a[rel=\"author\"]")?;
	let userstuff = selector("blockquote.userstuff")?;
	for (term, definition) in root.select(&terms).zip(root.select(&definitions)) {
		match text_of(term).trim_end_matches(':') {
			"Creator" | "Creators" => {
				metadata.creators = definition
					.select(&author)
					.map(text_of)
					.filter(|name| !name.is_empty())
					.collect();
			}
			"Description" => {
				if let Some(block) = definition.select(&userstuff).next() {
					metadata.summary = block_text(block)?;
				}
			}
			"Stats" => {
				metadata.words = first_text(definition, "dd.words")?
					.as_deref()
					.and_then(parse_count);
				metadata.works_count = first_text(definition, "dd.works")?
					.as_deref()
					.and_then(parse_count)
					.and_then(|count| i32::try_from(count).ok());
				metadata.complete = first_text(definition, "dd.complete")?
					.is_some_and(|complete| complete.eq_ignore_ascii_case("yes"));
			}
			_ => {}
		}
	}

	let work_link = selector("h4.heading a[href]")?;
	for blurb in root.select(&selector("ul.series.work.index > li.blurb")?) {
		let Some((work_id, title)) = blurb.select(&work_link).find_map(|a| {
			a.value()
				.attr("href")
				.and_then(|href| id_after(href, "/works/"))
				.map(|id| (id, text_of(a)))
		}) else {
			continue;
		};
		metadata.works.push(SeriesWork { work_id, title });
	}

	metadata.next_page = root
		.select(&selector("ol.pagination li.next a[rel=\"next\"]")?)
		.next()
		.and_then(|a| a.value().attr("href"))
		.and_then(|href| id_after(href, "page="))
		.and_then(|page| u32::try_from(page).ok());

	if metadata.creators.is_empty() {
		metadata.creators.push("Anonymous".to_owned());
	}
	Ok(metadata)
}

/// Work id a chapter page belongs to, read from its navigation links
pub fn work_id_of_chapter(html: &str) -> Result<u64, PageError> {
	let document = Html::parse_document(html);
	if let Some(error) = classify_page(&document) {
		return Err(error);
	}
	let link = selector("#main a[href*=\"/works/\"]")?;
	document
		.select(&link)
		.find_map(|a| a.value().attr("href").and_then(|href| id_after(href, "/works/")))
		.ok_or(PageError::Malformed("chapter without work link"))
}

#[cfg(test)]
mod tests {
	use scraper::Html;

	use super::{
		PageError, SeriesMembership, classify_page, parse_chapters, parse_count, parse_series,
		parse_work, work_id_of_chapter,
	};

	const WORK: &str = include_str!("../../tests/fixtures/work.html");
	const WORK_ANONYMOUS: &str = include_str!("../../tests/fixtures/work_anonymous.html");
	const SERIES: &str = include_str!("../../tests/fixtures/series.html");
	const LOGIN_WALL: &str = include_str!("../../tests/fixtures/login_wall.html");
	const UNREVEALED: &str = include_str!("../../tests/fixtures/unrevealed.html");
	const NOT_FOUND: &str = include_str!("../../tests/fixtures/not_found.html");

	#[test]
	fn counts_and_chapters() {
		assert_eq!(parse_count("1,234,567"), Some(1_234_567));
		assert_eq!(parse_count(" 42 "), Some(42));
		assert_eq!(parse_count("1,2a"), None);
		assert_eq!(parse_count(""), None);
		assert_eq!(parse_chapters("3/?"), Some((3, None)));
		assert_eq!(parse_chapters("12/12"), Some((12, Some(12))));
		assert_eq!(parse_chapters("three"), None);
	}

	#[test]
	fn reads_a_full_work_page() {
		let work = parse_work(WORK, 1_234_567).unwrap();
		assert_eq!(work.title, "The Long Way Home");
		assert_eq!(work.authors, ["quietwriter", "cowriter"]);
		assert_eq!(
			work.summary.as_deref(),
			Some("Two hunters and one very long road trip.\n\nSlow burn, eventual happy ending.")
		);
		assert_eq!(work.rating.as_deref(), Some("Teen And Up Audiences"));
		assert_eq!(work.warnings, ["No Archive Warnings Apply"]);
		assert_eq!(work.categories, ["M/M"]);
		assert_eq!(work.fandoms, ["Supernatural (TV 2005)"]);
		assert_eq!(work.relationships, ["Castiel/Dean Winchester"]);
		assert_eq!(work.characters, ["Dean Winchester", "Castiel (Supernatural)"]);
		assert_eq!(work.tags, ["Road Trips", "Slow Burn"]);
		assert_eq!(work.language.as_deref(), Some("English"));
		assert_eq!(work.words, Some(85_321));
		assert_eq!((work.chapters_written, work.chapters_total), (Some(12), None));
		assert!(!work.complete);
		assert_eq!(work.kudos, Some(4_210));
		assert_eq!(work.hits, Some(98_765));
		assert_eq!(work.bookmarks, Some(1_002));
		assert_eq!(work.published.as_deref(), Some("2021-03-04"));
		assert_eq!(work.updated.as_deref(), Some("2023-11-20"));
		assert_eq!(
			work.series,
			[SeriesMembership {
				series_id: 998_877,
				position: Some(2)
			}]
		);
	}

	#[test]
	fn tolerates_missing_fields() {
		let work = parse_work(WORK_ANONYMOUS, 42).unwrap();
		assert_eq!(work.title, "Untitled Drabble");
		assert_eq!(work.authors, ["Anonymous"]);
		assert_eq!(work.summary, None);
		assert!(work.relationships.is_empty());
		assert_eq!(work.kudos, None);
		assert!(work.complete);
		assert!(work.series.is_empty());
	}

	#[test]
	fn reads_a_series_page() {
		let series = parse_series(SERIES, 998_877).unwrap();
		assert_eq!(series.name, "Roads Less Travelled");
		assert_eq!(series.creators, ["quietwriter"]);
		assert_eq!(series.summary.as_deref(), Some("Everything set on the road."));
		assert_eq!(series.words, Some(120_000));
		assert_eq!(series.works_count, Some(3));
		assert!(!series.complete);
		let ids: Vec<u64> = series.works.iter().map(|work| work.work_id).collect();
		assert_eq!(ids, [1_111_111, 1_234_567]);
		assert_eq!(series.works[1].title, "The Long Way Home");
		assert_eq!(series.next_page, Some(2));
	}

	#[test]
	fn later_series_pages_append_their_works() {
		let mut series = parse_series(SERIES, 998_877).unwrap();
		let mut last = parse_series(SERIES, 998_877).unwrap();
		last.name = "ignored".to_owned();
		last.next_page = None;
		series.extend_with(last);
		let ids: Vec<u64> = series.works.iter().map(|work| work.work_id).collect();
		assert_eq!(ids, [1_111_111, 1_234_567, 1_111_111, 1_234_567]);
		assert_eq!(series.name, "Roads Less Travelled");
		assert_eq!(series.next_page, None);
	}

	#[test]
	fn recognises_stand_in_pages() {
		assert_eq!(
			classify_page(&Html::parse_document(LOGIN_WALL)),
			Some(PageError::Restricted)
		);
		assert_eq!(parse_work(UNREVEALED, 7), Err(PageError::Unrevealed));
		assert_eq!(parse_work(NOT_FOUND, 7), Err(PageError::Missing));
		assert_eq!(classify_page(&Html::parse_document(WORK)), None);
		assert_eq!(
			parse_work("<html><body><div id=\"main\"></div></body></html>", 7),
			Err(PageError::Malformed("work title"))
		);
	}

	#[test]
	fn chapter_pages_point_at_their_work() {
		assert_eq!(work_id_of_chapter(WORK).ok(), Some(1_234_567));
	}
}
