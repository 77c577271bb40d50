//! Scripted stand-in for AO3 used by the client and queue tests.

use std::{collections::VecDeque, sync::Mutex};

use crate::ao3::{
	client::{Page, Transport},
	error::Ao3Error,
};

/// Answers requests from a script, in order, and remembers what was asked
pub struct ScriptedAo3 {
	replies: Mutex<VecDeque<Result<Page, Ao3Error>>>,
	requests: Mutex<Vec<String>>,
}

impl ScriptedAo3 {
	pub fn new(replies: Vec<Result<Page, Ao3Error>>) -> Self {
		Self {
			replies: Mutex::new(replies.into()),
			requests: Mutex::new(Vec::new()),
		}
	}

	fn answer(&self, request: String) -> Result<Page, Ao3Error> {
		self.requests.lock().unwrap().push(request);
		self.replies
			.lock()
			.unwrap()
			.pop_front()
			.unwrap_or(Err(Ao3Error::NotFound))
	}

	pub fn requests(&self) -> Vec<String> {
		self.requests.lock().unwrap().clone()
	}
}

impl Transport for ScriptedAo3 {
	async fn get(&self, url: &str) -> Result<Page, Ao3Error> {
		self.answer(format!("GET {url}"))
	}

	async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<Page, Ao3Error> {
		let token = form
			.iter()
			.find(|(name, _)| *name == "authenticity_token")
			.map_or("", |(_, value)| *value);
		self.answer(format!("POST {url} {token}"))
	}
}

pub fn page(url: &str, body: &str) -> Result<Page, Ao3Error> {
	Ok(Page {
		url: url.to_owned(),
		body: body.to_owned(),
	})
}
