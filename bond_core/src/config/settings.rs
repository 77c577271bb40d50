use std::{collections::HashSet, fs, path::Path};

use bond_db::PostgresConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::config::types::Feature;

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("Failed to read config file {path}: {source}")]
	Read {
		path: String,
		source: std::io::Error,
	},
	#[error("Failed to parse config: {0}")]
	Parse(#[from] toml::de::Error),
	#[error("No [[bots]] configured")]
	NoBots,
	#[error("Bot `{0}` has no features")]
	NoFeatures(String),
	#[error("Bot name `{0}` is used more than once")]
	DuplicateBot(String),
	#[error("Bot `{0}` lists feature `{1}` more than once")]
	DuplicateFeature(String, Feature),
	#[error("Invalid [ao3] settings: {0}")]
	Ao3(&'static str),
}

#[derive(Deserialize, Clone, Debug)]
pub struct MainConfig {
	pub log_level: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct BotConfig {
	pub name: String,
	pub token: String,
	#[serde(default)]
	pub activity: Option<String>,
	pub features: Vec<Feature>,
	/// Guild whose staff receive tickets opened from DMs
	#[serde(default)]
	pub modmail_guild_id: Option<u64>,
}

impl BotConfig {
	#[must_use]
	pub fn has(&self, feature: Feature) -> bool {
		self.features.contains(&feature)
	}
}

#[derive(Deserialize, Clone, Debug)]
pub struct Ao3Config {
	#[serde(default = "Ao3Config::base_url_default")]
	pub base_url: String,
	#[serde(default)]
	pub username: Option<String>,
	#[serde(default)]
	pub password: Option<String>,
	#[serde(default = "Ao3Config::user_agent_default")]
	pub user_agent: String,
	#[serde(default = "Ao3Config::request_delay_default")]
	pub request_delay_ms: u64,
	#[serde(default = "Ao3Config::poll_interval_default")]
	pub poll_interval_secs: u64,
	#[serde(default = "Ao3Config::max_attempts_default")]
	pub max_attempts: u32,
	#[serde(default = "Ao3Config::base_cooldown_default")]
	pub base_cooldown_secs: u64,
	#[serde(default = "Ao3Config::max_cooldown_default")]
	pub max_cooldown_secs: u64,
	#[serde(default = "Ao3Config::max_series_pages_default")]
	pub max_series_pages: u32,
	/// A job still `processing` this long after its claim is handed back to the queue
	#[serde(default = "Ao3Config::stale_job_default")]
	pub stale_job_secs: u64,
}

impl Ao3Config {
	fn base_url_default() -> String {
		"https://archiveofourown.org".to_owned()
	}

	fn user_agent_default() -> String {
		concat!("profound_bond/", env!("CARGO_PKG_VERSION")).to_owned()
	}

	const fn request_delay_default() -> u64 {
		5000
	}

	const fn poll_interval_default() -> u64 {
		30
	}

	const fn max_attempts_default() -> u32 {
		4
	}

	const fn base_cooldown_default() -> u64 {
		120
	}

	const fn max_cooldown_default() -> u64 {
		3600
	}

	const fn max_series_pages_default() -> u32 {
		5
	}

	const fn stale_job_default() -> u64 {
		1800
	}

	#[must_use]
	pub fn has_credentials(&self) -> bool {
		self.username.as_deref().is_some_and(|u| !u.is_empty())
			&& self.password.as_deref().is_some_and(|p| !p.is_empty())
	}
}

impl Default for Ao3Config {
	fn default() -> Self {
		Self {
			base_url: Self::base_url_default(),
			username: None,
			password: None,
			user_agent: Self::user_agent_default(),
			request_delay_ms: Self::request_delay_default(),
			poll_interval_secs: Self::poll_interval_default(),
			max_attempts: Self::max_attempts_default(),
			base_cooldown_secs: Self::base_cooldown_default(),
			max_cooldown_secs: Self::max_cooldown_default(),
			max_series_pages: Self::max_series_pages_default(),
			stale_job_secs: Self::stale_job_default(),
		}
	}
}

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
	pub main: MainConfig,
	pub postgres: PostgresConfig,
	#[serde(default)]
	pub ao3: Ao3Config,
	#[serde(default)]
	pub bots: Vec<BotConfig>,
}

impl Config {
	pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
		let mut config: Self = toml::from_str(contents)?;
		config.ao3.base_url = config.ao3.base_url.trim_end_matches('/').to_owned();
		config.validate()?;
		Ok(config)
	}

	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
			path: path.display().to_string(),
			source,
		})?;
		Self::from_toml(&contents)
	}

	fn validate(&self) -> Result<(), ConfigError> {
		if self.bots.is_empty() {
			return Err(ConfigError::NoBots);
		}
		let mut names = HashSet::with_capacity(self.bots.len());
		for bot in &self.bots {
			if bot.features.is_empty() {
				return Err(ConfigError::NoFeatures(bot.name.clone()));
			}
			if !names.insert(bot.name.as_str()) {
				return Err(ConfigError::DuplicateBot(bot.name.clone()));
			}
			let mut features = HashSet::with_capacity(bot.features.len());
			if let Some(feature) = bot.features.iter().find(|feature| !features.insert(**feature)) {
				return Err(ConfigError::DuplicateFeature(bot.name.clone(), *feature));
			}
		}
		if self.ao3.max_attempts == 0 {
			return Err(ConfigError::Ao3("max_attempts must be at least 1"));
		}
		if self.ao3.stale_job_secs == 0 {
			return Err(ConfigError::Ao3("stale_job_secs must be at least 1"));
		}
		if self.ao3.base_cooldown_secs > self.ao3.max_cooldown_secs {
			return Err(ConfigError::Ao3(
				"base_cooldown_secs must not exceed max_cooldown_secs",
			));
		}
		Ok(())
	}

	/// The bot whose HTTP client announces parse results
	#[must_use]
	pub fn queue_bot(&self) -> Option<&BotConfig> {
		self.bots.iter().find(|bot| bot.has(Feature::Recs))
	}
}

#[cfg(test)]
mod tests {
	use super::{Config, ConfigError};
	use crate::config::types::Feature;

	const BASE: &str = r#"
[main]
log_level = "info"

[postgres]
host = "localhost"
port = 5432
user = "bond"
database = "bond"
password = "secret"
max_connections = 5
"#;

	#[test]
	fn parses_bots_and_defaults() {
		let config = Config::from_toml(&format!(
			r#"{BASE}
[ao3]
base_url = "https://archiveofourown.org/"

[[bots]]
name = "sam"
token = "a"
features = ["recs", "sprints"]

[[bots]]
name = "jack"
token = "b"
features = ["modmail", "moderation", "profiles"]
modmail_guild_id = 1234
"#
		))
		.unwrap();
		assert_eq!(config.bots.len(), 2);
		assert_eq!(config.ao3.base_url, "https://archiveofourown.org");
		assert_eq!(config.ao3.max_attempts, 4);
		assert!(!config.ao3.has_credentials());
		assert_eq!(config.queue_bot().map(|b| b.name.as_str()), Some("sam"));
		assert!(config.bots[1].has(Feature::Modmail));
		assert_eq!(config.bots[1].modmail_guild_id, Some(1234));
	}

	#[test]
	fn rejects_missing_bots() {
		assert!(matches!(Config::from_toml(BASE), Err(ConfigError::NoBots)));
	}

	#[test]
	fn rejects_empty_features_and_duplicates() {
		let empty = format!("{BASE}\n[[bots]]\nname = \"sam\"\ntoken = \"a\"\nfeatures = []\n");
		assert!(matches!(
			Config::from_toml(&empty),
			Err(ConfigError::NoFeatures(name)) if name == "sam"
		));

		let dup = format!(
			"{BASE}\n[[bots]]\nname = \"sam\"\ntoken = \"a\"\nfeatures = [\"recs\"]\n\n[[bots]]\nname = \"sam\"\ntoken = \"b\"\nfeatures = [\"profiles\"]\n"
		);
		assert!(matches!(
			Config::from_toml(&dup),
			Err(ConfigError::DuplicateBot(_))
		));
	}

	#[test]
	fn rejects_repeated_features() {
		let repeated = format!(
			"{BASE}\n[[bots]]\nname = \"sam\"\ntoken = \"a\"\nfeatures = [\"recs\", \"sprints\", \"recs\"]\n"
		);
		assert!(matches!(
			Config::from_toml(&repeated),
			Err(ConfigError::DuplicateFeature(name, Feature::Recs)) if name == "sam"
		));
	}

	#[test]
	fn rejects_unknown_feature() {
		let unknown =
			format!("{BASE}\n[[bots]]\nname = \"sam\"\ntoken = \"a\"\nfeatures = [\"music\"]\n");
		assert!(matches!(
			Config::from_toml(&unknown),
			Err(ConfigError::Parse(_))
		));
	}
}
