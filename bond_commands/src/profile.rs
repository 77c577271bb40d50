use std::time::Duration;

use bond_core::{
	config::{
		constants::{BIO_LIMIT, COLOUR_GREEN, COLOUR_RED, PRONOUNS_LIMIT, REGION_LIMIT, TIMEZONE_LIMIT},
		types::{Data, Error, SContext, UserError},
	},
	utils::{
		helpers::{notice_embed, profile_embed},
		permissions::profiles_unlocked,
	},
};
use bond_db::profile::{self, Profile, ProfileFields};
use poise::{ApplicationContext, CreateReply, Modal, execute_modal};
use serenity::all::User;
use tracing::info;
use winnow::{
	ModalResult, Parser as _,
	ascii::Caseless,
	combinator::{opt, preceded},
	stream::AsChar as _,
	token::{one_of, take_while},
};

use crate::prompts::confirm;

type AContext<'a> = ApplicationContext<'a, Data, Error>;

const MODAL_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Default, Modal)]
#[name = "Edit your profile"]
struct ProfileModal {
	#[name = "Pronouns"]
	#[placeholder = "she/her, they/them, ..."]
	#[max_length = 40]
	pronouns: Option<String>,
	#[name = "Timezone"]
	#[placeholder = "UTC+2, UTC-03:30"]
	#[max_length = 12]
	timezone: Option<String>,
	#[name = "Region"]
	#[max_length = 60]
	region: Option<String>,
	#[name = "AO3 username"]
	#[max_length = 40]
	ao3_username: Option<String>,
	#[name = "Bio"]
	#[paragraph]
	#[max_length = 1000]
	bio: Option<String>,
}

impl From<&Profile> for ProfileModal {
	fn from(profile: &Profile) -> Self {
		Self {
			pronouns: profile.pronouns.clone(),
			timezone: profile.timezone.clone(),
			region: profile.region.clone(),
			ao3_username: profile.ao3_username.clone(),
			bio: profile.bio.clone(),
		}
	}
}

type Offset = (char, u32, Option<u32>);

fn utc_offset(input: &mut &str) -> ModalResult<Option<Offset>> {
	preceded(
		Caseless("utc"),
		opt((
			one_of(['+', '-']),
			take_while(1..=2, char::is_dec_digit).parse_to::<u32>(),
			opt(preceded(
				':',
				take_while(2, char::is_dec_digit).parse_to::<u32>(),
			)),
		)),
	)
	.parse_next(input)
}

/// Normalises `UTC`, `UTC±H` and `UTC±HH:MM` to `UTC` or `UTC±HH:MM`
pub fn validate_timezone(input: &str) -> Result<String, &'static str> {
	let Ok(offset) = utc_offset.parse(input.trim()) else {
		return Err("Timezones look like UTC, UTC+2 or UTC-03:30.");
	};
	let Some((sign, hours, minutes)) = offset else {
		return Ok("UTC".to_owned());
	};
	let minutes = minutes.unwrap_or(0);
	if minutes >= 60 || hours > 14 || (hours == 14 && minutes > 0) {
		return Err("Offsets go from UTC-14:00 to UTC+14:00.");
	}
	Ok(format!("UTC{sign}{hours:02}:{minutes:02}"))
}

pub fn validate_ao3_username(input: &str) -> Result<String, &'static str> {
	let name = input.trim();
	let length = name.chars().count();
	if !(3..=40).contains(&length) {
		return Err("AO3 usernames are 3 to 40 characters long.");
	}
	if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
		return Err("AO3 usernames only use letters, digits and underscores.");
	}
	Ok(name.to_owned())
}

fn filled(value: Option<String>) -> Option<String> {
	value
		.map(|value| value.trim().to_owned())
		.filter(|value| !value.is_empty())
}

fn within(value: Option<String>, limit: usize, field: &str) -> Result<Option<String>, String> {
	match filled(value) {
		Some(value) if value.chars().count() > limit => {
			Err(format!("{field} can be at most {limit} characters."))
		}
		value => Ok(value),
	}
}

fn validate(modal: ProfileModal) -> Result<ProfileFields, String> {
	Ok(ProfileFields {
		pronouns: within(modal.pronouns, PRONOUNS_LIMIT, "Pronouns")?,
		timezone: within(modal.timezone, TIMEZONE_LIMIT, "Timezone")?
			.map(|timezone| validate_timezone(&timezone))
			.transpose()?,
		region: within(modal.region, REGION_LIMIT, "Region")?,
		ao3_username: filled(modal.ao3_username)
			.map(|name| validate_ao3_username(&name))
			.transpose()?,
		bio: within(modal.bio, BIO_LIMIT, "Bio")?,
	})
}

#[poise::command(
	slash_command,
	subcommands("profile_view", "profile_edit", "profile_clear"),
	subcommand_required
)]
pub async fn profile(_: SContext<'_>) -> Result<(), Error> {
	Ok(())
}

/// Show someone's profile
#[poise::command(slash_command, rename = "view")]
async fn profile_view(
	ctx: SContext<'_>,
	#[description = "Whose profile, yours if empty"] user: Option<User>,
) -> Result<(), Error> {
	let user = user.as_ref().unwrap_or_else(|| ctx.author());
	let Some(profile) = profile::get(i64::from(user.id), &ctx.data().db).await? else {
		return Err(UserError::new(if user.id == ctx.author().id {
			"You don't have a profile yet, make one with `/profile edit`.".to_owned()
		} else {
			format!("{} doesn't have a profile yet.", user.display_name())
		})
		.into());
	};
	let avatar_url = user.avatar_url().unwrap_or_else(|| user.default_avatar_url());
	ctx.send(CreateReply::default().embed(profile_embed(
		user.display_name(),
		&avatar_url,
		&profile,
	)))
	.await?;
	Ok(())
}

/// Edit your profile
#[poise::command(slash_command, rename = "edit", check = "profiles_unlocked")]
async fn profile_edit(app_ctx: AContext<'_>) -> Result<(), Error> {
	let ctx = SContext::Application(app_ctx);
	let user_id = i64::from(ctx.author().id);
	let current = profile::get(user_id, &ctx.data().db).await?;
	let defaults = current.as_ref().map(ProfileModal::from);
	let Some(modal) = execute_modal(app_ctx, defaults, Some(MODAL_TIMEOUT)).await? else {
		return Ok(());
	};
	let fields = validate(modal).map_err(UserError::new)?;
	let saved = profile::upsert(user_id, &fields, &ctx.data().db).await?;
	info!("Profile of {user_id} updated");
	let author = ctx.author();
	let avatar_url = author
		.avatar_url()
		.unwrap_or_else(|| author.default_avatar_url());
	ctx.send(
		CreateReply::default()
			.content("Saved!")
			.embed(profile_embed(author.display_name(), &avatar_url, &saved))
			.ephemeral(true),
	)
	.await?;
	Ok(())
}

/// Delete your profile
#[poise::command(slash_command, rename = "clear")]
async fn profile_clear(ctx: SContext<'_>) -> Result<(), Error> {
	let user_id = i64::from(ctx.author().id);
	if profile::get(user_id, &ctx.data().db).await?.is_none() {
		return Err(UserError::new("You don't have a profile to clear.").into());
	}
	let prompt = notice_embed(
		"Clear profile?",
		"Your profile and sprint word total will be deleted.",
		COLOUR_RED,
	);
	if !confirm(ctx, prompt).await? {
		return Ok(());
	}
	profile::delete(user_id, &ctx.data().db).await?;
	info!("Profile of {user_id} cleared");
	ctx.send(
		CreateReply::default()
			.embed(notice_embed("Cleared", "Your profile is gone.", COLOUR_GREEN))
			.ephemeral(true),
	)
	.await?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use bond_db::profile::ProfileFields;

	use super::{ProfileModal, validate, validate_ao3_username, validate_timezone};

	#[test]
	fn timezones_normalise() {
		assert_eq!(validate_timezone("utc").as_deref(), Ok("UTC"));
		assert_eq!(validate_timezone(" UTC+2 ").as_deref(), Ok("UTC+02:00"));
		assert_eq!(validate_timezone("UTC-03:30").as_deref(), Ok("UTC-03:30"));
		assert_eq!(validate_timezone("UTC+14").as_deref(), Ok("UTC+14:00"));
	}

	#[test]
	fn timezones_out_of_range_or_malformed_are_refused() {
		assert!(validate_timezone("UTC+15").is_err());
		assert!(validate_timezone("UTC+14:30").is_err());
		assert!(validate_timezone("UTC+05:75").is_err());
		assert!(validate_timezone("GMT+1").is_err());
		assert!(validate_timezone("UTC+5:3").is_err());
		assert!(validate_timezone("Europe/Oslo").is_err());
	}

	#[test]
	fn ao3_usernames() {
		assert_eq!(validate_ao3_username("quiet_writer9").as_deref(), Ok("quiet_writer9"));
		assert!(validate_ao3_username("ab").is_err());
		assert!(validate_ao3_username(&"a".repeat(41)).is_err());
		assert!(validate_ao3_username("has space").is_err());
		assert!(validate_ao3_username("dash-name").is_err());
	}

	#[test]
	fn modal_values_are_trimmed_and_checked() {
		let fields = validate(ProfileModal {
			pronouns: Some(" they/them ".to_owned()),
			timezone: Some("UTC+1".to_owned()),
			region: Some("   ".to_owned()),
			ao3_username: None,
			bio: Some("Writes angst.".to_owned()),
		})
		.unwrap();
		assert_eq!(
			fields,
			ProfileFields {
				pronouns: Some("they/them".to_owned()),
				timezone: Some("UTC+01:00".to_owned()),
				region: None,
				ao3_username: None,
				bio: Some("Writes angst.".to_owned()),
			}
		);

		let too_long = validate(ProfileModal {
			pronouns: Some("x".repeat(41)),
			..ProfileModal::default()
		});
		assert_eq!(too_long, Err("Pronouns can be at most 40 characters.".to_owned()));
	}
}
