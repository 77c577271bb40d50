use anyhow::{Context as _, Result as AResult};
use sqlx::{FromRow, PgExecutor, query, query_as};

#[derive(Default, Clone, Debug, FromRow)]
pub struct GuildSettings {
	pub guild_id: i64,
	pub rec_channel: Option<i64>,
	pub sprint_channel: Option<i64>,
	pub modmail_channel: Option<i64>,
	pub log_channel: Option<i64>,
}

/// Channels a guild can point the bots at
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelKind {
	Recs,
	Sprints,
	Modmail,
	Log,
}

impl ChannelKind {
	const fn column(self) -> &'static str {
		match self {
			Self::Recs => "rec_channel",
			Self::Sprints => "sprint_channel",
			Self::Modmail => "modmail_channel",
			Self::Log => "log_channel",
		}
	}
}

pub async fn insert_guild(guild_id: i64, conn: impl PgExecutor<'_>) -> AResult<()> {
	query(
		"INSERT INTO guilds (guild_id)
                VALUES ($1)
                ON CONFLICT (guild_id)
                DO NOTHING",
	)
	.bind(guild_id)
	.execute(conn)
	.await
	.context("Failed to insert guild")?;

	Ok(())
}

pub async fn get_guild_settings(
	guild_id: i64,
	conn: impl PgExecutor<'_>,
) -> AResult<GuildSettings> {
	let settings = query_as::<_, GuildSettings>(
		"SELECT guild_id, rec_channel, sprint_channel, modmail_channel, log_channel
            FROM guild_settings
            WHERE guild_id = $1",
	)
	.bind(guild_id)
	.fetch_optional(conn)
	.await
	.context("Failed to fetch guild settings")?;

	Ok(settings.unwrap_or(GuildSettings {
		guild_id,
		..Default::default()
	}))
}

/// The guild must already exist in `guilds`.
pub async fn set_channel(
	guild_id: i64,
	kind: ChannelKind,
	channel_id: Option<i64>,
	conn: impl PgExecutor<'_>,
) -> AResult<()> {
	// column name comes from a closed enum, never from user input
	let column = kind.column();
	query(&format!(
		"INSERT INTO guild_settings (guild_id, {column})
            VALUES ($1, $2)
            ON CONFLICT(guild_id)
            DO UPDATE SET
                {column} = $2"
	))
	.bind(guild_id)
	.bind(channel_id)
	.execute(conn)
	.await
	.context("Failed to set guild channel")?;

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::ChannelKind;

	#[test]
	fn channel_columns_are_distinct() {
		let columns = [
			ChannelKind::Recs.column(),
			ChannelKind::Sprints.column(),
			ChannelKind::Modmail.column(),
			ChannelKind::Log.column(),
		];
		for (i, a) in columns.iter().enumerate() {
			for b in columns.iter().skip(i + 1) {
				assert_ne!(a, b);
			}
		}
	}
}
