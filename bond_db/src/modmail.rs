use anyhow::{Context as _, Result as AResult, bail};
use sqlx::{FromRow, PgExecutor, PgPool, query, query_as};

use crate::unix_now;

#[derive(Clone, Debug, FromRow)]
pub struct ModmailTicket {
	pub id: i64,
	pub guild_id: i64,
	pub user_id: i64,
	pub thread_id: i64,
	pub subject: String,
	pub status: String,
	pub opened_at: i64,
	pub closed_at: Option<i64>,
	pub closed_by: Option<i64>,
}

impl ModmailTicket {
	#[must_use]
	pub fn is_open(&self) -> bool {
		self.status == "open"
	}
}

const COLUMNS: &str =
	"id, guild_id, user_id, thread_id, subject, status, opened_at, closed_at, closed_by";

/// Returns `None` if the user already has an open ticket in this guild
pub async fn open_ticket(
	guild_id: i64,
	user_id: i64,
	thread_id: i64,
	subject: &str,
	conn: impl PgExecutor<'_>,
) -> AResult<Option<ModmailTicket>> {
	query_as::<_, ModmailTicket>(&format!(
		"INSERT INTO modmail_tickets (guild_id, user_id, thread_id, subject, status, opened_at)
            VALUES ($1, $2, $3, $4, 'open', $5)
            ON CONFLICT (guild_id, user_id) WHERE status = 'open'
            DO NOTHING
            RETURNING {COLUMNS}"
	))
	.bind(guild_id)
	.bind(user_id)
	.bind(thread_id)
	.bind(subject)
	.bind(unix_now())
	.fetch_optional(conn)
	.await
	.context("Failed to open modmail ticket")
}

#[derive(Debug)]
pub enum TicketClaim {
	Opened(ModmailTicket),
	/// Another submission opened a ticket first
	Taken(ModmailTicket),
}

/// Opens a ticket on `thread_id`, or returns the open ticket that won the race.
///
/// A winner that was closed before it could be read frees the slot again, so
/// the insert is tried once more.
pub async fn claim_ticket(
	guild_id: i64,
	user_id: i64,
	thread_id: i64,
	subject: &str,
	pool: &PgPool,
) -> AResult<TicketClaim> {
	for _ in 0..2 {
		if let Some(ticket) = open_ticket(guild_id, user_id, thread_id, subject, pool).await? {
			return Ok(TicketClaim::Opened(ticket));
		}
		if let Some(winner) = open_ticket_for_user(guild_id, user_id, pool).await? {
			return Ok(TicketClaim::Taken(winner));
		}
	}
	bail!("Ticket slot for user {user_id} in guild {guild_id} kept changing")
}

pub async fn open_ticket_for_user(
	guild_id: i64,
	user_id: i64,
	conn: impl PgExecutor<'_>,
) -> AResult<Option<ModmailTicket>> {
	query_as::<_, ModmailTicket>(&format!(
		"SELECT {COLUMNS} FROM modmail_tickets
            WHERE guild_id = $1 AND user_id = $2 AND status = 'open'"
	))
	.bind(guild_id)
	.bind(user_id)
	.fetch_optional(conn)
	.await
	.context("Failed to fetch open modmail ticket")
}

pub async fn ticket_by_thread(thread_id: i64, conn: impl PgExecutor<'_>) -> AResult<Option<ModmailTicket>> {
	query_as::<_, ModmailTicket>(&format!(
		"SELECT {COLUMNS} FROM modmail_tickets WHERE thread_id = $1"
	))
	.bind(thread_id)
	.fetch_optional(conn)
	.await
	.context("Failed to fetch modmail ticket by thread")
}

pub async fn close_ticket(id: i64, closed_by: i64, conn: impl PgExecutor<'_>) -> AResult<bool> {
	let result = query(
		"UPDATE modmail_tickets
            SET status = 'closed', closed_at = $3, closed_by = $2
            WHERE id = $1 AND status = 'open'",
	)
	.bind(id)
	.bind(closed_by)
	.bind(unix_now())
	.execute(conn)
	.await
	.context("Failed to close modmail ticket")?;
	Ok(result.rows_affected() > 0)
}

pub async fn log_message(
	ticket_id: i64,
	author_id: i64,
	from_staff: bool,
	content: &str,
	conn: impl PgExecutor<'_>,
) -> AResult<()> {
	query(
		"INSERT INTO modmail_messages (ticket_id, author_id, from_staff, content, sent_at)
            VALUES ($1, $2, $3, $4, $5)",
	)
	.bind(ticket_id)
	.bind(author_id)
	.bind(from_staff)
	.bind(content)
	.bind(unix_now())
	.execute(conn)
	.await
	.context("Failed to log modmail message")?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use sqlx::PgPool;

	use super::{TicketClaim, claim_ticket, close_ticket, open_ticket_for_user};

	#[sqlx::test]
	#[ignore = "needs DATABASE_URL pointing at Postgres"]
	async fn second_claim_gets_the_open_ticket(pool: PgPool) {
		let TicketClaim::Opened(first) = claim_ticket(1, 2, 100, "help", &pool).await.unwrap() else {
			panic!("first claim should open a ticket");
		};
		let TicketClaim::Taken(winner) = claim_ticket(1, 2, 101, "help again", &pool).await.unwrap() else {
			panic!("second claim should see the open ticket");
		};
		assert_eq!(winner.id, first.id);
		assert_eq!(winner.thread_id, 100);
	}

	#[sqlx::test]
	#[ignore = "needs DATABASE_URL pointing at Postgres"]
	async fn closed_tickets_free_the_slot(pool: PgPool) {
		let TicketClaim::Opened(first) = claim_ticket(1, 2, 100, "help", &pool).await.unwrap() else {
			panic!("first claim should open a ticket");
		};
		assert!(close_ticket(first.id, 9, &pool).await.unwrap());
		assert!(!close_ticket(first.id, 9, &pool).await.unwrap());
		assert!(open_ticket_for_user(1, 2, &pool).await.unwrap().is_none());
		assert!(matches!(
			claim_ticket(1, 2, 101, "again", &pool).await.unwrap(),
			TicketClaim::Opened(ticket) if ticket.thread_id == 101
		));
	}
}
