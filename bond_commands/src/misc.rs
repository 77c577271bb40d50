use bond_core::config::{
	constants::{COLOUR_BLUE, COLOUR_YELLOW},
	types::{Error, SContext},
};
use poise::{Command, CreateReply, builtins::register_globally};
use serenity::all::CreateEmbed;

fn command_line<U, E>(command: &Command<U, E>) -> String {
	let description = command.description.as_deref().unwrap_or("");
	if command.subcommands.is_empty() {
		return format!("`/{}` {description}", command.name);
	}
	command
		.subcommands
		.iter()
		.map(|sub| {
			format!(
				"`/{} {}` {}",
				command.name,
				sub.name,
				sub.description.as_deref().unwrap_or("")
			)
		})
		.collect::<Vec<_>>()
		.join("\n")
}

async fn autocomplete_command<'a>(
	ctx: SContext<'_>,
	partial: &'a str,
) -> impl Iterator<Item = String> + 'a {
	ctx.framework()
		.options()
		.commands
		.iter()
		.filter(|cmd| !cmd.owners_only && cmd.name.starts_with(partial))
		.map(|cmd| cmd.name.clone())
		.collect::<Vec<_>>()
		.into_iter()
}

/// What this bot can do
#[poise::command(slash_command)]
pub async fn help(
	ctx: SContext<'_>,
	#[description = "Command to get help with"]
	#[autocomplete = "autocomplete_command"]
	command: Option<String>,
) -> Result<(), Error> {
	let commands = &ctx.framework().options().commands;
	let embed = if let Some(name) = command {
		match commands.iter().find(|cmd| cmd.name == name) {
			Some(cmd) => CreateEmbed::default()
				.title(format!("Help: /{}", cmd.name))
				.description(command_line(cmd))
				.colour(COLOUR_YELLOW),
			None => CreateEmbed::default()
				.title("Help")
				.description(format!("There's no `/{name}` here."))
				.colour(COLOUR_YELLOW),
		}
	} else {
		CreateEmbed::default()
			.title(format!("{} commands", ctx.data().bot.name))
			.description(
				commands
					.iter()
					.filter(|cmd| !cmd.owners_only)
					.map(command_line)
					.collect::<Vec<_>>()
					.join("\n"),
			)
			.colour(COLOUR_BLUE)
	};
	ctx.send(CreateReply::default().embed(embed).ephemeral(true))
		.await?;
	Ok(())
}

#[poise::command(slash_command, rename = "register", owners_only, hide_in_help)]
pub async fn register_commands(ctx: SContext<'_>) -> Result<(), Error> {
	let commands = &ctx.framework().options().commands;
	register_globally(ctx.http(), commands).await?;
	ctx.say(format!("Registered {} commands.", commands.len()))
		.await?;
	Ok(())
}
