use bond_core::config::types::{Data, Error, Feature};
use poise::Command;

mod misc;
mod moderation;
mod modmail;
mod profile;
mod prompts;
mod recs;
mod sprint;

/// Commands for a bot with `features`, plus the ones every bot has
#[must_use]
pub fn commands(features: &[Feature]) -> Vec<Command<Data, Error>> {
	let mut commands = vec![
		misc::help(),
		misc::register_commands(),
		moderation::settings(),
	];
	for feature in features {
		match feature {
			Feature::Recs => commands.extend([recs::rec(), recs::series(), recs::queue()]),
			Feature::Profiles => commands.push(profile::profile()),
			Feature::Sprints => commands.push(sprint::sprint()),
			Feature::Moderation => commands.extend([
				moderation::lock_user(),
				moderation::unlock_user(),
				moderation::list_locks(),
				moderation::permissions(),
			]),
			Feature::Modmail => commands.push(modmail::modmail()),
		}
	}
	commands
}

#[cfg(test)]
mod tests {
	use bond_core::config::types::Feature;

	use super::commands;

	fn names(features: &[Feature]) -> Vec<String> {
		commands(features).into_iter().map(|cmd| cmd.name).collect()
	}

	#[test]
	fn every_bot_gets_the_basics() {
		assert_eq!(names(&[]), ["help", "register", "settings"]);
	}

	#[test]
	fn features_add_their_commands() {
		let names = names(&[Feature::Recs, Feature::Moderation]);
		for expected in ["rec", "series", "queue", "lock", "unlock", "locks", "permissions"] {
			assert!(names.iter().any(|name| name == expected), "missing {expected}");
		}
		assert!(!names.iter().any(|name| name == "sprint" || name == "modmail"));
	}

	#[test]
	fn every_feature_registers_something() {
		assert_eq!(names(&Feature::ALL).len(), 13);
	}
}
