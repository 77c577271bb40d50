pub mod helpers;
pub mod modmail;
pub mod permissions;
