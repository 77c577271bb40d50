pub const COLOUR_BLUE: u32 = 0x0000_B0F4;
pub const COLOUR_GREEN: u32 = 0x0033_D17A;
pub const COLOUR_ORANGE: u32 = 0x00FA_6300;
pub const COLOUR_RED: u32 = 0x00ED_333B;
pub const COLOUR_YELLOW: u32 = 0x00F8_E45C;

pub const AO3_HOSTS: &[&str] = &[
	"archiveofourown.org",
	"archiveofourown.com",
	"archiveofourown.net",
	"ao3.org",
];

pub const EMBED_DESCRIPTION_LIMIT: usize = 4096;
pub const EMBED_FIELD_LIMIT: usize = 1024;
pub const SUMMARY_PREVIEW_LIMIT: usize = 700;
pub const TAG_PREVIEW_LIMIT: usize = 12;
pub const SEARCH_PAGE_SIZE: i64 = 5;

pub const PRONOUNS_LIMIT: usize = 40;
pub const TIMEZONE_LIMIT: usize = 12;
pub const REGION_LIMIT: usize = 60;
pub const BIO_LIMIT: usize = 1000;
pub const NOTES_LIMIT: usize = 500;

pub const SPRINT_MIN_MINUTES: u32 = 1;
pub const SPRINT_MAX_MINUTES: u32 = 120;
pub const SPRINT_MAX_DELAY_MINUTES: u32 = 30;
pub const SPRINT_COLLECT_SECS: i64 = 300;

/// Custom id of the persistent "open ticket" button
pub const MODMAIL_OPEN_BUTTON: &str = "modmail:open";
/// Custom id of the ticket modal; the guild id is appended after the colon
pub const MODMAIL_MODAL_PREFIX: &str = "modmail:modal:";
pub const MODMAIL_SUBJECT_INPUT: &str = "modmail_subject";
pub const MODMAIL_BODY_INPUT: &str = "modmail_body";
/// Staff messages starting with this stay inside the thread
pub const MODMAIL_INTERNAL_PREFIX: char = '#';
