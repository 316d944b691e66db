//! Chat command layer.
//!
//! Parses the bot's slash commands and turns them into store updates or
//! on-demand refreshes. Every handler answers with the reply texts to send
//! back to the chat; change notifications raised by a refresh go out
//! through the cycle's notifier before the reply.

use std::sync::Arc;

use gradewatch_obs::GradeSource;
use tracing::{error, warn};

use crate::grades::format::{NO_SUCH_COURSE, course_replies, summary_reply};
use crate::reconcile::AbortReason;
use crate::scheduler::FleetScheduler;
use crate::store::{SnapshotStore, UserKey};

pub const WELCOME: &str = "Welcome to the ESTU Grade Checker!\n\
Use /cookie <cookie> to set your cookie.\n\
Use /donemid <donemid> to set your donemid.\n\
Use /alarm <true/false> to enable/disable alarms.\n\
Use /get to get your grades.\n\
Use /get <course> to get grades for a specific course.\n\
\n\
Note: You cannot use /get until both cookie and donemid are set.";

pub const GENERIC_ERROR: &str = "An error occurred. Please try again later.";
pub const NOT_CONFIGURED: &str =
    "You need to set both cookie and donemid before using this command.";
pub const FETCH_FAILED: &str = "Failed to fetch grades.";
pub const SNAPSHOT_SAVE_FAILED: &str = "Failed to update grades in the database.";

const COOKIE_MISSING: &str = "Please provide a valid cookie.";
const COOKIE_UPDATED: &str = "Cookie updated successfully.";
const COOKIE_FAILED: &str = "Failed to update your cookie. Please try again.";
const DONEMID_MISSING: &str = "Please provide a valid donemid.";
const DONEMID_UPDATED: &str = "DonemID updated successfully.";
const DONEMID_FAILED: &str = "Failed to update your donemID. Please try again.";
const ALARM_INVALID: &str = "Please provide a valid value for alarm (true/false).";
const ALARM_NO_USER: &str = "Please set your cookie and donemid first.";
const ALARM_UPDATED: &str = "Alarm preference updated successfully.";
const ALARM_FAILED: &str = "Failed to update alarm setting. Please try again.";

/// A recognised bot command with its trimmed argument text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Cookie(String),
    DonemId(String),
    Alarm(String),
    /// `/get` with an optional course prefix (empty when absent).
    Get(String),
}

impl Command {
    /// Parse a chat message. `None` for plain text and unknown commands.
    ///
    /// Accepts the `/cmd@botname` form Telegram uses in groups.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let rest = text.strip_prefix('/')?;
        let (head, args) = match rest.find(char::is_whitespace) {
            Some(idx) => (&rest[..idx], rest[idx..].trim()),
            None => (rest, ""),
        };
        let name = head.split_once('@').map_or(head, |(name, _)| name);
        let args = args.to_owned();

        match name {
            "start" => Some(Self::Start),
            "cookie" => Some(Self::Cookie(args)),
            "donemid" => Some(Self::DonemId(args)),
            "alarm" => Some(Self::Alarm(args)),
            "get" => Some(Self::Get(args)),
            _ => None,
        }
    }

    /// Command name without arguments, safe to log.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Cookie(_) => "cookie",
            Self::DonemId(_) => "donemid",
            Self::Alarm(_) => "alarm",
            Self::Get(_) => "get",
        }
    }

    /// Commands that hit the OBS and may take a while.
    #[must_use]
    pub fn is_slow(&self) -> bool {
        matches!(self, Self::Get(_))
    }
}

/// Boolean spellings accepted by `/alarm`.
fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

/// Executes parsed commands for one user.
pub struct CommandHandler<F> {
    store: Arc<dyn SnapshotStore>,
    fleet: FleetScheduler<F>,
}

impl<F> Clone for CommandHandler<F> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            fleet: self.fleet.clone(),
        }
    }
}

impl<F: GradeSource + 'static> CommandHandler<F> {
    pub fn new(store: Arc<dyn SnapshotStore>, fleet: FleetScheduler<F>) -> Self {
        Self { store, fleet }
    }

    /// Parse and run `text`. Non-commands produce no replies.
    pub async fn handle_text(&self, user: UserKey, text: &str) -> Vec<String> {
        match Command::parse(text) {
            Some(command) => self.handle(user, command).await,
            None => Vec::new(),
        }
    }

    pub async fn handle(&self, user: UserKey, command: Command) -> Vec<String> {
        match command {
            Command::Start => vec![WELCOME.to_owned()],
            Command::Cookie(cookie) => vec![self.set_cookie(user, &cookie).to_owned()],
            Command::DonemId(term) => vec![self.set_term(user, &term).to_owned()],
            Command::Alarm(value) => vec![self.set_alarm(user, &value).to_owned()],
            Command::Get(prefix) => self.get(user, &prefix).await,
        }
    }

    fn set_cookie(&self, user: UserKey, cookie: &str) -> &'static str {
        if cookie.is_empty() {
            return COOKIE_MISSING;
        }
        match self.store.set_credential(user, cookie) {
            Ok(()) => COOKIE_UPDATED,
            Err(err) => {
                error!(user = %user, error = %err, "failed to store cookie");
                COOKIE_FAILED
            }
        }
    }

    fn set_term(&self, user: UserKey, term: &str) -> &'static str {
        if term.is_empty() {
            return DONEMID_MISSING;
        }
        match self.store.set_term(user, term) {
            Ok(()) => DONEMID_UPDATED,
            Err(err) => {
                error!(user = %user, error = %err, "failed to store donemid");
                DONEMID_FAILED
            }
        }
    }

    fn set_alarm(&self, user: UserKey, value: &str) -> &'static str {
        let Some(enabled) = parse_bool(value) else {
            return ALARM_INVALID;
        };
        match self.store.set_alarm(user, enabled) {
            Ok(true) => ALARM_UPDATED,
            Ok(false) => ALARM_NO_USER,
            Err(err) => {
                error!(user = %user, error = %err, "failed to store alarm preference");
                ALARM_FAILED
            }
        }
    }

    async fn get(&self, user: UserKey, prefix: &str) -> Vec<String> {
        match self.store.get(user) {
            Ok(Some(record)) if record.is_configured() => {}
            Ok(_) => return vec![NOT_CONFIGURED.to_owned()],
            Err(err) => {
                error!(user = %user, error = %err, "failed to load user");
                return vec![GENERIC_ERROR.to_owned()];
            }
        }

        let table = match self.fleet.trigger_on_demand(user).await {
            Ok(table) => table,
            // The cycle already sent the fetch advisory.
            Err(AbortReason::Fetch(_)) => return Vec::new(),
            Err(AbortReason::UnknownUser | AbortReason::NotConfigured) => {
                return vec![NOT_CONFIGURED.to_owned()];
            }
            Err(AbortReason::Store(_)) => return vec![SNAPSHOT_SAVE_FAILED.to_owned()],
            Err(AbortReason::Cancelled) => {
                warn!(user = %user, "on-demand refresh did not finish in time");
                return vec![FETCH_FAILED.to_owned()];
            }
        };

        if prefix.is_empty() {
            return vec![summary_reply(&table)];
        }
        let replies = course_replies(&table, prefix);
        if replies.is_empty() {
            vec![NO_SUCH_COURSE.to_owned()]
        } else {
            replies
        }
    }
}
