//! Command line subcommands.

use clap::{Args, Subcommand};
use url::Url;

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Pre-cache the site's assets for the configured cache version
  Install,

  /// Purge caches of older versions and start serving from the current one
  Activate,

  /// Show proxy state, cache namespaces and cookie consent
  Status {
    /// List the cached URLs of every namespace
    #[arg(short, long)]
    entries: bool,
  },

  /// Fetch a URL through the offline proxy
  Fetch {
    /// Absolute URL, or a path relative to the site origin
    target: String,

    /// Print the response body
    #[arg(short, long)]
    body: bool,
  },

  /// Show table availability for a date and time
  Tables {
    /// Date as YYYY-MM-DD
    #[arg(short, long)]
    date: Option<String>,

    /// Time as HH:MM
    #[arg(short, long)]
    time: Option<String>,
  },

  /// Book a table
  Reserve(ReserveArgs),

  /// Ask for an event reminder by email or SMS
  Remind {
    /// Email address or Italian mobile number
    contact: String,
  },

  /// Read or leave feedback
  #[command(subcommand)]
  Feedback(FeedbackCommand),

  /// Show the menu grouped by category
  Menu,

  /// Show upcoming events
  Events,

  /// Read or answer the cookie consent prompt
  #[command(subcommand)]
  Consent(ConsentCommand),
}

impl Command {
  /// Lifecycle and local commands manage the proxy themselves.
  pub fn goes_through_proxy(&self) -> bool {
    !matches!(
      self,
      Command::Install | Command::Activate | Command::Status { .. } | Command::Consent(_)
    )
  }
}

#[derive(Args, Debug)]
pub struct ReserveArgs {
  #[arg(long)]
  pub table: Option<String>,

  #[arg(long)]
  pub name: String,

  #[arg(long)]
  pub phone: String,

  /// Date as YYYY-MM-DD
  #[arg(long)]
  pub date: String,

  /// Time as HH:MM
  #[arg(long)]
  pub time: String,

  #[arg(long)]
  pub guests: String,

  #[arg(long, default_value = "")]
  pub notes: String,

  /// Accept the privacy policy
  #[arg(long)]
  pub accept_privacy: bool,
}

#[derive(Subcommand, Debug)]
pub enum FeedbackCommand {
  /// Latest feedback
  List {
    #[arg(short, long, default_value_t = 10)]
    limit: u32,
  },

  /// Leave a rating and a message
  Send {
    /// Stars from 1 to 5
    #[arg(short, long)]
    rating: u8,

    message: String,

    #[arg(short, long, default_value = "")]
    name: String,
  },
}

#[derive(Subcommand, Debug)]
pub enum ConsentCommand {
  Show,
  Accept,
  Decline,
}

/// Resolve a `fetch` target against the site origin.
pub fn resolve_target(origin: &Url, target: &str) -> Result<Url, url::ParseError> {
  match Url::parse(target) {
    Ok(url) => Ok(url),
    Err(url::ParseError::RelativeUrlWithoutBase) => origin.join(target),
    Err(e) => Err(e),
  }
}
