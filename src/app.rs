use chrono::Local;
use color_eyre::{eyre::eyre, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::api::{FestaApi, FestaError};
use crate::cache::{NamespaceKind, ResponseStore, SqliteStorage};
use crate::commands::{self, Command, ConsentCommand, FeedbackCommand, ReserveArgs};
use crate::config::Config;
use crate::consent::{self, Consent};
use crate::net::{HttpRequest, HttpTransport, ResilientClient};
use crate::proxy::{LifecycleState, OfflineProxy, ProxyResponse};
use crate::render;
use crate::tables;
use crate::validation::{FeedbackForm, ReservationForm};

type Proxy = OfflineProxy<SqliteStorage, HttpTransport>;

/// Main application state
pub struct App {
  config: Config,
  storage: Arc<SqliteStorage>,
  proxy: Arc<Proxy>,
  /// Backend client; every call goes through the proxy first
  api: FestaApi<Arc<Proxy>>,
}

impl App {
  pub fn new(config: Config, data_dir: &Path) -> Result<Self> {
    let storage = Arc::new(SqliteStorage::open(&data_dir.join("cache.db"))?);
    let network = Arc::new(HttpTransport::new(config.api.timeout())?);
    let proxy = Arc::new(OfflineProxy::new(
      Arc::clone(&storage),
      network,
      config.proxy.clone(),
    ));

    let base_url = config.api.base_url()?;
    info!("Backend at {}", base_url);
    let api = FestaApi::new(
      ResilientClient::new(Arc::clone(&proxy), config.api.retry_policy()),
      base_url,
    );

    Ok(Self {
      config,
      storage,
      proxy,
      api,
    })
  }

  pub async fn run(&self, command: Command) -> Result<()> {
    let result = self.dispatch(command).await;
    // Let background refreshes land in the cache before exiting
    self.proxy.settle().await;
    result
  }

  async fn dispatch(&self, command: Command) -> Result<()> {
    if command.goes_through_proxy() {
      self.ensure_ready().await;
    }

    match command {
      Command::Install => self.install().await,
      Command::Activate => self.activate().await,
      Command::Status { entries } => self.status(entries).await,
      Command::Fetch { target, body } => self.fetch(&target, body).await,
      Command::Tables { date, time } => self.tables(date, time).await,
      Command::Reserve(args) => self.reserve(args).await,
      Command::Remind { contact } => self.remind(&contact).await,
      Command::Feedback(sub) => self.feedback(sub).await,
      Command::Menu => {
        let menu = self.api.menu().await.map_err(user_facing)?;
        print!("{}", render::menu(&menu));
        Ok(())
      }
      Command::Events => {
        let events = self.api.events().await.map_err(user_facing)?;
        print!("{}", render::events(&events));
        Ok(())
      }
      Command::Consent(sub) => self.consent(sub),
    }
  }

  /// Put the proxy in front of the network, installing this version if needed.
  ///
  /// A failed install leaves requests going straight to the network.
  async fn ensure_ready(&self) {
    match self.proxy.resume().await {
      Ok(true) => {}
      Ok(false) => {
        if let Err(e) = self.proxy.start().await {
          warn!("Offline cache unavailable: {:#}", e);
        }
      }
      Err(e) => warn!("Could not read cache state: {:#}", e),
    }
  }

  async fn install(&self) -> Result<()> {
    self.proxy.install().await?;
    println!(
      "Installata la versione {} della cache ({} risorse critiche)",
      self.config.proxy.version,
      self.storage.entry_count(&self.proxy.namespace(NamespaceKind::Static).name())?
    );
    Ok(())
  }

  async fn activate(&self) -> Result<()> {
    if !self.proxy.adopt_installed().await? {
      self.proxy.install().await?;
    }
    let purged = self.proxy.activate().await?;

    println!("Attiva la versione {} della cache", self.config.proxy.version);
    for name in purged {
      println!("  rimossa {}", name);
    }
    Ok(())
  }

  async fn status(&self, show_entries: bool) -> Result<()> {
    let state = if self.proxy.resume().await? {
      self.proxy.state().await
    } else {
      LifecycleState::Parsed
    };
    let policy = self.api.retry_policy();

    println!("Backend:   {}", self.api.base_url());
    println!(
      "Tentativi: {} (attesa base {:?})",
      policy.max_attempts, policy.base_delay
    );
    println!("Versione:  {}", self.config.proxy.version);
    println!(
      "Stato:     {:?}{}",
      state,
      if self.proxy.controls_clients() { ", in controllo" } else { "" }
    );

    println!("Cache:");
    for name in self.storage.namespaces()? {
      println!("  {:<32} {} voci", name, self.storage.entry_count(&name)?);
      if show_entries {
        for key in self.storage.keys(&name)? {
          println!("    {}", key);
        }
      }
    }

    let consent = consent::load(self.storage.as_ref())?;
    println!(
      "Cookie:    {}",
      consent.map(|c| c.to_string()).unwrap_or_else(|| "nessuna scelta".to_string())
    );
    Ok(())
  }

  async fn fetch(&self, target: &str, show_body: bool) -> Result<()> {
    let url = commands::resolve_target(&self.config.proxy.origin, target)
      .map_err(|e| eyre!("Invalid URL '{}': {}", target, e))?;
    let request = HttpRequest::get(url);

    let ProxyResponse { response, source } = self.proxy.respond(&request).await?;

    let class = self.proxy.router().classify(&request.url, &self.config.proxy.origin);
    println!("{} {} ({:?}, {})", response.status, response.status_text, source, class);
    if show_body {
      if let Some(content_type) = response.header("content-type") {
        println!("Content-Type: {}", content_type);
      }
      println!("{}", response.text());
    }
    Ok(())
  }

  async fn tables(&self, date: Option<String>, time: Option<String>) -> Result<()> {
    let ids = &self.config.tables.ids;

    let views = match (date, time) {
      (Some(date), Some(time)) => match self.api.table_availability(&date, &time).await {
        Ok(seats) => tables::from_availability(ids, &seats),
        Err(e @ FestaError::Invalid(_)) => return Err(user_facing(e)),
        Err(e) => {
          warn!("Failed to load table availability: {}", e);
          tables::load_failed(ids)
        }
      },
      _ => tables::awaiting_selection(ids),
    };

    print!("{}", render::tables(&views));
    Ok(())
  }

  async fn reserve(&self, args: ReserveArgs) -> Result<()> {
    let form = ReservationForm {
      table: args.table,
      name: args.name,
      phone: args.phone,
      date: args.date,
      time: args.time,
      guests: args.guests,
      notes: args.notes,
      privacy_consent: args.accept_privacy,
    };
    let today = Local::now().date_naive();

    self.api.reserve(&form, today).await.map_err(user_facing)?;

    println!(
      "Prenotazione confermata! Tavolo {} il {} alle {}.",
      form.table.as_deref().unwrap_or_default(),
      render::format_date(&form.date),
      form.time.trim()
    );
    Ok(())
  }

  async fn remind(&self, contact: &str) -> Result<()> {
    match self.api.request_reminder(contact).await {
      Ok(()) => {}
      // The request is best effort; connection trouble is not shown as failure
      Err(e @ (FestaError::Network(_) | FestaError::Offline)) => {
        warn!("Reminder request not delivered: {}", e);
      }
      Err(e) => return Err(user_facing(e)),
    }

    println!("Promemoria registrato! Ti avviseremo prima dell'evento.");
    Ok(())
  }

  async fn feedback(&self, command: FeedbackCommand) -> Result<()> {
    match command {
      FeedbackCommand::List { limit } => {
        let entries = self.api.feedback(limit).await.map_err(user_facing)?;
        print!("{}", render::feedback(&entries));
      }
      FeedbackCommand::Send { rating, message, name } => {
        let form = FeedbackForm { name, rating, message };
        self.api.submit_feedback(&form).await.map_err(user_facing)?;
        println!("Grazie per il tuo feedback!");
      }
    }
    Ok(())
  }

  fn consent(&self, command: ConsentCommand) -> Result<()> {
    let choice = match command {
      ConsentCommand::Show => {
        match consent::load(self.storage.as_ref())? {
          Some(c) => println!("{}", c),
          None => println!("nessuna scelta"),
        }
        return Ok(());
      }
      ConsentCommand::Accept => Consent::Accepted,
      ConsentCommand::Decline => Consent::Declined,
    };

    consent::save(self.storage.as_ref(), choice)?;
    println!("{}", choice);
    Ok(())
  }
}

/// Log the full error and surface only the message meant for users.
fn user_facing(e: FestaError) -> color_eyre::Report {
  warn!("{}", e);
  eyre!(e.user_message())
}
