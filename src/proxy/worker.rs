//! The offline proxy: namespace lifecycle plus per-request caching strategies.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use futures::future::try_join_all;
use reqwest::Method;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::routes::{has_extension, Router, Strategy};
use crate::cache::{Namespace, NamespaceKind, ResponseStore};
use crate::config::ProxyConfig;
use crate::net::{CacheMode, HttpRequest, HttpResponse, NetworkError, Transport};

/// Body of the synthetic response served for API calls while offline.
pub const OFFLINE_MESSAGE: &str = "Offline - Funzionalità non disponibile";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
  Parsed,
  Installing,
  Installed,
  Activating,
  Activated,
  /// Install failed; this instance never serves
  Redundant,
}

/// Where a proxied response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  Network,
  Cache,
  /// Synthetic 503 built by the proxy
  Offline,
}

#[derive(Debug, Clone)]
pub struct ProxyResponse {
  pub response: HttpResponse,
  pub source: ResponseSource,
}

impl ProxyResponse {
  fn network(response: HttpResponse) -> Self {
    Self {
      response,
      source: ResponseSource::Network,
    }
  }

  fn cache(response: HttpResponse) -> Self {
    Self {
      response,
      source: ResponseSource::Cache,
    }
  }
}

/// Result of intercepting a request.
#[derive(Debug)]
pub enum FetchOutcome {
  /// Not intercepted; the caller goes to the network itself
  Bypass,
  Respond(ProxyResponse),
  /// Network failed and nothing was cached
  NoResponse,
  /// Network failed on a cache miss
  Failed(NetworkError),
}

/// Sits between callers and the network, answering from a versioned cache.
pub struct OfflineProxy<S, N> {
  storage: Arc<S>,
  network: Arc<N>,
  config: ProxyConfig,
  router: Router,
  static_ns: Namespace,
  image_ns: Namespace,
  state: Mutex<LifecycleState>,
  controls_clients: AtomicBool,
  background: Mutex<JoinSet<()>>,
}

impl<S, N> OfflineProxy<S, N>
where
  S: ResponseStore + 'static,
  N: Transport + 'static,
{
  pub fn new(storage: Arc<S>, network: Arc<N>, config: ProxyConfig) -> Self {
    let router = Router::site_default(&config.api_prefix);
    Self::with_router(storage, network, config, router)
  }

  pub fn with_router(storage: Arc<S>, network: Arc<N>, config: ProxyConfig, router: Router) -> Self {
    let static_ns = Namespace::new(&config.cache_prefix, NamespaceKind::Static, &config.version);
    let image_ns = Namespace::new(&config.cache_prefix, NamespaceKind::Images, &config.version);

    Self {
      storage,
      network,
      config,
      router,
      static_ns,
      image_ns,
      state: Mutex::new(LifecycleState::Parsed),
      controls_clients: AtomicBool::new(false),
      background: Mutex::new(JoinSet::new()),
    }
  }

  pub async fn state(&self) -> LifecycleState {
    *self.state.lock().await
  }

  pub fn controls_clients(&self) -> bool {
    self.controls_clients.load(Ordering::SeqCst)
  }

  pub fn namespace(&self, kind: NamespaceKind) -> &Namespace {
    match kind {
      NamespaceKind::Static => &self.static_ns,
      NamespaceKind::Images => &self.image_ns,
    }
  }

  pub fn router(&self) -> &Router {
    &self.router
  }

  async fn transition(&self, from: LifecycleState, to: LifecycleState) -> Result<()> {
    let mut state = self.state.lock().await;
    if *state != from {
      return Err(eyre!("Cannot move proxy to {:?} while {:?}", to, *state));
    }
    *state = to;
    Ok(())
  }

  async fn set_state(&self, to: LifecycleState) {
    *self.state.lock().await = to;
  }

  /// Install then activate.
  pub async fn start(&self) -> Result<Vec<String>> {
    self.install().await?;
    self.activate().await
  }

  /// Take over when an earlier run already installed this version.
  ///
  /// Activation still runs, so stale versions are purged. Returns false when
  /// a fresh install is needed.
  pub async fn resume(&self) -> Result<bool> {
    if !self.adopt_installed().await? {
      return Ok(false);
    }

    self.activate().await?;
    debug!("Resumed cache version {}", self.config.version);
    Ok(true)
  }

  /// Pick up an install left behind by an earlier run so it can be activated.
  ///
  /// The static namespace only exists once its manifest was stored in full.
  /// Returns false when nothing is installed for this version.
  pub async fn adopt_installed(&self) -> Result<bool> {
    if !self.storage.namespaces()?.contains(&self.static_ns.name()) {
      return Ok(false);
    }

    self.transition(LifecycleState::Parsed, LifecycleState::Installed).await?;
    Ok(true)
  }

  /// Pre-cache the critical and image manifests.
  ///
  /// Critical assets are fetched bypassing HTTP caches and stored all or
  /// nothing; their failure fails the install. Image failures are only logged.
  pub async fn install(&self) -> Result<()> {
    self.transition(LifecycleState::Parsed, LifecycleState::Installing).await?;
    info!("Installing cache version {}", self.config.version);

    let static_name = self.static_ns.name();
    let image_name = self.image_ns.name();
    let (critical, images) = tokio::join!(
      self.add_all(&static_name, &self.config.critical_assets, CacheMode::Reload),
      self.add_all(&image_name, &self.config.image_assets, CacheMode::Default),
    );

    if let Err(e) = images {
      warn!("Image pre-cache failed: {}", e);
    }

    match critical {
      Ok(count) => {
        info!("Cached {} critical assets in {}", count, static_name);
        // Skip waiting: the new version is eligible for activation right away
        self.set_state(LifecycleState::Installed).await;
        Ok(())
      }
      Err(e) => {
        self.set_state(LifecycleState::Redundant).await;
        Err(e.wrap_err("Failed to pre-cache critical assets"))
      }
    }
  }

  /// Fetch a manifest and store it in one transaction, which also creates
  /// the namespace.
  async fn add_all(&self, namespace: &str, manifest: &[String], mode: CacheMode) -> Result<usize> {
    let requests = manifest
      .iter()
      .map(|entry| {
        self
          .config
          .origin
          .join(entry)
          .map(|url| HttpRequest::get(url).with_cache_mode(mode))
          .map_err(|e| eyre!("Invalid manifest entry '{}': {}", entry, e))
      })
      .collect::<Result<Vec<_>>>()?;

    let entries = try_join_all(requests.iter().map(|request| async move {
      let response = self
        .network
        .send(request)
        .await
        .map_err(|e| eyre!("Failed to fetch {}: {}", request.url, e))?;
      if !response.is_ok() {
        return Err(eyre!("Fetching {} returned {}", request.url, response.status));
      }
      Ok((request.cache_key().to_string(), response))
    }))
    .await?;

    self.storage.put_all(namespace, &entries)?;
    Ok(entries.len())
  }

  /// Purge namespaces of older versions and take control of clients.
  ///
  /// Returns the names of the purged namespaces.
  pub async fn activate(&self) -> Result<Vec<String>> {
    self.transition(LifecycleState::Installed, LifecycleState::Activating).await?;
    info!("Activating cache version {}", self.config.version);

    let current = [self.static_ns.name(), self.image_ns.name()];
    let mut purged = Vec::new();

    for name in self.storage.namespaces()? {
      if name.starts_with(&self.config.cache_prefix) && !current.contains(&name) {
        info!("Removing stale cache {}", name);
        self.storage.delete_namespace(&name)?;
        purged.push(name);
      }
    }

    self.set_state(LifecycleState::Activated).await;
    self.controls_clients.store(true, Ordering::SeqCst);
    Ok(purged)
  }

  /// Decide how to answer a request.
  pub async fn handle_fetch(&self, request: &HttpRequest) -> Result<FetchOutcome> {
    if self.state().await != LifecycleState::Activated {
      return Ok(FetchOutcome::Bypass);
    }
    if request.method != Method::GET {
      return Ok(FetchOutcome::Bypass);
    }

    let Some(route) = self.router.route(&request.url, &self.config.origin) else {
      return Ok(FetchOutcome::Bypass);
    };
    debug!("{} request {}", route.class, request.url);

    match &route.strategy {
      Strategy::NetworkWithOfflineFallback => Ok(self.network_with_offline_fallback(request).await),
      Strategy::CacheFirstRevalidate(kind) => self.cache_first(request, *kind).await,
      Strategy::NetworkFirstStoreAssets { extensions } => {
        match self.network.send(request).await {
          Ok(response) => {
            if response.is_ok() && has_extension(&request.url, extensions) {
              self.store(&self.static_ns.name(), request, &response);
            }
            Ok(FetchOutcome::Respond(ProxyResponse::network(response)))
          }
          Err(e) => {
            debug!("Network failed for {}: {}", request.url, e);
            self.any_cached(request)
          }
        }
      }
      Strategy::NetworkFirst => match self.network.send(request).await {
        Ok(response) => Ok(FetchOutcome::Respond(ProxyResponse::network(response))),
        Err(e) => {
          debug!("Network failed for {}: {}", request.url, e);
          self.any_cached(request)
        }
      },
    }
  }

  /// Answer a request the way a page sees it: bypassed requests go to the
  /// network, and a fetch with no response at all is an error.
  pub async fn respond(&self, request: &HttpRequest) -> std::result::Result<ProxyResponse, NetworkError> {
    let outcome = self.handle_fetch(request).await.map_err(|e| NetworkError::Cache {
      url: request.url.to_string(),
      message: e.to_string(),
    })?;

    match outcome {
      FetchOutcome::Bypass => self.network.send(request).await.map(ProxyResponse::network),
      FetchOutcome::Respond(proxied) => Ok(proxied),
      FetchOutcome::NoResponse => Err(NetworkError::NoResponse {
        url: request.url.to_string(),
      }),
      FetchOutcome::Failed(e) => Err(e),
    }
  }

  async fn network_with_offline_fallback(&self, request: &HttpRequest) -> FetchOutcome {
    match self.network.send(request).await {
      Ok(response) if response.is_ok() => FetchOutcome::Respond(ProxyResponse::network(response)),
      Ok(response) => {
        debug!("{} returned {}, serving offline response", request.url, response.status);
        FetchOutcome::Respond(offline_response())
      }
      Err(e) => {
        debug!("{} unreachable ({}), serving offline response", request.url, e);
        FetchOutcome::Respond(offline_response())
      }
    }
  }

  async fn cache_first(&self, request: &HttpRequest, kind: NamespaceKind) -> Result<FetchOutcome> {
    let namespace = self.namespace(kind).name();

    if let Some(cached) = self.storage.get(&namespace, request.cache_key())? {
      self.revalidate_in_background(namespace, request.clone()).await;
      return Ok(FetchOutcome::Respond(ProxyResponse::cache(cached.response)));
    }

    match self.network.send(request).await {
      Ok(response) => {
        if response.is_ok() {
          self.store(&namespace, request, &response);
        }
        Ok(FetchOutcome::Respond(ProxyResponse::network(response)))
      }
      Err(e) => Ok(FetchOutcome::Failed(e)),
    }
  }

  fn any_cached(&self, request: &HttpRequest) -> Result<FetchOutcome> {
    Ok(match self.storage.find(request.cache_key())? {
      Some(cached) => FetchOutcome::Respond(ProxyResponse::cache(cached.response)),
      None => FetchOutcome::NoResponse,
    })
  }

  /// Cache writes never affect the response being served.
  fn store(&self, namespace: &str, request: &HttpRequest, response: &HttpResponse) {
    if let Err(e) = self.storage.put(namespace, request.cache_key(), response) {
      warn!("Failed to cache {}: {}", request.url, e);
    }
  }

  async fn revalidate_in_background(&self, namespace: String, request: HttpRequest) {
    let storage = Arc::clone(&self.storage);
    let network = Arc::clone(&self.network);

    let mut tasks = self.background.lock().await;
    // Reap finished refreshes
    while tasks.try_join_next().is_some() {}

    tasks.spawn(async move {
      match network.send(&request).await {
        Ok(response) if response.is_ok() => {
          if let Err(e) = storage.put(&namespace, request.cache_key(), &response) {
            warn!("Failed to refresh {}: {}", request.url, e);
          }
        }
        Ok(response) => debug!("Refresh of {} returned {}, keeping cached copy", request.url, response.status),
        Err(e) => debug!("Refresh of {} failed: {}", request.url, e),
      }
    });
  }

  /// Wait for outstanding background refreshes.
  pub async fn settle(&self) {
    let mut tasks = std::mem::take(&mut *self.background.lock().await);
    while let Some(result) = tasks.join_next().await {
      if let Err(e) = result {
        warn!("Background refresh task failed: {}", e);
      }
    }
  }
}

fn offline_response() -> ProxyResponse {
  let body = json!({ "error": OFFLINE_MESSAGE, "offline": true });
  let response = HttpResponse::new(503, body.to_string()).with_header("Content-Type", "application/json");

  ProxyResponse {
    response,
    source: ResponseSource::Offline,
  }
}

#[async_trait]
impl<S, N> Transport for OfflineProxy<S, N>
where
  S: ResponseStore + 'static,
  N: Transport + 'static,
{
  async fn send(&self, request: &HttpRequest) -> std::result::Result<HttpResponse, NetworkError> {
    self.respond(request).await.map(|proxied| proxied.response)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::SqliteStorage;
  use crate::net::mock::{MockReply, MockTransport};
  use std::time::Duration;
  use tokio::sync::Notify;
  use url::Url;

  const SITE: &str = "https://festadellosport.onrender.com";

  fn config(version: &str) -> ProxyConfig {
    ProxyConfig {
      origin: Url::parse(SITE).unwrap(),
      version: version.to_string(),
      critical_assets: vec!["/".to_string(), "/css/style.css".to_string()],
      image_assets: vec!["/assets/images/logo.png".to_string()],
      ..ProxyConfig::default()
    }
  }

  fn url(path: &str) -> String {
    format!("{}{}", SITE, path)
  }

  fn get(raw: &str) -> HttpRequest {
    HttpRequest::get(Url::parse(raw).unwrap())
  }

  fn serve_manifest(mock: &MockTransport) {
    mock.route(&url("/"), MockReply::ok("<html>home</html>"));
    mock.route(&url("/css/style.css"), MockReply::ok("body{}"));
    mock.route(&url("/assets/images/logo.png"), MockReply::ok("png-v1"));
  }

  type TestProxy = OfflineProxy<SqliteStorage, MockTransport>;

  async fn running_proxy() -> (TestProxy, Arc<SqliteStorage>, Arc<MockTransport>) {
    let storage = Arc::new(SqliteStorage::in_memory().unwrap());
    let mock = Arc::new(MockTransport::new());
    serve_manifest(&mock);

    let proxy = OfflineProxy::new(Arc::clone(&storage), Arc::clone(&mock), config("v2"));
    proxy.start().await.unwrap();
    (proxy, storage, mock)
  }

  fn respond(outcome: FetchOutcome) -> ProxyResponse {
    match outcome {
      FetchOutcome::Respond(r) => r,
      other => panic!("expected a response, got {:?}", other),
    }
  }

  #[tokio::test]
  async fn test_install_caches_every_critical_asset() {
    let (proxy, storage, mock) = running_proxy().await;

    let static_ns = proxy.namespace(NamespaceKind::Static).name();
    assert_eq!(static_ns, "festa-sport-static-v2");
    assert_eq!(storage.keys(&static_ns).unwrap(), vec![url("/"), url("/css/style.css")]);
    assert_eq!(
      storage.keys("festa-sport-images-v2").unwrap(),
      vec![url("/assets/images/logo.png")]
    );

    let critical: Vec<_> = mock
      .calls()
      .into_iter()
      .filter(|c| !c.request.url.path().ends_with(".png"))
      .collect();
    assert!(critical.iter().all(|c| c.request.cache_mode == CacheMode::Reload));
    assert_eq!(proxy.state().await, LifecycleState::Activated);
    assert!(proxy.controls_clients());
  }

  #[tokio::test]
  async fn test_image_failure_does_not_block_install() {
    let storage = Arc::new(SqliteStorage::in_memory().unwrap());
    let mock = Arc::new(MockTransport::new());
    mock.route(&url("/"), MockReply::ok("home"));
    mock.route(&url("/css/style.css"), MockReply::ok("css"));
    mock.route(&url("/assets/images/logo.png"), MockReply::status(404));

    let proxy = OfflineProxy::new(Arc::clone(&storage), mock, config("v2"));
    proxy.install().await.unwrap();

    assert_eq!(proxy.state().await, LifecycleState::Installed);
    assert_eq!(storage.entry_count("festa-sport-static-v2").unwrap(), 2);
    assert_eq!(storage.entry_count("festa-sport-images-v2").unwrap(), 0);
  }

  #[tokio::test]
  async fn test_critical_failure_stores_nothing_and_fails_install() {
    let storage = Arc::new(SqliteStorage::in_memory().unwrap());
    let mock = Arc::new(MockTransport::new());
    mock.route(&url("/"), MockReply::ok("home"));
    mock.route(&url("/css/style.css"), MockReply::status(500));

    let proxy = OfflineProxy::new(Arc::clone(&storage), mock, config("v2"));

    assert!(proxy.install().await.is_err());
    assert_eq!(proxy.state().await, LifecycleState::Redundant);
    assert_eq!(storage.entry_count("festa-sport-static-v2").unwrap(), 0);
    assert!(proxy.activate().await.is_err());
  }

  #[tokio::test]
  async fn test_activate_purges_previous_version() {
    let storage = Arc::new(SqliteStorage::in_memory().unwrap());
    let mock = Arc::new(MockTransport::new());
    serve_manifest(&mock);
    storage.open_namespace("unrelated-cache").unwrap();

    let v1 = OfflineProxy::new(Arc::clone(&storage), Arc::clone(&mock), config("v1"));
    v1.start().await.unwrap();

    let v2 = OfflineProxy::new(Arc::clone(&storage), Arc::clone(&mock), config("v2"));
    let purged = v2.start().await.unwrap();

    assert_eq!(purged, vec!["festa-sport-static-v1", "festa-sport-images-v1"]);
    assert_eq!(
      storage.namespaces().unwrap(),
      vec!["unrelated-cache", "festa-sport-static-v2", "festa-sport-images-v2"]
    );
  }

  #[tokio::test]
  async fn test_resume_requires_current_namespace() {
    let (_, storage, mock) = running_proxy().await;

    let same = OfflineProxy::new(Arc::clone(&storage), Arc::clone(&mock), config("v2"));
    assert!(same.resume().await.unwrap());
    assert_eq!(same.state().await, LifecycleState::Activated);

    let newer = OfflineProxy::new(storage, mock, config("v3"));
    assert!(!newer.resume().await.unwrap());
    assert_eq!(newer.state().await, LifecycleState::Parsed);
  }

  #[tokio::test]
  async fn test_failed_install_is_not_resumed() {
    let storage = Arc::new(SqliteStorage::in_memory().unwrap());
    let mock = Arc::new(MockTransport::new());
    serve_manifest(&mock);

    let v1 = OfflineProxy::new(Arc::clone(&storage), Arc::clone(&mock), config("v1"));
    v1.start().await.unwrap();

    mock.route(&url("/css/style.css"), MockReply::status(500));
    let broken = OfflineProxy::new(Arc::clone(&storage), Arc::clone(&mock), config("v2"));
    assert!(broken.install().await.is_err());
    assert!(!storage.namespaces().unwrap().contains(&"festa-sport-static-v2".to_string()));

    let next_run = OfflineProxy::new(Arc::clone(&storage), Arc::clone(&mock), config("v2"));
    assert!(!next_run.resume().await.unwrap());
    assert_eq!(next_run.state().await, LifecycleState::Parsed);
    assert!(!next_run.adopt_installed().await.unwrap());

    mock.route(&url("/css/style.css"), MockReply::ok("body{}"));
    let mut purged = next_run.start().await.unwrap();
    purged.sort();

    assert_eq!(purged, vec!["festa-sport-images-v1", "festa-sport-static-v1"]);
    let mut remaining = storage.namespaces().unwrap();
    remaining.sort();
    assert_eq!(remaining, vec!["festa-sport-images-v2", "festa-sport-static-v2"]);
    assert_eq!(storage.entry_count("festa-sport-static-v2").unwrap(), 2);
  }

  #[tokio::test]
  async fn test_resume_purges_stale_versions() {
    let storage = Arc::new(SqliteStorage::in_memory().unwrap());
    let mock = Arc::new(MockTransport::new());
    serve_manifest(&mock);

    let v1 = OfflineProxy::new(Arc::clone(&storage), Arc::clone(&mock), config("v1"));
    v1.start().await.unwrap();
    let installer = OfflineProxy::new(Arc::clone(&storage), Arc::clone(&mock), config("v2"));
    installer.install().await.unwrap();

    let next_run = OfflineProxy::new(Arc::clone(&storage), Arc::clone(&mock), config("v2"));
    assert!(next_run.resume().await.unwrap());

    assert!(next_run.controls_clients());
    assert!(storage.namespaces().unwrap().iter().all(|n| n.ends_with("-v2")));
  }

  #[tokio::test]
  async fn test_adopted_install_purges_on_activate() {
    let storage = Arc::new(SqliteStorage::in_memory().unwrap());
    let mock = Arc::new(MockTransport::new());
    serve_manifest(&mock);
    storage.open_namespace("festa-sport-static-v1").unwrap();

    let installer = OfflineProxy::new(Arc::clone(&storage), Arc::clone(&mock), config("v2"));
    installer.install().await.unwrap();

    let later = OfflineProxy::new(Arc::clone(&storage), Arc::clone(&mock), config("v2"));
    assert!(later.adopt_installed().await.unwrap());
    assert_eq!(later.state().await, LifecycleState::Installed);
    assert_eq!(later.activate().await.unwrap(), vec!["festa-sport-static-v1".to_string()]);

    let fresh = OfflineProxy::new(storage, mock, config("v3"));
    assert!(!fresh.adopt_installed().await.unwrap());
  }

  #[tokio::test]
  async fn test_bypass_before_activation_and_for_non_get() {
    let storage = Arc::new(SqliteStorage::in_memory().unwrap());
    let mock = Arc::new(MockTransport::new());
    let proxy = OfflineProxy::new(storage, mock, config("v2"));
    assert!(matches!(
      proxy.handle_fetch(&get(&url("/"))).await.unwrap(),
      FetchOutcome::Bypass
    ));

    let (proxy, _, _) = running_proxy().await;
    let post = HttpRequest::post_json(Url::parse(&url("/api/prenota")).unwrap(), &json!({})).unwrap();
    assert!(matches!(proxy.handle_fetch(&post).await.unwrap(), FetchOutcome::Bypass));
  }

  #[tokio::test]
  async fn test_cached_image_served_during_outage() {
    let (proxy, _, mock) = running_proxy().await;
    mock.set_offline(true);

    let response = respond(proxy.handle_fetch(&get(&url("/assets/images/logo.png"))).await.unwrap());
    proxy.settle().await;

    assert_eq!(response.source, ResponseSource::Cache);
    assert_eq!(response.response.body, b"png-v1");
  }

  #[tokio::test]
  async fn test_background_refresh_overwrites_cached_copy() {
    let (proxy, storage, mock) = running_proxy().await;
    mock.route(&url("/assets/images/logo.png"), MockReply::ok("png-v2"));

    let first = respond(proxy.handle_fetch(&get(&url("/assets/images/logo.png"))).await.unwrap());
    assert_eq!(first.response.body, b"png-v1");

    proxy.settle().await;
    let cached = storage
      .get("festa-sport-images-v2", &url("/assets/images/logo.png"))
      .unwrap()
      .unwrap();
    assert_eq!(cached.response.body, b"png-v2");
  }

  #[tokio::test]
  async fn test_refresh_never_delays_cached_response() {
    let (proxy, storage, mock) = running_proxy().await;
    let gate = Arc::new(Notify::new());
    mock.route(&url("/assets/images/logo.png"), MockReply::gated(&gate, "png-v2"));

    let outcome = tokio::time::timeout(
      Duration::from_secs(1),
      proxy.handle_fetch(&get(&url("/assets/images/logo.png"))),
    )
    .await
    .expect("cached response waited for the refresh")
    .unwrap();
    assert_eq!(respond(outcome).response.body, b"png-v1");

    tokio::task::yield_now().await;
    let before = storage
      .get("festa-sport-images-v2", &url("/assets/images/logo.png"))
      .unwrap()
      .unwrap();
    assert_eq!(before.response.body, b"png-v1");

    gate.notify_one();
    proxy.settle().await;
    let after = storage
      .get("festa-sport-images-v2", &url("/assets/images/logo.png"))
      .unwrap()
      .unwrap();
    assert_eq!(after.response.body, b"png-v2");
  }

  #[tokio::test]
  async fn test_failed_refresh_keeps_cached_copy() {
    let (proxy, storage, mock) = running_proxy().await;
    mock.route(&url("/css/style.css"), MockReply::status(500));

    let response = respond(proxy.handle_fetch(&get(&url("/css/style.css"))).await.unwrap());
    proxy.settle().await;

    assert_eq!(response.response.body, b"body{}");
    let cached = storage.get("festa-sport-static-v2", &url("/css/style.css")).unwrap().unwrap();
    assert_eq!(cached.response.body, b"body{}");
  }

  #[tokio::test]
  async fn test_cache_miss_stores_only_successful_responses() {
    let (proxy, storage, mock) = running_proxy().await;
    mock.route(&url("/js/extra.js"), MockReply::ok("js"));
    mock.route(&url("/missing.html"), MockReply::status(404));

    let ok = respond(proxy.handle_fetch(&get(&url("/js/extra.js"))).await.unwrap());
    let missing = respond(proxy.handle_fetch(&get(&url("/missing.html"))).await.unwrap());

    assert_eq!(ok.source, ResponseSource::Network);
    assert_eq!(missing.response.status, 404);
    assert!(storage.get("festa-sport-static-v2", &url("/js/extra.js")).unwrap().is_some());
    assert!(storage.get("festa-sport-static-v2", &url("/missing.html")).unwrap().is_none());
  }

  #[tokio::test]
  async fn test_cache_miss_during_outage_fails() {
    let (proxy, _, mock) = running_proxy().await;
    mock.set_offline(true);

    let outcome = proxy.handle_fetch(&get(&url("/js/extra.js"))).await.unwrap();
    assert!(matches!(outcome, FetchOutcome::Failed(NetworkError::Connect { .. })));
  }

  #[tokio::test]
  async fn test_api_outage_returns_offline_503() {
    let (proxy, _, mock) = running_proxy().await;
    mock.set_offline(true);

    let response = respond(proxy.handle_fetch(&get(&url("/api/public/menu"))).await.unwrap());

    assert_eq!(response.source, ResponseSource::Offline);
    assert_eq!(response.response.status, 503);
    let body: serde_json::Value = response.response.json_body().unwrap();
    assert_eq!(body["offline"], json!(true));
    assert_eq!(body["error"], json!(OFFLINE_MESSAGE));
  }

  #[tokio::test]
  async fn test_api_error_status_also_becomes_offline_503() {
    let (proxy, _, mock) = running_proxy().await;
    mock.route(&url("/api/public/events"), MockReply::status(500));

    let response = respond(proxy.handle_fetch(&get(&url("/api/public/events"))).await.unwrap());
    assert_eq!(response.response.status, 503);
  }

  #[tokio::test]
  async fn test_api_responses_are_never_cached() {
    let (proxy, storage, mock) = running_proxy().await;
    mock.route(&url("/api/public/events"), MockReply::ok("{\"success\":true}"));

    respond(proxy.handle_fetch(&get(&url("/api/public/events"))).await.unwrap());
    assert!(storage.find(&url("/api/public/events")).unwrap().is_none());
  }

  #[tokio::test]
  async fn test_cross_origin_fonts_cached_then_served_offline() {
    let (proxy, storage, mock) = running_proxy().await;
    let font = "https://fonts.gstatic.com/s/montserrat/font.woff2";
    let page = "https://fonts.googleapis.com/css2?family=Montserrat";
    mock.route(font, MockReply::ok("woff2"));
    mock.route(page, MockReply::ok("@font-face{}"));

    respond(proxy.handle_fetch(&get(font)).await.unwrap());
    respond(proxy.handle_fetch(&get(page)).await.unwrap());
    assert!(storage.get("festa-sport-static-v2", font).unwrap().is_some());
    assert!(storage.get("festa-sport-static-v2", page).unwrap().is_none());

    mock.set_offline(true);
    let offline = respond(proxy.handle_fetch(&get(font)).await.unwrap());
    assert_eq!(offline.source, ResponseSource::Cache);
    assert!(matches!(
      proxy.handle_fetch(&get(page)).await.unwrap(),
      FetchOutcome::NoResponse
    ));
  }

  #[tokio::test]
  async fn test_bypassed_request_answered_by_network() {
    let storage = Arc::new(SqliteStorage::in_memory().unwrap());
    let mock = Arc::new(MockTransport::new());
    mock.route(&url("/"), MockReply::ok("home"));
    let proxy = OfflineProxy::new(storage, Arc::clone(&mock), config("v2"));

    let proxied = proxy.respond(&get(&url("/"))).await.unwrap();

    assert_eq!(proxied.source, ResponseSource::Network);
    assert_eq!(proxied.response.body, b"home");
    assert_eq!(mock.call_count(), 1);
  }

  #[tokio::test]
  async fn test_transport_surfaces_missing_response_as_error() {
    let (proxy, _, mock) = running_proxy().await;
    mock.set_offline(true);

    let err = proxy
      .send(&get("https://fonts.googleapis.com/css2?family=Montserrat"))
      .await
      .unwrap_err();
    assert!(matches!(err, NetworkError::NoResponse { .. }));

    let api = proxy.send(&get(&url("/api/feedback?limit=10"))).await.unwrap();
    assert_eq!(api.status, 503);
  }
}
