//! Request classification: an ordered, first-match-wins route table.

use std::fmt;
use url::Url;

use crate::cache::NamespaceKind;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "svg"];
const STATIC_EXTENSIONS: &[&str] = &["html", "css", "js"];
const CROSS_ORIGIN_ASSET_EXTENSIONS: &[&str] = &["css", "js", "woff", "woff2", "ttf", "eot"];

/// Category a request falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
  Api,
  Image,
  Static,
  CrossOrigin,
  Other,
}

impl fmt::Display for RequestClass {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      RequestClass::Api => "api",
      RequestClass::Image => "image",
      RequestClass::Static => "static",
      RequestClass::CrossOrigin => "cross-origin",
      RequestClass::Other => "other",
    };
    f.write_str(name)
  }
}

/// Predicate over a request URL and the site origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteMatch {
  PathPrefix(String),
  /// Last path segment ends in one of these extensions (case-insensitive)
  Extension(Vec<String>),
  RootPath,
  SameOrigin,
  CrossOrigin,
  AnyOf(Vec<RouteMatch>),
  Any,
}

impl RouteMatch {
  pub fn extensions(list: &[&str]) -> Self {
    RouteMatch::Extension(list.iter().map(|e| e.to_string()).collect())
  }

  pub fn matches(&self, url: &Url, origin: &Url) -> bool {
    match self {
      RouteMatch::PathPrefix(prefix) => url.path().starts_with(prefix.as_str()),
      RouteMatch::Extension(list) => has_extension(url, list),
      RouteMatch::RootPath => url.path() == "/",
      RouteMatch::SameOrigin => url.origin() == origin.origin(),
      RouteMatch::CrossOrigin => url.origin() != origin.origin(),
      RouteMatch::AnyOf(matchers) => matchers.iter().any(|m| m.matches(url, origin)),
      RouteMatch::Any => true,
    }
  }
}

/// How a matched request is answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
  /// Network only; any failure becomes a synthetic 503 offline response
  NetworkWithOfflineFallback,
  /// Serve the cached copy and refresh it in the background
  CacheFirstRevalidate(NamespaceKind),
  /// Network first, keep copies of cacheable assets, fall back to any cached copy
  NetworkFirstStoreAssets { extensions: Vec<String> },
  /// Network first, fall back to any cached copy
  NetworkFirst,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
  pub class: RequestClass,
  pub matcher: RouteMatch,
  pub strategy: Strategy,
}

#[derive(Debug, Clone)]
pub struct Router {
  routes: Vec<Route>,
}

impl Router {
  pub fn new(routes: Vec<Route>) -> Self {
    Self { routes }
  }

  /// The site's routing: API, images, static, cross-origin, everything else.
  pub fn site_default(api_prefix: &str) -> Self {
    Self::new(vec![
      Route {
        class: RequestClass::Api,
        matcher: RouteMatch::PathPrefix(api_prefix.to_string()),
        strategy: Strategy::NetworkWithOfflineFallback,
      },
      Route {
        class: RequestClass::Image,
        matcher: RouteMatch::extensions(IMAGE_EXTENSIONS),
        strategy: Strategy::CacheFirstRevalidate(NamespaceKind::Images),
      },
      Route {
        class: RequestClass::Static,
        matcher: RouteMatch::AnyOf(vec![
          RouteMatch::extensions(STATIC_EXTENSIONS),
          RouteMatch::RootPath,
          RouteMatch::SameOrigin,
        ]),
        strategy: Strategy::CacheFirstRevalidate(NamespaceKind::Static),
      },
      Route {
        class: RequestClass::CrossOrigin,
        matcher: RouteMatch::CrossOrigin,
        strategy: Strategy::NetworkFirstStoreAssets {
          extensions: CROSS_ORIGIN_ASSET_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        },
      },
      Route {
        class: RequestClass::Other,
        matcher: RouteMatch::Any,
        strategy: Strategy::NetworkFirst,
      },
    ])
  }

  pub fn route(&self, url: &Url, origin: &Url) -> Option<&Route> {
    self.routes.iter().find(|r| r.matcher.matches(url, origin))
  }

  pub fn classify(&self, url: &Url, origin: &Url) -> RequestClass {
    self
      .route(url, origin)
      .map(|r| r.class)
      .unwrap_or(RequestClass::Other)
  }
}

pub fn has_extension(url: &Url, extensions: &[String]) -> bool {
  let last = url.path().rsplit('/').next().unwrap_or_default();
  match last.rsplit_once('.') {
    Some((_, ext)) => extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)),
    None => false,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn origin() -> Url {
    Url::parse("https://festadellosport.onrender.com/").unwrap()
  }

  fn classify(url: &str) -> RequestClass {
    Router::site_default("/api/").classify(&Url::parse(url).unwrap(), &origin())
  }

  #[test]
  fn test_api_requests() {
    assert_eq!(
      classify("https://festadellosport.onrender.com/api/tavoli?data=2026-05-29&ora=19:00"),
      RequestClass::Api
    );
    assert_eq!(classify("http://localhost:3001/api/public/menu"), RequestClass::Api);
  }

  #[test]
  fn test_images_match_case_insensitively() {
    assert_eq!(
      classify("https://festadellosport.onrender.com/assets/images/logo.PNG"),
      RequestClass::Image
    );
    assert_eq!(classify("https://cdn.example.com/banner.webp"), RequestClass::Image);
  }

  #[test]
  fn test_static_requests() {
    assert_eq!(classify("https://festadellosport.onrender.com/"), RequestClass::Static);
    assert_eq!(
      classify("https://festadellosport.onrender.com/css/style.css"),
      RequestClass::Static
    );
    assert_eq!(
      classify("https://festadellosport.onrender.com/favicon/favicon.ico"),
      RequestClass::Static
    );
  }

  #[test]
  fn test_first_match_wins_for_cross_origin_stylesheets() {
    // Static extensions are checked before the origin
    assert_eq!(
      classify("https://cdnjs.cloudflare.com/ajax/libs/font-awesome/6.4.0/css/all.min.css"),
      RequestClass::Static
    );
    assert_eq!(
      classify("https://fonts.gstatic.com/s/montserrat/v26/font.woff2"),
      RequestClass::CrossOrigin
    );
  }

  #[test]
  fn test_other_reached_by_custom_table() {
    let router = Router::new(vec![Route {
      class: RequestClass::Api,
      matcher: RouteMatch::PathPrefix("/api/".to_string()),
      strategy: Strategy::NetworkWithOfflineFallback,
    }]);
    let url = Url::parse("https://festadellosport.onrender.com/about").unwrap();

    assert!(router.route(&url, &origin()).is_none());
    assert_eq!(router.classify(&url, &origin()), RequestClass::Other);
  }

  #[test]
  fn test_extension_needs_a_dot_in_last_segment() {
    let exts = vec!["css".to_string()];
    assert!(has_extension(&Url::parse("https://a.b/x/y.min.css").unwrap(), &exts));
    assert!(!has_extension(&Url::parse("https://a.b/css/").unwrap(), &exts));
    assert!(!has_extension(&Url::parse("https://a.b/css2?family=x").unwrap(), &exts));
  }
}
