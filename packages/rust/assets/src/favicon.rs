//! Best-effort link thumbnails from a site's favicon.
//!
//! The icon is located from the page's `<link rel="icon">`, then
//! `<link rel="shortcut icon">`, then `/favicon.ico` at the origin. Any
//! failure along the way yields `None`: a missing thumbnail never blocks a
//! packet.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Client;
use scraper::{Html, Selector};
use tracing::{debug, instrument, warn};
use url::Url;

use packetmaker_shared::{PacketError, Result};

/// User-Agent string for thumbnail requests.
const USER_AGENT: &str = concat!("PacketMaker/", env!("CARGO_PKG_VERSION"));

/// Maximum number of redirects to follow.
const MAX_REDIRECTS: usize = 5;

/// Icon link relations, in order of preference.
const ICON_RELS: [&str; 2] = ["icon", "shortcut icon"];

/// Fallback icon location at the site origin.
const DEFAULT_ICON_PATH: &str = "/favicon.ico";

/// Downloads favicons as link thumbnails.
#[derive(Debug, Clone)]
pub struct FaviconFetcher {
    client: Client,
}

impl FaviconFetcher {
    pub fn new(timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| PacketError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Fetch the favicon of `url` into `<output_dir>/<id> thumbnail.png`.
    ///
    /// The raw icon is kept next to it as `<id> thumbnail.ico`.
    #[instrument(skip_all, fields(url = %url, id = %id))]
    pub async fn fetch(&self, url: &str, id: &str, output_dir: &Path) -> Option<PathBuf> {
        match self.try_fetch(url, id, output_dir).await {
            Ok(path) => {
                debug!(path = %path.display(), "fetched thumbnail");
                Some(path)
            }
            Err(e) => {
                warn!(error = %e, "no thumbnail for link");
                None
            }
        }
    }

    async fn try_fetch(&self, url: &str, id: &str, output_dir: &Path) -> Result<PathBuf> {
        let page_url = Url::parse(url)
            .map_err(|e| PacketError::validation(format!("invalid link {url}: {e}")))?;
        let origin = Url::parse(&origin_url(&page_url)?)
            .map_err(|e| PacketError::validation(format!("invalid origin for {url}: {e}")))?;

        let html = self.get_text(page_url.as_str()).await?;
        let href = icon_href(&html).unwrap_or_else(|| DEFAULT_ICON_PATH.to_string());
        let icon_url = origin
            .join(&href)
            .map_err(|e| PacketError::validation(format!("invalid icon link {href}: {e}")))?;
        debug!(%icon_url, "resolved favicon");

        let bytes = self.get_bytes(icon_url.as_str()).await?;

        std::fs::create_dir_all(output_dir).map_err(|e| PacketError::io(output_dir, e))?;
        let ico_path = output_dir.join(format!("{id} thumbnail.ico"));
        std::fs::write(&ico_path, &bytes).map_err(|e| PacketError::io(&ico_path, e))?;

        let png_path = output_dir.join(format!("{id} thumbnail.png"));
        let icon = image::load_from_memory(&bytes)
            .map_err(|e| PacketError::Image(format!("{icon_url}: {e}")))?;
        icon.save(&png_path)
            .map_err(|e| PacketError::Image(format!("{}: {e}", png_path.display())))?;
        Ok(png_path)
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        let response = self.get(url).await?;
        response
            .text()
            .await
            .map_err(|e| PacketError::Network(format!("{url}: failed to read body: {e}")))
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.get(url).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| PacketError::Network(format!("{url}: failed to read body: {e}")))?;
        Ok(bytes.to_vec())
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PacketError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PacketError::Network(format!("{url}: HTTP {status}")));
        }
        Ok(response)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Extract the origin (scheme + host + port) from a URL.
fn origin_url(url: &Url) -> Result<String> {
    let scheme = url.scheme();
    let host = url
        .host_str()
        .ok_or_else(|| PacketError::validation(format!("URL has no host: {url}")))?;

    match url.port() {
        Some(port) => Ok(format!("{scheme}://{host}:{port}")),
        None => Ok(format!("{scheme}://{host}")),
    }
}

/// The `href` of the preferred icon link in `html`, if any.
fn icon_href(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let selector = Selector::parse("link[rel][href]").ok()?;
    let links: Vec<(&str, &str)> = doc
        .select(&selector)
        .filter_map(|link| Some((link.value().attr("rel")?, link.value().attr("href")?)))
        .map(|(rel, href)| (rel.trim(), href.trim()))
        .filter(|(_, href)| !href.is_empty())
        .collect();

    ICON_RELS.iter().find_map(|wanted| {
        links
            .iter()
            .find(|(rel, _)| rel.eq_ignore_ascii_case(wanted))
            .map(|(_, href)| href.to_string())
    })
}
