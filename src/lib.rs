//! Bookmark Preview
//!
//! Tune the layout of a daily-reading bookmark sheet (page width, height, font
//! size and calendar year), preview the HTML fragment a remote rendering service
//! produces for those values, and print it from the browser.
//!
//! # Features
//!
//! - **Two-phase parameters**: dragging a control only updates a pending value;
//!   releasing it commits and triggers exactly one render request
//! - **Year labels**: previous/current/next Hebrew year labels derived from a
//!   date-conversion service, or a fixed list
//! - **Sequenced fetching**: late responses from superseded requests never
//!   overwrite newer content
//! - **Print layout**: only the preview region survives the print stylesheet
//!
//! # Example
//!
//! ```no_run
//! use bookmark_preview::{Dimension, PreviewConfig, Session};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PreviewConfig {
//!     render_endpoint: "http://localhost:8000/bookmarker/tanah_yomi".to_string(),
//!     ..Default::default()
//! };
//!
//! let session = Session::connect(config)?;
//! session.set_pending(Dimension::Width, 12.0)?;
//! session.commit(Dimension::Width)?;
//! println!("{}", session.fragment());
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use url::Url;

pub mod error;
pub use error::{Error, Result};

pub mod fetcher;
pub mod params;
pub mod presenter;
pub mod session;
pub mod years;

// Async-friendly session handle (worker-thread backed)
pub mod async_api;

// Local preview server
pub mod server;

pub use async_api::AsyncSession;
pub use fetcher::{FetchOutcome, Fragment, FragmentFetcher, FragmentSource, HttpFragmentSource, Ticket};
pub use params::{Bounds, Dimension, ParameterStore, RenderParams, Slider};
pub use presenter::{Presenter, PreviewView};
pub use session::Session;
pub use years::{DateConverter, HebcalConverter, YearOptions, YearResolver, YearStrategy};

/// Default rendering service endpoint (the daily-reading bookmark document)
pub const DEFAULT_RENDER_ENDPOINT: &str = "https://bookmarkers-service.onrender.com/bookmarker/tanah_yomi";

/// Default date-conversion service endpoint
pub const DEFAULT_CONVERTER_ENDPOINT: &str = "https://www.hebcal.com/converter";

/// How failures of the external services reach the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Keep the last good state on screen and only log
    #[default]
    Silent,
    /// Additionally raise a blocking alert in the preview page
    Alert,
}

impl FromStr for FailurePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "silent" => Ok(FailurePolicy::Silent),
            "alert" => Ok(FailurePolicy::Alert),
            other => Err(Error::ConfigError(format!("unknown failure policy '{}'", other))),
        }
    }
}

/// Configuration for a preview session
///
/// Both external endpoints are deployment settings; the defaults point at the
/// public services. No request timeout is applied unless `timeout_ms` is set.
///
/// # Examples
///
/// ```
/// let cfg = bookmark_preview::PreviewConfig::default();
/// assert!(cfg.validate().is_ok());
/// assert_eq!(cfg.timeout_ms, 0);
/// ```
#[derive(Debug, Clone)]
pub struct PreviewConfig {
    /// Base URL of the rendering service; query parameters are appended
    pub render_endpoint: String,
    /// Base URL of the date-conversion service
    pub converter_endpoint: String,
    /// User agent string to send with requests
    pub user_agent: String,
    /// Request timeout in milliseconds (0 => no timeout)
    pub timeout_ms: u64,
    /// Extra HTTP headers sent to both services
    pub headers: HashMap<String, String>,
    /// Where the year labels come from
    pub year_strategy: YearStrategy,
    /// Whether failures are surfaced to the user
    pub failure_policy: FailurePolicy,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            render_endpoint: DEFAULT_RENDER_ENDPOINT.to_string(),
            converter_endpoint: DEFAULT_CONVERTER_ENDPOINT.to_string(),
            user_agent: concat!("bookmark-preview/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_ms: 0,
            headers: HashMap::new(),
            year_strategy: YearStrategy::Dynamic,
            failure_policy: FailurePolicy::Silent,
        }
    }
}

impl PreviewConfig {
    /// Check that both endpoints are absolute http(s) URLs and the headers are valid.
    pub fn validate(&self) -> Result<()> {
        self.render_url()?;
        if self.year_strategy == YearStrategy::Dynamic {
            self.converter_url()?;
        }
        self.header_map()?;
        if let YearStrategy::Static(labels) = &self.year_strategy {
            if labels.iter().all(|l| l.trim().is_empty()) {
                return Err(Error::ConfigError("static year list is empty".into()));
            }
        }
        Ok(())
    }

    pub fn render_url(&self) -> Result<Url> {
        parse_endpoint("render endpoint", &self.render_endpoint)
    }

    pub fn converter_url(&self) -> Result<Url> {
        parse_endpoint("converter endpoint", &self.converter_endpoint)
    }

    fn header_map(&self) -> Result<HeaderMap> {
        let mut map = HeaderMap::new();
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::ConfigError(format!("invalid header name '{}': {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| Error::ConfigError(format!("invalid header value for '{}': {}", name, e)))?;
            map.insert(name, value);
        }
        Ok(map)
    }

    /// Build the blocking HTTP client shared by the converter and the fragment source.
    pub fn http_client(&self) -> Result<Client> {
        let mut builder = Client::builder()
            .user_agent(self.user_agent.clone())
            .default_headers(self.header_map()?);
        if self.timeout_ms > 0 {
            builder = builder.timeout(Duration::from_millis(self.timeout_ms));
        }
        builder
            .build()
            .map_err(|e| Error::InitializationError(format!("Failed to build HTTP client: {}", e)))
    }
}

fn parse_endpoint(what: &str, raw: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|e| Error::ConfigError(format!("{} '{}': {}", what, raw, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(Error::ConfigError(format!("{} must be http(s), got '{}'", what, other))),
    }
}
