//! Fragment fetcher: requests the rendered HTML fragment for the committed
//! parameters and keeps the latest accepted payload.
//!
//! Overlapping fetches are allowed to run side by side. Every fetch is stamped
//! with a ticket from a monotonic counter, and a response is only stored when
//! its ticket is newer than the one already accepted, so a slow response for
//! superseded parameters can never replace newer content.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, warn};
use reqwest::blocking::Client;
use url::Url;

use crate::params::{Dimension, RenderParams};
use crate::{Error, PreviewConfig, Result};

/// Build the rendering-service URL for a committed tuple.
///
/// Numbers use their shortest round-trip form (`21`, `29.7`).
pub fn render_url(base: &Url, params: &RenderParams) -> Url {
    let mut url = base.clone();
    url.query_pairs_mut()
        .append_pair(Dimension::Width.query_name(), &params.width.to_string())
        .append_pair(Dimension::Height.query_name(), &params.height.to_string())
        .append_pair(Dimension::Font.query_name(), &params.font.to_string())
        .append_pair("year", &params.year);
    url
}

/// Retrieves the text payload at a URL
pub trait FragmentSource: Send + Sync {
    fn fetch(&self, url: &Url) -> Result<String>;
}

/// `FragmentSource` over a blocking HTTP GET
pub struct HttpFragmentSource {
    client: Client,
}

impl HttpFragmentSource {
    pub fn new(config: &PreviewConfig) -> Result<Self> {
        Ok(Self {
            client: config.http_client()?,
        })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl FragmentSource for HttpFragmentSource {
    fn fetch(&self, url: &Url) -> Result<String> {
        let resp = self
            .client
            .get(url.clone())
            .send()
            .map_err(|e| Error::NetworkError(format!("Failed to fetch {}: {}", url, e)))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::NetworkError(format!("{} answered {}", url, status)));
        }
        resp.text()
            .map_err(|e| Error::NetworkError(format!("Failed to read response body: {}", e)))
    }
}

/// Sequence number of a fetch; later fetches carry larger tickets
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticket(pub u64);

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An accepted payload and the request it answered
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub markup: String,
    pub ticket: Ticket,
    pub params: RenderParams,
}

/// What a fetch attempt did to the stored fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// No committed value changed, so nothing was requested
    Unchanged,
    /// The year is unset; no request was issued
    Skipped,
    /// The response was stored
    Applied(Ticket),
    /// A newer response had already been stored; this one was dropped
    Superseded(Ticket),
}

impl FetchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchOutcome::Unchanged => "unchanged",
            FetchOutcome::Skipped => "skipped",
            FetchOutcome::Applied(_) => "applied",
            FetchOutcome::Superseded(_) => "superseded",
        }
    }

    pub fn ticket(&self) -> Option<Ticket> {
        match self {
            FetchOutcome::Applied(t) | FetchOutcome::Superseded(t) => Some(*t),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct FetchState {
    current: Option<Fragment>,
    accepted: u64,
    last_error: Option<String>,
}

/// Issues render requests and holds the latest accepted fragment
pub struct FragmentFetcher {
    endpoint: Url,
    source: Arc<dyn FragmentSource>,
    issued: AtomicU64,
    state: Mutex<FetchState>,
}

impl FragmentFetcher {
    pub fn new(endpoint: Url, source: Arc<dyn FragmentSource>) -> Self {
        Self {
            endpoint,
            source,
            issued: AtomicU64::new(0),
            state: Mutex::new(FetchState::default()),
        }
    }

    pub fn request_url(&self, params: &RenderParams) -> Url {
        render_url(&self.endpoint, params)
    }

    /// Reserve the next ticket
    pub fn issue(&self) -> Ticket {
        Ticket(self.issued.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Number of requests issued so far
    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::SeqCst)
    }

    /// Fetch the fragment for `params`. `None` (year unset) issues no request.
    ///
    /// On failure the stored fragment is left untouched and the error recorded.
    pub fn fetch(&self, params: Option<&RenderParams>) -> Result<FetchOutcome> {
        let Some(params) = params else {
            debug!("year not selected yet, skipping fragment fetch");
            return Ok(FetchOutcome::Skipped);
        };
        let ticket = self.issue();
        self.fetch_issued(ticket, params)
    }

    /// Fetch under a ticket reserved earlier with [`issue`](Self::issue).
    ///
    /// Callers that read `params` from shared state must reserve the ticket
    /// while still holding that state, so ticket order matches commit order.
    pub fn fetch_issued(&self, ticket: Ticket, params: &RenderParams) -> Result<FetchOutcome> {
        let url = self.request_url(params);
        debug!("fetching fragment {} from {}", ticket, url);

        match self.source.fetch(&url) {
            Ok(markup) => Ok(self.complete(ticket, params.clone(), markup)),
            Err(e) => {
                warn!("fragment fetch {} failed: {}", ticket, e);
                self.lock().last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Offer a completed response. It is stored only if no newer one has been.
    pub fn complete(&self, ticket: Ticket, params: RenderParams, markup: String) -> FetchOutcome {
        let mut state = self.lock();
        if ticket.0 <= state.accepted {
            debug!(
                "dropping fragment {}; {} already accepted",
                ticket,
                Ticket(state.accepted)
            );
            return FetchOutcome::Superseded(ticket);
        }
        debug!("accepted fragment {} ({} bytes)", ticket, markup.len());
        state.accepted = ticket.0;
        state.last_error = None;
        state.current = Some(Fragment { markup, ticket, params });
        FetchOutcome::Applied(ticket)
    }

    pub fn current(&self) -> Option<Fragment> {
        self.lock().current.clone()
    }

    /// Ticket of the stored fragment (`#0` before the first) and its markup,
    /// read together.
    pub fn snapshot(&self) -> (Ticket, String) {
        let state = self.lock();
        let markup = state.current.as_ref().map(|f| f.markup.clone()).unwrap_or_default();
        (Ticket(state.accepted), markup)
    }

    /// Stored markup, empty before the first accepted fetch
    pub fn markup(&self) -> String {
        self.lock()
            .current
            .as_ref()
            .map(|f| f.markup.clone())
            .unwrap_or_default()
    }

    /// Error of the most recent failed fetch, cleared by the next accepted one
    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FetchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl FragmentSource for Echo {
        fn fetch(&self, url: &Url) -> Result<String> {
            Ok(format!("<p>{}</p>", url.query().unwrap_or_default()))
        }
    }

    struct Down;

    impl FragmentSource for Down {
        fn fetch(&self, url: &Url) -> Result<String> {
            Err(Error::NetworkError(format!("{} unreachable", url)))
        }
    }

    fn params(width: f64) -> RenderParams {
        RenderParams {
            width,
            height: 29.7,
            font: 15.7,
            year: "התשפו".into(),
        }
    }

    fn endpoint() -> Url {
        Url::parse("https://render.example/bookmarker/tanah_yomi").unwrap()
    }

    #[test]
    fn url_keeps_parameter_names_and_number_format() {
        let url = render_url(&endpoint(), &params(21.0));
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("width".to_string(), "21".to_string()),
                ("height".to_string(), "29.7".to_string()),
                ("font".to_string(), "15.7".to_string()),
                ("year".to_string(), "התשפו".to_string()),
            ]
        );
        assert_eq!(url.path(), "/bookmarker/tanah_yomi");
    }

    #[test]
    fn fetch_without_year_is_skipped() {
        let fetcher = FragmentFetcher::new(endpoint(), Arc::new(Echo));
        assert_eq!(fetcher.fetch(None).unwrap(), FetchOutcome::Skipped);
        assert_eq!(fetcher.issued(), 0);
        assert_eq!(fetcher.markup(), "");
    }

    #[test]
    fn fetch_stores_payload() {
        let fetcher = FragmentFetcher::new(endpoint(), Arc::new(Echo));
        let outcome = fetcher.fetch(Some(&params(12.5))).unwrap();
        assert_eq!(outcome, FetchOutcome::Applied(Ticket(1)));
        let fragment = fetcher.current().unwrap();
        assert!(fragment.markup.contains("width=12.5"));
        assert_eq!(fragment.params.width, 12.5);
    }

    #[test]
    fn late_response_for_older_ticket_is_dropped() {
        let fetcher = FragmentFetcher::new(endpoint(), Arc::new(Echo));
        let first = fetcher.issue();
        let second = fetcher.issue();

        assert_eq!(
            fetcher.complete(second, params(12.0), "<p>second</p>".into()),
            FetchOutcome::Applied(second)
        );
        assert_eq!(
            fetcher.complete(first, params(11.0), "<p>first</p>".into()),
            FetchOutcome::Superseded(first)
        );
        assert_eq!(fetcher.markup(), "<p>second</p>");
    }

    #[test]
    fn in_order_responses_both_apply() {
        let fetcher = FragmentFetcher::new(endpoint(), Arc::new(Echo));
        let first = fetcher.issue();
        let second = fetcher.issue();
        assert!(matches!(fetcher.complete(first, params(11.0), "a".into()), FetchOutcome::Applied(_)));
        assert!(matches!(fetcher.complete(second, params(12.0), "b".into()), FetchOutcome::Applied(_)));
        assert_eq!(fetcher.markup(), "b");
    }

    #[test]
    fn reserved_ticket_orders_by_reservation_not_by_start() {
        let fetcher = FragmentFetcher::new(endpoint(), Arc::new(Echo));
        let older = fetcher.issue();
        let newer = fetcher.issue();

        // The newer reservation starts and finishes first
        assert_eq!(fetcher.fetch_issued(newer, &params(13.0)).unwrap(), FetchOutcome::Applied(newer));
        assert_eq!(fetcher.fetch_issued(older, &params(11.0)).unwrap(), FetchOutcome::Superseded(older));

        let (ticket, markup) = fetcher.snapshot();
        assert_eq!(ticket, newer);
        assert!(markup.contains("width=13"));
        assert_eq!(fetcher.current().unwrap().params.width, 13.0);
    }

    #[test]
    fn snapshot_before_first_fetch() {
        let fetcher = FragmentFetcher::new(endpoint(), Arc::new(Echo));
        assert_eq!(fetcher.snapshot(), (Ticket(0), String::new()));
    }

    #[test]
    fn failure_keeps_previous_fragment() {
        let fetcher = FragmentFetcher::new(endpoint(), Arc::new(Down));
        let ticket = fetcher.issue();
        fetcher.complete(ticket, params(20.0), "<p>good</p>".into());

        let err = fetcher.fetch(Some(&params(25.0))).unwrap_err();
        assert!(matches!(err, Error::NetworkError(_)));
        assert_eq!(fetcher.markup(), "<p>good</p>");
        assert!(fetcher.last_error().unwrap().contains("unreachable"));
    }
}
