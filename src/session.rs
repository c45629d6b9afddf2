//! A preview session: the parameter store, the resolved year options and the
//! fragment fetcher behind one handle.
//!
//! Any change of a committed value (width, height, font or year) triggers
//! exactly one fragment fetch. Pending updates and commits that leave the value
//! unchanged trigger none. Network I/O runs outside the store lock, so commits
//! from different threads may have requests in flight at the same time; the
//! fetcher's tickets decide which response is kept.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::NaiveDate;
use log::{debug, info, warn};

use crate::fetcher::{FetchOutcome, FragmentFetcher, FragmentSource, HttpFragmentSource, Ticket};
use crate::params::{Dimension, ParameterStore, RenderParams};
use crate::presenter::{ControlView, PreviewView};
use crate::years::{DateConverter, HebcalConverter, YearOptions, YearResolver, YearStrategy};
use crate::{PreviewConfig, Result};

/// A committed tuple together with the ticket reserved for it
type Request = Option<(Ticket, RenderParams)>;

pub struct Session {
    config: PreviewConfig,
    store: Mutex<ParameterStore>,
    years: YearOptions,
    fetcher: FragmentFetcher,
}

impl Session {
    /// Assemble a session from already resolved year options. The default label
    /// is selected but nothing is fetched yet.
    pub fn new(config: PreviewConfig, years: YearOptions, fetcher: FragmentFetcher) -> Self {
        let mut store = ParameterStore::new();
        if let Some(label) = years.default_label() {
            store.select_year(label);
        }
        Self {
            config,
            store: Mutex::new(store),
            years,
            fetcher,
        }
    }

    /// Resolve the year options relative to `today` and select the default,
    /// without fetching.
    pub fn prepare(
        config: PreviewConfig,
        converter: Option<Arc<dyn DateConverter>>,
        source: Arc<dyn FragmentSource>,
        today: NaiveDate,
    ) -> Result<Self> {
        config.validate()?;
        let years = YearResolver::new(config.year_strategy.clone(), converter).resolve(today);
        info!("year options: {:?} (default {:?})", years.labels(), years.default_label());

        let fetcher = FragmentFetcher::new(config.render_url()?, source);
        Ok(Self::new(config, years, fetcher))
    }

    /// [`prepare`](Self::prepare) followed by the mount fetch. A failing mount
    /// fetch is logged, not returned.
    pub fn start(
        config: PreviewConfig,
        converter: Option<Arc<dyn DateConverter>>,
        source: Arc<dyn FragmentSource>,
        today: NaiveDate,
    ) -> Result<Self> {
        let session = Self::prepare(config, converter, source, today)?;
        session.mount();
        Ok(session)
    }

    /// Prepare against the configured HTTP services, with today's local date.
    pub fn open(config: PreviewConfig) -> Result<Self> {
        let converter: Option<Arc<dyn DateConverter>> = match config.year_strategy {
            YearStrategy::Dynamic => Some(Arc::new(HebcalConverter::new(&config)?)),
            YearStrategy::Static(_) => None,
        };
        let source = Arc::new(HttpFragmentSource::new(&config)?);
        Self::prepare(config, converter, source, chrono::Local::now().date_naive())
    }

    /// Start against the configured HTTP services, with today's local date.
    pub fn connect(config: PreviewConfig) -> Result<Self> {
        let session = Self::open(config)?;
        session.mount();
        Ok(session)
    }

    fn mount(&self) {
        if let Err(e) = self.refresh() {
            warn!("initial fragment fetch failed: {}", e);
        }
    }

    pub fn config(&self) -> &PreviewConfig {
        &self.config
    }

    pub fn years(&self) -> &YearOptions {
        &self.years
    }

    pub fn fetcher(&self) -> &FragmentFetcher {
        &self.fetcher
    }

    fn store(&self) -> MutexGuard<'_, ParameterStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Called with the store locked, so tickets are handed out in commit order.
    fn reserve(&self, store: &ParameterStore) -> Request {
        store.render_params().map(|params| (self.fetcher.issue(), params))
    }

    fn dispatch(&self, request: Request) -> Result<FetchOutcome> {
        match request {
            Some((ticket, params)) => self.fetcher.fetch_issued(ticket, &params),
            None => {
                debug!("year not selected yet, skipping fragment fetch");
                Ok(FetchOutcome::Skipped)
            }
        }
    }

    /// Copy of the current parameter store
    pub fn parameters(&self) -> ParameterStore {
        self.store().clone()
    }

    pub fn render_params(&self) -> Option<RenderParams> {
        self.store().render_params()
    }

    pub fn set_pending(&self, dim: Dimension, value: f64) -> Result<f64> {
        self.store().set_pending(dim, value)
    }

    pub fn commit(&self, dim: Dimension) -> Result<FetchOutcome> {
        let request = {
            let mut store = self.store();
            if !store.commit(dim) {
                return Ok(FetchOutcome::Unchanged);
            }
            self.reserve(&store)
        };
        self.dispatch(request)
    }

    pub fn nudge(&self, dim: Dimension, delta: f64) -> Result<FetchOutcome> {
        let request = {
            let mut store = self.store();
            if !store.nudge(dim, delta)? {
                return Ok(FetchOutcome::Unchanged);
            }
            self.reserve(&store)
        };
        self.dispatch(request)
    }

    pub fn select_year(&self, label: &str) -> Result<FetchOutcome> {
        let label = label.trim();
        if !self.years.contains(label) {
            info!("year '{}' is not among the offered labels", label);
        }
        let request = {
            let mut store = self.store();
            if !store.select_year(label) {
                return Ok(FetchOutcome::Unchanged);
            }
            self.reserve(&store)
        };
        self.dispatch(request)
    }

    /// Set and commit several values at once, then fetch at most once.
    ///
    /// Either every value is applied or, on invalid input, none is.
    pub fn apply(&self, values: &[(Dimension, f64)], year: Option<&str>) -> Result<FetchOutcome> {
        let request = {
            let mut store = self.store();
            let mut next = store.clone();
            let mut changed = false;
            for &(dim, value) in values {
                next.set_pending(dim, value)?;
                changed |= next.commit(dim);
            }
            if let Some(label) = year {
                changed |= next.select_year(label.trim());
            }
            *store = next;
            if !changed {
                return Ok(FetchOutcome::Unchanged);
            }
            self.reserve(&store)
        };
        self.dispatch(request)
    }

    /// Fetch for the current committed tuple regardless of changes.
    pub fn refresh(&self) -> Result<FetchOutcome> {
        let request = {
            let store = self.store();
            self.reserve(&store)
        };
        self.dispatch(request)
    }

    /// Markup of the latest accepted fragment
    pub fn fragment(&self) -> String {
        self.fetcher.markup()
    }

    pub fn last_error(&self) -> Option<String> {
        self.fetcher.last_error()
    }

    /// Year slots that could not be resolved on startup
    pub fn notices(&self) -> &[String] {
        self.years.failures()
    }

    /// Snapshot for the presenter
    pub fn view(&self) -> PreviewView {
        let store = self.store();
        let (ticket, markup) = self.fetcher.snapshot();
        PreviewView {
            controls: Dimension::ALL
                .iter()
                .map(|dim| {
                    let slider = store.slider(*dim);
                    ControlView {
                        dimension: *dim,
                        value: slider.pending(),
                        bounds: slider.bounds(),
                    }
                })
                .collect(),
            year: store.year().to_string(),
            year_options: self.years.labels().into_iter().map(String::from).collect(),
            markup,
            ticket: ticket.0,
            notices: self.notices().to_vec(),
            failure_policy: self.config.failure_policy,
        }
    }
}
