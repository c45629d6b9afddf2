//! Year labels for the year selector.
//!
//! The dynamic strategy asks a date-conversion service for the Hebrew year of
//! today, one year ago and one year ahead, and turns each raw year (for example
//! `תשפ״ו`) into a display label (`התשפו`). A failed slot stays empty; it is
//! never an error for the caller.

use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use log::{debug, warn};
use reqwest::blocking::Client;
use serde::Deserialize;
use url::Url;

use crate::{Error, PreviewConfig, Result};

/// Character prefixed to every derived label
pub const YEAR_MARKER: char = 'ה';

/// Labels used when no date-conversion service is consulted
pub const STATIC_YEAR_LABELS: [&str; 4] = ["התשפה", "התשפו", "התשפז", "התשפח"];

/// Where the selectable year labels come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum YearStrategy {
    /// Fixed list; the first entry is the default selection
    Static(Vec<String>),
    /// Previous/current/next labels derived from the date-conversion service
    Dynamic,
}

impl YearStrategy {
    pub fn static_default() -> Self {
        YearStrategy::Static(STATIC_YEAR_LABELS.iter().map(|s| s.to_string()).collect())
    }
}

/// Turn the raw year field of a conversion response into a display label.
///
/// The last two characters are dropped and the final one re-attached, then the
/// marker is prefixed: `marker + raw[..len-2] + raw[len-1]`. Slicing is by
/// character, since real payloads carry a multi-byte gershayim (`תשפ״ו`).
pub fn hebrew_year_label(raw: &str) -> Option<String> {
    let chars: Vec<char> = raw.trim().chars().collect();
    if chars.len() < 2 {
        return None;
    }
    let (head, tail) = chars.split_at(chars.len() - 2);
    let mut label = String::with_capacity(raw.len() + YEAR_MARKER.len_utf8());
    label.push(YEAR_MARKER);
    label.extend(head);
    label.push(tail[1]);
    Some(label)
}

#[derive(Debug, Deserialize)]
struct ConverterResponse {
    #[serde(rename = "heDateParts")]
    he_date_parts: Option<HeDateParts>,
}

#[derive(Debug, Deserialize)]
struct HeDateParts {
    y: Option<String>,
}

/// Extract `heDateParts.y` from a conversion response body.
pub fn parse_converter_response(body: &str) -> Result<String> {
    let parsed: ConverterResponse = serde_json::from_str(body)
        .map_err(|e| Error::ConversionError(format!("malformed response: {}", e)))?;
    parsed
        .he_date_parts
        .and_then(|parts| parts.y)
        .filter(|y| !y.trim().is_empty())
        .ok_or_else(|| Error::ConversionError("response has no heDateParts.y".into()))
}

/// Maps a Gregorian date to the raw year string of the Hebrew calendar
pub trait DateConverter: Send + Sync {
    fn hebrew_year(&self, date: NaiveDate) -> Result<String>;
}

/// `DateConverter` backed by the Hebcal converter API
pub struct HebcalConverter {
    client: Client,
    endpoint: Url,
}

impl HebcalConverter {
    pub fn new(config: &PreviewConfig) -> Result<Self> {
        Ok(Self {
            client: config.http_client()?,
            endpoint: config.converter_url()?,
        })
    }

    pub fn with_client(client: Client, endpoint: Url) -> Self {
        Self { client, endpoint }
    }

    /// Strict Gregorian-to-Hebrew conversion request for `date`, JSON format
    pub fn request_url(&self, date: NaiveDate) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("cfg", "json")
            .append_pair("date", &date.format("%Y-%m-%d").to_string())
            .append_pair("g2h", "1")
            .append_pair("strict", "1");
        url
    }
}

impl DateConverter for HebcalConverter {
    fn hebrew_year(&self, date: NaiveDate) -> Result<String> {
        let url = self.request_url(date);
        debug!("converting {} via {}", date, url);
        let resp = self
            .client
            .get(url.clone())
            .send()
            .map_err(|e| Error::NetworkError(format!("Failed to fetch {}: {}", url, e)))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::NetworkError(format!("{} answered {}", url, status)));
        }
        let body = resp
            .text()
            .map_err(|e| Error::NetworkError(format!("Failed to read response body: {}", e)))?;
        parse_converter_response(&body)
    }
}

/// Position of a label in the dynamic set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YearSlot {
    Previous,
    Current,
    Next,
}

impl YearSlot {
    pub const ALL: [YearSlot; 3] = [YearSlot::Previous, YearSlot::Current, YearSlot::Next];

    fn offset(self) -> i32 {
        match self {
            YearSlot::Previous => -1,
            YearSlot::Current => 0,
            YearSlot::Next => 1,
        }
    }
}

/// Shift `date` by whole years. Feb 29 rolls over to Mar 1 in non-leap years.
pub fn shift_years(date: NaiveDate, years: i32) -> Option<NaiveDate> {
    let year = date.year().checked_add(years)?;
    date.with_year(year)
        .or_else(|| NaiveDate::from_ymd_opt(year, 3, 1))
}

/// Labels offered by the year selector, in display order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YearOptions {
    slots: Vec<Option<String>>,
    default_index: usize,
    failures: Vec<String>,
}

impl YearOptions {
    /// Options for a fixed list; the first label is the default.
    pub fn from_static(labels: &[String]) -> Self {
        let slots = labels
            .iter()
            .map(|l| Some(l.trim().to_string()).filter(|l| !l.is_empty()))
            .collect::<Vec<_>>();
        let default_index = slots.iter().position(Option::is_some).unwrap_or(0);
        Self {
            slots,
            default_index,
            failures: Vec::new(),
        }
    }

    /// Options for the previous/current/next slots; the current slot is the default.
    pub fn from_slots(previous: Option<String>, current: Option<String>, next: Option<String>) -> Self {
        Self {
            slots: vec![previous, current, next],
            default_index: 1,
            failures: Vec::new(),
        }
    }

    /// Attach the reasons slots came out empty.
    pub fn with_failures(mut self, failures: Vec<String>) -> Self {
        self.failures = failures;
        self
    }

    /// Populated labels in display order; failed slots are skipped
    pub fn labels(&self) -> Vec<&str> {
        self.slots.iter().filter_map(|s| s.as_deref()).collect()
    }

    /// Label of a dynamic slot, if it resolved
    pub fn slot(&self, slot: YearSlot) -> Option<&str> {
        let idx = (slot.offset() + 1) as usize;
        self.slots.get(idx).and_then(|s| s.as_deref())
    }

    /// The label selected on startup. `None` when that slot failed.
    pub fn default_label(&self) -> Option<&str> {
        self.slots.get(self.default_index).and_then(|s| s.as_deref())
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels().contains(&label)
    }

    /// Why resolving some slots failed, one message per slot
    pub fn failures(&self) -> &[String] {
        &self.failures
    }
}

/// Computes the year options once per session
pub struct YearResolver {
    strategy: YearStrategy,
    converter: Option<Arc<dyn DateConverter>>,
}

impl YearResolver {
    pub fn new(strategy: YearStrategy, converter: Option<Arc<dyn DateConverter>>) -> Self {
        Self { strategy, converter }
    }

    /// Resolve the labels relative to `today`. Dynamic slots are looked up one
    /// after another (previous, current, next).
    pub fn resolve(&self, today: NaiveDate) -> YearOptions {
        match &self.strategy {
            YearStrategy::Static(labels) => YearOptions::from_static(labels),
            YearStrategy::Dynamic => {
                let Some(converter) = self.converter.as_deref() else {
                    warn!("dynamic year labels requested without a date converter");
                    return YearOptions::from_slots(None, None, None)
                        .with_failures(vec!["no date converter configured".to_string()]);
                };
                let mut failures = Vec::new();
                let [previous, current, next] = YearSlot::ALL.map(|slot| match resolve_slot(converter, today, slot) {
                    Ok(label) => Some(label),
                    Err(e) => {
                        warn!("Error fetching Hebrew year for {:?} slot: {}", slot, e);
                        failures.push(format!("{:?} year: {}", slot, e));
                        None
                    }
                });
                YearOptions::from_slots(previous, current, next).with_failures(failures)
            }
        }
    }
}

fn resolve_slot(converter: &dyn DateConverter, today: NaiveDate, slot: YearSlot) -> Result<String> {
    let date = shift_years(today, slot.offset())
        .ok_or_else(|| Error::ConversionError(format!("{} cannot be shifted by {} years", today, slot.offset())))?;
    let raw = converter.hebrew_year(date)?;
    hebrew_year_label(&raw)
        .ok_or_else(|| Error::ConversionError(format!("unusable year '{}' for {}", raw, date)))
}
