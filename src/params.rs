//! Parameter store: the page dimensions, font size and year label that drive a render.
//!
//! Width, height and font follow a two-phase update. Continuous control input
//! lands in a *pending* slot; only a commit (the control being released) copies it
//! into the *committed* slot that the fragment fetcher reads. The year has no
//! pending phase: selecting a label commits it at once.

use std::fmt;
use std::str::FromStr;

use log::debug;

use crate::{Error, Result};

/// One of the three numeric layout parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    /// Page width in centimeters
    Width,
    /// Page height in centimeters
    Height,
    /// Font size in points
    Font,
}

impl Dimension {
    pub const ALL: [Dimension; 3] = [Dimension::Width, Dimension::Height, Dimension::Font];

    /// Query-parameter name used by the rendering service
    pub fn query_name(self) -> &'static str {
        match self {
            Dimension::Width => "width",
            Dimension::Height => "height",
            Dimension::Font => "font",
        }
    }

    /// Control bounds
    pub fn bounds(self) -> Bounds {
        match self {
            Dimension::Width => Bounds::new(10.0, 30.0, 0.1),
            Dimension::Height => Bounds::new(10.0, 40.0, 0.1),
            Dimension::Font => Bounds::new(8.0, 48.0, 0.5),
        }
    }

    /// Value the control starts with before any interaction
    pub fn default_value(self) -> f64 {
        match self {
            Dimension::Width => 21.0,
            Dimension::Height => 29.7,
            Dimension::Font => 15.7,
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.query_name())
    }
}

impl FromStr for Dimension {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "width" => Ok(Dimension::Width),
            "height" => Ok(Dimension::Height),
            "font" => Ok(Dimension::Font),
            other => Err(Error::InvalidParameter(format!("unknown parameter '{}'", other))),
        }
    }
}

/// Inclusive range and granularity of a slider
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl Bounds {
    pub const fn new(min: f64, max: f64, step: f64) -> Self {
        Self { min, max, step }
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

// Strip float noise from arithmetic like 15.7 + 1.0; controls never go finer than 0.01.
fn tidy(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// A bounded value with separate pending and committed slots
#[derive(Debug, Clone, PartialEq)]
pub struct Slider {
    pending: f64,
    committed: f64,
    bounds: Bounds,
}

impl Slider {
    pub fn new(initial: f64, bounds: Bounds) -> Self {
        let value = tidy(bounds.clamp(initial));
        Self {
            pending: value,
            committed: value,
            bounds,
        }
    }

    pub fn pending(&self) -> f64 {
        self.pending
    }

    pub fn committed(&self) -> f64 {
        self.committed
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    /// Record an intermediate value. Out-of-range input is clamped; the applied
    /// value is returned.
    pub fn set_pending(&mut self, value: f64) -> Result<f64> {
        if !value.is_finite() {
            return Err(Error::InvalidParameter(format!("{} is not a finite number", value)));
        }
        if !self.bounds.contains(value) {
            debug!("{} outside [{}, {}], clamping", value, self.bounds.min, self.bounds.max);
        }
        self.pending = tidy(self.bounds.clamp(value));
        Ok(self.pending)
    }

    /// Copy pending into committed. Returns whether the committed value changed.
    pub fn commit(&mut self) -> bool {
        if self.pending == self.committed {
            return false;
        }
        self.committed = self.pending;
        true
    }
}

/// The committed tuple sent to the rendering service
#[derive(Debug, Clone, PartialEq)]
pub struct RenderParams {
    pub width: f64,
    pub height: f64,
    pub font: f64,
    pub year: String,
}

/// Holds every control value of a preview session
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterStore {
    width: Slider,
    height: Slider,
    font: Slider,
    year: String,
}

impl Default for ParameterStore {
    fn default() -> Self {
        let slider = |dim: Dimension| Slider::new(dim.default_value(), dim.bounds());
        Self {
            width: slider(Dimension::Width),
            height: slider(Dimension::Height),
            font: slider(Dimension::Font),
            year: String::new(),
        }
    }
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slider(&self, dim: Dimension) -> &Slider {
        match dim {
            Dimension::Width => &self.width,
            Dimension::Height => &self.height,
            Dimension::Font => &self.font,
        }
    }

    fn slider_mut(&mut self, dim: Dimension) -> &mut Slider {
        match dim {
            Dimension::Width => &mut self.width,
            Dimension::Height => &mut self.height,
            Dimension::Font => &mut self.font,
        }
    }

    pub fn pending(&self, dim: Dimension) -> f64 {
        self.slider(dim).pending()
    }

    pub fn committed(&self, dim: Dimension) -> f64 {
        self.slider(dim).committed()
    }

    /// High-frequency update from a dragging control. Never affects the
    /// committed tuple.
    pub fn set_pending(&mut self, dim: Dimension, value: f64) -> Result<f64> {
        self.slider_mut(dim).set_pending(value)
    }

    /// Interaction end. Returns whether the committed value changed.
    pub fn commit(&mut self, dim: Dimension) -> bool {
        self.slider_mut(dim).commit()
    }

    /// Stepper button: move the committed value by `delta` and commit in one go.
    pub fn nudge(&mut self, dim: Dimension, delta: f64) -> Result<bool> {
        let slider = self.slider_mut(dim);
        let target = slider.committed() + delta;
        slider.set_pending(target)?;
        Ok(slider.commit())
    }

    /// Currently selected year label; empty while unset
    pub fn year(&self) -> &str {
        &self.year
    }

    /// Select a year label. Returns whether the selection changed.
    pub fn select_year(&mut self, label: impl Into<String>) -> bool {
        let label = label.into();
        if label == self.year {
            return false;
        }
        self.year = label;
        true
    }

    /// Committed tuple, or `None` while the year is unset.
    pub fn render_params(&self) -> Option<RenderParams> {
        if self.year.trim().is_empty() {
            return None;
        }
        Some(RenderParams {
            width: self.width.committed(),
            height: self.height.committed(),
            font: self.font.committed(),
            year: self.year.clone(),
        })
    }
}

/// Parse the textual value a browser range input submits.
pub fn parse_value(text: &str) -> Result<f64> {
    let value: f64 = text
        .trim()
        .parse()
        .map_err(|_| Error::InvalidParameter(format!("'{}' is not a number", text)))?;
    if !value.is_finite() {
        return Err(Error::InvalidParameter(format!("'{}' is not a finite number", text)));
    }
    Ok(value)
}
