//! Page and zoom navigation
//!
//! Keeps `(current_page, zoom)` valid for a fixed page count. Every
//! operation is synchronous and total: out-of-range requests are clamped,
//! never rejected, except raw page input text which may be declined.

use serde::{Deserialize, Serialize};

use crate::error::InvalidPageInput;

/// Tolerance used when comparing zoom factors against the step grid
const ZOOM_EPSILON: f32 = 1e-4;

/// Bounds and step for the zoom factor
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoomRange {
    pub min: f32,
    pub max: f32,
    pub step: f32,
    /// Zoom applied to a fresh session; also the anchor of the step grid
    pub default: f32,
}

impl Default for ZoomRange {
    fn default() -> Self {
        Self {
            min: 0.5,
            max: 3.0,
            step: 0.2,
            default: 1.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("invalid zoom range: {0}")]
pub struct InvalidZoomRange(pub String);

impl ZoomRange {
    pub fn validate(&self) -> Result<(), InvalidZoomRange> {
        let values = [self.min, self.max, self.step, self.default];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(InvalidZoomRange("values must be finite".to_string()));
        }
        if self.min <= 0.0 {
            return Err(InvalidZoomRange(format!(
                "min must be positive, got {}",
                self.min
            )));
        }
        if self.step <= 0.0 {
            return Err(InvalidZoomRange(format!(
                "step must be positive, got {}",
                self.step
            )));
        }
        if !(self.min <= self.default && self.default <= self.max) {
            return Err(InvalidZoomRange(format!(
                "default {} must lie within [{}, {}]",
                self.default, self.min, self.max
            )));
        }
        Ok(())
    }

    /// Clamp to `[min, max]`, mapping NaN/Inf to the default
    #[must_use]
    pub fn clamp(&self, zoom: f32) -> f32 {
        if !zoom.is_finite() {
            return self.default;
        }
        round_zoom(zoom).clamp(self.min, self.max)
    }

    /// Next grid point above `zoom`, clamped
    ///
    /// Grid points are `default + k * step`. Values are recomputed from the
    /// integer index each time so repeated stepping never drifts.
    #[must_use]
    pub fn step_in(&self, zoom: f32) -> f32 {
        let index = ((zoom - self.default) / self.step + ZOOM_EPSILON).floor() + 1.0;
        self.clamp(self.default + index * self.step)
    }

    /// Next grid point below `zoom`, clamped
    #[must_use]
    pub fn step_out(&self, zoom: f32) -> f32 {
        let index = ((zoom - self.default) / self.step - ZOOM_EPSILON).ceil() - 1.0;
        self.clamp(self.default + index * self.step)
    }
}

fn round_zoom(zoom: f32) -> f32 {
    (zoom * 10_000.0).round() / 10_000.0
}

/// Navigation commands
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Jump to a 1-based page, clamped
    GoToPage(i64),
    NextPage,
    PreviousPage,
    ZoomIn,
    ZoomOut,
    /// Set an explicit zoom factor, clamped
    SetZoom(f32),
}

/// Effects produced by navigation changes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Page or zoom changed; the current page must be rendered again
    RenderCurrentPage,
}

/// Navigation controller state
#[derive(Clone, Debug)]
pub struct Navigation {
    range: ZoomRange,
    page_count: usize,
    current_page: usize,
    zoom: f32,
}

impl Navigation {
    #[must_use]
    pub fn new(range: ZoomRange) -> Self {
        Self {
            range,
            page_count: 0,
            current_page: 0,
            zoom: range.default,
        }
    }

    /// Adopt a new page count; page resets to 1 (or 0 without pages)
    ///
    /// Zoom is kept across documents.
    pub fn reset(&mut self, page_count: usize) {
        self.page_count = page_count;
        self.current_page = usize::from(page_count > 0);
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// Current 1-based page, 0 when there are no pages
    #[must_use]
    pub fn current_page(&self) -> usize {
        self.current_page
    }

    #[must_use]
    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    #[must_use]
    pub fn zoom_range(&self) -> &ZoomRange {
        &self.range
    }

    /// Zoom as a rounded percentage, e.g. `120`
    #[must_use]
    pub fn zoom_percent(&self) -> u32 {
        (self.zoom * 100.0).round() as u32
    }

    pub fn go_to_page(&mut self, requested: i64) -> usize {
        if self.page_count == 0 {
            return self.current_page;
        }
        let max = i64::try_from(self.page_count).unwrap_or(i64::MAX);
        // clamp bounds are 1..=max, both within usize range
        self.current_page = requested.clamp(1, max) as usize;
        self.current_page
    }

    pub fn next_page(&mut self) -> usize {
        if self.current_page < self.page_count {
            self.current_page += 1;
        }
        self.current_page
    }

    pub fn previous_page(&mut self) -> usize {
        if self.current_page > 1 {
            self.current_page -= 1;
        }
        self.current_page
    }

    pub fn zoom_in(&mut self) -> f32 {
        self.zoom = self.range.step_in(self.zoom);
        self.zoom
    }

    pub fn zoom_out(&mut self) -> f32 {
        self.zoom = self.range.step_out(self.zoom);
        self.zoom
    }

    pub fn set_zoom(&mut self, zoom: f32) -> f32 {
        self.zoom = self.range.clamp(zoom);
        self.zoom
    }

    /// Interpret text typed into a page field
    ///
    /// Empty, non-numeric and sub-1 input is rejected; a fractional part is
    /// truncated; numbers past the last page are capped to it. Does not
    /// change state.
    pub fn parse_page_input(&self, text: &str) -> Result<usize, InvalidPageInput> {
        let trimmed = text.trim();
        let (whole, fraction) = trimmed.split_once('.').unwrap_or((trimmed, ""));
        if whole.is_empty()
            || self.page_count == 0
            || !whole.bytes().all(|b| b.is_ascii_digit())
            || !fraction.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(InvalidPageInput::new(text));
        }

        match whole.parse::<u64>() {
            Ok(0) => Err(InvalidPageInput::new(text)),
            Ok(page) => Ok(usize::try_from(page)
                .unwrap_or(usize::MAX)
                .min(self.page_count)),
            // all digits but too large to represent
            Err(_) => Ok(self.page_count),
        }
    }

    #[must_use]
    pub fn can_go_previous(&self) -> bool {
        self.current_page > 1
    }

    #[must_use]
    pub fn can_go_next(&self) -> bool {
        self.current_page < self.page_count
    }

    #[must_use]
    pub fn can_zoom_in(&self) -> bool {
        self.zoom < self.range.max - ZOOM_EPSILON
    }

    #[must_use]
    pub fn can_zoom_out(&self) -> bool {
        self.zoom > self.range.min + ZOOM_EPSILON
    }

    /// Apply a command and return resulting effects
    #[must_use]
    pub fn apply(&mut self, cmd: Command) -> Vec<Effect> {
        let before = (self.current_page, self.zoom);

        match cmd {
            Command::GoToPage(page) => {
                self.go_to_page(page);
            }
            Command::NextPage => {
                self.next_page();
            }
            Command::PreviousPage => {
                self.previous_page();
            }
            Command::ZoomIn => {
                self.zoom_in();
            }
            Command::ZoomOut => {
                self.zoom_out();
            }
            Command::SetZoom(zoom) => {
                self.set_zoom(zoom);
            }
        }

        let zoom_changed = (before.1 - self.zoom).abs() > f32::EPSILON;
        if before.0 != self.current_page || zoom_changed {
            vec![Effect::RenderCurrentPage]
        } else {
            vec![]
        }
    }
}

impl Default for Navigation {
    fn default() -> Self {
        Self::new(ZoomRange::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ten_pages() -> Navigation {
        let mut nav = Navigation::default();
        nav.reset(10);
        nav
    }

    #[test]
    fn reset_starts_on_first_page_with_default_zoom() {
        let nav = ten_pages();
        assert_eq!(nav.current_page(), 1);
        assert_eq!(nav.page_count(), 10);
        assert_eq!(nav.zoom(), 1.0);
    }

    #[test]
    fn go_to_page_clamps() {
        let mut nav = ten_pages();
        assert_eq!(nav.go_to_page(0), 1);
        assert_eq!(nav.go_to_page(15), 10);
        assert_eq!(nav.go_to_page(5), 5);
        assert_eq!(nav.go_to_page(-7), 1);
        assert_eq!(nav.go_to_page(i64::MAX), 10);
    }

    #[test]
    fn go_to_page_without_pages_is_noop() {
        let mut nav = Navigation::default();
        assert_eq!(nav.go_to_page(3), 0);
        assert_eq!(nav.current_page(), 0);
    }

    #[test]
    fn next_and_previous_stop_at_bounds() {
        let mut nav = ten_pages();
        assert_eq!(nav.previous_page(), 1);
        nav.go_to_page(10);
        assert_eq!(nav.next_page(), 10);
        assert!(!nav.can_go_next());
        assert!(nav.can_go_previous());
    }

    #[test]
    fn zoom_in_reaches_max_without_drift() {
        let mut nav = ten_pages();
        for _ in 0..10 {
            nav.zoom_in();
        }
        assert_eq!(nav.zoom(), 3.0);
        for _ in 0..5 {
            assert_eq!(nav.zoom_in(), 3.0);
        }
        assert!(!nav.can_zoom_in());
        assert_eq!(nav.zoom_percent(), 300);
    }

    #[test]
    fn zoom_out_bottoms_at_min_and_returns_to_grid() {
        let mut nav = ten_pages();
        assert_eq!(nav.zoom_out(), 0.8);
        assert_eq!(nav.zoom_out(), 0.6);
        assert_eq!(nav.zoom_out(), 0.5);
        assert_eq!(nav.zoom_out(), 0.5);
        assert!(!nav.can_zoom_out());

        assert_eq!(nav.zoom_in(), 0.6);
        assert_eq!(nav.zoom_in(), 0.8);
        assert_eq!(nav.zoom_in(), 1.0);
    }

    #[test]
    fn repeated_round_trips_stay_on_grid() {
        let mut nav = ten_pages();
        for _ in 0..100 {
            nav.zoom_in();
            nav.zoom_in();
            nav.zoom_out();
            nav.zoom_out();
        }
        assert_eq!(nav.zoom(), 1.0);
    }

    #[test]
    fn set_zoom_clamps_and_handles_nan() {
        let mut nav = ten_pages();
        assert_eq!(nav.set_zoom(10.0), 3.0);
        assert_eq!(nav.set_zoom(0.01), 0.5);
        assert_eq!(nav.set_zoom(f32::NAN), 1.0);
    }

    #[test]
    fn parse_page_input_cases() {
        let nav = ten_pages();
        assert!(nav.parse_page_input("").is_err());
        assert!(nav.parse_page_input("   ").is_err());
        assert!(nav.parse_page_input("abc").is_err());
        assert!(nav.parse_page_input("0").is_err());
        assert!(nav.parse_page_input("-2").is_err());
        assert!(nav.parse_page_input("0.5").is_err());
        assert!(nav.parse_page_input(".5").is_err());
        assert!(nav.parse_page_input("2.5.1").is_err());
        assert!(nav.parse_page_input("2.x").is_err());
        assert_eq!(nav.parse_page_input("2.5"), Ok(2));
        assert_eq!(nav.parse_page_input("7.0"), Ok(7));
        assert_eq!(nav.parse_page_input("3."), Ok(3));
        assert_eq!(nav.parse_page_input("999"), Ok(10));
        assert_eq!(nav.parse_page_input("12.9"), Ok(10));
        assert_eq!(nav.parse_page_input(" 4 "), Ok(4));
        assert_eq!(nav.parse_page_input("99999999999999999999999"), Ok(10));
    }

    #[test]
    fn parse_page_input_rejects_without_pages() {
        let nav = Navigation::default();
        let err = nav.parse_page_input("1").unwrap_err();
        assert_eq!(err.input, "1");
    }

    #[test]
    fn apply_reports_render_only_on_change() {
        let mut nav = ten_pages();
        assert_eq!(
            nav.apply(Command::NextPage),
            vec![Effect::RenderCurrentPage]
        );
        assert_eq!(nav.apply(Command::GoToPage(2)), vec![]);
        assert_eq!(
            nav.apply(Command::ZoomIn),
            vec![Effect::RenderCurrentPage]
        );
        nav.set_zoom(3.0);
        assert_eq!(nav.apply(Command::ZoomIn), vec![]);
    }

    #[test]
    fn zoom_range_validation() {
        assert!(ZoomRange::default().validate().is_ok());

        let bad_min = ZoomRange {
            min: 0.0,
            ..ZoomRange::default()
        };
        assert!(bad_min.validate().is_err());

        let bad_default = ZoomRange {
            default: 4.0,
            ..ZoomRange::default()
        };
        assert!(bad_default.validate().is_err());

        let bad_step = ZoomRange {
            step: f32::INFINITY,
            ..ZoomRange::default()
        };
        assert!(bad_step.validate().is_err());
    }
}
