#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Terminal plumbing for the `zone_safety` binary.
//!
//! [`IndicatifProgress`] renders a [`ProgressCallback`] as an `indicatif`
//! bar, and [`init_logger`] routes `log` output through the same
//! [`MultiProgress`] so log lines print above the bars instead of
//! tearing them.

use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use log::LevelFilter;
use zone_safety_source::progress::ProgressCallback;

pub use indicatif::MultiProgress;

/// What a bar counts. Selects the spinner shown before the total is
/// known and the bar shown after.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarKind {
    /// Incident records pulled from a feed.
    Records,
    /// Zones scored by a run.
    Zones,
}

impl BarKind {
    const fn spinner_template(self) -> &'static str {
        match self {
            Self::Records => "{spinner:.cyan} {msg} {pos} records",
            Self::Zones => "{spinner:.green} {msg}",
        }
    }

    const fn bar_template(self) -> &'static str {
        match self {
            Self::Records => "  {msg} {wide_bar:.cyan/dim} {pos}/{len} {percent}% [{eta}]",
            Self::Zones => "{msg} {wide_bar:.green/dim} {pos}/{len} zones [{elapsed_precise}]",
        }
    }

    fn spinner_style(self) -> ProgressStyle {
        ProgressStyle::with_template(self.spinner_template())
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    }

    fn bar_style(self) -> ProgressStyle {
        ProgressStyle::with_template(self.bar_template())
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-")
    }
}

/// A [`ProgressCallback`] drawn as an `indicatif` bar.
///
/// Starts as a spinner and switches to a bar on the first
/// [`ProgressCallback::set_total`].
pub struct IndicatifProgress {
    bar: ProgressBar,
    kind: BarKind,
}

impl IndicatifProgress {
    /// Adds a bar of the given kind to `multi`.
    #[must_use]
    pub fn new(multi: &MultiProgress, kind: BarKind, message: &str) -> Self {
        let bar = multi.add(ProgressBar::new_spinner());
        bar.enable_steady_tick(Duration::from_millis(100));
        bar.set_style(kind.spinner_style());
        bar.set_message(message.to_string());
        Self { bar, kind }
    }

    /// Bar for fetched incident records.
    #[must_use]
    pub fn records_bar(multi: &MultiProgress, message: &str) -> Arc<dyn ProgressCallback> {
        Arc::new(Self::new(multi, BarKind::Records, message))
    }

    /// Bar for per-zone scoring.
    #[must_use]
    pub fn zones_bar(multi: &MultiProgress, message: &str) -> Arc<dyn ProgressCallback> {
        Arc::new(Self::new(multi, BarKind::Zones, message))
    }
}

impl ProgressCallback for IndicatifProgress {
    fn set_total(&self, total: u64) {
        self.bar.set_length(total);
        self.bar.set_position(0);
        self.bar.set_style(self.kind.bar_style());
    }

    fn inc(&self, delta: u64) {
        self.bar.inc(delta);
    }

    fn set_message(&self, msg: String) {
        self.bar.set_message(msg);
    }

    fn finish(&self, msg: String) {
        self.bar.finish_with_message(msg);
    }
}

/// Installs the global logger behind `indicatif-log-bridge`.
///
/// Logs at `info` unless `RUST_LOG` says otherwise. Returns the
/// [`MultiProgress`] every bar must be added to.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let logger = pretty_env_logger::formatted_builder()
        .filter_level(LevelFilter::Info)
        .parse_env("RUST_LOG")
        .build();
    let level = logger.filter();

    if indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .is_ok()
    {
        log::set_max_level(level);
    }

    multi
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn templates_parse() {
        for kind in [BarKind::Records, BarKind::Zones] {
            assert!(ProgressStyle::with_template(kind.spinner_template()).is_ok());
            assert!(ProgressStyle::with_template(kind.bar_template()).is_ok());
        }
    }

    #[test]
    fn switches_to_bar_once_total_is_known() {
        let multi = MultiProgress::with_draw_target(indicatif::ProgressDrawTarget::hidden());
        let progress = IndicatifProgress::new(&multi, BarKind::Zones, "scoring");
        progress.set_total(4);
        progress.inc(3);
        assert_eq!(progress.bar.length(), Some(4));
        assert_eq!(progress.bar.position(), 3);
        progress.finish("done".to_string());
        assert!(progress.bar.is_finished());
    }
}
