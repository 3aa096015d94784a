//! Per-call control flow of a scrape, kept free of I/O.
//!
//! ```text
//! Start ──prefer browser──▶ TryBrowserFirst ──html──────────▶ Done
//!   │                            │ no html          └─launch failed─▶ Failed
//!   └────────────────────────────┴──▶ TryHttp ──ok──────────▶ Done
//!                                        │ rescuable reason, browser not yet tried
//!                                        ▼
//!                                   TryFallback ──html──────▶ Done
//!                                        └──no html─────────▶ Failed
//! ```

use crate::fetch::FailureReason;

/// Where a scrape call currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeStep {
    Start,
    TryBrowserFirst,
    TryHttp,
    TryFallback,
    Done,
    Failed,
}

impl ScrapeStep {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// What the step that just ran produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepEvent {
    /// The browser produced non-empty HTML.
    BrowserRendered,
    /// The browser ran but produced nothing usable (error or empty page).
    BrowserEmpty,
    /// The browser could not even be started.
    BrowserLaunchFailed,
    /// The HTTP request returned a body.
    HttpSucceeded,
    /// The HTTP path failed; carries the diagnostic reason when one exists.
    HttpFailed(Option<FailureReason>),
}

/// State machine for one scrape call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapePlan {
    step: ScrapeStep,
    fallback_allowed: bool,
    prefer_browser: bool,
    browser_attempted: bool,
}

impl ScrapePlan {
    /// `fallback_allowed` is the conjunction of the scraper's fallback
    /// setting and the call's own permission.
    #[must_use]
    pub fn new(fallback_allowed: bool, prefer_browser: bool) -> Self {
        Self {
            step: ScrapeStep::Start,
            fallback_allowed,
            prefer_browser,
            browser_attempted: false,
        }
    }

    #[must_use]
    pub fn step(&self) -> ScrapeStep {
        self.step
    }

    /// Leaves `Start`.
    pub fn begin(&mut self) -> ScrapeStep {
        if self.step == ScrapeStep::Start {
            self.step = if self.prefer_browser && self.fallback_allowed {
                ScrapeStep::TryBrowserFirst
            } else {
                ScrapeStep::TryHttp
            };
        }
        self.step
    }

    /// Feeds the outcome of the current step and returns the next one.
    ///
    /// Events that make no sense for the current step end the call as `Failed`.
    pub fn advance(&mut self, event: StepEvent) -> ScrapeStep {
        self.step = match (self.step, event) {
            (ScrapeStep::TryBrowserFirst, StepEvent::BrowserRendered) => {
                self.browser_attempted = true;
                ScrapeStep::Done
            }
            (ScrapeStep::TryBrowserFirst, StepEvent::BrowserEmpty) => {
                self.browser_attempted = true;
                ScrapeStep::TryHttp
            }
            (ScrapeStep::TryHttp, StepEvent::HttpSucceeded) => ScrapeStep::Done,
            (ScrapeStep::TryHttp, StepEvent::HttpFailed(Some(reason))) if self.should_rescue(reason) => {
                ScrapeStep::TryFallback
            }
            (ScrapeStep::TryFallback, StepEvent::BrowserRendered) => {
                self.browser_attempted = true;
                ScrapeStep::Done
            }
            (ScrapeStep::Done, _) => ScrapeStep::Done,
            _ => ScrapeStep::Failed,
        };
        self.step
    }

    fn should_rescue(&self, reason: FailureReason) -> bool {
        self.fallback_allowed && !self.browser_attempted && reason.is_browser_rescuable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_REASONS: [FailureReason; 7] = [
        FailureReason::RateLimited,
        FailureReason::Unauthorized,
        FailureReason::Maintenance,
        FailureReason::BrowserChallenge,
        FailureReason::BotBlock,
        FailureReason::GeoBlock,
        FailureReason::Unknown,
    ];

    #[test]
    fn test_default_call_goes_straight_to_http() {
        let mut plan = ScrapePlan::new(true, false);
        assert_eq!(plan.begin(), ScrapeStep::TryHttp);
        assert_eq!(plan.advance(StepEvent::HttpSucceeded), ScrapeStep::Done);
    }

    #[test]
    fn test_prefer_browser_requires_fallback_permission() {
        assert_eq!(ScrapePlan::new(true, true).begin(), ScrapeStep::TryBrowserFirst);
        assert_eq!(ScrapePlan::new(false, true).begin(), ScrapeStep::TryHttp);
    }

    #[test]
    fn test_preferred_browser_success_skips_http() {
        let mut plan = ScrapePlan::new(true, true);
        plan.begin();
        assert_eq!(plan.advance(StepEvent::BrowserRendered), ScrapeStep::Done);
    }

    #[test]
    fn test_preferred_browser_launch_failure_is_terminal() {
        let mut plan = ScrapePlan::new(true, true);
        plan.begin();
        assert_eq!(plan.advance(StepEvent::BrowserLaunchFailed), ScrapeStep::Failed);
    }

    #[test]
    fn test_preferred_browser_empty_falls_through_without_second_rescue() {
        let mut plan = ScrapePlan::new(true, true);
        plan.begin();
        assert_eq!(plan.advance(StepEvent::BrowserEmpty), ScrapeStep::TryHttp);
        assert_eq!(
            plan.advance(StepEvent::HttpFailed(Some(FailureReason::BrowserChallenge))),
            ScrapeStep::Failed
        );
    }

    #[test]
    fn test_rescue_iff_enabled_and_reason_rescuable() {
        for fallback_allowed in [true, false] {
            for reason in ALL_REASONS {
                let mut plan = ScrapePlan::new(fallback_allowed, false);
                plan.begin();
                let next = plan.advance(StepEvent::HttpFailed(Some(reason)));
                let expected = fallback_allowed
                    && matches!(
                        reason,
                        FailureReason::BrowserChallenge | FailureReason::BotBlock | FailureReason::GeoBlock
                    );
                assert_eq!(
                    next == ScrapeStep::TryFallback,
                    expected,
                    "fallback_allowed={fallback_allowed} reason={reason}"
                );
            }
        }
    }

    #[test]
    fn test_transport_failure_never_rescued() {
        let mut plan = ScrapePlan::new(true, false);
        plan.begin();
        assert_eq!(plan.advance(StepEvent::HttpFailed(None)), ScrapeStep::Failed);
    }

    #[test]
    fn test_failed_rescue_fails_call() {
        let mut plan = ScrapePlan::new(true, false);
        plan.begin();
        plan.advance(StepEvent::HttpFailed(Some(FailureReason::BotBlock)));
        assert_eq!(plan.advance(StepEvent::BrowserEmpty), ScrapeStep::Failed);
        assert!(plan.step().is_terminal());
    }

    #[test]
    fn test_successful_rescue_completes_call() {
        let mut plan = ScrapePlan::new(true, false);
        plan.begin();
        plan.advance(StepEvent::HttpFailed(Some(FailureReason::GeoBlock)));
        assert_eq!(plan.advance(StepEvent::BrowserRendered), ScrapeStep::Done);
    }
}
