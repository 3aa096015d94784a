//! Chromium driver over the DevTools protocol (chromiumoxide).
//!
//! Each [`BrowserContext`] maps to a CDP browser context, so cookies and
//! storage never leak between rendered fetches or into the HTTP client.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::network::{
    Headers, SetExtraHttpHeadersParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures_util::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{
    BrowserContext, BrowserError, BrowserHandle, BrowserLauncher, BrowserPage, BrowserProvider,
    NavigateOptions, WaitUntil,
};

const READY_STATE_SCRIPT: &str = r"
    new Promise((resolve) => {
        if (document.readyState === 'complete' || document.readyState === 'interactive') {
            resolve(document.readyState);
        } else {
            document.addEventListener('DOMContentLoaded', () => resolve(document.readyState));
        }
    })
";

const NETWORK_IDLE_GRACE: Duration = Duration::from_millis(500);

/// Launches local Chromium/Chrome through chromiumoxide.
#[derive(Debug, Clone, Default)]
pub struct ChromiumLauncher {
    /// Extra command-line switches for the browser process.
    pub extra_args: Vec<String>,
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self, provider: BrowserProvider, headless: bool) -> Result<Arc<dyn BrowserHandle>, BrowserError> {
        if provider != BrowserProvider::Chromium {
            return Err(BrowserError::UnsupportedProvider(provider));
        }

        let mut builder = BrowserConfig::builder();
        if !headless {
            builder = builder.with_head();
        }
        builder = builder
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-background-networking")
            .arg("--disable-sync")
            .arg("--no-sandbox")
            .arg("--disable-gpu");
        for arg in &self.extra_args {
            builder = builder.arg(arg);
        }
        let config = builder
            .build()
            .map_err(|message| BrowserError::launch(provider, message))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|error| BrowserError::launch(provider, error.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(Arc::new(ChromiumBrowser {
            browser: Arc::new(Mutex::new(browser)),
            handler_task,
        }))
    }
}

struct ChromiumBrowser {
    browser: Arc<Mutex<Browser>>,
    handler_task: JoinHandle<()>,
}

#[async_trait]
impl BrowserHandle for ChromiumBrowser {
    async fn new_context(&self, user_agent: &str) -> Result<Box<dyn BrowserContext>, BrowserError> {
        let context_id = self
            .browser
            .lock()
            .await
            .execute(CreateBrowserContextParams::default())
            .await
            .map_err(BrowserError::protocol)?
            .result
            .browser_context_id;

        Ok(Box::new(ChromiumContext {
            browser: Arc::clone(&self.browser),
            context_id: Some(context_id),
            user_agent: user_agent.to_string(),
            headers: None,
            pages: Vec::new(),
        }))
    }

    async fn close(&self) -> Result<(), BrowserError> {
        let result = self.browser.lock().await.close().await;
        self.handler_task.abort();
        result.map(|_| ()).map_err(BrowserError::protocol)
    }
}

struct ChromiumContext {
    browser: Arc<Mutex<Browser>>,
    context_id: Option<BrowserContextId>,
    user_agent: String,
    headers: Option<serde_json::Value>,
    pages: Vec<Page>,
}

#[async_trait]
impl BrowserContext for ChromiumContext {
    async fn set_extra_http_headers(&mut self, headers: &BTreeMap<String, String>) -> Result<(), BrowserError> {
        // CDP scopes extra headers to a target, so they are applied per page.
        self.headers = Some(serde_json::to_value(headers).map_err(BrowserError::protocol)?);
        Ok(())
    }

    async fn new_page(&mut self) -> Result<Box<dyn BrowserPage>, BrowserError> {
        let mut params = CreateTargetParams::builder().url("about:blank");
        if let Some(context_id) = &self.context_id {
            params = params.browser_context_id(context_id.clone());
        }
        let params = params.build().map_err(BrowserError::protocol)?;

        let page = self
            .browser
            .lock()
            .await
            .new_page(params)
            .await
            .map_err(BrowserError::protocol)?;
        self.pages.push(page.clone());

        page.execute(SetUserAgentOverrideParams::new(self.user_agent.clone()))
            .await
            .map_err(BrowserError::protocol)?;
        if let Some(headers) = &self.headers {
            page.execute(SetExtraHttpHeadersParams::new(Headers::new(headers.clone())))
                .await
                .map_err(BrowserError::protocol)?;
        }

        Ok(Box::new(ChromiumPage { page }))
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        for page in self.pages.drain(..) {
            if let Err(error) = page.close().await {
                debug!(error = %error, "page close failed");
            }
        }
        let Some(context_id) = self.context_id.take() else {
            return Ok(());
        };
        self.browser
            .lock()
            .await
            .execute(DisposeBrowserContextParams::new(context_id))
            .await
            .map(|_| ())
            .map_err(BrowserError::protocol)
    }
}

struct ChromiumPage {
    page: Page,
}

impl ChromiumPage {
    async fn navigate(&self, url: &str, options: &NavigateOptions) -> Result<(), BrowserError> {
        let mut params = NavigateParams::builder().url(url);
        if let Some(referer) = &options.referer {
            params = params.referrer(referer.clone());
        }
        let params = params
            .build()
            .map_err(|message| BrowserError::navigation(url, message))?;

        match options.wait_until {
            WaitUntil::DomContentLoaded => {
                self.page
                    .execute(params)
                    .await
                    .map_err(|error| BrowserError::navigation(url, error.to_string()))?;
                if let Err(error) = self.page.evaluate(READY_STATE_SCRIPT.to_string()).await {
                    // Non-HTML documents have no readyState to poll.
                    debug!(url, error = %error, "ready state check failed");
                }
            }
            WaitUntil::Load => {
                self.page
                    .goto(params)
                    .await
                    .map_err(|error| BrowserError::navigation(url, error.to_string()))?;
            }
            WaitUntil::NetworkIdle => {
                self.page
                    .goto(params)
                    .await
                    .map_err(|error| BrowserError::navigation(url, error.to_string()))?;
                tokio::time::sleep(NETWORK_IDLE_GRACE).await;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl BrowserPage for ChromiumPage {
    async fn goto(&mut self, url: &str, options: &NavigateOptions) -> Result<(), BrowserError> {
        if let Ok(result) = tokio::time::timeout(options.timeout, self.navigate(url, options)).await {
            result
        } else {
            let timeout_ms = u64::try_from(options.timeout.as_millis()).unwrap_or(u64::MAX);
            warn!(url, timeout_ms, "navigation timed out");
            Err(BrowserError::Timeout {
                url: url.to_string(),
                timeout_ms,
            })
        }
    }

    async fn content(&mut self) -> Result<String, BrowserError> {
        self.page.content().await.map_err(BrowserError::protocol)
    }
}
