//! In-process browser driven by a script instead of a real page.
//!
//! Used by tests and by `worker --dry-run`. Each launch consumes the next
//! queued [`ScriptedRun`] (or the fallback run) and records every action the
//! agent takes so callers can assert on it afterwards.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::domain::ports::{BrowserError, BrowserLauncher, BrowserSession};

/// Bytes returned for every screenshot (PNG signature plus a marker).
pub const SCRIPTED_SCREENSHOT: &[u8] = b"\x89PNG\r\n\x1a\nscripted";

const ACCEPTING_PAGE: &str = "<html><body><form id=\"application\">Apply</form></body></html>";
const ACCEPTED_PAGE: &str =
    "<html><body><h1>Thank you for applying</h1><p>Application submitted</p></body></html>";

/// Session operations a fault can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptedAction {
    Launch,
    Navigate,
    PageSource,
    Fill,
    Upload,
    Click,
    Screenshot,
}

#[derive(Debug, Clone)]
enum Fault {
    Error(BrowserError),
    Panic,
}

#[derive(Debug, Clone, Default)]
struct PageState {
    source: String,
    elements: HashSet<String>,
}

/// Behaviour of one browser session.
#[derive(Debug, Clone, Default)]
pub struct ScriptedRun {
    page: PageState,
    accept_all: bool,
    after_click: HashMap<String, PageState>,
    faults: HashMap<ScriptedAction, Fault>,
    element_faults: HashMap<String, BrowserError>,
}

impl ScriptedRun {
    /// A page with the given source and no elements.
    pub fn page(source: impl Into<String>) -> Self {
        Self {
            page: PageState {
                source: source.into(),
                elements: HashSet::new(),
            },
            ..Self::default()
        }
    }

    /// Every selector exists and any click confirms the application.
    pub fn accepting() -> Self {
        Self {
            accept_all: true,
            ..Self::page(ACCEPTING_PAGE)
        }
    }

    pub fn with_elements<I, S>(mut self, selectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.page.elements.extend(selectors.into_iter().map(Into::into));
        self
    }

    /// Replace the page when `selector` is clicked.
    pub fn on_click<I, S>(mut self, selector: &str, source: impl Into<String>, elements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.after_click.insert(
            selector.to_string(),
            PageState {
                source: source.into(),
                elements: elements.into_iter().map(Into::into).collect(),
            },
        );
        self
    }

    /// Fail the first `action` of the session with `error`.
    pub fn fail(mut self, action: ScriptedAction, error: BrowserError) -> Self {
        self.faults.insert(action, Fault::Error(error));
        self
    }

    /// Fail any interaction with `selector`.
    pub fn fail_element(mut self, selector: &str, error: BrowserError) -> Self {
        self.element_faults.insert(selector.to_string(), error);
        self
    }

    /// Panic on the first `action` of the session.
    pub fn panic_on(mut self, action: ScriptedAction) -> Self {
        self.faults.insert(action, Fault::Panic);
        self
    }
}

/// Everything an agent did in one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionRecord {
    pub navigations: Vec<String>,
    pub filled: Vec<(String, String)>,
    pub uploads: Vec<(String, String)>,
    pub clicks: Vec<String>,
    pub screenshots: usize,
    pub closed: bool,
}

/// Launcher handing out scripted sessions.
pub struct ScriptedBrowser {
    runs: Mutex<VecDeque<ScriptedRun>>,
    fallback: ScriptedRun,
    records: Arc<Mutex<Vec<Arc<Mutex<SessionRecord>>>>>,
}

impl ScriptedBrowser {
    /// Launch `fallback` whenever no queued run is left.
    pub fn new(fallback: ScriptedRun) -> Self {
        Self {
            runs: Mutex::new(VecDeque::new()),
            fallback,
            records: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn accepting() -> Self {
        Self::new(ScriptedRun::accepting())
    }

    /// Queue runs consumed by successive launches.
    pub fn with_runs(self, runs: impl IntoIterator<Item = ScriptedRun>) -> Self {
        Self {
            runs: Mutex::new(runs.into_iter().collect()),
            ..self
        }
    }

    pub async fn push_run(&self, run: ScriptedRun) {
        self.runs.lock().await.push_back(run);
    }

    /// Records of every launched session, in launch order.
    pub async fn sessions(&self) -> Vec<SessionRecord> {
        let records = self.records.lock().await;
        let mut out = Vec::with_capacity(records.len());
        for record in records.iter() {
            out.push(record.lock().await.clone());
        }
        out
    }

    pub async fn launches(&self) -> usize {
        self.records.lock().await.len()
    }
}

#[async_trait]
impl BrowserLauncher for ScriptedBrowser {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn launch(&self) -> Result<Box<dyn BrowserSession>, BrowserError> {
        let run = self
            .runs
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        match run.faults.get(&ScriptedAction::Launch) {
            Some(Fault::Error(err)) => return Err(err.clone()),
            Some(Fault::Panic) => panic!("scripted panic during launch"),
            None => {}
        }

        let record = Arc::new(Mutex::new(SessionRecord::default()));
        self.records.lock().await.push(record.clone());

        Ok(Box::new(ScriptedSession {
            state: Mutex::new(SessionState {
                page: run.page.clone(),
                fired: HashSet::new(),
            }),
            run,
            record,
        }))
    }
}

struct SessionState {
    page: PageState,
    fired: HashSet<ScriptedAction>,
}

struct ScriptedSession {
    run: ScriptedRun,
    state: Mutex<SessionState>,
    record: Arc<Mutex<SessionRecord>>,
}

impl ScriptedSession {
    fn check_fault(&self, state: &mut SessionState, action: ScriptedAction) -> Result<(), BrowserError> {
        let Some(fault) = self.run.faults.get(&action) else {
            return Ok(());
        };
        if !state.fired.insert(action) {
            return Ok(());
        }
        match fault {
            Fault::Error(err) => Err(err.clone()),
            Fault::Panic => panic!("scripted panic during {action:?}"),
        }
    }

    fn has(&self, state: &SessionState, selector: &str) -> bool {
        self.run.accept_all || state.page.elements.contains(selector)
    }

    /// Fault and presence checks shared by element interactions.
    async fn element(&self, action: ScriptedAction, selector: &str) -> Result<(), BrowserError> {
        let mut state = self.state.lock().await;
        self.check_fault(&mut state, action)?;
        if let Some(err) = self.run.element_faults.get(selector) {
            return Err(err.clone());
        }
        if !self.has(&state, selector) {
            return Err(BrowserError::ElementNotFound(selector.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl BrowserSession for ScriptedSession {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        {
            let mut state = self.state.lock().await;
            self.check_fault(&mut state, ScriptedAction::Navigate)?;
        }
        self.record.lock().await.navigations.push(url.to_string());
        Ok(())
    }

    async fn page_source(&self) -> Result<String, BrowserError> {
        let mut state = self.state.lock().await;
        self.check_fault(&mut state, ScriptedAction::PageSource)?;
        Ok(state.page.source.clone())
    }

    async fn exists(&self, selector: &str) -> Result<bool, BrowserError> {
        let state = self.state.lock().await;
        Ok(self.has(&state, selector))
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<(), BrowserError> {
        self.element(ScriptedAction::Fill, selector).await?;
        self.record
            .lock()
            .await
            .filled
            .push((selector.to_string(), value.to_string()));
        Ok(())
    }

    async fn upload(&self, selector: &str, path: &str) -> Result<(), BrowserError> {
        self.element(ScriptedAction::Upload, selector).await?;
        self.record
            .lock()
            .await
            .uploads
            .push((selector.to_string(), path.to_string()));
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<(), BrowserError> {
        self.element(ScriptedAction::Click, selector).await?;
        {
            let mut state = self.state.lock().await;
            if self.run.accept_all {
                state.page.source = ACCEPTED_PAGE.to_string();
            } else if let Some(next) = self.run.after_click.get(selector) {
                state.page = next.clone();
            }
        }
        self.record.lock().await.clicks.push(selector.to_string());
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, BrowserError> {
        {
            let mut state = self.state.lock().await;
            self.check_fault(&mut state, ScriptedAction::Screenshot)?;
        }
        self.record.lock().await.screenshots += 1;
        Ok(SCRIPTED_SCREENSHOT.to_vec())
    }

    async fn close(&self) -> Result<(), BrowserError> {
        self.record.lock().await.closed = true;
        Ok(())
    }
}
