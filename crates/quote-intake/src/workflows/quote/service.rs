use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::domain::{LeadId, LeadPatch, LeadRecord, PolicyDocument};
use super::gateway::{Clock, SubmissionError, SubmissionGateway, SystemClock};
use super::validation::{
    format_phone_as_typed, validate_document, DocumentRejection, StartDateWindow,
};
use super::wizard::{WizardError, WizardSession, WizardView, CLOSE_DELAY};

/// Identifier for an open wizard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

static SESSION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_session_id() -> SessionId {
    let id = SESSION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    SessionId(format!("quote-{id:06}"))
}

/// How long a wizard may sit untouched before the registry drops it.
pub const DEFAULT_SESSION_IDLE_TTL: Duration = Duration::from_secs(30 * 60);

#[derive(Debug)]
struct SessionEntry {
    session: WizardSession,
    touched: Instant,
}

impl SessionEntry {
    fn new(session: WizardSession) -> Self {
        Self {
            session,
            touched: Instant::now(),
        }
    }

    fn touch(&mut self) -> &mut WizardSession {
        self.touched = Instant::now();
        &mut self.session
    }
}

type SessionMap = Mutex<HashMap<SessionId, SessionEntry>>;

fn lock(sessions: &SessionMap) -> MutexGuard<'_, HashMap<SessionId, SessionEntry>> {
    sessions.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Error raised by the quote intake service.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("quote session {0} not found")]
    NotFound(SessionId),
    #[error("start date {requested} must fall between {window}")]
    StartDateOutsideWindow {
        requested: NaiveDate,
        window: StartDateWindow,
    },
    #[error(transparent)]
    Document(#[from] DocumentRejection),
    #[error("{reason}")]
    Rejected {
        reason: WizardError,
        view: Box<WizardView>,
    },
    #[error("submission for quote session {0} was interrupted")]
    Interrupted(SessionId),
}

/// Hosts wizard sessions and routes finished ones to the submission gateway.
#[derive(Debug)]
pub struct QuoteIntakeService {
    sessions: Arc<SessionMap>,
    gateway: Arc<SubmissionGateway>,
    clock: Arc<dyn Clock>,
    close_delay: Duration,
    idle_ttl: Duration,
}

impl QuoteIntakeService {
    pub fn new(gateway: Arc<SubmissionGateway>) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            gateway,
            clock: Arc::new(SystemClock),
            close_delay: CLOSE_DELAY,
            idle_ttl: DEFAULT_SESSION_IDLE_TTL,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_close_delay(mut self, delay: Duration) -> Self {
        self.close_delay = delay;
        self
    }

    pub fn with_idle_ttl(mut self, ttl: Duration) -> Self {
        self.idle_ttl = ttl;
        self
    }

    pub fn gateway(&self) -> &SubmissionGateway {
        &self.gateway
    }

    pub fn start_date_window(&self) -> StartDateWindow {
        StartDateWindow::for_today(self.clock.today())
    }

    pub fn open_sessions(&self) -> usize {
        lock(&self.sessions).len()
    }

    /// Open a fresh wizard. Its success close notification drops it from the
    /// registry. Idle sessions are swept first.
    pub fn open(&self) -> (SessionId, WizardView) {
        self.evict_idle();

        let id = next_session_id();
        let registry: Weak<SessionMap> = Arc::downgrade(&self.sessions);
        let close_id = id.clone();
        let session = WizardSession::new()
            .with_close_delay(self.close_delay)
            .with_close_notifier(Arc::new(move || {
                if let Some(sessions) = registry.upgrade() {
                    let removed = lock(&sessions).remove(&close_id);
                    if removed.is_some() {
                        info!(session = %close_id, "quote session closed after submission");
                    }
                }
            }));

        let view = session.view();
        lock(&self.sessions).insert(id.clone(), SessionEntry::new(session));
        info!(session = %id, "quote session opened");
        (id, view)
    }

    /// Drop sessions untouched for longer than the idle TTL. Sessions with a
    /// submission in flight are kept. Returns how many were dropped.
    pub fn evict_idle(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<SessionEntry> = {
            let mut sessions = lock(&self.sessions);
            let ids: Vec<SessionId> = sessions
                .iter()
                .filter(|(_, entry)| {
                    !entry.session.is_submitting()
                        && now.saturating_duration_since(entry.touched) >= self.idle_ttl
                })
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter().filter_map(|id| sessions.remove(id)).collect()
        };

        if !expired.is_empty() {
            debug!(count = expired.len(), "evicted idle quote sessions");
        }
        expired.len()
    }

    pub fn view(&self, id: &SessionId) -> Result<WizardView, SessionError> {
        self.with_session(id, |session| Ok(session.view()))
    }

    /// Apply an edit the way the step views do: phone digits are reformatted as
    /// typed and a start date must come from the picker's window.
    pub fn update(&self, id: &SessionId, mut patch: LeadPatch) -> Result<WizardView, SessionError> {
        if let Some(requested) = patch.start_date {
            let window = self.start_date_window();
            if !window.contains(requested) {
                return Err(SessionError::StartDateOutsideWindow { requested, window });
            }
        }
        if let Some(phone) = patch.phone.take() {
            patch.phone = Some(format_phone_as_typed(&phone));
        }

        self.with_session(id, |session| {
            session.update_field(patch);
            Ok(session.view())
        })
    }

    /// Attach a declarations page after the picker's type and size checks.
    pub fn attach_document(
        &self,
        id: &SessionId,
        document: PolicyDocument,
    ) -> Result<WizardView, SessionError> {
        validate_document(&document)?;
        self.with_session(id, |session| {
            session.update_field(LeadPatch::attach_document(document));
            Ok(session.view())
        })
    }

    pub fn remove_document(&self, id: &SessionId) -> Result<WizardView, SessionError> {
        self.with_session(id, |session| {
            session.update_field(LeadPatch::remove_document());
            Ok(session.view())
        })
    }

    pub fn advance(&self, id: &SessionId) -> Result<WizardView, SessionError> {
        self.with_session(id, |session| match session.advance() {
            Ok(_) => Ok(session.view()),
            Err(reason) => Err(rejected(reason, session)),
        })
    }

    pub fn retreat(&self, id: &SessionId) -> Result<WizardView, SessionError> {
        self.with_session(id, |session| match session.retreat() {
            Ok(_) => Ok(session.view()),
            Err(reason) => Err(rejected(reason, session)),
        })
    }

    /// Run the final submission. The gateway call and the session update run
    /// on their own task, so a caller that stops waiting cannot leave the
    /// session stuck in flight. A panicking collaborator becomes an
    /// unexpected submission error.
    pub async fn submit(&self, id: &SessionId) -> Result<WizardView, SessionError> {
        let snapshot = self.with_session(id, |session| {
            session
                .begin_submission()
                .map_err(|reason| rejected(reason, session))
        })?;

        let sessions = self.sessions.clone();
        let gateway = self.gateway.clone();
        let task_id = id.clone();
        let task = tokio::spawn(async move {
            let result = match tokio::spawn(async move { gateway.submit(snapshot).await }).await {
                Ok(result) => result,
                Err(err) => {
                    error!(session = %task_id, error = %err, "lead submission task failed");
                    Err(SubmissionError::unexpected(String::new()))
                }
            };
            finish_submission(&sessions, &task_id, result)
        });

        task.await.unwrap_or_else(|err| {
            error!(session = %id, error = %err, "quote submission was interrupted");
            Err(SessionError::Interrupted(id.clone()))
        })
    }

    /// Host close: discard the session and any pending close notification.
    pub fn close(&self, id: &SessionId) -> Result<(), SessionError> {
        let removed = lock(&self.sessions).remove(id);
        match removed {
            Some(mut entry) => {
                entry.session.reset();
                info!(session = %id, "quote session closed by host");
                Ok(())
            }
            None => Err(SessionError::NotFound(id.clone())),
        }
    }

    /// Submit a complete record without a wizard session.
    /// Runs on its own task like [`Self::submit`].
    pub async fn submit_lead(&self, record: LeadRecord) -> Result<LeadId, SubmissionError> {
        let gateway = self.gateway.clone();
        tokio::spawn(async move { gateway.submit(record).await })
            .await
            .unwrap_or_else(|err| {
                error!(error = %err, "lead submission task failed");
                Err(SubmissionError::unexpected(String::new()))
            })
    }

    fn with_session<T>(
        &self,
        id: &SessionId,
        action: impl FnOnce(&mut WizardSession) -> Result<T, SessionError>,
    ) -> Result<T, SessionError> {
        let mut sessions = lock(&self.sessions);
        let entry = sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::NotFound(id.clone()))?;
        action(entry.touch())
    }
}

fn finish_submission(
    sessions: &SessionMap,
    id: &SessionId,
    result: Result<LeadId, SubmissionError>,
) -> Result<WizardView, SessionError> {
    let mut sessions = lock(sessions);
    let Some(entry) = sessions.get_mut(id) else {
        warn!(session = %id, "quote session closed while its submission was in flight");
        return Err(SessionError::NotFound(id.clone()));
    };
    let session = entry.touch();

    match session.complete_submission(result) {
        Ok(lead_id) => {
            info!(session = %id, lead = %lead_id, "quote session submitted");
            Ok(session.view())
        }
        Err(reason) => Err(rejected(reason, session)),
    }
}

fn rejected(reason: WizardError, session: &WizardSession) -> SessionError {
    SessionError::Rejected {
        reason,
        view: Box::new(session.view()),
    }
}
