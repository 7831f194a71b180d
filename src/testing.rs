//! In-memory backend for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::api::{
    ApiError, AssetApi, AuthApi, AuthResult, BankApi, BankInfo, CreateSessionRequest, FilterAsset, FrameAsset, Page,
    PageMeta, PageQuery, Session, SessionApi, SessionStatus, StartCaptureResponse, User, UserApi,
};

pub(crate) fn user_with_points(points: u64) -> User {
    User {
        id: "user-0123456789".into(),
        email: Some("ana@example.com".into()),
        name: Some("Ana".into()),
        phone: None,
        address: None,
        points,
        payment_code: Some("AB12CD".into()),
        role: None,
    }
}

pub(crate) fn session(id: &str, booth: &str, status: SessionStatus) -> Session {
    Session {
        id: id.into(),
        status,
        user_id: Some("user-0123456789".into()),
        photobooth_id: booth.into(),
        photo_count: 0,
        max_photos: 4,
        created_at: Utc::now(),
        started_at: None,
        completed_at: None,
        expires_at: None,
        notes: None,
        photobooth: None,
        photos: Vec::new(),
        filter_ids: Vec::new(),
    }
}

pub(crate) fn page<T>(data: Vec<T>, page: u32, total_pages: u32) -> Page<T> {
    let total = data.len() as u64;
    Page {
        data,
        meta: PageMeta {
            page,
            limit: 20,
            total,
            total_pages,
            has_next: page < total_pages,
            has_prev: page > 1,
        },
    }
}

/// Scriptable backend recording every call as `"op:arg"`.
pub(crate) struct FakeBackend {
    pub user: Mutex<User>,
    pub token: String,
    failures: Mutex<HashMap<String, ApiError>>,
    statuses: Mutex<VecDeque<Result<SessionStatus, ApiError>>>,
    sessions: Mutex<HashMap<String, Session>>,
    history: Mutex<Vec<Page<Session>>>,
    frames: Mutex<Vec<FrameAsset>>,
    bank: Mutex<Option<BankInfo>>,
    calls: Mutex<Vec<String>>,
    next_id: Mutex<u32>,
}

impl FakeBackend {
    pub fn new(points: u64) -> Self {
        Self {
            user: Mutex::new(user_with_points(points)),
            token: "token-1".into(),
            failures: Mutex::new(HashMap::new()),
            statuses: Mutex::new(VecDeque::new()),
            sessions: Mutex::new(HashMap::new()),
            history: Mutex::new(Vec::new()),
            frames: Mutex::new(Vec::new()),
            bank: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            next_id: Mutex::new(0),
        }
    }

    /// Make every call whose key (`"op"` or `"op:arg"`) matches fail
    pub fn fail(&self, key: &str, error: ApiError) {
        self.failures.lock().unwrap().insert(key.to_string(), error);
    }

    pub fn succeed(&self, key: &str) {
        self.failures.lock().unwrap().remove(key);
    }

    pub fn set_points(&self, points: u64) {
        self.user.lock().unwrap().points = points;
    }

    /// Statuses returned by successive `session()` calls; `active` once drained
    pub fn push_status(&self, status: Result<SessionStatus, ApiError>) {
        self.statuses.lock().unwrap().push_back(status);
    }

    pub fn push_history(&self, page: Page<Session>) {
        self.history.lock().unwrap().push(page);
    }

    pub fn set_frames(&self, frames: Vec<FrameAsset>) {
        *self.frames.lock().unwrap() = frames;
    }

    pub fn set_bank(&self, bank: Option<BankInfo>) {
        *self.bank.lock().unwrap() = bank;
    }

    pub fn insert_session(&self, session: Session) {
        self.sessions.lock().unwrap().insert(session.id.clone(), session);
    }

    pub fn server_filters(&self, session_id: &str) -> Vec<String> {
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .map(|s| s.filter_ids.clone())
            .unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, op: &str) -> usize {
        let prefix = format!("{}:", op);
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| *c == op || c.starts_with(&prefix))
            .count()
    }

    fn record(&self, op: &str, arg: &str) -> Result<(), ApiError> {
        let key = if arg.is_empty() {
            op.to_string()
        } else {
            format!("{}:{}", op, arg)
        };
        self.calls.lock().unwrap().push(key.clone());

        let failures = self.failures.lock().unwrap();
        match failures.get(&key).or_else(|| failures.get(op)) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn stored(&self, session_id: &str) -> Result<Session, ApiError> {
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .ok_or_else(|| ApiError::with_status("Session not found", 404))
    }

    fn update<F: FnOnce(&mut Session)>(&self, session_id: &str, f: F) -> Result<Session, ApiError> {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| ApiError::with_status("Session not found", 404))?;
        f(session);
        Ok(session.clone())
    }
}

#[async_trait]
impl AuthApi for FakeBackend {
    async fn login(&self, email: &str, _password: &str) -> Result<AuthResult, ApiError> {
        self.record("login", email)?;
        Ok(AuthResult {
            message: "Login successful".into(),
            token: self.token.clone(),
            user: self.user.lock().unwrap().clone(),
        })
    }

    async fn register(&self, _name: &str, email: &str, _password: &str) -> Result<AuthResult, ApiError> {
        self.record("register", email)?;
        Ok(AuthResult {
            message: "Registered".into(),
            token: self.token.clone(),
            user: self.user.lock().unwrap().clone(),
        })
    }
}

#[async_trait]
impl UserApi for FakeBackend {
    async fn current_user(&self) -> Result<User, ApiError> {
        self.record("current_user", "")?;
        Ok(self.user.lock().unwrap().clone())
    }
}

#[async_trait]
impl BankApi for FakeBackend {
    async fn bank_info(&self) -> Result<Option<BankInfo>, ApiError> {
        self.record("bank_info", "")?;
        Ok(self.bank.lock().unwrap().clone())
    }
}

#[async_trait]
impl AssetApi for FakeBackend {
    async fn filters(&self, query: PageQuery) -> Result<Page<FilterAsset>, ApiError> {
        self.record("filters", &query.page.unwrap_or(1).to_string())?;
        Ok(page(Vec::new(), 1, 1))
    }

    async fn frames(&self, query: PageQuery) -> Result<Page<FrameAsset>, ApiError> {
        self.record("frames", &query.page.unwrap_or(1).to_string())?;
        Ok(page(self.frames.lock().unwrap().clone(), 1, 1))
    }
}

#[async_trait]
impl SessionApi for FakeBackend {
    async fn create_session(&self, request: CreateSessionRequest) -> Result<Session, ApiError> {
        self.record("create_session", &request.photobooth_id)?;
        let id = {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            format!("session-{}", next)
        };
        let created = session(&id, &request.photobooth_id, SessionStatus::Pending);
        self.insert_session(created.clone());
        Ok(created)
    }

    async fn start_session(&self, session_id: &str) -> Result<Session, ApiError> {
        self.record("start_session", session_id)?;
        self.update(session_id, |s| s.status = SessionStatus::Active)
    }

    async fn current_session(&self) -> Result<Option<Session>, ApiError> {
        self.record("current_session", "")?;
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .values()
            .find(|s| s.status == SessionStatus::Active)
            .cloned())
    }

    async fn start_capture(&self, session_id: &str) -> Result<StartCaptureResponse, ApiError> {
        self.record("start_capture", session_id)?;
        Ok(StartCaptureResponse {
            message: "Capture started".into(),
            session_id: session_id.to_string(),
        })
    }

    async fn add_filter(&self, session_id: &str, filter_id: &str) -> Result<Session, ApiError> {
        self.record("add_filter", filter_id)?;
        self.update(session_id, |s| {
            if !s.filter_ids.iter().any(|f| f == filter_id) {
                s.filter_ids.push(filter_id.to_string());
            }
        })
    }

    async fn remove_filter(&self, session_id: &str, filter_id: &str) -> Result<Session, ApiError> {
        self.record("remove_filter", filter_id)?;
        self.update(session_id, |s| s.filter_ids.retain(|f| f != filter_id))
    }

    async fn cancel_session(&self, session_id: &str) -> Result<Session, ApiError> {
        self.record("cancel_session", session_id)?;
        self.update(session_id, |s| s.status = SessionStatus::Cancelled)
    }

    async fn session(&self, session_id: &str) -> Result<Session, ApiError> {
        self.record("session", session_id)?;
        let scripted = self.statuses.lock().unwrap().pop_front();
        match scripted {
            Some(Ok(status)) => self.update(session_id, |s| s.status = status),
            Some(Err(error)) => Err(error),
            None => self.stored(session_id),
        }
    }

    async fn user_sessions(&self, query: PageQuery) -> Result<Page<Session>, ApiError> {
        let page_no = query.page.unwrap_or(1);
        self.record("user_sessions", &page_no.to_string())?;
        self.history
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.meta.page == page_no)
            .cloned()
            .ok_or_else(|| ApiError::with_status("Page not found", 404))
    }
}
