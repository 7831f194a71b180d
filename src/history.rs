//! Session history feed and the per-session detail view.

use crate::api::{ApiError, AssetApi, FrameAsset, PageQuery, Session, SessionApi};
use crate::config::PAGE_LIMIT;

/// Paginated list of the user's past sessions, newest first as served
#[derive(Debug, Clone, Default)]
pub struct HistoryFeed {
    pub sessions: Vec<Session>,
    pub page: u32,
    pub has_more: bool,
    pub is_loading: bool,
}

impl HistoryFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reload from the first page, replacing what is shown
    pub async fn refresh<B: SessionApi + ?Sized>(&mut self, api: &B) -> Result<(), ApiError> {
        self.is_loading = true;
        let result = api.user_sessions(PageQuery::new(1, PAGE_LIMIT)).await;
        self.is_loading = false;

        let page = result?;
        self.has_more = page.has_more();
        self.page = page.meta.page;
        self.sessions = page.data;
        log::debug!("Loaded {} sessions, more: {}", self.sessions.len(), self.has_more);
        Ok(())
    }

    /// Append the next page. Returns `false` when there was nothing to load.
    pub async fn load_more<B: SessionApi + ?Sized>(&mut self, api: &B) -> Result<bool, ApiError> {
        if self.is_loading || !self.has_more {
            return Ok(false);
        }

        self.is_loading = true;
        let result = api.user_sessions(PageQuery::new(self.page + 1, PAGE_LIMIT)).await;
        self.is_loading = false;

        let page = result?;
        self.has_more = page.has_more();
        self.page = page.meta.page;
        self.sessions.extend(page.data);
        Ok(true)
    }
}

/// One session with the frames the user can pick for it
#[derive(Debug, Clone)]
pub struct SessionDetail {
    pub session: Session,
    pub frames: Vec<FrameAsset>,
    pub selected_frame: Option<String>,
}

impl SessionDetail {
    pub async fn load<B>(api: &B, session_id: &str) -> Result<Self, ApiError>
    where
        B: SessionApi + AssetApi + ?Sized,
    {
        let session = api.session(session_id).await?;

        let frames = match api.frames(PageQuery::new(1, PAGE_LIMIT)).await {
            Ok(page) => page.data,
            Err(e) => {
                log::warn!("Frames unavailable: {}", e);
                Vec::new()
            }
        };
        let selected_frame = frames.first().map(|f| f.id.clone());

        Ok(Self {
            session,
            frames,
            selected_frame,
        })
    }

    /// Select a frame by id; unknown ids are ignored
    pub fn select_frame(&mut self, frame_id: &str) -> bool {
        if self.frames.iter().any(|f| f.id == frame_id) {
            self.selected_frame = Some(frame_id.to_string());
            true
        } else {
            false
        }
    }

    pub fn selected(&self) -> Option<&FrameAsset> {
        let id = self.selected_frame.as_deref()?;
        self.frames.iter().find(|f| f.id == id)
    }
}
