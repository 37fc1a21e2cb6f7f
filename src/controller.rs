use thiserror::Error;
use tracing::{debug, warn};

use crate::api::ApiGateway;
use crate::error::ApiError;
use crate::models::{AnalysisResult, AuthToken, ResumeFile};
use crate::session::AuthSession;

#[derive(Debug, Clone, PartialEq)]
pub enum UploadState {
    Idle,
    FileSelected,
    Analyzing,
    Ready(AnalysisResult),
    Failed(ApiError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Analyze,
    LoadLast,
}

/// Why a user action was refused before anything was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("Pick a file first")]
    NoFileSelected,
    #[error("Analysis already in progress")]
    Busy,
}

/// What `complete` did with a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Ready,
    Failed,
    /// Not the latest request; dropped without touching state.
    Stale,
}

/// A request the controller has committed to; run it with `dispatch`.
#[derive(Debug)]
pub struct PendingRequest {
    seq: u64,
    call: Call,
}

#[derive(Debug)]
enum Call {
    Upload(ResumeFile),
    FetchLast,
}

/// Outcome of a dispatched request, to be handed back to `complete`.
#[derive(Debug)]
pub struct Response {
    seq: u64,
    kind: RequestKind,
    outcome: Result<AnalysisResult, ApiError>,
}

impl PendingRequest {
    pub fn kind(&self) -> RequestKind {
        match self.call {
            Call::Upload(_) => RequestKind::Analyze,
            Call::FetchLast => RequestKind::LoadLast,
        }
    }

    pub async fn dispatch(self, gateway: &ApiGateway, token: Option<&AuthToken>) -> Response {
        let kind = self.kind();
        let outcome = match self.call {
            Call::Upload(file) => gateway.upload(file, token).await,
            Call::FetchLast => gateway.fetch_last(token).await,
        };
        Response {
            seq: self.seq,
            kind,
            outcome,
        }
    }
}

/// Drives file selection, analysis and last-result retrieval.
///
/// `loading` is the only re-entrancy guard: while a request is out every
/// new action is rejected with `Rejection::Busy`.
#[derive(Debug)]
pub struct UploadController {
    state: UploadState,
    selected: Option<ResumeFile>,
    loading: Option<RequestKind>,
    last_seq: u64,
}

impl Default for UploadController {
    fn default() -> Self {
        Self::new()
    }
}

impl UploadController {
    pub fn new() -> Self {
        Self {
            state: UploadState::Idle,
            selected: None,
            loading: None,
            last_seq: 0,
        }
    }

    pub fn state(&self) -> &UploadState {
        &self.state
    }

    pub fn is_loading(&self) -> bool {
        self.loading.is_some()
    }

    pub fn selected_file(&self) -> Option<&ResumeFile> {
        self.selected.as_ref()
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        match &self.state {
            UploadState::Ready(result) => Some(result),
            _ => None,
        }
    }

    pub fn select_file(&mut self, file: ResumeFile) -> Result<(), Rejection> {
        if self.is_loading() {
            return Err(Rejection::Busy);
        }
        debug!(file = %file.file_name, "file selected");
        self.selected = Some(file);
        self.state = UploadState::FileSelected;
        Ok(())
    }

    pub fn begin_analyze(&mut self) -> Result<PendingRequest, Rejection> {
        if self.is_loading() {
            return Err(Rejection::Busy);
        }
        let file = self.selected.take().ok_or(Rejection::NoFileSelected)?;
        Ok(self.begin(Call::Upload(file)))
    }

    pub fn begin_load_last(&mut self) -> Result<PendingRequest, Rejection> {
        if self.is_loading() {
            return Err(Rejection::Busy);
        }
        Ok(self.begin(Call::FetchLast))
    }

    fn begin(&mut self, call: Call) -> PendingRequest {
        self.last_seq += 1;
        let pending = PendingRequest {
            seq: self.last_seq,
            call,
        };
        self.loading = Some(pending.kind());
        self.state = UploadState::Analyzing;
        debug!(seq = pending.seq, kind = ?pending.kind(), "request started");
        pending
    }

    pub fn complete(&mut self, response: Response) -> Applied {
        if response.seq != self.last_seq || self.loading.is_none() {
            warn!(seq = response.seq, latest = self.last_seq, "discarding stale response");
            return Applied::Stale;
        }

        self.loading = None;
        match response.outcome {
            Ok(result) => {
                debug!(seq = response.seq, kind = ?response.kind, "request succeeded");
                self.state = UploadState::Ready(result);
                Applied::Ready
            }
            Err(error) => {
                warn!(seq = response.seq, kind = ?response.kind, "request failed: {}", error);
                self.state = UploadState::Failed(error);
                Applied::Failed
            }
        }
    }

    pub async fn analyze(
        &mut self,
        gateway: &ApiGateway,
        session: &mut AuthSession,
    ) -> Result<Applied, Rejection> {
        let pending = self.begin_analyze()?;
        let response = pending.dispatch(gateway, session.token().as_ref()).await;
        Ok(self.settle(response, session))
    }

    pub async fn load_last(
        &mut self,
        gateway: &ApiGateway,
        session: &mut AuthSession,
    ) -> Result<Applied, Rejection> {
        let pending = self.begin_load_last()?;
        let response = pending.dispatch(gateway, session.token().as_ref()).await;
        Ok(self.settle(response, session))
    }

    fn settle(&mut self, response: Response, session: &mut AuthSession) -> Applied {
        let applied = self.complete(response);
        if let UploadState::Failed(error) = &self.state {
            session.forget_if_rejected(error);
        }
        applied
    }

    /// One-line status for the current state.
    pub fn status_line(&self) -> String {
        match &self.state {
            UploadState::Idle => "Pick a resume (.pdf, .docx, .txt) to analyze.".to_string(),
            UploadState::FileSelected => match &self.selected {
                Some(file) => format!("Selected {}. Press analyze.", file.file_name),
                None => "Pick a file first".to_string(),
            },
            UploadState::Analyzing => match self.loading {
                Some(RequestKind::LoadLast) => "Loading last result…".to_string(),
                _ => "Analyzing…".to_string(),
            },
            UploadState::Ready(_) => "Analysis ready.".to_string(),
            UploadState::Failed(error) => error.user_message(),
        }
    }
}
