//! Scan flow: permission, capture, analysis, result and journal save.
//!
//! [`ScanSession`] is the synchronous state machine. Every phase carries only
//! the data valid in it, so e.g. a result can never coexist with an active
//! camera. [`ScanController`] drives it against the capture source, analyzer
//! and journal, running each analysis as a detached task whose completion is
//! matched back by [`AnalysisTicket`].

use crate::analysis::{AnalysisResult, Analyzer};
use crate::capture::{CaptureInfo, CaptureOrigin, CaptureSource, ImageHandle, PermissionStatus};
use crate::error::{AnalysisError, CaptureError, FailureKind, TransitionError};
use crate::journal::{JournalEntry, JournalStore};
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// The capture stage an analysis was started from, and returns to on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStage {
    Camera,
    Gallery,
}

/// Correlates an analysis completion with the submission that started it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnalysisTicket(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanPhase {
    Idle,
    PermissionPending,
    /// Recoverable: the prompt may be shown again or the flow cancelled.
    PermissionDenied,
    CameraActive,
    GalleryPending,
    Analyzing {
        stage: CaptureStage,
        image: CaptureInfo,
        ticket: AnalysisTicket,
    },
    Result {
        image: CaptureInfo,
        result: AnalysisResult,
        journal_note: String,
    },
}

impl ScanPhase {
    pub fn name(&self) -> &'static str {
        match self {
            ScanPhase::Idle => "idle",
            ScanPhase::PermissionPending => "waiting for permission",
            ScanPhase::PermissionDenied => "permission denied",
            ScanPhase::CameraActive => "camera active",
            ScanPhase::GalleryPending => "choosing from gallery",
            ScanPhase::Analyzing { .. } => "analyzing",
            ScanPhase::Result { .. } => "showing result",
        }
    }
}

/// Something the UI should show without leaving the current phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanNotice {
    PermissionDenied,
    AnalysisFailed { kind: FailureKind, message: String },
    JournalSaveFailed { message: String },
}

impl ScanNotice {
    fn from_analysis(err: &AnalysisError) -> Self {
        let message = match err.kind() {
            FailureKind::Transport => "Couldn't reach the scan service. Please try again.",
            FailureKind::Service => "The scan service is unavailable. Please try again.",
            FailureKind::Precondition => "The capture was empty. Please take another photo.",
            _ => "Something went wrong reading your scan.",
        };
        ScanNotice::AnalysisFailed {
            kind: err.kind(),
            message: message.to_string(),
        }
    }
}

/// Effect of applying an analysis completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanUpdate {
    /// The completion belonged to an abandoned submission and was dropped.
    Stale,
    ResultReady,
    Failed(ScanNotice),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSession {
    phase: ScanPhase,
    next_ticket: u64,
}

impl Default for ScanSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanSession {
    pub fn new() -> Self {
        Self {
            phase: ScanPhase::Idle,
            next_ticket: 1,
        }
    }

    pub fn phase(&self) -> &ScanPhase {
        &self.phase
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.phase, ScanPhase::Idle)
    }

    pub fn is_analyzing(&self) -> bool {
        matches!(self.phase, ScanPhase::Analyzing { .. })
    }

    pub fn pending_image(&self) -> Option<&CaptureInfo> {
        match &self.phase {
            ScanPhase::Analyzing { image, .. } | ScanPhase::Result { image, .. } => Some(image),
            _ => None,
        }
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        match &self.phase {
            ScanPhase::Result { result, .. } => Some(result),
            _ => None,
        }
    }

    pub fn journal_note(&self) -> &str {
        match &self.phase {
            ScanPhase::Result { journal_note, .. } => journal_note,
            _ => "",
        }
    }

    pub fn open_camera(&mut self) -> Result<(), TransitionError> {
        match self.phase {
            ScanPhase::Idle | ScanPhase::PermissionDenied => {
                self.enter(ScanPhase::PermissionPending);
                Ok(())
            }
            _ => Err(self.reject("open the camera")),
        }
    }

    pub fn permission_resolved(
        &mut self,
        status: PermissionStatus,
    ) -> Result<Option<ScanNotice>, TransitionError> {
        if !matches!(self.phase, ScanPhase::PermissionPending) {
            return Err(self.reject("resolve permission"));
        }
        match status {
            PermissionStatus::Granted => {
                self.enter(ScanPhase::CameraActive);
                Ok(None)
            }
            PermissionStatus::Denied => {
                self.enter(ScanPhase::PermissionDenied);
                Ok(Some(ScanNotice::PermissionDenied))
            }
        }
    }

    pub fn open_gallery(&mut self) -> Result<(), TransitionError> {
        match self.phase {
            ScanPhase::Idle | ScanPhase::GalleryPending => {
                self.enter(ScanPhase::GalleryPending);
                Ok(())
            }
            _ => Err(self.reject("open the gallery")),
        }
    }

    /// Backs out of any pre-analysis stage. No analysis is issued.
    pub fn cancel_capture(&mut self) -> Result<(), TransitionError> {
        match self.phase {
            ScanPhase::Idle => Ok(()),
            ScanPhase::PermissionPending
            | ScanPhase::PermissionDenied
            | ScanPhase::CameraActive
            | ScanPhase::GalleryPending => {
                self.enter(ScanPhase::Idle);
                Ok(())
            }
            _ => Err(self.reject("cancel capture")),
        }
    }

    /// Moves into `Analyzing`. Only one submission may be outstanding.
    pub fn begin_analysis(&mut self, image: CaptureInfo) -> Result<AnalysisTicket, TransitionError> {
        let stage = match self.phase {
            ScanPhase::CameraActive => CaptureStage::Camera,
            ScanPhase::GalleryPending => CaptureStage::Gallery,
            _ => return Err(self.reject("submit a capture")),
        };
        let ticket = AnalysisTicket(self.next_ticket);
        self.next_ticket += 1;
        self.enter(ScanPhase::Analyzing {
            stage,
            image,
            ticket,
        });
        Ok(ticket)
    }

    pub fn finish_analysis(
        &mut self,
        ticket: AnalysisTicket,
        outcome: Result<AnalysisResult, AnalysisError>,
    ) -> ScanUpdate {
        let ScanPhase::Analyzing {
            stage,
            image,
            ticket: current,
        } = &self.phase
        else {
            debug!(?ticket, "dropping analysis for abandoned scan");
            return ScanUpdate::Stale;
        };
        if *current != ticket {
            debug!(?ticket, "dropping analysis for superseded scan");
            return ScanUpdate::Stale;
        }

        match outcome {
            Ok(result) => {
                let image = image.clone();
                self.enter(ScanPhase::Result {
                    image,
                    result,
                    journal_note: String::new(),
                });
                ScanUpdate::ResultReady
            }
            Err(err) => {
                if err.kind() == FailureKind::Protocol {
                    error!(error = %err, "analysis service returned an unusable response");
                } else {
                    warn!(error = %err, "analysis failed");
                }
                let back_to = match stage {
                    CaptureStage::Camera => ScanPhase::CameraActive,
                    CaptureStage::Gallery => ScanPhase::GalleryPending,
                };
                self.enter(back_to);
                ScanUpdate::Failed(ScanNotice::from_analysis(&err))
            }
        }
    }

    pub fn set_journal_note(&mut self, note: impl Into<String>) -> Result<(), TransitionError> {
        if let ScanPhase::Result { journal_note, .. } = &mut self.phase {
            *journal_note = note.into();
            return Ok(());
        }
        Err(self.reject("edit the journal note"))
    }

    /// Drops the result. Calling it again while idle is a no-op.
    pub fn discard(&mut self) -> Result<(), TransitionError> {
        match self.phase {
            ScanPhase::Idle => Ok(()),
            ScanPhase::Result { .. } => {
                self.enter(ScanPhase::Idle);
                Ok(())
            }
            _ => Err(self.reject("discard")),
        }
    }

    /// Resets to `Idle` and hands back what should be journaled.
    pub fn take_for_save(&mut self) -> Result<JournalEntry, TransitionError> {
        match std::mem::replace(&mut self.phase, ScanPhase::Idle) {
            ScanPhase::Result {
                image,
                result,
                journal_note,
            } => {
                info!("scan saved, session reset");
                Ok(JournalEntry {
                    timestamp: Utc::now(),
                    // Camera frames are never kept on disk, so only a
                    // gallery pick has an address worth recording.
                    source_uri: (image.origin == CaptureOrigin::Gallery)
                        .then_some(image.source_uri),
                    result,
                    note: journal_note,
                })
            }
            other => {
                self.phase = other;
                Err(self.reject("save"))
            }
        }
    }

    /// The screen went away. Any outstanding analysis becomes stale.
    pub fn abandon(&mut self) {
        if !self.is_idle() {
            self.enter(ScanPhase::Idle);
        }
    }

    fn enter(&mut self, next: ScanPhase) {
        debug!(from = self.phase.name(), to = next.name(), "scan transition");
        self.phase = next;
    }

    fn reject(&self, action: &'static str) -> TransitionError {
        TransitionError {
            action,
            phase: self.phase.name(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
}

#[derive(Debug)]
struct AnalysisCompletion {
    ticket: AnalysisTicket,
    outcome: Result<AnalysisResult, AnalysisError>,
}

pub struct ScanController {
    session: ScanSession,
    source: Arc<dyn CaptureSource>,
    analyzer: Arc<dyn Analyzer>,
    journal: Arc<dyn JournalStore>,
    completion_tx: mpsc::UnboundedSender<AnalysisCompletion>,
    completion_rx: mpsc::UnboundedReceiver<AnalysisCompletion>,
}

impl ScanController {
    pub fn new(
        source: Arc<dyn CaptureSource>,
        analyzer: Arc<dyn Analyzer>,
        journal: Arc<dyn JournalStore>,
    ) -> Self {
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        Self {
            session: ScanSession::new(),
            source,
            analyzer,
            journal,
            completion_tx,
            completion_rx,
        }
    }

    pub fn session(&self) -> &ScanSession {
        &self.session
    }

    /// Shows the permission prompt and, if granted, activates the camera.
    pub async fn open_camera(&mut self) -> Result<Option<ScanNotice>, ScanError> {
        self.session.open_camera()?;
        let status = self.source.request_permission().await;
        Ok(self.session.permission_resolved(status)?)
    }

    /// Takes a photo and submits it. Rejected unless the camera is active.
    pub async fn capture(&mut self) -> Result<AnalysisTicket, ScanError> {
        if !matches!(self.session.phase(), ScanPhase::CameraActive) {
            return Err(self.session.reject("capture").into());
        }
        let image = self.source.capture_from_camera().await?;
        Ok(self.submit(image)?)
    }

    /// Lets the user pick an image and submits it.
    ///
    /// Returns `Ok(None)` when the user backs out; the session is idle again.
    pub async fn pick_from_gallery(&mut self) -> Result<Option<AnalysisTicket>, ScanError> {
        self.session.open_gallery()?;
        match self.source.pick_from_gallery().await {
            Ok(image) => Ok(Some(self.submit(image)?)),
            Err(CaptureError::SelectionCancelled) => {
                self.session.cancel_capture()?;
                Ok(None)
            }
            Err(err) => {
                warn!(error = %err, "gallery selection failed");
                self.session.cancel_capture()?;
                Err(err.into())
            }
        }
    }

    pub fn cancel_capture(&mut self) -> Result<(), ScanError> {
        Ok(self.session.cancel_capture()?)
    }

    /// Waits for the outstanding analysis, if any, and applies it.
    ///
    /// Completions from abandoned submissions are skipped.
    pub async fn next_update(&mut self) -> Option<ScanUpdate> {
        while self.session.is_analyzing() {
            let completion = self.completion_rx.recv().await?;
            match self
                .session
                .finish_analysis(completion.ticket, completion.outcome)
            {
                ScanUpdate::Stale => continue,
                update => return Some(update),
            }
        }
        None
    }

    pub fn set_journal_note(&mut self, note: impl Into<String>) -> Result<(), ScanError> {
        Ok(self.session.set_journal_note(note)?)
    }

    pub fn discard(&mut self) -> Result<(), ScanError> {
        Ok(self.session.discard()?)
    }

    /// Resets the session, then persists best-effort.
    pub async fn save(&mut self) -> Result<Option<ScanNotice>, ScanError> {
        let entry = self.session.take_for_save()?;
        match self.journal.save(&entry).await {
            Ok(()) => Ok(None),
            Err(err) => {
                warn!(error = %err, "journal save failed");
                Ok(Some(ScanNotice::JournalSaveFailed {
                    message: format!("Your scan couldn't be saved: {err}"),
                }))
            }
        }
    }

    /// Leaves the screen. An in-flight request runs to completion and is ignored.
    pub fn abandon(&mut self) {
        self.session.abandon();
    }

    fn submit(&mut self, image: ImageHandle) -> Result<AnalysisTicket, TransitionError> {
        let ticket = self.session.begin_analysis(image.info().clone())?;
        let analyzer = Arc::clone(&self.analyzer);
        let completion_tx = self.completion_tx.clone();
        tokio::spawn(async move {
            let outcome = analyzer.analyze(image).await;
            let _ = completion_tx.send(AnalysisCompletion { ticket, outcome });
        });
        info!(?ticket, "analysis dispatched");
        Ok(ticket)
    }
}

#[cfg(test)]
mod tests {
    use super::{ScanController, ScanNotice, ScanPhase, ScanSession, ScanUpdate};
    use crate::analysis::{AnalysisResult, Analyzer, ScriptedAnalyzer};
    use crate::capture::{
        AlwaysGrant, CaptureInfo, CaptureOrigin, CommandCaptureSource, FixedGalleryPicker,
        ImageHandle, PermissionStatus, StaticCaptureSource,
    };
    use crate::error::{AnalysisError, FailureKind};
    use crate::journal::{JournalEntry, JournalStore, MarkdownJournal};
    use crate::presentation::PresentationToken;
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::tempdir;

    fn fear_result() -> AnalysisResult {
        AnalysisResult {
            stress_level: 65,
            emotion_label: "fear".to_string(),
            explanation: "tight jaw".to_string(),
        }
    }

    fn camera_info() -> CaptureInfo {
        CaptureInfo {
            source_uri: "memory://camera".to_string(),
            origin: CaptureOrigin::Camera,
        }
    }

    struct CountingAnalyzer {
        calls: AtomicUsize,
        outcomes: Vec<Result<AnalysisResult, AnalysisError>>,
        delay: Duration,
    }

    impl CountingAnalyzer {
        fn new(outcomes: Vec<Result<AnalysisResult, AnalysisError>>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                outcomes,
                delay: Duration::from_millis(100),
            }
        }
    }

    #[async_trait]
    impl Analyzer for CountingAnalyzer {
        async fn analyze(&self, _image: ImageHandle) -> Result<AnalysisResult, AnalysisError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.outcomes[call.min(self.outcomes.len() - 1)].clone()
        }
    }

    struct NullJournal;

    #[async_trait]
    impl JournalStore for NullJournal {
        async fn save(&self, _entry: &JournalEntry) -> Result<()> {
            Ok(())
        }
    }

    struct BrokenJournal;

    #[async_trait]
    impl JournalStore for BrokenJournal {
        async fn save(&self, _entry: &JournalEntry) -> Result<()> {
            Err(anyhow!("disk full"))
        }
    }

    fn controller(analyzer: Arc<dyn Analyzer>) -> ScanController {
        ScanController::new(
            Arc::new(StaticCaptureSource::default()),
            analyzer,
            Arc::new(NullJournal),
        )
    }

    fn assert_cleared(session: &ScanSession) {
        assert!(session.is_idle());
        assert!(session.pending_image().is_none());
        assert!(session.result().is_none());
        assert_eq!(session.journal_note(), "");
    }

    #[test]
    fn second_submission_is_rejected_while_analyzing() {
        let mut session = ScanSession::new();
        session.open_camera().expect("open");
        session
            .permission_resolved(PermissionStatus::Granted)
            .expect("granted");
        session.begin_analysis(camera_info()).expect("first submit");

        let err = session.begin_analysis(camera_info()).expect_err("second submit");
        assert_eq!(err.phase, "analyzing");
    }

    #[test]
    fn denied_permission_is_recoverable() {
        let mut session = ScanSession::new();
        session.open_camera().expect("open");
        let notice = session
            .permission_resolved(PermissionStatus::Denied)
            .expect("resolved");
        assert_eq!(notice, Some(ScanNotice::PermissionDenied));
        assert_eq!(session.phase(), &ScanPhase::PermissionDenied);

        session.open_camera().expect("prompt again");
        session
            .permission_resolved(PermissionStatus::Granted)
            .expect("granted");
        assert_eq!(session.phase(), &ScanPhase::CameraActive);
    }

    #[test]
    fn cancelling_camera_returns_to_idle_without_analysis() {
        let mut session = ScanSession::new();
        session.open_camera().expect("open");
        session
            .permission_resolved(PermissionStatus::Granted)
            .expect("granted");
        session.cancel_capture().expect("cancel");
        assert_cleared(&session);
    }

    #[test]
    fn result_only_accepts_notes_in_result_phase() {
        let mut session = ScanSession::new();
        assert!(session.set_journal_note("hi").is_err());
        assert!(session.take_for_save().is_err());
    }

    #[test]
    fn stale_ticket_does_not_touch_state() {
        let mut session = ScanSession::new();
        session.open_camera().expect("open");
        session
            .permission_resolved(PermissionStatus::Granted)
            .expect("granted");
        let ticket = session.begin_analysis(camera_info()).expect("submit");
        session.abandon();

        assert_eq!(
            session.finish_analysis(ticket, Ok(fear_result())),
            ScanUpdate::Stale
        );
        assert_cleared(&session);
    }

    #[tokio::test(start_paused = true)]
    async fn successful_scan_then_discard_clears_everything() {
        let mut scan = controller(Arc::new(ScriptedAnalyzer::new(
            fear_result(),
            Duration::from_secs(2),
        )));

        assert_eq!(scan.open_camera().await.expect("open"), None);
        scan.capture().await.expect("capture");
        assert!(scan.session().is_analyzing());
        assert!(scan.capture().await.is_err(), "repeat capture is blocked");

        assert_eq!(scan.next_update().await, Some(ScanUpdate::ResultReady));
        let result = scan.session().result().expect("result");
        assert_eq!(result.stress_level, 65);
        assert_eq!(result.presentation(), PresentationToken::Fear);

        scan.set_journal_note("before presentation").expect("note");
        assert_eq!(scan.session().journal_note(), "before presentation");

        scan.discard().expect("discard");
        assert_cleared(scan.session());
        scan.discard().expect("discard is idempotent");
        assert_cleared(scan.session());
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_returns_to_camera_and_allows_retry() {
        let analyzer = Arc::new(CountingAnalyzer::new(vec![
            Err(AnalysisError::Transport("request timed out".to_string())),
            Ok(fear_result()),
        ]));
        let mut scan = controller(analyzer.clone());

        scan.open_camera().await.expect("open");
        scan.capture().await.expect("capture");
        match scan.next_update().await {
            Some(ScanUpdate::Failed(ScanNotice::AnalysisFailed { kind, .. })) => {
                assert_eq!(kind, FailureKind::Transport)
            }
            other => panic!("unexpected update {other:?}"),
        }
        assert_eq!(scan.session().phase(), &ScanPhase::CameraActive);
        assert!(scan.session().result().is_none());

        scan.capture().await.expect("retry accepted");
        assert_eq!(scan.next_update().await, Some(ScanUpdate::ResultReady));
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn gallery_failure_returns_to_gallery_stage() {
        let mut scan = controller(Arc::new(CountingAnalyzer::new(vec![Err(
            AnalysisError::Service { status_code: 502 },
        )])));

        scan.pick_from_gallery().await.expect("pick").expect("selected");
        assert!(matches!(
            scan.next_update().await,
            Some(ScanUpdate::Failed(_))
        ));
        assert_eq!(scan.session().phase(), &ScanPhase::GalleryPending);
    }

    #[tokio::test]
    async fn cancelled_gallery_pick_stays_idle() {
        let source = StaticCaptureSource {
            gallery_bytes: None,
            ..StaticCaptureSource::default()
        };
        let analyzer = Arc::new(CountingAnalyzer::new(vec![Ok(fear_result())]));
        let mut scan = ScanController::new(Arc::new(source), analyzer.clone(), Arc::new(NullJournal));

        assert_eq!(scan.pick_from_gallery().await.expect("no error"), None);
        assert_cleared(scan.session());
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn denied_camera_never_captures() {
        let source = StaticCaptureSource {
            permission: PermissionStatus::Denied,
            ..StaticCaptureSource::default()
        };
        let analyzer = Arc::new(CountingAnalyzer::new(vec![Ok(fear_result())]));
        let mut scan = ScanController::new(Arc::new(source), analyzer.clone(), Arc::new(NullJournal));

        assert_eq!(
            scan.open_camera().await.expect("open"),
            Some(ScanNotice::PermissionDenied)
        );
        assert!(scan.capture().await.is_err());
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_analysis_is_ignored() {
        let analyzer = Arc::new(CountingAnalyzer::new(vec![
            Ok(AnalysisResult {
                stress_level: 10,
                emotion_label: "happy".to_string(),
                explanation: "old".to_string(),
            }),
            Ok(fear_result()),
        ]));
        let mut scan = controller(analyzer.clone());

        scan.open_camera().await.expect("open");
        scan.capture().await.expect("capture");
        scan.abandon();
        assert_eq!(scan.next_update().await, None);
        assert_cleared(scan.session());

        scan.open_camera().await.expect("reopen");
        scan.capture().await.expect("capture again");
        assert_eq!(scan.next_update().await, Some(ScanUpdate::ResultReady));
        assert_eq!(scan.session().result(), Some(&fear_result()));
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn save_writes_journal_and_resets() {
        let temp = tempdir().expect("tempdir");
        let journal_path = temp.path().join("journal.md");
        let mut scan = ScanController::new(
            Arc::new(StaticCaptureSource::default()),
            Arc::new(ScriptedAnalyzer::new(fear_result(), Duration::from_millis(10))),
            Arc::new(MarkdownJournal::new(&journal_path)),
        );

        scan.open_camera().await.expect("open");
        scan.capture().await.expect("capture");
        scan.next_update().await;
        scan.set_journal_note("deadline week").expect("note");

        assert_eq!(scan.save().await.expect("save"), None);
        assert_cleared(scan.session());
        let content = std::fs::read_to_string(&journal_path).expect("journal");
        assert!(content.contains("Note: deadline week"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn camera_capture_leaves_nothing_on_disk() {
        let temp = tempdir().expect("tempdir");
        let fixture = temp.path().join("frame.jpg");
        let mut frame = vec![0xFF, 0xD8, 0xFF];
        frame.extend_from_slice(b"frame");
        std::fs::write(&fixture, frame).expect("fixture");
        let captures = temp.path().join("captures");
        let journal_path = temp.path().join("journal.md");

        let source = CommandCaptureSource::new(
            vec![
                "cp".to_string(),
                fixture.to_string_lossy().into_owned(),
                "{output}".to_string(),
            ],
            &captures,
            Arc::new(AlwaysGrant),
            Arc::new(FixedGalleryPicker::default()),
        );
        let mut scan = ScanController::new(
            Arc::new(source),
            Arc::new(ScriptedAnalyzer::new(fear_result(), Duration::ZERO)),
            Arc::new(MarkdownJournal::new(&journal_path)),
        );

        scan.open_camera().await.expect("open");
        scan.capture().await.expect("capture");
        assert_eq!(scan.next_update().await, Some(ScanUpdate::ResultReady));
        scan.discard().expect("discard");
        assert_cleared(scan.session());
        assert_eq!(std::fs::read_dir(&captures).expect("captures").count(), 0);

        scan.open_camera().await.expect("reopen");
        scan.capture().await.expect("capture again");
        scan.next_update().await;
        assert_eq!(scan.save().await.expect("save"), None);
        assert_eq!(std::fs::read_dir(&captures).expect("captures").count(), 0);
        let content = std::fs::read_to_string(&journal_path).expect("journal");
        assert!(!content.contains("Image:"));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_save_still_resets() {
        let mut scan = ScanController::new(
            Arc::new(StaticCaptureSource::default()),
            Arc::new(ScriptedAnalyzer::new(fear_result(), Duration::from_millis(10))),
            Arc::new(BrokenJournal),
        );

        scan.pick_from_gallery().await.expect("pick");
        scan.next_update().await;
        let notice = scan.save().await.expect("save returns");
        assert!(matches!(notice, Some(ScanNotice::JournalSaveFailed { .. })));
        assert_cleared(scan.session());
    }
}
