use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use tracing::{info, instrument, warn};

use crate::buffer::DocumentInstance;
use crate::document::{DocumentId, DocumentProvider, PageRect};
use crate::error::ViewerError;
use crate::state::{PersistedDocumentState, StateStore};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    NextPage { count: usize },
    PrevPage { count: usize },
    GotoPage { page: usize },
    GotoLastPage,
    GotoLogicalPage { label: String },
    GoBack,
    NextChapter { count: usize },
    PrevChapter { count: usize },
    Rotate { quarter_turns: i32 },
    CycleCrop,
    SetManualCrop { rect: PageRect },
    ToggleAlpha,
    ToggleInvert,
    ToggleTint,
    CyclePaperSize,
    AdjustFontSize { delta: f32 },
    SetPageLabel { number: i64 },
    SwitchDocument { index: usize },
    CycleDocument,
    CloseDocument { index: usize },
    CloseActiveDocument,
    Refresh,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    DocumentOpened(DocumentId),
    DocumentClosed(DocumentId),
    ActiveDocumentChanged(DocumentId),
    RedrawNeeded(DocumentId),
    /// Text for the status bar.
    Notice(String),
    /// The last buffer was closed.
    SessionEnded,
}

/// The buffer list: every open document plus the active index.
pub struct Session {
    documents: Vec<DocumentInstance>,
    active: usize,
    store: Arc<dyn StateStore>,
    events: Arc<Mutex<Vec<SessionEvent>>>,
    ignore_cache: bool,
    default_state: PersistedDocumentState,
}

impl Session {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            documents: Vec::new(),
            active: 0,
            store,
            events: Arc::new(Mutex::new(Vec::new())),
            ignore_cache: false,
            default_state: PersistedDocumentState::default(),
        }
    }

    /// First-page offset given to documents that have no persisted state.
    pub fn set_default_first_page_offset(&mut self, offset: i64) {
        self.default_state.first_page_offset = offset;
    }

    /// Skip restoring persisted state when opening documents.
    pub fn set_ignore_cache(&mut self, ignore: bool) {
        self.ignore_cache = ignore;
    }

    pub fn events(&self) -> Arc<Mutex<Vec<SessionEvent>>> {
        Arc::clone(&self.events)
    }

    pub fn drain_events(&self) -> Vec<SessionEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    fn emit(&self, event: SessionEvent) {
        self.events.lock().push(event);
    }

    pub fn active(&self) -> Option<&DocumentInstance> {
        self.documents.get(self.active)
    }

    pub fn active_mut(&mut self) -> Option<&mut DocumentInstance> {
        self.documents.get_mut(self.active)
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn documents(&self) -> &[DocumentInstance] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    #[instrument(skip(self, provider))]
    pub async fn open_with<P: DocumentProvider + ?Sized>(
        &mut self,
        provider: &P,
        path: PathBuf,
    ) -> Result<()> {
        let backend = provider.open(&path).await?;
        let info = backend.info().clone();
        let state = if self.ignore_cache {
            self.default_state.clone()
        } else {
            self.store
                .load(&info)
                .unwrap_or_else(|err| {
                    warn!(?err, path = %info.path.display(), "discarding unreadable state");
                    None
                })
                .unwrap_or_else(|| self.default_state.clone())
        };
        let doc = DocumentInstance::new(info.clone(), backend, state);
        info!(path = %info.path.display(), pages = doc.page_count(), "opened document");
        self.documents.push(doc);
        self.active = self.documents.len() - 1;
        self.emit(SessionEvent::DocumentOpened(info.id));
        self.emit(SessionEvent::ActiveDocumentChanged(info.id));
        Ok(())
    }

    /// Reopens the active document from disk, carrying position and view state across.
    #[instrument(skip(self, provider))]
    pub async fn reload_active<P: DocumentProvider + ?Sized>(&mut self, provider: &P) -> Result<()> {
        let Some(doc) = self.documents.get(self.active) else {
            return Ok(());
        };
        let path = doc.info.path.clone();
        let state = doc.snapshot();
        let backend = provider.open(&path).await?;
        let info = backend.info().clone();
        let id = info.id;
        self.documents[self.active] = DocumentInstance::new(info, backend, state);
        self.emit(SessionEvent::RedrawNeeded(id));
        Ok(())
    }

    pub fn set_citation_key(&mut self, key: Option<String>) {
        if let Some(doc) = self.active_mut() {
            doc.set_citation_key(key);
        }
    }

    /// Applies `command` to the active buffer. Recoverable failures become
    /// [`SessionEvent::Notice`] rather than errors.
    pub fn apply(&mut self, command: Command) -> Result<()> {
        match command {
            Command::SwitchDocument { index } => {
                if index < self.documents.len() && index != self.active {
                    self.active = index;
                    let id = self.documents[index].info.id;
                    self.emit(SessionEvent::ActiveDocumentChanged(id));
                }
            }
            Command::CycleDocument => {
                if self.documents.len() > 1 {
                    self.active = (self.active + 1) % self.documents.len();
                    let id = self.documents[self.active].info.id;
                    self.emit(SessionEvent::ActiveDocumentChanged(id));
                }
            }
            Command::CloseDocument { index } => self.close(index)?,
            Command::CloseActiveDocument => self.close(self.active)?,
            other => self.apply_to_active(other)?,
        }
        Ok(())
    }

    fn close(&mut self, index: usize) -> Result<()> {
        if index >= self.documents.len() {
            return Ok(());
        }
        let doc = self.documents.remove(index);
        if self.documents.is_empty() {
            self.active = 0;
        } else if index < self.active || self.active >= self.documents.len() {
            self.active = self.active.saturating_sub(1).min(self.documents.len() - 1);
        }
        self.save_or_notify(&doc);
        self.emit(SessionEvent::DocumentClosed(doc.info.id));
        if self.documents.is_empty() {
            self.emit(SessionEvent::SessionEnded);
            return Ok(());
        }
        let id = self.documents[self.active].info.id;
        self.emit(SessionEvent::ActiveDocumentChanged(id));
        Ok(())
    }

    /// Saved state is a convenience; a failing store only produces a notice.
    fn save_or_notify(&self, doc: &DocumentInstance) {
        if let Err(err) = self.store.save(&doc.info, &doc.snapshot()) {
            warn!(?err, path = %doc.info.path.display(), "failed to save document state");
            self.emit(SessionEvent::Notice(format!("Could not save state: {err:#}")));
        }
    }

    fn apply_to_active(&mut self, command: Command) -> Result<()> {
        let Some(doc) = self.documents.get_mut(self.active) else {
            return Ok(());
        };
        let id = doc.info.id;
        let before = doc.current_page();
        let mut notice = None;
        let mut redraw = false;

        match command {
            Command::NextPage { count } => {
                doc.next_page(count.max(1));
            }
            Command::PrevPage { count } => {
                doc.prev_page(count.max(1));
            }
            Command::GotoPage { page } => {
                doc.goto_physical_page(page);
            }
            Command::GotoLastPage => {
                doc.goto_physical_page(doc.last_page());
            }
            Command::GotoLogicalPage { label } => {
                doc.goto_logical_page(&label);
            }
            Command::GoBack => {
                doc.go_back();
            }
            Command::NextChapter { count } => {
                if doc.outline().is_empty() {
                    notice = Some(ViewerError::NoTableOfContents.to_string());
                }
                doc.next_chapter(count);
            }
            Command::PrevChapter { count } => {
                if doc.outline().is_empty() {
                    notice = Some(ViewerError::NoTableOfContents.to_string());
                }
                doc.prev_chapter(count);
            }
            Command::Rotate { quarter_turns } => {
                doc.rotate(quarter_turns);
                redraw = true;
            }
            Command::CycleCrop => {
                let mode = doc.cycle_crop();
                notice = Some(format!("Crop: {}", mode.label()));
                redraw = true;
            }
            Command::SetManualCrop { rect } => {
                doc.set_manual_crop(rect);
                redraw = true;
            }
            Command::ToggleAlpha => {
                doc.toggle_alpha();
                redraw = true;
            }
            Command::ToggleInvert => {
                doc.toggle_invert();
                redraw = true;
            }
            Command::ToggleTint => {
                doc.toggle_tint();
                redraw = true;
            }
            Command::CyclePaperSize => match doc.cycle_paper_size() {
                Ok(paper) => {
                    notice = Some(format!("Paper size: {}", paper.name()));
                    redraw = true;
                }
                Err(err) => notice = Some(err.to_string()),
            },
            Command::AdjustFontSize { delta } => match doc.adjust_font_size(delta) {
                Ok(size) => {
                    notice = Some(format!("Font size: {size}"));
                    redraw = true;
                }
                Err(err) => notice = Some(err.to_string()),
            },
            Command::SetPageLabel { number } => {
                doc.assign_page_label(number);
                redraw = true;
            }
            Command::Refresh => {
                doc.refresh();
                redraw = true;
            }
            Command::SwitchDocument { .. }
            | Command::CycleDocument
            | Command::CloseDocument { .. }
            | Command::CloseActiveDocument => return Ok(()),
        }

        if redraw || doc.current_page() != before {
            self.emit(SessionEvent::RedrawNeeded(id));
        }
        if let Some(message) = notice {
            self.emit(SessionEvent::Notice(message));
        }
        Ok(())
    }

    /// Saves every open buffer. Failures are reported as notices.
    pub fn persist(&self) {
        for doc in &self.documents {
            self.save_or_notify(doc);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::tests::FakeBackend;
    use crate::document::{document_id_for_bytes, DocumentBackend, DocumentInfo};
    use crate::state::MemoryStateStore;
    use crate::view::Rotation;
    use std::path::Path;

    struct FakeProvider {
        chapters: Vec<usize>,
    }

    #[async_trait::async_trait]
    impl DocumentProvider for FakeProvider {
        async fn open(&self, path: &Path) -> Result<Arc<dyn DocumentBackend>> {
            if path.to_string_lossy().contains("missing") {
                return Err(ViewerError::Open {
                    path: path.to_path_buf(),
                    reason: "not found".into(),
                }
                .into());
            }
            let mut backend = FakeBackend::new(100).with_chapters(&self.chapters);
            backend.info.id = document_id_for_bytes(path.to_string_lossy().as_bytes());
            backend.info.path = path.to_path_buf();
            Ok(Arc::new(backend))
        }
    }

    fn provider() -> FakeProvider {
        FakeProvider {
            chapters: vec![0, 20, 50],
        }
    }

    #[tokio::test]
    async fn session_navigation_updates_state() {
        let store = Arc::new(MemoryStateStore::new());
        let mut session = Session::new(store.clone());
        session
            .open_with(&provider(), PathBuf::from("/tmp/example.pdf"))
            .await
            .unwrap();

        session.apply(Command::NextPage { count: 10 }).unwrap();
        assert_eq!(session.active().unwrap().current_page(), 10);
        session.apply(Command::PrevPage { count: 5 }).unwrap();
        assert_eq!(session.active().unwrap().current_page(), 5);
        session.apply(Command::GotoPage { page: 150 }).unwrap();
        assert_eq!(session.active().unwrap().current_page(), 99);
        session.apply(Command::GoBack).unwrap();
        assert_eq!(session.active().unwrap().current_page(), 5);
        session.apply(Command::NextChapter { count: 2 }).unwrap();
        assert_eq!(session.active().unwrap().current_page(), 50);

        session.persist();
        let info = session.active().unwrap().info.clone();
        let stored = store.load(&info).unwrap().unwrap();
        assert_eq!(stored.current_page, 50);
        assert_eq!(stored.logical_page.as_deref(), Some("51"));
    }

    #[tokio::test]
    async fn reopening_restores_view_state() {
        let store = Arc::new(MemoryStateStore::new());
        let path = PathBuf::from("/tmp/restore.pdf");
        {
            let mut session = Session::new(store.clone());
            session.open_with(&provider(), path.clone()).await.unwrap();
            session.apply(Command::GotoPage { page: 42 }).unwrap();
            session.apply(Command::Rotate { quarter_turns: 1 }).unwrap();
            session.apply(Command::CloseActiveDocument).unwrap();
        }
        let mut session = Session::new(store.clone());
        session.open_with(&provider(), path.clone()).await.unwrap();
        let doc = session.active().unwrap();
        assert_eq!(doc.current_page(), 42);
        assert_eq!(doc.view().rotation, Rotation::Deg90);

        let mut fresh = Session::new(store);
        fresh.set_ignore_cache(true);
        fresh.open_with(&provider(), path).await.unwrap();
        assert_eq!(fresh.active().unwrap().current_page(), 0);
    }

    #[tokio::test]
    async fn closing_keeps_active_index_in_range() {
        let mut session = Session::new(Arc::new(MemoryStateStore::new()));
        for name in ["a", "b", "c"] {
            session
                .open_with(&provider(), PathBuf::from(format!("/tmp/{name}.pdf")))
                .await
                .unwrap();
        }
        assert_eq!(session.active_index(), 2);
        session.apply(Command::CloseActiveDocument).unwrap();
        assert_eq!(session.active_index(), 1);
        session.apply(Command::SwitchDocument { index: 1 }).unwrap();
        session.apply(Command::CloseDocument { index: 0 }).unwrap();
        assert_eq!(session.active_index(), 0);
        assert_eq!(
            session.active().unwrap().info.path,
            PathBuf::from("/tmp/b.pdf")
        );
        session.drain_events();
        session.apply(Command::CloseActiveDocument).unwrap();
        assert!(session.is_empty());
        assert!(session.drain_events().contains(&SessionEvent::SessionEnded));
    }

    #[tokio::test]
    async fn cycling_wraps_around() {
        let mut session = Session::new(Arc::new(MemoryStateStore::new()));
        for name in ["a", "b"] {
            session
                .open_with(&provider(), PathBuf::from(format!("/tmp/{name}.pdf")))
                .await
                .unwrap();
        }
        session.apply(Command::CycleDocument).unwrap();
        assert_eq!(session.active_index(), 0);
        session.apply(Command::CycleDocument).unwrap();
        assert_eq!(session.active_index(), 1);
    }

    #[tokio::test]
    async fn open_failure_leaves_session_untouched() {
        let mut session = Session::new(Arc::new(MemoryStateStore::new()));
        let err = session
            .open_with(&provider(), PathBuf::from("/tmp/missing.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ViewerError>(),
            Some(ViewerError::Open { .. })
        ));
        assert!(session.is_empty());
    }

    #[tokio::test]
    async fn fixed_layout_reports_notice() {
        let mut session = Session::new(Arc::new(MemoryStateStore::new()));
        session
            .open_with(&provider(), PathBuf::from("/tmp/fixed.pdf"))
            .await
            .unwrap();
        session.drain_events();
        session.apply(Command::CyclePaperSize).unwrap();
        assert_eq!(
            session.drain_events(),
            vec![SessionEvent::Notice("Document layout is fixed.".into())]
        );
    }

    #[tokio::test]
    async fn missing_outline_reports_notice() {
        let mut session = Session::new(Arc::new(MemoryStateStore::new()));
        let bare = FakeProvider { chapters: vec![] };
        session
            .open_with(&bare, PathBuf::from("/tmp/bare.pdf"))
            .await
            .unwrap();
        session.drain_events();
        session.apply(Command::NextChapter { count: 1 }).unwrap();
        assert_eq!(
            session.drain_events(),
            vec![SessionEvent::Notice("No ToC available.".into())]
        );
    }

    #[tokio::test]
    async fn reload_keeps_position() {
        let mut session = Session::new(Arc::new(MemoryStateStore::new()));
        session
            .open_with(&provider(), PathBuf::from("/tmp/reload.pdf"))
            .await
            .unwrap();
        session.apply(Command::GotoPage { page: 33 }).unwrap();
        session.apply(Command::ToggleInvert).unwrap();
        session.reload_active(&provider()).await.unwrap();
        let doc = session.active().unwrap();
        assert_eq!(doc.current_page(), 33);
        assert!(doc.view().invert);
    }

    #[tokio::test]
    async fn default_offset_applies_without_stored_state() {
        let mut session = Session::new(Arc::new(MemoryStateStore::new()));
        session.set_default_first_page_offset(-3);
        session
            .open_with(&provider(), PathBuf::from("/tmp/offset.pdf"))
            .await
            .unwrap();
        let doc = session.active().unwrap();
        assert_eq!(doc.first_page_offset(), -3);
        assert_eq!(doc.logical_label(4), "1");
    }

    struct FullDisk;

    impl StateStore for FullDisk {
        fn load(&self, _doc: &DocumentInfo) -> Result<Option<PersistedDocumentState>> {
            Ok(None)
        }

        fn save(&self, _doc: &DocumentInfo, _state: &PersistedDocumentState) -> Result<()> {
            anyhow::bail!("disk full")
        }
    }

    #[tokio::test]
    async fn failed_save_on_close_keeps_buffers_usable() {
        let mut session = Session::new(Arc::new(FullDisk));
        for name in ["left", "right"] {
            session
                .open_with(&provider(), PathBuf::from(format!("/tmp/{name}.pdf")))
                .await
                .unwrap();
        }
        session.drain_events();

        session.apply(Command::CloseActiveDocument).unwrap();
        assert_eq!(session.len(), 1);
        assert_eq!(session.active_index(), 0);
        assert_eq!(
            session.active().unwrap().info.path,
            PathBuf::from("/tmp/left.pdf")
        );
        let events = session.drain_events();
        assert!(events
            .iter()
            .any(|event| matches!(event, SessionEvent::Notice(text) if text.contains("disk full"))));

        session.persist();
        assert!(matches!(
            session.drain_events().as_slice(),
            [SessionEvent::Notice(_)]
        ));
    }
}
