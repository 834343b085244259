use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use crossterm::event::Event;
use crossterm::queue;
use crossterm::terminal::{Clear, ClearType};
use termdoc_core::{
    Command, DocumentProvider, FileWatcher, PageTransform, ScreenGeometry, Session, SessionEvent,
    ViewerError,
};
use termdoc_tty::{
    combine_status, events_from_bytes, format_document_status, write_status_line, DisplayOutcome,
    EventMapper, InputMode, ListOverlay, OverlayKind, OverlayOutcome, PageDisplay, ReplySource, TextScroll,
    TextView, UiEvent,
    VisualSelection,
};
use tracing::{info, warn};

use crate::{external, ui};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    Continue,
    Quit,
}

/// Everything the event loop owns: the buffer list, what is on screen, and
/// the current input mode's state.
pub struct App<W: Write, R: ReplySource> {
    session: Session,
    provider: Arc<dyn DocumentProvider>,
    display: PageDisplay<W, R>,
    mapper: EventMapper,
    screen: ScreenGeometry,
    overlay: Option<ListOverlay>,
    visual: Option<(VisualSelection, PageTransform)>,
    text: Option<TextView>,
    message: Option<String>,
    watcher: Option<FileWatcher>,
    watch_interval: Option<Duration>,
    nvim_address: Option<String>,
    needs_clear: bool,
    dirty: bool,
    ended: bool,
}

impl<W: Write, R: ReplySource> App<W, R> {
    pub fn new(
        session: Session,
        provider: Arc<dyn DocumentProvider>,
        display: PageDisplay<W, R>,
        screen: ScreenGeometry,
    ) -> Self {
        Self {
            session,
            provider,
            display,
            mapper: EventMapper::new(),
            screen,
            overlay: None,
            visual: None,
            text: None,
            message: None,
            watcher: None,
            watch_interval: None,
            nvim_address: None,
            needs_clear: true,
            dirty: true,
            ended: false,
        }
    }

    /// Starts polling the active buffer's file for modifications.
    pub fn watch_files(&mut self, interval: Duration) {
        self.watch_interval = Some(interval);
        self.rewatch();
    }

    pub fn set_nvim_address(&mut self, address: Option<String>) {
        self.nvim_address = address;
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn set_screen(&mut self, screen: ScreenGeometry) {
        if screen != self.screen {
            self.screen = screen;
            self.needs_clear = true;
            self.dirty = true;
        }
    }

    fn rewatch(&mut self) {
        let Some(interval) = self.watch_interval else {
            return;
        };
        let path = self.session.active().map(|doc| doc.info.path.clone());
        match path {
            Some(path) if self.watcher.as_ref().map(FileWatcher::path) != Some(path.as_path()) => {
                self.watcher = match FileWatcher::spawn(&path, interval) {
                    Ok(watcher) => Some(watcher),
                    Err(err) => {
                        warn!(?err, "document will not reload on change");
                        None
                    }
                };
            }
            Some(_) => {}
            None => self.watcher = None,
        }
    }

    /// Reloads the active buffer when its file changed on disk. Returns whether
    /// a reload happened.
    pub async fn poll_watcher(&mut self) -> Result<bool> {
        let changed = self.watcher.as_ref().is_some_and(FileWatcher::take_changed);
        if !changed {
            return Ok(false);
        }
        self.session.persist();
        match self.session.reload_active(&*self.provider).await {
            Ok(()) => {
                info!("reloaded document after change on disk");
                self.display.teardown()?;
            }
            Err(err) => {
                warn!(?err, "failed to reload document");
                self.message = Some(format!("{err:#}"));
            }
        }
        self.absorb_session_events();
        self.needs_clear = true;
        self.dirty = true;
        Ok(true)
    }

    pub fn handle_event(&mut self, event: Event) -> Result<LoopAction> {
        let ui_event = self.mapper.map_event(event);
        self.handle(ui_event)
    }

    pub fn handle(&mut self, event: UiEvent) -> Result<LoopAction> {
        if event != UiEvent::None {
            self.message = None;
        }
        match event {
            UiEvent::Command(command) => self.apply(command)?,
            UiEvent::OpenOverlay(kind) => self.open_overlay(kind),
            UiEvent::CloseOverlay => self.close_overlay(),
            UiEvent::OverlayMove { delta } => {
                if let Some(overlay) = self.overlay.as_mut() {
                    self.dirty |= overlay.move_selection(delta);
                }
            }
            UiEvent::OverlayActivate => self.activate_overlay()?,
            UiEvent::EnterVisual => self.enter_visual(),
            UiEvent::ExitVisual => self.exit_visual(),
            UiEvent::VisualMoveRow { delta } => self.adjust_visual(|s| s.move_row(delta)),
            UiEvent::VisualToggleAnchor => self.adjust_visual(VisualSelection::toggle_anchor),
            UiEvent::VisualMoveLeft { delta } => self.adjust_visual(|s| s.move_left(delta)),
            UiEvent::VisualMoveRight { delta } => self.adjust_visual(|s| s.move_right(delta)),
            UiEvent::VisualYank => self.yank_selection(),
            UiEvent::VisualCrop => self.crop_to_selection()?,
            UiEvent::EnterText => self.enter_text(),
            UiEvent::ExitText => self.exit_text(),
            UiEvent::TextScroll { delta } => self.scroll_text(delta)?,
            UiEvent::SendNote => self.send_note(),
            UiEvent::OpenExternally => {
                if let Some(doc) = self.session.active() {
                    if let Err(err) = external::open_in_gui(&doc.info.path) {
                        self.message = Some(err.to_string());
                    }
                }
            }
            UiEvent::Quit => return Ok(LoopAction::Quit),
            UiEvent::None => {}
        }
        Ok(if self.ended {
            LoopAction::Quit
        } else {
            LoopAction::Continue
        })
    }

    fn apply(&mut self, command: Command) -> Result<()> {
        let refresh = command == Command::Refresh;
        let switches = matches!(
            command,
            Command::SwitchDocument { .. }
                | Command::CycleDocument
                | Command::CloseDocument { .. }
                | Command::CloseActiveDocument
        );
        self.session.apply(command)?;
        if refresh || switches {
            self.overlay = None;
            self.visual = None;
            if switches {
                self.text = None;
            }
            self.mapper.set_mode(self.base_mode());
            self.needs_clear = true;
            self.dirty = true;
        }
        self.absorb_session_events();
        self.sync_text_view(refresh);
        Ok(())
    }

    /// Mode to fall back to when an overlay or selection ends.
    fn base_mode(&self) -> InputMode {
        if self.text.is_some() {
            InputMode::Text
        } else {
            InputMode::Normal
        }
    }

    fn absorb_session_events(&mut self) {
        for event in self.session.drain_events() {
            match event {
                SessionEvent::Notice(text) => self.message = Some(text),
                SessionEvent::SessionEnded => self.ended = true,
                SessionEvent::ActiveDocumentChanged(_) => {
                    // Image ids repeat across buffers.
                    if let Some(doc) = self.session.active_mut() {
                        doc.cache.mark_all_stale();
                    }
                    if let Err(err) = self.display.teardown() {
                        warn!(?err, "failed to clear images of previous buffer");
                    }
                    self.rewatch();
                    self.needs_clear = true;
                    self.dirty = true;
                }
                SessionEvent::RedrawNeeded(_) => self.dirty = true,
                SessionEvent::DocumentOpened(_) | SessionEvent::DocumentClosed(_) => {}
            }
        }
    }

    fn open_overlay(&mut self, kind: OverlayKind) {
        let Some(doc) = self.session.active() else {
            return;
        };
        let overlay: Result<ListOverlay> = match kind {
            OverlayKind::TableOfContents if doc.outline().is_empty() => {
                Err(ViewerError::NoTableOfContents.into())
            }
            OverlayKind::TableOfContents => Ok(ListOverlay::table_of_contents(
                doc.outline(),
                doc.current_page(),
            )),
            OverlayKind::Metadata => doc.metadata().and_then(|pairs| {
                if pairs.is_empty() {
                    Err(ViewerError::NoMetadata.into())
                } else {
                    Ok(ListOverlay::metadata(&pairs))
                }
            }),
            OverlayKind::Links => doc.links(doc.current_page()).and_then(|links| {
                if links.is_empty() {
                    Err(ViewerError::NoLinks.into())
                } else {
                    Ok(ListOverlay::links(&links, |page| doc.logical_label(page)))
                }
            }),
        };
        match overlay {
            Ok(overlay) => {
                self.overlay = Some(overlay);
                self.visual = None;
                self.mapper.set_mode(InputMode::Overlay(kind));
                self.needs_clear = true;
                self.dirty = true;
            }
            Err(err) => self.message = Some(err.to_string()),
        }
    }

    fn close_overlay(&mut self) {
        if self.overlay.take().is_some() {
            self.mapper.set_mode(self.base_mode());
            self.needs_clear = true;
            self.dirty = true;
        }
    }

    fn activate_overlay(&mut self) -> Result<()> {
        let Some(overlay) = self.overlay.as_ref() else {
            return Ok(());
        };
        match overlay.activate() {
            OverlayOutcome::Jump(page) => {
                self.close_overlay();
                self.apply(Command::GotoPage { page })?;
            }
            OverlayOutcome::OpenUri(uri) => {
                if let Err(err) = external::open_url(&uri) {
                    self.message = Some(err.to_string());
                }
                self.close_overlay();
            }
            OverlayOutcome::Message(text) => {
                self.message = Some(text);
                self.close_overlay();
            }
            OverlayOutcome::Stay => {}
        }
        Ok(())
    }

    fn text_view_for_current_page(&self) -> Option<Result<TextView>> {
        let doc = self.session.active()?;
        let page = doc.current_page();
        Some(doc.page_text(page).map(|text| {
            TextView::new(page, &text, self.screen.cols, self.screen.status_row())
        }))
    }

    fn enter_text(&mut self) {
        match self.text_view_for_current_page() {
            Some(Ok(view)) => {
                self.text = Some(view);
                self.visual = None;
                self.mapper.set_mode(InputMode::Text);
                self.needs_clear = true;
                self.dirty = true;
            }
            Some(Err(err)) => {
                self.mapper.set_mode(InputMode::Normal);
                self.message = Some(format!("{err:#}"));
            }
            None => self.mapper.set_mode(InputMode::Normal),
        }
    }

    fn exit_text(&mut self) {
        if self.text.take().is_some() {
            self.mapper.set_mode(InputMode::Normal);
            self.needs_clear = true;
            self.dirty = true;
        }
    }

    fn scroll_text(&mut self, delta: isize) -> Result<()> {
        let Some(view) = self.text.as_mut() else {
            return Ok(());
        };
        match view.scroll(delta) {
            TextScroll::Moved => {
                self.needs_clear = true;
                self.dirty = true;
            }
            TextScroll::Unchanged => {}
            TextScroll::NextPage => self.apply(Command::NextPage { count: 1 })?,
            TextScroll::PreviousPage => self.apply(Command::PrevPage { count: 1 })?,
        }
        Ok(())
    }

    /// Rebuilds the text view after the page changed, or always when `force`.
    fn sync_text_view(&mut self, force: bool) {
        let Some(view) = self.text.as_ref() else {
            return;
        };
        let current = self.session.active().map(|doc| doc.current_page());
        if !force && current == Some(view.page()) {
            return;
        }
        match self.text_view_for_current_page() {
            Some(Ok(view)) => {
                self.text = Some(view);
                self.needs_clear = true;
                self.dirty = true;
            }
            Some(Err(err)) => {
                warn!(?err, "failed to extract page text");
                self.message = Some(format!("{err:#}"));
                self.exit_text();
            }
            None => self.exit_text(),
        }
    }

    fn enter_visual(&mut self) {
        let Some(doc) = self.session.active() else {
            return;
        };
        match doc.page_transform(doc.current_page(), &self.screen) {
            Ok(transform) => {
                self.visual = Some((VisualSelection::new(transform.placement), transform));
                self.mapper.set_mode(InputMode::Visual);
                self.dirty = true;
            }
            Err(err) => {
                self.mapper.set_mode(InputMode::Normal);
                self.message = Some(format!("{err:#}"));
            }
        }
    }

    fn exit_visual(&mut self) {
        if self.visual.take().is_some() {
            self.mapper.set_mode(InputMode::Normal);
            self.needs_clear = true;
            self.dirty = true;
        }
    }

    fn adjust_visual(&mut self, f: impl FnOnce(&mut VisualSelection)) {
        if let Some((selection, _)) = self.visual.as_mut() {
            f(selection);
            self.needs_clear = true;
            self.dirty = true;
        }
    }

    fn yank_selection(&mut self) {
        let Some((selection, transform)) = self.visual.take() else {
            return;
        };
        self.exit_visual_state();
        let Some(doc) = self.session.active() else {
            return;
        };
        let rect = selection.page_rect(&transform);
        let copied = doc
            .text_in(doc.current_page(), &rect)
            .and_then(|text| external::copy_to_clipboard(&text).map(|()| text.chars().count()));
        self.message = Some(match copied {
            Ok(count) => format!("Copied {count} characters"),
            Err(err) => err.to_string(),
        });
    }

    fn crop_to_selection(&mut self) -> Result<()> {
        let Some((selection, transform)) = self.visual.take() else {
            return Ok(());
        };
        self.exit_visual_state();
        let rect = selection.page_rect(&transform);
        if rect.is_empty() {
            self.message = Some("Selection is empty".into());
            return Ok(());
        }
        self.apply(Command::SetManualCrop { rect })
    }

    fn exit_visual_state(&mut self) {
        self.mapper.set_mode(InputMode::Normal);
        self.needs_clear = true;
        self.dirty = true;
    }

    fn send_note(&mut self) {
        let Some(doc) = self.session.active() else {
            return;
        };
        let result = match self.nvim_address.as_deref() {
            Some(address) => {
                external::send_note(address, doc.citation_key(), &doc.current_label())
            }
            None => Err(ViewerError::External {
                program: "nvim".into(),
                reason: "no listen address given".into(),
            }
            .into()),
        };
        self.message = Some(match result {
            Ok(()) => format!("Sent note for p. {}", doc.current_label()),
            Err(err) => err.to_string(),
        });
    }

    /// Brings the screen up to date. Nothing is drawn when the state is clean.
    pub fn redraw(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        self.display.transport_mut().begin_sync_update()?;
        if self.needs_clear {
            queue!(self.display.transport_mut().writer_mut(), Clear(ClearType::All))?;
            self.needs_clear = false;
        }

        if let Some(overlay) = self.overlay.as_mut() {
            self.display.hide()?;
            ui::draw_overlay(self.display.transport_mut().writer_mut(), overlay, &self.screen)?;
        } else if let Some(view) = self.text.as_ref() {
            self.display.hide()?;
            ui::draw_text(self.display.transport_mut().writer_mut(), view, &self.screen)?;
        } else if let Some(doc) = self.session.active_mut() {
            if let DisplayOutcome::Failed(reason) = self.display.display(doc, &self.screen)? {
                self.message = Some(reason);
            }
            if let Some((selection, _)) = self.visual.as_ref() {
                ui::draw_selection(self.display.transport_mut().writer_mut(), selection)?;
            }
        }
        self.draw_status()?;
        self.display.transport_mut().end_sync_update()?;
        self.dirty = false;
        Ok(())
    }

    /// Replays keys that arrived while the terminal was answering a graphics
    /// command. Stops at the first one that ends the session.
    pub fn replay_typed_ahead(&mut self) -> Result<LoopAction> {
        let bytes = self.display.transport_mut().take_typed_ahead();
        for event in events_from_bytes(&bytes) {
            if self.handle_event(event)? == LoopAction::Quit {
                return Ok(LoopAction::Quit);
            }
        }
        Ok(LoopAction::Continue)
    }

    pub fn draw_status(&mut self) -> Result<()> {
        let base = self.message.clone().or_else(|| {
            self.session.active().map(|doc| {
                format_document_status(doc, self.session.active_index(), self.session.len())
            })
        });
        let pending = self.mapper.pending_input();
        let status = combine_status(base, pending.as_deref()).unwrap_or_default();
        write_status_line(
            self.display.transport_mut().writer_mut(),
            self.screen.status_row(),
            self.screen.cols,
            &status,
        )?;
        Ok(())
    }

    /// Removes every image this session placed and saves per-document state.
    pub fn shutdown(&mut self) -> Result<()> {
        self.session.persist();
        for event in self.session.drain_events() {
            if let SessionEvent::Notice(text) = event {
                warn!(%text, "during shutdown");
            }
        }
        self.display.teardown()?;
        queue!(self.display.transport_mut().writer_mut(), Clear(ClearType::All))?;
        self.display.transport_mut().writer_mut().flush()?;
        Ok(())
    }
}
