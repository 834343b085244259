use crossterm::event::{Event, KeyCode, KeyEvent, KeyModifiers};
use termdoc_core::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayKind {
    TableOfContents,
    Metadata,
    Links,
}

impl OverlayKind {
    fn toggle_key(self) -> char {
        match self {
            OverlayKind::TableOfContents => 't',
            OverlayKind::Metadata => 'M',
            OverlayKind::Links => 'u',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Normal,
    Overlay(OverlayKind),
    Visual,
    Text,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    Command(Command),
    OpenOverlay(OverlayKind),
    CloseOverlay,
    OverlayMove { delta: isize },
    OverlayActivate,
    EnterVisual,
    ExitVisual,
    VisualMoveRow { delta: isize },
    VisualToggleAnchor,
    VisualMoveLeft { delta: isize },
    VisualMoveRight { delta: isize },
    VisualYank,
    VisualCrop,
    EnterText,
    ExitText,
    TextScroll { delta: isize },
    SendNote,
    OpenExternally,
    Quit,
    None,
}

/// Keys typed so far that have not dispatched anything yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Pending {
    #[default]
    Idle,
    Count(usize),
    /// A key that may start a chord, plus any count typed before it.
    Prefix { count: Option<usize>, key: char },
}

impl Pending {
    fn count(self) -> Option<usize> {
        match self {
            Pending::Idle => None,
            Pending::Count(count) => Some(count),
            Pending::Prefix { count, .. } => count,
        }
    }

    fn prefix(self) -> Option<char> {
        match self {
            Pending::Prefix { key, .. } => Some(key),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct EventMapper {
    pending: Pending,
    mode: InputMode,
}

impl EventMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_mode(&mut self, mode: InputMode) {
        if self.mode != mode {
            self.pending = Pending::Idle;
            self.mode = mode;
        }
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn map_event(&mut self, event: Event) -> UiEvent {
        match event {
            Event::Key(KeyEvent {
                code: KeyCode::Esc, ..
            }) => {
                let left = self.mode;
                self.pending = Pending::Idle;
                self.mode = InputMode::Normal;
                match left {
                    InputMode::Normal => UiEvent::None,
                    InputMode::Overlay(_) => UiEvent::CloseOverlay,
                    InputMode::Visual => UiEvent::ExitVisual,
                    InputMode::Text => UiEvent::ExitText,
                }
            }
            Event::Key(KeyEvent {
                code, modifiers, ..
            }) => {
                if let KeyCode::Char(c) = code {
                    if c.is_ascii_digit() && !modifiers.contains(KeyModifiers::CONTROL) {
                        return self.digit(c);
                    }
                }
                match self.mode {
                    InputMode::Normal => self.map_normal(code, modifiers),
                    InputMode::Overlay(kind) => self.map_overlay(kind, code),
                    InputMode::Visual => self.map_visual(code),
                    InputMode::Text => self.map_text(code, modifiers),
                }
            }
            Event::Resize(..) => UiEvent::Command(Command::Refresh),
            _ => UiEvent::None,
        }
    }

    fn digit(&mut self, c: char) -> UiEvent {
        let digit = c.to_digit(10).unwrap_or(0) as usize;
        if self.mode == InputMode::Normal && self.pending.prefix() == Some('b') {
            self.pending = Pending::Idle;
            return match digit.checked_sub(1) {
                Some(index) => UiEvent::Command(Command::SwitchDocument { index }),
                None => UiEvent::None,
            };
        }
        let count = self
            .pending
            .count()
            .unwrap_or(0)
            .saturating_mul(10)
            .saturating_add(digit);
        self.pending = match self.pending {
            Pending::Prefix { key, .. } => Pending::Prefix {
                count: Some(count),
                key,
            },
            _ => Pending::Count(count),
        };
        UiEvent::None
    }

    fn map_normal(&mut self, code: KeyCode, modifiers: KeyModifiers) -> UiEvent {
        if modifiers.contains(KeyModifiers::CONTROL) {
            return match code {
                KeyCode::Char('o') => self.finish(UiEvent::Command(Command::GoBack)),
                KeyCode::Char('r') => self.finish(UiEvent::Command(Command::Refresh)),
                KeyCode::Char('c') => self.finish(UiEvent::Quit),
                _ => self.remember(None),
            };
        }

        let prefix = self.pending.prefix();
        let count = self.count();
        let event = match (prefix, code) {
            (Some('g'), KeyCode::Char('g')) => UiEvent::Command(Command::GotoPage { page: 0 }),
            (Some('b'), KeyCode::Char('b')) => UiEvent::Command(Command::CycleDocument),
            (Some('b'), KeyCode::Char('d')) => UiEvent::Command(Command::CloseActiveDocument),
            (_, KeyCode::Char('j') | KeyCode::Char(' ') | KeyCode::Down | KeyCode::PageDown) => {
                UiEvent::Command(Command::NextPage { count })
            }
            (_, KeyCode::Char('k') | KeyCode::Up | KeyCode::PageUp) => {
                UiEvent::Command(Command::PrevPage { count })
            }
            (_, KeyCode::Char('l') | KeyCode::Right) => {
                UiEvent::Command(Command::NextChapter { count })
            }
            (_, KeyCode::Char('h') | KeyCode::Left) => {
                UiEvent::Command(Command::PrevChapter { count })
            }
            (_, KeyCode::Char('G')) => match self.pending.count() {
                Some(page) if page > 0 => UiEvent::Command(Command::GotoPage { page: page - 1 }),
                _ => UiEvent::Command(Command::GotoLastPage),
            },
            (_, KeyCode::End) => UiEvent::Command(Command::GotoLastPage),
            (_, KeyCode::Home) => UiEvent::Command(Command::GotoPage { page: 0 }),
            (_, KeyCode::Char('`')) => UiEvent::Command(Command::GoBack),
            (_, KeyCode::Char('t')) => UiEvent::OpenOverlay(OverlayKind::TableOfContents),
            (_, KeyCode::Char('M')) => UiEvent::OpenOverlay(OverlayKind::Metadata),
            (_, KeyCode::Char('u')) => UiEvent::OpenOverlay(OverlayKind::Links),
            (_, KeyCode::Char('r')) => UiEvent::Command(Command::Rotate {
                quarter_turns: turns(count),
            }),
            (_, KeyCode::Char('R')) => UiEvent::Command(Command::Rotate {
                quarter_turns: -turns(count),
            }),
            (_, KeyCode::Char('a')) => UiEvent::Command(Command::ToggleAlpha),
            (_, KeyCode::Char('i')) => UiEvent::Command(Command::ToggleInvert),
            (_, KeyCode::Char('d')) => UiEvent::Command(Command::ToggleTint),
            (_, KeyCode::Char('c')) => UiEvent::Command(Command::CycleCrop),
            (_, KeyCode::Char('s')) => UiEvent::Command(Command::CyclePaperSize),
            (_, KeyCode::Char('+')) => UiEvent::Command(Command::AdjustFontSize {
                delta: count as f32,
            }),
            (_, KeyCode::Char('-')) => UiEvent::Command(Command::AdjustFontSize {
                delta: -(count as f32),
            }),
            (_, KeyCode::Char('P')) => UiEvent::Command(Command::SetPageLabel {
                number: i64::try_from(count).unwrap_or(i64::MAX),
            }),
            (_, KeyCode::Char('v')) => UiEvent::EnterVisual,
            (_, KeyCode::Char('T')) => UiEvent::EnterText,
            (_, KeyCode::Char('n')) => UiEvent::SendNote,
            (_, KeyCode::Char('O')) => UiEvent::OpenExternally,
            (_, KeyCode::Char('q')) => UiEvent::Quit,
            (_, KeyCode::Char(c)) => return self.remember(Some(c)),
            _ => return self.remember(None),
        };
        self.finish(event)
    }

    fn map_overlay(&mut self, kind: OverlayKind, code: KeyCode) -> UiEvent {
        let count = self.count() as isize;
        let event = match code {
            KeyCode::Char('j') | KeyCode::Down => UiEvent::OverlayMove { delta: count },
            KeyCode::Char('k') | KeyCode::Up => UiEvent::OverlayMove { delta: -count },
            KeyCode::PageDown => UiEvent::OverlayMove { delta: 10 * count },
            KeyCode::PageUp => UiEvent::OverlayMove { delta: -10 * count },
            KeyCode::Enter => UiEvent::OverlayActivate,
            KeyCode::Char('q') => UiEvent::CloseOverlay,
            KeyCode::Char(c) if c == kind.toggle_key() => UiEvent::CloseOverlay,
            _ => return UiEvent::None,
        };
        if event == UiEvent::CloseOverlay {
            self.mode = InputMode::Normal;
        }
        self.finish(event)
    }

    fn map_visual(&mut self, code: KeyCode) -> UiEvent {
        let count = self.count() as isize;
        let event = match code {
            KeyCode::Char('j') | KeyCode::Down => UiEvent::VisualMoveRow { delta: count },
            KeyCode::Char('k') | KeyCode::Up => UiEvent::VisualMoveRow { delta: -count },
            KeyCode::Char('l') | KeyCode::Right => UiEvent::VisualMoveRight { delta: count },
            KeyCode::Char('h') | KeyCode::Left => UiEvent::VisualMoveRight { delta: -count },
            KeyCode::Char('L') => UiEvent::VisualMoveLeft { delta: count },
            KeyCode::Char('H') => UiEvent::VisualMoveLeft { delta: -count },
            KeyCode::Char('V') => UiEvent::VisualToggleAnchor,
            KeyCode::Char('y') => UiEvent::VisualYank,
            KeyCode::Char('c') => UiEvent::VisualCrop,
            KeyCode::Char('v') => UiEvent::ExitVisual,
            _ => return UiEvent::None,
        };
        if matches!(
            event,
            UiEvent::VisualYank | UiEvent::VisualCrop | UiEvent::ExitVisual
        ) {
            self.mode = InputMode::Normal;
        }
        self.finish(event)
    }

    fn map_text(&mut self, code: KeyCode, modifiers: KeyModifiers) -> UiEvent {
        if modifiers.contains(KeyModifiers::CONTROL) {
            return match code {
                KeyCode::Char('c') => self.finish(UiEvent::Quit),
                _ => self.remember(None),
            };
        }

        let prefix = self.pending.prefix();
        let count = self.count();
        let event = match (prefix, code) {
            (Some('g'), KeyCode::Char('g')) => UiEvent::Command(Command::GotoPage { page: 0 }),
            (_, KeyCode::Char('j') | KeyCode::Char(' ') | KeyCode::Down | KeyCode::PageDown) => {
                UiEvent::TextScroll {
                    delta: count as isize,
                }
            }
            (_, KeyCode::Char('k') | KeyCode::Up | KeyCode::PageUp) => UiEvent::TextScroll {
                delta: -(count as isize),
            },
            (_, KeyCode::Char('l') | KeyCode::Right) => {
                UiEvent::Command(Command::NextChapter { count })
            }
            (_, KeyCode::Char('h') | KeyCode::Left) => {
                UiEvent::Command(Command::PrevChapter { count })
            }
            (_, KeyCode::Char('G')) => match self.pending.count() {
                Some(page) if page > 0 => UiEvent::Command(Command::GotoPage { page: page - 1 }),
                _ => UiEvent::Command(Command::GotoLastPage),
            },
            (_, KeyCode::Char('t')) => UiEvent::OpenOverlay(OverlayKind::TableOfContents),
            (_, KeyCode::Char('M')) => UiEvent::OpenOverlay(OverlayKind::Metadata),
            (_, KeyCode::Char('T')) => UiEvent::ExitText,
            (_, KeyCode::Char('q')) => UiEvent::Quit,
            (_, KeyCode::Char(c)) => return self.remember(Some(c)),
            _ => return self.remember(None),
        };
        if event == UiEvent::ExitText {
            self.mode = InputMode::Normal;
        }
        self.finish(event)
    }

    fn count(&self) -> usize {
        self.pending
            .count()
            .filter(|&count| count > 0)
            .unwrap_or(1)
    }

    fn finish(&mut self, event: UiEvent) -> UiEvent {
        self.pending = Pending::Idle;
        event
    }

    /// Holds an unrecognised key as a possible chord start; the count survives.
    fn remember(&mut self, key: Option<char>) -> UiEvent {
        let count = self.pending.count();
        self.pending = match (key, count) {
            (Some(key), count) => Pending::Prefix { count, key },
            (None, Some(count)) => Pending::Count(count),
            (None, None) => Pending::Idle,
        };
        UiEvent::None
    }

    pub fn pending_input(&self) -> Option<String> {
        match self.pending {
            Pending::Idle => None,
            Pending::Count(count) => Some(count.to_string()),
            Pending::Prefix { count, key } => Some(match count {
                Some(count) => format!("{count}{key}"),
                None => key.to_string(),
            }),
        }
    }
}

/// Decodes raw terminal input captured outside crossterm's reader. Only ASCII
/// keys, control chords and arrow keys are recognised; anything else is dropped.
pub fn events_from_bytes(bytes: &[u8]) -> Vec<Event> {
    let key = |code, modifiers| Event::Key(KeyEvent::new(code, modifiers));
    let mut events = Vec::new();
    let mut idx = 0;
    while idx < bytes.len() {
        let byte = bytes[idx];
        idx += 1;
        let event = match byte {
            0x1b if bytes.get(idx) == Some(&b'[') => {
                let code = match bytes.get(idx + 1) {
                    Some(b'A') => Some(KeyCode::Up),
                    Some(b'B') => Some(KeyCode::Down),
                    Some(b'C') => Some(KeyCode::Right),
                    Some(b'D') => Some(KeyCode::Left),
                    _ => None,
                };
                idx += 2;
                code.map(|code| key(code, KeyModifiers::NONE))
            }
            0x1b => Some(key(KeyCode::Esc, KeyModifiers::NONE)),
            b'\r' | b'\n' => Some(key(KeyCode::Enter, KeyModifiers::NONE)),
            b'\t' => Some(key(KeyCode::Tab, KeyModifiers::NONE)),
            0x7f => Some(key(KeyCode::Backspace, KeyModifiers::NONE)),
            0x01..=0x1a => Some(key(
                KeyCode::Char((b'a' + byte - 1) as char),
                KeyModifiers::CONTROL,
            )),
            0x20..=0x7e => Some(key(KeyCode::Char(byte as char), KeyModifiers::NONE)),
            _ => None,
        };
        events.extend(event);
    }
    events
}

fn turns(count: usize) -> i32 {
    (count % 4) as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyEventKind, KeyEventState};

    fn key_event(code: KeyCode) -> Event {
        key_event_with_modifiers(code, KeyModifiers::NONE)
    }

    fn key_event_with_modifiers(code: KeyCode, modifiers: KeyModifiers) -> Event {
        Event::Key(KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        })
    }

    fn chars(mapper: &mut EventMapper, keys: &str) -> Vec<UiEvent> {
        keys.chars()
            .map(|c| mapper.map_event(key_event(KeyCode::Char(c))))
            .collect()
    }

    #[test]
    fn numeric_prefix_repeats_next_page() {
        let mut mapper = EventMapper::new();
        assert_eq!(chars(&mut mapper, "12"), vec![UiEvent::None, UiEvent::None]);
        match mapper.map_event(key_event(KeyCode::Char('j'))) {
            UiEvent::Command(Command::NextPage { count }) => assert_eq!(count, 12),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn count_resets_after_dispatch() {
        let mut mapper = EventMapper::new();
        mapper.map_event(key_event(KeyCode::Char('3')));
        match mapper.map_event(key_event(KeyCode::Char('k'))) {
            UiEvent::Command(Command::PrevPage { count }) => assert_eq!(count, 3),
            other => panic!("unexpected event: {:?}", other),
        }
        match mapper.map_event(key_event(KeyCode::Char('k'))) {
            UiEvent::Command(Command::PrevPage { count }) => assert_eq!(count, 1),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(mapper.pending_input().is_none());
    }

    #[test]
    fn gg_goes_to_first_page() {
        let mut mapper = EventMapper::new();
        assert_eq!(mapper.map_event(key_event(KeyCode::Char('g'))), UiEvent::None);
        assert_eq!(mapper.pending_input().as_deref(), Some("g"));
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('g'))),
            UiEvent::Command(Command::GotoPage { page: 0 })
        );
        assert!(mapper.pending_input().is_none());
    }

    #[test]
    fn count_with_capital_g_is_one_based() {
        let mut mapper = EventMapper::new();
        chars(&mut mapper, "42");
        assert_eq!(
            mapper.map_event(key_event_with_modifiers(
                KeyCode::Char('G'),
                KeyModifiers::SHIFT
            )),
            UiEvent::Command(Command::GotoPage { page: 41 })
        );
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('G'))),
            UiEvent::Command(Command::GotoLastPage)
        );
    }

    #[test]
    fn buffer_chords() {
        let mut mapper = EventMapper::new();
        assert_eq!(
            chars(&mut mapper, "b2").pop(),
            Some(UiEvent::Command(Command::SwitchDocument { index: 1 }))
        );
        assert_eq!(
            chars(&mut mapper, "bb").pop(),
            Some(UiEvent::Command(Command::CycleDocument))
        );
        assert_eq!(
            chars(&mut mapper, "bd").pop(),
            Some(UiEvent::Command(Command::CloseActiveDocument))
        );
        assert_eq!(chars(&mut mapper, "b0").pop(), Some(UiEvent::None));
        assert!(mapper.pending_input().is_none());
    }

    #[test]
    fn unknown_key_keeps_count() {
        let mut mapper = EventMapper::new();
        chars(&mut mapper, "5x");
        assert_eq!(mapper.pending_input().as_deref(), Some("5x"));
        match mapper.map_event(key_event(KeyCode::Char('j'))) {
            UiEvent::Command(Command::NextPage { count }) => assert_eq!(count, 5),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn escape_clears_pending_state() {
        let mut mapper = EventMapper::new();
        chars(&mut mapper, "7g");
        assert_eq!(mapper.map_event(key_event(KeyCode::Esc)), UiEvent::None);
        assert!(mapper.pending_input().is_none());
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('g'))),
            UiEvent::None
        );
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('j'))),
            UiEvent::Command(Command::NextPage { count: 1 })
        );
    }

    #[test]
    fn rotation_counts_quarter_turns() {
        let mut mapper = EventMapper::new();
        assert_eq!(
            chars(&mut mapper, "3r").pop(),
            Some(UiEvent::Command(Command::Rotate { quarter_turns: 3 }))
        );
        assert_eq!(
            mapper.map_event(key_event_with_modifiers(
                KeyCode::Char('R'),
                KeyModifiers::SHIFT
            )),
            UiEvent::Command(Command::Rotate { quarter_turns: -1 })
        );
    }

    #[test]
    fn page_label_takes_count() {
        let mut mapper = EventMapper::new();
        assert_eq!(
            chars(&mut mapper, "17P").pop(),
            Some(UiEvent::Command(Command::SetPageLabel { number: 17 }))
        );
    }

    #[test]
    fn control_keys() {
        let mut mapper = EventMapper::new();
        assert_eq!(
            mapper.map_event(key_event_with_modifiers(
                KeyCode::Char('o'),
                KeyModifiers::CONTROL
            )),
            UiEvent::Command(Command::GoBack)
        );
        assert_eq!(
            mapper.map_event(key_event_with_modifiers(
                KeyCode::Char('r'),
                KeyModifiers::CONTROL
            )),
            UiEvent::Command(Command::Refresh)
        );
        assert_eq!(
            mapper.map_event(Event::Resize(80, 24)),
            UiEvent::Command(Command::Refresh)
        );
    }

    #[test]
    fn overlay_mode_moves_selection() {
        let mut mapper = EventMapper::new();
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('t'))),
            UiEvent::OpenOverlay(OverlayKind::TableOfContents)
        );
        mapper.set_mode(InputMode::Overlay(OverlayKind::TableOfContents));

        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('j'))),
            UiEvent::OverlayMove { delta: 1 }
        );
        chars(&mut mapper, "3");
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Up)),
            UiEvent::OverlayMove { delta: -3 }
        );
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Enter)),
            UiEvent::OverlayActivate
        );
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('t'))),
            UiEvent::CloseOverlay
        );
        assert_eq!(mapper.mode(), InputMode::Normal);
    }

    #[test]
    fn escape_leaves_overlay() {
        let mut mapper = EventMapper::new();
        mapper.set_mode(InputMode::Overlay(OverlayKind::Links));
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('t'))),
            UiEvent::None
        );
        assert_eq!(mapper.map_event(key_event(KeyCode::Esc)), UiEvent::CloseOverlay);
        assert_eq!(mapper.mode(), InputMode::Normal);
    }

    #[test]
    fn visual_mode_keys() {
        let mut mapper = EventMapper::new();
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('v'))),
            UiEvent::EnterVisual
        );
        mapper.set_mode(InputMode::Visual);
        assert_eq!(
            chars(&mut mapper, "2j").pop(),
            Some(UiEvent::VisualMoveRow { delta: 2 })
        );
        assert_eq!(
            chars(&mut mapper, "V"),
            vec![UiEvent::VisualToggleAnchor]
        );
        assert_eq!(
            chars(&mut mapper, "H"),
            vec![UiEvent::VisualMoveLeft { delta: -1 }]
        );
        assert_eq!(
            chars(&mut mapper, "l"),
            vec![UiEvent::VisualMoveRight { delta: 1 }]
        );
        assert_eq!(chars(&mut mapper, "y"), vec![UiEvent::VisualYank]);
        assert_eq!(mapper.mode(), InputMode::Normal);
    }

    #[test]
    fn switching_modes_clears_pending_state() {
        let mut mapper = EventMapper::new();
        chars(&mut mapper, "1");
        assert_eq!(mapper.pending_input().as_deref(), Some("1"));
        mapper.set_mode(InputMode::Visual);
        assert!(mapper.pending_input().is_none());
        mapper.set_mode(InputMode::Normal);
        assert!(mapper.pending_input().is_none());
    }

    #[test]
    fn text_mode_keys() {
        let mut mapper = EventMapper::new();
        assert_eq!(chars(&mut mapper, "T"), vec![UiEvent::EnterText]);
        mapper.set_mode(InputMode::Text);

        assert_eq!(
            chars(&mut mapper, "3j").pop(),
            Some(UiEvent::TextScroll { delta: 3 })
        );
        assert_eq!(
            chars(&mut mapper, "k"),
            vec![UiEvent::TextScroll { delta: -1 }]
        );
        assert_eq!(
            chars(&mut mapper, "gg").pop(),
            Some(UiEvent::Command(Command::GotoPage { page: 0 }))
        );
        assert_eq!(
            chars(&mut mapper, "12G").pop(),
            Some(UiEvent::Command(Command::GotoPage { page: 11 }))
        );
        assert_eq!(
            chars(&mut mapper, "l"),
            vec![UiEvent::Command(Command::NextChapter { count: 1 })]
        );
        assert_eq!(
            chars(&mut mapper, "t"),
            vec![UiEvent::OpenOverlay(OverlayKind::TableOfContents)]
        );
        assert_eq!(mapper.mode(), InputMode::Text);
        assert_eq!(chars(&mut mapper, "T"), vec![UiEvent::ExitText]);
        assert_eq!(mapper.mode(), InputMode::Normal);
    }

    #[test]
    fn escape_leaves_text_mode() {
        let mut mapper = EventMapper::new();
        mapper.set_mode(InputMode::Text);
        chars(&mut mapper, "4");
        assert_eq!(mapper.map_event(key_event(KeyCode::Esc)), UiEvent::ExitText);
        assert_eq!(mapper.mode(), InputMode::Normal);
        assert!(mapper.pending_input().is_none());
    }

    #[test]
    fn raw_bytes_decode_to_keys() {
        let events = events_from_bytes(b"3j\x1b[A\x0f\x1b\xc3");
        let mut mapper = EventMapper::new();
        let mapped: Vec<UiEvent> = events
            .into_iter()
            .map(|event| mapper.map_event(event))
            .filter(|event| *event != UiEvent::None)
            .collect();
        assert_eq!(
            mapped,
            vec![
                UiEvent::Command(Command::NextPage { count: 3 }),
                UiEvent::Command(Command::PrevPage { count: 1 }),
                UiEvent::Command(Command::GoBack),
            ]
        );
    }
}
