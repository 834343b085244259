use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::document::{DocumentId, DocumentInfo, PageRect};
use crate::view::{CropMode, Rotation, ViewOptions};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedDocumentState {
    pub citation_key: Option<String>,
    pub paper_size: usize,
    pub font_size: f32,
    pub current_page: usize,
    pub logical_page: Option<String>,
    pub first_page_offset: i64,
    pub rotation: Rotation,
    pub crop: CropMode,
    pub manual_crop: Option<PageRect>,
    pub alpha: bool,
    pub invert: bool,
    pub tint: bool,
}

impl Default for PersistedDocumentState {
    fn default() -> Self {
        Self {
            citation_key: None,
            paper_size: 0,
            font_size: 12.0,
            current_page: 0,
            logical_page: None,
            first_page_offset: 1,
            rotation: Rotation::default(),
            crop: CropMode::default(),
            manual_crop: None,
            alpha: false,
            invert: false,
            tint: false,
        }
    }
}

impl PersistedDocumentState {
    pub fn view_options(&self) -> ViewOptions {
        ViewOptions {
            rotation: self.rotation,
            crop: if self.crop == CropMode::Manual && self.manual_crop.is_none() {
                CropMode::None
            } else {
                self.crop
            },
            manual_crop: self.manual_crop,
            alpha: self.alpha,
            invert: self.invert,
            tint: self.tint,
        }
    }

    pub fn set_view_options(&mut self, options: &ViewOptions) {
        self.rotation = options.rotation;
        self.crop = options.crop;
        self.manual_crop = options.manual_crop;
        self.alpha = options.alpha;
        self.invert = options.invert;
        self.tint = options.tint;
    }
}

pub trait StateStore: Send + Sync {
    fn load(&self, doc: &DocumentInfo) -> Result<Option<PersistedDocumentState>>;
    fn save(&self, doc: &DocumentInfo, state: &PersistedDocumentState) -> Result<()>;
}

pub struct FileStateStore {
    root: PathBuf,
}

impl FileStateStore {
    pub fn new(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create state directory at {:?}", root))?;
        Ok(Self { root })
    }

    fn state_path(&self, doc: &DocumentInfo) -> PathBuf {
        self.root.join(format!("{}.json", doc.id))
    }
}

impl StateStore for FileStateStore {
    fn load(&self, doc: &DocumentInfo) -> Result<Option<PersistedDocumentState>> {
        let path = self.state_path(doc);
        if !path.exists() {
            return Ok(None);
        }
        let mut file =
            File::open(&path).with_context(|| format!("failed to open state file {:?}", path))?;
        let mut buf = String::new();
        file.read_to_string(&mut buf)?;
        let state = serde_json::from_str(&buf)
            .with_context(|| format!("failed to decode state file {:?}", path))?;
        Ok(Some(state))
    }

    fn save(&self, doc: &DocumentInfo, state: &PersistedDocumentState) -> Result<()> {
        let path = self.state_path(doc);
        let tmp = path.with_extension("json.tmp");
        let payload = serde_json::to_string_pretty(state)?;
        let mut file = File::create(&tmp)
            .with_context(|| format!("failed to open temp state file {:?}", tmp))?;
        file.write_all(payload.as_bytes())?;
        file.flush()?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("failed to move state file into place at {:?}", path))?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStateStore {
    inner: Mutex<HashMap<DocumentId, PersistedDocumentState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self, doc: &DocumentInfo) -> Result<Option<PersistedDocumentState>> {
        Ok(self.inner.lock().get(&doc.id).cloned())
    }

    fn save(&self, doc: &DocumentInfo, state: &PersistedDocumentState) -> Result<()> {
        self.inner.lock().insert(doc.id, state.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::document_id_for_file;
    use tempfile::tempdir;

    #[test]
    fn file_state_store_restores_state_by_content_id() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("sample.pdf");
        std::fs::write(&file_path, b"dummy").unwrap();

        let info = DocumentInfo {
            id: document_id_for_file(&file_path).unwrap(),
            path: file_path.clone(),
            page_count: 3,
            title: None,
        };

        let store = FileStateStore::new(dir.path().join("state")).unwrap();

        let state = PersistedDocumentState {
            current_page: 2,
            logical_page: Some("iii".into()),
            first_page_offset: -4,
            rotation: Rotation::Deg270,
            crop: CropMode::Manual,
            manual_crop: Some(PageRect::new(1.0, 2.0, 3.0, 4.0)),
            invert: true,
            citation_key: Some("doe2020".into()),
            ..PersistedDocumentState::default()
        };

        store.save(&info, &state).unwrap();
        let restored = store.load(&info).unwrap().unwrap();
        assert_eq!(restored, state);
    }

    #[test]
    fn missing_state_file_loads_as_none() {
        let dir = tempdir().unwrap();
        let store = FileStateStore::new(dir.path().to_path_buf()).unwrap();
        let info = DocumentInfo {
            id: uuid::Uuid::nil(),
            path: dir.path().join("missing.pdf"),
            page_count: 1,
            title: None,
        };
        assert!(store.load(&info).unwrap().is_none());
    }

    #[test]
    fn partial_state_fills_defaults() {
        let state: PersistedDocumentState =
            serde_json::from_str(r#"{ "current_page": 7 }"#).unwrap();
        assert_eq!(state.current_page, 7);
        assert_eq!(state.first_page_offset, 1);
        assert_eq!(state.crop, CropMode::None);
    }

    #[test]
    fn manual_crop_without_rectangle_is_dropped() {
        let state = PersistedDocumentState {
            crop: CropMode::Manual,
            ..PersistedDocumentState::default()
        };
        assert_eq!(state.view_options().crop, CropMode::None);
    }
}
