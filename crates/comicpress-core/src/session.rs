//! Editing session: save and load orchestration for one project
//!
//! An [`EditorSession`] holds the pages of a project as they are edited and
//! decides when they need to reach the backend. Each page's last saved
//! content is remembered as a SHA-256 digest of its serialized elements, so
//! saving an unchanged page costs no network traffic. A failed save keeps
//! the old digest, which means the next attempt resends the whole page.
//!
//! Saves for the same page run one at a time behind a per-page lock, and
//! every request carries an increasing revision number so the backend can
//! discard a write that arrives out of order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::api::ComicApi;
use crate::dirty::DirtySet;
use crate::error::SessionError;
use crate::guard::{NavigationGuard, NavigationOutcome};
use crate::models::{Page, PageId, ProjectId};
use crate::serializer::{deserialize_page_with_report, serialize_page, OwnershipPolicy};
use crate::wire::{PersistedElement, SavePageRequest};

/// Result of [`EditorSession::save_page`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Content matched the last save; nothing was sent
    Unchanged,
    /// The backend accepted the page
    Saved { revision: u64 },
    /// The save failed; the page stays dirty
    Failed(String),
}

impl SaveOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, SaveOutcome::Failed(_))
    }
}

#[derive(Debug, Clone)]
struct SavedSnapshot {
    digest: String,
    revision: u64,
    saved_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct SessionState {
    pages: Vec<Page>,
    current: usize,
    dirty: DirtySet,
    saved: HashMap<PageId, SavedSnapshot>,
    last_error: Option<String>,
}

pub struct EditorSession {
    api: Arc<dyn ComicApi>,
    project_id: ProjectId,
    ownership: OwnershipPolicy,
    state: Mutex<SessionState>,
    write_locks: Mutex<HashMap<PageId, Arc<tokio::sync::Mutex<()>>>>,
    revision: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Stable digest of a serialized page
pub fn snapshot_digest(elements: &[PersistedElement]) -> serde_json::Result<String> {
    let mut hasher = Sha256::new();
    serde_json::to_writer(&mut hasher, elements)?;
    Ok(hex::encode(hasher.finalize()))
}

impl EditorSession {
    pub fn new(api: Arc<dyn ComicApi>, project_id: ProjectId, pages: Vec<Page>) -> Self {
        Self {
            api,
            project_id,
            ownership: OwnershipPolicy::default(),
            state: Mutex::new(SessionState {
                pages,
                ..SessionState::default()
            }),
            write_locks: Mutex::new(HashMap::new()),
            revision: AtomicU64::new(0),
        }
    }

    pub fn with_ownership(mut self, policy: OwnershipPolicy) -> Self {
        self.ownership = policy;
        self
    }

    pub fn project_id(&self) -> ProjectId {
        self.project_id
    }

    pub fn pages(&self) -> Vec<Page> {
        lock(&self.state).pages.clone()
    }

    pub fn page(&self, index: usize) -> Option<Page> {
        lock(&self.state).pages.get(index).cloned()
    }

    pub fn page_count(&self) -> usize {
        lock(&self.state).pages.len()
    }

    pub fn current_index(&self) -> usize {
        lock(&self.state).current
    }

    pub fn set_current(&self, index: usize) -> Result<(), SessionError> {
        let mut state = lock(&self.state);
        check_index(&state, index)?;
        state.current = index;
        Ok(())
    }

    /// Replace a page with an edited version and mark it dirty
    ///
    /// The replacement must keep the page id of the slot it replaces.
    pub fn update_page(&self, index: usize, page: Page) -> Result<(), SessionError> {
        let mut state = lock(&self.state);
        check_index(&state, index)?;
        let expected = state.pages[index].id;
        if page.id != expected {
            return Err(SessionError::PageIdMismatch {
                index,
                expected,
                found: page.id,
            });
        }
        state.dirty = state.dirty.mark_dirty(page.id);
        state.pages[index] = page;
        Ok(())
    }

    pub fn is_dirty(&self) -> bool {
        !lock(&self.state).dirty.is_empty()
    }

    pub fn is_page_dirty(&self, page_id: PageId) -> bool {
        lock(&self.state).dirty.contains(page_id)
    }

    /// Current dirty set; compare instances with [`DirtySet::ptr_eq`]
    pub fn dirty_pages(&self) -> DirtySet {
        lock(&self.state).dirty.clone()
    }

    pub fn last_saved_at(&self, page_id: PageId) -> Option<DateTime<Utc>> {
        lock(&self.state).saved.get(&page_id).map(|s| s.saved_at)
    }

    /// Message from the last failed save or load
    pub fn last_error(&self) -> Option<String> {
        lock(&self.state).last_error.clone()
    }

    pub fn clear_error(&self) {
        lock(&self.state).last_error = None;
    }

    fn set_error(&self, message: String) {
        lock(&self.state).last_error = Some(message);
    }

    fn write_lock(&self, page_id: PageId) -> Arc<tokio::sync::Mutex<()>> {
        lock(&self.write_locks)
            .entry(page_id)
            .or_default()
            .clone()
    }

    /// Save a page, the current one when `index` is `None`
    ///
    /// Never returns an error: failures are reported in the outcome and kept
    /// in [`last_error`](Self::last_error).
    pub async fn save_page(&self, index: Option<usize>) -> SaveOutcome {
        let index = index.unwrap_or_else(|| self.current_index());
        let page_id = match self.page(index) {
            Some(page) => page.id,
            None => return self.fail(self.out_of_range(index).to_string()),
        };

        let write_lock = self.write_lock(page_id);
        let _writing = write_lock.lock().await;

        // Read again: the page may have been edited while waiting for the lock
        let page = match self.page(index).filter(|p| p.id == page_id) {
            Some(page) => page,
            None => return self.fail(format!("Page {} moved while saving", page_id)),
        };

        let elements = serialize_page(&page);
        let digest = match snapshot_digest(&elements) {
            Ok(digest) => digest,
            Err(e) => return self.fail(format!("Failed to save page {}: {}", page_id, e)),
        };
        {
            let mut state = lock(&self.state);
            if state.saved.get(&page_id).map(|s| s.digest.as_str()) == Some(digest.as_str()) {
                debug!("Page {} unchanged since last save", page_id);
                state.dirty = state.dirty.mark_clean(page_id);
                return SaveOutcome::Unchanged;
            }
        }

        let revision = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
        let request = SavePageRequest {
            elements,
            is_thumbnail: None,
            revision: Some(revision),
        };

        debug!(
            "Saving page {} of project {} (revision {}, {} elements)",
            page_id,
            self.project_id,
            revision,
            request.elements.len()
        );

        match self.api.save_page(self.project_id, page_id, &request).await {
            Ok(response) => {
                let mut state = lock(&self.state);
                let newer = state
                    .saved
                    .get(&page_id)
                    .map_or(true, |previous| previous.revision < revision);
                if newer {
                    state.saved.insert(
                        page_id,
                        SavedSnapshot {
                            digest: digest.clone(),
                            revision,
                            saved_at: Utc::now(),
                        },
                    );
                }

                // Edits made during the request keep the page dirty
                let current = state
                    .pages
                    .iter()
                    .find(|p| p.id == page_id)
                    .and_then(|p| snapshot_digest(&serialize_page(p)).ok());
                if current.as_deref() == Some(digest.as_str()) {
                    state.dirty = state.dirty.mark_clean(page_id);
                }
                state.last_error = None;

                info!(
                    "Saved page {} of project {} (revision {}): {}",
                    page_id, self.project_id, revision, response.detail
                );
                SaveOutcome::Saved { revision }
            }
            Err(e) => {
                warn!("Failed to save page {}: {}", page_id, e);
                let mut message = format!("Failed to save page {}: {}", page_id, e);
                if let Some(hint) = e.recovery_suggestion() {
                    message.push_str(&format!(" ({})", hint));
                }
                self.fail(message)
            }
        }
    }

    /// Save every dirty page in page order
    pub async fn save_all_dirty(&self) -> Vec<(PageId, SaveOutcome)> {
        let targets: Vec<(usize, PageId)> = {
            let state = lock(&self.state);
            state
                .pages
                .iter()
                .enumerate()
                .filter(|(_, page)| state.dirty.contains(page.id))
                .map(|(index, page)| (index, page.id))
                .collect()
        };

        let mut outcomes = Vec::with_capacity(targets.len());
        for (index, page_id) in targets {
            outcomes.push((page_id, self.save_page(Some(index)).await));
        }
        outcomes
    }

    /// Load a page from the backend and replace the local copy
    ///
    /// `Ok(None)` means the backend has nothing for the page yet; the local
    /// copy is left alone. Transport and server failures are errors.
    pub async fn load_page(&self, index: usize) -> Result<Option<Page>, SessionError> {
        let local = self.page(index).ok_or_else(|| self.out_of_range(index))?;

        let record = match self.api.load_page(self.project_id, local.id).await {
            Ok(record) => record,
            Err(e) if e.is_not_found() => {
                debug!("Page {} has no saved state yet", local.id);
                return Ok(None);
            }
            Err(e) => {
                warn!("Failed to load page {}: {}", local.id, e);
                self.set_error(format!("Failed to load page {}: {}", local.id, e));
                return Err(e.into());
            }
        };

        if record.elements.is_empty() {
            debug!("Page {} has an empty saved state", local.id);
            return Ok(None);
        }

        let layout = record.layout.unwrap_or(local.layout);
        let (page, report) =
            deserialize_page_with_report(&record.elements, local.id, layout, self.ownership);
        if !report.is_lossless() {
            warn!(
                "Page {}: {} bubble(s) outside every panel were dropped",
                local.id,
                report.dropped_bubbles.len()
            );
        }

        let digest = snapshot_digest(&serialize_page(&page))?;
        let mut state = lock(&self.state);
        // The page list may have changed while loading
        if let Some(slot) = state.pages.iter_mut().find(|p| p.id == local.id) {
            *slot = page.clone();
        }
        let revision = state.saved.get(&local.id).map_or(0, |s| s.revision);
        state.saved.insert(
            local.id,
            SavedSnapshot {
                digest,
                revision,
                saved_at: Utc::now(),
            },
        );
        state.dirty = state.dirty.mark_clean(local.id);

        info!(
            "Loaded page {} of project {} ({} panels, {} bubbles)",
            local.id,
            self.project_id,
            page.panels.len(),
            page.bubble_count()
        );
        Ok(Some(page))
    }

    /// Navigate away, first saving every page with unsaved edits
    ///
    /// Navigation is blocked if any of those saves fails.
    pub async fn intercept_navigation<N: FnOnce()>(
        &self,
        guard: &NavigationGuard,
        navigate: N,
    ) -> NavigationOutcome {
        guard
            .intercept_navigation(
                self.is_dirty(),
                move || async move {
                    let failures: Vec<String> = self
                        .save_all_dirty()
                        .await
                        .into_iter()
                        .filter_map(|(_, outcome)| match outcome {
                            SaveOutcome::Failed(message) => Some(message),
                            _ => None,
                        })
                        .collect();
                    if failures.is_empty() {
                        Ok(())
                    } else {
                        Err(failures.join("; "))
                    }
                },
                navigate,
            )
            .await
    }

    fn fail(&self, message: String) -> SaveOutcome {
        self.set_error(message.clone());
        SaveOutcome::Failed(message)
    }

    fn out_of_range(&self, index: usize) -> SessionError {
        SessionError::PageOutOfRange {
            index,
            count: self.page_count(),
        }
    }
}

fn check_index(state: &SessionState, index: usize) -> Result<(), SessionError> {
    if index < state.pages.len() {
        Ok(())
    } else {
        Err(SessionError::PageOutOfRange {
            index,
            count: state.pages.len(),
        })
    }
}
