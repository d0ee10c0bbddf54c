//! Index & Folder Layer: the top-level app folder, the
//! `noteId → fileId` hint cache in `index.json`, and the index mutex
//! that serializes every write to it.
//!
//! Canonical truth is always discovery by listing (the Reconciler runs
//! on whatever the remote actually contains); this layer exists purely
//! to avoid a full listing on every hot-path lookup.

use std::collections::HashMap;
use std::sync::RwLock;

use gnote_core::model::RemoteFileId;
use tokio::sync::Mutex;

use crate::error::{Result, SyncError};
use crate::remote::RemoteClient;

const APP_FOLDER_NAME: &str = "GNote";
const INDEX_FILE_NAME: &str = "index.json";
const INDEX_SCHEMA_VERSION: u32 = 1;

#[derive(serde::Serialize, serde::Deserialize)]
struct IndexFile {
    version: u32,
    notes: HashMap<String, String>,
}

/// Maintains the app folder and the advisory `index.json` hint cache.
pub struct IndexLayer<'r, R: RemoteClient> {
    remote: &'r R,
    folder_id: RwLock<Option<String>>,
    index_file_id: RwLock<Option<RemoteFileId>>,
    cache: RwLock<HashMap<String, RemoteFileId>>,
    index_mutex: Mutex<()>,
}

impl<'r, R: RemoteClient> IndexLayer<'r, R> {
    /// Wrap a remote client reference; nothing is discovered yet until
    /// [`Self::ensure_folder`] runs.
    pub fn new(remote: &'r R) -> Self {
        IndexLayer {
            remote,
            folder_id: RwLock::new(None),
            index_file_id: RwLock::new(None),
            cache: RwLock::new(HashMap::new()),
            index_mutex: Mutex::new(()),
        }
    }

    /// Discover or create the app folder. Idempotent — subsequent calls
    /// return the cached id.
    pub async fn ensure_folder(&self) -> Result<String> {
        if let Some(id) = self.folder_id.read().unwrap().clone() {
            return Ok(id);
        }
        let id = self.remote.create_folder(APP_FOLDER_NAME).await?;
        *self.folder_id.write().unwrap() = Some(id.clone());
        Ok(id)
    }

    /// Load `index.json` from the remote. On a miss (no such file yet)
    /// the cache starts empty; on a parse failure the cache is rebuilt
    /// from a listing instead of surfacing an error, per the index
    /// layer's "advisory" contract.
    pub async fn load(&self) -> Result<()> {
        let folder_id = self.ensure_folder().await?;
        let query = format!("'{folder_id}' in parents and name = '{INDEX_FILE_NAME}' and trashed = false");
        let found = self.remote.list_by_query(&query).await?;

        let Some(meta) = found.into_iter().next() else {
            return Ok(());
        };
        *self.index_file_id.write().unwrap() = Some(meta.file_id.clone());

        match self.remote.download(&meta.file_id).await {
            Ok(bytes) => match serde_json::from_slice::<IndexFile>(&bytes) {
                Ok(index) => {
                    let mut cache = self.cache.write().unwrap();
                    for (note_id, file_id) in index.notes {
                        cache.insert(note_id, RemoteFileId(file_id));
                    }
                    Ok(())
                }
                Err(_) => self.rebuild_from_listing(&folder_id).await,
            },
            Err(_) => self.rebuild_from_listing(&folder_id).await,
        }
    }

    /// Rebuild the hint cache from a folder listing. File names are the
    /// conventional `<noteId>.json`; this is only ever a hint, so
    /// deriving the note id from the name here is acceptable even though
    /// the name is not itself authoritative.
    async fn rebuild_from_listing(&self, folder_id: &str) -> Result<()> {
        let query = format!("'{folder_id}' in parents and trashed = false");
        let files = self.remote.list_by_query(&query).await?;
        let mut cache = self.cache.write().unwrap();
        cache.clear();
        for file in files {
            if file.name == INDEX_FILE_NAME {
                continue;
            }
            if let Some(note_id) = file.name.strip_suffix(".json") {
                cache.insert(note_id.to_string(), file.file_id);
            }
        }
        Ok(())
    }

    /// Look up a note's remote file id, if the hint cache has one.
    pub fn get_file_id(&self, note_id: &str) -> Option<RemoteFileId> {
        self.cache.read().unwrap().get(note_id).cloned()
    }

    /// Record a new mapping and persist `index.json`. Runs under the
    /// index mutex, as does every other write to that file.
    pub async fn set_file_id(&self, note_id: &str, file_id: RemoteFileId) -> Result<()> {
        self.cache.write().unwrap().insert(note_id.to_string(), file_id);
        self.persist().await
    }

    /// Drop a mapping (note permanently deleted) and persist.
    pub async fn remove_file_id(&self, note_id: &str) -> Result<()> {
        self.cache.write().unwrap().remove(note_id);
        self.persist().await
    }

    async fn persist(&self) -> Result<()> {
        let _guard = self.index_mutex.lock().await;
        let folder_id = self.ensure_folder().await?;
        let notes = {
            let cache = self.cache.read().unwrap();
            cache.iter().map(|(k, v)| (k.clone(), v.0.clone())).collect()
        };
        let body = serde_json::to_vec(&IndexFile {
            version: INDEX_SCHEMA_VERSION,
            notes,
        })
        .map_err(|e| SyncError::Corrupted(e.to_string()))?;

        let existing = self.index_file_id.read().unwrap().clone();
        match existing {
            Some(file_id) => self.remote.update_file(&file_id, &body, None).await,
            None => {
                let file_id = self.remote.create_file(&folder_id, INDEX_FILE_NAME, &body).await?;
                *self.index_file_id.write().unwrap() = Some(file_id);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::RemoteMetadata;
    use std::collections::HashMap as StdHashMap;
    use std::sync::Mutex as StdMutex;

    struct FakeRemote {
        folder_id: String,
        files: StdMutex<StdHashMap<String, (String, Vec<u8>)>>, // file_id -> (name, content)
        next_id: StdMutex<u64>,
    }

    impl FakeRemote {
        fn new() -> Self {
            FakeRemote {
                folder_id: "folder1".to_string(),
                files: StdMutex::new(StdHashMap::new()),
                next_id: StdMutex::new(0),
            }
        }
    }

    impl RemoteClient for FakeRemote {
        async fn list_by_query(&self, query: &str) -> Result<Vec<RemoteMetadata>> {
            let files = self.files.lock().unwrap();
            Ok(files
                .iter()
                .filter(|(_, (name, _))| {
                    if query.contains(INDEX_FILE_NAME) {
                        *name == INDEX_FILE_NAME
                    } else {
                        true
                    }
                })
                .map(|(id, (name, _))| RemoteMetadata {
                    file_id: RemoteFileId(id.clone()),
                    name: name.clone(),
                    modified_time: 0,
                    etag: "etag".into(),
                })
                .collect())
        }

        async fn get_metadata(&self, file_id: &RemoteFileId) -> Result<RemoteMetadata> {
            let files = self.files.lock().unwrap();
            let (name, _) = files.get(&file_id.0).ok_or(SyncError::NotFound)?;
            Ok(RemoteMetadata {
                file_id: file_id.clone(),
                name: name.clone(),
                modified_time: 0,
                etag: "etag".into(),
            })
        }

        async fn download(&self, file_id: &RemoteFileId) -> Result<Vec<u8>> {
            let files = self.files.lock().unwrap();
            files.get(&file_id.0).map(|(_, c)| c.clone()).ok_or(SyncError::NotFound)
        }

        async fn create_file(&self, _parent: &str, name: &str, content: &[u8]) -> Result<RemoteFileId> {
            let mut next_id = self.next_id.lock().unwrap();
            *next_id += 1;
            let id = format!("file{}", *next_id);
            self.files.lock().unwrap().insert(id.clone(), (name.to_string(), content.to_vec()));
            Ok(RemoteFileId(id))
        }

        async fn update_file(&self, file_id: &RemoteFileId, content: &[u8], _if_match: Option<&str>) -> Result<()> {
            let mut files = self.files.lock().unwrap();
            let entry = files.get_mut(&file_id.0).ok_or(SyncError::NotFound)?;
            entry.1 = content.to_vec();
            Ok(())
        }

        async fn delete_file(&self, file_id: &RemoteFileId) -> Result<()> {
            self.files.lock().unwrap().remove(&file_id.0);
            Ok(())
        }

        async fn create_folder(&self, _name: &str) -> Result<String> {
            Ok(self.folder_id.clone())
        }

        fn set_access_token(&self, _token: &str) {}
    }

    #[tokio::test]
    async fn set_file_id_round_trips_through_persisted_index() {
        let remote = FakeRemote::new();
        let layer = IndexLayer::new(&remote);
        layer.set_file_id("n1", RemoteFileId("file1".into())).await.unwrap();
        assert_eq!(layer.get_file_id("n1"), Some(RemoteFileId("file1".into())));

        let reloaded = IndexLayer::new(&remote);
        reloaded.load().await.unwrap();
        assert_eq!(reloaded.get_file_id("n1"), Some(RemoteFileId("file1".into())));
    }

    #[tokio::test]
    async fn miss_falls_back_to_listing_rebuild() {
        let remote = FakeRemote::new();
        remote
            .create_file("folder1", "n1.json", b"{}")
            .await
            .unwrap();
        let layer = IndexLayer::new(&remote);
        layer.load().await.unwrap();
        assert!(layer.get_file_id("n1").is_some());
    }
}
