//! Storage collaborators.
//!
//! The render pipeline does not own deck or job persistence; it talks to
//! these traits. Memory-backed stores serve tests and embedding, filesystem
//! stores back the CLI.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use deckreel_common::error::{DeckreelError, DeckreelResult};
use tokio::sync::RwLock;

use crate::asset::MediaAsset;
use crate::bundle::{BundleError, DeckBundle};
use crate::job::{RenderId, RenderJob};

/// Read access to decks, plus write-back of probed asset metadata.
#[async_trait]
pub trait DeckStore: Send + Sync {
    /// Load a deck with its slides and timeline. `Ok(None)` if unknown.
    async fn load_bundle(&self, deck_id: &str) -> DeckreelResult<Option<DeckBundle>>;

    /// Persist probe results into every slide video referencing `asset.id`.
    async fn save_asset_meta(&self, deck_id: &str, asset: &MediaAsset) -> DeckreelResult<()>;
}

/// Persistence of render job records.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert(&self, job: &RenderJob) -> DeckreelResult<()>;
    async fn update(&self, job: &RenderJob) -> DeckreelResult<()>;
    async fn get(&self, id: RenderId) -> DeckreelResult<Option<RenderJob>>;
    /// All retained jobs, newest first.
    async fn list(&self) -> DeckreelResult<Vec<RenderJob>>;
}

fn apply_asset_meta(bundle: &mut DeckBundle, asset: &MediaAsset) -> usize {
    let mut updated = 0;
    for slide in &mut bundle.slides {
        if let Some(video) = slide.video.as_mut() {
            if video.asset.id == asset.id {
                video.asset.duration_ms = asset.duration_ms;
                video.asset.width = asset.width;
                video.asset.height = asset.height;
                video.asset.has_audio = asset.has_audio;
                updated += 1;
            }
        }
    }
    updated
}

fn sort_newest_first(jobs: &mut [RenderJob]) {
    jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

/// In-memory deck store.
#[derive(Debug, Default)]
pub struct MemoryDeckStore {
    decks: RwLock<HashMap<String, DeckBundle>>,
}

impl MemoryDeckStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a bundle, keyed by its deck id.
    pub async fn put(&self, bundle: DeckBundle) {
        self.decks
            .write()
            .await
            .insert(bundle.deck.id.clone(), bundle);
    }
}

#[async_trait]
impl DeckStore for MemoryDeckStore {
    async fn load_bundle(&self, deck_id: &str) -> DeckreelResult<Option<DeckBundle>> {
        Ok(self.decks.read().await.get(deck_id).cloned())
    }

    async fn save_asset_meta(&self, deck_id: &str, asset: &MediaAsset) -> DeckreelResult<()> {
        if let Some(bundle) = self.decks.write().await.get_mut(deck_id) {
            apply_asset_meta(bundle, asset);
        }
        Ok(())
    }
}

/// Deck store reading `<root>/<deck_id>/deck.json`.
#[derive(Debug, Clone)]
pub struct FsDeckStore {
    root: PathBuf,
}

impl FsDeckStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory of a deck bundle.
    pub fn deck_dir(&self, deck_id: &str) -> PathBuf {
        self.root.join(deck_id)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl DeckStore for FsDeckStore {
    async fn load_bundle(&self, deck_id: &str) -> DeckreelResult<Option<DeckBundle>> {
        if deck_id.is_empty() || deck_id.contains(['/', '\\']) || deck_id == ".." {
            return Ok(None);
        }
        let dir = self.deck_dir(deck_id);
        let loaded = tokio::task::spawn_blocking(move || DeckBundle::load(dir))
            .await
            .map_err(|e| DeckreelError::storage(format!("Deck load task failed: {e}")))?;
        match loaded {
            Ok(bundle) => Ok(Some(bundle)),
            Err(BundleError::IoError { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn save_asset_meta(&self, deck_id: &str, asset: &MediaAsset) -> DeckreelResult<()> {
        let dir = self.deck_dir(deck_id);
        let asset = asset.clone();
        tokio::task::spawn_blocking(move || -> Result<(), BundleError> {
            let mut bundle = DeckBundle::load(&dir)?;
            if apply_asset_meta(&mut bundle, &asset) > 0 {
                bundle.save(&dir)?;
            }
            Ok(())
        })
        .await
        .map_err(|e| DeckreelError::storage(format!("Asset write-back task failed: {e}")))?
        .map_err(DeckreelError::from)
    }
}

/// In-memory job store.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<RenderId, RenderJob>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: &RenderJob) -> DeckreelResult<()> {
        self.jobs.write().await.insert(job.id, job.clone());
        Ok(())
    }

    async fn update(&self, job: &RenderJob) -> DeckreelResult<()> {
        self.jobs.write().await.insert(job.id, job.clone());
        Ok(())
    }

    async fn get(&self, id: RenderId) -> DeckreelResult<Option<RenderJob>> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn list(&self) -> DeckreelResult<Vec<RenderJob>> {
        let mut jobs: Vec<_> = self.jobs.read().await.values().cloned().collect();
        sort_newest_first(&mut jobs);
        Ok(jobs)
    }
}

/// Job store writing one JSON file per job under a directory.
#[derive(Debug, Clone)]
pub struct FsJobStore {
    dir: PathBuf,
}

impl FsJobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn job_path(&self, id: RenderId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    async fn write(&self, job: &RenderJob) -> DeckreelResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.job_path(job.id);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(job)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl JobStore for FsJobStore {
    async fn insert(&self, job: &RenderJob) -> DeckreelResult<()> {
        self.write(job).await
    }

    async fn update(&self, job: &RenderJob) -> DeckreelResult<()> {
        self.write(job).await
    }

    async fn get(&self, id: RenderId) -> DeckreelResult<Option<RenderJob>> {
        match tokio::fs::read(self.job_path(id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> DeckreelResult<Vec<RenderJob>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut jobs = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = tokio::fs::read(&path).await?;
            match serde_json::from_slice::<RenderJob>(&bytes) {
                Ok(job) => jobs.push(job),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable job record");
                }
            }
        }
        sort_newest_first(&mut jobs);
        Ok(jobs)
    }
}
