pub mod check;
pub mod info;
pub mod plan;
pub mod render;
pub mod status;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use deckreel_common::config::AppConfig;
use deckreel_deck_model::bundle::{DeckBundle, BUNDLE_FILE};
use deckreel_deck_model::store::{DeckStore, FsDeckStore, MemoryDeckStore};

/// A deck named on the command line, with the store that serves it.
pub struct DeckSource {
    pub deck_id: String,
    pub store: Arc<dyn DeckStore>,
    /// Base for relative media paths.
    pub media_root: PathBuf,
}

impl DeckSource {
    /// Resolve a bundle directory or a deck id.
    ///
    /// A directory is served from memory and its media paths resolve against
    /// the directory itself. An id is looked up under the configured decks
    /// dir with the configured media root.
    pub async fn resolve(config: &AppConfig, deck: &str) -> anyhow::Result<Self> {
        let dir = Path::new(deck);
        if dir.join(BUNDLE_FILE).is_file() {
            let bundle = DeckBundle::load(dir)
                .map_err(|e| anyhow::anyhow!("Failed to load deck: {e}"))?;
            let deck_id = bundle.deck.id.clone();
            let store = MemoryDeckStore::new();
            store.put(bundle).await;
            return Ok(Self {
                deck_id,
                store: Arc::new(store),
                media_root: dir.to_path_buf(),
            });
        }

        Ok(Self {
            deck_id: deck.to_string(),
            store: Arc::new(FsDeckStore::new(config.decks_dir())),
            media_root: config.media_root.clone(),
        })
    }

    /// Load the bundle, failing if the deck does not exist.
    pub async fn load(&self) -> anyhow::Result<DeckBundle> {
        self.store
            .load_bundle(&self.deck_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Deck not found: {}", self.deck_id))
    }
}
