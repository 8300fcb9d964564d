//! Channel catalog state
//!
//! Owns the loaded channel list, favorites, the selected channel, and the
//! UI language. Every mutation goes through a named operation; persistence
//! of favorites and language happens inside those operations.

use tracing::{debug, info, warn};

use crate::{
    store::{KeyValueStore, FAVORITES_KEY, LANGUAGE_KEY},
    types::{ChannelRecord, Language, QualityHint},
    Error, Result,
};

/// Demo streams installed when ingestion yields nothing
pub fn placeholder_channels() -> Vec<ChannelRecord> {
    vec![
        ChannelRecord {
            id: "s1".to_string(),
            name: "Star Sports 1".to_string(),
            logo_url: "https://upload.wikimedia.org/wikipedia/en/thumb/5/53/Star_Sports_logo.svg/200px-Star_Sports_logo.svg.png".to_string(),
            stream_url: "https://demo.unified-streaming.com/k8s/live/stable/scte35.isml/.m3u8".to_string(),
            category: "Sports".to_string(),
            country: String::new(),
            quality_hint: QualityHint::Uhd4k,
        },
        ChannelRecord {
            id: "s2".to_string(),
            name: "CNN News".to_string(),
            logo_url: "https://upload.wikimedia.org/wikipedia/commons/b/b1/CNN.svg".to_string(),
            stream_url: "https://bitdash-a.akamaihd.net/content/MI201109210084_1/m3u8s/f08e80da-91d5-4704-8b5d-005c0731336a.m3u8".to_string(),
            category: "News".to_string(),
            country: String::new(),
            quality_hint: QualityHint::Fhd,
        },
    ]
}

/// Application catalog state
pub struct Catalog<S> {
    store: S,
    channels: Vec<ChannelRecord>,
    favorites: Vec<String>,
    selected: Option<ChannelRecord>,
    language: Language,
    admin_secret: Option<String>,
    is_admin: bool,
}

impl<S: KeyValueStore> Catalog<S> {
    /// Create a catalog, restoring favorites and language from the store
    pub fn new(store: S, admin_secret: Option<String>) -> Self {
        let favorites = restore_favorites(&store);
        let language = restore_language(&store);
        debug!(favorites = favorites.len(), language = %language, "Catalog restored");

        Self {
            store,
            channels: Vec::new(),
            favorites,
            selected: None,
            language,
            admin_secret,
            is_admin: false,
        }
    }

    /// Replace the channel list wholesale. An empty list installs the
    /// placeholder channels instead. Clears any selection.
    pub fn replace_channels(&mut self, channels: Vec<ChannelRecord>) {
        self.channels = if channels.is_empty() {
            warn!("No channels ingested, installing placeholders");
            placeholder_channels()
        } else {
            channels
        };
        self.selected = None;
        info!(channels = self.channels.len(), "Catalog loaded");
    }

    pub fn channels(&self) -> &[ChannelRecord] {
        &self.channels
    }

    pub fn get(&self, id: &str) -> Option<&ChannelRecord> {
        self.channels.iter().find(|c| c.id == id)
    }

    /// Select a channel by id
    pub fn select_channel(&mut self, id: &str) -> Result<&ChannelRecord> {
        let channel = self
            .get(id)
            .cloned()
            .ok_or_else(|| Error::UnknownChannel(id.to_string()))?;
        info!(id, name = %channel.name, "Channel selected");
        Ok(&*self.selected.insert(channel))
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    pub fn selected(&self) -> Option<&ChannelRecord> {
        self.selected.as_ref()
    }

    /// Toggle favorite membership; returns the new membership
    pub fn toggle_favorite(&mut self, id: &str) -> Result<bool> {
        let mut candidate = self.favorites.clone();
        let now_favorite = if let Some(pos) = candidate.iter().position(|f| f == id) {
            candidate.remove(pos);
            false
        } else {
            candidate.push(id.to_string());
            true
        };

        // Commit only once the write has landed
        self.store
            .set(FAVORITES_KEY, &serde_json::to_string(&candidate)?)?;
        self.favorites = candidate;
        debug!(id, favorite = now_favorite, "Favorite toggled");
        Ok(now_favorite)
    }

    pub fn is_favorite(&self, id: &str) -> bool {
        self.favorites.iter().any(|f| f == id)
    }

    pub fn favorite_ids(&self) -> &[String] {
        &self.favorites
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn set_language(&mut self, language: Language) -> Result<()> {
        self.store.set(LANGUAGE_KEY, language.code())?;
        self.language = language;
        info!(language = %language, "Language changed");
        Ok(())
    }

    /// Case-insensitive name search
    pub fn search(&self, query: &str) -> Vec<&ChannelRecord> {
        let query = query.to_lowercase();
        self.channels
            .iter()
            .filter(|c| c.name.to_lowercase().contains(&query))
            .collect()
    }

    pub fn by_category(&self, category: &str) -> Vec<&ChannelRecord> {
        self.channels
            .iter()
            .filter(|c| c.category.eq_ignore_ascii_case(category))
            .collect()
    }

    pub fn radio(&self) -> Vec<&ChannelRecord> {
        self.channels.iter().filter(|c| c.is_radio()).collect()
    }

    /// Favorite channels in catalog order
    pub fn favorites(&self) -> Vec<&ChannelRecord> {
        self.channels
            .iter()
            .filter(|c| self.is_favorite(&c.id))
            .collect()
    }

    /// A window of the catalog for incremental rendering
    pub fn page(&self, offset: usize, limit: usize) -> &[ChannelRecord] {
        let start = offset.min(self.channels.len());
        let end = start.saturating_add(limit).min(self.channels.len());
        &self.channels[start..end]
    }

    /// Distinct category labels in first-seen order
    pub fn categories(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for channel in &self.channels {
            if !seen.contains(&channel.category.as_str()) {
                seen.push(&channel.category);
            }
        }
        seen
    }

    /// Unlock the admin view. A client-side UI gate only.
    pub fn unlock_admin(&mut self, secret: &str) -> bool {
        let unlocked = self
            .admin_secret
            .as_deref()
            .is_some_and(|expected| expected == secret);
        if unlocked {
            self.is_admin = true;
        } else {
            warn!("Admin unlock rejected");
        }
        unlocked
    }

    pub fn is_admin(&self) -> bool {
        self.is_admin
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

fn restore_favorites<S: KeyValueStore>(store: &S) -> Vec<String> {
    match store.get(FAVORITES_KEY) {
        Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(error = %e, "Ignoring malformed favorites");
            Vec::new()
        }),
        Ok(None) => Vec::new(),
        Err(e) => {
            warn!(error = %e, "Favorites unreadable");
            Vec::new()
        }
    }
}

fn restore_language<S: KeyValueStore>(store: &S) -> Language {
    match store.get(LANGUAGE_KEY) {
        Ok(Some(code)) => Language::from_code(code.trim()).unwrap_or_default(),
        Ok(None) => Language::default(),
        Err(e) => {
            warn!(error = %e, "Language unreadable");
            Language::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    fn channel(id: &str, name: &str, category: &str) -> ChannelRecord {
        ChannelRecord {
            id: id.to_string(),
            name: name.to_string(),
            logo_url: String::new(),
            stream_url: format!("http://s/{}", id),
            category: category.to_string(),
            country: String::new(),
            quality_hint: QualityHint::Hd,
        }
    }

    /// Reads succeed, writes always fail
    struct ReadOnlyStore;

    impl KeyValueStore for ReadOnlyStore {
        fn get(&self, _key: &str) -> Result<Option<String>> {
            Ok(Some(r#"["ch-1"]"#.to_string()))
        }

        fn set(&self, _key: &str, _value: &str) -> Result<()> {
            Err(Error::store("disk full"))
        }

        fn remove(&self, _key: &str) -> Result<()> {
            Err(Error::store("disk full"))
        }

        fn clear(&self) -> Result<()> {
            Err(Error::store("disk full"))
        }
    }

    fn loaded() -> Catalog<Arc<MemoryStore>> {
        let mut catalog = Catalog::new(Arc::new(MemoryStore::new()), Some("letmein".into()));
        catalog.replace_channels(vec![
            channel("ch-1", "Aaj Tak", "News"),
            channel("ch-3", "Radio Mirchi", "Radio"),
            channel("ch-5", "BBC News", "news"),
            channel("ch-7", "Cartoon Club", "Kids"),
        ]);
        catalog
    }

    #[test]
    fn test_empty_load_installs_placeholders() {
        let mut catalog = Catalog::new(MemoryStore::new(), None);
        catalog.replace_channels(Vec::new());
        assert_eq!(catalog.channels().len(), 2);
        assert_eq!(catalog.channels()[0].id, "s1");
    }

    #[test]
    fn test_views() {
        let catalog = loaded();
        assert_eq!(catalog.search("NEWS").len(), 1);
        assert_eq!(catalog.search("").len(), 4);
        assert_eq!(catalog.by_category("News").len(), 2);
        assert_eq!(catalog.radio()[0].id, "ch-3");
        assert_eq!(catalog.categories(), vec!["News", "Radio", "news", "Kids"]);
        assert_eq!(catalog.page(3, 24).len(), 1);
        assert!(catalog.page(10, 24).is_empty());
    }

    #[test]
    fn test_favorites_persist() {
        let store = Arc::new(MemoryStore::new());
        let mut catalog = Catalog::new(store.clone(), None);
        catalog.replace_channels(vec![channel("ch-1", "A", "News"), channel("ch-2", "B", "News")]);

        assert!(catalog.toggle_favorite("ch-2").unwrap());
        assert!(catalog.toggle_favorite("ch-1").unwrap());
        assert!(!catalog.toggle_favorite("ch-2").unwrap());
        assert_eq!(catalog.favorites().len(), 1);

        let restored = Catalog::new(store, None);
        assert_eq!(restored.favorite_ids(), ["ch-1".to_string()]);
    }

    #[test]
    fn test_failed_favorite_write_keeps_state() {
        let mut catalog = Catalog::new(ReadOnlyStore, None);
        assert!(catalog.is_favorite("ch-1"));

        assert!(matches!(catalog.toggle_favorite("ch-1"), Err(Error::Store(_))));
        assert!(catalog.is_favorite("ch-1"));

        assert!(catalog.toggle_favorite("ch-9").is_err());
        assert!(!catalog.is_favorite("ch-9"));
        assert_eq!(catalog.favorite_ids(), ["ch-1"]);
    }

    #[test]
    fn test_language_persists_and_tolerates_garbage() {
        let store = Arc::new(MemoryStore::new());
        let mut catalog = Catalog::new(store.clone(), None);
        assert_eq!(catalog.language(), Language::Hindi);
        catalog.set_language(Language::German).unwrap();
        assert_eq!(Catalog::new(store.clone(), None).language(), Language::German);

        store.set(LANGUAGE_KEY, "klingon").unwrap();
        store.set(FAVORITES_KEY, "not json").unwrap();
        let catalog = Catalog::new(store, None);
        assert_eq!(catalog.language(), Language::Hindi);
        assert!(catalog.favorite_ids().is_empty());
    }

    #[test]
    fn test_selection_cleared_on_replace() {
        let mut catalog = loaded();
        assert_eq!(catalog.select_channel("ch-5").unwrap().name, "BBC News");
        assert!(matches!(catalog.select_channel("nope"), Err(Error::UnknownChannel(_))));
        assert_eq!(catalog.selected().map(|c| c.id.as_str()), Some("ch-5"));

        catalog.replace_channels(vec![channel("ch-9", "Other", "General")]);
        assert!(catalog.selected().is_none());
    }

    #[test]
    fn test_admin_gate() {
        let mut catalog = loaded();
        assert!(!catalog.unlock_admin("guess"));
        assert!(!catalog.is_admin());
        assert!(catalog.unlock_admin("letmein"));
        assert!(catalog.is_admin());

        let mut no_secret = Catalog::new(MemoryStore::new(), None);
        assert!(!no_secret.unlock_admin(""));
    }
}
