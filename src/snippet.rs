use include_dir::{include_dir, Dir};
use rand::seq::SliceRandom;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::catalog::{Language, LanguageFilter, Mode};
use crate::error::{Error, Result};
use crate::store::SqliteStore;

static SNIPPET_DIR: Dir = include_dir!("$CARGO_MANIFEST_DIR/src/snippets");

/// Id carried by snippets that do not come from storage.
pub const UNSTORED_SNIPPET_ID: i64 = 0;

/// A target text and the language it is written in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snippet {
    pub id: i64,
    pub text: String,
    pub language: Language,
}

impl Snippet {
    /// A user-supplied target text that has no storage id.
    pub fn custom(text: impl Into<String>, language: Language) -> Self {
        Self {
            id: UNSTORED_SNIPPET_ID,
            text: text.into(),
            language,
        }
    }
}

/// Chooses the target text for the next session. Never returns an empty text.
pub trait SnippetProvider {
    fn pick(&self, filter: LanguageFilter, mode: Mode) -> Snippet;
}

#[derive(Deserialize)]
struct FallbackFile {
    language: Language,
    normal: Vec<String>,
    pro: Vec<String>,
    expert: Vec<String>,
}

/// Built-in snippet set used whenever storage has nothing to offer.
#[derive(Debug, Clone)]
pub struct FallbackSnippets {
    pools: HashMap<(Language, Mode), Vec<String>>,
}

impl FallbackSnippets {
    /// Loads the embedded set. Fails if any pool is empty or the js/normal pool is missing.
    pub fn load() -> Result<Self> {
        let mut pools = HashMap::new();

        for file in SNIPPET_DIR.files() {
            let contents = file.contents_utf8().ok_or_else(|| {
                Error::InvalidSnippetSet(format!("{} is not utf-8", file.path().display()))
            })?;
            let parsed: FallbackFile = serde_json::from_str(contents)?;

            for (mode, texts) in [
                (Mode::Normal, parsed.normal),
                (Mode::Pro, parsed.pro),
                (Mode::Expert, parsed.expert),
            ] {
                if texts.is_empty() || texts.iter().any(|t| t.is_empty()) {
                    return Err(Error::InvalidSnippetSet(format!(
                        "{}/{} has an empty snippet pool or text",
                        parsed.language, mode
                    )));
                }
                pools.insert((parsed.language, mode), texts);
            }
        }

        if !pools.contains_key(&(Language::Js, Mode::Normal)) {
            return Err(Error::InvalidSnippetSet("missing js/normal pool".into()));
        }

        Ok(Self { pools })
    }

    pub fn pool(&self, language: Language, mode: Mode) -> Option<&[String]> {
        self.pools.get(&(language, mode)).map(Vec::as_slice)
    }
}

impl SnippetProvider for FallbackSnippets {
    /// Mixed resolves to a random fallback language; languages without a built-in pool use
    /// js/normal.
    fn pick(&self, filter: LanguageFilter, mode: Mode) -> Snippet {
        let rng = &mut rand::thread_rng();
        let requested = filter.resolve(rng);

        let (language, pool) = match self.pool(requested, mode) {
            Some(pool) => (requested, pool),
            None => match self.pool(Language::Js, Mode::Normal) {
                Some(pool) => (Language::Js, pool),
                // load() guarantees js/normal exists
                None => return Snippet::custom("console.log('Hello World');", Language::Js),
            },
        };

        let text = pool.choose(rng).cloned().unwrap_or_default();
        debug!(%language, %mode, "picked fallback snippet");
        Snippet::custom(text, language)
    }
}

/// Random snippet from storage, falling back to the built-in set when nothing matches.
pub struct StoredSnippets<'a> {
    store: &'a SqliteStore,
    fallback: &'a FallbackSnippets,
}

impl<'a> StoredSnippets<'a> {
    pub fn new(store: &'a SqliteStore, fallback: &'a FallbackSnippets) -> Self {
        Self { store, fallback }
    }
}

impl SnippetProvider for StoredSnippets<'_> {
    fn pick(&self, filter: LanguageFilter, mode: Mode) -> Snippet {
        match self.store.random_snippet(filter, mode) {
            Ok(Some(snippet)) if !snippet.text.is_empty() => {
                debug!(id = snippet.id, language = %snippet.language, %mode, "picked stored snippet");
                snippet
            }
            Ok(_) => self.fallback.pick(filter, mode),
            Err(err) => {
                warn!(error = %err, "snippet query failed; using fallback set");
                self.fallback.pick(filter, mode)
            }
        }
    }
}
