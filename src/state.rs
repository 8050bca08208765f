//! Application state: rubric and credential stores, prompts, checker
//! settings, and the optional completion-service client.
//!
//! This module owns:
//!   - the rubric store (exact-match lookup by title/chapter/exercise)
//!   - the credential store (username -> password digest)
//!   - the prompts struct (from TOML or defaults)
//!   - optional OpenAI client pool + the plain HTTP client the HTML
//!     validator uses
//!
//! All stores are read-only after startup; per-user session flags live with
//! the connection that owns them, not here.

use std::collections::{BTreeMap, HashMap};

use sha2::{Digest, Sha256};
use tracing::{info, instrument, warn};

use crate::checkers::CheckerContext;
use crate::config::{load_grader_config_from_env, CheckerConfig, Prompts};
use crate::domain::{Rubric, RubricKey};
use crate::openai::OpenAI;
use crate::seeds::seed_rubrics;

pub struct AppState {
    pub rubrics: HashMap<RubricKey, Rubric>,
    pub credentials: HashMap<String, String>,
    pub prompts: Prompts,
    pub checkers: CheckerConfig,
    pub openai: Option<OpenAI>,
    pub http: reqwest::Client,
}

impl AppState {
    /// Build state from env: load config, fill the stores, init clients.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let cfg = load_grader_config_from_env().unwrap_or_default();

        let mut rubrics = HashMap::<RubricKey, Rubric>::new();
        for r in &cfg.rubrics {
            let key = RubricKey::new(&r.title, &r.chapter, &r.exercise);
            rubrics.insert(key, r.clone());
        }
        // Always insert built-in seeds, but don't overwrite configured entries.
        for r in seed_rubrics() {
            let key = RubricKey::new(&r.title, &r.chapter, &r.exercise);
            rubrics.entry(key).or_insert(r);
        }

        // Inventory summary by book title.
        let mut count_by_title: BTreeMap<String, usize> = BTreeMap::new();
        for r in rubrics.values() {
            *count_by_title.entry(r.title.clone()).or_insert(0) += 1;
        }
        for (title, n) in count_by_title {
            info!(target: "webgrader_backend", %title, rubrics = n, "Startup rubric inventory");
        }

        let mut credentials = HashMap::<String, String>::new();
        for c in &cfg.credentials {
            credentials.insert(c.username.clone(), c.password_sha256.clone());
        }
        if credentials.is_empty() {
            warn!(target: "webgrader_backend", "No credentials configured; every login will be rejected.");
        }

        let openai = OpenAI::from_env();
        if let Some(oa) = &openai {
            let primary = &oa.credentials[0];
            info!(target: "webgrader_backend", base_url = %primary.base_url, model = %primary.model, pool = oa.credentials.len(), policy = ?oa.policy, "Completion service enabled.");
        } else {
            warn!(target: "webgrader_backend", "Completion service disabled (no OPENAI_API_KEY). Grading will return error text.");
        }

        Self {
            rubrics,
            credentials,
            prompts: cfg.prompts,
            checkers: cfg.checkers,
            openai,
            http: reqwest::Client::new(),
        }
    }

    /// Borrow everything the per-file checkers need for one submission.
    pub fn checker_context(&self) -> CheckerContext<'_> {
        CheckerContext {
            cfg: &self.checkers,
            prompts: &self.prompts,
            openai: self.openai.as_ref(),
            http: &self.http,
        }
    }

    /// Exact-match rubric lookup. A miss is a plain `None`, never a fault.
    #[instrument(level = "debug", skip(self))]
    pub fn lookup_rubric(&self, title: &str, chapter: &str, exercise: &str) -> Option<Rubric> {
        self.rubrics
            .get(&RubricKey::new(title, chapter, exercise))
            .cloned()
    }

    /// sha-256 the password and compare `(username, digest)` exactly against
    /// the store. Case-sensitive; no lockout or rate limiting.
    #[instrument(level = "info", skip(self, password), fields(%username))]
    pub fn authenticate(&self, username: &str, password: &str) -> bool {
        let digest = sha256_hex(password);
        let ok = self.credentials.get(username).map(|stored| *stored == digest) == Some(true);
        info!(target: "webgrader_backend", %username, authenticated = ok, "Login attempt");
        ok
    }

    /// Catalog of titles -> chapters -> exercises present in the rubric
    /// store, sorted, for the UI's cascading selectors.
    pub fn books_catalog(&self) -> BTreeMap<String, BTreeMap<String, Vec<String>>> {
        let mut books: BTreeMap<String, BTreeMap<String, Vec<String>>> = BTreeMap::new();
        for r in self.rubrics.values() {
            books
                .entry(r.title.clone())
                .or_default()
                .entry(r.chapter.clone())
                .or_default()
                .push(r.exercise.clone());
        }
        for chapters in books.values_mut() {
            for exercises in chapters.values_mut() {
                exercises.sort();
            }
        }
        books
    }
}

pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_state() -> AppState {
        let mut rubrics = HashMap::new();
        let rubric = Rubric {
            title: "Book A".into(),
            chapter: "2".into(),
            exercise: "ex01".into(),
            prompt: "1. Heading present [Possible Score: 1]".into(),
        };
        rubrics.insert(
            RubricKey::new("Book A", "2", "ex01"),
            rubric,
        );

        let mut credentials = HashMap::new();
        credentials.insert("instructor".to_string(), sha256_hex("hunter2"));

        AppState {
            rubrics,
            credentials,
            prompts: Prompts::default(),
            checkers: CheckerConfig::default(),
            openai: None,
            http: reqwest::Client::new(),
        }
    }

    #[test]
    fn correct_pair_authenticates() {
        let state = test_state();
        assert!(state.authenticate("instructor", "hunter2"));
    }

    #[test]
    fn wrong_password_is_rejected() {
        let state = test_state();
        assert!(!state.authenticate("instructor", "hunter3"));
    }

    #[test]
    fn lookup_is_exact_and_case_sensitive() {
        let state = test_state();
        assert!(!state.authenticate("Instructor", "hunter2"));
        assert!(!state.authenticate("instructo", "hunter2"));

        assert!(state.lookup_rubric("Book A", "2", "ex01").is_some());
        assert!(state.lookup_rubric("Book A", "2", "ex02").is_none());
        assert!(state.lookup_rubric("book a", "2", "ex01").is_none());
    }

    #[test]
    fn catalog_groups_titles_chapters_exercises() {
        let mut state = test_state();
        state.rubrics.insert(
            RubricKey::new("Book A", "2", "ex02"),
            Rubric {
                title: "Book A".into(),
                chapter: "2".into(),
                exercise: "ex02".into(),
                prompt: "p".into(),
            },
        );
        let books = state.books_catalog();
        assert_eq!(books.len(), 1);
        assert_eq!(books["Book A"]["2"], vec!["ex01", "ex02"]);
    }

    #[test]
    fn digest_is_lowercase_hex() {
        // Known sha-256 of "hello".
        assert_eq!(
            sha256_hex("hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }
}
