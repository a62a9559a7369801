//! Admin-managed endpoint definitions, one JSON file per endpoint.

use chrono::Utc;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{AppError, Result};
use crate::sites::is_builtin;
use crate::sites::rules::{EndpointDefinition, RuleSite};

pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn invalid_name() -> AppError {
    AppError::InvalidParam(
        "Endpoint name may only contain letters, digits and underscores".to_string(),
    )
}

pub struct EndpointStore {
    dir: PathBuf,
    // Serializes save/remove so concurrent admin calls cannot interleave.
    write_lock: Mutex<()>,
}

impl EndpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", name))
    }

    /// All readable definitions, sorted by name. Unreadable files are skipped.
    pub async fn list(&self) -> Result<Vec<EndpointDefinition>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut definitions = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            match read_definition(&path).await {
                Ok(def) => definitions.push(def),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping endpoint file"),
            }
        }

        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(definitions)
    }

    pub async fn load(&self, name: &str) -> Result<Option<RuleSite>> {
        if !is_valid_name(name) {
            return Ok(None);
        }
        let path = self.path_for(name);
        match fs::try_exists(&path).await {
            Ok(true) => {}
            Ok(false) => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let corrupt =
            |e: AppError| AppError::ConfigError(format!("stored endpoint `{}` is invalid: {}", name, e));
        let definition = match read_definition(&path).await {
            Ok(definition) => definition,
            Err(AppError::Io(e)) => return Err(AppError::Io(e)),
            Err(e) => return Err(corrupt(e)),
        };
        RuleSite::compile(definition).map(Some).map_err(corrupt)
    }

    pub async fn save(&self, mut definition: EndpointDefinition) -> Result<EndpointDefinition> {
        if !is_valid_name(&definition.name) {
            return Err(invalid_name());
        }
        if is_builtin(&definition.name) {
            return Err(AppError::Conflict(definition.name));
        }
        definition.created_at = Some(Utc::now());
        // Compiling validates every selector and regex up front.
        let definition = RuleSite::compile(definition)?.definition().clone();

        let body = serde_json::to_vec_pretty(&definition)
            .map_err(|e| AppError::InvalidDefinition(e.to_string()))?;

        let _guard = self.write_lock.lock().await;
        let path = self.path_for(&definition.name);
        if fs::try_exists(&path).await? {
            return Err(AppError::Conflict(definition.name));
        }
        fs::create_dir_all(&self.dir).await?;
        let tmp = self.dir.join(format!(".{}.json.tmp", definition.name));
        fs::write(&tmp, &body).await?;
        fs::rename(&tmp, &path).await?;

        info!(name = %definition.name, path = %path.display(), "endpoint registered");
        Ok(definition)
    }

    pub async fn remove(&self, name: &str) -> Result<()> {
        if !is_valid_name(name) {
            return Err(invalid_name());
        }
        if is_builtin(name) {
            return Err(AppError::InvalidParam(format!(
                "Built-in endpoint `{}` cannot be deleted",
                name
            )));
        }

        let _guard = self.write_lock.lock().await;
        match fs::remove_file(self.path_for(name)).await {
            Ok(()) => {
                info!(name, "endpoint removed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(AppError::NotFound(name.to_string())),
            Err(e) => Err(e.into()),
        }
    }
}

async fn read_definition(path: &Path) -> Result<EndpointDefinition> {
    let body = fs::read(path).await?;
    serde_json::from_slice(&body).map_err(|e| AppError::InvalidDefinition(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use crate::sites::rules::FieldRule;

    fn definition(name: &str) -> EndpointDefinition {
        let mut fields = BTreeMap::new();
        fields.insert(
            "title".to_string(),
            FieldRule {
                selector: Some("title".into()),
                ..FieldRule::default()
            },
        );
        EndpointDefinition {
            name: name.to_string(),
            description: "page title".into(),
            url_param: "url".into(),
            allowed_hosts: Vec::new(),
            fields,
            created_at: None,
        }
    }

    #[test]
    fn name_charset() {
        assert!(is_valid_name("page_title2"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("../etc/passwd"));
        assert!(!is_valid_name("has-dash"));
        assert!(!is_valid_name("dot.json"));
    }

    #[tokio::test]
    async fn save_list_load_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = EndpointStore::new(dir.path().join("defs"));

        assert!(store.list().await.unwrap().is_empty());

        let saved = store.save(definition("page_title")).await.unwrap();
        assert!(saved.created_at.is_some());
        assert!(dir.path().join("defs/page_title.json").exists());

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "page_title");

        let site = store.load("page_title").await.unwrap().unwrap();
        assert_eq!(site.definition().description, "page title");
        assert!(store.load("missing").await.unwrap().is_none());

        store.remove("page_title").await.unwrap();
        assert!(matches!(
            store.remove("page_title").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn refuses_duplicates_and_builtins() {
        let dir = tempfile::tempdir().unwrap();
        let store = EndpointStore::new(dir.path());

        store.save(definition("twice")).await.unwrap();
        assert!(matches!(
            store.save(definition("twice")).await,
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            store.save(definition("mediafire")).await,
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            store.remove("mediafire").await,
            Err(AppError::InvalidParam(_))
        ));
    }

    #[tokio::test]
    async fn rejects_bad_names_without_touching_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = EndpointStore::new(dir.path().join("defs"));
        assert!(matches!(
            store.save(definition("bad name")).await,
            Err(AppError::InvalidParam(_))
        ));
        assert!(!dir.path().join("defs").exists());
    }

    #[tokio::test]
    async fn skips_corrupt_files_when_listing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.json"), b"{not json").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"ignore me").unwrap();
        let store = EndpointStore::new(dir.path());
        store.save(definition("good")).await.unwrap();

        let names: Vec<String> = store.list().await.unwrap().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["good".to_string()]);
    }

    #[tokio::test]
    async fn corrupt_stored_definition_is_a_server_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.json"), b"{not json").unwrap();
        let store = EndpointStore::new(dir.path());
        assert!(matches!(
            store.load("broken").await,
            Err(AppError::ConfigError(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_saves_of_one_name_admit_a_single_winner() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(EndpointStore::new(dir.path()));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.save(definition("race")).await })
            })
            .collect();

        let (mut saved, mut conflicts) = (0, 0);
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => saved += 1,
                Err(AppError::Conflict(_)) => conflicts += 1,
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
        assert_eq!(saved, 1);
        assert_eq!(conflicts, 15);
        assert_eq!(store.list().await.unwrap().len(), 1);
    }
}
