//! # Task Configuration Module
//!
//! Questo modulo carica e interroga la lista dei task di ottimizzazione.
//!
//! ## Responsabilità:
//! - Parsing del file YAML dei task con `serde_yaml`
//! - Normalizzazione delle estensioni (minuscolo, senza punto)
//! - Validazione: ogni task ha nome, almeno un'estensione e almeno uno step
//! - Routing per estensione: `applies_to()` come gate, `select()` per la scelta del task
//!
//! ## Regola di selezione:
//! Se più task dichiarano la stessa estensione vince il primo nell'ordine del file.
//! Le sovrapposizioni vengono segnalate con un warning al caricamento.
//!
//! ## Esempio file:
//! ```yaml
//! tasks:
//!   - name: jpeg-recompress
//!     extensions: [jpg, jpeg]
//!     steps:
//!       - "jpegoptim --max=85 {file}"
//!   - name: heic-to-jxl
//!     extensions: [heic]
//!     command: "cjxl {file} {folder}/{name}.jxl && rm {file}"
//! ```
//!
//! La configurazione è immutabile dopo il caricamento e viene condivisa
//! tra tutte le pipeline tramite `Arc<TaskConfig>`.

use crate::file_manager::FileManager;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One shell command template in a task chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskStep {
    pub command: String,
}

/// A named chain of steps applied to a set of extensions
#[derive(Debug, Clone)]
pub struct Task {
    pub name: String,
    /// Normalized: lowercase, no leading dot
    pub extensions: Vec<String>,
    pub steps: Vec<TaskStep>,
}

impl Task {
    pub fn handles(&self, extension: &str) -> bool {
        self.extensions.iter().any(|ext| ext == extension)
    }
}

#[derive(Debug, Deserialize)]
struct RawTaskFile {
    #[serde(default)]
    tasks: Vec<RawTask>,
}

#[derive(Debug, Deserialize)]
struct RawTask {
    name: String,
    #[serde(default)]
    extensions: Vec<String>,
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    steps: Vec<String>,
}

impl RawTask {
    fn into_task(self) -> Result<Task> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            anyhow::bail!("Task name must not be empty");
        }

        let mut extensions: Vec<String> = Vec::new();
        for ext in &self.extensions {
            let ext = FileManager::normalize_extension(ext);
            if !ext.is_empty() && !extensions.contains(&ext) {
                extensions.push(ext);
            }
        }
        if extensions.is_empty() {
            anyhow::bail!("Task '{}' must list at least one extension", name);
        }

        let steps: Vec<TaskStep> = self
            .command
            .into_iter()
            .chain(self.steps)
            .map(|command| command.trim().to_string())
            .filter(|command| !command.is_empty())
            .map(|command| TaskStep { command })
            .collect();
        if steps.is_empty() {
            anyhow::bail!("Task '{}' must define a command or at least one step", name);
        }

        Ok(Task {
            name,
            extensions,
            steps,
        })
    }
}

/// All tasks loaded at startup
#[derive(Debug, Clone, Default)]
pub struct TaskConfig {
    tasks: Vec<Task>,
    /// Directory of the tasks file; steps run from here
    config_dir: PathBuf,
}

impl TaskConfig {
    /// Load the task definitions from a YAML file
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read tasks file {}", path.display()))?;

        let config_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        Self::from_yaml_str(&content, config_dir)
            .with_context(|| format!("Invalid tasks file {}", path.display()))
    }

    /// Parse task definitions from YAML text
    pub fn from_yaml_str(content: &str, config_dir: PathBuf) -> Result<Self> {
        let raw: RawTaskFile = serde_yaml::from_str(content)?;
        let tasks = raw
            .tasks
            .into_iter()
            .map(RawTask::into_task)
            .collect::<Result<Vec<_>>>()?;

        let config = Self { tasks, config_dir };
        config.warn_overlaps();
        Ok(config)
    }

    pub fn new(tasks: Vec<Task>, config_dir: PathBuf) -> Self {
        Self { tasks, config_dir }
    }

    fn warn_overlaps(&self) {
        let mut owners: HashMap<&str, &str> = HashMap::new();
        for task in &self.tasks {
            for ext in &task.extensions {
                match owners.get(ext.as_str()).copied() {
                    Some(owner) => warn!(
                        "Extension '{}' is claimed by tasks '{}' and '{}'; '{}' wins",
                        ext, owner, task.name, owner
                    ),
                    None => {
                        owners.insert(ext.as_str(), task.name.as_str());
                    }
                }
            }
        }
        debug!("Loaded {} tasks covering {} extensions", self.tasks.len(), owners.len());
    }

    /// True iff at least one task claims the extension
    pub fn applies_to(&self, extension: &str) -> bool {
        self.select(extension).is_some()
    }

    /// First task, in file order, claiming the extension
    pub fn select(&self, extension: &str) -> Option<&Task> {
        let extension = FileManager::normalize_extension(extension);
        self.tasks.iter().find(|task| task.handles(&extension))
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
tasks:
  - name: jpeg
    extensions: [JPG, .jpeg]
    steps:
      - "jpegoptim {file}"
  - name: heic
    extensions: [heic]
    command: "cjxl {file} {folder}/{name}.jxl"
    steps:
      - "rm {file}"
  - name: jpeg-fallback
    extensions: [jpg]
    command: "cp {file} {file}"
"#;

    #[test]
    fn test_parse_and_normalize() {
        let config = TaskConfig::from_yaml_str(SAMPLE, PathBuf::from("/etc/iuo")).unwrap();
        assert_eq!(config.tasks().len(), 3);
        assert_eq!(config.tasks()[0].extensions, vec!["jpg", "jpeg"]);
        assert_eq!(config.config_dir(), Path::new("/etc/iuo"));

        let heic = &config.tasks()[1];
        let commands: Vec<&str> = heic.steps.iter().map(|s| s.command.as_str()).collect();
        assert_eq!(commands, vec!["cjxl {file} {folder}/{name}.jxl", "rm {file}"]);
    }

    #[test]
    fn test_applies_to() {
        let config = TaskConfig::from_yaml_str(SAMPLE, PathBuf::from(".")).unwrap();
        assert!(config.applies_to("jpg"));
        assert!(config.applies_to(".JPEG"));
        assert!(config.applies_to("HEIC"));
        assert!(!config.applies_to("mov"));
        assert!(!config.applies_to(""));
    }

    #[test]
    fn test_first_task_wins_on_overlap() {
        let config = TaskConfig::from_yaml_str(SAMPLE, PathBuf::from(".")).unwrap();
        assert_eq!(config.select("jpg").map(|t| t.name.as_str()), Some("jpeg"));
    }

    #[test]
    fn test_empty_task_list_is_valid() {
        let config = TaskConfig::from_yaml_str("tasks: []", PathBuf::from(".")).unwrap();
        assert!(config.is_empty());
        assert!(!config.applies_to("jpg"));
    }

    #[test]
    fn test_validation_errors() {
        let no_ext = "tasks:\n  - name: a\n    command: echo\n";
        assert!(TaskConfig::from_yaml_str(no_ext, PathBuf::from(".")).is_err());

        let no_steps = "tasks:\n  - name: a\n    extensions: [jpg]\n";
        assert!(TaskConfig::from_yaml_str(no_steps, PathBuf::from(".")).is_err());

        let no_name = "tasks:\n  - name: ' '\n    extensions: [jpg]\n    command: echo\n";
        assert!(TaskConfig::from_yaml_str(no_name, PathBuf::from(".")).is_err());
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tasks.yaml");
        tokio::fs::write(&path, SAMPLE).await.unwrap();

        let config = TaskConfig::load(&path).await.unwrap();
        assert_eq!(config.config_dir(), dir.path());
        assert!(config.applies_to("heic"));

        assert!(TaskConfig::load(&dir.path().join("missing.yaml")).await.is_err());
    }
}
