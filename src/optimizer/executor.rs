//! # Step Executor Module
//!
//! Adattatore verso i tool esterni di ottimizzazione.
//!
//! Il `TaskProcessor` non sa nulla di ffmpeg, cjxl o jpegoptim: per ogni step
//! chiama un `StepExecutor` passando il template del comando e un
//! `StepContext` con la copia di lavoro. L'implementazione di produzione,
//! `ShellExecutor`, sostituisce i placeholder e lancia il comando con la shell
//! di sistema.
//!
//! ## Placeholder supportati:
//! - `{folder}`: directory temporanea di lavoro
//! - `{name}`: nome del file senza estensione
//! - `{extension}`: estensione originale, così come scritta
//! - `{file}`: path completo della copia di lavoro
//!
//! Ogni valore sostituito viene quotato per la shell.

use crate::error::PipelineError;
use crate::platform::PlatformCommands;
use crate::tasks::{TaskConfig, TaskStep};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, warn};

/// Everything a step needs to know about the file it works on
#[derive(Debug, Clone)]
pub struct StepContext {
    pub task: String,
    /// 1-based position in the chain
    pub index: usize,
    pub work_dir: PathBuf,
    pub stem: String,
    pub extension: String,
}

impl StepContext {
    /// Path of the working copy as it was placed before the chain started
    pub fn working_file(&self) -> PathBuf {
        if self.extension.is_empty() {
            self.work_dir.join(&self.stem)
        } else {
            self.work_dir.join(format!("{}.{}", self.stem, self.extension))
        }
    }

    /// Substitute placeholders in a command template
    pub fn render(&self, template: &str) -> String {
        let folder = self.work_dir.to_string_lossy();
        let file = self.working_file();
        template
            .replace("{folder}", &PlatformCommands::quote(&folder))
            .replace("{name}", &PlatformCommands::quote(&self.stem))
            .replace("{extension}", &PlatformCommands::quote(&self.extension))
            .replace("{file}", &PlatformCommands::quote(&file.to_string_lossy()))
    }

    fn failure(&self, reason: impl Into<String>) -> PipelineError {
        PipelineError::Processing {
            task: self.task.clone(),
            step: self.index,
            reason: reason.into(),
        }
    }
}

/// Runs one transform step against the working copy
#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute(&self, step: &TaskStep, ctx: &StepContext) -> Result<(), PipelineError>;
}

/// Runs steps through the platform shell from the tasks file directory
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    working_dir: PathBuf,
}

impl ShellExecutor {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
        }
    }

    /// Warn about steps whose program cannot be found
    pub fn check_dependencies(tasks: &TaskConfig) -> Vec<String> {
        let mut missing = Vec::new();
        for task in tasks.tasks() {
            for step in &task.steps {
                let Some(program) = PlatformCommands::program_of(&step.command) else {
                    continue;
                };
                if program.contains('{') {
                    continue;
                }
                let resolved = if Path::new(program).is_relative() && program.contains('/') {
                    tasks.config_dir().join(program).exists()
                } else {
                    PlatformCommands::is_command_available(program)
                };
                if !resolved && !missing.iter().any(|m| m == program) {
                    warn!("Task '{}': program '{}' not found", task.name, program);
                    missing.push(program.to_string());
                }
            }
        }
        missing
    }
}

#[async_trait]
impl StepExecutor for ShellExecutor {
    async fn execute(&self, step: &TaskStep, ctx: &StepContext) -> Result<(), PipelineError> {
        let command_line = ctx.render(&step.command);
        debug!("Task '{}' step {}: {}", ctx.task, ctx.index, command_line);

        let start_time = Instant::now();
        let output = PlatformCommands::shell_command(&command_line)
            .current_dir(&self.working_dir)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ctx.failure(format!("failed to launch shell: {}", e)))?;
        let elapsed = start_time.elapsed();

        if !output.stdout.is_empty() {
            debug!("stdout: {}", String::from_utf8_lossy(&output.stdout).trim());
        }

        if output.status.success() {
            debug!("Step {} completed in {:?}", ctx.index, elapsed);
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            Err(ctx.failure(format!("{} after {:?}: {}", output.status, elapsed, stderr)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn context(work_dir: &Path) -> StepContext {
        StepContext {
            task: "test".to_string(),
            index: 1,
            work_dir: work_dir.to_path_buf(),
            stem: "IMG_0001".to_string(),
            extension: "HEIC".to_string(),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_render_placeholders() {
        let ctx = context(Path::new("/tmp/work"));
        assert_eq!(
            ctx.render("cjxl {file} {folder}/{name}.jxl"),
            "cjxl /tmp/work/IMG_0001.HEIC /tmp/work/IMG_0001.jxl"
        );
        assert_eq!(ctx.render("echo {extension}"), "echo HEIC");
    }

    #[cfg(unix)]
    #[test]
    fn test_render_quotes_spaces() {
        let mut ctx = context(Path::new("/tmp/my work"));
        ctx.stem = "holiday pic".to_string();
        assert_eq!(
            ctx.render("rm {file}"),
            "rm '/tmp/my work/holiday pic.HEIC'"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shell_executor_success_and_failure() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path());
        std::fs::write(ctx.working_file(), b"0123456789").unwrap();
        let executor = ShellExecutor::new(dir.path());

        let shrink = TaskStep {
            command: "printf abc > {file}".to_string(),
        };
        executor.execute(&shrink, &ctx).await.unwrap();
        assert_eq!(std::fs::read(ctx.working_file()).unwrap(), b"abc");

        let fail = TaskStep {
            command: "echo broken >&2; exit 4".to_string(),
        };
        let err = executor.execute(&fail, &ctx).await.unwrap_err();
        match err {
            PipelineError::Processing { task, step, reason } => {
                assert_eq!(task, "test");
                assert_eq!(step, 1);
                assert!(reason.contains("broken"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_check_dependencies() {
        let yaml = "tasks:\n  - name: a\n    extensions: [jpg]\n    steps:\n      - \"sh -c true\"\n      - \"no-such-tool-xyz {file}\"\n";
        let tasks = TaskConfig::from_yaml_str(yaml, PathBuf::from(".")).unwrap();
        assert_eq!(ShellExecutor::check_dependencies(&tasks), vec!["no-such-tool-xyz"]);
    }
}
