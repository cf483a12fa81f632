//! # Platform-specific utilities
//!
//! Questo modulo centralizza la logica cross-platform per l'esecuzione
//! degli step dei task: quale shell usare, come quotare gli argomenti
//! sostituiti nei template e come trovare un tool nel `PATH`.

use std::env;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Platform-specific shell invocation
pub struct PlatformCommands;

impl PlatformCommands {
    /// Shell program and the flag that makes it run a command string
    pub fn shell() -> (&'static str, &'static str) {
        if cfg!(windows) {
            ("cmd", "/C")
        } else {
            ("sh", "-c")
        }
    }

    /// Build a command that runs `command_line` through the platform shell
    pub fn shell_command(command_line: &str) -> Command {
        let (program, flag) = Self::shell();
        let mut cmd = Command::new(program);
        cmd.arg(flag).arg(command_line);
        cmd
    }

    /// Quote a value so the shell sees it as a single word
    pub fn quote(value: &str) -> String {
        if cfg!(windows) {
            format!("\"{}\"", value.replace('"', "\"\""))
        } else if !value.is_empty()
            && value
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || "/._-+=:,@%".contains(c))
        {
            value.to_string()
        } else {
            format!("'{}'", value.replace('\'', r"'\''"))
        }
    }

    /// First word of a command line, i.e. the program a step invokes
    pub fn program_of(command_line: &str) -> Option<&str> {
        command_line.split_whitespace().next()
    }

    /// Whether a program can be launched: an existing path, or found in `PATH`
    pub fn is_command_available(program: &str) -> bool {
        let path = Path::new(program);
        if path.components().count() > 1 {
            return path.exists();
        }
        Self::find_in_system_path(program).is_some()
    }

    /// Find a tool in the system `PATH`
    pub fn find_in_system_path(tool_name: &str) -> Option<PathBuf> {
        let extension = if cfg!(windows) { ".exe" } else { "" };
        let tool_with_ext = format!("{}{}", tool_name, extension);

        env::split_paths(&env::var_os("PATH")?)
            .map(|dir| dir.join(&tool_with_ext))
            .find(|path| path.is_file())
    }
}
