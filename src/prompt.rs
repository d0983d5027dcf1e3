//! Interactive questions, behind a trait so the submission flow can be
//! scripted in tests.

use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input, Select};
use std::io;
use std::path::Path;
use std::process::Command;
use tracing::debug;

pub trait Prompter: Send + Sync {
    fn confirm(&self, message: &str, default: bool) -> io::Result<bool>;

    /// Free-text answer. An empty answer yields `default` when one is given.
    fn input(&self, message: &str, default: Option<&str>) -> io::Result<String>;

    /// Index of the chosen item.
    fn select(&self, message: &str, items: &[String], default: usize) -> io::Result<usize>;

    /// Let the user edit `path`, returning once they are done.
    fn edit_file(&self, path: &Path) -> io::Result<()>;
}

/// [`Prompter`] on the controlling terminal. Files are edited with the
/// configured editor command, which may carry arguments (`code --wait`).
pub struct TerminalPrompter {
    editor: String,
}

impl TerminalPrompter {
    pub fn new(editor: impl Into<String>) -> Self {
        Self {
            editor: editor.into(),
        }
    }
}

impl Prompter for TerminalPrompter {
    fn confirm(&self, message: &str, default: bool) -> io::Result<bool> {
        Ok(Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(message)
            .default(default)
            .interact()?)
    }

    fn input(&self, message: &str, default: Option<&str>) -> io::Result<String> {
        let theme = ColorfulTheme::default();
        let mut input = Input::<String>::with_theme(&theme).with_prompt(message);
        if let Some(default) = default {
            input = input.default(default.to_string());
        }
        Ok(input.interact_text()?)
    }

    fn select(&self, message: &str, items: &[String], default: usize) -> io::Result<usize> {
        Ok(Select::with_theme(&ColorfulTheme::default())
            .with_prompt(message)
            .items(items)
            .default(default)
            .interact()?)
    }

    fn edit_file(&self, path: &Path) -> io::Result<()> {
        let mut parts = self.editor.split_whitespace();
        let program = parts.next().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "no editor configured (core.editor)")
        })?;
        debug!(editor = %self.editor, path = %path.display(), "launching editor");
        let status = Command::new(program).args(parts).arg(path).status()?;
        if status.success() {
            Ok(())
        } else {
            Err(io::Error::other(format!(
                "editor '{}' exited with {status}",
                self.editor
            )))
        }
    }
}
