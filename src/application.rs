//! The submission application: five labelled sections the user fills in
//! through their editor before a manifest entry is proposed.
//!
//! ```text
//! # CATEGORY    where the fragment lives, e.g. library/fiction
//! # FILENAME    fragment name; `.ks` is appended when missing
//! # TITLE       one-line summary (required)
//! # COMMIT      commit message body (required)
//! # PULL REQUEST  pull request description
//! ```
//!
//! Text inside `<!-- ... -->` is ignored, as are other lines starting with `#`.

use crate::errors::ApplicationError;
use crate::manifest::FRAGMENT_EXTENSION;
use crate::workspace::clean_path;
use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

/// Template used when the target repository doesn't publish `application.md`.
pub const DEFAULT_TEMPLATE: &str = r##"### Text <!-- inside --> these arrows is left out of the submission, as are lines starting with "#".
### View this file as raw Markdown to see the prompts.
<!-- Where should the new entry live inside the manifest repository?
Write it as a path, for example
library/fiction/classics
or
science/biology/datasets
(Leaving it empty puts the file at the root of the manifest, which is rarely what you want.) -->
# CATEGORY below


<!-- Name of the manifest file to create or extend (no extension needed). -->
# FILENAME below


<!-- Briefly describe the files you are submitting (ideally under 50 characters). -->
# TITLE below


<!-- Describe the files in more detail. An empty commit message aborts the submission. -->
# COMMIT below


<!-- If this becomes a pull request, explain why these files belong in the repository. -->
# PULL REQUEST below

"##;

/// The headings an application may contain, in template order.
pub const LABELS: [&str; 5] = ["CATEGORY", "FILENAME", "TITLE", "COMMIT", "PULL REQUEST"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Category,
    Filename,
    Title,
    Commit,
    PullRequest,
}

impl Field {
    fn from_label(label: &str) -> Option<Self> {
        match label {
            "CATEGORY" => Some(Self::Category),
            "FILENAME" => Some(Self::Filename),
            "TITLE" => Some(Self::Title),
            "COMMIT" => Some(Self::Commit),
            "PULL REQUEST" => Some(Self::PullRequest),
            _ => None,
        }
    }
}

/// The label on a heading line such as `# TITLE below`, if it is one.
fn heading_label(line: &str) -> Option<&'static str> {
    if !line.starts_with('#') {
        return None;
    }
    let text = line.trim_start_matches('#').trim().to_uppercase();
    LABELS.iter().copied().find(|label| {
        text.strip_prefix(label)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
    })
}

/// Remove `<!-- ... -->` comments, which may span lines. An unterminated
/// comment runs to the end of the text.
fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("<!--") {
        out.push_str(&rest[..start]);
        match rest[start + 4..].find("-->") {
            Some(end) => rest = &rest[start + 4 + end + 3..],
            None => return out,
        }
    }
    out.push_str(rest);
    out
}

/// A parsed application.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Application {
    pub category: String,
    pub filename: String,
    pub title: String,
    pub commit: String,
    pub pull_request: String,
}

impl Application {
    pub fn parse(text: &str) -> Result<Self, ApplicationError> {
        let mut fields: [Vec<&str>; 5] = Default::default();
        let mut current: Option<Field> = None;
        let stripped = strip_comments(text);

        for line in stripped.lines() {
            if line.starts_with('#') {
                if let Some(field) = heading_label(line).and_then(Field::from_label) {
                    current = Some(field);
                }
                continue;
            }
            if let Some(field) = current {
                fields[field as usize].push(line);
            }
        }

        let collect = |field: Field| fields[field as usize].join("\n").trim().to_string();
        Ok(Self {
            category: clean_category(&collect(Field::Category))?,
            filename: normalize_filename(&collect(Field::Filename))?,
            title: collect(Field::Title),
            commit: collect(Field::Commit),
            pull_request: collect(Field::PullRequest),
        })
    }

    /// Title and commit message are both present.
    pub fn is_valid(&self) -> bool {
        !self.title.is_empty() && !self.commit.is_empty()
    }

    /// The fragment name has something before `.ks`.
    pub fn has_filename(&self) -> bool {
        self.filename.len() > FRAGMENT_EXTENSION.len()
    }

    /// Repository path of the fragment, `<category>/<filename>`.
    pub fn fragment_path(&self) -> String {
        if self.category.is_empty() {
            self.filename.clone()
        } else {
            format!("{}/{}", self.category, self.filename)
        }
    }

    /// Branch used on a fork for this submission: `submit/<filename-without-.ks>`.
    pub fn branch_name(&self) -> String {
        let stem = self
            .filename
            .strip_suffix(FRAGMENT_EXTENSION)
            .unwrap_or(&self.filename);
        format!("submit/{stem}")
    }

    /// Serialize back into template form.
    pub fn render(&self) -> String {
        let sections = [
            &self.category,
            &self.filename,
            &self.title,
            &self.commit,
            &self.pull_request,
        ];
        let mut out = String::new();
        for (label, body) in LABELS.iter().zip(sections) {
            out.push_str("# ");
            out.push_str(label);
            out.push('\n');
            out.push_str(body);
            out.push_str("\n\n");
        }
        out
    }
}

/// Normalize a category: strip a leading separator, clean `.` components,
/// and refuse anything with a `..` component.
pub fn clean_category(raw: &str) -> Result<String, ApplicationError> {
    let trimmed = raw.trim().trim_start_matches('/');
    let path = Path::new(trimmed);
    if path
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(ApplicationError::CategoryEscapes(raw.trim().to_string()));
    }
    let cleaned = clean_path(path);
    Ok(cleaned
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/"))
}

/// Enforce the `.ks` suffix exactly once. The name must be a bare base
/// name: no separators and no `.` or `..`.
pub fn normalize_filename(raw: &str) -> Result<String, ApplicationError> {
    let trimmed = raw.trim();
    let stem = trimmed.strip_suffix(FRAGMENT_EXTENSION).unwrap_or(trimmed);
    let name = format!("{stem}{FRAGMENT_EXTENSION}");
    let is_base = !stem.contains(['/', '\\'])
        && stem != "."
        && stem != ".."
        && Path::new(&name).file_name() == Some(OsStr::new(&name));
    if !is_base {
        return Err(ApplicationError::FilenameNotBase(trimmed.to_string()));
    }
    Ok(name)
}

/// Check a template before it is handed to the user: no heading may repeat,
/// and `# TITLE` and `# COMMIT` must both be present.
pub fn validate_template(text: &str) -> Result<(), ApplicationError> {
    let mut seen: Vec<&'static str> = Vec::new();
    for line in strip_comments(text).lines() {
        if let Some(label) = heading_label(line) {
            if seen.contains(&label) {
                return Err(ApplicationError::DuplicateLabel(label.to_string()));
            }
            seen.push(label);
        }
    }
    for required in ["TITLE", "COMMIT"] {
        if !seen.contains(&required) {
            return Err(ApplicationError::MissingLabel(required.to_string()));
        }
    }
    Ok(())
}

/// The scratch application file plus a parsed copy that is reused until the
/// file's modification time moves past the one recorded at parse time.
#[derive(Debug)]
pub struct ApplicationFile {
    path: PathBuf,
    cached: Option<(Application, SystemTime)>,
}

impl ApplicationFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cached: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse the file, or return the cached record if it hasn't changed.
    pub fn read(&mut self) -> Result<Application, ApplicationError> {
        let io_err = |source| ApplicationError::Io {
            path: self.path.clone(),
            source,
        };
        let modified = std::fs::metadata(&self.path)
            .and_then(|meta| meta.modified())
            .ok();

        if let (Some((record, filled_at)), Some(modified)) = (&self.cached, modified) {
            if modified <= *filled_at {
                return Ok(record.clone());
            }
        }

        let text = std::fs::read_to_string(&self.path).map_err(io_err)?;
        let record = Application::parse(&text)?;
        self.cached = modified.map(|stamp| (record.clone(), stamp));
        Ok(record)
    }

    /// Drop the cached record so the next read parses the file.
    pub fn invalidate(&mut self) {
        self.cached = None;
    }
}
