//! Loading a folder of plain-text notes.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};
use walkdir::WalkDir;

const EXTENSIONS: [&str; 3] = ["md", "markdown", "txt"];

/// One note read from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub path: PathBuf,
    /// Path relative to the corpus root with `/` separators; the note's
    /// identity across runs.
    pub source: String,
    pub title: String,
    pub content: String,
}

/// Read every `.md`, `.markdown` and `.txt` file under `root`, sorted by path.
///
/// Hidden directories are skipped, as are unreadable or blank files.
pub fn load_notes(root: &Path) -> Result<Vec<Note>> {
    if !root.is_dir() {
        anyhow::bail!("{} is not a directory", root.display());
    }

    let mut notes = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.file_name()));

    for entry in walker {
        let entry = entry.with_context(|| format!("failed to walk {}", root.display()))?;
        if !entry.file_type().is_file() || !has_note_extension(entry.path()) {
            continue;
        }
        let content = match std::fs::read_to_string(entry.path()) {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "skipping unreadable file");
                continue;
            }
        };
        if content.trim().is_empty() {
            debug!(path = %entry.path().display(), "skipping empty file");
            continue;
        }
        notes.push(Note {
            title: title_for(entry.path(), &content),
            source: source_for(root, entry.path()),
            path: entry.into_path(),
            content,
        });
    }
    Ok(notes)
}

fn source_for(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|name| name.starts_with('.'))
}

fn has_note_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
}

/// The first markdown heading, or the file stem.
fn title_for(path: &Path, content: &str) -> String {
    content
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .and_then(|line| line.strip_prefix('#'))
        .map(|heading| heading.trim_start_matches('#').trim().to_string())
        .filter(|heading| !heading.is_empty())
        .unwrap_or_else(|| {
            path.file_stem().map(|stem| stem.to_string_lossy().into_owned()).unwrap_or_default()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_notes_with_titles_and_skips_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.md"), "# Ownership\n\nEvery value has an owner.").unwrap();
        std::fs::write(dir.path().join("a.txt"), "Plain notes about lifetimes.").unwrap();
        std::fs::write(dir.path().join("image.png"), "not text").unwrap();
        std::fs::write(dir.path().join("empty.md"), "   \n").unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join(".git").join("notes.md"), "# Hidden").unwrap();

        let notes = load_notes(dir.path()).unwrap();
        let titles: Vec<&str> = notes.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, ["a", "Ownership"]);
    }

    #[test]
    fn sources_are_relative_to_the_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("rust")).unwrap();
        std::fs::write(dir.path().join("rust").join("moves.md"), "Moves transfer ownership.")
            .unwrap();
        std::fs::write(dir.path().join("todo.txt"), "Read the nomicon.").unwrap();

        let notes = load_notes(dir.path()).unwrap();
        let sources: Vec<&str> = notes.iter().map(|n| n.source.as_str()).collect();
        assert_eq!(sources, ["rust/moves.md", "todo.txt"]);
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_notes(&dir.path().join("nope")).is_err());
    }
}
