// SPDX-License-Identifier: MIT OR Apache-2.0

//! Page-text ingestion from extracted statement text
//!
//! Text extraction and OCR happen outside this crate. Their output arrives
//! as plain text files with one document per file and pages separated by
//! form feeds, which is what PDF text extractors emit.

use ignore::WalkBuilder;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::errors::{Result, RetrievalError};
use crate::utils::INDEX_DIR;

/// Page separator emitted by PDF text extractors.
pub const PAGE_SEPARATOR: char = '\x0c';

/// File extensions picked up when scanning directories.
const TEXT_EXTENSIONS: &[&str] = &["txt"];

/// Raw text of one page of a source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageText {
    pub source: String,
    /// 1-based page number
    pub page_no: u32,
    pub text: String,
}

impl PageText {
    pub fn new(source: impl Into<String>, page_no: u32, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            page_no,
            text: text.into(),
        }
    }

    /// True when the page has no selectable text and must go through OCR.
    pub fn needs_ocr(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Splits a document's text into pages on form feeds.
///
/// A trailing form feed terminates the last page rather than opening an
/// empty one.
pub fn split_pages(source: &str, content: &str) -> Vec<PageText> {
    let content = content.strip_suffix(PAGE_SEPARATOR).unwrap_or(content);
    content
        .split(PAGE_SEPARATOR)
        .enumerate()
        .map(|(i, text)| PageText::new(source, i as u32 + 1, text))
        .collect()
}

/// Reads a text file as a sequence of pages. The source is the file name.
pub fn read_pages(path: &Path) -> Result<Vec<PageText>> {
    let bytes = std::fs::read(path).map_err(|e| RetrievalError::io(path, e))?;
    let content = String::from_utf8_lossy(&bytes);
    let source = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned());

    let pages = split_pages(&source, &content);
    tracing::debug!(source = %source, pages = pages.len(), "read document");
    Ok(pages)
}

/// Expands files and directories into the list of documents to ingest.
///
/// Files named explicitly are always included. Directories are walked
/// respecting ignore files, keeping `.txt` files and skipping index
/// directories. The result is sorted and deduplicated.
pub fn scan(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for path in paths {
        let metadata = std::fs::metadata(path).map_err(|e| RetrievalError::io(path, e))?;
        if metadata.is_file() {
            files.push(path.clone());
            continue;
        }

        let walker = WalkBuilder::new(path)
            .hidden(false)
            .git_ignore(true)
            .git_exclude(true)
            .filter_entry(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .map(|name| name != INDEX_DIR && name != ".git")
                    .unwrap_or(true)
            })
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };
            let entry_path = entry.path();
            if entry.file_type().map(|t| t.is_file()).unwrap_or(false) && is_text_file(entry_path) {
                files.push(entry_path.to_path_buf());
            }
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}

fn is_text_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| TEXT_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn split_pages_numbers_from_one() {
        let pages = split_pages("jan.txt", "page one\x0cpage two\x0c\x0cpage four\x0c");
        assert_eq!(pages.len(), 4);
        assert_eq!(pages[0], PageText::new("jan.txt", 1, "page one"));
        assert_eq!(pages[1].page_no, 2);
        assert!(pages[2].needs_ocr());
        assert_eq!(pages[3].text, "page four");
    }

    #[test]
    fn document_without_separator_is_one_page() {
        let pages = split_pages("a.txt", "just text\nacross lines\n");
        assert_eq!(pages.len(), 1);
        assert!(!pages[0].needs_ocr());
    }

    #[test]
    fn blank_document_is_one_page_needing_ocr() {
        let pages = split_pages("scan.txt", "  \n\t");
        assert_eq!(pages.len(), 1);
        assert!(pages[0].needs_ocr());
    }

    #[test]
    fn read_pages_uses_file_name_as_source() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("feb.txt");
        fs::write(&path, "Opening balance\x0cClosing balance").unwrap();

        let pages = read_pages(&path).unwrap();
        assert_eq!(pages.len(), 2);
        assert!(pages.iter().all(|p| p.source == "feb.txt"));
    }

    #[test]
    fn read_pages_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = read_pages(&dir.path().join("absent.txt")).unwrap_err();
        assert!(matches!(err, RetrievalError::Io { .. }));
    }

    #[test]
    fn scan_walks_directories_in_sorted_order() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("2023");
        fs::create_dir(&nested).unwrap();
        fs::write(dir.path().join("b.txt"), "b").unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        fs::write(dir.path().join("notes.md"), "skip").unwrap();
        fs::write(nested.join("c.TXT"), "c").unwrap();

        let index_dir = dir.path().join(INDEX_DIR);
        fs::create_dir(&index_dir).unwrap();
        fs::write(index_dir.join("stray.txt"), "skip").unwrap();

        let files = scan(&[dir.path().to_path_buf()]).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            names,
            vec![
                PathBuf::from("2023/c.TXT"),
                PathBuf::from("a.txt"),
                PathBuf::from("b.txt")
            ]
        );
    }

    #[test]
    fn scan_keeps_explicit_files_once() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("statement.dat");
        fs::write(&file, "x").unwrap();

        let files = scan(&[file.clone(), file.clone()]).unwrap();
        assert_eq!(files, vec![file]);
    }
}
