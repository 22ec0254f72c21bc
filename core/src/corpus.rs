//! Loading document collections from disk.
//!
//! Document ids follow load order, so directory walks are sorted by file name.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use walkdir::WalkDir;

/// How plain-text files are cut into documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitMode {
    /// Blank-line separated paragraphs, e.g. one speaker turn of a transcript.
    #[default]
    Paragraphs,
    Lines,
}

impl fmt::Display for SplitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SplitMode::Paragraphs => "paragraphs",
            SplitMode::Lines => "lines",
        })
    }
}

impl FromStr for SplitMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "paragraphs" | "paragraph" => Ok(SplitMode::Paragraphs),
            "lines" | "line" => Ok(SplitMode::Lines),
            other => Err(format!("unknown split mode '{other}' (expected paragraphs or lines)")),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InputDoc {
    Text(String),
    Record {
        #[serde(alias = "text")]
        body: String,
    },
}

impl InputDoc {
    fn into_body(self) -> String {
        match self {
            InputDoc::Text(body) | InputDoc::Record { body } => body,
        }
    }
}

/// Load documents from a file or a directory tree. Blank documents are skipped.
pub fn load_documents<P: AsRef<Path>>(path: P, split: SplitMode) -> Result<Vec<String>> {
    let path = path.as_ref();
    let mut files: Vec<PathBuf> = Vec::new();
    if path.is_dir() {
        for entry in WalkDir::new(path).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() {
                if let Some(ext) = p.extension().and_then(|s| s.to_str()) {
                    if matches!(ext, "json" | "jsonl" | "txt") {
                        files.push(p.to_path_buf());
                    }
                }
            }
        }
    } else if path.is_file() {
        files.push(path.to_path_buf());
    } else {
        anyhow::bail!("corpus path {} does not exist", path.display());
    }

    let mut documents = Vec::new();
    for file in files {
        let before = documents.len();
        match file.extension().and_then(|s| s.to_str()) {
            Some("jsonl") => load_jsonl(&file, &mut documents)?,
            Some("json") => load_json(&file, &mut documents)?,
            _ => load_text(&file, split, &mut documents)?,
        }
        tracing::debug!(file = %file.display(), docs = documents.len() - before, "loaded corpus file");
    }
    documents.retain(|d| !d.trim().is_empty());
    tracing::info!(path = %path.display(), num_docs = documents.len(), "corpus loaded");
    Ok(documents)
}

/// Split raw text the way `load_documents` splits `.txt` files.
pub fn split_text(text: &str, split: SplitMode) -> Vec<String> {
    match split {
        SplitMode::Lines => text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect(),
        SplitMode::Paragraphs => {
            let mut out = Vec::new();
            let mut current: Vec<&str> = Vec::new();
            for line in text.lines() {
                let line = line.trim();
                if line.is_empty() {
                    if !current.is_empty() {
                        out.push(current.join(" "));
                        current.clear();
                    }
                } else {
                    current.push(line);
                }
            }
            if !current.is_empty() {
                out.push(current.join(" "));
            }
            out
        }
    }
}

fn load_text(file: &Path, split: SplitMode, documents: &mut Vec<String>) -> Result<()> {
    let text = fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    documents.extend(split_text(&text, split));
    Ok(())
}

fn load_jsonl(file: &Path, documents: &mut Vec<String>) -> Result<()> {
    let f = File::open(file).with_context(|| format!("opening {}", file.display()))?;
    let reader = BufReader::new(f);
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() { continue; }
        let doc: InputDoc = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: invalid document", file.display(), lineno + 1))?;
        documents.push(doc.into_body());
    }
    Ok(())
}

fn load_json(file: &Path, documents: &mut Vec<String>) -> Result<()> {
    let f = File::open(file).with_context(|| format!("opening {}", file.display()))?;
    let reader = BufReader::new(f);
    let json: serde_json::Value = serde_json::from_reader(reader)
        .with_context(|| format!("parsing {}", file.display()))?;
    match json {
        serde_json::Value::Array(arr) => {
            for v in arr {
                let doc: InputDoc = serde_json::from_value(v)?;
                documents.push(doc.into_body());
            }
        }
        other => {
            let doc: InputDoc = serde_json::from_value(other)
                .with_context(|| format!("{}: expected a document or an array of documents", file.display()))?;
            documents.push(doc.into_body());
        }
    }
    Ok(())
}
