use std::path::Path;

use serde::Serialize;

use crate::error::Result;
use crate::storage::codec;
use crate::storage::store::{BLOCK_HEADER_LEN, BLOCK_STORE_FILE, CATEGORY_INDEX_FILE};
use crate::types::{FILE_MARKER, PLACEHOLDER_OFFSET};

const MAX_FINDINGS: usize = 32;

/// Specifies the depth of verification checks to perform.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyLevel {
    /// Block headers and category-index values only.
    Fast,
    /// Headers plus membership and ordering of every stored child id.
    Full,
}

/// Indicates the severity level of a verification finding.
#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifySeverity {
    /// Informational message about the verification process.
    Info,
    /// Critical issue indicating an inconsistent encoding.
    Error,
}

/// Represents a single issue discovered during verification.
#[derive(Clone, Debug, Serialize)]
pub struct VerifyFinding {
    /// The severity level of this finding.
    pub severity: VerifySeverity,
    /// Human-readable description of the issue.
    pub message: String,
}

impl VerifyFinding {
    fn error(message: impl Into<String>) -> Self {
        Self {
            severity: VerifySeverity::Error,
            message: message.into(),
        }
    }
}

/// Statistics collected during the verification process.
#[derive(Clone, Debug, Default, Serialize)]
pub struct VerifyCounts {
    /// Length of the category-index table.
    pub max_node: u64,
    /// Categories with their own block.
    pub categories: u64,
    /// Categories pointing at the shared placeholder block.
    pub placeholders: u64,
    /// Ids marked as files.
    pub files: u64,
    /// Stored subcategory links.
    pub subcat_links: u64,
    /// Stored file links.
    pub file_links: u64,
    /// Length of the block store in elements.
    pub block_words: u64,
}

/// Complete report of a verification operation.
#[derive(Clone, Debug, Serialize)]
pub struct VerifyReport {
    /// The verification level that was performed.
    pub level: VerifyLevel,
    /// Whether verification passed without any error finding.
    pub success: bool,
    /// Issues discovered, capped at a fixed number.
    pub findings: Vec<VerifyFinding>,
    /// Statistics about the arrays examined.
    pub counts: VerifyCounts,
}

impl VerifyReport {
    /// Joins the error findings into one diagnostic line.
    pub fn summary(&self) -> String {
        self.findings
            .iter()
            .filter(|f| matches!(f.severity, VerifySeverity::Error))
            .map(|f| f.message.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Verifies the persisted graph in `dir`.
///
/// The two array files are decoded first; a missing file or a length that is
/// not a multiple of the element width is returned as an error rather than a
/// finding, since nothing else can be checked without the arrays.
///
/// # Errors
///
/// Returns an error if either file cannot be read or decoded.
pub fn verify(dir: impl AsRef<Path>, level: VerifyLevel) -> Result<VerifyReport> {
    let dir = dir.as_ref();
    let cat_index = codec::read_i32_file(&dir.join(CATEGORY_INDEX_FILE))?;
    let blocks = codec::read_i32_file(&dir.join(BLOCK_STORE_FILE))?;
    Ok(verify_layout(&cat_index, &blocks, level))
}

/// Checks the structural invariants of an in-memory encoding.
///
/// With [`VerifyLevel::Fast`] every category's header must satisfy
/// `off+2 <= subcat_end <= file_end <= blocks.len()` and every index value must
/// be `-1` or a valid offset. [`VerifyLevel::Full`] additionally requires that
/// every subcategory entry names a category, every file entry names a file,
/// all ids are in range, and both sub-ranges are strictly ascending.
pub fn verify_layout(cat_index: &[i32], blocks: &[i32], level: VerifyLevel) -> VerifyReport {
    let mut findings = Vec::new();
    let mut counts = VerifyCounts {
        max_node: cat_index.len() as u64,
        block_words: blocks.len() as u64,
        ..VerifyCounts::default()
    };

    if blocks.get(..BLOCK_HEADER_LEN) != Some(&[BLOCK_HEADER_LEN as i32; BLOCK_HEADER_LEN][..]) {
        push_error(&mut findings, "placeholder block at offset 0 is missing or not empty");
    }

    for (id, &off) in cat_index.iter().enumerate() {
        if off == FILE_MARKER {
            counts.files += 1;
            continue;
        }
        if off < FILE_MARKER {
            push_error(
                &mut findings,
                format!("node {id}: invalid category-index value {off}"),
            );
            continue;
        }
        if off == PLACEHOLDER_OFFSET {
            counts.placeholders += 1;
            continue;
        }
        counts.categories += 1;
        let off = off as usize;
        let Some((subcat_end, file_end)) = read_header(blocks, off) else {
            push_error(
                &mut findings,
                format!("category {id}: block header at {off} violates off+2 <= subcat_end <= file_end <= len"),
            );
            continue;
        };
        let subcats = &blocks[off + BLOCK_HEADER_LEN..subcat_end];
        let files = &blocks[subcat_end..file_end];
        counts.subcat_links += subcats.len() as u64;
        counts.file_links += files.len() as u64;

        if level == VerifyLevel::Full {
            check_members(id, "subcategory", subcats, cat_index, |v| v >= 0, &mut findings);
            check_members(id, "file", files, cat_index, |v| v == FILE_MARKER, &mut findings);
        }
    }

    let success = !findings
        .iter()
        .any(|f| matches!(f.severity, VerifySeverity::Error));
    if level == VerifyLevel::Fast && findings.len() < MAX_FINDINGS {
        findings.push(VerifyFinding {
            severity: VerifySeverity::Info,
            message: "membership and ordering checks skipped at fast level".into(),
        });
    }
    VerifyReport {
        level,
        success,
        findings,
        counts,
    }
}

fn read_header(blocks: &[i32], off: usize) -> Option<(usize, usize)> {
    let subcat_end = usize::try_from(*blocks.get(off)?).ok()?;
    let file_end = usize::try_from(*blocks.get(off + 1)?).ok()?;
    (off + BLOCK_HEADER_LEN <= subcat_end && subcat_end <= file_end && file_end <= blocks.len())
        .then_some((subcat_end, file_end))
}

fn check_members(
    parent: usize,
    role: &str,
    members: &[i32],
    cat_index: &[i32],
    expected: impl Fn(i32) -> bool,
    findings: &mut Vec<VerifyFinding>,
) {
    let mut previous: Option<i32> = None;
    for &child in members {
        if let Some(prev) = previous {
            if child <= prev {
                push_error(
                    findings,
                    format!("category {parent}: {role} range not strictly ascending ({prev} then {child})"),
                );
            }
        }
        previous = Some(child);
        let value = usize::try_from(child)
            .ok()
            .and_then(|idx| cat_index.get(idx).copied());
        match value {
            None => push_error(
                findings,
                format!("category {parent}: {role} id {child} outside [0, {})", cat_index.len()),
            ),
            Some(v) if !expected(v) => push_error(
                findings,
                format!("category {parent}: {role} id {child} has category-index value {v}"),
            ),
            Some(_) => {}
        }
    }
}

fn push_error(findings: &mut Vec<VerifyFinding>, message: impl Into<String>) {
    if findings.len() < MAX_FINDINGS {
        findings.push(VerifyFinding::error(message.into()));
    }
}
