use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tower_lsp::lsp_types::Url;

use crate::analysis::{analyze, AnalysisMode, Mm1Engine, Snapshot};
use crate::state::DocumentId;

/// Parse `-- ^N` position markers. Each caret points at the column it sits
/// in, on the closest preceding line that is not itself a marker line.
/// Returns marker number -> byte offset into `src`.
pub fn parse_markers(src: &str) -> BTreeMap<u32, usize> {
    let mut markers = BTreeMap::new();
    let mut line_start = 0;
    let mut target: Option<usize> = None;

    for line in src.split_inclusive('\n') {
        let is_marker_line = line.trim_start().starts_with("--") && line.contains('^');
        if is_marker_line {
            if let Some(target_start) = target {
                let bytes = line.as_bytes();
                let mut i = 0;
                while i < bytes.len() {
                    if bytes[i] == b'^' {
                        let digits: String = line[i + 1..]
                            .chars()
                            .take_while(char::is_ascii_digit)
                            .collect();
                        if let Ok(n) = digits.parse() {
                            markers.insert(n, target_start + i);
                        }
                        i += 1 + digits.len();
                    } else {
                        i += 1;
                    }
                }
            }
        } else {
            target = Some(line_start);
        }
        line_start += line.len();
    }
    markers
}

/// Find the byte offset of a pattern in source text.
pub fn find_offset(src: &str, pattern: &str) -> usize {
    src.find(pattern).expect("pattern not found in source")
}

pub fn test_uri() -> Url {
    Url::parse("file:///test/test.mm1").expect("valid test uri")
}

/// Analyze `src` as version 1 and return its snapshot. Panics on parse
/// errors.
pub fn snapshot_of(src: &str) -> Arc<Snapshot> {
    let analysis = analyze(
        &Mm1Engine,
        &DocumentId::new(&test_uri()),
        src.into(),
        Some(1),
        AnalysisMode::Normal,
        &AtomicBool::new(false),
    )
    .expect("analysis cancelled");
    analysis
        .snapshot
        .unwrap_or_else(|| panic!("parse errors in test source: {:?}", analysis.errors))
}
