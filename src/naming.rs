//! Artifact naming.
//!
//! Content-independent artifacts get a time-derived token; JVM sources must
//! be named after the class they declare.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::LazyLock;

use regex::Regex;

/// Fallback class name when the source declares none.
pub const DEFAULT_CLASS_NAME: &str = "Main";

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

static PUBLIC_CLASS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"public\s+class\s+(\w+)").expect("valid regex"));

static ANY_CLASS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"class\s+(\w+)").expect("valid regex"));

/// Unique artifact stem, e.g. `temp_1760875200000_3`.
///
/// Millisecond timestamp plus a process-wide sequence, so two calls in the
/// same millisecond still differ.
pub fn unique_stem() -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("temp_{millis}_{seq}")
}

/// Class name a JVM source file has to be saved under.
///
/// Prefers `public class X`, then any `class X`, then [`DEFAULT_CLASS_NAME`].
pub fn declared_class_name(source: &str) -> &str {
    PUBLIC_CLASS
        .captures(source)
        .or_else(|| ANY_CLASS.captures(source))
        .and_then(|caps| caps.get(1))
        .map_or(DEFAULT_CLASS_NAME, |m| m.as_str())
}
