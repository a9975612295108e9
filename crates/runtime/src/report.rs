//! Opt-in diagnostic reporting, gated by an environment variable.
//!
//! Grounded on the runtime crate's `SEQ_REPORT`-gated `eprintln!`
//! reporting: unset by default (zero cost), set to trace the extension
//! loader's directory-by-directory search (§4.8). With the `report-json`
//! feature (on by default), each trace line is also a self-contained
//! JSON object, so a wrapper process can capture the loader's search
//! trail without scraping free-text.

use std::sync::OnceLock;

#[cfg(feature = "report-json")]
use serde::Serialize;

fn enabled() -> bool {
    static ENABLED: OnceLock<bool> = OnceLock::new();
    *ENABLED.get_or_init(|| {
        std::env::var("IDIO_LOADER_TRACE")
            .map(|v| v == "1")
            .unwrap_or(false)
    })
}

#[cfg(feature = "report-json")]
#[derive(Serialize)]
struct TraceRecord<'a> {
    component: &'a str,
    message: String,
}

/// Trace one step of the loader's search, if `IDIO_LOADER_TRACE=1`.
pub fn trace_search(message: impl std::fmt::Display) {
    if !enabled() {
        return;
    }
    #[cfg(feature = "report-json")]
    {
        let record = TraceRecord {
            component: "loader",
            message: message.to_string(),
        };
        match serde_json::to_string(&record) {
            Ok(line) => eprintln!("{line}"),
            Err(_) => eprintln!("[idio loader] {message}"),
        }
    }
    #[cfg(not(feature = "report-json"))]
    {
        eprintln!("[idio loader] {message}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_is_a_no_op_by_default() {
        // No assertion on stderr content — just confirm this doesn't
        // panic when the env var is unset, which is the common case.
        trace_search("probing /usr/lib/idio");
    }
}
