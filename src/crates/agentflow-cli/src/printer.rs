//! A terminal line-printer [`agentflow_core::bus::Attachment`] — the one
//! worked example of a channel consumer this crate ships. Real renderers
//! (WebSocket, GitHub comments, ...) are out of scope.

use std::sync::Arc;

use agentflow_core::{Bus, Cleanup};

/// Prints every signal matching `patterns` as a single line to stdout:
/// `[<timestamp>] <name> <payload>`. Returns an attachment suitable for
/// [`Bus::attach`].
pub fn line_printer(patterns: Vec<String>) -> agentflow_core::bus::Attachment {
    Arc::new(move |bus: &Bus| -> Cleanup {
        let patterns: Vec<&str> = patterns.iter().map(String::as_str).collect();
        let mut unsub = bus.subscribe(
            &patterns,
            Arc::new(|enriched: &agentflow_core::EnrichedSignal| {
                println!(
                    "[{}] {} {}",
                    enriched.signal.timestamp, enriched.signal.name, enriched.signal.payload
                );
            }),
        );
        Box::new(move || unsub())
    })
}
