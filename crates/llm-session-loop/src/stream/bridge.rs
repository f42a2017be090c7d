use llm_session_core::{ProgressSink, StopSignal};
use llm_session_engine::OutputSink;

use super::reassembler::{TextUnit, Utf8Reassembler};

/// Engine output sink that reassembles text units, forwards them to the
/// caller's progress sink and turns stop requests into the stop signal.
///
/// Units are forwarded as [`TextUnit::text`], so malformed engine output
/// reaches the sink and the ledger with replacement characters.
///
/// A unit containing the end marker finalizes the response accumulated
/// from all earlier units; the marker unit itself is not forwarded and any
/// later output is ignored.
pub struct ProgressBridge<'a> {
    reassembler: Utf8Reassembler,
    sink: &'a mut dyn ProgressSink,
    end_marker: &'a str,
    stop: StopSignal,
    response: String,
    completed: Option<String>,
    marker_seen: bool,
    units_forwarded: usize,
}

impl<'a> ProgressBridge<'a> {
    pub fn new(sink: &'a mut dyn ProgressSink, end_marker: &'a str, stop: StopSignal) -> Self {
        Self {
            reassembler: Utf8Reassembler::new(),
            sink,
            end_marker,
            stop,
            response: String::new(),
            completed: None,
            marker_seen: false,
            units_forwarded: 0,
        }
    }

    /// Finalized response, handed out once.
    pub fn take_completed(&mut self) -> Option<String> {
        self.completed.take()
    }

    pub fn partial_response(&self) -> &str {
        &self.response
    }

    pub fn marker_seen(&self) -> bool {
        self.marker_seen
    }

    pub fn units_forwarded(&self) -> usize {
        self.units_forwarded
    }

    pub fn pending_bytes(&self) -> usize {
        self.reassembler.pending().len()
    }

    fn is_marker(&self, text: &str) -> bool {
        !self.end_marker.is_empty() && text.contains(self.end_marker)
    }

    fn handle_unit(&mut self, unit: TextUnit) {
        let text = unit.text();

        if self.is_marker(&text) {
            self.marker_seen = true;
            self.completed = Some(self.response.clone());
            self.sink.on_complete();
            self.stop.request();
            log::debug!("Complete response received: '{}'", self.response);
            return;
        }

        self.response.push_str(&text);
        self.units_forwarded += 1;
        if self.sink.on_unit(&text) {
            log::debug!("Generation stopped by progress listener");
            self.stop.request();
        }
    }
}

impl OutputSink for ProgressBridge<'_> {
    fn write(&mut self, bytes: &[u8]) {
        if self.marker_seen {
            return;
        }
        if let Some(unit) = self.reassembler.feed(bytes) {
            self.handle_unit(unit);
        }
    }
}
