/// Receiver of incremental generation progress.
///
/// `on_unit` gets each completed text unit in emission order and returns
/// `true` to ask the generation loop to stop. `on_complete` fires once when
/// the end-of-turn marker is observed. Image generation reports integer
/// percentages through `on_percent`.
pub trait ProgressSink {
    fn on_unit(&mut self, text: &str) -> bool;

    fn on_complete(&mut self) {}

    fn on_percent(&mut self, _percent: u32) {}
}

/// Closures receive `Some(text)` per unit, `None` on completion, and image
/// percentages rendered as decimal text.
impl<F> ProgressSink for F
where
    F: FnMut(Option<&str>) -> bool,
{
    fn on_unit(&mut self, text: &str) -> bool {
        self(Some(text))
    }

    fn on_complete(&mut self) {
        self(None);
    }

    fn on_percent(&mut self, percent: u32) {
        self(Some(&percent.to_string()));
    }
}

/// Sink used when the caller supplies no progress receiver; generation
/// proceeds without reporting.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn on_unit(&mut self, _text: &str) -> bool {
        false
    }
}
