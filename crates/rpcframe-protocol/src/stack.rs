use crate::codes::FrameKind;
use crate::error::{ProtocolError, Result};
use crate::headers::{ChildBounds, IndefiniteKind};

/// Deepest frame nesting accepted on either side.
pub(crate) const MAX_DEPTH: usize = 256;

#[derive(Debug, Clone, Copy)]
struct OpenFrame {
    kind: FrameKind,
    bounds: ChildBounds,
    payload: Option<IndefiniteKind>,
    seen: usize,
}

/// Open frames of the current session, innermost last.
///
/// Writers and readers run every start, value and end through the same
/// placement, payload and count checks.
#[derive(Debug, Default)]
pub(crate) struct FrameStack {
    frames: Vec<OpenFrame>,
}

impl FrameStack {
    pub(crate) fn depth(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn innermost(&self) -> Option<FrameKind> {
        self.frames.last().map(|f| f.kind)
    }

    pub(crate) fn clear(&mut self) {
        self.frames.clear();
    }

    /// Check that a frame of `kind` may start here and count it against its parent.
    pub(crate) fn admit(&mut self, kind: FrameKind) -> Result<()> {
        let parent = self.innermost();
        let allowed = match kind {
            FrameKind::Request | FrameKind::Response => parent.is_none(),
            FrameKind::Argument => parent == Some(FrameKind::Request),
            FrameKind::Property => parent == Some(FrameKind::Model),
            FrameKind::Model | FrameKind::List | FrameKind::Map | FrameKind::Indefinite => {
                parent.is_some_and(accepts_values)
            }
        };
        if !allowed {
            return Err(ProtocolError::MisplacedFrame { kind, parent });
        }
        self.check_payload(Some(kind))?;
        if self.frames.len() >= MAX_DEPTH {
            return Err(ProtocolError::NestingTooDeep(MAX_DEPTH));
        }
        self.count_child()
    }

    /// Check that a bare value may appear here and count it against its parent.
    pub(crate) fn admit_value(&mut self) -> Result<()> {
        let parent = self.innermost();
        if !parent.is_some_and(accepts_values) {
            return Err(ProtocolError::MisplacedValue { parent });
        }
        self.check_payload(None)?;
        self.count_child()
    }

    pub(crate) fn push(
        &mut self,
        kind: FrameKind,
        bounds: ChildBounds,
        payload: Option<IndefiniteKind>,
    ) {
        self.frames.push(OpenFrame {
            kind,
            bounds,
            payload,
            seen: 0,
        });
    }

    /// Pop the innermost frame, which must be of `kind` and hold enough children.
    pub(crate) fn close(&mut self, kind: FrameKind) -> Result<()> {
        let open = self.innermost();
        let frame = match self.frames.last() {
            Some(frame) if frame.kind == kind => *frame,
            _ => {
                return Err(ProtocolError::UnbalancedEnd {
                    requested: kind,
                    open,
                })
            }
        };
        if frame.seen < frame.bounds.min {
            return Err(ProtocolError::CountMismatch {
                kind,
                expected: frame.bounds.min,
                actual: frame.seen,
            });
        }
        self.frames.pop();
        Ok(())
    }

    /// An indefinite frame holds exactly what its kind announced: a bare value
    /// for primitives and enums, the matching frame otherwise, nothing for null.
    fn check_payload(&self, found: Option<FrameKind>) -> Result<()> {
        let Some(kind) = self.frames.last().and_then(|f| f.payload) else {
            return Ok(());
        };
        let fits = match kind {
            IndefiniteKind::Primitive | IndefiniteKind::Enum => found.is_none(),
            IndefiniteKind::Model => found == Some(FrameKind::Model),
            IndefiniteKind::List => found == Some(FrameKind::List),
            IndefiniteKind::Map => found == Some(FrameKind::Map),
            IndefiniteKind::Null => false,
        };
        if fits {
            Ok(())
        } else {
            Err(ProtocolError::IndefinitePayload { kind, found })
        }
    }

    fn count_child(&mut self) -> Result<()> {
        if let Some(parent) = self.frames.last_mut() {
            if parent.seen >= parent.bounds.max {
                return Err(ProtocolError::CountMismatch {
                    kind: parent.kind,
                    expected: parent.bounds.max,
                    actual: parent.seen + 1,
                });
            }
            parent.seen += 1;
        }
        Ok(())
    }
}

fn accepts_values(kind: FrameKind) -> bool {
    !matches!(kind, FrameKind::Request | FrameKind::Model)
}
