use crate::association::domain::tracked_identity::LabeledRegion;
use crate::shared::frame::Frame;

/// Draws the association result onto the outgoing frame.
pub trait FrameAnnotator: Send {
    fn annotate(&mut self, frame: &mut Frame, labelled: &[LabeledRegion]);
}
