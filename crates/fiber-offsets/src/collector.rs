//! Per-method offset collection.
//!
//! A [`MethodOffsetCollector`] sees every event of one eligible method between
//! its `MethodStart` and `MethodEnd`. It starts out unmarked and forwards
//! everything untouched. Once the method's metadata annotation shows up the
//! collector becomes marked: it swallows that annotation, follows position
//! marks, and records the offset of every suspension point. At method end it
//! emits the annotation again with the recorded offsets filled in.

use log::{debug, trace};

use crate::{
    classifier::{CallClassifier, CallSite},
    config::OffsetsConfig,
    coordinator::ClassContext,
    error::SchemaError,
    event::{Annotation, ClassEvent, Instruction, MethodHeader},
    metadata::MetadataBlock,
    position::{OffsetList, PositionTracker},
};

#[derive(Debug)]
enum CollectorState {
    /// No metadata annotation seen: the method was not instrumented.
    Unmarked,
    Marked(MetadataBlock),
}

/// Collects suspension point offsets for one method.
///
/// State lives only for the duration of one method; the coordinator creates a
/// fresh collector at every eligible `MethodStart` and consumes it at
/// `MethodEnd`.
#[derive(Debug)]
pub struct MethodOffsetCollector<'p, C: ?Sized> {
    config: &'p OffsetsConfig,
    classifier: &'p C,
    method_name: String,
    method_desc: String,
    state: CollectorState,
    position: PositionTracker,
    offsets: OffsetList,
}

impl<'p, C: CallClassifier + ?Sized> MethodOffsetCollector<'p, C> {
    #[must_use]
    pub fn new(config: &'p OffsetsConfig, classifier: &'p C, method: &MethodHeader) -> Self {
        Self {
            config,
            classifier,
            method_name: method.name.clone(),
            method_desc: method.desc.clone(),
            state: CollectorState::Unmarked,
            position: PositionTracker::new(),
            offsets: OffsetList::new(),
        }
    }

    /// Returns true once the metadata annotation has been seen.
    #[must_use]
    pub fn is_marked(&self) -> bool {
        matches!(self.state, CollectorState::Marked(_))
    }

    /// Offsets recorded so far.
    #[must_use]
    pub fn offsets(&self) -> &[u32] {
        self.offsets.as_slice()
    }

    /// Handles one event of the method body, pushing what should be forwarded onto `out`.
    ///
    /// `MethodEnd` must go to [`Self::finish`] instead.
    pub fn on_event(
        &mut self,
        event: ClassEvent,
        class: &ClassContext,
        out: &mut Vec<ClassEvent>,
    ) -> Result<(), SchemaError> {
        match event {
            ClassEvent::Annotation(annotation) if self.config.is_metadata(&annotation.desc) => {
                self.mark(&annotation, class)?;
            }
            ClassEvent::Label(label) => {
                if self.is_marked() {
                    self.position.mark(&label);
                }
                out.push(ClassEvent::Label(label));
            }
            ClassEvent::Instruction(insn) => {
                if self.is_marked() {
                    self.visit_instruction(&insn, class);
                }
                out.push(ClassEvent::Instruction(insn));
            }
            other => out.push(other),
        }
        Ok(())
    }

    /// Ends the method, emitting the rewritten metadata annotation if the method was marked.
    ///
    /// The caller forwards the `MethodEnd` event itself afterwards.
    pub fn finish(self, class: &ClassContext, out: &mut Vec<ClassEvent>) {
        let CollectorState::Marked(block) = self.state else {
            return;
        };
        let offsets = self.offsets.into_vec();
        debug!(
            "{}.{}{} ({}): {} suspension point(s) at {offsets:?}",
            class.name,
            self.method_name,
            self.method_desc,
            class.source_file.as_deref().unwrap_or("<unknown source>"),
            offsets.len(),
        );
        let annotation = block
            .with_offsets(offsets)
            .encode(&self.config.metadata_desc, &self.config.fields);
        out.push(ClassEvent::Annotation(annotation));
    }

    fn mark(&mut self, annotation: &Annotation, class: &ClassContext) -> Result<(), SchemaError> {
        let block = MetadataBlock::decode(annotation, &self.config.fields).map_err(|kind| SchemaError {
            class_name: class.name.clone(),
            source_file: class.source_file.clone(),
            method_name: self.method_name.clone(),
            method_desc: self.method_desc.clone(),
            kind,
        })?;
        debug!("{}.{}{}: instrumented", class.name, self.method_name, self.method_desc);
        self.state = CollectorState::Marked(block);
        Ok(())
    }

    fn visit_instruction(&mut self, insn: &Instruction, class: &ClassContext) {
        let Some(call) = insn.call_site() else {
            return;
        };
        if !self.is_suspension_point(&call) {
            return;
        }
        match self.position.current() {
            Some(offset) => {
                if self.offsets.push(offset) {
                    trace!(
                        "{}.{}: {} {}.{} at offset {offset}",
                        class.name, self.method_name, call.opcode, call.owner, call.name
                    );
                }
            }
            None => trace!(
                "{}.{}: {}.{} precedes any resolved position, skipped",
                class.name, self.method_name, call.owner, call.name
            ),
        }
    }

    fn is_suspension_point(&self, call: &CallSite<'_>) -> bool {
        call.owner != self.config.restore_owner && self.classifier.is_suspendable_call(call)
    }
}
