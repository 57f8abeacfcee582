//! Downstream consumers of class streams.
//!
//! A [`ClassSink`] is whatever turns events back into a class: normally a
//! class writer owned by the caller. Every hook has a default no-op
//! implementation, so a sink only overrides the events it cares about, and
//! [`NullSink`] needs no code at all.
//!
//! | Sink | Purpose |
//! |------|---------|
//! | [`NullSink`] | Discards everything (dry runs, validation only) |
//! | [`ClassStream`] | Records owned events; can be persisted with `postcard` |
//! | `Vec<ClassEvent>` | Plain recording |

use serde::{Deserialize, Serialize};

use crate::event::{Annotation, ClassEvent, ClassHeader, FieldHeader, Instruction, Label, MethodHeader};

/// Receiver of a rewritten class stream.
pub trait ClassSink {
    /// Receives one event. The default implementation dispatches to the
    /// per-event hooks below; sinks that want owned events override this.
    fn accept(&mut self, event: ClassEvent) {
        match &event {
            ClassEvent::Header(header) => self.on_header(header),
            ClassEvent::Source { file, debug } => self.on_source(file.as_deref(), debug.as_deref()),
            ClassEvent::Annotation(annotation) => self.on_annotation(annotation),
            ClassEvent::Field(field) => self.on_field(field),
            ClassEvent::MethodStart(method) => self.on_method_start(method),
            ClassEvent::Label(label) => self.on_label(label),
            ClassEvent::Instruction(insn) => self.on_instruction(insn),
            ClassEvent::MethodEnd => self.on_method_end(),
            ClassEvent::ClassEnd => self.on_class_end(),
        }
    }

    #[inline]
    fn on_header(&mut self, _header: &ClassHeader) {}

    #[inline]
    fn on_source(&mut self, _file: Option<&str>, _debug: Option<&str>) {}

    #[inline]
    fn on_annotation(&mut self, _annotation: &Annotation) {}

    #[inline]
    fn on_field(&mut self, _field: &FieldHeader) {}

    #[inline]
    fn on_method_start(&mut self, _method: &MethodHeader) {}

    #[inline]
    fn on_label(&mut self, _label: &Label) {}

    #[inline]
    fn on_instruction(&mut self, _insn: &Instruction) {}

    #[inline]
    fn on_method_end(&mut self) {}

    #[inline]
    fn on_class_end(&mut self) {}
}

/// A sink that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ClassSink for NullSink {}

impl ClassSink for Vec<ClassEvent> {
    fn accept(&mut self, event: ClassEvent) {
        self.push(event);
    }
}

/// The full event stream of one class.
///
/// Usable both as the input of the pass (it iterates as owned events) and as
/// a recording sink. Streams can be serialized so a parsed class can be cached
/// between the two instrumentation passes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassStream {
    events: Vec<ClassEvent>,
}

impl ClassStream {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> &[ClassEvent] {
        &self.events
    }

    #[must_use]
    pub fn into_events(self) -> Vec<ClassEvent> {
        self.events
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Internal name of the class, from its header event.
    #[must_use]
    pub fn class_name(&self) -> Option<&str> {
        self.events.iter().find_map(|event| match event {
            ClassEvent::Header(header) => Some(header.name.as_str()),
            _ => None,
        })
    }

    /// Annotations attached to the method `name` with descriptor `desc`.
    #[must_use]
    pub fn method_annotations(&self, name: &str, desc: &str) -> Vec<&Annotation> {
        let mut inside = false;
        let mut found = Vec::new();
        for event in &self.events {
            match event {
                ClassEvent::MethodStart(method) => inside = method.name == name && method.desc == desc,
                ClassEvent::MethodEnd => inside = false,
                ClassEvent::Annotation(annotation) if inside => found.push(annotation),
                _ => {}
            }
        }
        found
    }

    /// Serializes the stream to binary format.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn dump(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    /// Deserializes a stream produced by [`Self::dump`].
    ///
    /// # Errors
    /// Returns an error if deserialization fails.
    pub fn load(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}

impl ClassSink for ClassStream {
    fn accept(&mut self, event: ClassEvent) {
        self.events.push(event);
    }
}

impl From<Vec<ClassEvent>> for ClassStream {
    fn from(events: Vec<ClassEvent>) -> Self {
        Self { events }
    }
}

impl IntoIterator for ClassStream {
    type Item = ClassEvent;
    type IntoIter = std::vec::IntoIter<ClassEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}
