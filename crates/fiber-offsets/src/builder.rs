//! Builder for assembling class streams by hand.
//!
//! Class readers feeding the pass, and tests, need well-formed streams.
//! `StreamBuilder` emits events in traversal order, allocates label ids, and
//! closes the class when built.
//!
//! ```
//! use fiber_offsets::{ClassVersion, InvokeOpcode, StreamBuilder};
//!
//! let mut builder = StreamBuilder::new("com/example/Worker", ClassVersion::V1_8);
//! builder.source("Worker.java");
//! builder.begin_method(0x0001, "run", "()V");
//! builder.mark(0).call(InvokeOpcode::InvokeStatic, "com/example/Io", "read", "()V");
//! builder.end_method();
//! let stream = builder.build();
//! assert_eq!(stream.class_name(), Some("com/example/Worker"));
//! ```

use crate::{
    event::{
        Annotation, ClassEvent, ClassHeader, ClassVersion, FieldHeader, Handle, Instruction, InvokeDynamicInsn,
        InvokeOpcode, Label, LabelId, MethodHeader, MethodInsn,
    },
    sink::ClassStream,
};

/// Incremental builder for a [`ClassStream`].
#[derive(Debug)]
pub struct StreamBuilder {
    events: Vec<ClassEvent>,
    /// Next label id to hand out; unique across the whole class.
    next_label: u32,
}

impl StreamBuilder {
    /// Starts a stream with a default header for `name`.
    #[must_use]
    pub fn new(name: &str, version: ClassVersion) -> Self {
        Self::with_header(ClassHeader::new(name, version))
    }

    /// Starts a stream with an explicit header.
    #[must_use]
    pub fn with_header(header: ClassHeader) -> Self {
        Self {
            events: vec![ClassEvent::Header(header)],
            next_label: 0,
        }
    }

    pub fn source(&mut self, file: &str) -> &mut Self {
        self.events.push(ClassEvent::Source {
            file: Some(file.to_owned()),
            debug: None,
        });
        self
    }

    /// Adds an annotation to the class, or to the open method.
    pub fn annotation(&mut self, annotation: Annotation) -> &mut Self {
        self.events.push(ClassEvent::Annotation(annotation));
        self
    }

    pub fn field(&mut self, access: u16, name: &str, desc: &str) -> &mut Self {
        self.events.push(ClassEvent::Field(FieldHeader {
            access,
            name: name.to_owned(),
            desc: desc.to_owned(),
            signature: None,
        }));
        self
    }

    pub fn begin_method(&mut self, access: u16, name: &str, desc: &str) -> &mut Self {
        self.events
            .push(ClassEvent::MethodStart(MethodHeader::new(access, name, desc)));
        self
    }

    /// Emits a new position mark and returns its id.
    pub fn label(&mut self, offset: Option<u32>) -> LabelId {
        let id = LabelId(self.next_label);
        self.next_label += 1;
        self.events.push(ClassEvent::Label(Label { id, offset }));
        id
    }

    /// Emits a position mark resolved to `offset`.
    pub fn mark(&mut self, offset: u32) -> &mut Self {
        self.label(Some(offset));
        self
    }

    /// Emits a position mark with no resolved offset.
    pub fn unresolved_mark(&mut self) -> &mut Self {
        self.label(None);
        self
    }

    pub fn insn(&mut self, insn: Instruction) -> &mut Self {
        self.events.push(ClassEvent::Instruction(insn));
        self
    }

    /// Emits a direct method call.
    pub fn call(&mut self, opcode: InvokeOpcode, owner: &str, name: &str, desc: &str) -> &mut Self {
        self.insn(Instruction::Method(MethodInsn {
            opcode,
            owner: owner.to_owned(),
            name: name.to_owned(),
            desc: desc.to_owned(),
            is_interface: opcode == InvokeOpcode::InvokeInterface,
        }))
    }

    /// Emits a dynamic call site bootstrapped by `bootstrap`.
    pub fn invoke_dynamic(&mut self, name: &str, desc: &str, bootstrap: Handle) -> &mut Self {
        self.insn(Instruction::InvokeDynamic(InvokeDynamicInsn {
            name: name.to_owned(),
            desc: desc.to_owned(),
            bootstrap,
            bootstrap_args: Vec::new(),
        }))
    }

    pub fn end_method(&mut self) -> &mut Self {
        self.events.push(ClassEvent::MethodEnd);
        self
    }

    /// Closes the class and returns the stream.
    #[must_use]
    pub fn build(mut self) -> ClassStream {
        if self.events.last() != Some(&ClassEvent::ClassEnd) {
            self.events.push(ClassEvent::ClassEnd);
        }
        ClassStream::from(self.events)
    }
}
