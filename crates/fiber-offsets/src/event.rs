//! Structural events describing one compiled class.
//!
//! An upstream class reader turns raw class data into a linear sequence of
//! [`ClassEvent`]s in traversal order:
//!
//! ```text
//! Header, Source, [Annotation | Field]*,
//! ( MethodStart, Annotation*, (Label | Instruction)*, MethodEnd )*,
//! ClassEnd
//! ```
//!
//! The pass in this crate consumes that sequence and produces an equivalent one
//! for a downstream class writer. Events are plain data, so they can be
//! recorded, compared in tests and persisted with `postcard`
//! (see [`ClassStream`](crate::ClassStream)).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::classifier::{CallKind, CallSite};

/// Access flag marking a method without a bytecode body.
pub const ACC_NATIVE: u16 = 0x0100;

/// Declared class file format version.
///
/// Ordered by `(major, minor)`, which is the order the format evolves in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClassVersion {
    pub major: u16,
    pub minor: u16,
}

impl ClassVersion {
    /// Java 1.1, the oldest version readers commonly emit.
    pub const V1_1: Self = Self::new(45, 3);
    /// Java 5, the first version with runtime-visible annotations.
    pub const V1_5: Self = Self::new(49, 0);
    pub const V1_8: Self = Self::new(52, 0);

    #[must_use]
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for ClassVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// The class declaration that opens every stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassHeader {
    pub version: ClassVersion,
    pub access: u16,
    /// Internal name, e.g. `com/example/Worker`.
    pub name: String,
    pub signature: Option<String>,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
}

impl ClassHeader {
    /// Creates a header for a plain public class extending `java/lang/Object`.
    #[must_use]
    pub fn new(name: impl Into<String>, version: ClassVersion) -> Self {
        Self {
            version,
            access: 0x0001,
            name: name.into(),
            signature: None,
            super_name: Some("java/lang/Object".to_owned()),
            interfaces: Vec::new(),
        }
    }
}

/// A field declaration. The pass never looks inside fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldHeader {
    pub access: u16,
    pub name: String,
    pub desc: String,
    pub signature: Option<String>,
}

/// A method declaration, opening that method's sub-sequence of events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodHeader {
    pub access: u16,
    pub name: String,
    /// Method descriptor, e.g. `(I)V`.
    pub desc: String,
    pub signature: Option<String>,
    pub exceptions: Vec<String>,
}

impl MethodHeader {
    #[must_use]
    pub fn new(access: u16, name: impl Into<String>, desc: impl Into<String>) -> Self {
        Self {
            access,
            name: name.into(),
            desc: desc.into(),
            signature: None,
            exceptions: Vec::new(),
        }
    }

    /// Returns true if the method has no bytecode body.
    #[must_use]
    pub fn is_native(&self) -> bool {
        self.access & ACC_NATIVE != 0
    }
}

/// A single element value inside an annotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnnotationValue {
    Int(i32),
    Bool(bool),
    Str(String),
    IntArray(Vec<i32>),
}

impl AnnotationValue {
    /// Short name of the value kind, used in diagnostics.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Bool(_) => "boolean",
            Self::Str(_) => "string",
            Self::IntArray(_) => "int[]",
        }
    }
}

/// An annotation attached to a class or method.
///
/// Element values keep their declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    /// Type descriptor, e.g. `Lcom/example/Marker;`.
    pub desc: String,
    pub visible: bool,
    pub values: Vec<(String, AnnotationValue)>,
}

impl Annotation {
    #[must_use]
    pub fn new(desc: impl Into<String>, visible: bool) -> Self {
        Self {
            desc: desc.into(),
            visible,
            values: Vec::new(),
        }
    }

    /// Appends an element value, builder style.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: AnnotationValue) -> Self {
        self.values.push((name.into(), value));
        self
    }
}

/// Identifier of a position mark within one method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LabelId(pub u32);

/// A position mark in a method body.
///
/// `offset` is the byte offset the previous pass resolved for this mark in the
/// rewritten instruction stream, when it resolved one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub id: LabelId,
    pub offset: Option<u32>,
}

/// Call opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, Serialize, Deserialize)]
#[repr(u8)]
pub enum InvokeOpcode {
    #[strum(serialize = "invokevirtual")]
    InvokeVirtual = 182,
    #[strum(serialize = "invokespecial")]
    InvokeSpecial = 183,
    #[strum(serialize = "invokestatic")]
    InvokeStatic = 184,
    #[strum(serialize = "invokeinterface")]
    InvokeInterface = 185,
    #[strum(serialize = "invokedynamic")]
    InvokeDynamic = 186,
}

impl InvokeOpcode {
    /// Returns true for calls dispatched on the receiver's runtime type.
    #[must_use]
    pub fn is_virtual(self) -> bool {
        matches!(self, Self::InvokeVirtual | Self::InvokeInterface)
    }
}

/// A method handle, as used for `invokedynamic` bootstrap methods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handle {
    /// Reference kind (1..=9).
    pub tag: u8,
    pub owner: String,
    pub name: String,
    pub desc: String,
    pub is_interface: bool,
}

/// A loadable constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    /// A class literal, as a type descriptor.
    Type(String),
    Handle(Handle),
}

/// A direct method call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodInsn {
    pub opcode: InvokeOpcode,
    pub owner: String,
    pub name: String,
    pub desc: String,
    pub is_interface: bool,
}

/// A dynamically linked call site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvokeDynamicInsn {
    pub name: String,
    pub desc: String,
    pub bootstrap: Handle,
    pub bootstrap_args: Vec<Constant>,
}

/// One instruction or code-attribute entry inside a method body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instruction {
    /// An instruction without operands.
    Simple { opcode: u8 },
    /// `bipush`, `sipush` and `newarray`.
    Int { opcode: u8, operand: i32 },
    /// A local variable load/store.
    Var { opcode: u8, slot: u16 },
    /// `new`, `anewarray`, `checkcast` and `instanceof`.
    Type { opcode: u8, desc: String },
    Field {
        opcode: u8,
        owner: String,
        name: String,
        desc: String,
    },
    Method(MethodInsn),
    InvokeDynamic(InvokeDynamicInsn),
    Jump { opcode: u8, target: LabelId },
    Ldc(Constant),
    Iinc { slot: u16, delta: i16 },
    TryCatch {
        start: LabelId,
        end: LabelId,
        handler: LabelId,
        exception: Option<String>,
    },
    LineNumber { line: u16, start: LabelId },
    LocalVariable {
        name: String,
        desc: String,
        signature: Option<String>,
        start: LabelId,
        end: LabelId,
        slot: u16,
    },
    Maxs { max_stack: u16, max_locals: u16 },
}

impl Instruction {
    /// Describes this instruction as a call site, if it is a call.
    ///
    /// Dynamic call sites report the bootstrap method's owner, since the
    /// eventual target is not known statically.
    #[must_use]
    pub fn call_site(&self) -> Option<CallSite<'_>> {
        match self {
            Self::Method(insn) => Some(CallSite {
                kind: CallKind::Method,
                opcode: insn.opcode,
                owner: &insn.owner,
                name: &insn.name,
                desc: &insn.desc,
            }),
            Self::InvokeDynamic(insn) => Some(CallSite {
                kind: CallKind::InvokeDynamic,
                opcode: InvokeOpcode::InvokeDynamic,
                owner: &insn.bootstrap.owner,
                name: &insn.name,
                desc: &insn.desc,
            }),
            _ => None,
        }
    }
}

/// One structural event of a class traversal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClassEvent {
    Header(ClassHeader),
    Source { file: Option<String>, debug: Option<String> },
    /// An annotation on the class, or on the currently open method.
    Annotation(Annotation),
    Field(FieldHeader),
    MethodStart(MethodHeader),
    Label(Label),
    Instruction(Instruction),
    MethodEnd,
    ClassEnd,
}
