#![doc = include_str!("../../../README.md")]

mod builder;
mod classifier;
mod collector;
mod config;
mod coordinator;
mod error;
mod event;
mod metadata;
mod pass;
mod position;
mod sink;

pub use crate::{
    builder::StreamBuilder,
    classifier::{CallClassifier, CallKind, CallSite, MethodDatabase, SuspendableType},
    collector::MethodOffsetCollector,
    config::{FIBER_CLASS_NAME, INSTRUMENTED_DESC, MetadataFieldNames, OffsetsConfig, STACK_NAME, YieldMethod},
    coordinator::{ClassContext, ClassCoordinator},
    error::{ConfigError, OffsetsError, SchemaError, SchemaErrorKind},
    event::{
        ACC_NATIVE, Annotation, AnnotationValue, ClassEvent, ClassHeader, ClassVersion, Constant, FieldHeader,
        Handle, Instruction, InvokeDynamicInsn, InvokeOpcode, Label, LabelId, MethodHeader, MethodInsn,
    },
    metadata::MetadataBlock,
    pass::OffsetsPass,
    position::{OffsetList, PositionTracker},
    sink::{ClassSink, ClassStream, NullSink},
};
