//! The per-method metadata annotation left by the instrumenting pass.
//!
//! The annotation carries five elements (names configurable through
//! [`MetadataFieldNames`]):
//!
//! | element | kind | meaning |
//! |---------|------|---------|
//! | `methodStart` | `int` | first source line of the method |
//! | `methodEnd` | `int` | last source line of the method |
//! | `optimized` | `boolean` | the method was left uninstrumented as an optimization |
//! | `suspendableCallSiteIds` | `int[]` | identifiers of the suspendable call sites |
//! | `suspendableCallSiteOffsetsAfterInstrumentation` | `int[]` | bytecode offsets of those call sites, filled here |
//!
//! Everything except the offsets is opaque to this crate and copied through.

use crate::{
    config::MetadataFieldNames,
    error::SchemaErrorKind,
    event::{Annotation, AnnotationValue},
};

/// Decoded metadata annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataBlock {
    /// Retention of the annotation as it was read.
    pub visible: bool,
    pub method_start: i32,
    pub method_end: i32,
    pub optimized: bool,
    pub call_site_ids: Vec<i32>,
    pub call_site_offsets: Vec<u32>,
}

impl Default for MetadataBlock {
    fn default() -> Self {
        Self {
            visible: true,
            method_start: -1,
            method_end: -1,
            optimized: false,
            call_site_ids: Vec::new(),
            call_site_offsets: Vec::new(),
        }
    }
}

impl MetadataBlock {
    /// Decodes a metadata annotation.
    ///
    /// Elements that are absent keep their defaults. The incoming offsets
    /// element is accepted but its value dropped, because it is a placeholder
    /// this pass recomputes.
    pub fn decode(annotation: &Annotation, names: &MetadataFieldNames) -> Result<Self, SchemaErrorKind> {
        let mut block = Self {
            visible: annotation.visible,
            ..Self::default()
        };
        for (name, value) in &annotation.values {
            if *name == names.method_start {
                block.method_start = expect_int(name, value)?;
            } else if *name == names.method_end {
                block.method_end = expect_int(name, value)?;
            } else if *name == names.optimized {
                block.optimized = expect_bool(name, value)?;
            } else if *name == names.call_site_ids {
                block.call_site_ids = expect_int_array(name, value)?.to_vec();
            } else if *name != names.call_site_offsets {
                return Err(SchemaErrorKind::UnknownField(name.clone()));
            }
        }
        Ok(block)
    }

    /// Replaces the offsets, keeping every other element.
    #[must_use]
    pub fn with_offsets(mut self, offsets: Vec<u32>) -> Self {
        self.call_site_offsets = offsets;
        self
    }

    /// Encodes the block as an annotation of type `desc`, elements in the
    /// order of `names`.
    #[must_use]
    pub fn encode(&self, desc: &str, names: &MetadataFieldNames) -> Annotation {
        let offsets = self.call_site_offsets.iter().map(|o| o.cast_signed()).collect();
        Annotation::new(desc, self.visible)
            .with(names.method_start.clone(), AnnotationValue::Int(self.method_start))
            .with(names.method_end.clone(), AnnotationValue::Int(self.method_end))
            .with(names.optimized.clone(), AnnotationValue::Bool(self.optimized))
            .with(names.call_site_ids.clone(), AnnotationValue::IntArray(self.call_site_ids.clone()))
            .with(names.call_site_offsets.clone(), AnnotationValue::IntArray(offsets))
    }
}

fn expect_int(field: &str, value: &AnnotationValue) -> Result<i32, SchemaErrorKind> {
    match value {
        AnnotationValue::Int(v) => Ok(*v),
        other => Err(wrong_kind(field, "int", other)),
    }
}

fn expect_bool(field: &str, value: &AnnotationValue) -> Result<bool, SchemaErrorKind> {
    match value {
        AnnotationValue::Bool(v) => Ok(*v),
        other => Err(wrong_kind(field, "boolean", other)),
    }
}

fn expect_int_array<'a>(field: &str, value: &'a AnnotationValue) -> Result<&'a [i32], SchemaErrorKind> {
    match value {
        AnnotationValue::IntArray(v) => Ok(v),
        other => Err(wrong_kind(field, "int[]", other)),
    }
}

fn wrong_kind(field: &str, expected: &'static str, found: &AnnotationValue) -> SchemaErrorKind {
    SchemaErrorKind::WrongValueKind {
        field: field.to_owned(),
        expected,
        found: found.kind_name(),
    }
}
