//! End-to-end tests for the suspension offset pass.
//!
//! Each test builds a class stream the way the instrumenting pass would leave
//! it, runs the pass, and inspects what reaches the downstream sink.

use fiber_offsets::{
    ACC_NATIVE, Annotation, AnnotationValue, CallSite, ClassEvent, ClassStream, ClassVersion, FIBER_CLASS_NAME,
    Handle, INSTRUMENTED_DESC, InvokeOpcode, MethodDatabase, OffsetsConfig, OffsetsError, OffsetsPass, STACK_NAME,
    SchemaErrorKind, StreamBuilder, SuspendableType,
};
use pretty_assertions::assert_eq;

const IO: &str = "com/example/Io";
const OFFSETS: &str = "suspendableCallSiteOffsetsAfterInstrumentation";

fn io_calls(call: &CallSite<'_>) -> bool {
    call.owner == IO || call.owner == STACK_NAME
}

fn every_call(_: &CallSite<'_>) -> bool {
    true
}

/// The metadata annotation as the instrumenting pass leaves it.
fn instrumented(ids: &[i32]) -> Annotation {
    Annotation::new(INSTRUMENTED_DESC, true)
        .with("methodStart", AnnotationValue::Int(10))
        .with("methodEnd", AnnotationValue::Int(25))
        .with("optimized", AnnotationValue::Bool(false))
        .with("suspendableCallSiteIds", AnnotationValue::IntArray(ids.to_vec()))
        .with(OFFSETS, AnnotationValue::IntArray(vec![0; ids.len()]))
}

fn read(builder: &mut StreamBuilder) {
    builder.call(InvokeOpcode::InvokeStatic, IO, "read", "()I");
}

/// Returns the offsets element of the metadata annotation on `name`.
fn offsets_of(stream: &ClassStream, name: &str, desc: &str) -> Vec<i32> {
    let annotations = stream.method_annotations(name, desc);
    let metadata: Vec<_> = annotations
        .iter()
        .filter(|a| a.desc == INSTRUMENTED_DESC)
        .collect();
    assert_eq!(metadata.len(), 1, "expected exactly one metadata annotation on {name}");
    let (_, value) = metadata[0]
        .values
        .iter()
        .find(|(field, _)| field == OFFSETS)
        .expect("offsets element present");
    let AnnotationValue::IntArray(offsets) = value else {
        panic!("offsets element should be an int array, got {value:?}");
    };
    offsets.clone()
}

fn run(input: ClassStream, classifier: &dyn Fn(&CallSite<'_>) -> bool) -> ClassStream {
    let pass = OffsetsPass::new(classifier);
    let mut out = ClassStream::new();
    pass.run(input, &mut out).unwrap();
    out
}

// =============================================================================
// 1. Pass-through
// =============================================================================

/// A method without the metadata annotation comes out exactly as it went in.
#[test]
fn uninstrumented_method_is_unchanged() {
    let mut builder = StreamBuilder::new("com/example/Plain", ClassVersion::V1_8);
    builder.source("Plain.java");
    builder.begin_method(0x0001, "run", "()V");
    builder.mark(0);
    read(&mut builder);
    builder.mark(4);
    read(&mut builder);
    builder.end_method();
    let input = builder.build();

    let output = run(input.clone(), &every_call);
    assert_eq!(output, input);
}

/// Annotations of other types on an instrumented method are forwarded in place.
#[test]
fn unrelated_annotations_are_forwarded() {
    let marker = Annotation::new("Lcom/example/Traced;", false);
    let mut builder = StreamBuilder::new("com/example/Worker", ClassVersion::V1_8);
    builder.begin_method(0x0001, "run", "()V");
    builder.annotation(marker.clone());
    builder.annotation(instrumented(&[1]));
    builder.mark(3);
    read(&mut builder);
    builder.end_method();

    let output = run(builder.build(), &io_calls);
    let annotations = output.method_annotations("run", "()V");
    assert_eq!(annotations[0], &marker);
    assert_eq!(annotations[1].desc, INSTRUMENTED_DESC);
}

// =============================================================================
// 2. Offset collection
// =============================================================================

/// Calls sharing a mark produce one offset; the list is strictly increasing.
#[test]
fn shared_marks_are_deduplicated() {
    let mut builder = StreamBuilder::new("com/example/Worker", ClassVersion::V1_8);
    builder.begin_method(0x0001, "run", "()V");
    builder.annotation(instrumented(&[1, 2, 3, 4]));
    for offset in [10, 10, 15, 20] {
        builder.mark(offset);
        read(&mut builder);
    }
    builder.end_method();

    let output = run(builder.build(), &io_calls);
    assert_eq!(offsets_of(&output, "run", "()V"), vec![10, 15, 20]);
}

/// Two calls after the same mark are recorded once.
#[test]
fn consecutive_calls_under_one_mark() {
    let mut builder = StreamBuilder::new("com/example/Worker", ClassVersion::V1_8);
    builder.begin_method(0x0001, "run", "()V");
    builder.annotation(instrumented(&[1, 2]));
    builder.mark(7);
    read(&mut builder);
    read(&mut builder);
    builder.end_method();

    let output = run(builder.build(), &io_calls);
    assert_eq!(offsets_of(&output, "run", "()V"), vec![7]);
}

/// Marks going backwards never make the list decrease.
#[test]
fn offsets_never_decrease() {
    let mut builder = StreamBuilder::new("com/example/Worker", ClassVersion::V1_8);
    builder.begin_method(0x0001, "run", "()V");
    builder.annotation(instrumented(&[1, 2, 3, 4, 5]));
    for offset in [30, 12, 30, 31, 2] {
        builder.mark(offset);
        read(&mut builder);
    }
    builder.end_method();

    let output = run(builder.build(), &io_calls);
    let offsets = offsets_of(&output, "run", "()V");
    assert_eq!(offsets, vec![30, 31]);
    assert!(offsets.windows(2).all(|w| w[0] < w[1]));
}

/// A restore call is not a suspension point even when the classifier says so.
#[test]
fn restore_calls_are_excluded() {
    let mut builder = StreamBuilder::new("com/example/Worker", ClassVersion::V1_8);
    builder.begin_method(0x0001, "run", "()V");
    builder.annotation(instrumented(&[1]));
    builder.mark(5);
    builder.call(InvokeOpcode::InvokeVirtual, STACK_NAME, "postRestore", "()V");
    builder.mark(9);
    read(&mut builder);
    builder.end_method();

    let output = run(builder.build(), &io_calls);
    assert_eq!(offsets_of(&output, "run", "()V"), vec![9]);
}

/// Calls before the first resolved mark are skipped without error, and an
/// unresolved mark does not forget the previous position.
#[test]
fn unresolved_positions() {
    let mut builder = StreamBuilder::new("com/example/Worker", ClassVersion::V1_8);
    builder.begin_method(0x0001, "run", "()V");
    builder.annotation(instrumented(&[1, 2]));
    read(&mut builder);
    builder.unresolved_mark();
    read(&mut builder);
    builder.mark(4);
    builder.unresolved_mark();
    read(&mut builder);
    builder.end_method();

    let output = run(builder.build(), &io_calls);
    assert_eq!(offsets_of(&output, "run", "()V"), vec![4]);
}

/// Ordinary calls leave no trace in the offsets.
#[test]
fn non_suspendable_calls_are_ignored() {
    let mut builder = StreamBuilder::new("com/example/Worker", ClassVersion::V1_8);
    builder.begin_method(0x0001, "run", "()V");
    builder.annotation(instrumented(&[1]));
    builder.mark(2);
    builder.call(InvokeOpcode::InvokeVirtual, "java/lang/StringBuilder", "append", "(I)Ljava/lang/StringBuilder;");
    builder.mark(6);
    read(&mut builder);
    builder.end_method();

    let output = run(builder.build(), &io_calls);
    assert_eq!(offsets_of(&output, "run", "()V"), vec![6]);
}

/// Dynamic call sites are classified like direct calls, using the bootstrap owner.
#[test]
fn dynamic_call_sites_are_classified() {
    let db = MethodDatabase::new();
    let metafactory = Handle {
        tag: 6,
        owner: "java/lang/invoke/LambdaMetafactory".to_owned(),
        name: "metafactory".to_owned(),
        desc: "()Ljava/lang/invoke/CallSite;".to_owned(),
        is_interface: false,
    };
    let dynamic = Handle {
        owner: "com/example/Linker".to_owned(),
        ..metafactory.clone()
    };

    let mut builder = StreamBuilder::new("com/example/Worker", ClassVersion::V1_8);
    builder.begin_method(0x0001, "run", "()V");
    builder.annotation(instrumented(&[1]));
    builder.mark(3);
    builder.invoke_dynamic("run", "()Ljava/lang/Runnable;", metafactory);
    builder.mark(8);
    builder.invoke_dynamic("call", "()V", dynamic);
    builder.end_method();

    let pass = OffsetsPass::new(&db);
    let mut out = ClassStream::new();
    pass.run(builder.build(), &mut out).unwrap();
    assert_eq!(offsets_of(&out, "run", "()V"), vec![8]);
}

/// The method database decides which calls count.
#[test]
fn method_database_classifier() {
    let db = MethodDatabase::new()
        .with_method(IO, "read", SuspendableType::Suspendable)
        .with_method("com/example/Base", "work", SuspendableType::SuspendableSuper);

    let mut builder = StreamBuilder::new("com/example/Worker", ClassVersion::V1_8);
    builder.begin_method(0x0001, "run", "()V");
    builder.annotation(instrumented(&[1, 2, 3]));
    builder.mark(1);
    builder.call(InvokeOpcode::InvokeSpecial, "com/example/Base", "work", "()V");
    builder.mark(2);
    builder.call(InvokeOpcode::InvokeVirtual, "com/example/Base", "work", "()V");
    builder.mark(3);
    builder.call(InvokeOpcode::InvokeStatic, IO, "write", "()V");
    builder.mark(4);
    read(&mut builder);
    builder.end_method();

    let pass = OffsetsPass::new(&db);
    let out = ClassStream::from(pass.rewrite(builder.build()).unwrap());
    assert_eq!(offsets_of(&out, "run", "()V"), vec![2, 4]);
}

// =============================================================================
// 3. Metadata pass-through
// =============================================================================

/// Everything except the offsets is copied from the input annotation.
#[test]
fn metadata_fields_pass_through() {
    let input = Annotation::new(INSTRUMENTED_DESC, false)
        .with("methodStart", AnnotationValue::Int(101))
        .with("methodEnd", AnnotationValue::Int(177))
        .with("optimized", AnnotationValue::Bool(true))
        .with("suspendableCallSiteIds", AnnotationValue::IntArray(vec![104, 150]))
        .with(OFFSETS, AnnotationValue::IntArray(vec![-1, -1]));

    let mut builder = StreamBuilder::new("com/example/Worker", ClassVersion::V1_8);
    builder.begin_method(0x0001, "run", "()V");
    builder.annotation(input);
    builder.mark(12);
    read(&mut builder);
    builder.mark(40);
    read(&mut builder);
    builder.end_method();

    let output = run(builder.build(), &io_calls);
    let expected = Annotation::new(INSTRUMENTED_DESC, false)
        .with("methodStart", AnnotationValue::Int(101))
        .with("methodEnd", AnnotationValue::Int(177))
        .with("optimized", AnnotationValue::Bool(true))
        .with("suspendableCallSiteIds", AnnotationValue::IntArray(vec![104, 150]))
        .with(OFFSETS, AnnotationValue::IntArray(vec![12, 40]));
    assert_eq!(output.method_annotations("run", "()V"), vec![&expected]);
}

/// The rewritten annotation is emitted right before the method ends.
#[test]
fn metadata_is_emitted_at_method_end() {
    let mut builder = StreamBuilder::new("com/example/Worker", ClassVersion::V1_8);
    builder.begin_method(0x0001, "run", "()V");
    builder.annotation(instrumented(&[1]));
    builder.mark(0);
    read(&mut builder);
    builder.end_method();

    let events = run(builder.build(), &io_calls).into_events();
    let end = events
        .iter()
        .position(|e| *e == ClassEvent::MethodEnd)
        .unwrap();
    assert!(matches!(&events[end - 1], ClassEvent::Annotation(a) if a.desc == INSTRUMENTED_DESC));
    let count = events
        .iter()
        .filter(|e| matches!(e, ClassEvent::Annotation(_)))
        .count();
    assert_eq!(count, 1);
}

/// Each method gets its own offsets.
#[test]
fn methods_are_independent() {
    let mut builder = StreamBuilder::new("com/example/Worker", ClassVersion::V1_8);
    builder.begin_method(0x0001, "first", "()V");
    builder.annotation(instrumented(&[1]));
    builder.mark(50);
    read(&mut builder);
    builder.end_method();
    builder.begin_method(0x0001, "second", "()V");
    builder.annotation(instrumented(&[1, 2]));
    builder.mark(3);
    read(&mut builder);
    builder.mark(9);
    read(&mut builder);
    builder.end_method();

    let output = run(builder.build(), &io_calls);
    assert_eq!(offsets_of(&output, "first", "()V"), vec![50]);
    assert_eq!(offsets_of(&output, "second", "()V"), vec![3, 9]);
}

// =============================================================================
// 4. Eligibility
// =============================================================================

/// Native methods are never rewritten, even if they carry the annotation.
#[test]
fn native_methods_are_skipped() {
    let mut builder = StreamBuilder::new("com/example/Worker", ClassVersion::V1_8);
    builder.begin_method(0x0001 | ACC_NATIVE, "poll", "()V");
    builder.annotation(instrumented(&[1]));
    builder.mark(4);
    read(&mut builder);
    builder.end_method();
    let input = builder.build();

    let output = run(input.clone(), &io_calls);
    assert_eq!(output, input);
}

/// Yield trampolines are never rewritten.
#[test]
fn yield_trampolines_are_skipped() {
    let mut builder = StreamBuilder::new(FIBER_CLASS_NAME, ClassVersion::V1_8);
    builder.begin_method(0x0009, "park", "()V");
    builder.annotation(instrumented(&[1]));
    builder.mark(4);
    read(&mut builder);
    builder.end_method();
    builder.begin_method(0x0001, "run", "()V");
    builder.annotation(instrumented(&[1]));
    builder.mark(6);
    read(&mut builder);
    builder.end_method();
    let input = builder.build();

    let output = run(input.clone(), &io_calls);
    assert_eq!(output.method_annotations("park", "()V"), input.method_annotations("park", "()V"));
    assert_eq!(offsets_of(&output, "park", "()V"), vec![0]);
    assert_eq!(offsets_of(&output, "run", "()V"), vec![6]);
}

/// Configured trampolines on other classes are skipped too.
#[test]
fn configured_trampolines_are_skipped() {
    let config = OffsetsConfig::default().with_yield_method("com/example/Sched", "suspend");
    let mut builder = StreamBuilder::new("com/example/Sched", ClassVersion::V1_8);
    builder.begin_method(0x0009, "suspend", "()V");
    builder.annotation(instrumented(&[1]));
    builder.mark(4);
    read(&mut builder);
    builder.end_method();
    let input = builder.build();

    let pass = OffsetsPass::with_config(&config, &io_calls);
    assert_eq!(pass.rewrite(input.clone()).unwrap(), input.into_events());
}

// =============================================================================
// 5. Errors
// =============================================================================

/// An unknown element aborts the whole class; the sink sees nothing.
#[test]
fn unknown_metadata_field_aborts_the_class() {
    let mut builder = StreamBuilder::new("com/example/Worker", ClassVersion::V1_8);
    builder.source("Worker.java");
    builder.begin_method(0x0001, "fine", "()V");
    builder.annotation(instrumented(&[1]));
    builder.mark(2);
    read(&mut builder);
    builder.end_method();
    builder.begin_method(0x0001, "broken", "(I)V");
    builder.annotation(instrumented(&[1]).with("methodLine", AnnotationValue::Int(3)));
    builder.end_method();

    let pass = OffsetsPass::new(&io_calls);
    let mut sink = ClassStream::new();
    let err = pass.run(builder.build(), &mut sink).unwrap_err();

    assert!(sink.is_empty(), "sink received {} events", sink.len());
    let OffsetsError::Schema(schema) = &err else {
        panic!("expected a schema error, got {err:?}");
    };
    assert_eq!(schema.kind, SchemaErrorKind::UnknownField("methodLine".to_owned()));
    assert_eq!(schema.method_name, "broken");
    assert_eq!(
        err.to_string(),
        "unexpected metadata field `methodLine` in com/example/Worker.broken(I)V (Worker.java)"
    );
}

/// An unknown element in an ineligible method is not inspected.
#[test]
fn unknown_field_in_native_method_is_not_an_error() {
    let mut builder = StreamBuilder::new("com/example/Worker", ClassVersion::V1_8);
    builder.begin_method(ACC_NATIVE, "poll", "()V");
    builder.annotation(instrumented(&[1]).with("methodLine", AnnotationValue::Int(3)));
    builder.end_method();
    let input = builder.build();

    let pass = OffsetsPass::new(&io_calls);
    assert_eq!(pass.rewrite(input.clone()).unwrap(), input.into_events());
}

/// A stream that stops inside a method is rejected.
#[test]
fn truncated_stream_is_rejected() {
    let mut builder = StreamBuilder::new("com/example/Worker", ClassVersion::V1_8);
    builder.begin_method(0x0001, "run", "()V");
    builder.mark(0);
    let mut events = builder.build().into_events();
    events.pop();

    let pass = OffsetsPass::new(&io_calls);
    let mut sink = ClassStream::new();
    assert_eq!(
        pass.run(events, &mut sink),
        Err(OffsetsError::UnterminatedMethod {
            class_name: "com/example/Worker".to_owned(),
            method_name: "run".to_owned(),
        })
    );
    assert!(sink.is_empty());
}

// =============================================================================
// 6. Class version
// =============================================================================

#[test]
fn old_class_version_is_raised() {
    let builder = StreamBuilder::new("com/example/Legacy", ClassVersion::V1_1);
    let output = run(builder.build(), &io_calls);
    let ClassEvent::Header(header) = &output.events()[0] else {
        panic!("stream should open with a header");
    };
    assert_eq!(header.version, ClassVersion::V1_5);
}

#[test]
fn current_class_version_is_kept() {
    for version in [ClassVersion::V1_5, ClassVersion::V1_8, ClassVersion::new(65, 0)] {
        let builder = StreamBuilder::new("com/example/Modern", version);
        let output = run(builder.build(), &io_calls);
        let ClassEvent::Header(header) = &output.events()[0] else {
            panic!("stream should open with a header");
        };
        assert_eq!(header.version, version);
    }
}
