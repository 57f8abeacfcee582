//! Driving the pass over whole classes.

use crate::{
    classifier::CallClassifier,
    config::OffsetsConfig,
    coordinator::ClassCoordinator,
    error::OffsetsError,
    event::ClassEvent,
    sink::ClassSink,
};

/// The suspension offset pass.
///
/// Holds only shared, read-only inputs, so one pass can process any number of
/// classes, including from several threads at once when the classifier is
/// `Sync`.
///
/// ```
/// use fiber_offsets::{CallSite, ClassVersion, InvokeOpcode, OffsetsPass, StreamBuilder};
///
/// let io_only = |call: &CallSite<'_>| call.owner == "com/example/Io";
/// let pass = OffsetsPass::new(&io_only);
///
/// let mut builder = StreamBuilder::new("com/example/Plain", ClassVersion::V1_8);
/// builder.begin_method(0x0001, "run", "()V");
/// builder.mark(3).call(InvokeOpcode::InvokeStatic, "com/example/Io", "read", "()V");
/// builder.end_method();
/// let input = builder.build();
///
/// // nothing was instrumented, so nothing changes
/// let output = pass.rewrite(input.clone()).unwrap();
/// assert_eq!(output, input.into_events());
/// ```
#[derive(Debug)]
pub struct OffsetsPass<'p, C: ?Sized> {
    config: &'p OffsetsConfig,
    classifier: &'p C,
}

impl<'p, C: CallClassifier + ?Sized> OffsetsPass<'p, C> {
    /// Creates a pass using the standard configuration.
    #[must_use]
    pub fn new(classifier: &'p C) -> Self {
        Self::with_config(OffsetsConfig::standard(), classifier)
    }

    #[must_use]
    pub fn with_config(config: &'p OffsetsConfig, classifier: &'p C) -> Self {
        Self { config, classifier }
    }

    #[must_use]
    pub fn config(&self) -> &'p OffsetsConfig {
        self.config
    }

    /// Rewrites one class stream.
    ///
    /// Returns the complete output stream, or the first error. On error no
    /// partial output is returned.
    pub fn rewrite<I>(&self, events: I) -> Result<Vec<ClassEvent>, OffsetsError>
    where
        I: IntoIterator<Item = ClassEvent>,
    {
        let events = events.into_iter();
        let mut out = Vec::with_capacity(events.size_hint().0 + 1);
        let mut coordinator = ClassCoordinator::new(self.config, self.classifier);
        for event in events {
            coordinator.process(event, &mut out)?;
        }
        coordinator.finish()?;
        Ok(out)
    }

    /// Rewrites one class stream into `sink`.
    ///
    /// The sink only sees events once the whole class has been processed
    /// successfully; when this returns an error the sink has received nothing.
    pub fn run<I, S>(&self, events: I, sink: &mut S) -> Result<(), OffsetsError>
    where
        I: IntoIterator<Item = ClassEvent>,
        S: ClassSink + ?Sized,
    {
        for event in self.rewrite(events)? {
            sink.accept(event);
        }
        Ok(())
    }
}
