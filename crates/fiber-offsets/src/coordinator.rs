//! Class-level routing of events.
//!
//! The coordinator walks a class stream once. It raises the declared class
//! version when it is too old to carry annotations, remembers the class and
//! source file names for diagnostics, and hands the body of every eligible
//! method to a fresh [`MethodOffsetCollector`]. Ineligible methods (native
//! methods and the yield trampolines) are forwarded without looking at them.

use log::debug;

use crate::{
    classifier::CallClassifier,
    collector::MethodOffsetCollector,
    config::OffsetsConfig,
    error::OffsetsError,
    event::{ClassEvent, MethodHeader},
};

/// Names of the class being processed, used in diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassContext {
    pub name: String,
    pub source_file: Option<String>,
}

/// Where events of the currently open method go.
#[derive(Debug)]
enum MethodRoute<'p, C: ?Sized> {
    /// Between methods.
    Outside,
    /// Inside an ineligible method.
    PassThrough { name: String },
    Collecting {
        name: String,
        collector: MethodOffsetCollector<'p, C>,
    },
}

/// Single-pass transformer for one class stream.
///
/// Feed every event of a class to [`Self::process`] in order, then call
/// [`Self::finish`]. Output accumulates in the caller's buffer, which should
/// be discarded if any call fails.
#[derive(Debug)]
pub struct ClassCoordinator<'p, C: ?Sized> {
    config: &'p OffsetsConfig,
    classifier: &'p C,
    class: ClassContext,
    route: MethodRoute<'p, C>,
}

impl<'p, C: CallClassifier + ?Sized> ClassCoordinator<'p, C> {
    #[must_use]
    pub fn new(config: &'p OffsetsConfig, classifier: &'p C) -> Self {
        Self {
            config,
            classifier,
            class: ClassContext::default(),
            route: MethodRoute::Outside,
        }
    }

    /// The class seen so far.
    #[must_use]
    pub fn class(&self) -> &ClassContext {
        &self.class
    }

    /// Returns true if offsets should be collected for `method` of the current class.
    #[must_use]
    pub fn is_eligible(&self, method: &MethodHeader) -> bool {
        !method.is_native() && !self.config.is_yield_method(&self.class.name, &method.name)
    }

    /// Processes one event, pushing the events to forward onto `out`.
    pub fn process(&mut self, event: ClassEvent, out: &mut Vec<ClassEvent>) -> Result<(), OffsetsError> {
        match event {
            ClassEvent::Header(mut header) => {
                if header.version < self.config.min_version {
                    debug!(
                        "{}: raising class version {} to {}",
                        header.name, header.version, self.config.min_version
                    );
                    header.version = self.config.min_version;
                }
                self.class.name.clone_from(&header.name);
                out.push(ClassEvent::Header(header));
            }
            ClassEvent::Source { file, debug } => {
                self.class.source_file.clone_from(&file);
                out.push(ClassEvent::Source { file, debug });
            }
            ClassEvent::MethodStart(method) => {
                if let Some(open) = self.open_method() {
                    return Err(OffsetsError::NestedMethod {
                        class_name: self.class.name.clone(),
                        open_method: open.to_owned(),
                        method_name: method.name,
                    });
                }
                let name = method.name.clone();
                self.route = if self.is_eligible(&method) {
                    MethodRoute::Collecting {
                        name,
                        collector: MethodOffsetCollector::new(self.config, self.classifier, &method),
                    }
                } else {
                    debug!("{}.{}{}: skipped", self.class.name, method.name, method.desc);
                    MethodRoute::PassThrough { name }
                };
                out.push(ClassEvent::MethodStart(method));
            }
            ClassEvent::MethodEnd => {
                if let MethodRoute::Collecting { collector, .. } =
                    std::mem::replace(&mut self.route, MethodRoute::Outside)
                {
                    collector.finish(&self.class, out);
                }
                out.push(ClassEvent::MethodEnd);
            }
            other => match &mut self.route {
                MethodRoute::Collecting { collector, .. } => collector.on_event(other, &self.class, out)?,
                MethodRoute::Outside | MethodRoute::PassThrough { .. } => out.push(other),
            },
        }
        Ok(())
    }

    /// Checks that the stream did not stop inside a method.
    pub fn finish(self) -> Result<(), OffsetsError> {
        match self.open_method() {
            Some(open) => Err(OffsetsError::UnterminatedMethod {
                class_name: self.class.name.clone(),
                method_name: open.to_owned(),
            }),
            None => Ok(()),
        }
    }

    fn open_method(&self) -> Option<&str> {
        match &self.route {
            MethodRoute::Outside => None,
            MethodRoute::PassThrough { name } | MethodRoute::Collecting { name, .. } => Some(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        classifier::CallSite,
        config::FIBER_CLASS_NAME,
        event::{ACC_NATIVE, ClassHeader, ClassVersion},
    };

    fn nothing(_: &CallSite<'_>) -> bool {
        false
    }

    fn header(name: &str, version: ClassVersion) -> ClassEvent {
        ClassEvent::Header(ClassHeader::new(name, version))
    }

    #[test]
    fn old_versions_are_raised() {
        let config = OffsetsConfig::default();
        let mut coordinator = ClassCoordinator::new(&config, &nothing);
        let mut out = Vec::new();
        coordinator
            .process(header("a/Old", ClassVersion::V1_1), &mut out)
            .unwrap();
        assert_eq!(out, vec![header("a/Old", ClassVersion::V1_5)]);
        assert_eq!(coordinator.class().name, "a/Old");
    }

    #[test]
    fn newer_versions_are_kept() {
        let config = OffsetsConfig::default();
        let mut coordinator = ClassCoordinator::new(&config, &nothing);
        let mut out = Vec::new();
        coordinator
            .process(header("a/New", ClassVersion::V1_8), &mut out)
            .unwrap();
        assert_eq!(out, vec![header("a/New", ClassVersion::V1_8)]);
    }

    #[test]
    fn eligibility() {
        let config = OffsetsConfig::default();
        let mut coordinator = ClassCoordinator::new(&config, &nothing);
        coordinator
            .process(header(FIBER_CLASS_NAME, ClassVersion::V1_8), &mut Vec::new())
            .unwrap();
        assert!(!coordinator.is_eligible(&MethodHeader::new(0x0009, "park", "()V")));
        assert!(!coordinator.is_eligible(&MethodHeader::new(ACC_NATIVE, "run", "()V")));
        assert!(coordinator.is_eligible(&MethodHeader::new(0x0001, "run", "()V")));
    }

    #[test]
    fn nested_method_is_an_error() {
        let config = OffsetsConfig::default();
        let mut coordinator = ClassCoordinator::new(&config, &nothing);
        let mut out = Vec::new();
        coordinator.process(header("a/B", ClassVersion::V1_8), &mut out).unwrap();
        coordinator
            .process(ClassEvent::MethodStart(MethodHeader::new(1, "first", "()V")), &mut out)
            .unwrap();
        let err = coordinator
            .process(ClassEvent::MethodStart(MethodHeader::new(1, "second", "()V")), &mut out)
            .unwrap_err();
        assert_eq!(err.to_string(), "method a/B.second declared before a/B.first ended");
    }

    #[test]
    fn unterminated_method_is_an_error() {
        let config = OffsetsConfig::default();
        let mut coordinator = ClassCoordinator::new(&config, &nothing);
        let mut out = Vec::new();
        coordinator.process(header("a/B", ClassVersion::V1_8), &mut out).unwrap();
        coordinator
            .process(ClassEvent::MethodStart(MethodHeader::new(ACC_NATIVE, "n", "()V")), &mut out)
            .unwrap();
        assert_eq!(
            coordinator.finish(),
            Err(OffsetsError::UnterminatedMethod {
                class_name: "a/B".to_owned(),
                method_name: "n".to_owned(),
            })
        );
    }
}
