//! Deciding which calls are suspension points.
//!
//! The pass only depends on the [`CallClassifier`] trait: it must agree with
//! whatever the instrumenting pass used, so callers normally hand in the same
//! oracle they instrumented with. [`MethodDatabase`] is a table-driven
//! implementation covering the common case.
//!
//! Classifiers are shared read-only across classes and must be pure: the same
//! call shape always gets the same answer.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::event::InvokeOpcode;

/// Whether a call is a plain method call or a dynamically linked call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, Serialize, Deserialize)]
pub enum CallKind {
    #[strum(serialize = "method")]
    Method,
    #[strum(serialize = "indy")]
    InvokeDynamic,
}

/// The shape of one call instruction, as seen by a classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSite<'a> {
    pub kind: CallKind,
    pub opcode: InvokeOpcode,
    /// Owner type's internal name. For dynamic call sites, the bootstrap owner.
    pub owner: &'a str,
    pub name: &'a str,
    pub desc: &'a str,
}

/// Oracle answering whether a call is a suspension point.
pub trait CallClassifier {
    fn is_suspendable_call(&self, call: &CallSite<'_>) -> bool;
}

impl<F> CallClassifier for F
where
    F: Fn(&CallSite<'_>) -> bool + ?Sized,
{
    fn is_suspendable_call(&self, call: &CallSite<'_>) -> bool {
        self(call)
    }
}

/// How a method participates in suspension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, strum::Display, Serialize, Deserialize)]
pub enum SuspendableType {
    /// Never suspends.
    #[default]
    NonSuspendable,
    /// May suspend.
    Suspendable,
    /// Does not suspend itself, but an override reached through virtual dispatch may.
    SuspendableSuper,
}

/// Bootstrap owner whose call sites only build lambda objects.
const LAMBDA_METAFACTORY: &str = "java/lang/invoke/LambdaMetafactory";

/// Prefix of compiler-generated accessors for private members of outer classes.
const SYNTHETIC_ACCESSOR_PREFIX: &str = "access$";

/// Indirect invocations whose target cannot be known, so they are always
/// treated as possible suspension points.
const INDIRECT_INVOCATIONS: &[(&str, &str)] = &[
    ("java/lang/reflect/Method", "invoke"),
    ("java/lang/invoke/MethodHandle", "invoke"),
    ("java/lang/invoke/MethodHandle", "invokeExact"),
    ("java/lang/reflect/InvocationHandler", "invoke"),
];

/// Table of known method classifications.
///
/// Lookups try, in order: the exact `(owner, name, desc)`, then `(owner, name)`
/// for any descriptor, then the whole owner type, then the default for
/// unknown methods.
///
/// ```
/// use fiber_offsets::{CallClassifier, CallKind, CallSite, InvokeOpcode, MethodDatabase, SuspendableType};
///
/// let db = MethodDatabase::new().with_method("com/example/Io", "read", SuspendableType::Suspendable);
/// let call = CallSite {
///     kind: CallKind::Method,
///     opcode: InvokeOpcode::InvokeStatic,
///     owner: "com/example/Io",
///     name: "read",
///     desc: "()I",
/// };
/// assert!(db.is_suspendable_call(&call));
/// ```
#[derive(Debug, Clone, Default)]
pub struct MethodDatabase {
    owners: AHashMap<String, OwnerEntry>,
    unknown: SuspendableType,
}

/// Classifications recorded for one owner type.
#[derive(Debug, Clone, Default)]
struct OwnerEntry {
    whole: Option<SuspendableType>,
    methods: AHashMap<String, MethodEntry>,
}

/// Classifications recorded for one method name.
#[derive(Debug, Clone, Default)]
struct MethodEntry {
    any: Option<SuspendableType>,
    overloads: AHashMap<String, SuspendableType>,
}

impl MethodDatabase {
    /// Creates an empty database that treats unknown methods as non-suspendable.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the classification used for methods the table knows nothing about.
    #[must_use]
    pub fn with_unknown(mut self, unknown: SuspendableType) -> Self {
        self.unknown = unknown;
        self
    }

    /// Classifies one method overload.
    #[must_use]
    pub fn with_overload(mut self, owner: &str, name: &str, desc: &str, kind: SuspendableType) -> Self {
        self.insert_overload(owner, name, desc, kind);
        self
    }

    /// Classifies every overload of a method.
    #[must_use]
    pub fn with_method(mut self, owner: &str, name: &str, kind: SuspendableType) -> Self {
        self.insert_method(owner, name, kind);
        self
    }

    /// Classifies every method of a type.
    #[must_use]
    pub fn with_owner(mut self, owner: &str, kind: SuspendableType) -> Self {
        self.insert_owner(owner, kind);
        self
    }

    pub fn insert_overload(&mut self, owner: &str, name: &str, desc: &str, kind: SuspendableType) {
        self.method_entry(owner, name).overloads.insert(desc.to_owned(), kind);
    }

    pub fn insert_method(&mut self, owner: &str, name: &str, kind: SuspendableType) {
        self.method_entry(owner, name).any = Some(kind);
    }

    pub fn insert_owner(&mut self, owner: &str, kind: SuspendableType) {
        self.owners.entry(owner.to_owned()).or_default().whole = Some(kind);
    }

    /// Looks up the classification of a method.
    #[must_use]
    pub fn lookup(&self, owner: &str, name: &str, desc: &str) -> SuspendableType {
        let Some(entry) = self.owners.get(owner) else {
            return self.unknown;
        };
        let by_method = entry
            .methods
            .get(name)
            .and_then(|m| m.overloads.get(desc).copied().or(m.any));
        by_method.or(entry.whole).unwrap_or(self.unknown)
    }

    /// Number of explicit entries in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.owners
            .values()
            .map(|o| {
                usize::from(o.whole.is_some())
                    + o.methods
                        .values()
                        .map(|m| usize::from(m.any.is_some()) + m.overloads.len())
                        .sum::<usize>()
            })
            .sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn method_entry(&mut self, owner: &str, name: &str) -> &mut MethodEntry {
        self.owners
            .entry(owner.to_owned())
            .or_default()
            .methods
            .entry(name.to_owned())
            .or_default()
    }
}

impl CallClassifier for MethodDatabase {
    fn is_suspendable_call(&self, call: &CallSite<'_>) -> bool {
        match call.kind {
            CallKind::InvokeDynamic => call.owner != LAMBDA_METAFACTORY,
            CallKind::Method => {
                if is_indirect_call(call.owner, call.name) {
                    return true;
                }
                match self.lookup(call.owner, call.name, call.desc) {
                    SuspendableType::NonSuspendable => false,
                    SuspendableType::Suspendable => true,
                    SuspendableType::SuspendableSuper => call.opcode.is_virtual(),
                }
            }
        }
    }
}

/// Returns true for calls whose real target is hidden behind an accessor or reflection.
fn is_indirect_call(owner: &str, name: &str) -> bool {
    name.starts_with(SYNTHETIC_ACCESSOR_PREFIX)
        || INDIRECT_INVOCATIONS
            .iter()
            .any(|&(o, n)| o == owner && n == name)
}
