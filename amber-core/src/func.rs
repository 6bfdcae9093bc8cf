use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use crate::value::Value;

/// Signature of a registered function.
pub type FuncBody = dyn Fn(&[Value]) -> Value + Send + Sync;

/// A named invocable.
///
/// Callables persist as their registered name only; the closure is
/// re-resolved from the registry at load time, so a function is portable
/// exactly when both sides register it under the same name.
#[derive(Clone)]
pub struct FuncRef {
    name: String,
    body: Arc<FuncBody>,
}

impl FuncRef {
    pub(crate) fn new(name: String, body: Arc<FuncBody>) -> Self {
        FuncRef { name, body }
    }

    /// The registry name, which is also the wire form.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invokes the function.
    pub fn call(&self, args: &[Value]) -> Value {
        (self.body)(args)
    }
}

impl fmt::Debug for FuncRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FuncRef({})", self.name)
    }
}

impl PartialEq for FuncRef {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

/// Registry of invocable functions, keyed by name.
///
/// Populate it before loading any record that names a function; decoding an
/// unregistered name is a hard failure, not a fallback.
#[derive(Default)]
pub struct FuncRegistry {
    entries: RwLock<HashMap<String, Arc<FuncBody>>>,
}

impl FuncRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `body` under `name`, replacing any previous entry.
    pub fn register(
        &self,
        name: impl Into<String>,
        body: impl Fn(&[Value]) -> Value + Send + Sync + 'static,
    ) {
        self.entries
            .write()
            .unwrap()
            .insert(name.into(), Arc::new(body));
    }

    /// Resolves a name into an invocable, if registered.
    pub fn resolve(&self, name: &str) -> Option<FuncRef> {
        self.entries
            .read()
            .unwrap()
            .get(name)
            .map(|body| FuncRef::new(name.to_owned(), Arc::clone(body)))
    }
}
