//! In-memory call graph.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::{debug, trace};

use splitrt_core::Affinity;

use crate::demangle::Demangler;
use crate::error::CallGraphError;
use crate::tags;

static EMPTY: BTreeSet<String> = BTreeSet::new();

#[derive(Debug, Default)]
pub struct CallGraph {
    functions: BTreeSet<String>,
    callees: HashMap<String, BTreeSet<String>>,
    callers: HashMap<String, BTreeSet<String>>,
    /// Functions that call the external node.
    indirect_callers: HashSet<String>,
    /// Functions called from the null node, i.e. possibly address-taken.
    indirect_callees: HashSet<String>,
    demangled: HashMap<String, String>,
    tags: HashMap<Affinity, BTreeSet<String>>,
}

impl CallGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_function(&mut self, func: &str) {
        if self.functions.contains(func) {
            return;
        }
        self.functions.insert(func.to_string());
        self.callees.insert(func.to_string(), BTreeSet::new());
        self.callers.insert(func.to_string(), BTreeSet::new());
    }

    /// Record a call edge. A missing caller means `callee` may be called
    /// indirectly; a missing callee means `caller` makes an indirect call.
    pub fn add_call(&mut self, caller: Option<&str>, callee: Option<&str>) {
        match (caller, callee) {
            (None, Some(callee)) => {
                self.indirect_callees.insert(callee.to_string());
            }
            (Some(caller), None) => {
                self.indirect_callers.insert(caller.to_string());
            }
            (Some(caller), Some(callee)) => {
                self.add_function(caller);
                self.add_function(callee);
                if let Some(set) = self.callees.get_mut(caller) {
                    set.insert(callee.to_string());
                }
                if let Some(set) = self.callers.get_mut(callee) {
                    set.insert(caller.to_string());
                }
            }
            (None, None) => trace!("external call from the null node ignored"),
        }
    }

    /// All functions, sorted by mangled name.
    pub fn functions(&self) -> impl Iterator<Item = &str> {
        self.functions.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn contains(&self, func: &str) -> bool {
        self.functions.contains(func)
    }

    pub fn callees(&self, func: &str) -> &BTreeSet<String> {
        self.callees.get(func).unwrap_or(&EMPTY)
    }

    pub fn callers(&self, func: &str) -> &BTreeSet<String> {
        self.callers.get(func).unwrap_or(&EMPTY)
    }

    pub fn address_taken(&self, func: &str) -> bool {
        self.indirect_callees.contains(func)
    }

    pub fn calls_indirectly(&self, func: &str) -> bool {
        self.indirect_callers.contains(func)
    }

    /// Demangled name, or the mangled one if demangling has not run.
    pub fn demangled_name<'a>(&'a self, func: &'a str) -> &'a str {
        self.demangled.get(func).map(String::as_str).unwrap_or(func)
    }

    /// Demangle every function in one batch.
    pub fn compute_demangled(&mut self, demangler: &dyn Demangler) -> Result<(), CallGraphError> {
        let names: Vec<&str> = self.functions().collect();
        let demangled = demangler.demangle(&names)?;
        if demangled.len() != names.len() {
            return Err(CallGraphError::Demangler(format!(
                "expected {} names, got {}",
                names.len(),
                demangled.len()
            )));
        }
        self.demangled = names
            .into_iter()
            .map(str::to_string)
            .zip(demangled)
            .collect();
        debug!(functions = self.demangled.len(), "demangled call graph");
        Ok(())
    }

    /// Assign each function the affinity of the last tag in its name.
    pub fn compute_tags(&mut self) -> Result<(), CallGraphError> {
        let mut tagged: HashMap<Affinity, BTreeSet<String>> = HashMap::new();
        for func in &self.functions {
            if let Some(affinity) = tags::tag_of(func, self.demangled_name(func))? {
                tagged.entry(affinity).or_default().insert(func.clone());
            }
        }
        for affinity in Affinity::TAGGED {
            let count = tagged.get(&affinity).map_or(0, BTreeSet::len);
            debug!(%affinity, count, "tagged functions");
        }
        self.tags = tagged;
        Ok(())
    }

    /// Functions carrying `affinity`, sorted by mangled name.
    pub fn tagged(&self, affinity: Affinity) -> &BTreeSet<String> {
        self.tags.get(&affinity).unwrap_or(&EMPTY)
    }

    pub fn affinity_of(&self, func: &str) -> Option<Affinity> {
        Affinity::TAGGED
            .into_iter()
            .find(|a| self.tagged(*a).contains(func))
    }
}
