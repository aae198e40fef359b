//! Function registry: the explicit mapping of invocable names to callables.
//!
//! A registry is built by scanning a function directory for `*.fn` files and
//! registering every item they declare. It is never updated in place; when the
//! directory changes, the owner builds a fresh registry.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use crate::ast::{FunctionDef, Param};
use crate::builtins;
use crate::error::{InvokeError, LoadError, ParseError};
use crate::interp::{call_function, CallContext, FunctionScope};
use crate::parser::parse_unit;
use crate::value::{ParamType, Value};

/// File extension of function files.
pub const FUNCTION_EXTENSION: &str = "fn";

/// A unit the registry can invoke by name.
pub trait Callable: Send + Sync {
    fn name(&self) -> &str;

    /// File name (basename) the callable was loaded from.
    fn source_file(&self) -> &str;

    fn params(&self) -> &[Param];

    fn return_type(&self) -> ParamType {
        ParamType::Any
    }

    fn description(&self) -> Option<&str> {
        None
    }

    fn invoke(&self, ctx: &CallContext<'_>, args: Vec<Value>) -> Result<Value, InvokeError>;
}

/// A function declared in a function file.
#[derive(Debug, Clone)]
pub struct ScriptFunction {
    def: FunctionDef,
    source_file: String,
}

impl ScriptFunction {
    pub fn new(def: FunctionDef, source_file: impl Into<String>) -> Self {
        ScriptFunction {
            def,
            source_file: source_file.into(),
        }
    }
}

impl Callable for ScriptFunction {
    fn name(&self) -> &str {
        &self.def.name
    }

    fn source_file(&self) -> &str {
        &self.source_file
    }

    fn params(&self) -> &[Param] {
        &self.def.params
    }

    fn return_type(&self) -> ParamType {
        self.def.return_type
    }

    fn description(&self) -> Option<&str> {
        self.def.doc.as_deref()
    }

    fn invoke(&self, ctx: &CallContext<'_>, args: Vec<Value>) -> Result<Value, InvokeError> {
        call_function(&self.def, ctx, args)
    }
}

/// Listing entry for one registered function.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionDescriptor {
    pub function: String,
    pub filename: String,
    pub params: Vec<ParamDescriptor>,
    pub returns: ParamType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ParamType,
}

/// Name-unique set of callables.
#[derive(Default, Clone)]
pub struct FunctionRegistry {
    functions: BTreeMap<String, Arc<dyn Callable>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callable`, rejecting duplicate and builtin names.
    pub fn register(&mut self, callable: Arc<dyn Callable>) -> Result<(), LoadError> {
        let name = callable.name().to_string();
        if builtins::is_builtin(&name) {
            return Err(LoadError::ReservedName { name });
        }
        if let Some(existing) = self.functions.get(&name) {
            return Err(LoadError::Duplicate {
                name,
                existing: existing.source_file().to_string(),
            });
        }
        self.functions.insert(name, callable);
        Ok(())
    }

    /// Parses `source` and registers every function it declares.
    ///
    /// A parse error rejects the whole file. Individual items that collide
    /// with an existing name are skipped with a warning. Returns the number
    /// of functions registered.
    pub fn load_source(&mut self, file_name: &str, source: &str) -> Result<usize, ParseError> {
        let defs = parse_unit(source)?;
        let mut registered = 0;
        for def in defs {
            let function = ScriptFunction::new(def, file_name);
            match self.register(Arc::new(function)) {
                Ok(()) => registered += 1,
                Err(err) => tracing::warn!(file = file_name, "skipping function: {}", err),
            }
        }
        Ok(registered)
    }

    /// Builds a registry from every function file in `dir`, in file name order.
    ///
    /// A missing directory yields an empty registry. Unreadable or unparsable
    /// files are logged and skipped so one broken file does not hide the rest.
    pub fn load_dir(dir: &Path) -> Result<Self, LoadError> {
        let mut registry = FunctionRegistry::new();
        if !dir.is_dir() {
            return Ok(registry);
        }

        let entries = std::fs::read_dir(dir).map_err(|source| LoadError::Io {
            path: dir.display().to_string(),
            source,
        })?;

        let mut files: Vec<_> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && path.extension().and_then(|e| e.to_str()) == Some(FUNCTION_EXTENSION)
            })
            .collect();
        files.sort();

        for path in files {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let source = match std::fs::read_to_string(&path) {
                Ok(source) => source,
                Err(err) => {
                    tracing::warn!(file = %file_name, "unreadable function file: {}", err);
                    continue;
                }
            };
            match registry.load_source(&file_name, &source) {
                Ok(count) => tracing::debug!(file = %file_name, count, "loaded function file"),
                Err(err) => tracing::warn!(file = %file_name, "invalid function file: {}", err),
            }
        }

        tracing::debug!(
            dir = %dir.display(),
            functions = registry.len(),
            "function registry built"
        );
        Ok(registry)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Callable>> {
        self.functions.get(name)
    }

    /// Descriptors of all functions, sorted by name.
    pub fn descriptors(&self) -> Vec<FunctionDescriptor> {
        self.functions
            .values()
            .map(|f| FunctionDescriptor {
                function: f.name().to_string(),
                filename: f.source_file().to_string(),
                params: f
                    .params()
                    .iter()
                    .map(|p| ParamDescriptor {
                        name: p.name.clone(),
                        ty: p.ty,
                    })
                    .collect(),
                returns: f.return_type(),
                description: f.description().map(str::to_string),
            })
            .collect()
    }

    /// Invokes `name` with positional `args`.
    pub fn invoke(&self, name: &str, args: Vec<Value>) -> Result<Value, InvokeError> {
        let callable = self
            .functions
            .get(name)
            .ok_or_else(|| InvokeError::NotFound(name.to_string()))?;
        callable.invoke(&CallContext::root(self), args)
    }
}

impl FunctionScope for FunctionRegistry {
    fn resolve(&self, name: &str) -> Option<&dyn Callable> {
        self.functions.get(name).map(|f| f.as_ref())
    }
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MATH: &str = r#"
/// Adds two numbers together.
fn add(a: int, b: int) -> int { a + b }

fn subtract(a: int, b: int) -> int { a - b }
"#;

    #[test]
    fn loads_directory_in_file_order_and_sorts_listing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("math.fn"), MATH).unwrap();
        std::fs::write(
            dir.path().join("hello.fn"),
            "fn sayHello(name: string) -> string { 'Hello, ' + escape_html(name) + '!' }",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "fn ignored() { 1 }").unwrap();

        let registry = FunctionRegistry::load_dir(dir.path()).unwrap();
        let names: Vec<_> = registry.descriptors().into_iter().map(|d| d.function).collect();
        assert_eq!(names, vec!["add", "sayHello", "subtract"]);

        let add = &registry.descriptors()[0];
        assert_eq!(add.filename, "math.fn");
        assert_eq!(add.description.as_deref(), Some("Adds two numbers together."));
        assert_eq!(add.params[1], ParamDescriptor { name: "b".into(), ty: ParamType::Int });
    }

    #[test]
    fn deeply_nested_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let depth = 50_000;
        let deep = format!("fn f() {{ {}1{} }}", "(".repeat(depth), ")".repeat(depth));
        std::fs::write(dir.path().join("a_deep.fn"), deep).unwrap();
        std::fs::write(dir.path().join("b_math.fn"), MATH).unwrap();

        // same stack size as a tokio worker thread
        let path = dir.path().to_path_buf();
        let registry = std::thread::Builder::new()
            .stack_size(2 * 1024 * 1024)
            .spawn(move || FunctionRegistry::load_dir(&path))
            .unwrap()
            .join()
            .unwrap()
            .unwrap();
        assert!(!registry.contains("f"));
        assert!(registry.contains("add"));
        assert!(registry.contains("subtract"));
    }

    #[test]
    fn broken_file_does_not_hide_others() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a_broken.fn"), "fn oops( {").unwrap();
        std::fs::write(dir.path().join("b_math.fn"), MATH).unwrap();

        let registry = FunctionRegistry::load_dir(dir.path()).unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.contains("add"));
    }

    #[test]
    fn first_declaration_wins_on_duplicate() {
        let mut registry = FunctionRegistry::new();
        registry.load_source("a.fn", "fn f() { 1 }").unwrap();
        let count = registry.load_source("b.fn", "fn f() { 2 }\nfn g() { 3 }").unwrap();
        assert_eq!(count, 1);
        assert_eq!(registry.invoke("f", vec![]).unwrap(), Value::Int(1));
        assert_eq!(registry.get("f").unwrap().source_file(), "a.fn");
    }

    #[test]
    fn builtin_names_are_reserved() {
        let mut registry = FunctionRegistry::new();
        let count = registry.load_source("a.fn", "fn len(x) { 0 }").unwrap();
        assert_eq!(count, 0);
        assert!(!registry.contains("len"));
    }

    #[test]
    fn missing_directory_is_empty_registry() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FunctionRegistry::load_dir(&dir.path().join("absent")).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn invoke_unknown_is_not_found() {
        let registry = FunctionRegistry::new();
        assert_eq!(
            registry.invoke("nope", vec![]).unwrap_err(),
            InvokeError::NotFound("nope".into())
        );
    }

    #[test]
    fn string_arguments_are_coerced_positionally() {
        let mut registry = FunctionRegistry::new();
        registry.load_source("math.fn", MATH).unwrap();
        let result = registry
            .invoke("subtract", vec![Value::Str("3".into()), Value::Str("2".into())])
            .unwrap();
        assert_eq!(result, Value::Int(1));
    }
}
