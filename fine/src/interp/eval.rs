//! Tree-walking evaluator

use super::builtins::{value_method, Builtin};
use super::env::{child_env, EnvRef, Environment};
use super::error::{CallStack, Exception, Flow, Unwind};
use super::module::{binding_name, ModuleLoader};
use super::ops;
use super::value::{Class, Dict, Function, Instance, Matrix, Module, Value};
use crate::ast::{Block, CatchClause, ClassDef, Expr, FnDef, Program, Spanned, Stmt};
use crate::config::RuntimeConfig;
use crate::{STACK_GROW_SIZE, STACK_RED_ZONE};
use std::cell::RefCell;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Name a method's `this` receiver is bound to
const THIS: &str = "this";
/// Method run by `new`
const CONSTRUCTOR: &str = "constructor";

/// The interpreter
///
/// Program output (`print`) goes to `W`, stdout unless built with
/// [`Interpreter::with_output`].
pub struct Interpreter<W: Write = io::Stdout> {
    /// Global environment, persistent across `run` calls
    globals: EnvRef,
    /// Active user-function calls
    call_stack: CallStack,
    /// File name recorded in stack frames
    current_file: String,
    /// Loaded modules
    modules: ModuleLoader,
    out: W,
}

impl Interpreter<io::Stdout> {
    /// Create an interpreter with default limits, printing to stdout
    pub fn new() -> Self {
        Self::with_config(&RuntimeConfig::default())
    }

    pub fn with_config(config: &RuntimeConfig) -> Self {
        Self::with_output(config, io::stdout())
    }
}

impl Default for Interpreter<io::Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> Interpreter<W> {
    pub fn with_output(config: &RuntimeConfig, out: W) -> Self {
        Self {
            globals: Environment::new().into_ref(),
            call_stack: CallStack::new(config.max_stack_depth),
            current_file: config.source_name.clone(),
            modules: ModuleLoader::new(&config.stdlib_dir),
            out,
        }
    }

    /// Set the file name used in traces and as the base for relative imports
    pub fn set_current_file(&mut self, file: impl Into<String>) {
        self.current_file = file.into();
    }

    pub fn current_file(&self) -> &str {
        &self.current_file
    }

    pub fn globals(&self) -> &EnvRef {
        &self.globals
    }

    pub fn call_stack(&self) -> &CallStack {
        &self.call_stack
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// Run a program in the global environment.
    ///
    /// Returns the value of the last top-level statement, or the uncaught
    /// exception that stopped evaluation.
    #[tracing::instrument(level = "debug", skip_all, fields(file = %self.current_file))]
    pub fn run(&mut self, program: &Program) -> Result<Value, Rc<Exception>> {
        let globals = Rc::clone(&self.globals);
        let result = self.exec_block(&program.stmts, &globals);
        self.out.flush().ok();
        match result {
            Ok(value) | Err(Unwind::Return(value)) => Ok(value),
            Err(Unwind::Throw(exception)) => Err(exception),
        }
    }

    /// Attach the current stack to an exception raised here
    fn raise(&self, exception: Rc<Exception>) -> Unwind {
        self.call_stack.attach_trace(&exception);
        Unwind::Throw(exception)
    }

    // ============================================
    // Statements
    // ============================================

    fn exec_block(&mut self, block: &[Spanned<Stmt>], env: &EnvRef) -> Flow<Value> {
        let mut last = Value::Null;
        for stmt in block {
            last = self.exec(stmt, env)?;
        }
        Ok(last)
    }

    fn exec(&mut self, stmt: &Spanned<Stmt>, env: &EnvRef) -> Flow<Value> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || self.exec_inner(stmt, env))
    }

    fn exec_inner(&mut self, stmt: &Spanned<Stmt>, env: &EnvRef) -> Flow<Value> {
        match &stmt.node {
            Stmt::Expr(expr) => self.eval(expr, env),

            Stmt::Let { name, value } => {
                let value = self.eval(value, env)?;
                env.borrow_mut().set(name, value);
                Ok(Value::Null)
            }

            Stmt::Assign { name, value } => {
                let value = self.eval(value, env)?;
                env.borrow_mut().set(name, value.clone());
                Ok(value)
            }

            Stmt::FieldAssign {
                target,
                field,
                value,
            } => {
                let target = self.eval(target, env)?;
                let value = self.eval(value, env)?;
                if let Value::Instance(inst) = target {
                    // Fields are fixed by the class; unknown names are ignored
                    inst.borrow_mut().set(field, value.clone());
                }
                Ok(value)
            }

            Stmt::FnDef(def) => {
                let func = Function {
                    def: Rc::clone(def),
                    closure: Rc::clone(env),
                };
                env.borrow_mut().set(&def.name, Value::Function(Rc::new(func)));
                Ok(Value::Null)
            }

            Stmt::ClassDef(def) => {
                let class = self.define_class(def, env);
                env.borrow_mut().set(&def.name, Value::Class(Rc::new(class)));
                Ok(Value::Null)
            }

            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                if self.eval(cond, env)?.is_truthy() {
                    self.exec_block(then_branch, env)
                } else if let Some(else_branch) = else_branch {
                    self.exec_block(else_branch, env)
                } else {
                    Ok(Value::Null)
                }
            }

            Stmt::For {
                var,
                iterable,
                body,
                parallel,
            } => {
                if *parallel {
                    tracing::debug!(line = stmt.line, "parallel for runs sequentially");
                }
                // Only arrays iterate; anything else skips the loop
                if let Value::Array(items) = self.eval(iterable, env)? {
                    for item in items {
                        env.borrow_mut().set(var, item);
                        self.exec_block(body, env)?;
                    }
                }
                Ok(Value::Null)
            }

            Stmt::While { cond, body } => {
                while self.eval(cond, env)?.is_truthy() {
                    self.exec_block(body, env)?;
                }
                Ok(Value::Null)
            }

            Stmt::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr, env)?,
                    None => Value::Null,
                };
                Err(Unwind::Return(value))
            }

            Stmt::Try {
                body,
                catch,
                finally,
            } => self.exec_try(body, catch.as_ref(), finally.as_deref(), env),

            Stmt::Throw(value) => {
                let exception = match self.eval(value, env)? {
                    Value::Exception(exception) => exception,
                    Value::Str(message) => Exception::runtime_error(message),
                    _ => Exception::runtime_error(""),
                };
                Err(self.raise(exception))
            }

            Stmt::Assert { cond, message } => {
                if self.eval(cond, env)?.is_truthy() {
                    return Ok(Value::Null);
                }
                let message = match message {
                    Some(expr) => match self.eval(expr, env)? {
                        Value::Str(s) => s,
                        other => other.to_string(),
                    },
                    None => "Assertion failed".to_string(),
                };
                Err(self.raise(Exception::assertion_error(message)))
            }

            Stmt::Import { module, alias } => {
                let loaded = self.load_module(module)?;
                let name = alias.as_deref().unwrap_or_else(|| binding_name(module));
                env.borrow_mut().set(name, Value::Module(loaded));
                Ok(Value::Null)
            }

            Stmt::FromImport { module, names } => {
                let loaded = self.load_module(module)?;
                for name in names {
                    let exported = loaded.exports.borrow().get(name);
                    match exported {
                        Some(value) => env.borrow_mut().set(name, value),
                        None => eprintln!("Error: Module '{module}' does not export '{name}'"),
                    }
                }
                Ok(Value::Null)
            }

            // Every top-level binding of a module is visible to importers
            Stmt::Export(inner) => {
                self.exec(inner, env)?;
                Ok(Value::Null)
            }
        }
    }

    fn exec_try(
        &mut self,
        body: &Block,
        catch: Option<&CatchClause>,
        finally: Option<&[Spanned<Stmt>]>,
        env: &EnvRef,
    ) -> Flow<Value> {
        let outcome = match self.exec_block(body, env) {
            Err(Unwind::Throw(exception)) => match catch {
                Some(clause) if clause.kind.as_deref().is_none_or(|k| k == exception.kind) => {
                    let scope = child_env(env);
                    if let Some(var) = &clause.var {
                        scope.borrow_mut().set(var, Value::Exception(exception));
                    }
                    self.exec_block(&clause.body, &scope)
                }
                _ => Err(Unwind::Throw(exception)),
            },
            other => other,
        };
        if let Some(finally) = finally {
            self.exec_block(finally, env)?;
        }
        outcome
    }

    /// Flatten inheritance: parent fields first, child methods replace
    /// same-named parent methods in place
    fn define_class(&self, def: &ClassDef, env: &EnvRef) -> Class {
        let parent = def
            .parent
            .as_deref()
            .and_then(|name| lookup_class(name, env));

        let mut fields = parent.as_ref().map(|p| p.fields.clone()).unwrap_or_default();
        fields.extend(def.fields.iter().cloned());

        let mut methods = parent.as_ref().map(|p| p.methods.clone()).unwrap_or_default();
        for method in &def.methods {
            match methods.iter_mut().find(|m| m.name == method.name) {
                Some(slot) => *slot = Rc::clone(method),
                None => methods.push(Rc::clone(method)),
            }
        }

        tracing::debug!(
            class = %def.name,
            parent = ?def.parent,
            fields = fields.len(),
            methods = methods.len(),
            "class defined"
        );
        Class {
            name: def.name.clone(),
            parent: def.parent.clone(),
            fields,
            methods,
        }
    }

    // ============================================
    // Modules
    // ============================================

    /// Directory of the file currently running, for relative imports
    fn base_dir(&self) -> Option<PathBuf> {
        Path::new(&self.current_file)
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    fn load_module(&mut self, name: &str) -> Result<Rc<Module>, Unwind> {
        if let Some(module) = self.modules.get(name) {
            tracing::debug!(module = name, "module cache hit");
            return Ok(module);
        }

        let base_dir = self.base_dir();
        let source = match self.modules.begin(name, base_dir.as_deref()) {
            Ok(source) => source,
            Err(err) => return Err(self.raise(Exception::import_error(err.to_string()))),
        };

        let exports = Environment::new().into_ref();
        let file = source.path.display().to_string();
        let outer_file = std::mem::replace(&mut self.current_file, file);
        let result = self.exec_block(&source.program.stmts, &exports);
        self.current_file = outer_file;

        match result {
            Ok(_) | Err(Unwind::Return(_)) => Ok(self.modules.finish(name, exports)),
            Err(unwind) => {
                self.modules.abandon(name);
                Err(unwind)
            }
        }
    }

    // ============================================
    // Expressions
    // ============================================

    /// Evaluate an expression with automatic stack growth for deep recursion
    fn eval(&mut self, expr: &Spanned<Expr>, env: &EnvRef) -> Flow<Value> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || self.eval_inner(expr, env))
    }

    fn eval_inner(&mut self, expr: &Spanned<Expr>, env: &EnvRef) -> Flow<Value> {
        match &expr.node {
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Bool(b) => Ok(Value::Bool(*b)),

            // Undefined names read as Null
            Expr::Ident(name) => Ok(env.borrow().get(name).unwrap_or(Value::Null)),
            Expr::This => Ok(env.borrow().get(THIS).unwrap_or(Value::Null)),

            Expr::Array(elements) => Ok(Value::Array(self.eval_args(elements, env)?)),

            Expr::Dict(entries) => {
                let mut dict = Dict::new();
                for (key, value) in entries {
                    let value = self.eval(value, env)?;
                    dict.insert(key.clone(), value);
                }
                Ok(Value::Dict(dict))
            }

            Expr::Matrix { rows, cols, cells } => {
                let mut data = Vec::with_capacity(cells.len());
                for cell in cells {
                    data.push(self.eval(cell, env)?.as_number().unwrap_or(0.0));
                }
                let matrix = Matrix::new(*rows, *cols, data).unwrap_or_else(|| Matrix::zeros(*rows, *cols));
                Ok(Value::Matrix(matrix))
            }

            Expr::Binary { left, op, right } => {
                let left = self.eval(left, env)?;
                let right = self.eval(right, env)?;
                ops::binary(*op, &left, &right).map_err(|e| self.raise(e))
            }

            Expr::Unary { op, expr } => {
                let operand = self.eval(expr, env)?;
                Ok(ops::unary(*op, &operand))
            }

            Expr::Call { func, args } => self.eval_call(func, args, expr.line, env),

            Expr::Index { target, index } => {
                let target = self.eval(target, env)?;
                let index = self.eval(index, env)?;
                self.eval_index(target, index)
            }

            Expr::Field { target, name } => match self.eval(target, env)? {
                Value::Module(module) => {
                    let exported = module.exports.borrow().get(name);
                    Ok(exported.unwrap_or_else(|| {
                        eprintln!("Error: Module '{}' has no export '{}'", module.name, name);
                        Value::Null
                    }))
                }
                Value::Instance(inst) => Ok(inst.borrow().get(name).cloned().unwrap_or(Value::Null)),
                _ => Ok(Value::Null),
            },

            Expr::MethodCall {
                receiver,
                method,
                args,
            } => {
                let receiver = self.eval(receiver, env)?;
                let args = self.eval_args(args, env)?;
                self.eval_method_call(receiver, method, args, expr.line, env)
            }

            Expr::New { class, args } => {
                let Some(class) = lookup_class(class, env) else {
                    return Ok(Value::Null);
                };
                let args = self.eval_args(args, env)?;
                let instance = Value::Instance(Rc::new(RefCell::new(Instance::new(&class))));
                if let Some(constructor) = class.method(CONSTRUCTOR) {
                    let constructor = Rc::clone(constructor);
                    self.invoke_method(&instance, &constructor, args, expr.line, env)?;
                }
                Ok(instance)
            }

            Expr::SuperCall { method, args } => {
                let this = env.borrow().get(THIS);
                let Some(Value::Instance(inst)) = &this else {
                    return Ok(Value::Null);
                };
                let parent_name = inst.borrow().parent.clone();
                let parent = parent_name.and_then(|name| lookup_class(&name, &self.globals));
                let Some(method) = parent.as_ref().and_then(|p| p.method(method)).cloned() else {
                    return Ok(Value::Null);
                };
                let args = self.eval_args(args, env)?;
                let this = Value::Instance(Rc::clone(inst));
                Ok(self.invoke_method(&this, &method, args, expr.line, env)?)
            }
        }
    }

    fn eval_args(&mut self, args: &[Spanned<Expr>], env: &EnvRef) -> Flow<Vec<Value>> {
        args.iter().map(|arg| self.eval(arg, env)).collect()
    }

    fn eval_index(&self, target: Value, index: Value) -> Flow<Value> {
        match (&target, &index) {
            (Value::Array(items), Value::Number(n)) => {
                let i = n.trunc() as i64;
                usize::try_from(i)
                    .ok()
                    .and_then(|i| items.get(i))
                    .cloned()
                    .ok_or_else(|| self.raise(Exception::index_error(format!("list index out of range: {i}"))))
            }
            (Value::Dict(dict), Value::Str(key)) => dict
                .get(key)
                .cloned()
                .ok_or_else(|| self.raise(Exception::key_error(key))),
            (Value::Matrix(matrix), Value::Number(n)) => {
                let i = n.trunc() as i64;
                usize::try_from(i)
                    .ok()
                    .and_then(|i| matrix.row(i))
                    .map(|row| Value::Array(row.iter().map(|x| Value::Number(*x)).collect()))
                    .ok_or_else(|| {
                        self.raise(Exception::index_error(format!("matrix row index out of range: {i}")))
                    })
            }
            _ => Ok(Value::Null),
        }
    }

    fn eval_method_call(
        &mut self,
        receiver: Value,
        method: &str,
        args: Vec<Value>,
        line: usize,
        env: &EnvRef,
    ) -> Flow<Value> {
        match &receiver {
            Value::Module(module) => {
                let exported = module.exports.borrow().get(method);
                match exported {
                    Some(Value::Function(func)) => Ok(self.call_function(&func, args, line)?),
                    _ => {
                        eprintln!("Error: Module '{}' has no function '{}'", module.name, method);
                        Ok(Value::Null)
                    }
                }
            }
            Value::Instance(inst) => {
                let class_name = inst.borrow().class_name.clone();
                let found = lookup_class(&class_name, env)
                    .or_else(|| lookup_class(&class_name, &self.globals))
                    .and_then(|class| class.method(method).cloned());
                match found {
                    Some(def) => Ok(self.invoke_method(&receiver, &def, args, line, env)?),
                    None => Ok(Value::Null),
                }
            }
            _ => Ok(value_method(&receiver, method, args.as_slice())),
        }
    }

    // ============================================
    // Calls
    // ============================================

    fn eval_call(&mut self, name: &str, args: &[Spanned<Expr>], line: usize, env: &EnvRef) -> Flow<Value> {
        if let Some(builtin) = Builtin::from_name(name) {
            let args = self.eval_args(args, env)?;
            return self.call_builtin(builtin, args, line);
        }

        let callee = env.borrow().get(name);
        match callee {
            Some(Value::Function(func)) => {
                let args = self.eval_args(args, env)?;
                Ok(self.call_function(&func, args, line)?)
            }
            // Calling anything else is a silent no-op
            _ => Ok(Value::Null),
        }
    }

    fn call_builtin(&mut self, builtin: Builtin, args: Vec<Value>, line: usize) -> Flow<Value> {
        match (builtin, args.as_slice()) {
            (Builtin::Print, _) => {
                let text = args.iter().map(Value::to_string).collect::<Vec<_>>().join(" ");
                writeln!(self.out, "{text}")
                    .map_err(|e| self.raise(Exception::runtime_error(format!("cannot write output: {e}"))))?;
                Ok(Value::Null)
            }
            (Builtin::Map, [Value::Function(f), Value::Array(items), ..]) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.call_function(f, vec![item.clone()], line)?);
                }
                Ok(Value::Array(out))
            }
            (Builtin::Filter, [Value::Function(f), Value::Array(items), ..]) => {
                let mut out = Vec::new();
                for item in items {
                    if self.call_function(f, vec![item.clone()], line)?.is_truthy() {
                        out.push(item.clone());
                    }
                }
                Ok(Value::Array(out))
            }
            (Builtin::Reduce, [Value::Function(f), Value::Array(items), init, ..]) => {
                let mut acc = init.clone();
                for item in items {
                    acc = self.call_function(f, vec![acc, item.clone()], line)?;
                }
                Ok(acc)
            }
            (builtin, args) => builtin
                .call_pure(args)
                .unwrap_or(Ok(Value::Null))
                .map_err(|e| self.raise(e)),
        }
    }

    /// Call a user-defined function with automatic stack growth
    pub fn call_function(&mut self, func: &Function, args: Vec<Value>, line: usize) -> Result<Value, Rc<Exception>> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || {
            self.call_function_inner(func, args, line)
        })
    }

    fn call_function_inner(&mut self, func: &Function, args: Vec<Value>, line: usize) -> Result<Value, Rc<Exception>> {
        self.call_stack.push(&func.def.name, &self.current_file, line)?;

        // Lexical scoping: the body sees the scope the function was defined in
        let scope = child_env(&func.closure);
        bind_params(&scope, &func.def.params, args);

        let result = self.exec_body(&func.def.body, &scope);
        self.call_stack.pop();
        result
    }

    /// Run a method or constructor with `this` bound, in a scope chained to
    /// the caller's
    fn invoke_method(
        &mut self,
        this: &Value,
        method: &Rc<FnDef>,
        args: Vec<Value>,
        line: usize,
        caller: &EnvRef,
    ) -> Result<Value, Rc<Exception>> {
        self.call_stack.push(&method.name, &self.current_file, line)?;

        let scope = child_env(caller);
        scope.borrow_mut().set(THIS, this.clone());
        bind_params(&scope, &method.params, args);

        let result = stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || {
            self.exec_body(&method.body, &scope)
        });
        self.call_stack.pop();
        result
    }

    /// Function boundary: `return` stops here, exceptions keep going
    fn exec_body(&mut self, body: &Block, scope: &EnvRef) -> Result<Value, Rc<Exception>> {
        match self.exec_block(body, scope) {
            Ok(value) | Err(Unwind::Return(value)) => Ok(value),
            Err(Unwind::Throw(exception)) => Err(exception),
        }
    }
}

/// Bind arguments positionally; missing ones are Null, extras are dropped
fn bind_params(scope: &EnvRef, params: &[String], args: Vec<Value>) {
    let mut args = args.into_iter();
    let mut scope = scope.borrow_mut();
    for param in params {
        scope.set(param, args.next().unwrap_or(Value::Null));
    }
}

fn lookup_class(name: &str, env: &EnvRef) -> Option<Rc<Class>> {
    match env.borrow().get(name) {
        Some(Value::Class(class)) => Some(class),
        _ => None,
    }
}
