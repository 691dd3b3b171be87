//! Tree-walking evaluator with hard resource enforcement.
//!
//! The interpreter is capability-closed: submitted code can compute, build
//! collections and write to the injected output buffer, nothing else. Three
//! budgets are enforced inline so non-cooperative code is still terminated:
//! a deadline/kill flag checked every fixed number of evaluation steps, an
//! approximate heap-byte budget charged on every allocating construction,
//! and a call-depth cap. Every fault funnels into a [`ClassifiedError`];
//! evaluation never panics on user input.

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::core_types::{ClassifiedError, ErrorCategory};
use crate::interp::ast::{BinOp, Block, Expr, FnDef, Program, Stmt, UnaryOp};
use crate::interp::parser::{parse, ParseError};
use crate::interp::value::Value;

/// How often the deadline and kill flag are consulted, in evaluation steps.
const TICK_INTERVAL: u64 = 1024;

/// Builtin functions; user code may not redefine these.
const BUILTINS: &[&str] = &[
    "output", "len", "str", "abs", "min", "max", "append", "contains", "keys", "range", "upper",
    "lower", "trim",
];

/// Hard limits for one evaluation. The kill flag is shared with the caller
/// so a timed-out worker can be told to stop even mid-loop.
#[derive(Debug, Clone)]
pub struct ExecLimits {
    pub deadline: Instant,
    pub kill: Arc<AtomicBool>,
    pub memory_ceiling_bytes: usize,
    pub max_call_depth: usize,
    pub output_limit_bytes: usize,
}

/// Parse, analyze and evaluate one standalone program. Returns the outcome
/// together with whatever output was buffered up to the fault point.
pub fn run_program(
    source: &str,
    limits: ExecLimits,
    capture_output: bool,
) -> (Result<Value, ClassifiedError>, String) {
    let program = match parse(source) {
        Ok(program) => program,
        Err(err) => return (Err(syntax_error(err)), String::new()),
    };
    if let Err(err) = analyze(&program) {
        return (Err(err), String::new());
    }
    Interpreter::new(limits, capture_output).run(&program)
}

fn syntax_error(err: ParseError) -> ClassifiedError {
    ClassifiedError::new(
        ErrorCategory::Syntax,
        format!("line {}: {}", err.line, err.message),
    )
}

/// Static checks that run after parsing and before evaluation. These are the
/// failures reported as compile errors rather than runtime faults.
fn analyze(program: &Program) -> Result<(), ClassifiedError> {
    let mut seen = HashMap::new();
    for stmt in &program.stmts {
        if let Stmt::FnDef(def) = stmt {
            if BUILTINS.contains(&def.name.as_str()) {
                return Err(compile_error(format!(
                    "line {}: cannot redefine builtin function `{}`",
                    def.line, def.name
                )));
            }
            if seen.insert(def.name.clone(), def.line).is_some() {
                return Err(compile_error(format!(
                    "line {}: function `{}` is defined more than once",
                    def.line, def.name
                )));
            }
            let mut params = HashMap::new();
            for param in &def.params {
                if params.insert(param.clone(), ()).is_some() {
                    return Err(compile_error(format!(
                        "line {}: duplicate parameter `{}` in function `{}`",
                        def.line, param, def.name
                    )));
                }
            }
            check_no_nested_fn(&def.body)?;
        } else {
            check_stmt(stmt)?;
        }
    }
    Ok(())
}

fn compile_error(message: String) -> ClassifiedError {
    ClassifiedError::new(ErrorCategory::Compile, message)
}

fn check_stmt(stmt: &Stmt) -> Result<(), ClassifiedError> {
    match stmt {
        Stmt::FnDef(def) => Err(compile_error(format!(
            "line {}: function definitions are only allowed at the top level",
            def.line
        ))),
        Stmt::Let { expr, .. } | Stmt::Assign { expr, .. } | Stmt::Expr(expr) => check_expr(expr),
    }
}

fn check_no_nested_fn(block: &Block) -> Result<(), ClassifiedError> {
    for stmt in &block.0 {
        check_stmt(stmt)?;
    }
    Ok(())
}

fn check_expr(expr: &Expr) -> Result<(), ClassifiedError> {
    match expr {
        Expr::Literal(_) | Expr::Var(_) => Ok(()),
        Expr::ListLit(items) | Expr::TupleLit(items) => {
            items.iter().try_for_each(check_expr)
        }
        Expr::MapLit(entries) => entries.iter().try_for_each(|(_, e)| check_expr(e)),
        Expr::Unary { expr, .. } => check_expr(expr),
        Expr::Binary { lhs, rhs, .. } => {
            check_expr(lhs)?;
            check_expr(rhs)
        }
        Expr::Call { args, .. } => args.iter().try_for_each(check_expr),
        Expr::If {
            cond,
            then_block,
            else_block,
        } => {
            check_expr(cond)?;
            check_no_nested_fn(then_block)?;
            if let Some(block) = else_block {
                check_no_nested_fn(block)?;
            }
            Ok(())
        }
        Expr::While { cond, body } => {
            check_expr(cond)?;
            check_no_nested_fn(body)
        }
    }
}

/// One call frame: a stack of lexical scopes. Functions do not close over
/// caller locals; a call starts a fresh frame holding only its parameters.
struct Frame {
    scopes: Vec<HashMap<String, Value>>,
}

struct Interpreter {
    functions: HashMap<String, Rc<FnDef>>,
    frames: Vec<Frame>,
    output: String,
    capture: bool,
    limits: ExecLimits,
    mem_used: usize,
    steps: u64,
}

impl Interpreter {
    fn new(limits: ExecLimits, capture: bool) -> Self {
        Self {
            functions: HashMap::new(),
            frames: vec![Frame {
                scopes: vec![HashMap::new()],
            }],
            output: String::new(),
            capture,
            limits,
            mem_used: 0,
            steps: 0,
        }
    }

    fn run(mut self, program: &Program) -> (Result<Value, ClassifiedError>, String) {
        let result = self.exec_program(program);
        (result, self.output)
    }

    fn exec_program(&mut self, program: &Program) -> Result<Value, ClassifiedError> {
        // Hoist function definitions so earlier statements can call them.
        for stmt in &program.stmts {
            if let Stmt::FnDef(def) = stmt {
                self.functions
                    .insert(def.name.clone(), Rc::new(def.clone()));
            }
        }
        let mut last = Value::Nil;
        for stmt in &program.stmts {
            last = self.eval_stmt(stmt)?;
        }
        Ok(last)
    }

    fn tick(&mut self) -> Result<(), ClassifiedError> {
        self.steps += 1;
        if self.steps % TICK_INTERVAL == 0
            && (self.limits.kill.load(Ordering::Relaxed)
                || Instant::now() >= self.limits.deadline)
        {
            return Err(ClassifiedError::new(
                ErrorCategory::Timeout,
                "execution time limit exceeded",
            ));
        }
        Ok(())
    }

    fn charge(&mut self, bytes: usize) -> Result<(), ClassifiedError> {
        self.mem_used = self.mem_used.saturating_add(bytes);
        if self.mem_used > self.limits.memory_ceiling_bytes {
            Err(ClassifiedError::new(
                ErrorCategory::ResourceExceeded,
                "memory ceiling reached",
            ))
        } else {
            Ok(())
        }
    }

    fn write_output(&mut self, text: &str) -> Result<(), ClassifiedError> {
        if !self.capture {
            return Ok(());
        }
        if self.output.len() + text.len() > self.limits.output_limit_bytes {
            return Err(ClassifiedError::new(
                ErrorCategory::ResourceExceeded,
                "output limit reached",
            ));
        }
        self.output.push_str(text);
        Ok(())
    }

    fn current_frame_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("at least one frame")
    }

    fn eval_stmt(&mut self, stmt: &Stmt) -> Result<Value, ClassifiedError> {
        match stmt {
            Stmt::Let { name, expr } => {
                let value = self.eval_expr(expr)?;
                self.current_frame_mut()
                    .scopes
                    .last_mut()
                    .expect("at least one scope")
                    .insert(name.clone(), value);
                Ok(Value::Nil)
            }
            Stmt::Assign { name, expr } => {
                let value = self.eval_expr(expr)?;
                let frame = self.current_frame_mut();
                for scope in frame.scopes.iter_mut().rev() {
                    if let Some(slot) = scope.get_mut(name) {
                        *slot = value;
                        return Ok(Value::Nil);
                    }
                }
                Err(ClassifiedError::new(
                    ErrorCategory::UndefinedOperation,
                    format!(
                        "assignment to undefined variable `{}` (use `let` to declare it)",
                        name
                    ),
                ))
            }
            Stmt::FnDef(_) => Ok(Value::Nil),
            Stmt::Expr(expr) => self.eval_expr(expr),
        }
    }

    fn eval_expr(&mut self, expr: &Expr) -> Result<Value, ClassifiedError> {
        self.tick()?;
        match expr {
            Expr::Literal(value) => {
                if let Value::Text(s) = value {
                    self.charge(24 + s.len())?;
                }
                Ok(value.clone())
            }
            Expr::ListLit(items) => {
                let values = self.eval_all(items)?;
                let list = Value::List(values);
                self.charge(list.shallow_bytes())?;
                Ok(list)
            }
            Expr::TupleLit(items) => {
                let values = self.eval_all(items)?;
                let tuple = Value::Tuple(values);
                self.charge(tuple.shallow_bytes())?;
                Ok(tuple)
            }
            Expr::MapLit(entries) => {
                let mut values = Vec::with_capacity(entries.len());
                for (key, expr) in entries {
                    values.push((key.clone(), self.eval_expr(expr)?));
                }
                let map = Value::Map(values);
                self.charge(map.shallow_bytes())?;
                Ok(map)
            }
            Expr::Var(name) => self.lookup(name),
            Expr::Unary { op, expr } => {
                let value = self.eval_expr(expr)?;
                self.apply_unary(*op, value)
            }
            Expr::Binary { op, lhs, rhs } => match op {
                BinOp::And => {
                    let lhs = self.eval_expr(lhs)?;
                    if lhs.is_truthy() {
                        self.eval_expr(rhs)
                    } else {
                        Ok(lhs)
                    }
                }
                BinOp::Or => {
                    let lhs = self.eval_expr(lhs)?;
                    if lhs.is_truthy() {
                        Ok(lhs)
                    } else {
                        self.eval_expr(rhs)
                    }
                }
                _ => {
                    let lhs = self.eval_expr(lhs)?;
                    let rhs = self.eval_expr(rhs)?;
                    self.apply_binop(*op, lhs, rhs)
                }
            },
            Expr::Call { name, args } => {
                let values = self.eval_all(args)?;
                if let Some(def) = self.functions.get(name).cloned() {
                    self.call_user(&def, values)
                } else if BUILTINS.contains(&name.as_str()) {
                    self.call_builtin(name, values)
                } else {
                    Err(ClassifiedError::new(
                        ErrorCategory::UndefinedOperation,
                        format!("undefined function `{}`", name),
                    ))
                }
            }
            Expr::If {
                cond,
                then_block,
                else_block,
            } => {
                if self.eval_expr(cond)?.is_truthy() {
                    self.eval_block(then_block)
                } else if let Some(block) = else_block {
                    self.eval_block(block)
                } else {
                    Ok(Value::Nil)
                }
            }
            Expr::While { cond, body } => {
                while self.eval_expr(cond)?.is_truthy() {
                    self.eval_block(body)?;
                }
                Ok(Value::Nil)
            }
        }
    }

    fn eval_all(&mut self, exprs: &[Expr]) -> Result<Vec<Value>, ClassifiedError> {
        let mut values = Vec::with_capacity(exprs.len());
        for expr in exprs {
            values.push(self.eval_expr(expr)?);
        }
        Ok(values)
    }

    fn eval_block(&mut self, block: &Block) -> Result<Value, ClassifiedError> {
        self.current_frame_mut().scopes.push(HashMap::new());
        let result = self.eval_block_inner(block);
        self.current_frame_mut().scopes.pop();
        result
    }

    fn eval_block_inner(&mut self, block: &Block) -> Result<Value, ClassifiedError> {
        let mut last = Value::Nil;
        for stmt in &block.0 {
            last = self.eval_stmt(stmt)?;
        }
        Ok(last)
    }

    fn lookup(&mut self, name: &str) -> Result<Value, ClassifiedError> {
        let found = {
            let frame = self.frames.last().expect("at least one frame");
            frame
                .scopes
                .iter()
                .rev()
                .find_map(|scope| scope.get(name).cloned())
        };
        match found {
            Some(value) => {
                // A read duplicates the bound value, so aliasing a large
                // collection costs the same as constructing it again.
                // Scalars are copied in place and stay free.
                if !matches!(
                    value,
                    Value::Nil | Value::Bool(_) | Value::Int(_) | Value::Float(_)
                ) {
                    self.charge(value.deep_bytes())?;
                }
                Ok(value)
            }
            None => Err(ClassifiedError::new(
                ErrorCategory::UndefinedOperation,
                format!("undefined variable `{}`", name),
            )),
        }
    }

    fn call_user(&mut self, def: &FnDef, args: Vec<Value>) -> Result<Value, ClassifiedError> {
        if args.len() != def.params.len() {
            return Err(ClassifiedError::new(
                ErrorCategory::FunctionMismatch,
                format!(
                    "function `{}` expects {} argument{}, got {}",
                    def.name,
                    def.params.len(),
                    if def.params.len() == 1 { "" } else { "s" },
                    args.len()
                ),
            ));
        }
        if self.frames.len() >= self.limits.max_call_depth {
            return Err(ClassifiedError::new(
                ErrorCategory::ResourceExceeded,
                "call depth limit reached",
            ));
        }
        let mut locals = HashMap::new();
        for (param, value) in def.params.iter().zip(args) {
            locals.insert(param.clone(), value);
        }
        self.frames.push(Frame {
            scopes: vec![locals],
        });
        let result = self.eval_block_inner(&def.body);
        self.frames.pop();
        result
    }

    fn apply_unary(&mut self, op: UnaryOp, value: Value) -> Result<Value, ClassifiedError> {
        match op {
            UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
            UnaryOp::Neg => match value {
                Value::Int(n) => n.checked_neg().map(Value::Int).ok_or_else(|| {
                    ClassifiedError::new(ErrorCategory::Arithmetic, "integer overflow in negation")
                }),
                Value::Float(x) => Ok(Value::Float(-x)),
                other => Err(ClassifiedError::new(
                    ErrorCategory::Argument,
                    format!("cannot negate {}", other.type_name()),
                )),
            },
        }
    }

    fn apply_binop(&mut self, op: BinOp, lhs: Value, rhs: Value) -> Result<Value, ClassifiedError> {
        match op {
            BinOp::Eq => Ok(Value::Bool(values_equal(&lhs, &rhs))),
            BinOp::NotEq => Ok(Value::Bool(!values_equal(&lhs, &rhs))),
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => self.compare(op, lhs, rhs),
            BinOp::Add => self.add(lhs, rhs),
            BinOp::Sub => self.numeric_op(op, lhs, rhs),
            BinOp::Mul => self.numeric_op(op, lhs, rhs),
            BinOp::Div => self.divide(lhs, rhs),
            BinOp::Rem => self.remainder(lhs, rhs),
            BinOp::And | BinOp::Or => unreachable!("short-circuit ops handled in eval_expr"),
        }
    }

    fn compare(&self, op: BinOp, lhs: Value, rhs: Value) -> Result<Value, ClassifiedError> {
        let ordering = match (&lhs, &rhs) {
            (Value::Text(a), Value::Text(b)) => a.partial_cmp(b),
            _ => match as_numeric_pair(&lhs, &rhs) {
                Some((a, b)) => a.partial_cmp(&b),
                None => {
                    return Err(ClassifiedError::new(
                        ErrorCategory::Argument,
                        format!(
                            "cannot compare {} and {} with `{}`",
                            lhs.type_name(),
                            rhs.type_name(),
                            op.symbol()
                        ),
                    ))
                }
            },
        };
        let result = match (op, ordering) {
            (_, None) => false,
            (BinOp::Lt, Some(ord)) => ord.is_lt(),
            (BinOp::Le, Some(ord)) => ord.is_le(),
            (BinOp::Gt, Some(ord)) => ord.is_gt(),
            (BinOp::Ge, Some(ord)) => ord.is_ge(),
            _ => unreachable!("compare only receives ordering operators"),
        };
        Ok(Value::Bool(result))
    }

    fn add(&mut self, lhs: Value, rhs: Value) -> Result<Value, ClassifiedError> {
        match (lhs, rhs) {
            (Value::Int(a), Value::Int(b)) => a.checked_add(b).map(Value::Int).ok_or_else(|| {
                ClassifiedError::new(ErrorCategory::Arithmetic, "integer overflow in `+`")
            }),
            (Value::Text(a), Value::Text(b)) => {
                self.charge(24 + a.len() + b.len())?;
                Ok(Value::Text(a + &b))
            }
            (Value::List(mut a), Value::List(b)) => {
                self.charge(24 + 16 * (a.len() + b.len()))?;
                a.extend(b);
                Ok(Value::List(a))
            }
            (lhs, rhs) => match as_numeric_pair(&lhs, &rhs) {
                Some((a, b)) => Ok(Value::Float(a + b)),
                None => Err(ClassifiedError::new(
                    ErrorCategory::Argument,
                    format!(
                        "cannot apply `+` to {} and {}",
                        lhs.type_name(),
                        rhs.type_name()
                    ),
                )),
            },
        }
    }

    fn numeric_op(&self, op: BinOp, lhs: Value, rhs: Value) -> Result<Value, ClassifiedError> {
        match (&lhs, &rhs) {
            (Value::Int(a), Value::Int(b)) => {
                let result = match op {
                    BinOp::Sub => a.checked_sub(*b),
                    BinOp::Mul => a.checked_mul(*b),
                    _ => unreachable!("numeric_op only receives `-` and `*`"),
                };
                result.map(Value::Int).ok_or_else(|| {
                    ClassifiedError::new(
                        ErrorCategory::Arithmetic,
                        format!("integer overflow in `{}`", op.symbol()),
                    )
                })
            }
            _ => match as_numeric_pair(&lhs, &rhs) {
                Some((a, b)) => {
                    let result = match op {
                        BinOp::Sub => a - b,
                        BinOp::Mul => a * b,
                        _ => unreachable!("numeric_op only receives `-` and `*`"),
                    };
                    Ok(Value::Float(result))
                }
                None => Err(ClassifiedError::new(
                    ErrorCategory::Argument,
                    format!(
                        "cannot apply `{}` to {} and {}",
                        op.symbol(),
                        lhs.type_name(),
                        rhs.type_name()
                    ),
                )),
            },
        }
    }

    fn divide(&self, lhs: Value, rhs: Value) -> Result<Value, ClassifiedError> {
        match (&lhs, &rhs) {
            (Value::Int(a), Value::Int(b)) => {
                if *b == 0 {
                    return Err(ClassifiedError::new(
                        ErrorCategory::Arithmetic,
                        "division by zero",
                    ));
                }
                a.checked_div(*b).map(Value::Int).ok_or_else(|| {
                    ClassifiedError::new(ErrorCategory::Arithmetic, "integer overflow in `/`")
                })
            }
            _ => match as_numeric_pair(&lhs, &rhs) {
                Some((_, b)) if b == 0.0 => Err(ClassifiedError::new(
                    ErrorCategory::Arithmetic,
                    "division by zero",
                )),
                Some((a, b)) => Ok(Value::Float(a / b)),
                None => Err(ClassifiedError::new(
                    ErrorCategory::Argument,
                    format!(
                        "cannot apply `/` to {} and {}",
                        lhs.type_name(),
                        rhs.type_name()
                    ),
                )),
            },
        }
    }

    fn remainder(&self, lhs: Value, rhs: Value) -> Result<Value, ClassifiedError> {
        match (&lhs, &rhs) {
            (Value::Int(a), Value::Int(b)) => {
                if *b == 0 {
                    return Err(ClassifiedError::new(
                        ErrorCategory::Arithmetic,
                        "modulo by zero",
                    ));
                }
                a.checked_rem(*b).map(Value::Int).ok_or_else(|| {
                    ClassifiedError::new(ErrorCategory::Arithmetic, "integer overflow in `%`")
                })
            }
            _ => Err(ClassifiedError::new(
                ErrorCategory::Argument,
                format!(
                    "`%` expects integers, got {} and {}",
                    lhs.type_name(),
                    rhs.type_name()
                ),
            )),
        }
    }

    fn call_builtin(&mut self, name: &str, args: Vec<Value>) -> Result<Value, ClassifiedError> {
        match name {
            "output" => {
                let [value] = expect_args::<1>(name, args)?;
                let mut line = value.to_string();
                line.push('\n');
                self.write_output(&line)?;
                Ok(Value::Nil)
            }
            "len" => {
                let [value] = expect_args::<1>(name, args)?;
                let len = match &value {
                    Value::Text(s) => s.chars().count(),
                    Value::List(items) | Value::Tuple(items) => items.len(),
                    Value::Map(entries) => entries.len(),
                    other => {
                        return Err(argument_error(format!(
                            "`len` expects text or a collection, got {}",
                            other.type_name()
                        )))
                    }
                };
                Ok(Value::Int(len as i64))
            }
            "str" => {
                let [value] = expect_args::<1>(name, args)?;
                let text = value.to_string();
                self.charge(24 + text.len())?;
                Ok(Value::Text(text))
            }
            "abs" => {
                let [value] = expect_args::<1>(name, args)?;
                match value {
                    Value::Int(n) => n.checked_abs().map(Value::Int).ok_or_else(|| {
                        ClassifiedError::new(
                            ErrorCategory::Arithmetic,
                            "integer overflow in `abs`",
                        )
                    }),
                    Value::Float(x) => Ok(Value::Float(x.abs())),
                    other => Err(argument_error(format!(
                        "`abs` expects a number, got {}",
                        other.type_name()
                    ))),
                }
            }
            "min" | "max" => {
                let [a, b] = expect_args::<2>(name, args)?;
                let a_wins = match (&a, &b) {
                    (Value::Text(x), Value::Text(y)) => {
                        if name == "min" {
                            x <= y
                        } else {
                            x >= y
                        }
                    }
                    _ => match as_numeric_pair(&a, &b) {
                        Some((x, y)) => {
                            if name == "min" {
                                x <= y
                            } else {
                                x >= y
                            }
                        }
                        None => {
                            return Err(argument_error(format!(
                                "`{}` expects two numbers or two texts, got {} and {}",
                                name,
                                a.type_name(),
                                b.type_name()
                            )))
                        }
                    },
                };
                Ok(if a_wins { a } else { b })
            }
            "append" => {
                let [list, item] = expect_args::<2>(name, args)?;
                match list {
                    Value::List(mut items) => {
                        self.charge(24 + 16 * (items.len() + 1))?;
                        items.push(item);
                        Ok(Value::List(items))
                    }
                    other => Err(argument_error(format!(
                        "`append` expects a list, got {}",
                        other.type_name()
                    ))),
                }
            }
            "contains" => {
                let [container, needle] = expect_args::<2>(name, args)?;
                match (&container, &needle) {
                    (Value::List(items), _) | (Value::Tuple(items), _) => {
                        Ok(Value::Bool(items.iter().any(|v| values_equal(v, &needle))))
                    }
                    (Value::Text(haystack), Value::Text(sub)) => {
                        Ok(Value::Bool(haystack.contains(sub.as_str())))
                    }
                    (Value::Map(entries), Value::Text(key)) => {
                        Ok(Value::Bool(entries.iter().any(|(k, _)| k == key)))
                    }
                    _ => Err(argument_error(format!(
                        "`contains` cannot search {} for {}",
                        container.type_name(),
                        needle.type_name()
                    ))),
                }
            }
            "keys" => {
                let [value] = expect_args::<1>(name, args)?;
                match value {
                    Value::Map(entries) => {
                        let keys: Vec<Value> = entries
                            .iter()
                            .map(|(k, _)| Value::Text(k.clone()))
                            .collect();
                        let total: usize = keys.iter().map(|k| k.shallow_bytes()).sum();
                        self.charge(24 + 16 * keys.len() + total)?;
                        Ok(Value::List(keys))
                    }
                    other => Err(argument_error(format!(
                        "`keys` expects a map, got {}",
                        other.type_name()
                    ))),
                }
            }
            "range" => {
                let [value] = expect_args::<1>(name, args)?;
                match value {
                    Value::Int(n) if n >= 0 => {
                        let count = usize::try_from(n).unwrap_or(usize::MAX);
                        // Charge before allocating so absurd requests fault
                        // without touching the allocator.
                        self.charge(24usize.saturating_add(16usize.saturating_mul(count)))?;
                        Ok(Value::List((0..n).map(Value::Int).collect()))
                    }
                    Value::Int(_) => Err(argument_error(
                        "`range` expects a non-negative integer".to_string(),
                    )),
                    other => Err(argument_error(format!(
                        "`range` expects an integer, got {}",
                        other.type_name()
                    ))),
                }
            }
            "upper" | "lower" | "trim" => {
                let [value] = expect_args::<1>(name, args)?;
                match value {
                    Value::Text(s) => {
                        let text = match name {
                            "upper" => s.to_uppercase(),
                            "lower" => s.to_lowercase(),
                            _ => s.trim().to_string(),
                        };
                        self.charge(24 + text.len())?;
                        Ok(Value::Text(text))
                    }
                    other => Err(argument_error(format!(
                        "`{}` expects text, got {}",
                        name,
                        other.type_name()
                    ))),
                }
            }
            _ => unreachable!("call_builtin only receives names from BUILTINS"),
        }
    }
}

fn argument_error(message: String) -> ClassifiedError {
    ClassifiedError::new(ErrorCategory::Argument, message)
}

fn expect_args<const N: usize>(
    name: &str,
    args: Vec<Value>,
) -> Result<[Value; N], ClassifiedError> {
    let got = args.len();
    args.try_into().map_err(|_| {
        argument_error(format!(
            "`{}` expects {} argument{}, got {}",
            name,
            N,
            if N == 1 { "" } else { "s" },
            got
        ))
    })
}

fn as_numeric_pair(lhs: &Value, rhs: &Value) -> Option<(f64, f64)> {
    let coerce = |v: &Value| match v {
        Value::Int(n) => Some(*n as f64),
        Value::Float(x) => Some(*x),
        _ => None,
    };
    Some((coerce(lhs)?, coerce(rhs)?))
}

/// Equality with numeric coercion: `1 == 1.0` holds, everything else uses
/// structural equality.
fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    match as_numeric_pair(lhs, rhs) {
        Some((a, b)) => a == b,
        None => lhs == rhs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn limits() -> ExecLimits {
        ExecLimits {
            deadline: Instant::now() + Duration::from_secs(5),
            kill: Arc::new(AtomicBool::new(false)),
            memory_ceiling_bytes: 16 * 1024 * 1024,
            max_call_depth: 64,
            output_limit_bytes: 64 * 1024,
        }
    }

    fn run(source: &str) -> (Result<Value, ClassifiedError>, String) {
        run_program(source, limits(), true)
    }

    fn value_of(source: &str) -> Value {
        let (result, _) = run(source);
        result.unwrap()
    }

    fn error_of(source: &str) -> ClassifiedError {
        let (result, _) = run(source);
        result.unwrap_err()
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(value_of("1 + 1"), Value::Int(2));
        assert_eq!(value_of("7 / 2"), Value::Int(3));
        assert_eq!(value_of("7.0 / 2"), Value::Float(3.5));
        assert_eq!(value_of("10 % 3"), Value::Int(1));
        assert_eq!(value_of("-(2 + 3)"), Value::Int(-5));
    }

    #[test]
    fn test_empty_program_is_nil() {
        assert_eq!(value_of(""), Value::Nil);
    }

    #[test]
    fn test_variables_and_blocks() {
        assert_eq!(value_of("let x = 2\nlet y = 3\nx * y"), Value::Int(6));
        assert_eq!(
            value_of("let x = 0\nwhile x < 5 { x = x + 1 }\nx"),
            Value::Int(5)
        );
    }

    #[test]
    fn test_if_is_an_expression() {
        assert_eq!(value_of("if 2 > 1 { \"yes\" } else { \"no\" }"), Value::Text("yes".into()));
        assert_eq!(value_of("if false { 1 }"), Value::Nil);
    }

    #[test]
    fn test_user_functions() {
        assert_eq!(value_of("fn add(a, b) { a + b }\nadd(2, 3)"), Value::Int(5));
        // Forward calls work because definitions are hoisted.
        assert_eq!(value_of("let r = double(4)\nfn double(x) { x * 2 }\nr"), Value::Int(8));
    }

    #[test]
    fn test_recursion() {
        let source = "fn fact(n) { if n <= 1 { 1 } else { n * fact(n - 1) } }\nfact(10)";
        assert_eq!(value_of(source), Value::Int(3_628_800));
    }

    #[test]
    fn test_output_capture() {
        let (result, output) = run("output(\"Hello\")\noutput(1 + 1)");
        assert_eq!(result.unwrap(), Value::Nil);
        assert_eq!(output, "Hello\n2\n");
    }

    #[test]
    fn test_output_preserved_before_fault() {
        let (result, output) = run("output(\"Hello\")\n1 / 0");
        let err = result.unwrap_err();
        assert_eq!(err.category, ErrorCategory::Arithmetic);
        assert_eq!(output, "Hello\n");
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(error_of("1 / 0").category, ErrorCategory::Arithmetic);
        assert_eq!(error_of("1 % 0").category, ErrorCategory::Arithmetic);
    }

    #[test]
    fn test_integer_overflow() {
        let err = error_of("9223372036854775807 + 1");
        assert_eq!(err.category, ErrorCategory::Arithmetic);
    }

    #[test]
    fn test_undefined_symbols() {
        assert_eq!(error_of("nope").category, ErrorCategory::UndefinedOperation);
        assert_eq!(error_of("nope(1)").category, ErrorCategory::UndefinedOperation);
        assert_eq!(error_of("x = 1").category, ErrorCategory::UndefinedOperation);
    }

    #[test]
    fn test_type_mismatches_are_argument_errors() {
        assert_eq!(error_of("1 + \"a\"").category, ErrorCategory::Argument);
        assert_eq!(error_of("len(5)").category, ErrorCategory::Argument);
        assert_eq!(error_of("\"a\" < 1").category, ErrorCategory::Argument);
    }

    #[test]
    fn test_arity_mismatch_on_user_function() {
        let err = error_of("fn add(a, b) { a + b }\nadd(1)");
        assert_eq!(err.category, ErrorCategory::FunctionMismatch);
        assert!(err.message.contains("expects 2 arguments"));
    }

    #[test]
    fn test_deeply_nested_source_is_a_syntax_error() {
        let source = format!("{}1{}", "(".repeat(100_000), ")".repeat(100_000));
        let (result, _) = run_program(&source, limits(), true);
        assert_eq!(result.unwrap_err().category, ErrorCategory::Syntax);
    }

    #[test]
    fn test_syntax_error_carries_line() {
        let err = error_of("1 +\n");
        assert_eq!(err.category, ErrorCategory::Syntax);
        assert!(err.message.starts_with("line 1:"));
    }

    #[test]
    fn test_compile_errors() {
        assert_eq!(
            error_of("fn f() { 1 }\nfn f() { 2 }").category,
            ErrorCategory::Compile
        );
        assert_eq!(
            error_of("fn f(a, a) { a }").category,
            ErrorCategory::Compile
        );
        assert_eq!(
            error_of("if true { fn g() { 1 } }").category,
            ErrorCategory::Compile
        );
        assert_eq!(
            error_of("fn output(x) { x }").category,
            ErrorCategory::Compile
        );
    }

    #[test]
    fn test_deadline_stops_unbounded_loop() {
        let mut tight = limits();
        tight.deadline = Instant::now() + Duration::from_millis(50);
        let (result, _) = run_program("while true { }", tight, true);
        assert_eq!(result.unwrap_err().category, ErrorCategory::Timeout);
    }

    #[test]
    fn test_kill_flag_stops_loop() {
        let flagged = limits();
        flagged.kill.store(true, Ordering::Relaxed);
        let (result, _) = run_program("while true { }", flagged, true);
        assert_eq!(result.unwrap_err().category, ErrorCategory::Timeout);
    }

    #[test]
    fn test_memory_ceiling_on_huge_range() {
        let (result, _) = run("range(50000000)");
        assert_eq!(result.unwrap_err().category, ErrorCategory::ResourceExceeded);
    }

    #[test]
    fn test_memory_ceiling_on_string_growth() {
        let source = "let s = \"x\"\nwhile true { s = s + s }";
        assert_eq!(error_of(source).category, ErrorCategory::ResourceExceeded);
    }

    #[test]
    fn test_memory_ceiling_counts_aliased_collections() {
        let mut small = limits();
        small.memory_ceiling_bytes = 256 * 1024;
        // Each read of `a` duplicates the whole list, so stacking aliases
        // must hit the ceiling even though every literal is tiny.
        let source = "let a = range(10000)\nlet b = [a, a]\nlet c = [b, b]\nlen(c)";
        let (result, _) = run_program(source, small, true);
        assert_eq!(result.unwrap_err().category, ErrorCategory::ResourceExceeded);
    }

    #[test]
    fn test_scalar_loop_counters_are_not_charged() {
        let mut small = limits();
        small.memory_ceiling_bytes = 64 * 1024;
        let source = "let i = 0\nwhile i < 100000 { i = i + 1 }\ni";
        let (result, _) = run_program(source, small, true);
        assert_eq!(result.unwrap(), Value::Int(100_000));
    }

    #[test]
    fn test_call_depth_limit() {
        let err = error_of("fn loop_forever(n) { loop_forever(n + 1) }\nloop_forever(0)");
        assert_eq!(err.category, ErrorCategory::ResourceExceeded);
    }

    #[test]
    fn test_output_limit() {
        let mut small = limits();
        small.output_limit_bytes = 64;
        let (result, output) =
            run_program("while true { output(\"aaaaaaaaaa\") }", small, true);
        assert_eq!(result.unwrap_err().category, ErrorCategory::ResourceExceeded);
        assert!(output.len() <= 64);
    }

    #[test]
    fn test_capture_disabled_discards_output() {
        let (result, output) = run_program("output(\"hi\")\n42", limits(), false);
        assert_eq!(result.unwrap(), Value::Int(42));
        assert_eq!(output, "");
    }

    #[test]
    fn test_builtins() {
        assert_eq!(value_of("len([1, 2, 3])"), Value::Int(3));
        assert_eq!(value_of("len(\"héllo\")"), Value::Int(5));
        assert_eq!(value_of("str(42)"), Value::Text("42".into()));
        assert_eq!(value_of("abs(-3)"), Value::Int(3));
        assert_eq!(value_of("min(2, 3)"), Value::Int(2));
        assert_eq!(value_of("max(2.5, 2)"), Value::Float(2.5));
        assert_eq!(
            value_of("append([1], 2)"),
            Value::List(vec![Value::Int(1), Value::Int(2)])
        );
        assert_eq!(value_of("contains([1, 2], 2)"), Value::Bool(true));
        assert_eq!(value_of("contains(\"hello\", \"ell\")"), Value::Bool(true));
        assert_eq!(
            value_of("keys({\"a\": 1, \"b\": 2})"),
            Value::List(vec![Value::Text("a".into()), Value::Text("b".into())])
        );
        assert_eq!(value_of("len(range(4))"), Value::Int(4));
        assert_eq!(value_of("upper(\"ab\")"), Value::Text("AB".into()));
        assert_eq!(value_of("trim(\"  x  \")"), Value::Text("x".into()));
    }

    #[test]
    fn test_numeric_coercion_in_equality() {
        assert_eq!(value_of("1 == 1.0"), Value::Bool(true));
        assert_eq!(value_of("1 == \"1\""), Value::Bool(false));
    }

    #[test]
    fn test_logical_operators() {
        assert_eq!(value_of("true and false"), Value::Bool(false));
        assert_eq!(value_of("nil or 3"), Value::Int(3));
        assert_eq!(value_of("not nil"), Value::Bool(true));
        // `and`/`or` short-circuit, so the unevaluated side may be invalid.
        assert_eq!(value_of("false and nope"), Value::Bool(false));
    }
}
