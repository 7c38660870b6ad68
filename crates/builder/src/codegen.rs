// Path: crates/builder/src/codegen.rs
//! Typed WAT emission for `axs` functions.
//!
//! The generated text is a pure function of the AST: locals in declaration
//! order, folded-form instructions, no timestamps or host-dependent
//! content. Identical sources therefore assemble to identical bytes.

use crate::BuildError;
use artifex_lang::ast::{BinaryOp, Expr, Function, Stmt, UnaryOp};
use artifex_types::record::ScalarType;
use std::collections::HashMap;

/// Emits the complete module text for one function.
pub fn emit_module(func: &Function) -> Result<String, BuildError> {
    let mut ctx = Codegen::new(func)?;
    let body = ctx.body(&func.body)?;

    let mut params = String::new();
    for p in &func.params {
        params.push_str(&format!(" (param ${} {})", p.name, wasm_type(p.effective_type())));
    }
    let result = format!(" (result {})", wasm_type(ctx.ret));
    let mut locals = String::new();
    for (name, ty) in &ctx.local_order {
        locals.push_str(&format!("    (local ${} {})\n", name, wasm_type(*ty)));
    }

    Ok(format!(
        "(module\n  (memory (export \"memory\") 1)\n  (func (export \"{}\"){}{}\n{}{}  )\n)\n",
        func.name, params, result, locals, body
    ))
}

/// The return type the module was emitted with.
pub fn return_type(func: &Function) -> Result<ScalarType, BuildError> {
    Ok(Codegen::new(func)?.ret)
}

fn wasm_type(ty: ScalarType) -> &'static str {
    match ty {
        ScalarType::I32 | ScalarType::Bool => "i32",
        ScalarType::I64 => "i64",
        ScalarType::F64 => "f64",
    }
}

struct Codegen {
    env: HashMap<String, ScalarType>,
    local_order: Vec<(String, ScalarType)>,
    ret: ScalarType,
}

impl Codegen {
    fn new(func: &Function) -> Result<Self, BuildError> {
        let mut env = HashMap::new();
        for p in &func.params {
            if env.insert(p.name.clone(), p.effective_type()).is_some() {
                return Err(BuildError::Type(format!(
                    "duplicate parameter {:?}",
                    p.name
                )));
            }
        }
        let mut ctx = Self {
            env,
            local_order: Vec::new(),
            ret: func.ret.unwrap_or(ScalarType::F64),
        };
        // Pre-pass: locals must be declared at the function head, and the
        // return type may need inferring from the first `return`. Inference
        // walks `let` bindings into the environment, so reset to the
        // parameter environment before the real local collection.
        if func.ret.is_none() {
            let params_env = ctx.env.clone();
            if let Some(ty) = ctx.infer_return(&func.body)? {
                ctx.ret = ty;
            }
            ctx.env = params_env;
        }
        ctx.collect_locals(&func.body)?;
        Ok(ctx)
    }

    fn infer_return(&mut self, stmts: &[Stmt]) -> Result<Option<ScalarType>, BuildError> {
        // Walk in a scratch environment so `let` bindings are visible to
        // later returns during inference.
        for stmt in stmts {
            match stmt {
                Stmt::Return(Some(expr)) => return Ok(Some(self.type_of(expr, None)?)),
                Stmt::Return(None) => {
                    return Err(BuildError::Type(
                        "bare `return` in a value-returning function".into(),
                    ))
                }
                Stmt::Let { name, value } => {
                    let ty = self.type_of(value, None)?;
                    self.env.insert(name.clone(), ty);
                }
                Stmt::If {
                    then, otherwise, ..
                } => {
                    if let Some(ty) = self.infer_return(then)? {
                        return Ok(Some(ty));
                    }
                    if let Some(stmts) = otherwise {
                        if let Some(ty) = self.infer_return(stmts)? {
                            return Ok(Some(ty));
                        }
                    }
                }
                Stmt::While { body, .. } => {
                    if let Some(ty) = self.infer_return(body)? {
                        return Ok(Some(ty));
                    }
                }
                _ => {}
            }
        }
        Ok(None)
    }

    fn collect_locals(&mut self, stmts: &[Stmt]) -> Result<(), BuildError> {
        for stmt in stmts {
            match stmt {
                Stmt::Let { name, value } => {
                    let ty = self.type_of(value, None)?;
                    if self.env.insert(name.clone(), ty).is_some() {
                        return Err(BuildError::Type(format!(
                            "rebinding of {:?} shadows an existing binding",
                            name
                        )));
                    }
                    self.local_order.push((name.clone(), ty));
                }
                Stmt::If {
                    then, otherwise, ..
                } => {
                    self.collect_locals(then)?;
                    if let Some(stmts) = otherwise {
                        self.collect_locals(stmts)?;
                    }
                }
                Stmt::While { body, .. } => self.collect_locals(body)?,
                _ => {}
            }
        }
        Ok(())
    }

    fn body(&mut self, stmts: &[Stmt]) -> Result<String, BuildError> {
        let mut out = String::new();
        for stmt in stmts {
            out.push_str(&self.stmt(stmt, 2)?);
        }
        // Paths that fall off the end without returning are invalid at
        // runtime; `unreachable` keeps validation happy on all of them.
        out.push_str("    unreachable\n");
        Ok(out)
    }

    fn stmt(&mut self, stmt: &Stmt, depth: usize) -> Result<String, BuildError> {
        let pad = "  ".repeat(depth);
        match stmt {
            Stmt::Let { name, value } | Stmt::Assign { name, value } => {
                let ty = *self.env.get(name).ok_or_else(|| {
                    BuildError::Type(format!("assignment to unknown binding {:?}", name))
                })?;
                let expr = self.expr(value, Some(ty))?;
                Ok(format!("{}(local.set ${} {})\n", pad, name, expr))
            }
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                let cond_code = self.expr_bool(cond)?;
                let mut code = format!("{}(if {}\n{}  (then\n", pad, cond_code, pad);
                for s in then {
                    code.push_str(&self.stmt(s, depth + 2)?);
                }
                code.push_str(&format!("{}  )\n", pad));
                if let Some(stmts) = otherwise {
                    code.push_str(&format!("{}  (else\n", pad));
                    for s in stmts {
                        code.push_str(&self.stmt(s, depth + 2)?);
                    }
                    code.push_str(&format!("{}  )\n", pad));
                }
                code.push_str(&format!("{})\n", pad));
                Ok(code)
            }
            Stmt::While { cond, body } => {
                let cond_code = self.expr_bool(cond)?;
                let mut code = format!(
                    "{}(block $exit\n{}  (loop $continue\n{}    (br_if $exit (i32.eqz {}))\n",
                    pad, pad, pad, cond_code
                );
                for s in body {
                    code.push_str(&self.stmt(s, depth + 2)?);
                }
                code.push_str(&format!("{}    (br $continue)\n{}  )\n{})\n", pad, pad, pad));
                Ok(code)
            }
            Stmt::Return(Some(expr)) => {
                let ret = self.ret;
                let ty = self.type_of(expr, Some(ret))?;
                if ty != ret {
                    return Err(BuildError::Type(format!(
                        "return expression is {:?} but the function returns {:?}",
                        ty, ret
                    )));
                }
                let code = self.expr(expr, Some(ret))?;
                Ok(format!("{}(return {})\n", pad, code))
            }
            Stmt::Return(None) => Err(BuildError::Type(
                "bare `return` in a value-returning function".into(),
            )),
            // A bare expression has no effect in a pure function; evaluate
            // and drop so side conditions (traps) still fire.
            Stmt::Expr(expr) => {
                let code = self.expr(expr, None)?;
                Ok(format!("{}(drop {})\n", pad, code))
            }
        }
    }

    fn expr_bool(&mut self, expr: &Expr) -> Result<String, BuildError> {
        let ty = self.type_of(expr, Some(ScalarType::Bool))?;
        if ty != ScalarType::Bool {
            return Err(BuildError::Type(format!(
                "condition must be bool, found {:?}",
                ty
            )));
        }
        self.expr(expr, Some(ScalarType::Bool))
    }

    /// Infers the type of `expr`; integer literals adopt the expected type
    /// when one is pushed down.
    fn type_of(&self, expr: &Expr, expected: Option<ScalarType>) -> Result<ScalarType, BuildError> {
        match expr {
            Expr::Int(_) => Ok(match expected {
                Some(ScalarType::F64) => ScalarType::F64,
                Some(ScalarType::I32) => ScalarType::I32,
                _ => ScalarType::I64,
            }),
            Expr::Float(_) => Ok(ScalarType::F64),
            Expr::Bool(_) => Ok(ScalarType::Bool),
            Expr::Ident(name) => self
                .env
                .get(name)
                .copied()
                .ok_or_else(|| BuildError::Type(format!("unknown binding {:?}", name))),
            Expr::Unary { op, expr } => match op {
                UnaryOp::Neg => {
                    let ty = self.type_of(expr, expected)?;
                    if ty == ScalarType::Bool {
                        return Err(BuildError::Type("cannot negate a bool".into()));
                    }
                    Ok(ty)
                }
                UnaryOp::Not => Ok(ScalarType::Bool),
            },
            Expr::Binary { op, lhs, rhs } => {
                if op.is_comparison() {
                    return Ok(ScalarType::Bool);
                }
                let operand_hint = expected.filter(|t| *t != ScalarType::Bool);
                self.numeric_operand_type(lhs, rhs, operand_hint)
            }
            Expr::Call { callee, .. } => {
                if artifex_lang::is_pure_math_call(callee) {
                    Ok(ScalarType::F64)
                } else {
                    // Unrecognized calls lower to a trap stub and adopt
                    // the surrounding type; the artifact still builds,
                    // labeled impure.
                    Ok(expected.unwrap_or(ScalarType::F64))
                }
            }
            Expr::Await(inner) => self.type_of(inner, expected),
        }
    }

    /// Unifies the operand types of a numeric binary op; a literal side
    /// adopts the other side's type.
    fn numeric_operand_type(
        &self,
        lhs: &Expr,
        rhs: &Expr,
        hint: Option<ScalarType>,
    ) -> Result<ScalarType, BuildError> {
        let lt = self.type_of(lhs, hint)?;
        let rt = self.type_of(rhs, hint)?;
        let unified = match (lt, rt) {
            (a, b) if a == b => a,
            (ScalarType::F64, _) if matches!(rhs, Expr::Int(_)) => ScalarType::F64,
            (_, ScalarType::F64) if matches!(lhs, Expr::Int(_)) => ScalarType::F64,
            (ScalarType::I32, ScalarType::I64) if matches!(rhs, Expr::Int(_)) => ScalarType::I32,
            (ScalarType::I64, ScalarType::I32) if matches!(lhs, Expr::Int(_)) => ScalarType::I32,
            (a, b) => {
                return Err(BuildError::Type(format!(
                    "operand types {:?} and {:?} do not unify",
                    a, b
                )))
            }
        };
        if unified == ScalarType::Bool {
            return Err(BuildError::Type("arithmetic on bool operands".into()));
        }
        Ok(unified)
    }

    fn expr(&mut self, expr: &Expr, expected: Option<ScalarType>) -> Result<String, BuildError> {
        match expr {
            Expr::Int(v) => Ok(match self.type_of(expr, expected)? {
                ScalarType::F64 => format!("(f64.const {})", render_f64(*v as f64)),
                ScalarType::I32 => {
                    let narrowed = i32::try_from(*v).map_err(|_| {
                        BuildError::Type(format!("literal {} exceeds i32 range", v))
                    })?;
                    format!("(i32.const {})", narrowed)
                }
                _ => format!("(i64.const {})", v),
            }),
            Expr::Float(v) => Ok(format!("(f64.const {})", render_f64(*v))),
            Expr::Bool(v) => Ok(format!("(i32.const {})", i32::from(*v))),
            Expr::Ident(name) => {
                self.type_of(expr, expected)?;
                Ok(format!("(local.get ${})", name))
            }
            Expr::Unary { op, expr: inner } => match op {
                UnaryOp::Neg => {
                    let ty = self.type_of(expr, expected)?;
                    let code = self.expr(inner, Some(ty))?;
                    Ok(match ty {
                        ScalarType::F64 => format!("(f64.neg {})", code),
                        ScalarType::I32 => format!("(i32.sub (i32.const 0) {})", code),
                        _ => format!("(i64.sub (i64.const 0) {})", code),
                    })
                }
                UnaryOp::Not => {
                    let code = self.expr(inner, Some(ScalarType::Bool))?;
                    Ok(format!("(i32.eqz {})", code))
                }
            },
            Expr::Binary { op, lhs, rhs } => self.binary(*op, lhs, rhs, expected),
            Expr::Call { callee, args } => {
                if artifex_lang::is_pure_math_call(callee) {
                    self.math_call(callee, args)
                } else {
                    Ok(impure_stub())
                }
            }
            Expr::Await(_) => Ok(impure_stub()),
        }
    }

    fn binary(
        &mut self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        expected: Option<ScalarType>,
    ) -> Result<String, BuildError> {
        let operand_ty = if op.is_comparison() && !matches!(op, BinaryOp::And | BinaryOp::Or) {
            self.numeric_operand_type(lhs, rhs, None)
                .or_else(|_| -> Result<ScalarType, BuildError> {
                    // Equality also applies to bools.
                    let lt = self.type_of(lhs, Some(ScalarType::Bool))?;
                    if matches!(op, BinaryOp::Eq | BinaryOp::Ne) && lt == ScalarType::Bool {
                        Ok(ScalarType::Bool)
                    } else {
                        Err(BuildError::Type("comparison operands do not unify".into()))
                    }
                })?
        } else if matches!(op, BinaryOp::And | BinaryOp::Or) {
            for side in [lhs, rhs] {
                let ty = self.type_of(side, Some(ScalarType::Bool))?;
                if ty != ScalarType::Bool {
                    return Err(BuildError::Type(format!(
                        "logical operands must be bool, found {:?}",
                        ty
                    )));
                }
            }
            ScalarType::Bool
        } else {
            let hint = expected.filter(|t| *t != ScalarType::Bool);
            self.numeric_operand_type(lhs, rhs, hint)?
        };

        let l = self.expr(lhs, Some(operand_ty))?;
        let r = self.expr(rhs, Some(operand_ty))?;
        let prefix = match operand_ty {
            ScalarType::F64 => "f64",
            ScalarType::I64 => "i64",
            ScalarType::I32 | ScalarType::Bool => "i32",
        };
        let signed = matches!(operand_ty, ScalarType::I32 | ScalarType::I64);

        let instr: String = match op {
            BinaryOp::Add => format!("{}.add", prefix),
            BinaryOp::Sub => format!("{}.sub", prefix),
            BinaryOp::Mul => format!("{}.mul", prefix),
            BinaryOp::Div => {
                if signed {
                    format!("{}.div_s", prefix)
                } else {
                    "f64.div".to_string()
                }
            }
            BinaryOp::Rem => {
                if operand_ty == ScalarType::F64 {
                    return Err(BuildError::Type(
                        "remainder is not defined for f64 operands".into(),
                    ));
                }
                format!("{}.rem_s", prefix)
            }
            BinaryOp::Eq => format!("{}.eq", prefix),
            BinaryOp::Ne => format!("{}.ne", prefix),
            BinaryOp::Lt => cmp(prefix, "lt", signed),
            BinaryOp::Le => cmp(prefix, "le", signed),
            BinaryOp::Gt => cmp(prefix, "gt", signed),
            BinaryOp::Ge => cmp(prefix, "ge", signed),
            BinaryOp::And => "i32.and".to_string(),
            BinaryOp::Or => "i32.or".to_string(),
        };
        Ok(format!("({} {} {})", instr, l, r))
    }

    fn math_call(&mut self, callee: &str, args: &[Expr]) -> Result<String, BuildError> {
        let base = callee.rsplit('.').next().unwrap_or(callee);
        let (instr, arity) = match base {
            "sqrt" => ("f64.sqrt", 1),
            "abs" => ("f64.abs", 1),
            "floor" => ("f64.floor", 1),
            "ceil" => ("f64.ceil", 1),
            "min" => ("f64.min", 2),
            "max" => ("f64.max", 2),
            other => {
                return Err(BuildError::Type(format!(
                    "{:?} is recognized as pure math but has no lowering",
                    other
                )))
            }
        };
        if args.len() != arity {
            return Err(BuildError::Type(format!(
                "{} expects {} argument(s), found {}",
                base,
                arity,
                args.len()
            )));
        }
        let rendered: Result<Vec<String>, BuildError> = args
            .iter()
            .map(|a| self.expr(a, Some(ScalarType::F64)))
            .collect();
        Ok(format!("({} {})", instr, rendered?.join(" ")))
    }
}

/// The lowering for impure constructs (unrecognized calls, `await`).
///
/// The source is accepted and the artifact is built and labeled impure;
/// reaching the construct at run time is a deterministic trap, and the
/// policy engine bars such artifacts from execution without an explicit
/// grant.
fn impure_stub() -> String {
    "(unreachable)".to_string()
}

fn cmp(prefix: &str, op: &str, signed: bool) -> String {
    if signed {
        format!("{}.{}_s", prefix, op)
    } else {
        format!("{}.{}", prefix, op)
    }
}

/// Renders an f64 in a form `wat` accepts, with full round-trip precision.
fn render_f64(v: f64) -> String {
    if v == v.trunc() && v.is_finite() && v.abs() < 1e15 {
        format!("{:.1}", v)
    } else {
        format!("{:?}", v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use artifex_lang::parse_function;

    fn module_for(src: &str) -> String {
        emit_module(&parse_function(src).unwrap()).unwrap()
    }

    #[test]
    fn add_emits_f64_module_that_assembles() {
        let wat_text = module_for("export function add(a,b){return a+b}");
        assert!(wat_text.contains("(export \"add\")"));
        assert!(wat_text.contains("(f64.add (local.get $a) (local.get $b))"));
        wat::parse_str(&wat_text).unwrap();
    }

    #[test]
    fn typed_i64_arithmetic_uses_integer_instructions() {
        let wat_text =
            module_for("function mix(a: i64, b: i64) -> i64 { return a * b + 2 }");
        assert!(wat_text.contains("i64.mul"));
        assert!(wat_text.contains("(i64.const 2)"));
        wat::parse_str(&wat_text).unwrap();
    }

    #[test]
    fn control_flow_and_locals_assemble() {
        let src = r#"
            function gauss(n: i64) -> i64 {
                let total = 0
                let i = 0
                while i <= n {
                    total = total + i
                    i = i + 1
                }
                return total
            }
        "#;
        let wat_text = module_for(src);
        assert!(wat_text.contains("(local $total i64)"));
        assert!(wat_text.contains("(block $exit"));
        wat::parse_str(&wat_text).unwrap();
    }

    #[test]
    fn math_builtins_lower_to_instructions() {
        let wat_text = module_for("function hyp(a: f64, b: f64) -> f64 { return sqrt(a*a + b*b) }");
        assert!(wat_text.contains("f64.sqrt"));
        wat::parse_str(&wat_text).unwrap();
    }

    #[test]
    fn unknown_calls_and_await_lower_to_traps() {
        let wat_text = module_for("function f(a){return fetch(a)}");
        assert!(wat_text.contains("(return (unreachable))"));
        wat::parse_str(&wat_text).unwrap();

        let wat_text = module_for("function f(a){return await a}");
        assert!(wat_text.contains("(return (unreachable))"));
        wat::parse_str(&wat_text).unwrap();

        // The stub adopts the surrounding type, so mixed expressions
        // still assemble.
        let wat_text = module_for("function f(a: i64) -> i64 { return fetch(a) + 1 }");
        assert!(wat_text.contains("(i64.add (unreachable) (i64.const 1))"));
        wat::parse_str(&wat_text).unwrap();
    }

    #[test]
    fn float_remainder_is_a_type_error() {
        let err = emit_module(&parse_function("function f(a: f64){return a % 2.0}").unwrap());
        assert!(matches!(err, Err(BuildError::Type(_))));
    }
}
