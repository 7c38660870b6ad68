// Path: crates/phash/src/graph.rs
//! Reduction of an `axs` syntax tree to the logical graph.
//!
//! Identifier nodes are discarded entirely, so any consistent renaming
//! produces the same graph. Literal nodes keep their type but not their
//! value. Every remaining syntactic construct becomes one typed node; edges
//! follow child relationships with unit weight.

use artifex_lang::ast::{Expr, Function, Stmt};
use artifex_lang::is_pure_math_call;

/// The node classes of the logical graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Arithmetic, logic, calls, bindings.
    Operation,
    /// Literals, typed but valueless.
    Data,
    /// Branches, loops, returns.
    Control,
    /// The function root.
    PureRoot,
}

/// One node of the logical graph.
#[derive(Debug, Clone)]
pub struct Node {
    /// Node class.
    pub kind: NodeKind,
    /// Stable operation tag (`add`, `while`, `lit:f64`, `call:sqrt`, ...).
    pub tag: String,
}

/// The logical graph of one source function.
#[derive(Debug, Clone, Default)]
pub struct LogicalGraph {
    /// Nodes in pre-order of the reduced tree.
    pub nodes: Vec<Node>,
    /// Undirected unit-weight edges (parent, child).
    pub edges: Vec<(usize, usize)>,
    /// Call-like nodes that are not recognized pure math.
    pub impure_calls: u32,
    /// Assignment-like nodes (mutation of an existing binding).
    pub assignments: u32,
    /// Suspension-like nodes.
    pub suspensions: u32,
}

impl LogicalGraph {
    /// Reduces a parsed function to its logical graph.
    pub fn reduce(func: &Function) -> Self {
        let mut graph = Self::default();
        let root = graph.push(NodeKind::PureRoot, "fn");
        for stmt in &func.body {
            graph.stmt(root, stmt);
        }
        graph
    }

    /// McCabe-style complexity, `max(0, E - V + 2) / V`, clamped to [0, 1].
    pub fn complexity(&self) -> f64 {
        let v = self.nodes.len() as f64;
        if v == 0.0 {
            return 0.0;
        }
        let e = self.edges.len() as f64;
        (((e - v + 2.0).max(0.0)) / v).min(1.0)
    }

    /// Purity scalar: starts at 1.0, decays per impure construct, floored
    /// at 0.
    pub fn purity(&self) -> f64 {
        let mut p = 1.0_f64;
        for _ in 0..self.impure_calls {
            p *= 0.9;
        }
        for _ in 0..self.assignments {
            p *= 0.8;
        }
        for _ in 0..self.suspensions {
            p *= 0.5;
        }
        p.max(0.0)
    }

    /// The canonical structure string: pre-order node tags, comma-joined.
    /// Part of the hash preimage so that operator substitutions with
    /// identical shapes still fingerprint differently.
    pub fn structure_tags(&self) -> String {
        let tags: Vec<&str> = self.nodes.iter().map(|n| n.tag.as_str()).collect();
        tags.join(",")
    }

    fn push(&mut self, kind: NodeKind, tag: impl Into<String>) -> usize {
        self.nodes.push(Node {
            kind,
            tag: tag.into(),
        });
        self.nodes.len() - 1
    }

    fn attach(&mut self, parent: usize, kind: NodeKind, tag: impl Into<String>) -> usize {
        let id = self.push(kind, tag);
        self.edges.push((parent, id));
        id
    }

    fn stmt(&mut self, parent: usize, stmt: &Stmt) {
        match stmt {
            Stmt::Let { value, .. } => {
                let id = self.attach(parent, NodeKind::Operation, "let");
                self.expr(id, value);
            }
            Stmt::Assign { value, .. } => {
                self.assignments += 1;
                let id = self.attach(parent, NodeKind::Operation, "assign");
                self.expr(id, value);
            }
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                let id = self.attach(parent, NodeKind::Control, "if");
                self.expr(id, cond);
                for s in then {
                    self.stmt(id, s);
                }
                if let Some(stmts) = otherwise {
                    let else_id = self.attach(id, NodeKind::Control, "else");
                    for s in stmts {
                        self.stmt(else_id, s);
                    }
                }
            }
            Stmt::While { cond, body } => {
                let id = self.attach(parent, NodeKind::Control, "while");
                self.expr(id, cond);
                for s in body {
                    self.stmt(id, s);
                }
            }
            Stmt::Return(value) => {
                let id = self.attach(parent, NodeKind::Control, "return");
                if let Some(expr) = value {
                    self.expr(id, expr);
                }
            }
            Stmt::Expr(expr) => self.expr(parent, expr),
        }
    }

    fn expr(&mut self, parent: usize, expr: &Expr) {
        match expr {
            // Literals carry their type only, never their value.
            Expr::Int(_) => {
                self.attach(parent, NodeKind::Data, "lit:i64");
            }
            Expr::Float(_) => {
                self.attach(parent, NodeKind::Data, "lit:f64");
            }
            Expr::Bool(_) => {
                self.attach(parent, NodeKind::Data, "lit:bool");
            }
            // Identifier nodes are discarded.
            Expr::Ident(_) => {}
            Expr::Unary { op, expr } => {
                let id = self.attach(parent, NodeKind::Operation, op.tag());
                self.expr(id, expr);
            }
            Expr::Binary { op, lhs, rhs } => {
                let id = self.attach(parent, NodeKind::Operation, op.tag());
                self.expr(id, lhs);
                self.expr(id, rhs);
            }
            Expr::Call { callee, args } => {
                let tag = if is_pure_math_call(callee) {
                    let base = callee.rsplit('.').next().unwrap_or(callee);
                    format!("call:{}", base)
                } else {
                    self.impure_calls += 1;
                    "call".to_string()
                };
                let id = self.attach(parent, NodeKind::Operation, tag);
                for arg in args {
                    self.expr(id, arg);
                }
            }
            Expr::Await(inner) => {
                self.suspensions += 1;
                let id = self.attach(parent, NodeKind::Operation, "await");
                self.expr(id, inner);
            }
        }
    }
}
