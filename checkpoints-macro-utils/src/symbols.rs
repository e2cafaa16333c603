//! Free-symbol extraction.
//!
//! Walks a function body and records every root path the code reads from
//! outside its own scope: called functions, referenced statics, struct
//! and type names. Parameters, `let` bindings, closure parameters, loop
//! and match bindings are locals and never recorded. Method calls are
//! recorded as `Type::method` when the receiver's type is known, either
//! from a parameter annotation or from local construction
//! (`let m = Matrix::new(..)`, `let m: Matrix = ..`); methods called on
//! `self` are recorded by bare name. Identifiers inside macro invocations
//! are recorded by bare name, since a macro body is opaque at this level.
//!
//! The scan errs toward recording: a symbol that resolves to nothing in
//! the runtime registry is skipped there, so over-collection is harmless.

use proc_macro2::{TokenStream, TokenTree};
use std::collections::{BTreeSet, HashMap, HashSet};
use syn::visit::Visit;
use syn::{Expr, FnArg, ItemFn, Pat, Type};

/// Free symbols of a function body, sorted and deduplicated.
pub fn free_symbols(item: &ItemFn) -> Vec<String> {
    let mut scan = SymbolScan::default();

    for arg in &item.sig.inputs {
        match arg {
            FnArg::Receiver(_) => {
                scan.locals.insert("self".to_string());
            }
            FnArg::Typed(pat) => {
                if let Pat::Ident(ident) = pat.pat.as_ref() {
                    let name = ident.ident.to_string();
                    if let Some(ty) = type_path_of(&pat.ty) {
                        // A class-typed parameter makes the type itself
                        // reachable, so its tracked items can be found.
                        // Primitive (lowercase) type names stay out.
                        if ty.chars().next().is_some_and(char::is_uppercase) {
                            scan.symbols.insert(ty.clone());
                        }
                        scan.local_types.insert(name.clone(), ty);
                    }
                    scan.locals.insert(name);
                } else {
                    collect_pat_idents(&pat.pat, &mut scan.locals);
                }
            }
        }
    }

    scan.visit_block(&item.block);
    scan.symbols.into_iter().collect()
}

#[derive(Default)]
struct SymbolScan {
    locals: HashSet<String>,
    local_types: HashMap<String, String>,
    symbols: BTreeSet<String>,
}

const PATH_KEYWORDS: &[&str] = &["self", "Self", "crate", "super"];

fn type_path_of(ty: &Type) -> Option<String> {
    match ty {
        Type::Path(path) if path.qself.is_none() => Some(path_string(&path.path)),
        Type::Reference(reference) => type_path_of(&reference.elem),
        _ => None,
    }
}

fn path_string(path: &syn::Path) -> String {
    path.segments
        .iter()
        .map(|segment| segment.ident.to_string())
        .collect::<Vec<_>>()
        .join("::")
}

fn collect_pat_idents(pat: &Pat, out: &mut HashSet<String>) {
    struct PatIdents<'a> {
        out: &'a mut HashSet<String>,
    }
    impl<'ast, 'a> Visit<'ast> for PatIdents<'a> {
        fn visit_pat_ident(&mut self, pat: &'ast syn::PatIdent) {
            self.out.insert(pat.ident.to_string());
            if let Some((_, sub)) = &pat.subpat {
                self.visit_pat(sub);
            }
        }
    }
    PatIdents { out }.visit_pat(pat);
}

/// Type constructed by an initializer expression, if it is recognizably a
/// construction: `Matrix::new(..)`, `Matrix { .. }` and the like.
fn constructed_type(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Struct(expr_struct) => Some(path_string(&expr_struct.path)),
        Expr::Call(call) => match call.func.as_ref() {
            Expr::Path(path) if path.qself.is_none() && path.path.segments.len() >= 2 => {
                let segments: Vec<String> = path
                    .path
                    .segments
                    .iter()
                    .map(|segment| segment.ident.to_string())
                    .collect();
                let type_segment = &segments[segments.len() - 2];
                if type_segment.chars().next().is_some_and(char::is_uppercase) {
                    Some(segments[..segments.len() - 1].join("::"))
                } else {
                    None
                }
            }
            _ => None,
        },
        _ => None,
    }
}

impl SymbolScan {
    fn record_path(&mut self, path: &syn::Path) {
        let Some(first) = path.segments.first() else {
            return;
        };
        let root = first.ident.to_string();
        if PATH_KEYWORDS.contains(&root.as_str()) {
            return;
        }
        if path.segments.len() == 1 && self.locals.contains(&root) {
            return;
        }
        self.symbols.insert(path_string(path));
    }

    fn record_macro_tokens(&mut self, tokens: TokenStream) {
        for tree in tokens {
            match tree {
                TokenTree::Ident(ident) => {
                    let name = ident.to_string();
                    if !self.locals.contains(&name) && !PATH_KEYWORDS.contains(&name.as_str()) {
                        self.symbols.insert(name);
                    }
                }
                TokenTree::Group(group) => self.record_macro_tokens(group.stream()),
                _ => {}
            }
        }
    }
}

impl<'ast> Visit<'ast> for SymbolScan {
    fn visit_local(&mut self, local: &'ast syn::Local) {
        // The initializer sees the scope before this binding.
        if let Some(init) = &local.init {
            self.visit_expr(&init.expr);
        }

        let inferred = match &local.pat {
            Pat::Type(typed) => type_path_of(&typed.ty),
            _ => None,
        }
        .or_else(|| {
            local
                .init
                .as_ref()
                .and_then(|init| constructed_type(&init.expr))
        });

        let pat = match &local.pat {
            Pat::Type(typed) => typed.pat.as_ref(),
            other => other,
        };
        if let Pat::Ident(ident) = pat {
            let name = ident.ident.to_string();
            if let Some(ty) = inferred {
                self.local_types.insert(name.clone(), ty);
            }
            self.locals.insert(name);
        } else {
            collect_pat_idents(pat, &mut self.locals);
        }
    }

    fn visit_expr_path(&mut self, path: &'ast syn::ExprPath) {
        if path.qself.is_none() {
            self.record_path(&path.path);
        }
        syn::visit::visit_expr_path(self, path);
    }

    fn visit_expr_struct(&mut self, expr: &'ast syn::ExprStruct) {
        if expr.qself.is_none() {
            self.record_path(&expr.path);
        }
        syn::visit::visit_expr_struct(self, expr);
    }

    fn visit_expr_method_call(&mut self, call: &'ast syn::ExprMethodCall) {
        if let Expr::Path(receiver) = call.receiver.as_ref() {
            if let Some(name) = receiver.path.get_ident() {
                let method = call.method.to_string();
                if name == "self" {
                    self.symbols.insert(method);
                } else if let Some(ty) = self.local_types.get(&name.to_string()) {
                    self.symbols.insert(format!("{ty}::{method}"));
                }
            }
        }
        syn::visit::visit_expr_method_call(self, call);
    }

    fn visit_expr_closure(&mut self, closure: &'ast syn::ExprClosure) {
        for input in &closure.inputs {
            collect_pat_idents(input, &mut self.locals);
        }
        self.visit_expr(&closure.body);
    }

    fn visit_expr_for_loop(&mut self, expr: &'ast syn::ExprForLoop) {
        self.visit_expr(&expr.expr);
        collect_pat_idents(&expr.pat, &mut self.locals);
        self.visit_block(&expr.body);
    }

    fn visit_expr_let(&mut self, expr: &'ast syn::ExprLet) {
        self.visit_expr(&expr.expr);
        collect_pat_idents(&expr.pat, &mut self.locals);
    }

    fn visit_arm(&mut self, arm: &'ast syn::Arm) {
        collect_pat_idents(&arm.pat, &mut self.locals);
        syn::visit::visit_arm(self, arm);
    }

    fn visit_macro(&mut self, mac: &'ast syn::Macro) {
        self.record_macro_tokens(mac.tokens.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbols_of(source: &str) -> Vec<String> {
        free_symbols(&syn::parse_str::<ItemFn>(source).unwrap())
    }

    #[test]
    fn test_called_functions_are_free() {
        let symbols = symbols_of("fn f(x: u64) -> u64 { helper(x) + geo::area(x) }");
        assert!(symbols.contains(&"helper".to_string()));
        assert!(symbols.contains(&"geo::area".to_string()));
    }

    #[test]
    fn test_params_and_locals_are_bound() {
        let symbols = symbols_of(
            "fn f(x: u64) -> u64 { let y = x + 1; let (a, b) = (y, x); a + b }",
        );
        assert!(symbols.is_empty());
    }

    #[test]
    fn test_referenced_statics_are_free() {
        let symbols = symbols_of("fn f() -> u64 { LIMIT + config::SCALE }");
        assert!(symbols.contains(&"LIMIT".to_string()));
        assert!(symbols.contains(&"config::SCALE".to_string()));
    }

    #[test]
    fn test_initializer_sees_outer_scope() {
        // The `helper` read happens before `helper` becomes a local.
        let symbols = symbols_of("fn f() -> u64 { let helper = helper(); helper }");
        assert!(symbols.contains(&"helper".to_string()));
    }

    #[test]
    fn test_annotated_param_methods_are_qualified() {
        let symbols = symbols_of("fn f(m: Matrix) -> f64 { m.det() }");
        assert!(symbols.contains(&"Matrix".to_string()));
        assert!(symbols.contains(&"Matrix::det".to_string()));
    }

    #[test]
    fn test_locally_constructed_type_methods_are_qualified() {
        let symbols = symbols_of(
            "fn f() -> f64 { let m = Matrix::new(3); let n: Matrix = m; m.det() + n.scale() }",
        );
        assert!(symbols.contains(&"Matrix::new".to_string()));
        assert!(symbols.contains(&"Matrix::det".to_string()));
        assert!(symbols.contains(&"Matrix::scale".to_string()));
    }

    #[test]
    fn test_self_methods_are_recorded_by_name() {
        let symbols = symbols_of("fn area(&self) -> f64 { self.base() * 2.0 }");
        assert!(symbols.contains(&"base".to_string()));
    }

    #[test]
    fn test_unknown_receiver_methods_are_not_recorded() {
        let symbols = symbols_of("fn f(xs: Vec<u64>) -> usize { let ys = xs; ys.len() }");
        assert!(!symbols.iter().any(|s| s.contains("len")));
    }

    #[test]
    fn test_closure_params_are_bound() {
        let symbols = symbols_of("fn f(xs: Vec<u64>) -> u64 { xs.iter().map(|v| v + BASE).sum() }");
        assert!(symbols.contains(&"BASE".to_string()));
        assert!(!symbols.contains(&"v".to_string()));
    }

    #[test]
    fn test_match_bindings_are_bound() {
        let symbols = symbols_of(
            "fn f(x: Option<u64>) -> u64 { match x { Some(inner) => inner, None => fallback() } }",
        );
        assert!(symbols.contains(&"fallback".to_string()));
        assert!(!symbols.contains(&"inner".to_string()));
    }

    #[test]
    fn test_macro_arguments_are_scanned() {
        let symbols = symbols_of("fn f(x: u64) { println!(\"{}\", helper(x)); }");
        assert!(symbols.contains(&"helper".to_string()));
        assert!(!symbols.contains(&"x".to_string()));
    }

    #[test]
    fn test_struct_literals_are_free() {
        let symbols = symbols_of("fn f() -> Point { Point { x: 0, y: 0 } }");
        assert!(symbols.contains(&"Point".to_string()));
    }

    #[test]
    fn test_output_is_sorted_and_deduplicated() {
        let symbols = symbols_of("fn f() -> u64 { beta() + alpha() + beta() }");
        assert_eq!(symbols, vec!["alpha".to_string(), "beta".to_string()]);
    }
}
