//! Canonical body strings.
//!
//! Two token streams that differ only in whitespace, comments, doc
//! comments or this framework's own attributes must produce the same
//! string; any change to the executable shape of the function must
//! produce a different one. Proc-macro token streams already carry no
//! comments or whitespace; doc comments survive as `#[doc = "..."]`
//! attributes and are stripped explicitly, both on the item and anywhere
//! inside the body.

use proc_macro2::{Delimiter, TokenStream, TokenTree};
use quote::ToTokens;
use syn::{FnArg, ItemFn, Pat};

/// Attribute names owned by this framework; they are stripped from the
/// canonical form so that adding or removing a decoration does not by
/// itself change a dependent's fingerprint.
const FRAMEWORK_ATTRS: &[&str] = &["checkpoint", "track", "capture", "capture_once"];

/// Whether an attribute belongs to this framework, by last path segment,
/// so both `#[checkpoint]` and `#[checkpoints::checkpoint]` match.
pub fn is_framework_attr(attr: &syn::Attribute) -> bool {
    attr.path()
        .segments
        .last()
        .map(|segment| {
            FRAMEWORK_ATTRS
                .iter()
                .any(|name| segment.ident == name)
        })
        .unwrap_or(false)
}

fn is_doc_attr(attr: &syn::Attribute) -> bool {
    attr.path().is_ident("doc")
}

/// Removes `#[doc = ...]` and `#![doc = ...]` attributes anywhere in a
/// token stream.
pub fn strip_doc_tokens(tokens: TokenStream) -> TokenStream {
    let mut out = Vec::<TokenTree>::new();
    let mut trees = tokens.into_iter().peekable();
    while let Some(tree) = trees.next() {
        match &tree {
            TokenTree::Punct(punct) if punct.as_char() == '#' => {
                // Lookahead for `[doc ...]`, optionally after `!`.
                let mut pending = vec![tree.clone()];
                if matches!(trees.peek(), Some(TokenTree::Punct(bang)) if bang.as_char() == '!') {
                    if let Some(bang) = trees.next() {
                        pending.push(bang);
                    }
                }
                match trees.peek() {
                    Some(TokenTree::Group(group))
                        if group.delimiter() == Delimiter::Bracket && starts_with_doc(group.stream()) =>
                    {
                        trees.next();
                    }
                    _ => out.extend(pending),
                }
            }
            TokenTree::Group(group) => {
                let inner = strip_doc_tokens(group.stream());
                let mut replaced = proc_macro2::Group::new(group.delimiter(), inner);
                replaced.set_span(group.span());
                out.push(TokenTree::Group(replaced));
            }
            _ => out.push(tree),
        }
    }
    out.into_iter().collect()
}

fn starts_with_doc(tokens: TokenStream) -> bool {
    matches!(tokens.into_iter().next(), Some(TokenTree::Ident(ident)) if ident == "doc")
}

fn param_name(arg: &FnArg) -> String {
    match arg {
        FnArg::Receiver(_) => "self".to_string(),
        FnArg::Typed(pat) => match pat.pat.as_ref() {
            Pat::Ident(ident) => ident.ident.to_string(),
            other => other.to_token_stream().to_string(),
        },
    }
}

/// The canonical form of a function: a header of the shape
/// `"<fn-kind> <name> <idx:param,...>"`, the non-framework attribute
/// list, the signature tokens, then the body tokens, with doc attributes
/// removed throughout.
pub fn fn_body_string(item: &ItemFn) -> String {
    let kind = if item.sig.asyncness.is_some() {
        "async fn"
    } else {
        "fn"
    };
    let params = item
        .sig
        .inputs
        .iter()
        .map(|arg| format!("0:{}", param_name(arg)))
        .collect::<Vec<_>>()
        .join(",");
    let header = format!("{kind} {} {params}", item.sig.ident);

    let attrs = item
        .attrs
        .iter()
        .filter(|attr| !is_framework_attr(attr) && !is_doc_attr(attr))
        .map(|attr| attr.to_token_stream().to_string())
        .collect::<Vec<_>>()
        .join(" ");

    let signature = item.sig.to_token_stream().to_string();
    let body = strip_doc_tokens(item.block.to_token_stream()).to_string();

    format!("{header}\n{attrs}\n{signature}\n{body}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_of(source: &str) -> String {
        fn_body_string(&syn::parse_str::<ItemFn>(source).unwrap())
    }

    #[test]
    fn test_whitespace_and_comments_are_invisible() {
        let a = body_of("fn helper(x: u64) -> u64 { x * x + 0 }");
        let b = body_of(
            "fn helper(x: u64) -> u64 {\n    // intermediate result\n    x * x\n        + 0\n}",
        );
        assert_eq!(a, b);
    }

    #[test]
    fn test_doc_comments_are_invisible() {
        let a = body_of("fn helper(x: u64) -> u64 { x * x }");
        let b = body_of("/// Squares a number.\n#[doc = \"twice\"]\nfn helper(x: u64) -> u64 { x * x }");
        assert_eq!(a, b);
    }

    #[test]
    fn test_body_edits_are_visible() {
        let a = body_of("fn helper(x: u64) -> u64 { x * x + 0 }");
        let b = body_of("fn helper(x: u64) -> u64 { 0 + x * x }");
        assert_ne!(a, b);
    }

    #[test]
    fn test_signature_edits_are_visible() {
        let a = body_of("fn helper(x: u64) -> u64 { x }");
        let b = body_of("fn helper(x: u32) -> u64 { x }");
        assert_ne!(a, b);
    }

    #[test]
    fn test_framework_attributes_are_invisible() {
        let a = body_of("fn helper(x: u64) -> u64 { x }");
        let b = body_of("#[checkpoint(verbosity = 0)]\nfn helper(x: u64) -> u64 { x }");
        let c = body_of("#[checkpoints::track]\nfn helper(x: u64) -> u64 { x }");
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn test_foreign_attributes_are_visible() {
        let a = body_of("fn helper(x: u64) -> u64 { x }");
        let b = body_of("#[inline]\nfn helper(x: u64) -> u64 { x }");
        assert_ne!(a, b);
    }

    #[test]
    fn test_async_functions_get_their_own_kind() {
        let a = body_of("fn helper() {}");
        let b = body_of("async fn helper() {}");
        assert_ne!(a, b);
    }

    #[test]
    fn test_inner_doc_attributes_are_stripped() {
        let a = body_of("fn helper() { let x = 1; x; }");
        let b = body_of("fn helper() { #![doc = \"inner\"] let x = 1; x; }");
        assert_eq!(a, b);
    }

    #[test]
    fn test_header_lists_receiver_and_params() {
        let body = body_of("fn area(&self, scale: f64) -> f64 { scale }");
        assert!(body.starts_with("fn area 0:self,0:scale\n"));
    }
}
