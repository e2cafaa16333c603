//! Attribute parsing shared by the checkpoint macros.

use proc_macro2::TokenStream as TokenStream2;
use syn::parse::Parser;
use syn::punctuated::Punctuated;
use syn::{Expr, Lit, Meta, MetaNameValue, Token};

/// Parsed `#[checkpoint(...)]` options.
#[derive(Default)]
pub struct CheckpointAttrs {
    /// Path to a function returning the base `Checkpointer`.
    pub with: Option<syn::Path>,
    /// `"memory"` or `"blob"`.
    pub storage: Option<String>,
    /// Root directory override.
    pub dir: Option<String>,
    /// Overrides the name segment of the on-disk function directory.
    pub name: Option<String>,
    pub verbosity: Option<u8>,
    pub capture: bool,
    /// Entry age in seconds after which calls recompute.
    pub expire_after: Option<u64>,
    /// Static fingerprint override; traversal past this function stops.
    pub fn_hash_from: Option<String>,
    /// Per-parameter hash overrides, `hash_by(param = path)`.
    pub hash_by: Vec<(String, syn::Path)>,
}

/// Parsed `#[capture(...)]` / `#[capture_once(...)]` options.
#[derive(Default)]
pub struct CaptureAttrs {
    pub hash_by: Option<syn::Path>,
}

fn str_value(nv: &MetaNameValue) -> syn::Result<String> {
    match &nv.value {
        Expr::Lit(lit) => match &lit.lit {
            Lit::Str(value) => Ok(value.value()),
            _ => Err(syn::Error::new_spanned(&nv.value, "expected a string literal")),
        },
        _ => Err(syn::Error::new_spanned(&nv.value, "expected a string literal")),
    }
}

fn int_value<T>(nv: &MetaNameValue) -> syn::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match &nv.value {
        Expr::Lit(lit) => match &lit.lit {
            Lit::Int(value) => value.base10_parse::<T>(),
            _ => Err(syn::Error::new_spanned(&nv.value, "expected an integer literal")),
        },
        _ => Err(syn::Error::new_spanned(&nv.value, "expected an integer literal")),
    }
}

fn path_value(nv: &MetaNameValue) -> syn::Result<syn::Path> {
    match &nv.value {
        Expr::Path(path) if path.qself.is_none() => Ok(path.path.clone()),
        _ => Err(syn::Error::new_spanned(&nv.value, "expected a path")),
    }
}

pub fn parse_checkpoint_attrs(attr: TokenStream2) -> syn::Result<CheckpointAttrs> {
    let mut attrs = CheckpointAttrs::default();
    let metas = Punctuated::<Meta, Token![,]>::parse_terminated.parse2(attr)?;
    for meta in metas {
        match &meta {
            Meta::Path(path) if path.is_ident("capture") => attrs.capture = true,
            Meta::NameValue(nv) if nv.path.is_ident("with") => {
                attrs.with = Some(path_value(nv)?);
            }
            Meta::NameValue(nv) if nv.path.is_ident("storage") => {
                let value = str_value(nv)?;
                match value.as_str() {
                    "memory" | "blob" => attrs.storage = Some(value),
                    _ => {
                        return Err(syn::Error::new_spanned(
                            &nv.value,
                            "storage must be \"memory\" or \"blob\"",
                        ))
                    }
                }
            }
            Meta::NameValue(nv) if nv.path.is_ident("dir") => {
                attrs.dir = Some(str_value(nv)?);
            }
            Meta::NameValue(nv) if nv.path.is_ident("name") => {
                attrs.name = Some(str_value(nv)?);
            }
            Meta::NameValue(nv) if nv.path.is_ident("verbosity") => {
                let verbosity: u8 = int_value(nv)?;
                if verbosity > 2 {
                    return Err(syn::Error::new_spanned(&nv.value, "verbosity is 0, 1 or 2"));
                }
                attrs.verbosity = Some(verbosity);
            }
            Meta::NameValue(nv) if nv.path.is_ident("expire_after") => {
                attrs.expire_after = Some(int_value(nv)?);
            }
            Meta::NameValue(nv) if nv.path.is_ident("fn_hash_from") => {
                attrs.fn_hash_from = Some(str_value(nv)?);
            }
            Meta::List(list) if list.path.is_ident("hash_by") => {
                let overrides =
                    list.parse_args_with(Punctuated::<MetaNameValue, Token![,]>::parse_terminated)?;
                for nv in overrides {
                    let param = nv
                        .path
                        .get_ident()
                        .ok_or_else(|| {
                            syn::Error::new_spanned(&nv.path, "expected a parameter name")
                        })?
                        .to_string();
                    attrs.hash_by.push((param, path_value(&nv)?));
                }
            }
            other => {
                return Err(syn::Error::new_spanned(
                    other,
                    "unknown checkpoint option; expected one of with, storage, dir, name, \
                     verbosity, capture, expire_after, fn_hash_from, hash_by(..)",
                ))
            }
        }
    }
    Ok(attrs)
}

pub fn parse_capture_attrs(attr: TokenStream2) -> syn::Result<CaptureAttrs> {
    let mut attrs = CaptureAttrs::default();
    let metas = Punctuated::<Meta, Token![,]>::parse_terminated.parse2(attr)?;
    for meta in metas {
        match &meta {
            Meta::NameValue(nv) if nv.path.is_ident("hash_by") => {
                attrs.hash_by = Some(path_value(nv)?);
            }
            other => {
                return Err(syn::Error::new_spanned(
                    other,
                    "unknown capture option; expected hash_by",
                ))
            }
        }
    }
    Ok(attrs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quote::quote;

    #[test]
    fn test_full_option_set() {
        let attrs = parse_checkpoint_attrs(quote! {
            storage = "memory", dir = "/tmp/cp", name = "Calculator::area",
            verbosity = 2, capture, expire_after = 3600, fn_hash_from = "v2",
            hash_by(a = floor, rest = as_len)
        })
        .unwrap();
        assert_eq!(attrs.storage.as_deref(), Some("memory"));
        assert_eq!(attrs.dir.as_deref(), Some("/tmp/cp"));
        assert_eq!(attrs.name.as_deref(), Some("Calculator::area"));
        assert_eq!(attrs.verbosity, Some(2));
        assert!(attrs.capture);
        assert_eq!(attrs.expire_after, Some(3600));
        assert_eq!(attrs.fn_hash_from.as_deref(), Some("v2"));
        assert_eq!(attrs.hash_by.len(), 2);
        assert_eq!(attrs.hash_by[0].0, "a");
    }

    #[test]
    fn test_with_path() {
        let attrs = parse_checkpoint_attrs(quote! { with = my_config }).unwrap();
        assert!(attrs.with.is_some());
    }

    #[test]
    fn test_empty_options() {
        let attrs = parse_checkpoint_attrs(quote! {}).unwrap();
        assert!(attrs.storage.is_none());
        assert!(!attrs.capture);
    }

    #[test]
    fn test_invalid_storage_is_rejected() {
        assert!(parse_checkpoint_attrs(quote! { storage = "redis" }).is_err());
        assert!(parse_checkpoint_attrs(quote! { verbosity = 9 }).is_err());
        assert!(parse_checkpoint_attrs(quote! { nonsense = 1 }).is_err());
    }

    #[test]
    fn test_capture_hash_by() {
        let attrs = parse_capture_attrs(quote! { hash_by = floor }).unwrap();
        assert!(attrs.hash_by.is_some());
    }
}
