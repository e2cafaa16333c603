//! Procedural macros for checkpoints.
//!
//! `#[checkpoint]` wraps a function with the persistent cache engine and
//! generates its companion operations. `#[track]` registers a plain
//! function (or value) so it participates in dependent fingerprints.
//! `#[capture]` and `#[capture_once]` register module statics as captured
//! values.
//!
//! All generated code goes through the `checkpoints` facade crate, so the
//! macros are only usable alongside it.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{parse_macro_input, FnArg, Item, ItemFn, Pat, ReturnType, Type};

use checkpoints_macro_utils::{
    fn_body_string, free_symbols, parse_capture_attrs, parse_checkpoint_attrs, CheckpointAttrs,
};

/// One parsed parameter of the decorated function.
struct Param {
    ident: syn::Ident,
    ty: Box<Type>,
    hash_by: Option<syn::Path>,
}

struct Target {
    item: ItemFn,
    has_receiver: bool,
    params: Vec<Param>,
    ret_ty: TokenStream2,
    is_async: bool,
}

fn analyze_target(mut item: ItemFn, attrs: &CheckpointAttrs) -> syn::Result<Target> {
    if !item.sig.generics.params.is_empty() || item.sig.generics.where_clause.is_some() {
        return Err(syn::Error::new_spanned(
            &item.sig.generics,
            "checkpointed functions cannot be generic",
        ));
    }

    let mut has_receiver = false;
    let mut params = Vec::new();
    for input in &item.sig.inputs {
        match input {
            FnArg::Receiver(receiver) => {
                if receiver.reference.is_none() || receiver.mutability.is_some() {
                    return Err(syn::Error::new_spanned(
                        receiver,
                        "checkpointed methods take &self",
                    ));
                }
                has_receiver = true;
            }
            FnArg::Typed(pat) => match pat.pat.as_ref() {
                Pat::Ident(ident) => params.push(Param {
                    ident: ident.ident.clone(),
                    ty: pat.ty.clone(),
                    hash_by: None,
                }),
                other => {
                    return Err(syn::Error::new_spanned(
                        other,
                        "checkpoint parameters must be plain identifiers",
                    ))
                }
            },
        }
    }

    for (name, path) in &attrs.hash_by {
        match params.iter_mut().find(|param| param.ident == name) {
            Some(param) => param.hash_by = Some(path.clone()),
            None => {
                return Err(syn::Error::new(
                    proc_macro2::Span::call_site(),
                    format!("hash_by names unknown parameter `{name}`"),
                ))
            }
        }
    }

    let ret_ty = match &item.sig.output {
        ReturnType::Default => quote! { () },
        ReturnType::Type(_, ty) => quote! { #ty },
    };
    let is_async = item.sig.asyncness.is_some();

    // The canonical form must not depend on whether sibling framework
    // attributes have been expanded yet.
    item.attrs
        .retain(|attr| !checkpoints_macro_utils::is_framework_attr(attr));

    Ok(Target {
        item,
        has_receiver,
        params,
        ret_ty,
        is_async,
    })
}

fn config_expr(attrs: &CheckpointAttrs) -> TokenStream2 {
    let mut config = match &attrs.with {
        Some(path) => quote! { #path() },
        None => quote! { ::checkpoints::Checkpointer::new() },
    };
    match attrs.storage.as_deref() {
        Some("memory") => {
            config = quote! { #config.storage(::checkpoints::StorageKind::Memory) };
        }
        Some("blob") => {
            config = quote! { #config.storage(::checkpoints::StorageKind::Blob) };
        }
        _ => {}
    }
    if let Some(dir) = &attrs.dir {
        config = quote! { #config.directory(#dir) };
    }
    if let Some(verbosity) = attrs.verbosity {
        config = quote! { #config.verbosity(#verbosity) };
    }
    if attrs.capture {
        config = quote! { #config.capture(true) };
    }
    if let Some(secs) = attrs.expire_after {
        config = quote! { #config.expire_after(::core::time::Duration::from_secs(#secs)) };
    }
    if let Some(tag) = &attrs.fn_hash_from {
        config = quote! { #config.fn_hash_from(#tag) };
    }
    config
}

/// The sorted `(name, value)` feed for the `NAMED` region, as statements
/// over the hasher `__h`. Parameters are in scope by reference.
fn named_feed(target: &Target) -> TokenStream2 {
    let mut entries: Vec<(String, TokenStream2)> = Vec::new();
    if target.has_receiver {
        entries.push((
            "self".to_string(),
            quote! { ::checkpoints::__private::HashValue::hash_value(self, __h); },
        ));
    }
    for param in &target.params {
        let ident = &param.ident;
        let feed = match &param.hash_by {
            Some(path) => quote! {
                ::checkpoints::__private::HashValue::hash_value(&#path(#ident), __h);
            },
            None => quote! {
                ::checkpoints::__private::HashValue::hash_value(#ident, __h);
            },
        };
        entries.push((param.ident.to_string(), feed));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let statements = entries.into_iter().map(|(name, feed)| {
        quote! {
            __h.update(#name);
            #feed
        }
    });
    quote! { #(#statements)* }
}

/// Wraps a function with the cache engine.
///
/// See the `checkpoints` crate documentation for the full option list and
/// the generated companion functions.
#[proc_macro_attribute]
pub fn checkpoint(attr: TokenStream, item: TokenStream) -> TokenStream {
    let attrs = match parse_checkpoint_attrs(attr.into()) {
        Ok(attrs) => attrs,
        Err(err) => return err.to_compile_error().into(),
    };
    let item = parse_macro_input!(item as ItemFn);
    let target = match analyze_target(item, &attrs) {
        Ok(target) => target,
        Err(err) => return err.to_compile_error().into(),
    };
    expand_checkpoint(&attrs, &target).into()
}

fn expand_checkpoint(attrs: &CheckpointAttrs, target: &Target) -> TokenStream2 {
    let item = &target.item;
    let vis = &item.vis;
    let sig = &item.sig;
    let block = &item.block;
    let fn_attrs = &item.attrs;
    let name = &sig.ident;
    let ret_ty = &target.ret_ty;
    let is_async = target.is_async;

    let body = fn_body_string(item);
    let symbols = free_symbols(item);
    let reg_name = attrs.name.clone().unwrap_or_else(|| name.to_string());
    let config = config_expr(attrs);
    let feed = named_feed(target);

    let handle_fn = format_ident!("{}_checkpoint", name);
    let key_fn = format_ident!("__{}_call_hash", name);
    let rerun_fn = format_ident!("{}_rerun", name);
    let get_fn = format_ident!("{}_get", name);
    let get_or_fn = format_ident!("{}_get_or", name);
    let set_fn = format_ident!("{}_set", name);
    let set_awaitable_fn = format_ident!("{}_set_awaitable", name);
    let exists_fn = format_ident!("{}_exists", name);
    let delete_fn = format_ident!("{}_delete", name);
    let call_hash_fn = format_ident!("{}_call_hash", name);

    let param_idents: Vec<_> = target.params.iter().map(|p| p.ident.clone()).collect();
    let param_tys: Vec<_> = target.params.iter().map(|p| p.ty.clone()).collect();

    // The wrapper and rerun keep the original typed patterns (so `mut`
    // bindings survive into the moved body); the other companions only
    // hash the values and use plain identifiers.
    let body_param_list: Vec<TokenStream2> = sig
        .inputs
        .iter()
        .filter_map(|arg| match arg {
            FnArg::Receiver(_) => None,
            FnArg::Typed(pat) => Some(quote! { #pat }),
        })
        .collect();
    let body_params = quote! { #(#body_param_list),* };

    // Signature fragments, with and without the receiver.
    let receiver = target.has_receiver.then(|| quote! { &self, });
    let owned_params = quote! { #(#param_idents: #param_tys),* };
    let ref_params = quote! { #(#param_idents: &#param_tys),* };
    let ref_args = quote! { #(&#param_idents),* };

    // How generated code reaches the handle and the key function from
    // each context.
    let handle_path = if target.has_receiver {
        quote! { Self::#handle_fn }
    } else {
        quote! { #handle_fn }
    };
    let key_call = if target.has_receiver {
        quote! { self.#key_fn(#ref_args) }
    } else {
        quote! { #key_fn(#ref_args) }
    };

    let registration_key = quote! {
        ::core::concat!(::core::module_path!(), "::", #reg_name)
    };
    let symbol_literals = symbols.iter().map(|symbol| quote! { #symbol });

    let handle_item = quote! {
        /// The cache handle for this function: identity, `reinit`,
        /// `cleanup` and `clear` live here.
        #vis fn #handle_fn() -> &'static ::checkpoints::CachedFunction<#ret_ty> {
            fn __config() -> ::checkpoints::Checkpointer {
                #config
            }
            ::checkpoints::__private::inventory::submit! {
                ::checkpoints::__private::Registration::checkpoint(
                    #registration_key,
                    #body,
                    &[#(#symbol_literals),*],
                    __config,
                )
            }
            static __HANDLE: ::checkpoints::__private::Lazy<
                ::checkpoints::CachedFunction<#ret_ty>,
            > = ::checkpoints::__private::Lazy::new(|| {
                ::checkpoints::CachedFunction::new(
                    __config(),
                    ::checkpoints::__private::FnSpec {
                        reg_key: #registration_key,
                        file: ::core::file!(),
                        name: #reg_name,
                        is_async: #is_async,
                    },
                )
            });
            &__HANDLE
        }
    };

    let key_item = quote! {
        #[doc(hidden)]
        fn #key_fn(#receiver #ref_params) -> ::std::string::String {
            #handle_path().call_hash_with(|__h| {
                #feed
            })
        }
    };

    let (wrapper, rerun) = if is_async {
        let wrapper = quote! {
            #(#fn_attrs)*
            #vis async fn #name(#receiver #body_params) -> #ret_ty {
                let __call_hash = #key_call;
                ::checkpoints::__private::expect_checkpoint(
                    #handle_path()
                        .invoke_async(&__call_hash, false, move || async move #block)
                        .await,
                )
            }
        };
        let rerun = quote! {
            /// Forces re-execution, overwriting any stored entry.
            #vis async fn #rerun_fn(#receiver #body_params) -> #ret_ty {
                let __call_hash = #key_call;
                ::checkpoints::__private::expect_checkpoint(
                    #handle_path()
                        .invoke_async(&__call_hash, true, move || async move #block)
                        .await,
                )
            }
        };
        (wrapper, rerun)
    } else {
        let wrapper = quote! {
            #(#fn_attrs)*
            #vis fn #name(#receiver #body_params) -> #ret_ty {
                let __call_hash = #key_call;
                ::checkpoints::__private::expect_checkpoint(
                    #handle_path().invoke(&__call_hash, false, move || #block),
                )
            }
        };
        let rerun = quote! {
            /// Forces re-execution, overwriting any stored entry.
            #vis fn #rerun_fn(#receiver #body_params) -> #ret_ty {
                let __call_hash = #key_call;
                ::checkpoints::__private::expect_checkpoint(
                    #handle_path().invoke(&__call_hash, true, move || #block),
                )
            }
        };
        (wrapper, rerun)
    };

    let set_awaitable = is_async.then(|| {
        quote! {
            /// Stores a value the way the async execute path would.
            #vis fn #set_awaitable_fn(
                #receiver __value: #ret_ty,
                #owned_params
            ) -> ::core::result::Result<(), ::checkpoints::CheckpointError> {
                let __call_hash = #key_call;
                #handle_path().set_awaitable(&__value, &__call_hash)
            }
        }
    });

    quote! {
        #wrapper

        #handle_item

        #key_item

        #rerun

        /// Load-only access to the stored result for these arguments.
        #vis fn #get_fn(
            #receiver #owned_params
        ) -> ::core::result::Result<#ret_ty, ::checkpoints::CheckpointError> {
            let __call_hash = #key_call;
            #handle_path().get(&__call_hash)
        }

        /// As the load-only accessor, falling back to `__default`.
        #vis fn #get_or_fn(#receiver __default: #ret_ty, #owned_params) -> #ret_ty {
            let __call_hash = #key_call;
            #handle_path().get_or(__default, &__call_hash)
        }

        /// Write-only access: stores `__value` for these arguments.
        #vis fn #set_fn(
            #receiver __value: #ret_ty,
            #owned_params
        ) -> ::core::result::Result<(), ::checkpoints::CheckpointError> {
            let __call_hash = #key_call;
            #handle_path().set(&__value, &__call_hash)
        }

        #set_awaitable

        /// Whether a stored entry exists for these arguments.
        #vis fn #exists_fn(#receiver #owned_params) -> bool {
            let __call_hash = #key_call;
            #handle_path().exists(&__call_hash)
        }

        /// Removes the stored entry for these arguments, if any.
        #vis fn #delete_fn(
            #receiver #owned_params
        ) -> ::core::result::Result<(), ::checkpoints::CheckpointError> {
            let __call_hash = #key_call;
            #handle_path().delete(&__call_hash)
        }

        /// The call hash for these arguments, for diagnostics.
        #vis fn #call_hash_fn(#receiver #owned_params) -> ::std::string::String {
            #key_call
        }
    }
}

/// Registers a plain function or module value so it participates in
/// dependent fingerprints without being cached itself.
#[proc_macro_attribute]
pub fn track(attr: TokenStream, item: TokenStream) -> TokenStream {
    let attr2: TokenStream2 = attr.into();
    if !attr2.is_empty() {
        return syn::Error::new_spanned(attr2, "track takes no options")
            .to_compile_error()
            .into();
    }
    let item = parse_macro_input!(item as Item);
    match item {
        Item::Fn(item) => expand_track_fn(item).into(),
        Item::Static(item) => {
            let name = item.ident.clone();
            expand_value(quote! { #item }, &name, None, false, false).into()
        }
        Item::Const(item) => {
            let name = item.ident.clone();
            expand_value(quote! { #item }, &name, None, false, false).into()
        }
        other => syn::Error::new_spanned(other, "track applies to functions, statics and consts")
            .to_compile_error()
            .into(),
    }
}

fn expand_track_fn(mut item: ItemFn) -> TokenStream2 {
    let body = fn_body_string(&item);
    let symbols = free_symbols(&item);
    item.attrs
        .retain(|attr| !checkpoints_macro_utils::is_framework_attr(attr));

    let name = item.sig.ident.to_string();
    let reg_fn = format_ident!("__{}_track", item.sig.ident);
    let symbol_literals = symbols.iter().map(|symbol| quote! { #symbol });

    quote! {
        #item

        #[doc(hidden)]
        #[allow(dead_code)]
        fn #reg_fn() {
            ::checkpoints::__private::inventory::submit! {
                ::checkpoints::__private::Registration::tracked(
                    ::core::concat!(::core::module_path!(), "::", #name),
                    #body,
                    &[#(#symbol_literals),*],
                )
            }
        }
    }
}

/// Marks a module-level value as a capturable: its current digest
/// participates in the identity of every function that references it.
#[proc_macro_attribute]
pub fn capture(attr: TokenStream, item: TokenStream) -> TokenStream {
    expand_capture(attr, item, false)
}

/// As `#[capture]`, but the digest freezes at first realization; later
/// mutations are invisible to identity.
#[proc_macro_attribute]
pub fn capture_once(attr: TokenStream, item: TokenStream) -> TokenStream {
    expand_capture(attr, item, true)
}

fn expand_capture(attr: TokenStream, item: TokenStream, once: bool) -> TokenStream {
    let attrs = match parse_capture_attrs(attr.into()) {
        Ok(attrs) => attrs,
        Err(err) => return err.to_compile_error().into(),
    };
    let item = parse_macro_input!(item as Item);
    let (tokens, name) = match item {
        Item::Static(item) => {
            let name = item.ident.clone();
            (quote! { #item }, name)
        }
        Item::Const(item) => {
            let name = item.ident.clone();
            (quote! { #item }, name)
        }
        other => {
            return syn::Error::new_spanned(other, "capture applies to statics and consts")
                .to_compile_error()
                .into()
        }
    };
    expand_value(tokens, &name, attrs.hash_by, true, once).into()
}

fn expand_value(
    item: TokenStream2,
    name: &syn::Ident,
    hash_by: Option<syn::Path>,
    always: bool,
    once: bool,
) -> TokenStream2 {
    let name_str = name.to_string();
    let capture_fn = format_ident!("__{}_capture", name);
    let feed = match hash_by {
        Some(path) => quote! {
            ::checkpoints::__private::HashValue::hash_value(&#path(&#name), __h);
        },
        None => quote! {
            ::checkpoints::__private::HashValue::hash_value(&#name, __h);
        },
    };

    quote! {
        #item

        #[doc(hidden)]
        #[allow(non_snake_case)]
        fn #capture_fn(__h: &mut ::checkpoints::__private::StructuralHash) {
            #feed
        }

        ::checkpoints::__private::inventory::submit! {
            ::checkpoints::__private::Registration::value(
                ::core::concat!(::core::module_path!(), "::", #name_str),
                ::core::concat!(::core::file!(), "/", #name_str),
                #capture_fn,
                #always,
                #once,
            )
        }
    }
}
