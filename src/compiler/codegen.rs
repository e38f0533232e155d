use heck::ToSnakeCase;
use proc_macro2::{Ident, Span, TokenStream};
use quote::quote;

use crate::graph::{Entry, Graph};

#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub async_variant: bool,
    pub thread_safe: bool,
    /// Name of the generated struct, e.g. `Compiled`.
    pub container_name: String,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            async_variant: false,
            thread_safe: false,
            container_name: "Compiled".to_string(),
        }
    }
}

const RUST_KEYWORDS: &[&str] = &[
    "as", "break", "const", "continue", "crate", "else", "enum", "extern", "false", "fn", "for",
    "if", "impl", "in", "let", "loop", "match", "mod", "move", "mut", "pub", "ref", "return",
    "self", "Self", "static", "struct", "super", "trait", "true", "type", "unsafe", "use",
    "where", "while", "async", "await", "dyn", "abstract", "become", "box", "do", "final",
    "macro", "override", "priv", "typeof", "unsized", "virtual", "yield", "try",
];

fn sanitize_ident(name: &str) -> Ident {
    let snake = name.to_snake_case();
    let snake = if snake.is_empty() {
        "entry".to_string()
    } else if snake.chars().next().unwrap().is_ascii_digit() {
        format!("n_{snake}")
    } else {
        snake
    };
    if RUST_KEYWORDS.contains(&snake.as_str()) {
        Ident::new(&format!("r#{snake}"), Span::call_site())
    } else {
        Ident::new(&snake, Span::call_site())
    }
}

/// Emit a generated container module as Rust source text. Rendering is
/// deliberately minimal (`TokenStream::to_string()`, no `rustfmt` pass)
/// — formatting the output is a host concern, the same way the command
/// line front-end itself is out of scope for this crate.
pub fn compile(graph: &Graph, options: &CompileOptions) -> String {
    let tokens = compile_tokens(graph, options);
    tokens.to_string()
}

fn compile_tokens(graph: &Graph, options: &CompileOptions) -> TokenStream {
    let struct_name = Ident::new(&options.container_name, Span::call_site());

    let mut methods = Vec::new();
    for (name, entry) in &graph.entries {
        if matches!(entry, Entry::Constant(_)) {
            methods.push(compile_constant_accessor(name, options));
        } else {
            methods.push(compile_wired_accessor(name, options));
        }
    }

    let cache_field = if options.thread_safe {
        quote! {}
    } else {
        quote! {
            cache: ::std::cell::RefCell<::std::collections::HashMap<String, ::std::sync::Arc<dyn ::std::any::Any + Send + Sync>>>,
        }
    };

    let cache_init = if options.thread_safe {
        quote! {}
    } else {
        quote! {
            cache: ::std::cell::RefCell::new(::std::collections::HashMap::new()),
        }
    };

    let async_field = if options.async_variant {
        quote! { async_accessors: wireframe::accessor::AsyncAccessors, }
    } else {
        quote! {}
    };

    let async_init = if options.async_variant {
        quote! { async_accessors: container.clone().into_async_accessors(), }
    } else {
        quote! {}
    };

    quote! {
        //! Generated by wireframe's ahead-of-time compiler. Do not edit by hand.

        use std::any::Any;
        use std::sync::Arc;
        use wireframe::error::WiringError;
        use wireframe::container::Container;

        pub struct #struct_name {
            container: Arc<Container>,
            #cache_field
            #async_field
        }

        impl #struct_name {
            pub fn new(container: Arc<Container>) -> Self {
                #struct_name {
                    #cache_init
                    #async_init
                    container,
                }
            }

            #(#methods)*
        }
    }
}

fn compile_constant_accessor(name: &str, options: &CompileOptions) -> TokenStream {
    let method = sanitize_ident(name);
    if options.async_variant {
        quote! {
            pub async fn #method(&self) -> Result<Arc<dyn Any + Send + Sync>, WiringError> {
                self.container.get(#name)
            }
        }
    } else {
        quote! {
            pub fn #method(&self) -> Result<Arc<dyn Any + Send + Sync>, WiringError> {
                self.container.get(#name)
            }
        }
    }
}

fn compile_wired_accessor(name: &str, options: &CompileOptions) -> TokenStream {
    let method = sanitize_ident(name);

    match (options.async_variant, options.thread_safe) {
        (false, false) => quote! {
            pub fn #method(&self) -> Result<Arc<dyn Any + Send + Sync>, WiringError> {
                if let Some(v) = self.cache.borrow().get(#name) {
                    return Ok(v.clone());
                }
                let v = self.container.get(#name)?;
                self.cache.borrow_mut().insert(#name.to_string(), v.clone());
                Ok(v)
            }
        },
        (false, true) => quote! {
            // Thread-safe: the shared container already memoizes under
            // its own two-tier lock, so no redundant per-accessor cache
            // is needed here.
            pub fn #method(&self) -> Result<Arc<dyn Any + Send + Sync>, WiringError> {
                self.container.get(#name)
            }
        },
        (true, false) => quote! {
            pub async fn #method(&self) -> Result<Arc<dyn Any + Send + Sync>, WiringError> {
                if let Some(v) = self.cache.borrow().get(#name) {
                    return Ok(v.clone());
                }
                // The entire build (module resolution, dependency
                // resolution, constructor call) runs inside one
                // offloaded unit with no suspension points in between,
                // so there is nothing to hoist into a local before the
                // call the way a hand-rolled inline constructor call
                // would require.
                let v = self.async_accessors.get(#name).await?;
                self.cache.borrow_mut().insert(#name.to_string(), v.clone());
                Ok(v)
            }
        },
        (true, true) => quote! {
            pub async fn #method(&self) -> Result<Arc<dyn Any + Send + Sync>, WiringError> {
                self.async_accessors.get(#name).await
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{int_val, map_of, str_val};
    use crate::value::MapKey;
    use indexmap::IndexMap;

    #[test]
    fn emits_one_method_per_entry() {
        let mut raw = IndexMap::new();
        raw.insert(
            "m.Date d".to_string(),
            map_of(vec![(MapKey::Str("year".into()), int_val(2003))]),
        );
        raw.insert("host".to_string(), str_val("example.com"));
        let graph = Graph::build(&raw, false).unwrap();

        let source = compile(&graph, &CompileOptions::default());
        assert!(source.contains("fn d"));
        assert!(source.contains("fn host"));
    }

    #[test]
    fn sanitizes_keyword_like_names() {
        assert_eq!(sanitize_ident("type").to_string(), "r#type");
        assert_eq!(sanitize_ident("MyName").to_string(), "my_name");
    }
}
