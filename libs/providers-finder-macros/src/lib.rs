use heck::ToSnakeCase;
use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::{format_ident, quote};
use syn::{
    parse::Parse, parse::ParseStream, parse_macro_input, punctuated::Punctuated, DeriveInput, Expr,
    Lit, LitStr, Meta, Token,
};

const VALID_PARAMS: &[&str] = &["namespace", "contract", "ctor"];

fn suggest_param(input: &str) -> Option<&'static str> {
    VALID_PARAMS
        .iter()
        .map(|&p| (p, strsim::jaro_winkler(input, p)))
        .filter(|(_, score)| *score > 0.7)
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(p, _)| p)
}

/// Configuration parsed from #[provider(...)] attribute
struct ProviderConfig {
    namespace: String,
    contract: String,
    ctor: Option<Expr>,
}

fn string_value(nv: &syn::MetaNameValue, example: &str) -> syn::Result<String> {
    match &nv.value {
        Expr::Lit(syn::ExprLit {
            lit: Lit::Str(s), ..
        }) => {
            let v = s.value();
            if v.trim().is_empty() {
                return Err(syn::Error::new_spanned(s, "value must not be empty"));
            }
            Ok(v)
        }
        other => Err(syn::Error::new_spanned(
            other,
            format!("expected a string literal, e.g. {example}"),
        )),
    }
}

impl Parse for ProviderConfig {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut namespace: Option<String> = None;
        let mut contract: Option<String> = None;
        let mut ctor: Option<Expr> = None;

        let punctuated: Punctuated<Meta, Token![,]> =
            input.parse_terminated(Meta::parse, Token![,])?;

        for meta in punctuated {
            match meta {
                Meta::NameValue(nv) if nv.path.is_ident("namespace") => {
                    if namespace.is_some() {
                        return Err(syn::Error::new_spanned(
                            nv.path,
                            "duplicate `namespace` parameter",
                        ));
                    }
                    namespace = Some(string_value(&nv, "namespace = \"Billing\"")?);
                }
                Meta::NameValue(nv) if nv.path.is_ident("contract") => {
                    if contract.is_some() {
                        return Err(syn::Error::new_spanned(
                            nv.path,
                            "duplicate `contract` parameter",
                        ));
                    }
                    contract = Some(string_value(&nv, "contract = \"Routes\"")?);
                }
                Meta::NameValue(nv) if nv.path.is_ident("ctor") => {
                    if ctor.is_some() {
                        return Err(syn::Error::new_spanned(nv.path, "duplicate `ctor` parameter"));
                    }
                    if let Expr::Lit(syn::ExprLit {
                        lit: Lit::Str(s), ..
                    }) = &nv.value
                    {
                        return Err(syn::Error::new_spanned(
                            s,
                            "ctor must be a Rust expression, not a string literal. \
                 Use: ctor = MyProvider::new()  (with parentheses), \
                 or:  ctor = Default::default()",
                        ));
                    }
                    ctor = Some(nv.value);
                }
                other => {
                    let name = other
                        .path()
                        .get_ident()
                        .map(|i| i.to_string())
                        .unwrap_or_default();
                    let msg = match suggest_param(&name) {
                        Some(s) => format!(
                            "unknown attribute parameter '{name}'\n       = help: did you mean `{s}`?"
                        ),
                        None => format!(
                            "unknown attribute parameter '{name}'; expected one of: {}",
                            VALID_PARAMS.join(", ")
                        ),
                    };
                    return Err(syn::Error::new_spanned(other, msg));
                }
            }
        }

        let namespace = namespace.ok_or_else(|| {
            syn::Error::new(
                Span::call_site(),
                "namespace parameter is required, e.g. #[provider(namespace = \"Billing\", contract = \"Routes\")]",
            )
        })?;
        let contract = contract.ok_or_else(|| {
            syn::Error::new(
                Span::call_site(),
                "contract parameter is required, e.g. #[provider(namespace = \"Billing\", contract = \"Routes\")]",
            )
        })?;

        Ok(ProviderConfig {
            namespace,
            contract,
            ctor,
        })
    }
}

/// Registers the annotated type as the implementation of `contract` for
/// `namespace`.
///
/// `ctor` must be a Rust expression that evaluates to the provider instance,
/// e.g. `ctor = MyProvider::new()`; it defaults to `Default::default()`.
#[proc_macro_attribute]
pub fn provider(attr: TokenStream, item: TokenStream) -> TokenStream {
    let config = parse_macro_input!(attr as ProviderConfig);
    let input = parse_macro_input!(item as DeriveInput);

    let struct_ident = input.ident.clone();
    let generics_clone = input.generics.clone();
    let (_, ty_generics, _) = generics_clone.split_for_impl();

    let namespace_lit = LitStr::new(&config.namespace, Span::call_site());
    let contract_lit = LitStr::new(&config.contract, Span::call_site());

    let constructor = match &config.ctor {
        Some(expr) => quote! { #expr },
        None => quote! { <#struct_ident #ty_generics as ::core::default::Default>::default() },
    };

    let registrator_name = format_ident!(
        "__{}_{}_registrator",
        struct_ident.to_string().to_snake_case(),
        config.contract.to_snake_case()
    );

    let expanded = quote! {
        #input

        // Compile-time assertion (better error if the trait impl is missing)
        const _: () = {
            #[allow(dead_code)]
            fn __providers_finder_require_Provider_impl()
            where
                #struct_ident #ty_generics: ::providers_finder::contracts::Provider,
            {}
        };

        // Registrator that targets the *builder*, not the final registry
        #[doc(hidden)]
        #[allow(non_snake_case)]
        fn #registrator_name(b: &mut ::providers_finder::registry::RegistryBuilder) {
            use ::std::sync::Arc;

            let provider: Arc<#struct_ident #ty_generics> = Arc::new(#constructor);
            b.register(
                #namespace_lit,
                #contract_lit,
                ::core::concat!(::core::module_path!(), "::", ::core::stringify!(#struct_ident)),
                provider as Arc<dyn ::providers_finder::contracts::Provider>,
            );
        }

        ::providers_finder::inventory::submit! {
            ::providers_finder::registry::Registrator(#registrator_name)
        }
    };

    TokenStream::from(expanded)
}
