//! See stomp for a description of this crate.

#![recursion_limit = "128"]

extern crate proc_macro;

use proc_macro2::TokenStream;
use quote::{quote, ToTokens};
use syn::ext::IdentExt;
use syn::parse::{Parse, ParseStream};
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::{parse_macro_input, DeriveInput, Token};

///////////////////////////////////////// #[derive(Args)] //////////////////////////////////////////

/// Derive `stomp::Args` for a struct with named fields.
///
/// Fields marked `#[stomp(...)]` bind to the command line; all other fields take their `Default`.
/// The attribute accepts, in any order and each at most once:
///
/// - `long = "..."` and `short = "..."`:  the exact tokens that name the option.
/// - `default = <expr>`:  the value when the option is absent; `Default::default()` otherwise.  A
///   string literal converts with `From<&str>`, so `default = "x"` suits `String` fields.
/// - `required`:  the option must be present.
///
/// `Option<T>` fields parse a `T` and store `Some`.  Every other bound field parses its own type.
#[proc_macro_derive(Args, attributes(stomp))]
pub fn derive_args(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream> {
    // `ty_name` holds the type's identifier.
    let ty_name = &input.ident;
    // Break out for templating purposes.
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match input.data {
        syn::Data::Struct(ref ds) => match ds.fields {
            syn::Fields::Named(ref fields) => fields,
            syn::Fields::Unnamed(_) => {
                return Err(syn::Error::new(
                    ty_name.span(),
                    "structs with unnamed fields are not supported",
                ));
            }
            syn::Fields::Unit => {
                return Err(syn::Error::new(
                    ty_name.span(),
                    "unit structs are not supported",
                ));
            }
        },
        syn::Data::Enum(_) => {
            return Err(syn::Error::new(ty_name.span(), "enums are not supported"));
        }
        syn::Data::Union(_) => {
            return Err(syn::Error::new(ty_name.span(), "unions are not supported"));
        }
    };

    let mut visitor = ArgsVisitor::default();
    for field in fields.named.iter() {
        visitor.visit_field(field)?;
    }
    let ArgsVisitor {
        defaults,
        declarations,
    } = visitor;

    Ok(quote! {
        impl #impl_generics ::stomp::Args for #ty_name #ty_generics #where_clause {
            fn defaults() -> Self {
                Self {
                    #defaults
                }
            }

            fn declarations() -> ::std::vec::Vec<::stomp::Binding<Self>> {
                #[allow(unused_mut)]
                let mut bindings = ::std::vec::Vec::new();
                #declarations
                bindings
            }
        }
    })
}

/////////////////////////////////////////// ArgsVisitor ////////////////////////////////////////////

#[derive(Default)]
struct ArgsVisitor {
    defaults: TokenStream,
    declarations: TokenStream,
}

impl ArgsVisitor {
    fn visit_field(&mut self, field: &syn::Field) -> syn::Result<()> {
        let field_ident = match &field.ident {
            Some(field_ident) => field_ident,
            None => {
                return Err(syn::Error::new(field.span(), "field must be named"));
            }
        };
        let field_ty = &field.ty;
        let field_meta = match parse_meta(&field.attrs)? {
            Some(field_meta) => field_meta,
            None => {
                let defaults = &self.defaults;
                self.defaults = quote! {
                    #defaults
                    #field_ident: ::std::default::Default::default(),
                };
                return Ok(());
            }
        };

        let inner_ty = option_inner(field_ty);
        let value_ty = inner_ty.unwrap_or(field_ty);

        // Seed the field with its declared default.
        let default = match field_meta.default {
            Some(expr) => default_expr(field_ty, inner_ty, expr),
            None => quote! { ::std::default::Default::default() },
        };
        let defaults = &self.defaults;
        self.defaults = quote! {
            #defaults
            #field_ident: #default,
        };

        // Convert a raw value into the field and render it back.
        let field_name = field_ident.unraw().to_string();
        let expected = type_name(value_ty);
        let (assign, render) = if inner_ty.is_some() {
            (
                quote! {
                    bound.#field_ident = ::std::option::Option::Some(::stomp::parse_field::<#value_ty>(s)?);
                },
                quote! {
                    bound.#field_ident.as_ref().map(|v| ::std::string::ToString::to_string(v))
                },
            )
        } else {
            (
                quote! {
                    bound.#field_ident = ::stomp::parse_field::<#value_ty>(s)?;
                },
                quote! {
                    ::std::option::Option::Some(::std::string::ToString::to_string(&bound.#field_ident))
                },
            )
        };
        let mut binding = quote! {
            ::stomp::Binding::new(
                #field_name,
                #expected,
                |bound: &mut Self, s: &str| -> ::std::result::Result<(), ::std::string::String> {
                    #assign
                    ::std::result::Result::Ok(())
                },
                |bound: &Self| -> ::std::option::Option<::std::string::String> {
                    #render
                },
            )
        };
        if let Some(long) = field_meta.long {
            binding = quote! { #binding.long(#long) };
        }
        if let Some(short) = field_meta.short {
            binding = quote! { #binding.short(#short) };
        }
        if field_meta.required {
            binding = quote! { #binding.required() };
        }
        let declarations = &self.declarations;
        self.declarations = quote! {
            #declarations
            bindings.push(#binding);
        };
        Ok(())
    }
}

/// The type as it would be written:  tokens print with a space between each pair, so drop the ones
/// that sit inside paths, generics, and references.
fn type_name(ty: &syn::Type) -> String {
    let mut name = ty.to_token_stream().to_string();
    for (spaced, tight) in [
        (" :: ", "::"),
        (":: ", "::"),
        (" <", "<"),
        ("< ", "<"),
        (" >", ">"),
        (" ,", ","),
        (" ;", ";"),
        ("& ", "&"),
    ] {
        name = name.replace(spaced, tight);
    }
    name
}

/// The `T` of an `Option<T>`, however the path to `Option` is spelled.
fn option_inner(ty: &syn::Type) -> Option<&syn::Type> {
    let path = match ty {
        syn::Type::Path(ty) if ty.qself.is_none() => &ty.path,
        _ => {
            return None;
        }
    };
    let segment = path.segments.last()?;
    if segment.ident != "Option" {
        return None;
    }
    match &segment.arguments {
        syn::PathArguments::AngleBracketed(args) if args.args.len() == 1 => {
            match args.args.first()? {
                syn::GenericArgument::Type(inner) => Some(inner),
                _ => None,
            }
        }
        _ => None,
    }
}

fn default_expr(field_ty: &syn::Type, inner_ty: Option<&syn::Type>, expr: syn::Expr) -> TokenStream {
    match expr {
        syn::Expr::Lit(syn::ExprLit {
            lit: syn::Lit::Str(lit),
            ..
        }) => match inner_ty {
            Some(inner_ty) => quote! {
                ::std::option::Option::Some(<#inner_ty as ::std::convert::From<&'static str>>::from(#lit))
            },
            None => quote! {
                <#field_ty as ::std::convert::From<&'static str>>::from(#lit)
            },
        },
        expr => quote! {
            {
                let value: #field_ty = #expr;
                value
            }
        },
    }
}

//////////////////////////////////////////// attributes ////////////////////////////////////////////

const USAGE: &str = "must provide attributes of the form `stomp(long = \"...\", short = \"...\", default = <expr>, required)`";
const META_PATH: &str = "stomp";

#[derive(Default)]
struct FieldMeta {
    long: Option<syn::LitStr>,
    short: Option<syn::LitStr>,
    default: Option<syn::Expr>,
    required: bool,
}

enum MetaItem {
    Long(syn::Ident, syn::LitStr),
    Short(syn::Ident, syn::LitStr),
    Default(syn::Ident, syn::Expr),
    Required(syn::Ident),
}

impl Parse for MetaItem {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let key = input.call(syn::Ident::parse_any)?;
        match key.to_string().as_str() {
            "long" => {
                input.parse::<Token![=]>()?;
                Ok(MetaItem::Long(key, input.parse()?))
            }
            "short" => {
                input.parse::<Token![=]>()?;
                Ok(MetaItem::Short(key, input.parse()?))
            }
            "default" => {
                input.parse::<Token![=]>()?;
                Ok(MetaItem::Default(key, input.parse()?))
            }
            "required" => Ok(MetaItem::Required(key)),
            _ => Err(syn::Error::new(key.span(), USAGE)),
        }
    }
}

fn duplicate(key: &syn::Ident) -> syn::Error {
    syn::Error::new(key.span(), format!("`{key}` given more than once"))
}

/// Parse the `#[stomp(...)]` attribute of a field.  `None` means the field is not bound.
fn parse_meta(attrs: &[syn::Attribute]) -> syn::Result<Option<FieldMeta>> {
    let mut found: Option<FieldMeta> = None;
    for attr in attrs.iter() {
        if !attr.path.is_ident(META_PATH) {
            continue;
        }
        if found.is_some() {
            return Err(syn::Error::new(attr.span(), "only one `stomp` attribute per field"));
        }
        let mut field_meta = FieldMeta::default();
        // A bare `#[stomp]` binds the field without naming it.
        if !attr.tokens.is_empty() {
            let items =
                attr.parse_args_with(Punctuated::<MetaItem, Token![,]>::parse_terminated)?;
            for item in items {
                match item {
                    MetaItem::Long(key, long) => {
                        if field_meta.long.replace(long).is_some() {
                            return Err(duplicate(&key));
                        }
                    }
                    MetaItem::Short(key, short) => {
                        if field_meta.short.replace(short).is_some() {
                            return Err(duplicate(&key));
                        }
                    }
                    MetaItem::Default(key, default) => {
                        if field_meta.default.replace(default).is_some() {
                            return Err(duplicate(&key));
                        }
                    }
                    MetaItem::Required(key) => {
                        if field_meta.required {
                            return Err(duplicate(&key));
                        }
                        field_meta.required = true;
                    }
                }
            }
        }
        found = Some(field_meta);
    }
    Ok(found)
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////
