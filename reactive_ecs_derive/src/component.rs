use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Expr, Fields, Lit};

/// Reads `#[component(default = <expr>)]` off one field, if present.
fn field_default(attrs: &[syn::Attribute]) -> Option<Expr> {
    for attr in attrs {
        if !attr.path().is_ident("component") {
            continue;
        }
        let mut found = None;
        let _ = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("default") {
                let value = meta.value()?;
                let expr: Expr = value.parse()?;
                found = Some(expr);
            }
            Ok(())
        });
        if found.is_some() {
            return found;
        }
    }
    None
}

/// Reads `#[component(pooled = false)]` off the struct itself. Absent
/// (or any value other than a literal `false`) leaves pooling on,
/// matching `Component::POOLED`'s own default.
fn struct_pooled(attrs: &[syn::Attribute]) -> bool {
    for attr in attrs {
        if !attr.path().is_ident("component") {
            continue;
        }
        let mut pooled = true;
        let mut saw_pooled = false;
        let parsed = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("pooled") {
                let value = meta.value()?;
                if let Ok(Lit::Bool(lit)) = value.parse::<Lit>() {
                    pooled = lit.value;
                    saw_pooled = true;
                }
            }
            Ok(())
        });
        if parsed.is_ok() && saw_pooled {
            return pooled;
        }
    }
    true
}

pub(crate) fn derive_component_impl(input: TokenStream) -> TokenStream {
    let ast = parse_macro_input!(input as DeriveInput);
    let name = &ast.ident;
    let (impl_generics, ty_generics, where_clause) = ast.generics.split_for_impl();
    let pooled = struct_pooled(&ast.attrs);

    let (reset_body, copy_body): (TokenStream2, TokenStream2) = match &ast.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => {
                let mut reset_stmts = Vec::new();
                let mut copy_stmts = Vec::new();
                for field in &fields.named {
                    let ident = field.ident.as_ref().expect("named field always has an ident");
                    let default = field_default(&field.attrs);
                    let reset_value = match default {
                        Some(expr) => quote! { #expr },
                        None => quote! { ::core::default::Default::default() },
                    };
                    reset_stmts.push(quote! { self.#ident = #reset_value; });
                    copy_stmts.push(quote! { self.#ident = ::core::clone::Clone::clone(&src.#ident); });
                }
                (quote! { #(#reset_stmts)* }, quote! { #(#copy_stmts)* })
            }
            Fields::Unnamed(fields) => {
                let mut reset_stmts = Vec::new();
                let mut copy_stmts = Vec::new();
                for (index, field) in fields.unnamed.iter().enumerate() {
                    let index = syn::Index::from(index);
                    let default = field_default(&field.attrs);
                    let reset_value = match default {
                        Some(expr) => quote! { #expr },
                        None => quote! { ::core::default::Default::default() },
                    };
                    reset_stmts.push(quote! { self.#index = #reset_value; });
                    copy_stmts.push(quote! { self.#index = ::core::clone::Clone::clone(&src.#index); });
                }
                (quote! { #(#reset_stmts)* }, quote! { #(#copy_stmts)* })
            }
            // Tag components: no attributes, `reset`/`copy_from` are no-ops.
            Fields::Unit => (quote! {}, quote! {}),
        },
        _ => {
            return syn::Error::new_spanned(&ast.ident, "Component can only be derived for structs")
                .to_compile_error()
                .into();
        }
    };

    TokenStream::from(quote! {
        impl #impl_generics reactive_ecs::component::Component for #name #ty_generics #where_clause {
            const POOLED: bool = #pooled;

            fn reset(&mut self) {
                #reset_body
            }

            fn copy_from(&mut self, src: &Self) {
                #copy_body
            }
        }
    })
}
