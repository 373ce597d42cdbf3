//! `#[derive(Component)]` — the type-schema helper described in the
//! consumer-surface contract: infers `reset`/`copy_from` from each
//! field's declared or inferred default instead of requiring every
//! component type to write them by hand.

mod component;

use proc_macro::TokenStream;

#[proc_macro_derive(Component, attributes(component))]
pub fn derive_component(input: TokenStream) -> TokenStream {
    component::derive_component_impl(input)
}
