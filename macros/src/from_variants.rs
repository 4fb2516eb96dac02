use proc_macro2::TokenStream;
use quote::{quote, ToTokens};
use std::collections::HashSet;
use syn::{Data, DeriveInput, Field, Fields};

/// Generates `From<Inner> for Enum` for every single-field tuple variant,
/// so packets can be built as `ServerPacket::from(Disconnect { .. })`.
pub fn derive_from_variants_on(input: &DeriveInput) -> syn::Result<TokenStream> {
    let Data::Enum(en) = &input.data else {
        return Err(syn::Error::new_spanned(
            &input.ident,
            "only enums are supported",
        ));
    };

    let enum_ident = &input.ident;

    let mut seen = HashSet::new();
    let mut impls = Vec::new();
    for variant in &en.variants {
        let variant_ident = &variant.ident;
        let Fields::Unnamed(fields) = &variant.fields else {
            continue;
        };
        if fields.unnamed.len() != 1 {
            continue;
        }

        let Field { ty, .. } = &fields.unnamed[0];
        if !seen.insert(ty.to_token_stream().to_string()) {
            return Err(syn::Error::new_spanned(
                ty,
                "two variants wrap the same type; From would be ambiguous",
            ));
        }
        impls.push(quote! {
            impl From<#ty> for #enum_ident {
                fn from(value: #ty) -> Self {
                    Self::#variant_ident(value)
                }
            }
        });
    }

    Ok(quote! {
        #(#impls)*
    })
}
