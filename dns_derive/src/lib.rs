// Derive macro for the closed, discriminant-tagged enums used by the record
// type registry (record type, class, section). Each variant's integer
// discriminant becomes the wire value; the variant name becomes its
// presentation-form text.
use proc_macro::TokenStream;
use syn::parse_macro_input;
use syn::DeriveInput;

mod dns_enum;
use dns_enum::dns_enum;

#[proc_macro_derive(DnsEnum)]
pub fn dns_macro_enum(input: TokenStream) -> TokenStream {
    let ast = parse_macro_input!(input as DeriveInput);
    dns_enum(&ast)
}

#[cfg(test)]
pub(crate) fn get_derive_input(src: &str) -> DeriveInput {
    syn::parse_str(src).expect("failed to parse test fixture as a derive input")
}
