use proc_macro::TokenStream;
use quote::quote;
use syn::{parse, parse_macro_input, DeriveInput};

#[proc_macro_derive(RegisterWord)]
/// Derived on a 4 byte packed_struct to convert it from and to the 32-bit word the bus moves.
/// Expects `RegisterWord` to be in scope at the derive site.
pub fn derive_register_word(tokens: TokenStream) -> TokenStream {
    let input = parse_macro_input!(tokens as DeriveInput);
    let register = input.ident;
    let generated = quote! {
        impl RegisterWord for #register {
            fn from_word(word: u32) -> packed_struct::PackingResult<Self> {
                <Self as packed_struct::PackedStruct>::unpack(&word.to_be_bytes())
            }

            fn to_word(&self) -> packed_struct::PackingResult<u32> {
                Ok(u32::from_be_bytes(
                    <Self as packed_struct::PackedStruct>::pack(self)?,
                ))
            }
        }
    };
    TokenStream::from(generated)
}

#[proc_macro_attribute]
/// Attaches the module-relative bus offset to a register struct.
/// Expects `FixedOffset` to be in scope at the attribute site.
pub fn offset(attr: TokenStream, item: TokenStream) -> TokenStream {
    let num = match parse::<syn::Lit>(attr) {
        Ok(syn::Lit::Int(v)) => v,
        Ok(other) => {
            return syn::Error::new(other.span(), "The offset must be a literal integer")
                .to_compile_error()
                .into()
        }
        Err(e) => return e.to_compile_error().into(),
    };
    // Get the struct name this offset is for
    let item = parse_macro_input!(item as DeriveInput);
    let ident = item.ident.clone();

    let generated = quote! {
        impl FixedOffset for #ident {
            const OFFSET: u32 = #num;
        }
        #item
    };
    TokenStream::from(generated)
}
