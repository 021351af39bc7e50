use proc_macro::TokenStream;

#[proc_macro_derive(Immediate)]
pub fn derive_immediate(item: TokenStream) -> TokenStream {
    let item: syn::ItemStruct = syn::parse(item).unwrap();
    let compiler = kernel_payload_derive_impl::Compiler::new(false);
    compiler.derive_immediate(&item).into()
}

#[proc_macro_derive(__Immediate)]
pub fn _derive_immediate(item: TokenStream) -> TokenStream {
    let item: syn::ItemStruct = syn::parse(item).unwrap();
    let compiler = kernel_payload_derive_impl::Compiler::new(true);
    compiler.derive_immediate(&item).into()
}
