use kernel_payload_derive_impl::*;
use quote::ToTokens;

fn main() {
    let compiler = Compiler::new(false);
    let item: syn::ItemStruct = syn::parse_str(
        r#"
        #[derive(Immediate)]
        #[repr(C)]
        struct VmeSearch {
            block_type: u32,
            origin: [i16; 2],
            cost_center: u64,
        }
        "#,
    )
    .unwrap();
    println!("{}", item.to_token_stream());
    let out = compiler.derive_immediate(&item);
    let file: syn::File = syn::parse2(out).unwrap();
    println!("{}", prettyplease::unparse(&file));
}
