use proc_macro2::TokenStream;
use quote::{quote, quote_spanned};
use syn::{spanned::Spanned, Attribute, Fields, ItemStruct};

pub struct Compiler {
    inside_crate: bool,
}
impl Compiler {
    fn crate_path(&self) -> TokenStream {
        if self.inside_crate {
            quote!(crate)
        } else {
            quote!(kernel_payload)
        }
    }
    pub fn new(inside_crate: bool) -> Self {
        Self { inside_crate }
    }
    fn check_repr_c(&self, attributes: &[Attribute]) {
        let mut has_repr_c = false;
        for attr in attributes {
            if !attr.path().is_ident("repr") {
                continue;
            }
            // repr(C, align(N)) is fine, the field offsets still follow C rules
            let _ = attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("C") {
                    has_repr_c = true;
                }
                if meta.input.peek(syn::token::Paren) {
                    let _args;
                    syn::parenthesized!(_args in meta.input);
                }
                Ok(())
            });
        }
        if !has_repr_c {
            panic!("Struct must have repr(C) attribute");
        }
    }
    /// Generates an `Immediate` impl that writes every field at its C layout
    /// offset. Padding bytes are never written, so they stay zeroed in the
    /// buffer `Immediate::to_bytes` allocates.
    pub fn derive_immediate(&self, struct_: &ItemStruct) -> TokenStream {
        self.check_repr_c(&struct_.attrs);
        let span = struct_.span();
        let crate_path = self.crate_path();
        let name = &struct_.ident;
        let generics = &struct_.generics;
        let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();
        let fields = match &struct_.fields {
            Fields::Named(fields) => fields.named.iter().collect::<Vec<_>>(),
            Fields::Unit => vec![],
            Fields::Unnamed(_) => panic!("Tuple structs are not supported, name the fields"),
        };
        let field_types: Vec<_> = fields.iter().map(|f| &f.ty).collect();
        let field_names: Vec<_> = fields.iter().map(|f| f.ident.as_ref().unwrap()).collect();
        let bounds = field_types
            .iter()
            .map(|ty| quote_spanned!(span=> #ty: #crate_path::Immediate))
            .collect::<Vec<_>>();
        let where_clause = match where_clause {
            Some(w) => {
                let predicates = &w.predicates;
                quote!(where #predicates, #(#bounds),*)
            }
            None if bounds.is_empty() => quote!(),
            None => quote!(where #(#bounds),*),
        };
        quote_spanned!(span=>
            impl #impl_generics #crate_path::Immediate for #name #ty_generics #where_clause {
                #[allow(unused_variables)]
                fn encode(&self, out: &mut [u8]) {
                    #(
                        <#field_types as #crate_path::Immediate>::encode(
                            &self.#field_names,
                            &mut out[::core::mem::offset_of!(#name #ty_generics, #field_names)..]
                                [..::core::mem::size_of::<#field_types>()],
                        );
                    )*
                }
            }
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn derive(src: &str, inside_crate: bool) -> syn::ItemImpl {
        let item: ItemStruct = syn::parse_str(src).unwrap();
        let out = Compiler::new(inside_crate).derive_immediate(&item);
        syn::parse2(out).unwrap()
    }

    #[test]
    fn implements_immediate_for_struct() {
        let imp = derive(
            r#"
            #[repr(C)]
            struct Foo {
                a: u32,
                b: u64,
            }
            "#,
            false,
        );
        let (_, path, _) = imp.trait_.as_ref().unwrap();
        assert_eq!(
            quote!(#path).to_string(),
            quote!(kernel_payload::Immediate).to_string()
        );
        let self_ty = &imp.self_ty;
        assert_eq!(quote!(#self_ty).to_string(), quote!(Foo).to_string());
        assert_eq!(imp.items.len(), 1);
        match &imp.items[0] {
            syn::ImplItem::Fn(f) => assert_eq!(f.sig.ident.to_string(), "encode"),
            _ => panic!("expected encode"),
        }
    }

    #[test]
    fn inside_crate_uses_crate_path() {
        let imp = derive(
            r#"
            #[repr(C, align(16))]
            struct Bar {
                x: f32,
            }
            "#,
            true,
        );
        let (_, path, _) = imp.trait_.as_ref().unwrap();
        assert_eq!(quote!(#path).to_string(), quote!(crate::Immediate).to_string());
    }

    #[test]
    fn generic_fields_are_bounded() {
        let imp = derive(
            r#"
            #[repr(C)]
            struct Pair<T> {
                a: T,
                b: T,
            }
            "#,
            false,
        );
        let predicates = &imp.generics.where_clause.as_ref().unwrap().predicates;
        assert_eq!(predicates.len(), 2);
    }

    #[test]
    #[should_panic(expected = "repr(C)")]
    fn rejects_missing_repr_c() {
        derive(
            r#"
            struct NoRepr {
                a: u32,
            }
            "#,
            false,
        );
    }
}
