use darling::FromField;
use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Fields, Type};

/// Per-field `#[inject(...)]` options
#[derive(FromField)]
#[darling(attributes(inject))]
struct InjectField {
    ident: Option<syn::Ident>,
    ty: Type,
    /// Resolve through `Container::options` instead of a registration
    #[darling(default)]
    options: bool,
    /// Not resolved at all; filled with `Default::default()`
    #[darling(default)]
    default: bool,
}

pub fn derive_injectable(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match generate_injectable_impl(&input) {
        Ok(expanded) => TokenStream::from(expanded),
        Err(err) => TokenStream::from(err),
    }
}

fn generate_injectable_impl(input: &DeriveInput) -> Result<TokenStream2, TokenStream2> {
    let struct_name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            Fields::Unit => {
                return Ok(quote! {
                    impl #impl_generics ::modulith::Injectable for #struct_name #ty_generics #where_clause {
                        fn inject(
                            _container: &::modulith::Container
                        ) -> ::modulith::Result<Self> {
                            Ok(Self)
                        }
                    }
                });
            }
            Fields::Unnamed(_) => {
                return Err(syn::Error::new_spanned(
                    struct_name,
                    "#[derive(Injectable)] only supports structs with named fields",
                )
                .to_compile_error());
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                struct_name,
                "#[derive(Injectable)] can only be applied to structs",
            )
            .to_compile_error());
        }
    };

    let mut field_injections = Vec::with_capacity(fields.len());
    for field in fields {
        let field = InjectField::from_field(field).map_err(|e| e.write_errors())?;
        let field_name = &field.ident;

        let injection = if field.default {
            quote!(#field_name: ::core::default::Default::default())
        } else {
            let inner = extract_arc_inner(&field.ty).ok_or_else(|| {
                syn::Error::new_spanned(
                    &field.ty,
                    "injected fields must be Arc<T>; use #[inject(default)] for other fields",
                )
                .to_compile_error()
            })?;
            if field.options {
                quote!(#field_name: container.options::<#inner>()?)
            } else {
                quote!(#field_name: container.resolve::<#inner>()?)
            }
        };
        field_injections.push(injection);
    }

    Ok(quote! {
        impl #impl_generics ::modulith::Injectable for #struct_name #ty_generics #where_clause {
            fn inject(
                container: &::modulith::Container
            ) -> ::modulith::Result<Self> {
                Ok(Self {
                    #(#field_injections),*
                })
            }
        }
    })
}

/// Extract the inner type from Arc<T> or Arc<dyn Trait>
fn extract_arc_inner(ty: &Type) -> Option<Type> {
    if let Type::Path(type_path) = ty {
        if let Some(segment) = type_path.path.segments.last() {
            if segment.ident == "Arc" {
                if let syn::PathArguments::AngleBracketed(args) = &segment.arguments {
                    if let Some(syn::GenericArgument::Type(inner_type)) = args.args.first() {
                        return Some(inner_type.clone());
                    }
                }
            }
        }
    }
    None
}
