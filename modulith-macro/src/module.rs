use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    parse::Parse, parse::ParseStream, parse_macro_input, Attribute, Fields, ItemStruct, LitStr,
    Path, Token,
};

struct ModuleItem {
    attrs: Vec<Attribute>,
    path: Path,
}

impl Parse for ModuleItem {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let attrs = input.call(Attribute::parse_outer)?;
        let path = input.parse()?;
        Ok(ModuleItem { attrs, path })
    }
}

#[derive(Default)]
struct ModuleArgs {
    depends_on: Vec<ModuleItem>,
    named: Vec<LitStr>,
    providers: Vec<ModuleItem>,
    scoped: Vec<ModuleItem>,
    transient: Vec<ModuleItem>,
    assemblies: Vec<LitStr>,
}

impl Parse for ModuleArgs {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut args = ModuleArgs::default();

        while !input.is_empty() {
            let name: syn::Ident = input.parse()?;
            input.parse::<Token![=]>()?;

            // Parse array: [Item1, Item2, ...]
            let content;
            syn::bracketed!(content in input);

            if name == "depends_on" {
                let items = content.parse_terminated(ModuleItem::parse, Token![,])?;
                args.depends_on = items.into_iter().collect();
            } else if name == "named" {
                let items = content.parse_terminated(<LitStr as Parse>::parse, Token![,])?;
                args.named = items.into_iter().collect();
            } else if name == "providers" {
                let items = content.parse_terminated(ModuleItem::parse, Token![,])?;
                args.providers = items.into_iter().collect();
            } else if name == "scoped" {
                let items = content.parse_terminated(ModuleItem::parse, Token![,])?;
                args.scoped = items.into_iter().collect();
            } else if name == "transient" {
                let items = content.parse_terminated(ModuleItem::parse, Token![,])?;
                args.transient = items.into_iter().collect();
            } else if name == "assemblies" {
                let items = content.parse_terminated(<LitStr as Parse>::parse, Token![,])?;
                args.assemblies = items.into_iter().collect();
            } else {
                return Err(syn::Error::new(
                    name.span(),
                    "expected one of: depends_on, named, providers, scoped, transient, assemblies",
                ));
            }

            if input.peek(Token![,]) {
                input.parse::<Token![,]>()?;
            }
        }

        Ok(args)
    }
}

pub fn module_attribute(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(attr as ModuleArgs);
    let input = parse_macro_input!(item as ItemStruct);
    let expanded = generate_module_impl(&args, &input);

    TokenStream::from(expanded)
}

fn generate_module_impl(args: &ModuleArgs, input: &ItemStruct) -> TokenStream2 {
    let module_name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let dependencies = args.depends_on.iter().map(|item| {
        let path = &item.path;
        let attrs = &item.attrs;
        quote! {
            #(#attrs)*
            module.depends_on::<#path>();
        }
    });

    let named = args.named.iter().map(|name| {
        quote! {
            module.depends_on_named(#name);
        }
    });

    let registrations = |items: &[ModuleItem], lifetime: TokenStream2| {
        items
            .iter()
            .map(|item| {
                let path = &item.path;
                let attrs = &item.attrs;
                quote! {
                    #(#attrs)*
                    module.provide::<#path>(::modulith::ServiceLifetime::#lifetime);
                }
            })
            .collect::<Vec<_>>()
    };
    let singletons = registrations(&args.providers, quote!(Singleton));
    let scoped = registrations(&args.scoped, quote!(Scoped));
    let transient = registrations(&args.transient, quote!(Transient));

    let assemblies = args.assemblies.iter().map(|name| {
        quote! {
            module.additional_assembly(#name);
        }
    });

    let construct = match input.fields {
        Fields::Unit => quote!(Self),
        _ => quote!(<Self as ::core::default::Default>::default()),
    };

    quote! {
        #input

        impl #impl_generics ::modulith::ModuleDefinition for #module_name #ty_generics #where_clause {
            #[allow(unused_variables)]
            fn create(
                module: &mut ::modulith::ModuleDeclaration
            ) -> ::modulith::anyhow::Result<Self> {
                #(#dependencies)*
                #(#named)*
                #(#singletons)*
                #(#scoped)*
                #(#transient)*
                #(#assemblies)*
                Ok(#construct)
            }
        }
    }
}
