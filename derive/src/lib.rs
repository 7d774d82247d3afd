extern crate proc_macro;

use itertools::izip;
use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::quote;
use std::collections::HashSet;
use syn::{parse_macro_input, Attribute, Data, DeriveInput, Fields, Ident, Index, Member};

/// Struct attributes parsed from `#[parcel(...)]` annotations
#[derive(Debug, Clone, Default)]
struct StructAttributes {
    serializable: bool,
}

/// Field attributes parsed from `#[parcel(...)]` annotations
#[derive(Debug, Clone, Default)]
struct FieldAttributes {
    rename: Option<String>,
}

/// Parses every `#[parcel(...)]` attribute in `attrs`, handing each key to
/// `on_key`. Keys are either bare (`serializable`) or `key = "value"`.
fn parse_parcel_attributes<F>(attrs: &[Attribute], mut on_key: F) -> syn::Result<()>
where
    F: FnMut(&Ident, Option<syn::LitStr>) -> syn::Result<()>,
{
    for attr in attrs {
        if !attr.path().is_ident("parcel") {
            continue;
        }
        attr.parse_args_with(|input: syn::parse::ParseStream| {
            while !input.is_empty() {
                let ident = input.parse::<Ident>()?;
                let value = if input.peek(syn::Token![=]) {
                    input.parse::<syn::Token![=]>()?;
                    Some(input.parse::<syn::LitStr>()?)
                } else {
                    None
                };
                on_key(&ident, value)?;

                // Consume comma if present, otherwise end
                if input.peek(syn::Token![,]) {
                    input.parse::<syn::Token![,]>()?;
                }
            }
            Ok(())
        })?;
    }
    Ok(())
}

/// Supported: `#[parcel(serializable)]`
fn get_struct_attributes(attrs: &[Attribute]) -> syn::Result<StructAttributes> {
    let mut parsed = StructAttributes::default();
    parse_parcel_attributes(attrs, |ident, value| match (ident.to_string().as_str(), value) {
        ("serializable", None) => {
            parsed.serializable = true;
            Ok(())
        }
        _ => Err(syn::Error::new(
            ident.span(),
            format!("Unknown struct attribute: {}", ident),
        )),
    })?;
    Ok(parsed)
}

/// Supported: `#[parcel(rename = "name")]`
fn get_field_attributes(attrs: &[Attribute]) -> syn::Result<FieldAttributes> {
    let mut parsed = FieldAttributes::default();
    parse_parcel_attributes(attrs, |ident, value| match (ident.to_string().as_str(), value) {
        ("rename", Some(lit)) => {
            parsed.rename = Some(lit.value());
            Ok(())
        }
        _ => Err(syn::Error::new(
            ident.span(),
            format!("Unknown field attribute: {}", ident),
        )),
    })?;
    Ok(parsed)
}

/// Derive macro describing a struct as a composite of its fields
///
/// Implements `ParcelType` and `Parcelable`. Field order is wire order; tuple
/// struct fields are named by position.
///
/// # Supported Attributes
///
/// * `#[parcel(serializable)]` - On the struct: the type is host-serializable
///   when it appears as a field of another composite
/// * `#[parcel(rename = "name")]` - On a field: name used in the layout
///
/// # Examples
///
/// ```rust,ignore
/// #[derive(Parcelize)]
/// struct Point {
///     x: i32,
///     #[parcel(rename = "caption")]
///     label: Option<String>,
/// }
/// ```
#[proc_macro_derive(Parcelize, attributes(parcel))]
pub fn derive_parcelize(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let class = name.to_string();
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let struct_attrs = get_struct_attributes(&input.attrs)?;

    let fields = match &input.data {
        Data::Struct(s) => &s.fields,
        Data::Enum(e) => {
            return Err(syn::Error::new(
                e.enum_token.span,
                "Parcelize supports structs only",
            ))
        }
        Data::Union(u) => {
            return Err(syn::Error::new(
                u.union_token.span,
                "Parcelize supports structs only",
            ))
        }
    };

    let mut members = Vec::new();
    let mut wire_names = Vec::new();
    let mut types = Vec::new();
    let mut used_names = HashSet::new();
    for (index, field) in fields.iter().enumerate() {
        let attrs = get_field_attributes(&field.attrs)?;
        let (member, default_name) = match &field.ident {
            Some(ident) => (Member::Named(ident.clone()), ident.to_string()),
            None => (
                Member::Unnamed(Index {
                    index: index as u32,
                    span: Span::call_site(),
                }),
                index.to_string(),
            ),
        };
        let wire_name = attrs.rename.unwrap_or(default_name);
        if !used_names.insert(wire_name.clone()) {
            return Err(syn::Error::new_spanned(
                field,
                format!("Field name '{}' is duplicated in struct '{}'", wire_name, name),
            ));
        }
        members.push(member);
        wire_names.push(wire_name);
        types.push(&field.ty);
    }

    let supertype = if struct_attrs.serializable {
        quote! { .with_supertype(::parcel_codegen::types::names::SERIALIZABLE) }
    } else {
        quote! {}
    };

    let mut descriptor_fields = Vec::new();
    let mut value_fields = Vec::new();
    let mut read_fields = Vec::new();
    for (member, wire_name, ty) in izip!(&members, &wire_names, &types) {
        descriptor_fields.push(quote! {
            .field(#wire_name, <#ty as ::parcel_codegen::ParcelType>::type_descriptor())
        });
        value_fields.push(quote! {
            (#wire_name.to_string(), ::parcel_codegen::ParcelType::to_value(&self.#member))
        });
        read_fields.push(quote! {
            #member: ::parcel_codegen::convert::take_field::<#ty>(&mut object, #wire_name)?
        });
    }

    let construct = match fields {
        Fields::Unit => quote! { #name },
        _ => quote! { #name { #(#read_fields),* } },
    };
    let object_binding = if members.is_empty() {
        quote! { let _object = ::parcel_codegen::convert::expect_object(value, #class)?; }
    } else {
        quote! { let mut object = ::parcel_codegen::convert::expect_object(value, #class)?; }
    };

    Ok(quote! {
        impl #impl_generics ::parcel_codegen::ParcelType for #name #ty_generics #where_clause {
            fn type_descriptor() -> ::parcel_codegen::TypeDescriptor {
                ::parcel_codegen::TypeDescriptor::new(#class) #supertype
            }

            fn to_value(&self) -> ::parcel_codegen::Value {
                ::parcel_codegen::Value::object(#class, vec![#(#value_fields),*])
            }

            fn from_value(value: ::parcel_codegen::Value) -> ::parcel_codegen::Result<Self> {
                #object_binding
                Ok(#construct)
            }
        }

        impl #impl_generics ::parcel_codegen::Parcelable for #name #ty_generics #where_clause {
            fn descriptor() -> ::parcel_codegen::CompositeDescriptor {
                ::parcel_codegen::CompositeDescriptor::new(#class) #(#descriptor_fields)*
            }
        }
    })
}
