//! Derive macro for sqlob mapped types.
//!
//! This crate provides `#[derive(Persist)]`, which describes a struct's
//! persistable fields to the `sqlob` engine.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{
    parse_macro_input, Attribute, Data, DeriveInput, Expr, Fields, Ident, Lit, Type, Visibility,
};

/// Derives `sqlob::Persist` and `sqlob::persist::ReferenceField` for a
/// struct with named fields.
///
/// Only `pub` fields are persisted, in declaration order. The struct must
/// implement `Default`, which supplies the value of every field a load
/// leaves unset.
///
/// # Attributes
///
/// - `#[sqlob(table = "name")]` - Specifies the table name (optional,
///   defaults to the struct name)
///
/// # Field Attributes
///
/// - `#[sqlob(column = "name")]` - Specifies the column name
///   (optional, defaults to the field name)
/// - `#[sqlob(sql_type = "TYPE")]` - Overrides the SQL type of the column
/// - `#[sqlob(reference)]` - Stores the field as a reference to another
///   mapped type. The field type is the type itself, a `Box` or `Arc` of it,
///   or an `Option` of any of these
/// - `#[sqlob(transient)]` - Leaves the field out of the table
#[proc_macro_derive(Persist, attributes(sqlob))]
pub fn derive_persist(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    derive_persist_impl(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}

fn derive_persist_impl(input: DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = &input.ident;
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Persist derive does not support generic structs",
        ));
    }
    let table_name = get_table_name(&input.attrs)?;

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    &input,
                    "Persist derive only supports structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                &input,
                "Persist derive only supports structs",
            ));
        }
    };

    let mut field_infos: Vec<FieldInfo> = Vec::new();
    for field in fields {
        let attrs = parse_field_attrs(&field.attrs)?;
        if attrs.transient || !matches!(field.vis, Visibility::Public(_)) {
            continue;
        }
        let Some(field_name) = field.ident.clone() else {
            continue;
        };
        field_infos.push(FieldInfo {
            field_name,
            field_type: field.ty.clone(),
            attrs,
        });
    }

    let attributes: Vec<TokenStream2> = field_infos
        .iter()
        .map(|info| attribute_tokens(struct_name, info))
        .collect();

    let type_name = struct_name.to_string();
    let table = table_name.map(|name| quote! { .table(#name) });

    let expanded = quote! {
        impl ::sqlob::Persist for #struct_name {
            fn description() -> ::sqlob::persist::Description {
                ::sqlob::persist::Description::new::<Self>(
                    #type_name,
                    vec![#(#attributes),*],
                )
                #table
            }
        }

        impl ::sqlob::persist::ReferenceField for #struct_name {
            type Target = Self;
            const NULLABLE: bool = false;

            fn get(&self) -> Option<&Self> {
                Some(self)
            }

            fn from_target(target: Option<Self>) -> Option<Self> {
                target
            }
        }
    };

    Ok(expanded)
}

/// Builds the `Attribute` expression of one field, with its accessors.
fn attribute_tokens(struct_name: &Ident, info: &FieldInfo) -> TokenStream2 {
    let field_name = &info.field_name;
    let field_type = &info.field_type;
    let name = field_name.to_string();
    let getter = format_ident!("get_{}", field_name);
    let setter = format_ident!("set_{}", field_name);

    let (constructor, read, write) = if info.attrs.reference {
        (
            quote! { reference },
            quote! { ::sqlob::persist::reference_ref(&this.#field_name) },
            quote! {
                if let Some(value) = ::sqlob::persist::reference_from::<#field_type>(value, #name)? {
                    this.#field_name = value;
                }
            },
        )
    } else {
        (
            quote! { scalar },
            quote! { ::sqlob::persist::scalar_ref(&this.#field_name) },
            quote! {
                this.#field_name = ::sqlob::persist::scalar_from::<#field_type>(value, #name)?;
            },
        )
    };

    let column = info.attrs.column.as_ref().map(|c| quote! { .column(#c) });
    let sql_type = info.attrs.sql_type.as_ref().map(|t| quote! { .sql_type(#t) });

    quote! {
        {
            fn #getter(
                object: &::sqlob::persist::AnyObject,
            ) -> ::sqlob::Result<::sqlob::persist::FieldRef<'_>> {
                let this = ::sqlob::persist::access::<#struct_name>(object, #name)?;
                Ok(#read)
            }

            fn #setter(
                object: &mut ::sqlob::persist::AnyObject,
                value: ::sqlob::persist::FieldValue,
            ) -> ::sqlob::Result<()> {
                let this = ::sqlob::persist::access_mut::<#struct_name>(object, #name)?;
                #write
                Ok(())
            }

            ::sqlob::persist::Attribute::#constructor::<#field_type>(#name, #getter, #setter)
                #column
                #sql_type
        }
    }
}

struct FieldInfo {
    field_name: Ident,
    field_type: Type,
    attrs: FieldAttrs,
}

#[derive(Default)]
struct FieldAttrs {
    column: Option<String>,
    sql_type: Option<String>,
    reference: bool,
    transient: bool,
}

fn string_value(meta: &syn::meta::ParseNestedMeta<'_>) -> syn::Result<String> {
    let value: Expr = meta.value()?.parse()?;
    if let Expr::Lit(lit) = &value {
        if let Lit::Str(s) = &lit.lit {
            return Ok(s.value());
        }
    }
    Err(syn::Error::new_spanned(value, "expected a string literal"))
}

fn get_table_name(attrs: &[Attribute]) -> syn::Result<Option<String>> {
    let mut table_name = None;
    for attr in attrs {
        if attr.path().is_ident("sqlob") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("table") {
                    table_name = Some(string_value(&meta)?);
                    Ok(())
                } else {
                    Err(meta.error("unsupported sqlob attribute, expected `table`"))
                }
            })?;
        }
    }
    Ok(table_name)
}

fn parse_field_attrs(attrs: &[Attribute]) -> syn::Result<FieldAttrs> {
    let mut result = FieldAttrs::default();

    for attr in attrs {
        if attr.path().is_ident("sqlob") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("reference") {
                    result.reference = true;
                } else if meta.path.is_ident("transient") {
                    result.transient = true;
                } else if meta.path.is_ident("column") {
                    result.column = Some(string_value(&meta)?);
                } else if meta.path.is_ident("sql_type") {
                    result.sql_type = Some(string_value(&meta)?);
                } else {
                    return Err(meta.error(
                        "unsupported sqlob attribute, expected `column`, `sql_type`, `reference` or `transient`",
                    ));
                }
                Ok(())
            })?;
        }
    }

    Ok(result)
}
