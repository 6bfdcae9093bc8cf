use proc_macro::TokenStream;
use quote::quote;
use syn::{DeriveInput, parse_macro_input};

/// Derive macro for the `Model` trait.
///
/// Generates `TYPE_NAME`, `to_fields()`, and `from_fields()` for structs
/// with named fields. Field values go through the `IntoValue`/`FromValue`
/// conversions, so every non-skipped field must be `Clone` and convertible.
///
/// # Example
///
/// ```ignore
/// use amber_core::Model;
///
/// #[derive(Model)]
/// struct Person {
///     name: String,
///     friends: Vec<amber_core::Node>,
/// }
/// ```
///
/// # Attributes
///
/// - `#[model(name = "...")]` on the struct — use a custom type name
///   instead of the struct identifier
/// - `#[model(skip)]` — leave this field out of the record; it is rebuilt
///   with `Default::default()` (field must impl Default)
/// - `#[model(rename = "...")]` — use a custom name in the record
#[proc_macro_derive(Model, attributes(model))]
pub fn derive_model(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match derive_model_impl(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn derive_model_impl(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = named_fields(input)?;
    let type_name = container_name(input)?.unwrap_or_else(|| name.to_string());

    let to_fields_impl = generate_to_fields(&fields);
    let from_fields_impl = generate_from_fields(&fields);

    Ok(quote! {
        impl #impl_generics ::amber_core::Model for #name #ty_generics #where_clause {
            const TYPE_NAME: &'static str = #type_name;

            #to_fields_impl
            #from_fields_impl
        }
    })
}

struct ModelField {
    ident: syn::Ident,
    wire_name: String,
    skip: bool,
}

fn named_fields(input: &DeriveInput) -> syn::Result<Vec<ModelField>> {
    let fields = match &input.data {
        syn::Data::Struct(data) => match &data.fields {
            syn::Fields::Named(named) => &named.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    input,
                    "Model requires named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                input,
                "Model can only be derived for structs",
            ));
        }
    };

    fields
        .iter()
        .map(|field| {
            let ident = field
                .ident
                .clone()
                .ok_or_else(|| syn::Error::new_spanned(field, "expected a named field"))?;
            let attrs = parse_field_attrs(&field.attrs)?;
            let wire_name = attrs.rename.unwrap_or_else(|| ident.to_string());
            Ok(ModelField {
                ident,
                wire_name,
                skip: attrs.skip,
            })
        })
        .collect()
}

fn generate_to_fields(fields: &[ModelField]) -> proc_macro2::TokenStream {
    let inserts = fields.iter().filter(|f| !f.skip).map(|field| {
        let ident = &field.ident;
        let wire_name = &field.wire_name;
        quote! {
            fields.insert(
                #wire_name.to_owned(),
                ::amber_core::IntoValue::into_value(::std::clone::Clone::clone(&self.#ident)),
            );
        }
    });

    quote! {
        fn to_fields(&self) -> ::amber_core::FieldMap {
            let mut fields = ::amber_core::FieldMap::new();
            #(#inserts)*
            fields
        }
    }
}

fn generate_from_fields(fields: &[ModelField]) -> proc_macro2::TokenStream {
    let bindings = fields.iter().map(|field| {
        let ident = &field.ident;
        if field.skip {
            return quote! { #ident: ::std::default::Default::default() };
        }
        let wire_name = &field.wire_name;
        quote! {
            #ident: match fields.get(#wire_name) {
                ::std::option::Option::Some(value) => ::amber_core::FromValue::from_value(value)
                    .ok_or(::amber_core::ModelError::FieldShape(#wire_name))?,
                ::std::option::Option::None => ::amber_core::FromValue::absent()
                    .ok_or(::amber_core::ModelError::MissingField(#wire_name))?,
            }
        }
    });

    quote! {
        fn from_fields(
            fields: &::amber_core::FieldMap,
        ) -> ::std::result::Result<Self, ::amber_core::ModelError> {
            ::std::result::Result::Ok(Self {
                #(#bindings),*
            })
        }
    }
}

fn container_name(input: &DeriveInput) -> syn::Result<Option<String>> {
    let mut name = None;
    for attr in &input.attrs {
        if !attr.path().is_ident("model") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                let value: syn::LitStr = meta.value()?.parse()?;
                name = Some(value.value());
                Ok(())
            } else {
                Err(meta.error("unsupported model attribute on struct"))
            }
        })?;
    }
    Ok(name)
}

#[derive(Default)]
struct FieldAttrs {
    skip: bool,
    rename: Option<String>,
}

fn parse_field_attrs(attrs: &[syn::Attribute]) -> syn::Result<FieldAttrs> {
    let mut result = FieldAttrs::default();

    for attr in attrs {
        if !attr.path().is_ident("model") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("skip") {
                result.skip = true;
                Ok(())
            } else if meta.path.is_ident("rename") {
                let value: syn::LitStr = meta.value()?.parse()?;
                result.rename = Some(value.value());
                Ok(())
            } else {
                Err(meta.error("unsupported model attribute on field"))
            }
        })?;
    }

    Ok(result)
}
