use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::quote;
use syn::{
    parse_macro_input, Data, DeriveInput, Error, Fields, Ident, LitStr, Result, Token,
};

/// Derives `rete_fact::Fact` for a struct whose id field is annotated
/// `#[fact(id)]` and whose type tag is declared via `#[fact(type = "...")]`
/// on the struct itself. Every other named field is folded into the
/// generated `Record` via `Into<FactValue>`.
#[proc_macro_derive(Fact, attributes(fact))]
pub fn derive_fact(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match expand_fact(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand_fact(input: &DeriveInput) -> Result<proc_macro2::TokenStream> {
    let fact_type = find_fact_type(input)?;

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => &named.named,
            _ => {
                return Err(Error::new_spanned(
                    input,
                    "#[derive(Fact)] requires a struct with named fields",
                ))
            }
        },
        _ => {
            return Err(Error::new_spanned(
                input,
                "#[derive(Fact)] only supports structs",
            ))
        }
    };

    let mut id_field: Option<Ident> = None;
    let mut value_fields: Vec<Ident> = Vec::new();

    for field in fields {
        let ident = field
            .ident
            .clone()
            .ok_or_else(|| Error::new_spanned(field, "tuple fields are not supported"))?;

        if has_id_attr(&field.attrs)? {
            if id_field.is_some() {
                return Err(Error::new_spanned(
                    field,
                    "only one field may be marked #[fact(id)]",
                ));
            }
            id_field = Some(ident);
        } else {
            value_fields.push(ident);
        }
    }

    let id_field = id_field.ok_or_else(|| {
        Error::new_spanned(input, "exactly one field must be marked #[fact(id)]")
    })?;

    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let field_inserts = value_fields.iter().map(|f| {
        let name = f.to_string();
        quote! {
            record = record.with_field(#name, self.#f.clone());
        }
    });

    Ok(quote! {
        impl #impl_generics rete_fact::Fact for #name #ty_generics #where_clause {
            fn id(&self) -> rete_fact::FactId {
                rete_fact::FactId::from(self.#id_field.clone())
            }

            fn fact_type(&self) -> &'static str {
                #fact_type
            }

            fn to_record(&self) -> rete_fact::Record {
                let mut record = rete_fact::Record::new(self.id(), #fact_type);
                #(#field_inserts)*
                record
            }
        }
    })
}

fn has_id_attr(attrs: &[syn::Attribute]) -> Result<bool> {
    for attr in attrs {
        if !attr.path().is_ident("fact") {
            continue;
        }
        let mut found = false;
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("id") {
                found = true;
                Ok(())
            } else {
                Ok(())
            }
        })?;
        if found {
            return Ok(true);
        }
    }
    Ok(false)
}

fn find_fact_type(input: &DeriveInput) -> Result<LitStr> {
    for attr in &input.attrs {
        if !attr.path().is_ident("fact") {
            continue;
        }
        let mut found: Option<LitStr> = None;
        attr.parse_args_with(|stream: syn::parse::ParseStream| {
            let ident: Ident = stream.parse()?;
            if ident != "type" {
                return Err(Error::new_spanned(ident, "expected `type = \"...\"`"));
            }
            stream.parse::<Token![=]>()?;
            let lit: LitStr = stream.parse()?;
            found = Some(lit);
            Ok(())
        })?;
        if let Some(lit) = found {
            return Ok(lit);
        }
    }
    Err(Error::new(
        Span::call_site(),
        "missing #[fact(type = \"...\")] attribute on the struct",
    ))
}
