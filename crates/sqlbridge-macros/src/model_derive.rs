//! Implementation of the Model derive macro.
//!
//! This module parses `#[sqlbridge(...)]` attributes and generates the field
//! table plus typed getter/setter arms at compile time.

use proc_macro2::TokenStream;
use quote::{ToTokens, quote};
use syn::ext::IdentExt;
use syn::{Data, DeriveInput, Error, Field, Fields, Ident, LitStr, Result, Type};

/// Longest identifier the runtime accepts.
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Parsed model definition from a struct with `#[derive(Model)]`.
#[derive(Debug)]
pub struct ModelDef {
    /// The struct name.
    pub name: Ident,
    /// Table name.
    pub table: String,
    /// Whether the model opted into baseline-diff updates.
    pub partial_update: bool,
    /// Parsed fields, including skipped ones.
    pub fields: Vec<ModelFieldDef>,
}

/// Database-clock behaviour requested on a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampAttr {
    /// No attribute.
    None,
    /// `auto_now_add`.
    OnCreate,
    /// `auto_now`.
    OnUpdate,
}

/// Parsed mapping of a single field.
#[derive(Debug)]
pub struct ModelFieldDef {
    /// The field name.
    pub name: Ident,
    /// The field type.
    pub ty: Type,
    /// Column name.
    pub column: String,
    /// Primary-key flag.
    pub primary_key: bool,
    /// Auto-increment flag.
    pub auto_increment: bool,
    /// Log redaction flag.
    pub redact: bool,
    /// Whether zero means "not provided" on partial paths.
    pub partial_update: bool,
    /// Database-clock behaviour.
    pub timestamp: TimestampAttr,
    /// Field is not mapped.
    pub skip: bool,
}

/// Parse a `DeriveInput` into a `ModelDef`.
pub fn parse_model(input: &DeriveInput) -> Result<ModelDef> {
    let name = input.ident.clone();

    if !input.generics.params.is_empty() {
        return Err(Error::new_spanned(
            &input.generics,
            "Model cannot be derived for generic structs",
        ));
    }

    let fields = match &input.data {
        Data::Struct(data) => parse_model_fields(&data.fields)?,
        Data::Enum(_) => {
            return Err(Error::new_spanned(
                input,
                "Model can only be derived for structs, not enums",
            ));
        }
        Data::Union(_) => {
            return Err(Error::new_spanned(
                input,
                "Model can only be derived for structs, not unions",
            ));
        }
    };

    let mut table = None;
    let mut partial_update = false;
    for attr in &input.attrs {
        if !attr.path().is_ident("sqlbridge") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                let lit: LitStr = meta.value()?.parse()?;
                check_identifier(&lit, true)?;
                table = Some(lit.value());
            } else if meta.path.is_ident("partial_update") {
                partial_update = true;
            } else {
                let attr_name = meta.path.to_token_stream().to_string();
                return Err(meta.error(format!(
                    "unknown sqlbridge attribute `{attr_name}`. \
                     Valid struct attributes are: table, partial_update"
                )));
            }
            Ok(())
        })?;
    }

    Ok(ModelDef {
        table: table.unwrap_or_else(|| to_snake_case(&name.to_string())),
        name,
        partial_update,
        fields,
    })
}

/// Parse all fields from a struct.
fn parse_model_fields(fields: &Fields) -> Result<Vec<ModelFieldDef>> {
    match fields {
        Fields::Named(named) => named.named.iter().map(parse_model_field).collect(),
        Fields::Unnamed(_) => Err(Error::new_spanned(
            fields,
            "Model requires a struct with named fields",
        )),
        Fields::Unit => Ok(Vec::new()),
    }
}

/// Parse a single field and its mapping attributes.
fn parse_model_field(field: &Field) -> Result<ModelFieldDef> {
    let name = field
        .ident
        .clone()
        .ok_or_else(|| Error::new_spanned(field, "expected named field"))?;

    let mut column = None;
    let mut primary_key = false;
    let mut auto_increment = false;
    let mut redact = false;
    let mut partial_update = true;
    let mut timestamp = TimestampAttr::None;
    let mut skip = false;

    for attr in &field.attrs {
        if !attr.path().is_ident("sqlbridge") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            let path = &meta.path;

            if path.is_ident("column") {
                let lit: LitStr = meta.value()?.parse()?;
                check_identifier(&lit, false)?;
                column = Some(lit.value());
            } else if path.is_ident("primary_key") {
                primary_key = true;
            } else if path.is_ident("auto_increment") {
                auto_increment = true;
            } else if path.is_ident("redact") {
                redact = true;
            } else if path.is_ident("skip_partial") {
                partial_update = false;
            } else if path.is_ident("auto_now_add") || path.is_ident("auto_now") {
                if timestamp != TimestampAttr::None {
                    return Err(meta.error("auto_now and auto_now_add are mutually exclusive"));
                }
                timestamp = if path.is_ident("auto_now") {
                    TimestampAttr::OnUpdate
                } else {
                    TimestampAttr::OnCreate
                };
            } else if path.is_ident("skip") {
                skip = true;
            } else {
                let attr_name = path.to_token_stream().to_string();
                return Err(meta.error(format!(
                    "unknown sqlbridge attribute `{attr_name}`. \
                     Valid field attributes are: column, primary_key, auto_increment, \
                     redact, skip_partial, auto_now, auto_now_add, skip"
                )));
            }

            Ok(())
        })?;
    }

    if auto_increment && !primary_key {
        return Err(Error::new_spanned(
            &name,
            "auto_increment is only supported on primary_key fields",
        ));
    }

    Ok(ModelFieldDef {
        column: column.unwrap_or_else(|| to_snake_case(&name.unraw().to_string())),
        ty: field.ty.clone(),
        name,
        primary_key,
        auto_increment,
        redact,
        partial_update,
        timestamp,
        skip,
    })
}

/// Reject names the runtime registry would refuse, at compile time.
fn check_identifier(lit: &LitStr, allow_qualified: bool) -> Result<()> {
    let pattern = if allow_qualified {
        r#"^[A-Za-z0-9_"`\]]+(\.[A-Za-z0-9_"`\]]+)*$"#
    } else {
        r#"^[A-Za-z0-9_"`\]]+$"#
    };
    let value = lit.value();
    let valid = regex::Regex::new(pattern)
        .map(|re| re.is_match(&value))
        .unwrap_or(false);
    if !valid || value.len() > MAX_IDENTIFIER_LENGTH {
        return Err(Error::new_spanned(
            lit,
            format!("invalid SQL identifier {value:?}"),
        ));
    }
    Ok(())
}

/// `UserProfile` -> `user_profile`, `HTTPRequest` -> `http_request`.
fn to_snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev = i.checked_sub(1).and_then(|p| chars.get(p));
            let next = chars.get(i + 1);
            let boundary = match prev {
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.is_some_and(|n| n.is_lowercase()),
                _ => false,
            };
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Generate the Model trait implementation.
pub fn generate_model_impl(def: &ModelDef) -> TokenStream {
    let name = &def.name;
    let table = &def.table;
    let partial = def.partial_update;

    let mapped: Vec<&ModelFieldDef> = def.fields.iter().filter(|f| !f.skip).collect();
    let count = mapped.len();

    let infos = mapped.iter().map(|f| {
        let field_name = f.name.unraw().to_string();
        let column = &f.column;
        let ty = &f.ty;
        let pk = f.primary_key;
        let auto_inc = f.auto_increment;
        let redact = f.redact;
        let partial_field = f.partial_update;
        let ts = match f.timestamp {
            TimestampAttr::None => quote!(::sqlbridge_core::AutoTimestamp::None),
            TimestampAttr::OnCreate => quote!(::sqlbridge_core::AutoTimestamp::OnCreate),
            TimestampAttr::OnUpdate => quote!(::sqlbridge_core::AutoTimestamp::OnUpdate),
        };
        quote! {
            ::sqlbridge_core::FieldInfo::new(
                #field_name,
                #column,
                <#ty as ::sqlbridge_core::FromValue>::KIND,
            )
            .primary_key(#pk)
            .auto_increment(#auto_inc)
            .partial_update(#partial_field)
            .redact(#redact)
            .auto_timestamp(#ts)
        }
    });

    let getters = mapped.iter().enumerate().map(|(idx, f)| {
        let ident = &f.name;
        quote! {
            #idx => ::sqlbridge_core::ToValue::to_value(&self.#ident),
        }
    });

    let setters = mapped.iter().enumerate().map(|(idx, f)| {
        let ident = &f.name;
        quote! {
            #idx => {
                self.#ident = ::sqlbridge_core::FromValue::from_value(value)?;
            }
        }
    });

    quote! {
        impl ::sqlbridge_core::Model for #name {
            const TABLE_NAME: &'static str = #table;
            const PARTIAL_UPDATE: bool = #partial;

            fn fields() -> &'static [::sqlbridge_core::FieldInfo] {
                static FIELDS: [::sqlbridge_core::FieldInfo; #count] = [#(#infos),*];
                &FIELDS
            }

            fn get_field(&self, idx: usize) -> ::sqlbridge_core::Value {
                match idx {
                    #(#getters)*
                    _ => ::sqlbridge_core::Value::Null,
                }
            }

            #[allow(unused_variables)]
            fn set_field(
                &mut self,
                idx: usize,
                value: &::sqlbridge_core::Value,
            ) -> ::core::result::Result<(), ::sqlbridge_core::TypeMismatch> {
                match idx {
                    #(#setters)*
                    _ => {}
                }
                ::core::result::Result::Ok(())
            }
        }
    }
}
