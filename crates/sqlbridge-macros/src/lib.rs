//! Procedural macros for sqlbridge.
//!
//! `#[derive(Model)]` generates the `sqlbridge_core::Model` implementation
//! for a struct with named fields: the static field table plus one typed
//! getter and setter arm per mapped field.
//!
//! # Attributes
//!
//! On the struct, `#[sqlbridge(...)]` accepts:
//!
//! - `table = "name"`: table name (defaults to the snake_case struct name)
//! - `partial_update`: opt into baseline-diff updates
//!
//! On fields:
//!
//! - `column = "name"`: column name (defaults to the snake_case field name)
//! - `primary_key`, `auto_increment`
//! - `redact`: mask the value in log events
//! - `auto_now_add`: database clock on INSERT
//! - `auto_now`: database clock on INSERT and UPDATE
//! - `skip_partial`: always written, even when zero, on partial paths
//! - `skip`: not mapped at all
//!
//! Generated code refers to `::sqlbridge_core`, so crates deriving `Model`
//! depend on `sqlbridge-core` directly.

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod model_derive;

/// Derive `sqlbridge_core::Model`.
#[proc_macro_derive(Model, attributes(sqlbridge))]
pub fn derive_model(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match model_derive::parse_model(&input) {
        Ok(def) => model_derive::generate_model_impl(&def).into(),
        Err(e) => e.to_compile_error().into(),
    }
}
