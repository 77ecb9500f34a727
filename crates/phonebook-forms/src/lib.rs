//! Form framework for the phonebook.
//!
//! Provides field definitions with type-level cleaning ([`fields`]), the
//! async [`Form`] trait with a general-purpose [`BaseForm`] ([`form`]),
//! submitted request data ([`querydict`], [`upload`]) and the validation
//! pipeline ([`validation`]).
//!
//! Application forms wrap a [`BaseForm`] and add their own field cleaners
//! on top of the type-level ones.

pub mod fields;
pub mod form;
pub mod querydict;
pub mod upload;
pub mod validation;

pub use fields::{clean_field_value, FormFieldDef, FormFieldType, Widget};
pub use form::{BaseForm, Form};
pub use querydict::QueryDict;
pub use upload::{FormData, UploadedFile};
pub use validation::Warning;
