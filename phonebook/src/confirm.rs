//! Confirmation forms that carry a single hidden identifier.
//!
//! [`DeleteForm`] confirms deleting an account, [`VouchForm`] confirms
//! vouching for another member. Both only check that the identifier is
//! present; acting on it is up to the caller.

use std::collections::HashMap;

use async_trait::async_trait;
use phonebook_db::Value;
use phonebook_forms::{BaseForm, Form, FormData, FormFieldDef, Widget};

/// Generates the `Form` impl for a wrapper whose only state is `inner`.
macro_rules! delegate_form {
    ($form:ty) => {
        #[async_trait]
        impl Form for $form {
            fn fields(&self) -> &[FormFieldDef] {
                self.inner.fields()
            }

            fn bind(&mut self, data: &FormData) {
                self.inner.bind(data);
            }

            fn is_bound(&self) -> bool {
                self.inner.is_bound()
            }

            async fn is_valid(&mut self) -> bool {
                self.inner.is_valid().await
            }

            fn errors(&self) -> &HashMap<String, Vec<String>> {
                self.inner.errors()
            }

            fn cleaned_data(&self) -> &HashMap<String, Value> {
                self.inner.cleaned_data()
            }
        }
    };
}

/// Confirms deletion of the account with `unique_id`.
pub struct DeleteForm {
    inner: BaseForm,
}

impl DeleteForm {
    pub fn new() -> Self {
        Self {
            inner: BaseForm::new(vec![
                FormFieldDef::text("unique_id").widget(Widget::HiddenInput)
            ]),
        }
    }

    /// The confirmed id, once the form is valid.
    pub fn unique_id(&self) -> Option<&str> {
        self.inner.cleaned_str("unique_id")
    }
}

impl Default for DeleteForm {
    fn default() -> Self {
        Self::new()
    }
}

delegate_form!(DeleteForm);

/// Confirms a vouch for the member identified by `vouchee`.
pub struct VouchForm {
    inner: BaseForm,
}

impl VouchForm {
    pub fn new() -> Self {
        Self {
            inner: BaseForm::new(vec![
                FormFieldDef::text("vouchee").widget(Widget::HiddenInput)
            ]),
        }
    }

    /// The member being vouched for, once the form is valid.
    pub fn vouchee(&self) -> Option<&str> {
        self.inner.cleaned_str("vouchee")
    }
}

impl Default for VouchForm {
    fn default() -> Self {
        Self::new()
    }
}

delegate_form!(VouchForm);
