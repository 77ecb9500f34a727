//! Integration tests for the form framework: a hand-written form with a
//! form-level `clean`, driven through the `Form` trait.

use std::collections::HashMap;

use async_trait::async_trait;
use phonebook_db::Value;
use phonebook_forms::validation::full_clean;
use phonebook_forms::{BaseForm, Form, FormData, FormFieldDef, FormFieldType, QueryDict};

/// Requires `street` whenever `city` is given.
struct AddressForm {
    inner: BaseForm,
}

impl AddressForm {
    fn new() -> Self {
        Self {
            inner: BaseForm::new(vec![
                FormFieldDef::text("street").required(false),
                FormFieldDef::text("city").required(false),
                FormFieldDef::new("website", FormFieldType::Url).required(false),
            ]),
        }
    }
}

#[async_trait]
impl Form for AddressForm {
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
        let mut valid = self.inner.is_valid().await;
        if let Err(errors) = self.clean().await {
            for (field, messages) in errors {
                for message in messages {
                    self.inner.add_error(&field, message);
                }
            }
            valid = false;
        }
        valid
    }

    fn errors(&self) -> &HashMap<String, Vec<String>> {
        self.inner.errors()
    }

    fn cleaned_data(&self) -> &HashMap<String, Value> {
        self.inner.cleaned_data()
    }

    async fn clean(&self) -> Result<(), HashMap<String, Vec<String>>> {
        let city = self.inner.cleaned_str("city").unwrap_or_default();
        let street = self.inner.cleaned_str("street").unwrap_or_default();
        if !city.is_empty() && street.is_empty() {
            let mut errors = HashMap::new();
            errors.insert(
                "street".to_string(),
                vec!["A street is needed with a city.".to_string()],
            );
            return Err(errors);
        }
        Ok(())
    }
}

#[tokio::test]
async fn cross_field_clean_reports_on_field() {
    let mut form = AddressForm::new();
    form.bind(&FormData::from_query("city=Lyon"));
    let errors = full_clean(&mut form).await.unwrap_err();
    assert_eq!(
        errors,
        vec![(
            "street".to_string(),
            vec!["A street is needed with a city.".to_string()]
        )]
    );
}

#[tokio::test]
async fn cleaned_values_are_normalized() {
    let mut form = AddressForm::new();
    form.bind(&FormData::from(
        QueryDict::new()
            .with("street", "  1 Rue de la Paix ")
            .with("city", "Paris")
            .with("website", "example.org"),
    ));
    assert!(form.is_valid().await);
    assert_eq!(
        form.cleaned_data().get("street"),
        Some(&Value::String("1 Rue de la Paix".into()))
    );
    assert_eq!(
        form.cleaned_data().get("website"),
        Some(&Value::String("http://example.org".into()))
    );
}

#[tokio::test]
async fn empty_submission_is_valid_for_optional_fields() {
    let mut form = AddressForm::new();
    form.bind(&FormData::new());
    assert!(form.is_valid().await);
    assert_eq!(form.cleaned_data().get("website"), Some(&Value::Null));
    assert_eq!(
        form.cleaned_data().get("city"),
        Some(&Value::String(String::new()))
    );
}

#[tokio::test]
async fn form_trait_objects_validate() {
    let mut forms: Vec<Box<dyn Form>> = vec![
        Box::new(AddressForm::new()),
        Box::new(BaseForm::new(vec![FormFieldDef::text("q")])),
    ];
    for form in &mut forms {
        form.bind(&FormData::from_query("q=x&street=s&city=c"));
        assert!(form.is_valid().await);
    }
}
