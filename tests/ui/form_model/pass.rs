use console_forms::form::{FieldLens, FormModel};

#[derive(Clone, console_forms::form::FormModel)]
struct TenantForm {
    name: Option<String>,
    #[form(rename = "displayName")]
    display_name: Option<String>,
    enabled: bool,
}

fn main() {
    let fields = TenantForm::fields();
    let lens = fields.display_name();
    let mut model = TenantForm {
        name: None,
        display_name: None,
        enabled: true,
    };
    lens.set(&mut model, Some("Tenant".to_string()));
    assert_eq!(lens.key().as_str(), "displayName");
    assert_eq!(lens.get(&model).as_deref(), Some("Tenant"));
    assert_eq!(fields.name().key().as_str(), "name");
    assert!(*fields.enabled().get(&model));

    let order = TenantForm::field_order()
        .iter()
        .map(|key| key.as_str())
        .collect::<Vec<_>>();
    assert_eq!(order, ["name", "displayName", "enabled"]);
}
