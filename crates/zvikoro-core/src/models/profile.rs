use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Server-declared user attributes.
///
/// Kept as the raw JSON object so fields the server adds later survive a
/// save/load cycle untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Profile(Map<String, Value>);

impl Profile {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Numeric or string id, rendered as a string
    pub fn id(&self) -> Option<String> {
        match self.0.get("id")? {
            Value::Number(n) => Some(n.to_string()),
            Value::String(s) => Some(s.clone()),
            _ => None,
        }
    }

    pub fn username(&self) -> Option<&str> {
        self.str_field("username")
    }

    pub fn email(&self) -> Option<&str> {
        self.str_field("email")
    }

    /// Department name; older accounts use the `dept` field
    pub fn department(&self) -> Option<&str> {
        self.str_field("department").or_else(|| self.str_field("dept"))
    }

    fn str_field(&self, field: &str) -> Option<&str> {
        self.0
            .get(field)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }
}

/// Sign-up form for `register/` and `admins/create/`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistrationForm {
    pub username: String,
    pub email: String,
    pub password: String,
    pub password2: String,
    /// Administering account, when an admin registers a user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
}

impl RegistrationForm {
    pub fn passwords_match(&self) -> bool {
        self.password == self.password2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn profile(value: Value) -> Profile {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_profile_accessors() {
        let p = profile(json!({
            "id": 7,
            "username": "alice",
            "email": "alice@example.org",
            "department": "Accounts",
            "is_admin": false
        }));
        assert_eq!(p.id().as_deref(), Some("7"));
        assert_eq!(p.username(), Some("alice"));
        assert_eq!(p.email(), Some("alice@example.org"));
        assert_eq!(p.department(), Some("Accounts"));
        assert_eq!(p.get("is_admin"), Some(&json!(false)));
    }

    #[test]
    fn test_profile_department_falls_back_to_dept() {
        let p = profile(json!({"dept": "HR", "department": ""}));
        assert_eq!(p.department(), Some("HR"));
        assert_eq!(profile(json!({})).department(), None);
    }

    #[test]
    fn test_profile_round_trips_unknown_fields() {
        let value = json!({"username": "bob", "roles": ["admin"], "nested": {"a": 1}});
        let p = profile(value.clone());
        assert_eq!(serde_json::to_value(&p).unwrap(), value);
    }

    #[test]
    fn test_registration_form_skips_empty_optionals() {
        let form = RegistrationForm {
            username: "carol".to_string(),
            email: "carol@example.org".to_string(),
            password: "pw".to_string(),
            password2: "pw".to_string(),
            ..Default::default()
        };
        assert!(form.passwords_match());
        let value = serde_json::to_value(&form).unwrap();
        assert!(value.get("admin").is_none());
        assert!(value.get("department").is_none());
    }
}
