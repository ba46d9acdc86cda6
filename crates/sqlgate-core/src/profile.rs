//! Profiles and the static descriptors that validate them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Token returned in place of every secret value.
pub const SECRET_MASK: &str = "**SqlgateSecretField**";

/// Credentials attached to a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Auth {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Durable configuration for one named backend instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(rename = "type")]
    pub backend_type: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<Auth>,
    #[serde(default)]
    pub configs: BTreeMap<String, String>,
    #[serde(default)]
    pub optionals: BTreeMap<String, String>,
}

impl Profile {
    pub fn new(backend_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            backend_type: backend_type.into(),
            name: name.into(),
            auth: None,
            configs: BTreeMap::new(),
            optionals: BTreeMap::new(),
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.configs.insert(key.into(), value.into());
        self
    }

    pub fn with_optional(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.optionals.insert(key.into(), value.into());
        self
    }

    pub fn with_auth(mut self, username: impl Into<String>, password: Option<String>) -> Self {
        self.auth = Some(Auth {
            username: username.into(),
            password,
        });
        self
    }

    pub fn config(&self, key: &str) -> Option<&str> {
        self.configs.get(key).map(String::as_str)
    }

    pub fn optional(&self, key: &str) -> Option<&str> {
        self.optionals.get(key).map(String::as_str)
    }

    /// Names of the config and optional keys the descriptor marks as secret.
    pub fn secret_fields<'a>(&self, descriptor: &'a ConnectorDescriptor) -> Vec<&'a str> {
        descriptor
            .configs
            .iter()
            .chain(descriptor.optionals.iter())
            .filter(|f| f.secret)
            .map(|f| f.name.as_str())
            .collect()
    }

    /// Copy of this profile with every secret replaced by [`SECRET_MASK`].
    ///
    /// Without a descriptor only the auth password is masked.
    pub fn masked(&self, descriptor: Option<&ConnectorDescriptor>) -> Profile {
        let mut out = self.clone();
        if let Some(descriptor) = descriptor {
            for field in &descriptor.configs {
                if field.secret {
                    if let Some(v) = out.configs.get_mut(&field.name) {
                        *v = SECRET_MASK.to_string();
                    }
                }
            }
            for field in &descriptor.optionals {
                if field.secret {
                    if let Some(v) = out.optionals.get_mut(&field.name) {
                        *v = SECRET_MASK.to_string();
                    }
                }
            }
        }
        if let Some(auth) = out.auth.as_mut() {
            if auth.password.is_some() {
                auth.password = Some(SECRET_MASK.to_string());
            }
        }
        out
    }
}

/// Value kind of a descriptor field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConfigKind {
    String,
    Number,
    Boolean,
}

/// One configuration field a backend type accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigField {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ConfigKind,
    pub description: String,
    pub hint: String,
    pub required: bool,
    pub secret: bool,
    pub fill_hint: bool,
}

impl ConfigField {
    pub fn new(name: &str, kind: ConfigKind, description: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            description: description.to_string(),
            hint: String::new(),
            required: false,
            secret: false,
            fill_hint: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn secret(mut self) -> Self {
        self.secret = true;
        self
    }

    pub fn hint(mut self, hint: &str) -> Self {
        self.hint = hint.to_string();
        self
    }

    pub fn fill_hint(mut self) -> Self {
        self.fill_hint = true;
        self
    }
}

/// Static catalog entry for a backend type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorDescriptor {
    #[serde(rename = "type")]
    pub backend_type: String,
    pub configs: Vec<ConfigField>,
    pub optionals: Vec<ConfigField>,
}

impl ConnectorDescriptor {
    /// Looks a field up among configs first, then optionals.
    pub fn field(&self, name: &str) -> Option<&ConfigField> {
        self.configs
            .iter()
            .chain(self.optionals.iter())
            .find(|f| f.name == name)
    }

    pub fn config_field(&self, name: &str) -> Option<&ConfigField> {
        self.configs.iter().find(|f| f.name == name)
    }

    pub fn optional_field(&self, name: &str) -> Option<&ConfigField> {
        self.optionals.iter().find(|f| f.name == name)
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &ConfigField> {
        self.configs.iter().filter(|f| f.required)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> ConnectorDescriptor {
        ConnectorDescriptor {
            backend_type: "MySQL".to_string(),
            configs: vec![
                ConfigField::new("Endpoint", ConfigKind::String, "host").required(),
                ConfigField::new("Password", ConfigKind::String, "password")
                    .required()
                    .secret(),
                ConfigField::new("Schema", ConfigKind::String, "schema").fill_hint(),
            ],
            optionals: vec![ConfigField::new("Token", ConfigKind::String, "token").secret()],
        }
    }

    #[test]
    fn masked_hides_secret_configs_optionals_and_password() {
        let profile = Profile::new("MySQL", "m1")
            .with_config("Endpoint", "db.local")
            .with_config("Password", "hunter2")
            .with_optional("Token", "abc")
            .with_auth("root", Some("pw".into()));

        let masked = profile.masked(Some(&descriptor()));
        assert_eq!(masked.config("Endpoint"), Some("db.local"));
        assert_eq!(masked.config("Password"), Some(SECRET_MASK));
        assert_eq!(masked.optional("Token"), Some(SECRET_MASK));
        assert_eq!(
            masked.auth.unwrap().password.as_deref(),
            Some(SECRET_MASK)
        );
    }

    #[test]
    fn masked_leaves_absent_password_absent() {
        let profile = Profile::new("MySQL", "m1").with_auth("root", None);
        let masked = profile.masked(None);
        assert_eq!(masked.auth.unwrap().password, None);
    }

    #[test]
    fn descriptor_lookup_and_required() {
        let d = descriptor();
        assert!(d.field("Token").is_some());
        assert!(d.config_field("Token").is_none());
        let required: Vec<_> = d.required_fields().map(|f| f.name.as_str()).collect();
        assert_eq!(required, vec!["Endpoint", "Password"]);
        assert_eq!(
            Profile::new("MySQL", "x").secret_fields(&d),
            vec!["Password", "Token"]
        );
    }

    #[test]
    fn profile_json_shape() {
        let profile = Profile::new("PostgreSQL", "p1").with_config("endpoint", "h");
        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["type"], "PostgreSQL");
        assert_eq!(json["configs"]["endpoint"], "h");
        assert!(json.get("auth").is_none());

        let parsed: Profile =
            serde_json::from_str(r#"{"type":"PostgreSQL","name":"p2"}"#).unwrap();
        assert!(parsed.configs.is_empty());
    }

    #[test]
    fn config_field_json_shape() {
        let field = ConfigField::new("port", ConfigKind::Number, "port")
            .required()
            .hint("5432");
        let json = serde_json::to_value(&field).unwrap();
        assert_eq!(json["type"], "NUMBER");
        assert_eq!(json["fillHint"], false);
        assert_eq!(json["hint"], "5432");
    }
}
