// [libs/domain/models/src/admin.rs]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Jerarquía total de roles administrativos, declarada en orden de
/// privilegio ascendente para que `Ord` derive la comparación correcta
/// en los guardias perimetrales.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdminRole {
    Readonly,
    Auditor,
    NetworkOperator,
    Admin,
    SuperAdmin,
}

impl AdminRole {
    pub fn as_wire(&self) -> &'static str {
        match self {
            AdminRole::Readonly => "readonly",
            AdminRole::Auditor => "auditor",
            AdminRole::NetworkOperator => "network-operator",
            AdminRole::Admin => "admin",
            AdminRole::SuperAdmin => "super-admin",
        }
    }

    /// Verificación de umbral: el rol portado alcanza o supera al exigido.
    pub fn satisfies(&self, required: AdminRole) -> bool {
        *self >= required
    }
}

impl fmt::Display for AdminRole {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_wire())
    }
}

impl FromStr for AdminRole {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "readonly" => Ok(AdminRole::Readonly),
            "auditor" => Ok(AdminRole::Auditor),
            "network-operator" => Ok(AdminRole::NetworkOperator),
            "admin" => Ok(AdminRole::Admin),
            "super-admin" => Ok(AdminRole::SuperAdmin),
            other => Err(format!("UNKNOWN_ADMIN_ROLE: {other}")),
        }
    }
}

/// Operador humano del plano de control.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminUser {
    pub id: String,

    #[serde(rename = "organization_id")]
    pub org_id: String,

    /// Correo único a nivel global.
    pub email: String,

    pub name: String,

    pub role: AdminRole,

    /// Sujeto OIDC federado, si el operador proviene de un IdP externo.
    #[serde(rename = "oidc_subject")]
    pub oidc_subject: Option<String>,

    #[serde(rename = "is_active")]
    pub is_active: bool,

    #[serde(rename = "last_login_at")]
    pub last_login_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_hierarchy_is_totally_ordered() {
        assert!(AdminRole::SuperAdmin.satisfies(AdminRole::Admin));
        assert!(AdminRole::Admin.satisfies(AdminRole::NetworkOperator));
        assert!(AdminRole::NetworkOperator.satisfies(AdminRole::Auditor));
        assert!(AdminRole::Auditor.satisfies(AdminRole::Readonly));

        assert!(!AdminRole::Auditor.satisfies(AdminRole::NetworkOperator));
        assert!(!AdminRole::Readonly.satisfies(AdminRole::Auditor));
    }

    #[test]
    fn role_wire_round_trip() {
        for role in [
            AdminRole::Readonly,
            AdminRole::Auditor,
            AdminRole::NetworkOperator,
            AdminRole::Admin,
            AdminRole::SuperAdmin,
        ] {
            assert_eq!(AdminRole::from_str(role.as_wire()), Ok(role));
        }
    }
}
