use crate::api::Role;
use crate::error::ApiError;

/// Everything a session may be allowed to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    BrowseCatalog,
    ViewOwnBorrows,
    ManageCatalog,
    ManageBorrows,
    ViewLedger,
    ManageUsers,
}

impl Role {
    pub fn grants(self, capability: Capability) -> bool {
        match self {
            Role::Admin => true,
            Role::User => matches!(
                capability,
                Capability::BrowseCatalog | Capability::ViewOwnBorrows
            ),
        }
    }
}

pub fn require_capability(role: Role, capability: Capability) -> Result<(), ApiError> {
    if role.grants(capability) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(format!(
            "Role: ({role}) is not allowed to access this resource"
        )))
    }
}

#[cfg(test)]
mod capability_tests {
    use super::*;

    #[test]
    fn test_user_is_limited_to_own_data_and_catalog() {
        assert!(Role::User.grants(Capability::BrowseCatalog));
        assert!(Role::User.grants(Capability::ViewOwnBorrows));
        for capability in [
            Capability::ManageCatalog,
            Capability::ManageBorrows,
            Capability::ViewLedger,
            Capability::ManageUsers,
        ] {
            assert!(!Role::User.grants(capability));
            assert!(matches!(
                require_capability(Role::User, capability),
                Err(ApiError::Forbidden(..))
            ));
        }
    }

    #[test]
    fn test_admin_has_every_capability() {
        assert!(require_capability(Role::Admin, Capability::ManageBorrows).is_ok());
        assert!(require_capability(Role::Admin, Capability::ViewOwnBorrows).is_ok());
    }
}
