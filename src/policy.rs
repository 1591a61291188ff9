//! Capability checks for every operation. Handlers never compare roles
//! themselves; services call [`authorize`] once with what they are about to do.

use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::Role,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    BrowseCatalog,
    ManageCatalog,
    ManageSuppliers,
    ManageInventory,
    UseCart,
    PlaceOrder,
    ViewOrder { owner: Uuid },
    PayOrder { owner: Uuid },
    CancelOrder { owner: Uuid },
    ViewAllOrders,
    ManageProfile,
}

pub fn permits(role: Role, user_id: Uuid, capability: Capability) -> bool {
    match role {
        Role::Admin => true,
        Role::Customer => match capability {
            Capability::BrowseCatalog
            | Capability::UseCart
            | Capability::PlaceOrder
            | Capability::ManageProfile => true,
            Capability::ViewOrder { owner }
            | Capability::PayOrder { owner }
            | Capability::CancelOrder { owner } => owner == user_id,
            Capability::ManageCatalog
            | Capability::ManageSuppliers
            | Capability::ManageInventory
            | Capability::ViewAllOrders => false,
        },
    }
}

pub fn authorize(user: &AuthUser, capability: Capability) -> AppResult<()> {
    if permits(user.role, user.user_id, capability) {
        Ok(())
    } else {
        tracing::debug!(user_id = %user.user_id, role = %user.role, ?capability, "capability denied");
        Err(AppError::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customer() -> AuthUser {
        AuthUser {
            user_id: Uuid::new_v4(),
            role: Role::Customer,
        }
    }

    #[test]
    fn customers_shop_but_do_not_administer() {
        let user = customer();
        assert!(authorize(&user, Capability::UseCart).is_ok());
        assert!(authorize(&user, Capability::PlaceOrder).is_ok());
        assert!(authorize(&user, Capability::BrowseCatalog).is_ok());
        assert!(matches!(
            authorize(&user, Capability::ManageCatalog),
            Err(AppError::Forbidden)
        ));
        assert!(authorize(&user, Capability::ManageInventory).is_err());
        assert!(authorize(&user, Capability::ViewAllOrders).is_err());
    }

    #[test]
    fn order_capabilities_follow_ownership() {
        let user = customer();
        let stranger = Uuid::new_v4();
        assert!(authorize(&user, Capability::PayOrder { owner: user.user_id }).is_ok());
        assert!(authorize(&user, Capability::CancelOrder { owner: user.user_id }).is_ok());
        assert!(authorize(&user, Capability::PayOrder { owner: stranger }).is_err());
        assert!(authorize(&user, Capability::ViewOrder { owner: stranger }).is_err());
    }

    #[test]
    fn admins_may_act_on_any_order() {
        let admin = AuthUser {
            user_id: Uuid::new_v4(),
            role: Role::Admin,
        };
        let owner = Uuid::new_v4();
        assert!(authorize(&admin, Capability::CancelOrder { owner }).is_ok());
        assert!(authorize(&admin, Capability::PayOrder { owner }).is_ok());
        assert!(authorize(&admin, Capability::ManageSuppliers).is_ok());
    }
}
