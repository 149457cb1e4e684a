/*!
 * # Role-Based Access Control
 *
 * Static role table for shop staff. Owners and admins hold the `*`
 * permission; cashiers get the counter-side subset.
 */

use lazy_static::lazy_static;
use std::collections::HashMap;
use tracing::warn;

use crate::entities::user::UserRole;

pub mod permissions {
    pub const PRODUCTS_READ: &str = "products:read";
    pub const PRODUCTS_WRITE: &str = "products:write";
    pub const STOCK_ADJUST: &str = "stock:adjust";
    pub const CUSTOMERS_READ: &str = "customers:read";
    pub const CUSTOMERS_WRITE: &str = "customers:write";
    pub const CUSTOMERS_RECONCILE: &str = "customers:reconcile";
    pub const SALES_CREATE: &str = "sales:create";
    pub const SALES_READ: &str = "sales:read";
    pub const DEBTS_READ: &str = "debts:read";
    pub const DEBTS_COLLECT: &str = "debts:collect";
    pub const RETURNS_CREATE: &str = "returns:create";
    pub const RETURNS_READ: &str = "returns:read";
    pub const RETURNS_REVIEW: &str = "returns:review";
    pub const PURCHASE_ORDERS_READ: &str = "purchase-orders:read";
    pub const PURCHASE_ORDERS_WRITE: &str = "purchase-orders:write";
    pub const PURCHASE_ORDERS_RECEIVE: &str = "purchase-orders:receive";
    pub const EXPENSES_READ: &str = "expenses:read";
    pub const EXPENSES_WRITE: &str = "expenses:write";
    pub const REPORTS_READ: &str = "reports:read";
    pub const USERS_MANAGE: &str = "users:manage";
}

/// Role definition with associated permissions
#[derive(Debug, Clone)]
pub struct Role {
    pub name: &'static str,
    pub description: &'static str,
    pub permissions: Vec<&'static str>,
}

lazy_static! {
    pub static ref ROLES: HashMap<&'static str, Role> = {
        use permissions::*;

        let mut roles = HashMap::new();
        roles.insert(
            "owner",
            Role {
                name: "owner",
                description: "Shop owner, created at registration",
                permissions: vec!["*"],
            },
        );
        roles.insert(
            "admin",
            Role {
                name: "admin",
                description: "Manager with full access",
                permissions: vec!["*"],
            },
        );
        roles.insert(
            "cashier",
            Role {
                name: "cashier",
                description: "Counter staff",
                permissions: vec![
                    PRODUCTS_READ,
                    CUSTOMERS_READ,
                    CUSTOMERS_WRITE,
                    SALES_CREATE,
                    SALES_READ,
                    DEBTS_READ,
                    DEBTS_COLLECT,
                    RETURNS_CREATE,
                    RETURNS_READ,
                    EXPENSES_READ,
                ],
            },
        );
        roles
    };
}

pub fn permissions_for_role(role: UserRole) -> Vec<String> {
    match ROLES.get(role.as_str()) {
        Some(role) => role.permissions.iter().map(|p| p.to_string()).collect(),
        None => {
            warn!(role = role.as_str(), "role not found");
            vec![]
        }
    }
}

/// Whether a granted permission covers the required one.
///
/// `*` matches everything and `scope:*` matches every action in a scope.
pub fn check_permission(granted: &str, required: &str) -> bool {
    if granted == "*" || granted == required {
        return true;
    }
    match granted.strip_suffix(":*") {
        Some(scope) => required
            .split_once(':')
            .map_or(false, |(required_scope, _)| required_scope == scope),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::permissions::*;
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("*", RETURNS_REVIEW, true)]
    #[case("returns:*", RETURNS_REVIEW, true)]
    #[case("returns:*", "returnsx:read", false)]
    #[case(RETURNS_READ, RETURNS_REVIEW, false)]
    #[case(SALES_CREATE, SALES_CREATE, true)]
    fn permission_matching(#[case] granted: &str, #[case] required: &str, #[case] ok: bool) {
        assert_eq!(check_permission(granted, required), ok);
    }

    #[test]
    fn cashier_cannot_review_returns() {
        let perms = permissions_for_role(UserRole::Cashier);
        assert!(perms.iter().any(|p| p == SALES_CREATE));
        assert!(!perms.iter().any(|p| check_permission(p, RETURNS_REVIEW)));
        assert!(!perms.iter().any(|p| check_permission(p, REPORTS_READ)));
    }

    #[test]
    fn owner_and_admin_hold_everything() {
        for role in [UserRole::Owner, UserRole::Admin] {
            assert_eq!(permissions_for_role(role), vec!["*".to_string()]);
        }
    }
}
