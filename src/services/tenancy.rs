use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::{
        password::{hash_password, verify_password},
        AuthService, AuthUser, TokenPair,
    },
    db::{begin_write, DbPool},
    entities::{
        tenant::{self, Entity as Tenant},
        user::{self, Entity as User, UserRole},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    #[validate(length(min = 1, max = 255))]
    pub business_name: String,
    /// ISO 4217 code; the configured default when omitted
    #[validate(length(equal = 3))]
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateUserRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    pub role: UserRole,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SetUserActiveRequest {
    pub active: bool,
}

/// A user as shown to API callers; never carries the password hash.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct UserView {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<user::Model> for UserView {
    fn from(user: user::Model) -> Self {
        Self {
            id: user.id,
            tenant_id: user.tenant_id,
            name: user.name,
            email: user.email,
            role: user.role,
            active: user.active,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Session {
    pub user: UserView,
    pub tenant: tenant::Model,
    pub tokens: TokenPair,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Me {
    pub user: UserView,
    pub tenant: tenant::Model,
    pub permissions: Vec<String>,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn invalid_credentials() -> ServiceError {
    ServiceError::Unauthorized("invalid email or password".to_string())
}

async fn ensure_email_free<C: ConnectionTrait>(conn: &C, email: &str) -> Result<(), ServiceError> {
    let taken = User::find()
        .filter(user::Column::Email.eq(email))
        .one(conn)
        .await?
        .is_some();
    if taken {
        return Err(ServiceError::Conflict(format!(
            "email {} is already registered",
            email
        )));
    }
    Ok(())
}

/// Service for shops, their staff and sign-in
#[derive(Clone)]
pub struct TenancyService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    auth_service: Arc<AuthService>,
    default_currency: String,
}

impl TenancyService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        auth_service: Arc<AuthService>,
        default_currency: String,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            auth_service,
            default_currency,
        }
    }

    async fn load_tenant(&self, tenant_id: Uuid) -> Result<tenant::Model, ServiceError> {
        Tenant::find_by_id(tenant_id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::not_found("Tenant", tenant_id))
    }

    /// Creates a shop with its owner account and signs the owner in.
    #[instrument(skip(self, request), fields(business = %request.business_name))]
    pub async fn register(&self, request: RegisterRequest) -> Result<Session, ServiceError> {
        request.validate()?;
        let email = normalize_email(&request.email);
        let password_hash = hash_password(&request.password)?;
        let currency = request
            .currency
            .unwrap_or_else(|| self.default_currency.clone())
            .to_uppercase();

        let txn = begin_write(&self.db_pool).await?;
        ensure_email_free(&txn, &email).await?;

        let now = Utc::now();
        let tenant = tenant::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(request.business_name.trim().to_string()),
            currency: Set(currency),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let owner = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(tenant.id),
            name: Set(request.name.trim().to_string()),
            email: Set(email),
            password_hash: Set(password_hash),
            role: Set(UserRole::Owner),
            active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::TenantRegistered {
                tenant_id: tenant.id,
                owner_id: owner.id,
            })
            .await;
        info!(tenant_id = %tenant.id, "tenant registered");

        let tokens = self.auth_service.generate_token(&owner)?;
        Ok(Session {
            user: owner.into(),
            tenant,
            tokens,
        })
    }

    #[instrument(skip(self, request))]
    pub async fn login(&self, request: LoginRequest) -> Result<Session, ServiceError> {
        request.validate()?;
        let email = normalize_email(&request.email);

        let found = User::find()
            .filter(user::Column::Email.eq(email.as_str()))
            .one(&*self.db_pool)
            .await?
            .ok_or_else(invalid_credentials)?;

        if !verify_password(&request.password, &found.password_hash)? {
            warn!(user_id = %found.id, "failed login");
            return Err(invalid_credentials());
        }
        if !found.active {
            return Err(ServiceError::Forbidden("account is deactivated".to_string()));
        }

        let tenant = self.load_tenant(found.tenant_id).await?;
        let tokens = self.auth_service.generate_token(&found)?;
        info!(user_id = %found.id, "user signed in");
        Ok(Session {
            user: found.into(),
            tenant,
            tokens,
        })
    }

    /// Trades a refresh token for a new pair, re-reading the user's role and status.
    #[instrument(skip(self, refresh_token))]
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ServiceError> {
        let user_id = self.auth_service.validate_refresh_token(refresh_token)?;
        let found = User::find_by_id(user_id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::Unauthorized("unknown user".to_string()))?;
        if !found.active {
            return Err(ServiceError::Forbidden("account is deactivated".to_string()));
        }
        Ok(self.auth_service.generate_token(&found)?)
    }

    #[instrument(skip(self, caller), fields(user_id = %caller.user_id))]
    pub async fn me(&self, caller: &AuthUser) -> Result<Me, ServiceError> {
        let found = User::find_by_id(caller.user_id)
            .filter(user::Column::TenantId.eq(caller.tenant_id))
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::not_found("User", caller.user_id))?;
        let tenant = self.load_tenant(caller.tenant_id).await?;
        Ok(Me {
            user: found.into(),
            tenant,
            permissions: caller.permissions.clone(),
        })
    }

    /// Adds a staff account. Each shop has exactly one owner, created at registration.
    #[instrument(skip(self, request), fields(role = ?request.role))]
    pub async fn create_user(
        &self,
        tenant_id: Uuid,
        request: CreateUserRequest,
    ) -> Result<UserView, ServiceError> {
        request.validate()?;
        if request.role == UserRole::Owner {
            return Err(ServiceError::InvalidOperation(
                "a shop cannot have a second owner".to_string(),
            ));
        }
        let email = normalize_email(&request.email);
        let db = &*self.db_pool;
        ensure_email_free(db, &email).await?;

        let now = Utc::now();
        let created = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(tenant_id),
            name: Set(request.name.trim().to_string()),
            email: Set(email),
            password_hash: Set(hash_password(&request.password)?),
            role: Set(request.role),
            active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await?;

        self.event_sender
            .send_or_log(Event::UserCreated {
                tenant_id,
                user_id: created.id,
                role: created.role.as_str().to_string(),
            })
            .await;
        Ok(created.into())
    }

    #[instrument(skip(self))]
    pub async fn list_users(&self, tenant_id: Uuid) -> Result<Vec<UserView>, ServiceError> {
        let users = User::find()
            .filter(user::Column::TenantId.eq(tenant_id))
            .order_by_asc(user::Column::CreatedAt)
            .all(&*self.db_pool)
            .await?;
        Ok(users.into_iter().map(UserView::from).collect())
    }

    #[instrument(skip(self))]
    pub async fn set_user_active(
        &self,
        tenant_id: Uuid,
        actor_id: Uuid,
        user_id: Uuid,
        active: bool,
    ) -> Result<UserView, ServiceError> {
        if !active && actor_id == user_id {
            return Err(ServiceError::InvalidOperation(
                "you cannot deactivate your own account".to_string(),
            ));
        }

        let db = &*self.db_pool;
        let found = User::find_by_id(user_id)
            .filter(user::Column::TenantId.eq(tenant_id))
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found("User", user_id))?;
        if found.role == UserRole::Owner && !active {
            return Err(ServiceError::InvalidOperation(
                "the shop owner cannot be deactivated".to_string(),
            ));
        }

        let mut model: user::ActiveModel = found.into();
        model.active = Set(active);
        model.updated_at = Set(Utc::now());
        let updated = model.update(db).await?;
        info!(%user_id, active, "user status changed");
        Ok(updated.into())
    }
}
