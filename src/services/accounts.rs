use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::password::hash_password,
    entities::user::{self, UserRole},
    errors::ServiceError,
};

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(length(min = 3, max = 150))]
    pub username: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 128, message = "Password must be at least 8 characters"))]
    pub password: String,
    #[validate(length(max = 20))]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateProfileRequest {
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(max = 20))]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: UserRole,
    pub phone: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<user::Model> for UserResponse {
    fn from(model: user::Model) -> Self {
        Self {
            id: model.id,
            username: model.username,
            email: model.email,
            role: model.role,
            phone: model.phone,
            is_active: model.is_active,
            created_at: model.created_at,
        }
    }
}

/// Customer and staff accounts
#[derive(Clone)]
pub struct AccountService {
    db: Arc<DatabaseConnection>,
}

impl AccountService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Self-service sign-up; always creates a customer.
    #[instrument(skip(self, request), fields(username = %request.username))]
    pub async fn register(&self, request: RegisterRequest) -> Result<UserResponse, ServiceError> {
        request.validate()?;
        let created = self
            .create_user(
                &request.username,
                &request.email,
                &request.password,
                UserRole::Customer,
                request.phone,
            )
            .await?;
        Ok(created.into())
    }

    /// Creates a staff account, used by the operator CLI.
    #[instrument(skip(self, password))]
    pub async fn create_admin(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<UserResponse, ServiceError> {
        let created = self
            .create_user(username, email, password, UserRole::Admin, None)
            .await?;
        Ok(created.into())
    }

    pub async fn create_user(
        &self,
        username: &str,
        email: &str,
        password: &str,
        role: UserRole,
        phone: Option<String>,
    ) -> Result<user::Model, ServiceError> {
        let db = &*self.db;
        let username = username.trim().to_string();
        let email = email.trim().to_lowercase();
        if username.is_empty() || password.is_empty() {
            return Err(ServiceError::ValidationError(
                "Username and password are required".to_string(),
            ));
        }

        let taken = user::Entity::find()
            .filter(
                Condition::any()
                    .add(user::Column::Username.eq(username.clone()))
                    .add(user::Column::Email.eq(email.clone())),
            )
            .count(db)
            .await?;
        if taken > 0 {
            return Err(ServiceError::Conflict(
                "Username or email already registered".to_string(),
            ));
        }

        let now = Utc::now();
        let created = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            username: Set(username),
            email: Set(email),
            password_hash: Set(hash_password(password)?),
            role: Set(role),
            phone: Set(phone.filter(|p| !p.trim().is_empty())),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to create user");
            ServiceError::DatabaseError(e)
        })?;

        info!(user_id = %created.id, role = created.role.as_str(), "User created");
        Ok(created)
    }

    pub async fn get_profile(&self, user_id: Uuid) -> Result<UserResponse, ServiceError> {
        Ok(self.find(user_id).await?.into())
    }

    pub async fn update_profile(
        &self,
        user_id: Uuid,
        request: UpdateProfileRequest,
    ) -> Result<UserResponse, ServiceError> {
        request.validate()?;
        let db = &*self.db;
        let existing = self.find(user_id).await?;

        let mut active: user::ActiveModel = existing.into();
        if let Some(email) = request.email {
            let email = email.trim().to_lowercase();
            let taken = user::Entity::find()
                .filter(user::Column::Email.eq(email.clone()))
                .filter(user::Column::Id.ne(user_id))
                .count(db)
                .await?;
            if taken > 0 {
                return Err(ServiceError::Conflict("Email already registered".to_string()));
            }
            active.email = Set(email);
        }
        if let Some(phone) = request.phone {
            active.phone = Set(Some(phone).filter(|p| !p.trim().is_empty()));
        }

        let updated = active.update(db).await?;
        Ok(updated.into())
    }

    async fn find(&self, user_id: Uuid) -> Result<user::Model, ServiceError> {
        user::Entity::find_by_id(user_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("User {} not found", user_id)))
    }
}
