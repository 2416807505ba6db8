//! Employee repository
//!
//! Read access for the provisioning pipeline plus the HR intake and
//! offboarding writes. Employees are terminated, never deleted.

use chrono::Utc;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use uuid::Uuid;

use crate::identity::normalize_email;
use crate::models::employee::{self, Entity as Employee};

/// Fields captured at HR intake
#[derive(Debug, Clone)]
pub struct NewEmployee {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub department: String,
    pub position: String,
    pub manager_id: Option<Uuid>,
    pub hired_at: DateTimeWithTimeZone,
}

#[derive(Debug, Clone)]
pub struct EmployeeRepository {
    db: DatabaseConnection,
}

impl EmployeeRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn create(&self, new: NewEmployee) -> Result<employee::Model, DbErr> {
        let id = Uuid::new_v4();
        let now = Utc::now().fixed_offset();
        let model = employee::ActiveModel {
            id: Set(id),
            email: Set(normalize_email(&new.email)),
            first_name: Set(new.first_name),
            last_name: Set(new.last_name),
            department: Set(new.department),
            position: Set(new.position),
            manager_id: Set(new.manager_id),
            hired_at: Set(new.hired_at),
            terminated_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        Employee::insert(model).exec_without_returning(&self.db).await?;
        Employee::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| DbErr::RecordNotFound(format!("employee {}", id)))
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<employee::Model>, DbErr> {
        Employee::find_by_id(id).one(&self.db).await
    }

    /// Employees among `ids`, in no particular order; missing ids are simply absent
    pub async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<employee::Model>, DbErr> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        Employee::find()
            .filter(employee::Column::Id.is_in(ids.iter().copied()))
            .order_by_asc(employee::Column::Email)
            .all(&self.db)
            .await
    }

    /// Stamp `terminated_at`; a second call keeps the original timestamp
    pub async fn terminate(&self, id: Uuid) -> Result<Option<employee::Model>, DbErr> {
        let Some(existing) = self.find_by_id(id).await? else {
            return Ok(None);
        };
        if existing.is_terminated() {
            return Ok(Some(existing));
        }

        let now = Utc::now().fixed_offset();
        let mut active: employee::ActiveModel = existing.into();
        active.terminated_at = Set(Some(now));
        active.updated_at = Set(now);
        active.update(&self.db).await.map(Some)
    }
}
