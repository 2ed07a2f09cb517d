//! Records written by the intake pipeline.
//!
//! Both tables are append-only: a row is inserted once per accepted
//! submission and never updated or removed here.
use serde::Serialize;
pub use sqlx::FromRow;

/// Contact/demo request, bound for the `customers` table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewLead {
    pub software: String,
    pub source: String,
    pub name: String,
    pub company_name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub area: String,
    pub city: String,
    pub post_code: String,
    pub country: String,
    pub note: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Plan purchase request, bound for the `plans` table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewPlanOrder {
    pub software: String,
    pub source: String,
    pub name: String,
    pub company_name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub area: String,
    pub city: String,
    pub post_code: String,
    pub country: String,
    pub plan: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Clone, Debug, PartialEq, Eq, FromRow, Serialize)]
pub struct Lead {
    pub id: i64,
    pub software: String,
    pub source: String,
    pub name: String,
    pub company_name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub area: String,
    pub city: String,
    pub post_code: String,
    pub country: String,
    pub note: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Clone, Debug, PartialEq, Eq, FromRow, Serialize)]
pub struct PlanOrder {
    pub id: i64,
    pub software: String,
    pub source: String,
    pub name: String,
    pub company_name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub area: String,
    pub city: String,
    pub post_code: String,
    pub country: String,
    pub plan: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Where accepted submissions go. Each call is a single insert that either
/// lands completely or returns an error.
#[async_trait::async_trait]
pub trait LeadStore: Send + Sync {
    async fn insert_lead(&self, lead: &NewLead) -> Result<i64, sqlx::Error>;
    async fn insert_plan_order(&self, order: &NewPlanOrder) -> Result<i64, sqlx::Error>;
}
