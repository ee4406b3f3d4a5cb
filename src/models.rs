use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::types::{chrono::NaiveDate, BigDecimal, JsonValue, Uuid};

use crate::accounting::fiscal::{FiscalYearState, FiscalYearStatus};

#[derive(sqlx::FromRow, Serialize, Clone, Debug)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

#[derive(sqlx::FromRow, Serialize, Clone, Debug)]
pub struct Branch {
    pub code: String,
    pub name: String,
}

#[derive(sqlx::FromRow, Serialize, Clone, Debug)]
pub struct Settings {
    pub company_name: String,
    pub tax_number: String,
    pub address: String,
    pub phone: String,
    pub email: String,
    pub vat_rate: BigDecimal,
    pub currency: String,
}

#[derive(sqlx::FromRow, Serialize, Clone, Debug, Default)]
pub struct Account {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub account_type: String,
    pub parent_code: Option<String>,
    pub active: bool,
    pub allow_posting: bool,
}

#[derive(sqlx::FromRow, Serialize, Clone, Debug)]
pub struct FiscalYear {
    pub id: Uuid,
    pub year: i32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: String,
    pub closed_until: Option<NaiveDate>,
    pub closed_at: Option<DateTime<Utc>>,
    pub closed_by: Option<String>,
    pub close_reason: Option<String>,
    pub reopened_at: Option<DateTime<Utc>>,
    pub reopened_by: Option<String>,
    pub reopen_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl FiscalYear {
    pub fn status(&self) -> anyhow::Result<FiscalYearStatus> {
        FiscalYearStatus::parse(&self.status)
            .ok_or_else(|| anyhow::anyhow!("fiscal year {} has unknown status '{}'", self.year, self.status))
    }

    pub fn state(&self) -> anyhow::Result<FiscalYearState> {
        Ok(FiscalYearState {
            id: self.id,
            year: self.year,
            start_date: self.start_date,
            end_date: self.end_date,
            status: self.status()?,
            closed_until: self.closed_until,
        })
    }
}

#[derive(sqlx::FromRow, Serialize, Clone, Debug)]
pub struct ExceptionalPeriod {
    pub id: Uuid,
    pub fiscal_year_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reason: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Clone, Debug)]
pub struct FiscalYearAuditLog {
    pub id: Uuid,
    pub action: String,
    pub username: String,
    pub details: JsonValue,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Clone, Debug, Default)]
pub struct JournalEntry {
    pub id: Uuid,
    pub entry_number: String,
    pub entry_date: NaiveDate,
    pub description: String,
    pub source: String,
    pub source_ref: Option<String>,
    pub total_debit: BigDecimal,
    pub total_credit: BigDecimal,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Clone, Debug)]
pub struct JournalLine {
    pub line_no: i32,
    pub account_code: String,
    pub account_name: String,
    pub debit: BigDecimal,
    pub credit: BigDecimal,
    pub description: Option<String>,
}

#[derive(sqlx::FromRow, Serialize, Clone, Debug, Default)]
pub struct RawMaterial {
    pub id: Uuid,
    pub name: String,
    pub unit: String,
    pub stock_quantity: BigDecimal,
    pub cost_per_unit: BigDecimal,
    pub active: bool,
}

#[derive(sqlx::FromRow, Serialize, Clone, Debug, Default)]
pub struct Meal {
    pub id: Uuid,
    pub name: String,
    pub category: String,
    pub profit_margin: BigDecimal,
    pub total_cost: BigDecimal,
    pub selling_price: BigDecimal,
    pub active: bool,
}

#[derive(sqlx::FromRow, Serialize, Clone, Debug)]
pub struct MealIngredient {
    pub meal_id: Uuid,
    pub raw_material_id: Uuid,
    pub material_name: String,
    pub quantity: BigDecimal,
    pub total_cost: BigDecimal,
}

/// Header row shared by the sales, purchase and expense invoice tables.
#[derive(sqlx::FromRow, Serialize, Clone, Debug)]
pub struct Invoice {
    pub id: Uuid,
    pub invoice_number: String,
    pub date: NaiveDate,
    pub branch_code: String,
    pub party_id: Option<Uuid>,
    pub party_name: String,
    pub payment_method: String,
    pub expense_account_code: Option<String>,
    pub total_before_tax: BigDecimal,
    pub tax_amount: BigDecimal,
    pub discount_amount: BigDecimal,
    pub total_after_tax_discount: BigDecimal,
    pub status: String,
    pub journal_number: Option<String>,
    pub external_journal_id: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Clone, Debug)]
pub struct Customer {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub customer_type: String,
    pub discount_percent: BigDecimal,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Clone, Debug)]
pub struct Supplier {
    pub id: Uuid,
    pub name: String,
    pub contact_person: String,
    pub phone: String,
    pub email: String,
    pub tax_number: String,
    pub address: String,
    pub payment_method: String,
    pub notes: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Clone, Debug)]
pub struct InvoiceItem {
    pub id: Uuid,
    pub description: String,
    pub quantity: BigDecimal,
    pub unit_price: BigDecimal,
    pub discount: BigDecimal,
    pub tax: BigDecimal,
    pub total: BigDecimal,
}

#[derive(sqlx::FromRow, Serialize, Clone, Debug, Default)]
pub struct Payment {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub invoice_type: String,
    pub amount: BigDecimal,
    pub payment_date: NaiveDate,
    pub payment_method: String,
    pub reference: Option<String>,
    pub journal_number: Option<String>,
    pub external_journal_id: Option<String>,
    pub created_by: String,
}

#[derive(sqlx::FromRow, Serialize, Clone, Debug)]
pub struct Employee {
    pub id: Uuid,
    pub employee_code: String,
    pub name: String,
    pub national_id: String,
    pub branch_code: String,
    pub job_title: String,
    pub basic_salary: BigDecimal,
    pub hire_date: NaiveDate,
    pub active: bool,
}

#[derive(sqlx::FromRow, Serialize, Clone, Debug)]
pub struct Salary {
    pub id: Uuid,
    pub employee_id: Uuid,
    pub year: i32,
    pub month: i32,
    pub basic_salary: BigDecimal,
    pub allowances: BigDecimal,
    pub deductions: BigDecimal,
    pub previous_due: BigDecimal,
    pub total_salary: BigDecimal,
    pub status: String,
    pub journal_number: Option<String>,
    pub external_journal_id: Option<String>,
}

#[derive(sqlx::FromRow, Serialize, Clone, Debug)]
pub struct DiningTable {
    pub id: Uuid,
    pub branch_code: String,
    pub table_number: i32,
    pub status: String,
}

#[derive(sqlx::FromRow, Serialize, Clone, Debug)]
pub struct DraftOrder {
    pub id: Uuid,
    pub branch_code: String,
    pub table_number: i32,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Clone, Debug)]
pub struct DraftOrderItem {
    pub id: Uuid,
    pub meal_id: Uuid,
    pub description: String,
    pub quantity: BigDecimal,
    pub unit_price: BigDecimal,
}
