use bigdecimal::BigDecimal;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::{invalid, journal, payments, settings, NotFound, PostingContext};
use crate::{
    accounting::{
        journal::{payment_draft, salary_accrual_draft},
        money::{to_cents, zero},
        payroll::{check_salary_month, last_day_of_month, pay_amount, salary_reference, salary_total, SalaryComponents},
        reconciliation::{remaining, DocumentKind},
    },
    accounting_service::{idempotency_key, Endpoint, SalaryPayload, SOURCE_SYSTEM},
    models,
};

#[derive(Debug, Deserialize)]
pub struct NewEmployee {
    pub employee_code: String,
    pub name: String,
    pub national_id: String,
    pub branch_code: String,
    #[serde(default)]
    pub job_title: String,
    pub basic_salary: BigDecimal,
    pub hire_date: NaiveDate,
}

const EMPLOYEE_COLUMNS: &str =
    "id, employee_code, name, national_id, branch_code, job_title, basic_salary, hire_date, active";

pub async fn create_employee(p: &PgPool, e: NewEmployee) -> anyhow::Result<Uuid> {
    if e.employee_code.trim().is_empty() || e.name.trim().is_empty() || e.national_id.trim().is_empty() {
        return Err(invalid("employee code, name and national id are required"));
    }
    if e.basic_salary < zero() {
        return Err(invalid("basic salary must not be negative"));
    }
    let mut conn = p.acquire().await?;
    if !settings::branch_exists(&mut conn, &e.branch_code).await? {
        return Err(invalid(format!("unknown branch '{}'", e.branch_code)));
    }

    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO employees (id, employee_code, name, national_id, branch_code, job_title, basic_salary, hire_date)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(id)
    .bind(e.employee_code.trim())
    .bind(e.name.trim())
    .bind(e.national_id.trim())
    .bind(&e.branch_code)
    .bind(e.job_title.trim())
    .bind(to_cents(&e.basic_salary))
    .bind(e.hire_date)
    .execute(&mut *conn)
    .await?;

    log::info!("employee {} '{}' created", e.employee_code.trim(), e.name.trim());
    Ok(id)
}

pub async fn list_employees(p: &PgPool) -> anyhow::Result<Vec<models::Employee>> {
    Ok(sqlx::query_as::<_, models::Employee>(&format!(
        "SELECT {EMPLOYEE_COLUMNS} FROM employees ORDER BY active DESC, employee_code"
    ))
    .fetch_all(p)
    .await?)
}

pub async fn deactivate(p: &PgPool, id: Uuid) -> anyhow::Result<()> {
    let res = sqlx::query("UPDATE employees SET active = FALSE WHERE id = $1")
        .bind(id)
        .execute(p)
        .await?;
    if res.rows_affected() == 0 {
        return Err(NotFound(format!("employee {id}")).into());
    }
    log::info!("employee {} deactivated", id);
    Ok(())
}

async fn employee(conn: &mut PgConnection, id: Uuid) -> anyhow::Result<models::Employee> {
    sqlx::query_as::<_, models::Employee>(&format!("SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE id = $1"))
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| NotFound(format!("employee {id}")).into())
}

#[derive(Debug, Deserialize)]
pub struct NewSalary {
    pub employee_id: Uuid,
    pub year: i32,
    pub month: u32,
    /// Defaults to the employee's basic salary.
    #[serde(default)]
    pub basic_salary: Option<BigDecimal>,
    #[serde(default = "zero")]
    pub allowances: BigDecimal,
    #[serde(default = "zero")]
    pub deductions: BigDecimal,
    #[serde(default = "zero")]
    pub previous_due: BigDecimal,
}

#[derive(Debug, Serialize)]
pub struct SalaryCreated {
    pub id: Uuid,
    pub reference: String,
    pub total_salary: BigDecimal,
    pub status: String,
    pub journal_number: Option<String>,
    pub external_journal_id: Option<String>,
}

/// Records a month's salary and accrues it on the last day of the month.
pub async fn create_salary(p: &PgPool, s: NewSalary, ctx: PostingContext<'_>) -> anyhow::Result<SalaryCreated> {
    check_salary_month(s.year, s.month, Utc::now().date_naive())?;
    let date = last_day_of_month(s.year, s.month)?;

    let mut tx = p.begin().await?;
    let emp = employee(&mut tx, s.employee_id).await?;
    if !emp.active {
        return Err(invalid(format!("employee {} is inactive", emp.employee_code)));
    }
    let components = SalaryComponents {
        basic: s.basic_salary.clone().unwrap_or_else(|| emp.basic_salary.clone()),
        allowances: s.allowances.clone(),
        deductions: s.deductions.clone(),
        previous_due: s.previous_due.clone(),
    };
    let total = salary_total(&components)?;
    super::fiscal::check_period(&mut tx, date, ctx.require_fiscal_year).await?;

    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO salaries
            (id, employee_id, year, month, basic_salary, allowances, deductions, previous_due, total_salary)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(id)
    .bind(emp.id)
    .bind(s.year)
    .bind(s.month as i32)
    .bind(to_cents(&components.basic))
    .bind(to_cents(&components.allowances))
    .bind(to_cents(&components.deductions))
    .bind(to_cents(&components.previous_due))
    .bind(&total)
    .execute(&mut *tx)
    .await?;

    let reference = salary_reference(&emp.employee_code, s.year, s.month);
    let (journal_number, external_journal_id) = if total <= zero() {
        (None, None)
    } else if let Some(service) = ctx.service {
        let payload = SalaryPayload {
            source_system: SOURCE_SYSTEM,
            idempotency_key: idempotency_key("salary-accrual", &reference),
            employee_code: emp.employee_code.clone(),
            employee_name: emp.name.clone(),
            year: s.year,
            month: s.month as i32,
            amount: total.clone(),
            date,
            payment_method: None,
        };
        (None, service.send(Endpoint::SalaryAccrual, &payload).await?)
    } else {
        let draft = salary_accrual_draft(&reference, &emp.name, date, &total);
        (Some(journal::post(&mut tx, &draft, ctx).await?.entry_number), None)
    };
    sqlx::query("UPDATE salaries SET journal_number = $2, external_journal_id = $3 WHERE id = $1")
        .bind(id)
        .bind(&journal_number)
        .bind(&external_journal_id)
        .execute(&mut *tx)
        .await?;
    let status = payments::refresh_status(&mut tx, DocumentKind::Salary, id).await?;
    tx.commit().await?;

    log::info!("salary {} recorded, total {}", reference, total);
    Ok(SalaryCreated {
        id,
        reference,
        total_salary: total,
        status,
        journal_number,
        external_journal_id,
    })
}

/// Pays a salary; the amount is capped at what is still owed.
pub async fn pay_salary(
    p: &PgPool,
    salary_id: Uuid,
    requested: &BigDecimal,
    date: NaiveDate,
    method: &str,
    ctx: PostingContext<'_>,
) -> anyhow::Result<payments::Recorded> {
    let mut tx = p.begin().await?;
    let salary = sqlx::query_as::<_, models::Salary>(
        r#"
        SELECT id, employee_id, year, month, basic_salary, allowances, deductions, previous_due,
               total_salary, status, journal_number, external_journal_id
        FROM salaries
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(salary_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| NotFound(format!("salary {salary_id}")))?;
    let emp = employee(&mut tx, salary.employee_id).await?;

    let paid = payments::paid_total(&mut tx, DocumentKind::Salary, salary_id).await?;
    let amount = pay_amount(requested, &salary.total_salary, &paid)?;
    super::fiscal::check_period(&mut tx, date, ctx.require_fiscal_year).await?;

    let reference = salary_reference(&emp.employee_code, salary.year, salary.month as u32);
    let payment_id = Uuid::new_v4();
    let (journal_number, external_journal_id) = match ctx.service {
        Some(service) => {
            let payload = SalaryPayload {
                source_system: SOURCE_SYSTEM,
                idempotency_key: idempotency_key("salary-payment", &payment_id.to_string()),
                employee_code: emp.employee_code.clone(),
                employee_name: emp.name.clone(),
                year: salary.year,
                month: salary.month,
                amount: amount.clone(),
                date,
                payment_method: Some(method.to_string()),
            };
            (None, service.send(Endpoint::SalaryPayment, &payload).await?)
        }
        None => {
            let draft = payment_draft(DocumentKind::Salary, &reference, date, &amount, method);
            (Some(journal::post(&mut tx, &draft, ctx).await?.entry_number), None)
        }
    };

    payments::insert(
        &mut tx,
        &payments::PaymentRecord {
            id: payment_id,
            kind: DocumentKind::Salary,
            document_id: salary_id,
            amount: amount.clone(),
            date,
            method,
            reference: Some(reference.as_str()),
            journal_number: journal_number.clone(),
            external_journal_id: external_journal_id.clone(),
        },
        ctx.user,
    )
    .await?;
    let status = payments::refresh_status(&mut tx, DocumentKind::Salary, salary_id).await?;
    tx.commit().await?;

    log::info!("salary {} paid {} ({})", reference, amount, status);
    Ok(payments::Recorded {
        payment_id,
        document_number: reference,
        amount,
        status,
        journal_number,
        external_journal_id,
    })
}

#[derive(Debug, Serialize)]
pub struct SummaryRow {
    pub salary_id: Uuid,
    pub employee_code: String,
    pub name: String,
    pub total: BigDecimal,
    pub paid: BigDecimal,
    pub remaining: BigDecimal,
    pub status: String,
}

#[derive(sqlx::FromRow)]
struct SummaryQueryRow {
    id: Uuid,
    employee_code: String,
    name: String,
    total_salary: BigDecimal,
    status: String,
    paid: BigDecimal,
}

pub async fn summary(p: &PgPool, year: i32, month: u32) -> anyhow::Result<Vec<SummaryRow>> {
    let rows = sqlx::query_as::<_, SummaryQueryRow>(
        r#"
        SELECT s.id, e.employee_code, e.name, s.total_salary, s.status,
               COALESCE((SELECT SUM(p.amount) FROM payments p
                         WHERE p.invoice_type = 'salary' AND p.invoice_id = s.id), 0) AS paid
        FROM salaries s
        JOIN employees e ON e.id = s.employee_id
        WHERE s.year = $1 AND s.month = $2
        ORDER BY e.employee_code
        "#,
    )
    .bind(year)
    .bind(month as i32)
    .fetch_all(p)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| SummaryRow {
            remaining: remaining(&r.total_salary, &r.paid),
            salary_id: r.id,
            employee_code: r.employee_code,
            name: r.name,
            total: r.total_salary,
            paid: to_cents(&r.paid),
            status: r.status,
        })
        .collect())
}
