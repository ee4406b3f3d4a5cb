use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::{invalid, NotFound};
use crate::{
    accounting::{
        costing::{ingredient_cost, meal_cost, selling_price, stock_value, weighted_average, StockValuation, DEFAULT_PROFIT_MARGIN},
        money::{to_cents, to_cost, zero},
    },
    models,
};

const MATERIAL_COLUMNS: &str = "id, name, unit, stock_quantity, cost_per_unit, active";
const MEAL_COLUMNS: &str = "id, name, category, profit_margin, total_cost, selling_price, active";

pub async fn materials(p: &PgPool) -> anyhow::Result<Vec<models::RawMaterial>> {
    Ok(sqlx::query_as::<_, models::RawMaterial>(&format!(
        "SELECT {MATERIAL_COLUMNS} FROM raw_materials WHERE active ORDER BY name"
    ))
    .fetch_all(p)
    .await?)
}

pub async fn create_material(
    p: &PgPool,
    name: &str,
    unit: &str,
    stock_quantity: &BigDecimal,
    cost_per_unit: &BigDecimal,
) -> anyhow::Result<Uuid> {
    let name = name.trim();
    if name.is_empty() {
        return Err(invalid("material name must not be empty"));
    }
    if *stock_quantity < zero() || *cost_per_unit < zero() {
        return Err(invalid("stock quantity and cost must not be negative"));
    }

    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO raw_materials (id, name, unit, stock_quantity, cost_per_unit) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(id)
    .bind(name)
    .bind(unit.trim())
    .bind(to_cost(stock_quantity))
    .bind(to_cost(cost_per_unit))
    .execute(p)
    .await?;

    log::info!("raw material '{}' created", name);
    Ok(id)
}

/// Looks a material up by name, case-insensitively, creating it with an
/// empty stock when it does not exist yet.
pub async fn find_or_create_material(conn: &mut PgConnection, name: &str, unit: &str) -> anyhow::Result<Uuid> {
    let name = name.trim();
    let found: Option<Uuid> = sqlx::query_scalar("SELECT id FROM raw_materials WHERE lower(name) = lower($1)")
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?;
    if let Some(id) = found {
        return Ok(id);
    }

    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO raw_materials (id, name, unit) VALUES ($1, $2, $3)")
        .bind(id)
        .bind(name)
        .bind(if unit.trim().is_empty() { "unit" } else { unit.trim() })
        .execute(&mut *conn)
        .await?;
    log::info!("raw material '{}' created from purchase", name);
    Ok(id)
}

/// Adds received stock at `unit_price` and moves the unit cost to the
/// weighted average.
pub async fn receive(
    conn: &mut PgConnection,
    material_id: Uuid,
    qty: &BigDecimal,
    unit_price: &BigDecimal,
) -> anyhow::Result<StockValuation> {
    let (stock, cost): (BigDecimal, BigDecimal) = sqlx::query_as(
        "SELECT stock_quantity, cost_per_unit FROM raw_materials WHERE id = $1 FOR UPDATE",
    )
    .bind(material_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| NotFound(format!("raw material {material_id}")))?;

    let v = weighted_average(&stock, &cost, qty, unit_price)?;
    sqlx::query("UPDATE raw_materials SET stock_quantity = $2, cost_per_unit = $3 WHERE id = $1")
        .bind(material_id)
        .bind(&v.stock_quantity)
        .bind(&v.cost_per_unit)
        .execute(&mut *conn)
        .await?;
    Ok(v)
}

#[derive(Debug, Serialize)]
pub struct ValuationRow {
    pub name: String,
    pub unit: String,
    pub stock_quantity: BigDecimal,
    pub cost_per_unit: BigDecimal,
    pub value: BigDecimal,
}

#[derive(Debug, Serialize)]
pub struct Valuation {
    pub rows: Vec<ValuationRow>,
    pub total: BigDecimal,
}

pub async fn valuation(p: &PgPool) -> anyhow::Result<Valuation> {
    let rows: Vec<ValuationRow> = materials(p)
        .await?
        .into_iter()
        .map(|m| ValuationRow {
            value: stock_value(&m.stock_quantity, &m.cost_per_unit),
            name: m.name,
            unit: m.unit,
            stock_quantity: m.stock_quantity,
            cost_per_unit: m.cost_per_unit,
        })
        .collect();
    let total = to_cents(&rows.iter().fold(zero(), |acc, r| acc + &r.value));
    Ok(Valuation { rows, total })
}

pub async fn meals(p: &PgPool) -> anyhow::Result<Vec<models::Meal>> {
    Ok(sqlx::query_as::<_, models::Meal>(&format!(
        "SELECT {MEAL_COLUMNS} FROM meals WHERE active ORDER BY category, name"
    ))
    .fetch_all(p)
    .await?)
}

pub async fn meal(conn: &mut PgConnection, id: Uuid) -> anyhow::Result<models::Meal> {
    sqlx::query_as::<_, models::Meal>(&format!("SELECT {MEAL_COLUMNS} FROM meals WHERE id = $1"))
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| NotFound(format!("meal {id}")).into())
}

pub async fn ingredients(p: &PgPool) -> anyhow::Result<Vec<models::MealIngredient>> {
    Ok(sqlx::query_as::<_, models::MealIngredient>(
        r#"
        SELECT mi.meal_id, mi.raw_material_id, r.name AS material_name, mi.quantity, mi.total_cost
        FROM meal_ingredients mi
        JOIN raw_materials r ON r.id = mi.raw_material_id
        ORDER BY r.name
        "#,
    )
    .fetch_all(p)
    .await?)
}

#[derive(Debug, Deserialize)]
pub struct IngredientInput {
    pub raw_material_id: Uuid,
    pub quantity: BigDecimal,
}

#[derive(Debug, Deserialize)]
pub struct NewMeal {
    pub name: String,
    #[serde(default)]
    pub category: String,
    pub profit_margin: Option<BigDecimal>,
    pub ingredients: Vec<IngredientInput>,
}

pub async fn create_meal(p: &PgPool, m: NewMeal) -> anyhow::Result<models::Meal> {
    let name = m.name.trim();
    if name.is_empty() {
        return Err(invalid("meal name must not be empty"));
    }
    if m.ingredients.is_empty() {
        return Err(invalid("a meal needs at least one ingredient"));
    }
    let margin = m.profit_margin.unwrap_or_else(|| BigDecimal::from(DEFAULT_PROFIT_MARGIN));
    selling_price(&zero(), &margin)?;

    let mut tx = p.begin().await?;
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO meals (id, name, category, profit_margin) VALUES ($1, $2, $3, $4)")
        .bind(id)
        .bind(name)
        .bind(m.category.trim())
        .bind(&margin)
        .execute(&mut *tx)
        .await?;

    for ing in &m.ingredients {
        if ing.quantity <= zero() {
            return Err(invalid("ingredient quantity must be greater than zero"));
        }
        sqlx::query(
            "INSERT INTO meal_ingredients (id, meal_id, raw_material_id, quantity) VALUES ($1, $2, $3, $4)",
        )
        .bind(Uuid::new_v4())
        .bind(id)
        .bind(ing.raw_material_id)
        .bind(to_cost(&ing.quantity))
        .execute(&mut *tx)
        .await?;
    }

    recompute_meal(&mut tx, id).await?;
    let meal = meal(&mut tx, id).await?;
    tx.commit().await?;

    log::info!("meal '{}' created, cost {} price {}", meal.name, meal.total_cost, meal.selling_price);
    Ok(meal)
}

/// Re-prices a meal from the current unit cost of its ingredients.
pub async fn recompute_meal(conn: &mut PgConnection, meal_id: Uuid) -> anyhow::Result<()> {
    let rows: Vec<(Uuid, BigDecimal, BigDecimal)> = sqlx::query_as(
        r#"
        SELECT mi.id, mi.quantity, r.cost_per_unit
        FROM meal_ingredients mi
        JOIN raw_materials r ON r.id = mi.raw_material_id
        WHERE mi.meal_id = $1
        "#,
    )
    .bind(meal_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut costs = Vec::with_capacity(rows.len());
    for (id, qty, unit_cost) in rows {
        let cost = ingredient_cost(&qty, &unit_cost);
        sqlx::query("UPDATE meal_ingredients SET total_cost = $2 WHERE id = $1")
            .bind(id)
            .bind(&cost)
            .execute(&mut *conn)
            .await?;
        costs.push(cost);
    }

    let margin: BigDecimal = sqlx::query_scalar("SELECT profit_margin FROM meals WHERE id = $1")
        .bind(meal_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| NotFound(format!("meal {meal_id}")))?;
    let total = meal_cost(&costs);
    let price = selling_price(&total, &margin)?;

    sqlx::query("UPDATE meals SET total_cost = $2, selling_price = $3 WHERE id = $1")
        .bind(meal_id)
        .bind(&total)
        .bind(&price)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Re-prices every meal using one of `material_ids`.
pub async fn recompute_for_materials(conn: &mut PgConnection, material_ids: &[Uuid]) -> anyhow::Result<usize> {
    if material_ids.is_empty() {
        return Ok(0);
    }
    let meal_ids: Vec<Uuid> = sqlx::query_scalar(
        "SELECT DISTINCT meal_id FROM meal_ingredients WHERE raw_material_id = ANY($1)",
    )
    .bind(material_ids)
    .fetch_all(&mut *conn)
    .await?;

    for id in &meal_ids {
        recompute_meal(&mut *conn, *id).await?;
    }
    Ok(meal_ids.len())
}

pub async fn recompute_all(p: &PgPool) -> anyhow::Result<usize> {
    let mut tx = p.begin().await?;
    let meal_ids: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM meals")
        .fetch_all(&mut *tx)
        .await?;
    for id in &meal_ids {
        recompute_meal(&mut tx, *id).await?;
    }
    tx.commit().await?;

    log::info!("recalculated {} meals", meal_ids.len());
    Ok(meal_ids.len())
}
