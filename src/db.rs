//! Catalog storage in SQLite

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension};

use crate::catalog::Catalog;
use crate::models::{Facility, Item, ItemAmount, Recipe, RecipeId};

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS items (
            id TEXT PRIMARY KEY,
            name TEXT,
            tier INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS facilities (
            id TEXT PRIMARY KEY,
            name TEXT,
            power REAL NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS recipes (
            id TEXT PRIMARY KEY,
            facility_id TEXT NOT NULL,
            duration_s REAL NOT NULL
        );

        -- Amounts are per craft
        CREATE TABLE IF NOT EXISTS recipe_inputs (
            recipe_id TEXT NOT NULL,
            item_id TEXT NOT NULL,
            amount REAL NOT NULL,
            PRIMARY KEY (recipe_id, item_id)
        );

        CREATE TABLE IF NOT EXISTS recipe_outputs (
            recipe_id TEXT NOT NULL,
            item_id TEXT NOT NULL,
            amount REAL NOT NULL,
            PRIMARY KEY (recipe_id, item_id)
        );

        CREATE INDEX IF NOT EXISTS idx_recipe_outputs_item ON recipe_outputs(item_id);
        "#,
    )
    .context("Failed to create catalog schema")?;
    Ok(())
}

/// Insert or replace an item
pub fn upsert_item(conn: &Connection, item: &Item) -> Result<()> {
    conn.execute(
        "INSERT INTO items (id, name, tier) VALUES (?1, ?2, ?3)
         ON CONFLICT(id) DO UPDATE SET name = excluded.name, tier = excluded.tier",
        (item.id.as_str(), &item.name, item.tier),
    )?;
    Ok(())
}

/// Insert or replace a facility
pub fn upsert_facility(conn: &Connection, facility: &Facility) -> Result<()> {
    conn.execute(
        "INSERT INTO facilities (id, name, power) VALUES (?1, ?2, ?3)
         ON CONFLICT(id) DO UPDATE SET name = excluded.name, power = excluded.power",
        (facility.id.as_str(), &facility.name, facility.power),
    )?;
    Ok(())
}

/// Insert or replace a recipe together with its inputs and outputs.
///
/// Updating in place keeps the recipe's rowid, and with it its position in
/// [`load_catalog`] order.
pub fn upsert_recipe(conn: &Connection, recipe: &Recipe) -> Result<()> {
    conn.execute(
        "INSERT INTO recipes (id, facility_id, duration_s) VALUES (?1, ?2, ?3)
         ON CONFLICT(id) DO UPDATE SET facility_id = excluded.facility_id,
                                       duration_s = excluded.duration_s",
        (recipe.id.as_str(), recipe.facility.as_str(), recipe.duration),
    )?;
    conn.execute(
        "DELETE FROM recipe_inputs WHERE recipe_id = ?1",
        [recipe.id.as_str()],
    )?;
    conn.execute(
        "DELETE FROM recipe_outputs WHERE recipe_id = ?1",
        [recipe.id.as_str()],
    )?;

    for input in &recipe.inputs {
        conn.execute(
            "INSERT INTO recipe_inputs (recipe_id, item_id, amount) VALUES (?1, ?2, ?3)
             ON CONFLICT(recipe_id, item_id) DO UPDATE SET amount = amount + excluded.amount",
            (recipe.id.as_str(), input.item.as_str(), input.amount),
        )?;
    }
    for output in &recipe.outputs {
        conn.execute(
            "INSERT INTO recipe_outputs (recipe_id, item_id, amount) VALUES (?1, ?2, ?3)
             ON CONFLICT(recipe_id, item_id) DO UPDATE SET amount = amount + excluded.amount",
            (recipe.id.as_str(), output.item.as_str(), output.amount),
        )?;
    }
    Ok(())
}

/// Clear the whole catalog (for re-import)
pub fn clear_catalog(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        DELETE FROM recipe_outputs;
        DELETE FROM recipe_inputs;
        DELETE FROM recipes;
        DELETE FROM facilities;
        DELETE FROM items;
        "#,
    )?;
    Ok(())
}

/// Load every item, facility and recipe, in insertion order.
pub fn load_catalog(conn: &Connection) -> Result<Catalog> {
    let items = list_items(conn)?;
    let facilities = list_facilities(conn)?;

    let mut stmt = conn.prepare("SELECT id FROM recipes ORDER BY rowid")?;
    let ids = stmt.query_map([], |row| row.get::<_, String>(0))?;
    let mut recipes = Vec::new();
    for id in ids {
        let id = RecipeId::new(id?);
        if let Some(recipe) = get_recipe(conn, &id)? {
            recipes.push(recipe);
        }
    }

    Ok(Catalog::new(items, recipes, facilities))
}

/// List all items in insertion order
pub fn list_items(conn: &Connection) -> Result<Vec<Item>> {
    let mut stmt = conn.prepare("SELECT id, name, tier FROM items ORDER BY rowid")?;

    let rows = stmt.query_map([], |row| {
        Ok(Item {
            id: row.get::<_, String>(0)?.into(),
            name: row.get(1)?,
            tier: row.get(2)?,
        })
    })?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// List all facilities in insertion order
pub fn list_facilities(conn: &Connection) -> Result<Vec<Facility>> {
    let mut stmt = conn.prepare("SELECT id, name, power FROM facilities ORDER BY rowid")?;

    let rows = stmt.query_map([], |row| {
        Ok(Facility {
            id: row.get::<_, String>(0)?.into(),
            name: row.get(1)?,
            power: row.get(2)?,
        })
    })?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// List all recipes with their facility, ordered by id
pub fn list_recipes(conn: &Connection) -> Result<Vec<(RecipeId, String, f64)>> {
    let mut stmt =
        conn.prepare("SELECT id, facility_id, duration_s FROM recipes ORDER BY id")?;

    let rows = stmt.query_map([], |row| {
        Ok((
            RecipeId::new(row.get::<_, String>(0)?),
            row.get(1)?,
            row.get(2)?,
        ))
    })?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// Get one recipe with its inputs and outputs
pub fn get_recipe(conn: &Connection, id: &RecipeId) -> Result<Option<Recipe>> {
    let header: Option<(String, f64)> = conn
        .query_row(
            "SELECT facility_id, duration_s FROM recipes WHERE id = ?1",
            [id.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let Some((facility, duration)) = header else {
        return Ok(None);
    };

    Ok(Some(Recipe {
        id: id.clone(),
        inputs: recipe_amounts(conn, "recipe_inputs", id)?,
        outputs: recipe_amounts(conn, "recipe_outputs", id)?,
        duration,
        facility: facility.into(),
    }))
}

fn recipe_amounts(conn: &Connection, table: &str, id: &RecipeId) -> Result<Vec<ItemAmount>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT item_id, amount FROM {table} WHERE recipe_id = ?1 ORDER BY rowid"
    ))?;

    let rows = stmt.query_map([id.as_str()], |row| {
        Ok(ItemAmount {
            item: row.get::<_, String>(0)?.into(),
            amount: row.get(1)?,
        })
    })?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}
