use std::{fs, path::PathBuf};

use anyhow::{anyhow, Context};
use sqlx::{Pool, Postgres};

/// `NNN_name.sql` -> (NNN, name)
fn parse_file_name(file_name: &str) -> Option<(i32, String)> {
    let stem = file_name.strip_suffix(".sql")?;
    let (number, name) = stem.split_once('_').unwrap_or((stem, ""));
    let number: i32 = number.parse().ok()?;
    Some((number, name.to_string()))
}

fn migration_files(dir: &str) -> anyhow::Result<Vec<(i32, String, PathBuf)>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("cannot read {}", dir))? {
        let entry = entry?;
        if !entry.metadata()?.is_file() {
            continue;
        }

        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        match parse_file_name(file_name) {
            Some((version, name)) => files.push((version, name, entry.path())),
            None => log::warn!("skipping {}: not a NNN_name.sql file", file_name),
        }
    }

    files.sort_by_key(|v| v.0);
    if let Some(w) = files.windows(2).find(|w| w[0].0 == w[1].0) {
        return Err(anyhow!("duplicate migration version {}", w[0].0));
    }
    Ok(files)
}

pub async fn migrate(p: &Pool<Postgres>, dir: &str) -> anyhow::Result<()> {
    sqlx::raw_sql(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(p)
    .await?;

    let applied: Vec<i32> = sqlx::query_scalar("SELECT version FROM schema_migrations")
        .fetch_all(p)
        .await?;

    log::info!("starting migration");
    for (version, name, path) in migration_files(dir)? {
        if applied.contains(&version) {
            continue;
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        log::info!("migrating {}", path.display());

        let mut tx = p.begin().await?;
        sqlx::raw_sql(&content)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("migration {} failed", path.display()))?;
        sqlx::query("INSERT INTO schema_migrations (version, name) VALUES ($1, $2)")
            .bind(version)
            .bind(&name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
    }
    log::info!("migration end");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names() {
        assert_eq!(parse_file_name("001_schema.sql"), Some((1, "schema".to_string())));
        assert_eq!(parse_file_name("010_add_index.sql"), Some((10, "add_index".to_string())));
        assert_eq!(parse_file_name("README.md"), None);
        assert_eq!(parse_file_name("seed.sql"), None);
    }
}
