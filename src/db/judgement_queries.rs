use sqlx::{PgPool, Row};
use std::str::FromStr;

use crate::models::verdict::{Judgement, Verdict};

/// Insert or replace the latest verdict for a project. Last write wins.
pub async fn upsert_judgement(pool: &PgPool, judgement: &Judgement) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO judgements (project, verdict, text, updated_at)
        VALUES ($1, $2, $3, NOW())
        ON CONFLICT (project)
        DO UPDATE SET verdict = EXCLUDED.verdict,
                      text = EXCLUDED.text,
                      updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(&judgement.project)
    .bind(judgement.verdict.as_str())
    .bind(&judgement.text)
    .execute(pool)
    .await?;

    Ok(())
}

/// Latest verdict for a project, if it was ever evaluated.
pub async fn get_judgement(pool: &PgPool, project: &str) -> Result<Option<Judgement>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT project, verdict, text
        FROM judgements
        WHERE project = $1
        "#,
    )
    .bind(project)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(r) => {
            let verdict_str: String = r.try_get("verdict")?;
            let verdict = Verdict::from_str(&verdict_str)
                .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

            Ok(Some(Judgement {
                project: r.try_get("project")?,
                verdict,
                text: r.try_get("text")?,
            }))
        }
        None => Ok(None),
    }
}
