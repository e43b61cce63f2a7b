use sqlx::{Pool, QueryBuilder, Sqlite, SqliteConnection};

use super::{begin, commit, contains_pattern, lock_row};
use crate::{
    concurrency::precondition::Precondition,
    constraint::{translate, Bound, Probe},
    error::{ApiError, QueryError},
    form::{TagDraft, TagQuery},
    pagination::PageContext,
    schema::{Entity, Id, Tag},
};

fn push_filters(builder: &mut QueryBuilder<'_, Sqlite>, query: &TagQuery) {
    builder.push(" WHERE 1 = 1");

    if let Some(name) = &query.name {
        builder
            .push(" AND t.name LIKE ")
            .push_bind(contains_pattern(name))
            .push(" ESCAPE '\\'");
    }
    if let Some(recipe_id) = query.recipe_id {
        builder
            .push(" AND EXISTS (SELECT 1 FROM recipe_tags rt")
            .push(" WHERE rt.tag_id = t.id AND rt.recipe_id = ")
            .push_bind(recipe_id)
            .push(")");
    }
}

pub async fn list_tags(query: &TagQuery, pool: &Pool<Sqlite>) -> Result<PageContext<Tag>, ApiError> {
    log::trace!("Listing tags {query:?}");

    let mut count = QueryBuilder::new("SELECT COUNT(*) FROM tags t");
    push_filters(&mut count, query);
    let (total,): (i64,) = count
        .build_query_as()
        .fetch_one(pool)
        .await
        .map_err(QueryError::from)?;

    let mut select = QueryBuilder::new("SELECT t.id, t.name FROM tags t");
    push_filters(&mut select, query);
    select
        .push(" ORDER BY t.id LIMIT ")
        .push_bind(query.page.page_size)
        .push(" OFFSET ")
        .push_bind(query.page.offset());

    let rows: Vec<Tag> = select
        .build_query_as()
        .fetch_all(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(PageContext::from_rows(rows, total, query.page))
}

pub async fn fetch_tag(id: Id, conn: &mut SqliteConnection) -> Result<Option<Tag>, ApiError> {
    let row: Option<Tag> = sqlx::query_as("SELECT id, name FROM tags WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(QueryError::from)?;

    Ok(row)
}

pub async fn get_tag(id: Id, pool: &Pool<Sqlite>) -> Result<Tag, ApiError> {
    let mut conn = pool.acquire().await.map_err(QueryError::from)?;

    fetch_tag(id, &mut conn)
        .await?
        .ok_or_else(|| ApiError::not_found(Tag::NAME, id))
}

pub async fn lock_tag(id: Id, conn: &mut SqliteConnection) -> Result<Tag, ApiError> {
    if !lock_row(Tag::TABLE, id, conn).await? {
        return Err(ApiError::not_found(Tag::NAME, id));
    }

    fetch_tag(id, conn)
        .await?
        .ok_or_else(|| ApiError::not_found(Tag::NAME, id))
}

fn probes(draft: &TagDraft, id: Option<Id>) -> Vec<Probe> {
    vec![Probe::unique(
        "name",
        Tag::TABLE,
        "name",
        Bound::Text(draft.name.clone()),
        id,
    )]
}

pub async fn create_tag(draft: &TagDraft, pool: &Pool<Sqlite>) -> Result<Tag, ApiError> {
    let mut tr = begin(pool).await?;

    let result = sqlx::query("INSERT INTO tags (name) VALUES (?)")
        .bind(&draft.name)
        .execute(&mut *tr)
        .await;

    let id = match result {
        Ok(result) => result.last_insert_rowid(),
        Err(e) => return Err(translate(e, &probes(draft, None), &mut tr).await),
    };

    let tag = fetch_tag(id, &mut tr)
        .await?
        .ok_or_else(|| ApiError::not_found(Tag::NAME, id))?;

    commit(tr).await?;
    log::info!("Created tag {id}");

    Ok(tag)
}

pub async fn update_tag(
    id: Id,
    draft: &TagDraft,
    precondition: &Precondition,
    pool: &Pool<Sqlite>,
) -> Result<Tag, ApiError> {
    let mut tr = begin(pool).await?;

    let current = lock_tag(id, &mut tr).await?;
    precondition.check(&current)?;

    let result = sqlx::query("UPDATE tags SET name = ? WHERE id = ?")
        .bind(&draft.name)
        .bind(id)
        .execute(&mut *tr)
        .await;

    if let Err(e) = result {
        return Err(translate(e, &probes(draft, Some(id)), &mut tr).await);
    }

    let tag = fetch_tag(id, &mut tr)
        .await?
        .ok_or_else(|| ApiError::not_found(Tag::NAME, id))?;

    commit(tr).await?;
    log::info!("Updated tag {id}");

    Ok(tag)
}

pub async fn delete_tag(
    id: Id,
    precondition: &Precondition,
    pool: &Pool<Sqlite>,
) -> Result<(), ApiError> {
    let mut tr = begin(pool).await?;

    let current = lock_tag(id, &mut tr).await?;
    precondition.check(&current)?;

    sqlx::query("DELETE FROM tags WHERE id = ?")
        .bind(id)
        .execute(&mut *tr)
        .await
        .map_err(QueryError::from)?;

    commit(tr).await?;
    log::info!("Deleted tag {id}");

    Ok(())
}
