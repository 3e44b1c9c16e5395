//! Course, semester and module selection for a student.
//!
//! Module selection drives membership of module rooms: selecting a module
//! joins its room, deselecting it leaves the room again.

use std::collections::HashSet;

use modnet_database::time;
use sqlx::{Row, SqlitePool};
use tracing::info;

use super::catalog::{course_from_row, module_from_row, MODULE_SELECT};
use crate::types::{ChatError, ChatResult, Enrollment};

pub async fn enrollment(pool: &SqlitePool, user_id: i64) -> ChatResult<Enrollment> {
    let profile = sqlx::query(
        r#"
        SELECT u.semester, c.public_id, c.code, c.name, c.semesters
        FROM users u
        LEFT JOIN courses c ON c.id = u.course_id
        WHERE u.id = ?
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ChatError::not_found("user"))?;

    let course_public_id: Option<String> = profile.try_get("public_id")?;
    let course = match course_public_id {
        Some(_) => Some(course_from_row(&profile)?),
        None => None,
    };

    let rows = sqlx::query(&format!(
        "{MODULE_SELECT} JOIN user_modules um ON um.module_id = m.id WHERE um.user_id = ? ORDER BY m.semester ASC, m.code ASC"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let modules = rows
        .iter()
        .map(module_from_row)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Enrollment {
        course,
        semester: profile.try_get("semester")?,
        modules,
    })
}

/// Set the user's course and current semester.
///
/// Switching to a different course drops every module selection and the
/// matching module room memberships.
pub async fn select_course(
    pool: &SqlitePool,
    user_id: i64,
    course_id: &str,
    semester: i64,
) -> ChatResult<Enrollment> {
    let (course_db_id, course) = super::catalog::find_course(pool, course_id).await?;
    if !(1..=course.semesters).contains(&semester) {
        return Err(ChatError::validation(format!(
            "semester must be between 1 and {}",
            course.semesters
        )));
    }

    let mut tx = pool.begin().await?;

    let previous: Option<i64> = sqlx::query_scalar("SELECT course_id FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ChatError::not_found("user"))?;

    if previous.is_some_and(|previous| previous != course_db_id) {
        sqlx::query(
            r#"
            DELETE FROM room_members
            WHERE user_id = ?
              AND room_id IN (
                SELECT r.id FROM rooms r
                JOIN user_modules um ON um.module_id = r.module_id
                WHERE um.user_id = ?
              )
            "#,
        )
        .bind(user_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM user_modules WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
    }

    sqlx::query("UPDATE users SET course_id = ?, semester = ?, updated_at = ? WHERE id = ?")
        .bind(course_db_id)
        .bind(semester)
        .bind(time::now())
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    info!(user_id, course = %course.id, semester, "course selected");
    enrollment(pool, user_id).await
}

/// Replace the user's module selection and sync module room membership.
pub async fn select_modules(
    pool: &SqlitePool,
    user_id: i64,
    module_ids: &[String],
) -> ChatResult<Enrollment> {
    let requested: HashSet<&str> = module_ids.iter().map(String::as_str).collect();

    let course_db_id: Option<i64> = sqlx::query_scalar("SELECT course_id FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ChatError::not_found("user"))?;

    let Some(course_db_id) = course_db_id else {
        return Err(ChatError::validation("select a course before choosing modules"));
    };

    let mut resolved = Vec::with_capacity(requested.len());
    for module_id in &requested {
        let row = sqlx::query(
            r#"
            SELECT m.id, m.course_id, r.id AS room_id
            FROM modules m
            JOIN rooms r ON r.module_id = m.id
            WHERE m.public_id = ?
            "#,
        )
        .bind(module_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ChatError::not_found("module"))?;

        let module_course: i64 = row.try_get("course_id")?;
        if module_course != course_db_id {
            return Err(ChatError::validation(format!(
                "module {module_id} does not belong to your course"
            )));
        }

        let module_db_id: i64 = row.try_get("id")?;
        let room_db_id: i64 = row.try_get("room_id")?;
        resolved.push((module_db_id, room_db_id));
    }

    let keep: HashSet<i64> = resolved.iter().map(|(module, _)| *module).collect();
    let now = time::now();

    let mut tx = pool.begin().await?;

    let current = sqlx::query(
        r#"
        SELECT um.module_id, r.id AS room_id
        FROM user_modules um
        JOIN rooms r ON r.module_id = um.module_id
        WHERE um.user_id = ?
        "#,
    )
    .bind(user_id)
    .fetch_all(&mut *tx)
    .await?;

    for row in &current {
        let module_db_id: i64 = row.try_get("module_id")?;
        if keep.contains(&module_db_id) {
            continue;
        }
        let room_db_id: i64 = row.try_get("room_id")?;

        sqlx::query("DELETE FROM user_modules WHERE user_id = ? AND module_id = ?")
            .bind(user_id)
            .bind(module_db_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM room_members WHERE user_id = ? AND room_id = ?")
            .bind(user_id)
            .bind(room_db_id)
            .execute(&mut *tx)
            .await?;
    }

    for (module_db_id, room_db_id) in &resolved {
        sqlx::query(
            "INSERT OR IGNORE INTO user_modules (user_id, module_id, selected_at) VALUES (?, ?, ?)",
        )
        .bind(user_id)
        .bind(module_db_id)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "INSERT OR IGNORE INTO room_members (room_id, user_id, joined_at) VALUES (?, ?, ?)",
        )
        .bind(room_db_id)
        .bind(user_id)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    info!(user_id, modules = resolved.len(), "module selection updated");
    enrollment(pool, user_id).await
}
