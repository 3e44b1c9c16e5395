//! Courses and modules. Every module owns exactly one chat room.

use modnet_database::{new_public_id, time};
use sqlx::{Row, SqlitePool};
use tracing::info;

use crate::types::{conflict_on_unique, ChatError, ChatResult, Course, Module, RoomKind};

pub(crate) const MODULE_SELECT: &str = r#"
    SELECT m.public_id, c.public_id AS course_public_id, m.code, m.name, m.semester,
           r.public_id AS room_public_id
    FROM modules m
    JOIN courses c ON c.id = m.course_id
    JOIN rooms r ON r.module_id = m.id
"#;

pub(crate) fn course_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Course, sqlx::Error> {
    Ok(Course {
        id: row.try_get("public_id")?,
        code: row.try_get("code")?,
        name: row.try_get("name")?,
        semesters: row.try_get("semesters")?,
    })
}

pub(crate) fn module_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Module, sqlx::Error> {
    Ok(Module {
        id: row.try_get("public_id")?,
        course_id: row.try_get("course_public_id")?,
        code: row.try_get("code")?,
        name: row.try_get("name")?,
        semester: row.try_get("semester")?,
        room_id: row.try_get("room_public_id")?,
    })
}

pub async fn list_courses(pool: &SqlitePool) -> ChatResult<Vec<Course>> {
    let rows = sqlx::query("SELECT public_id, code, name, semesters FROM courses ORDER BY code ASC")
        .fetch_all(pool)
        .await?;

    rows.iter()
        .map(|row| course_from_row(row).map_err(ChatError::from))
        .collect()
}

/// Resolve a course by public id, returning its row id alongside.
pub async fn find_course(pool: &SqlitePool, course_id: &str) -> ChatResult<(i64, Course)> {
    let row = sqlx::query("SELECT id, public_id, code, name, semesters FROM courses WHERE public_id = ?")
        .bind(course_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ChatError::not_found("course"))?;

    Ok((row.try_get("id")?, course_from_row(&row)?))
}

pub async fn list_modules(
    pool: &SqlitePool,
    course_id: &str,
    semester: Option<i64>,
) -> ChatResult<Vec<Module>> {
    let (course_db_id, _) = find_course(pool, course_id).await?;

    let rows = sqlx::query(&format!(
        "{MODULE_SELECT} WHERE m.course_id = ? AND (? IS NULL OR m.semester = ?) ORDER BY m.semester ASC, m.code ASC"
    ))
    .bind(course_db_id)
    .bind(semester)
    .bind(semester)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| module_from_row(row).map_err(ChatError::from))
        .collect()
}

pub async fn create_course(
    pool: &SqlitePool,
    code: &str,
    name: &str,
    semesters: i64,
) -> ChatResult<Course> {
    let code = catalog_code(code)?;
    let name = catalog_name(name)?;
    if !(1..=20).contains(&semesters) {
        return Err(ChatError::validation("a course has between 1 and 20 semesters"));
    }

    let public_id = new_public_id();
    sqlx::query(
        "INSERT INTO courses (public_id, code, name, semesters, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&public_id)
    .bind(&code)
    .bind(&name)
    .bind(semesters)
    .bind(time::now())
    .execute(pool)
    .await
    .map_err(|error| conflict_on_unique(error, "a course with this code already exists"))?;

    info!(course = %public_id, %code, "course created");
    Ok(Course {
        id: public_id,
        code,
        name,
        semesters,
    })
}

/// Create a module together with its chat room.
pub async fn create_module(
    pool: &SqlitePool,
    course_id: &str,
    code: &str,
    name: &str,
    semester: i64,
) -> ChatResult<Module> {
    let (course_db_id, course) = find_course(pool, course_id).await?;
    let code = catalog_code(code)?;
    let name = catalog_name(name)?;
    if !(1..=course.semesters).contains(&semester) {
        return Err(ChatError::validation(format!(
            "semester must be between 1 and {}",
            course.semesters
        )));
    }

    let now = time::now();
    let module_public_id = new_public_id();
    let room_public_id = new_public_id();

    let mut tx = pool.begin().await?;

    let module_db_id = sqlx::query(
        "INSERT INTO modules (public_id, course_id, code, name, semester, created_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&module_public_id)
    .bind(course_db_id)
    .bind(&code)
    .bind(&name)
    .bind(semester)
    .bind(&now)
    .execute(&mut *tx)
    .await
    .map_err(|error| conflict_on_unique(error, "this course already has a module with that code"))?
    .last_insert_rowid();

    sqlx::query(
        "INSERT INTO rooms (public_id, kind, name, description, module_id, created_by, created_at) VALUES (?, ?, ?, NULL, ?, NULL, ?)",
    )
    .bind(&room_public_id)
    .bind(RoomKind::Module)
    .bind(format!("{code} · {name}"))
    .bind(module_db_id)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    info!(module = %module_public_id, room = %room_public_id, "module created");
    Ok(Module {
        id: module_public_id,
        course_id: course.id,
        code,
        name,
        semester,
        room_id: room_public_id,
    })
}

fn catalog_code(code: &str) -> ChatResult<String> {
    let code = code.trim().to_ascii_uppercase();
    if !(2..=16).contains(&code.len())
        || !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    {
        return Err(ChatError::validation(
            "codes are 2 to 16 letters, digits or dashes",
        ));
    }
    Ok(code)
}

fn catalog_name(name: &str) -> ChatResult<String> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > 120 {
        return Err(ChatError::validation("names must be between 1 and 120 characters"));
    }
    Ok(name.to_owned())
}
