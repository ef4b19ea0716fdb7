use crate::models::{
    Course, CreateCourseRequest, CreateLessonRequest, Lesson, UpdateCourseRequest,
    UpdateLessonRequest,
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// CatalogRepository
///
/// Defines the abstract contract for all persistence operations on the local catalog.
/// Handlers interact with the data layer through this trait only, so the Postgres
/// implementation can be swapped for the in-memory one during testing.
///
/// **Send + Sync + async_trait** are required to make the trait object
/// (`Arc<dyn CatalogRepository>`) safely shareable across Axum's task boundaries.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    // --- Courses ---
    /// All local courses in insertion order (the listing order of the catalog).
    async fn all_courses(&self) -> Vec<Course>;
    async fn course(&self, id: Uuid) -> Option<Course>;
    async fn course_by_code(&self, code: &str) -> Option<Course>;
    /// Returns `None` when the unique `code` is already taken.
    async fn create_course(&self, req: CreateCourseRequest) -> Option<Course>;
    async fn update_course(&self, id: Uuid, req: UpdateCourseRequest) -> Option<Course>;
    /// Deletes the course and all of its lessons. Returns false when the id is unknown.
    async fn delete_course(&self, id: Uuid) -> bool;

    // --- Lessons ---
    /// Lessons of one course, ordered by their `number` field.
    async fn lessons_for_course(&self, course_id: Uuid) -> Vec<Lesson>;
    async fn lesson(&self, id: Uuid) -> Option<Lesson>;
    /// Returns `None` when the owning course does not exist.
    async fn create_lesson(&self, course_id: Uuid, req: CreateLessonRequest) -> Option<Lesson>;
    async fn update_lesson(&self, id: Uuid, req: UpdateLessonRequest) -> Option<Lesson>;
    async fn delete_lesson(&self, id: Uuid) -> bool;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn CatalogRepository>;

/// PostgresRepository
///
/// The concrete implementation of `CatalogRepository`, backed by PostgreSQL.
/// Uses the runtime query API with bound parameters throughout.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const COURSE_COLUMNS: &str = "id, code, name, description, created_at, updated_at";
const LESSON_COLUMNS: &str = "id, course_id, name, content, number";

#[async_trait]
impl CatalogRepository for PostgresRepository {
    async fn all_courses(&self) -> Vec<Course> {
        let query = format!("SELECT {COURSE_COLUMNS} FROM courses ORDER BY created_at ASC");
        match sqlx::query_as::<_, Course>(&query).fetch_all(&self.pool).await {
            Ok(courses) => courses,
            Err(e) => {
                tracing::error!("all_courses error: {:?}", e);
                vec![]
            }
        }
    }

    async fn course(&self, id: Uuid) -> Option<Course> {
        let query = format!("SELECT {COURSE_COLUMNS} FROM courses WHERE id = $1");
        sqlx::query_as::<_, Course>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("course error: {:?}", e);
                None
            })
    }

    async fn course_by_code(&self, code: &str) -> Option<Course> {
        let query = format!("SELECT {COURSE_COLUMNS} FROM courses WHERE code = $1");
        sqlx::query_as::<_, Course>(&query)
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("course_by_code error: {:?}", e);
                None
            })
    }

    /// create_course
    ///
    /// `ON CONFLICT DO NOTHING` turns a duplicate `code` into `None` instead of an
    /// error, which the handler maps to 409.
    async fn create_course(&self, req: CreateCourseRequest) -> Option<Course> {
        let query = format!(
            "INSERT INTO courses (id, code, name, description, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, NOW(), NOW()) \
             ON CONFLICT (code) DO NOTHING \
             RETURNING {COURSE_COLUMNS}"
        );
        sqlx::query_as::<_, Course>(&query)
            .bind(Uuid::new_v4())
            .bind(&req.code)
            .bind(&req.name)
            .bind(&req.description)
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("create_course error: {:?}", e);
                None
            })
    }

    /// update_course
    ///
    /// Uses `COALESCE` to only change the columns present in the partial payload.
    async fn update_course(&self, id: Uuid, req: UpdateCourseRequest) -> Option<Course> {
        let query = format!(
            "UPDATE courses \
             SET code = COALESCE($2, code), \
                 name = COALESCE($3, name), \
                 description = COALESCE($4, description), \
                 updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {COURSE_COLUMNS}"
        );
        sqlx::query_as::<_, Course>(&query)
            .bind(id)
            .bind(&req.code)
            .bind(&req.name)
            .bind(&req.description)
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("update_course error: {:?}", e);
                None
            })
    }

    /// delete_course
    ///
    /// Lessons are owned exclusively by their course, so both deletes run in one
    /// transaction; a course id that matches nothing leaves the lessons untouched.
    async fn delete_course(&self, id: Uuid) -> bool {
        let mut tx = match self.pool.begin().await {
            Ok(tx) => tx,
            Err(e) => {
                tracing::error!("delete_course begin error: {:?}", e);
                return false;
            }
        };

        if let Err(e) = sqlx::query("DELETE FROM lessons WHERE course_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
        {
            tracing::error!("delete_course lessons error: {:?}", e);
            return false;
        }

        let deleted = match sqlx::query("DELETE FROM courses WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
        {
            Ok(res) => res.rows_affected() > 0,
            Err(e) => {
                tracing::error!("delete_course error: {:?}", e);
                return false;
            }
        };

        match tx.commit().await {
            Ok(()) => deleted,
            Err(e) => {
                tracing::error!("delete_course commit error: {:?}", e);
                false
            }
        }
    }

    async fn lessons_for_course(&self, course_id: Uuid) -> Vec<Lesson> {
        let query =
            format!("SELECT {LESSON_COLUMNS} FROM lessons WHERE course_id = $1 ORDER BY number ASC");
        match sqlx::query_as::<_, Lesson>(&query)
            .bind(course_id)
            .fetch_all(&self.pool)
            .await
        {
            Ok(lessons) => lessons,
            Err(e) => {
                tracing::error!("lessons_for_course error: {:?}", e);
                vec![]
            }
        }
    }

    async fn lesson(&self, id: Uuid) -> Option<Lesson> {
        let query = format!("SELECT {LESSON_COLUMNS} FROM lessons WHERE id = $1");
        sqlx::query_as::<_, Lesson>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("lesson error: {:?}", e);
                None
            })
    }

    /// create_lesson
    ///
    /// The foreign key to `courses` rejects inserts for unknown courses; that failure
    /// surfaces as `None` (handler maps it to 404).
    async fn create_lesson(&self, course_id: Uuid, req: CreateLessonRequest) -> Option<Lesson> {
        let query = format!(
            "INSERT INTO lessons (id, course_id, name, content, number) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {LESSON_COLUMNS}"
        );
        sqlx::query_as::<_, Lesson>(&query)
            .bind(Uuid::new_v4())
            .bind(course_id)
            .bind(&req.name)
            .bind(&req.content)
            .bind(req.number)
            .fetch_one(&self.pool)
            .await
            .map(Some)
            .unwrap_or_else(|e| {
                tracing::error!("create_lesson error: {:?}", e);
                None
            })
    }

    async fn update_lesson(&self, id: Uuid, req: UpdateLessonRequest) -> Option<Lesson> {
        let query = format!(
            "UPDATE lessons \
             SET name = COALESCE($2, name), \
                 content = COALESCE($3, content), \
                 number = COALESCE($4, number) \
             WHERE id = $1 \
             RETURNING {LESSON_COLUMNS}"
        );
        sqlx::query_as::<_, Lesson>(&query)
            .bind(id)
            .bind(&req.name)
            .bind(&req.content)
            .bind(req.number)
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("update_lesson error: {:?}", e);
                None
            })
    }

    async fn delete_lesson(&self, id: Uuid) -> bool {
        match sqlx::query("DELETE FROM lessons WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
        {
            Ok(res) => res.rows_affected() > 0,
            Err(e) => {
                tracing::error!("delete_lesson error: {:?}", e);
                false
            }
        }
    }
}

/// MemoryRepository
///
/// An in-memory implementation of `CatalogRepository` used by the integration tests,
/// mirroring the Postgres semantics that matter to the handlers: unique course codes,
/// insertion-ordered listing, lesson ordering by `number`, and cascade deletion of
/// lessons with their course.
#[derive(Default)]
pub struct MemoryRepository {
    courses: Mutex<Vec<Course>>,
    lessons: Mutex<Vec<Lesson>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogRepository for MemoryRepository {
    async fn all_courses(&self) -> Vec<Course> {
        self.courses.lock().expect("courses lock").clone()
    }

    async fn course(&self, id: Uuid) -> Option<Course> {
        self.courses
            .lock()
            .expect("courses lock")
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }

    async fn course_by_code(&self, code: &str) -> Option<Course> {
        self.courses
            .lock()
            .expect("courses lock")
            .iter()
            .find(|c| c.code == code)
            .cloned()
    }

    async fn create_course(&self, req: CreateCourseRequest) -> Option<Course> {
        let mut courses = self.courses.lock().expect("courses lock");
        if courses.iter().any(|c| c.code == req.code) {
            return None;
        }
        let now = Utc::now();
        let course = Course {
            id: Uuid::new_v4(),
            code: req.code,
            name: req.name,
            description: req.description,
            created_at: now,
            updated_at: now,
        };
        courses.push(course.clone());
        Some(course)
    }

    async fn update_course(&self, id: Uuid, req: UpdateCourseRequest) -> Option<Course> {
        let mut courses = self.courses.lock().expect("courses lock");
        // Mirrors the unique index on `code`: renaming onto a taken code fails.
        if let Some(code) = req.code.as_deref() {
            if courses.iter().any(|c| c.code == code && c.id != id) {
                return None;
            }
        }
        let course = courses.iter_mut().find(|c| c.id == id)?;
        if let Some(code) = req.code {
            course.code = code;
        }
        if let Some(name) = req.name {
            course.name = name;
        }
        if let Some(description) = req.description {
            course.description = description;
        }
        course.updated_at = Utc::now();
        Some(course.clone())
    }

    async fn delete_course(&self, id: Uuid) -> bool {
        let mut courses = self.courses.lock().expect("courses lock");
        let before = courses.len();
        courses.retain(|c| c.id != id);
        if courses.len() == before {
            return false;
        }
        // Cascade: a course takes its lessons with it.
        self.lessons
            .lock()
            .expect("lessons lock")
            .retain(|l| l.course_id != id);
        true
    }

    async fn lessons_for_course(&self, course_id: Uuid) -> Vec<Lesson> {
        let mut lessons: Vec<Lesson> = self
            .lessons
            .lock()
            .expect("lessons lock")
            .iter()
            .filter(|l| l.course_id == course_id)
            .cloned()
            .collect();
        lessons.sort_by_key(|l| l.number);
        lessons
    }

    async fn lesson(&self, id: Uuid) -> Option<Lesson> {
        self.lessons
            .lock()
            .expect("lessons lock")
            .iter()
            .find(|l| l.id == id)
            .cloned()
    }

    async fn create_lesson(&self, course_id: Uuid, req: CreateLessonRequest) -> Option<Lesson> {
        if self.course(course_id).await.is_none() {
            return None;
        }
        let lesson = Lesson {
            id: Uuid::new_v4(),
            course_id,
            name: req.name,
            content: req.content,
            number: req.number,
        };
        self.lessons
            .lock()
            .expect("lessons lock")
            .push(lesson.clone());
        Some(lesson)
    }

    async fn update_lesson(&self, id: Uuid, req: UpdateLessonRequest) -> Option<Lesson> {
        let mut lessons = self.lessons.lock().expect("lessons lock");
        let lesson = lessons.iter_mut().find(|l| l.id == id)?;
        if let Some(name) = req.name {
            lesson.name = name;
        }
        if let Some(content) = req.content {
            lesson.content = content;
        }
        if let Some(number) = req.number {
            lesson.number = number;
        }
        Some(lesson.clone())
    }

    async fn delete_lesson(&self, id: Uuid) -> bool {
        let mut lessons = self.lessons.lock().expect("lessons lock");
        let before = lessons.len();
        lessons.retain(|l| l.id != id);
        lessons.len() != before
    }
}
