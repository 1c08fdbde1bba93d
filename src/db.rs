use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::{pooled_connection::bb8::Pool, AsyncPgConnection};

// Type alias pour le pool de connexions
pub type DbPool = Pool<AsyncPgConnection>;

pub async fn create_pool(
    database_url: &str,
    max_size: u32,
) -> Result<DbPool, Box<dyn std::error::Error>> {
    let config = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
    let pool = Pool::builder().max_size(max_size).build(config).await?;

    Ok(pool)
}

// Pool qui n'ouvre aucune connexion avant le premier `get()`.
#[cfg(test)]
pub fn unconnected_pool() -> DbPool {
    let config =
        AsyncDieselConnectionManager::<AsyncPgConnection>::new("postgres://localhost/unused");
    Pool::builder().max_size(1).build_unchecked(config)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{NewUser, Role, User};
    use crate::schema::users;
    use diesel_async::{AsyncConnection, RunQueryDsl, SimpleAsyncConnection};

    // Un schéma neuf par test, migrations appliquées. None sans DATABASE_URL.
    pub(crate) async fn migrated_test_pool() -> Option<DbPool> {
        let database_url = match std::env::var("DATABASE_URL") {
            Ok(url) => url,
            Err(_) => {
                log::warn!("DATABASE_URL not set, skipping database test");
                return None;
            }
        };

        let schema = format!("worksync_test_{}", uuid::Uuid::new_v4().simple());
        let mut admin = AsyncPgConnection::establish(&database_url)
            .await
            .expect("test database should be reachable");
        admin
            .batch_execute(&format!("CREATE SCHEMA {}", schema))
            .await
            .expect("test schema should be created");

        let separator = if database_url.contains('?') { '&' } else { '?' };
        let scoped_url = format!(
            "{}{}options=-csearch_path%3D{}",
            database_url, separator, schema
        );
        let pool = create_pool(&scoped_url, 2)
            .await
            .expect("test pool should build");
        {
            let mut conn = pool.get().await.expect("test connection");
            conn.batch_execute(include_str!(
                "../migrations/2025-06-01-000000_create_core_tables/up.sql"
            ))
            .await
            .expect("migration should apply");
        }
        Some(pool)
    }

    pub(crate) async fn seed_user(pool: &DbPool, emp_id: &str, role: Role, department: &str) -> User {
        let mut conn = pool.get().await.unwrap();
        diesel::insert_into(users::table)
            .values(NewUser {
                emp_id: emp_id.to_string(),
                name: format!("Employee {}", emp_id),
                email: format!("{}@example.com", emp_id.to_lowercase()),
                password_hash: String::new(),
                role: role.as_str().to_string(),
                department: department.to_string(),
            })
            .get_result::<User>(&mut conn)
            .await
            .unwrap()
    }
}
