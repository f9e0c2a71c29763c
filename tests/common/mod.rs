#![allow(dead_code)]

use anyhow::Result;
use axum::body::{self, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot`

use salesdesk::catalog::{self, MatrixDefinition};
use salesdesk::create_app;
use salesdesk::jwt::JwtConfig;

pub const JWT_SECRET: &str = "test-secret";

pub struct TestApp {
    pub app: Router,
    pub pool: SqlitePool,
    pub jwt: JwtConfig,
    _dir: TempDir,
}

impl TestApp {
    /// Fresh migrated database seeded with the built-in permission matrix.
    pub async fn new() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let db_path = dir.path().join("test.db");

        let opts = SqliteConnectOptions::new()
            .filename(db_path.as_path())
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePool::connect_with(opts).await?;

        let migrator =
            sqlx::migrate::Migrator::new(std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")).await?;
        migrator.run(&pool).await?;

        catalog::seed(&pool, &MatrixDefinition::builtin()?).await?;

        std::env::set_var("JWT_SECRET", JWT_SECRET);
        let app = create_app(pool.clone()).await?;

        Ok(Self {
            app,
            pool,
            jwt: JwtConfig::new(JWT_SECRET, 1),
            _dir: dir,
        })
    }

    pub async fn role_id(&self, code: &str) -> Result<i64> {
        Ok(sqlx::query_scalar::<_, i64>("SELECT id FROM roles WHERE code = ?")
            .bind(code)
            .fetch_one(&self.pool)
            .await?)
    }

    pub async fn department_id(&self, code: &str) -> Result<i64> {
        Ok(sqlx::query_scalar::<_, i64>("SELECT id FROM departments WHERE code = ?")
            .bind(code)
            .fetch_one(&self.pool)
            .await?)
    }

    pub async fn employee(&self, name: &str, dept: &str, role: Option<&str>, manager_id: Option<i64>) -> Result<i64> {
        let role_id = match role {
            Some(code) => Some(self.role_id(code).await?),
            None => None,
        };
        let department_id = self.department_id(dept).await?;

        let id = sqlx::query(
            "INSERT INTO employees (name, email, department_id, manager_id, role_id) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(name)
        .bind(format!("{name}@salesdesk.test"))
        .bind(department_id)
        .bind(manager_id)
        .bind(role_id)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        Ok(id)
    }

    pub async fn leads(&self, owner_id: i64, count: usize) -> Result<Vec<i64>> {
        let mut ids = Vec::with_capacity(count);
        for n in 0..count {
            let id = sqlx::query(
                r#"
                INSERT INTO leads (owner_id, department_id, company)
                SELECT id, department_id, ? FROM employees WHERE id = ?
                "#,
            )
            .bind(format!("Company {owner_id}-{n}"))
            .bind(owner_id)
            .execute(&self.pool)
            .await?
            .last_insert_rowid();
            ids.push(id);
        }
        Ok(ids)
    }

    pub fn token(&self, employee_id: i64) -> String {
        self.jwt.encode(employee_id).expect("token encodes")
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        as_employee: Option<i64>,
        body: Option<Value>,
    ) -> Result<(StatusCode, Value)> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(id) = as_employee {
            builder = builder.header("Authorization", format!("Bearer {}", self.token(id)));
        }
        let req = match body {
            Some(json) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(serde_json::to_vec(&json)?))?,
            None => builder.body(Body::empty())?,
        };

        let resp = self.app.clone().oneshot(req).await?;
        let status = resp.status();
        let bytes = body::to_bytes(resp.into_body(), 10_485_760).await?;
        let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes)? };
        Ok((status, value))
    }

    pub async fn get(&self, uri: &str, as_employee: i64) -> Result<(StatusCode, Value)> {
        self.request(Method::GET, uri, Some(as_employee), None).await
    }

    /// Ids of the records returned by a list endpoint.
    pub async fn list_ids(&self, uri: &str, as_employee: i64) -> Result<Vec<i64>> {
        let (status, body) = self.get(uri, as_employee).await?;
        assert_eq!(status, StatusCode::OK, "GET {uri} as {as_employee}: {body}");
        let mut ids: Vec<i64> = body
            .as_array()
            .expect("list response is an array")
            .iter()
            .filter_map(|v| v.get("id").and_then(Value::as_i64))
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    pub async fn count(&self, uri: &str, as_employee: i64) -> Result<usize> {
        Ok(self.list_ids(uri, as_employee).await?.len())
    }

    /// Poll `activity_log` until the background listener has persisted `event_name`.
    pub async fn wait_for_event(&self, event_name: &str) -> Result<bool> {
        for _ in 0..50 {
            let found = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM activity_log WHERE event_name = ?")
                .bind(event_name)
                .fetch_one(&self.pool)
                .await?;
            if found > 0 {
                return Ok(true);
            }
            tokio::time::sleep(std::time::Duration::from_millis(40)).await;
        }
        Ok(false)
    }
}

/// Sales org used by most scenarios:
///
/// ```text
/// head (SALES_HEAD)
/// ├── bm1 (SALES_BM)
/// │   ├── bdm1 (SALES_BDM) -> bde1..bde4
/// │   └── bdm2 (SALES_BDM) -> bde5..bde8
/// └── bm2 (SALES_BM) -> outsider (SALES_BDE)
/// admin (ADMIN, HR), hr (HR_MANAGER, HR)
/// ```
pub struct SalesOrg {
    pub admin: i64,
    pub hr: i64,
    pub head: i64,
    pub bm1: i64,
    pub bm2: i64,
    pub bdm1: i64,
    pub bdm2: i64,
    pub bdes_of_bdm1: Vec<i64>,
    pub bdes_of_bdm2: Vec<i64>,
    pub outsider: i64,
}

impl SalesOrg {
    pub async fn build(app: &TestApp) -> Result<Self> {
        let admin = app.employee("admin", "HR", Some("ADMIN"), None).await?;
        let hr = app.employee("hr", "HR", Some("HR_MANAGER"), None).await?;
        let head = app.employee("head", "SALES", Some("SALES_HEAD"), None).await?;
        let bm1 = app.employee("bm1", "SALES", Some("SALES_BM"), Some(head)).await?;
        let bm2 = app.employee("bm2", "SALES", Some("SALES_BM"), Some(head)).await?;
        let bdm1 = app.employee("bdm1", "SALES", Some("SALES_BDM"), Some(bm1)).await?;
        let bdm2 = app.employee("bdm2", "SALES", Some("SALES_BDM"), Some(bm1)).await?;

        let mut bdes_of_bdm1 = Vec::new();
        let mut bdes_of_bdm2 = Vec::new();
        for n in 1..=4 {
            bdes_of_bdm1.push(app.employee(&format!("bde{n}"), "SALES", Some("SALES_BDE"), Some(bdm1)).await?);
        }
        for n in 5..=8 {
            bdes_of_bdm2.push(app.employee(&format!("bde{n}"), "SALES", Some("SALES_BDE"), Some(bdm2)).await?);
        }
        let outsider = app.employee("outsider", "SALES", Some("SALES_BDE"), Some(bm2)).await?;

        Ok(Self {
            admin,
            hr,
            head,
            bm1,
            bm2,
            bdm1,
            bdm2,
            bdes_of_bdm1,
            bdes_of_bdm2,
            outsider,
        })
    }

    pub fn all_bdes(&self) -> impl Iterator<Item = i64> + '_ {
        self.bdes_of_bdm1.iter().chain(self.bdes_of_bdm2.iter()).copied()
    }
}
