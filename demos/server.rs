//! Demo server: wires the dispatch core and a users model together the way a
//! full deployment would, with a handful of toy routes.

use pureblog_core::{derive_schema, ApiError, Db, DbConfig, Field, Model, Reply, RouteTable};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Time-prefixed unique id, sortable by creation order.
fn next_id() -> Value {
    let millis = chrono::Utc::now().timestamp_millis();
    Value::String(format!("{:015}{}000", millis, uuid::Uuid::new_v4().simple()))
}

fn now() -> Value {
    Value::from(chrono::Utc::now().timestamp_millis() as f64 / 1000.0)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("pureblog_core=debug".parse()?))
        .init();

    let cfg = DbConfig::from_env()?;
    let db = Db::connect(&cfg).await?;

    let users = Model::new(derive_schema(
        "users",
        vec![
            ("id", Field::string().ddl("varchar(50)").primary().default_fn(next_id)),
            ("email", Field::string().ddl("varchar(50)")),
            ("passwd", Field::string().ddl("varchar(50)")),
            ("admin", Field::boolean()),
            ("name", Field::string().ddl("varchar(50)")),
            ("image", Field::string().ddl("varchar(500)")),
            ("created_at", Field::float().default_fn(now)),
        ],
    )?);

    let mut routes = RouteTable::new();

    routes
        .get("/")
        .handler(|_| async { Ok(Reply::Text("<h1>Pureblog</h1>".into())) });

    {
        let users = users.clone();
        let db = db.clone();
        routes.get("/api/users").handler(move |_| {
            let users = users.clone();
            let db = db.clone();
            async move {
                let found = users
                    .find_all(&db, None, &[], Some("\"created_at\" DESC"), None)
                    .await?;
                let rows: Vec<Value> = found.iter().map(|u| u.to_value()).collect();
                Ok(Reply::Json(json!({ "users": rows })))
            }
        });
    }

    {
        let users = users.clone();
        let db = db.clone();
        routes
            .post("/api/users")
            .required(&["email", "passwd", "name"])
            .handler(move |args| {
                let users = users.clone();
                let db = db.clone();
                async move {
                    let email = args.str_arg("email")?;
                    if !email.contains('@') {
                        return Err(ApiError::invalid_value("email", "invalid email address").into());
                    }
                    let existing = users
                        .find_all(&db, Some("\"email\" = ?"), &[Value::String(email.clone())], None, None)
                        .await?;
                    if !existing.is_empty() {
                        return Err(ApiError::invalid_value("email", "email is already in use").into());
                    }
                    let mut user = users.entity();
                    user.set("email", Value::String(email));
                    user.set("passwd", args.value("passwd"));
                    user.set("name", args.value("name"));
                    user.set("image", Value::String("about:blank".into()));
                    user.save(&db).await?;
                    Ok(Reply::Json(user.to_value()))
                }
            });
    }

    {
        let users = users.clone();
        let db = db.clone();
        routes
            .get("/api/users/{id}")
            .required(&["id"])
            .handler(move |args| {
                let users = users.clone();
                let db = db.clone();
                async move {
                    let id = args.str_arg("id")?;
                    match users.find_by_key(&db, &Value::String(id.clone())).await? {
                        Some(user) => Ok(Reply::Json(user.to_value())),
                        None => Err(ApiError::resource_not_found("id", format!("user {} not found", id)).into()),
                    }
                }
            });
    }

    let app = routes.into_router();
    let listener = TcpListener::bind("127.0.0.1:9000").await?;
    tracing::info!("server started at http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    db.close().await;
    Ok(())
}
