//! Demo server exercising every route kind.
//!
//! ```sh
//! TRELLIS_PORT=8080 TRELLIS_LOG_LEVEL=debug cargo run --example server
//! curl 'http://localhost:8080/hello?name=Ibra'
//! curl -F file=@source/contoh.txt http://localhost:8080/upload
//! ```
//!
//! An optional config file path (`.toml`, `.json` or `.env`) may be passed as
//! the first argument.

use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use trellis::prelude::*;
use trellis_config::ServerConfig;
use trellis_log::{error, info};

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Deserialize)]
struct RegisterRequest {
    username: String,
    password: String,
    name: String,
}

fn routes(config: &ServerConfig) -> Router {
    let upload_dir = Arc::new(config.upload_dir.clone());
    let sample = Arc::new(config.download_dir.join("contoh.txt"));
    let mut router = Router::new();

    router
        .get("/", |ctx: Context| async move { ctx.send_string("Hello World") })
        .get("/hello", |ctx: Context| async move {
            let name = ctx.query("name", "Guest");
            ctx.send_string(format!("Hello {name}"))
        })
        .get("/request", |ctx: Context| async move {
            let first = ctx.header("firstname");
            let last = ctx.cookie("lastname");
            ctx.send_string(format!("Hello {first} {last}"))
        })
        .get("/users/:userId/orders/:orderId", |ctx: Context| async move {
            let user = ctx.param("userId");
            let order = ctx.param("orderId");
            ctx.send_string(format!("Get Order {order} From User {user}"))
        })
        .post("/hello", |ctx: Context| async move {
            let name = ctx.form_value("name").await;
            ctx.send_string(format!("Hello {name}"))
        })
        .post("/upload", move |ctx: Context| {
            let upload_dir = upload_dir.clone();
            async move {
                let file = ctx.form_file("file").await?;
                ctx.save_file(&file, upload_dir.join(&file.filename)).await?;
                info!("saved upload {} ({} bytes)", file.filename, file.size());
                ctx.send_string("Upload Success")
            }
        })
        .post("/login", |ctx: Context| async move {
            let login: LoginRequest = ctx.body_parse().await?;
            if login.password.is_empty() {
                ctx.status(401);
                return Err(Error::status(401, "password required"));
            }
            ctx.send_string(format!("Login Success {}", login.username))
        })
        .post("/register", |ctx: Context| async move {
            let register: RegisterRequest = ctx.body_parse().await?;
            info!("registering {} ({})", register.username, register.name);
            if register.password.is_empty() {
                return Err(Error::status(400, "password required"));
            }
            ctx.send_string(format!("Register Success {}", register.username))
        })
        .get("/user", |ctx: Context| async move {
            ctx.json(&json!({ "username": "ibra", "name": "ibra alfathar" }))
        })
        .get("/download", move |ctx: Context| {
            let sample = sample.clone();
            async move { ctx.download(sample.as_path(), "contoh.txt").await }
        });

    router
}

#[tokio::main]
async fn main() {
    trellis_log::init();

    let path = std::env::args().nth(1).map(PathBuf::from);
    let config = match ServerConfig::load(path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    let addr = match config.socket_addr() {
        Ok(addr) => addr,
        Err(e) => {
            error!("invalid listen address: {e}");
            std::process::exit(1);
        }
    };

    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("failed to bind {addr}: {e}");
            std::process::exit(1);
        }
    };

    let app = Application::new(routes(&config)).with_body_limit(config.body_limit);
    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("shutting down");
    };

    if let Err(e) = app.serve(listener, shutdown).await {
        error!("server error: {e}");
    }
}
