use dotenvy::dotenv;
use enrolldesk::logging::init_tracing;
use enrolldesk::metrics::{init_metrics, metrics_app};
use enrolldesk::router::init_router;
use enrolldesk::state::init_app_state;

#[tokio::main]
async fn main() {
    dotenv().ok();

    let args: Vec<String> = std::env::args().collect();

    // Check if this is a CLI command
    if args.len() > 1 && args[1] == "create-admin" {
        handle_create_admin(args).await;
        return;
    }

    // Normal server startup
    init_tracing();

    let state = init_app_state().await;
    let app = init_router(state);

    // Metrics exporter on its own listener
    if let Some(handle) = init_metrics() {
        let metrics_port: u16 = std::env::var("METRICS_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(9091);
        tokio::spawn(async move {
            let listener = tokio::net::TcpListener::bind(("0.0.0.0", metrics_port))
                .await
                .expect("Failed to bind metrics listener");
            axum::serve(listener, metrics_app(handle))
                .await
                .expect("Metrics server failed");
        });
    }

    let port: u16 = std::env::var("APP_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .expect("Failed to bind app listener");
    println!("🚀 Server running on http://localhost:{port}");
    println!("📚 Swagger UI available at http://localhost:{port}/swagger-ui");
    println!("📖 Scalar UI available at http://localhost:{port}/scalar");
    // Connect info feeds the per-IP rate limiter key extractor.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await
    .expect("Server failed");
}

async fn handle_create_admin(args: Vec<String>) {
    if args.len() != 5 {
        eprintln!(
            "Usage: {} create-admin <full_name> <email> <password>",
            args[0]
        );
        std::process::exit(1);
    }

    let full_name = &args[2];
    let email = &args[3];
    let password = &args[4];

    let state = init_app_state().await;

    match enrolldesk::cli::create_admin(&state, full_name, email, password).await {
        Ok(profile) => {
            println!("✅ Admin created successfully!");
            println!("   Email: {}", email);
            println!("   Name: {}", full_name);
            println!("   Profile: {} ({})", profile.id, profile.status);
        }
        Err(e) => {
            eprintln!("❌ Error creating admin: {}", e);
            std::process::exit(1);
        }
    }
}
